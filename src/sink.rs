//! Download mechanisms: where finished documents are handed off

use log::info;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The host save/download mechanism.
pub trait DownloadSink: Send + Sync {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Writes downloads into a directory, like a browser's download folder.
///
/// Filenames are taken as leaf names only; anything that would escape the
/// directory is refused.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, filename: &str) -> io::Result<PathBuf> {
        let leaf = Path::new(filename);
        let is_leaf = leaf.file_name().map(|n| n == leaf.as_os_str()).unwrap_or(false);
        if filename.is_empty() || !is_leaf || filename == "." || filename == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a plain file name", filename),
            ));
        }
        Ok(self.dir.join(leaf))
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.target(filename)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, bytes)?;
        info!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// One delivered download
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Keeps downloads in memory; used by tests and previews.
#[derive(Debug, Default)]
pub struct MemorySink {
    downloads: Mutex<Vec<Download>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> Vec<Download> {
        self.downloads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.downloads.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<()> {
        let mut downloads = self.downloads.lock().unwrap_or_else(|e| e.into_inner());
        downloads.push(Download {
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

impl<S: DownloadSink + ?Sized> DownloadSink for std::sync::Arc<S> {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> io::Result<()> {
        (**self).deliver(filename, bytes)
    }
}
