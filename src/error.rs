//! Error types for the export and print pipelines

use thiserror::Error;

/// Result type alias for export and print operations
pub type Result<T> = std::result::Result<T, Error>;

/// The source element could not be rasterized.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The target is not attached to the host document (or could not be found)
    #[error("Capture target is detached: {0}")]
    Detached(String),

    /// The target has no rendered area
    #[error("Capture target has zero rendered size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },

    /// The renderer threw while producing pixels
    #[error("Renderer failed: {0}")]
    Renderer(String),
}

/// The document builder rejected its input.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// Raster payload could not be decoded or has an unsupported layout
    #[error("Invalid raster payload: {0}")]
    InvalidRaster(String),

    /// Page or placement geometry is unusable (non-finite or non-positive)
    #[error("Invalid page geometry: {0}")]
    Geometry(String),

    /// The PDF writer failed
    #[error("PDF writer error: {0}")]
    Pdf(String),
}

/// Errors surfaced to the UI code that invoked an export or print.
#[derive(Error, Debug)]
pub enum Error {
    /// Capture failed; no download was started
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Assembly failed; no download was started
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// The request violates an input constraint (e.g. empty filename)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The download mechanism refused the document
    #[error("Failed to deliver {filename}: {source}")]
    Delivery {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// The print host failed while mutating its document
    #[error("Print host error: {0}")]
    Host(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error outside delivery (config files, raster inputs)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for AssemblyError {
    fn from(err: lopdf::Error) -> Self {
        AssemblyError::Pdf(err.to_string())
    }
}

impl From<image::ImageError> for AssemblyError {
    fn from(err: image::ImageError) -> Self {
        AssemblyError::InvalidRaster(err.to_string())
    }
}
