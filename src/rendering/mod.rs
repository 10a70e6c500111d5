//! Raster snapshots and the page arithmetic applied to them

pub mod layout;
pub mod raster;

use base64::Engine as Base64Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::WHITE
    }
}

/// A snapshot of rendered pixels, PNG-encoded.
///
/// Produced by a [`Capture`](crate::capture::Capture) implementation and
/// consumed right away by document assembly. `blocked_resources` lists
/// cross-origin resources the renderer was not allowed to read; they show up as
/// blank regions in the image.
#[derive(Debug, Clone)]
pub struct CapturedRaster {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
    pub blocked_resources: Vec<String>,
}

impl CapturedRaster {
    pub fn new(width: u32, height: u32, png_data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            png_data,
            blocked_resources: Vec::new(),
        }
    }

    /// `data:image/png;base64,...` form of the payload
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png_data)
        )
    }

    /// SHA-256 of the PNG payload, used to deduplicate embedded images.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.png_data);
        hasher.finalize().into()
    }
}
