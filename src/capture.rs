//! DOM-to-raster capture primitive
//!
//! A [`Capture`] implementation renders a target (an element reference, a CSS
//! selector, a pre-rendered file...) into a [`CapturedRaster`]. Backends live
//! next to their host: [`PngFileCapture`] here, `CdpCapture` in [`crate::cdp`].

use crate::error::CaptureError;
use crate::rendering::raster::{decode_png, encode_rgb_png, flatten, pad_to_width, upscale_nearest, RgbaImage};
use crate::rendering::{CapturedRaster, Rgb};
use log::debug;
use std::future::Future;
use std::path::PathBuf;

/// Options handed to every capture call
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Oversampling factor applied to the rendered size
    pub scale: f32,
    /// Opaque color painted behind the element
    pub background: Rgb,
    /// Let cross-origin images rasterize when the host permits it
    pub allow_cross_origin: bool,
    /// Lay the element out at least this wide before capturing (0 disables)
    pub min_width_px: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: Rgb::WHITE,
            allow_cross_origin: true,
            min_width_px: 0,
        }
    }
}

/// Asynchronous rasterization of a target.
pub trait Capture {
    /// What identifies the region to capture for this backend
    type Target;

    fn capture(
        &self,
        target: &Self::Target,
        options: &CaptureOptions,
    ) -> impl Future<Output = Result<CapturedRaster, CaptureError>> + Send;
}

/// Reject rasters with no area; hosts occasionally report success for
/// elements that were laid out but never painted.
pub fn ensure_rendered(raster: &CapturedRaster) -> Result<(), CaptureError> {
    if raster.width == 0 || raster.height == 0 {
        return Err(CaptureError::ZeroSize {
            width: raster.width,
            height: raster.height,
        });
    }
    Ok(())
}

/// Apply oversampling and background flattening to a 1x rendering.
pub fn finish_raster(rendered: &RgbaImage, options: &CaptureOptions) -> Result<CapturedRaster, CaptureError> {
    let (width, height) = rendered.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::ZeroSize { width, height });
    }
    if !(options.scale.is_finite() && options.scale > 0.0) {
        return Err(CaptureError::Renderer(format!("invalid scale {}", options.scale)));
    }

    // narrow elements are laid out at least `min_width_px` wide
    let laid_out = pad_to_width(rendered, options.min_width_px, options.background);
    let scaled = upscale_nearest(&laid_out, options.scale);
    let rgb = flatten(&scaled, options.background);
    let png_data =
        encode_rgb_png(&rgb).map_err(|e| CaptureError::Renderer(format!("PNG encoding failed: {}", e)))?;

    Ok(CapturedRaster::new(rgb.width(), rgb.height(), png_data))
}

/// Captures from PNG files holding a 1x rendering of the element.
///
/// Useful for pipelines that already have a screenshot (CI artifacts, a
/// browser extension upload) and for exercising the exporter without a
/// browser. A missing file is reported as a detached target.
#[derive(Debug, Clone, Default)]
pub struct PngFileCapture;

impl PngFileCapture {
    pub fn new() -> Self {
        PngFileCapture
    }
}

impl Capture for PngFileCapture {
    type Target = PathBuf;

    async fn capture(&self, target: &PathBuf, options: &CaptureOptions) -> Result<CapturedRaster, CaptureError> {
        let bytes = match tokio::fs::read(target).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaptureError::Detached(target.display().to_string()))
            }
            Err(e) => return Err(CaptureError::Renderer(format!("{}: {}", target.display(), e))),
        };
        let rendered = decode_png(&bytes).map_err(|e| CaptureError::Renderer(e.to_string()))?;
        debug!(
            "captured {} ({}x{}) at scale {}",
            target.display(),
            rendered.width(),
            rendered.height(),
            options.scale
        );
        finish_raster(&rendered, options)
    }
}
