//! Revendis export core
//!
//! Client-side export and print pipeline for the Revendis back office. Two
//! independent, stateless operations are provided:
//!
//! - **Rasterized-document export** ([`Exporter`]): capture a rendered region
//!   as a raster at 2x, lay it out on A4 pages (sliced when taller than a page)
//!   or on a single thermal-receipt page (80mm / 58mm), and hand the PDF to a
//!   download sink.
//! - **Print pipeline** ([`PrintPipeline`]): write markup and print styles
//!   into a hidden, throwaway frame, let it settle, invoke the host print
//!   dialog, and remove the frame shortly after.
//!
//! Hosts are reached through traits ([`Capture`], [`DocumentAssembler`],
//! [`DownloadSink`], [`PrintHost`]) so the same pipeline runs against headless
//! Chrome (`cdp` feature), pre-rendered PNG files, or in-memory test doubles.
//!
//! # Example
//!
//! ```no_run
//! use revendis_export::{pdf_exporter, DirectorySink, ExportRequest, PageFormat, PngFileCapture};
//!
//! # async fn run() -> revendis_export::Result<()> {
//! let exporter = pdf_exporter(PngFileCapture::new(), DirectorySink::new("downloads"));
//! let request = ExportRequest::new("receipt.png".into(), "venda-42-thermal.pdf", PageFormat::Narrow80);
//! let receipt = exporter.export(&request).await?;
//! println!("{} page(s)", receipt.pages);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub use error::{AssemblyError, CaptureError, Error, Result};

pub mod capture;
pub mod document;
pub mod exporter;
pub mod pdf;
pub mod print;
pub mod rendering;
pub mod sink;

// Chrome DevTools Protocol host (capture + print frames in a real tab)
#[cfg(feature = "cdp")]
pub mod cdp;

pub use capture::{Capture, CaptureOptions, PngFileCapture};
pub use document::{DocumentAssembler, Orientation, PageSize, PaginatedDocument, Placement, Unit};
pub use exporter::{pdf_exporter, ExportReceipt, ExportRequest, Exporter, RenderedDocument};
pub use pdf::{PdfAssembler, PdfDocument};
pub use print::memory::InMemoryHost;
pub use print::surface::{EphemeralSurface, FrameStyle, PrintHost, SurfaceId, SurfaceState};
pub use print::{compose_print_document, PendingRemoval, PrintOutcome, PrintPipeline, PrintRequest, SettlePolicy};
pub use rendering::layout::{plan_pages, PageFormat, PagePlan, PlanOptions};
pub use rendering::{CapturedRaster, Rgb};
pub use sink::{DirectorySink, DownloadSink, MemorySink};

/// Configuration for rasterized exports
///
/// Defaults reproduce the dashboard's behaviour: 2x oversampling on an opaque
/// white background, best-effort cross-origin reads, receipts at least 20mm
/// tall.
///
/// # Examples
///
/// ```
/// let cfg = revendis_export::ExportConfig::default();
/// assert_eq!(cfg.scale, 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Oversampling factor for the capture
    pub scale: f32,
    /// Background painted behind transparent pixels
    pub background: Rgb,
    /// Allow cross-origin resources to rasterize (blank when the host refuses)
    pub allow_cross_origin: bool,
    /// Minimum layout width for the captured element, in CSS pixels (0 = off)
    pub min_capture_width_px: u32,
    /// Minimum height of thermal-receipt pages in millimetres
    pub narrow_min_height_mm: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: Rgb::WHITE,
            allow_cross_origin: true,
            min_capture_width_px: 0,
            narrow_min_height_mm: 20.0,
        }
    }
}

impl ExportConfig {
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            scale: self.scale,
            background: self.background,
            allow_cross_origin: self.allow_cross_origin,
            min_width_px: self.min_capture_width_px,
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            narrow_min_height_mm: self.narrow_min_height_mm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(Error::Config(format!("scale must be positive, got {}", self.scale)));
        }
        if !(self.narrow_min_height_mm.is_finite() && self.narrow_min_height_mm >= 0.0) {
            return Err(Error::Config(format!(
                "narrow_min_height_mm must be non-negative, got {}",
                self.narrow_min_height_mm
            )));
        }
        Ok(())
    }
}

/// Configuration for the print pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    /// How long to let the frame lay out before printing
    pub settle: SettlePolicy,
    /// Delay between invoking print and removing the frame
    pub removal_delay_ms: u64,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            settle: SettlePolicy::default(),
            removal_delay_ms: 1000,
        }
    }
}

/// Aggregate configuration, loadable from JSON
///
/// ```
/// let cfg = revendis_export::Config::from_json_str(r#"{ "export": { "scale": 3.0 } }"#).unwrap();
/// assert_eq!(cfg.export.scale, 3.0);
/// assert_eq!(cfg.print.removal_delay_ms, 1000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub export: ExportConfig,
    pub print: PrintConfig,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        cfg.export.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }
}
