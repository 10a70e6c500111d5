//! Paginated-document assembly primitive
//!
//! The exporter only speaks to these traits; [`crate::pdf::PdfAssembler`] is
//! the lopdf-backed implementation used in production.

use crate::error::AssemblyError;
use crate::rendering::CapturedRaster;
use serde::Serialize;

/// Page orientation requested when a document is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Unit used for page sizes and placements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mm,
    Pt,
}

impl Unit {
    /// Convert a length in this unit into PDF points.
    pub fn to_points(self, value: f64) -> f64 {
        match self {
            Unit::Mm => value * 72.0 / 25.4,
            Unit::Pt => value,
        }
    }
}

/// Physical page size, expressed in the document's unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Page size as laid out for `orientation`. Portrait keeps the size as
    /// given, whatever its aspect ratio; landscape swaps the axes.
    pub fn oriented(self, orientation: Orientation) -> Self {
        match orientation {
            Orientation::Portrait => self,
            Orientation::Landscape => Self::new(self.height, self.width),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AssemblyError> {
        if !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0 {
            return Err(AssemblyError::Geometry(format!(
                "page size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Where an image lands on the current page. Origin is the top-left corner and
/// `y` grows downwards; negative `y` shifts the image up past the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Factory for new documents.
pub trait DocumentAssembler {
    type Document: PaginatedDocument;

    /// Start a document whose first page has the given size.
    fn new_document(
        &self,
        orientation: Orientation,
        unit: Unit,
        page_size: PageSize,
    ) -> Result<Self::Document, AssemblyError>;
}

/// A document under construction. Images are drawn on the last page.
pub trait PaginatedDocument {
    /// Draw a raster on the current page.
    fn add_image(&mut self, image: &CapturedRaster, placement: Placement) -> Result<(), AssemblyError>;

    /// Append a page with the document's page size and make it current.
    fn add_page(&mut self) -> Result<(), AssemblyError>;

    fn page_count(&self) -> usize;

    /// Serialize the finished document.
    fn finish(self) -> Result<Vec<u8>, AssemblyError>;
}
