//! Page arithmetic for rasterized exports
//!
//! Full-page exports fill the width of an A4 sheet and slice tall captures into
//! consecutive pages. Receipt exports produce a single page cut to the image.

use crate::document::{Orientation, PageSize, Placement, Unit};
use crate::error::AssemblyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const A4_WIDTH_MM: f64 = 210.0;
pub const A4_HEIGHT_MM: f64 = 297.0;
pub const NARROW_80_WIDTH_MM: f64 = 80.0;
pub const NARROW_58_WIDTH_MM: f64 = 58.0;

/// Images within this distance of a page boundary count as fitting on the page.
const FIT_TOLERANCE_MM: f64 = 1e-6;

/// Physical layout of an exported document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageFormat {
    /// ISO A4 portrait, paginated
    #[serde(rename = "a4", alias = "full-page")]
    FullPage,
    /// 80mm thermal receipt roll, single page
    #[serde(rename = "thermal-80", alias = "narrow-80")]
    Narrow80,
    /// 58mm thermal receipt roll, single page
    #[serde(rename = "thermal-58", alias = "narrow-58")]
    Narrow58,
}

impl PageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageFormat::FullPage => "a4",
            PageFormat::Narrow80 => "thermal-80",
            PageFormat::Narrow58 => "thermal-58",
        }
    }

    /// Fixed paper width in millimetres
    pub fn width_mm(&self) -> f64 {
        match self {
            PageFormat::FullPage => A4_WIDTH_MM,
            PageFormat::Narrow80 => NARROW_80_WIDTH_MM,
            PageFormat::Narrow58 => NARROW_58_WIDTH_MM,
        }
    }

    pub fn is_narrow(&self) -> bool {
        !matches!(self, PageFormat::FullPage)
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" | "full-page" => Ok(PageFormat::FullPage),
            "thermal-80" | "narrow-80" | "80" => Ok(PageFormat::Narrow80),
            "thermal-58" | "narrow-58" | "58" => Ok(PageFormat::Narrow58),
            other => Err(format!(
                "unknown page format '{}' (expected a4, thermal-80 or thermal-58)",
                other
            )),
        }
    }
}

/// Tunables for [`plan_pages`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanOptions {
    /// Receipt pages are never shorter than this
    pub narrow_min_height_mm: f64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            narrow_min_height_mm: 20.0,
        }
    }
}

/// The complete geometry of an export: one placement per page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePlan {
    pub format: PageFormat,
    pub orientation: Orientation,
    pub unit: Unit,
    pub page: PageSize,
    pub image_width: f64,
    pub image_height: f64,
    pub placements: Vec<Placement>,
}

impl PagePlan {
    pub fn page_count(&self) -> usize {
        self.placements.len()
    }
}

/// Compute pages and image placements for a raster of the given pixel size.
pub fn plan_pages(
    raster_width: u32,
    raster_height: u32,
    format: PageFormat,
    options: &PlanOptions,
) -> Result<PagePlan, AssemblyError> {
    if raster_width == 0 || raster_height == 0 {
        return Err(AssemblyError::Geometry(format!(
            "cannot place a {}x{} raster",
            raster_width, raster_height
        )));
    }

    let image_width = format.width_mm();
    let image_height = raster_height as f64 * image_width / raster_width as f64;

    let (page, placements) = match format {
        PageFormat::FullPage => {
            let page = PageSize::new(A4_WIDTH_MM, A4_HEIGHT_MM);
            let mut placements = vec![Placement {
                x: 0.0,
                y: 0.0,
                width: image_width,
                height: image_height,
            }];
            let mut remaining = image_height - page.height;
            while remaining > FIT_TOLERANCE_MM {
                placements.push(Placement {
                    x: 0.0,
                    y: -(placements.len() as f64) * page.height,
                    width: image_width,
                    height: image_height,
                });
                remaining -= page.height;
            }
            (page, placements)
        }
        PageFormat::Narrow80 | PageFormat::Narrow58 => {
            let page = PageSize::new(image_width, image_height.max(options.narrow_min_height_mm));
            let placement = Placement {
                x: 0.0,
                y: 0.0,
                width: image_width,
                height: image_height,
            };
            (page, vec![placement])
        }
    };

    Ok(PagePlan {
        format,
        orientation: Orientation::Portrait,
        unit: Unit::Mm,
        page,
        image_width,
        image_height,
        placements,
    })
}
