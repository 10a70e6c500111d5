//! lopdf-backed implementation of the document assembly primitive
//!
//! Each page gets its own compressed content stream. Rasters are decoded once,
//! flattened onto white (PDF image XObjects carry no alpha here) and stored as
//! a single Flate-compressed image XObject, however many pages reference it.

use crate::document::{DocumentAssembler, Orientation, PageSize, PaginatedDocument, Placement, Unit};
use crate::error::AssemblyError;
use crate::rendering::raster::{decode_png, flatten};
use crate::rendering::{CapturedRaster, Rgb};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use log::debug;
use std::collections::HashMap;
use std::io::Write;

/// Produces [`PdfDocument`]s.
#[derive(Debug, Clone, Copy)]
pub struct PdfAssembler {
    compression: Compression,
}

impl PdfAssembler {
    pub fn new() -> Self {
        Self {
            compression: Compression::default(),
        }
    }

    pub fn with_compression(level: u32) -> Self {
        Self {
            compression: Compression::new(level.min(9)),
        }
    }
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler for PdfAssembler {
    type Document = PdfDocument;

    fn new_document(
        &self,
        orientation: Orientation,
        unit: Unit,
        page_size: PageSize,
    ) -> Result<PdfDocument, AssemblyError> {
        page_size.validate()?;
        let page = page_size.oriented(orientation);
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();

        Ok(PdfDocument {
            document,
            pages_id,
            unit,
            page_width_pt: unit.to_points(page.width),
            page_height_pt: unit.to_points(page.height),
            compression: self.compression,
            pages: vec![PageContent::default()],
            images: HashMap::new(),
        })
    }
}

#[derive(Default)]
struct PageContent {
    operations: Vec<Operation>,
    xobjects: Vec<(String, ObjectId)>,
}

/// A PDF under construction.
pub struct PdfDocument {
    document: Document,
    pages_id: ObjectId,
    unit: Unit,
    page_width_pt: f64,
    page_height_pt: f64,
    compression: Compression,
    pages: Vec<PageContent>,
    images: HashMap<[u8; 32], (String, ObjectId)>,
}

impl PdfDocument {
    /// Page size in points as written to every MediaBox
    pub fn page_size_pt(&self) -> (f64, f64) {
        (self.page_width_pt, self.page_height_pt)
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, AssemblyError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.compression);
        encoder
            .write_all(data)
            .map_err(|e| AssemblyError::Pdf(format!("compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| AssemblyError::Pdf(format!("compression failed: {}", e)))
    }

    /// Embed the raster (once per distinct payload) and return its resource name.
    fn image_xobject(&mut self, image: &CapturedRaster) -> Result<(String, ObjectId), AssemblyError> {
        let key = image.digest();
        if let Some(entry) = self.images.get(&key) {
            return Ok(entry.clone());
        }

        let decoded = decode_png(&image.png_data)?;
        let (width, height) = decoded.dimensions();
        if width != image.width || height != image.height {
            return Err(AssemblyError::InvalidRaster(format!(
                "raster declares {}x{} but payload is {}x{}",
                image.width, image.height, width, height
            )));
        }
        let rgb = flatten(&decoded, Rgb::WHITE);
        let compressed = self.compress(rgb.as_raw())?;

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            compressed,
        );
        let id = self.document.add_object(stream);
        let name = format!("Im{}", self.images.len());
        debug!(
            "embedded {}x{} raster as /{} ({})",
            width,
            height,
            name,
            hex::encode(&key[..6])
        );
        self.images.insert(key, (name.clone(), id));
        Ok((name, id))
    }
}

fn validate_placement(p: &Placement) -> Result<(), AssemblyError> {
    let finite = [p.x, p.y, p.width, p.height].iter().all(|v| v.is_finite());
    if !finite || p.width <= 0.0 || p.height <= 0.0 {
        return Err(AssemblyError::Geometry(format!("unusable placement {:?}", p)));
    }
    Ok(())
}

impl PaginatedDocument for PdfDocument {
    fn add_image(&mut self, image: &CapturedRaster, placement: Placement) -> Result<(), AssemblyError> {
        validate_placement(&placement)?;
        let (name, id) = self.image_xobject(image)?;

        let width = self.unit.to_points(placement.width);
        let height = self.unit.to_points(placement.height);
        let x = self.unit.to_points(placement.x);
        // PDF space has its origin at the bottom-left corner
        let y = self.page_height_pt - self.unit.to_points(placement.y + placement.height);

        let page = self.pages.last_mut().ok_or_else(|| AssemblyError::Pdf("document has no pages".into()))?;
        if !page.xobjects.iter().any(|(n, _)| *n == name) {
            page.xobjects.push((name.clone(), id));
        }
        page.operations.push(Operation::new("q", vec![]));
        page.operations.push(Operation::new(
            "cm",
            vec![
                (width as f32).into(),
                0.into(),
                0.into(),
                (height as f32).into(),
                (x as f32).into(),
                (y as f32).into(),
            ],
        ));
        page.operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        page.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn add_page(&mut self) -> Result<(), AssemblyError> {
        self.pages.push(PageContent::default());
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn finish(mut self) -> Result<Vec<u8>, AssemblyError> {
        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            (self.page_width_pt as f32).into(),
            (self.page_height_pt as f32).into(),
        ];

        let pages = std::mem::take(&mut self.pages);
        let mut kids = Vec::with_capacity(pages.len());
        for page in pages {
            let content = Content {
                operations: page.operations,
            };
            let compressed = self.compress(&content.encode()?)?;
            let content_id = self
                .document
                .add_object(Stream::new(dictionary! { "Filter" => "FlateDecode" }, compressed));

            let mut xobjects = Dictionary::new();
            for (name, id) in page.xobjects {
                xobjects.set(name, id);
            }

            let page_id = self.document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => media_box.clone(),
                "Contents" => content_id,
                "Resources" => dictionary! { "XObject" => xobjects },
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.document
            .save_to(&mut out)
            .map_err(|e| AssemblyError::Pdf(format!("failed to write PDF: {}", e)))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::layout::{plan_pages, PageFormat, PlanOptions};
    use crate::rendering::raster::{encode_rgb_png, RgbImage};

    fn raster(width: u32, height: u32) -> CapturedRaster {
        let rgb = RgbImage::from_pixel(width, height, image::Rgb([200, 200, 200]));
        CapturedRaster::new(width, height, encode_rgb_png(&rgb).unwrap())
    }

    /// Assemble `raster` per its plan and read back every page's MediaBox in mm.
    fn media_boxes_mm(raster: &CapturedRaster, format: PageFormat) -> Vec<(f64, f64)> {
        let plan = plan_pages(raster.width, raster.height, format, &PlanOptions::default()).unwrap();
        let bytes = crate::exporter::assemble(&PdfAssembler::new(), raster, &plan).unwrap();
        let parsed = Document::load_mem(&bytes).unwrap();
        parsed
            .get_pages()
            .values()
            .map(|id| {
                let page = parsed.get_object(*id).unwrap().as_dict().unwrap();
                let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
                let to_mm = |o: &Object| o.as_float().unwrap() as f64 * 25.4 / 72.0;
                (to_mm(&mb[2]), to_mm(&mb[3]))
            })
            .collect()
    }

    fn a4() -> PdfDocument {
        PdfAssembler::new()
            .new_document(Orientation::Portrait, Unit::Mm, PageSize::new(210.0, 297.0))
            .unwrap()
    }

    #[test]
    fn a4_page_size_in_points() {
        let doc = a4();
        let (w, h) = doc.page_size_pt();
        assert!((w - 595.2756).abs() < 1e-3);
        assert!((h - 841.8898).abs() < 1e-3);
    }

    #[test]
    fn writes_pdf_with_one_page_per_add_page() {
        let mut doc = a4();
        let img = raster(4, 8);
        let placement = Placement { x: 0.0, y: 0.0, width: 210.0, height: 420.0 };
        doc.add_image(&img, placement).unwrap();
        doc.add_page().unwrap();
        doc.add_image(&img, Placement { y: -297.0, ..placement }).unwrap();
        assert_eq!(doc.page_count(), 2);
        // the same payload is embedded once
        assert_eq!(doc.images.len(), 1);

        let bytes = doc.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 2);
    }

    #[test]
    fn mismatched_raster_header_is_rejected() {
        let mut doc = a4();
        let mut img = raster(4, 8);
        img.width = 5;
        let err = doc
            .add_image(&img, Placement { x: 0.0, y: 0.0, width: 10.0, height: 10.0 })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidRaster(_)));
    }

    #[test]
    fn non_finite_placement_is_rejected() {
        let mut doc = a4();
        let err = doc
            .add_image(&raster(1, 1), Placement { x: 0.0, y: f64::NAN, width: 10.0, height: 10.0 })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Geometry(_)));
    }

    #[test]
    fn wide_receipt_keeps_the_requested_width() {
        // 600x400 raster on thermal-80: 80 x 53.33mm, wider than tall
        let boxes = media_boxes_mm(&raster(600, 400), PageFormat::Narrow80);
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].0 - 80.0).abs() < 0.01, "{:?}", boxes);
        assert!((boxes[0].1 - 53.333).abs() < 0.01, "{:?}", boxes);
    }

    #[test]
    fn short_receipt_is_raised_to_minimum_height_at_full_width() {
        // 400x40 raster on thermal-58: 5.8mm of image on a 58 x 20mm page
        let boxes = media_boxes_mm(&raster(400, 40), PageFormat::Narrow58);
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].0 - 58.0).abs() < 0.01, "{:?}", boxes);
        assert!((boxes[0].1 - 20.0).abs() < 0.01, "{:?}", boxes);
    }

    #[test]
    fn landscape_documents_swap_page_axes() {
        let doc = PdfAssembler::new()
            .new_document(Orientation::Landscape, Unit::Mm, PageSize::new(210.0, 297.0))
            .unwrap();
        let (w, h) = doc.page_size_pt();
        assert!(w > h);
    }

    #[test]
    fn zero_sized_page_is_rejected() {
        let res = PdfAssembler::new().new_document(Orientation::Portrait, Unit::Mm, PageSize::new(58.0, 0.0));
        assert!(matches!(res, Err(AssemblyError::Geometry(_))));
    }
}
