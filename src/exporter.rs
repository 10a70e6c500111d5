//! Rasterized-document exporter
//!
//! `export` = capture -> plan -> assemble -> deliver. Every step either
//! succeeds or aborts the whole export before anything reaches the sink, so a
//! failed export never starts a download.

use crate::capture::{ensure_rendered, Capture};
use crate::document::{DocumentAssembler, PaginatedDocument};
use crate::error::{AssemblyError, Error, Result};
use crate::pdf::PdfAssembler;
use crate::rendering::layout::{plan_pages, PageFormat, PagePlan};
use crate::rendering::CapturedRaster;
use crate::sink::DownloadSink;
use crate::ExportConfig;
use base64::Engine as Base64Engine;
use log::{debug, info, warn};

/// One export invocation
#[derive(Debug, Clone)]
pub struct ExportRequest<T> {
    pub target: T,
    pub filename: String,
    pub format: PageFormat,
}

impl<T> ExportRequest<T> {
    pub fn new(target: T, filename: impl Into<String>, format: PageFormat) -> Self {
        Self {
            target,
            filename: filename.into(),
            format,
        }
    }
}

/// A finished document that has not been delivered anywhere
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub plan: PagePlan,
    pub raster_width: u32,
    pub raster_height: u32,
}

impl RenderedDocument {
    /// `data:application/pdf;base64,...`, suitable for an in-page viewer frame
    pub fn to_data_url(&self) -> String {
        format!(
            "data:application/pdf;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// What a successful export handed to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReceipt {
    pub filename: String,
    pub format: PageFormat,
    pub pages: usize,
    pub bytes: usize,
}

/// Lay a raster out according to `plan` and serialize the document.
pub fn assemble<A: DocumentAssembler>(
    assembler: &A,
    raster: &CapturedRaster,
    plan: &PagePlan,
) -> std::result::Result<Vec<u8>, AssemblyError> {
    let mut document = assembler.new_document(plan.orientation, plan.unit, plan.page)?;
    for (index, placement) in plan.placements.iter().enumerate() {
        if index > 0 {
            document.add_page()?;
        }
        document.add_image(raster, *placement)?;
    }
    document.finish()
}

/// Captures a target and emits a paginated document.
pub struct Exporter<C, A, S> {
    capture: C,
    assembler: A,
    sink: S,
    config: ExportConfig,
}

/// Exporter producing PDFs with [`PdfAssembler`]
pub fn pdf_exporter<C: Capture, S: DownloadSink>(capture: C, sink: S) -> Exporter<C, PdfAssembler, S> {
    Exporter::new(capture, PdfAssembler::new(), sink)
}

impl<C, A, S> Exporter<C, A, S>
where
    C: Capture,
    A: DocumentAssembler,
    S: DownloadSink,
{
    pub fn new(capture: C, assembler: A, sink: S) -> Self {
        Self {
            capture,
            assembler,
            sink,
            config: ExportConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Capture the target and build the document without delivering it.
    pub async fn render(&self, target: &C::Target, format: PageFormat) -> Result<RenderedDocument> {
        self.config.validate()?;
        let raster = self.capture.capture(target, &self.config.capture_options()).await?;
        ensure_rendered(&raster)?;
        for resource in &raster.blocked_resources {
            warn!("cross-origin resource rendered blank: {}", resource);
        }

        let plan = plan_pages(raster.width, raster.height, format, &self.config.plan_options())?;
        debug!(
            "planned {} page(s) of {}x{}mm for {}x{} raster ({})",
            plan.page_count(),
            plan.page.width,
            plan.page.height,
            raster.width,
            raster.height,
            format
        );

        let bytes = assemble(&self.assembler, &raster, &plan)?;
        Ok(RenderedDocument {
            bytes,
            plan,
            raster_width: raster.width,
            raster_height: raster.height,
        })
    }

    /// Render and return a data URL instead of downloading.
    pub async fn preview_url(&self, target: &C::Target, format: PageFormat) -> Result<String> {
        Ok(self.render(target, format).await?.to_data_url())
    }

    /// Capture, assemble, and hand the document to the sink under `request.filename`.
    pub async fn export(&self, request: &ExportRequest<C::Target>) -> Result<ExportReceipt> {
        if request.filename.trim().is_empty() {
            return Err(Error::InvalidRequest("filename must not be empty".into()));
        }

        let rendered = self.render(&request.target, request.format).await?;
        self.sink
            .deliver(&request.filename, &rendered.bytes)
            .map_err(|source| Error::Delivery {
                filename: request.filename.clone(),
                source,
            })?;

        info!(
            "exported {} ({}, {} page(s))",
            request.filename,
            request.format,
            rendered.plan.page_count()
        );
        Ok(ExportReceipt {
            filename: request.filename.clone(),
            format: request.format,
            pages: rendered.plan.page_count(),
            bytes: rendered.bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureOptions;
    use crate::document::{Orientation, PageSize, Placement, Unit};
    use crate::error::CaptureError;
    use crate::sink::MemorySink;
    use std::sync::Mutex;

    /// Capture double returning a fixed-size raster without pixel data.
    struct SizedCapture;

    impl Capture for SizedCapture {
        type Target = (u32, u32);

        async fn capture(&self, target: &(u32, u32), options: &CaptureOptions) -> std::result::Result<CapturedRaster, CaptureError> {
            let (w, h) = *target;
            Ok(CapturedRaster::new(
                (w as f32 * options.scale) as u32,
                (h as f32 * options.scale) as u32,
                Vec::new(),
            ))
        }
    }

    #[derive(Default)]
    struct Recorder {
        pages: Mutex<Vec<(PageSize, Vec<Placement>)>>,
    }

    struct RecordingDocument<'a> {
        recorder: &'a Recorder,
        page: PageSize,
        placements: Vec<Placement>,
        pages: usize,
    }

    impl<'r> DocumentAssembler for &'r Recorder {
        type Document = RecordingDocument<'r>;

        fn new_document(&self, _o: Orientation, _u: Unit, page_size: PageSize) -> std::result::Result<Self::Document, AssemblyError> {
            Ok(RecordingDocument {
                recorder: *self,
                page: page_size,
                placements: Vec::new(),
                pages: 1,
            })
        }
    }

    impl PaginatedDocument for RecordingDocument<'_> {
        fn add_image(&mut self, _image: &CapturedRaster, placement: Placement) -> std::result::Result<(), AssemblyError> {
            self.placements.push(placement);
            Ok(())
        }

        fn add_page(&mut self) -> std::result::Result<(), AssemblyError> {
            self.pages += 1;
            Ok(())
        }

        fn page_count(&self) -> usize {
            self.pages
        }

        fn finish(self) -> std::result::Result<Vec<u8>, AssemblyError> {
            self.recorder.pages.lock().unwrap().push((self.page, self.placements));
            Ok(vec![self.pages as u8])
        }
    }

    #[tokio::test]
    async fn full_page_export_paginates_tall_capture() {
        let recorder = Recorder::default();
        let exporter = Exporter::new(SizedCapture, &recorder, MemorySink::new());
        let receipt = exporter
            .export(&ExportRequest::new((800, 2000), "report.pdf", PageFormat::FullPage))
            .await
            .unwrap();

        assert_eq!(receipt.pages, 2);
        let recorded = recorder.pages.lock().unwrap();
        assert_eq!(recorded[0].0, PageSize::new(210.0, 297.0));
        assert_eq!(recorded[0].1.len(), 2);
        assert_eq!(exporter.sink().downloads()[0].bytes, vec![2]);
    }

    #[tokio::test]
    async fn empty_filename_is_rejected_before_capture() {
        let recorder = Recorder::default();
        let exporter = Exporter::new(SizedCapture, &recorder, MemorySink::new());
        let err = exporter
            .export(&ExportRequest::new((10, 10), "  ", PageFormat::FullPage))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(recorder.pages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_sized_capture_never_reaches_the_sink() {
        let recorder = Recorder::default();
        let exporter = Exporter::new(SizedCapture, &recorder, MemorySink::new());
        let err = exporter
            .export(&ExportRequest::new((0, 10), "x.pdf", PageFormat::Narrow58))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture(CaptureError::ZeroSize { .. })));
        assert!(exporter.sink().is_empty());
    }
}
