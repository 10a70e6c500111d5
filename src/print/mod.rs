//! Browser-print pipeline
//!
//! Prints an arbitrary markup fragment through the host's native print
//! facility without touching the visible page: the markup is written into a
//! hidden [`EphemeralSurface`], printed from there, and the surface is removed
//! shortly afterwards.

pub mod memory;
pub mod surface;

pub use surface::{EphemeralSurface, FrameStyle, PendingRemoval, PrintHost, SurfaceId, SurfaceState};

use crate::error::{Error, Result};
use crate::PrintConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One print invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrintRequest {
    /// Body markup
    pub html: String,
    /// Styles applied on screen and in print
    pub styles: String,
    /// Styles scoped to `@media print`
    pub page_style: String,
}

impl PrintRequest {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = styles.into();
        self
    }

    pub fn with_page_style(mut self, page_style: impl Into<String>) -> Self {
        self.page_style = page_style.into();
        self
    }
}

/// How the pipeline waits for the surface to finish layout before printing.
///
/// Load events are unreliable for documents written through `document.write`,
/// so the default is a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Sleep for a fixed time
    Fixed { delay_ms: u64 },
    /// Poll the host's readiness signal every `interval_ms`, printing at
    /// `timeout_ms` at the latest
    PollReady { interval_ms: u64, timeout_ms: u64 },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Fixed { delay_ms: 150 }
    }
}

/// Build the complete document written into the surface.
///
/// Caller markup and styles are inserted verbatim; the host's HTML parser is
/// expected to absorb malformed fragments.
pub fn compose_print_document(request: &PrintRequest) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <style>
      {styles}
      @media print {{
        {page_style}
      }}
    </style>
  </head>
  <body>
    {html}
  </body>
</html>"#,
        styles = request.styles,
        page_style = request.page_style,
        html = request.html
    )
}

/// Result of a print call. Neither variant is an error: a host that denies
/// document access makes printing a silent no-op.
#[derive(Debug)]
pub enum PrintOutcome {
    /// The dialog was requested; the surface is removed at the deadline
    Dispatched(PendingRemoval),
    /// No writable document. Document access can only be checked on an
    /// attached frame, so one was attached and removed again right away,
    /// before anything was written or printed.
    SurfaceUnavailable,
}

impl PrintOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, PrintOutcome::Dispatched(_))
    }
}

/// Prints markup through a [`PrintHost`].
pub struct PrintPipeline<H: PrintHost> {
    host: Arc<H>,
    config: PrintConfig,
}

impl<H: PrintHost> PrintPipeline<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            config: PrintConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PrintConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Print `request`. Resolves right after the dialog is requested; the
    /// surface is removed `removal_delay_ms` later by a background timer.
    ///
    /// The job runs on its own task: dropping the returned future does not
    /// cancel it, the dialog still opens and the surface is still removed.
    pub async fn print(&self, request: &PrintRequest) -> Result<PrintOutcome> {
        let job = run_print_job(
            Arc::clone(&self.host),
            self.config.clone(),
            compose_print_document(request),
        );
        tokio::spawn(job)
            .await
            .map_err(|e| Error::Host(format!("print task failed: {}", e)))?
    }
}

async fn run_print_job<H: PrintHost>(host: Arc<H>, config: PrintConfig, document: String) -> Result<PrintOutcome> {
    let mut surface = EphemeralSurface::create(host).await?;

    if !surface.populate(&document).await? {
        debug!("{}: no writable document, skipping print", surface.id());
        surface.remove().await?;
        return Ok(PrintOutcome::SurfaceUnavailable);
    }

    surface.settle(&config.settle).await?;
    surface.print().await?;
    let pending = surface.schedule_removal(Duration::from_millis(config.removal_delay_ms))?;
    Ok(PrintOutcome::Dispatched(pending))
}
