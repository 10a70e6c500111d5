//! Chrome DevTools Protocol backend
//!
//! Drives a headless Chrome tab (via the `headless_chrome` crate) for both
//! halves of the crate: [`CdpCapture`] screenshots a DOM element for the
//! exporter and [`CdpPrintHost`] manages print frames inside the page.

use crate::capture::{Capture, CaptureOptions};
use crate::error::{CaptureError, Error, Result};
use crate::print::surface::{FrameStyle, PrintHost, SurfaceId};
use crate::rendering::raster::{decode_png, encode_rgb_png, flatten};
use crate::rendering::CapturedRaster;
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, Element, LaunchOptions};
use log::{debug, warn};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

/// A headless Chrome instance with one tab
pub struct CdpSession {
    // kept alive for as long as the tab is in use
    _browser: Browser,
    tab: Arc<Tab>,
}

impl CdpSession {
    /// Launch Chrome with a `width` x `height` window.
    pub fn launch(width: u32, height: u32) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((width, height)))
            .build()
            .map_err(|e| Error::Host(format!("Failed to build launch options: {}", e)))?;

        let browser =
            Browser::new(launch_options).map_err(|e| Error::Host(format!("Failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| Error::Host(format!("Failed to create tab: {}", e)))?;

        Ok(Self { _browser: browser, tab })
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    pub fn load_url(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::Host(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Host(format!("Wait for navigation failed: {}", e)))?;
        Ok(())
    }

    /// Load a standalone HTML document into the tab.
    pub fn load_html(&self, html: &str) -> Result<()> {
        let url = format!(
            "data:text/html;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(html.as_bytes())
        );
        self.load_url(&url)
    }
}

/// Screenshots the element matched by a CSS selector.
#[derive(Clone)]
pub struct CdpCapture {
    session: Arc<CdpSession>,
}

impl CdpCapture {
    pub fn new(session: Arc<CdpSession>) -> Self {
        Self { session }
    }
}

// images inside the element that loaded with no pixels (refused cross-origin
// reads, broken links)
const BLANK_IMAGES_JS: &str = r#"
(function(sel) {
    const root = document.querySelector(sel);
    if (!root) { return []; }
    return Array.from(root.querySelectorAll('img'))
        .filter(img => img.complete && img.naturalWidth === 0)
        .map(img => img.currentSrc || img.src);
})"#;

// sets the element's inline min-width and returns the previous value
const WIDEN_JS: &str = r#"
(function(sel, width) {
    const el = document.querySelector(sel);
    if (!el) { return null; }
    const previous = el.style.minWidth;
    el.style.minWidth = width;
    return previous;
})"#;

fn set_min_width(tab: &Tab, selector_js: &str, value: &str) -> std::result::Result<Option<String>, CaptureError> {
    let value_js = serde_json::to_string(value).map_err(|e| CaptureError::Renderer(e.to_string()))?;
    let result = tab
        .evaluate(&format!("{}({}, {})", WIDEN_JS, selector_js, value_js), false)
        .map_err(|e| CaptureError::Renderer(format!("Failed to set min-width: {}", e)))?;
    Ok(result.value.and_then(|v| v.as_str().map(str::to_string)))
}

fn capture_element(tab: &Tab, selector: &str, options: &CaptureOptions) -> std::result::Result<CapturedRaster, CaptureError> {
    let element = tab
        .find_element(selector)
        .map_err(|_| CaptureError::Detached(selector.to_string()))?;

    if options.min_width_px == 0 {
        return screenshot_element(tab, &element, selector, options);
    }

    let selector_js = serde_json::to_string(selector).map_err(|e| CaptureError::Renderer(e.to_string()))?;
    let previous = set_min_width(tab, &selector_js, &format!("{}px", options.min_width_px))?.unwrap_or_default();
    let captured = screenshot_element(tab, &element, selector, options);
    // the page is left as the caller laid it out, whatever the capture outcome
    if let Err(e) = set_min_width(tab, &selector_js, &previous) {
        warn!("could not restore min-width of '{}': {}", selector, e);
    }
    captured
}

fn screenshot_element(
    tab: &Tab,
    element: &Element<'_>,
    selector: &str,
    options: &CaptureOptions,
) -> std::result::Result<CapturedRaster, CaptureError> {
    let model = element
        .get_box_model()
        .map_err(|e| CaptureError::Renderer(format!("Box model unavailable: {}", e)))?;
    let mut viewport = model.border_viewport();
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        return Err(CaptureError::ZeroSize {
            width: viewport.width.max(0.0) as u32,
            height: viewport.height.max(0.0) as u32,
        });
    }
    viewport.scale = options.scale as f64;

    let shot = tab
        .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(viewport), true)
        .map_err(|e| CaptureError::Renderer(format!("Screenshot failed: {}", e)))?;
    let image = decode_png(&shot).map_err(|e| CaptureError::Renderer(e.to_string()))?;
    let rgb = flatten(&image, options.background);
    let png_data = encode_rgb_png(&rgb).map_err(|e| CaptureError::Renderer(format!("PNG encoding failed: {}", e)))?;

    let mut raster = CapturedRaster::new(rgb.width(), rgb.height(), png_data);
    if options.allow_cross_origin {
        raster.blocked_resources = blank_images(tab, selector);
    }
    debug!("captured '{}' ({}x{})", selector, raster.width, raster.height);
    Ok(raster)
}

fn blank_images(tab: &Tab, selector: &str) -> Vec<String> {
    let Ok(selector_js) = serde_json::to_string(selector) else {
        return Vec::new();
    };
    match tab.evaluate(&format!("{}({})", BLANK_IMAGES_JS, selector_js), false) {
        Ok(result) => result
            .value
            .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
            .unwrap_or_default(),
        Err(e) => {
            warn!("could not list images of '{}': {}", selector, e);
            Vec::new()
        }
    }
}

impl Capture for CdpCapture {
    type Target = String;

    async fn capture(&self, selector: &String, options: &CaptureOptions) -> std::result::Result<CapturedRaster, CaptureError> {
        let tab = Arc::clone(self.session.tab());
        let selector = selector.clone();
        let options = options.clone();
        // headless_chrome is synchronous; keep it off the async workers
        tokio::task::spawn_blocking(move || capture_element(&tab, &selector, &options))
            .await
            .map_err(|e| CaptureError::Renderer(format!("capture task failed: {}", e)))?
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum FrameCommand {
    Attach(FrameStyle, Reply<SurfaceId>),
    HasDocument(SurfaceId, oneshot::Sender<bool>),
    Write(SurfaceId, String, Reply<()>),
    IsReady(SurfaceId, oneshot::Sender<bool>),
    Focus(SurfaceId, Reply<()>),
    Print(SurfaceId, Reply<()>),
    // no reply channel when released from a Drop
    Remove(SurfaceId, Option<Reply<()>>),
}

/// Print frames inside the session's page, driven through `Runtime.evaluate`.
///
/// CDP calls block, so a dedicated worker thread owns the tab side and async
/// callers talk to it over a channel. The thread exits once every handle is
/// dropped.
#[derive(Clone)]
pub struct CdpPrintHost {
    cmd_tx: Sender<FrameCommand>,
}

impl CdpPrintHost {
    pub fn new(session: Arc<CdpSession>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<FrameCommand>();
        thread::spawn(move || {
            let mut frames = FrameDriver { session, next_id: 0 };
            while let Ok(cmd) = cmd_rx.recv() {
                frames.handle(cmd);
            }
            debug!("print frame worker stopped");
        });
        Self { cmd_tx }
    }

    async fn call<T>(&self, what: &str, make: impl FnOnce(Reply<T>) -> FrameCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| Error::Host(format!("{}: print frame worker is gone", what)))?;
        rx.await
            .map_err(|e| Error::Host(format!("{} canceled: {}", what, e)))?
    }

    async fn ask(&self, make: impl FnOnce(oneshot::Sender<bool>) -> FrameCommand) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(make(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Worker-side state: runs the frame scripts against the tab.
struct FrameDriver {
    session: Arc<CdpSession>,
    next_id: u64,
}

impl FrameDriver {
    fn handle(&mut self, cmd: FrameCommand) {
        match cmd {
            FrameCommand::Attach(style, resp) => {
                let _ = resp.send(self.attach(&style));
            }
            FrameCommand::HasDocument(id, resp) => {
                let res = self
                    .with_frame(id, "return !!(f.contentWindow && f.contentWindow.document);")
                    .unwrap_or(false);
                let _ = resp.send(res);
            }
            FrameCommand::Write(id, html, resp) => {
                let _ = resp.send(self.write(id, &html));
            }
            FrameCommand::IsReady(id, resp) => {
                let res = self
                    .with_frame(id, "return f.contentWindow.document.readyState === 'complete';")
                    .unwrap_or(false);
                let _ = resp.send(res);
            }
            FrameCommand::Focus(id, resp) => {
                let _ = resp.send(self.require(id, "f.contentWindow.focus(); return true;", "focus"));
            }
            FrameCommand::Print(id, resp) => {
                let _ = resp.send(self.require(id, "f.contentWindow.print(); return true;", "print"));
            }
            FrameCommand::Remove(id, resp) => {
                let res = self.require(id, "f.remove(); return true;", "removal");
                match resp {
                    Some(resp) => {
                        let _ = resp.send(res);
                    }
                    None => {
                        if let Err(e) = res {
                            warn!("failed to release {}: {}", id, e);
                        }
                    }
                }
            }
        }
    }

    fn eval(&self, js: &str) -> Result<serde_json::Value> {
        let result = self
            .session
            .tab()
            .evaluate(js, false)
            .map_err(|e| Error::Host(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Evaluate `body` with `f` bound to the frame element; expects a boolean.
    fn with_frame(&self, id: SurfaceId, body: &str) -> Result<bool> {
        let js = format!(
            "(function() {{ const f = document.getElementById('{}'); if (!f) {{ return false; }} try {{ {} }} catch (e) {{ return false; }} }})()",
            id, body
        );
        Ok(self.eval(&js)?.as_bool().unwrap_or(false))
    }

    fn require(&self, id: SurfaceId, body: &str, what: &str) -> Result<()> {
        if self.with_frame(id, body)? {
            Ok(())
        } else {
            Err(Error::Host(format!("{}: {} failed", id, what)))
        }
    }

    fn attach(&mut self, style: &FrameStyle) -> Result<SurfaceId> {
        self.next_id += 1;
        let id = SurfaceId(self.next_id);
        let js = format!(
            "(function() {{ const f = document.createElement('iframe'); f.id = '{}'; f.style.cssText = '{}'; {} document.body.appendChild(f); return true; }})()",
            id,
            style.to_css(),
            if style.aria_hidden { "f.setAttribute('aria-hidden', 'true');" } else { "" }
        );
        if self.eval(&js)?.as_bool() != Some(true) {
            return Err(Error::Host(format!("{}: could not attach frame", id)));
        }
        Ok(id)
    }

    fn write(&self, id: SurfaceId, html: &str) -> Result<()> {
        let html_js = serde_json::to_string(html).map_err(|e| Error::Host(e.to_string()))?;
        let body = format!(
            "const d = f.contentWindow.document; d.open(); d.write({}); d.close(); return true;",
            html_js
        );
        self.require(id, &body, "document write")
    }
}

impl PrintHost for CdpPrintHost {
    async fn attach_frame(&self, style: &FrameStyle) -> Result<SurfaceId> {
        let style = style.clone();
        self.call("attach", |tx| FrameCommand::Attach(style, tx)).await
    }

    async fn has_document(&self, id: SurfaceId) -> bool {
        self.ask(|tx| FrameCommand::HasDocument(id, tx)).await
    }

    async fn write_document(&self, id: SurfaceId, html: &str) -> Result<()> {
        let html = html.to_string();
        self.call("document write", |tx| FrameCommand::Write(id, html, tx)).await
    }

    async fn is_ready(&self, id: SurfaceId) -> bool {
        self.ask(|tx| FrameCommand::IsReady(id, tx)).await
    }

    async fn focus(&self, id: SurfaceId) -> Result<()> {
        self.call("focus", |tx| FrameCommand::Focus(id, tx)).await
    }

    async fn print(&self, id: SurfaceId) -> Result<()> {
        self.call("print", |tx| FrameCommand::Print(id, tx)).await
    }

    async fn remove_frame(&self, id: SurfaceId) -> Result<()> {
        self.call("removal", |tx| FrameCommand::Remove(id, Some(tx))).await
    }

    fn release_frame(&self, id: SurfaceId) {
        if self.cmd_tx.send(FrameCommand::Remove(id, None)).is_err() {
            warn!("failed to release {}: print frame worker is gone", id);
        }
    }
}
