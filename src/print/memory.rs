//! In-memory print host
//!
//! Models the host page as a set of attached frames with their written
//! documents, and records every call with a timestamp from the tokio clock so
//! tests can assert ordering and timing under a paused runtime.

use crate::error::{Error, Result};
use crate::print::surface::{FrameStyle, PrintHost, SurfaceId};
use log::warn;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Host call kinds, in the order a successful print makes them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Attach,
    Write,
    Focus,
    Print,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    pub surface: SurfaceId,
    pub call: HostCall,
    pub at: Instant,
}

#[derive(Debug)]
struct Frame {
    style: FrameStyle,
    polls: u32,
}

#[derive(Debug, Default)]
struct HostState {
    next_id: u64,
    frames: BTreeMap<SurfaceId, Frame>,
    // kept after removal so tests can inspect what was printed
    documents: HashMap<SurfaceId, String>,
    events: Vec<HostEvent>,
}

/// A [`PrintHost`] that keeps the page in memory.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
    deny_document_access: bool,
    ready_after_polls: Option<u32>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose frames never expose a writable document.
    pub fn denying_document_access() -> Self {
        Self {
            deny_document_access: true,
            ..Self::default()
        }
    }

    /// Report frames ready from the `polls`-th readiness query on. Without
    /// this the host never signals readiness.
    pub fn ready_after(mut self, polls: u32) -> Self {
        self.ready_after_polls = Some(polls);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(state: &mut HostState, surface: SurfaceId, call: HostCall) {
        state.events.push(HostEvent {
            surface,
            call,
            at: Instant::now(),
        });
    }

    fn require_frame(state: &HostState, id: SurfaceId) -> Result<()> {
        if state.frames.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::Host(format!("{} is not attached", id)))
        }
    }

    /// Currently attached frames
    pub fn attached(&self) -> Vec<SurfaceId> {
        self.lock().frames.keys().copied().collect()
    }

    pub fn frame_style(&self, id: SurfaceId) -> Option<FrameStyle> {
        self.lock().frames.get(&id).map(|f| f.style.clone())
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.lock().events.clone()
    }

    pub fn events_for(&self, id: SurfaceId) -> Vec<HostEvent> {
        self.lock().events.iter().filter(|e| e.surface == id).cloned().collect()
    }

    fn count(&self, call: HostCall) -> usize {
        self.lock().events.iter().filter(|e| e.call == call).count()
    }

    pub fn print_count(&self) -> usize {
        self.count(HostCall::Print)
    }

    pub fn removal_count(&self) -> usize {
        self.count(HostCall::Remove)
    }

    /// The raw document last written into `id`
    pub fn document(&self, id: SurfaceId) -> Option<String> {
        self.lock().documents.get(&id).cloned()
    }

    /// Inner markup of the written document's `<body>`, as the parser sees it
    pub fn body_html(&self, id: SurfaceId) -> Option<String> {
        let raw = self.document(id)?;
        let document = Html::parse_document(&raw);
        let body = Selector::parse("body").ok()?;
        document.select(&body).next().map(|n| n.inner_html().trim().to_string())
    }

    /// Concatenated text of every `<style>` element in the written document
    pub fn style_text(&self, id: SurfaceId) -> Option<String> {
        let raw = self.document(id)?;
        let document = Html::parse_document(&raw);
        let style = Selector::parse("style").ok()?;
        Some(
            document
                .select(&style)
                .map(|n| n.text().collect::<String>())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn detach(&self, id: SurfaceId) -> Result<()> {
        let mut state = self.lock();
        if state.frames.remove(&id).is_none() {
            return Err(Error::Host(format!("{} is not attached", id)));
        }
        Self::record(&mut state, id, HostCall::Remove);
        Ok(())
    }

    fn touch(&self, id: SurfaceId, call: HostCall) -> Result<()> {
        let mut state = self.lock();
        Self::require_frame(&state, id)?;
        Self::record(&mut state, id, call);
        Ok(())
    }
}

impl PrintHost for InMemoryHost {
    async fn attach_frame(&self, style: &FrameStyle) -> Result<SurfaceId> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = SurfaceId(state.next_id);
        state.frames.insert(
            id,
            Frame {
                style: style.clone(),
                polls: 0,
            },
        );
        Self::record(&mut state, id, HostCall::Attach);
        Ok(id)
    }

    async fn has_document(&self, id: SurfaceId) -> bool {
        !self.deny_document_access && self.lock().frames.contains_key(&id)
    }

    async fn write_document(&self, id: SurfaceId, html: &str) -> Result<()> {
        let mut state = self.lock();
        Self::require_frame(&state, id)?;
        state.documents.insert(id, html.to_string());
        Self::record(&mut state, id, HostCall::Write);
        Ok(())
    }

    async fn is_ready(&self, id: SurfaceId) -> bool {
        let Some(threshold) = self.ready_after_polls else {
            return false;
        };
        let mut state = self.lock();
        match state.frames.get_mut(&id) {
            Some(frame) => {
                frame.polls += 1;
                frame.polls >= threshold
            }
            None => false,
        }
    }

    async fn focus(&self, id: SurfaceId) -> Result<()> {
        self.touch(id, HostCall::Focus)
    }

    async fn print(&self, id: SurfaceId) -> Result<()> {
        self.touch(id, HostCall::Print)
    }

    async fn remove_frame(&self, id: SurfaceId) -> Result<()> {
        self.detach(id)
    }

    fn release_frame(&self, id: SurfaceId) {
        if let Err(e) = self.detach(id) {
            warn!("failed to release {}: {}", id, e);
        }
    }
}
