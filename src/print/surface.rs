//! Ephemeral render surfaces: hidden frames that exist for one print job
//!
//! [`EphemeralSurface`] owns its host handle and walks a fixed, forward-only
//! lifecycle:
//!
//! ```text
//! Created -> Populated -> Settling -> Printing -> PendingRemoval -> Removed
//! ```
//!
//! Early teardown (no writable document, a host failure) jumps straight to
//! `Removed`. A surface dropped before reaching `Removed` hands its frame to
//! [`PrintHost::release_frame`], so an aborted task or a runtime shutdown
//! cannot leak it.

use crate::error::{Error, Result};
use crate::print::SettlePolicy;
use log::{debug, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Host-assigned identifier of an attached frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "print-surface-{}", self.0)
    }
}

/// Inline style of the embedded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStyle {
    pub position: &'static str,
    pub right: u32,
    pub bottom: u32,
    pub width: u32,
    pub height: u32,
    pub border: u32,
    pub aria_hidden: bool,
}

impl FrameStyle {
    /// Zero-size, borderless, pinned to the bottom-right corner, hidden from
    /// assistive technology.
    pub fn hidden() -> Self {
        Self {
            position: "fixed",
            right: 0,
            bottom: 0,
            width: 0,
            height: 0,
            border: 0,
            aria_hidden: true,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.width == 0 && self.height == 0 && self.border == 0 && self.aria_hidden
    }

    pub fn to_css(&self) -> String {
        format!(
            "position:{};right:{}px;bottom:{}px;width:{}px;height:{}px;border:{}",
            self.position, self.right, self.bottom, self.width, self.height, self.border
        )
    }
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self::hidden()
    }
}

/// Document mutation and print primitives offered by the host page.
///
/// Calls are asynchronous so hosts backed by a blocking transport (a CDP
/// connection) can run them off the async workers. All calls for one surface
/// are issued in order by the task that owns it.
pub trait PrintHost: Send + Sync + 'static {
    /// Create an embedded frame with `style` and attach it to the document.
    fn attach_frame(&self, style: &FrameStyle) -> impl Future<Output = Result<SurfaceId>> + Send;

    /// Whether the frame exposes a writable document (false when the host
    /// denies access, e.g. a sandbox or a cross-origin frame).
    fn has_document(&self, id: SurfaceId) -> impl Future<Output = bool> + Send;

    /// Replace the frame's document (open, write, close).
    fn write_document(&self, id: SurfaceId, html: &str) -> impl Future<Output = Result<()>> + Send;

    /// Readiness signal used by [`SettlePolicy::PollReady`]. Hosts without a
    /// reliable signal keep the default and the poll runs to its timeout.
    fn is_ready(&self, _id: SurfaceId) -> impl Future<Output = bool> + Send {
        async { false }
    }

    fn focus(&self, id: SurfaceId) -> impl Future<Output = Result<()>> + Send;

    /// Open the native print dialog for the frame. Returns once the dialog
    /// has been requested, not when the user dismisses it.
    fn print(&self, id: SurfaceId) -> impl Future<Output = Result<()>> + Send;

    fn remove_frame(&self, id: SurfaceId) -> impl Future<Output = Result<()>> + Send;

    /// Start detaching the frame without waiting for the outcome. Used from
    /// `Drop`, where nothing can be awaited; must not block.
    fn release_frame(&self, id: SurfaceId);
}

/// Lifecycle position of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceState {
    Created,
    Populated,
    Settling,
    Printing,
    PendingRemoval,
    Removed,
}

impl SurfaceState {
    /// The only state reachable from `self` on the normal path
    pub fn next(self) -> Option<SurfaceState> {
        match self {
            SurfaceState::Created => Some(SurfaceState::Populated),
            SurfaceState::Populated => Some(SurfaceState::Settling),
            SurfaceState::Settling => Some(SurfaceState::Printing),
            SurfaceState::Printing => Some(SurfaceState::PendingRemoval),
            SurfaceState::PendingRemoval => Some(SurfaceState::Removed),
            SurfaceState::Removed => None,
        }
    }
}

/// A hidden frame owned by exactly one print job.
pub struct EphemeralSurface<H: PrintHost> {
    host: Arc<H>,
    id: SurfaceId,
    state: SurfaceState,
}

impl<H: PrintHost> EphemeralSurface<H> {
    /// Attach a hidden frame to the host document.
    pub async fn create(host: Arc<H>) -> Result<Self> {
        let id = host.attach_frame(&FrameStyle::hidden()).await?;
        debug!("{} created", id);
        Ok(Self {
            host,
            id,
            state: SurfaceState::Created,
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    fn advance(&mut self, to: SurfaceState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(Error::Host(format!(
                "{}: illegal transition {:?} -> {:?}",
                self.id, self.state, to
            )));
        }
        debug!("{}: {:?} -> {:?}", self.id, self.state, to);
        self.state = to;
        Ok(())
    }

    /// Write the document into the frame. Returns `false`, leaving the
    /// surface in `Created`, when the host exposes no writable document.
    pub async fn populate(&mut self, html: &str) -> Result<bool> {
        if self.state != SurfaceState::Created {
            return Err(Error::Host(format!("{}: populate in state {:?}", self.id, self.state)));
        }
        if !self.host.has_document(self.id).await {
            return Ok(false);
        }
        self.host.write_document(self.id, html).await?;
        self.advance(SurfaceState::Populated)?;
        Ok(true)
    }

    /// Wait for the frame to lay out according to `policy`.
    pub async fn settle(&mut self, policy: &SettlePolicy) -> Result<()> {
        self.advance(SurfaceState::Settling)?;
        match *policy {
            SettlePolicy::Fixed { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            SettlePolicy::PollReady { interval_ms, timeout_ms } => {
                let deadline = Instant::now() + Duration::from_millis(timeout_ms);
                let interval = Duration::from_millis(interval_ms.max(1));
                loop {
                    if self.host.is_ready(self.id).await {
                        break;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("{}: no ready signal after {}ms, printing anyway", self.id, timeout_ms);
                        break;
                    }
                    tokio::time::sleep(interval.min(deadline - now)).await;
                }
            }
        }
        Ok(())
    }

    /// Focus the frame and request the print dialog.
    pub async fn print(&mut self) -> Result<()> {
        self.advance(SurfaceState::Printing)?;
        self.host.focus(self.id).await?;
        self.host.print(self.id).await
    }

    /// Detach the frame now. Valid from any state except `Removed`.
    pub async fn remove(&mut self) -> Result<()> {
        if self.state == SurfaceState::Removed {
            return Err(Error::Host(format!("{} already removed", self.id)));
        }
        // marked removed first so Drop does not retry after a host failure
        self.state = SurfaceState::Removed;
        self.host.remove_frame(self.id).await?;
        debug!("{} removed", self.id);
        Ok(())
    }

    /// Hand the surface to a timer task that removes it after `delay`.
    pub fn schedule_removal(mut self, delay: Duration) -> Result<PendingRemoval> {
        self.advance(SurfaceState::PendingRemoval)?;
        let id = self.id;
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Err(e) = self.remove().await {
                warn!("failed to remove {}: {}", id, e);
            }
        });
        Ok(PendingRemoval { id, deadline, handle })
    }
}

impl<H: PrintHost> Drop for EphemeralSurface<H> {
    fn drop(&mut self) {
        if self.state != SurfaceState::Removed {
            self.state = SurfaceState::Removed;
            debug!("{} dropped before removal, releasing", self.id);
            self.host.release_frame(self.id);
        }
    }
}

/// A scheduled removal. Dropping it does not cancel the timer.
#[derive(Debug)]
pub struct PendingRemoval {
    id: SurfaceId,
    deadline: Instant,
    handle: tokio::task::JoinHandle<()>,
}

impl PendingRemoval {
    pub fn surface(&self) -> SurfaceId {
        self.id
    }

    /// When the frame will be detached
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait until the frame has been removed.
    pub async fn removed(self) {
        if let Err(e) = self.handle.await {
            warn!("removal task for {} failed: {}", self.id, e);
        }
    }
}
