use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;

use crate::coords::ResizeMode;
use crate::device::{ContextIdentity, NativeWindow, Texture};
use crate::frame::CameraFrame;

use super::HostResult;

/// Host surface notification, stamped in the order the host issued it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceEvent {
    pub seq: u64,
    pub kind: SurfaceEventKind,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SurfaceEventKind {
    Available { window: NativeWindow, width: u32, height: u32 },
    /// `surface` is the sequence number of the `Available` this resize refers to.
    Changed { surface: u64, width: u32, height: u32 },
    Destroyed,
}

/// Stamps surface notifications and decides which ones a later notification
/// has made obsolete.
///
/// Shared between the host threads issuing notifications and the render
/// thread applying them.
#[derive(Debug, Default)]
pub struct SurfaceSequencer {
    next: AtomicU64,
    /// Latest `Available` or `Destroyed`.
    lifecycle: AtomicU64,
    /// Latest `Available`.
    available: AtomicU64,
}

impl SurfaceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available(&self, window: NativeWindow, width: u32, height: u32) -> SurfaceEvent {
        let seq = self.stamp();
        self.available.fetch_max(seq, Ordering::AcqRel);
        self.lifecycle.fetch_max(seq, Ordering::AcqRel);
        SurfaceEvent { seq, kind: SurfaceEventKind::Available { window, width, height } }
    }

    pub fn changed(&self, width: u32, height: u32) -> SurfaceEvent {
        let seq = self.stamp();
        let surface = self.available.load(Ordering::Acquire);
        SurfaceEvent { seq, kind: SurfaceEventKind::Changed { surface, width, height } }
    }

    pub fn destroyed(&self) -> SurfaceEvent {
        let seq = self.stamp();
        self.lifecycle.fetch_max(seq, Ordering::AcqRel);
        SurfaceEvent { seq, kind: SurfaceEventKind::Destroyed }
    }

    /// An `Available` followed by a later `Available` or `Destroyed` is stale:
    /// binding it would only be undone.
    pub fn is_superseded(&self, event: &SurfaceEvent) -> bool {
        matches!(event.kind, SurfaceEventKind::Available { .. })
            && self.lifecycle.load(Ordering::Acquire) > event.seq
    }

    fn stamp(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel) + 1
    }
}

pub(crate) type Reply<T> = Sender<HostResult<T>>;

/// Work marshalled onto the render thread. Executed in enqueue order.
pub(crate) enum Command {
    Initialize(Reply<ContextIdentity>),
    CreateTexture(Reply<Texture>),
    DestroyTexture(Texture, Reply<()>),
    TakeSnapshot(Reply<CameraFrame>),
    Surface(SurfaceEvent),
    SetResizeMode(ResizeMode),
    SetMirrored(bool),
    Teardown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_lifecycle_event_supersedes_available() {
        let seq = SurfaceSequencer::new();
        let first = seq.available(NativeWindow::offscreen(1), 640, 480);
        assert!(!seq.is_superseded(&first));

        let second = seq.available(NativeWindow::offscreen(2), 640, 480);
        assert!(seq.is_superseded(&first));
        assert!(!seq.is_superseded(&second));

        seq.destroyed();
        assert!(seq.is_superseded(&second));
    }

    #[test]
    fn changes_refer_to_latest_available() {
        let seq = SurfaceSequencer::new();
        let available = seq.available(NativeWindow::offscreen(1), 640, 480);
        let changed = seq.changed(800, 600);
        assert_eq!(
            changed.kind,
            SurfaceEventKind::Changed { surface: available.seq, width: 800, height: 600 }
        );
        // Resizes never supersede anything.
        assert!(!seq.is_superseded(&available));
        assert!(!seq.is_superseded(&changed));
    }
}
