use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::coords::{Extent, ResizeMode};
use crate::device::{
    ContextIdentity, Driver, GraphicsContext, GraphicsError, NativeWindow, SurfaceBinding,
    SurfaceTarget, Texture, TextureRegistry,
};
use crate::frame::{CameraFrame, FrameId, FrameMailbox};
use crate::render::{Compositor, FramePresenter, PresentReport};

use super::{
    HostError, SessionConfig, SessionEvent, SessionState, SessionStats, SurfaceEvent,
    SurfaceEventKind, SurfaceSequencer,
};

/// Session state readable from any thread.
#[derive(Debug, Default)]
pub struct SessionStatus {
    tearing_down: AtomicBool,
    snapshot: Mutex<Snapshot>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Snapshot {
    state: SessionState,
    identity: Option<ContextIdentity>,
    stats: SessionStats,
}

impl SessionStatus {
    pub fn state(&self) -> SessionState {
        self.snapshot.lock().state
    }

    pub fn context_identity(&self) -> Option<ContextIdentity> {
        self.snapshot.lock().identity
    }

    pub fn stats(&self) -> SessionStats {
        self.snapshot.lock().stats
    }

    /// Set once teardown was requested; no frame is presented afterwards.
    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::Acquire)
    }

    pub(crate) fn request_teardown(&self) {
        self.tearing_down.store(true, Ordering::Release);
    }

    pub(crate) fn mark_destroyed(&self) {
        self.request_teardown();
        self.snapshot.lock().state = SessionState::Destroyed;
    }
}

/// Window announced before the context existed.
#[derive(Debug, Copy, Clone)]
struct PendingSurface {
    window: NativeWindow,
    extent: Extent,
    seq: u64,
}

/// The session state machine.
///
/// Owns the context, the surface binding and the textures, and applies
/// lifecycle events and frames to them in order. It never spawns threads; the
/// render thread behind [`RenderSession`](super::RenderSession) drives it, and
/// tests drive it directly.
pub struct SessionCore<D: Driver, C: Compositor<D>> {
    driver: D,
    compositor: C,
    config: SessionConfig,

    context: Option<GraphicsContext>,
    registry: TextureRegistry,
    binding: SurfaceBinding,
    presenter: FramePresenter,

    /// Textures handed out, oldest first. Frames go to the newest.
    textures: Vec<Texture>,
    /// Bound drawable and the sequence number of the `Available` that bound it.
    target: Option<(SurfaceTarget, u64)>,
    pending: Option<PendingSurface>,
    /// Re-present the current texture even without a new frame.
    redraw: bool,

    state: SessionState,
    dropped: u64,
    last_presented: Option<FrameId>,

    mailbox: Arc<FrameMailbox>,
    sequencer: Arc<SurfaceSequencer>,
    status: Arc<SessionStatus>,
    events: Sender<SessionEvent>,
    /// Receiving side kept to evict stale events when a failure finds the
    /// channel full.
    backlog: Receiver<SessionEvent>,
}

impl<D: Driver, C: Compositor<D>> SessionCore<D, C> {
    /// Creates a session core and the receiving end of its event channel.
    pub fn new(driver: D, compositor: C, config: SessionConfig) -> (Self, Receiver<SessionEvent>) {
        let (events, receiver) = crossbeam_channel::bounded(config.event_capacity.max(1));
        let presenter = FramePresenter::new(config.resize_mode, config.mirrored);
        let core = Self {
            driver,
            compositor,
            config,
            context: None,
            registry: TextureRegistry::new(),
            binding: SurfaceBinding::new(),
            presenter,
            textures: Vec::new(),
            target: None,
            pending: None,
            redraw: false,
            state: SessionState::Uninitialized,
            dropped: 0,
            last_presented: None,
            mailbox: Arc::new(FrameMailbox::new()),
            sequencer: Arc::new(SurfaceSequencer::new()),
            status: Arc::new(SessionStatus::default()),
            events,
            backlog: receiver.clone(),
        };
        (core, receiver)
    }

    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    pub fn sequencer(&self) -> &Arc<SurfaceSequencer> {
        &self.sequencer
    }

    pub fn status(&self) -> &Arc<SessionStatus> {
        &self.status
    }

    pub(crate) fn event_sender(&self) -> Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context_identity(&self) -> Option<ContextIdentity> {
        self.context.as_ref().map(|c| c.identity())
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Textures currently handed out, oldest first.
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn live_texture_count(&self) -> usize {
        self.registry.live_count()
    }

    pub fn surface(&self) -> Option<&SurfaceTarget> {
        self.target.as_ref().map(|(t, _)| t)
    }

    pub fn stats(&self) -> SessionStats {
        let presents = self.presenter.stats();
        let mailbox = self.mailbox.stats();
        SessionStats {
            presented: presents.presented,
            dropped: self.dropped,
            deposited: mailbox.deposited,
            superseded: mailbox.superseded,
            fps: presents.fps,
            last_presented: self.last_presented,
        }
    }

    /// Copies state, identity and stats to the shared [`SessionStatus`].
    pub fn publish(&self) {
        let mut snapshot = self.status.snapshot.lock();
        snapshot.state = self.state;
        snapshot.identity = self.context_identity();
        snapshot.stats = self.stats();
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Creates the context and the preview texture. Calling it again while a
    /// context exists returns the existing identity.
    pub fn initialize(&mut self) -> Result<ContextIdentity, GraphicsError> {
        match self.state {
            SessionState::Destroyed => {
                return Err(GraphicsError::precondition("session has been destroyed"));
            }
            SessionState::Uninitialized => {}
            _ => {
                if let Some(identity) = self.context_identity() {
                    log::debug!("initialize: context {identity} already exists");
                    return Ok(identity);
                }
            }
        }

        let mut ctx = GraphicsContext::initialize(&mut self.driver, &self.config.context, None)?;
        let created = match ctx.make_current(&mut self.driver, None) {
            Ok(mut cur) => self.registry.create(&mut cur, self.config.texture_target),
            Err(err) => Err(err),
        };
        let texture = match created {
            Ok(texture) => texture,
            Err(err) => {
                log::error!("preview texture creation failed: {err}");
                ctx.destroy(&mut self.driver);
                return Err(err);
            }
        };

        let identity = ctx.identity();
        self.context = Some(ctx);
        self.textures.push(texture);
        self.set_state(SessionState::ContextReady);
        self.emit(SessionEvent::Initialized { context: identity });

        if let Some(pending) = self.pending.take() {
            log::debug!("binding surface announced before initialization");
            self.attach(pending.window, pending.extent, pending.seq);
        }
        Ok(identity)
    }

    /// Allocates an additional texture; frames are bound to it from now on.
    pub fn create_texture(&mut self) -> Result<Texture, GraphicsError> {
        let Some(ctx) = self.context.as_mut() else {
            return Err(GraphicsError::precondition(format!(
                "cannot create a texture while {}",
                self.state
            )));
        };
        let mut cur = ctx.make_current(&mut self.driver, None)?;
        let texture = self.registry.create(&mut cur, self.config.texture_target)?;
        drop(cur);

        self.textures.push(texture);
        Ok(texture)
    }

    pub fn destroy_texture(&mut self, texture: Texture) -> Result<(), GraphicsError> {
        let Some(ctx) = self.context.as_mut() else {
            return Err(GraphicsError::precondition(format!(
                "cannot destroy a texture while {}",
                self.state
            )));
        };
        let mut cur = ctx.make_current(&mut self.driver, None)?;
        self.registry.destroy(&mut cur, texture)?;
        drop(cur);

        self.textures.retain(|t| *t != texture);
        self.redraw = true;
        Ok(())
    }

    /// Copies the most recently presented frame back from its texture.
    ///
    /// Fails with [`GraphicsError::Snapshot`] until a frame has been
    /// presented, or once the texture holding it was destroyed or rebound.
    pub fn take_snapshot(&mut self) -> Result<CameraFrame, GraphicsError> {
        let Some(ctx) = self.context.as_mut() else {
            return Err(GraphicsError::precondition(format!(
                "cannot take a snapshot while {}",
                self.state
            )));
        };
        let Some(frame) = self.last_presented else {
            return Err(GraphicsError::Snapshot("no frame has been presented".into()));
        };
        let registry = &self.registry;
        let Some(texture) = self
            .textures
            .iter()
            .rev()
            .find(|t| registry.state(t).and_then(|s| s.frame) == Some(frame))
            .copied()
        else {
            return Err(GraphicsError::Snapshot(format!("frame {frame} is no longer held")));
        };

        let mut cur = ctx.make_current(&mut self.driver, None)?;
        let snapshot = registry.read_back(&mut cur, &texture)?;
        log::debug!("snapshot of frame {frame} ({})", snapshot.extent());
        Ok(snapshot)
    }

    /// Applies a host surface notification.
    pub fn surface_event(&mut self, event: SurfaceEvent) {
        if self.state == SessionState::Destroyed {
            log::debug!("surface event {} after teardown ignored", event.seq);
            return;
        }
        if self.sequencer.is_superseded(&event) {
            log::debug!("surface-available {} superseded, discarded", event.seq);
            return;
        }

        match event.kind {
            SurfaceEventKind::Available { window, width, height } => {
                let extent = Extent::new(width, height);
                if self.context.is_none() {
                    self.pending = Some(PendingSurface { window, extent, seq: event.seq });
                } else {
                    self.attach(window, extent, event.seq);
                }
            }
            SurfaceEventKind::Changed { surface, width, height } => {
                self.resize(surface, Extent::new(width, height));
            }
            SurfaceEventKind::Destroyed => {
                self.pending = None;
                if self.target.is_some() {
                    self.lose_surface("host destroyed the surface");
                }
            }
        }
    }

    pub fn set_resize_mode(&mut self, mode: ResizeMode) {
        self.presenter.set_resize_mode(mode);
        self.redraw = true;
        self.pump();
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.presenter.set_mirrored(mirrored);
        self.redraw = true;
        self.pump();
    }

    /// Releases textures, then the surface, then the context. Terminal and
    /// idempotent.
    pub fn teardown(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        self.status.request_teardown();
        if let Some(id) = self.mailbox.clear() {
            log::debug!("frame {id} discarded at teardown");
        }

        if let Some(mut ctx) = self.context.take() {
            match ctx.make_current(&mut self.driver, None) {
                Ok(mut cur) => {
                    let released = self.registry.release_all(&mut cur);
                    self.binding.detach_all(&mut cur);
                    log::debug!("teardown released {released} texture(s)");
                }
                Err(err) => {
                    log::warn!("teardown without a current context: {err}");
                    self.registry.abandon(ctx.identity());
                    self.binding.abandon();
                }
            }
            ctx.release_current(&mut self.driver);
            ctx.destroy(&mut self.driver);
        }

        self.textures.clear();
        self.target = None;
        self.pending = None;
        self.set_state(SessionState::Destroyed);
        self.emit(SessionEvent::Destroyed);
    }

    // ── frames ────────────────────────────────────────────────────────────

    /// Binds the pending frame, if any, and presents it.
    ///
    /// Returns the report of a successful present. Failures are absorbed:
    /// logged, counted and reported as events.
    pub fn pump(&mut self) -> Option<PresentReport> {
        if self.status.is_tearing_down() || !self.state.is_presenting() {
            return None;
        }
        let Some(texture) = self.textures.last().copied() else {
            if let Some(frame) = self.mailbox.clear() {
                self.drop_frame(
                    Some(frame),
                    GraphicsError::precondition("no texture to bind the frame to"),
                );
            }
            return None;
        };
        let (target, _) = self.target.clone()?;
        let ctx = self.context.as_mut()?;

        let mut cur = match ctx.make_current(&mut self.driver, Some(&target)) {
            Ok(cur) => cur,
            Err(err) => {
                log::error!("cannot bind {:?} for presentation: {err}", target.id());
                self.emit(SessionEvent::Error(err.into()));
                return None;
            }
        };

        let bound = self.registry.bind_frame(&mut cur, &texture, self.mailbox.as_ref());
        let (fresh, bind_error) = match bound {
            Ok(fresh) => (fresh, None),
            Err(err) => (None, Some(err)),
        };
        let has_image = self.registry.state(&texture).is_some_and(|s| s.bound);
        let result = (fresh.is_some() || (self.redraw && has_image)).then(|| {
            self.presenter
                .present(&mut cur, &self.registry, &texture, &target, &mut self.compositor)
        });
        drop(cur);

        if let Some(err) = bind_error {
            self.drop_frame(None, err);
        }

        match result? {
            Ok(report) => {
                self.redraw = false;
                self.last_presented = report.frame.or(self.last_presented);
                if self.state == SessionState::SurfaceBound {
                    self.set_state(SessionState::Presenting);
                }
                self.emit(SessionEvent::FramePresented {
                    frame: report.frame,
                    index: report.index,
                });
                Some(report)
            }
            Err(err) if err.is_surface_lost() => {
                log::info!("{err}");
                self.drop_frame_silently(fresh);
                self.lose_surface("surface lost during present");
                None
            }
            Err(err) if err.is_per_frame() => {
                self.drop_frame(fresh, err);
                None
            }
            Err(err) => {
                log::error!("present failed: {err}");
                self.emit(SessionEvent::Error(err.into()));
                None
            }
        }
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn attach(&mut self, window: NativeWindow, extent: Extent, seq: u64) {
        let Some(ctx) = self.context.as_mut() else { return };

        let attached = match ctx.make_current(&mut self.driver, None) {
            Ok(mut cur) => self.binding.attach(&mut cur, window, extent.width, extent.height),
            Err(err) => Err(err),
        };

        match attached {
            Ok(target) => {
                let event = SessionEvent::SurfaceBound {
                    surface: target.id(),
                    extent: target.extent(),
                };
                self.target = Some((target, seq));
                self.presenter.pause();
                self.set_state(SessionState::SurfaceBound);
                self.emit(event);
                self.pump();
            }
            Err(err) => {
                log::error!("surface attach failed: {err}");
                self.emit(SessionEvent::Error(err.into()));
            }
        }
    }

    fn resize(&mut self, surface: u64, extent: Extent) {
        let Some((target, bound_seq)) = self.target.clone() else {
            match self.pending.as_mut() {
                Some(pending) if pending.seq == surface => pending.extent = extent,
                _ => log::debug!("surface-changed with no bound surface discarded"),
            }
            return;
        };
        if bound_seq != surface {
            log::debug!("surface-changed for unbound surface {surface} discarded");
            return;
        }
        if extent.is_empty() {
            // Minimized; the drawable keeps its last size until a real one arrives.
            log::debug!("surface-changed to {extent} deferred");
            return;
        }
        let Some(ctx) = self.context.as_mut() else { return };

        let resized = match ctx.make_current(&mut self.driver, None) {
            Ok(mut cur) => self.binding.resize(&mut cur, &target, extent.width, extent.height),
            Err(err) => Err(err),
        };
        match resized {
            Ok(replacement) => {
                log::debug!("surface resized to {extent}");
                self.target = Some((replacement, bound_seq));
                self.redraw = true;
                self.pump();
            }
            Err(err) => {
                log::error!("surface resize failed: {err}");
                self.emit(SessionEvent::Error(err.into()));
            }
        }
    }

    /// Releases the drawable and suspends presentation. Textures and the
    /// context stay valid.
    fn lose_surface(&mut self, reason: &str) {
        if let Some((target, _)) = self.target.take() {
            if let Some(ctx) = self.context.as_mut() {
                match ctx.make_current(&mut self.driver, None) {
                    Ok(mut cur) => self.binding.detach(&mut cur, &target),
                    Err(err) => {
                        log::warn!("surface {:?} abandoned: {err}", target.id());
                        self.binding.abandon();
                    }
                }
            }
        }
        self.presenter.pause();
        self.redraw = false;
        if self.state.is_presenting() {
            log::info!("presentation paused: {reason}");
            self.set_state(SessionState::SurfaceLost);
            self.emit(SessionEvent::Paused);
        }
    }

    fn drop_frame(&mut self, frame: Option<FrameId>, err: GraphicsError) {
        log::warn!("frame dropped: {err}");
        self.dropped += 1;
        self.emit(SessionEvent::FrameDropped { frame, error: HostError::from(err) });
    }

    fn drop_frame_silently(&mut self, frame: Option<FrameId>) {
        if frame.is_some() {
            self.dropped += 1;
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("session {} -> {}", self.state, state);
            self.state = state;
            self.publish();
        }
    }

    /// Publishes, then sends. A failure that finds the channel full takes
    /// the place of the oldest queued event.
    fn emit(&self, event: SessionEvent) {
        self.publish();
        let event = match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(event)) => event,
        };
        if !event.is_failure() {
            log::trace!("event buffer full, dropped {event:?}");
            return;
        }

        match self.backlog.try_recv() {
            Ok(evicted) if evicted.is_failure() => {
                log::warn!("event buffer full, evicted {evicted:?}");
            }
            Ok(evicted) => log::trace!("event buffer full, evicted {evicted:?}"),
            Err(_) => {}
        }
        if let Err(err) = self.events.try_send(event) {
            log::warn!("event buffer full, dropped {:?}", err.into_inner());
        }
    }
}
