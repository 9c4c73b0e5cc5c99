use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::coords::ResizeMode;
use crate::device::{ContextIdentity, Driver, NativeWindow, Texture};
use crate::frame::{CameraFrame, FrameMailbox};
use crate::render::Compositor;

use super::command::{Command, Reply};
use super::{
    HostError, HostResult, SessionConfig, SessionCore, SessionEvent, SessionState, SessionStats,
    SessionStatus, SurfaceSequencer,
};

/// Camera-side entry point. Cheap to clone and never blocks.
#[derive(Clone)]
pub struct FrameSink {
    mailbox: Arc<FrameMailbox>,
    wake: Sender<()>,
    status: Arc<SessionStatus>,
}

impl FrameSink {
    /// Hands a new frame to the render thread, replacing any frame it has not
    /// picked up yet.
    pub fn on_frame_available(&self, frame: CameraFrame) {
        if self.status.is_tearing_down() {
            return;
        }
        self.mailbox.deposit(frame);
        // A full wake channel already guarantees a pending drain.
        let _ = self.wake.try_send(());
    }
}

/// Host-facing handle of a preview session running on its own render thread.
///
/// Surface notifications and settings return immediately; `initialize`,
/// `create_texture`, `destroy_texture` and `take_snapshot` wait for the render
/// thread's answer.
/// Dropping the handle tears the session down.
pub struct RenderSession {
    commands: Sender<Command>,
    wake: Sender<()>,
    mailbox: Arc<FrameMailbox>,
    sequencer: Arc<SurfaceSequencer>,
    status: Arc<SessionStatus>,
    events: Receiver<SessionEvent>,
    thread: Option<JoinHandle<()>>,
}

impl RenderSession {
    /// Starts the render thread. No GPU work happens until [`initialize`](Self::initialize).
    pub fn spawn<D, C>(driver: D, compositor: C, config: SessionConfig) -> HostResult<Self>
    where
        D: Driver,
        C: Compositor<D>,
    {
        let thread_name = config.thread_name.clone();
        let (core, events) = SessionCore::new(driver, compositor, config);
        let mailbox = Arc::clone(core.mailbox());
        let sequencer = Arc::clone(core.sequencer());
        let status = Arc::clone(core.status());

        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (wake, wake_rx) = crossbeam_channel::bounded(1);
        let panic_status = Arc::clone(&status);

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let report = core.event_sender();
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                    run(core, command_rx, wake_rx);
                }));
                if let Err(payload) = outcome {
                    let err = HostError::from_panic(payload.as_ref());
                    log::error!("{err}");
                    panic_status.mark_destroyed();
                    let _ = report.try_send(SessionEvent::Error(err));
                }
            })
            .map_err(|e| HostError::precondition(format!("failed to spawn render thread: {e}")))?;

        log::debug!("render session started");
        Ok(Self {
            commands,
            wake,
            mailbox,
            sequencer,
            status,
            events,
            thread: Some(thread),
        })
    }

    /// Creates the rendering context and the preview texture.
    pub fn initialize(&self) -> HostResult<ContextIdentity> {
        self.call(Command::Initialize)
    }

    pub fn create_texture(&self) -> HostResult<Texture> {
        self.call(Command::CreateTexture)
    }

    pub fn destroy_texture(&self, texture: Texture) -> HostResult<()> {
        self.call(|reply| Command::DestroyTexture(texture, reply))
    }

    /// Copies the frame currently on screen. Fails with
    /// [`ErrorKind::Snapshot`](crate::device::ErrorKind::Snapshot) until a
    /// frame has been presented.
    pub fn take_snapshot(&self) -> HostResult<CameraFrame> {
        self.call(Command::TakeSnapshot)
    }

    pub fn notify_surface_available(&self, window: NativeWindow, width: u32, height: u32) {
        self.post(Command::Surface(self.sequencer.available(window, width, height)));
    }

    pub fn notify_surface_changed(&self, width: u32, height: u32) {
        self.post(Command::Surface(self.sequencer.changed(width, height)));
    }

    pub fn notify_surface_destroyed(&self) {
        self.post(Command::Surface(self.sequencer.destroyed()));
    }

    pub fn set_resize_mode(&self, mode: ResizeMode) {
        self.post(Command::SetResizeMode(mode));
    }

    pub fn set_mirrored(&self, mirrored: bool) {
        self.post(Command::SetMirrored(mirrored));
    }

    pub fn frame_sink(&self) -> FrameSink {
        FrameSink {
            mailbox: Arc::clone(&self.mailbox),
            wake: self.wake.clone(),
            status: Arc::clone(&self.status),
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    pub fn context_identity(&self) -> Option<ContextIdentity> {
        self.status.context_identity()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.status.stats();
        // The mailbox counters move without the render thread.
        let mailbox = self.mailbox.stats();
        stats.deposited = mailbox.deposited;
        stats.superseded = mailbox.superseded;
        stats
    }

    /// Session notifications. Undrained events beyond the configured
    /// capacity are dropped; a failure displaces the oldest queued event.
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Stops presentation, releases every resource and joins the render
    /// thread. Idempotent.
    pub fn teardown(&mut self) -> HostResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.status.request_teardown();
        // A failed send means the thread is already gone.
        let _ = self.commands.send(Command::Teardown);

        thread
            .join()
            .map_err(|payload| HostError::from_panic(payload.as_ref()))?;
        log::debug!("render session joined");

        match self.status.state() {
            SessionState::Destroyed => Ok(()),
            state => Err(HostError::precondition(format!("render thread exited while {state}"))),
        }
    }

    fn post(&self, command: Command) {
        if self.status.is_tearing_down() {
            log::debug!("notification after teardown ignored");
            return;
        }
        if self.commands.send(command).is_err() {
            log::warn!("render thread is gone; notification dropped");
        }
    }

    fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> HostResult<T> {
        if self.status.is_tearing_down() {
            return Err(HostError::precondition("session is torn down"));
        }
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.commands
            .send(command(reply))
            .map_err(|_| HostError::precondition("render thread is gone"))?;
        answer
            .recv()
            .map_err(|_| HostError::precondition("render thread stopped before answering"))?
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::error!("render session teardown: {err}");
        }
    }
}

/// Render-thread loop. Commands run in enqueue order; frame wakes are
/// coalesced by the single-slot wake channel.
fn run<D: Driver, C: Compositor<D>>(
    mut core: SessionCore<D, C>,
    commands: Receiver<Command>,
    wake: Receiver<()>,
) {
    loop {
        crossbeam_channel::select! {
            recv(commands) -> command => {
                let Ok(command) = command else {
                    // Every handle is gone.
                    core.teardown();
                    core.publish();
                    return;
                };
                if !dispatch(&mut core, command) {
                    core.publish();
                    return;
                }
            }
            recv(wake) -> _ => {
                core.pump();
            }
        }
        core.publish();
    }
}

/// Returns `false` once the session is destroyed.
fn dispatch<D: Driver, C: Compositor<D>>(core: &mut SessionCore<D, C>, command: Command) -> bool {
    match command {
        Command::Initialize(reply) => {
            let result = core.initialize().map_err(HostError::from);
            answer(core, reply, result);
        }
        Command::CreateTexture(reply) => {
            let result = core.create_texture().map_err(HostError::from);
            answer(core, reply, result);
        }
        Command::DestroyTexture(texture, reply) => {
            let result = core.destroy_texture(texture).map_err(HostError::from);
            answer(core, reply, result);
        }
        Command::TakeSnapshot(reply) => {
            let result = core.take_snapshot().map_err(HostError::from);
            answer(core, reply, result);
        }
        Command::Surface(event) => core.surface_event(event),
        Command::SetResizeMode(mode) => core.set_resize_mode(mode),
        Command::SetMirrored(mirrored) => core.set_mirrored(mirrored),
        Command::Teardown => {
            core.teardown();
            return false;
        }
    }
    true
}

/// Publishes before replying so the caller observes the new state.
fn answer<D: Driver, C: Compositor<D>, T>(
    core: &SessionCore<D, C>,
    reply: Reply<T>,
    result: HostResult<T>,
) {
    core.publish();
    let _ = reply.send(result);
}
