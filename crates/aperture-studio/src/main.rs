//! Preview studio: opens a window and renders a synthetic camera feed through
//! an aperture render session.
//!
//! Keys: `M` toggles mirroring, `C` toggles cover/contain, `S` logs a snapshot,
//! `Esc` quits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use aperture_engine::coords::{Extent, ResizeMode};
use aperture_engine::device::{NativeWindow, WgpuDriver, WgpuDriverConfig};
use aperture_engine::frame::{CameraFrame, FrameId, PixelFormat};
use aperture_engine::logging::{LoggingConfig, init_logging};
use aperture_engine::render::BlitCompositor;
use aperture_engine::session::{FrameSink, RenderSession, SessionConfig, SessionEvent};

/// How often queued session events are drained and logged.
const EVENT_POLL: Duration = Duration::from_millis(100);
const STATS_EVERY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct StudioConfig {
    camera: Extent,
    fps: u32,
    mirrored: bool,
    resize_mode: ResizeMode,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            camera: Extent::new(640, 480),
            fps: 30,
            mirrored: false,
            resize_mode: ResizeMode::Cover,
        }
    }
}

impl StudioConfig {
    /// `--size WxH`, `--fps N`, `--mirror`, `--contain`.
    fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut config = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mirror" => config.mirrored = true,
                "--contain" => config.resize_mode = ResizeMode::Contain,
                "--fps" => {
                    let value = args.next().context("--fps needs a value")?;
                    config.fps = value.parse().with_context(|| format!("bad --fps {value:?}"))?;
                }
                "--size" => {
                    let value = args.next().context("--size needs a value")?;
                    let (w, h) = value
                        .split_once('x')
                        .with_context(|| format!("bad --size {value:?}, expected WxH"))?;
                    config.camera = Extent::new(w.parse()?, h.parse()?);
                }
                other => bail!("unknown argument {other:?}"),
            }
        }
        if config.camera.is_empty() || config.fps == 0 {
            bail!("camera size and fps must be non-zero");
        }
        Ok(config)
    }
}

/// Producer thread standing in for a real camera.
struct SyntheticCamera {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    fn start(sink: FrameSink, extent: Extent, fps: u32) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let period = Duration::from_secs(1) / fps;

        let thread = thread::Builder::new()
            .name("synthetic-camera".to_owned())
            .spawn(move || {
                let started = Instant::now();
                let mut next = 0u64;
                while !flag.load(Ordering::Acquire) {
                    next += 1;
                    let frame = gradient_frame(FrameId(next), extent, started.elapsed());
                    sink.on_frame_available(frame);
                    thread::sleep(period);
                }
                log::debug!("camera stopped after {next} frames");
            })
            .context("failed to spawn camera thread")?;

        Ok(Self { stop, thread: Some(thread) })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("camera thread panicked");
            }
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Moving RGBA gradient with a scan bar, so dropped or stale frames are visible.
fn gradient_frame(id: FrameId, extent: Extent, timestamp: Duration) -> CameraFrame {
    let (w, h) = (extent.width as usize, extent.height as usize);
    let phase = timestamp.as_secs_f32();
    let bar = ((phase * 0.25).fract() * w as f32) as usize;

    let mut data = vec![0u8; w * h * 4];
    for (y, row) in data.chunks_exact_mut(w * 4).enumerate() {
        let g = (y * 255 / h.max(1)) as u8;
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let r = (x * 255 / w.max(1)) as u8;
            let b = ((phase.sin() * 0.5 + 0.5) * 255.0) as u8;
            let lit = x.abs_diff(bar) < 4;
            px.copy_from_slice(&if lit { [255, 255, 255, 255] } else { [r, g, b, 255] });
        }
    }
    CameraFrame::new(id, extent, PixelFormat::Rgba8, data).with_timestamp(timestamp)
}

struct Studio {
    config: StudioConfig,
    mirrored: bool,
    resize_mode: ResizeMode,

    // Drop order: camera, then session (joins the render thread), then window.
    camera: Option<SyntheticCamera>,
    session: Option<RenderSession>,
    window: Option<Window>,

    last_stats: Instant,
    failure: Option<anyhow::Error>,
}

impl Studio {
    fn new(config: StudioConfig) -> Self {
        Self {
            mirrored: config.mirrored,
            resize_mode: config.resize_mode,
            config,
            camera: None,
            session: None,
            window: None,
            last_stats: Instant::now(),
            failure: None,
        }
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("aperture studio")
            .with_inner_size(LogicalSize::new(960.0, 540.0));
        let window = event_loop.create_window(attrs).context("failed to create window")?;

        let session_config = SessionConfig {
            mirrored: self.mirrored,
            resize_mode: self.resize_mode,
            ..SessionConfig::default()
        };
        let driver = WgpuDriver::new(WgpuDriverConfig::default());
        let session = RenderSession::spawn(driver, BlitCompositor::default(), session_config)?;
        let identity = session.initialize()?;
        log::info!("rendering context {identity} ready");

        // SAFETY: `window` is stored in `self.window` and only dropped after
        // the session has been torn down (see `close`).
        let native = unsafe { NativeWindow::from_window(&window) }
            .context("window has no usable raw handles")?;
        let size = window.inner_size();
        session.notify_surface_available(native, size.width, size.height);

        let camera =
            SyntheticCamera::start(session.frame_sink(), self.config.camera, self.config.fps)?;

        self.window = Some(window);
        self.session = Some(session);
        self.camera = Some(camera);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(mut session) = self.session.take() {
            session.notify_surface_destroyed();
            if let Err(err) = session.teardown() {
                log::error!("session teardown: {err}");
            }
            log_stats(&session);
        }
        self.window = None;
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.close();
        event_loop.exit();
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        let Some(session) = self.session.as_ref() else { return };
        match key {
            KeyCode::KeyM => {
                self.mirrored = !self.mirrored;
                session.set_mirrored(self.mirrored);
                log::info!("mirrored: {}", self.mirrored);
            }
            KeyCode::KeyC => {
                self.resize_mode = match self.resize_mode {
                    ResizeMode::Cover => ResizeMode::Contain,
                    ResizeMode::Contain => ResizeMode::Cover,
                };
                session.set_resize_mode(self.resize_mode);
                log::info!("resize mode: {:?}", self.resize_mode);
            }
            KeyCode::KeyS => match session.take_snapshot() {
                Ok(snapshot) => log::info!(
                    "snapshot of frame {} ({}, {} bytes)",
                    snapshot.id(),
                    snapshot.extent(),
                    snapshot.data().len()
                ),
                Err(err) => log::warn!("snapshot unavailable: {err}"),
            },
            KeyCode::Escape => {
                self.close();
                event_loop.exit();
            }
            _ => {}
        }
    }

    fn drain_events(&mut self) {
        let Some(session) = self.session.as_ref() else { return };
        for event in session.events().try_iter() {
            match event {
                SessionEvent::FramePresented { .. } => {}
                SessionEvent::FrameDropped { frame, error } => {
                    log::warn!("frame {frame:?} dropped: {error}");
                }
                SessionEvent::Error(error) => log::error!("session error: {error}"),
                other => log::info!("{other:?}"),
            }
        }
        if self.last_stats.elapsed() >= STATS_EVERY {
            self.last_stats = Instant::now();
            log_stats(session);
        }
    }
}

fn log_stats(session: &RenderSession) {
    let stats = session.stats();
    log::info!(
        "{}: presented {} dropped {} superseded {} of {} at {:.1} fps",
        session.state(),
        stats.presented,
        stats.dropped,
        stats.superseded,
        stats.deposited,
        stats.fps
    );
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        match (&self.window, &self.session) {
            (None, _) => {
                if let Err(err) = self.open(event_loop) {
                    self.fail(event_loop, err);
                }
            }
            // Returning from suspension: the old surface was released.
            // SAFETY: as in `open`, the window outlives the session.
            (Some(window), Some(session)) => match unsafe { NativeWindow::from_window(window) } {
                Ok(native) => {
                    let size = window.inner_size();
                    session.notify_surface_available(native, size.width, size.height);
                }
                Err(err) => log::error!("window handles unavailable after resume: {err}"),
            },
            (Some(_), None) => {}
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(session) = self.session.as_ref() {
            session.notify_surface_destroyed();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.close();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(session) = self.session.as_ref() {
                    session.notify_surface_changed(size.width, size.height);
                }
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                if let (Some(window), Some(session)) = (&self.window, &self.session) {
                    let size = window.inner_size();
                    session.notify_surface_changed(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.on_key(event_loop, code);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.drain_events();
        // Presentation runs on the render thread; the UI loop only polls events.
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + EVENT_POLL));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.close();
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = StudioConfig::from_args(std::env::args().skip(1))?;
    log::info!(
        "synthetic camera {} at {} fps, {:?}{}",
        config.camera,
        config.fps,
        config.resize_mode,
        if config.mirrored { ", mirrored" } else { "" }
    );

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(config);
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    match studio.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
