use std::thread;
use std::time::{Duration, Instant};

use aperture_engine::coords::Extent;
use aperture_engine::device::{
    ErrorKind, HeadlessCanvas, HeadlessDriver, HeadlessProbe, NativeWindow,
};
use aperture_engine::frame::{CameraFrame, FrameId, PixelFormat};
use aperture_engine::render::{CompositePass, Compositor};
use aperture_engine::session::{RenderSession, SessionConfig, SessionEvent, SessionState};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Drawing;

impl Compositor<HeadlessDriver> for Drawing {
    fn composite(&mut self, canvas: &mut HeadlessCanvas, _: &CompositePass) -> anyhow::Result<()> {
        canvas.draw();
        Ok(())
    }
}

struct Exploding;

impl Compositor<HeadlessDriver> for Exploding {
    fn composite(&mut self, _: &mut HeadlessCanvas, _: &CompositePass) -> anyhow::Result<()> {
        panic!("compositor exploded");
    }
}

fn spawn() -> (RenderSession, HeadlessProbe) {
    let driver = HeadlessDriver::new();
    let probe = driver.probe();
    let session = RenderSession::spawn(driver, Drawing, SessionConfig::default()).unwrap();
    (session, probe)
}

fn frame(id: u64) -> CameraFrame {
    CameraFrame::new(FrameId(id), Extent::new(8, 6), PixelFormat::Rgba8, vec![0u8; 8 * 6 * 4])
}

fn wait_for(
    session: &RenderSession,
    mut matches: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match session.events().recv_timeout(left) {
            Ok(event) if matches(&event) => return event,
            Ok(_) => {}
            Err(err) => panic!("expected event never arrived: {err}"),
        }
    }
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn presented(id: u64) -> impl FnMut(&SessionEvent) -> bool {
    move |e| matches!(e, SessionEvent::FramePresented { frame: Some(f), .. } if *f == FrameId(id))
}

fn bind_surface(session: &RenderSession, window: u32) {
    session.notify_surface_available(NativeWindow::offscreen(window), 640, 480);
    wait_for(session, |e| matches!(e, SessionEvent::SurfaceBound { .. }));
}

fn assert_released(probe: &HeadlessProbe) {
    assert_eq!(probe.live_textures(), 0);
    assert_eq!(probe.live_surfaces(), 0);
    assert_eq!(probe.live_contexts(), 0);
    assert_eq!(probe.open_displays(), 0);
}

#[test]
fn presents_each_frame_and_releases_everything() {
    let (mut session, probe) = spawn();
    let identity = session.initialize().unwrap();
    assert_eq!(session.context_identity(), Some(identity));
    let baseline = probe.live_textures();

    let texture = session.create_texture().unwrap();
    assert_eq!(texture.owner(), identity);
    bind_surface(&session, 1);

    let sink = session.frame_sink();
    for id in 1..=3 {
        sink.on_frame_available(frame(id));
        wait_for(&session, presented(id));
    }
    assert_eq!(probe.presented_frames(), vec![FrameId(1), FrameId(2), FrameId(3)]);
    assert_eq!(session.state(), SessionState::Presenting);

    session.destroy_texture(texture).unwrap();
    assert_eq!(probe.live_textures(), baseline);

    session.teardown().unwrap();
    assert_eq!(session.state(), SessionState::Destroyed);
    assert_released(&probe);
    assert_eq!(probe.context_destroy_calls(), 1);
    assert_eq!(probe.display_close_calls(), 1);
}

#[test]
fn destroyed_surface_then_teardown_is_clean() {
    let (mut session, probe) = spawn();
    session.initialize().unwrap();
    bind_surface(&session, 1);
    session.frame_sink().on_frame_available(frame(1));
    wait_for(&session, presented(1));

    session.notify_surface_destroyed();
    wait_for(&session, |e| *e == SessionEvent::Paused);
    assert_eq!(session.state(), SessionState::SurfaceLost);

    session.teardown().unwrap();
    let rest: Vec<_> = session.events().try_iter().collect();
    assert!(!rest.iter().any(|e| matches!(e, SessionEvent::Error(_))));
    assert_eq!(rest.last(), Some(&SessionEvent::Destroyed));
    assert_released(&probe);
}

#[test]
fn texture_before_initialize_is_rejected_without_driver_calls() {
    let (session, probe) = spawn();
    let err = session.create_texture().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Precondition);
    assert_eq!(probe.calls(), 0);
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[test]
fn frames_before_surface_collapse_to_latest() {
    let (session, probe) = spawn();
    session.initialize().unwrap();

    let sink = session.frame_sink();
    for id in 1..=3 {
        sink.on_frame_available(frame(id));
    }
    bind_surface(&session, 1);
    wait_for(&session, presented(3));

    assert_eq!(probe.presented_frames(), vec![FrameId(3)]);
    let stats = session.stats();
    assert_eq!(stats.deposited, 3);
    assert_eq!(stats.superseded, 2);
}

#[test]
fn recovers_from_surface_loss_with_same_context() {
    let (session, probe) = spawn();
    let identity = session.initialize().unwrap();
    bind_surface(&session, 1);
    let sink = session.frame_sink();
    sink.on_frame_available(frame(1));
    wait_for(&session, presented(1));

    probe.lose_surface_on_next_present();
    sink.on_frame_available(frame(2));
    wait_for(&session, |e| *e == SessionEvent::Paused);
    let textures = probe.live_textures();

    bind_surface(&session, 2);
    sink.on_frame_available(frame(3));
    wait_for(&session, presented(3));

    assert_eq!(session.context_identity(), Some(identity));
    assert_eq!(probe.live_textures(), textures);
    assert_eq!(probe.live_contexts(), 1);
}

#[test]
fn resizes_reuse_the_window_binding() {
    let (session, probe) = spawn();
    session.initialize().unwrap();
    bind_surface(&session, 1);
    let sink = session.frame_sink();
    sink.on_frame_available(frame(1));
    wait_for(&session, presented(1));

    for (w, h) in [(800, 600), (1024, 768), (640, 480)] {
        session.notify_surface_changed(w, h);
    }
    sink.on_frame_available(frame(2));
    wait_for(&session, presented(2));

    assert_eq!(probe.native_surface_count(), 1);
    assert_eq!(probe.live_surfaces(), 1);
    assert_eq!(session.state(), SessionState::Presenting);
}

#[test]
fn snapshot_returns_the_presented_frame() {
    let (session, _probe) = spawn();
    session.initialize().unwrap();
    assert_eq!(session.take_snapshot().unwrap_err().kind, ErrorKind::Snapshot);

    bind_surface(&session, 1);
    session.frame_sink().on_frame_available(frame(1));
    wait_for(&session, presented(1));
    assert_eq!(session.state(), SessionState::Presenting);

    let snapshot = session.take_snapshot().unwrap();
    assert_eq!(snapshot.id(), FrameId(1));
    assert_eq!(snapshot.extent(), Extent::new(8, 6));
    assert_eq!(snapshot.format(), PixelFormat::Rgba8);
    assert_eq!(snapshot.data(), &[0u8; 8 * 6 * 4][..]);
}

#[test]
fn snapshot_before_initialize_is_precondition() {
    let (session, _probe) = spawn();
    assert_eq!(session.take_snapshot().unwrap_err().kind, ErrorKind::Precondition);
}

#[test]
fn concurrent_producers_lose_nothing_unaccounted() {
    let (session, probe) = spawn();
    session.initialize().unwrap();
    bind_surface(&session, 1);

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let sink = session.frame_sink();
            thread::spawn(move || {
                for i in 0..50 {
                    sink.on_frame_available(frame(p * 1000 + i + 1));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    wait_until(|| {
        let stats = session.stats();
        stats.presented + stats.superseded == 200
    });
    assert_eq!(session.stats().deposited, 200);
    assert_eq!(probe.presented_frames().len() as u64, session.stats().presented);
}

#[test]
fn teardown_during_slow_present_completes() {
    let (mut session, probe) = spawn();
    session.initialize().unwrap();
    bind_surface(&session, 1);

    probe.set_present_delay(Some(Duration::from_millis(100)));
    let sink = session.frame_sink();
    sink.on_frame_available(frame(1));
    session.teardown().unwrap();

    // Late frames and calls are refused.
    sink.on_frame_available(frame(2));
    assert_eq!(session.stats().deposited, 1);
    assert_eq!(session.initialize().unwrap_err().kind, ErrorKind::Precondition);
    assert_released(&probe);

    // Idempotent.
    session.teardown().unwrap();
}

#[test]
fn render_thread_panic_is_reported() {
    let driver = HeadlessDriver::new();
    let mut session = RenderSession::spawn(driver, Exploding, SessionConfig::default()).unwrap();
    session.initialize().unwrap();
    session.notify_surface_available(NativeWindow::offscreen(1), 640, 480);
    session.frame_sink().on_frame_available(frame(1));

    let event = wait_for(&session, |e| matches!(e, SessionEvent::Error(_)));
    let SessionEvent::Error(err) = event else { unreachable!() };
    assert_eq!(err.kind, ErrorKind::Precondition);
    assert!(err.diagnostic.contains("compositor exploded"));

    wait_until(|| session.state() == SessionState::Destroyed);
    assert!(session.create_texture().is_err());
    session.teardown().unwrap();
}
