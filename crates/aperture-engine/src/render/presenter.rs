use std::time::Duration;

use crate::coords::{PreviewTransform, ResizeMode};
use crate::device::{
    CurrentContext, Driver, DriverError, GraphicsError, SurfaceId, SurfaceTarget, Texture,
    TextureRegistry,
};
use crate::frame::FrameId;
use crate::time::{PresentClock, PresentStats};

use super::{CompositePass, Compositor};

/// Outcome of a successful present.
#[derive(Debug, Copy, Clone)]
pub struct PresentReport {
    pub surface: SurfaceId,
    /// Frame that reached the screen; `None` when the texture was still empty.
    pub frame: Option<FrameId>,
    pub transform: PreviewTransform,
    /// Zero-based index of this present.
    pub index: u64,
    pub interval: Option<Duration>,
}

/// Composites the camera texture onto the bound surface and swaps.
#[derive(Debug, Default)]
pub struct FramePresenter {
    resize_mode: ResizeMode,
    mirrored: bool,
    clock: PresentClock,
}

impl FramePresenter {
    pub fn new(resize_mode: ResizeMode, mirrored: bool) -> Self {
        Self { resize_mode, mirrored, clock: PresentClock::new() }
    }

    pub fn resize_mode(&self) -> ResizeMode {
        self.resize_mode
    }

    pub fn set_resize_mode(&mut self, mode: ResizeMode) {
        self.resize_mode = mode;
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    pub fn stats(&self) -> PresentStats {
        self.clock.stats()
    }

    /// Restarts interval measurement after a pause in presentation.
    pub fn pause(&mut self) {
        self.clock.reset();
    }

    /// Draws `texture` onto `target` through `compositor` and presents it.
    ///
    /// The context must have been made current with `target`. Surface loss is
    /// reported as `Present { surface_lost: true }`; other draw and swap
    /// failures as `Present { surface_lost: false }`.
    pub fn present<D, C>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        registry: &TextureRegistry,
        texture: &Texture,
        target: &SurfaceTarget,
        compositor: &mut C,
    ) -> Result<PresentReport, GraphicsError>
    where
        D: Driver,
        C: Compositor<D> + ?Sized,
    {
        if !target.is_valid() {
            return Err(GraphicsError::Present {
                surface_lost: true,
                message: format!("surface {:?} is no longer attached", target.id()),
            });
        }
        if current.surface() != Some(target.id()) {
            return Err(GraphicsError::precondition(format!(
                "surface {:?} is not bound to the current context",
                target.id()
            )));
        }
        if texture.owner() != current.identity() {
            return Err(GraphicsError::stale(format!(
                "texture {:?} belongs to {}, not the current {}",
                texture.handle(),
                texture.owner(),
                current.identity()
            )));
        }
        let state = registry.state(texture).ok_or_else(|| {
            GraphicsError::stale(format!("texture {:?} was already released", texture.handle()))
        })?;

        let transform = match state.extent {
            Some(frame) => {
                PreviewTransform::new(frame, target.extent(), self.resize_mode, self.mirrored)
            }
            None => PreviewTransform::fill(target.extent(), self.mirrored),
        };
        let pass = CompositePass {
            texture: *texture,
            frame: state.frame,
            frame_extent: state.extent,
            target_extent: target.extent(),
            transform,
        };

        let context = current.context_id();
        current
            .driver()
            .render(context, target.id(), texture.handle(), |canvas| {
                compositor.composite(canvas, &pass)
            })
            .map_err(|e| present_error(target, e))?;

        let sample = self.clock.tick();
        log::trace!(
            "present #{} of frame {:?} on {:?}",
            sample.index,
            state.frame,
            target.id()
        );
        Ok(PresentReport {
            surface: target.id(),
            frame: state.frame,
            transform,
            index: sample.index,
            interval: sample.interval,
        })
    }
}

fn present_error(target: &SurfaceTarget, err: DriverError) -> GraphicsError {
    let surface_lost = matches!(
        err,
        DriverError::SurfaceLost | DriverError::BadSurface | DriverError::BadNativeWindow(_)
    );
    GraphicsError::Present {
        surface_lost,
        message: format!("surface {:?}: {err}", target.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Extent;
    use crate::device::{
        ContextConfig, GraphicsContext, HeadlessCanvas, HeadlessDriver, NativeWindow,
        SurfaceBinding, TextureTarget,
    };
    use crate::frame::{CameraFrame, FrameMailbox, PixelFormat};
    use crate::render::NullCompositor;

    /// Records each pass and issues one draw.
    #[derive(Default)]
    struct Recording {
        passes: Vec<CompositePass>,
    }

    impl Compositor<HeadlessDriver> for Recording {
        fn composite(
            &mut self,
            canvas: &mut HeadlessCanvas,
            pass: &CompositePass,
        ) -> anyhow::Result<()> {
            canvas.draw();
            self.passes.push(*pass);
            Ok(())
        }
    }

    struct Failing;

    impl Compositor<HeadlessDriver> for Failing {
        fn composite(&mut self, _: &mut HeadlessCanvas, _: &CompositePass) -> anyhow::Result<()> {
            anyhow::bail!("pipeline missing")
        }
    }

    struct Fixture {
        driver: HeadlessDriver,
        ctx: GraphicsContext,
        registry: TextureRegistry,
        texture: Texture,
        target: SurfaceTarget,
    }

    fn fixture() -> Fixture {
        let mut driver = HeadlessDriver::new();
        let mut ctx =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();
        let mut registry = TextureRegistry::new();
        let mut binding = SurfaceBinding::new();
        let (texture, target) = {
            let mut cur = ctx.make_current(&mut driver, None).unwrap();
            let texture = registry.create(&mut cur, TextureTarget::External).unwrap();
            let target = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
            (texture, target)
        };
        Fixture { driver, ctx, registry, texture, target }
    }

    fn upload(f: &mut Fixture, id: u64, extent: Extent) {
        let mailbox = FrameMailbox::new();
        let len = (extent.width * extent.height * 4) as usize;
        mailbox.deposit(CameraFrame::new(FrameId(id), extent, PixelFormat::Rgba8, vec![0u8; len]));
        let mut cur = f.ctx.make_current(&mut f.driver, Some(&f.target)).unwrap();
        f.registry.bind_frame(&mut cur, &f.texture, &mailbox).unwrap();
    }

    #[test]
    fn present_draws_and_swaps() {
        let mut f = fixture();
        let probe = f.driver.probe();
        upload(&mut f, 7, Extent::new(320, 240));

        let mut presenter = FramePresenter::default();
        let mut compositor = Recording::default();
        let mut cur = f.ctx.make_current(&mut f.driver, Some(&f.target)).unwrap();
        let report = presenter
            .present(&mut cur, &f.registry, &f.texture, &f.target, &mut compositor)
            .unwrap();

        assert_eq!(report.frame, Some(FrameId(7)));
        assert_eq!(report.index, 0);
        assert_eq!(probe.presented_frames(), vec![FrameId(7)]);
        assert_eq!(probe.draw_calls(), 1);

        let pass = compositor.passes[0];
        assert_eq!(pass.target_extent, Extent::new(640, 480));
        assert_eq!(pass.frame_extent, Some(Extent::new(320, 240)));
        assert_eq!(presenter.stats().presented, 1);
    }

    #[test]
    fn present_requires_bound_surface() {
        let mut f = fixture();
        let mut cur = f.ctx.make_current(&mut f.driver, None).unwrap();
        let err = FramePresenter::default()
            .present(&mut cur, &f.registry, &f.texture, &f.target, &mut NullCompositor)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::Precondition(_)));
    }

    #[test]
    fn lost_surface_is_recoverable_present_error() {
        let mut f = fixture();
        f.driver.probe().lose_surface_on_next_present();
        let mut cur = f.ctx.make_current(&mut f.driver, Some(&f.target)).unwrap();
        let err = FramePresenter::default()
            .present(&mut cur, &f.registry, &f.texture, &f.target, &mut NullCompositor)
            .unwrap_err();
        assert!(err.is_surface_lost());
    }

    #[test]
    fn compositor_failure_is_plain_present_error() {
        let mut f = fixture();
        let probe = f.driver.probe();
        let mut cur = f.ctx.make_current(&mut f.driver, Some(&f.target)).unwrap();
        let err = FramePresenter::default()
            .present(&mut cur, &f.registry, &f.texture, &f.target, &mut Failing)
            .unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::Present { surface_lost: false, ref message }
                if message.contains("pipeline missing")
        ));
        assert_eq!(probe.present_count(), 0);
    }

    #[test]
    fn released_texture_is_stale() {
        let mut f = fixture();
        let mut cur = f.ctx.make_current(&mut f.driver, Some(&f.target)).unwrap();
        f.registry.destroy(&mut cur, f.texture).unwrap();
        let err = FramePresenter::default()
            .present(&mut cur, &f.registry, &f.texture, &f.target, &mut NullCompositor)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::StaleResource(_)));
    }

    #[test]
    fn empty_texture_fills_surface() {
        let mut f = fixture();
        let mut presenter = FramePresenter::new(ResizeMode::Contain, true);
        let mut cur = f.ctx.make_current(&mut f.driver, Some(&f.target)).unwrap();
        let report = presenter
            .present(&mut cur, &f.registry, &f.texture, &f.target, &mut NullCompositor)
            .unwrap();
        assert_eq!(report.frame, None);
        assert_eq!(report.transform, PreviewTransform::fill(Extent::new(640, 480), true));
    }
}
