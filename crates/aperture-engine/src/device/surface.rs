use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::coords::Extent;

use super::{
    ContextIdentity, CurrentContext, Driver, DriverError, GraphicsError, NativeWindow, SurfaceId,
};

/// A drawable the context can present into.
///
/// Clones observe the same validity flag, so a target handed to another
/// component notices when [`SurfaceBinding`] detaches or replaces it.
#[derive(Debug, Clone)]
pub struct SurfaceTarget {
    id: SurfaceId,
    window: NativeWindow,
    extent: Extent,
    owner: ContextIdentity,
    valid: Arc<AtomicBool>,
}

impl SurfaceTarget {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn window(&self) -> &NativeWindow {
        &self.window
    }

    /// Size in physical pixels, as of the most recent resize.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn owner(&self) -> ContextIdentity {
        self.owner
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }

    fn same_as(&self, other: &SurfaceTarget) -> bool {
        Arc::ptr_eq(&self.valid, &other.valid)
    }
}

/// Binds platform windows to renderable surfaces and tracks which one is live.
#[derive(Debug, Default)]
pub struct SurfaceBinding {
    current: Option<SurfaceTarget>,
}

impl SurfaceBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a drawable for `window` sized `width` x `height`.
    ///
    /// A previously attached surface is detached first; the binding tracks a
    /// single live target.
    pub fn attach<D: Driver>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        window: NativeWindow,
        width: u32,
        height: u32,
    ) -> Result<SurfaceTarget, GraphicsError> {
        let extent = Extent::new(width, height);
        if extent.is_empty() {
            return Err(GraphicsError::precondition(format!(
                "cannot attach a surface of size {extent}"
            )));
        }

        if let Some(previous) = self.current.take() {
            log::debug!("replacing surface {:?} on attach", previous.id);
            Self::release(current, &previous);
        }

        let target = Self::create(current, window, extent)?;
        log::info!("surface {:?} attached ({extent}) to {}", target.id, target.owner);
        self.current = Some(target.clone());
        Ok(target)
    }

    /// Recreates `target` at the new size.
    ///
    /// The old drawable stays valid until the new one exists, so a failed
    /// resize leaves the previous target usable. The driver hands the
    /// window's swapchain over to the new id.
    pub fn resize<D: Driver>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        target: &SurfaceTarget,
        width: u32,
        height: u32,
    ) -> Result<SurfaceTarget, GraphicsError> {
        if !target.is_valid() {
            return Err(GraphicsError::stale(format!(
                "surface {:?} was already detached",
                target.id
            )));
        }
        if target.owner != current.identity() {
            return Err(GraphicsError::stale(format!(
                "surface {:?} belongs to {}, not the current {}",
                target.id,
                target.owner,
                current.identity()
            )));
        }

        let extent = Extent::new(width, height);
        if extent.is_empty() {
            return Err(GraphicsError::precondition(format!(
                "cannot resize surface {:?} to {extent}",
                target.id
            )));
        }

        let replacement = Self::create(current, target.window, extent)?;
        Self::release(current, target);

        log::debug!(
            "surface {:?} ({}) replaced by {:?} ({extent})",
            target.id,
            target.extent,
            replacement.id
        );
        self.current = Some(replacement.clone());
        Ok(replacement)
    }

    /// Releases the drawable behind `target`. Detaching an already invalid
    /// target does nothing.
    pub fn detach<D: Driver>(
        &mut self,
        current: &mut CurrentContext<'_, D>,
        target: &SurfaceTarget,
    ) {
        if self.current.as_ref().is_some_and(|c| c.same_as(target)) {
            self.current = None;
        }
        if Self::release(current, target) {
            log::info!("surface {:?} detached", target.id);
        }
    }

    /// Releases the live surface, if any.
    pub fn detach_all<D: Driver>(&mut self, current: &mut CurrentContext<'_, D>) -> bool {
        match self.current.take() {
            Some(target) => {
                Self::release(current, &target);
                log::info!("surface {:?} detached", target.id);
                true
            }
            None => false,
        }
    }

    /// Invalidates the live surface without a driver call, for when the
    /// context it belongs to can no longer be made current.
    pub fn abandon(&mut self) -> Option<SurfaceTarget> {
        let target = self.current.take()?;
        target.invalidate();
        log::warn!("surface {:?} abandoned without release", target.id);
        Some(target)
    }

    pub fn is_valid(&self, target: &SurfaceTarget) -> bool {
        target.is_valid()
    }

    /// The live target, if one is attached.
    pub fn current(&self) -> Option<&SurfaceTarget> {
        self.current.as_ref()
    }

    fn create<D: Driver>(
        current: &mut CurrentContext<'_, D>,
        window: NativeWindow,
        extent: Extent,
    ) -> Result<SurfaceTarget, GraphicsError> {
        let context = current.context_id();
        let id = current
            .driver()
            .create_surface(context, &window, extent)
            .map_err(|e| match e {
                DriverError::BadContext => GraphicsError::precondition(e.to_string()),
                other => GraphicsError::ContextBinding(format!("surface creation failed: {other}")),
            })?;

        Ok(SurfaceTarget {
            id,
            window,
            extent,
            owner: current.identity(),
            valid: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Returns whether the target was still valid.
    fn release<D: Driver>(current: &mut CurrentContext<'_, D>, target: &SurfaceTarget) -> bool {
        if !target.invalidate() {
            return false;
        }
        if target.owner != current.identity() {
            // Created by a context that is gone; its drawables went with it.
            log::warn!(
                "surface {:?} of {} released from {}",
                target.id,
                target.owner,
                current.identity()
            );
            return true;
        }
        let context = current.context_id();
        current.driver().destroy_surface(context, target.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ContextConfig, GraphicsContext, HeadlessDriver};

    fn setup() -> (HeadlessDriver, GraphicsContext) {
        let mut driver = HeadlessDriver::new();
        let ctx =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();
        (driver, ctx)
    }

    #[test]
    fn attach_creates_sized_surface() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let target = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
        assert!(target.is_valid());
        assert_eq!(target.extent(), Extent::new(640, 480));
        assert_eq!(probe.surface_extent(target.id()), Some(Extent::new(640, 480)));
        assert_eq!(binding.current().map(|t| t.id()), Some(target.id()));
    }

    #[test]
    fn zero_sized_attach_is_precondition() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let err = binding.attach(&mut cur, NativeWindow::offscreen(1), 0, 480).unwrap_err();
        assert!(matches!(err, GraphicsError::Precondition(_)));
        assert_eq!(probe.live_surfaces(), 0);
    }

    #[test]
    fn resize_recreates_and_invalidates_old_target() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let old = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
        let new = binding.resize(&mut cur, &old, 1280, 720).unwrap();

        assert!(!old.is_valid());
        assert!(new.is_valid());
        assert_ne!(old.id(), new.id());
        assert_eq!(new.window(), old.window());
        assert_eq!(probe.live_surfaces(), 1);
        assert_eq!(probe.surface_extent(new.id()), Some(Extent::new(1280, 720)));
    }

    #[test]
    fn resize_reuses_the_window_binding() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let mut target = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
        for (w, h) in [(800, 600), (1024, 768), (320, 240)] {
            target = binding.resize(&mut cur, &target, w, h).unwrap();
        }

        assert_eq!(probe.native_surface_count(), 1);
        assert_eq!(probe.live_surfaces(), 1);
        assert_eq!(probe.surface_extent(target.id()), Some(Extent::new(320, 240)));
        drop(cur);
        ctx.make_current(&mut driver, Some(&target)).unwrap();
    }

    #[test]
    fn resize_to_same_size_still_recreates() {
        let (mut driver, mut ctx) = setup();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let old = binding.attach(&mut cur, NativeWindow::offscreen(1), 320, 240).unwrap();
        let new = binding.resize(&mut cur, &old, 320, 240).unwrap();
        assert_ne!(old.id(), new.id());
    }

    #[test]
    fn failed_resize_keeps_old_target() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let old = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
        probe.fail_next_surface(DriverError::BadNativeWindow("gone".into()));
        let err = binding.resize(&mut cur, &old, 800, 600).unwrap_err();

        assert!(matches!(err, GraphicsError::ContextBinding(_)));
        assert!(old.is_valid());
        assert_eq!(binding.current().map(|t| t.id()), Some(old.id()));
    }

    #[test]
    fn resize_of_detached_target_is_stale() {
        let (mut driver, mut ctx) = setup();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let target = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
        binding.detach(&mut cur, &target);
        let err = binding.resize(&mut cur, &target, 800, 600).unwrap_err();
        assert!(matches!(err, GraphicsError::StaleResource(_)));
    }

    #[test]
    fn detach_is_idempotent() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let mut cur = ctx.make_current(&mut driver, None).unwrap();

        let target = binding.attach(&mut cur, NativeWindow::offscreen(1), 640, 480).unwrap();
        binding.detach(&mut cur, &target);
        let calls = probe.calls();
        binding.detach(&mut cur, &target);

        assert_eq!(probe.calls(), calls);
        assert_eq!(probe.live_surfaces(), 0);
        assert!(!binding.is_valid(&target));
        assert!(binding.current().is_none());
    }

    #[test]
    fn invalid_target_cannot_be_made_current() {
        let (mut driver, mut ctx) = setup();
        let mut binding = SurfaceBinding::new();
        let target = {
            let mut cur = ctx.make_current(&mut driver, None).unwrap();
            let target = binding.attach(&mut cur, NativeWindow::offscreen(1), 64, 64).unwrap();
            binding.detach(&mut cur, &target);
            target
        };

        let err = ctx.make_current(&mut driver, Some(&target)).err().unwrap();
        assert!(matches!(err, GraphicsError::ContextBinding(_)));
    }

    #[test]
    fn abandon_invalidates_without_driver_calls() {
        let (mut driver, mut ctx) = setup();
        let probe = driver.probe();
        let mut binding = SurfaceBinding::new();
        let target = {
            let mut cur = ctx.make_current(&mut driver, None).unwrap();
            binding.attach(&mut cur, NativeWindow::offscreen(1), 64, 64).unwrap()
        };

        let calls = probe.calls();
        let abandoned = binding.abandon().unwrap();
        assert_eq!(abandoned.id(), target.id());
        assert!(!target.is_valid());
        assert_eq!(probe.calls(), calls);
    }
}
