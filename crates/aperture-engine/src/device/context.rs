use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use super::{
    ConfigDesc, ContextConfig, ContextId, DisplayId, Driver, DriverError, GraphicsError,
    SurfaceId, SurfaceTarget,
};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one [`GraphicsContext`] instance.
///
/// Driver handles may be reused after destruction; identities never are.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContextIdentity(u64);

impl ContextIdentity {
    fn next() -> Self {
        Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ContextIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Picks the configuration to create a context with.
///
/// Candidates below the minimum channel depths, or without external sampling
/// when it is required, are rejected. Among the rest an sRGB config wins when
/// preferred; ties go to the smallest config, then to driver order.
pub fn choose_config(configs: &[ConfigDesc], req: &ContextConfig) -> Option<ConfigDesc> {
    let eligible = configs.iter().filter(|c| {
        c.min_color_bits() >= req.min_color_bits
            && c.alpha_bits >= req.min_alpha_bits
            && (c.external_sampling || !req.require_external_sampling)
    });

    eligible
        .min_by_key(|c| {
            let srgb_rank = if req.prefer_srgb && c.srgb { 0u8 } else { 1 };
            (srgb_rank, c.total_bits())
        })
        .copied()
}

/// Owns the rendering context: display connection, negotiated configuration
/// and context handle.
///
/// A context is valid from a successful [`initialize`](Self::initialize) until
/// [`destroy`](Self::destroy). Re-initializing produces a new instance with a
/// new [`ContextIdentity`].
#[derive(Debug)]
pub struct GraphicsContext {
    identity: ContextIdentity,
    display: Option<DisplayId>,
    context: Option<ContextId>,
    config: ConfigDesc,

    /// Thread that currently holds the context current.
    current_thread: Option<ThreadId>,
    /// Drawable bound by the last `make_current`.
    bound_surface: Option<SurfaceId>,
}

impl GraphicsContext {
    /// Opens a display, negotiates a configuration and creates a context,
    /// optionally sharing objects with an existing one.
    pub fn initialize<D: Driver>(
        driver: &mut D,
        config: &ContextConfig,
        share: Option<&D::Share>,
    ) -> Result<Self, GraphicsError> {
        let display = driver.open_display().map_err(GraphicsError::creation)?;

        match Self::create_on(driver, display, config, share) {
            Ok((context, chosen)) => {
                let ctx = Self {
                    identity: ContextIdentity::next(),
                    display: Some(display),
                    context: Some(context),
                    config: chosen,
                    current_thread: None,
                    bound_surface: None,
                };
                log::info!(
                    "graphics context {} created (config {:?}: {}/{}/{}/{} bits, srgb={}, shared={})",
                    ctx.identity,
                    chosen.id,
                    chosen.red_bits,
                    chosen.green_bits,
                    chosen.blue_bits,
                    chosen.alpha_bits,
                    chosen.srgb,
                    share.is_some(),
                );
                Ok(ctx)
            }
            Err(err) => {
                driver.close_display(display);
                log::error!("graphics context creation failed: {err}");
                Err(err)
            }
        }
    }

    fn create_on<D: Driver>(
        driver: &mut D,
        display: DisplayId,
        config: &ContextConfig,
        share: Option<&D::Share>,
    ) -> Result<(ContextId, ConfigDesc), GraphicsError> {
        let configs = driver.configs(display).map_err(GraphicsError::creation)?;
        let chosen = choose_config(&configs, config).ok_or_else(|| {
            GraphicsError::creation(DriverError::BadConfig(format!(
                "none of {} configs has >= {} bits per channel{}",
                configs.len(),
                config.min_color_bits,
                if config.require_external_sampling { " and external sampling" } else { "" },
            )))
        })?;

        let context = driver
            .create_context(display, chosen.id, share)
            .map_err(GraphicsError::creation)?;
        Ok((context, chosen))
    }

    pub fn identity(&self) -> ContextIdentity {
        self.identity
    }

    pub fn config(&self) -> ConfigDesc {
        self.config
    }

    pub fn is_alive(&self) -> bool {
        self.context.is_some()
    }

    /// Thread currently holding this context, if any.
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current_thread
    }

    pub fn bound_surface(&self) -> Option<SurfaceId> {
        self.bound_surface
    }

    /// Exports a handle another context can share objects with.
    pub fn share_handle<D: Driver>(&self, driver: &D) -> Option<D::Share> {
        self.context.and_then(|c| driver.share_handle(c))
    }

    /// Binds the context, and optionally a drawable, to the calling thread.
    ///
    /// The returned token is the capability every GPU-touching operation
    /// requires. It borrows the driver and cannot leave the thread.
    pub fn make_current<'a, D: Driver>(
        &mut self,
        driver: &'a mut D,
        target: Option<&SurfaceTarget>,
    ) -> Result<CurrentContext<'a, D>, GraphicsError> {
        let context = self.context.ok_or_else(|| {
            GraphicsError::precondition(format!("context {} has been destroyed", self.identity))
        })?;

        let this_thread = thread::current().id();
        if let Some(holder) = self.current_thread.filter(|t| *t != this_thread) {
            return Err(GraphicsError::ContextBinding(format!(
                "context {} is current on {holder:?}",
                self.identity
            )));
        }

        let surface = match target {
            None => None,
            Some(t) if t.owner() != self.identity => {
                return Err(GraphicsError::ContextBinding(format!(
                    "surface {:?} belongs to context {}, not {}",
                    t.id(),
                    t.owner(),
                    self.identity
                )));
            }
            Some(t) if !t.is_valid() => {
                return Err(GraphicsError::ContextBinding(format!(
                    "surface {:?} is no longer valid",
                    t.id()
                )));
            }
            Some(t) => Some(t.id()),
        };

        driver
            .make_current(context, surface)
            .map_err(|e| GraphicsError::ContextBinding(e.to_string()))?;

        self.current_thread = Some(this_thread);
        self.bound_surface = surface;

        Ok(CurrentContext {
            driver,
            identity: self.identity,
            context,
            surface,
            _not_send: PhantomData,
        })
    }

    /// Drops the calling thread's binding so another thread may take the context.
    pub fn release_current<D: Driver>(&mut self, driver: &mut D) {
        if let (Some(context), Some(_)) = (self.context, self.current_thread) {
            driver.release_current(context);
        }
        self.current_thread = None;
        self.bound_surface = None;
    }

    /// Releases the context and the display connection. Idempotent.
    pub fn destroy<D: Driver>(&mut self, driver: &mut D) {
        let Some(context) = self.context.take() else {
            log::debug!("graphics context {} already destroyed", self.identity);
            return;
        };

        if self.current_thread.take().is_some() {
            driver.release_current(context);
        }
        self.bound_surface = None;
        driver.destroy_context(context);

        if let Some(display) = self.display.take() {
            driver.close_display(display);
        }
        log::info!("graphics context {} destroyed", self.identity);
    }
}

/// Capability proving that a context is current on this thread.
///
/// Obtained from [`GraphicsContext::make_current`]; required by texture,
/// surface and present operations. Not `Send`.
pub struct CurrentContext<'a, D: Driver> {
    driver: &'a mut D,
    identity: ContextIdentity,
    context: ContextId,
    surface: Option<SurfaceId>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, D: Driver> CurrentContext<'a, D> {
    pub fn identity(&self) -> ContextIdentity {
        self.identity
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Drawable bound alongside the context, if any.
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn driver(&mut self) -> &mut D {
        self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ConfigId, HeadlessDriver};

    fn cfg(id: u32, bits: u8, alpha: u8, srgb: bool, external: bool) -> ConfigDesc {
        ConfigDesc {
            id: ConfigId(id),
            red_bits: bits,
            green_bits: bits,
            blue_bits: bits,
            alpha_bits: alpha,
            srgb,
            external_sampling: external,
        }
    }

    // ── negotiation ───────────────────────────────────────────────────────

    #[test]
    fn rejects_shallow_configs() {
        let configs = [cfg(1, 5, 0, false, true)];
        assert_eq!(choose_config(&configs, &ContextConfig::default()), None);
    }

    #[test]
    fn rejects_configs_without_external_sampling_when_required() {
        let configs = [cfg(1, 8, 8, true, false)];
        assert_eq!(choose_config(&configs, &ContextConfig::default()), None);

        let relaxed = ContextConfig { require_external_sampling: false, ..Default::default() };
        assert_eq!(choose_config(&configs, &relaxed).map(|c| c.id), Some(ConfigId(1)));
    }

    #[test]
    fn prefers_srgb_then_smallest() {
        let configs = [
            cfg(1, 10, 2, false, true),
            cfg(2, 8, 8, false, true),
            cfg(3, 8, 8, true, true),
            cfg(4, 8, 0, false, true),
        ];
        let chosen = choose_config(&configs, &ContextConfig::default()).unwrap();
        assert_eq!(chosen.id, ConfigId(3));

        let linear = ContextConfig { prefer_srgb: false, ..Default::default() };
        assert_eq!(choose_config(&configs, &linear).unwrap().id, ConfigId(4));
    }

    #[test]
    fn alpha_requirement_filters() {
        let configs = [cfg(1, 8, 0, true, true), cfg(2, 8, 8, false, true)];
        let req = ContextConfig { min_alpha_bits: 8, ..Default::default() };
        assert_eq!(choose_config(&configs, &req).unwrap().id, ConfigId(2));
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn initialize_destroy_initialize_succeeds() {
        let mut driver = HeadlessDriver::new();
        let probe = driver.probe();

        let mut first = GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None)
            .expect("first context");
        first.destroy(&mut driver);
        assert_eq!(probe.live_contexts(), 0);
        assert_eq!(probe.open_displays(), 0);

        let second = GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None)
            .expect("second context");
        assert_ne!(first.identity(), second.identity());
        assert!(second.is_alive());
        assert_eq!(probe.live_contexts(), 1);
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut driver = HeadlessDriver::new();
        let probe = driver.probe();
        let mut ctx =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();

        ctx.destroy(&mut driver);
        ctx.destroy(&mut driver);

        assert!(!ctx.is_alive());
        assert_eq!(probe.context_destroy_calls(), 1);
        assert_eq!(probe.display_close_calls(), 1);
    }

    #[test]
    fn creation_failure_carries_driver_code_and_closes_display() {
        let mut driver = HeadlessDriver::new();
        let probe = driver.probe();
        probe.fail_next_context(DriverError::BadAccess("busy".into()));

        let err = GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None)
            .unwrap_err();
        assert_eq!(err, GraphicsError::ContextCreation {
            code: 0x3002,
            message: "resource busy or owned elsewhere: busy".into(),
        });
        assert_eq!(probe.open_displays(), 0);
    }

    #[test]
    fn no_compatible_config_is_creation_error() {
        let mut driver = HeadlessDriver::with_configs(vec![cfg(1, 5, 0, false, true)]);
        let err = GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::ContextCreation { code: 0x3005, .. }));
    }

    #[test]
    fn shared_context_gets_its_own_identity() {
        let mut driver = HeadlessDriver::new();
        let probe = driver.probe();
        let first =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();
        let share = first.share_handle(&driver).expect("share handle");
        let second =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), Some(&share))
                .unwrap();

        assert_ne!(first.identity(), second.identity());
        assert_eq!(probe.shared_context_count(), 1);
    }

    // ── currency ──────────────────────────────────────────────────────────

    #[test]
    fn make_current_after_destroy_is_precondition() {
        let mut driver = HeadlessDriver::new();
        let mut ctx =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();
        ctx.destroy(&mut driver);
        let err = ctx.make_current(&mut driver, None).err().unwrap();
        assert!(matches!(err, GraphicsError::Precondition(_)));
    }

    #[test]
    fn context_current_elsewhere_cannot_be_bound() {
        let mut driver = HeadlessDriver::new();
        let mut ctx =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();
        ctx.make_current(&mut driver, None).unwrap();

        let (mut ctx, mut driver) = std::thread::spawn(move || {
            let err = ctx.make_current(&mut driver, None).err().unwrap();
            assert!(matches!(err, GraphicsError::ContextBinding(_)));
            (ctx, driver)
        })
        .join()
        .unwrap();

        // Releasing on the owning thread frees it again.
        ctx.release_current(&mut driver);
        assert!(ctx.current_thread().is_none());
    }

    #[test]
    fn token_reports_identity_and_surface() {
        let mut driver = HeadlessDriver::new();
        let mut ctx =
            GraphicsContext::initialize(&mut driver, &ContextConfig::default(), None).unwrap();
        let identity = ctx.identity();
        let token = ctx.make_current(&mut driver, None).unwrap();
        assert_eq!(token.identity(), identity);
        assert_eq!(token.surface(), None);
    }
}
