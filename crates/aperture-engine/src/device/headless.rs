//! In-memory driver.
//!
//! Tracks every handle it hands out so tests can assert on leaks, and lets
//! tests inject the failures a real driver produces (exhaustion, surface loss,
//! rejected frames). Orphaned handles are kept, not reclaimed, when their
//! context is destroyed so leaks stay observable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::coords::Extent;
use crate::frame::{CameraFrame, FrameId};

use super::{
    ConfigDesc, ConfigId, ContextId, DisplayId, Driver, DriverError, NativeWindow, Readback,
    SurfaceId, TextureId, TextureTarget,
};

/// Drawing surface handed to compositors by [`HeadlessDriver`].
#[derive(Debug, Clone)]
pub struct HeadlessCanvas {
    pub surface: SurfaceId,
    pub texture: TextureId,
    pub extent: Extent,
    /// Frame currently attached to `texture`.
    pub frame: Option<FrameId>,
    draws: u32,
}

impl HeadlessCanvas {
    /// Records one draw command.
    pub fn draw(&mut self) {
        self.draws += 1;
    }
}

/// Share handle of a headless context.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeadlessShare(ContextId);

struct TextureEntry {
    target: TextureTarget,
    /// Last uploaded frame; its buffer is shared with the producer.
    image: Option<CameraFrame>,
}

struct SurfaceEntry {
    context: ContextId,
    window: NativeWindow,
    extent: Extent,
    lost: bool,
}

#[derive(Default)]
struct Faults {
    context: Option<DriverError>,
    texture: Option<DriverError>,
    upload: Option<DriverError>,
    surface: Option<DriverError>,
    readback: Option<DriverError>,
    lose_on_present: bool,
    texture_budget: Option<usize>,
    present_delay: Option<Duration>,
}

struct State {
    configs: Vec<ConfigDesc>,
    next_id: u64,
    displays: HashSet<DisplayId>,
    contexts: HashMap<ContextId, DisplayId>,
    textures: HashMap<(ContextId, TextureId), TextureEntry>,
    next_texture: HashMap<ContextId, u32>,
    surfaces: HashMap<SurfaceId, SurfaceEntry>,
    current: Option<(ContextId, Option<SurfaceId>)>,
    faults: Faults,

    calls: u64,
    context_destroys: u64,
    display_closes: u64,
    shared_contexts: u64,
    native_surfaces: u64,
    uploaded: Vec<FrameId>,
    presented: Vec<FrameId>,
    presents: u64,
    draws: u64,
}

impl State {
    fn new(configs: Vec<ConfigDesc>) -> Self {
        Self {
            configs,
            next_id: 1,
            displays: HashSet::new(),
            contexts: HashMap::new(),
            textures: HashMap::new(),
            next_texture: HashMap::new(),
            surfaces: HashMap::new(),
            current: None,
            faults: Faults::default(),
            calls: 0,
            context_destroys: 0,
            display_closes: 0,
            shared_contexts: 0,
            native_surfaces: 0,
            uploaded: Vec::new(),
            presented: Vec::new(),
            presents: 0,
            draws: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn live_context(&self, context: ContextId) -> Result<(), DriverError> {
        if self.contexts.contains_key(&context) {
            Ok(())
        } else {
            Err(DriverError::BadContext)
        }
    }
}

/// Configurations advertised by default: an sRGB and a linear RGBA8 config
/// with external sampling, plus a 16-bit config without it.
pub fn default_headless_configs() -> Vec<ConfigDesc> {
    vec![
        ConfigDesc {
            id: ConfigId(1),
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            srgb: true,
            external_sampling: true,
        },
        ConfigDesc {
            id: ConfigId(2),
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            srgb: false,
            external_sampling: true,
        },
        ConfigDesc {
            id: ConfigId(3),
            red_bits: 5,
            green_bits: 6,
            blue_bits: 5,
            alpha_bits: 0,
            srgb: false,
            external_sampling: false,
        },
    ]
}

/// Driver backed by plain data structures. Clones share state.
#[derive(Clone)]
pub struct HeadlessDriver {
    state: Arc<Mutex<State>>,
}

impl HeadlessDriver {
    pub fn new() -> Self {
        Self::with_configs(default_headless_configs())
    }

    pub fn with_configs(configs: Vec<ConfigDesc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new(configs))),
        }
    }

    /// Observation and fault-injection handle sharing this driver's state.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for HeadlessDriver {
    type Share = HeadlessShare;
    type Canvas<'a> = HeadlessCanvas;

    fn open_display(&mut self) -> Result<DisplayId, DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        let display = DisplayId(s.next_id());
        s.displays.insert(display);
        Ok(display)
    }

    fn configs(&mut self, display: DisplayId) -> Result<Vec<ConfigDesc>, DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        if !s.displays.contains(&display) {
            return Err(DriverError::NotInitialized(format!("display {display:?} is not open")));
        }
        Ok(s.configs.clone())
    }

    fn create_context(
        &mut self,
        display: DisplayId,
        config: ConfigId,
        share: Option<&HeadlessShare>,
    ) -> Result<ContextId, DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        if let Some(err) = s.faults.context.take() {
            return Err(err);
        }
        if !s.displays.contains(&display) {
            return Err(DriverError::NotInitialized(format!("display {display:?} is not open")));
        }
        if !s.configs.iter().any(|c| c.id == config) {
            return Err(DriverError::BadConfig(format!("unknown config {config:?}")));
        }
        if let Some(HeadlessShare(other)) = share {
            s.live_context(*other)?;
            s.shared_contexts += 1;
        }

        let context = ContextId(s.next_id());
        s.contexts.insert(context, display);
        s.next_texture.insert(context, 1);
        Ok(context)
    }

    fn share_handle(&self, context: ContextId) -> Option<HeadlessShare> {
        let s = self.state.lock();
        s.contexts.contains_key(&context).then_some(HeadlessShare(context))
    }

    fn make_current(
        &mut self,
        context: ContextId,
        surface: Option<SurfaceId>,
    ) -> Result<(), DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        s.live_context(context)?;
        if let Some(id) = surface {
            let entry = s.surfaces.get(&id).ok_or(DriverError::BadSurface)?;
            if entry.context != context {
                return Err(DriverError::BadMatch(format!(
                    "surface {id:?} was created by {:?}",
                    entry.context
                )));
            }
        }
        s.current = Some((context, surface));
        Ok(())
    }

    fn release_current(&mut self, context: ContextId) {
        let mut s = self.state.lock();
        s.calls += 1;
        if s.current.is_some_and(|(c, _)| c == context) {
            s.current = None;
        }
    }

    fn destroy_context(&mut self, context: ContextId) {
        let mut s = self.state.lock();
        s.calls += 1;
        if s.contexts.remove(&context).is_some() {
            s.context_destroys += 1;
        }
        s.next_texture.remove(&context);
        if s.current.is_some_and(|(c, _)| c == context) {
            s.current = None;
        }
    }

    fn close_display(&mut self, display: DisplayId) {
        let mut s = self.state.lock();
        s.calls += 1;
        if s.displays.remove(&display) {
            s.display_closes += 1;
        }
    }

    fn create_texture(
        &mut self,
        context: ContextId,
        target: TextureTarget,
    ) -> Result<TextureId, DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        s.live_context(context)?;
        if let Some(err) = s.faults.texture.take() {
            return Err(err);
        }
        if let Some(budget) = s.faults.texture_budget {
            let in_use = s.textures.keys().filter(|(c, _)| *c == context).count();
            if in_use >= budget {
                return Err(DriverError::OutOfResources);
            }
        }

        let next = s.next_texture.entry(context).or_insert(1);
        let texture = TextureId(*next);
        *next += 1;
        s.textures.insert(
            (context, texture),
            TextureEntry { target, image: None },
        );
        Ok(texture)
    }

    fn delete_texture(&mut self, context: ContextId, texture: TextureId) {
        let mut s = self.state.lock();
        s.calls += 1;
        s.textures.remove(&(context, texture));
    }

    fn upload_frame(
        &mut self,
        context: ContextId,
        texture: TextureId,
        frame: &CameraFrame,
    ) -> Result<(), DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        s.live_context(context)?;
        if let Some(err) = s.faults.upload.take() {
            return Err(err);
        }
        let entry = s
            .textures
            .get_mut(&(context, texture))
            .ok_or_else(|| DriverError::BadAccess(format!("no texture {texture:?}")))?;
        log::trace!("headless upload of {} into {texture:?} ({:?})", frame.id(), entry.target);
        entry.image = Some(frame.clone());
        s.uploaded.push(frame.id());
        Ok(())
    }

    fn read_back(
        &mut self,
        context: ContextId,
        texture: TextureId,
    ) -> Result<Readback, DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        s.live_context(context)?;
        if let Some(err) = s.faults.readback.take() {
            return Err(err);
        }
        let image = s
            .textures
            .get(&(context, texture))
            .ok_or_else(|| DriverError::BadAccess(format!("no texture {texture:?}")))?
            .image
            .as_ref()
            .ok_or_else(|| DriverError::BadAccess(format!("{texture:?} holds no image")))?;
        Ok(Readback {
            extent: image.extent(),
            format: image.format(),
            data: image.packed(),
        })
    }

    fn create_surface(
        &mut self,
        context: ContextId,
        window: &NativeWindow,
        extent: Extent,
    ) -> Result<SurfaceId, DriverError> {
        let mut s = self.state.lock();
        s.calls += 1;
        s.live_context(context)?;
        if let Some(err) = s.faults.surface.take() {
            return Err(err);
        }
        let surface = SurfaceId(s.next_id());

        let previous = s
            .surfaces
            .iter()
            .find(|(_, e)| e.context == context && e.window == *window)
            .map(|(id, _)| *id);
        let entry = match previous.and_then(|id| s.surfaces.remove(&id)) {
            Some(entry) => SurfaceEntry { extent, ..entry },
            None => {
                s.native_surfaces += 1;
                SurfaceEntry { context, window: *window, extent, lost: false }
            }
        };
        s.surfaces.insert(surface, entry);
        Ok(surface)
    }

    fn destroy_surface(&mut self, _context: ContextId, surface: SurfaceId) {
        let mut s = self.state.lock();
        s.calls += 1;
        s.surfaces.remove(&surface);
        if let Some((c, Some(bound))) = s.current {
            if bound == surface {
                s.current = Some((c, None));
            }
        }
    }

    fn render<F>(
        &mut self,
        context: ContextId,
        surface: SurfaceId,
        texture: TextureId,
        draw: F,
    ) -> Result<(), DriverError>
    where
        F: for<'c> FnOnce(&mut Self::Canvas<'c>) -> anyhow::Result<()>,
    {
        let (mut canvas, delay) = {
            let mut s = self.state.lock();
            s.calls += 1;
            s.live_context(context)?;

            let lose = std::mem::take(&mut s.faults.lose_on_present);
            let entry = s.surfaces.get_mut(&surface).ok_or(DriverError::SurfaceLost)?;
            if lose {
                entry.lost = true;
            }
            if entry.lost {
                return Err(DriverError::SurfaceLost);
            }
            let extent = entry.extent;

            let frame = s
                .textures
                .get(&(context, texture))
                .ok_or_else(|| DriverError::BadAccess(format!("no texture {texture:?}")))?
                .image
                .as_ref()
                .map(|f| f.id());

            let canvas = HeadlessCanvas { surface, texture, extent, frame, draws: 0 };
            (canvas, s.faults.present_delay)
        };

        // The lock is not held while the compositor runs or the swap "blocks".
        draw(&mut canvas).map_err(|e| DriverError::Draw(format!("{e:#}")))?;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut s = self.state.lock();
        if s.surfaces.get(&surface).is_none_or(|e| e.lost) {
            return Err(DriverError::SurfaceLost);
        }
        s.presents += 1;
        s.draws += canvas.draws as u64;
        if let Some(frame) = canvas.frame {
            s.presented.push(frame);
        }
        Ok(())
    }
}

/// Read and fault-injection access to a [`HeadlessDriver`]'s state.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Arc<Mutex<State>>,
}

impl HeadlessProbe {
    // ── accounting ────────────────────────────────────────────────────────

    /// Total driver calls made so far.
    pub fn calls(&self) -> u64 {
        self.state.lock().calls
    }

    pub fn open_displays(&self) -> usize {
        self.state.lock().displays.len()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    pub fn context_destroy_calls(&self) -> u64 {
        self.state.lock().context_destroys
    }

    pub fn display_close_calls(&self) -> u64 {
        self.state.lock().display_closes
    }

    pub fn shared_context_count(&self) -> u64 {
        self.state.lock().shared_contexts
    }

    /// Native window bindings created; a same-window resize reuses one.
    pub fn native_surface_count(&self) -> u64 {
        self.state.lock().native_surfaces
    }

    /// Frames attached to textures, in upload order.
    pub fn uploaded_frames(&self) -> Vec<FrameId> {
        self.state.lock().uploaded.clone()
    }

    /// Frames that reached the screen, in present order.
    pub fn presented_frames(&self) -> Vec<FrameId> {
        self.state.lock().presented.clone()
    }

    pub fn present_count(&self) -> u64 {
        self.state.lock().presents
    }

    pub fn draw_calls(&self) -> u64 {
        self.state.lock().draws
    }

    pub fn surface_extent(&self, surface: SurfaceId) -> Option<Extent> {
        self.state.lock().surfaces.get(&surface).map(|e| e.extent)
    }

    pub fn surface_window(&self, surface: SurfaceId) -> Option<NativeWindow> {
        self.state.lock().surfaces.get(&surface).map(|e| e.window)
    }

    pub fn current(&self) -> Option<(ContextId, Option<SurfaceId>)> {
        self.state.lock().current
    }

    // ── fault injection ───────────────────────────────────────────────────

    pub fn fail_next_context(&self, err: DriverError) {
        self.state.lock().faults.context = Some(err);
    }

    pub fn fail_next_texture(&self, err: DriverError) {
        self.state.lock().faults.texture = Some(err);
    }

    pub fn fail_next_upload(&self, err: DriverError) {
        self.state.lock().faults.upload = Some(err);
    }

    pub fn fail_next_surface(&self, err: DriverError) {
        self.state.lock().faults.surface = Some(err);
    }

    pub fn fail_next_readback(&self, err: DriverError) {
        self.state.lock().faults.readback = Some(err);
    }

    /// Limits live textures per context; further allocations report exhaustion.
    pub fn set_texture_budget(&self, budget: Option<usize>) {
        self.state.lock().faults.texture_budget = budget;
    }

    /// The next present finds its surface lost, as when the window is
    /// destroyed under the renderer.
    pub fn lose_surface_on_next_present(&self) {
        self.state.lock().faults.lose_on_present = true;
    }

    /// Marks every live surface lost immediately.
    pub fn lose_all_surfaces(&self) {
        for entry in self.state.lock().surfaces.values_mut() {
            entry.lost = true;
        }
    }

    /// Makes every swap stall for `delay`.
    pub fn set_present_delay(&self, delay: Option<Duration>) {
        self.state.lock().faults.present_delay = delay;
    }
}
