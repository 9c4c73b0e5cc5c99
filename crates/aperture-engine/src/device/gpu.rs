use std::collections::HashMap;

use crate::coords::Extent;
use crate::frame::{CameraFrame, PixelFormat};

use super::{
    ConfigDesc, ConfigId, ContextId, DisplayId, Driver, DriverError, NativeWindow, Readback,
    SurfaceId, TextureId, TextureTarget, WgpuDriverConfig,
};

/// Color formats offered as context configurations, in preference order.
/// `ConfigId(n)` is the n-th entry (1-based).
const CANDIDATE_FORMATS: [(wgpu::TextureFormat, [u8; 4], bool); 5] = [
    (wgpu::TextureFormat::Bgra8UnormSrgb, [8, 8, 8, 8], true),
    (wgpu::TextureFormat::Rgba8UnormSrgb, [8, 8, 8, 8], true),
    (wgpu::TextureFormat::Bgra8Unorm, [8, 8, 8, 8], false),
    (wgpu::TextureFormat::Rgba8Unorm, [8, 8, 8, 8], false),
    (wgpu::TextureFormat::Rgb10a2Unorm, [10, 10, 10, 2], false),
];

/// Share handle of a wgpu context: the device and queue a shared context reuses.
#[derive(Clone)]
pub struct WgpuShare {
    display: DisplayId,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

/// Drawing surface handed to compositors by [`WgpuDriver`].
///
/// The encoder is submitted and the image presented after the compositor
/// returns; compositors only record commands.
pub struct WgpuCanvas<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,

    /// Swapchain image being drawn.
    pub target: &'a wgpu::TextureView,
    pub target_format: wgpu::TextureFormat,
    pub target_extent: Extent,

    /// Camera texture, once a frame has been uploaded into it.
    pub source: Option<&'a wgpu::TextureView>,
    pub source_extent: Option<Extent>,
}

struct Display {
    instance: wgpu::Instance,
    adapter: Option<wgpu::Adapter>,
}

struct GpuTexture {
    target: TextureTarget,
    image: Option<CameraImage>,
}

/// Storage for the most recent frame. Recreated when the frame size or
/// format changes.
struct CameraImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: Extent,
    format: wgpu::TextureFormat,
}

struct Context {
    display: DisplayId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    srgb: bool,
    textures: HashMap<TextureId, GpuTexture>,
    next_texture: u32,
}

struct Surface {
    context: ContextId,
    window: NativeWindow,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// [`Driver`] on top of wgpu.
///
/// Mapping: a display is a `wgpu::Instance` plus the adapter picked on first
/// configuration query, a context is a `Device`/`Queue` pair, a drawable is a
/// configured `wgpu::Surface`. wgpu has no thread-bound currency; the driver
/// only records which context was made current.
pub struct WgpuDriver {
    config: WgpuDriverConfig,
    next_id: u64,
    displays: HashMap<DisplayId, Display>,
    contexts: HashMap<ContextId, Context>,
    surfaces: HashMap<SurfaceId, Surface>,
    current: Option<ContextId>,
}

impl WgpuDriver {
    pub fn new(config: WgpuDriverConfig) -> Self {
        Self {
            config,
            next_id: 1,
            displays: HashMap::new(),
            contexts: HashMap::new(),
            surfaces: HashMap::new(),
            current: None,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn adapter(&mut self, display: DisplayId) -> Result<&wgpu::Adapter, DriverError> {
        let power_preference = self.config.power_preference;
        let entry = self
            .displays
            .get_mut(&display)
            .ok_or_else(|| {
                DriverError::NotInitialized(format!("display {display:?} is not open"))
            })?;

        if entry.adapter.is_none() {
            // Adapter acquisition is asynchronous under wgpu; the render thread
            // has no executor, so block on it.
            let adapter = pollster::block_on(entry.instance.request_adapter(
                &wgpu::RequestAdapterOptions {
                    power_preference,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                },
            ))
            .map_err(|e| DriverError::NotInitialized(format!("no suitable GPU adapter: {e}")))?;

            let info = adapter.get_info();
            log::info!("adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);
            entry.adapter = Some(adapter);
        }

        entry
            .adapter
            .as_ref()
            .ok_or_else(|| DriverError::NotInitialized("adapter unavailable".into()))
    }

    fn context(&self, context: ContextId) -> Result<&Context, DriverError> {
        self.contexts.get(&context).ok_or(DriverError::BadContext)
    }

    fn context_mut(&mut self, context: ContextId) -> Result<&mut Context, DriverError> {
        self.contexts.get_mut(&context).ok_or(DriverError::BadContext)
    }

    /// Moves the swapchain of `previous` to a fresh id, reconfigured at
    /// `extent`. On failure `previous` is left in place.
    fn hand_over_surface(
        &mut self,
        context: ContextId,
        previous: SurfaceId,
        extent: Extent,
    ) -> Result<SurfaceId, DriverError> {
        let device = self.context(context)?.device.clone();
        let mut entry = self.surfaces.remove(&previous).ok_or(DriverError::BadSurface)?;

        let old = entry.config.clone();
        entry.config.width = extent.width.max(1);
        entry.config.height = extent.height.max(1);
        if let Err(err) = configure(&device, &entry.surface, &entry.config) {
            entry.config = old;
            if let Err(restore) = configure(&device, &entry.surface, &entry.config) {
                log::warn!("restoring {previous:?} after a failed resize failed: {restore}");
            }
            self.surfaces.insert(previous, entry);
            return Err(err);
        }

        let id = SurfaceId(self.next_id());
        log::trace!("swapchain of {previous:?} handed over to {id:?} ({extent})");
        self.surfaces.insert(id, entry);
        Ok(id)
    }
}

impl Default for WgpuDriver {
    fn default() -> Self {
        Self::new(WgpuDriverConfig::default())
    }
}

impl Driver for WgpuDriver {
    type Share = WgpuShare;
    type Canvas<'a> = WgpuCanvas<'a>;

    fn open_display(&mut self) -> Result<DisplayId, DriverError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.config.backends,
            ..Default::default()
        });
        let display = DisplayId(self.next_id());
        self.displays.insert(display, Display { instance, adapter: None });
        Ok(display)
    }

    fn configs(&mut self, display: DisplayId) -> Result<Vec<ConfigDesc>, DriverError> {
        let adapter = self.adapter(display)?;

        let mut configs = Vec::new();
        for (index, (format, bits, srgb)) in CANDIDATE_FORMATS.iter().enumerate() {
            let features = adapter.get_texture_format_features(*format);
            if !features.allowed_usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
                continue;
            }
            let external_sampling = camera_formats(*srgb)
                .into_iter()
                .all(|f| samples_camera_uploads(&adapter.get_texture_format_features(f)));

            configs.push(ConfigDesc {
                id: ConfigId(index as u32 + 1),
                red_bits: bits[0],
                green_bits: bits[1],
                blue_bits: bits[2],
                alpha_bits: bits[3],
                srgb: *srgb,
                external_sampling,
            });
        }
        Ok(configs)
    }

    fn create_context(
        &mut self,
        display: DisplayId,
        config: ConfigId,
        share: Option<&WgpuShare>,
    ) -> Result<ContextId, DriverError> {
        let (format, _, srgb) = config
            .0
            .checked_sub(1)
            .and_then(|i| CANDIDATE_FORMATS.get(i as usize))
            .copied()
            .ok_or_else(|| DriverError::BadConfig(format!("unknown config {config:?}")))?;

        let (device, queue) = match share {
            Some(share) if share.display != display => {
                return Err(DriverError::BadMatch(format!(
                    "shared context lives on {:?}, not {display:?}",
                    share.display
                )));
            }
            Some(share) => (share.device.clone(), share.queue.clone()),
            None => {
                let required_features = self.config.required_features;
                let required_limits = self.config.required_limits.clone();
                let adapter = self.adapter(display)?;
                pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
                    label: Some("aperture device"),
                    required_features,
                    required_limits,
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                }))
                .map_err(|e| {
                    DriverError::BadAccess(format!("failed to create wgpu device/queue: {e}"))
                })?
            }
        };

        let context = ContextId(self.next_id());
        self.contexts.insert(
            context,
            Context {
                display,
                device,
                queue,
                format,
                srgb,
                textures: HashMap::new(),
                next_texture: 1,
            },
        );
        Ok(context)
    }

    fn share_handle(&self, context: ContextId) -> Option<WgpuShare> {
        self.contexts.get(&context).map(|c| WgpuShare {
            display: c.display,
            device: c.device.clone(),
            queue: c.queue.clone(),
        })
    }

    fn make_current(
        &mut self,
        context: ContextId,
        surface: Option<SurfaceId>,
    ) -> Result<(), DriverError> {
        self.context(context)?;
        if let Some(id) = surface {
            let entry = self.surfaces.get(&id).ok_or(DriverError::BadSurface)?;
            if entry.context != context {
                return Err(DriverError::BadMatch(format!(
                    "surface {id:?} was created by {:?}",
                    entry.context
                )));
            }
        }
        self.current = Some(context);
        Ok(())
    }

    fn release_current(&mut self, context: ContextId) {
        if self.current == Some(context) {
            self.current = None;
        }
    }

    fn destroy_context(&mut self, context: ContextId) {
        let Some(ctx) = self.contexts.remove(&context) else {
            return;
        };
        if !ctx.textures.is_empty() {
            log::debug!("{} texture(s) dropped with {context:?}", ctx.textures.len());
        }
        self.surfaces.retain(|_, s| s.context != context);
        self.release_current(context);
    }

    fn close_display(&mut self, display: DisplayId) {
        self.displays.remove(&display);
    }

    fn create_texture(
        &mut self,
        context: ContextId,
        target: TextureTarget,
    ) -> Result<TextureId, DriverError> {
        let ctx = self.context_mut(context)?;
        let id = TextureId(ctx.next_texture);
        ctx.next_texture = ctx.next_texture.checked_add(1).ok_or(DriverError::OutOfResources)?;
        // Storage is allocated on first upload, once the frame size is known.
        ctx.textures.insert(id, GpuTexture { target, image: None });
        Ok(id)
    }

    fn delete_texture(&mut self, context: ContextId, texture: TextureId) {
        if let Ok(ctx) = self.context_mut(context) {
            ctx.textures.remove(&texture);
        }
    }

    fn upload_frame(
        &mut self,
        context: ContextId,
        texture: TextureId,
        frame: &CameraFrame,
    ) -> Result<(), DriverError> {
        let ctx = self.context_mut(context)?;
        let extent = frame.extent();
        let format = camera_format(frame.format(), ctx.srgb);

        let max = ctx.device.limits().max_texture_dimension_2d;
        if extent.width > max || extent.height > max {
            return Err(DriverError::BadFrame(format!(
                "{extent} exceeds the {max}px texture limit"
            )));
        }
        if frame.stride() % frame.format().bytes_per_pixel() != 0 {
            return Err(DriverError::BadFrame(format!(
                "stride {} is not a whole number of pixels",
                frame.stride()
            )));
        }

        let device = ctx.device.clone();
        let queue = ctx.queue.clone();
        let entry = ctx
            .textures
            .get_mut(&texture)
            .ok_or_else(|| DriverError::BadAccess(format!("no texture {texture:?}")))?;

        let reuse = entry
            .image
            .as_ref()
            .is_some_and(|i| i.extent == extent && i.format == format);
        if !reuse {
            log::debug!(
                "allocating {extent} {format:?} storage for {texture:?} ({:?})",
                entry.target
            );
            entry.image = Some(CameraImage::new(&device, extent, format));
        }
        let Some(image) = entry.image.as_ref() else {
            return Err(DriverError::OutOfResources);
        };

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            frame.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride()),
                rows_per_image: Some(extent.height),
            },
            wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_back(
        &mut self,
        context: ContextId,
        texture: TextureId,
    ) -> Result<Readback, DriverError> {
        let ctx = self.context(context)?;
        let image = ctx
            .textures
            .get(&texture)
            .ok_or_else(|| DriverError::BadAccess(format!("no texture {texture:?}")))?
            .image
            .as_ref()
            .ok_or_else(|| DriverError::BadAccess(format!("{texture:?} holds no image")))?;
        let format = pixel_format(image.format).ok_or_else(|| {
            DriverError::Other(format!("{:?} has no camera pixel layout", image.format))
        })?;

        let extent = image.extent;
        let row = extent.width * format.bytes_per_pixel();
        let padded_row = padded_row_bytes(row);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("aperture readback buffer"),
            size: padded_row as u64 * extent.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("aperture readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(extent.height),
                },
            },
            wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| DriverError::Other(format!("readback wait failed: {e}")))?;
        rx.recv()
            .map_err(|_| DriverError::Other("readback callback never ran".into()))?
            .map_err(|e| DriverError::Other(format!("readback mapping failed: {e}")))?;

        let data = unpad_rows(&slice.get_mapped_range(), row, padded_row, extent.height);
        buffer.unmap();
        Ok(Readback { extent, format, data })
    }

    fn create_surface(
        &mut self,
        context: ContextId,
        window: &NativeWindow,
        extent: Extent,
    ) -> Result<SurfaceId, DriverError> {
        // A window carries one swapchain at a time; resizing hands it over.
        let previous = self
            .surfaces
            .iter()
            .find(|(_, s)| s.context == context && s.window == *window)
            .map(|(id, _)| *id);
        if let Some(previous) = previous {
            return self.hand_over_surface(context, previous, extent);
        }

        let ctx = self.context(context)?;
        let display = self.displays.get(&ctx.display).ok_or_else(|| {
            DriverError::NotInitialized(format!("display {:?} is closed", ctx.display))
        })?;
        let adapter = display
            .adapter
            .as_ref()
            .ok_or_else(|| DriverError::NotInitialized("no adapter selected".into()))?;

        // SAFETY: `NativeWindow::from_window` obliges the host to keep the
        // window alive until the surface is destroyed.
        let target = unsafe { wgpu::SurfaceTargetUnsafe::from_window(window) }
            .map_err(|e| DriverError::BadNativeWindow(e.to_string()))?;
        let surface = unsafe { display.instance.create_surface_unsafe(target) }.map_err(|e| {
            DriverError::BadNativeWindow(format!("failed to create wgpu surface: {e}"))
        })?;

        let caps = surface.get_capabilities(adapter);
        let format = if caps.formats.contains(&ctx.format) {
            ctx.format
        } else {
            choose_surface_format(&caps, ctx.srgb)
                .ok_or_else(|| DriverError::BadMatch("no supported surface formats".into()))?
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: extent.width.max(1),
            height: extent.height.max(1),
            present_mode: self.config.present_mode,
            alpha_mode: choose_alpha_mode(&caps, self.config.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: self.config.desired_maximum_frame_latency,
        };
        configure(&ctx.device, &surface, &config)?;

        let id = SurfaceId(self.next_id());
        self.surfaces.insert(id, Surface { context, window: *window, surface, config });
        Ok(id)
    }

    fn destroy_surface(&mut self, _context: ContextId, surface: SurfaceId) {
        self.surfaces.remove(&surface);
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
        let ctx = self.contexts.get(&context).ok_or(DriverError::BadContext)?;
        let target = self.surfaces.get(&surface).ok_or(DriverError::SurfaceLost)?;
        let source = ctx
            .textures
            .get(&texture)
            .ok_or_else(|| DriverError::BadAccess(format!("no texture {texture:?}")))?;

        let frame = match target.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => return Err(map_surface_error(target, &ctx.device, err)),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("aperture present encoder"),
        });

        let mut canvas = WgpuCanvas {
            device: &ctx.device,
            queue: &ctx.queue,
            encoder: &mut encoder,
            target: &view,
            target_format: target.config.format,
            target_extent: Extent::new(target.config.width, target.config.height),
            source: source.image.as_ref().map(|i| &i.view),
            source_extent: source.image.as_ref().map(|i| i.extent),
        };
        // Dropping `frame` unpresented hands the image back to the swapchain.
        draw(&mut canvas).map_err(|e| DriverError::Draw(format!("{e:#}")))?;

        ctx.queue.submit(std::iter::once(encoder.finish()));
        let suboptimal = frame.suboptimal;
        frame.present();

        if suboptimal {
            if let Err(err) = configure(&ctx.device, &target.surface, &target.config) {
                log::warn!("reconfiguring suboptimal {surface:?} failed: {err}");
            }
        }
        Ok(())
    }
}


impl CameraImage {
    fn new(device: &wgpu::Device, extent: Extent, format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("aperture camera texture"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, extent, format }
    }
}

/// Texture format camera bytes are uploaded as. Camera output is
/// sRGB-encoded; an sRGB context samples it linearized.
fn camera_format(format: PixelFormat, srgb: bool) -> wgpu::TextureFormat {
    match (format, srgb) {
        (PixelFormat::Rgba8, true) => wgpu::TextureFormat::Rgba8UnormSrgb,
        (PixelFormat::Rgba8, false) => wgpu::TextureFormat::Rgba8Unorm,
        (PixelFormat::Bgra8, true) => wgpu::TextureFormat::Bgra8UnormSrgb,
        (PixelFormat::Bgra8, false) => wgpu::TextureFormat::Bgra8Unorm,
    }
}

/// Both camera layouts as uploaded into a context of the given encoding.
fn camera_formats(srgb: bool) -> [wgpu::TextureFormat; 2] {
    [camera_format(PixelFormat::Rgba8, srgb), camera_format(PixelFormat::Bgra8, srgb)]
}

fn pixel_format(format: wgpu::TextureFormat) -> Option<PixelFormat> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            Some(PixelFormat::Rgba8)
        }
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            Some(PixelFormat::Bgra8)
        }
        _ => None,
    }
}

/// Whether camera frames can be uploaded into, filtered from and read back
/// out of textures with these features.
fn samples_camera_uploads(features: &wgpu::TextureFormatFeatures) -> bool {
    features.allowed_usages.contains(
        wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
    ) && features.flags.contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
}

/// Row pitch of a texture-to-buffer copy.
fn padded_row_bytes(row: u32) -> u32 {
    row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

fn unpad_rows(data: &[u8], row: u32, padded_row: u32, height: u32) -> Vec<u8> {
    if row == padded_row {
        return data[..(row * height) as usize].to_vec();
    }
    data.chunks(padded_row as usize)
        .take(height as usize)
        .flat_map(|r| &r[..row as usize])
        .copied()
        .collect()
}

/// Applies `config`, turning a validation failure into an error instead of
/// the device's uncaptured-error panic.
fn configure(
    device: &wgpu::Device,
    surface: &wgpu::Surface<'_>,
    config: &wgpu::SurfaceConfiguration,
) -> Result<(), DriverError> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    surface.configure(device, config);
    match pollster::block_on(scope.pop()) {
        None => Ok(()),
        Some(err) => Err(DriverError::BadNativeWindow(format!(
            "surface configuration rejected: {err}"
        ))),
    }
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Converts an acquire failure into a driver error. An outdated swapchain is
/// reconfigured so the next present can succeed.
fn map_surface_error(
    target: &Surface,
    device: &wgpu::Device,
    err: wgpu::SurfaceError,
) -> DriverError {
    match err {
        wgpu::SurfaceError::Lost => DriverError::SurfaceLost,
        wgpu::SurfaceError::Outdated => match configure(device, &target.surface, &target.config) {
            Ok(()) => DriverError::Outdated,
            Err(err) => {
                log::warn!("reconfiguring outdated surface failed: {err}");
                DriverError::SurfaceLost
            }
        },
        wgpu::SurfaceError::OutOfMemory => DriverError::OutOfResources,
        wgpu::SurfaceError::Timeout => DriverError::Timeout,
        wgpu::SurfaceError::Other => DriverError::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        formats: Vec<wgpu::TextureFormat>,
        alpha: Vec<wgpu::CompositeAlphaMode>,
    ) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            alpha_modes: alpha,
            ..Default::default()
        }
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let c = caps(
            vec![wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb],
            vec![],
        );
        assert_eq!(choose_surface_format(&c, true), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
        assert_eq!(choose_surface_format(&caps(vec![], vec![]), true), None);
    }

    #[test]
    fn alpha_mode_falls_back_to_supported() {
        let c = caps(vec![], vec![wgpu::CompositeAlphaMode::Opaque]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
        assert_eq!(choose_alpha_mode(&caps(vec![], vec![]), None), wgpu::CompositeAlphaMode::Auto);
    }

    #[test]
    fn camera_format_follows_context_encoding() {
        assert_eq!(camera_format(PixelFormat::Bgra8, true), wgpu::TextureFormat::Bgra8UnormSrgb);
        assert_eq!(camera_format(PixelFormat::Rgba8, false), wgpu::TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn external_sampling_follows_camera_upload_formats() {
        assert_eq!(
            camera_formats(true),
            [wgpu::TextureFormat::Rgba8UnormSrgb, wgpu::TextureFormat::Bgra8UnormSrgb]
        );
        assert_eq!(
            camera_formats(false),
            [wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureFormat::Bgra8Unorm]
        );

        let sampled = wgpu::TextureFormatFeatures {
            allowed_usages: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            flags: wgpu::TextureFormatFeatureFlags::FILTERABLE,
        };
        assert!(samples_camera_uploads(&sampled));

        // Render-target capability alone says nothing about sampling uploads.
        let render_only = wgpu::TextureFormatFeatures {
            allowed_usages: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            flags: wgpu::TextureFormatFeatureFlags::FILTERABLE,
        };
        assert!(!samples_camera_uploads(&render_only));

        let unfiltered = wgpu::TextureFormatFeatures {
            flags: wgpu::TextureFormatFeatureFlags::empty(),
            ..sampled
        };
        assert!(!samples_camera_uploads(&unfiltered));
    }

    #[test]
    fn readback_rows_are_aligned_then_unpadded() {
        assert_eq!(padded_row_bytes(32), 256);
        assert_eq!(padded_row_bytes(256), 256);
        assert_eq!(padded_row_bytes(1028), 1280);

        let mut data = vec![0u8; 512];
        data[..4].copy_from_slice(&[1, 2, 3, 4]);
        data[256..260].copy_from_slice(&[5, 6, 7, 8]);
        assert_eq!(unpad_rows(&data, 4, 256, 2), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(unpad_rows(&[9; 8], 4, 4, 2), vec![9; 8]);
    }

    #[test]
    fn pixel_format_inverts_camera_format() {
        for format in [PixelFormat::Rgba8, PixelFormat::Bgra8] {
            for srgb in [true, false] {
                assert_eq!(pixel_format(camera_format(format, srgb)), Some(format));
            }
        }
        assert_eq!(pixel_format(wgpu::TextureFormat::Rgb10a2Unorm), None);
    }

    #[test]
    fn unknown_config_is_rejected_without_a_gpu() {
        let mut driver = WgpuDriver::default();
        let display = driver.open_display().unwrap();
        let err = driver.create_context(display, ConfigId(0), None).err().unwrap();
        assert!(matches!(err, DriverError::BadConfig(_)));
    }
}
