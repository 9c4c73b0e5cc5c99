/// Minimum requirements used when negotiating a context configuration.
///
/// Defaults: 8 bits per color channel, no alpha requirement, external-image
/// sampling required, sRGB preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Lowest acceptable bit depth of each of the red, green and blue channels.
    pub min_color_bits: u8,

    /// Lowest acceptable alpha bit depth. The preview is opaque, so 0 by default.
    pub min_alpha_bits: u8,

    /// Reject configurations that cannot sample camera-sourced images.
    pub require_external_sampling: bool,

    /// Prefer an sRGB configuration when one satisfies the minimum.
    pub prefer_srgb: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_color_bits: 8,
            min_alpha_bits: 0,
            require_external_sampling: true,
            prefer_srgb: true,
        }
    }
}

/// Backend parameters for [`WgpuDriver`](super::WgpuDriver).
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct WgpuDriverConfig {
    /// Backends wgpu may pick from.
    pub backends: wgpu::Backends,

    /// Adapter selection hint.
    pub power_preference: wgpu::PowerPreference,

    /// Present mode (swap behavior).
    ///
    /// FIFO is broadly supported and paces presentation to the display refresh.
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference for surfaces.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Required wgpu features.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Desired maximum frame latency for surfaces.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for WgpuDriverConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}
