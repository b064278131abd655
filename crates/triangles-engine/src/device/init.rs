/// Initialization parameters for the GPU layer.
///
/// This is the context request: which backends may be used and which device
/// baseline (limits/features) must be met. Defaults target the class of
/// hardware a GL 3.3 core context runs on.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Backends the instance may pick an adapter from.
    pub backends: wgpu::Backends,

    /// Prefer an sRGB surface format when available.
    ///
    /// When false, a linear (non-sRGB) format is preferred instead, so shader
    /// outputs and clear colors reach the screen unconverted.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior).
    ///
    /// FIFO is broadly supported and waits for vertical blank.
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference for the surface.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Required wgpu features.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Desired maximum frame latency for the surface.
    ///
    /// This value is a hint; support depends on platform/backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            desired_maximum_frame_latency: 2,
        }
    }
}

/// Backends requested when none are given explicitly.
///
/// macOS only exposes a forward-compatible core profile, so the native Metal
/// backend is requested there instead of GL.
pub fn default_backends() -> wgpu::Backends {
    if cfg!(target_os = "macos") {
        wgpu::Backends::METAL
    } else {
        wgpu::Backends::PRIMARY | wgpu::Backends::GL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_is_portable() {
        let init = GpuInit::default();
        assert!(init.required_features.is_empty());
        assert_eq!(init.present_mode, wgpu::PresentMode::Fifo);
        assert!(!init.backends.is_empty());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn gl_is_requested_off_macos() {
        assert!(default_backends().contains(wgpu::Backends::GL));
    }
}
