//! Fixed settings of the demo window and graphics context.

use triangles_engine::device::GpuInit;
use triangles_engine::input::Key;
use triangles_engine::window::RuntimeConfig;
use winit::dpi::LogicalSize;

pub const WINDOW_TITLE: &str = "Triangles";
pub const WINDOW_WIDTH: f64 = 700.0;
pub const WINDOW_HEIGHT: f64 = 600.0;

/// Holding this key closes the window.
pub const EXIT_KEY: Key = Key::Space;

/// Dark gray background.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.109,
    g: 0.109,
    b: 0.109,
    a: 1.0,
};

/// Exit status for fatal startup failures; a shell reports it as -1.
pub const FAILURE_STATUS: u8 = 255;

pub fn window_config() -> RuntimeConfig {
    RuntimeConfig {
        title: WINDOW_TITLE.to_string(),
        initial_size: LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT),
        resizable: true,
    }
}

/// Context request: portable baseline, linear surface so colors are written as-is.
pub fn gpu_init() -> GpuInit {
    GpuInit {
        prefer_srgb: false,
        ..GpuInit::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_700_by_600_titled_triangles() {
        let cfg = window_config();
        assert_eq!(cfg.title, "Triangles");
        assert_eq!(cfg.initial_size, LogicalSize::new(700.0, 600.0));
    }

    #[test]
    fn surface_is_linear() {
        assert!(!gpu_init().prefer_srgb);
    }

    #[test]
    fn failure_status_reads_as_minus_one() {
        assert_eq!(FAILURE_STATUS as i8, -1);
    }
}
