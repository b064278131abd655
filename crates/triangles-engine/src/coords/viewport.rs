use winit::dpi::PhysicalSize;

/// Render viewport rectangle in physical pixels.
///
/// Kept in lockstep with the framebuffer: after every resize the viewport is
/// rebuilt with [`Viewport::covering`] so rasterization maps NDC onto the whole
/// new surface.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport spanning a framebuffer of `size`, or `None` if it has no area.
    pub fn covering(size: PhysicalSize<u32>) -> Option<Self> {
        if size.width == 0 || size.height == 0 {
            return None;
        }
        Some(Self::new(0.0, 0.0, size.width as f32, size.height as f32))
    }

    /// Applies the viewport to a render pass with the full `0..1` depth range.
    pub fn apply(self, rpass: &mut wgpu::RenderPass<'_>) {
        rpass.set_viewport(self.x, self.y, self.width, self.height, 0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_framebuffer_exactly() {
        let vp = Viewport::covering(PhysicalSize::new(700, 600)).unwrap();
        assert_eq!(vp, Viewport::new(0.0, 0.0, 700.0, 600.0));

        let vp = Viewport::covering(PhysicalSize::new(1920, 1017)).unwrap();
        assert_eq!((vp.width, vp.height), (1920.0, 1017.0));
    }

    #[test]
    fn zero_area_has_no_viewport() {
        assert_eq!(Viewport::covering(PhysicalSize::new(0, 0)), None);
        assert_eq!(Viewport::covering(PhysicalSize::new(700, 0)), None);
    }
}
