use winit::event::WindowEvent;
use winit::window::WindowId;

use triangles_engine::core::{App, AppControl, FrameCtx};
use triangles_engine::device::Gpu;

use crate::config::{CLEAR_COLOR, EXIT_KEY};
use crate::frame_loop::FrameLoop;
use crate::scene::Scene;

/// Draws the three triangles until the exit key or a close request.
pub struct TrianglesApp {
    frame_loop: FrameLoop,
    scene: Option<Scene>,
}

impl TrianglesApp {
    pub fn new() -> Self {
        Self {
            frame_loop: FrameLoop::new(EXIT_KEY),
            scene: None,
        }
    }
}

impl Default for TrianglesApp {
    fn default() -> Self {
        Self::new()
    }
}

impl App for TrianglesApp {
    fn on_gpu_ready(&mut self, _window_id: WindowId, gpu: &Gpu<'_>) {
        match Scene::build(gpu.device(), gpu.surface_format()) {
            Ok(scene) => {
                if !scene.program().is_linked() {
                    log::warn!(
                        "continuing with an unlinked program ({} diagnostics)",
                        scene.program().diagnostics().len()
                    );
                }
                self.scene = Some(scene);
            }
            Err(e) => log::error!("failed to upload geometry: {e:#}"),
        }
    }

    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        if matches!(event, WindowEvent::CloseRequested) {
            self.frame_loop.request_close();
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.frame_loop.poll_input(ctx.input, ctx.input_frame) {
            log::info!("{EXIT_KEY} pressed; closing window");
            ctx.request_close();
        }

        let scene = self.scene.as_ref();
        ctx.render(CLEAR_COLOR, |rpass| {
            if let Some(scene) = scene {
                scene.draw(rpass);
            }
        })
    }

    fn on_shutdown(&mut self) {
        // Releases the program and all three geometry objects.
        self.scene = None;
        log::info!("graphics objects released");
    }
}
