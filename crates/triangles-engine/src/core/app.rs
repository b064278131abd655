use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::device::Gpu;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by the program driving the runtime.
///
/// Call order per window: `on_gpu_ready` once, then any number of
/// `on_window_event` / `on_frame`, then `on_shutdown` once before the last
/// window and its GPU context are dropped.
pub trait App {
    /// Called once after the window's GPU context has been created.
    ///
    /// GPU resources (programs, buffers) are created here.
    fn on_gpu_ready(&mut self, window_id: WindowId, gpu: &Gpu<'_>) {
        let _ = (window_id, gpu);
    }

    /// Called for window events.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called once per rendered frame.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;

    /// Called before the runtime tears down the last window.
    ///
    /// GPU resources owned by the app should be released here.
    fn on_shutdown(&mut self) {}
}
