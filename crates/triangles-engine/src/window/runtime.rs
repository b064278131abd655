use std::collections::HashMap;
use std::hash::Hash;

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::input::platform::translate_window_event;
use crate::input::{InputFrame, InputState};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub resizable: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "triangles".to_string(),
            initial_size: LogicalSize::new(800.0, 600.0),
            resizable: true,
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }

    /// Ends the loop with `err`; `Runtime::run` reports it.
    pub(crate) fn fail(&mut self, err: anyhow::Error) {
        self.commands.push(Command::Fail(err));
    }
}

enum Command {
    CloseWindow(WindowId),
    Exit,
    Fail(anyhow::Error),
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens the initial window and runs the event loop until it closes.
    ///
    /// Errors are the fatal conditions: event loop, window or GPU creation, and
    /// a surface that cannot recover. A window closed by the user or by the app
    /// is `Ok(())`.
    pub fn run<A>(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(initial, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state
            .lifecycle
            .finish()
            .inspect(|_| log::info!("runtime shut down cleanly"))
    }
}

/// Exit bookkeeping shared by every way the loop can end.
#[derive(Default)]
struct Lifecycle {
    exit_requested: bool,
    shut_down: bool,

    /// First fatal error; reported by `Runtime::run` after the loop ends.
    fatal: Option<anyhow::Error>,
}

impl Lifecycle {
    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn record_fatal(&mut self, err: anyhow::Error) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.request_exit();
    }

    /// Runs the app's shutdown hook once, while GPU contexts still exist.
    fn shutdown(&mut self, on_shutdown: impl FnOnce()) {
        if !self.shut_down {
            self.shut_down = true;
            on_shutdown();
        }
    }

    /// Removes one window. Removing the last one runs the shutdown hook first
    /// and requests exit.
    fn remove_window<K, V>(
        &mut self,
        windows: &mut HashMap<K, V>,
        id: &K,
        on_shutdown: impl FnOnce(),
    ) -> bool
    where
        K: Eq + Hash,
    {
        if !windows.contains_key(id) {
            return false;
        }
        if windows.len() == 1 {
            self.shutdown(on_shutdown);
        }
        windows.remove(id);
        if windows.is_empty() {
            self.request_exit();
        }
        true
    }

    /// Drops every remaining window, running the shutdown hook first.
    fn clear_windows<K, V>(&mut self, windows: &mut HashMap<K, V>, on_shutdown: impl FnOnce()) {
        if !windows.is_empty() {
            self.shutdown(on_shutdown);
            windows.clear();
        }
    }

    /// Applies the commands an app callback buffered.
    fn apply<V>(
        &mut self,
        ctx: RuntimeCtx,
        windows: &mut HashMap<WindowId, V>,
        mut on_shutdown: impl FnMut(),
    ) {
        for cmd in ctx.commands {
            match cmd {
                Command::CloseWindow(id) => {
                    if self.remove_window(windows, &id, &mut on_shutdown) {
                        log::debug!("window {id:?} destroyed");
                    }
                }
                Command::Exit => self.request_exit(),
                Command::Fail(err) => self.record_fatal(err),
            }
        }

        if windows.is_empty() {
            self.request_exit();
        }
    }

    fn finish(self) -> Result<()> {
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    input_state: InputState,
    input_frame: InputFrame,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    windows: HashMap<WindowId, WindowEntry>,
    lifecycle: Lifecycle,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            initial,
            gpu_init,
            app,
            windows: HashMap::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::debug!("fatal runtime error; stopping event loop");
        self.lifecycle.record_fatal(err);
        event_loop.exit();
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(config.title.as_str())
            .with_inner_size(config.initial_size)
            .with_resizable(config.resizable);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let id = window.id();
        let size = window.inner_size();
        log::info!(
            "window \"{}\" created ({}x{} physical)",
            config.title,
            size.width,
            size.height
        );

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryTryBuilder {
            input_state: InputState::default(),
            input_frame: InputFrame::default(),
            window,
            gpu_builder: |w| {
                pollster::block_on(Gpu::new(w, gpu_init))
                    .context("failed to initialize the graphics context")
            },
        }
        .try_build()?;

        entry.with_gpu(|gpu| self.app.on_gpu_ready(id, gpu));

        self.windows.insert(id, entry);
        Ok(id)
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        let app = &mut self.app;
        if self.lifecycle.remove_window(&mut self.windows, &id, || app.on_shutdown()) {
            log::debug!("window {id:?} destroyed");
        }
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, ctx: RuntimeCtx) {
        let app = &mut self.app;
        self.lifecycle.apply(ctx, &mut self.windows, || app.on_shutdown());

        if self.lifecycle.exit_requested {
            event_loop.exit();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId) {
        let mut runtime_ctx = RuntimeCtx::default();
        let mut app_control = AppControl::Continue;

        let (app, windows) = (&mut self.app, &mut self.windows);
        if let Some(entry) = windows.get_mut(&window_id) {
            entry.with_mut(|fields| {
                {
                    let mut ctx = FrameCtx {
                        window: WindowCtx {
                            id: window_id,
                            window: fields.window,
                        },
                        gpu: fields.gpu,
                        input: fields.input_state,
                        input_frame: fields.input_frame,
                        runtime: &mut runtime_ctx,
                    };

                    app_control = app.on_frame(&mut ctx);
                }

                // Per-frame deltas are consumed by exactly one frame.
                fields.input_frame.clear();
            });
        }

        if app_control == AppControl::Exit {
            runtime_ctx.exit();
        }

        self.apply_commands(event_loop, runtime_ctx);
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() || self.lifecycle.exit_requested {
            return;
        }

        match self.create_window_entry(event_loop, self.initial.clone()) {
            Ok(id) => {
                if let Some(entry) = self.windows.get(&id) {
                    entry.with_window(|w| w.request_redraw());
                }
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.lifecycle.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; presentation (FIFO) paces the loop.
        for entry in self.windows.values() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.lifecycle.exit_requested {
            event_loop.exit();
            return;
        }

        // Split borrows to avoid `self` capture inside `ouroboros` closures.
        let (app, windows) = (&mut self.app, &mut self.windows);

        let Some(entry) = windows.get_mut(&window_id) else {
            return;
        };

        let mut exit_from_app_event = false;

        entry.with_mut(|fields| {
            if let Some(ev) = translate_window_event(fields.input_state, &event) {
                fields.input_state.apply_event(fields.input_frame, ev);
            }

            if app.on_window_event(window_id, &event) == AppControl::Exit {
                exit_from_app_event = true;
            }
        });

        if exit_from_app_event {
            self.lifecycle.request_exit();
            event_loop.exit();
            return;
        }

        match &event {
            WindowEvent::CloseRequested => {
                log::info!("close requested for window {window_id:?}");
                self.destroy_window_entry(window_id);
            }

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    log::debug!("framebuffer resized to {}x{}", new_size.width, new_size.height);
                    entry.with_gpu_mut(|gpu| gpu.resize(*new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    let new_size = entry.with_window(|w| w.inner_size());
                    entry.with_gpu_mut(|gpu| gpu.resize(new_size));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop, window_id),

            _ => {}
        }

        if self.lifecycle.exit_requested {
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Exit paths that bypass window closure (AppControl::Exit) still release
        // app resources before the GPU contexts go away.
        let app = &mut self.app;
        self.lifecycle.clear_windows(&mut self.windows, || app.on_shutdown());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Stands in for a window entry; records when it is dropped.
    struct Entry {
        name: &'static str,
        log: Log,
    }

    impl Drop for Entry {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("drop {}", self.name));
        }
    }

    fn windows(log: &Log, names: &[&'static str]) -> HashMap<WindowId, Entry> {
        names
            .iter()
            .copied()
            .enumerate()
            .map(|(i, name)| {
                let entry = Entry {
                    name,
                    log: log.clone(),
                };
                (WindowId::from(i as u64), entry)
            })
            .collect()
    }

    fn shutdown_hook(log: &Log) -> impl FnMut() {
        let log = log.clone();
        move || log.borrow_mut().push("shutdown".to_string())
    }

    #[test]
    fn shutdown_runs_before_last_window_is_dropped() {
        let log = Log::default();
        let mut windows = windows(&log, &["main"]);
        let mut lifecycle = Lifecycle::default();

        assert!(lifecycle.remove_window(&mut windows, &WindowId::from(0), shutdown_hook(&log)));

        assert_eq!(*log.borrow(), ["shutdown", "drop main"]);
        assert!(windows.is_empty());
        assert!(lifecycle.exit_requested);
    }

    #[test]
    fn shutdown_waits_for_the_last_window() {
        let log = Log::default();
        let mut windows = windows(&log, &["a", "b"]);
        let mut lifecycle = Lifecycle::default();

        lifecycle.remove_window(&mut windows, &WindowId::from(0), shutdown_hook(&log));
        assert_eq!(*log.borrow(), ["drop a"]);
        assert!(!lifecycle.exit_requested);

        lifecycle.remove_window(&mut windows, &WindowId::from(1), shutdown_hook(&log));
        assert_eq!(*log.borrow(), ["drop a", "shutdown", "drop b"]);
    }

    #[test]
    fn shutdown_hook_runs_once() {
        let log = Log::default();
        let mut windows = windows(&log, &["main"]);
        let mut lifecycle = Lifecycle::default();

        lifecycle.remove_window(&mut windows, &WindowId::from(0), shutdown_hook(&log));
        assert!(!lifecycle.remove_window(&mut windows, &WindowId::from(0), shutdown_hook(&log)));
        lifecycle.clear_windows(&mut windows, shutdown_hook(&log));
        lifecycle.shutdown(shutdown_hook(&log));

        assert_eq!(*log.borrow(), ["shutdown", "drop main"]);
    }

    #[test]
    fn close_command_ends_the_run_cleanly() {
        let log = Log::default();
        let mut windows = windows(&log, &["main"]);
        let mut lifecycle = Lifecycle::default();

        let mut ctx = RuntimeCtx::default();
        ctx.close_window(WindowId::from(0));
        lifecycle.apply(ctx, &mut windows, shutdown_hook(&log));

        assert_eq!(*log.borrow(), ["shutdown", "drop main"]);
        assert!(lifecycle.exit_requested);
        assert!(lifecycle.finish().is_ok());
    }

    #[test]
    fn exit_without_close_still_shuts_down_on_exiting() {
        let log = Log::default();
        let mut windows = windows(&log, &["main"]);
        let mut lifecycle = Lifecycle::default();

        let mut ctx = RuntimeCtx::default();
        ctx.exit();
        lifecycle.apply(ctx, &mut windows, shutdown_hook(&log));
        assert!(lifecycle.exit_requested);
        assert!(log.borrow().is_empty());

        lifecycle.clear_windows(&mut windows, shutdown_hook(&log));
        assert_eq!(*log.borrow(), ["shutdown", "drop main"]);
        assert!(lifecycle.finish().is_ok());
    }

    #[test]
    fn runtime_failure_is_reported_by_finish() {
        let log = Log::default();
        let mut windows = windows(&log, &["main"]);
        let mut lifecycle = Lifecycle::default();

        let mut ctx = RuntimeCtx::default();
        ctx.fail(anyhow::anyhow!("surface lost beyond recovery"));
        ctx.fail(anyhow::anyhow!("second failure"));
        ctx.exit();
        lifecycle.apply(ctx, &mut windows, shutdown_hook(&log));
        assert!(lifecycle.exit_requested);

        lifecycle.clear_windows(&mut windows, shutdown_hook(&log));
        let err = lifecycle.finish().err().unwrap();
        assert_eq!(err.to_string(), "surface lost beyond recovery");
    }
}
