//! Opens a 700x600 window and draws two triangle outlines and one filled
//! triangle until Space is pressed or the window is closed.

mod app;
mod config;
mod frame_loop;
mod scene;

use std::process::ExitCode;

use triangles_engine::logging::{LoggingConfig, init_logging};
use triangles_engine::window::Runtime;

use crate::app::TrianglesApp;

fn main() -> ExitCode {
    init_logging(LoggingConfig::default());

    match Runtime::run(config::window_config(), config::gpu_init(), TrianglesApp::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(config::FAILURE_STATUS)
        }
    }
}
