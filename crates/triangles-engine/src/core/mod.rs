//! Core engine-facing contracts.
//!
//! Defines the interface between the runtime (platform loop) and the program
//! on top of it: the `App` callbacks and the per-frame context.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
