//! GPU device + surface management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue against a requested baseline
//! - creating & configuring the Surface (swapchain), including on resize
//! - acquiring frames and handing out encoders/views for rendering

mod context;
mod init;
mod surface;

pub use context::{Gpu, GpuFrame};
pub use init::{GpuInit, default_backends};
pub use surface::SurfaceErrorAction;
