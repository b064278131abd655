//! Framebuffer-space coordinate types.
//!
//! Canonical space here is physical pixels, origin top-left. Geometry itself is
//! authored directly in NDC and needs no conversion.

mod viewport;

pub use viewport::Viewport;
