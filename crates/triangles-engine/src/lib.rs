//! Triangles engine crate.
//!
//! Owns the platform + GPU runtime pieces the demo binary builds on: window
//! and event loop, graphics context, keyboard state, shader programs and
//! vertex geometry.

pub mod device;
pub mod window;
pub mod input;
pub mod core;

pub mod logging;
pub mod coords;
pub mod render;
