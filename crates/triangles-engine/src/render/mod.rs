//! GPU rendering subsystem.
//!
//! - `shader`: compiles a vertex/fragment pair, links it and builds pipelines.
//! - `geometry`: vertex buffers with a fixed position layout and their draw calls.
//!
//! Convention: geometry is authored in NDC (x, y in `-1..1`), so the vertex
//! stage passes positions through and no viewport uniform is needed.

mod geometry;
mod shader;

#[cfg(test)]
mod test_device;

pub use geometry::{Geometry, Position, Primitive};
pub use shader::{
    CompiledStage, DIAGNOSTIC_CAPACITY, LinkedStages, ProgramBuilder, ShaderError, ShaderProgram,
    ShaderStage, compile_stage, link, shader_capabilities,
};
