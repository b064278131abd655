//! The three triangles and the program that draws them.

use anyhow::Result;
use triangles_engine::render::{Geometry, Position, Primitive, ProgramBuilder, ShaderProgram};

pub const VERTEX_SHADER: &str = include_str!("shaders/triangle.vert.wgsl");
pub const FRAGMENT_SHADER: &str = include_str!("shaders/triangle.frag.wgsl");

/// A fixed triangle and the way it is drawn.
pub struct TriangleSpec {
    pub label: &'static str,
    pub vertices: [Position; 3],
    pub primitive: Primitive,
}

/// Drawn in this order: two outlines, then the filled one on top.
pub const TRIANGLES: [TriangleSpec; 3] = [
    TriangleSpec {
        label: "first triangle",
        vertices: [
            Position::new(-0.5, -0.5, 0.0),
            Position::new(0.0, 0.5, 0.0),
            Position::new(0.5, -0.5, 0.0),
        ],
        primitive: Primitive::LineLoop,
    },
    TriangleSpec {
        label: "second triangle",
        vertices: [
            Position::new(-0.5, -0.4, 0.0),
            Position::new(0.0, 0.6, 0.0),
            Position::new(0.5, -0.4, 0.0),
        ],
        primitive: Primitive::LineLoop,
    },
    TriangleSpec {
        label: "third triangle",
        vertices: [
            Position::new(-0.2, -0.6, 0.0),
            Position::new(0.0, -0.2, 0.0),
            Position::new(0.2, -0.6, 0.0),
        ],
        primitive: Primitive::Triangles,
    },
];

/// GPU-side state of the demo: one shared program, three geometry objects.
pub struct Scene {
    program: ShaderProgram,
    meshes: Vec<(Geometry, Primitive)>,
}

impl Scene {
    /// Builds the program and uploads every triangle.
    ///
    /// Shader failures are not errors here: they are logged and leave the
    /// program unlinked. Only a geometry upload can fail.
    pub fn build(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self> {
        let program = ProgramBuilder::new("triangles", VERTEX_SHADER, FRAGMENT_SHADER)
            .build(device, format);

        let meshes = TRIANGLES
            .iter()
            .map(|t| Ok((Geometry::upload(device, t.label, &t.vertices)?, t.primitive)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { program, meshes })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// Binds the program and draws each geometry in order.
    pub fn draw(&self, rpass: &mut wgpu::RenderPass<'_>) {
        for (geometry, primitive) in &self.meshes {
            if !self.program.bind(rpass, *primitive) {
                return;
            }
            geometry.draw(rpass, *primitive);
        }
    }
}
