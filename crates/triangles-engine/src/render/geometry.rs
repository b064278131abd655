use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Vertex with a single position attribute.
///
/// Layout: 3 contiguous `f32`, un-normalized, tightly packed, shader location 0.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Position {
    pub xyz: [f32; 3],
}

impl Position {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { xyz: [x, y, z] }
    }

    /// Attributes the layout declares; used to check a vertex stage against it.
    pub fn attributes() -> &'static [wgpu::VertexAttribute] {
        &Self::ATTRS
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Position>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// How a geometry's vertices are assembled into primitives.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Primitive {
    /// Closed outline: consecutive vertices joined, last joined back to first.
    LineLoop,
    /// Filled triangles, three vertices each.
    Triangles,
}

/// An immutable vertex buffer plus the index list used to draw it as a loop.
///
/// Buffers carry no `COPY_DST` usage, so contents are fixed at upload. Both are
/// destroyed when the geometry is dropped.
pub struct Geometry {
    label: String,
    vertex_buffer: wgpu::Buffer,
    outline_buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl Geometry {
    /// Creates the GPU buffers for `vertices` and uploads them.
    pub fn upload(device: &wgpu::Device, label: &str, vertices: &[Position]) -> Result<Self> {
        anyhow::ensure!(!vertices.is_empty(), "geometry '{label}' has no vertices");
        let count = u16::try_from(vertices.len())
            .ok()
            .filter(|n| *n < u16::MAX)
            .with_context(|| format!("geometry '{label}' has too many vertices for u16 indices"))?;

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} vbo")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_SRC,
        });

        let outline_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} outline ibo")),
            contents: bytemuck::cast_slice(&outline_indices(count)),
            usage: wgpu::BufferUsages::INDEX,
        });

        log::debug!(
            "uploaded geometry '{label}': {} vertices, {} bytes",
            vertices.len(),
            vertex_buffer.size()
        );

        Ok(Self {
            label: label.to_string(),
            vertex_buffer,
            outline_buffer,
            vertex_count: u32::from(count),
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Size of the vertex buffer in bytes.
    pub fn byte_len(&self) -> u64 {
        self.vertex_buffer.size()
    }

    /// Binds the buffers and issues one draw call for `primitive`.
    ///
    /// The pipeline bound on `rpass` must have been built for the same primitive.
    pub fn draw(&self, rpass: &mut wgpu::RenderPass<'_>, primitive: Primitive) {
        rpass.set_vertex_buffer(0, self.vertex_buffer.slice(..));

        match primitive {
            Primitive::LineLoop => {
                rpass.set_index_buffer(self.outline_buffer.slice(..), wgpu::IndexFormat::Uint16);
                rpass.draw_indexed(0..self.vertex_count + 1, 0, 0..1);
            }
            Primitive::Triangles => rpass.draw(0..self.vertex_count, 0..1),
        }
    }

    /// Copies the vertex buffer back to the CPU and returns its bytes.
    ///
    /// Blocks until the GPU has finished the copy.
    pub fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        let size = self.vertex_buffer.size();

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} readback", self.label)),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("triangles readback encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.vertex_buffer, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("device poll failed during readback")?;
        receiver
            .recv()
            .context("readback callback was dropped")?
            .context("failed to map readback buffer")?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();

        Ok(bytes)
    }
}

impl Drop for Geometry {
    fn drop(&mut self) {
        self.vertex_buffer.destroy();
        self.outline_buffer.destroy();
        log::debug!("released geometry '{}'", self.label);
    }
}

/// Index list `0, 1, .., count - 1, 0` drawing a closed line strip.
fn outline_indices(count: u16) -> Vec<u16> {
    (0..count).chain(std::iter::once(0)).collect()
}
