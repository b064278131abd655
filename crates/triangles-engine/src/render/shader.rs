//! Shader program building.
//!
//! A program is built in three steps, each of which reports failure without
//! aborting:
//! 1. compile: every stage is parsed and validated on its own (`naga`)
//! 2. link: the two compiled stages are checked against each other and
//!    against the vertex layout they will be fed
//! 3. pipelines: a linked program gets one render pipeline per [`Primitive`].
//!    Errors the device raises here are captured and reported as link failures.
//!
//! A program that failed to compile or link is still returned; it simply has
//! no pipelines and [`ShaderProgram::bind`] refuses to bind it.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use super::geometry::{Position, Primitive};

/// Upper bound, in bytes, on a stored diagnostic (terminator slot included).
pub const DIAGNOSTIC_CAPACITY: usize = 512;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Compile or link failure with its bounded diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShaderError {
    #[error("failed to compile {stage} shader. info: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("failed to link program. info: {log}")]
    Link { log: String },
}

impl ShaderError {
    fn compile(stage: ShaderStage, log: String) -> Self {
        ShaderError::Compile {
            stage,
            log: bounded(log),
        }
    }

    fn link(log: String) -> Self {
        ShaderError::Link { log: bounded(log) }
    }

    /// The diagnostic text, at most `DIAGNOSTIC_CAPACITY - 1` bytes.
    pub fn diagnostic(&self) -> &str {
        match self {
            ShaderError::Compile { log, .. } | ShaderError::Link { log } => log,
        }
    }
}

/// A stage that parsed and validated, with its chosen entry point.
pub struct CompiledStage {
    stage: ShaderStage,
    entry_point: String,
    source: Cow<'static, str>,
    module: naga::Module,
}

impl CompiledStage {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn entry(&self) -> Option<&naga::EntryPoint> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == self.entry_point)
    }

    /// `@location` slots read by the entry point.
    fn input_locations(&self) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        if let Some(ep) = self.entry() {
            for arg in &ep.function.arguments {
                collect_locations(&self.module, arg.ty, arg.binding.as_ref(), &mut out);
            }
        }
        out
    }

    /// `@location` slots written by the entry point.
    fn output_locations(&self) -> BTreeSet<u32> {
        let mut out = BTreeSet::new();
        if let Some(result) = self.entry().and_then(|ep| ep.function.result.as_ref()) {
            collect_locations(&self.module, result.ty, result.binding.as_ref(), &mut out);
        }
        out
    }
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        out.insert(*location);
                    }
                }
            }
        }
    }
}

/// Shader capabilities a device created with `features` accepts.
///
/// Everything else is left off, so a stage relying on it fails to compile
/// rather than at pipeline creation.
pub fn shader_capabilities(features: wgpu::Features) -> naga::valid::Capabilities {
    use naga::valid::Capabilities as Caps;

    const BY_FEATURE: [(wgpu::Features, Caps); 6] = [
        (wgpu::Features::IMMEDIATES, Caps::IMMEDIATES),
        (wgpu::Features::SHADER_F64, Caps::FLOAT64),
        (wgpu::Features::SHADER_F16, Caps::SHADER_FLOAT16),
        (wgpu::Features::SHADER_INT64, Caps::SHADER_INT64),
        (wgpu::Features::SHADER_PRIMITIVE_INDEX, Caps::PRIMITIVE_INDEX),
        (wgpu::Features::MULTIVIEW, Caps::MULTIVIEW),
    ];

    let mut caps = Caps::empty();
    for (feature, cap) in BY_FEATURE {
        caps.set(cap, features.contains(feature));
    }
    caps
}

/// Parses and validates one WGSL stage against `capabilities`.
///
/// The first entry point of the requested stage becomes the stage's entry point;
/// a source without one does not compile.
pub fn compile_stage(
    stage: ShaderStage,
    source: impl Into<Cow<'static, str>>,
    capabilities: naga::valid::Capabilities,
) -> Result<CompiledStage, ShaderError> {
    let source = source.into();

    let module = naga::front::wgsl::parse_str(&source)
        .map_err(|e| ShaderError::compile(stage, e.emit_to_string(&source)))?;

    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), capabilities)
        .validate(&module)
        .map_err(|e| ShaderError::compile(stage, e.emit_to_string(&source)))?;

    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage.naga())
        .map(|ep| ep.name.clone())
        .ok_or_else(|| ShaderError::compile(stage, format!("no {stage} entry point found")))?;

    Ok(CompiledStage {
        stage,
        entry_point,
        source,
        module,
    })
}

/// Both stages of a successfully linked program.
pub struct LinkedStages {
    vertex: CompiledStage,
    fragment: CompiledStage,
}

impl LinkedStages {
    pub fn vertex(&self) -> &CompiledStage {
        &self.vertex
    }

    pub fn fragment(&self) -> &CompiledStage {
        &self.fragment
    }
}

/// Links a vertex and a fragment stage.
///
/// A missing (failed) stage fails the link. Otherwise every vertex input must be
/// provided by `attributes` and every fragment input must be written by the
/// vertex stage.
pub fn link(
    vertex: Option<CompiledStage>,
    fragment: Option<CompiledStage>,
    attributes: &[wgpu::VertexAttribute],
) -> Result<LinkedStages, ShaderError> {
    let (vertex, fragment) = match (vertex, fragment) {
        (Some(v), Some(f)) => (v, f),
        (None, _) => return Err(ShaderError::link("vertex shader is not compiled".into())),
        (_, None) => return Err(ShaderError::link("fragment shader is not compiled".into())),
    };

    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(ShaderError::link(format!(
            "stages attached as ({}, {}), expected (vertex, fragment)",
            vertex.stage, fragment.stage
        )));
    }

    let provided: BTreeSet<u32> = attributes.iter().map(|a| a.shader_location).collect();
    let consumed = vertex.input_locations();
    if let Some(missing) = consumed.difference(&provided).next() {
        return Err(ShaderError::link(format!(
            "vertex input at location {missing} has no matching vertex attribute"
        )));
    }

    let written = vertex.output_locations();
    let read = fragment.input_locations();
    if let Some(missing) = read.difference(&written).next() {
        return Err(ShaderError::link(format!(
            "fragment input at location {missing} is not written by the vertex shader"
        )));
    }

    Ok(LinkedStages { vertex, fragment })
}

/// Render pipelines of a linked program, one per primitive kind.
struct ProgramPipelines {
    line_loop: wgpu::RenderPipeline,
    triangles: wgpu::RenderPipeline,
}

/// A shader program: the outcome of compile + link, plus its pipelines.
pub struct ShaderProgram {
    label: String,
    pipelines: Option<ProgramPipelines>,
    diagnostics: Vec<ShaderError>,
}

impl ShaderProgram {
    /// True when compile and link succeeded and pipelines exist.
    pub fn is_linked(&self) -> bool {
        self.pipelines.is_some()
    }

    /// Compile/link failures recorded while building, in order.
    pub fn diagnostics(&self) -> &[ShaderError] {
        &self.diagnostics
    }

    /// Sets the pipeline for `primitive` on `rpass`.
    ///
    /// Returns false (and binds nothing) for a program that failed to link.
    pub fn bind(&self, rpass: &mut wgpu::RenderPass<'_>, primitive: Primitive) -> bool {
        let Some(pipelines) = self.pipelines.as_ref() else {
            return false;
        };
        rpass.set_pipeline(match primitive {
            Primitive::LineLoop => &pipelines.line_loop,
            Primitive::Triangles => &pipelines.triangles,
        });
        true
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        log::debug!("released shader program '{}'", self.label);
    }
}

/// Builds a [`ShaderProgram`] from WGSL vertex and fragment sources.
pub struct ProgramBuilder {
    label: String,
    vertex: Cow<'static, str>,
    fragment: Cow<'static, str>,
    capabilities: naga::valid::Capabilities,
}

impl ProgramBuilder {
    pub fn new(
        label: impl Into<String>,
        vertex: impl Into<Cow<'static, str>>,
        fragment: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            label: label.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
            capabilities: shader_capabilities(wgpu::Features::empty()),
        }
    }

    /// Compiles and links without touching the GPU.
    ///
    /// Every failure is logged and collected; the link result is returned
    /// alongside them.
    pub fn compile_and_link(&self) -> (Option<LinkedStages>, Vec<ShaderError>) {
        let mut diagnostics = Vec::new();
        let mut record = |e: ShaderError| {
            log::error!("{e}");
            diagnostics.push(e);
        };

        let caps = self.capabilities;
        let vertex = compile_stage(ShaderStage::Vertex, self.vertex.clone(), caps)
            .map_err(&mut record)
            .ok();
        let fragment = compile_stage(ShaderStage::Fragment, self.fragment.clone(), caps)
            .map_err(&mut record)
            .ok();

        let linked = link(vertex, fragment, Position::attributes())
            .map_err(&mut record)
            .ok();

        (linked, diagnostics)
    }

    /// Compiles, links and (if linking succeeded) creates pipelines targeting `format`.
    ///
    /// Never fails: a broken program comes back unlinked with its diagnostics.
    pub fn build(mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> ShaderProgram {
        self.capabilities = shader_capabilities(device.features());
        let (linked, mut diagnostics) = self.compile_and_link();

        // Compiled stages are dropped here; the pipelines keep what they need.
        let pipelines = linked.and_then(|stages| {
            create_pipelines(device, format, &self.label, &stages)
                .map_err(|e| {
                    log::error!("{e}");
                    diagnostics.push(e);
                })
                .ok()
        });

        if pipelines.is_some() {
            log::info!("shader program '{}' linked", self.label);
        } else {
            log::warn!(
                "shader program '{}' is not linked; draws will be skipped",
                self.label
            );
        }

        ShaderProgram {
            label: self.label,
            pipelines,
            diagnostics,
        }
    }
}

/// Creates the shader modules and pipelines inside a validation error scope.
///
/// The first error the device reports becomes a link failure and the
/// (invalid) objects are dropped.
fn create_pipelines(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    label: &str,
    stages: &LinkedStages,
) -> Result<ProgramPipelines, ShaderError> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

    let vs_label = format!("{label} vertex");
    let vs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&vs_label),
        source: wgpu::ShaderSource::Wgsl(stages.vertex.source.clone()),
    });

    let fs_label = format!("{label} fragment");
    let fs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&fs_label),
        source: wgpu::ShaderSource::Wgsl(stages.fragment.source.clone()),
    });

    let layout_label = format!("{label} pipeline layout");
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&layout_label),
        bind_group_layouts: &[],
        immediate_size: 0,
    });

    let pipeline = |primitive: Primitive| {
        let (topology, strip_index_format) = match primitive {
            Primitive::LineLoop => (
                wgpu::PrimitiveTopology::LineStrip,
                Some(wgpu::IndexFormat::Uint16),
            ),
            Primitive::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
        };
        let pipeline_label = format!("{label} {primitive:?} pipeline");

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&pipeline_label),
            layout: Some(&layout),

            vertex: wgpu::VertexState {
                module: &vs,
                entry_point: Some(stages.vertex.entry_point()),
                compilation_options: Default::default(),
                buffers: &[Position::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &fs,
                entry_point: Some(stages.fragment.entry_point()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    };

    let pipelines = ProgramPipelines {
        line_loop: pipeline(Primitive::LineLoop),
        triangles: pipeline(Primitive::Triangles),
    };

    match pollster::block_on(scope.pop()) {
        Some(err) => Err(ShaderError::link(err.to_string())),
        None => Ok(pipelines),
    }
}

/// Truncates `log` to fit `DIAGNOSTIC_CAPACITY` (one byte reserved for the
/// terminator), on a char boundary.
fn bounded(log: String) -> String {
    let mut log = log.trim_end().to_string();
    let limit = DIAGNOSTIC_CAPACITY - 1;
    if log.len() > limit {
        let mut end = limit;
        while !log.is_char_boundary(end) {
            end -= 1;
        }
        log.truncate(end);
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_device::noop_device;

    fn caps() -> naga::valid::Capabilities {
        shader_capabilities(wgpu::Features::empty())
    }

    const VS: &str = "
        @vertex
        fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
            return vec4<f32>(pos, 1.0);
        }
    ";

    const FS: &str = "
        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 0.0, 0.0, 1.0);
        }
    ";

    // Locations line up, but the attribute is Float32x3 and the input is integer.
    const VS_INTEGER_INPUT: &str = "
        @vertex
        fn vs_main(@location(0) pos: vec4<i32>) -> @builtin(position) vec4<f32> {
            return vec4<f32>(pos);
        }
    ";

    const FS_WITH_VARYING: &str = "
        @fragment
        fn fs_main(@location(3) tint: vec4<f32>) -> @location(0) vec4<f32> {
            return tint;
        }
    ";

    #[test]
    fn valid_pair_compiles_and_links() {
        let (linked, diagnostics) = ProgramBuilder::new("ok", VS, FS).compile_and_link();
        assert!(diagnostics.is_empty(), "{diagnostics:?}");

        let linked = linked.expect("program should link");
        assert_eq!(linked.vertex().entry_point(), "vs_main");
        assert_eq!(linked.fragment().entry_point(), "fs_main");
    }

    #[test]
    fn syntax_error_is_a_bounded_non_empty_diagnostic() {
        let err = compile_stage(ShaderStage::Vertex, "fn vs_main( -> {", caps())
            .err()
            .expect("must not compile");

        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Vertex, .. }));
        assert!(!err.diagnostic().is_empty());
        assert!(err.diagnostic().len() < DIAGNOSTIC_CAPACITY);
    }

    #[test]
    fn type_error_fails_validation() {
        let src = "
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return 1.0;
            }
        ";
        let err = compile_stage(ShaderStage::Fragment, src, caps()).err().unwrap();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn stage_without_entry_point_does_not_compile() {
        let err = compile_stage(ShaderStage::Vertex, FS, caps()).err().unwrap();
        assert!(err.diagnostic().contains("no vertex entry point"));
    }

    #[test]
    fn broken_stage_is_logged_and_link_still_reported() {
        let (linked, diagnostics) =
            ProgramBuilder::new("broken", "this is not wgsl", FS).compile_and_link();

        assert!(linked.is_none());
        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(diagnostics[0], ShaderError::Compile { stage: ShaderStage::Vertex, .. }));
        assert_eq!(
            diagnostics[1],
            ShaderError::Link {
                log: "vertex shader is not compiled".into()
            }
        );
    }

    #[test]
    fn unwritten_fragment_input_fails_link() {
        let vertex = compile_stage(ShaderStage::Vertex, VS, caps()).ok();
        let fragment = compile_stage(ShaderStage::Fragment, FS_WITH_VARYING, caps()).ok();
        assert!(vertex.is_some() && fragment.is_some());

        let err = link(vertex, fragment, Position::attributes()).err().unwrap();
        assert!(err.diagnostic().contains("location 3"));
    }

    #[test]
    fn vertex_input_must_match_layout() {
        let vertex = compile_stage(ShaderStage::Vertex, VS, caps()).ok();
        let fragment = compile_stage(ShaderStage::Fragment, FS, caps()).ok();

        let err = link(vertex, fragment, &[]).err().unwrap();
        assert!(err.diagnostic().contains("location 0"));
    }

    #[test]
    fn long_diagnostics_are_truncated_on_char_boundary() {
        let long = "é".repeat(DIAGNOSTIC_CAPACITY);
        let cut = bounded(long);
        assert!(cut.len() < DIAGNOSTIC_CAPACITY);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn capabilities_follow_device_features() {
        let src = "
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                let x: f64 = 1.0lf;
                return vec4<f32>(f32(x), 0.0, 0.0, 1.0);
            }
        ";

        assert!(compile_stage(ShaderStage::Fragment, src, caps()).is_err());
        let f64_caps = shader_capabilities(wgpu::Features::SHADER_F64);
        assert!(compile_stage(ShaderStage::Fragment, src, f64_caps).is_ok());
    }

    #[test]
    fn valid_pair_builds_pipelines() {
        let (device, _queue) = noop_device();
        let program =
            ProgramBuilder::new("ok", VS, FS).build(&device, wgpu::TextureFormat::Bgra8Unorm);

        assert!(program.is_linked());
        assert!(program.diagnostics().is_empty());
    }

    #[test]
    fn device_rejection_is_a_link_failure_not_a_panic() {
        let (linked, diagnostics) =
            ProgramBuilder::new("integer input", VS_INTEGER_INPUT, FS).compile_and_link();
        assert!(linked.is_some() && diagnostics.is_empty());

        let (device, _queue) = noop_device();
        let program = ProgramBuilder::new("integer input", VS_INTEGER_INPUT, FS)
            .build(&device, wgpu::TextureFormat::Bgra8Unorm);

        assert!(!program.is_linked());
        assert_eq!(program.diagnostics().len(), 1);
        let err = &program.diagnostics()[0];
        assert!(matches!(err, ShaderError::Link { .. }));
        assert!(!err.diagnostic().is_empty());
        assert!(err.diagnostic().len() < DIAGNOSTIC_CAPACITY);
    }

    #[test]
    fn unlinked_program_has_no_pipelines() {
        let (device, _queue) = noop_device();
        let program = ProgramBuilder::new("broken", "this is not wgsl", FS)
            .build(&device, wgpu::TextureFormat::Bgra8Unorm);

        assert!(!program.is_linked());
        assert_eq!(program.diagnostics().len(), 2);
    }
}
