//! Static scene geometry drawn from the culled indirect command buffer
//!
//! One `draw_indexed_indirect` covers the whole scene. Each command's
//! `first_instance` is the relem's run start in `draw_matrices_ind`, so the
//! vertex shader finds its transform through
//! `matrices[draw_matrices_ind[instance_index]]`.

use glam::Mat4;

use crate::backend::*;
use crate::bake::Vertex;
use crate::scene::{SceneBuffers, SceneManager};
use crate::ShadingMode;

use super::targets::{DEPTH_FORMAT, GBUFFER_ALBEDO_FORMAT, GBUFFER_NORMAL_FORMAT};

/// Vertex-stage push constants
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ScenePushConstants {
    pub proj_view: Mat4,
}

pub struct StaticMeshPass {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    bound: Option<(SceneBuffers, BindGroupHandle)>,
}

impl StaticMeshPass {
    /// Deferred shading writes the G-buffer; forward shading writes lit
    /// colour into `color_format`.
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        shading: ShadingMode,
        color_format: TextureFormat,
    ) -> BackendResult<Self> {
        let storage = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::VERTEX,
            ty: BindingType::StorageBuffer { read_only: true },
        };
        let layout = backend.create_bind_group_layout(&[storage(0), storage(1)])?;

        let (fragment_entry, color_targets) = match shading {
            ShadingMode::Deferred => (
                "fs_gbuffer",
                vec![
                    ColorTargetState::opaque(GBUFFER_ALBEDO_FORMAT),
                    ColorTargetState::opaque(GBUFFER_NORMAL_FORMAT),
                ],
            ),
            ShadingMode::Forward => ("fs_forward", vec![ColorTargetState::opaque(color_format)]),
        };

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("static_mesh".into()),
            shader: STATIC_MESH_SHADER.into(),
            vertex_entry: "vs_main".into(),
            fragment_entry: Some(fragment_entry.into()),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![layout],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                range: 0..std::mem::size_of::<ScenePushConstants>() as u32,
            }],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets,
        })?;

        Ok(Self {
            layout,
            pipeline,
            bound: None,
        })
    }

    fn bind_group<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        buffers: &SceneBuffers,
    ) -> BackendResult<BindGroupHandle> {
        match self.bound {
            Some((bound, group)) if bound == *buffers => return Ok(group),
            Some((_, group)) => backend.destroy_bind_group(group),
            None => {}
        }
        self.bound = None;
        let group = backend.create_bind_group(
            self.layout,
            &[
                (0, BindGroupEntry::buffer(buffers.inst_matrices)),
                (1, BindGroupEntry::buffer(buffers.draw_matrices_ind)),
            ],
        )?;
        self.bound = Some((*buffers, group));
        Ok(group)
    }

    /// Record the indirect draw into the open render pass. Nothing is
    /// drawn until a scene is loaded.
    pub fn record<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &SceneManager,
        proj_view: Mat4,
    ) -> BackendResult<()> {
        let Some(buffers) = scene.buffers() else {
            return Ok(());
        };
        let group = self.bind_group(backend, buffers)?;

        backend.set_render_pipeline(self.pipeline);
        backend.set_vertex_buffer(0, buffers.vertex, 0);
        backend.set_index_buffer(buffers.index, 0, IndexFormat::Uint32);
        backend.set_bind_group(0, group);
        backend.set_push_constants(
            ShaderStageFlags::VERTEX,
            0,
            bytemuck::bytes_of(&ScenePushConstants { proj_view }),
        );
        backend.draw_indexed_indirect(buffers.draw_cmd, 0, scene.relem_count());
        Ok(())
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        if let Some((_, group)) = self.bound.take() {
            backend.destroy_bind_group(group);
        }
    }
}

pub const STATIC_MESH_SHADER: &str = r#"
struct PushConstants {
    proj_view: mat4x4<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: u32,
    @location(2) texcoord: vec2<f32>,
    @location(3) tangent: u32,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) texcoord: vec2<f32>,
}

struct GBufferOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
}

var<push_constant> pc: PushConstants;

@group(0) @binding(0) var<storage, read> matrices: array<mat4x4<f32>>;
@group(0) @binding(1) var<storage, read> draw_matrices_ind: array<u32>;

const SUN_DIRECTION: vec3<f32> = vec3<f32>(0.43, 0.86, 0.26);
const BASE_COLOR: vec3<f32> = vec3<f32>(0.8, 0.8, 0.78);

@vertex
fn vs_main(input: VertexInput, @builtin(instance_index) instance: u32) -> VertexOutput {
    let model = matrices[draw_matrices_ind[instance]];
    let world_pos = model * vec4<f32>(input.position, 1.0);
    let normal = unpack4x8snorm(input.normal).xyz;

    var output: VertexOutput;
    output.clip_position = pc.proj_view * world_pos;
    output.world_normal = (model * vec4<f32>(normal, 0.0)).xyz;
    output.texcoord = input.texcoord;
    return output;
}

fn surface_normal(n: vec3<f32>) -> vec3<f32> {
    // Meshes without normals carry a zero vector
    if dot(n, n) < 1e-6 {
        return vec3<f32>(0.0, 1.0, 0.0);
    }
    return normalize(n);
}

@fragment
fn fs_gbuffer(input: VertexOutput) -> GBufferOutput {
    var output: GBufferOutput;
    output.albedo = vec4<f32>(BASE_COLOR, 1.0);
    output.normal = vec4<f32>(surface_normal(input.world_normal), 0.0);
    return output;
}

@fragment
fn fs_forward(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = surface_normal(input.world_normal);
    let diffuse = max(dot(n, normalize(SUN_DIRECTION)), 0.0);
    return vec4<f32>(BASE_COLOR * (0.15 + diffuse), 1.0);
}
"#;
