//! Heightmap terrain
//!
//! The terrain is a `PATCHES x PATCHES` grid of instanced patches. Each
//! patch is a fixed `PATCH_QUADS x PATCH_QUADS` grid generated in the vertex
//! stage; distant patches snap their vertices to a coarser lattice, which
//! collapses the skipped triangles.

use glam::{Mat4, Vec3};

use crate::backend::*;
use crate::scene::HeightmapTexture;
use crate::ShadingMode;

use super::targets::{DEPTH_FORMAT, GBUFFER_ALBEDO_FORMAT, GBUFFER_NORMAL_FORMAT};

/// Patches along each side of the terrain
pub const PATCHES: u32 = 64;
/// Quads along each side of one patch
pub const PATCH_QUADS: u32 = 16;
pub const VERTICES_PER_PATCH: u32 = PATCH_QUADS * PATCH_QUADS * 6;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TerrainPushConstants {
    pub proj_view: Mat4,
    pub camera_pos: Vec3,
    pub _pad: f32,
}

pub struct TerrainPass {
    pipeline: RenderPipelineHandle,
    bind_group: BindGroupHandle,
}

impl TerrainPass {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        heightmap: &HeightmapTexture,
        shading: ShadingMode,
        color_format: TextureFormat,
    ) -> BackendResult<Self> {
        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::VERTEX,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::VERTEX,
                ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
            },
        ])?;
        let bind_group = backend.create_bind_group(
            layout,
            &[
                (0, BindGroupEntry::Texture(heightmap.view)),
                (1, BindGroupEntry::Sampler(heightmap.sampler)),
            ],
        )?;

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
            label: Some("terrain".into()),
            shader: TERRAIN_SHADER.into(),
            vertex_entry: "vs_main".into(),
            fragment_entry: Some(fragment_entry.into()),
            vertex_layouts: Vec::new(),
            bind_group_layouts: vec![layout],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                range: 0..std::mem::size_of::<TerrainPushConstants>() as u32,
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
            pipeline,
            bind_group,
        })
    }

    /// Record the patch grid into the open render pass
    pub fn record<B: GraphicsBackend>(&self, backend: &mut B, proj_view: Mat4, camera_pos: Vec3) {
        let constants = TerrainPushConstants {
            proj_view,
            camera_pos,
            _pad: 0.0,
        };
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, self.bind_group);
        backend.set_push_constants(ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&constants));
        backend.draw(0..VERTICES_PER_PATCH, 0..PATCHES * PATCHES);
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_bind_group(self.bind_group);
    }
}

pub const TERRAIN_SHADER: &str = r#"
struct PushConstants {
    proj_view: mat4x4<f32>,
    camera_pos: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) height: f32,
}

struct GBufferOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
}

var<push_constant> pc: PushConstants;

@group(0) @binding(0) var heightmap: texture_2d<f32>;
@group(0) @binding(1) var heightmap_sampler: sampler;

const PATCHES: u32 = 64u;
const PATCH_QUADS: u32 = 16u;
const TERRAIN_SIZE: f32 = 512.0;
const HEIGHT_SCALE: f32 = 48.0;
const TERRAIN_BASE: f32 = -20.0;
const SUN_DIRECTION: vec3<f32> = vec3<f32>(0.43, 0.86, 0.26);

fn height_at(uv: vec2<f32>) -> f32 {
    return textureSampleLevel(heightmap, heightmap_sampler, uv, 0.0).r * HEIGHT_SCALE + TERRAIN_BASE;
}

fn world_at(uv: vec2<f32>) -> vec3<f32> {
    let xz = (uv - vec2<f32>(0.5)) * TERRAIN_SIZE;
    return vec3<f32>(xz.x, height_at(uv), xz.y);
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
) -> VertexOutput {
    // Two triangles per quad
    var corners = array<vec2<u32>, 6>(
        vec2<u32>(0u, 0u), vec2<u32>(0u, 1u), vec2<u32>(1u, 0u),
        vec2<u32>(1u, 0u), vec2<u32>(0u, 1u), vec2<u32>(1u, 1u),
    );
    let quad = vertex_index / 6u;
    var cell = vec2<u32>(quad % PATCH_QUADS, quad / PATCH_QUADS) + corners[vertex_index % 6u];

    let patch_id = vec2<u32>(instance_index % PATCHES, instance_index / PATCHES);
    let patch_size = 1.0 / f32(PATCHES);
    let patch_centre = (vec2<f32>(patch_id) + vec2<f32>(0.5)) * patch_size;

    // Coarser lattice with distance from the camera
    let camera_distance = length(world_at(patch_centre) - pc.camera_pos);
    let lod_step = u32(clamp(exp2(floor(camera_distance / 64.0)), 1.0, f32(PATCH_QUADS)));
    cell = (cell / lod_step) * lod_step;

    let uv = (vec2<f32>(patch_id) + vec2<f32>(cell) / f32(PATCH_QUADS)) * patch_size;
    let world_pos = world_at(uv);

    let texel = 1.0 / vec2<f32>(textureDimensions(heightmap));
    let dx = height_at(uv + vec2<f32>(texel.x, 0.0)) - height_at(uv - vec2<f32>(texel.x, 0.0));
    let dz = height_at(uv + vec2<f32>(0.0, texel.y)) - height_at(uv - vec2<f32>(0.0, texel.y));
    let spacing = 2.0 * texel * TERRAIN_SIZE;

    var output: VertexOutput;
    output.clip_position = pc.proj_view * vec4<f32>(world_pos, 1.0);
    output.world_normal = normalize(vec3<f32>(-dx / spacing.x, 1.0, -dz / spacing.y));
    output.height = (world_pos.y - TERRAIN_BASE) / HEIGHT_SCALE;
    return output;
}

fn terrain_color(h: f32) -> vec3<f32> {
    let grass = vec3<f32>(0.22, 0.42, 0.16);
    let rock = vec3<f32>(0.45, 0.4, 0.35);
    let snow = vec3<f32>(0.92, 0.93, 0.95);
    return mix(mix(grass, rock, smoothstep(0.35, 0.6, h)), snow, smoothstep(0.75, 0.9, h));
}

@fragment
fn fs_gbuffer(input: VertexOutput) -> GBufferOutput {
    var output: GBufferOutput;
    output.albedo = vec4<f32>(terrain_color(input.height), 1.0);
    output.normal = vec4<f32>(normalize(input.world_normal), 0.0);
    return output;
}

@fragment
fn fs_forward(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(input.world_normal);
    let diffuse = max(dot(n, normalize(SUN_DIRECTION)), 0.0);
    return vec4<f32>(terrain_color(input.height) * (0.15 + diffuse), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_fit_limit() {
        assert_eq!(std::mem::size_of::<TerrainPushConstants>(), 80);
        assert!(std::mem::size_of::<TerrainPushConstants>() as u32 <= MAX_PUSH_CONSTANT_SIZE);
    }

    #[test]
    fn patch_vertex_count_matches_shader_grid() {
        assert!(TERRAIN_SHADER.contains(&format!("const PATCHES: u32 = {PATCHES}u;")));
        assert!(TERRAIN_SHADER.contains(&format!("const PATCH_QUADS: u32 = {PATCH_QUADS}u;")));
        assert_eq!(VERTICES_PER_PATCH, 1536);
    }
}
