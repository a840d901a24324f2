//! Deferred lighting
//!
//! Full-screen pass that reads the G-buffer and scene depth, reconstructs
//! world positions and accumulates every light into the output target.

use crate::backend::*;

use super::lights::{GpuLightData, Light};
use super::targets::RenderTargets;
use super::RenderConstants;

pub struct LightingPass {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    constants: BufferHandle,
    lights: BufferHandle,
    lights_count: u32,
    bind_group: Option<BindGroupHandle>,
}

impl LightingPass {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        output_format: TextureFormat,
        lights: &[Light],
    ) -> BackendResult<Self> {
        let texture = |binding, sample_type| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Texture { sample_type },
        };
        let layout = backend.create_bind_group_layout(&[
            texture(0, TextureSampleType::Float { filterable: false }),
            texture(1, TextureSampleType::Float { filterable: false }),
            texture(2, TextureSampleType::Depth),
            BindGroupLayoutEntry {
                binding: 3,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::UniformBuffer,
            },
            BindGroupLayoutEntry {
                binding: 4,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::StorageBuffer { read_only: true },
            },
        ])?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("deferred_lighting".into()),
            shader: DEFERRED_LIGHTING_SHADER.into(),
            vertex_entry: "vs_main".into(),
            fragment_entry: Some("fs_main".into()),
            vertex_layouts: Vec::new(),
            bind_group_layouts: vec![layout],
            push_constant_ranges: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState::opaque(output_format)],
        })?;

        let constants = backend.create_buffer(&BufferDescriptor::new(
            "render_constants",
            std::mem::size_of::<RenderConstants>() as u64,
            BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        ))?;

        let mut gpu_lights: Vec<GpuLightData> = lights.iter().map(Light::to_gpu_data).collect();
        let lights_count = gpu_lights.len() as u32;
        // Storage bindings may not be empty
        if gpu_lights.is_empty() {
            gpu_lights.push(bytemuck::Zeroable::zeroed());
        }
        let lights = backend.create_buffer_init(
            &BufferDescriptor::new(
                "lights",
                std::mem::size_of_val(gpu_lights.as_slice()) as u64,
                BufferUsage::STORAGE | BufferUsage::COPY_DST,
            ),
            bytemuck::cast_slice(&gpu_lights),
        )?;

        Ok(Self {
            layout,
            pipeline,
            constants,
            lights,
            lights_count,
            bind_group: None,
        })
    }

    pub fn lights_count(&self) -> u32 {
        self.lights_count
    }

    /// Rebind to freshly allocated targets
    pub fn bind<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        targets: &RenderTargets,
    ) -> BackendResult<()> {
        if let Some(group) = self.bind_group.take() {
            backend.destroy_bind_group(group);
        }
        let Some(gbuffer) = targets.gbuffer else {
            return Err(BackendError::InvalidCommand(
                "deferred lighting needs a G-buffer".into(),
            ));
        };
        let group = backend.create_bind_group(
            self.layout,
            &[
                (0, BindGroupEntry::Texture(gbuffer.albedo.view)),
                (1, BindGroupEntry::Texture(gbuffer.normal.view)),
                (2, BindGroupEntry::Texture(targets.depth.view)),
                (3, BindGroupEntry::buffer(self.constants)),
                (4, BindGroupEntry::buffer(self.lights)),
            ],
        )?;
        self.bind_group = Some(group);
        Ok(())
    }

    pub fn update<B: GraphicsBackend>(&self, backend: &mut B, constants: &RenderConstants) {
        backend.write_buffer(self.constants, 0, bytemuck::bytes_of(constants));
    }

    /// Record the full-screen triangle into the open render pass
    pub fn record<B: GraphicsBackend>(&self, backend: &mut B) {
        let Some(group) = self.bind_group else {
            log::warn!("Deferred lighting recorded before targets were bound");
            return;
        };
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, group);
        backend.draw(0..3, 0..1);
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        if let Some(group) = self.bind_group.take() {
            backend.destroy_bind_group(group);
        }
        backend.destroy_buffer(self.constants);
        backend.destroy_buffer(self.lights);
    }
}

pub const DEFERRED_LIGHTING_SHADER: &str = r#"
struct RenderConstants {
    proj: mat4x4<f32>,
    view: mat4x4<f32>,
    proj_view: mat4x4<f32>,
    inv_proj_view: mat4x4<f32>,
    instance_count: u32,
    relem_count: u32,
    lights_count: u32,
    camera_pos: vec3<f32>,
    res: vec2<u32>,
}

struct LightData {
    // xyz = position or direction towards the light, w = radius (0 for directional)
    position: vec4<f32>,
    // xyz = color, w = intensity
    color_intensity: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0) var gbuffer_albedo: texture_2d<f32>;
@group(0) @binding(1) var gbuffer_normal: texture_2d<f32>;
@group(0) @binding(2) var gbuffer_depth: texture_depth_2d;
@group(0) @binding(3) var<uniform> constants: RenderConstants;
@group(0) @binding(4) var<storage, read> lights: array<LightData>;

const AMBIENT: vec3<f32> = vec3<f32>(0.06, 0.07, 0.09);
const SKY: vec3<f32> = vec3<f32>(0.35, 0.5, 0.75);

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);
    return output;
}

fn reconstruct_world_position(uv: vec2<f32>, depth: f32) -> vec3<f32> {
    let ndc = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth, 1.0);
    let world = constants.inv_proj_view * ndc;
    return world.xyz / world.w;
}

fn shade(light: LightData, world_pos: vec3<f32>, normal: vec3<f32>, albedo: vec3<f32>, view_dir: vec3<f32>) -> vec3<f32> {
    var light_dir: vec3<f32>;
    var attenuation = 1.0;
    if light.position.w > 0.0 {
        let to_light = light.position.xyz - world_pos;
        light_dir = normalize(to_light);
        let falloff = max(0.0, 1.0 - length(to_light) / light.position.w);
        attenuation = falloff * falloff;
    } else {
        light_dir = normalize(light.position.xyz);
    }

    let ndotl = max(dot(normal, light_dir), 0.0);
    let half_vec = normalize(light_dir + view_dir);
    let specular = pow(max(dot(normal, half_vec), 0.0), 32.0) * 0.1;
    let radiance = light.color_intensity.xyz * light.color_intensity.w * attenuation;
    return (albedo * ndotl + vec3<f32>(specular)) * radiance;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(input.position.xy);
    let depth = textureLoad(gbuffer_depth, pixel, 0);
    if depth >= 1.0 {
        return vec4<f32>(SKY, 1.0);
    }

    let albedo = textureLoad(gbuffer_albedo, pixel, 0).rgb;
    let normal = normalize(textureLoad(gbuffer_normal, pixel, 0).xyz);
    let world_pos = reconstruct_world_position(input.uv, depth);
    let view_dir = normalize(constants.camera_pos - world_pos);

    var color = AMBIENT * albedo;
    for (var i = 0u; i < constants.lights_count; i = i + 1u) {
        color = color + shade(lights[i], world_pos, normal, albedo, view_dir);
    }
    return vec4<f32>(color, 1.0);
}
"#;
