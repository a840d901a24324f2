//! HDR to swapchain conversion through the luminance distribution

use crate::backend::*;

use super::targets::RenderTargets;
use super::tonemap::{TonemapPass, LUMINANCE_COMMON};

pub struct PresentPass {
    layout: BindGroupLayoutHandle,
    pipeline: RenderPipelineHandle,
    bind_group: Option<BindGroupHandle>,
}

impl PresentPass {
    pub fn new<B: GraphicsBackend>(backend: &mut B, swapchain_format: TextureFormat) -> BackendResult<Self> {
        let storage = |binding| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::StorageBuffer { read_only: true },
        };
        let layout = backend.create_bind_group_layout(&[
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                },
            },
            storage(1),
            storage(2),
        ])?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("hdr_to_ldr".into()),
            shader: [LUMINANCE_COMMON, HDR_TO_LDR_SHADER].concat(),
            vertex_entry: "vs_main".into(),
            fragment_entry: Some("fs_main".into()),
            vertex_layouts: Vec::new(),
            bind_group_layouts: vec![layout],
            push_constant_ranges: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState::opaque(swapchain_format)],
        })?;

        Ok(Self {
            layout,
            pipeline,
            bind_group: None,
        })
    }

    pub fn bind<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        targets: &RenderTargets,
        tonemap: &TonemapPass,
    ) -> BackendResult<()> {
        if let Some(group) = self.bind_group.take() {
            backend.destroy_bind_group(group);
        }
        let Some(hdr) = targets.hdr else {
            return Err(BackendError::InvalidCommand(
                "present needs an HDR target".into(),
            ));
        };
        let group = backend.create_bind_group(
            self.layout,
            &[
                (0, BindGroupEntry::Texture(hdr.view)),
                (1, BindGroupEntry::buffer(tonemap.max_luminance())),
                (2, BindGroupEntry::buffer(tonemap.histogram())),
            ],
        )?;
        self.bind_group = Some(group);
        Ok(())
    }

    /// Full-screen draw into `target`
    pub fn record<B: GraphicsBackend>(
        &self,
        backend: &mut B,
        target: TextureViewHandle,
        width: u32,
        height: u32,
    ) {
        let Some(group) = self.bind_group else {
            log::warn!("Present recorded before targets were bound");
            return;
        };
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Present".into()),
            color_attachments: vec![ColorAttachment {
                view: target,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, group);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        if let Some(group) = self.bind_group.take() {
            backend.destroy_bind_group(group);
        }
    }
}

pub const HDR_TO_LDR_SHADER: &str = r#"
@group(0) @binding(0) var hdr_image: texture_2d<f32>;
@group(0) @binding(1) var<storage, read> max_luminance: array<u32, 2>;
@group(0) @binding(2) var<storage, read> distribution: array<u32, 256>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureLoad(hdr_image, vec2<i32>(input.position.xy), 0).rgb;
    let l = luminance(color);
    if l <= 0.0 {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    let min_lum = bitcast<f32>(max_luminance[0]);
    let max_lum = bitcast<f32>(max_luminance[1]);
    let mapped = bitcast<f32>(distribution[lum_bin(l, min_lum, max_lum)]);
    return vec4<f32>(saturate(color * (mapped / l)), 1.0);
}
"#;
