//! GPU frustum culling that produces the scene's indirect draw commands
//!
//! Every frame the dispatcher clears the draw-command buffer, runs one
//! compute thread per instance and leaves one `DrawIndexedIndirect` slot per
//! render element. A relem with no visible instance keeps a zeroed slot, so
//! the draw that follows always consumes exactly `relem_count` commands.
//!
//! Recording order:
//! 1. barriers in: previous frame's vertex/indirect reads before compute
//!    and transfer writes
//! 2. clear of the draw-command buffer, then transfer to compute
//! 3. dispatch of `ceil(instance_count / 256)` workgroups
//! 4. barriers out: compute writes before vertex and indirect reads

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::backend::*;
use crate::scene::{
    relem_instance_offsets, DrawIndexedIndirect, Mesh, RenderElement, RenderElementBoundingBox,
    SceneBuffers, SceneManager,
};

/// Threads per culling workgroup
pub const WORKGROUP_SIZE: u32 = 256;

/// Shader constants for one culling dispatch
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullingPushConstants {
    pub proj_view: Mat4,
    pub instance_count: u32,
    pub relem_count: u32,
    pub _pad: [u32; 2],
}

impl CullingPushConstants {
    pub fn new(proj_view: Mat4, instance_count: u32, relem_count: u32) -> Self {
        Self {
            proj_view,
            instance_count,
            relem_count,
            _pad: [0; 2],
        }
    }
}

const _: () = assert!(std::mem::size_of::<CullingPushConstants>() as u32 <= MAX_PUSH_CONSTANT_SIZE);

pub fn workgroup_count(instance_count: u32) -> u32 {
    instance_count.div_ceil(WORKGROUP_SIZE)
}

/// Hand the per-frame buffers from last frame's draw to the cull
pub fn barriers_in(buffers: &SceneBuffers) -> [BufferBarrier; 3] {
    let vertex_read = (PipelineStages::VERTEX_SHADER, AccessFlags::SHADER_READ);
    let compute_write = (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_WRITE);
    [
        BufferBarrier::whole(buffers.inst_matrices, vertex_read, compute_write),
        BufferBarrier::whole(buffers.draw_matrices_ind, vertex_read, compute_write),
        BufferBarrier::whole(
            buffers.draw_cmd,
            (PipelineStages::DRAW_INDIRECT, AccessFlags::INDIRECT_COMMAND_READ),
            (
                PipelineStages::COMPUTE_SHADER | PipelineStages::TRANSFER,
                AccessFlags::SHADER_WRITE | AccessFlags::TRANSFER_WRITE,
            ),
        ),
    ]
}

/// Order the draw-command clear before the shader's atomics
pub fn barrier_after_clear(buffers: &SceneBuffers) -> BufferBarrier {
    BufferBarrier::whole(
        buffers.draw_cmd,
        (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE),
        (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_WRITE),
    )
}

/// Publish the cull results to the vertex stage and the indirect draw
pub fn barriers_out(buffers: &SceneBuffers) -> [BufferBarrier; 3] {
    let compute_write = (PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_WRITE);
    let vertex_read = (PipelineStages::VERTEX_SHADER, AccessFlags::SHADER_READ);
    [
        BufferBarrier::whole(buffers.inst_matrices, compute_write, vertex_read),
        BufferBarrier::whole(buffers.draw_matrices_ind, compute_write, vertex_read),
        BufferBarrier::whole(
            buffers.draw_cmd,
            compute_write,
            (PipelineStages::DRAW_INDIRECT, AccessFlags::INDIRECT_COMMAND_READ),
        ),
    ]
}

/// Whether any part of a local box may be on screen.
///
/// The box is culled only when all eight corners lie outside the same clip
/// plane, matching the shader test.
pub fn box_visible(mvp: Mat4, bbox: &RenderElementBoundingBox) -> bool {
    let clip: [Vec4; 8] = bbox.corners().map(|c| mvp * c.extend(1.0));
    let outside: [fn(&Vec4) -> bool; 6] = [
        |p: &Vec4| p.x < -p.w,
        |p: &Vec4| p.x > p.w,
        |p: &Vec4| p.y < -p.w,
        |p: &Vec4| p.y > p.w,
        |p: &Vec4| p.z < 0.0,
        |p: &Vec4| p.z > p.w,
    ];
    !outside.iter().any(|test| clip.iter().all(|p| test(p)))
}

/// Scene data the cull reads
#[derive(Debug, Clone, Copy)]
pub struct CullInputs<'a> {
    pub instance_matrices: &'a [Mat4],
    pub instance_meshes: &'a [u32],
    pub meshes: &'a [Mesh],
    pub relems: &'a [RenderElement],
    pub relem_boxes: &'a [RenderElementBoundingBox],
    pub matrices_offsets: &'a [u32],
}

impl<'a> CullInputs<'a> {
    pub fn from_scene(scene: &'a SceneManager) -> Self {
        Self {
            instance_matrices: scene.instance_matrices(),
            instance_meshes: scene.instance_meshes(),
            meshes: scene.meshes(),
            relems: scene.render_elements(),
            relem_boxes: scene.relem_boxes(),
            matrices_offsets: scene.matrices_offsets(),
        }
    }
}

/// What the culling shader leaves in the draw buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CullOutput {
    pub draw_cmds: Vec<DrawIndexedIndirect>,
    pub draw_matrices: Vec<u32>,
}

impl CullOutput {
    pub fn visible_draws(&self) -> usize {
        self.draw_cmds.iter().filter(|c| !c.is_degenerate()).count()
    }
}

/// CPU rendition of the culling shader.
///
/// Instances are visited in order, so each relem's run of `draw_matrices`
/// is sorted; the GPU fills runs in arbitrary order. Slots past a relem's
/// visible count stay zero.
pub fn cull_on_cpu(inputs: &CullInputs<'_>, proj_view: Mat4) -> CullOutput {
    let (counts, _) =
        relem_instance_offsets(inputs.meshes, inputs.relems.len(), inputs.instance_meshes);
    let mut out = CullOutput {
        draw_cmds: vec![DrawIndexedIndirect::default(); inputs.relems.len()],
        draw_matrices: vec![0; counts.iter().sum::<u32>() as usize],
    };

    for (instance, (&model, &mesh)) in inputs
        .instance_matrices
        .iter()
        .zip(inputs.instance_meshes)
        .enumerate()
    {
        let Some(mesh) = inputs.meshes.get(mesh as usize) else {
            continue;
        };
        let mvp = proj_view * model;
        for r in mesh.relems() {
            let (Some(relem), Some(bbox)) = (inputs.relems.get(r), inputs.relem_boxes.get(r)) else {
                break;
            };
            if !box_visible(mvp, bbox) {
                continue;
            }
            let offset = inputs.matrices_offsets[r];
            let cmd = &mut out.draw_cmds[r];
            let slot = cmd.instance_count;
            *cmd = relem.draw_command(slot + 1, offset);
            out.draw_matrices[(offset + slot) as usize] = instance as u32;
        }
    }

    out
}

/// Compute pipeline and bindings for the cull
pub struct CullDispatcher {
    layout: BindGroupLayoutHandle,
    pipeline: ComputePipelineHandle,
    bound: Option<(SceneBuffers, BindGroupHandle)>,
}

impl CullDispatcher {
    /// Bindings of [`CULLING_SHADER`]: scene inputs are read-only, the draw
    /// command and remap buffers are written.
    fn layout_entries() -> [BindGroupLayoutEntry; 8] {
        let storage = |binding, read_only| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::COMPUTE,
            ty: BindingType::StorageBuffer { read_only },
        };
        [
            storage(0, true),
            storage(1, true),
            storage(2, true),
            storage(3, true),
            storage(4, false),
            storage(5, false),
            storage(6, false),
            storage(7, true),
        ]
    }

    pub fn new<B: GraphicsBackend>(backend: &mut B) -> BackendResult<Self> {
        let layout = backend.create_bind_group_layout(&Self::layout_entries())?;

        let pipeline = backend.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("gpu_culling".into()),
            shader: CULLING_SHADER.into(),
            entry_point: "cs_main".into(),
            bind_group_layouts: vec![layout],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStageFlags::COMPUTE,
                range: 0..std::mem::size_of::<CullingPushConstants>() as u32,
            }],
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
        if let Some((bound, group)) = &self.bound {
            if bound == buffers {
                return Ok(*group);
            }
            backend.destroy_bind_group(*group);
            self.bound = None;
        }

        let group = backend.create_bind_group(
            self.layout,
            &[
                (0, BindGroupEntry::buffer(buffers.relem_box)),
                (1, BindGroupEntry::buffer(buffers.mesh)),
                (2, BindGroupEntry::buffer(buffers.inst_matrices)),
                (3, BindGroupEntry::buffer(buffers.inst_meshes)),
                (4, BindGroupEntry::buffer(buffers.draw_cmd)),
                (5, BindGroupEntry::buffer(buffers.draw_matrices_ind)),
                (6, BindGroupEntry::buffer(buffers.matrices_offsets_ind)),
                (7, BindGroupEntry::buffer(buffers.relem)),
            ],
        )?;
        self.bound = Some((*buffers, group));
        Ok(group)
    }

    /// Record the full cull for this frame. No-op without a scene.
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
        let constants =
            CullingPushConstants::new(proj_view, scene.instance_count(), scene.relem_count());

        backend.buffer_barriers(&barriers_in(buffers))?;
        let clear_size = scene.relem_count() as u64 * std::mem::size_of::<DrawIndexedIndirect>() as u64;
        if clear_size > 0 {
            backend.fill_buffer(buffers.draw_cmd, 0, clear_size, 0)?;
        }
        backend.buffer_barriers(&[barrier_after_clear(buffers)])?;

        backend.begin_compute_pass(Some("gpu_culling"));
        backend.set_compute_pipeline(self.pipeline);
        backend.set_bind_group(0, group);
        backend.set_push_constants(ShaderStageFlags::COMPUTE, 0, bytemuck::bytes_of(&constants));
        backend.dispatch_compute(workgroup_count(constants.instance_count), 1, 1);
        backend.end_compute_pass();

        backend.buffer_barriers(&barriers_out(buffers))?;
        log::trace!(
            "cull: {} instances, {} relems",
            constants.instance_count,
            constants.relem_count
        );
        Ok(())
    }

    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        if let Some((_, group)) = self.bound.take() {
            backend.destroy_bind_group(group);
        }
    }
}

pub const CULLING_SHADER: &str = r#"
struct Params {
    proj_view: mat4x4<f32>,
    instance_count: u32,
    relem_count: u32,
}

struct RelemBox {
    max_pos: vec3<f32>,
    min_pos: vec3<f32>,
}

struct Mesh {
    first_relem: u32,
    relem_count: u32,
}

struct Relem {
    vertex_offset: u32,
    index_offset: u32,
    index_count: u32,
}

struct DrawCmd {
    index_count: atomic<u32>,
    instance_count: atomic<u32>,
    first_index: atomic<u32>,
    base_vertex: atomic<u32>,
    first_instance: atomic<u32>,
}

var<push_constant> params: Params;

@group(0) @binding(0) var<storage, read> relem_boxes: array<RelemBox>;
@group(0) @binding(1) var<storage, read> meshes: array<Mesh>;
@group(0) @binding(2) var<storage, read> matrices: array<mat4x4<f32>>;
@group(0) @binding(3) var<storage, read> inst_meshes: array<u32>;
@group(0) @binding(4) var<storage, read_write> draw_cmds: array<DrawCmd>;
@group(0) @binding(5) var<storage, read_write> draw_matrices_ind: array<u32>;
@group(0) @binding(6) var<storage, read_write> matrices_offsets_ind: array<u32>;
@group(0) @binding(7) var<storage, read> relems: array<Relem>;

fn corner(b: RelemBox, i: u32) -> vec4<f32> {
    let x = select(b.min_pos.x, b.max_pos.x, (i & 1u) != 0u);
    let y = select(b.min_pos.y, b.max_pos.y, (i & 2u) != 0u);
    let z = select(b.min_pos.z, b.max_pos.z, (i & 4u) != 0u);
    return vec4<f32>(x, y, z, 1.0);
}

fn box_visible(mvp: mat4x4<f32>, b: RelemBox) -> bool {
    // Bit per clip plane; a plane stays set only if every corner is beyond it
    var outside = 63u;
    for (var i = 0u; i < 8u; i = i + 1u) {
        let p = mvp * corner(b, i);
        var mask = 0u;
        if p.x < -p.w { mask = mask | 1u; }
        if p.x > p.w { mask = mask | 2u; }
        if p.y < -p.w { mask = mask | 4u; }
        if p.y > p.w { mask = mask | 8u; }
        if p.z < 0.0 { mask = mask | 16u; }
        if p.z > p.w { mask = mask | 32u; }
        outside = outside & mask;
    }
    return outside == 0u;
}

@compute @workgroup_size(256)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let instance = gid.x;
    if instance >= params.instance_count {
        return;
    }

    let mvp = params.proj_view * matrices[instance];
    let mesh = meshes[inst_meshes[instance]];
    for (var i = 0u; i < mesh.relem_count; i = i + 1u) {
        let r = mesh.first_relem + i;
        if r >= params.relem_count {
            break;
        }
        if !box_visible(mvp, relem_boxes[r]) {
            continue;
        }

        let offset = matrices_offsets_ind[r];
        let slot = atomicAdd(&draw_cmds[r].instance_count, 1u);
        draw_matrices_ind[offset + slot] = instance;

        let relem = relems[r];
        atomicStore(&draw_cmds[r].index_count, relem.index_count);
        atomicStore(&draw_cmds[r].first_index, relem.index_offset);
        atomicStore(&draw_cmds[r].base_vertex, relem.vertex_offset);
        atomicStore(&draw_cmds[r].first_instance, offset);
    }
}
"#;
