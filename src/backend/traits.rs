//! Core backend abstraction traits
//!
//! Every GPU-facing component receives the backend explicitly; there is no
//! process-wide device state.

use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Invalid barrier: {0}")]
    InvalidBarrier(String),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineHandle(pub(crate) u64);

/// Handle to a compute pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineHandle(pub(crate) u64);

/// Handle to a bind group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) u64);

/// Handle to a bind group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutHandle(pub(crate) u64);

/// Bind group entry for creating bind groups
#[derive(Debug, Clone)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

impl BindGroupEntry {
    /// Bind a whole buffer
    pub fn buffer(buffer: BufferHandle) -> Self {
        BindGroupEntry::Buffer {
            buffer,
            offset: 0,
            size: None,
        }
    }
}

/// Bind group layout entry
#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStageFlags,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStageFlags(u32);

impl ShaderStageFlags {
    pub const VERTEX: Self = Self(1 << 0);
    pub const FRAGMENT: Self = Self(1 << 1);
    pub const COMPUTE: Self = Self(1 << 2);
    pub const VERTEX_FRAGMENT: Self = Self((1 << 0) | (1 << 1));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ShaderStageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Binding type
#[derive(Debug, Clone)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer { read_only: bool },
    Texture { sample_type: TextureSampleType },
    Sampler(SamplerBindingType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
    Sint,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerBindingType {
    Filtering,
    NonFiltering,
    Comparison,
}

/// A byte range of push constants visible to the given stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub range: Range<u32>,
}

/// Render pipeline descriptor
///
/// Both stages live in one WGSL module.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub vertex_entry: String,
    pub fragment_entry: Option<String>,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    pub primitive_topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub write_mask: ColorWrites,
}

impl ColorTargetState {
    pub fn opaque(format: TextureFormat) -> Self {
        Self {
            format,
            write_mask: ColorWrites::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorWrites(pub u32);

impl ColorWrites {
    pub const RED: Self = Self(1 << 0);
    pub const GREEN: Self = Self(1 << 1);
    pub const BLUE: Self = Self(1 << 2);
    pub const ALPHA: Self = Self(1 << 3);
    pub const ALL: Self = Self(0xF);

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Compute pipeline descriptor
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: String,
    pub entry_point: String,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Color attachment for render pass
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Depth stencil attachment for render pass
#[derive(Debug, Clone)]
pub struct DepthStencilAttachment {
    pub view: TextureViewHandle,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// Execution and memory dependency on a buffer range
///
/// Mirrors a pipeline buffer-memory barrier: work in `src_stage` performing
/// `src_access` must complete and be visible before `dst_stage` performs
/// `dst_access`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stage: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stage: PipelineStages,
    pub dst_access: AccessFlags,
    pub offset: u64,
    /// `None` covers the rest of the buffer
    pub size: Option<u64>,
    pub by_region: bool,
}

impl BufferBarrier {
    /// Barrier over the whole buffer, scoped by region
    pub fn whole(
        buffer: BufferHandle,
        (src_stage, src_access): (PipelineStages, AccessFlags),
        (dst_stage, dst_access): (PipelineStages, AccessFlags),
    ) -> Self {
        Self {
            buffer,
            src_stage,
            src_access,
            dst_stage,
            dst_access,
            offset: 0,
            size: None,
            by_region: true,
        }
    }

    /// Check that every access this barrier names is legal for a buffer
    /// created with `usage`.
    pub fn validate(&self, usage: BufferUsage) -> BackendResult<()> {
        if self.src_stage.is_empty() || self.dst_stage.is_empty() {
            return Err(BackendError::InvalidBarrier(format!(
                "buffer {:?}: empty stage mask",
                self.buffer
            )));
        }
        let access = self.src_access | self.dst_access;
        let required = [
            (AccessFlags::INDIRECT_COMMAND_READ, BufferUsage::INDIRECT, "INDIRECT"),
            (AccessFlags::SHADER_WRITE, BufferUsage::STORAGE, "STORAGE"),
            (AccessFlags::TRANSFER_WRITE, BufferUsage::COPY_DST, "COPY_DST"),
        ];
        for (flag, needed, name) in required {
            if access.contains(flag) && !usage.contains(needed) {
                return Err(BackendError::InvalidBarrier(format!(
                    "buffer {:?} is missing {} usage for {:?}",
                    self.buffer, name, flag
                )));
            }
        }
        if access.contains(AccessFlags::SHADER_READ)
            && !usage.intersects(BufferUsage::STORAGE | BufferUsage::UNIFORM)
        {
            return Err(BackendError::InvalidBarrier(format!(
                "buffer {:?} cannot be read by shaders",
                self.buffer
            )));
        }
        Ok(())
    }
}

/// Frame context returned when beginning a frame
pub struct FrameContext {
    pub swapchain_view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Resize the swapchain
    fn resize(&mut self, width: u32, height: u32);

    /// Get the actual surface size (may be clamped by device limits)
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame. `None` means the surface cannot be presented to
    /// right now and the frame should be skipped.
    fn begin_frame(&mut self) -> BackendResult<Option<FrameContext>>;

    /// Submit recorded work and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Get the swapchain format
    fn swapchain_format(&self) -> TextureFormat;

    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self);

    // Resource creation

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Write data to a buffer through the queue, ahead of this frame's commands
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Create a texture view
    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle>;

    /// Write tightly packed texel rows to mip 0 of a texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32);

    /// Create a sampler
    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    // Pipeline creation

    /// Create a bind group layout
    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle>;

    /// Create a bind group
    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;

    /// Create a render pipeline
    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle>;

    /// Create a compute pipeline
    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> BackendResult<ComputePipelineHandle>;

    // Command recording and execution

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor);

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Begin a compute pass
    fn begin_compute_pass(&mut self, label: Option<&str>);

    /// End the current compute pass
    fn end_compute_pass(&mut self);

    /// Set the render pipeline
    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    /// Set the compute pipeline
    fn set_compute_pipeline(&mut self, pipeline: ComputePipelineHandle);

    /// Set a bind group
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle);

    /// Set push constant bytes for the bound pipeline
    fn set_push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]);

    /// Set vertex buffer
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Set index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    /// Set viewport
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32);

    /// Draw primitives
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Draw indexed primitives
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Draw `count` consecutive [`DrawIndexedIndirect`] records read from `buffer`
    fn draw_indexed_indirect(&mut self, buffer: BufferHandle, offset: u64, count: u32);

    /// Dispatch compute work
    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32);

    /// Fill `size` bytes of a buffer with a repeated 32-bit pattern, in
    /// command order
    fn fill_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        value: u32,
    ) -> BackendResult<()>;

    /// Record buffer memory barriers between passes
    fn buffer_barriers(&mut self, barriers: &[BufferBarrier]) -> BackendResult<()>;

    // Resource cleanup

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a texture view
    fn destroy_texture_view(&mut self, view: TextureViewHandle);

    /// Destroy a bind group
    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle);
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}
