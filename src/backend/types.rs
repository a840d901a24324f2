//! Common types shared between backends

use bytemuck::{Pod, Zeroable};

/// Largest push constant block any pipeline may declare
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
    R32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const STORAGE_BINDING: Self = Self(1 << 3);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const MAP_READ: Self = Self(1 << 0);
    pub const MAP_WRITE: Self = Self(1 << 1);
    pub const COPY_SRC: Self = Self(1 << 2);
    pub const COPY_DST: Self = Self(1 << 3);
    pub const INDEX: Self = Self(1 << 4);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);
    pub const STORAGE: Self = Self(1 << 7);
    pub const INDIRECT: Self = Self(1 << 8);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Pipeline stages a barrier waits on or unblocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineStages(u32);

impl PipelineStages {
    pub const DRAW_INDIRECT: Self = Self(1 << 0);
    pub const VERTEX_SHADER: Self = Self(1 << 1);
    pub const FRAGMENT_SHADER: Self = Self(1 << 2);
    pub const COLOR_ATTACHMENT_OUTPUT: Self = Self(1 << 3);
    pub const COMPUTE_SHADER: Self = Self(1 << 4);
    pub const TRANSFER: Self = Self(1 << 5);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for PipelineStages {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Memory access kinds made visible or available by a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessFlags(u32);

impl AccessFlags {
    pub const INDIRECT_COMMAND_READ: Self = Self(1 << 0);
    pub const SHADER_READ: Self = Self(1 << 1);
    pub const SHADER_WRITE: Self = Self(1 << 2);
    pub const TRANSFER_WRITE: Self = Self(1 << 3);
    pub const COLOR_ATTACHMENT_WRITE: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

impl TextureDescriptor {
    /// A single-mip 2D render target sized to the current resolution
    pub fn render_target(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(label.into()),
            width,
            height,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
    pub mapped_at_creation: bool,
}

impl BufferDescriptor {
    pub fn new(label: &str, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: Some(label.into()),
            size,
            usage,
            mapped_at_creation: false,
        }
    }
}

/// Indirect indexed draw arguments, laid out as the GPU consumes them
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

const _: () = assert!(std::mem::size_of::<DrawIndexedIndirect>() == 20);

impl DrawIndexedIndirect {
    /// A command that draws nothing
    pub fn is_degenerate(&self) -> bool {
        self.index_count == 0 || self.instance_count == 0
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    /// Packed 8-bit lanes, unpacked in the shader
    Uint32,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Uint32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexStepMode {
    Vertex,
    Instance,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

/// Front face winding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Ccw,
    Cw,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth/stencil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Always,
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Sampler descriptor
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub compare: Option<CompareFunction>,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            compare: None,
        }
    }
}
