//! Resolution-dependent render targets

use crate::backend::*;
use crate::ShadingMode;

pub const GBUFFER_ALBEDO_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const GBUFFER_NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
}

impl Target {
    fn create<B: GraphicsBackend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let texture =
            backend.create_texture(&TextureDescriptor::render_target(label, width, height, format))?;
        let view = backend.create_texture_view(texture)?;
        Ok(Self { texture, view })
    }

    fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_texture_view(self.view);
        backend.destroy_texture(self.texture);
    }
}

/// Albedo and normal colour targets of deferred shading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBuffer {
    pub albedo: Target,
    pub normal: Target,
}

/// Every texture a frame renders into besides the swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargets {
    pub width: u32,
    pub height: u32,
    /// Deferred shading only
    pub gbuffer: Option<GBuffer>,
    /// Scene depth; sampled by the lighting pass in deferred mode
    pub depth: Target,
    /// Present when tonemapping is on
    pub hdr: Option<Target>,
}

impl RenderTargets {
    pub fn allocate<B: GraphicsBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
        shading: ShadingMode,
        tonemapping: bool,
    ) -> BackendResult<Self> {
        let (width, height) = (width.max(1), height.max(1));
        let gbuffer = match shading {
            ShadingMode::Deferred => Some(GBuffer {
                albedo: Target::create(backend, "gbuffer_albedo", width, height, GBUFFER_ALBEDO_FORMAT)?,
                normal: Target::create(backend, "gbuffer_normal", width, height, GBUFFER_NORMAL_FORMAT)?,
            }),
            ShadingMode::Forward => None,
        };
        let depth = Target::create(backend, "main_view_depth", width, height, DEPTH_FORMAT)?;
        let hdr = if tonemapping {
            Some(Target::create(backend, "hdr_image", width, height, HDR_FORMAT)?)
        } else {
            None
        };

        log::debug!("Allocated render targets {}x{}", width, height);
        Ok(Self {
            width,
            height,
            gbuffer,
            depth,
            hdr,
        })
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        if let Some(gbuffer) = self.gbuffer {
            gbuffer.albedo.destroy(backend);
            gbuffer.normal.destroy(backend);
        }
        self.depth.destroy(backend);
        if let Some(hdr) = self.hdr {
            hdr.destroy(backend);
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}
