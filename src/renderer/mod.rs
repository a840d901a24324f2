//! World renderer
//!
//! One orchestrator drives every frame configuration. [`PassConfig`] picks
//! deferred or forward shading and switches terrain and tonemapping on or
//! off; the frame is always recorded in the same order:
//!
//! 1. GPU cull into the indirect command buffer
//! 2. G-buffer (deferred) or lit colour (forward) for static meshes, then terrain
//! 3. Deferred lighting
//! 4. Tonemapping compute chain
//! 5. Present

mod lighting;
mod lights;
mod present;
mod static_mesh;
mod targets;
mod terrain;
mod tonemap;

pub use lighting::{LightingPass, DEFERRED_LIGHTING_SHADER};
pub use lights::{default_lights, GpuLightData, Light, DIRECTIONAL_RADIUS};
pub use present::{PresentPass, HDR_TO_LDR_SHADER};
pub use static_mesh::{ScenePushConstants, StaticMeshPass, STATIC_MESH_SHADER};
pub use targets::{
    GBuffer, RenderTargets, Target, DEPTH_FORMAT, GBUFFER_ALBEDO_FORMAT, GBUFFER_NORMAL_FORMAT,
    HDR_FORMAT,
};
pub use terrain::{TerrainPass, TerrainPushConstants, PATCHES, PATCH_QUADS, TERRAIN_SHADER, VERTICES_PER_PATCH};
pub use tonemap::{
    workgroup_grid, TonemapPass, HISTOGRAM_BINS, LUMINANCE_COMMON, MIN_LUMINANCE_SEED, TILE_SIZE,
    TONEMAP_DISTRIBUTION_SHADER, TONEMAP_HISTOGRAM_SHADER, TONEMAP_MIN_MAX_SHADER,
};

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::backend::*;
use crate::culling::CullDispatcher;
use crate::scene::{FramePacket, SceneError, SceneManager};
use crate::{PassConfig, ShadingMode, TerrainConfig};

const SKY_COLOR: [f32; 4] = [0.35, 0.5, 0.75, 1.0];

/// Per-frame constants of the deferred lighting pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RenderConstants {
    pub proj: Mat4,
    pub view: Mat4,
    pub proj_view: Mat4,
    pub inv_proj_view: Mat4,
    pub instance_count: u32,
    pub relem_count: u32,
    pub lights_count: u32,
    pub _pad0: u32,
    pub camera_pos: Vec3,
    pub _pad1: f32,
    pub res: [u32; 2],
    pub _pad2: [u32; 2],
}

impl RenderConstants {
    pub fn new(frame: &FramePacket, targets: &RenderTargets, scene: &SceneManager, lights_count: u32) -> Self {
        let camera = &frame.main_camera;
        let proj = camera.proj_tm(targets.aspect());
        let view = camera.view_tm();
        let proj_view = proj * view;
        Self {
            proj,
            view,
            proj_view,
            inv_proj_view: proj_view.inverse(),
            instance_count: scene.instance_count(),
            relem_count: scene.relem_count(),
            lights_count,
            _pad0: 0,
            camera_pos: camera.position,
            _pad1: 0.0,
            res: [targets.width, targets.height],
            _pad2: [0; 2],
        }
    }
}

pub struct WorldRenderer {
    config: PassConfig,
    scene: SceneManager,
    culling: CullDispatcher,
    static_mesh: StaticMeshPass,
    terrain: Option<TerrainPass>,
    lighting: Option<LightingPass>,
    tonemap: Option<TonemapPass>,
    present: Option<PresentPass>,
    targets: Option<RenderTargets>,
    frame: FramePacket,
}

impl WorldRenderer {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        config: PassConfig,
        terrain: &TerrainConfig,
    ) -> BackendResult<Self> {
        let scene = SceneManager::new(backend, terrain)?;
        Self::with_scene(backend, config, scene)
    }

    /// Build the passes of `config` around an existing scene. Used when the
    /// pass configuration changes at runtime.
    pub fn with_scene<B: GraphicsBackend>(
        backend: &mut B,
        config: PassConfig,
        scene: SceneManager,
    ) -> BackendResult<Self> {
        let swapchain_format = backend.swapchain_format();
        let output_format = if config.tonemapping {
            HDR_FORMAT
        } else {
            swapchain_format
        };

        let culling = CullDispatcher::new(backend)?;
        let static_mesh = StaticMeshPass::new(backend, config.shading, output_format)?;
        let terrain = if config.terrain {
            Some(TerrainPass::new(backend, scene.heightmap(), config.shading, output_format)?)
        } else {
            None
        };
        let lighting = match config.shading {
            ShadingMode::Deferred => Some(LightingPass::new(backend, output_format, &default_lights())?),
            ShadingMode::Forward => None,
        };
        let (tonemap, present) = if config.tonemapping {
            (
                Some(TonemapPass::new(backend)?),
                Some(PresentPass::new(backend, swapchain_format)?),
            )
        } else {
            (None, None)
        };

        log::info!("World renderer: {:?}", config);
        Ok(Self {
            config,
            scene,
            culling,
            static_mesh,
            terrain,
            lighting,
            tonemap,
            present,
            targets: None,
            frame: FramePacket::default(),
        })
    }

    pub fn config(&self) -> PassConfig {
        self.config
    }

    pub fn scene(&self) -> &SceneManager {
        &self.scene
    }

    pub fn targets(&self) -> Option<&RenderTargets> {
        self.targets.as_ref()
    }

    pub fn tonemap(&self) -> Option<&TonemapPass> {
        self.tonemap.as_ref()
    }

    pub fn load_scene<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        path: impl AsRef<Path>,
    ) -> Result<(), SceneError> {
        self.scene.select_scene(backend, path)
    }

    /// (Re)create every resolution-dependent target and rebind the passes
    /// that read them.
    pub fn allocate_resources<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if let Some(old) = self.targets.take() {
            old.destroy(backend);
        }
        let targets = RenderTargets::allocate(
            backend,
            width,
            height,
            self.config.shading,
            self.config.tonemapping,
        )?;

        if let Some(lighting) = &mut self.lighting {
            lighting.bind(backend, &targets)?;
        }
        if let Some(tonemap) = &mut self.tonemap {
            tonemap.bind(backend, &targets)?;
            if let Some(present) = &mut self.present {
                present.bind(backend, &targets, tonemap)?;
            }
        }
        self.targets = Some(targets);
        Ok(())
    }

    pub fn update(&mut self, frame: &FramePacket) {
        self.frame = frame.clone();
    }

    /// Record one frame ending in `target`, normally the swapchain view.
    pub fn render_world<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        target: TextureViewHandle,
    ) -> BackendResult<()> {
        let Some(targets) = self.targets else {
            return Err(BackendError::InvalidCommand(
                "render_world called before allocate_resources".into(),
            ));
        };
        let camera = &self.frame.main_camera;
        let proj_view = camera.proj_view(targets.aspect());
        let camera_pos = camera.position;
        let output = targets.hdr.map_or(target, |hdr| hdr.view);

        self.culling.record(backend, &self.scene, proj_view)?;

        match self.config.shading {
            ShadingMode::Deferred => {
                let Some(gbuffer) = targets.gbuffer else {
                    return Err(BackendError::InvalidCommand("deferred frame without a G-buffer".into()));
                };
                begin_scene_pass(
                    backend,
                    "GBuffer",
                    &[(gbuffer.albedo.view, LoadOp::Clear([0.0; 4])), (gbuffer.normal.view, LoadOp::Clear([0.0; 4]))],
                    targets.depth.view,
                    LoadOp::Clear([0.0; 4]),
                    &targets,
                );
                self.static_mesh.record(backend, &self.scene, proj_view)?;
                if let Some(terrain) = &self.terrain {
                    terrain.record(backend, proj_view, camera_pos);
                }
                backend.end_render_pass();

                if let Some(lighting) = &self.lighting {
                    let constants =
                        RenderConstants::new(&self.frame, &targets, &self.scene, lighting.lights_count());
                    lighting.update(backend, &constants);
                    backend.begin_render_pass(&RenderPassDescriptor {
                        label: Some("Lighting".into()),
                        color_attachments: vec![ColorAttachment {
                            view: output,
                            load_op: LoadOp::Clear(SKY_COLOR),
                            store_op: StoreOp::Store,
                        }],
                        depth_stencil_attachment: None,
                    });
                    set_full_viewport(backend, &targets);
                    lighting.record(backend);
                    backend.end_render_pass();
                }
            }
            ShadingMode::Forward => {
                begin_scene_pass(
                    backend,
                    "Forward",
                    &[(output, LoadOp::Clear(SKY_COLOR))],
                    targets.depth.view,
                    LoadOp::Clear([0.0; 4]),
                    &targets,
                );
                self.static_mesh.record(backend, &self.scene, proj_view)?;
                backend.end_render_pass();

                if let Some(terrain) = &self.terrain {
                    begin_scene_pass(backend, "Terrain", &[(output, LoadOp::Load)], targets.depth.view, LoadOp::Load, &targets);
                    terrain.record(backend, proj_view, camera_pos);
                    backend.end_render_pass();
                }
            }
        }

        if let (Some(tonemap), Some(present)) = (&self.tonemap, &self.present) {
            tonemap.record(backend, targets.width, targets.height)?;
            present.record(backend, target, targets.width, targets.height);
        }
        Ok(())
    }

    /// Release every GPU object. The caller waits for the device to go
    /// idle first.
    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        self.into_scene(backend).destroy(backend);
    }

    /// Release the passes and hand back the scene so a renderer with a
    /// different configuration can reuse it.
    pub fn into_scene<B: GraphicsBackend>(self, backend: &mut B) -> SceneManager {
        if let Some(targets) = self.targets {
            targets.destroy(backend);
        }
        if let Some(present) = self.present {
            present.destroy(backend);
        }
        if let Some(tonemap) = self.tonemap {
            tonemap.destroy(backend);
        }
        if let Some(lighting) = self.lighting {
            lighting.destroy(backend);
        }
        if let Some(terrain) = self.terrain {
            terrain.destroy(backend);
        }
        self.static_mesh.destroy(backend);
        self.culling.destroy(backend);
        self.scene
    }
}

fn set_full_viewport<B: GraphicsBackend>(backend: &mut B, targets: &RenderTargets) {
    backend.set_viewport(0.0, 0.0, targets.width as f32, targets.height as f32, 0.0, 1.0);
}

/// Open a pass over colour targets plus the scene depth buffer
fn begin_scene_pass<B: GraphicsBackend>(
    backend: &mut B,
    label: &str,
    colors: &[(TextureViewHandle, LoadOp)],
    depth: TextureViewHandle,
    depth_load: LoadOp,
    targets: &RenderTargets,
) {
    backend.begin_render_pass(&RenderPassDescriptor {
        label: Some(label.into()),
        color_attachments: colors
            .iter()
            .map(|&(view, load_op)| ColorAttachment {
                view,
                load_op,
                store_op: StoreOp::Store,
            })
            .collect(),
        depth_stencil_attachment: Some(DepthStencilAttachment {
            view: depth,
            depth_load_op: depth_load,
            depth_store_op: StoreOp::Store,
            depth_clear_value: 1.0,
        }),
    });
    set_full_viewport(backend, targets);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_constants_match_shader_layout() {
        assert_eq!(std::mem::size_of::<RenderConstants>(), 304);
        assert_eq!(std::mem::offset_of!(RenderConstants, camera_pos), 272);
        assert_eq!(std::mem::offset_of!(RenderConstants, res), 288);
    }
}
