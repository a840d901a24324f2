//! Deferred Renderer - a GPU-driven renderer for glTF scenes
//!
//! Scene geometry is baked into one packed vertex format and uploaded into
//! unified GPU buffers. Every frame a compute pass culls instances against
//! the camera frustum and writes one indirect draw command per render
//! element, which the geometry pass consumes with a single indirect draw.
//!
//! # Features
//! - glTF/GLB loading and baking (also available offline via `model_baker`)
//! - Compute culling with explicit buffer barrier choreography
//! - Deferred or forward shading, heightmap terrain
//! - Histogram-based tonemapping
//! - A recording [`backend::DummyBackend`] for headless testing

pub mod assets;
pub mod backend;
pub mod bake;
pub mod culling;
pub mod renderer;
pub mod scene;

use std::path::PathBuf;

pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{BackendError, BackendResult, GraphicsBackend};
pub use renderer::WorldRenderer;
pub use scene::{Camera, FramePacket, SceneManager};

/// Where static meshes write their surface data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    /// G-buffer, then a full-screen lighting pass
    #[default]
    Deferred,
    /// Lit directly in the mesh fragment shader
    Forward,
}

/// Which passes the world renderer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassConfig {
    pub shading: ShadingMode,
    pub terrain: bool,
    pub tonemapping: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            shading: ShadingMode::Deferred,
            terrain: true,
            tonemapping: true,
        }
    }
}

impl PassConfig {
    pub fn deferred() -> Self {
        Self {
            shading: ShadingMode::Deferred,
            terrain: false,
            tonemapping: false,
        }
    }

    pub fn forward() -> Self {
        Self {
            shading: ShadingMode::Forward,
            terrain: false,
            tonemapping: false,
        }
    }

    pub fn terrain_forward() -> Self {
        Self {
            terrain: true,
            ..Self::forward()
        }
    }

    /// Deferred shading with terrain and tonemapping
    pub fn tonemapped() -> Self {
        Self::default()
    }
}

/// Heightmap source for the terrain
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainConfig {
    /// Grayscale image to load; generated procedurally when `None`
    pub heightmap: Option<PathBuf>,
    /// Side length of a generated heightmap
    pub resolution: u32,
    /// Noise seed of a generated heightmap
    pub seed: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            heightmap: None,
            resolution: 1024,
            seed: 0x5eed,
        }
    }
}

/// Configuration for the viewer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    pub passes: PassConfig,
    /// Scene loaded at startup
    pub scene: Option<PathBuf>,
    pub terrain: TerrainConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            passes: PassConfig::default(),
            scene: None,
            terrain: TerrainConfig::default(),
        }
    }
}
