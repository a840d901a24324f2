//! Frame choreography of the world renderer for each pass configuration.

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{city_fixture, small_terrain};
use deferred_renderer::backend::{
    BackendError, Command, DummyBackend, GraphicsBackend, LoadOp, TextureViewHandle,
};
use deferred_renderer::renderer::{MIN_LUMINANCE_SEED, PATCHES, VERTICES_PER_PATCH};
use deferred_renderer::scene::{Camera, FramePacket};
use deferred_renderer::{PassConfig, ShadingMode, WorldRenderer};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn frame_packet() -> FramePacket {
    FramePacket {
        main_camera: Camera::new(Vec3::new(0.0, 0.0, 20.0), Vec3::ZERO),
        current_time: 0.0,
    }
}

struct Harness {
    backend: DummyBackend,
    renderer: WorldRenderer,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(config: PassConfig, with_scene: bool) -> Self {
        let mut backend = DummyBackend::new(WIDTH, HEIGHT);
        let mut renderer = WorldRenderer::new(&mut backend, config, &small_terrain()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        if with_scene {
            let path = city_fixture().write(dir.path(), "city");
            renderer.load_scene(&mut backend, &path).unwrap();
        }
        renderer.allocate_resources(&mut backend, WIDTH, HEIGHT).unwrap();
        Self {
            backend,
            renderer,
            _dir: dir,
        }
    }

    /// Record one frame and return its swapchain view
    fn render(&mut self) -> TextureViewHandle {
        let frame = self.backend.begin_frame().unwrap().unwrap();
        self.backend.clear_commands();
        self.renderer.update(&frame_packet());
        self.renderer
            .render_world(&mut self.backend, frame.swapchain_view)
            .unwrap();
        self.backend.end_frame().unwrap();
        frame.swapchain_view
    }

    fn pass_labels(&self) -> Vec<String> {
        self.backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BeginRenderPass { label, .. } => label.clone(),
                _ => None,
            })
            .collect()
    }
}

#[rstest]
#[case::deferred(PassConfig::deferred(), &["GBuffer", "Lighting"])]
#[case::forward(PassConfig::forward(), &["Forward"])]
#[case::terrain_forward(PassConfig::terrain_forward(), &["Forward", "Terrain"])]
#[case::tonemapped(PassConfig::tonemapped(), &["GBuffer", "Lighting", "Present"])]
fn frame_runs_enabled_passes(#[case] config: PassConfig, #[case] passes: &[&str]) {
    let mut h = Harness::new(config, true);
    let swapchain = h.render();

    assert_eq!(h.pass_labels(), passes);
    assert!(h.backend.misuse().is_empty(), "{:?}", h.backend.misuse());
    assert_eq!(h.backend.frames_presented(), 1);

    // One indirect draw covers every relem
    let indirect: Vec<_> = h
        .backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexedIndirect { buffer, count, .. } => Some((*buffer, *count)),
            _ => None,
        })
        .collect();
    let draw_cmd = h.renderer.scene().buffers().unwrap().draw_cmd;
    assert_eq!(indirect, vec![(draw_cmd, 3)]);

    let terrain_draws = h
        .backend
        .commands()
        .iter()
        .filter(|c| {
            **c == Command::Draw {
                vertices: 0..VERTICES_PER_PATCH,
                instances: 0..PATCHES * PATCHES,
            }
        })
        .count();
    assert_eq!(terrain_draws, config.terrain as usize);

    // The last pass always ends in the swapchain image
    let last_target = h
        .backend
        .commands()
        .iter()
        .rev()
        .find_map(|c| match c {
            Command::BeginRenderPass { color_targets, .. } => Some(color_targets.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_target, vec![swapchain]);
}

#[test]
fn cull_precedes_geometry() {
    let mut h = Harness::new(PassConfig::deferred(), true);
    h.render();

    let commands = h.backend.commands();
    let dispatch = commands
        .iter()
        .position(|c| matches!(c, Command::Dispatch { .. }))
        .unwrap();
    let draw = commands
        .iter()
        .position(|c| matches!(c, Command::DrawIndexedIndirect { .. }))
        .unwrap();
    let lighting = commands
        .iter()
        .position(|c| *c == Command::Draw { vertices: 0..3, instances: 0..1 })
        .unwrap();
    assert!(dispatch < draw && draw < lighting);
}

#[test]
fn tonemapping_follows_buffer_lifecycle() {
    let mut h = Harness::new(PassConfig::tonemapped(), true);
    h.render();

    let tonemap = h.renderer.tonemap().unwrap();
    let (max_lum, hist) = (tonemap.max_luminance(), tonemap.histogram());
    let commands = h.backend.commands();

    let fills: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::FillBuffer { buffer, offset, size, value } if *buffer == max_lum || *buffer == hist => {
                Some((*buffer, *offset, *size, *value))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        fills,
        vec![
            (max_lum, 0, 8, 0),
            (hist, 0, 1024, 0),
            (max_lum, 0, 4, MIN_LUMINANCE_SEED),
        ]
    );

    let start = commands
        .iter()
        .position(|c| matches!(c, Command::FillBuffer { buffer, .. } if *buffer == max_lum))
        .unwrap();
    let dispatches: Vec<_> = commands[start..]
        .iter()
        .filter_map(|c| match c {
            Command::Dispatch { x, y, z } => Some((*x, *y, *z)),
            _ => None,
        })
        .collect();
    assert_eq!(dispatches, vec![(2, 2, 1), (2, 2, 1), (1, 1, 1)]);

    // Reset and compute passes all happen before presenting
    let present = commands
        .iter()
        .position(|c| matches!(c, Command::BeginRenderPass { label: Some(l), .. } if l == "Present"))
        .unwrap();
    let last_barrier = commands
        .iter()
        .rposition(|c| matches!(c, Command::Barriers(_)))
        .unwrap();
    assert!(last_barrier < present);

    let seed = &h.backend.buffer_data(max_lum).unwrap()[..4];
    assert_eq!(seed, MIN_LUMINANCE_SEED.to_le_bytes());
}

#[test]
fn forward_terrain_keeps_colour_and_depth() {
    let mut h = Harness::new(PassConfig::terrain_forward(), true);
    h.render();

    let terrain_loads = h
        .backend
        .commands()
        .iter()
        .find_map(|c| match c {
            Command::BeginRenderPass { label: Some(l), color_loads, .. } if l == "Terrain" => {
                Some(color_loads.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(terrain_loads, vec![LoadOp::Load]);
}

#[test]
fn empty_scene_still_renders() {
    let mut h = Harness::new(PassConfig::deferred(), false);
    h.render();

    assert!(h.renderer.scene().buffers().is_none());
    assert_eq!(h.pass_labels(), vec!["GBuffer", "Lighting"]);
    assert!(!h
        .backend
        .commands()
        .iter()
        .any(|c| matches!(c, Command::DrawIndexedIndirect { .. } | Command::Dispatch { .. })));
    assert!(h.backend.misuse().is_empty(), "{:?}", h.backend.misuse());
}

#[test]
fn render_before_allocation_fails() {
    let mut backend = DummyBackend::new(WIDTH, HEIGHT);
    let mut renderer = WorldRenderer::new(&mut backend, PassConfig::deferred(), &small_terrain()).unwrap();
    let frame = backend.begin_frame().unwrap().unwrap();

    let err = renderer.render_world(&mut backend, frame.swapchain_view).unwrap_err();
    assert!(matches!(err, BackendError::InvalidCommand(_)));
}

#[test]
fn resize_replaces_targets() {
    let mut h = Harness::new(PassConfig::tonemapped(), true);
    let textures = h.backend.texture_count();

    h.renderer.allocate_resources(&mut h.backend, 128, 96).unwrap();
    assert_eq!(h.backend.texture_count(), textures);
    let targets = h.renderer.targets().unwrap();
    assert_eq!((targets.width, targets.height), (128, 96));

    h.render();
    assert!(h.backend.misuse().is_empty(), "{:?}", h.backend.misuse());
}

#[test]
fn reconfiguring_keeps_the_scene() {
    let mut h = Harness::new(PassConfig::deferred(), true);
    let buffers = *h.renderer.scene().buffers().unwrap();

    let scene = h.renderer.into_scene(&mut h.backend);
    let config = PassConfig {
        shading: ShadingMode::Forward,
        ..PassConfig::tonemapped()
    };
    h.renderer = WorldRenderer::with_scene(&mut h.backend, config, scene).unwrap();
    h.renderer.allocate_resources(&mut h.backend, WIDTH, HEIGHT).unwrap();

    assert_eq!(h.renderer.scene().buffers(), Some(&buffers));
    h.render();
    assert_eq!(h.pass_labels(), vec!["Forward", "Terrain", "Present"]);
}

#[test]
fn destroy_releases_gpu_objects() {
    let h = Harness::new(PassConfig::tonemapped(), true);
    let Harness {
        mut backend,
        renderer,
        _dir,
    } = h;

    renderer.destroy(&mut backend);
    assert_eq!(backend.buffer_count(), 0);
    assert_eq!(backend.texture_count(), 0);
}
