//! Interactive scene viewer
//!
//! Controls:
//! - WASD/QE move, Shift sprints, right mouse button looks around, scroll changes speed
//! - Tab switches between free-fly and orbit cameras
//! - 1 deferred shading, 2 forward shading
//! - T toggles terrain, H toggles tonemapping
//! - Dropping a .gltf/.glb file onto the window loads it
//! - Escape quits

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use glam::Vec2;
use winit::{
    dpi::PhysicalSize,
    event::{DeviceEvent, ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowBuilder},
};

use deferred_renderer::backend::{BackendResult, GraphicsBackend, WgpuBackend};
use deferred_renderer::scene::{Camera, CameraInput, FramePacket, ViewerCameraController};
use deferred_renderer::{PassConfig, RendererConfig, ShadingMode, TerrainConfig, WorldRenderer};

#[derive(Parser, Debug)]
#[command(name = "viewer")]
#[command(about = "GPU-driven deferred renderer for glTF scenes")]
struct Cli {
    /// glTF or GLB scene to load at startup
    scene: Option<PathBuf>,

    /// Start with forward shading instead of deferred
    #[arg(long)]
    forward: bool,

    /// Start without terrain
    #[arg(long)]
    no_terrain: bool,

    /// Start without tonemapping
    #[arg(long)]
    no_tonemapping: bool,

    /// Grayscale image used as the terrain heightmap
    #[arg(long)]
    heightmap: Option<PathBuf>,

    /// Seed of the generated heightmap
    #[arg(long)]
    seed: Option<u32>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,
}

impl Cli {
    fn into_config(self) -> RendererConfig {
        let defaults = RendererConfig::default();
        let terrain_defaults = TerrainConfig::default();
        RendererConfig {
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            passes: PassConfig {
                shading: if self.forward {
                    ShadingMode::Forward
                } else {
                    ShadingMode::Deferred
                },
                terrain: !self.no_terrain,
                tonemapping: !self.no_tonemapping,
            },
            scene: self.scene,
            terrain: TerrainConfig {
                heightmap: self.heightmap,
                seed: self.seed.unwrap_or(terrain_defaults.seed),
                ..terrain_defaults
            },
            ..defaults
        }
    }
}

struct Viewer {
    window: Arc<Window>,
    backend: WgpuBackend,
    renderer: Option<WorldRenderer>,
    camera: Camera,
    controller: ViewerCameraController,
    input: CameraInput,
    start: Instant,
    last_frame: Instant,
}

impl Viewer {
    fn new(window: Arc<Window>, config: &RendererConfig) -> BackendResult<Self> {
        let mut backend = WgpuBackend::new(Arc::clone(&window), config.vsync)?;
        let mut renderer = WorldRenderer::new(&mut backend, config.passes, &config.terrain)?;
        if let Some(scene) = &config.scene {
            // Failure is logged and leaves an empty scene
            let _ = renderer.load_scene(&mut backend, scene);
        }

        let camera = Camera::default();
        let mut controller = ViewerCameraController::default();
        controller.sync_with_camera(&camera);

        let now = Instant::now();
        Ok(Self {
            window,
            backend,
            renderer: Some(renderer),
            camera,
            controller,
            input: CameraInput::default(),
            start: now,
            last_frame: now,
        })
    }

    /// Rebuild the passes around the loaded scene
    fn reconfigure(&mut self, change: impl FnOnce(&mut PassConfig)) -> BackendResult<()> {
        let Some(renderer) = self.renderer.take() else {
            return Ok(());
        };
        let mut config = renderer.config();
        change(&mut config);

        self.backend.wait_idle();
        let scene = renderer.into_scene(&mut self.backend);
        self.renderer = Some(WorldRenderer::with_scene(&mut self.backend, config, scene)?);
        Ok(())
    }

    fn handle_key(&mut self, event: &KeyEvent) -> BackendResult<()> {
        let pressed = event.state == ElementState::Pressed;
        let PhysicalKey::Code(code) = event.physical_key else {
            return Ok(());
        };

        match code {
            KeyCode::KeyW => self.input.forward = pressed,
            KeyCode::KeyS => self.input.backward = pressed,
            KeyCode::KeyA => self.input.left = pressed,
            KeyCode::KeyD => self.input.right = pressed,
            KeyCode::KeyE => self.input.up = pressed,
            KeyCode::KeyQ => self.input.down = pressed,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => self.input.sprint = pressed,
            _ if !pressed || event.repeat => {}
            KeyCode::Tab => self.controller.toggle(&self.camera),
            KeyCode::Digit1 => self.reconfigure(|c| c.shading = ShadingMode::Deferred)?,
            KeyCode::Digit2 => self.reconfigure(|c| c.shading = ShadingMode::Forward)?,
            KeyCode::KeyT => self.reconfigure(|c| c.terrain = !c.terrain)?,
            KeyCode::KeyH => self.reconfigure(|c| c.tonemapping = !c.tonemapping)?,
            _ => {}
        }
        Ok(())
    }

    fn frame(&mut self) -> BackendResult<()> {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.controller.update(&mut self.camera, &self.input, dt);
        self.input.reset_deltas();

        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        // Minimised or outdated surface
        let Some(frame) = self.backend.begin_frame()? else {
            return Ok(());
        };

        let size_changed = renderer
            .targets()
            .map_or(true, |t| (t.width, t.height) != (frame.width, frame.height));
        if size_changed {
            renderer.allocate_resources(&mut self.backend, frame.width, frame.height)?;
        }

        renderer.update(&FramePacket {
            main_camera: self.camera.clone(),
            current_time: (now - self.start).as_secs_f32(),
        });
        renderer.render_world(&mut self.backend, frame.swapchain_view)?;
        self.backend.end_frame()
    }

    fn shutdown(&mut self) {
        self.backend.wait_idle();
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy(&mut self.backend);
        }
    }
}

fn run(config: RendererConfig) -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(&event_loop)?,
    );
    let mut viewer = Viewer::new(Arc::clone(&window), &config)?;
    let mut failure = None;

    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        let result = match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    elwt.exit();
                    Ok(())
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                        elwt.exit();
                        Ok(())
                    } else {
                        viewer.handle_key(&event)
                    }
                }
                WindowEvent::MouseInput { state, button: MouseButton::Right, .. } => {
                    viewer.input.mouse_look_active = state == ElementState::Pressed;
                    Ok(())
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    viewer.input.scroll_delta += match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                    };
                    Ok(())
                }
                WindowEvent::Resized(size) => {
                    if size.width > 0 && size.height > 0 {
                        viewer.backend.resize(size.width, size.height);
                    }
                    Ok(())
                }
                WindowEvent::DroppedFile(path) => {
                    if let Some(renderer) = viewer.renderer.as_mut() {
                        viewer.backend.wait_idle();
                        let _ = renderer.load_scene(&mut viewer.backend, &path);
                    }
                    Ok(())
                }
                WindowEvent::RedrawRequested => viewer.frame(),
                _ => Ok(()),
            },
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                if viewer.input.mouse_look_active {
                    viewer.input.mouse_delta += Vec2::new(delta.0 as f32, delta.1 as f32);
                }
                Ok(())
            }
            Event::AboutToWait => {
                viewer.window.request_redraw();
                Ok(())
            }
            Event::LoopExiting => {
                viewer.shutdown();
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            log::error!("Fatal backend error: {}", e);
            failure = Some(e);
            elwt.exit();
        }
    })?;

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Cli::parse().into_config();

    if let Err(e) = run(config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
