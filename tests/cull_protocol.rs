//! The cull-and-draw protocol as recorded by the backend: barrier
//! choreography, clearing, dispatch size and the CPU reference cull.

mod common;

use glam::{Mat4, Vec3};

use common::{city_fixture, scene_manager};
use deferred_renderer::backend::{AccessFlags, Command, DummyBackend, GraphicsBackend, PipelineStages};
use deferred_renderer::culling::{cull_on_cpu, CullDispatcher, CullInputs, CullingPushConstants};
use deferred_renderer::scene::{DrawIndexedIndirect, SceneManager};

fn loaded_city(backend: &mut DummyBackend) -> (tempfile::TempDir, SceneManager) {
    let mut scene = scene_manager(backend);
    let dir = tempfile::tempdir().unwrap();
    let path = city_fixture().write(dir.path(), "city");
    scene.select_scene(backend, &path).unwrap();
    (dir, scene)
}

fn looking_at_origin() -> Mat4 {
    let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
    proj * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 20.0), Vec3::ZERO, Vec3::Y)
}

fn looking_away() -> Mat4 {
    let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
    proj * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 20.0), Vec3::new(0.0, 0.0, 40.0), Vec3::Y)
}

#[test]
fn cull_records_barrier_chain() {
    let mut backend = DummyBackend::new(64, 64);
    let (_dir, scene) = loaded_city(&mut backend);
    let mut culling = CullDispatcher::new(&mut backend).unwrap();
    let buffers = *scene.buffers().unwrap();

    backend.begin_frame().unwrap();
    backend.clear_commands();
    culling.record(&mut backend, &scene, looking_at_origin()).unwrap();
    let commands = backend.commands().to_vec();

    let Command::Barriers(barriers_in) = &commands[0] else {
        panic!("cull must start with barriers, got {:?}", commands[0]);
    };
    assert_eq!(barriers_in.len(), 3);
    let draw_in = barriers_in.iter().find(|b| b.buffer == buffers.draw_cmd).unwrap();
    assert_eq!(draw_in.src_stage, PipelineStages::DRAW_INDIRECT);
    assert_eq!(draw_in.src_access, AccessFlags::INDIRECT_COMMAND_READ);
    assert!(draw_in.dst_access.contains(AccessFlags::TRANSFER_WRITE));

    assert_eq!(
        commands[1],
        Command::FillBuffer {
            buffer: buffers.draw_cmd,
            offset: 0,
            size: 3 * std::mem::size_of::<DrawIndexedIndirect>() as u64,
            value: 0,
        }
    );
    assert!(matches!(&commands[2], Command::Barriers(b) if b.len() == 1));
    assert!(matches!(&commands[3], Command::BeginComputePass { .. }));

    let dispatch = commands.iter().find(|c| matches!(c, Command::Dispatch { .. })).unwrap();
    assert_eq!(dispatch, &Command::Dispatch { x: 1, y: 1, z: 1 });

    let Some(Command::Barriers(barriers_out)) = commands.last() else {
        panic!("cull must end with barriers");
    };
    assert_eq!(barriers_out.len(), 3);
    for barrier in barriers_out {
        assert_eq!(barrier.src_stage, PipelineStages::COMPUTE_SHADER);
        assert_eq!(barrier.src_access, AccessFlags::SHADER_WRITE);
    }
    let draw_out = barriers_out.iter().find(|b| b.buffer == buffers.draw_cmd).unwrap();
    assert_eq!(draw_out.dst_stage, PipelineStages::DRAW_INDIRECT);
    assert_eq!(draw_out.dst_access, AccessFlags::INDIRECT_COMMAND_READ);

    assert!(backend.misuse().is_empty(), "{:?}", backend.misuse());
}

#[test]
fn push_constants_carry_counts() {
    let mut backend = DummyBackend::new(64, 64);
    let (_dir, scene) = loaded_city(&mut backend);
    let mut culling = CullDispatcher::new(&mut backend).unwrap();
    let proj_view = looking_at_origin();

    backend.begin_frame().unwrap();
    culling.record(&mut backend, &scene, proj_view).unwrap();

    let data = backend
        .commands()
        .iter()
        .find_map(|c| match c {
            Command::SetPushConstants { data, .. } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    let expected = CullingPushConstants::new(proj_view, 4, 3);
    assert_eq!(data, bytemuck::bytes_of(&expected));
}

#[test]
fn cull_clears_previous_frame_commands() {
    let mut backend = DummyBackend::new(64, 64);
    let (_dir, scene) = loaded_city(&mut backend);
    let mut culling = CullDispatcher::new(&mut backend).unwrap();
    let draw_cmd = scene.buffers().unwrap().draw_cmd;

    // Stale data from a previous frame
    backend.buffer_data_mut(draw_cmd).unwrap().fill(0xAB);

    backend.begin_frame().unwrap();
    culling.record(&mut backend, &scene, looking_at_origin()).unwrap();

    let data = backend.buffer_data(draw_cmd).unwrap();
    let cleared = 3 * std::mem::size_of::<DrawIndexedIndirect>();
    assert!(data[..cleared].iter().all(|&b| b == 0));
}

#[test]
fn no_scene_records_nothing() {
    let mut backend = DummyBackend::new(64, 64);
    let scene = scene_manager(&mut backend);
    let mut culling = CullDispatcher::new(&mut backend).unwrap();

    backend.begin_frame().unwrap();
    backend.clear_commands();
    culling.record(&mut backend, &scene, looking_at_origin()).unwrap();
    assert!(backend.commands().is_empty());
}

#[test]
fn everything_visible_gives_one_draw_per_relem() {
    let mut backend = DummyBackend::new(64, 64);
    let (_dir, scene) = loaded_city(&mut backend);

    let out = cull_on_cpu(&CullInputs::from_scene(&scene), looking_at_origin());
    assert_eq!(out.visible_draws(), scene.relem_count() as usize);
    assert_eq!(out.draw_cmds.len(), scene.relem_count() as usize);

    // The quad relem is drawn once per instance, through its matrix run
    assert_eq!(out.draw_cmds[0].instance_count, 3);
    assert_eq!(out.draw_cmds[0].first_instance, 0);
    assert_eq!(out.draw_cmds[1].first_instance, 3);
    assert_eq!(out.draw_matrices.len(), 5);
}

#[test]
fn nothing_visible_gives_degenerate_draws() {
    let mut backend = DummyBackend::new(64, 64);
    let (_dir, scene) = loaded_city(&mut backend);

    let out = cull_on_cpu(&CullInputs::from_scene(&scene), looking_away());
    assert_eq!(out.visible_draws(), 0);
    assert_eq!(out.draw_cmds.len(), scene.relem_count() as usize);
    for cmd in &out.draw_cmds {
        assert_eq!(cmd.index_count, 0);
        assert_eq!(cmd.instance_count, 0);
    }
}
