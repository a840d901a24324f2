//! Scene upload against the recording backend.

mod common;

use common::{city_fixture, scene_manager, PrimitiveFixture, SceneFixture};
use deferred_renderer::backend::{BufferUsage, DummyBackend};
use deferred_renderer::scene::{DrawIndexedIndirect, SceneError};

#[test]
fn new_manager_has_no_scene() {
    let mut backend = DummyBackend::new(64, 64);
    let scene = scene_manager(&mut backend);

    assert!(scene.buffers().is_none());
    assert_eq!(scene.relem_count(), 0);
    assert_eq!(scene.instance_count(), 0);
    // Only the heightmap exists
    assert_eq!(backend.buffer_count(), 0);
    assert_eq!(backend.texture_count(), 1);
}

#[test]
fn upload_sizes_unified_buffers() {
    let mut backend = DummyBackend::new(64, 64);
    let mut scene = scene_manager(&mut backend);
    let dir = tempfile::tempdir().unwrap();
    let path = city_fixture().write(dir.path(), "city");

    scene.select_scene(&mut backend, &path).unwrap();
    let buffers = *scene.buffers().unwrap();

    assert_eq!(scene.relem_count(), 3);
    assert_eq!(scene.instance_count(), 4);
    assert_eq!(scene.relem_instance_counts(), &[3, 1, 1]);
    assert_eq!(scene.matrices_offsets(), &[0, 3, 4]);

    let draw_cmd = backend.buffer_descriptor(buffers.draw_cmd).unwrap();
    assert!(draw_cmd.usage.contains(BufferUsage::INDIRECT));
    assert!(draw_cmd.size >= 3 * std::mem::size_of::<DrawIndexedIndirect>() as u64);

    let offsets: &[u32] = bytemuck::cast_slice(&backend.buffer_data(buffers.matrices_offsets_ind).unwrap()[..12]);
    assert_eq!(offsets, &[0, 3, 4]);

    let vertex = backend.buffer_descriptor(buffers.vertex).unwrap();
    assert!(vertex.usage.contains(BufferUsage::VERTEX));
    assert!(vertex.size >= scene.vertex_count() as u64 * 32);
}

#[test]
fn failed_load_keeps_previous_scene() {
    let mut backend = DummyBackend::new(64, 64);
    let mut scene = scene_manager(&mut backend);
    let dir = tempfile::tempdir().unwrap();
    let path = SceneFixture::single(PrimitiveFixture::quad()).write(dir.path(), "quad");

    scene.select_scene(&mut backend, &path).unwrap();
    let before = *scene.buffers().unwrap();
    let buffer_count = backend.buffer_count();

    let err = scene
        .select_scene(&mut backend, dir.path().join("model.obj"))
        .unwrap_err();
    assert!(matches!(err, SceneError::Asset(_)));
    assert_eq!(scene.buffers(), Some(&before));
    assert_eq!(scene.relem_count(), 1);
    assert_eq!(backend.buffer_count(), buffer_count);
}

#[test]
fn reload_replaces_every_buffer() {
    let mut backend = DummyBackend::new(64, 64);
    let mut scene = scene_manager(&mut backend);
    let dir = tempfile::tempdir().unwrap();
    let quad = SceneFixture::single(PrimitiveFixture::quad()).write(dir.path(), "quad");
    let city = city_fixture().write(dir.path(), "city");

    scene.select_scene(&mut backend, &quad).unwrap();
    let first = *scene.buffers().unwrap();
    scene.select_scene(&mut backend, &city).unwrap();

    assert_eq!(backend.buffer_count(), 10);
    assert!(backend.buffer_data(first.vertex).is_none());
    assert_eq!(scene.relem_count(), 3);

    scene.destroy(&mut backend);
    assert_eq!(backend.buffer_count(), 0);
    assert_eq!(backend.texture_count(), 0);
}
