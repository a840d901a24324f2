//! Baking integration tests: glTF fixtures on disk through the loader,
//! the mesh baker and the offline exporter.

mod common;

use std::path::PathBuf;

use glam::{Vec3, Vec4Swizzles};
use rstest::rstest;

use common::{city_fixture, Indices, PrimitiveFixture, SceneFixture};
use deferred_renderer::assets::{load_document, try_load_document, AssetError, LoadedDocument};
use deferred_renderer::bake::{
    bake_document, encode_direction, is_baked, load_meshes, process_instances, process_meshes,
    BakeError, BakedPaths, ProcessedMeshes,
};
use gltf::json as gj;

fn bake_fixture(fixture: &SceneFixture) -> (tempfile::TempDir, ProcessedMeshes) {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture.write(dir.path(), "fixture");
    let doc = load_document(&path).unwrap();
    let meshes = process_meshes(&doc).unwrap();
    (dir, meshes)
}

#[test]
fn quad_without_optional_attributes() {
    let (_dir, baked) = bake_fixture(&SceneFixture::single(PrimitiveFixture::quad()));

    assert_eq!(baked.relems.len(), 1);
    assert_eq!(baked.relems[0].index_count, 6);
    assert_eq!(baked.meshes.len(), 1);
    assert_eq!(baked.meshes[0].relem_count, 1);
    assert_eq!(baked.vertices.len(), 4);

    let zero = encode_direction(Vec3::ZERO);
    for vertex in &baked.vertices {
        assert_eq!(vertex.normal, zero);
        assert_eq!(vertex.tangent, zero);
        assert_eq!(vertex.texcoord, [0.0, 0.0]);
    }
}

#[rstest]
#[case::u16(Indices::U16(vec![0, 1, 2, 0, 2, 3]))]
#[case::u32(Indices::U32(vec![0, 1, 2, 0, 2, 3]))]
fn index_widths_bake_identically(#[case] indices: Indices) {
    let expected = indices.widened();
    let fixture = SceneFixture::single(PrimitiveFixture::quad().with_indices(indices));
    let (_dir, baked) = bake_fixture(&fixture);
    assert_eq!(baked.indices, expected);
}

#[test]
fn non_triangle_primitives_are_skipped() {
    let fixture = SceneFixture {
        meshes: vec![vec![
            PrimitiveFixture::lit_triangle([0.0; 3]),
            PrimitiveFixture::lit_triangle([1.0; 3]).with_mode(1),
            PrimitiveFixture::lit_triangle([2.0; 3]),
        ]],
        nodes: vec![(0, [0.0; 3])],
    };
    let (_dir, baked) = bake_fixture(&fixture);

    assert_eq!(baked.meshes[0].relem_count, 2);
    assert_eq!(baked.relems.len(), 2);
    assert_eq!(baked.origins[1].primitive, 2);
}

#[test]
fn missing_position_is_an_error() {
    // Validation would reject this document, so bypass the loader
    let normals = [[0.0f32, 0.0, 1.0]; 3];
    let mut bin: Vec<u8> = bytemuck::cast_slice(&normals).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice(&[0u32, 1, 2]));
    let json = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "meshes": [{{ "primitives": [{{ "attributes": {{ "NORMAL": 0 }}, "indices": 1 }}] }}],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }},
    {{ "bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR" }}
  ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 12 }}
  ],
  "buffers": [{{ "byteLength": {} }}]
}}"#,
        bin.len()
    );
    let gltf::Gltf { document, .. } = gltf::Gltf::from_slice_without_validation(json.as_bytes()).unwrap();
    let root = document.clone().into_json();
    let doc = LoadedDocument::from_parts(document, root, vec![bin], PathBuf::from("broken.gltf"));

    assert!(matches!(
        process_meshes(&doc),
        Err(BakeError::MissingPosition { mesh: 0, primitive: 0 })
    ));
}

#[test]
fn relem_ranges_fit_unified_buffers() {
    let (_dir, baked) = bake_fixture(&city_fixture());

    let total: u32 = baked.meshes.iter().map(|m| m.relem_count).sum();
    assert_eq!(total as usize, baked.relems.len());
    for (i, relem) in baked.relems.iter().enumerate() {
        assert!(relem.index_range().end <= baked.indices.len());
        assert!(relem.vertex_offset as usize + baked.relem_vertex_count(i) <= baked.vertices.len());
    }
}

#[test]
fn boxes_contain_referenced_vertices() {
    let (_dir, baked) = bake_fixture(&city_fixture());

    for (relem, bbox) in baked.relems.iter().zip(&baked.relem_boxes) {
        for &index in &baked.indices[relem.index_range()] {
            let vertex = baked.vertices[(relem.vertex_offset + index) as usize];
            assert!(bbox.contains(vertex.position()));
        }
    }
}

#[test]
fn normals_survive_quantization() {
    let (_dir, baked) = bake_fixture(&SceneFixture::single(PrimitiveFixture::lit_triangle([0.0; 3])));
    for vertex in &baked.vertices {
        assert!((vertex.normal() - Vec3::Z).abs().max_element() <= 1.0 / 127.0);
    }
}

#[test]
fn nodes_become_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = city_fixture().write(dir.path(), "city");
    let doc = load_document(&path).unwrap();
    let instances = process_instances(&doc);

    assert_eq!(instances.meshes, vec![0, 0, 1, 0]);
    assert_eq!(instances.matrices[1].w_axis.xyz(), Vec3::new(3.0, 0.0, 0.0));
    assert_eq!(instances.counts_per_mesh(2), vec![3, 1]);
}

#[test]
fn baked_asset_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = city_fixture().write(dir.path(), "city");
    let doc = load_document(&path).unwrap();
    let source = process_meshes(&doc).unwrap();

    let paths = bake_document(&doc, dir.path()).unwrap();
    assert_eq!(paths.gltf, dir.path().join("city_baked.gltf"));
    assert!(paths.bin.exists());

    let baked_doc = load_document(&paths.gltf).unwrap();
    assert!(is_baked(&baked_doc));

    // Both the decoding path and the copy-through path give back the same data
    for rebaked in [process_meshes(&baked_doc).unwrap(), load_meshes(&baked_doc).unwrap()] {
        assert_eq!(rebaked.indices, source.indices);
        assert_eq!(rebaked.relems, source.relems);
        assert_eq!(rebaked.meshes, source.meshes);
        for (a, b) in rebaked.vertices.iter().zip(&source.vertices) {
            assert!((a.position() - b.position()).length() < 1e-6);
            assert_eq!(a.normal, b.normal);
            assert_eq!(a.texcoord, b.texcoord);
        }
    }
}

#[test]
fn obj_paths_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.obj");
    std::fs::write(&path, b"v 0 0 0").unwrap();

    assert!(matches!(load_document(&path), Err(AssetError::UnknownExtension(_))));
    assert!(try_load_document(&path).is_none());
}

#[test]
fn unsupported_index_width_is_an_error() {
    let fixture = SceneFixture::single(PrimitiveFixture::quad().with_indices(Indices::U8(vec![0, 1, 2, 0, 2, 3])));
    let dir = tempfile::tempdir().unwrap();
    let doc = load_document(fixture.write(dir.path(), "u8")).unwrap();

    assert!(matches!(
        process_meshes(&doc),
        Err(BakeError::UnsupportedIndexType { mesh: 0, primitive: 0, .. })
    ));
}

#[test]
fn interleaved_attributes_bake_like_planar_ones() {
    let planar = PrimitiveFixture::lit_triangle([0.5, 0.0, -1.0]).with_tangents();
    let (_planar_dir, expected) = bake_fixture(&SceneFixture::single(planar.clone()));
    let (_dir, baked) = bake_fixture(&SceneFixture::single(planar.interleaved()));

    assert_eq!(baked.vertices, expected.vertices);
    assert_eq!(baked.indices, expected.indices);
    for vertex in &baked.vertices {
        assert!((vertex.tangent() - Vec3::X).abs().max_element() <= 1.0 / 127.0);
        assert!((vertex.normal() - Vec3::Z).abs().max_element() <= 1.0 / 127.0);
    }
    assert_eq!(baked.vertices[1].texcoord, [1.0, 0.0]);
}

#[test]
fn tangents_survive_baking() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = SceneFixture::single(PrimitiveFixture::lit_triangle([0.0; 3]).with_tangents().interleaved());
    let doc = load_document(fixture.write(dir.path(), "tangent")).unwrap();
    let source = process_meshes(&doc).unwrap();

    let paths = bake_document(&doc, dir.path()).unwrap();
    let baked_doc = load_document(&paths.gltf).unwrap();
    let primitive = baked_doc.document().meshes().next().unwrap().primitives().next().unwrap();
    let tangent = primitive.get(&gltf::Semantic::Tangents).unwrap();
    assert_eq!(tangent.offset(), 24);
    assert_eq!(tangent.data_type(), gltf::accessor::DataType::I8);
    assert_eq!(tangent.dimensions(), gltf::accessor::Dimensions::Vec4);
    assert!(tangent.normalized());

    for rebaked in [process_meshes(&baked_doc).unwrap(), load_meshes(&baked_doc).unwrap()] {
        assert!(rebaked.origins[0].has_tangent);
        for (a, b) in rebaked.vertices.iter().zip(&source.vertices) {
            assert_eq!(a.tangent, b.tangent);
            assert_eq!(a.normal, b.normal);
        }
    }
}

#[test]
fn images_in_buffer_views_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = city_fixture().write(dir.path(), "textured");
    // Image 0 lives in a buffer view like a GLB texture, image 1 is external
    let textured = r#""images": [
    { "bufferView": 0, "mimeType": "image/png" },
    { "uri": "albedo.png" }
  ],
  "textures": [{ "source": 0 }, { "source": 1 }],
  "materials": [{
    "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } },
    "normalTexture": { "index": 1 }
  }],
  "asset""#;
    let json = std::fs::read_to_string(&path).unwrap().replacen("\"asset\"", textured, 1);
    std::fs::write(&path, json).unwrap();

    let doc = load_document(&path).unwrap();
    let paths = bake_document(&doc, dir.path()).unwrap();
    let baked = load_document(&paths.gltf).unwrap();
    let root = baked.json();

    assert_eq!(root.images.len(), 1);
    assert_eq!(root.images[0].uri.as_deref(), Some("albedo.png"));
    assert_eq!(root.textures.len(), 1);
    assert_eq!(root.textures[0].source.value(), 0);
    let material = &root.materials[0];
    assert!(material.pbr_metallic_roughness.base_color_texture.is_none());
    assert_eq!(material.normal_texture.as_ref().unwrap().index.value(), 0);
    assert_eq!(load_meshes(&baked).unwrap().relems.len(), 3);
}

/// Bake the city fixture, let `edit` corrupt the baked JSON, and reload it
/// without validation the way a hand-edited file would arrive
fn tampered_bake(edit: impl FnOnce(&mut gj::Root)) -> Result<ProcessedMeshes, BakeError> {
    let dir = tempfile::tempdir().unwrap();
    let doc = load_document(city_fixture().write(dir.path(), "city")).unwrap();
    let paths: BakedPaths = bake_document(&doc, dir.path()).unwrap();

    let bytes = std::fs::read(&paths.gltf).unwrap();
    let mut root = gltf::Gltf::from_slice_without_validation(&bytes).unwrap().document.into_json();
    edit(&mut root);
    let document = gltf::Document::from_json_without_validation(root.clone());
    let bin = std::fs::read(&paths.bin).unwrap();
    let tampered = LoadedDocument::from_parts(document, root, vec![bin], paths.gltf.clone());
    assert!(is_baked(&tampered));
    load_meshes(&tampered)
}

fn first_primitive_indices(root: &gj::Root) -> usize {
    root.meshes[0].primitives[0].indices.unwrap().value()
}

#[test]
fn baked_index_count_overflow_is_an_error() {
    let result = tampered_bake(|root| {
        let accessor = first_primitive_indices(root);
        root.accessors[accessor].byte_offset = Some(gj::validation::USize64(16));
        root.accessors[accessor].count = gj::validation::USize64(u32::MAX as u64);
    });
    assert!(matches!(result, Err(BakeError::AccessorOutOfRange { .. })));
}

#[test]
fn baked_indices_must_be_u32() {
    let result = tampered_bake(|root| {
        let accessor = first_primitive_indices(root);
        root.accessors[accessor].component_type =
            gj::validation::Checked::Valid(gj::accessor::GenericComponentType(gj::accessor::ComponentType::U16));
    });
    assert!(matches!(result, Err(BakeError::UnsupportedIndexType { mesh: 0, primitive: 0, .. })));
}

#[test]
fn baked_vertex_range_is_checked() {
    let result = tampered_bake(|root| {
        let position = root.meshes[0].primitives[0]
            .attributes
            .get(&gj::validation::Checked::Valid(gj::mesh::Semantic::Positions))
            .unwrap()
            .value();
        // Past every vertex of the baked block
        root.accessors[position].byte_offset = Some(gj::validation::USize64(32 * 1000));
    });
    assert!(matches!(result, Err(BakeError::IndexOutOfRange { mesh: 0, primitive: 0, .. })));
}

#[test]
fn baked_non_triangle_primitives_are_skipped() {
    let meshes = tampered_bake(|root| {
        root.meshes[0].primitives[0].mode = gj::validation::Checked::Valid(gj::mesh::Mode::Lines);
    })
    .unwrap();
    assert_eq!(meshes.relems.len(), 2);
    assert_eq!(meshes.meshes[0].relem_count, 0);
}
