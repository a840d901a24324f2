//! Shared fixtures for integration tests.
//!
//! Scenes are written as a `.gltf` document plus an external `.bin` buffer
//! into a temporary directory, so tests go through the same loader path as
//! real assets.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use deferred_renderer::backend::DummyBackend;
use deferred_renderer::scene::SceneManager;
use deferred_renderer::TerrainConfig;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
/// POSITION, NORMAL, TANGENT, TEXCOORD_0 as f32
const INTERLEAVED_STRIDE: usize = 48;

/// Index data with its glTF component width
#[derive(Debug, Clone)]
pub enum Indices {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Indices {
    pub fn widened(&self) -> Vec<u32> {
        match self {
            Indices::U8(v) => v.iter().map(|&i| i as u32).collect(),
            Indices::U16(v) => v.iter().map(|&i| i as u32).collect(),
            Indices::U32(v) => v.clone(),
        }
    }
}

/// One glTF primitive
#[derive(Debug, Clone)]
pub struct PrimitiveFixture {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tangents: Option<Vec<[f32; 4]>>,
    pub texcoords: Option<Vec<[f32; 2]>>,
    pub indices: Indices,
    /// glTF topology, 4 is a triangle list
    pub mode: u32,
    /// Store every attribute in one strided buffer view
    pub interleaved: bool,
}

impl PrimitiveFixture {
    /// Unit quad in the XY plane: 4 vertices, 2 triangles, no optional attributes
    pub fn quad() -> Self {
        Self {
            positions: vec![
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
                [0.5, 0.5, 0.0],
                [-0.5, 0.5, 0.0],
            ],
            normals: None,
            tangents: None,
            texcoords: None,
            indices: Indices::U16(vec![0, 1, 2, 0, 2, 3]),
            mode: 4,
            interleaved: false,
        }
    }

    /// Single triangle with every optional attribute filled in
    pub fn lit_triangle(offset: [f32; 3]) -> Self {
        let [x, y, z] = offset;
        Self {
            positions: vec![[x, y, z], [x + 1.0, y, z], [x, y + 2.0, z - 1.0]],
            normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
            tangents: None,
            texcoords: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            indices: Indices::U32(vec![0, 1, 2]),
            mode: 4,
            interleaved: false,
        }
    }

    /// Add a +X tangent to every vertex
    pub fn with_tangents(mut self) -> Self {
        self.tangents = Some(vec![[1.0, 0.0, 0.0, 1.0]; self.positions.len()]);
        self
    }

    /// Interleave POSITION, NORMAL, TANGENT and TEXCOORD_0 in one view.
    /// Requires all four attributes.
    pub fn interleaved(mut self) -> Self {
        self.interleaved = true;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_indices(mut self, indices: Indices) -> Self {
        self.indices = indices;
        self
    }
}

/// A scene: meshes made of primitives, and nodes placing meshes
#[derive(Debug, Clone, Default)]
pub struct SceneFixture {
    pub meshes: Vec<Vec<PrimitiveFixture>>,
    /// (mesh index, translation)
    pub nodes: Vec<(usize, [f32; 3])>,
}

impl SceneFixture {
    /// One mesh with one primitive, instanced once at the origin
    pub fn single(primitive: PrimitiveFixture) -> Self {
        Self {
            meshes: vec![vec![primitive]],
            nodes: vec![(0, [0.0; 3])],
        }
    }

    /// Write `<name>.gltf` and `<name>.bin` into `dir`
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let mut bin = Vec::<u8>::new();
        let mut views = Vec::new();
        let mut accessors = Vec::new();
        let mut meshes_json = Vec::new();

        let mut push_view = |bin: &mut Vec<u8>, bytes: &[u8], target: u32, stride: Option<usize>| -> usize {
            while bin.len() % 4 != 0 {
                bin.push(0);
            }
            let stride = stride.map_or(String::new(), |s| format!(r#","byteStride":{s}"#));
            views.push(format!(
                r#"{{"buffer":0,"byteOffset":{},"byteLength":{},"target":{}{}}}"#,
                bin.len(),
                bytes.len(),
                target,
                stride
            ));
            bin.extend_from_slice(bytes);
            views.len() - 1
        };

        for mesh in &self.meshes {
            let mut primitives = Vec::new();
            for primitive in mesh {
                let mut attributes = Vec::new();
                let (min, max) = bounds(&primitive.positions);
                let bounds_json = format!(r#","min":{:?},"max":{:?}"#, min, max);

                if primitive.interleaved {
                    let (Some(normals), Some(tangents), Some(texcoords)) =
                        (&primitive.normals, &primitive.tangents, &primitive.texcoords)
                    else {
                        panic!("interleaved fixtures need normals, tangents and texcoords");
                    };
                    let mut bytes = Vec::new();
                    for i in 0..primitive.positions.len() {
                        bytes.extend_from_slice(bytemuck::bytes_of(&primitive.positions[i]));
                        bytes.extend_from_slice(bytemuck::bytes_of(&normals[i]));
                        bytes.extend_from_slice(bytemuck::bytes_of(&tangents[i]));
                        bytes.extend_from_slice(bytemuck::bytes_of(&texcoords[i]));
                    }
                    let view = push_view(&mut bin, &bytes, ARRAY_BUFFER, Some(INTERLEAVED_STRIDE));
                    let layout = [
                        ("POSITION", 0, "VEC3", bounds_json.as_str()),
                        ("NORMAL", 12, "VEC3", ""),
                        ("TANGENT", 24, "VEC4", ""),
                        ("TEXCOORD_0", 40, "VEC2", ""),
                    ];
                    for (name, offset, type_, extra) in layout {
                        accessors.push(format!(
                            r#"{{"bufferView":{},"byteOffset":{},"componentType":5126,"count":{},"type":"{}"{}}}"#,
                            view,
                            offset,
                            primitive.positions.len(),
                            type_,
                            extra
                        ));
                        attributes.push(format!(r#""{}":{}"#, name, accessors.len() - 1));
                    }
                } else {
                    let view = push_view(&mut bin, bytemuck::cast_slice(&primitive.positions), ARRAY_BUFFER, None);
                    accessors.push(format!(
                        r#"{{"bufferView":{},"componentType":5126,"count":{},"type":"VEC3"{}}}"#,
                        view,
                        primitive.positions.len(),
                        bounds_json
                    ));
                    attributes.push(format!(r#""POSITION":{}"#, accessors.len() - 1));

                    let optional: [(&str, &str, Option<&[u8]>, usize); 3] = [
                        ("NORMAL", "VEC3", primitive.normals.as_deref().map(bytemuck::cast_slice), primitive.normals.as_ref().map_or(0, Vec::len)),
                        ("TANGENT", "VEC4", primitive.tangents.as_deref().map(bytemuck::cast_slice), primitive.tangents.as_ref().map_or(0, Vec::len)),
                        ("TEXCOORD_0", "VEC2", primitive.texcoords.as_deref().map(bytemuck::cast_slice), primitive.texcoords.as_ref().map_or(0, Vec::len)),
                    ];
                    for (name, type_, bytes, count) in optional {
                        let Some(bytes) = bytes else { continue };
                        let view = push_view(&mut bin, bytes, ARRAY_BUFFER, None);
                        accessors.push(format!(
                            r#"{{"bufferView":{},"componentType":5126,"count":{},"type":"{}"}}"#,
                            view, count, type_
                        ));
                        attributes.push(format!(r#""{}":{}"#, name, accessors.len() - 1));
                    }
                }

                let (bytes, component, count) = match &primitive.indices {
                    Indices::U8(v) => (v.clone(), 5121, v.len()),
                    Indices::U16(v) => (bytemuck::cast_slice::<u16, u8>(v).to_vec(), 5123, v.len()),
                    Indices::U32(v) => (bytemuck::cast_slice::<u32, u8>(v).to_vec(), 5125, v.len()),
                };
                let view = push_view(&mut bin, &bytes, ELEMENT_ARRAY_BUFFER, None);
                accessors.push(format!(
                    r#"{{"bufferView":{},"componentType":{},"count":{},"type":"SCALAR"}}"#,
                    view, component, count
                ));

                primitives.push(format!(
                    r#"{{"attributes":{{{}}},"indices":{},"mode":{}}}"#,
                    attributes.join(","),
                    accessors.len() - 1,
                    primitive.mode
                ));
            }
            meshes_json.push(format!(r#"{{"primitives":[{}]}}"#, primitives.join(",")));
        }

        let mut nodes = String::new();
        for (i, (mesh, t)) in self.nodes.iter().enumerate() {
            if i > 0 {
                nodes.push(',');
            }
            let _ = write!(nodes, r#"{{"mesh":{},"translation":{:?}}}"#, mesh, t);
        }
        let roots: Vec<String> = (0..self.nodes.len()).map(|i| i.to_string()).collect();

        let bin_name = format!("{name}.bin");
        let json = format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [{}] }}],
  "nodes": [{}],
  "meshes": [{}],
  "accessors": [{}],
  "bufferViews": [{}],
  "buffers": [{{ "uri": "{}", "byteLength": {} }}]
}}"#,
            roots.join(","),
            nodes,
            meshes_json.join(","),
            accessors.join(","),
            views.join(","),
            bin_name,
            bin.len()
        );

        std::fs::write(dir.join(&bin_name), &bin).unwrap();
        let path = dir.join(format!("{name}.gltf"));
        std::fs::write(&path, json).unwrap();
        path
    }
}

fn bounds(positions: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in positions {
        for c in 0..3 {
            min[c] = min[c].min(p[c]);
            max[c] = max[c].max(p[c]);
        }
    }
    (min, max)
}

/// Two meshes: a quad instanced three times and a two-primitive mesh once
pub fn city_fixture() -> SceneFixture {
    SceneFixture {
        meshes: vec![
            vec![PrimitiveFixture::quad()],
            vec![
                PrimitiveFixture::lit_triangle([0.0; 3]),
                PrimitiveFixture::lit_triangle([2.0, 0.0, 0.0]),
            ],
        ],
        nodes: vec![
            (0, [0.0, 0.0, 0.0]),
            (0, [3.0, 0.0, 0.0]),
            (1, [-3.0, 0.0, 0.0]),
            (0, [0.0, 3.0, 0.0]),
        ],
    }
}

/// Small procedural terrain so tests stay fast
pub fn small_terrain() -> TerrainConfig {
    TerrainConfig {
        heightmap: None,
        resolution: 16,
        seed: 7,
    }
}

pub fn scene_manager(backend: &mut DummyBackend) -> SceneManager {
    SceneManager::new(backend, &small_terrain()).unwrap()
}
