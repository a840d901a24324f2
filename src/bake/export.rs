//! Writing baked geometry back out as a glTF document.
//!
//! The baked document keeps the source's nodes, scenes and materials but
//! replaces every buffer, buffer view and accessor with two views over one
//! binary: 32-bit indices followed by packed [`Vertex`] records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gltf::json as gj;

use crate::assets::{LoadedDocument, KHR_MESH_QUANTIZATION};

use super::error::{BakeError, BakeResult};
use super::meshes::{process_meshes, ProcessedMeshes, BAKED_INDEX_VIEW, BAKED_VERTEX_VIEW};
use super::vertex::Vertex;

const INDEX_VIEW: u32 = 0;
const VERTEX_VIEW: u32 = 1;

/// Output locations for a baked document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakedPaths {
    pub gltf: PathBuf,
    pub bin: PathBuf,
}

impl BakedPaths {
    /// `<stem>_baked.gltf` and `<stem>_baked.bin` inside `out_dir`
    pub fn for_source(source: &Path, out_dir: &Path) -> Self {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_owned());
        Self {
            gltf: out_dir.join(format!("{stem}_baked.gltf")),
            bin: out_dir.join(format!("{stem}_baked.bin")),
        }
    }
}

fn align16(n: usize) -> usize {
    (n + 15) / 16 * 16
}

fn json_vec3(v: glam::Vec3) -> gj::Value {
    gj::Value::Array(v.to_array().iter().map(|&c| gj::Value::from(c as f64)).collect())
}

/// A baked document in memory: the rewritten JSON and its single binary
pub struct BakedAsset {
    pub root: gj::Root,
    pub bin: Vec<u8>,
}

impl BakedAsset {
    /// Rewrite `source` so its meshes reference the baked buffers.
    ///
    /// `bin_uri` is the file name the JSON buffer points at.
    pub fn build(source: &gj::Root, meshes: &ProcessedMeshes, bin_uri: &str) -> BakeResult<Self> {
        let index_bytes: &[u8] = bytemuck::cast_slice(&meshes.indices);
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&meshes.vertices);
        let vertex_offset = align16(index_bytes.len());

        let mut bin = vec![0u8; vertex_offset + vertex_bytes.len()];
        bin[..index_bytes.len()].copy_from_slice(index_bytes);
        bin[vertex_offset..].copy_from_slice(vertex_bytes);

        let mut root = source.clone();
        drop_buffer_view_images(&mut root);
        let buffer_name = Path::new(bin_uri)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());

        root.buffers = vec![gj::Buffer {
            byte_length: gj::validation::USize64(bin.len() as u64),
            name: buffer_name,
            uri: Some(bin_uri.to_owned()),
            extensions: None,
            extras: gj::Extras::default(),
        }];
        root.buffer_views = vec![
            buffer_view(
                BAKED_INDEX_VIEW,
                0,
                index_bytes.len(),
                None,
                gj::buffer::Target::ElementArrayBuffer,
            ),
            buffer_view(
                BAKED_VERTEX_VIEW,
                vertex_offset,
                vertex_bytes.len(),
                Some(std::mem::size_of::<Vertex>()),
                gj::buffer::Target::ArrayBuffer,
            ),
        ];
        root.accessors.clear();

        if !root.animations.is_empty() || !root.skins.is_empty() {
            log::warn!("animations and skins reference replaced accessors, dropping them");
            root.animations.clear();
            root.skins.clear();
            for node in &mut root.nodes {
                node.skin = None;
            }
        }

        let mut primitives: Vec<Vec<gj::mesh::Primitive>> = vec![Vec::new(); root.meshes.len()];
        for (relem_index, (relem, origin)) in meshes.relems.iter().zip(&meshes.origins).enumerate() {
            let Some(src) = source
                .meshes
                .get(origin.mesh)
                .and_then(|m| m.primitives.get(origin.primitive))
            else {
                return Err(BakeError::Export(format!(
                    "relem {relem_index} refers to missing mesh {} primitive {}",
                    origin.mesh, origin.primitive
                )));
            };

            let count = meshes.relem_vertex_count(relem_index).max(1) as u64;
            let bbox = &meshes.relem_boxes[relem_index];
            let base = relem.vertex_offset as u64 * std::mem::size_of::<Vertex>() as u64;

            let indices = push_accessor(
                &mut root,
                "baked_indicies_accessor",
                INDEX_VIEW,
                relem.index_offset as u64 * 4,
                relem.index_count as u64,
                gj::accessor::ComponentType::U32,
                gj::accessor::Type::Scalar,
                false,
                None,
            );

            let mut attributes = BTreeMap::new();
            let position = push_accessor(
                &mut root,
                "baked_position_accessor",
                VERTEX_VIEW,
                base,
                count,
                gj::accessor::ComponentType::F32,
                gj::accessor::Type::Vec3,
                false,
                Some((json_vec3(bbox.min()), json_vec3(bbox.max()))),
            );
            attributes.insert(
                gj::validation::Checked::Valid(gj::mesh::Semantic::Positions),
                position,
            );

            let optional = [
                (
                    origin.has_normal,
                    "baked_normal_accessor",
                    Vertex::NORMAL_OFFSET,
                    gj::accessor::ComponentType::I8,
                    gj::accessor::Type::Vec3,
                    true,
                    gj::mesh::Semantic::Normals,
                ),
                (
                    origin.has_texcoord,
                    "baked_texCoord_accessor",
                    Vertex::TEXCOORD_OFFSET,
                    gj::accessor::ComponentType::F32,
                    gj::accessor::Type::Vec2,
                    false,
                    gj::mesh::Semantic::TexCoords(0),
                ),
                (
                    origin.has_tangent,
                    "baked_tangent_accessor",
                    Vertex::TANGENT_OFFSET,
                    gj::accessor::ComponentType::I8,
                    gj::accessor::Type::Vec4,
                    true,
                    gj::mesh::Semantic::Tangents,
                ),
            ];
            for (present, name, offset, component, type_, normalized, semantic) in optional {
                if !present {
                    continue;
                }
                let accessor = push_accessor(
                    &mut root,
                    name,
                    VERTEX_VIEW,
                    base + offset,
                    count,
                    component,
                    type_,
                    normalized,
                    None,
                );
                attributes.insert(gj::validation::Checked::Valid(semantic), accessor);
            }

            primitives[origin.mesh].push(gj::mesh::Primitive {
                attributes,
                indices: Some(indices),
                targets: None,
                ..src.clone()
            });
        }

        for (mesh, baked) in root.meshes.iter_mut().zip(primitives) {
            mesh.primitives = baked;
            mesh.weights = None;
        }

        for list in [&mut root.extensions_used, &mut root.extensions_required] {
            if !list.iter().any(|e| e == KHR_MESH_QUANTIZATION) {
                list.push(KHR_MESH_QUANTIZATION.to_owned());
            }
        }

        Ok(Self { root, bin })
    }

    /// Write the JSON and binary to `paths`.
    pub fn write(&self, paths: &BakedPaths) -> BakeResult<()> {
        let json = self
            .root
            .to_string_pretty()
            .map_err(|e| BakeError::Export(format!("JSON serialization failed: {e}")))?;

        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| BakeError::Io { path, source }
        };
        std::fs::write(&paths.gltf, json).map_err(io(&paths.gltf))?;
        std::fs::write(&paths.bin, &self.bin).map_err(io(&paths.bin))?;
        Ok(())
    }
}

/// New positions of the kept entries of a table, `None` for dropped ones
fn compacted_indices(keep: &[bool]) -> Vec<Option<u32>> {
    let mut next = 0;
    keep.iter()
        .map(|&k| {
            k.then(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}

fn retarget_texture<T>(
    slot: &mut Option<T>,
    index: impl Fn(&mut T) -> &mut gj::Index<gj::Texture>,
    textures: &[Option<u32>],
) {
    let target = match slot.as_mut() {
        Some(info) => textures.get(index(info).value()).copied().flatten(),
        None => return,
    };
    match (target, slot.as_mut()) {
        (Some(new), Some(info)) => *index(info) = gj::Index::new(new),
        _ => *slot = None,
    }
}

/// Drop images stored in buffer views, the textures sampling them and the
/// material slots using those textures. The baked binary only holds geometry.
fn drop_buffer_view_images(root: &mut gj::Root) {
    let keep_images: Vec<bool> = root.images.iter().map(|image| image.buffer_view.is_none()).collect();
    if keep_images.iter().all(|&keep| keep) {
        return;
    }
    log::warn!(
        "dropping {} image(s) embedded in buffer views, baked output carries geometry only",
        keep_images.iter().filter(|&&keep| !keep).count()
    );

    let images = compacted_indices(&keep_images);
    root.images = std::mem::take(&mut root.images)
        .into_iter()
        .zip(&keep_images)
        .filter_map(|(image, &keep)| keep.then_some(image))
        .collect();

    let keep_textures: Vec<bool> = root
        .textures
        .iter()
        .map(|texture| images.get(texture.source.value()).copied().flatten().is_some())
        .collect();
    let textures = compacted_indices(&keep_textures);
    root.textures = std::mem::take(&mut root.textures)
        .into_iter()
        .filter_map(|mut texture| {
            let source = images.get(texture.source.value()).copied().flatten()?;
            texture.source = gj::Index::new(source);
            Some(texture)
        })
        .collect();

    for material in &mut root.materials {
        let pbr = &mut material.pbr_metallic_roughness;
        retarget_texture(&mut pbr.base_color_texture, |info| &mut info.index, &textures);
        retarget_texture(&mut pbr.metallic_roughness_texture, |info| &mut info.index, &textures);
        retarget_texture(&mut material.normal_texture, |info| &mut info.index, &textures);
        retarget_texture(&mut material.occlusion_texture, |info| &mut info.index, &textures);
        retarget_texture(&mut material.emissive_texture, |info| &mut info.index, &textures);
    }
}

fn buffer_view(
    name: &str,
    offset: usize,
    length: usize,
    stride: Option<usize>,
    target: gj::buffer::Target,
) -> gj::buffer::View {
    gj::buffer::View {
        buffer: gj::Index::new(0),
        byte_offset: Some(gj::validation::USize64(offset as u64)),
        byte_length: gj::validation::USize64(length as u64),
        byte_stride: stride.map(gj::buffer::Stride),
        target: Some(gj::validation::Checked::Valid(target)),
        name: Some(name.to_owned()),
        extensions: None,
        extras: gj::Extras::default(),
    }
}

#[allow(clippy::too_many_arguments)]
fn push_accessor(
    root: &mut gj::Root,
    name: &str,
    buffer_view: u32,
    byte_offset: u64,
    count: u64,
    component_type: gj::accessor::ComponentType,
    type_: gj::accessor::Type,
    normalized: bool,
    bounds: Option<(gj::Value, gj::Value)>,
) -> gj::Index<gj::Accessor> {
    let index = gj::Index::new(root.accessors.len() as u32);
    let (min, max) = bounds.unzip();
    root.accessors.push(gj::Accessor {
        buffer_view: Some(gj::Index::new(buffer_view)),
        byte_offset: Some(gj::validation::USize64(byte_offset)),
        count: gj::validation::USize64(count),
        component_type: gj::validation::Checked::Valid(gj::accessor::GenericComponentType(
            component_type,
        )),
        type_: gj::validation::Checked::Valid(type_),
        min,
        max,
        normalized,
        name: Some(name.to_owned()),
        sparse: None,
        extensions: None,
        extras: gj::Extras::default(),
    });
    index
}

/// Bake a loaded document and write `<stem>_baked.gltf`/`.bin` to `out_dir`.
pub fn bake_document(doc: &LoadedDocument, out_dir: &Path) -> BakeResult<BakedPaths> {
    let paths = BakedPaths::for_source(doc.path(), out_dir);

    log::info!("Processing meshes...");
    let meshes = process_meshes(doc)?;
    log::info!(
        "Meshes processed: {} relems, {} vertices, {} indices",
        meshes.relems.len(),
        meshes.vertices.len(),
        meshes.indices.len()
    );

    let bin_uri = paths
        .bin
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let baked = BakedAsset::build(doc.json(), &meshes, &bin_uri)?;

    log::info!("Saving model to {}", paths.gltf.display());
    baked.write(&paths)?;
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertices_start_on_16_byte_boundary() {
        assert_eq!(align16(0), 0);
        assert_eq!(align16(12), 16);
        assert_eq!(align16(16), 16);
        assert_eq!(align16(36), 48);
    }

    #[test]
    fn output_names_follow_source_stem() {
        let paths = BakedPaths::for_source(Path::new("assets/city.glb"), Path::new("out"));
        assert_eq!(paths.gltf, Path::new("out/city_baked.gltf"));
        assert_eq!(paths.bin, Path::new("out/city_baked.bin"));
    }
}
