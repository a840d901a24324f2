//! Conversion of glTF meshes into unified vertex/index sequences.

use glam::{Vec2, Vec3};
use gltf::buffer::Target;
use gltf::accessor::{DataType, Dimensions};
use gltf::mesh::Mode;

use crate::assets::LoadedDocument;
use crate::scene::{Mesh, RenderElement, RenderElementBoundingBox};

use super::attributes::{read_indices, AttributeSemantic, PrimitiveStreams};
use super::error::{BakeError, BakeResult};
use super::vertex::Vertex;

/// Where a render element came from and which optional attributes its
/// source primitive carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelemOrigin {
    pub mesh: usize,
    pub primitive: usize,
    pub has_normal: bool,
    pub has_tangent: bool,
    pub has_texcoord: bool,
}

/// Baked geometry for a whole document.
///
/// `relems`, `relem_boxes` and `origins` are parallel; `meshes` is indexed
/// by glTF mesh index.
#[derive(Debug, Clone, Default)]
pub struct ProcessedMeshes {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub relems: Vec<RenderElement>,
    pub meshes: Vec<Mesh>,
    pub relem_boxes: Vec<RenderElementBoundingBox>,
    pub origins: Vec<RelemOrigin>,
}

impl ProcessedMeshes {
    /// Number of vertices a relem's indices can address
    pub fn relem_vertex_count(&self, relem: usize) -> usize {
        self.indices[self.relems[relem].index_range()]
            .iter()
            .max()
            .map_or(0, |&m| m as usize + 1)
    }
}

/// Byte totals of the vertex-array and element-array buffer views
fn view_byte_totals(document: &gltf::Document) -> (usize, usize) {
    document
        .views()
        .fold((0, 0), |(vertex, index), view| match view.target() {
            Some(Target::ArrayBuffer) => (vertex + view.length(), index),
            Some(Target::ElementArrayBuffer) => (vertex, index + view.length()),
            None => (vertex, index),
        })
}

/// Bake every mesh of a document into packed vertices and 32-bit indices.
///
/// Non-triangle primitives are skipped with a warning and do not count
/// towards their mesh's `relem_count`.
pub fn process_meshes(doc: &LoadedDocument) -> BakeResult<ProcessedMeshes> {
    let document = doc.document();
    let buffers = doc.buffers();

    let mut result = ProcessedMeshes::default();
    {
        let (vertex_bytes, index_bytes) = view_byte_totals(document);
        result.vertices.reserve(vertex_bytes / std::mem::size_of::<Vertex>());
        result.indices.reserve(index_bytes / std::mem::size_of::<u32>());
    }
    let total_primitives: usize = document.meshes().map(|m| m.primitives().len()).sum();
    result.relems.reserve(total_primitives);
    result.relem_boxes.reserve(total_primitives);
    result.meshes.reserve(document.meshes().len());

    for mesh in document.meshes() {
        let mut baked = Mesh {
            first_relem: result.relems.len() as u32,
            relem_count: mesh.primitives().len() as u32,
        };

        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                log::warn!(
                    "mesh {} primitive {}: non-triangles primitive ({:?}) is not supported, skipping it",
                    mesh.index(),
                    primitive.index(),
                    primitive.mode()
                );
                baked.relem_count -= 1;
                continue;
            }
            bake_primitive(&mut result, mesh.index(), &primitive, buffers)?;
        }

        result.meshes.push(baked);
    }

    log::debug!(
        "Baked {} meshes into {} relems ({} vertices, {} indices)",
        result.meshes.len(),
        result.relems.len(),
        result.vertices.len(),
        result.indices.len()
    );

    Ok(result)
}

fn bake_primitive(
    result: &mut ProcessedMeshes,
    mesh: usize,
    primitive: &gltf::Primitive<'_>,
    buffers: &[Vec<u8>],
) -> BakeResult<()> {
    let streams = PrimitiveStreams::resolve(mesh, primitive, buffers)?;
    let vertex_count = streams.vertex_count();

    let relem = RenderElement {
        vertex_offset: result.vertices.len() as u32,
        index_offset: result.indices.len() as u32,
        index_count: 0,
    };

    result.vertices.extend((0..vertex_count).map(|i| {
        Vertex::new(
            Vec3::from_array(streams.position.read(i)),
            streams
                .normal
                .map_or(Vec3::ZERO, |s| Vec3::from_array(s.read(i))),
            streams
                .texcoord0
                .map_or(Vec2::ZERO, |s| Vec2::from_array(s.read(i))),
            streams
                .tangent
                .map_or(Vec3::ZERO, |s| Vec3::from_array(s.read(i))),
        )
    }));

    match primitive.indices() {
        Some(accessor) => read_indices(
            mesh,
            primitive.index(),
            &accessor,
            buffers,
            &mut result.indices,
        )?,
        None => result.indices.extend(0..vertex_count as u32),
    }

    let relem = RenderElement {
        index_count: result.indices.len() as u32 - relem.index_offset,
        ..relem
    };

    if let Some(&index) = result.indices[relem.index_range()]
        .iter()
        .find(|&&i| i as usize >= vertex_count)
    {
        return Err(BakeError::IndexOutOfRange {
            mesh,
            primitive: primitive.index(),
            index,
            vertex_count,
        });
    }

    result
        .relem_boxes
        .push(relem_bounding_box(&result.vertices, &result.indices, &relem));
    result.relems.push(relem);
    result.origins.push(RelemOrigin {
        mesh,
        primitive: primitive.index(),
        has_normal: streams.has(AttributeSemantic::Normal),
        has_tangent: streams.has(AttributeSemantic::Tangent),
        has_texcoord: streams.has(AttributeSemantic::TexCoord0),
    });
    Ok(())
}

/// Buffer view names the offline baker writes
pub const BAKED_INDEX_VIEW: &str = "baked_indicies";
pub const BAKED_VERTEX_VIEW: &str = "baked_vertices";

fn find_view<'a>(document: &'a gltf::Document, name: &str) -> Option<gltf::buffer::View<'a>> {
    document.views().find(|v| v.name() == Some(name))
}

/// Whether the document was produced by the offline baker
pub fn is_baked(doc: &LoadedDocument) -> bool {
    let document = doc.document();
    find_view(document, BAKED_INDEX_VIEW).is_some() && find_view(document, BAKED_VERTEX_VIEW).is_some()
}

/// Read a pre-baked document without re-encoding its vertices.
///
/// The vertex and index blocks are copied as-is; render elements are
/// recovered from each primitive's index and POSITION accessor offsets.
pub fn process_baked_meshes(doc: &LoadedDocument) -> BakeResult<ProcessedMeshes> {
    let document = doc.document();
    let buffers = doc.buffers();

    let view_bytes = |name: &str| -> BakeResult<&[u8]> {
        let view = find_view(document, name)
            .ok_or_else(|| BakeError::Export(format!("buffer view {name} missing")))?;
        let data = buffers
            .get(view.buffer().index())
            .ok_or_else(|| BakeError::Export(format!("buffer view {name} has no buffer data")))?;
        let end = view.offset().saturating_add(view.length());
        data.get(view.offset()..end).ok_or(BakeError::AccessorOutOfRange {
            accessor: view.index(),
            needed: end,
            available: data.len(),
        })
    };

    let index_view = find_view(document, BAKED_INDEX_VIEW)
        .map(|view| view.index())
        .ok_or_else(|| BakeError::Export(format!("buffer view {BAKED_INDEX_VIEW} missing")))?;
    let vertex_bytes = view_bytes(BAKED_VERTEX_VIEW)?;
    let index_bytes = view_bytes(BAKED_INDEX_VIEW)?;
    let mut result = ProcessedMeshes {
        vertices: bytemuck::pod_collect_to_vec(
            &vertex_bytes[..vertex_bytes.len() / std::mem::size_of::<Vertex>() * std::mem::size_of::<Vertex>()],
        ),
        indices: bytemuck::pod_collect_to_vec(&index_bytes[..index_bytes.len() / 4 * 4]),
        ..Default::default()
    };

    for mesh in document.meshes() {
        let mut baked = Mesh {
            first_relem: result.relems.len() as u32,
            relem_count: 0,
        };
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                log::warn!(
                    "mesh {} primitive {}: non-triangles primitive ({:?}) is not supported, skipping it",
                    mesh.index(),
                    primitive.index(),
                    primitive.mode()
                );
                continue;
            }
            let position = primitive
                .get(&gltf::Semantic::Positions)
                .ok_or(BakeError::MissingPosition {
                    mesh: mesh.index(),
                    primitive: primitive.index(),
                })?;
            let Some(indices) = primitive.indices() else {
                return Err(BakeError::UnsupportedIndexType {
                    mesh: mesh.index(),
                    primitive: primitive.index(),
                    component: "none".into(),
                });
            };
            if indices.data_type() != DataType::U32 || indices.dimensions() != Dimensions::Scalar {
                return Err(BakeError::UnsupportedIndexType {
                    mesh: mesh.index(),
                    primitive: primitive.index(),
                    component: format!("{:?} {:?}", indices.data_type(), indices.dimensions()),
                });
            }
            if indices.view().map(|v| v.index()) != Some(index_view) {
                return Err(BakeError::Export(format!(
                    "accessor {} does not read from {BAKED_INDEX_VIEW}",
                    indices.index()
                )));
            }

            let relem = baked_relem(&result, &position, &indices, mesh.index(), primitive.index())?;

            result
                .relem_boxes
                .push(relem_bounding_box(&result.vertices, &result.indices, &relem));
            result.relems.push(relem);
            result.origins.push(RelemOrigin {
                mesh: mesh.index(),
                primitive: primitive.index(),
                has_normal: primitive.get(&gltf::Semantic::Normals).is_some(),
                has_tangent: primitive.get(&gltf::Semantic::Tangents).is_some(),
                has_texcoord: primitive.get(&gltf::Semantic::TexCoords(0)).is_some(),
            });
            baked.relem_count += 1;
        }
        result.meshes.push(baked);
    }

    Ok(result)
}

/// Recover a render element from a baked primitive's accessor offsets,
/// checking it addresses only data present in the unified sequences.
fn baked_relem(
    baked: &ProcessedMeshes,
    position: &gltf::Accessor<'_>,
    indices: &gltf::Accessor<'_>,
    mesh: usize,
    primitive: usize,
) -> BakeResult<RenderElement> {
    let index_space = baked.indices.len();
    let out_of_range = |needed: usize| BakeError::AccessorOutOfRange {
        accessor: indices.index(),
        needed,
        available: index_space * 4,
    };

    let index_offset = u32::try_from(indices.offset() / 4).map_err(|_| out_of_range(indices.offset()))?;
    let index_count = u32::try_from(indices.count()).map_err(|_| out_of_range(usize::MAX))?;
    let index_end = index_offset
        .checked_add(index_count)
        .filter(|&end| end as usize <= index_space)
        .ok_or_else(|| out_of_range((index_offset as usize).saturating_add(index_count as usize).saturating_mul(4)))?;

    let vertex_offset = u32::try_from(position.offset() / std::mem::size_of::<Vertex>()).map_err(|_| {
        BakeError::AccessorOutOfRange {
            accessor: position.index(),
            needed: position.offset(),
            available: baked.vertices.len() * std::mem::size_of::<Vertex>(),
        }
    })?;
    let vertex_space = baked.vertices.len().saturating_sub(vertex_offset as usize);
    let max_index = baked.indices[index_offset as usize..index_end as usize]
        .iter()
        .copied()
        .max()
        .unwrap_or(0);
    if max_index as usize >= vertex_space {
        return Err(BakeError::IndexOutOfRange {
            mesh,
            primitive,
            index: max_index,
            vertex_count: vertex_space,
        });
    }

    Ok(RenderElement {
        vertex_offset,
        index_offset,
        index_count,
    })
}

/// Bake a document, taking the copy-through path for baker output.
pub fn load_meshes(doc: &LoadedDocument) -> BakeResult<ProcessedMeshes> {
    if is_baked(doc) {
        log::info!("{} is pre-baked, copying buffers directly", doc.path().display());
        process_baked_meshes(doc)
    } else {
        process_meshes(doc)
    }
}

/// Bounds of the vertices a relem's indices reference.
///
/// Seeded with the relem's first vertex rather than infinities, so the
/// first vertex is always inside the box even when no index names it.
pub fn relem_bounding_box(
    vertices: &[Vertex],
    indices: &[u32],
    relem: &RenderElement,
) -> RenderElementBoundingBox {
    let base = relem.vertex_offset as usize;
    let Some(seed) = vertices.get(base) else {
        return RenderElementBoundingBox::default();
    };

    let mut bbox = RenderElementBoundingBox::from_point(seed.position());
    for &index in &indices[relem.index_range()] {
        if let Some(v) = vertices.get(base + index as usize) {
            bbox.extend(v.position());
        }
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_at(x: f32, y: f32, z: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, z), Vec3::ZERO, Vec2::ZERO, Vec3::ZERO)
    }

    #[test]
    fn box_is_seeded_with_first_vertex() {
        // Indices never reference vertex 0, but the box still contains it
        let vertices = vec![
            vertex_at(-5.0, 0.0, 0.0),
            vertex_at(1.0, 1.0, 1.0),
            vertex_at(2.0, -1.0, 0.0),
        ];
        let indices = vec![1, 2, 1];
        let relem = RenderElement {
            vertex_offset: 0,
            index_offset: 0,
            index_count: 3,
        };
        let bbox = relem_bounding_box(&vertices, &indices, &relem);
        assert_eq!(bbox.min(), Vec3::new(-5.0, -1.0, 0.0));
        assert_eq!(bbox.max(), Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn box_respects_vertex_offset() {
        let vertices = vec![
            vertex_at(100.0, 100.0, 100.0),
            vertex_at(0.0, 0.0, 0.0),
            vertex_at(1.0, 2.0, 3.0),
        ];
        let indices = vec![0, 0, 0, 0, 1, 1];
        let relem = RenderElement {
            vertex_offset: 1,
            index_offset: 3,
            index_count: 3,
        };
        let bbox = relem_bounding_box(&vertices, &indices, &relem);
        assert_eq!(bbox.min(), Vec3::ZERO);
        assert_eq!(bbox.max(), Vec3::new(1.0, 2.0, 3.0));
    }
}
