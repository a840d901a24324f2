//! GPU-resident scene: unified geometry, instance and indirect-draw buffers.

use std::path::Path;

use glam::Mat4;
use thiserror::Error;

use crate::assets::{load_document, AssetError};
use crate::backend::{
    BackendError, BackendResult, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend,
    VertexBufferLayout,
};
use crate::bake::{load_meshes, process_instances, BakeError, ProcessedInstances, ProcessedMeshes, Vertex};
use crate::TerrainConfig;

use super::heightmap::{Heightmap, HeightmapTexture};
use super::{DrawIndexedIndirect, Mesh, RenderElement, RenderElementBoundingBox};

/// Smallest allocation for a scene buffer. Empty scenes still bind valid
/// storage buffers, and one `mat4x4<f32>` is the largest element.
const MIN_BUFFER_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Bake(#[from] BakeError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Handles to every unified buffer of the loaded scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneBuffers {
    pub vertex: BufferHandle,
    pub index: BufferHandle,
    pub relem: BufferHandle,
    pub relem_box: BufferHandle,
    pub mesh: BufferHandle,
    pub inst_matrices: BufferHandle,
    pub inst_meshes: BufferHandle,
    /// One `DrawIndexedIndirect` slot per render element
    pub draw_cmd: BufferHandle,
    /// Instance index per visible (relem, instance) pair
    pub draw_matrices_ind: BufferHandle,
    /// Start of each relem's run in `draw_matrices_ind`
    pub matrices_offsets_ind: BufferHandle,
}

impl SceneBuffers {
    fn all(&self) -> [BufferHandle; 10] {
        [
            self.vertex,
            self.index,
            self.relem,
            self.relem_box,
            self.mesh,
            self.inst_matrices,
            self.inst_meshes,
            self.draw_cmd,
            self.draw_matrices_ind,
            self.matrices_offsets_ind,
        ]
    }
}

/// Per-relem instance totals and their exclusive prefix sum
pub fn relem_instance_offsets(
    meshes: &[Mesh],
    relem_count: usize,
    instance_meshes: &[u32],
) -> (Vec<u32>, Vec<u32>) {
    let mut counts = vec![0u32; relem_count];
    for &mesh in instance_meshes {
        let Some(mesh) = meshes.get(mesh as usize) else {
            continue;
        };
        for relem in mesh.relems() {
            if let Some(c) = counts.get_mut(relem) {
                *c += 1;
            }
        }
    }

    let offsets = counts
        .iter()
        .scan(0u32, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect();
    (counts, offsets)
}

fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut data = bytes.to_vec();
    data.resize(data.len().max(MIN_BUFFER_SIZE).next_multiple_of(4), 0);
    data
}

/// Owner of all scene data, CPU and GPU side.
pub struct SceneManager {
    render_elements: Vec<RenderElement>,
    relem_boxes: Vec<RenderElementBoundingBox>,
    meshes: Vec<Mesh>,
    instance_matrices: Vec<Mat4>,
    instance_meshes: Vec<u32>,
    relem_instance_counts: Vec<u32>,
    matrices_offsets: Vec<u32>,
    vertex_count: usize,
    index_count: usize,

    buffers: Option<SceneBuffers>,
    heightmap: HeightmapTexture,
}

impl SceneManager {
    /// Create an empty scene and build the terrain heightmap.
    pub fn new<B: GraphicsBackend>(backend: &mut B, terrain: &TerrainConfig) -> BackendResult<Self> {
        let map = Heightmap::from_config(terrain);
        let heightmap = HeightmapTexture::upload(backend, &map)?;

        Ok(Self {
            render_elements: Vec::new(),
            relem_boxes: Vec::new(),
            meshes: Vec::new(),
            instance_matrices: Vec::new(),
            instance_meshes: Vec::new(),
            relem_instance_counts: Vec::new(),
            matrices_offsets: Vec::new(),
            vertex_count: 0,
            index_count: 0,
            buffers: None,
            heightmap,
        })
    }

    /// Load, bake and upload a scene, replacing the current one.
    ///
    /// On failure the previously loaded scene stays in place.
    pub fn select_scene<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        path: impl AsRef<Path>,
    ) -> Result<(), SceneError> {
        let path = path.as_ref();
        let result = load_document(path)
            .map_err(SceneError::from)
            .and_then(|doc| {
                let meshes = load_meshes(&doc)?;
                let instances = process_instances(&doc);
                Ok((meshes, instances))
            })
            .and_then(|(meshes, instances)| self.upload(backend, meshes, instances));

        match result {
            Ok(()) => {
                log::info!(
                    "Loaded scene {}: {} instances, {} meshes, {} relems",
                    path.display(),
                    self.instance_count(),
                    self.meshes.len(),
                    self.relem_count()
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load scene {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    /// Replace the scene with already-baked data.
    pub fn upload<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        meshes: ProcessedMeshes,
        instances: ProcessedInstances,
    ) -> Result<(), SceneError> {
        let (counts, offsets) =
            relem_instance_offsets(&meshes.meshes, meshes.relems.len(), &instances.meshes);
        let draw_matrix_slots: u32 = counts.iter().sum();

        let draw_cmds = vec![DrawIndexedIndirect::default(); meshes.relems.len()];
        let draw_matrices = vec![0u32; draw_matrix_slots as usize];

        let storage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let uploads: [(&str, &[u8], BufferUsage); 10] = [
            (
                "unified_vertices",
                bytemuck::cast_slice(&meshes.vertices),
                BufferUsage::VERTEX | BufferUsage::COPY_DST,
            ),
            (
                "unified_indices",
                bytemuck::cast_slice(&meshes.indices),
                BufferUsage::INDEX | BufferUsage::COPY_DST,
            ),
            ("unified_relems", bytemuck::cast_slice(&meshes.relems), storage),
            ("unified_relem_boxes", bytemuck::cast_slice(&meshes.relem_boxes), storage),
            ("unified_meshes", bytemuck::cast_slice(&meshes.meshes), storage),
            ("unified_inst_matrices", bytemuck::cast_slice(&instances.matrices), storage),
            ("unified_inst_meshes", bytemuck::cast_slice(&instances.meshes), storage),
            (
                "unified_draw_cmds",
                bytemuck::cast_slice(&draw_cmds),
                BufferUsage::INDIRECT | storage,
            ),
            ("unified_draw_matrices_ind", bytemuck::cast_slice(&draw_matrices), storage),
            ("unified_matrices_offsets_ind", bytemuck::cast_slice(&offsets), storage),
        ];

        let mut created = Vec::with_capacity(uploads.len());
        for (label, bytes, usage) in uploads {
            let data = padded(bytes);
            let desc = BufferDescriptor::new(label, data.len() as u64, usage);
            match backend.create_buffer_init(&desc, &data) {
                Ok(handle) => created.push(handle),
                Err(e) => {
                    for handle in created {
                        backend.destroy_buffer(handle);
                    }
                    return Err(e.into());
                }
            }
        }

        let new_buffers = SceneBuffers {
            vertex: created[0],
            index: created[1],
            relem: created[2],
            relem_box: created[3],
            mesh: created[4],
            inst_matrices: created[5],
            inst_meshes: created[6],
            draw_cmd: created[7],
            draw_matrices_ind: created[8],
            matrices_offsets_ind: created[9],
        };
        self.release_buffers(backend);
        self.buffers = Some(new_buffers);

        self.vertex_count = meshes.vertices.len();
        self.index_count = meshes.indices.len();
        self.render_elements = meshes.relems;
        self.relem_boxes = meshes.relem_boxes;
        self.meshes = meshes.meshes;
        self.instance_matrices = instances.matrices;
        self.instance_meshes = instances.meshes;
        self.relem_instance_counts = counts;
        self.matrices_offsets = offsets;

        Ok(())
    }

    fn release_buffers<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(buffers) = self.buffers.take() {
            for handle in buffers.all() {
                backend.destroy_buffer(handle);
            }
        }
    }

    /// Free every GPU object. The manager is empty afterwards.
    pub fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        self.release_buffers(backend);
        self.heightmap.destroy(backend);
    }

    pub fn instance_matrices(&self) -> &[Mat4] {
        &self.instance_matrices
    }

    pub fn instance_meshes(&self) -> &[u32] {
        &self.instance_meshes
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn render_elements(&self) -> &[RenderElement] {
        &self.render_elements
    }

    pub fn relem_boxes(&self) -> &[RenderElementBoundingBox] {
        &self.relem_boxes
    }

    /// Instances drawing each relem when nothing is culled
    pub fn relem_instance_counts(&self) -> &[u32] {
        &self.relem_instance_counts
    }

    pub fn matrices_offsets(&self) -> &[u32] {
        &self.matrices_offsets
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_matrices.len() as u32
    }

    pub fn relem_count(&self) -> u32 {
        self.render_elements.len() as u32
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    /// `None` until a scene has been loaded
    pub fn buffers(&self) -> Option<&SceneBuffers> {
        self.buffers.as_ref()
    }

    pub fn heightmap(&self) -> &HeightmapTexture {
        &self.heightmap
    }

    pub fn vertex_layout(&self) -> VertexBufferLayout {
        Vertex::layout()
    }
}
