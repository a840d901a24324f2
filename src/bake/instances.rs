//! Flattening of the glTF node hierarchy into instance lists.

use glam::Mat4;

use crate::assets::LoadedDocument;

/// Per-instance world transforms and mesh indices, as parallel sequences
#[derive(Debug, Clone, Default)]
pub struct ProcessedInstances {
    pub matrices: Vec<Mat4>,
    pub meshes: Vec<u32>,
}

impl ProcessedInstances {
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Instances of each mesh, indexed by mesh
    pub fn counts_per_mesh(&self, mesh_count: usize) -> Vec<u32> {
        let mut counts = vec![0u32; mesh_count];
        for &mesh in &self.meshes {
            if let Some(c) = counts.get_mut(mesh as usize) {
                *c += 1;
            }
        }
        counts
    }
}

/// Walk the default scene (every scene if none is marked default) and emit
/// one instance per node that references a mesh, with its world matrix.
pub fn process_instances(doc: &LoadedDocument) -> ProcessedInstances {
    let document = doc.document();
    let mut result = ProcessedInstances::default();

    let roots: Vec<gltf::Node<'_>> = match document.default_scene() {
        Some(scene) => scene.nodes().collect(),
        None => document.scenes().flat_map(|s| s.nodes()).collect(),
    };

    let mut stack: Vec<(gltf::Node<'_>, Mat4)> =
        roots.into_iter().rev().map(|n| (n, Mat4::IDENTITY)).collect();

    while let Some((node, parent)) = stack.pop() {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

        if let Some(mesh) = node.mesh() {
            result.matrices.push(world);
            result.meshes.push(mesh.index() as u32);
        }

        let children: Vec<_> = node.children().collect();
        stack.extend(children.into_iter().rev().map(|child| (child, world)));
    }

    log::debug!("Scene has {} instances", result.len());
    result
}
