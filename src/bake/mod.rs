//! Mesh baking: glTF primitives to packed vertices, unified index lists and
//! render elements, plus the exporter behind the offline model baker.

pub mod attributes;
pub mod error;
pub mod export;
pub mod instances;
pub mod meshes;
pub mod vertex;

pub use attributes::AttributeSemantic;
pub use error::{BakeError, BakeResult};
pub use export::{bake_document, BakedAsset, BakedPaths};
pub use instances::{process_instances, ProcessedInstances};
pub use meshes::{
    is_baked, load_meshes, process_baked_meshes, process_meshes, relem_bounding_box,
    ProcessedMeshes, RelemOrigin,
};
pub use vertex::{decode_direction, encode_direction, Vertex};
