//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a glTF asset.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown glTF file extension. Expected .gltf or .glb.")]
    UnknownExtension(PathBuf),
    #[error("glTF parse error: {0}")]
    Parse(#[from] gltf::Error),
}

pub type AssetResult<T> = Result<T, AssetError>;
