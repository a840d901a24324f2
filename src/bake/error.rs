//! Error types for mesh baking.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while baking a document into packed buffers.
#[derive(Error, Debug)]
pub enum BakeError {
    /// A triangle primitive has no POSITION attribute.
    #[error("mesh {mesh} primitive {primitive} has no POSITION attribute")]
    MissingPosition { mesh: usize, primitive: usize },
    /// Indices are neither 16- nor 32-bit unsigned.
    #[error("mesh {mesh} primitive {primitive}: unsupported index component type {component}")]
    UnsupportedIndexType {
        mesh: usize,
        primitive: usize,
        component: String,
    },
    /// An attribute is stored in a format the baker cannot decode.
    #[error("accessor {accessor}: unsupported {semantic} format {format}")]
    UnsupportedAttribute {
        accessor: usize,
        semantic: &'static str,
        format: String,
    },
    /// Sparse accessors without a buffer view are not supported.
    #[error("accessor {0} has no buffer view")]
    MissingBufferView(usize),
    /// Accessor data extends past the end of its buffer.
    #[error("accessor {accessor} needs {needed} bytes but its buffer has {available}")]
    AccessorOutOfRange {
        accessor: usize,
        needed: usize,
        available: usize,
    },
    /// An index references a vertex outside its primitive.
    #[error("mesh {mesh} primitive {primitive}: index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        mesh: usize,
        primitive: usize,
        index: u32,
        vertex_count: usize,
    },
    /// Baked document could not be serialised.
    #[error("export error: {0}")]
    Export(String),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type BakeResult<T> = Result<T, BakeError>;
