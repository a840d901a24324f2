//! glTF/GLB asset loading.
//!
//! Parses a document, resolves its buffers (GLB blob, external `.bin` files,
//! data URIs) and keeps the JSON tree around for the offline exporter.

pub mod error;

pub use error::{AssetError, AssetResult};

use std::path::{Path, PathBuf};

/// Extension the baker emits for quantized normals and tangents
pub const KHR_MESH_QUANTIZATION: &str = "KHR_mesh_quantization";

/// Container format, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Gltf,
    Glb,
}

impl AssetFormat {
    pub fn from_path(path: &Path) -> AssetResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("gltf") => Ok(Self::Gltf),
            Some("glb") => Ok(Self::Glb),
            _ => Err(AssetError::UnknownExtension(path.to_path_buf())),
        }
    }
}

/// A parsed document with every buffer resolved to bytes.
pub struct LoadedDocument {
    document: gltf::Document,
    json: gltf::json::Root,
    buffers: Vec<Vec<u8>>,
    path: PathBuf,
}

impl LoadedDocument {
    /// Parse document bytes. `path` locates external buffers.
    pub fn from_slice(bytes: &[u8], path: &Path) -> AssetResult<Self> {
        let gltf::Gltf { document, blob } = gltf::Gltf::from_slice_without_validation(bytes)?;

        let mut json = document.into_json();
        accept_extensions(&mut json);
        let document = gltf::Document::from_json(json.clone())?;

        let buffers = gltf::import_buffers(&document, path.parent(), blob)?
            .into_iter()
            .map(|data| data.0)
            .collect();

        Ok(Self {
            document,
            json,
            buffers,
            path: path.to_path_buf(),
        })
    }

    /// Assemble from already-resolved parts
    pub fn from_parts(
        document: gltf::Document,
        json: gltf::json::Root,
        buffers: Vec<Vec<u8>>,
        path: PathBuf,
    ) -> Self {
        Self {
            document,
            json,
            buffers,
            path,
        }
    }

    pub fn document(&self) -> &gltf::Document {
        &self.document
    }

    /// JSON tree the document was built from, minus the extensions the
    /// loader consumed
    pub fn json(&self) -> &gltf::json::Root {
        &self.json
    }

    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Drop `KHR_mesh_quantization` from the extension lists so validation
/// accepts baked assets, and report anything else we ignore.
fn accept_extensions(json: &mut gltf::json::Root) {
    json.extensions_required.retain(|e| e != KHR_MESH_QUANTIZATION);
    json.extensions_used.retain(|e| e != KHR_MESH_QUANTIZATION);
    for ext in &json.extensions_used {
        log::warn!("glTF extension {ext} is not supported and will be ignored");
    }
}

/// Load a `.gltf` or `.glb` file.
pub fn load_document(path: impl AsRef<Path>) -> AssetResult<LoadedDocument> {
    let path = path.as_ref();
    AssetFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    LoadedDocument::from_slice(&bytes, path)
}

/// Load a document, logging the failure instead of returning it.
pub fn try_load_document(path: impl AsRef<Path>) -> Option<LoadedDocument> {
    let path = path.as_ref();
    match load_document(path) {
        Ok(doc) => Some(doc),
        Err(e) => {
            log::error!("Failed to load {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("scene.gltf", AssetFormat::Gltf)]
    #[case("scene.GLB", AssetFormat::Glb)]
    #[case("dir.v2/Scene.GlTf", AssetFormat::Gltf)]
    fn format_from_extension(#[case] path: &str, #[case] expected: AssetFormat) {
        assert_eq!(AssetFormat::from_path(Path::new(path)).unwrap(), expected);
    }

    #[test]
    fn obj_is_rejected_before_reading() {
        let err = load_document("does/not/exist/model.obj").err().unwrap();
        assert!(matches!(err, AssetError::UnknownExtension(_)));
        assert_eq!(
            err.to_string(),
            "Unknown glTF file extension. Expected .gltf or .glb."
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_document("does/not/exist/model.gltf").err().unwrap();
        assert!(matches!(err, AssetError::Io { .. }));
        assert!(try_load_document("does/not/exist/model.glb").is_none());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = LoadedDocument::from_slice(b"{ not json", Path::new("bad.gltf"))
            .err()
            .unwrap();
        assert!(matches!(err, AssetError::Parse(_)));
    }

    #[test]
    fn quantization_extension_is_accepted() {
        let json = br#"{
            "asset": { "version": "2.0" },
            "extensionsUsed": ["KHR_mesh_quantization"],
            "extensionsRequired": ["KHR_mesh_quantization"]
        }"#;
        let doc = LoadedDocument::from_slice(json, Path::new("empty.gltf")).unwrap();
        assert!(doc.json().extensions_required.is_empty());
        assert_eq!(doc.document().meshes().count(), 0);
        assert!(doc.buffers().is_empty());
    }
}
