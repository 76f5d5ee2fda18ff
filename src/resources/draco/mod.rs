//! Draco (`KHR_draco_mesh_compression`) support for glTF primitives.
//!
//! The viewer fetches the decoder module from
//! [`DecoderConfig::module_location`] and hands its bytes to a
//! [`DecompressorFactory`], which turns them into a [`MeshDecompressor`]. The
//! instance is cached so the module is fetched at most once per
//! [`DracoResolver`]. Unless another factory is registered, [`native_factory`]
//! accepts the module and decodes sequentially encoded meshes in-process.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use serde::Deserialize;

use crate::{error::DecodeError, resources::fetch};

mod attributes;
mod buffer;
mod decoder;
mod rans;

pub use decoder::{NativeDecompressor, native_factory};

pub const EXTENSION_NAME: &str = "KHR_draco_mesh_compression";
pub const DEFAULT_DECODER_LOCATION: &str = "https://www.gstatic.com/draco/v1/decoders/";
pub const DEFAULT_DECODER_MODULE: &str = "draco_decoder.wasm";

/// Geometry of one decompressed primitive. Optional attributes are `None`
/// when the compressed stream did not carry them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecompressedMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
}

pub trait MeshDecompressor: Send + Sync {
    /// Decodes one compressed buffer view. `attributes` maps glTF attribute
    /// semantics (`POSITION`, `NORMAL`, `TEXCOORD_0`) to Draco attribute ids.
    fn decompress(
        &self,
        payload: &[u8],
        attributes: &BTreeMap<String, u32>,
    ) -> anyhow::Result<DecompressedMesh>;
}

/// Instantiates a decompressor from the fetched decoder module bytes.
pub type DecompressorFactory =
    Arc<dyn Fn(&[u8]) -> anyhow::Result<Arc<dyn MeshDecompressor>> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderLocation {
    Remote(String),
    Local(PathBuf),
}

impl DecoderLocation {
    /// `http(s)://` prefixes are remote, everything else is a directory.
    pub fn parse(location: &str) -> Self {
        if fetch::is_remote(location) {
            DecoderLocation::Remote(location.to_string())
        } else {
            DecoderLocation::Local(PathBuf::from(location))
        }
    }

    pub fn join(&self, module: &str) -> String {
        match self {
            DecoderLocation::Remote(base) if base.ends_with('/') => format!("{base}{module}"),
            DecoderLocation::Remote(base) => format!("{base}/{module}"),
            DecoderLocation::Local(dir) => dir.join(module).to_string_lossy().into_owned(),
        }
    }
}

#[derive(Clone)]
pub struct DecoderConfig {
    pub location: DecoderLocation,
    pub module: String,
    pub factory: Option<DecompressorFactory>,
}

impl DecoderConfig {
    pub fn new(location: &str) -> Self {
        Self {
            location: DecoderLocation::parse(location),
            ..Default::default()
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_factory(mut self, factory: DecompressorFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Leaves compressed primitives undecodable.
    pub fn without_factory(mut self) -> Self {
        self.factory = None;
        self
    }

    pub fn module_location(&self) -> String {
        self.location.join(&self.module)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            location: DecoderLocation::Remote(DEFAULT_DECODER_LOCATION.to_string()),
            module: DEFAULT_DECODER_MODULE.to_string(),
            factory: Some(native_factory()),
        }
    }
}

impl fmt::Debug for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderConfig")
            .field("location", &self.location)
            .field("module", &self.module)
            .field("factory", &self.factory.as_ref().map(|_| "Fn(&[u8])"))
            .finish()
    }
}

/// Lazily fetches and instantiates the decompressor, then keeps it.
pub struct DracoResolver {
    config: DecoderConfig,
    cached: Mutex<Option<Arc<dyn MeshDecompressor>>>,
}

impl DracoResolver {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn is_cached(&self) -> bool {
        self.cached.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    pub async fn resolve(&self) -> Result<Arc<dyn MeshDecompressor>, DecodeError> {
        if let Some(decompressor) = self.cached.lock().ok().and_then(|c| c.clone()) {
            return Ok(decompressor);
        }
        let location = self.config.module_location();
        let factory = self.config.factory.clone().ok_or_else(|| {
            DecodeError::decoder_unavailable(&location, "no decompressor factory is registered")
        })?;
        let module = fetch::load_binary(&location)
            .await
            .map_err(|e| DecodeError::decoder_unavailable(&location, format!("{e:#}")))?;
        let decompressor = factory(&module)
            .map_err(|e| DecodeError::decoder_unavailable(&location, format!("{e:#}")))?;
        log::info!("Draco decoder loaded from {} ({} bytes)", location, module.len());
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(decompressor.clone());
        }
        Ok(decompressor)
    }
}

impl fmt::Debug for DracoResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DracoResolver")
            .field("config", &self.config)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// The extension object of a compressed primitive.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DracoPrimitive {
    #[serde(rename = "bufferView")]
    pub buffer_view: usize,
    #[serde(default)]
    pub attributes: BTreeMap<String, u32>,
}

#[derive(Deserialize)]
struct RawRoot {
    #[serde(default)]
    meshes: Vec<RawMesh>,
}

#[derive(Deserialize)]
struct RawMesh {
    #[serde(default)]
    primitives: Vec<RawPrimitive>,
}

#[derive(Deserialize)]
struct RawPrimitive {
    #[serde(default)]
    attributes: BTreeMap<String, usize>,
    #[serde(default)]
    indices: Option<usize>,
    #[serde(default)]
    extensions: Option<RawExtensions>,
}

#[derive(Deserialize)]
struct RawExtensions {
    #[serde(rename = "KHR_draco_mesh_compression")]
    draco: Option<DracoPrimitive>,
}

/// The compressed primitives of a document, read from its raw JSON.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompressedScan {
    /// Keyed by `(mesh index, primitive index)`.
    pub primitives: HashMap<(usize, usize), DracoPrimitive>,
    /// Accessors that describe compressed data. They carry no `bufferView`
    /// of their own.
    pub accessors: HashSet<usize>,
}

pub fn scan(json: &[u8]) -> Result<CompressedScan, serde_json::Error> {
    let root: RawRoot = serde_json::from_slice(json)?;
    let mut found = CompressedScan::default();
    for (mesh_index, mesh) in root.meshes.into_iter().enumerate() {
        for (primitive_index, primitive) in mesh.primitives.into_iter().enumerate() {
            if let Some(draco) = primitive.extensions.and_then(|e| e.draco) {
                found.accessors.extend(primitive.attributes.values().copied());
                found.accessors.extend(primitive.indices);
                found.primitives.insert((mesh_index, primitive_index), draco);
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_gstatic() {
        let config = DecoderConfig::default();
        assert_eq!(
            config.module_location(),
            "https://www.gstatic.com/draco/v1/decoders/draco_decoder.wasm"
        );
    }

    #[test]
    fn locations_join_module_names() {
        assert_eq!(
            DecoderLocation::parse("https://cdn.example.com/draco").join("d.wasm"),
            "https://cdn.example.com/draco/d.wasm"
        );
        let local = DecoderLocation::parse("decoders");
        assert_eq!(local, DecoderLocation::Local(PathBuf::from("decoders")));
        assert_eq!(
            PathBuf::from(local.join("draco_decoder.wasm")),
            PathBuf::from("decoders").join("draco_decoder.wasm")
        );
    }

    #[test]
    fn finds_compressed_primitives_only() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "meshes": [
                {"primitives": [{"attributes": {"POSITION": 0}}]},
                {"primitives": [
                    {"attributes": {"POSITION": 1}},
                    {"attributes": {"POSITION": 2},
                     "extensions": {"KHR_draco_mesh_compression": {
                        "bufferView": 3, "attributes": {"POSITION": 0, "NORMAL": 1}}}}
                ]}
            ]
        }"#;
        let found = scan(json).unwrap().primitives;
        assert_eq!(found.len(), 1);
        let draco = &found[&(1, 1)];
        assert_eq!(draco.buffer_view, 3);
        assert_eq!(draco.attributes["NORMAL"], 1);
    }

    #[test]
    fn collects_accessors_of_compressed_primitives() {
        let json = br#"{
            "meshes": [{"primitives": [
                {"attributes": {"POSITION": 0}, "indices": 1},
                {"attributes": {"POSITION": 2, "NORMAL": 3}, "indices": 4,
                 "extensions": {"KHR_draco_mesh_compression": {"bufferView": 0}}}
            ]}]
        }"#;
        let found = scan(json).unwrap();
        assert_eq!(found.accessors, HashSet::from([2, 3, 4]));
        assert!(found.primitives[&(0, 1)].attributes.is_empty());
    }

    #[test]
    fn missing_factory_is_unavailable() {
        let resolver = DracoResolver::new(DecoderConfig::new("./nowhere").without_factory());
        let err = futures::executor::block_on(resolver.resolve()).err().unwrap();
        assert_eq!(err.kind(), crate::error::DecodeErrorKind::DecoderAssetUnavailable);
        assert!(err.message().contains("no decompressor factory"));
        assert!(!resolver.is_cached());
    }

    #[test]
    fn default_factory_still_fetches_the_module() {
        let resolver = DracoResolver::new(DecoderConfig::new("./nowhere"));
        assert!(resolver.config().factory.is_some());
        let err = futures::executor::block_on(resolver.resolve()).err().unwrap();
        assert_eq!(err.kind(), crate::error::DecodeErrorKind::DecoderAssetUnavailable);
        assert!(err.message().contains("draco_decoder.wasm"));
    }
}
