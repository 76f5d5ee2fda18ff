//! Turning model files into [`GeometryContainer`]s.
//!
//! A [`ModelAsset`] is a byte blob plus the format it claims to be. The
//! [`FormatDecoder`] dispatches it to the glTF or OBJ loader and, for
//! Draco-compressed glTF primitives, resolves the decompressor first. All
//! failures come back as [`DecodeError`]; nothing is attached on failure.

use std::{fmt, path::Path};

use crate::{
    data_structures::geometry::GeometryContainer,
    error::DecodeError,
    resources::draco::{DecoderConfig, DracoResolver},
};

pub mod draco;
pub mod fetch;
pub mod gltf_loader;
pub mod obj_loader;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Gltf,
    Glb,
    Obj,
}

impl ModelFormat {
    /// Parses a format tag or file extension, ignoring case and a leading dot.
    pub fn from_tag(tag: &str) -> Result<Self, DecodeError> {
        let normalized = tag.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "gltf" => Ok(ModelFormat::Gltf),
            "glb" => Ok(ModelFormat::Glb),
            "obj" => Ok(ModelFormat::Obj),
            _ => Err(DecodeError::UnsupportedFormat(tag.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| DecodeError::UnsupportedFormat(path.display().to_string()))?;
        Self::from_tag(extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::Gltf => "gltf",
            ModelFormat::Glb => "glb",
            ModelFormat::Obj => "obj",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Raw model bytes with their declared format and a display name.
#[derive(Clone, Debug)]
pub struct ModelAsset {
    name: String,
    bytes: Vec<u8>,
    format: ModelFormat,
}

impl ModelAsset {
    /// Fails with `UnsupportedFormat` for anything but `gltf`, `glb` or `obj`.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, tag: &str) -> Result<Self, DecodeError> {
        Ok(Self::with_format(name, bytes, ModelFormat::from_tag(tag)?))
    }

    pub fn with_format(name: impl Into<String>, bytes: Vec<u8>, format: ModelFormat) -> Self {
        Self {
            name: name.into(),
            bytes,
            format,
        }
    }

    /// Reads a file, taking the format from its extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let format = ModelFormat::from_path(path)?;
        let bytes =
            std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::with_format(name, bytes, format))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }
}

/// Dispatches assets to the matching loader.
#[derive(Debug)]
pub struct FormatDecoder {
    draco: DracoResolver,
}

impl FormatDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            draco: DracoResolver::new(config),
        }
    }

    pub fn draco(&self) -> &DracoResolver {
        &self.draco
    }

    pub async fn decode(&self, asset: &ModelAsset) -> Result<GeometryContainer, DecodeError> {
        let container = match asset.format() {
            ModelFormat::Gltf | ModelFormat::Glb => {
                let parsed = gltf_loader::parse(asset)?;
                let decompressor = if parsed.needs_decompression() {
                    Some(self.draco.resolve().await?)
                } else {
                    None
                };
                gltf_loader::build(asset.name(), parsed, decompressor.as_deref())?
            }
            ModelFormat::Obj => obj_loader::decode(asset).await?,
        };
        log::info!(
            "decoded {} ({}): {} primitives, {} triangles",
            asset.name(),
            asset.format(),
            container.primitive_count(),
            container.triangle_count()
        );
        Ok(container)
    }

    /// Convenience for callers that only have a tag; rejects it before decoding.
    pub async fn decode_tagged(
        &self,
        name: &str,
        bytes: Vec<u8>,
        tag: &str,
    ) -> Result<GeometryContainer, DecodeError> {
        let asset = ModelAsset::new(name, bytes, tag)?;
        self.decode(&asset).await
    }
}

impl Default for FormatDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}
