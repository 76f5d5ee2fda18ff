//! Typed failures of the model decoding pipeline.
//!
//! Everything that can go wrong between receiving a byte blob and producing a
//! [`GeometryContainer`](crate::data_structures::geometry::GeometryContainer) is
//! reported as a [`DecodeError`]. GPU and window setup use `anyhow` instead since
//! those failures are fatal for the whole viewer rather than for a single load.

use std::fmt;

use thiserror::Error;

use crate::resources::ModelFormat;

/// Coarse classification of a [`DecodeError`], convenient for matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    UnsupportedFormat,
    MalformedAsset,
    DecoderAssetUnavailable,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecodeErrorKind::UnsupportedFormat => "unsupported format",
            DecodeErrorKind::MalformedAsset => "malformed asset",
            DecodeErrorKind::DecoderAssetUnavailable => "decoder asset unavailable",
        })
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The declared format tag is not one of `gltf`, `glb` or `obj`.
    #[error("unsupported model format `{0}` (expected gltf, glb or obj)")]
    UnsupportedFormat(String),
    /// The bytes are not a valid asset of the declared format.
    #[error("malformed {format} asset: {message}")]
    MalformedAsset { format: ModelFormat, message: String },
    /// The mesh decompression module could not be fetched or instantiated.
    #[error("mesh decompression module unavailable ({location}): {message}")]
    DecoderAssetUnavailable { location: String, message: String },
}

impl DecodeError {
    pub(crate) fn malformed(format: ModelFormat, message: impl fmt::Display) -> Self {
        DecodeError::MalformedAsset {
            format,
            message: message.to_string(),
        }
    }

    pub(crate) fn decoder_unavailable(location: impl Into<String>, message: impl fmt::Display) -> Self {
        DecodeError::DecoderAssetUnavailable {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::UnsupportedFormat(_) => DecodeErrorKind::UnsupportedFormat,
            DecodeError::MalformedAsset { .. } => DecodeErrorKind::MalformedAsset,
            DecodeError::DecoderAssetUnavailable { .. } => DecodeErrorKind::DecoderAssetUnavailable,
        }
    }

    /// Human readable description, identical to the `Display` output.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
