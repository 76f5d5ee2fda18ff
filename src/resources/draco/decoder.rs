//! Mesh-level decoding: header, metadata, connectivity and the attribute
//! decoders that follow.
//!
//! Only sequentially encoded triangle meshes (bitstream 2.0 to 2.2) are
//! understood. Edgebreaker streams are refused with an error naming the
//! method.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, bail, ensure};

use super::{
    DecompressedMesh, DecompressorFactory, MeshDecompressor,
    attributes::{AttributeKind, DecodedAttribute, decode_attributes},
    buffer::DecoderBuffer,
    rans::decode_symbols,
};

const MAGIC: &[u8] = b"DRACO";
const WASM_MAGIC: &[u8] = b"\0asm";
const TRIANGULAR_MESH: u8 = 1;
const SEQUENTIAL: u8 = 0;
const EDGEBREAKER: u8 = 1;
const METADATA_FLAG: u16 = 0x8000;
const COMPRESSED_INDICES: u8 = 0;
const UNCOMPRESSED_INDICES: u8 = 1;
const MAX_POINTS: u32 = 1 << 26;
const MAX_METADATA_DEPTH: usize = 32;

/// A decoded Draco mesh before it is mapped onto glTF semantics.
#[derive(Debug)]
pub(super) struct DracoMesh {
    pub faces: Vec<[u32; 3]>,
    pub points: usize,
    pub attributes: Vec<DecodedAttribute>,
}

impl DracoMesh {
    pub fn decode(payload: &[u8]) -> anyhow::Result<Self> {
        let mut buffer = DecoderBuffer::new(payload);
        ensure!(buffer.bytes(MAGIC.len())? == MAGIC, "not a Draco stream");
        let version = (buffer.u8()?, buffer.u8()?);
        ensure!(
            version.0 == 2 && version.1 <= 2,
            "unsupported Draco bitstream version {}.{}",
            version.0,
            version.1
        );
        buffer.version = version;
        let encoder = buffer.u8()?;
        ensure!(encoder == TRIANGULAR_MESH, "Draco geometry type {encoder} is not a mesh");
        let method = buffer.u8()?;
        let flags = buffer.u16()?;
        if flags & METADATA_FLAG != 0 {
            skip_metadata(&mut buffer)?;
        }

        let (faces, points) = match method {
            SEQUENTIAL => decode_sequential_connectivity(&mut buffer)?,
            EDGEBREAKER => bail!("Edgebreaker connectivity is not supported"),
            other => bail!("unknown Draco encoding method {other}"),
        };
        let attributes = decode_attributes(&mut buffer, points)?;
        log::debug!(
            "Draco {}.{} mesh: {} faces, {} points, {} attributes",
            version.0,
            version.1,
            faces.len(),
            points,
            attributes.len()
        );
        Ok(Self {
            faces,
            points,
            attributes,
        })
    }

    /// Looks an attribute up by its Draco id; with no ids at all, by type.
    fn attribute(
        &self,
        ids: &BTreeMap<String, u32>,
        semantic: &str,
        kind: AttributeKind,
    ) -> Option<&DecodedAttribute> {
        match ids.get(semantic) {
            Some(&id) => self
                .attributes
                .iter()
                .find(|a| a.descriptor.unique_id == id),
            None if ids.is_empty() => self.attributes.iter().find(|a| a.descriptor.kind == kind),
            None => None,
        }
    }

    pub fn into_mesh(self, ids: &BTreeMap<String, u32>) -> anyhow::Result<DecompressedMesh> {
        let position = self
            .attribute(ids, "POSITION", AttributeKind::Position)
            .context("compressed primitive has no POSITION attribute")?;
        let positions = position
            .vectors::<3>()
            .context("POSITION needs three components")?;
        let normals = match self.attribute(ids, "NORMAL", AttributeKind::Normal) {
            Some(normal) => Some(normal.vectors::<3>().context("NORMAL needs three components")?),
            None => None,
        };
        let tex_coords = match self.attribute(ids, "TEXCOORD_0", AttributeKind::TexCoord) {
            Some(uv) => Some(uv.vectors::<2>().context("TEXCOORD_0 needs two components")?),
            None => None,
        };
        if let Some(missing) = ids
            .iter()
            .find(|(_, id)| !self.attributes.iter().any(|a| a.descriptor.unique_id == **id))
        {
            bail!("attribute {} (id {}) is not in the stream", missing.0, missing.1);
        }
        Ok(DecompressedMesh {
            positions,
            normals,
            tex_coords,
            indices: self.faces.into_iter().flatten().collect(),
        })
    }
}

fn skip_metadata(buffer: &mut DecoderBuffer<'_>) -> anyhow::Result<()> {
    let attribute_entries = buffer.varint()?;
    for _ in 0..attribute_entries {
        buffer.varint()?;
        skip_metadata_element(buffer, 0)?;
    }
    skip_metadata_element(buffer, 0)
}

fn skip_metadata_element(buffer: &mut DecoderBuffer<'_>, depth: usize) -> anyhow::Result<()> {
    ensure!(depth < MAX_METADATA_DEPTH, "metadata nested too deeply");
    let entries = buffer.varint()?;
    for _ in 0..entries {
        let key = buffer.u8()?;
        buffer.bytes(usize::from(key))?;
        let value = buffer.u8()?;
        buffer.bytes(usize::from(value))?;
    }
    let children = buffer.varint()?;
    for _ in 0..children {
        let key = buffer.u8()?;
        buffer.bytes(usize::from(key))?;
        skip_metadata_element(buffer, depth + 1)?;
    }
    Ok(())
}

fn decode_sequential_connectivity(
    buffer: &mut DecoderBuffer<'_>,
) -> anyhow::Result<(Vec<[u32; 3]>, usize)> {
    let (face_count, point_count) = if buffer.version < (2, 2) {
        (buffer.u32()?, buffer.u32()?)
    } else {
        (buffer.varint_u32()?, buffer.varint_u32()?)
    };
    ensure!(point_count <= MAX_POINTS, "{point_count} points");
    ensure!(
        face_count as usize <= buffer.remaining() / 3,
        "{face_count} faces cannot fit the stream"
    );
    let index_count = face_count as usize * 3;

    let indices: Vec<u32> = match buffer.u8()? {
        COMPRESSED_INDICES => {
            let symbols = decode_symbols(buffer, index_count, 1)?;
            let mut last = 0u32;
            let mut out = Vec::with_capacity(index_count);
            for symbol in symbols {
                let delta = symbol >> 1;
                last = if symbol & 1 != 0 {
                    last.checked_sub(delta)
                } else {
                    last.checked_add(delta)
                }
                .context("index delta out of range")?;
                out.push(last);
            }
            out
        }
        UNCOMPRESSED_INDICES => {
            let mut out = Vec::with_capacity(index_count);
            for _ in 0..index_count {
                out.push(if point_count < 1 << 8 {
                    u32::from(buffer.u8()?)
                } else if point_count < 1 << 16 {
                    u32::from(buffer.u16()?)
                } else if point_count < 1 << 21 && buffer.version >= (2, 2) {
                    buffer.varint_u32()?
                } else {
                    buffer.u32()?
                });
            }
            out
        }
        other => bail!("unknown index coding {other}"),
    };

    if let Some(index) = indices.iter().find(|&&i| i >= point_count) {
        bail!("index {index} is past {point_count} points");
    }
    let faces = indices
        .chunks_exact(3)
        .map(|face| [face[0], face[1], face[2]])
        .collect();
    Ok((faces, point_count as usize))
}

/// Decodes Draco streams in-process.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeDecompressor;

impl MeshDecompressor for NativeDecompressor {
    fn decompress(
        &self,
        payload: &[u8],
        attributes: &BTreeMap<String, u32>,
    ) -> anyhow::Result<DecompressedMesh> {
        DracoMesh::decode(payload)?.into_mesh(attributes)
    }
}

/// The factory used unless another is registered. The fetched module must
/// be a WebAssembly binary; decoding itself runs natively.
pub fn native_factory() -> DecompressorFactory {
    Arc::new(|module: &[u8]| {
        ensure!(
            module.starts_with(WASM_MAGIC),
            "decoder module is not WebAssembly"
        );
        Ok(Arc::new(NativeDecompressor) as Arc<dyn MeshDecompressor>)
    })
}
