//! glTF 2.0 (JSON and binary) loading.
//!
//! Parsing happens in two steps so the caller can resolve a Draco
//! decompressor in between: [`parse`] validates the document and resolves its
//! buffers, [`build`] walks the default scene into a [`GeometryContainer`].

use std::collections::{HashMap, HashSet};

use crate::{
    data_structures::{
        geometry::{GeometryContainer, Material, Mesh, ModelVertex, Node, compute_normals},
        instance::Transform,
    },
    error::DecodeError,
    resources::{
        ModelAsset, ModelFormat,
        draco::{self, DracoPrimitive, MeshDecompressor},
    },
};

const GLB_MAGIC: &[u8; 4] = b"glTF";

/// A validated document with its buffers loaded.
pub struct ParsedGltf {
    format: ModelFormat,
    document: gltf::Document,
    buffers: Vec<gltf::buffer::Data>,
    compressed: HashMap<(usize, usize), DracoPrimitive>,
}

impl ParsedGltf {
    pub fn needs_decompression(&self) -> bool {
        !self.compressed.is_empty()
    }

    pub fn document(&self) -> &gltf::Document {
        &self.document
    }
}

/// Tolerates complaints about declared extensions (Draco is handled here
/// rather than by the parser) and about the missing `bufferView` of accessors
/// whose data lives in a compressed stream.
fn only_compression_complaints(err: &gltf::Error, compressed: &HashSet<usize>) -> bool {
    match err {
        gltf::Error::Validation(errors) => {
            !errors.is_empty()
                && errors.iter().all(|(path, _)| {
                    let path = path.to_string();
                    path.starts_with("extensionsRequired")
                        || path.starts_with("extensionsUsed")
                        || compressed_accessor(&path).is_some_and(|i| compressed.contains(&i))
                })
        }
        _ => false,
    }
}

/// `accessors[7].bufferView` -> 7
fn compressed_accessor(path: &str) -> Option<usize> {
    path.strip_prefix("accessors[")?
        .strip_suffix("].bufferView")?
        .parse()
        .ok()
}

pub fn parse(asset: &ModelAsset) -> Result<ParsedGltf, DecodeError> {
    let format = asset.format();
    let bytes = asset.bytes();
    let is_binary = bytes.starts_with(GLB_MAGIC);
    if format == ModelFormat::Glb && !is_binary {
        return Err(DecodeError::malformed(format, "missing binary glTF header"));
    }

    let glb;
    let json: &[u8] = if is_binary {
        glb = gltf::Glb::from_slice(bytes).map_err(|e| DecodeError::malformed(format, e))?;
        &glb.json
    } else {
        bytes
    };
    let draco::CompressedScan {
        primitives: compressed,
        accessors,
    } = draco::scan(json).map_err(|e| DecodeError::malformed(format, e))?;

    let gltf = match gltf::Gltf::from_slice(bytes) {
        Ok(gltf) => gltf,
        Err(err) if only_compression_complaints(&err, &accessors) => {
            log::debug!("{}: continuing past compression extensions ({})", asset.name(), err);
            gltf::Gltf::from_slice_without_validation(bytes)
                .map_err(|e| DecodeError::malformed(format, e))?
        }
        Err(err) => return Err(DecodeError::malformed(format, err)),
    };

    let gltf::Gltf { document, blob } = gltf;
    let buffers = gltf::import_buffers(&document, None, blob)
        .map_err(|e| DecodeError::malformed(format, format!("unresolvable buffer: {e}")))?;

    Ok(ParsedGltf {
        format,
        document,
        buffers,
        compressed,
    })
}

pub fn build(
    name: &str,
    parsed: ParsedGltf,
    decompressor: Option<&dyn MeshDecompressor>,
) -> Result<GeometryContainer, DecodeError> {
    let mut materials: Vec<Material> = parsed
        .document
        .materials()
        .map(|material| load_material(&parsed, material))
        .collect();
    let default_material = materials.len();
    materials.push(Material::default());

    let builder = SceneBuilder {
        parsed: &parsed,
        decompressor,
        default_material,
    };

    let mut root = Node::new(Some(name.to_string()), Transform::new());
    match parsed
        .document
        .default_scene()
        .or_else(|| parsed.document.scenes().next())
    {
        Some(scene) => {
            for node in scene.nodes() {
                root.add_child(builder.node(node)?);
            }
        }
        None => {
            // No scene: show every node that isn't somebody's child
            let children: Vec<usize> = parsed
                .document
                .nodes()
                .flat_map(|node| node.children().map(|child| child.index()).collect::<Vec<_>>())
                .collect();
            for node in parsed
                .document
                .nodes()
                .filter(|node| !children.contains(&node.index()))
            {
                root.add_child(builder.node(node)?);
            }
        }
    }

    Ok(GeometryContainer::new(name, root, materials))
}

fn load_material(parsed: &ParsedGltf, material: gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("material {}", material.index().unwrap_or_default()));
    let base_colour_texture = pbr.base_color_texture().and_then(|info| {
        match info.texture().source().source() {
            gltf::image::Source::View { view, mime_type } => {
                let Some(bytes) = view_bytes(&parsed.buffers, &view) else {
                    log::warn!("{name}: base colour texture lies outside its buffer, skipping it");
                    return None;
                };
                match image::load_from_memory(bytes) {
                    Ok(img) => Some(img.to_rgba8()),
                    Err(e) => {
                        log::warn!("{name}: base colour texture ({mime_type}) not decodable: {e}");
                        None
                    }
                }
            }
            gltf::image::Source::Uri { uri, .. } => {
                let shown: String = uri.chars().take(40).collect();
                log::warn!("{name}: texture {shown} is not embedded in a buffer view, skipping it");
                None
            }
        }
    });
    Material {
        name,
        base_colour: pbr.base_color_factor(),
        base_colour_texture: base_colour_texture
            .filter(|img| img.width() > 0 && img.height() > 0),
    }
}

/// The bytes of a buffer view, or `None` when the view does not fit its buffer.
fn view_bytes<'a>(buffers: &'a [gltf::buffer::Data], view: &gltf::buffer::View) -> Option<&'a [u8]> {
    let end = view.offset().checked_add(view.length())?;
    buffers.get(view.buffer().index())?.get(view.offset()..end)
}

struct SceneBuilder<'a> {
    parsed: &'a ParsedGltf,
    decompressor: Option<&'a dyn MeshDecompressor>,
    default_material: usize,
}

impl SceneBuilder<'_> {
    fn node(&self, node: gltf::Node) -> Result<Node, DecodeError> {
        let (translation, rotation, scale) = node.transform().decomposed();
        let mut out = Node::new(
            node.name().map(str::to_string),
            Transform::from_trs(translation, rotation, scale),
        );

        if let Some(mesh) = node.mesh() {
            let mut meshes = Vec::new();
            for primitive in mesh.primitives() {
                if let Some(m) = self.primitive(&mesh, &primitive)? {
                    meshes.push(m);
                }
            }
            if meshes.len() == 1 {
                out.mesh = meshes.pop();
            } else {
                for m in meshes {
                    out.add_child(Node::default().with_mesh(m));
                }
            }
        }

        for child in node.children() {
            out.add_child(self.node(child)?);
        }
        Ok(out)
    }

    fn primitive(
        &self,
        mesh: &gltf::Mesh,
        primitive: &gltf::Primitive,
    ) -> Result<Option<Mesh>, DecodeError> {
        let format = self.parsed.format;
        let name = format!(
            "{}#{}",
            mesh.name().map(str::to_string).unwrap_or_else(|| mesh.index().to_string()),
            primitive.index()
        );
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("{name}: skipping {:?} primitive, only triangles are drawn", primitive.mode());
            return Ok(None);
        }
        let material = primitive.material().index().unwrap_or(self.default_material);

        let (mut vertices, indices, has_normals) =
            match self.parsed.compressed.get(&(mesh.index(), primitive.index())) {
                Some(draco) => self.decompress(&name, draco)?,
                None => self.read(&name, primitive)?,
            };

        if vertices.is_empty() {
            log::warn!("{name}: primitive has no positions");
            return Ok(None);
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(DecodeError::malformed(
                format,
                format!("{name}: index {bad} out of range for {} vertices", vertices.len()),
            ));
        }
        if !has_normals {
            compute_normals(&mut vertices, &indices);
        }

        Ok(Some(Mesh {
            name,
            vertices,
            indices,
            material,
        }))
    }

    fn read(
        &self,
        name: &str,
        primitive: &gltf::Primitive,
    ) -> Result<(Vec<ModelVertex>, Vec<u32>, bool), DecodeError> {
        let buffers = &self.parsed.buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &**d));

        let mut vertices: Vec<ModelVertex> = match reader.read_positions() {
            Some(positions) => positions
                .map(|position| ModelVertex {
                    position,
                    ..Default::default()
                })
                .collect(),
            None => return Ok((Vec::new(), Vec::new(), false)),
        };

        let mut has_normals = false;
        if let Some(normals) = reader.read_normals() {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal = normal;
            }
            has_normals = true;
        }
        if let Some(tex_coords) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
            for (vertex, tex_coord) in vertices.iter_mut().zip(tex_coords) {
                vertex.tex_coords = tex_coord;
            }
        }

        let indices = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => {
                log::debug!("{name}: no indices, drawing vertices in order");
                (0..vertices.len() as u32).collect()
            }
        };
        Ok((vertices, indices, has_normals))
    }

    fn decompress(
        &self,
        name: &str,
        draco: &DracoPrimitive,
    ) -> Result<(Vec<ModelVertex>, Vec<u32>, bool), DecodeError> {
        let format = self.parsed.format;
        let decompressor = self.decompressor.ok_or_else(|| {
            DecodeError::decoder_unavailable(draco::EXTENSION_NAME, "no decompressor was resolved")
        })?;
        let view = self
            .parsed
            .document
            .views()
            .nth(draco.buffer_view)
            .ok_or_else(|| {
                DecodeError::malformed(format, format!("{name}: missing buffer view {}", draco.buffer_view))
            })?;
        let payload = view_bytes(&self.parsed.buffers, &view).ok_or_else(|| {
            DecodeError::malformed(format, format!("{name}: compressed data is out of bounds"))
        })?;

        let decoded = decompressor
            .decompress(payload, &draco.attributes)
            .map_err(|e| DecodeError::malformed(format, format!("{name}: Draco decompression failed: {e:#}")))?;

        let mut vertices: Vec<ModelVertex> = decoded
            .positions
            .iter()
            .map(|&position| ModelVertex {
                position,
                ..Default::default()
            })
            .collect();
        let has_normals = match &decoded.normals {
            Some(normals) if normals.len() == vertices.len() => {
                for (vertex, normal) in vertices.iter_mut().zip(normals) {
                    vertex.normal = *normal;
                }
                true
            }
            _ => false,
        };
        if let Some(tex_coords) = &decoded.tex_coords {
            for (vertex, tex_coord) in vertices.iter_mut().zip(tex_coords) {
                vertex.tex_coords = *tex_coord;
            }
        }
        let indices = if decoded.indices.is_empty() {
            (0..vertices.len() as u32).collect()
        } else {
            decoded.indices
        };
        Ok((vertices, indices, has_normals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;

    // One triangle, positions only, buffer as a base64 data URI
    const TRIANGLE: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"mesh": 0, "translation": [0.0, 0.0, -2.0]}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "buffers": [{"byteLength": 36, "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"}],
        "bufferViews": [{"buffer": 0, "byteLength": 36}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]}]
    }"#;

    fn asset(json: &str, format: ModelFormat) -> ModelAsset {
        ModelAsset::with_format("triangle", json.as_bytes().to_vec(), format)
    }

    #[test]
    fn non_indexed_triangle_gets_sequential_indices_and_normals() {
        let parsed = parse(&asset(TRIANGLE, ModelFormat::Gltf)).unwrap();
        assert!(!parsed.needs_decompression());
        let container = build("triangle", parsed, None).unwrap();

        assert_eq!(container.primitive_count(), 1);
        let node = &container.root().children[0];
        let mesh = node.mesh.as_ref().unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert!(mesh.vertices.iter().all(|v| (v.normal[2] - 1.0).abs() < 1e-6));
        // Primitive had no material, so it uses the appended default
        assert_eq!(mesh.material, container.materials().len() - 1);
        // The node translation moves the bounds
        assert_eq!(container.bounds().aabb.min.z, -2.0);
    }

    #[test]
    fn json_claimed_as_glb_is_malformed() {
        let err = parse(&asset(TRIANGLE, ModelFormat::Glb)).err().unwrap();
        assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
    }

    #[test]
    fn external_buffers_cannot_be_resolved() {
        let json = TRIANGLE.replace(
            "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA",
            "triangle.bin",
        );
        let err = parse(&asset(&json, ModelFormat::Gltf)).err().unwrap();
        assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
    }

    #[test]
    fn texture_view_past_the_address_space_is_skipped() {
        let json = TRIANGLE
            .replace(
                r#""primitives": [{"attributes": {"POSITION": 0}}]"#,
                r#""primitives": [{"attributes": {"POSITION": 0}, "material": 0}]"#,
            )
            .replace(
                r#""bufferViews": [{"buffer": 0, "byteLength": 36}]"#,
                r#""bufferViews": [{"buffer": 0, "byteLength": 36},
                    {"buffer": 0, "byteOffset": 18446744073709551615, "byteLength": 4}],
                "images": [{"bufferView": 1, "mimeType": "image/png"}],
                "textures": [{"source": 0}],
                "materials": [{"pbrMetallicRoughness": {"baseColorTexture": {"index": 0}}}]"#,
            );
        let container = match parse(&asset(&json, ModelFormat::Gltf)) {
            Ok(parsed) => build("triangle", parsed, None).unwrap(),
            // Rejected up front is fine as long as it is reported
            Err(err) => {
                assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
                return;
            }
        };
        assert_eq!(container.materials().len(), 2);
        assert!(container.materials()[0].base_colour_texture.is_none());
    }

    #[test]
    fn accessor_paths_are_recognised() {
        assert_eq!(compressed_accessor("accessors[7].bufferView"), Some(7));
        assert_eq!(compressed_accessor("accessors[7].count"), None);
        assert_eq!(compressed_accessor("bufferViews[0].buffer"), None);
    }

    #[test]
    fn accessor_without_view_outside_draco_is_malformed() {
        let json = TRIANGLE.replace(r#""bufferView": 0, "#, "");
        let err = parse(&asset(&json, ModelFormat::Gltf)).err().unwrap();
        assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse(&ModelAsset::with_format("x", b"{not json".to_vec(), ModelFormat::Gltf))
            .err()
            .unwrap();
        assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
    }
}
