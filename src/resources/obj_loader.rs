use std::io::{BufReader, Cursor};

use crate::{
    data_structures::{
        geometry::{GeometryContainer, Material, Mesh, ModelVertex, Node, compute_normals},
        instance::Transform,
    },
    error::DecodeError,
    resources::{ModelAsset, ModelFormat},
};

/**
 * Decodes Wavefront OBJ text into a single mesh node.
 *
 * All objects and groups are merged and triangulated. Material libraries are
 * separate files that a byte blob can't reference, so they are ignored and the
 * mesh gets the default material.
 */
pub async fn decode(asset: &ModelAsset) -> Result<GeometryContainer, DecodeError> {
    let mut obj_reader = BufReader::new(Cursor::new(asset.bytes()));
    let name = asset.name().to_string();

    let (models, _materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |mtl| {
            let name = name.clone();
            async move {
                log::warn!("{name}: material library {mtl} is not loaded from a blob");
                let missing: tobj::MTLLoadResult = Err(tobj::LoadError::OpenFileFailed);
                missing
            }
        },
    )
    .await
    .map_err(|e| DecodeError::malformed(ModelFormat::Obj, format!("{e:?}")))?;

    let mut merged = Mesh {
        name: name.clone(),
        material: 0,
        ..Default::default()
    };
    for m in &models {
        let mut vertices = (0..m.mesh.positions.len() / 3)
            .map(|i| ModelVertex {
                position: [
                    m.mesh.positions[i * 3],
                    m.mesh.positions[i * 3 + 1],
                    m.mesh.positions[i * 3 + 2],
                ],
                tex_coords: [
                    m.mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                    // OBJ has v pointing up, textures are addressed top-down
                    1.0 - m.mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
                ],
                normal: [
                    m.mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                    m.mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                    m.mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
                ],
            })
            .collect::<Vec<_>>();

        if let Some(bad) = m.mesh.indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(DecodeError::malformed(
                ModelFormat::Obj,
                format!("{}: index {bad} out of range", m.name),
            ));
        }
        if m.mesh.normals.len() < m.mesh.positions.len() {
            compute_normals(&mut vertices, &m.mesh.indices);
        }

        let offset = merged.vertices.len() as u32;
        merged.indices.extend(m.mesh.indices.iter().map(|i| i + offset));
        merged.vertices.append(&mut vertices);
    }

    let mut root = Node::new(Some(name.clone()), Transform::new());
    if merged.is_drawable() {
        root.mesh = Some(merged);
    } else {
        log::warn!("{name}: OBJ contains no faces");
    }
    let material = Material {
        name: format!("{name} material"),
        ..Default::default()
    };
    Ok(GeometryContainer::new(name, root, vec![material]))
}
