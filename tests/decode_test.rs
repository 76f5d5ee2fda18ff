use std::sync::{Arc, atomic::Ordering};

use approx::assert_relative_eq;
use cgmath::{Matrix4, SquareMatrix};
use futures::executor::block_on;
use meshview::{
    DecodeErrorKind, FormatDecoder,
    resources::{
        ModelAsset, ModelFormat,
        draco::{DecoderConfig, DecompressedMesh, MeshDecompressor},
    },
};

use crate::common::test_utils::{
    CUBE_OBJ, DECODER_MODULE, counting_factory, cube_glb, cube_gltf, cube_obj, decoder_dir,
    draco_cube_glb, draco_fixture_glb,
};
mod common;

fn assert_unit_cube(container: &meshview::data_structures::geometry::GeometryContainer) {
    assert_eq!(container.triangle_count(), 12);
    assert!(!container.is_empty());
    let bounds = container.bounds();
    assert_relative_eq!(bounds.aabb.min.x, -1.0);
    assert_relative_eq!(bounds.aabb.max.z, 1.0);
    assert_relative_eq!(bounds.center().x, 0.0);
    assert_relative_eq!(bounds.radius(), 3f32.sqrt(), epsilon = 1e-5);
}

#[test]
fn obj_cube_decodes() {
    let container = block_on(FormatDecoder::default().decode(&cube_obj("cube.obj"))).unwrap();
    assert_eq!(container.name(), "cube.obj");
    assert_unit_cube(&container);
}

#[test]
fn gltf_and_glb_cubes_decode_alike() {
    let decoder = FormatDecoder::default();
    let text = block_on(decoder.decode(&cube_gltf("cube.gltf"))).unwrap();
    let binary = block_on(decoder.decode(&cube_glb("cube.glb"))).unwrap();
    assert_unit_cube(&text);
    assert_unit_cube(&binary);
    assert_eq!(text.primitive_count(), binary.primitive_count());
    assert_eq!(text.bounds(), binary.bounds());
}

#[test]
fn unsupported_tag_is_rejected() {
    let decoder = FormatDecoder::default();
    let err = block_on(decoder.decode_tagged("part.stl", vec![0; 84], "stl")).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::UnsupportedFormat);
    assert!(err.message().contains("stl"));
}

#[test]
fn tags_are_matched_without_case() {
    let decoder = FormatDecoder::default();
    let container =
        block_on(decoder.decode_tagged("cube", CUBE_OBJ.as_bytes().to_vec(), ".OBJ")).unwrap();
    assert_eq!(container.triangle_count(), 12);
}

#[test]
fn garbage_glb_is_malformed() {
    let asset = ModelAsset::with_format("junk.glb", b"definitely not binary gltf".to_vec(), ModelFormat::Glb);
    let err = block_on(FormatDecoder::default().decode(&asset)).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
}

#[test]
fn truncated_glb_is_malformed() {
    let mut bytes = cube_glb("cube.glb").bytes().to_vec();
    bytes.truncate(bytes.len() - 40);
    let asset = ModelAsset::with_format("cut.glb", bytes, ModelFormat::Glb);
    let err = block_on(FormatDecoder::default().decode(&asset)).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
}

#[test]
fn gltf_json_that_is_not_json_is_malformed() {
    let asset = ModelAsset::with_format("broken.gltf", b"{\"asset\": ".to_vec(), ModelFormat::Gltf);
    let err = block_on(FormatDecoder::default().decode(&asset)).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
}

#[test]
fn draco_primitives_use_the_registered_decompressor_once() {
    let dir = decoder_dir("draco-once", "draco_decoder.wasm");
    let (factory, created) = counting_factory(DECODER_MODULE);
    let config = DecoderConfig::new(dir.to_str().unwrap()).with_factory(factory);
    let decoder = FormatDecoder::new(config);

    let first = block_on(decoder.decode(&draco_cube_glb("draco.glb"))).unwrap();
    assert_unit_cube(&first);
    assert!(decoder.draco().is_cached());

    let second = block_on(decoder.decode(&draco_cube_glb("draco.glb"))).unwrap();
    assert_unit_cube(&second);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    // Plain files never touch the decompressor
    block_on(decoder.decode(&cube_glb("plain.glb"))).unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn draco_without_factory_is_unavailable() {
    let dir = decoder_dir("draco-no-factory", "draco_decoder.wasm");
    let config = DecoderConfig::new(dir.to_str().unwrap()).without_factory();
    let decoder = FormatDecoder::new(config);
    let err = block_on(decoder.decode(&draco_cube_glb("draco.glb"))).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::DecoderAssetUnavailable);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn draco_with_missing_module_is_unavailable() {
    let dir = decoder_dir("draco-missing", "draco_decoder.wasm");
    let (factory, created) = counting_factory(DECODER_MODULE);
    let config = DecoderConfig::new(dir.to_str().unwrap())
        .with_module("not_there.wasm")
        .with_factory(factory);
    let decoder = FormatDecoder::new(config);

    let err = block_on(decoder.decode(&draco_cube_glb("draco.glb"))).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::DecoderAssetUnavailable);
    assert!(err.message().contains("not_there.wasm"));
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert!(!decoder.draco().is_cached());
    let _ = std::fs::remove_dir_all(dir);
}

struct Refusing;

impl MeshDecompressor for Refusing {
    fn decompress(
        &self,
        _payload: &[u8],
        _attributes: &std::collections::BTreeMap<String, u32>,
    ) -> anyhow::Result<DecompressedMesh> {
        anyhow::bail!("corrupt stream")
    }
}

#[test]
fn failed_decompression_is_malformed() {
    let dir = decoder_dir("draco-refusing", "draco_decoder.wasm");
    let config = DecoderConfig::new(dir.to_str().unwrap())
        .with_factory(Arc::new(|_: &[u8]| Ok(Arc::new(Refusing) as Arc<dyn MeshDecompressor>)));
    let decoder = FormatDecoder::new(config);

    let err = block_on(decoder.decode(&draco_cube_glb("draco.glb"))).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
    assert!(err.message().contains("corrupt stream"));
    let _ = std::fs::remove_dir_all(dir);
}

fn vertices(
    container: &meshview::data_structures::geometry::GeometryContainer,
) -> Vec<meshview::data_structures::geometry::ModelVertex> {
    let mut out = Vec::new();
    container.root().visit_world(&Matrix4::identity(), &mut |node, _| {
        if let Some(mesh) = &node.mesh {
            out.extend_from_slice(&mesh.vertices);
        }
    });
    out
}

#[test]
fn built_in_decoder_reads_sequential_draco() {
    let dir = decoder_dir("draco-native", "draco_decoder.wasm");
    let decoder = FormatDecoder::new(DecoderConfig::new(dir.to_str().unwrap()));

    let container = block_on(decoder.decode(&draco_fixture_glb("fixture.glb"))).unwrap();
    assert_unit_cube(&container);
    let vertices = vertices(&container);
    assert_eq!(vertices.len(), 8);
    for vertex in vertices {
        // Stored normals point from the center through each corner
        let expected = vertex.position.map(|c| c / 3f32.sqrt());
        for (n, e) in vertex.normal.iter().zip(expected) {
            assert_relative_eq!(*n, e, epsilon = 0.02);
        }
    }
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn built_in_decoder_still_needs_the_module() {
    let dir = decoder_dir("draco-native-missing", "draco_decoder.wasm");
    let config = DecoderConfig::new(dir.to_str().unwrap()).with_module("absent.wasm");
    let decoder = FormatDecoder::new(config);
    let err = block_on(decoder.decode(&draco_fixture_glb("fixture.glb"))).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::DecoderAssetUnavailable);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn built_in_decoder_reports_unknown_attribute_ids() {
    let dir = decoder_dir("draco-native-ids", "draco_decoder.wasm");
    let decoder = FormatDecoder::new(DecoderConfig::new(dir.to_str().unwrap()));
    let payload = std::fs::read(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cube_sequential.drc"),
    )
    .unwrap();
    let asset = crate::common::test_utils::draco_glb("ids.glb", &payload, r#"{"POSITION": 5}"#);
    let err = block_on(decoder.decode(&asset)).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::MalformedAsset);
    assert!(err.message().contains("POSITION"));
    let _ = std::fs::remove_dir_all(dir);
}
