#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::PathBuf,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use meshview::{
    RenderBackend, SceneController, ViewerConfig,
    camera::Camera,
    data_structures::geometry::GeometryContainer,
    resources::{
        ModelAsset, ModelFormat,
        draco::{DecompressedMesh, DecompressorFactory, MeshDecompressor},
    },
};

/// Everything the surface asked the backend to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Upload { id: usize, name: String },
    Release(usize),
    Resize(u32, u32),
    Draw(Option<usize>),
    Dispose,
}

#[derive(Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn uploads(&self) -> Vec<(usize, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload { id, name } => Some((id, name)),
                _ => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Release(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<Option<usize>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Draw(model) => Some(model),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.0.borrow().iter().filter(|call| *call == wanted).count()
    }

    fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }
}

#[derive(Debug)]
pub struct RecordedModel {
    pub id: usize,
}

/// A backend that draws nothing and remembers every call.
#[derive(Default)]
pub struct RecordingBackend {
    log: CallLog,
    next_id: usize,
}

impl RecordingBackend {
    pub fn new() -> (Self, CallLog) {
        let log = CallLog::default();
        (
            Self {
                log: log.clone(),
                next_id: 1,
            },
            log,
        )
    }
}

impl RenderBackend for RecordingBackend {
    type Model = RecordedModel;

    fn upload(&mut self, container: &GeometryContainer) -> RecordedModel {
        let id = self.next_id;
        self.next_id += 1;
        self.log.push(Call::Upload {
            id,
            name: container.name().to_string(),
        });
        RecordedModel { id }
    }

    fn release(&mut self, model: RecordedModel) {
        self.log.push(Call::Release(model.id));
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.push(Call::Resize(width, height));
    }

    fn draw(
        &mut self,
        _camera: &Camera,
        model: Option<&RecordedModel>,
    ) -> Result<(), wgpu::SurfaceError> {
        self.log.push(Call::Draw(model.map(|m| m.id)));
        Ok(())
    }

    fn dispose(&mut self) {
        self.log.push(Call::Dispose);
    }
}

pub fn controller(config: &ViewerConfig) -> (SceneController<RecordingBackend>, CallLog) {
    let (backend, log) = RecordingBackend::new();
    (SceneController::new(backend, config, 800, 600), log)
}

pub const CUBE_OBJ: &str = "\
o cube
v -1 -1 -1
v -1 -1 1
v -1 1 -1
v -1 1 1
v 1 -1 -1
v 1 -1 1
v 1 1 -1
v 1 1 1
f 1 2 4 3
f 5 7 8 6
f 1 5 6 2
f 3 4 8 7
f 1 3 7 5
f 2 6 8 4
";

pub fn cube_obj(name: &str) -> ModelAsset {
    ModelAsset::with_format(name, CUBE_OBJ.as_bytes().to_vec(), ModelFormat::Obj)
}

/// Corners of [-1, 1]^3, x major.
pub fn cube_positions() -> Vec<[f32; 3]> {
    let mut positions = Vec::new();
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                positions.push([x, y, z]);
            }
        }
    }
    positions
}

pub const CUBE_INDICES: [u32; 36] = [
    0, 1, 3, 0, 3, 2, 4, 6, 7, 4, 7, 5, 0, 4, 5, 0, 5, 1, 2, 3, 7, 2, 7, 6, 0, 2, 6, 0, 6, 4, 1,
    5, 7, 1, 7, 3,
];

/// Positions then u16 indices, the layout the cube documents below describe.
pub fn cube_buffer() -> Vec<u8> {
    let mut bin = Vec::new();
    for position in cube_positions() {
        for c in position {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in CUBE_INDICES {
        bin.extend_from_slice(&(i as u16).to_le_bytes());
    }
    bin
}

const CUBE_BASE64: &str = "AACAvwAAgL8AAIC/AACAvwAAgL8AAIA/AACAvwAAgD8AAIC/AACAvwAAgD8AAIA/AACAPwAAgL8AAIC/AACAPwAAgL8AAIA/AACAPwAAgD8AAIC/AACAPwAAgD8AAIA/AAABAAMAAAADAAIABAAGAAcABAAHAAUAAAAEAAUAAAAFAAEAAgADAAcAAgAHAAYAAAACAAYAAAAGAAQAAQAFAAcAAQAHAAMA";

fn cube_document(buffer: &str) -> String {
    format!(
        r#"{{
        "asset": {{"version": "2.0"}},
        "scene": 0,
        "scenes": [{{"nodes": [0]}}],
        "nodes": [{{"name": "cube", "mesh": 0}}],
        "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1}}]}}],
        "buffers": [{buffer}],
        "bufferViews": [
            {{"buffer": 0, "byteOffset": 0, "byteLength": 96}},
            {{"buffer": 0, "byteOffset": 96, "byteLength": 72}}
        ],
        "accessors": [
            {{"bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
              "min": [-1.0, -1.0, -1.0], "max": [1.0, 1.0, 1.0]}},
            {{"bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR"}}
        ]
    }}"#
    )
}

pub fn cube_gltf(name: &str) -> ModelAsset {
    let buffer = format!(
        r#"{{"byteLength": 168, "uri": "data:application/octet-stream;base64,{CUBE_BASE64}"}}"#
    );
    ModelAsset::with_format(name, cube_document(&buffer).into_bytes(), ModelFormat::Gltf)
}

pub fn cube_glb(name: &str) -> ModelAsset {
    let json = cube_document(r#"{"byteLength": 168}"#);
    ModelAsset::with_format(name, glb(&json, &cube_buffer()), ModelFormat::Glb)
}

/// Assembles a binary glTF container: header, JSON chunk, optional BIN chunk.
pub fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let mut length = 12 + 8 + json.len();
    if !bin.is_empty() {
        length += 8 + bin.len();
    }

    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(length as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    if !bin.is_empty() {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(&bin);
    }
    out
}

pub const DRACO_PAYLOAD: &[u8] = b"DRACO-cube-payload!!";

/// A cube whose single primitive is Draco compressed. The payload is opaque
/// and only understood by [`CubeDecompressor`].
pub fn draco_cube_glb(name: &str) -> ModelAsset {
    draco_glb(name, DRACO_PAYLOAD, r#"{"POSITION": 0}"#)
}

/// The cube from `tests/fixtures`, a real sequentially encoded Draco stream
/// with quantized positions and octahedral normals.
pub fn draco_fixture_glb(name: &str) -> ModelAsset {
    let payload = std::fs::read(
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cube_sequential.drc"),
    )
    .expect("fixture");
    draco_glb(name, &payload, r#"{"POSITION": 0, "NORMAL": 1}"#)
}

/// One compressed primitive whose buffer view holds `payload`. Accessor 0
/// is POSITION, 1 the indices and 2 NORMAL, none with a buffer view.
pub fn draco_glb(name: &str, payload: &[u8], draco_attributes: &str) -> ModelAsset {
    let json = format!(
        r#"{{
        "asset": {{"version": "2.0"}},
        "extensionsUsed": ["KHR_draco_mesh_compression"],
        "extensionsRequired": ["KHR_draco_mesh_compression"],
        "scene": 0,
        "scenes": [{{"nodes": [0]}}],
        "nodes": [{{"mesh": 0}}],
        "meshes": [{{"primitives": [{{
            "attributes": {{"POSITION": 0, "NORMAL": 2}},
            "indices": 1,
            "extensions": {{"KHR_draco_mesh_compression": {{
                "bufferView": 0, "attributes": {draco_attributes}}}}}
        }}]}}],
        "buffers": [{{"byteLength": {len}}}],
        "bufferViews": [{{"buffer": 0, "byteLength": {len}}}],
        "accessors": [
            {{"componentType": 5126, "count": 8, "type": "VEC3",
              "min": [-1.0, -1.0, -1.0], "max": [1.0, 1.0, 1.0]}},
            {{"componentType": 5125, "count": 36, "type": "SCALAR"}},
            {{"componentType": 5126, "count": 8, "type": "VEC3"}}
        ]
    }}"#,
        len = payload.len()
    );
    ModelAsset::with_format(name, glb(&json, payload), ModelFormat::Glb)
}

/// Hands back the cube for [`DRACO_PAYLOAD`] and fails on anything else.
pub struct CubeDecompressor;

impl MeshDecompressor for CubeDecompressor {
    fn decompress(
        &self,
        payload: &[u8],
        attributes: &BTreeMap<String, u32>,
    ) -> anyhow::Result<DecompressedMesh> {
        anyhow::ensure!(payload == DRACO_PAYLOAD, "unexpected payload");
        anyhow::ensure!(attributes.contains_key("POSITION"), "no POSITION attribute");
        Ok(DecompressedMesh {
            positions: cube_positions(),
            normals: None,
            tex_coords: None,
            indices: CUBE_INDICES.to_vec(),
        })
    }
}

/// A factory that counts how often it was asked to instantiate the module.
pub fn counting_factory(expected_module: &'static [u8]) -> (DecompressorFactory, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let factory: DecompressorFactory = Arc::new(move |module: &[u8]| {
        anyhow::ensure!(module == expected_module, "not a decoder module");
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CubeDecompressor) as Arc<dyn MeshDecompressor>)
    });
    (factory, created)
}

pub const DECODER_MODULE: &[u8] = b"\0asm fake decoder";

/// A fresh directory holding `module` as the decoder file.
pub fn decoder_dir(test: &str, module: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("meshview-{}-{}", test, std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(dir.join(module), DECODER_MODULE).expect("decoder module");
    dir
}
