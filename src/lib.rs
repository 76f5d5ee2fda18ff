//! meshview
//!
//! An interactive viewer for a single 3D model at a time. A byte blob in glTF,
//! GLB or OBJ form is decoded off the render loop, attached to a lit scene and
//! framed by the camera; the user can orbit, zoom, toggle the model and frame
//! it again. Runs natively and on the web through wgpu and winit.
//!
//! High-level modules
//! - `controller`: the active-model slot, load sequencing, toggle and refit
//! - `resources`: format dispatch and the glTF, OBJ and Draco decoders
//! - `fit`: camera placement that frames a bounding volume
//! - `surface`: camera, orbit controls, light rig and per-frame tick
//! - `render`: the `RenderBackend` seam between viewer logic and the GPU
//! - `context`: the wgpu implementation of `RenderBackend`
//! - `camera`: perspective camera, uniform and orbit controller
//! - `data_structures`: decoded geometry, bounds, GPU models and textures
//! - `pipelines`: the model pipeline and the fixed light rig
//! - `flow`: the winit application and `run`
//! - `config`, `error`: viewer settings and decode failures

pub mod camera;
pub mod config;
pub mod context;
pub mod controller;
pub mod data_structures;
pub mod error;
pub mod fit;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod surface;

pub use config::ViewerConfig;
pub use controller::{LoadResult, LoadStatus, PendingLoad, SceneController, SlotState};
pub use error::{DecodeError, DecodeErrorKind};
pub use flow::run;
pub use render::RenderBackend;
pub use resources::{FormatDecoder, ModelAsset, ModelFormat};
