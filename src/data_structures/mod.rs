//! Model data on both sides of the upload.
//!
//! - `bounds` holds the axis-aligned box and bounding sphere used for fitting
//! - `geometry` is the decoded CPU tree (`GeometryContainer`, `Node`, `Mesh`)
//! - `gpu_model` mirrors a container as buffers and bind groups
//! - `instance` holds node transforms and their raw GPU form
//! - `texture` wraps wgpu textures (depth buffer, colour maps)

pub mod bounds;
pub mod geometry;
pub mod gpu_model;
pub mod instance;
pub mod texture;
