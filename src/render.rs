//! The seam between the viewer logic and the GPU.
//!
//! [`RenderBackend`] is everything the render surface needs from a graphics
//! API: turning a decoded [`GeometryContainer`] into a drawable model, freeing
//! it again, following the viewport size, and drawing one frame. The wgpu
//! implementation lives in [`Context`](crate::context::Context); tests plug in
//! a recording backend instead.

use crate::{camera::Camera, data_structures::geometry::GeometryContainer};

pub trait RenderBackend {
    /// Backend-owned copy of a container (buffers, textures, bind groups).
    type Model;

    fn upload(&mut self, container: &GeometryContainer) -> Self::Model;

    /// Frees a model. Called exactly once per uploaded model.
    fn release(&mut self, model: Self::Model);

    /// Only called with non-zero dimensions.
    fn resize(&mut self, width: u32, height: u32);

    /// Clears the target and draws `model` (if any) through `camera`.
    fn draw(&mut self, camera: &Camera, model: Option<&Self::Model>) -> Result<(), wgpu::SurfaceError>;

    /// Frees everything the backend still owns. No calls follow.
    fn dispose(&mut self);
}
