//! The render surface: camera, orbit controls, light rig and the per-frame tick.
//!
//! A [`RenderSurface`] lives for the whole session and does not care which
//! model is loaded. The controller hands it a container through
//! [`RenderSurface::attach`]; the previously attached GPU model is retired
//! there and released at the start of the next [`RenderSurface::frame`],
//! before anything new is drawn.

use winit::event::WindowEvent;

use crate::{
    camera::{Camera, CameraPose, OrbitController},
    config::ViewerConfig,
    data_structures::geometry::GeometryContainer,
    pipelines::light::LightRig,
    render::RenderBackend,
};

pub struct RenderSurface<B: RenderBackend> {
    backend: B,
    camera: Camera,
    orbit: OrbitController,
    lights: LightRig,
    clear_colour: wgpu::Color,
    size: (u32, u32),
    attached: Option<B::Model>,
    visible: bool,
    retired: Vec<B::Model>,
    disposed: bool,
}

impl<B: RenderBackend> RenderSurface<B> {
    pub fn new(backend: B, config: &ViewerConfig, width: u32, height: u32) -> Self {
        let mut surface = Self {
            backend,
            camera: config.camera(width.max(1), height.max(1)),
            orbit: config.orbit(),
            lights: LightRig::STANDARD,
            clear_colour: config.clear_colour,
            size: (width, height),
            attached: None,
            visible: true,
            retired: Vec::new(),
            disposed: false,
        };
        surface.resize(width, height);
        surface
    }

    /// Uploads `container` and makes it the drawn model. The model drawn
    /// until now is released on the next frame.
    pub fn attach(&mut self, container: &GeometryContainer) {
        if self.disposed {
            log::warn!("attach of {} after the surface was disposed", container.name());
            return;
        }
        let model = self.backend.upload(container);
        if let Some(previous) = self.attached.replace(model) {
            self.retired.push(previous);
        }
        self.visible = container.is_visible();
    }

    /// Releases the attached model right away.
    pub fn release_attached(&mut self) {
        if let Some(model) = self.attached.take() {
            self.backend.release(model);
        }
    }

    pub fn has_model(&self) -> bool {
        self.attached.is_some()
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// One tick: free retired models, advance the orbit, draw.
    pub fn frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        if self.disposed {
            return Ok(());
        }
        for model in self.retired.drain(..) {
            self.backend.release(model);
        }
        self.orbit.update(&mut self.camera);
        let model = self.attached.as_ref().filter(|_| self.visible);
        self.backend.draw(&self.camera, model)
    }

    /// Follows the viewport. A zero dimension (minimized window) is ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.disposed || !self.camera.resize(width, height) {
            return false;
        }
        self.size = (width, height);
        self.backend.resize(width, height);
        true
    }

    /// Places the camera and drops pending orbit input so it can't drag the
    /// new pose away.
    pub fn apply_pose(&mut self, pose: &CameraPose) {
        self.camera.apply(pose);
        self.orbit.sync();
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        self.orbit.handle_window_events(event)
    }

    /// Releases every model and the backend. Only the first call does anything.
    pub fn dispose(&mut self) {
        if self.disposed {
            log::warn!("render surface disposed twice");
            return;
        }
        for model in self.retired.drain(..) {
            self.backend.release(model);
        }
        self.release_attached();
        self.backend.dispose();
        self.disposed = true;
        log::info!("render surface disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn clear_colour(&self) -> wgpu::Color {
        self.clear_colour
    }

    pub fn lights(&self) -> &LightRig {
        &self.lights
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn orbit_mut(&mut self) -> &mut OrbitController {
        &mut self.orbit
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
