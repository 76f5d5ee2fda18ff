//! Viewer configuration.
//!
//! Everything here has a sensible default; the binary overrides a few fields
//! from its command line. The light rig is not configurable, see
//! [`LightRig::STANDARD`](crate::pipelines::light::LightRig::STANDARD).

use cgmath::Deg;

use crate::{
    camera::{Camera, OrbitController},
    fit::{DEFAULT_PADDING, MIN_DISTANCE},
    resources::draco::DecoderConfig,
};

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub title: String,
    /// Window size before the first resize event arrives.
    pub initial_size: (u32, u32),
    pub clear_colour: wgpu::Color,
    pub fovy: Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
    /// Multiplier on the tight-fit distance when framing a model.
    pub padding: f32,
    pub damping: f32,
    /// Radians of orbit per pixel of drag.
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub decoder: DecoderConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "meshview".to_string(),
            initial_size: (1280, 720),
            clear_colour: wgpu::Color::WHITE,
            fovy: Deg(75.0),
            znear: 0.1,
            zfar: 1000.0,
            padding: DEFAULT_PADDING,
            damping: 0.25,
            rotate_speed: 0.005,
            zoom_speed: 1.0,
            decoder: DecoderConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn camera(&self, width: u32, height: u32) -> Camera {
        Camera::new(self.fovy, width, height, self.znear, self.zfar)
    }

    pub fn orbit(&self) -> OrbitController {
        OrbitController::new(self.damping, self.rotate_speed, self.zoom_speed)
            .with_min_distance(self.znear.max(MIN_DISTANCE * 0.1))
    }
}
