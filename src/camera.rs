//! Perspective camera, its uniform and the orbit controls.
//!
//! The camera always looks at a target point. [`OrbitController`] moves it on a
//! sphere around that target: left-drag rotates, the wheel dollies in and out,
//! and pending rotation decays with damping over the following frames.

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector3};
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Keeps the orbit away from the poles where `look_at` degenerates.
const POLAR_EPSILON: f32 = 1e-3;
/// Below this the pending orbit input counts as settled.
const SETTLE_EPSILON: f32 = 1e-5;

/// Where the camera sits and what it looks at.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Point3<f32>,
    pub look_at: Point3<f32>,
    pub distance: f32,
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    fovy: Rad<f32>,
    aspect: f32,
    znear: f32,
    zfar: f32,
}

impl Camera {
    pub fn new<F: Into<Rad<f32>>>(fovy: F, width: u32, height: u32, znear: f32, zfar: f32) -> Self {
        let mut camera = Self {
            position: Point3::new(0.0, 0.0, 5.0),
            target: Point3::origin(),
            fovy: fovy.into(),
            aspect: 1.0,
            znear,
            zfar,
        };
        camera.resize(width, height);
        camera
    }

    /// Updates the aspect ratio. A zero dimension is ignored and reported as `false`.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.aspect = width as f32 / height as f32;
        true
    }

    pub fn apply(&mut self, pose: &CameraPose) {
        self.position = pose.position;
        self.target = pose.look_at;
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn clip(&self) -> (f32, f32) {
        (self.znear, self.zfar)
    }

    pub fn distance(&self) -> f32 {
        (self.position - self.target).magnitude()
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, Vector3::unit_y())
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = camera.view_projection().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Damped orbit around the camera target.
#[derive(Debug, Clone)]
pub struct OrbitController {
    damping: f32,
    rotate_speed: f32,
    zoom_speed: f32,
    min_distance: f32,
    theta_delta: f32,
    phi_delta: f32,
    zoom_scale: f32,
    dragging: bool,
    cursor: Option<PhysicalPosition<f64>>,
}

impl OrbitController {
    /// `damping` is the share of pending rotation applied per frame, clamped into (0, 1].
    pub fn new(damping: f32, rotate_speed: f32, zoom_speed: f32) -> Self {
        let damping = if damping.is_finite() && damping > 0.0 {
            damping.min(1.0)
        } else {
            1.0
        };
        Self {
            damping,
            rotate_speed,
            zoom_speed,
            min_distance: 0.01,
            theta_delta: 0.0,
            phi_delta: 0.0,
            zoom_scale: 1.0,
            dragging: false,
            cursor: None,
        }
    }

    pub fn with_min_distance(mut self, min_distance: f32) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// Queues a rotation for a cursor movement of `dx`/`dy` pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.theta_delta -= dx * self.rotate_speed;
        self.phi_delta -= dy * self.rotate_speed;
    }

    /// Positive `lines` move the camera towards the target.
    pub fn zoom(&mut self, lines: f32) {
        self.zoom_scale *= 0.95_f32.powf(self.zoom_speed * lines);
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_idle(&self) -> bool {
        self.theta_delta.abs() < SETTLE_EPSILON
            && self.phi_delta.abs() < SETTLE_EPSILON
            && (self.zoom_scale - 1.0).abs() < SETTLE_EPSILON
    }

    /// Feeds mouse input in. Returns whether the event was consumed.
    pub fn handle_window_events(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.set_dragging(*state == ElementState::Pressed);
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                let consumed = match (self.dragging, self.cursor) {
                    (true, Some(last)) => {
                        self.rotate((position.x - last.x) as f32, (position.y - last.y) as f32);
                        true
                    }
                    _ => false,
                };
                self.cursor = Some(*position);
                consumed
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.dragging = false;
                false
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                self.zoom(lines);
                true
            }
            _ => false,
        }
    }

    /// Applies pending input to the camera. Returns `false` and leaves the
    /// camera untouched when there is nothing to apply.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        if self.is_idle() {
            self.sync();
            return false;
        }
        let offset = camera.position - camera.target;
        let radius = offset.magnitude();
        let (theta, phi) = if radius > f32::EPSILON {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI / 2.0)
        };

        let theta = theta + self.theta_delta * self.damping;
        let phi = (phi + self.phi_delta * self.damping).clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        let radius = (radius * self.zoom_scale).max(self.min_distance);

        camera.position = camera.target
            + Vector3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );

        self.theta_delta *= 1.0 - self.damping;
        self.phi_delta *= 1.0 - self.damping;
        self.zoom_scale = 1.0;
        true
    }

    /// Drops all pending input; used after the camera was placed programmatically.
    pub fn sync(&mut self) {
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.zoom_scale = 1.0;
    }
}
