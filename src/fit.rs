//! Camera placement that frames a bounding volume.

use std::f32::consts::PI;

use cgmath::{Rad, Vector3};

use crate::{camera::CameraPose, data_structures::bounds::BoundingVolume};

/// Extra room around the model, as a factor on the tight-fit distance.
pub const DEFAULT_PADDING: f32 = 1.2;
/// Distance used when the volume has no extent (empty or single point geometry).
pub const MIN_DISTANCE: f32 = 1.0;

const MIN_FOV: f32 = 1e-3;
const MAX_FOV: f32 = PI - 1e-3;

/// Places the camera so the bounding sphere fits inside the vertical field of view.
///
/// The camera sits above and in front of the center (`+y` up, `+z` towards the
/// viewer) at `radius / sin(fov / 2) * padding`, looking at the center. The
/// result is always finite.
pub fn fit(volume: &BoundingVolume, fovy: Rad<f32>, padding: f32) -> CameraPose {
    let center = volume.center();
    let radius = volume.radius();
    let fovy = if fovy.0.is_finite() {
        fovy.0.clamp(MIN_FOV, MAX_FOV)
    } else {
        MIN_FOV
    };
    let padding = if padding.is_finite() && padding > 0.0 {
        padding
    } else {
        DEFAULT_PADDING
    };

    let distance = if radius.is_finite() && radius > 0.0 {
        let distance = radius / (fovy / 2.0).sin() * padding;
        if distance.is_finite() { distance } else { f32::MAX.sqrt() }
    } else {
        MIN_DISTANCE
    };

    CameraPose {
        position: center + Vector3::new(0.0, distance * 0.5, distance),
        look_at: center,
        distance,
    }
}
