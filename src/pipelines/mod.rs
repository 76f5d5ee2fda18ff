//! Render pipelines and their bind group layouts.
//!
//! - `basic` builds the lit model pipeline (group 0 material, 1 camera, 2 lights)
//! - `light` holds the fixed light rig and its uniform

pub mod basic;
pub mod light;
