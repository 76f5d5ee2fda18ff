//! The fixed three-light rig and its uniform buffer.

use wgpu::util::DeviceExt;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// `0xRRGGBB`, sRGB encoded.
    pub colour: u32,
    pub intensity: f32,
    /// Position the light shines from; it always points at the origin.
    pub from: [f32; 3],
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightRig {
    pub ambient_colour: u32,
    pub ambient_intensity: f32,
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
}

impl LightRig {
    /// One soft ambient term, a key light from the upper front right and a
    /// dimmer fill from the opposite side.
    pub const STANDARD: LightRig = LightRig {
        ambient_colour: 0x404040,
        ambient_intensity: 1.0,
        key: DirectionalLight {
            colour: 0xffffff,
            intensity: 0.8,
            from: [1.0, 1.0, 1.0],
        },
        fill: DirectionalLight {
            colour: 0xffffff,
            intensity: 0.5,
            from: [-1.0, -1.0, -1.0],
        },
    };

    pub fn uniform(&self) -> LightUniform {
        let scaled = |hex: u32, intensity: f32| {
            let [r, g, b] = srgb_hex_to_linear(hex);
            [r * intensity, g * intensity, b * intensity, 1.0]
        };
        let direction = |from: [f32; 3]| [from[0], from[1], from[2], 0.0];
        LightUniform {
            ambient: scaled(self.ambient_colour, self.ambient_intensity),
            key_direction: direction(self.key.from),
            key_colour: scaled(self.key.colour, self.key.intensity),
            fill_direction: direction(self.fill.from),
            fill_colour: scaled(self.fill.colour, self.fill.intensity),
        }
    }
}

impl Default for LightRig {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Converts a `0xRRGGBB` colour to linear RGB, the space the shader lights in.
pub fn srgb_hex_to_linear(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [channel(16), channel(8), channel(0)]
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub ambient: [f32; 4],
    pub key_direction: [f32; 4],
    pub key_colour: [f32; 4],
    pub fill_direction: [f32; 4],
    pub fill_colour: [f32; 4],
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, rig: &LightRig) -> Self {
        let uniform = rig.uniform();
        let buffer = mk_buffer(device, uniform);
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer);
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn destroy(&self) {
        self.buffer.destroy();
    }
}

pub fn mk_buffer(device: &wgpu::Device, light_uniform: LightUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Light Buffer"),
        contents: bytemuck::cast_slice(&[light_uniform]),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
        label: Some("light_bind_group"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn white_and_black_convert_exactly() {
        assert_eq!(srgb_hex_to_linear(0xffffff), [1.0, 1.0, 1.0]);
        assert_eq!(srgb_hex_to_linear(0x000000), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn standard_rig_uniform() {
        let uniform = LightRig::STANDARD.uniform();
        // 0x40 is about 0.051 in linear space
        assert_relative_eq!(uniform.ambient[0], 0.0513, epsilon = 1e-3);
        assert_relative_eq!(uniform.key_colour[0], 0.8);
        assert_relative_eq!(uniform.fill_colour[2], 0.5);
        assert_eq!(uniform.key_direction, [1.0, 1.0, 1.0, 0.0]);
        assert_eq!(uniform.fill_direction, [-1.0, -1.0, -1.0, 0.0]);
    }
}
