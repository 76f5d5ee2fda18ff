//! GPU-resident copy of a [`GeometryContainer`].
//!
//! [`GpuModel::upload`] mirrors the container's node tree: every node with a
//! drawable mesh gets a vertex buffer, an index buffer and a one-element
//! instance buffer holding its world matrix. Materials become bind groups
//! (base colour texture, sampler, colour factor). [`GpuModel::destroy`] walks
//! the tree post-order and frees every buffer and texture exactly once.

use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::data_structures::{
    geometry::{GeometryContainer, Material, Mesh, Node},
    instance::InstanceRaw,
    texture::Texture,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    base_colour: [f32; 4],
}

#[derive(Debug)]
pub struct GpuMaterial {
    pub name: String,
    texture: Texture,
    uniform: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl GpuMaterial {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material: &Material,
        layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let texture = match &material.base_colour_texture {
            Some(rgba) => Texture::from_rgba(device, queue, rgba, Some(&material.name)),
            None => Texture::create_white(device, queue),
        };
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", material.name)),
            contents: bytemuck::cast_slice(&[MaterialUniform {
                base_colour: material.base_colour,
            }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sampler = texture
            .sampler
            .clone()
            .unwrap_or_else(|| crate::data_structures::texture::create_default_sampler(device));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
            label: Some(&material.name),
        });
        Self {
            name: material.name.clone(),
            texture,
            uniform,
            bind_group,
        }
    }

    fn destroy(&self) {
        self.texture.destroy();
        self.uniform.destroy();
    }
}

#[derive(Debug)]
pub struct GpuMesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub instance_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, mesh: &Mesh, world: &Matrix4<f32>) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", mesh.name)),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", mesh.name)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Instance Buffer", mesh.name)),
            contents: bytemuck::cast_slice(&[InstanceRaw::from_world(world)]),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            name: mesh.name.clone(),
            vertex_buffer,
            index_buffer,
            instance_buffer,
            num_elements: mesh.indices.len() as u32,
            material: mesh.material,
        }
    }

    fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.instance_buffer.destroy();
    }
}

#[derive(Debug, Default)]
pub struct GpuNode {
    pub mesh: Option<GpuMesh>,
    pub children: Vec<GpuNode>,
}

impl GpuNode {
    fn upload(device: &wgpu::Device, node: &Node, parent: &Matrix4<f32>) -> Self {
        let world = parent * node.local.to_matrix();
        let mesh = node
            .mesh
            .as_ref()
            .filter(|mesh| mesh.is_drawable())
            .map(|mesh| GpuMesh::new(device, mesh, &world));
        let children = node
            .children
            .iter()
            .map(|child| GpuNode::upload(device, child, &world))
            .collect();
        Self { mesh, children }
    }

    fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, materials: &[GpuMaterial]) {
        if let Some(mesh) = &self.mesh {
            render_pass.draw_mesh(mesh, materials);
        }
        for child in &self.children {
            child.draw(render_pass, materials);
        }
    }

    fn destroy(self) -> usize {
        let mut released = 0;
        for child in self.children {
            released += child.destroy();
        }
        if let Some(mesh) = self.mesh {
            mesh.destroy();
            released += 1;
        }
        released
    }
}

/// A model as it lives on the GPU; built once per attach.
#[derive(Debug)]
pub struct GpuModel {
    pub name: String,
    root: GpuNode,
    materials: Vec<GpuMaterial>,
}

impl GpuModel {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        container: &GeometryContainer,
        material_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let mut materials: Vec<GpuMaterial> = container
            .materials()
            .iter()
            .map(|material| GpuMaterial::new(device, queue, material, material_layout))
            .collect();
        // Meshes always reference some material, even when the file had none
        if materials.is_empty() {
            materials.push(GpuMaterial::new(
                device,
                queue,
                &Material::default(),
                material_layout,
            ));
        }
        let root = GpuNode::upload(device, container.root(), &Matrix4::identity());
        Self {
            name: container.name().to_string(),
            root,
            materials,
        }
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.root.draw(render_pass, &self.materials);
    }

    /// Post-order release of every mesh buffer, then the materials.
    /// Returns how many meshes were released.
    pub fn destroy(self) -> usize {
        let released = self.root.destroy();
        for material in &self.materials {
            material.destroy();
        }
        log::debug!(
            "released GPU resources of {}: {} meshes, {} materials",
            self.name,
            released,
            self.materials.len()
        );
        released
    }
}

pub trait DrawModel {
    fn draw_mesh(&mut self, mesh: &GpuMesh, materials: &[GpuMaterial]);
}

impl DrawModel for wgpu::RenderPass<'_> {
    fn draw_mesh(&mut self, mesh: &GpuMesh, materials: &[GpuMaterial]) {
        let Some(material) = materials.get(mesh.material).or_else(|| materials.first()) else {
            log::warn!("mesh {} has no material to draw with", mesh.name);
            return;
        };
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_vertex_buffer(1, mesh.instance_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, 0..1);
    }
}
