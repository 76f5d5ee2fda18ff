//! Decoded, CPU-resident model data.
//!
//! A [`GeometryContainer`] is what the decoders produce and what the scene
//! controller owns while a model is active: a tree of [`Node`]s (each with a
//! local [`Transform`] and optionally a [`Mesh`]), the material table the
//! meshes refer to, the cached [`BoundingVolume`] and the visibility flag.
//! GPU copies are created from it by [`GpuModel::upload`](crate::data_structures::gpu_model::GpuModel::upload).

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};

use crate::data_structures::{bounds::BoundingVolume, instance::Transform};

/// Anything that is uploaded as a vertex buffer describes its own layout.
pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Surface description of a mesh: a colour factor and an optional texture.
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub base_colour: [f32; 4],
    pub base_colour_texture: Option<image::RgbaImage>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_colour: [0.8, 0.8, 0.8, 1.0],
            base_colour_texture: None,
        }
    }
}

/// Indexed triangle list plus the index of its material.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: usize,
}

impl Mesh {
    pub fn is_drawable(&self) -> bool {
        !self.vertices.is_empty() && self.indices.len() >= 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: Option<String>,
    pub local: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: Option<String>, local: Transform) -> Self {
        Self {
            name,
            local,
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Pre-order walk handing every node its world matrix.
    pub fn visit_world(&self, parent: &Matrix4<f32>, visit: &mut dyn FnMut(&Node, &Matrix4<f32>)) {
        let world = parent * self.local.to_matrix();
        visit(self, &world);
        for child in &self.children {
            child.visit_world(&world, visit);
        }
    }

    /// Post-order release: children first, then this node's own mesh.
    fn dispose(&mut self, stats: &mut DisposeStats) {
        for mut child in self.children.drain(..) {
            child.dispose(stats);
        }
        if let Some(mesh) = self.mesh.take() {
            stats.meshes += 1;
            stats.vertices += mesh.vertices.len();
            stats.indices += mesh.indices.len();
        }
        stats.nodes += 1;
    }
}

/// What a disposal released; mostly useful for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposeStats {
    pub nodes: usize,
    pub meshes: usize,
    pub vertices: usize,
    pub indices: usize,
}

#[derive(Debug)]
pub struct GeometryContainer {
    name: String,
    root: Node,
    materials: Vec<Material>,
    bounds: BoundingVolume,
    visible: bool,
}

impl GeometryContainer {
    /// Wraps a decoded tree and computes its bounding volume.
    pub fn new(name: impl Into<String>, root: Node, materials: Vec<Material>) -> Self {
        let mut container = Self {
            name: name.into(),
            root,
            materials,
            bounds: BoundingVolume::empty(),
            visible: true,
        };
        container.recompute_bounds();
        container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    /// World-space positions of every vertex that takes part in a drawable mesh.
    pub fn world_positions(&self) -> Vec<Point3<f32>> {
        let mut points = Vec::new();
        self.root.visit_world(&Matrix4::identity(), &mut |node, world| {
            if let Some(mesh) = node.mesh.as_ref().filter(|mesh| mesh.is_drawable()) {
                points.extend(mesh.vertices.iter().map(|v| {
                    use cgmath::{EuclideanSpace, Transform as _};
                    world.transform_point(Point3::from_vec(v.position.into()))
                }));
            }
        });
        points
    }

    pub fn recompute_bounds(&mut self) -> &BoundingVolume {
        self.bounds = BoundingVolume::from_points(&self.world_positions());
        &self.bounds
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Flips the visibility flag and returns the new value.
    pub fn toggle_visibility(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    /// Number of meshes with at least one triangle.
    pub fn primitive_count(&self) -> usize {
        let mut count = 0;
        self.root.visit_world(&Matrix4::identity(), &mut |node, _| {
            if node.mesh.as_ref().is_some_and(Mesh::is_drawable) {
                count += 1;
            }
        });
        count
    }

    pub fn triangle_count(&self) -> usize {
        let mut count = 0;
        self.root.visit_world(&Matrix4::identity(), &mut |node, _| {
            count += node.mesh.as_ref().map_or(0, Mesh::triangle_count);
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        self.primitive_count() == 0
    }

    /// Releases all CPU-side vertex and index data with a post-order walk.
    pub fn dispose(mut self) -> DisposeStats {
        let mut stats = DisposeStats::default();
        self.root.dispose(&mut stats);
        self.materials.clear();
        log::debug!(
            "disposed {}: {} nodes, {} meshes, {} vertices",
            self.name,
            stats.nodes,
            stats.meshes,
            stats.vertices
        );
        stats
    }
}

/// Area-weighted smooth normals for meshes that come without them.
pub fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut accumulated = vec![Vector3::new(0.0_f32, 0.0, 0.0); vertices.len()];
    for c in indices.chunks_exact(3) {
        let (a, b, d) = (c[0] as usize, c[1] as usize, c[2] as usize);
        if a >= vertices.len() || b >= vertices.len() || d >= vertices.len() {
            continue;
        }
        let p0: Vector3<f32> = vertices[a].position.into();
        let p1: Vector3<f32> = vertices[b].position.into();
        let p2: Vector3<f32> = vertices[d].position.into();
        // Unnormalized cross product, its length is twice the triangle area
        let face = (p1 - p0).cross(p2 - p0);
        accumulated[a] += face;
        accumulated[b] += face;
        accumulated[d] += face;
    }
    for (vertex, normal) in vertices.iter_mut().zip(accumulated) {
        vertex.normal = if normal.magnitude2() > f32::EPSILON * f32::EPSILON {
            normal.normalize().into()
        } else {
            [0.0, 1.0, 0.0]
        };
    }
}
