//! Scene management
//!
//! The scene is a flat arena of nodes linked by parent indices. A node's world
//! transform is its parent's world transform composed with its own local
//! transform, so moving a group node moves everything attached below it.

mod camera;
mod camera_controller;
mod light;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;
pub use transform::*;

use glam::{Mat4, Vec3};

use crate::resources::{Material, Mesh};

/// Handle to a node in a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a mesh stored in a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(usize);

/// Handle to a material stored in a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(usize);

/// Render layer mask
///
/// A node is drawn by a view only when their masks intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers(u32);

impl Layers {
    /// Regular scene content, seen by the main view and by probe captures
    pub const MAIN: Self = Self(1 << 0);
    /// Debug helpers, seen by the main view only
    pub const DEBUG: Self = Self(1 << 1);
    pub const ALL: Self = Self(u32::MAX);

    pub fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::MAIN
    }
}

impl std::ops::BitOr for Layers {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Mesh and material drawn at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInstance {
    pub mesh: MeshId,
    pub material: MaterialId,
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub parent: Option<NodeId>,
    pub visible: bool,
    pub layers: Layers,
    pub mesh: Option<MeshInstance>,
}

/// The scene containing all renderable content
pub struct Scene {
    nodes: Vec<Node>,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    lights: Vec<Light>,
    ambient: AmbientLight,
    background: Vec3,
    revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            meshes: Vec::new(),
            materials: Vec::new(),
            lights: Vec::new(),
            ambient: AmbientLight::default(),
            background: Vec3::ZERO,
            revision: 0,
        }
    }

    /// Geometry revision, bumped whenever nodes or meshes change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Add an empty group node
    pub fn add_node(&mut self, name: &str, transform: Transform, parent: Option<NodeId>) -> NodeId {
        let parent = match parent {
            Some(p) if self.contains(p) => Some(p),
            Some(p) => {
                log::warn!("Node '{}' has unknown parent {:?}, attaching to root", name, p);
                None
            }
            None => None,
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            transform,
            parent,
            visible: true,
            layers: Layers::MAIN,
            mesh: None,
        });
        self.revision += 1;
        id
    }

    /// Add a node that draws `mesh` with `material`
    pub fn add_mesh_node(
        &mut self,
        name: &str,
        transform: Transform,
        parent: Option<NodeId>,
        mesh: MeshId,
        material: MaterialId,
    ) -> NodeId {
        let id = self.add_node(name, transform, parent);
        self.nodes[id.0].mesh = Some(MeshInstance { mesh, material });
        id
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.meshes.len());
        self.meshes.push(mesh);
        self.revision += 1;
        id
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(material);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let node = self.nodes.get_mut(id.0)?;
        self.revision += 1;
        Some(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes()
            .filter(move |(_, node)| node.parent == Some(id))
            .map(|(child, _)| child)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id.0)
    }

    /// Compose local transforms from the root down to `id`
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.node(id)?;
        let mut matrix = node.transform.matrix();
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            matrix = node.transform.matrix() * matrix;
        }
        Some(matrix)
    }

    /// A node is visible only if it and all of its ancestors are
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.node(node_id) {
                Some(node) if node.visible => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [Light] {
        &mut self.lights
    }

    /// Set the intensity of every directional light
    pub fn set_directional_intensity(&mut self, intensity: f32) -> usize {
        let mut changed = 0;
        for light in &mut self.lights {
            if let Light::Directional(directional) = light {
                directional.intensity = intensity;
                changed += 1;
            }
        }
        changed
    }

    pub fn ambient(&self) -> &AmbientLight {
        &self.ambient
    }

    pub fn set_ambient(&mut self, ambient: AmbientLight) {
        self.ambient = ambient;
    }

    /// Radiance returned by rays that escape the scene
    pub fn background(&self) -> Vec3 {
        self.background
    }

    pub fn set_background(&mut self, color: Vec3) {
        self.background = color;
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_matrix_composes_parent_chain() {
        let mut scene = Scene::new();
        let root = scene.add_node("root", Transform::from_position(Vec3::new(0.0, 2.0, 0.0)), None);
        let child = scene.add_node("child", Transform::from_position(Vec3::new(1.0, 0.0, 0.0)), Some(root));
        let world = scene.world_matrix(child).unwrap();
        assert!((world.transform_point3(Vec3::ZERO) - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn hidden_parent_hides_children() {
        let mut scene = Scene::new();
        let root = scene.add_node("root", Transform::default(), None);
        let child = scene.add_node("child", Transform::default(), Some(root));
        scene.node_mut(root).unwrap().visible = false;
        assert!(!scene.is_visible(child));
    }

    #[test]
    fn mutation_bumps_revision() {
        let mut scene = Scene::new();
        let node = scene.add_node("n", Transform::default(), None);
        let before = scene.revision();
        scene.node_mut(node).unwrap().transform.translate(Vec3::X);
        assert!(scene.revision() > before);
    }

    #[test]
    fn layers_intersect() {
        assert!(Layers::ALL.intersects(Layers::DEBUG));
        assert!(!Layers::MAIN.intersects(Layers::DEBUG));
        assert!((Layers::MAIN | Layers::DEBUG).intersects(Layers::DEBUG));
    }
}
