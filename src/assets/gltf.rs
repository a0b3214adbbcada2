//! glTF model loading
//!
//! Models are parsed on a worker thread into a [`ModelData`], which only holds
//! plain CPU data. The main thread then instantiates it into the scene, so the
//! scene itself never crosses threads.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use glam::{Mat4, Vec3};
use gltf_dep::khr_lights_punctual::Kind;

use super::{AssetError, AssetResult, LoadingManager, SUN_INTENSITY};
use crate::resources::{Material, Mesh};
use crate::scene::{DirectionalLight, Light, NodeId, PointLight, Scene, ShadowSettings, Transform};

/// One drawable primitive, already placed relative to the model root
#[derive(Debug, Clone)]
pub struct ModelMesh {
    pub node_name: String,
    pub mesh: Mesh,
    pub material: Material,
    pub transform: Mat4,
}

/// CPU-side contents of a loaded model
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub path: PathBuf,
    pub meshes: Vec<ModelMesh>,
    pub lights: Vec<Light>,
}

impl ModelData {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.mesh.triangle_count()).sum()
    }

    /// Add the model under a new root node and register its lights
    pub fn instantiate(self, scene: &mut Scene, parent: Option<NodeId>) -> NodeId {
        let name = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        let root = scene.add_node(&name, Transform::default(), parent);

        let mesh_count = self.meshes.len();
        let light_count = self.lights.len();
        for part in self.meshes {
            let mesh = scene.add_mesh(part.mesh);
            let material = scene.add_material(part.material);
            scene.add_mesh_node(
                &part.node_name,
                Transform::from_matrix(part.transform),
                Some(root),
                mesh,
                material,
            );
        }
        for light in self.lights {
            scene.add_light(light);
        }

        log::info!(
            "Added model '{}' ({} meshes, {} lights)",
            name,
            mesh_count,
            light_count
        );
        root
    }
}

/// A model load running on a worker thread
pub struct PendingModel {
    path: PathBuf,
    handle: JoinHandle<AssetResult<ModelData>>,
}

impl PendingModel {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take its result
    pub fn join(self) -> AssetResult<ModelData> {
        let name = self.path.display().to_string();
        self.handle
            .join()
            .map_err(|_| AssetError::LoaderPanicked(name))?
    }
}

/// Load `path` on a worker thread, tracked by `manager`
pub fn spawn_load(manager: &LoadingManager, path: impl Into<PathBuf>) -> PendingModel {
    let path = path.into();
    let ticket = manager.begin(path.display().to_string());
    let worker_path = path.clone();

    let handle = std::thread::spawn(move || {
        let result = load_model(&worker_path);
        match &result {
            Ok(_) => ticket.complete(),
            Err(err) => ticket.fail(err.to_string()),
        }
        result
    });

    PendingModel { path, handle }
}

/// Parse a `.gltf`/`.glb` file into scene-ready data
pub fn load_model(path: &Path) -> AssetResult<ModelData> {
    let (document, buffers, _images) =
        gltf_dep::import(path).map_err(|e| AssetError::Import {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::EmptyModel {
            path: path.to_path_buf(),
        })?;

    let mut model = ModelData {
        path: path.to_path_buf(),
        ..Default::default()
    };
    for node in scene.nodes() {
        load_node(&node, Mat4::IDENTITY, &buffers, &mut model)?;
    }

    log::debug!(
        "Parsed {}: {} meshes, {} triangles, {} lights",
        path.display(),
        model.meshes.len(),
        model.triangle_count(),
        model.lights.len()
    );
    Ok(model)
}

fn load_node(
    node: &gltf_dep::Node<'_>,
    parent: Mat4,
    buffers: &[gltf_dep::buffer::Data],
    model: &mut ModelData,
) -> AssetResult<()> {
    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
    let world = parent * local;
    let node_name = node
        .name()
        .map(String::from)
        .unwrap_or_else(|| format!("node{}", node.index()));

    if let Some(mesh) = node.mesh() {
        for (index, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf_dep::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive {} of mesh '{}'",
                    primitive.mode(),
                    index,
                    node_name
                );
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
            let Some(positions) = reader.read_positions() else {
                log::warn!("Primitive {} of mesh '{}' has no positions", index, node_name);
                continue;
            };
            let positions: Vec<Vec3> = positions.map(Vec3::from).collect();
            let normals = reader
                .read_normals()
                .map(|normals| normals.map(Vec3::from).collect());
            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            model.meshes.push(ModelMesh {
                node_name: node_name.clone(),
                mesh: Mesh::from_streams(&node_name, positions, normals, indices),
                material: convert_material(&primitive.material()),
                transform: world,
            });
        }
    }

    if let Some(light) = node.light() {
        let color = Vec3::from(light.color());
        match light.kind() {
            Kind::Directional => {
                // punctual lights shine down their node's -Z axis
                let direction = world.transform_vector3(Vec3::NEG_Z);
                model.lights.push(Light::Directional(
                    DirectionalLight::new(direction, color, SUN_INTENSITY)
                        .with_shadow(ShadowSettings::default()),
                ));
            }
            Kind::Point => {
                let position = world.transform_point3(Vec3::ZERO);
                model.lights.push(Light::Point(PointLight::new(
                    position,
                    color,
                    light.intensity(),
                    light.range().unwrap_or(0.0),
                )));
            }
            Kind::Spot { .. } => {
                log::warn!("Spot light on '{}' is not supported, skipping", node_name);
            }
        }
    }

    for child in node.children() {
        load_node(&child, world, buffers, model)?;
    }
    Ok(())
}

fn convert_material(material: &gltf_dep::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _] = pbr.base_color_factor();
    Material::new(material.name().unwrap_or("gltf-material"))
        .with_base_color(Vec3::new(r, g, b))
        .with_emissive(Vec3::from(material.emissive_factor()), 1.0)
}
