//! Built-in probe arena used when no model file is given

use glam::Vec3;

use super::SUN_INTENSITY;
use crate::resources::{Material, Mesh};
use crate::scene::{DirectionalLight, Light, NodeId, Scene, ShadowSettings, Transform};

pub const FLOOR_SIZE: f32 = 30.0;
pub const FLOOR_COLOR: u32 = 0x108020;
pub const BOX_COLOR: u32 = 0x202020;

/// Nodes created by [`build_probe_arena`]
#[derive(Debug, Clone, Copy)]
pub struct ArenaNodes {
    pub root: NodeId,
    pub floor: NodeId,
    pub cube: NodeId,
}

/// A green floor with a dark box in the middle, lit by one shadowed sun
pub fn build_probe_arena(scene: &mut Scene) -> ArenaNodes {
    let root = scene.add_node("ProbeArena", Transform::default(), None);

    let floor_mesh = scene.add_mesh(Mesh::plane(FLOOR_SIZE, FLOOR_SIZE, 1));
    let floor_material = scene.add_material(Material::diffuse_hex("floor", FLOOR_COLOR));
    let floor = scene.add_mesh_node("Floor", Transform::default(), Some(root), floor_mesh, floor_material);

    let cube_mesh = scene.add_mesh(Mesh::cuboid(Vec3::splat(2.0)));
    let cube_material = scene.add_material(Material::diffuse_hex("box", BOX_COLOR));
    let cube = scene.add_mesh_node(
        "Box",
        Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
        Some(root),
        cube_mesh,
        cube_material,
    );

    scene.add_light(Light::Directional(
        DirectionalLight::new(Vec3::new(-0.4, -1.0, -0.6), Vec3::ONE, SUN_INTENSITY)
            .with_shadow(ShadowSettings::default()),
    ));

    log::debug!("Built probe arena");
    ArenaNodes { root, floor, cube }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_has_floor_box_and_sun() {
        let mut scene = Scene::new();
        let nodes = build_probe_arena(&mut scene);
        assert_eq!(scene.children(nodes.root).count(), 2);

        let cube = scene.world_matrix(nodes.cube).unwrap();
        assert!((cube.transform_point3(Vec3::ZERO) - Vec3::Y).length() < 1e-6);

        match scene.lights() {
            [Light::Directional(sun)] => {
                assert_eq!(sun.intensity, 3.0);
                assert!(sun.shadow.is_some());
            }
            other => panic!("unexpected lights {other:?}"),
        }
    }
}
