//! Bounding volume hierarchy over world-space triangles

use std::cell::Cell;

use glam::{Mat3, Vec3};

use crate::scene::{Layers, MaterialId, Ray, Scene};

const LEAF_SIZE: usize = 4;
const PARALLEL_EPSILON: f32 = 1e-8;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |b, p| b.grow(*p))
    }

    pub fn grow(self, p: Vec3) -> Self {
        Self {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Slab test; returns the entry distance when the ray overlaps `[t_min, t_max]`
    pub fn hit(&self, ray: &Ray, inv_dir: Vec3, t_min: f32, t_max: f32) -> Option<f32> {
        let t0 = (self.min - ray.origin) * inv_dir;
        let t1 = (self.max - ray.origin) * inv_dir;
        let near = t0.min(t1).max_element().max(t_min);
        let far = t0.max(t1).min_element().min(t_max);
        (near <= far).then_some(near)
    }
}

/// Triangle flattened into world space
#[derive(Debug, Clone, Copy)]
pub struct WorldTriangle {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
    pub material: MaterialId,
}

impl WorldTriangle {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }

    /// Möller–Trumbore intersection returning `(t, u, v)`
    fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<(f32, f32, f32)> {
        let [v0, v1, v2] = self.positions;
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let pvec = ray.direction.cross(e2);
        let det = e1.dot(pvec);
        if det.abs() < PARALLEL_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.origin - v0;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(e1);
        let v = ray.direction.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(qvec) * inv_det;
        (t >= t_min && t <= t_max).then_some((t, u, v))
    }
}

/// Closest intersection along a ray
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub position: Vec3,
    /// Interpolated shading normal, flipped to face the incoming ray
    pub normal: Vec3,
    pub material: MaterialId,
}

#[derive(Debug, Clone)]
struct BvhNode {
    bounds: Aabb,
    /// Child indices; `None` for leaves
    children: Option<(usize, usize)>,
    start: usize,
    count: usize,
}

/// Median-split BVH
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    triangles: Vec<WorldTriangle>,
    indices: Vec<usize>,
    nodes: Vec<BvhNode>,
    root: usize,
}

impl Bvh {
    pub fn build(triangles: Vec<WorldTriangle>) -> Self {
        let bounds: Vec<Aabb> = triangles.iter().map(WorldTriangle::bounds).collect();
        let mut indices: Vec<usize> = (0..triangles.len()).collect();
        let mut nodes = Vec::new();
        let root = if triangles.is_empty() {
            0
        } else {
            build_range(&mut nodes, &mut indices, &bounds, 0, triangles.len())
        };
        Self {
            triangles,
            indices,
            nodes,
            root,
        }
    }

    /// Flatten every visible mesh node whose layers intersect `layers`
    pub fn from_scene(scene: &Scene, layers: Layers) -> Self {
        let mut triangles = Vec::new();
        for (id, node) in scene.nodes() {
            let Some(instance) = node.mesh else {
                continue;
            };
            if !node.layers.intersects(layers) || !scene.is_visible(id) {
                continue;
            }
            let (Some(mesh), Some(world)) = (scene.mesh(instance.mesh), scene.world_matrix(id)) else {
                continue;
            };
            let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
            for tri in mesh.triangles() {
                triangles.push(WorldTriangle {
                    positions: tri.map(|v| world.transform_point3(v.position)),
                    normals: tri.map(|v| (normal_matrix * v.normal).normalize_or_zero()),
                    material: instance.material,
                });
            }
        }
        Self::build(triangles)
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes
            .get(self.root)
            .map_or(Aabb::EMPTY, |node| node.bounds)
    }

    pub fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        let mut best: Option<(usize, f32, f32, f32)> = None;
        let closest = Cell::new(t_max);
        self.traverse(ray, t_min, || closest.get(), |index, t, u, v| {
            if t < closest.get() {
                closest.set(t);
                best = Some((index, t, u, v));
            }
            false
        });

        let (index, t, u, v) = best?;
        let tri = &self.triangles[index];
        let [n0, n1, n2] = tri.normals;
        let mut normal = (n0 * (1.0 - u - v) + n1 * u + n2 * v).normalize_or_zero();
        if normal == Vec3::ZERO {
            let [v0, v1, v2] = tri.positions;
            normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        }
        if normal.dot(ray.direction) > 0.0 {
            normal = -normal;
        }
        Some(Hit {
            t,
            position: ray.at(t),
            normal,
            material: tri.material,
        })
    }

    /// True when anything blocks the ray within `[t_min, t_max]`
    pub fn occluded(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        let mut hit = false;
        self.traverse(ray, t_min, || t_max, |_, _, _, _| {
            hit = true;
            true
        });
        hit
    }

    /// Walk nodes front to back; `visit` returns true to stop early
    fn traverse(
        &self,
        ray: &Ray,
        t_min: f32,
        mut t_max: impl FnMut() -> f32,
        mut visit: impl FnMut(usize, f32, f32, f32) -> bool,
    ) {
        if self.nodes.is_empty() {
            return;
        }
        // keep zero components finite so slab products never produce NaN
        let tiny = Vec3::splat(PARALLEL_EPSILON);
        let direction = Vec3::select(ray.direction.abs().cmplt(tiny), tiny.copysign(ray.direction), ray.direction);
        let inv_dir = direction.recip();
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.bounds.hit(ray, inv_dir, t_min, t_max()).is_none() {
                continue;
            }
            match node.children {
                None => {
                    for &tri in &self.indices[node.start..node.start + node.count] {
                        if let Some((t, u, v)) = self.triangles[tri].intersect(ray, t_min, t_max()) {
                            if visit(tri, t, u, v) {
                                return;
                            }
                        }
                    }
                }
                Some((left, right)) => {
                    let limit = t_max();
                    let l = self.nodes[left].bounds.hit(ray, inv_dir, t_min, limit);
                    let r = self.nodes[right].bounds.hit(ray, inv_dir, t_min, limit);
                    // push the farther child first so the nearer one pops next
                    match (l, r) {
                        (Some(ln), Some(rn)) if ln <= rn => stack.extend([right, left]),
                        (Some(_), Some(_)) => stack.extend([left, right]),
                        (Some(_), None) => stack.push(left),
                        (None, Some(_)) => stack.push(right),
                        (None, None) => {}
                    }
                }
            }
        }
    }
}

fn build_range(
    nodes: &mut Vec<BvhNode>,
    indices: &mut [usize],
    bounds: &[Aabb],
    start: usize,
    end: usize,
) -> usize {
    let range = &mut indices[start..end];
    let node_bounds = range
        .iter()
        .fold(Aabb::EMPTY, |b, &i| b.union(bounds[i]));
    let count = end - start;

    if count <= LEAF_SIZE {
        nodes.push(BvhNode {
            bounds: node_bounds,
            children: None,
            start,
            count,
        });
        return nodes.len() - 1;
    }

    let centroids = range
        .iter()
        .fold(Aabb::EMPTY, |b, &i| b.grow(bounds[i].centroid()));
    let extent = centroids.max - centroids.min;
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };
    range.sort_by(|&a, &b| {
        bounds[a].centroid()[axis]
            .partial_cmp(&bounds[b].centroid()[axis])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mid = start + count / 2;
    let left = build_range(nodes, indices, bounds, start, mid);
    let right = build_range(nodes, indices, bounds, mid, end);
    nodes.push(BvhNode {
        bounds: node_bounds,
        children: Some((left, right)),
        start,
        count,
    });
    nodes.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, Mesh};
    use crate::scene::Transform;

    fn floor_scene() -> Scene {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::plane(10.0, 10.0, 4));
        let material = scene.add_material(Material::default());
        scene.add_mesh_node("floor", Transform::default(), None, mesh, material);
        scene
    }

    #[test]
    fn ray_down_hits_floor() {
        let bvh = Bvh::from_scene(&floor_scene(), Layers::ALL);
        assert_eq!(bvh.len(), 32);

        let ray = Ray::new(Vec3::new(1.3, 2.0, -0.7), Vec3::NEG_Y);
        let hit = bvh.closest_hit(&ray, 0.0, 100.0).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn normal_faces_the_ray_from_below() {
        let bvh = Bvh::from_scene(&floor_scene(), Layers::ALL);
        let ray = Ray::new(Vec3::new(0.2, -1.0, 0.2), Vec3::Y);
        let hit = bvh.closest_hit(&ray, 0.0, 100.0).unwrap();
        assert!((hit.normal - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn t_range_clips_hits() {
        let bvh = Bvh::from_scene(&floor_scene(), Layers::ALL);
        let ray = Ray::new(Vec3::new(0.3, 2.0, 0.1), Vec3::NEG_Y);
        assert!(bvh.closest_hit(&ray, 0.0, 1.5).is_none());
        assert!(!bvh.occluded(&ray, 0.0, 1.5));
        assert!(bvh.occluded(&ray, 0.0, 2.5));
    }

    #[test]
    fn layers_filter_geometry() {
        let mut scene = floor_scene();
        let (id, _) = scene.nodes().next().unwrap();
        scene.node_mut(id).unwrap().layers = Layers::DEBUG;
        assert!(Bvh::from_scene(&scene, Layers::MAIN).is_empty());
        assert!(!Bvh::from_scene(&scene, Layers::ALL).is_empty());
    }

    #[test]
    fn closest_of_stacked_boxes_wins() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::cuboid(Vec3::ONE));
        let near = scene.add_material(Material::new("near"));
        let far = scene.add_material(Material::new("far"));
        scene.add_mesh_node("far", Transform::from_position(Vec3::new(0.0, 0.0, -5.0)), None, mesh, far);
        scene.add_mesh_node("near", Transform::from_position(Vec3::new(0.0, 0.0, -2.0)), None, mesh, near);

        let bvh = Bvh::from_scene(&scene, Layers::ALL);
        let hit = bvh
            .closest_hit(&Ray::new(Vec3::new(0.1, 0.2, 0.0), Vec3::NEG_Z), 0.0, 100.0)
            .unwrap();
        assert_eq!(hit.material, near);
        assert!((hit.t - 1.5).abs() < 1e-5);
    }
}
