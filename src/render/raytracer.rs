//! Ray casting renderer for probe captures and the camera view

use std::f32::consts::FRAC_1_PI;
use std::sync::Arc;

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use super::{Bvh, Framebuffer, Hit, RenderSettings, RenderStats};
use crate::capture::{CaptureError, CaptureResult, CubeCamera, CubeFace, CubeRenderTarget, SceneCapture};
use crate::probe::LightProbeGroup;
use crate::resources::{Material, Shading};
use crate::scene::{Camera, Layers, Light, Ray, Scene};

/// Smallest offset used to lift shadow rays off the surface
const SHADOW_EPSILON: f32 = 1e-3;

struct CachedBvh {
    revision: u64,
    layers: Layers,
    bvh: Arc<Bvh>,
}

/// CPU renderer implementing both scene capture and view rendering
pub struct SoftwareRenderer {
    settings: RenderSettings,
    cache: Vec<CachedBvh>,
    stats: RenderStats,
}

impl SoftwareRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            cache: Vec::new(),
            stats: RenderStats::default(),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Acceleration structure for `layers`, rebuilt when the scene changed
    pub fn bvh(&mut self, scene: &Scene, layers: Layers) -> Arc<Bvh> {
        let revision = scene.revision();
        if let Some(cached) = self.cache.iter().find(|c| c.layers == layers) {
            if cached.revision == revision {
                return Arc::clone(&cached.bvh);
            }
        }

        let bvh = Arc::new(Bvh::from_scene(scene, layers));
        self.stats.bvh_builds += 1;
        log::trace!(
            "Rebuilt BVH for {:?}: {} triangles (revision {})",
            layers,
            bvh.len(),
            revision
        );

        self.cache.retain(|c| c.layers != layers);
        self.cache.push(CachedBvh {
            revision,
            layers,
            bvh: Arc::clone(&bvh),
        });
        bvh
    }

    /// Render the camera view, lighting surfaces with `lighting` when given
    pub fn render_view(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        lighting: Option<&LightProbeGroup>,
        target: &mut Framebuffer,
    ) {
        let bvh = self.bvh(scene, Layers::ALL);
        let lighting = lighting.filter(|_| self.settings.probe_lighting);
        let ctx = ShadeContext {
            scene,
            bvh: &bvh,
            settings: &self.settings,
            lighting,
        };

        let width = target.width();
        let height = target.height();
        if width == 0 || height == 0 {
            return;
        }
        let inverse_view_projection = camera.view_projection_matrix().inverse();
        let far = camera.projection.far();
        let exposure = self.settings.exposure;

        let rays: u64 = target
            .pixels_mut()
            .par_chunks_mut(width as usize)
            .enumerate()
            .map(|(y, row)| {
                let mut rays = 0;
                for (x, pixel) in row.iter_mut().enumerate() {
                    let ndc = Vec2::new(
                        (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
                        1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
                    );
                    let ray = camera.ray_through(ndc, &inverse_view_projection);
                    *pixel = ctx.trace(&ray, 0.0, far, &mut rays) * exposure;
                }
                rays
            })
            .sum();

        self.stats.rays_traced += rays;
        self.stats.frames += 1;
    }
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new(RenderSettings::default())
    }
}

impl SceneCapture for SoftwareRenderer {
    fn capture(
        &mut self,
        scene: &Scene,
        camera: &CubeCamera,
        target: &mut CubeRenderTarget,
    ) -> CaptureResult<()> {
        if !camera.position.is_finite() {
            return Err(CaptureError::Renderer(format!(
                "capture position {} is not finite",
                camera.position
            )));
        }

        // probe markers never see themselves, and captures use direct light only
        let bvh = self.bvh(scene, Layers::MAIN);
        let ctx = ShadeContext {
            scene,
            bvh: &bvh,
            settings: &self.settings,
            lighting: None,
        };

        let resolution = target.resolution();
        let mut rays = 0;
        for face in CubeFace::ALL {
            rays += target
                .face_mut(face)
                .par_chunks_mut(resolution as usize)
                .enumerate()
                .map(|(row, texels)| {
                    let mut rays = 0;
                    for (col, texel) in texels.iter_mut().enumerate() {
                        let coord = face.texel_direction(resolution, col as u32, row as u32);
                        // clip planes are perpendicular to the face axis
                        let scale = coord.length();
                        let ray = Ray::new(camera.position, coord / scale);
                        *texel = ctx.trace(&ray, camera.near * scale, camera.far * scale, &mut rays);
                    }
                    rays
                })
                .sum::<u64>();
        }

        self.stats.rays_traced += rays;
        self.stats.captures += 1;
        Ok(())
    }
}

struct ShadeContext<'a> {
    scene: &'a Scene,
    bvh: &'a Bvh,
    settings: &'a RenderSettings,
    lighting: Option<&'a LightProbeGroup>,
}

impl ShadeContext<'_> {
    fn trace(&self, ray: &Ray, t_min: f32, t_max: f32, rays: &mut u64) -> Vec3 {
        *rays += 1;
        match self.bvh.closest_hit(ray, t_min, t_max) {
            Some(hit) => self.shade(&hit, rays),
            None => self.scene.background(),
        }
    }

    fn shade(&self, hit: &Hit, rays: &mut u64) -> Vec3 {
        let fallback;
        let material = match self.scene.material(hit.material) {
            Some(material) => material,
            None => {
                fallback = Material::default();
                &fallback
            }
        };

        match &material.shading {
            Shading::Unlit => material.base_color + material.emitted(),
            Shading::Irradiance { sh, intensity } => {
                sh.irradiance_at(hit.normal) * FRAC_1_PI * *intensity
            }
            Shading::Lit => {
                let albedo = material.base_color;
                let mut irradiance = self.scene.ambient().radiance();
                for light in self.scene.lights() {
                    irradiance += self.direct_light(light, hit, rays);
                }
                let mut color = material.emitted() + albedo * irradiance;
                if let Some(probe) = self.lighting.and_then(|g| g.irradiance_at(hit.position, hit.normal)) {
                    color += albedo * probe * FRAC_1_PI;
                }
                color
            }
        }
    }

    fn direct_light(&self, light: &Light, hit: &Hit, rays: &mut u64) -> Vec3 {
        match light {
            Light::Directional(sun) => {
                if sun.intensity <= 0.0 {
                    return Vec3::ZERO;
                }
                let to_light = -sun.direction;
                let n_dot_l = hit.normal.dot(to_light);
                if n_dot_l <= 0.0 {
                    return Vec3::ZERO;
                }
                if let (true, Some(shadow)) = (self.settings.shadows, sun.shadow) {
                    let (a, b) = to_light.any_orthonormal_pair();
                    let inside = hit.position.dot(a).abs() <= shadow.range
                        && hit.position.dot(b).abs() <= shadow.range;
                    if inside {
                        let origin = hit.position + hit.normal * shadow.bias.max(SHADOW_EPSILON);
                        *rays += 1;
                        if self.bvh.occluded(&Ray::new(origin, to_light), 0.0, shadow.far) {
                            return Vec3::ZERO;
                        }
                    }
                }
                sun.color * sun.intensity * n_dot_l
            }
            Light::Point(point) => {
                if point.intensity <= 0.0 {
                    return Vec3::ZERO;
                }
                let offset = point.position - hit.position;
                let distance = offset.length();
                if distance <= f32::EPSILON {
                    return Vec3::ZERO;
                }
                let to_light = offset / distance;
                let n_dot_l = hit.normal.dot(to_light);
                if n_dot_l <= 0.0 {
                    return Vec3::ZERO;
                }
                if self.settings.shadows && point.cast_shadows {
                    let origin = hit.position + hit.normal * SHADOW_EPSILON;
                    *rays += 1;
                    if self.bvh.occluded(&Ray::new(origin, to_light), 0.0, distance - SHADOW_EPSILON) {
                        return Vec3::ZERO;
                    }
                }
                point.color * point.intensity * point.attenuation(distance) * n_dot_l
            }
        }
    }
}
