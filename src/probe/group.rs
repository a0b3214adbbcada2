//! Light probe group: a lattice of irradiance probes and the loop that bakes them

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec3, Vec3, Vec4};

use super::generator::{IrradianceEncoder, ShProjector};
use super::sh::{SphericalHarmonics3, SH_COEFFICIENT_COUNT};
use super::{ProbeError, ProbeResult};
use crate::assets::LoadingManager;
use crate::capture::{CaptureError, CubeCamera, CubeRenderTarget, SceneCapture};
use crate::resources::{Material, Mesh};
use crate::scene::{Layers, MaterialId, NodeId, Scene, Transform};

/// What to do with the rest of the lattice when one probe fails to bake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure; later probes are reported as skipped
    #[default]
    Abort,
    /// Record the failure and keep baking the remaining probes
    Continue,
}

/// Configuration for a [`LightProbeGroup`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeGroupOptions {
    /// Edge length in texels of each face of the shared capture target
    pub capture_resolution: u32,
    /// Near clip distance of the capture camera
    pub capture_near: f32,
    /// Far clip distance of the capture camera
    pub capture_far: f32,
    /// Intensity assigned to every probe
    pub intensity: f32,
    /// Attach a marker sphere to every probe
    pub debug_visuals: bool,
    /// Marker radius at intensity 1
    pub helper_size: f32,
    pub failure_policy: FailurePolicy,
}

impl Default for ProbeGroupOptions {
    fn default() -> Self {
        Self {
            capture_resolution: 256,
            capture_near: 0.1,
            capture_far: 100.0,
            intensity: 1.0,
            debug_visuals: false,
            helper_size: 0.2,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl ProbeGroupOptions {
    pub fn with_capture_resolution(mut self, resolution: u32) -> Self {
        self.capture_resolution = resolution;
        self
    }

    pub fn with_clip_range(mut self, near: f32, far: f32) -> Self {
        self.capture_near = near;
        self.capture_far = far;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_debug_visuals(mut self, enabled: bool) -> Self {
        self.debug_visuals = enabled;
        self
    }

    pub fn with_helper_size(mut self, size: f32) -> Self {
        self.helper_size = size;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    fn validate(&self) -> ProbeResult<()> {
        if !(self.intensity.is_finite() && self.intensity >= 0.0) {
            return Err(ProbeError::InvalidOptions(format!(
                "intensity must be finite and non-negative, got {}",
                self.intensity
            )));
        }
        if !(self.helper_size.is_finite() && self.helper_size > 0.0) {
            return Err(ProbeError::InvalidOptions(format!(
                "helper size must be positive, got {}",
                self.helper_size
            )));
        }
        Ok(())
    }
}

/// Scene objects backing a probe's debug marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeVisual {
    pub size: f32,
    pub(crate) node: Option<NodeId>,
    pub(crate) material: Option<MaterialId>,
}

impl ProbeVisual {
    /// Marker node, present once the group is attached to a scene
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }
}

/// A single irradiance sample point
#[derive(Debug, Clone)]
pub struct LightProbe {
    position: Vec3,
    pub intensity: f32,
    sh: SphericalHarmonics3,
    bake_count: u32,
    captured_at: Option<Vec3>,
    visual: Option<ProbeVisual>,
}

impl LightProbe {
    /// Position in the group's local frame
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn sh(&self) -> &SphericalHarmonics3 {
        &self.sh
    }

    /// Number of successful bakes written into this probe
    pub fn bake_count(&self) -> u32 {
        self.bake_count
    }

    pub fn is_baked(&self) -> bool {
        self.bake_count > 0
    }

    /// World position of the capture behind the current irradiance
    pub fn captured_at(&self) -> Option<Vec3> {
        self.captured_at
    }

    pub fn visual(&self) -> Option<&ProbeVisual> {
        self.visual.as_ref()
    }
}

/// Bake lifecycle of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeState {
    Unbaked,
    Baking,
    /// Every probe was written by the last bake
    Baked,
    /// The last bake failed or was interrupted for some probes
    Partial,
}

/// Progress notification sent after each probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BakeProgress {
    pub index: usize,
    pub completed: usize,
    pub total: usize,
    pub succeeded: bool,
}

/// Per-probe outcome of one bake call
#[derive(Debug, Clone, Default)]
pub struct BakeReport {
    pub total: usize,
    pub baked: Vec<usize>,
    pub failed: Vec<(usize, CaptureError)>,
    pub skipped: Vec<usize>,
}

impl BakeReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.baked.len() == self.total
    }

    /// Turn an incomplete bake into an error
    pub fn ensure_complete(&self) -> ProbeResult<()> {
        if self.is_complete() {
            return Ok(());
        }
        Err(ProbeError::BakeIncomplete {
            failed: self.failed.len(),
            skipped: self.skipped.len(),
            first_failure: self.failed.first().map(|(index, _)| *index),
        })
    }
}

/// Packed per-probe record for upload to a shader storage buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuProbeData {
    /// xyz = world position, w = intensity
    pub position_intensity: Vec4,
    /// xyz = RGB coefficient, w = 1 if baked
    pub coefficients: [Vec4; SH_COEFFICIENT_COUNT],
}

/// Restores a consistent bake state if the bake loop unwinds
struct BakeStateGuard<'a> {
    state: &'a mut BakeState,
    outcome: BakeState,
}

impl<'a> BakeStateGuard<'a> {
    fn enter(state: &'a mut BakeState) -> Self {
        *state = BakeState::Baking;
        Self {
            state,
            outcome: BakeState::Partial,
        }
    }

    fn finish(mut self, outcome: BakeState) {
        self.outcome = outcome;
    }
}

impl Drop for BakeStateGuard<'_> {
    fn drop(&mut self) {
        *self.state = self.outcome;
    }
}

/// A centered 3D lattice of light probes sharing one capture rig
///
/// Probes are generated x-major (x outer, then y, then z) and keep that order
/// for their whole lifetime; progress and reports refer to these indices.
pub struct LightProbeGroup {
    counts: UVec3,
    spacing: f32,
    dimensions: Vec3,
    options: ProbeGroupOptions,
    probes: Vec<LightProbe>,
    camera: CubeCamera,
    target: CubeRenderTarget,
    node: Option<NodeId>,
    state: BakeState,
    baked_world: Mat4,
}

impl LightProbeGroup {
    pub fn new(
        x: u32,
        y: u32,
        z: u32,
        spacing: f32,
        options: ProbeGroupOptions,
    ) -> ProbeResult<Self> {
        for (axis, count) in [("x", x), ("y", y), ("z", z)] {
            if count == 0 {
                return Err(ProbeError::InvalidGrid(format!(
                    "probe count on the {axis} axis must be positive"
                )));
            }
        }
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(ProbeError::InvalidGrid(format!(
                "spacing must be a positive distance, got {spacing}"
            )));
        }
        let total = (x as usize)
            .checked_mul(y as usize)
            .and_then(|n| n.checked_mul(z as usize))
            .ok_or_else(|| ProbeError::InvalidGrid(format!("{x}x{y}x{z} probes overflow")))?;
        options.validate()?;

        let camera = CubeCamera::new(options.capture_near, options.capture_far)?;
        let target = CubeRenderTarget::new(options.capture_resolution)?;

        let counts = UVec3::new(x, y, z);
        let dimensions = (counts.as_vec3() - Vec3::ONE) * spacing;

        let mut probes = Vec::with_capacity(total);
        for i in 0..x {
            for j in 0..y {
                for k in 0..z {
                    let position = Vec3::new(i as f32, j as f32, k as f32) * spacing - dimensions / 2.0;
                    probes.push(LightProbe {
                        position,
                        intensity: options.intensity,
                        sh: SphericalHarmonics3::zero(),
                        bake_count: 0,
                        captured_at: None,
                        visual: options.debug_visuals.then_some(ProbeVisual {
                            size: options.helper_size,
                            node: None,
                            material: None,
                        }),
                    });
                }
            }
        }

        log::debug!(
            "Created light probe group {}x{}x{} (spacing {}, extent {:?})",
            x,
            y,
            z,
            spacing,
            dimensions
        );

        Ok(Self {
            counts,
            spacing,
            dimensions,
            options,
            probes,
            camera,
            target,
            node: None,
            state: BakeState::Unbaked,
            baked_world: Mat4::IDENTITY,
        })
    }

    /// Lattice extent per axis: `(count - 1) * spacing`
    pub fn dimensions(&self) -> Vec3 {
        self.dimensions
    }

    pub fn counts(&self) -> UVec3 {
        self.counts
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn options(&self) -> &ProbeGroupOptions {
        &self.options
    }

    pub fn probes(&self) -> &[LightProbe] {
        &self.probes
    }

    pub fn probe_mut(&mut self, index: usize) -> Option<&mut LightProbe> {
        self.probes.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn state(&self) -> BakeState {
        self.state
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// The shared capture target, holding the most recent capture
    pub fn render_target(&self) -> &CubeRenderTarget {
        &self.target
    }

    /// Flat index of lattice cell (`i`, `j`, `k`)
    pub fn index_of(&self, i: u32, j: u32, k: u32) -> Option<usize> {
        if i >= self.counts.x || j >= self.counts.y || k >= self.counts.z {
            return None;
        }
        Some(((i * self.counts.y + j) * self.counts.z + k) as usize)
    }

    /// Insert the group (and its probe markers) into `scene`
    pub fn attach(
        &mut self,
        scene: &mut Scene,
        parent: Option<NodeId>,
        transform: Transform,
    ) -> ProbeResult<NodeId> {
        if self.node.is_some() {
            return Err(ProbeError::AlreadyAttached);
        }
        let group = scene.add_node("LightProbeGroup", transform, parent);

        if self.options.debug_visuals {
            let sphere = scene.add_mesh(Mesh::sphere(1.0, 16, 12));
            for (index, probe) in self.probes.iter_mut().enumerate() {
                let Some(visual) = probe.visual.as_mut() else {
                    continue;
                };
                let material = scene.add_material(Material::probe_marker());
                let marker_transform = Transform::from_position_scale(
                    probe.position,
                    Vec3::splat(visual.size * probe.intensity),
                );
                let marker = scene.add_mesh_node(
                    &format!("LightProbeHelper{index}"),
                    marker_transform,
                    Some(group),
                    sphere,
                    material,
                );
                if let Some(node) = scene.node_mut(marker) {
                    node.layers = Layers::DEBUG;
                }
                visual.node = Some(marker);
                visual.material = Some(material);
            }
        }

        self.node = Some(group);
        Ok(group)
    }

    /// World positions of all probes under the group's current placement
    pub fn world_positions(&self, scene: &Scene) -> ProbeResult<Vec<Vec3>> {
        let world = self.world_matrix(scene)?;
        Ok(self
            .probes
            .iter()
            .map(|p| world.transform_point3(p.position))
            .collect())
    }

    fn world_matrix(&self, scene: &Scene) -> ProbeResult<Mat4> {
        let node = self.node.ok_or(ProbeError::NotAttached)?;
        scene.world_matrix(node).ok_or(ProbeError::NotAttached)
    }

    /// Bake every probe with the default SH projection, logging progress
    pub fn bake(&mut self, renderer: &mut dyn SceneCapture, scene: &Scene) -> ProbeResult<BakeReport> {
        self.bake_with(renderer, &ShProjector::new(), scene, |_| {})
    }

    /// Wait for `loading` to report completion, then bake
    pub fn bake_when_loaded(
        &mut self,
        loading: &LoadingManager,
        renderer: &mut dyn SceneCapture,
        scene: &Scene,
    ) -> ProbeResult<BakeReport> {
        let summary = loading.wait();
        if !summary.failed.is_empty() {
            log::warn!(
                "Baking with {} failed asset load(s): {:?}",
                summary.failed.len(),
                summary.failed
            );
        }
        self.bake(renderer, scene)
    }

    /// Capture and encode each probe in lattice order
    ///
    /// Exactly one capture is taken per probe, one after another, through the
    /// shared rig. `progress` runs after each attempted probe.
    pub fn bake_with(
        &mut self,
        renderer: &mut dyn SceneCapture,
        encoder: &dyn IrradianceEncoder,
        scene: &Scene,
        mut progress: impl FnMut(&BakeProgress),
    ) -> ProbeResult<BakeReport> {
        let world = self.world_matrix(scene)?;
        let total = self.probes.len();
        let policy = self.options.failure_policy;
        let mut report = BakeReport::new(total);

        log::info!(
            "Started baking LightProbeGroup: {} probes, {}px capture",
            total,
            self.target.resolution()
        );

        let guard = BakeStateGuard::enter(&mut self.state);
        let mut aborted = false;

        for (index, probe) in self.probes.iter_mut().enumerate() {
            if aborted {
                report.skipped.push(index);
                continue;
            }

            let world_position = world.transform_point3(probe.position);
            self.camera.position = world_position;

            let result = renderer
                .capture(scene, &self.camera, &mut self.target)
                .and_then(|()| self.target.validate())
                .and_then(|()| encoder.encode(&self.target));

            let succeeded = match result {
                Ok(sh) => {
                    probe.sh = sh;
                    probe.bake_count += 1;
                    probe.captured_at = Some(world_position);
                    report.baked.push(index);
                    log::info!("Baked {}/{}", index + 1, total);
                    true
                }
                Err(err) => {
                    log::warn!("Probe {}/{} failed to bake: {}", index + 1, total, err);
                    report.failed.push((index, err));
                    aborted = policy == FailurePolicy::Abort;
                    false
                }
            };

            progress(&BakeProgress {
                index,
                completed: index + 1,
                total,
                succeeded,
            });
        }

        self.baked_world = world;
        let outcome = if report.is_complete() {
            BakeState::Baked
        } else {
            BakeState::Partial
        };
        guard.finish(outcome);

        if report.is_complete() {
            log::info!("Finished baking {} probes", total);
        } else {
            log::warn!(
                "Bake incomplete: {} baked, {} failed, {} skipped",
                report.baked.len(),
                report.failed.len(),
                report.skipped.len()
            );
        }
        Ok(report)
    }

    /// Irradiance at a world position, trilinearly blended from baked probes
    ///
    /// Positions outside the lattice clamp to its boundary. Returns `None`
    /// until at least one probe has been baked.
    pub fn irradiance_at(&self, world_position: Vec3, normal: Vec3) -> Option<Vec3> {
        if !self.probes.iter().any(LightProbe::is_baked) {
            return None;
        }

        let local = self.baked_world.inverse().transform_point3(world_position);
        let grid = (local + self.dimensions / 2.0) / self.spacing;
        let max = self.counts.as_vec3() - Vec3::ONE;
        let grid = grid.clamp(Vec3::ZERO, max);
        let base = grid.floor().as_uvec3().min(self.counts - UVec3::ONE);
        let frac = grid - base.as_vec3();

        let mut sum = Vec3::ZERO;
        let mut weight_sum = 0.0;
        for corner in 0..8u32 {
            let offset = UVec3::new(corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
            let cell = (base + offset).min(self.counts - UVec3::ONE);
            let w = Vec3::select(
                offset.as_vec3().cmpeq(Vec3::ONE),
                frac,
                Vec3::ONE - frac,
            );
            let weight = w.x * w.y * w.z;
            if weight <= 0.0 {
                continue;
            }
            let Some(index) = self.index_of(cell.x, cell.y, cell.z) else {
                continue;
            };
            let probe = &self.probes[index];
            if !probe.is_baked() {
                continue;
            }
            sum += probe.sh.irradiance_at(normal) * probe.intensity * weight;
            weight_sum += weight;
        }

        (weight_sum > 0.0).then(|| sum / weight_sum)
    }

    /// Pack probes into shader-friendly records
    pub fn gpu_data(&self) -> Vec<GpuProbeData> {
        self.probes
            .iter()
            .map(|probe| {
                let position = probe
                    .captured_at
                    .unwrap_or_else(|| self.baked_world.transform_point3(probe.position));
                let baked = if probe.is_baked() { 1.0 } else { 0.0 };
                GpuProbeData {
                    position_intensity: position.extend(probe.intensity),
                    coefficients: probe.sh.coefficients.map(|c| c.extend(baked)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantSky(Vec3);

    impl SceneCapture for ConstantSky {
        fn capture(
            &mut self,
            _scene: &Scene,
            _camera: &CubeCamera,
            target: &mut CubeRenderTarget,
        ) -> Result<(), CaptureError> {
            target.clear(self.0);
            Ok(())
        }
    }

    fn small() -> ProbeGroupOptions {
        ProbeGroupOptions::default().with_capture_resolution(4)
    }

    #[test]
    fn index_of_matches_generation_order() {
        let group = LightProbeGroup::new(2, 3, 4, 1.0, small()).unwrap();
        let mut expected = 0;
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    assert_eq!(group.index_of(i, j, k), Some(expected));
                    expected += 1;
                }
            }
        }
        assert_eq!(group.index_of(2, 0, 0), None);
    }

    #[test]
    fn irradiance_is_none_before_bake() {
        let group = LightProbeGroup::new(2, 1, 2, 4.0, small()).unwrap();
        assert!(group.irradiance_at(Vec3::ZERO, Vec3::Y).is_none());
    }

    #[test]
    fn uniform_bake_interpolates_to_uniform_irradiance() {
        let mut scene = Scene::new();
        let mut group = LightProbeGroup::new(2, 2, 2, 2.0, small().with_intensity(0.5)).unwrap();
        group
            .attach(&mut scene, None, Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        let report = group.bake(&mut ConstantSky(Vec3::ONE), &scene).unwrap();
        assert!(report.is_complete());
        assert_eq!(group.state(), BakeState::Baked);

        let e = group
            .irradiance_at(Vec3::new(0.3, 2.4, -0.7), Vec3::Y)
            .unwrap();
        let expected = std::f32::consts::PI * 0.5;
        assert!((e - Vec3::splat(expected)).length() < 0.05, "{e}");

        // far outside the lattice clamps to the boundary probes
        assert!(group.irradiance_at(Vec3::splat(100.0), Vec3::X).is_some());
    }

    #[test]
    fn gpu_data_is_tightly_packed() {
        let group = LightProbeGroup::new(1, 1, 2, 1.0, small()).unwrap();
        let data = group.gpu_data();
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        assert_eq!(bytes.len(), 2 * 10 * 16);
        assert_eq!(data[0].coefficients[0].w, 0.0);
    }

    struct PanickingCapture;

    impl SceneCapture for PanickingCapture {
        fn capture(
            &mut self,
            _scene: &Scene,
            _camera: &CubeCamera,
            _target: &mut CubeRenderTarget,
        ) -> Result<(), CaptureError> {
            panic!("renderer crashed mid-capture");
        }
    }

    #[test]
    fn panicking_capture_leaves_group_partial() {
        let mut scene = Scene::new();
        let mut group = LightProbeGroup::new(2, 1, 1, 1.0, small()).unwrap();
        group.attach(&mut scene, None, Transform::default()).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = group.bake(&mut PanickingCapture, &scene);
        }));

        assert!(result.is_err());
        assert_eq!(group.state(), BakeState::Partial);
        assert!(group.probes().iter().all(|p| !p.is_baked()));
    }

    #[test]
    fn attaching_twice_fails() {
        let mut scene = Scene::new();
        let mut group = LightProbeGroup::new(1, 1, 1, 1.0, small()).unwrap();
        group.attach(&mut scene, None, Transform::default()).unwrap();
        assert!(matches!(
            group.attach(&mut scene, None, Transform::default()),
            Err(ProbeError::AlreadyAttached)
        ));
    }
}
