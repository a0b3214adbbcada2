//! Application context and frame loop
//!
//! [`AppContext`] owns everything the probe arena needs between frames: the
//! scene, camera and controls, the renderer, asset loading and the probe
//! group. The host drives it by calling [`AppContext::update`] once per frame.

use std::time::Instant;

use glam::Vec3;
use thiserror::Error;

use crate::assets::arena::build_probe_arena;
use crate::assets::{AssetError, LoadingManager};
use crate::probe::{BakeReport, FailurePolicy, LightProbeGroup, ProbeError, ProbeVisualSync};
use crate::render::{Framebuffer, SoftwareRenderer};
use crate::resources::{Material, Mesh};
use crate::scene::{
    AmbientLight, Camera, CameraController, CameraInput, NodeId, OrbitController, Projection, Scene,
    Transform,
};
use crate::AppConfig;

#[cfg(feature = "gltf-models")]
use crate::assets::gltf::{spawn_load, PendingModel};

pub const SPHERE_RADIUS: f32 = 0.8;
pub const SPHERE_HEIGHT: f32 = 2.5;
/// Amplitude of the sphere's side-to-side motion
pub const SPHERE_SWING: f32 = 5.0;
const SPHERE_COLOR: u32 = 0xd0d0d0;
const ORBIT_DAMPING: f32 = 0.07;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("Failed to write frame: {0}")]
    Image(#[from] image::ImageError),
}

pub type AppResult<T> = Result<T, AppError>;

/// Frame counters, logged periodically
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub elapsed: f32,
    pub rays_traced: u64,
    since_log: f32,
    frames_since_log: u64,
}

impl FrameStats {
    pub fn average_fps(&self) -> f32 {
        if self.elapsed > 0.0 {
            self.frames as f32 / self.elapsed
        } else {
            0.0
        }
    }

    fn record(&mut self, dt: f32, rays_traced: u64, interval: f32) {
        self.frames += 1;
        self.elapsed += dt;
        self.rays_traced = rays_traced;
        self.since_log += dt;
        self.frames_since_log += 1;

        if interval > 0.0 && self.since_log >= interval {
            log::info!(
                "Frame {}: {:.1} fps, {} rays traced",
                self.frames,
                self.frames_since_log as f32 / self.since_log,
                self.rays_traced
            );
            self.since_log = 0.0;
            self.frames_since_log = 0;
        }
    }
}

/// Wall-clock or fixed timestep source
struct FrameClock {
    fixed_dt: Option<f32>,
    last: Option<Instant>,
}

impl FrameClock {
    fn new(fixed_dt: Option<f32>) -> Self {
        Self { fixed_dt, last: None }
    }

    fn tick(&mut self) -> f32 {
        if let Some(dt) = self.fixed_dt {
            return dt;
        }
        let now = Instant::now();
        let dt = self
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last = Some(now);
        dt
    }
}

/// Everything the probe arena keeps between frames
pub struct AppContext {
    config: AppConfig,
    scene: Scene,
    camera: Camera,
    controller: OrbitController,
    input: CameraInput,
    renderer: SoftwareRenderer,
    framebuffer: Framebuffer,
    loading: LoadingManager,
    #[cfg(feature = "gltf-models")]
    pending_models: Vec<PendingModel>,
    probes: LightProbeGroup,
    visual_sync: ProbeVisualSync,
    sphere: NodeId,
    clock: FrameClock,
    elapsed: f32,
    stats: FrameStats,
    bake_report: Option<BakeReport>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(AppError::Config(format!(
                "frame size must be positive, got {}x{}",
                config.width, config.height
            )));
        }

        let mut scene = Scene::new();
        scene.set_ambient(AmbientLight::new(Vec3::ONE, 0.1));
        scene.set_background(Vec3::ZERO);

        let loading = LoadingManager::new();
        #[cfg(feature = "gltf-models")]
        let mut pending_models = Vec::new();
        match &config.model {
            #[cfg(feature = "gltf-models")]
            Some(path) => pending_models.push(spawn_load(&loading, path.clone())),
            #[cfg(not(feature = "gltf-models"))]
            Some(path) => return Err(AssetError::Unsupported(path.clone()).into()),
            None => {
                build_probe_arena(&mut scene);
            }
        }

        let sphere_mesh = scene.add_mesh(Mesh::sphere(SPHERE_RADIUS, 32, 32));
        let sphere_material = scene.add_material(Material::diffuse_hex("sphere", SPHERE_COLOR));
        let sphere = scene.add_mesh_node(
            "Sphere",
            Transform::from_position(Vec3::new(0.0, SPHERE_HEIGHT, 0.0)),
            None,
            sphere_mesh,
            sphere_material,
        );

        let [x, y, z] = config.probe_counts;
        let mut probes = LightProbeGroup::new(x, y, z, config.probe_spacing, config.probe_options())?;
        probes.attach(
            &mut scene,
            None,
            Transform::from_position(Vec3::new(0.0, config.probe_height, 0.0)),
        )?;

        let aspect = config.width as f32 / config.height as f32;
        let mut camera = Camera::new(Vec3::new(7.0, 8.0, 8.0), Vec3::ZERO);
        camera.projection = Projection::perspective(55.0, aspect, 0.1, 1000.0);
        let mut controller = OrbitController::default()
            .with_damping(ORBIT_DAMPING)
            .with_auto_rotate(config.auto_rotate);
        controller.sync_with_camera(&camera);

        log::info!(
            "Probe arena ready: {} probes, {}x{} output",
            probes.len(),
            config.width,
            config.height
        );

        Ok(Self {
            renderer: SoftwareRenderer::new(config.render.clone()),
            framebuffer: Framebuffer::new(config.width, config.height),
            clock: FrameClock::new(config.fixed_dt),
            config,
            scene,
            camera,
            controller,
            input: CameraInput::new(),
            loading,
            #[cfg(feature = "gltf-models")]
            pending_models,
            probes,
            visual_sync: ProbeVisualSync::new(),
            sphere,
            elapsed: 0.0,
            stats: FrameStats::default(),
            bake_report: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Input applied to the orbit controls on the next update
    pub fn input_mut(&mut self) -> &mut CameraInput {
        &mut self.input
    }

    pub fn probes(&self) -> &LightProbeGroup {
        &self.probes
    }

    pub fn probes_mut(&mut self) -> &mut LightProbeGroup {
        &mut self.probes
    }

    pub fn loading(&self) -> &LoadingManager {
        &self.loading
    }

    pub fn renderer(&self) -> &SoftwareRenderer {
        &self.renderer
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn sphere(&self) -> NodeId {
        self.sphere
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Report of the one-shot bake, once it has run
    pub fn bake_report(&self) -> Option<&BakeReport> {
        self.bake_report.as_ref()
    }

    pub fn is_baked(&self) -> bool {
        self.bake_report.is_some()
    }

    /// Advance one frame by `dt` seconds and render it
    pub fn update(&mut self, dt: f32) -> AppResult<()> {
        self.elapsed += dt;

        // one read per frame, so joining models and the bake gate agree
        let loaded = self.loading.is_loaded();
        self.apply_finished_loads(loaded)?;
        if self.bake_report.is_none() && loaded && !self.has_pending_models() {
            self.bake_probes()?;
        }

        self.controller.update(&mut self.camera, &self.input, dt);
        self.input.reset_deltas();

        if let Some(sphere) = self.scene.node_mut(self.sphere) {
            sphere.transform.position.x = self.elapsed.sin() * SPHERE_SWING;
        }

        self.visual_sync.update(&self.probes, &mut self.scene);
        self.renderer
            .render_view(&self.scene, &self.camera, Some(&self.probes), &mut self.framebuffer);

        self.stats.record(
            dt,
            self.renderer.stats().rays_traced,
            self.config.stats_interval,
        );
        Ok(())
    }

    /// Render `frames` frames and write the last one if an output path is set
    pub fn run(&mut self, frames: u64) -> AppResult<FrameStats> {
        if self.config.wait_for_assets {
            let summary = self.loading.wait();
            log::debug!(
                "Assets settled: {} loaded, {} failed",
                summary.loaded.len(),
                summary.failed.len()
            );
        }

        for _ in 0..frames {
            let dt = self.clock.tick();
            self.update(dt)?;
        }

        if !self.is_baked() {
            log::warn!("Finished {} frames before assets loaded; probes were not baked", frames);
        }
        if let Some(path) = &self.config.output {
            self.framebuffer.save_png(path)?;
        }
        Ok(self.stats)
    }

    /// Move finished model loads into the scene
    ///
    /// With `settle` set every worker has already resolved its ticket, so all
    /// pending models are joined.
    #[cfg(feature = "gltf-models")]
    fn apply_finished_loads(&mut self, settle: bool) -> AppResult<()> {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_models)
            .into_iter()
            .partition(|model| settle || model.is_finished());
        self.pending_models = pending;

        let mut first_error = None;
        for model in ready {
            match model.join() {
                Ok(data) => {
                    data.instantiate(&mut self.scene, None);
                }
                Err(err) => {
                    log::error!("{}", err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) if self.config.failure_policy == FailurePolicy::Abort => Err(err.into()),
            _ => Ok(()),
        }
    }

    #[cfg(not(feature = "gltf-models"))]
    fn apply_finished_loads(&mut self, _settle: bool) -> AppResult<()> {
        Ok(())
    }

    #[cfg(feature = "gltf-models")]
    fn has_pending_models(&self) -> bool {
        !self.pending_models.is_empty()
    }

    #[cfg(not(feature = "gltf-models"))]
    fn has_pending_models(&self) -> bool {
        false
    }

    fn bake_probes(&mut self) -> AppResult<()> {
        let report = self.probes.bake(&mut self.renderer, &self.scene)?;
        let complete = report.ensure_complete();
        self.bake_report = Some(report);
        if self.config.failure_policy == FailurePolicy::Abort {
            complete?;
        }

        if !self.config.keep_direct_light {
            let count = self.scene.set_directional_intensity(0.0);
            log::info!("Turning off {} directional light(s)", count);
        }
        Ok(())
    }
}
