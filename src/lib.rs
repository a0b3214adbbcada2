//! Probe Arena - light probe baking on a CPU reference renderer
//!
//! A lattice of irradiance probes is laid out inside the scene graph, baked
//! once every asset has finished loading, and then used to light the scene
//! while a camera orbits it.
//!
//! # Features
//! - Centered probe lattices with configurable counts, spacing and intensity
//! - Cube captures projected onto third-order spherical harmonics
//! - Explicit bake reports with abort or continue failure policies
//! - Deterministic "assets loaded" signal instead of timed bakes
//! - Multi-threaded ray casting renderer with PNG output
//! - glTF model loading with punctual lights (`gltf-models` feature)

pub mod app;
pub mod assets;
pub mod capture;
pub mod probe;
pub mod render;
pub mod resources;
pub mod scene;

use std::path::PathBuf;

pub use app::{AppContext, AppError, AppResult, FrameStats};
pub use assets::{LoadingManager, LoadSummary};
pub use capture::{CubeCamera, CubeRenderTarget, SceneCapture};
pub use probe::{BakeReport, FailurePolicy, LightProbeGroup, ProbeGroupOptions, ProbeVisualSync};
pub use render::{Framebuffer, RenderSettings, SoftwareRenderer};
pub use scene::Scene;

/// Configuration for the probe arena application
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Model to load; the built-in arena is used when absent
    pub model: Option<PathBuf>,
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// Where to write the final frame
    pub output: Option<PathBuf>,
    /// Probe counts along x, y and z
    pub probe_counts: [u32; 3],
    /// Distance between neighbouring probes
    pub probe_spacing: f32,
    /// Height of the probe group above the scene origin
    pub probe_height: f32,
    pub capture_resolution: u32,
    pub probe_intensity: f32,
    /// Show a marker sphere at each probe
    pub debug_probes: bool,
    /// Leave directional lights on after the bake
    pub keep_direct_light: bool,
    pub failure_policy: FailurePolicy,
    /// Block on asset loading before the first frame of [`AppContext::run`]
    pub wait_for_assets: bool,
    /// Use a constant timestep instead of wall-clock time
    pub fixed_dt: Option<f32>,
    /// Orbit auto-rotation in radians per second
    pub auto_rotate: f32,
    /// Seconds between frame statistics log lines
    pub stats_interval: f32,
    pub render: RenderSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: None,
            width: 640,
            height: 360,
            output: None,
            probe_counts: [3, 1, 3],
            probe_spacing: 4.0,
            probe_height: 2.0,
            capture_resolution: 256,
            probe_intensity: 0.45,
            debug_probes: true,
            keep_direct_light: false,
            failure_policy: FailurePolicy::Abort,
            wait_for_assets: true,
            fixed_dt: None,
            auto_rotate: 0.0,
            stats_interval: 0.5,
            render: RenderSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.model = Some(path.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_probes(mut self, counts: [u32; 3], spacing: f32) -> Self {
        self.probe_counts = counts;
        self.probe_spacing = spacing;
        self
    }

    pub fn with_capture_resolution(mut self, resolution: u32) -> Self {
        self.capture_resolution = resolution;
        self
    }

    pub fn with_probe_intensity(mut self, intensity: f32) -> Self {
        self.probe_intensity = intensity;
        self
    }

    pub fn with_debug_probes(mut self, enabled: bool) -> Self {
        self.debug_probes = enabled;
        self
    }

    pub fn with_keep_direct_light(mut self, keep: bool) -> Self {
        self.keep_direct_light = keep;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_wait_for_assets(mut self, wait: bool) -> Self {
        self.wait_for_assets = wait;
        self
    }

    pub fn with_fixed_dt(mut self, dt: f32) -> Self {
        self.fixed_dt = Some(dt);
        self
    }

    /// Probe group options derived from this configuration
    pub fn probe_options(&self) -> ProbeGroupOptions {
        ProbeGroupOptions::default()
            .with_capture_resolution(self.capture_resolution)
            .with_intensity(self.probe_intensity)
            .with_debug_visuals(self.debug_probes)
            .with_failure_policy(self.failure_policy)
    }
}

/// Initialize `env_logger` with an `info` default, overridable through `RUST_LOG`
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
