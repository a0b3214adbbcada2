//! CPU reference renderer
//!
//! Ray casts the scene against a BVH of world-space triangles. It serves both
//! the probe captures (through [`SceneCapture`](crate::capture::SceneCapture))
//! and the camera view written to a [`Framebuffer`].

mod bvh;
mod framebuffer;
mod raytracer;

pub use bvh::*;
pub use framebuffer::*;
pub use raytracer::*;

/// Renderer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Trace shadow rays for lights that cast shadows
    pub shadows: bool,
    /// Add baked probe irradiance to lit surfaces in the camera view
    pub probe_lighting: bool,
    /// Linear scale applied to the final view color
    pub exposure: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadows: true,
            probe_lighting: true,
            exposure: 1.0,
        }
    }
}

impl RenderSettings {
    pub fn with_shadows(mut self, enabled: bool) -> Self {
        self.shadows = enabled;
        self
    }

    pub fn with_probe_lighting(mut self, enabled: bool) -> Self {
        self.probe_lighting = enabled;
        self
    }

    pub fn with_exposure(mut self, exposure: f32) -> Self {
        self.exposure = exposure;
        self
    }
}

/// Running counters of renderer work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub rays_traced: u64,
    pub bvh_builds: u64,
    pub captures: u64,
    pub frames: u64,
}
