//! Light types for the scene

use glam::Vec3;

/// Uniform ambient term added to every lit surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 0.1,
        }
    }
}

impl AmbientLight {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self { color, intensity }
    }

    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Shadow casting parameters for a directional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    /// Half extent of the orthographic shadow volume around the origin
    pub range: f32,
    /// Maximum occluder distance along the light direction
    pub far: f32,
    /// Offset applied along the surface normal before tracing
    pub bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            range: 8.0,
            far: 50.0,
            bias: 0.0005,
        }
    }
}

/// Point light
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Distance at which the contribution fades to zero (0 = infinite)
    pub radius: f32,
    pub cast_shadows: bool,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 0.0,
            cast_shadows: false,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            radius,
            cast_shadows: false,
        }
    }

    /// Inverse-square falloff, windowed to zero at `radius`
    pub fn attenuation(&self, distance: f32) -> f32 {
        let inv_sq = 1.0 / distance.max(1e-4).powi(2);
        if self.radius <= 0.0 {
            return inv_sq;
        }
        let ratio = (distance / self.radius).min(1.0);
        let window = (1.0 - ratio.powi(4)).max(0.0);
        inv_sq * window * window
    }
}

/// Directional light component (like the sun)
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub shadow: Option<ShadowSettings>,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            shadow: None,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
            shadow: None,
        }
    }

    pub fn with_shadow(mut self, shadow: ShadowSettings) -> Self {
        self.shadow = Some(shadow);
        self
    }
}

/// A punctual light stored in the scene
#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
}

impl Light {
    pub fn intensity(&self) -> f32 {
        match self {
            Light::Directional(light) => light.intensity,
            Light::Point(light) => light.intensity,
        }
    }
}
