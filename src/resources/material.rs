//! Material definitions

use glam::Vec3;

use crate::probe::SphericalHarmonics3;

/// How a surface turns incoming light into outgoing radiance
#[derive(Debug, Clone, PartialEq)]
pub enum Shading {
    /// Lambertian surface lit by scene lights and ambient probes
    Lit,
    /// Base color only, ignores lighting
    Unlit,
    /// Displays a stored irradiance probe (used by probe markers)
    Irradiance {
        sh: SphericalHarmonics3,
        intensity: f32,
    },
}

/// Surface material properties
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Linear base color
    pub base_color: Vec3,
    pub emissive: Vec3,
    pub emissive_strength: f32,
    pub shading: Shading,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec3::splat(0.8),
            emissive: Vec3::ZERO,
            emissive_strength: 1.0,
            shading: Shading::Lit,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec3) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3, strength: f32) -> Self {
        self.emissive = emissive;
        self.emissive_strength = strength;
        self
    }

    pub fn with_shading(mut self, shading: Shading) -> Self {
        self.shading = shading;
        self
    }

    pub fn emitted(&self) -> Vec3 {
        self.emissive * self.emissive_strength
    }

    // Preset materials

    /// Diffuse surface from an sRGB hex color such as `0x108020`
    pub fn diffuse_hex(name: &str, hex: u32) -> Self {
        Self::new(name).with_base_color(srgb_hex_to_linear(hex))
    }

    /// Probe marker material; the irradiance is filled in every frame
    pub fn probe_marker() -> Self {
        Self::new("probe-marker")
            .with_base_color(Vec3::ONE)
            .with_shading(Shading::Irradiance {
                sh: SphericalHarmonics3::default(),
                intensity: 1.0,
            })
    }
}

/// Convert an sRGB-encoded 0xRRGGBB color to linear RGB
pub fn srgb_hex_to_linear(hex: u32) -> Vec3 {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xff) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    Vec3::new(channel(16), channel(8), channel(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_conversion_hits_endpoints() {
        assert_eq!(srgb_hex_to_linear(0x000000), Vec3::ZERO);
        assert!((srgb_hex_to_linear(0xffffff) - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn marker_uses_irradiance_shading() {
        assert!(matches!(
            Material::probe_marker().shading,
            Shading::Irradiance { .. }
        ));
    }
}
