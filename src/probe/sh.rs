//! Third-order (L2) spherical harmonics with RGB coefficients
//!
//! Coefficient order is the usual real SH ordering:
//! `Y00, Y1-1, Y10, Y11, Y2-2, Y2-1, Y20, Y21, Y22`.

use glam::Vec3;

/// Number of coefficients in an L2 expansion
pub const SH_COEFFICIENT_COUNT: usize = 9;

/// Nine RGB coefficients describing a low-frequency spherical signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalHarmonics3 {
    pub coefficients: [Vec3; SH_COEFFICIENT_COUNT],
}

impl Default for SphericalHarmonics3 {
    fn default() -> Self {
        Self {
            coefficients: [Vec3::ZERO; SH_COEFFICIENT_COUNT],
        }
    }
}

impl SphericalHarmonics3 {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Real SH basis evaluated at a unit direction
    pub fn basis(dir: Vec3) -> [f32; SH_COEFFICIENT_COUNT] {
        let (x, y, z) = (dir.x, dir.y, dir.z);
        [
            0.282095,
            0.488603 * y,
            0.488603 * z,
            0.488603 * x,
            1.092548 * x * y,
            1.092548 * y * z,
            0.315392 * (3.0 * z * z - 1.0),
            1.092548 * x * z,
            0.546274 * (x * x - y * y),
        ]
    }

    /// Reconstruct the stored radiance in direction `dir` (unit length)
    pub fn radiance_at(&self, dir: Vec3) -> Vec3 {
        Self::basis(dir)
            .iter()
            .zip(self.coefficients.iter())
            .fold(Vec3::ZERO, |acc, (b, c)| acc + *c * *b)
    }

    /// Cosine-convolved irradiance arriving at a surface with unit `normal`
    pub fn irradiance_at(&self, normal: Vec3) -> Vec3 {
        let (x, y, z) = (normal.x, normal.y, normal.z);
        let c = &self.coefficients;

        // band 0
        let mut result = c[0] * 0.886227;

        // band 1
        result += c[1] * (2.0 * 0.511664 * y);
        result += c[2] * (2.0 * 0.511664 * z);
        result += c[3] * (2.0 * 0.511664 * x);

        // band 2
        result += c[4] * (2.0 * 0.429043 * x * y);
        result += c[5] * (2.0 * 0.429043 * y * z);
        result += c[6] * (0.743125 * z * z - 0.247708);
        result += c[7] * (2.0 * 0.429043 * x * z);
        result += c[8] * (0.429043 * (x * x - y * y));

        result
    }

    /// Accumulate `color` arriving from `dir` with the given weight
    pub fn add_sample(&mut self, dir: Vec3, color: Vec3, weight: f32) {
        for (c, b) in self.coefficients.iter_mut().zip(Self::basis(dir)) {
            *c += color * (b * weight);
        }
    }

    pub fn add(&mut self, other: &Self) {
        for (c, o) in self.coefficients.iter_mut().zip(other.coefficients.iter()) {
            *c += *o;
        }
    }

    pub fn scale(&mut self, s: f32) {
        for c in &mut self.coefficients {
            *c *= s;
        }
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let mut out = *self;
        for (c, o) in out.coefficients.iter_mut().zip(other.coefficients.iter()) {
            *c = c.lerp(*o, t);
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.coefficients.iter().all(|c| c.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn constant(radiance: Vec3) -> SphericalHarmonics3 {
        // Integral of a constant over the sphere against Y00
        let mut sh = SphericalHarmonics3::zero();
        sh.coefficients[0] = radiance * (0.282095 * 4.0 * PI);
        sh
    }

    #[test]
    fn constant_signal_reconstructs() {
        let sh = constant(Vec3::splat(0.5));
        for dir in [Vec3::X, Vec3::NEG_Y, Vec3::new(1.0, 1.0, 1.0).normalize()] {
            assert!((sh.radiance_at(dir) - Vec3::splat(0.5)).length() < 1e-3);
        }
    }

    #[test]
    fn constant_signal_irradiance_is_pi_times_radiance() {
        let sh = constant(Vec3::ONE);
        let e = sh.irradiance_at(Vec3::Z);
        assert!((e - Vec3::splat(PI)).length() < 1e-2, "got {e}");
    }

    #[test]
    fn lerp_endpoints() {
        let a = constant(Vec3::ZERO);
        let b = constant(Vec3::ONE);
        assert_eq!(a.lerp(&b, 0.0), a);
        assert!((a.lerp(&b, 1.0).coefficients[0] - b.coefficients[0]).length() < 1e-6);
    }
}
