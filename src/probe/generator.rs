//! Irradiance encoding of cube captures

use glam::Vec3;

use super::sh::SphericalHarmonics3;
use crate::capture::{CaptureError, CaptureResult, CubeFace, CubeRenderTarget};

/// Turns a finished panoramic capture into an irradiance representation
pub trait IrradianceEncoder {
    fn encode(&self, target: &CubeRenderTarget) -> CaptureResult<SphericalHarmonics3>;
}

/// Projects every cube texel onto the L2 SH basis
///
/// Texels are weighted by their solid angle, approximated as
/// `4 / (|c| * |c|^2)` for the unnormalized face direction `c`, and the sum is
/// renormalized so the weights cover exactly `4π` steradians.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShProjector;

impl ShProjector {
    pub fn new() -> Self {
        Self
    }
}

impl IrradianceEncoder for ShProjector {
    fn encode(&self, target: &CubeRenderTarget) -> CaptureResult<SphericalHarmonics3> {
        let resolution = target.resolution();
        if resolution == 0 {
            return Err(CaptureError::ZeroResolution);
        }
        target.validate()?;

        let mut sh = SphericalHarmonics3::zero();
        let mut total_weight = 0.0f32;

        for face in CubeFace::ALL {
            let texels = target.face(face);
            for row in 0..resolution {
                for col in 0..resolution {
                    let coord = face.texel_direction(resolution, col, row);
                    let length_sq = coord.length_squared();
                    let weight = 4.0 / (length_sq.sqrt() * length_sq);
                    total_weight += weight;

                    let color: Vec3 = texels[(row * resolution + col) as usize];
                    sh.add_sample(coord.normalize(), color, weight);
                }
            }
        }

        let norm = (4.0 * std::f32::consts::PI) / total_weight;
        sh.scale(norm);

        if !sh.is_finite() {
            return Err(CaptureError::Renderer(
                "irradiance projection produced non-finite coefficients".into(),
            ));
        }
        Ok(sh)
    }
}
