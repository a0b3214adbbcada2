//! Panoramic scene capture
//!
//! A capture renders the six faces of a cube around a single point. The rig
//! (a [`CubeCamera`] plus a [`CubeRenderTarget`]) is owned by whoever drives
//! the capture; a [`SceneCapture`] implementation only fills the target.

use glam::Vec3;
use thiserror::Error;

use crate::scene::Scene;

/// Capture error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Render target resolution must be positive")]
    ZeroResolution,
    #[error("Invalid clip range: near {near}, far {far}")]
    InvalidClipRange { near: f32, far: f32 },
    #[error("Render target face {face:?} has {actual} texels, expected {expected}")]
    TargetSizeMismatch {
        face: CubeFace,
        expected: usize,
        actual: usize,
    },
    #[error("Non-finite radiance in face {face:?}")]
    NonFiniteTexel { face: CubeFace },
    #[error("Renderer failed: {0}")]
    Renderer(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// One face of a cube map, in storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Unnormalized world direction through the center of texel (`col`, `row`)
    ///
    /// Rows run top to bottom. Capture and irradiance projection both go
    /// through this mapping, so a texel always means the same direction.
    pub fn texel_direction(&self, resolution: u32, col: u32, row: u32) -> Vec3 {
        let texel = 2.0 / resolution as f32;
        let u = -1.0 + (col as f32 + 0.5) * texel;
        let v = 1.0 - (row as f32 + 0.5) * texel;
        match self {
            CubeFace::PositiveX => Vec3::new(1.0, v, -u),
            CubeFace::NegativeX => Vec3::new(-1.0, v, u),
            CubeFace::PositiveY => Vec3::new(u, 1.0, -v),
            CubeFace::NegativeY => Vec3::new(u, -1.0, v),
            CubeFace::PositiveZ => Vec3::new(u, v, 1.0),
            CubeFace::NegativeZ => Vec3::new(-u, v, -1.0),
        }
    }
}

/// Six square faces of linear RGB radiance
#[derive(Debug, Clone)]
pub struct CubeRenderTarget {
    resolution: u32,
    faces: [Vec<Vec3>; 6],
}

impl CubeRenderTarget {
    pub fn new(resolution: u32) -> CaptureResult<Self> {
        if resolution == 0 {
            return Err(CaptureError::ZeroResolution);
        }
        let texels = (resolution as usize) * (resolution as usize);
        Ok(Self {
            resolution,
            faces: std::array::from_fn(|_| vec![Vec3::ZERO; texels]),
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn texels_per_face(&self) -> usize {
        (self.resolution as usize) * (self.resolution as usize)
    }

    pub fn face(&self, face: CubeFace) -> &[Vec3] {
        &self.faces[face.index()]
    }

    pub fn face_mut(&mut self, face: CubeFace) -> &mut [Vec3] {
        &mut self.faces[face.index()]
    }

    /// Fill every texel with a single color
    pub fn clear(&mut self, color: Vec3) {
        for face in &mut self.faces {
            face.fill(color);
        }
    }

    /// Check face sizes and texel values after a renderer wrote the target
    pub fn validate(&self) -> CaptureResult<()> {
        let expected = self.texels_per_face();
        for face in CubeFace::ALL {
            let texels = self.face(face);
            if texels.len() != expected {
                return Err(CaptureError::TargetSizeMismatch {
                    face,
                    expected,
                    actual: texels.len(),
                });
            }
            if texels.iter().any(|t| !t.is_finite()) {
                return Err(CaptureError::NonFiniteTexel { face });
            }
        }
        Ok(())
    }
}

/// Capture camera: a position and clip range shared by all six faces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeCamera {
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl CubeCamera {
    pub fn new(near: f32, far: f32) -> CaptureResult<Self> {
        if !(near > 0.0 && far > near && far.is_finite()) {
            return Err(CaptureError::InvalidClipRange { near, far });
        }
        Ok(Self {
            position: Vec3::ZERO,
            near,
            far,
        })
    }
}

/// A renderer able to capture the scene into a cube render target
pub trait SceneCapture {
    /// Render all six faces of `target` as seen from `camera`
    fn capture(
        &mut self,
        scene: &Scene,
        camera: &CubeCamera,
        target: &mut CubeRenderTarget,
    ) -> CaptureResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_centers_point_along_axes() {
        let expected = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in CubeFace::ALL.iter().zip(expected) {
            // odd resolution puts a texel exactly on the face center
            let dir = face.texel_direction(3, 1, 1);
            assert!((dir.normalize() - axis).length() < 1e-6, "{face:?}");
        }
    }

    #[test]
    fn zero_resolution_is_rejected() {
        assert_eq!(CubeRenderTarget::new(0).unwrap_err(), CaptureError::ZeroResolution);
    }

    #[test]
    fn clip_range_is_validated() {
        assert!(CubeCamera::new(0.1, 100.0).is_ok());
        assert!(CubeCamera::new(1.0, 0.5).is_err());
        assert!(CubeCamera::new(0.0, 10.0).is_err());
    }

    #[test]
    fn validate_catches_nan() {
        let mut target = CubeRenderTarget::new(2).unwrap();
        target.face_mut(CubeFace::NegativeZ)[3] = Vec3::NAN;
        assert_eq!(
            target.validate(),
            Err(CaptureError::NonFiniteTexel {
                face: CubeFace::NegativeZ
            })
        );
    }
}
