//! Camera controller system
//!
//! Provides an orbit controller that rotates around a target point, with
//! velocity damping and optional auto-rotation for unattended runs.

use glam::{Vec2, Vec3};

use super::Camera;

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Mouse delta since last frame (in pixels)
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether orbiting is active (e.g., left mouse button held)
    pub orbit_active: bool,

    /// Whether panning is active (e.g., right mouse button held)
    pub pan_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

/// Abstract camera controller trait
pub trait CameraController {
    /// Update the camera based on input and delta time
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);
}

/// Orbit camera controller
///
/// Rotates around a target point at a fixed distance.
/// - Mouse drag: Orbit around target
/// - Right drag: Pan the target in screen space
/// - Scroll: Zoom in/out (change distance)
///
/// Angular input accumulates into a velocity that decays by `damping_factor`
/// every update, which gives the inertial feel of the browser orbit controls.
pub struct OrbitController {
    /// Target point to orbit around
    pub target: Vec3,
    /// Distance from target
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Current azimuth angle (horizontal) in radians
    pub azimuth: f32,
    /// Current elevation angle (vertical) in radians
    pub elevation: f32,
    pub min_elevation: f32,
    pub max_elevation: f32,
    /// Orbit sensitivity (radians per pixel)
    pub orbit_sensitivity: f32,
    /// Zoom factor per scroll unit
    pub zoom_factor: f32,
    /// Pan distance per pixel, scaled by orbit distance
    pub pan_sensitivity: f32,
    /// Fraction of angular velocity applied (and removed) per update
    pub damping_factor: f32,
    /// Auto-rotation speed in radians per second (0 disables)
    pub auto_rotate_speed: f32,
    angular_velocity: Vec2,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 10.0,
            min_distance: 1.0,
            max_distance: 100.0,
            azimuth: 0.0,
            elevation: std::f32::consts::FRAC_PI_6, // 30 degrees
            min_elevation: -std::f32::consts::FRAC_PI_2 + 0.05,
            max_elevation: std::f32::consts::FRAC_PI_2 - 0.05,
            orbit_sensitivity: 0.005,
            zoom_factor: 1.1,
            pan_sensitivity: 0.001,
            damping_factor: 0.07,
            auto_rotate_speed: 0.0,
            angular_velocity: Vec2::ZERO,
        }
    }
}

impl OrbitController {
    pub fn new(target: Vec3, distance: f32) -> Self {
        Self {
            target,
            distance,
            ..Default::default()
        }
    }

    pub fn with_damping(mut self, damping_factor: f32) -> Self {
        self.damping_factor = damping_factor.clamp(0.0, 1.0);
        self
    }

    pub fn with_auto_rotate(mut self, radians_per_second: f32) -> Self {
        self.auto_rotate_speed = radians_per_second;
        self
    }

    /// Initialize from camera's current position and target
    pub fn sync_with_camera(&mut self, camera: &Camera) {
        self.target = camera.target;
        let offset = camera.position - camera.target;
        self.distance = offset.length().max(self.min_distance);
        self.elevation = (offset.y / self.distance).clamp(-1.0, 1.0).asin();
        self.azimuth = offset.z.atan2(offset.x);
    }

    /// Calculate camera position from orbit parameters
    fn calculate_position(&self) -> Vec3 {
        let x = self.distance * self.elevation.cos() * self.azimuth.cos();
        let y = self.distance * self.elevation.sin();
        let z = self.distance * self.elevation.cos() * self.azimuth.sin();
        self.target + Vec3::new(x, y, z)
    }

    /// Pan the target within the camera's view plane
    fn pan(&mut self, camera: &Camera, delta: Vec2) {
        let forward = camera.forward();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        let scale = self.pan_sensitivity * self.distance;
        self.target += (-right * delta.x + up * delta.y) * scale;
    }
}

impl CameraController for OrbitController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.scroll_delta != 0.0 {
            if input.scroll_delta > 0.0 {
                self.distance /= self.zoom_factor;
            } else {
                self.distance *= self.zoom_factor;
            }
            self.distance = self.distance.clamp(self.min_distance, self.max_distance);
        }

        if input.orbit_active && input.mouse_delta != Vec2::ZERO {
            self.angular_velocity += input.mouse_delta * self.orbit_sensitivity;
        }
        if input.pan_active && input.mouse_delta != Vec2::ZERO {
            self.pan(camera, input.mouse_delta);
        }

        self.azimuth += self.auto_rotate_speed * dt;

        let step = if self.damping_factor > 0.0 {
            self.angular_velocity * self.damping_factor
        } else {
            self.angular_velocity
        };
        self.azimuth = (self.azimuth + step.x) % std::f32::consts::TAU;
        self.elevation = (self.elevation + step.y).clamp(self.min_elevation, self.max_elevation);
        if self.damping_factor > 0.0 {
            self.angular_velocity *= 1.0 - self.damping_factor;
        } else {
            self.angular_velocity = Vec2::ZERO;
        }

        camera.position = self.calculate_position();
        camera.target = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_then_update_keeps_camera_in_place() {
        let mut camera = Camera::new(Vec3::new(7.0, 8.0, 8.0), Vec3::ZERO);
        let before = camera.position;
        let mut orbit = OrbitController::default();
        orbit.sync_with_camera(&camera);
        orbit.update(&mut camera, &CameraInput::new(), 1.0 / 60.0);
        assert!((camera.position - before).length() < 1e-3);
    }

    #[test]
    fn damping_spreads_a_drag_over_several_frames() {
        let mut camera = Camera::default();
        let mut orbit = OrbitController::new(Vec3::ZERO, 10.0).with_damping(0.07);
        let drag = CameraInput {
            mouse_delta: Vec2::new(100.0, 0.0),
            orbit_active: true,
            ..Default::default()
        };
        orbit.update(&mut camera, &drag, 0.016);
        let after_drag = orbit.azimuth;
        orbit.update(&mut camera, &CameraInput::new(), 0.016);
        assert!(orbit.azimuth > after_drag, "inertia keeps rotating after release");
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = Camera::default();
        let mut orbit = OrbitController::new(Vec3::ZERO, 1.0);
        let input = CameraInput {
            scroll_delta: 1.0,
            ..Default::default()
        };
        orbit.update(&mut camera, &input, 0.016);
        assert_eq!(orbit.distance, orbit.min_distance);
    }
}
