//! Orbit camera around the scene center.

use glam::{Mat4, Vec2, Vec3};

const DRAG_SENSITIVITY: f32 = 0.005;
const ZOOM_STEP: f32 = 0.3;
const PITCH_LIMIT: f32 = 1.5;
const MIN_DISTANCE: f32 = 0.5;
const MAX_DISTANCE: f32 = 20.0;

/// Orbit camera looking at the origin, where the rotation axis of the scene
/// passes through.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Horizontal rotation angle in radians.
    pub yaw: f32,
    /// Vertical rotation angle in radians.
    pub pitch: f32,
    /// Distance from the target point.
    pub distance: f32,
    /// Point the camera orbits around.
    pub target: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.3,
            distance: 2.5,
            target: Vec3::ZERO,
            fov_y: 45.0_f32.to_radians(),
        }
    }

    /// Calculate the camera's world position.
    pub fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov_y, aspect, 0.01, 100.0);
        proj * self.view_matrix()
    }

    /// Orbit by a mouse drag of `delta` pixels.
    pub fn orbit(&mut self, delta: Vec2) {
        self.yaw -= delta.x * DRAG_SENSITIVITY;
        self.pitch = (self.pitch + delta.y * DRAG_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Move closer for positive `lines`, further for negative.
    pub fn zoom(&mut self, lines: f32) {
        self.distance = (self.distance - lines * ZOOM_STEP).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_clamps_pitch() {
        let mut camera = Camera::new();
        camera.orbit(Vec2::new(0.0, 10_000.0));
        assert_eq!(camera.pitch, PITCH_LIMIT);
    }

    #[test]
    fn test_zoom_clamps_distance() {
        let mut camera = Camera::new();
        camera.zoom(100.0);
        assert_eq!(camera.distance, MIN_DISTANCE);
        camera.zoom(-1000.0);
        assert_eq!(camera.distance, MAX_DISTANCE);
    }

    #[test]
    fn test_position_at_distance() {
        let camera = Camera::new();
        assert!((camera.position().length() - camera.distance).abs() < 1e-5);
    }
}
