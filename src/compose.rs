//! Per-frame draw list.
//!
//! [`compose`] reads a [`Session`] and issues one draw per baked batch and
//! one per cube still drawn individually. It never mutates anything; the
//! renderer decides how the draws are grouped.

use glam::Mat4;

use crate::geometry::{point_model, CubeMesh};
use crate::session::Session;

/// Size of the attractor and current-position markers.
pub const MARKER_SIZE: f32 = 1.0;

/// Where composed draws go.
pub trait Canvas<H> {
    /// Draw one cube mesh with the given world transform.
    fn draw_mesh(&mut self, mesh: &CubeMesh, world: Mat4);

    /// Draw a baked batch. Its vertices are already in scene space, so
    /// `world` only carries the shared rotation.
    fn draw_batch(&mut self, batch: &H, world: Mat4);
}

/// The shared rotation applied to everything in the scene.
pub fn scene_rotation(angle: f32) -> Mat4 {
    Mat4::from_rotation_y(angle)
}

/// Issue every draw for the current frame.
///
/// Batches come first, then attractor markers, the current-position marker,
/// and finally the live points.
pub fn compose<H, C>(session: &Session<H>, canvas: &mut C)
where
    C: Canvas<H> + ?Sized,
{
    let rotation = scene_rotation(session.angle());
    let config = session.config();
    let meshes = session.meshes();

    for batch in session.batches() {
        canvas.draw_batch(batch.handle(), rotation);
    }

    for &attractor in &config.attractors {
        canvas.draw_mesh(&meshes.attractor, rotation * point_model(attractor, MARKER_SIZE));
    }

    canvas.draw_mesh(
        &meshes.current,
        rotation * point_model(session.current(), MARKER_SIZE),
    );

    for &point in session.live_points() {
        canvas.draw_mesh(&meshes.point, rotation * point_model(point, config.point_size));
    }
}
