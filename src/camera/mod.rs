// Cameras driven by mouse and keyboard input
//
// Both cameras own their state. The application forwards window events
// into an `InputState` and updates its camera once per frame.

pub mod fly;
pub mod input;
pub mod orbit;

pub use fly::FlyCamera;
pub use input::{FlyMovement, InputState};
pub use orbit::OrbitCamera;

use crate::math::create_perspective_projection_matrix;
use glam::{Mat4, Vec3};

/// Pitch stays this far away from straight up/down
pub(crate) const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

pub trait Camera {
    fn position(&self) -> Vec3;
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self) -> Mat4;

    fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Advance the camera by one frame of input
    fn update_from_input(&mut self, input: &InputState, dt: f32);
}

/// 60° vertical field of view, near 0.1, far 1000
pub fn default_projection(width: u32, height: u32) -> Mat4 {
    create_perspective_projection_matrix(
        60f32.to_radians(),
        width as f32 / height.max(1) as f32,
        0.1,
        1000.0,
    )
}

/// Cursor movement since the previous update, zero on the first one
pub(crate) fn cursor_delta(last: &mut Option<(f64, f64)>, x: f64, y: f64) -> (f32, f32) {
    let delta = match *last {
        Some((last_x, last_y)) => ((x - last_x) as f32, (y - last_y) as f32),
        None => (0.0, 0.0),
    };
    *last = Some((x, y));
    delta
}
