// First-person fly camera
//
// The cursor steers, W/A/S/D move in the view direction, Space and left
// Ctrl move straight up and down, left Shift doubles the speed.

use super::{cursor_delta, default_projection, Camera, FlyMovement, InputState, PITCH_LIMIT};
use glam::{Mat4, Vec3};

const MOUSE_SENSITIVITY: f32 = 2.0;
const MOVEMENT_SPEED: f32 = 1.0;
const SPRINT_MULTIPLIER: f32 = 2.0;
const VERTICAL_SPEED: f32 = 2.5;

#[derive(Debug, Clone)]
pub struct FlyCamera {
    view: Mat4,
    projection: Mat4,
    last_cursor: Option<(f64, f64)>,
    yaw: f32,
    pitch: f32,
    position: Vec3,
}

impl FlyCamera {
    /// Camera at the origin looking down +x
    pub fn new(projection: Mat4) -> Self {
        let mut camera = Self {
            view: Mat4::IDENTITY,
            projection,
            last_cursor: None,
            yaw: 0.0,
            pitch: 0.0,
            position: Vec3::ZERO,
        };
        camera.update_view();
        camera
    }

    pub fn with_default_projection(width: u32, height: u32) -> Self {
        Self::new(default_projection(width, height))
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view();
    }

    /// Yaw is measured from +x towards +z, pitch upwards
    pub fn set_orientation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_view();
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    /// Update from a cursor position in window pixels and the held keys.
    /// `dt` is the frame time in seconds.
    pub fn update(&mut self, x: f64, y: f64, movement: FlyMovement, dt: f32) {
        let (dx, dy) = cursor_delta(&mut self.last_cursor, x, y);

        self.yaw += dx * MOUSE_SENSITIVITY * dt;
        self.pitch = (self.pitch - dy * MOUSE_SENSITIVITY * dt).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let forward = self.forward();
        let right = forward.cross(Vec3::Y).normalize();

        let sprint = if movement.sprint { SPRINT_MULTIPLIER } else { 1.0 };
        let speed = MOVEMENT_SPEED * sprint * dt;
        let vertical_speed = VERTICAL_SPEED * dt;

        if movement.forward {
            self.position += forward * speed;
        }
        if movement.backward {
            self.position -= forward * speed;
        }
        if movement.left {
            self.position -= right * speed;
        }
        if movement.right {
            self.position += right * speed;
        }
        if movement.up {
            self.position += Vec3::Y * vertical_speed;
        }
        if movement.down {
            self.position -= Vec3::Y * vertical_speed;
        }

        self.update_view();
    }

    fn update_view(&mut self) {
        self.view = Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y);
    }
}

impl Camera for FlyCamera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn update_from_input(&mut self, input: &InputState, dt: f32) {
        let (x, y) = input.cursor_position();
        self.update(x, y, input.fly_movement(), dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4Swizzles;

    fn keys(f: impl FnOnce(&mut FlyMovement)) -> FlyMovement {
        let mut movement = FlyMovement::default();
        f(&mut movement);
        movement
    }

    #[test]
    fn looks_down_positive_x_initially() {
        let camera = FlyCamera::with_default_projection(800, 600);
        assert!(camera.forward().abs_diff_eq(Vec3::X, 1e-6));

        let ahead = camera.view_matrix() * Vec3::new(5.0, 0.0, 0.0).extend(1.0);
        assert!(ahead.xyz().abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn forward_movement_scales_with_dt_and_sprint() {
        let mut camera = FlyCamera::with_default_projection(800, 600);
        camera.update(0.0, 0.0, keys(|k| k.forward = true), 0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));

        camera.update(0.0, 0.0, keys(|k| { k.forward = true; k.sprint = true }), 0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn strafing_uses_the_right_vector() {
        let mut camera = FlyCamera::with_default_projection(800, 600);
        camera.update(0.0, 0.0, keys(|k| k.right = true), 1.0);
        // forward +x, up +y => right +z
        assert!(camera.position().abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn vertical_movement_ignores_sprint() {
        let mut camera = FlyCamera::with_default_projection(800, 600);
        camera.update(0.0, 0.0, keys(|k| { k.up = true; k.sprint = true }), 0.2);
        assert_relative_eq!(camera.position().y, 0.5, epsilon = 1e-6);

        camera.update(0.0, 0.0, keys(|k| k.down = true), 0.2);
        assert_relative_eq!(camera.position().y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn mouse_turns_the_camera() {
        let mut camera = FlyCamera::with_default_projection(800, 600);
        camera.update(0.0, 0.0, FlyMovement::default(), 0.01);
        camera.update(50.0, 0.0, FlyMovement::default(), 0.01);

        // yaw = 50 * 2 * 0.01 = 1 rad, towards +z
        let forward = camera.forward();
        assert_relative_eq!(forward.x, 1f32.cos(), epsilon = 1e-5);
        assert_relative_eq!(forward.z, 1f32.sin(), epsilon = 1e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = FlyCamera::with_default_projection(800, 600);
        camera.update(0.0, 0.0, FlyMovement::default(), 1.0);
        camera.update(0.0, -1000.0, FlyMovement::default(), 1.0);

        assert_relative_eq!(camera.forward().y, PITCH_LIMIT.sin(), epsilon = 1e-5);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn orientation_can_be_set() {
        let mut camera = FlyCamera::with_default_projection(800, 600);
        camera.set_position(Vec3::new(0.0, 0.0, 6.0));
        camera.set_orientation(-std::f32::consts::FRAC_PI_2, 0.0);

        assert!(camera.forward().abs_diff_eq(-Vec3::Z, 1e-6));
        let origin = camera.view_matrix() * Vec3::ZERO.extend(1.0);
        assert!(origin.xyz().abs_diff_eq(Vec3::new(0.0, 0.0, -6.0), 1e-5));
    }
}
