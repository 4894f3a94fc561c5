// Orbit ("arc-ball") camera
//
// Left drag rotates around the orbit center, right drag moves the center
// in the camera plane, scrolling changes the distance.

use super::{cursor_delta, default_projection, Camera, InputState, PITCH_LIMIT};
use glam::{Mat4, Vec3};

pub const DEFAULT_ZOOM: f32 = 6.0;
const ROTATION_SPEED: f32 = 0.005;
const ZOOM_PER_SCROLL_LINE: f32 = 0.5;
const MIN_ZOOM: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct OrbitCamera {
    view: Mat4,
    projection: Mat4,
    last_cursor: Option<(f64, f64)>,
    yaw: f32,
    pitch: f32,
    zoom: f32,
    position: Vec3,
    /// Offset of the orbit center from the origin
    strafe: Vec3,
}

impl OrbitCamera {
    pub fn new(projection: Mat4) -> Self {
        let mut camera = Self {
            view: Mat4::IDENTITY,
            projection,
            last_cursor: None,
            yaw: 0.0,
            pitch: 0.0,
            zoom: DEFAULT_ZOOM,
            position: Vec3::ZERO,
            strafe: Vec3::ZERO,
        };
        camera.update_view();
        camera
    }

    pub fn with_default_projection(width: u32, height: u32) -> Self {
        Self::new(default_projection(width, height))
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Distance used by `update_from_input()`
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.max(MIN_ZOOM);
        self.update_view();
    }

    pub fn set_projection_matrix(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Update from a cursor position in window pixels.
    ///
    /// `dragging` rotates around the orbit center, `strafing` moves the
    /// center. Both use the cursor movement since the previous update.
    pub fn update(&mut self, x: f64, y: f64, zoom: f32, dragging: bool, strafing: bool) {
        let (dx, dy) = cursor_delta(&mut self.last_cursor, x, y);

        if dragging {
            self.yaw += dx * ROTATION_SPEED;
            self.pitch = (self.pitch + dy * ROTATION_SPEED).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }

        let orbit = self.orbit_offset(zoom.max(MIN_ZOOM));
        if strafing {
            let right = (-orbit).cross(Vec3::Y).normalize_or_zero();
            let up = right.cross(-orbit).normalize_or_zero();
            self.strafe += up * dy * ROTATION_SPEED + right * -dx * ROTATION_SPEED;
        }

        self.position = orbit + self.strafe;
        self.view = Mat4::look_at_rh(self.position, self.strafe, Vec3::Y);
    }

    fn orbit_offset(&self, zoom: f32) -> Vec3 {
        zoom * Vec3::new(
            self.pitch.cos() * -self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        )
    }

    fn update_view(&mut self) {
        self.position = self.orbit_offset(self.zoom) + self.strafe;
        self.view = Mat4::look_at_rh(self.position, self.strafe, Vec3::Y);
    }
}

impl Camera for OrbitCamera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn update_from_input(&mut self, input: &InputState, _dt: f32) {
        self.zoom = (self.zoom - input.scroll_delta() * ZOOM_PER_SCROLL_LINE).max(MIN_ZOOM);
        let (x, y) = input.cursor_position();
        self.update(
            x,
            y,
            self.zoom,
            input.left_button_down(),
            input.right_button_down(),
        );
    }
}
