// Input state collected from winit window events
//
// Cameras read a snapshot of this every frame instead of hooking the
// window's callbacks themselves.

use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels of a touchpad scroll that count as one wheel line
const PIXELS_PER_SCROLL_LINE: f64 = 20.0;

/// Movement keys relevant to the fly camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlyMovement {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub sprint: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    cursor: (f64, f64),
    left_button: bool,
    right_button: bool,
    scroll_delta: f32,
    movement: FlyMovement,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a window event. Events that are not input are ignored.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.set_cursor_position(position.x, position.y);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.set_mouse_button(*button, *state == ElementState::Pressed);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => {
                        (position.y / PIXELS_PER_SCROLL_LINE) as f32
                    }
                };
                self.add_scroll(lines);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.set_key(code, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered to unfocused windows
                self.left_button = false;
                self.right_button = false;
                self.movement = FlyMovement::default();
            }
            _ => {}
        }
    }

    pub fn set_cursor_position(&mut self, x: f64, y: f64) {
        self.cursor = (x, y);
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.left_button = pressed,
            MouseButton::Right => self.right_button = pressed,
            _ => {}
        }
    }

    /// Positive values scroll away from the user
    pub fn add_scroll(&mut self, lines: f32) {
        self.scroll_delta += lines;
    }

    pub fn set_key(&mut self, code: KeyCode, pressed: bool) {
        let key = match code {
            KeyCode::KeyW => &mut self.movement.forward,
            KeyCode::KeyS => &mut self.movement.backward,
            KeyCode::KeyA => &mut self.movement.left,
            KeyCode::KeyD => &mut self.movement.right,
            KeyCode::Space => &mut self.movement.up,
            KeyCode::ControlLeft => &mut self.movement.down,
            KeyCode::ShiftLeft => &mut self.movement.sprint,
            _ => return,
        };
        *key = pressed;
    }

    pub fn cursor_position(&self) -> (f64, f64) {
        self.cursor
    }

    pub fn left_button_down(&self) -> bool {
        self.left_button
    }

    pub fn right_button_down(&self) -> bool {
        self.right_button
    }

    /// Scroll accumulated since the last `end_frame()`
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }

    pub fn fly_movement(&self) -> FlyMovement {
        self.movement
    }

    /// Reset per-frame accumulators. Call after the cameras were updated.
    pub fn end_frame(&mut self) {
        self.scroll_delta = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_track_press_and_release() {
        let mut input = InputState::new();
        input.set_mouse_button(MouseButton::Left, true);
        input.set_mouse_button(MouseButton::Right, true);
        input.set_mouse_button(MouseButton::Middle, true);
        assert!(input.left_button_down());
        assert!(input.right_button_down());

        input.set_mouse_button(MouseButton::Left, false);
        assert!(!input.left_button_down());
        assert!(input.right_button_down());
    }

    #[test]
    fn scroll_accumulates_until_end_of_frame() {
        let mut input = InputState::new();
        input.add_scroll(1.0);
        input.add_scroll(2.0);
        assert_eq!(input.scroll_delta(), 3.0);

        input.end_frame();
        assert_eq!(input.scroll_delta(), 0.0);
    }

    #[test]
    fn movement_keys() {
        let mut input = InputState::new();
        input.set_key(KeyCode::KeyW, true);
        input.set_key(KeyCode::ShiftLeft, true);
        input.set_key(KeyCode::KeyQ, true);

        let movement = input.fly_movement();
        assert!(movement.forward && movement.sprint);
        assert!(!movement.backward && !movement.up);

        input.set_key(KeyCode::KeyW, false);
        assert!(!input.fly_movement().forward);
    }

    #[test]
    fn losing_focus_releases_everything() {
        let mut input = InputState::new();
        input.set_key(KeyCode::KeyD, true);
        input.set_mouse_button(MouseButton::Left, true);

        input.handle_window_event(&WindowEvent::Focused(false));
        assert_eq!(input.fly_movement(), FlyMovement::default());
        assert!(!input.left_button_down());
    }
}
