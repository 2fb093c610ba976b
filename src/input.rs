//! Keyboard and mouse input.
//!
//! [`Input`] folds raw window events into per-frame state: keys that went
//! down this frame (edge-triggered, auto-repeat ignored), keys held, the
//! left-drag delta and the wheel delta. [`KeyBindings`] maps the keys that
//! went down to [`Action`]s.
//!
//! ```ignore
//! input.handle_event(&event);
//! // once per frame:
//! for action in bindings.actions(&input) {
//!     match action {
//!         Action::Exit => event_loop.exit(),
//!         Action::Command(cmd) => session.apply(cmd, &mut gpu, &source),
//!     }
//! }
//! input.begin_frame();
//! ```

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::session::Command;

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Close the window.
    Exit,
    Command(Command),
}

/// Input state tracking for keyboard and mouse.
#[derive(Debug, Default)]
pub struct Input {
    keys_held: HashSet<KeyCode>,
    /// In press order, so several commands in one frame apply in order.
    keys_pressed: Vec<KeyCode>,

    dragging: bool,
    last_cursor: Option<Vec2>,
    drag_delta: Vec2,

    scroll_delta: f32,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Queries ==========

    /// Whether `key` went down this frame.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    /// Keys that went down this frame, oldest first.
    pub fn pressed_keys(&self) -> &[KeyCode] {
        &self.keys_pressed
    }

    /// Cursor movement this frame while the left button was held, in pixels.
    pub fn drag_delta(&self) -> Vec2 {
        self.drag_delta
    }

    /// Wheel movement this frame, in lines. Positive is away from the user.
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }

    // ========== Updates ==========

    /// Clear the per-frame state. Call after the frame has consumed it.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.drag_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    /// Process a winit window event.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.press(key),
                        ElementState::Released => self.release(key),
                    }
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = *state == ElementState::Pressed;
                if !self.dragging {
                    self.last_cursor = None;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
            }
            WindowEvent::Focused(false) => {
                self.keys_held.clear();
                self.dragging = false;
                self.last_cursor = None;
            }
            _ => {}
        }
    }

    fn press(&mut self, key: KeyCode) {
        // Held keys repeat; only the first press counts.
        if self.keys_held.insert(key) {
            self.keys_pressed.push(key);
        }
    }

    fn release(&mut self, key: KeyCode) {
        self.keys_held.remove(&key);
    }

    fn cursor_moved(&mut self, position: Vec2) {
        if self.dragging {
            if let Some(last) = self.last_cursor {
                self.drag_delta += position - last;
            }
            self.last_cursor = Some(position);
        }
    }
}

/// Key to [`Action`] table.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    map: HashMap<KeyCode, Action>,
}

impl KeyBindings {
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Bind `key`, replacing whatever it was bound to.
    pub fn bind(mut self, key: KeyCode, action: Action) -> Self {
        self.map.insert(key, action);
        self
    }

    pub fn get(&self, key: KeyCode) -> Option<Action> {
        self.map.get(&key).copied()
    }

    /// Actions for every bound key that went down this frame, in press order.
    pub fn actions<'a>(&'a self, input: &'a Input) -> impl Iterator<Item = Action> + 'a {
        input.pressed_keys().iter().filter_map(|&key| self.get(key))
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::empty()
            .bind(KeyCode::Escape, Action::Exit)
            .bind(KeyCode::KeyR, Action::Command(Command::Reset))
            .bind(KeyCode::KeyT, Action::Command(Command::ReloadConfig))
            .bind(KeyCode::KeyP, Action::Command(Command::ToggleRunning))
            .bind(KeyCode::KeyE, Action::Command(Command::ToggleSpin))
            .bind(KeyCode::KeyZ, Action::Command(Command::ResetRotationAngle))
            .bind(KeyCode::Space, Action::Command(Command::ManualStep))
            .bind(KeyCode::KeyA, Action::Command(Command::RandomizeAttractors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_is_edge_triggered() {
        let mut input = Input::new();
        input.press(KeyCode::KeyP);
        assert!(input.key_pressed(KeyCode::KeyP));
        assert!(input.key_held(KeyCode::KeyP));

        input.begin_frame();
        // Auto-repeat while held.
        input.press(KeyCode::KeyP);
        assert!(!input.key_pressed(KeyCode::KeyP));
        assert!(input.key_held(KeyCode::KeyP));

        input.release(KeyCode::KeyP);
        input.begin_frame();
        input.press(KeyCode::KeyP);
        assert!(input.key_pressed(KeyCode::KeyP));
    }

    #[test]
    fn test_bindings_in_press_order() {
        let mut input = Input::new();
        let bindings = KeyBindings::default();
        input.press(KeyCode::KeyR);
        input.press(KeyCode::KeyQ);
        input.press(KeyCode::KeyP);

        let actions: Vec<Action> = bindings.actions(&input).collect();
        assert_eq!(
            actions,
            vec![
                Action::Command(Command::Reset),
                Action::Command(Command::ToggleRunning)
            ]
        );
    }

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.get(KeyCode::Escape), Some(Action::Exit));
        assert_eq!(
            bindings.get(KeyCode::Space),
            Some(Action::Command(Command::ManualStep))
        );
        assert_eq!(
            bindings.get(KeyCode::KeyA),
            Some(Action::Command(Command::RandomizeAttractors))
        );
    }

    #[test]
    fn test_drag_only_while_dragging() {
        let mut input = Input::new();
        input.cursor_moved(Vec2::new(10.0, 10.0));
        assert_eq!(input.drag_delta(), Vec2::ZERO);

        input.dragging = true;
        input.cursor_moved(Vec2::new(10.0, 10.0));
        input.cursor_moved(Vec2::new(15.0, 8.0));
        input.cursor_moved(Vec2::new(20.0, 8.0));
        assert_eq!(input.drag_delta(), Vec2::new(10.0, -2.0));

        input.begin_frame();
        assert_eq!(input.drag_delta(), Vec2::ZERO);
    }
}
