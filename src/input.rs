//! Window events folded into the per-frame [`FrameInput`].
//!
//! Escape latches quit. Space pauses while held, Shift speeds the simulation up
//! while held. Wheel motion accumulates until the next frame takes it.

use winit::event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::frame::FrameInput;

/// Wheel units reported per line of a line-based wheel.
const UNITS_PER_LINE: f64 = 120.0;

#[derive(Debug, Default)]
pub(crate) struct InputState {
    quit: bool,
    space_held: bool,
    shift_held: bool,
    scroll: f64,
}

impl InputState {
    /// Records `event` if it is one of the tracked inputs.
    pub(crate) fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => self.handle_key(*code, *state),
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift_held = modifiers.state().shift_key();
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y as f64 * UNITS_PER_LINE,
                    MouseScrollDelta::PixelDelta(position) => position.y,
                };
            }
            // Held keys are lost with focus
            WindowEvent::Focused(false) => {
                self.space_held = false;
                self.shift_held = false;
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, code: KeyCode, state: ElementState) {
        let pressed = state == ElementState::Pressed;
        match code {
            KeyCode::Escape => self.quit |= pressed,
            KeyCode::Space => self.space_held = pressed,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => self.shift_held = pressed,
            _ => {}
        }
    }

    /// Snapshot for the next frame. Consumes the accumulated wheel delta.
    pub(crate) fn take_frame_input(&mut self) -> FrameInput {
        FrameInput {
            quit: self.quit,
            pause: self.space_held,
            fast: self.shift_held,
            scroll_delta: std::mem::take(&mut self.scroll),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_frame_flags() {
        let mut input = InputState::default();
        input.handle_key(KeyCode::Space, ElementState::Pressed);
        input.handle_key(KeyCode::ShiftLeft, ElementState::Pressed);
        input.handle_key(KeyCode::KeyA, ElementState::Pressed);

        let frame = input.take_frame_input();
        assert!(frame.pause);
        assert!(frame.fast);
        assert!(!frame.quit);

        input.handle_key(KeyCode::Space, ElementState::Released);
        input.handle_key(KeyCode::ShiftLeft, ElementState::Released);
        let frame = input.take_frame_input();
        assert!(!frame.pause);
        assert!(!frame.fast);
    }

    #[test]
    fn escape_latches_quit() {
        let mut input = InputState::default();
        input.handle_key(KeyCode::Escape, ElementState::Pressed);
        input.handle_key(KeyCode::Escape, ElementState::Released);
        assert!(input.take_frame_input().quit);
        assert!(input.take_frame_input().quit);
    }

    #[test]
    fn wheel_delta_is_consumed_per_frame() {
        let mut input = InputState::default();
        input.handle_window_event(&WindowEvent::Focused(true));
        input.scroll += 2.0 * UNITS_PER_LINE;
        input.scroll -= 30.0;

        assert_eq!(input.take_frame_input().scroll_delta, 210.0);
        assert_eq!(input.take_frame_input().scroll_delta, 0.0);
    }

    #[test]
    fn losing_focus_releases_held_keys() {
        let mut input = InputState::default();
        input.handle_key(KeyCode::Space, ElementState::Pressed);
        input.handle_key(KeyCode::ShiftRight, ElementState::Pressed);
        input.handle_window_event(&WindowEvent::Focused(false));

        let frame = input.take_frame_input();
        assert!(!frame.pause);
        assert!(!frame.fast);
    }
}
