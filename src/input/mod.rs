//! Keyboard, gamepad and pointer sampling.
//!
//! Events are pushed into an [`InputSampler`] as they arrive; once per frame
//! the vehicle controller calls [`InputSampler::sample`], which also polls the
//! tracked gamepad. A connected gamepad overrides the keyboard instead of
//! blending with it.

mod key;

pub use key::Key;

use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Raw input event from the platform layer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    GamepadConnected { index: usize, id: String },
    GamepadDisconnected { index: usize },
    /// Relative pointer motion in pixels.
    PointerMove { dx: f32, dy: f32 },
    PointerLockChanged(bool),
    /// The platform refused to lock the pointer.
    PointerLockError(String),
}

/// Polled state of one gamepad.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadState {
    /// Axis values in `[-1, 1]`. Axis 0 is right-positive, axis 1 down-positive.
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
}

/// Platform gamepad poll.
pub trait GamepadSource {
    /// Current state of the gamepad at `index`, or `None` if it is gone.
    fn gamepad(&self, index: usize) -> Option<GamepadState>;
}

/// A platform without gamepad support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGamepads;

impl GamepadSource for NoGamepads {
    fn gamepad(&self, _index: usize) -> Option<GamepadState> {
        None
    }
}

impl GamepadSource for [GamepadState] {
    fn gamepad(&self, index: usize) -> Option<GamepadState> {
        self.get(index).cloned()
    }
}

/// Input sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Gamepad axis deflection ignored around zero. Default: 0.25.
    pub deadzone: f32,
    /// Gamepad button that brakes. Default: 0.
    pub brake_button: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.25,
            brake_button: 0,
        }
    }
}

impl InputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(ConfigError::invalid(
                "input.deadzone",
                format!("must be in [0, 1), got {}", self.deadzone),
            ));
        }
        Ok(())
    }
}

/// One frame of driver input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    /// `x` steers (+1 = left), `y` drives (+1 = forward). Both in `[-1, 1]`.
    pub movement: Vec2,
    pub brake: bool,
    /// Accumulated pointer look offset.
    pub look: Vec2,
    pub pointer_locked: bool,
    /// Respawn was requested since the last sample.
    pub respawn: bool,
}

/// Rescale an axis so that `|raw| <= threshold` maps to zero and `|raw| = 1`
/// maps to one, keeping the sign of `raw`.
pub fn deadzone(raw: f32, threshold: f32) -> f32 {
    let magnitude = ((raw.abs() - threshold) / (1.0 - threshold))
        .max(0.0)
        .min(raw.abs());
    if raw > 0.0 {
        magnitude
    } else if raw < 0.0 {
        -magnitude
    } else {
        0.0
    }
}

/// Turns keyboard, gamepad and pointer events into [`InputSample`]s.
#[derive(Debug, Default)]
pub struct InputSampler {
    config: InputConfig,
    keys: HashSet<Key>,
    gamepad_index: Option<usize>,
    look: Vec2,
    pointer_locked: bool,
    respawn_requested: bool,
}

impl InputSampler {
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Index of the gamepad overriding the keyboard, if any.
    pub fn gamepad_index(&self) -> Option<usize> {
        self.gamepad_index
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    pub fn handle_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown(key) => {
                let newly_pressed = self.keys.insert(*key);
                if newly_pressed && *key == Key::R {
                    self.respawn_requested = true;
                }
            }
            InputEvent::KeyUp(key) => {
                self.keys.remove(key);
            }
            InputEvent::GamepadConnected { index, id } => {
                tracing::debug!("Gamepad connected at index {}: {}", index, id);
                // First connected gamepad wins.
                if self.gamepad_index.is_none() {
                    self.gamepad_index = Some(*index);
                }
            }
            InputEvent::GamepadDisconnected { index } => {
                tracing::debug!("Gamepad disconnected at index {}", index);
                if self.gamepad_index == Some(*index) {
                    self.gamepad_index = None;
                }
            }
            InputEvent::PointerMove { dx, dy } => {
                self.look.x -= dx;
                self.look.y -= dy;
            }
            InputEvent::PointerLockChanged(locked) => {
                self.pointer_locked = *locked;
            }
            InputEvent::PointerLockError(reason) => {
                tracing::warn!("Pointer lock failed, using unlocked pointer: {}", reason);
                self.pointer_locked = false;
            }
        }
    }

    /// Movement from held keys. Opposing keys cancel.
    fn keyboard_movement(&self) -> Vec2 {
        let held = |a: Key, b: Key| self.keys.contains(&a) || self.keys.contains(&b);
        let mut movement = Vec2::ZERO;
        if held(Key::W, Key::Up) {
            movement.y += 1.0;
        }
        if held(Key::A, Key::Left) {
            movement.x += 1.0;
        }
        if held(Key::S, Key::Down) {
            movement.y -= 1.0;
        }
        if held(Key::D, Key::Right) {
            movement.x -= 1.0;
        }
        movement
    }

    /// Produce this frame's input.
    pub fn sample<G: GamepadSource + ?Sized>(&mut self, gamepads: &G) -> InputSample {
        let mut movement = self.keyboard_movement();
        let mut brake = self.keys.contains(&Key::Space);

        if let Some(index) = self.gamepad_index {
            match gamepads.gamepad(index) {
                Some(pad) => {
                    let axis = |i: usize| pad.axes.get(i).copied().unwrap_or(0.0);
                    movement = Vec2::new(
                        -deadzone(axis(0), self.config.deadzone),
                        -deadzone(axis(1), self.config.deadzone),
                    );
                    brake |= pad
                        .buttons
                        .get(self.config.brake_button)
                        .copied()
                        .unwrap_or(false);
                }
                None => {
                    tracing::warn!(
                        "Gamepad {} is no longer reported, falling back to keyboard",
                        index
                    );
                    self.gamepad_index = None;
                }
            }
        }

        InputSample {
            movement: movement.clamp(Vec2::NEG_ONE, Vec2::ONE),
            brake,
            look: self.look,
            pointer_locked: self.pointer_locked,
            respawn: std::mem::take(&mut self.respawn_requested),
        }
    }

    /// Forget all device state. Used on teardown.
    pub fn reset(&mut self) {
        self.keys.clear();
        self.gamepad_index = None;
        self.look = Vec2::ZERO;
        self.pointer_locked = false;
        self.respawn_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(x: f32, y: f32) -> GamepadState {
        GamepadState {
            axes: vec![x, y],
            buttons: vec![false; 4],
        }
    }

    #[test]
    fn test_deadzone_sign_and_magnitude() {
        for t in [0.0, 0.1, 0.25, 0.5, 0.9, 0.99] {
            for i in -100..=100 {
                let raw = i as f32 / 100.0;
                let out = deadzone(raw, t);
                assert!(out.abs() <= raw.abs(), "deadzone({raw}, {t}) = {out}");
                assert!(out == 0.0 || out.signum() == raw.signum());
            }
        }
    }

    #[test]
    fn test_deadzone_values() {
        assert_eq!(deadzone(0.2, 0.25), 0.0);
        assert_eq!(deadzone(-0.25, 0.25), 0.0);
        assert!((deadzone(1.0, 0.25) - 1.0).abs() < 1e-6);
        assert!((deadzone(-0.625, 0.25) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_keyboard_mapping() {
        let mut sampler = InputSampler::default();
        sampler.handle_event(&InputEvent::KeyDown(Key::W));
        sampler.handle_event(&InputEvent::KeyDown(Key::Left));
        let sample = sampler.sample(&NoGamepads);
        assert_eq!(sample.movement, Vec2::new(1.0, 1.0));
        assert!(!sample.brake);

        sampler.handle_event(&InputEvent::KeyUp(Key::W));
        sampler.handle_event(&InputEvent::KeyDown(Key::S));
        sampler.handle_event(&InputEvent::KeyDown(Key::Space));
        let sample = sampler.sample(&NoGamepads);
        assert_eq!(sample.movement, Vec2::new(1.0, -1.0));
        assert!(sample.brake);
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let mut sampler = InputSampler::default();
        for key in [Key::W, Key::Down, Key::A, Key::D] {
            sampler.handle_event(&InputEvent::KeyDown(key));
        }
        assert_eq!(sampler.sample(&NoGamepads).movement, Vec2::ZERO);
    }

    #[test]
    fn test_gamepad_overrides_keyboard() {
        let mut sampler = InputSampler::default();
        sampler.handle_event(&InputEvent::KeyDown(Key::W));
        sampler.handle_event(&InputEvent::GamepadConnected {
            index: 0,
            id: "pad".into(),
        });

        // Stick pushed up and to the right.
        let pads = [pad(1.0, -1.0)];
        let sample = sampler.sample(&pads[..]);
        assert!((sample.movement - Vec2::new(-1.0, 1.0)).length() < 1e-6);

        // Centered stick overrides held keys too.
        let pads = [pad(0.1, 0.0)];
        assert_eq!(sampler.sample(&pads[..]).movement, Vec2::ZERO);
    }

    #[test]
    fn test_gamepad_brake_button() {
        let mut sampler = InputSampler::new(InputConfig {
            brake_button: 2,
            ..InputConfig::default()
        });
        sampler.handle_event(&InputEvent::GamepadConnected {
            index: 0,
            id: "pad".into(),
        });
        let mut state = pad(0.0, 0.0);
        state.buttons[2] = true;
        assert!(sampler.sample(&[state][..]).brake);
    }

    #[test]
    fn test_gamepad_connect_disconnect_falls_back_to_keyboard() {
        let mut sampler = InputSampler::default();
        sampler.handle_event(&InputEvent::KeyDown(Key::Up));
        sampler.handle_event(&InputEvent::GamepadConnected {
            index: 1,
            id: "first".into(),
        });
        sampler.handle_event(&InputEvent::GamepadConnected {
            index: 2,
            id: "second".into(),
        });
        assert_eq!(sampler.gamepad_index(), Some(1));

        // Only the tracked index clears.
        sampler.handle_event(&InputEvent::GamepadDisconnected { index: 2 });
        assert_eq!(sampler.gamepad_index(), Some(1));
        sampler.handle_event(&InputEvent::GamepadDisconnected { index: 1 });
        assert_eq!(sampler.gamepad_index(), None);

        let pads = [pad(0.0, 0.0), pad(0.0, 1.0), pad(0.0, 0.0)];
        assert_eq!(sampler.sample(&pads[..]).movement, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_missing_gamepad_reverts_to_keyboard() {
        let mut sampler = InputSampler::default();
        sampler.handle_event(&InputEvent::KeyDown(Key::A));
        sampler.handle_event(&InputEvent::GamepadConnected {
            index: 3,
            id: "pad".into(),
        });
        let sample = sampler.sample(&NoGamepads);
        assert_eq!(sample.movement, Vec2::new(1.0, 0.0));
        assert_eq!(sampler.gamepad_index(), None);
    }

    #[test]
    fn test_pointer_and_respawn() {
        let mut sampler = InputSampler::default();
        sampler.handle_event(&InputEvent::PointerMove { dx: 3.0, dy: -2.0 });
        sampler.handle_event(&InputEvent::PointerLockChanged(true));
        sampler.handle_event(&InputEvent::KeyDown(Key::R));
        let sample = sampler.sample(&NoGamepads);
        assert_eq!(sample.look, Vec2::new(-3.0, 2.0));
        assert!(sample.pointer_locked);
        assert!(sample.respawn);

        // Holding the key does not respawn again.
        sampler.handle_event(&InputEvent::KeyDown(Key::R));
        assert!(!sampler.sample(&NoGamepads).respawn);

        sampler.handle_event(&InputEvent::PointerLockError("denied".into()));
        assert!(!sampler.sample(&NoGamepads).pointer_locked);

        sampler.reset();
        let sample = sampler.sample(&NoGamepads);
        assert_eq!(sample, InputSample::default());
    }
}
