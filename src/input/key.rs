//! Keyboard keys understood by the input sampler.

/// Keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    // Driving
    W,
    A,
    S,
    D,

    // Arrow keys
    Left,
    Right,
    Up,
    Down,

    /// Brake.
    Space,
    /// Respawn the vehicle.
    R,
}

impl Key {
    /// Convert from winit key.
    #[cfg(feature = "window")]
    pub fn from_winit(key: &winit::keyboard::Key) -> Option<Self> {
        use winit::keyboard::{Key as WKey, NamedKey};

        match key {
            WKey::Character(c) => {
                let c = c.chars().next()?;
                match c.to_ascii_lowercase() {
                    'w' => Some(Key::W),
                    'a' => Some(Key::A),
                    's' => Some(Key::S),
                    'd' => Some(Key::D),
                    'r' => Some(Key::R),
                    ' ' => Some(Key::Space),
                    _ => None,
                }
            }
            WKey::Named(named) => match named {
                NamedKey::Space => Some(Key::Space),
                NamedKey::ArrowLeft => Some(Key::Left),
                NamedKey::ArrowRight => Some(Key::Right),
                NamedKey::ArrowUp => Some(Key::Up),
                NamedKey::ArrowDown => Some(Key::Down),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(all(test, feature = "window"))]
mod tests {
    use super::*;
    use winit::keyboard::{Key as WKey, NamedKey};

    #[test]
    fn test_from_winit() {
        assert_eq!(Key::from_winit(&WKey::Character("W".into())), Some(Key::W));
        assert_eq!(Key::from_winit(&WKey::Named(NamedKey::ArrowUp)), Some(Key::Up));
        assert_eq!(Key::from_winit(&WKey::Named(NamedKey::Space)), Some(Key::Space));
        assert_eq!(Key::from_winit(&WKey::Character("q".into())), None);
        // Keys the sampler has no binding for are dropped at the boundary.
        assert_eq!(Key::from_winit(&WKey::Named(NamedKey::Escape)), None);
        assert_eq!(Key::from_winit(&WKey::Named(NamedKey::Shift)), None);
    }
}
