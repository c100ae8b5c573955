//! Error types.
//!
//! Configuration problems and physics resource misuse are fatal and surface
//! as typed errors at setup time. Transient device problems (gamepad loss,
//! pointer-lock denial) never reach this module; the input sampler logs and
//! recovers from them locally.

use thiserror::Error;

/// Invalid setup parameters. Reported once, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cascade count must be between 1 and {max}, got {count}")]
    InvalidCascadeCount { count: usize, max: usize },

    #[error("split mode is `custom` but no split callback was provided")]
    MissingCustomSplit,

    #[error("custom split callback returned invalid splits: {0}")]
    InvalidSplits(String),

    #[error("invalid camera depth range: near = {near}, far = {far}")]
    InvalidDepthRange { near: f32, far: f32 },

    #[error("a vehicle needs exactly 4 wheels, got {0}")]
    WheelCount(usize),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Misuse of the physics world.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("rigid body mass must be finite and non-negative, got {0}")]
    InvalidMass(f32),

    #[error("invalid collider shape: {0}")]
    InvalidShape(String),

    #[error("unknown rigid body handle")]
    UnknownBody,
}

/// Setup failure of a component that both validates configuration and
/// creates physics bodies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Physics(#[from] PhysicsError),
}
