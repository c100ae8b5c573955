//! Whole-application configuration, loadable from TOML.
//!
//! Every section is optional in the file; missing values fall back to the
//! component defaults.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::ConfigError;
use crate::input::InputConfig;
use crate::physics::PhysicsConfig;
use crate::shadow::CsmConfig;
use crate::vehicle::VehicleConfig;

/// Configuration of a [`DriveLoop`](crate::engine::DriveLoop).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub physics: PhysicsConfig,
    pub vehicle: VehicleConfig,
    pub csm: CsmConfig,
    pub input: InputConfig,
    pub camera: Camera,
}

impl DriveConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(source).context("failed to parse drive config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&source)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::info!(
            "Loaded config from {}: {} cascades, {} wheels",
            path.display(),
            config.csm.cascades,
            config.vehicle.wheels.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.physics.validate()?;
        self.vehicle.validate()?;
        self.csm.validate()?;
        self.input.validate()?;
        let (near, far) = (self.camera.near(), self.camera.far());
        if !(near > 0.0 && far > near) {
            return Err(ConfigError::InvalidDepthRange { near, far });
        }
        Ok(())
    }
}
