//! Skyline driving core
//!
//! A raycast vehicle on a rigid body world, driven by keyboard or gamepad,
//! with cascaded shadow maps fitted to the view camera.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **error** - Typed configuration and physics errors
//! 2. **config** - Aggregate TOML configuration
//! 3. **camera** - View camera and projections
//! 4. **input** - Keyboard, gamepad and pointer sampling
//! 5. **physics** - Rigid body simulation behind the `PhysicsBackend` trait
//! 6. **scene** - Render transforms and physics read-back
//! 7. **vehicle** - Raycast vehicle and its controller
//! 8. **shadow** - Cascaded shadow maps
//! 9. **engine** - Per-frame orchestration
//!
//! Rendering, asset loading and windowing are left to the host application.

pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod physics;
pub mod scene;
pub mod shadow;
pub mod vehicle;

// Re-export commonly used types
pub use camera::{Camera, Projection};
pub use config::DriveConfig;
pub use engine::{DriveLoop, FrameReport};
pub use error::{ConfigError, Error, PhysicsError};
pub use input::{
    GamepadSource, GamepadState, InputConfig, InputEvent, InputSample, InputSampler, Key,
};
pub use physics::{
    BodyDesc, BodyHandle, BodyState, ColliderShape, PhysicsBackend, PhysicsConfig, PhysicsWorld,
    Pose,
};
pub use scene::{RigidBodyBinding, Transform, WheelBinding};
pub use shadow::{CascadedShadowMap, CsmConfig, MaterialId, SplitMode};
pub use vehicle::{Vehicle, VehicleConfig, VehicleController, VehicleState, WheelSpec};

// Re-export glam for convenience
pub use glam;
