//! Driveable raycast vehicle.
//!
//! A [`Vehicle`] owns one chassis body and four [`Wheel`]s. The
//! [`VehicleController`] turns an [`InputSample`] into smoothed engine force,
//! steering and brake values each tick, then runs the raycast dynamics.

pub mod raycast;
pub mod wheel;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, PhysicsError};
use crate::input::InputSample;
use crate::physics::{BodyDesc, ColliderShape, PhysicsBackend, Pose};

pub use self::raycast::{RaycastVehicle, CHASSIS_FORWARD};
pub use self::wheel::{Wheel, WheelContact, WheelSide, WheelSpec};

/// Configuration of the chassis, the wheels and the control law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Chassis mass in kg. Default: 1685.
    pub chassis_mass: f32,
    /// Half extents of the chassis box. Default: (0.9, 0.35, 2.3).
    pub chassis_half_extents: Vec3,
    /// Where the chassis is placed on spawn and respawn. Default: (0, 1.5, 0).
    pub spawn_position: Vec3,
    pub spawn_rotation: Quat,
    /// Exactly four wheels: front-right, front-left, rear-right, rear-left.
    pub wheels: Vec<WheelSpec>,
    /// Engine force per wheel at full throttle. Default: 12000.
    pub max_engine_force: f32,
    /// Steering angle at full lock, in radians. Default: 0.6.
    pub max_steer: f32,
    /// Brake impulse limit per wheel. Default: 65.
    pub max_brake: f32,
    /// Forward thrust is cut above this speed. Default: 88 km/h.
    pub max_speed_kmh: f32,
    /// Exponential smoothing rate for engine force and steering. Default: 20.
    pub smoothing_rate: f32,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            chassis_mass: 1685.0,
            chassis_half_extents: Vec3::new(0.9, 0.35, 2.3),
            spawn_position: Vec3::new(0.0, 1.5, 0.0),
            spawn_rotation: Quat::IDENTITY,
            wheels: WheelSpec::standard_layout(1.5, 0.2, 1.3, -1.45, &WheelSpec::default()),
            max_engine_force: 12000.0,
            max_steer: 0.6,
            max_brake: 65.0,
            max_speed_kmh: 88.0,
            smoothing_rate: 20.0,
        }
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheels.len() != 4 {
            return Err(ConfigError::WheelCount(self.wheels.len()));
        }
        for (index, wheel) in self.wheels.iter().enumerate() {
            wheel.validate(index)?;
        }
        if !(self.chassis_mass > 0.0 && self.chassis_mass.is_finite()) {
            return Err(ConfigError::invalid(
                "vehicle.chassis_mass",
                format!("must be positive, got {}", self.chassis_mass),
            ));
        }
        if !(self.chassis_half_extents.min_element() > 0.0 && self.chassis_half_extents.is_finite())
        {
            return Err(ConfigError::invalid(
                "vehicle.chassis_half_extents",
                "must be positive",
            ));
        }
        if self.max_engine_force < 0.0 || self.max_steer < 0.0 || self.max_brake < 0.0 {
            return Err(ConfigError::invalid(
                "vehicle",
                "max engine force, steer and brake must be non-negative",
            ));
        }
        if !(self.smoothing_rate > 0.0) {
            return Err(ConfigError::invalid(
                "vehicle.smoothing_rate",
                "must be positive",
            ));
        }
        Ok(())
    }

    pub fn spawn_pose(&self) -> Pose {
        Pose::new(self.spawn_position, self.spawn_rotation.normalize())
    }
}

/// Values carried between controller ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleState {
    /// Smoothed engine force per wheel.
    pub engine_force: f32,
    /// Smoothed steering angle of the steerable wheels.
    pub steering: f32,
    /// Signed forward speed from the last tick.
    pub speed_kmh: f32,
}

impl VehicleState {
    /// Move engine force and steering a `factor` share of the way to their targets.
    pub fn approach(&mut self, engine_force: f32, steering: f32, factor: f32) {
        self.engine_force += (engine_force - self.engine_force) * factor;
        self.steering += (steering - self.steering) * factor;
    }
}

/// Share of the remaining distance covered in `dt` by exponential smoothing
/// at `rate`. Stays in [0, 1] for any `dt`.
pub fn smoothing_factor(rate: f32, dt: f32) -> f32 {
    (1.0 - (-rate * dt.max(0.0)).exp()).clamp(0.0, 1.0)
}

/// A chassis body in a physics world plus its four wheels.
#[derive(Debug, Clone)]
pub struct Vehicle<H> {
    chassis: H,
    spawn: Pose,
    dynamics: RaycastVehicle<H>,
}

impl<H: Copy + PartialEq> Vehicle<H> {
    /// Create the chassis body and wheels described by `config`.
    pub fn spawn<B>(physics: &mut B, config: &VehicleConfig) -> Result<Self, Error>
    where
        B: PhysicsBackend<Handle = H> + ?Sized,
    {
        config.validate()?;
        let specs: [WheelSpec; 4] = config
            .wheels
            .clone()
            .try_into()
            .map_err(|wheels: Vec<WheelSpec>| ConfigError::WheelCount(wheels.len()))?;

        let shape = ColliderShape::Box {
            half_extents: config.chassis_half_extents,
        };
        let inertia = shape.local_inertia(config.chassis_mass);
        let spawn = config.spawn_pose();
        let chassis = physics.create_body(
            BodyDesc::new(shape, config.chassis_mass)
                .with_position(spawn.position)
                .with_rotation(spawn.rotation)
                .with_sleep(false),
        )?;

        tracing::info!(
            "Vehicle spawned at {} (mass = {} kg)",
            spawn.position,
            config.chassis_mass
        );
        Ok(Self {
            chassis,
            spawn,
            dynamics: RaycastVehicle::new(specs.map(Wheel::new), inertia.recip()),
        })
    }

    /// Release the chassis body. Returns `false` if it was already gone.
    pub fn despawn<B>(self, physics: &mut B) -> bool
    where
        B: PhysicsBackend<Handle = H> + ?Sized,
    {
        let removed = physics.remove_body(self.chassis);
        tracing::info!("Vehicle despawned");
        removed
    }

    /// Put the chassis back at its spawn pose, at rest.
    pub fn respawn<B>(&mut self, physics: &mut B) -> Result<(), PhysicsError>
    where
        B: PhysicsBackend<Handle = H> + ?Sized,
    {
        physics.set_pose(self.chassis, self.spawn)?;
        physics.set_velocity(self.chassis, Vec3::ZERO, Vec3::ZERO)?;
        self.dynamics.reset();
        tracing::info!("Vehicle respawned at {}", self.spawn.position);
        Ok(())
    }

    pub fn chassis(&self) -> H {
        self.chassis
    }

    pub fn wheels(&self) -> &[Wheel<H>; 4] {
        self.dynamics.wheels()
    }

    pub fn dynamics(&self) -> &RaycastVehicle<H> {
        &self.dynamics
    }

    pub fn dynamics_mut(&mut self) -> &mut RaycastVehicle<H> {
        &mut self.dynamics
    }

    /// Wheel poses for the current chassis pose, or `None` if the chassis is gone.
    pub fn wheel_poses<B>(&self, physics: &B) -> Option<[Pose; 4]>
    where
        B: PhysicsBackend<Handle = H> + ?Sized,
    {
        let chassis = physics.query_transform(self.chassis)?;
        Some(self.dynamics.wheel_poses(&chassis))
    }
}

/// Per-tick control law: input, smoothing, wheel forces.
#[derive(Debug, Clone)]
pub struct VehicleController {
    config: VehicleConfig,
    state: VehicleState,
}

impl VehicleController {
    pub fn new(config: VehicleConfig) -> Self {
        Self {
            config,
            state: VehicleState::default(),
        }
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Apply one tick of input to `vehicle` and run its dynamics.
    pub fn tick<B>(
        &mut self,
        vehicle: &mut Vehicle<B::Handle>,
        physics: &mut B,
        input: &InputSample,
        dt: f32,
    ) -> Result<(), PhysicsError>
    where
        B: PhysicsBackend + ?Sized,
    {
        let target_engine = self.config.max_engine_force * input.movement.y;
        let target_steer = self.config.max_steer * input.movement.x;
        self.state.approach(
            target_engine,
            target_steer,
            smoothing_factor(self.config.smoothing_rate, dt),
        );

        let over_speed =
            self.state.engine_force > 0.0 && self.state.speed_kmh > self.config.max_speed_kmh;
        let engine = if input.brake || over_speed {
            0.0
        } else {
            self.state.engine_force
        };
        let brake = if input.brake { self.config.max_brake } else { 0.0 };

        let dynamics = vehicle.dynamics_mut();
        for index in 0..4 {
            dynamics.apply_engine_force(engine, index);
            dynamics.set_brake(brake, index);
            if dynamics.wheels()[index].spec.is_steerable {
                dynamics.set_steering(self.state.steering, index);
            }
        }

        self.state.speed_kmh = vehicle.dynamics.update(physics, vehicle.chassis, dt)?;
        Ok(())
    }

    /// Respawn `vehicle` and forget the smoothed control state.
    pub fn respawn<B>(
        &mut self,
        vehicle: &mut Vehicle<B::Handle>,
        physics: &mut B,
    ) -> Result<(), PhysicsError>
    where
        B: PhysicsBackend + ?Sized,
    {
        self.state = VehicleState::default();
        vehicle.respawn(physics)
    }
}
