//! CPU rigid body simulation behind the [`PhysicsBackend`] trait.
//!
//! # Architecture
//!
//! The physics pipeline runs in a fixed timestep loop:
//!
//! 1. Apply forces (gravity)
//! 2. Integrate velocities
//! 3. Broadphase collision detection (AABB overlap)
//! 4. Narrowphase collision detection (support-mapped SAT, surface manifolds)
//! 5. Solve contact constraints (sequential impulse)
//! 6. Integrate positions
//! 7. Update sleep states
//!
//! Force accumulators are cleared once per [`PhysicsBackend::step`] call, so a
//! force applied before a frame acts on every substep of that frame.

pub mod body;
pub mod broadphase;
pub mod collider;
pub mod contact;
pub mod narrowphase;
pub mod raycast;
pub mod rigid_body;
pub mod solver;

use std::fmt::Debug;
use std::hash::Hash;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PhysicsError};

pub use self::body::{Pose, RigidBodyType};
pub use self::collider::{ColliderShape, Heightfield};
pub use self::raycast::{Ray, RayHit};

use self::body::{Collider, RigidBody, SleepInfo};
use self::broadphase::SweepAndPrune;
use self::contact::{ContactManifold, ContactMaterial};
use self::narrowphase::detect_collision;

/// Configuration for the physics simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector. Default: (0, -9.81, 0).
    pub gravity: Vec3,
    /// Fixed timestep for physics updates in seconds. Default: 1/60.
    pub fixed_timestep: f64,
    /// Maximum number of sub-steps per frame. Default: 10.
    pub max_substeps: u32,
    /// Number of constraint solver iterations. Default: 8.
    pub solver_iterations: u32,
    /// Linear speed below which a body may fall asleep. Default: 0.1.
    pub sleep_linear_threshold: f32,
    /// Angular speed below which a body may fall asleep. Default: 0.05.
    pub sleep_angular_threshold: f32,
    /// Seconds a body must stay slow before sleeping. Default: 1.0.
    pub sleep_time: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 10,
            solver_iterations: 8,
            sleep_linear_threshold: 0.1,
            sleep_angular_threshold: 0.05,
            sleep_time: 1.0,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_timestep > 0.0 && self.fixed_timestep.is_finite()) {
            return Err(ConfigError::invalid(
                "physics.fixed_timestep",
                format!("must be positive, got {}", self.fixed_timestep),
            ));
        }
        if self.max_substeps == 0 {
            return Err(ConfigError::invalid("physics.max_substeps", "must be at least 1"));
        }
        if self.solver_iterations == 0 {
            return Err(ConfigError::invalid(
                "physics.solver_iterations",
                "must be at least 1",
            ));
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::invalid("physics.gravity", "must be finite"));
        }
        Ok(())
    }
}

/// Everything needed to create a rigid body.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub shape: ColliderShape,
    /// Zero makes the body static.
    pub mass: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Cleared for bodies that must never be deactivated (the vehicle chassis).
    pub can_sleep: bool,
}

impl BodyDesc {
    pub fn new(shape: ColliderShape, mass: f32) -> Self {
        Self {
            shape,
            mass,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            friction: 0.5,
            restitution: 0.0,
            linear_damping: 0.01,
            angular_damping: 0.01,
            can_sleep: true,
        }
    }

    /// A zero-mass body.
    pub fn fixed(shape: ColliderShape) -> Self {
        Self::new(shape, 0.0)
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }
}

/// Snapshot of a body, as read back by render bindings and the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub sleeping: bool,
}

/// Opaque handle to a body in a [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(hecs::Entity);

/// Rigid body simulation capabilities the vehicle and render bindings rely on.
///
/// The world is a single mutable resource: `step` is called at most once per
/// frame by the owning loop.
pub trait PhysicsBackend {
    type Handle: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Create a body. Negative or non-finite masses are rejected.
    fn create_body(&mut self, desc: BodyDesc) -> Result<Self::Handle, PhysicsError>;

    /// Remove a body. Returns `false` if the handle is unknown.
    fn remove_body(&mut self, handle: Self::Handle) -> bool;

    /// Advance the simulation by `dt` seconds. Returns the number of substeps taken.
    fn step(&mut self, dt: f64) -> u32;

    fn body_state(&self, handle: Self::Handle) -> Option<BodyState>;

    /// Teleport a body. Wakes it.
    fn set_pose(&mut self, handle: Self::Handle, pose: Pose) -> Result<(), PhysicsError>;

    fn set_velocity(
        &mut self,
        handle: Self::Handle,
        linear: Vec3,
        angular: Vec3,
    ) -> Result<(), PhysicsError>;

    /// Accumulate a force at the center of mass until the next step completes.
    fn apply_force(&mut self, handle: Self::Handle, force: Vec3) -> Result<(), PhysicsError>;

    fn apply_torque(&mut self, handle: Self::Handle, torque: Vec3) -> Result<(), PhysicsError>;

    /// Instantaneous change of momentum at a world-space point.
    fn apply_impulse_at_point(
        &mut self,
        handle: Self::Handle,
        impulse: Vec3,
        point: Vec3,
    ) -> Result<(), PhysicsError>;

    /// Closest hit along `ray`, ignoring `exclude`.
    fn cast_ray(&self, ray: &Ray, exclude: Option<Self::Handle>) -> Option<RayHit<Self::Handle>>;

    fn body_count(&self) -> usize;

    fn query_transform(&self, handle: Self::Handle) -> Option<Pose> {
        self.body_state(handle).map(|state| state.pose)
    }

    fn is_sleeping(&self, handle: Self::Handle) -> bool {
        self.body_state(handle).is_some_and(|state| state.sleeping)
    }

    /// World velocity of a point rigidly attached to the body.
    fn velocity_at_point(&self, handle: Self::Handle, point: Vec3) -> Option<Vec3> {
        self.body_state(handle).map(|state| {
            state.linear_velocity + state.angular_velocity.cross(point - state.pose.position)
        })
    }
}

/// The CPU physics world. Bodies live in an internal ECS world.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: hecs::World,
    accumulator: f64,
    broadphase: SweepAndPrune,
    contacts: Vec<ContactManifold>,
}

impl PhysicsWorld {
    /// Create a new physics world with the given configuration.
    pub fn new(config: PhysicsConfig) -> Self {
        tracing::info!(
            "Physics world created: dt = {:.4}s, max substeps = {}, gravity = {}",
            config.fixed_timestep,
            config.max_substeps,
            config.gravity
        );
        Self {
            config,
            bodies: hecs::World::new(),
            accumulator: 0.0,
            broadphase: SweepAndPrune::new(),
            contacts: Vec::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Contact manifolds produced by the last substep.
    pub fn contacts(&self) -> &[ContactManifold] {
        &self.contacts
    }

    fn fixed_step(&mut self, dt: f32) {
        let world = &mut self.bodies;

        // 1. Apply forces (gravity)
        rigid_body::apply_gravity(world, self.config.gravity);

        // 2. Integrate velocities
        rigid_body::integrate_velocities(world, dt);

        // 3. Broadphase collision detection
        let pairs = self.broadphase.find_pairs(world);

        // 4. Narrowphase collision detection
        self.contacts.clear();
        let mut to_wake = Vec::new();
        for (entity_a, entity_b) in pairs {
            let manifold = {
                let Ok(mut a) = world.query_one::<(&Collider, &Pose, &RigidBody)>(entity_a) else {
                    continue;
                };
                let Ok(mut b) = world.query_one::<(&Collider, &Pose, &RigidBody)>(entity_b) else {
                    continue;
                };
                let (Some((ca, pa, ra)), Some((cb, pb, rb))) = (a.get(), b.get()) else {
                    continue;
                };

                let contacts = detect_collision(&ca.shape, pa, &cb.shape, pb);
                ContactManifold::new([entity_a, entity_b], ContactMaterial::mix(ra, rb), contacts)
            };
            let Some(manifold) = manifold else {
                continue;
            };
            to_wake.push(entity_a);
            to_wake.push(entity_b);
            self.contacts.push(manifold);
        }
        for entity in to_wake {
            rigid_body::wake_body(world, entity);
        }

        // 5. Solve contact constraints
        solver::solve_contacts(&mut self.contacts, world, self.config.solver_iterations, dt);

        // 6. Integrate positions
        rigid_body::integrate_positions(world, dt);

        // 7. Update sleep states
        rigid_body::update_sleep_states(world, &self.config, dt);
    }

    fn with_body<R>(
        &mut self,
        handle: BodyHandle,
        f: impl FnOnce(&mut RigidBody, &mut Pose) -> R,
    ) -> Result<R, PhysicsError> {
        let (rb, pose) = self
            .bodies
            .query_one_mut::<(&mut RigidBody, &mut Pose)>(handle.0)
            .map_err(|_| PhysicsError::UnknownBody)?;
        let result = f(rb, pose);
        rigid_body::wake_body(&mut self.bodies, handle.0);
        Ok(result)
    }
}

impl PhysicsBackend for PhysicsWorld {
    type Handle = BodyHandle;

    fn create_body(&mut self, desc: BodyDesc) -> Result<BodyHandle, PhysicsError> {
        if !(desc.mass >= 0.0 && desc.mass.is_finite()) {
            return Err(PhysicsError::InvalidMass(desc.mass));
        }
        desc.shape.validate()?;
        if desc.mass > 0.0 && !desc.shape.is_convex() {
            return Err(PhysicsError::InvalidShape(
                "planes and heightfields must be static (mass = 0)".into(),
            ));
        }

        let mut rb = if desc.mass > 0.0 {
            RigidBody::new_dynamic(desc.mass, &desc.shape)
        } else {
            RigidBody::new_static()
        };
        rb.friction = desc.friction;
        rb.restitution = desc.restitution;
        if rb.is_dynamic() {
            rb.linear_damping = desc.linear_damping;
            rb.angular_damping = desc.angular_damping;
        }

        let entity = self.bodies.spawn((
            Pose::new(desc.position, desc.rotation.normalize()),
            rb,
            Collider { shape: desc.shape },
            SleepInfo::new(desc.can_sleep),
        ));
        tracing::debug!("Created body {:?} (mass = {})", entity, desc.mass);
        Ok(BodyHandle(entity))
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies.despawn(handle.0).is_ok()
    }

    fn step(&mut self, dt: f64) -> u32 {
        self.accumulator += dt;

        let mut substeps = 0u32;
        while self.accumulator >= self.config.fixed_timestep && substeps < self.config.max_substeps
        {
            self.fixed_step(self.config.fixed_timestep as f32);
            self.accumulator -= self.config.fixed_timestep;
            substeps += 1;
        }

        // Clamp accumulator to avoid spiral of death
        if self.accumulator > self.config.fixed_timestep * self.config.max_substeps as f64 {
            self.accumulator = 0.0;
        }

        if substeps > 0 {
            rigid_body::clear_forces(&mut self.bodies);
        }
        substeps
    }

    fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        let mut query = self
            .bodies
            .query_one::<(&RigidBody, &Pose, &SleepInfo)>(handle.0)
            .ok()?;
        let (rb, pose, sleep) = query.get()?;
        Some(BodyState {
            pose: *pose,
            linear_velocity: rb.linear_velocity,
            angular_velocity: rb.angular_velocity,
            mass: rb.mass,
            sleeping: sleep.is_sleeping(),
        })
    }

    fn set_pose(&mut self, handle: BodyHandle, pose: Pose) -> Result<(), PhysicsError> {
        self.with_body(handle, |_, current| {
            *current = Pose::new(pose.position, pose.rotation.normalize());
        })
    }

    fn set_velocity(
        &mut self,
        handle: BodyHandle,
        linear: Vec3,
        angular: Vec3,
    ) -> Result<(), PhysicsError> {
        self.with_body(handle, |rb, _| {
            if rb.is_dynamic() {
                rb.linear_velocity = linear;
                rb.angular_velocity = angular;
            }
        })
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vec3) -> Result<(), PhysicsError> {
        self.with_body(handle, |rb, _| {
            if rb.is_dynamic() {
                rb.force_accumulator += force;
            }
        })
    }

    fn apply_torque(&mut self, handle: BodyHandle, torque: Vec3) -> Result<(), PhysicsError> {
        self.with_body(handle, |rb, _| {
            if rb.is_dynamic() {
                rb.torque_accumulator += torque;
            }
        })
    }

    fn apply_impulse_at_point(
        &mut self,
        handle: BodyHandle,
        impulse: Vec3,
        point: Vec3,
    ) -> Result<(), PhysicsError> {
        self.with_body(handle, |rb, pose| {
            if rb.is_dynamic() {
                rb.linear_velocity += impulse * rb.inv_mass;
                let r = point - pose.position;
                rb.angular_velocity += rb.inv_inertia_world(pose.rotation) * r.cross(impulse);
            }
        })
    }

    fn cast_ray(&self, ray: &Ray, exclude: Option<BodyHandle>) -> Option<RayHit<BodyHandle>> {
        let mut best: Option<RayHit<BodyHandle>> = None;

        for (entity, (collider, pose)) in self.bodies.query::<(&Collider, &Pose)>().iter() {
            if exclude.is_some_and(|h| h.0 == entity) {
                continue;
            }
            let limit = best.map_or(ray.max_toi, |hit| hit.toi);
            let bounds = collider.shape.compute_aabb(pose);
            if !matches!(collider.shape, ColliderShape::Plane)
                && bounds.ray_entry(ray.origin, ray.direction, limit).is_none()
            {
                continue;
            }

            let bounded = Ray {
                max_toi: limit,
                ..*ray
            };
            if let Some((toi, normal)) = raycast::cast_shape(&collider.shape, pose, &bounded) {
                best = Some(RayHit {
                    body: BodyHandle(entity),
                    toi,
                    point: ray.at(toi),
                    normal,
                });
            }
        }

        best
    }

    fn body_count(&self) -> usize {
        self.bodies.len() as usize
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        tracing::debug!("Physics world dropped with {} bodies", self.bodies.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground(physics: &mut PhysicsWorld) -> BodyHandle {
        physics
            .create_body(BodyDesc::fixed(ColliderShape::Plane))
            .unwrap()
    }

    #[test]
    fn test_physics_world_free_fall() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        let ball = physics
            .create_body(
                BodyDesc::new(ColliderShape::Sphere { radius: 0.5 }, 1.0)
                    .with_position(Vec3::new(0.0, 10.0, 0.0)),
            )
            .unwrap();

        // Simulate ~1 second
        for _ in 0..60 {
            physics.step(1.0 / 60.0);
        }

        let pose = physics.query_transform(ball).unwrap();
        assert!(
            pose.position.y < 6.0 && pose.position.y > 4.0,
            "Body should have fallen about 4.9m: y = {}",
            pose.position.y
        );
    }

    #[test]
    fn test_box_comes_to_rest_on_plane() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        ground(&mut physics);
        let cube = physics
            .create_body(
                BodyDesc::new(
                    ColliderShape::Box {
                        half_extents: Vec3::splat(0.5),
                    },
                    1.0,
                )
                .with_position(Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap();

        // Simulate 3 seconds
        for _ in 0..180 {
            physics.step(1.0 / 60.0);
        }

        let state = physics.body_state(cube).unwrap();
        assert!(
            (state.pose.position.y - 0.5).abs() < 0.1,
            "Box should rest on the plane: y = {}",
            state.pose.position.y
        );
        assert!(
            state.linear_velocity.length() < 0.5,
            "Box should have settled: speed = {}",
            state.linear_velocity.length()
        );
    }

    #[test]
    fn test_static_body_ignores_forces() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        let start = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.4));
        let wall = physics
            .create_body(
                BodyDesc::fixed(ColliderShape::Box {
                    half_extents: Vec3::ONE,
                })
                .with_position(start.position)
                .with_rotation(start.rotation),
            )
            .unwrap();

        for _ in 0..120 {
            physics.apply_force(wall, Vec3::new(1e6, -1e6, 0.0)).unwrap();
            physics.apply_torque(wall, Vec3::new(0.0, 1e6, 0.0)).unwrap();
            physics
                .apply_impulse_at_point(wall, Vec3::X * 1e4, Vec3::new(1.0, 3.0, 3.0))
                .unwrap();
            physics.step(1.0 / 60.0);
        }

        let pose = physics.query_transform(wall).unwrap();
        assert_eq!(pose.position, start.position);
        assert!((pose.rotation.dot(start.rotation).abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_bodies_rejected() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        let sphere = ColliderShape::Sphere { radius: 1.0 };

        assert_eq!(
            physics.create_body(BodyDesc::new(sphere.clone(), -1.0)),
            Err(PhysicsError::InvalidMass(-1.0))
        );
        assert!(matches!(
            physics.create_body(BodyDesc::new(sphere, f32::NAN)),
            Err(PhysicsError::InvalidMass(_))
        ));
        assert!(matches!(
            physics.create_body(BodyDesc::new(ColliderShape::Plane, 5.0)),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert!(matches!(
            physics.create_body(BodyDesc::new(ColliderShape::Sphere { radius: 0.0 }, 1.0)),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert_eq!(physics.body_count(), 0);
    }

    #[test]
    fn test_remove_body() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        let ball = physics
            .create_body(BodyDesc::new(ColliderShape::Sphere { radius: 0.5 }, 1.0))
            .unwrap();
        assert_eq!(physics.body_count(), 1);
        assert!(physics.remove_body(ball));
        assert!(!physics.remove_body(ball));
        assert!(physics.query_transform(ball).is_none());
        assert_eq!(physics.apply_force(ball, Vec3::Y), Err(PhysicsError::UnknownBody));
    }

    #[test]
    fn test_ray_cast_nearest_and_exclude() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        let floor = ground(&mut physics);
        let ball = physics
            .create_body(
                BodyDesc::new(ColliderShape::Sphere { radius: 0.5 }, 1.0)
                    .with_position(Vec3::new(0.0, 2.0, 0.0)),
            )
            .unwrap();

        let ray = Ray {
            origin: Vec3::new(0.0, 5.0, 0.0),
            direction: Vec3::NEG_Y,
            max_toi: 10.0,
        };
        let hit = physics.cast_ray(&ray, None).unwrap();
        assert_eq!(hit.body, ball);
        assert!((hit.toi - 2.5).abs() < 1e-4);

        let hit = physics.cast_ray(&ray, Some(ball)).unwrap();
        assert_eq!(hit.body, floor);
        assert!((hit.point.y).abs() < 1e-4);
        assert!((hit.normal - Vec3::Y).length() < 1e-5);

        let short = Ray { max_toi: 1.0, ..ray };
        assert!(physics.cast_ray(&short, None).is_none());
    }

    #[test]
    fn test_resting_body_sleeps_and_impulse_wakes() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        ground(&mut physics);
        let ball = physics
            .create_body(
                BodyDesc::new(ColliderShape::Sphere { radius: 0.5 }, 1.0)
                    .with_position(Vec3::new(0.0, 0.5, 0.0)),
            )
            .unwrap();

        for _ in 0..180 {
            physics.step(1.0 / 60.0);
        }
        assert!(physics.is_sleeping(ball));

        physics
            .apply_impulse_at_point(ball, Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 0.5, 0.0))
            .unwrap();
        assert!(!physics.is_sleeping(ball));
        physics.step(1.0 / 60.0);
        assert!(physics.query_transform(ball).unwrap().position.y > 0.5);
    }

    #[test]
    fn test_non_sleeping_body_stays_awake() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        ground(&mut physics);
        let ball = physics
            .create_body(
                BodyDesc::new(ColliderShape::Sphere { radius: 0.5 }, 1.0)
                    .with_position(Vec3::new(0.0, 0.5, 0.0))
                    .with_sleep(false),
            )
            .unwrap();

        for _ in 0..180 {
            physics.step(1.0 / 60.0);
        }
        assert!(!physics.is_sleeping(ball));
    }

    #[test]
    fn test_substep_limit() {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        assert_eq!(physics.step(1.0 / 120.0), 0);
        assert_eq!(physics.step(1.0 / 120.0), 1);
        // A long hitch runs at most `max_substeps` and drops the remainder.
        assert_eq!(physics.step(1.0), 10);
        assert_eq!(physics.step(0.0), 0);
    }

    #[test]
    fn test_physics_config_default() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert!((config.fixed_timestep - 1.0 / 60.0).abs() < 1e-10);
        assert_eq!(config.max_substeps, 10);
        assert_eq!(config.solver_iterations, 8);
        assert!(config.validate().is_ok());

        let broken = PhysicsConfig {
            max_substeps: 0,
            ..PhysicsConfig::default()
        };
        assert!(broken.validate().is_err());
    }
}
