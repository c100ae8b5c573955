//! Per-frame orchestration.
//!
//! [`DriveLoop::frame`] runs, in order:
//! 1. Input sampling
//! 2. Vehicle control (smoothing, wheel forces, raycast dynamics)
//! 3. Physics step
//! 4. Transform read-back (bound bodies, then wheel visuals)
//! 5. Shadow cascade update
//!
//! Rendering happens after `frame` returns, using the scene transforms,
//! the camera and the cascade lights.

use crate::camera::Camera;
use crate::config::DriveConfig;
use crate::error::Error;
use crate::input::{GamepadSource, InputEvent, InputSample, InputSampler};
use crate::physics::{PhysicsBackend, PhysicsWorld};
use crate::scene::{sync_bindings, sync_wheel_visuals, RigidBodyBinding, Transform, WheelBinding};
use crate::shadow::CascadedShadowMap;
use crate::vehicle::{Vehicle, VehicleController};

/// What one frame did, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub substeps: u32,
    /// Render entities that received a body pose.
    pub synced_bodies: usize,
    pub synced_wheels: usize,
    pub speed_kmh: f32,
    pub respawned: bool,
}

/// Owns everything a driving session needs and runs it one frame at a time.
pub struct DriveLoop<B: PhysicsBackend> {
    physics: B,
    input: InputSampler,
    vehicle: Option<Vehicle<B::Handle>>,
    controller: VehicleController,
    scene: hecs::World,
    camera: Camera,
    csm: CascadedShadowMap,
    last_input: InputSample,
    elapsed: f64,
}

impl DriveLoop<PhysicsWorld> {
    /// Drive loop on the built-in CPU physics world.
    pub fn with_cpu_physics(config: DriveConfig) -> Result<Self, Error> {
        let physics = PhysicsWorld::new(config.physics.clone());
        Self::new(config, physics)
    }
}

impl<B: PhysicsBackend> DriveLoop<B> {
    /// Spawn the vehicle into `physics` and set up its render entities and
    /// the shadow cascades.
    pub fn new(config: DriveConfig, mut physics: B) -> Result<Self, Error> {
        config.validate()?;
        let csm = CascadedShadowMap::new(config.csm.clone(), &config.camera)?;
        let vehicle = Vehicle::spawn(&mut physics, &config.vehicle)?;

        let mut scene = hecs::World::new();
        let chassis_pose = config.vehicle.spawn_pose();
        scene.spawn((
            Transform::from_pose(&chassis_pose),
            RigidBodyBinding {
                body: vehicle.chassis(),
            },
        ));
        for (wheel, pose) in vehicle
            .dynamics()
            .wheel_poses(&chassis_pose)
            .iter()
            .enumerate()
        {
            scene.spawn((Transform::from_pose(pose), WheelBinding { wheel }));
        }

        Ok(Self {
            physics,
            input: InputSampler::new(config.input.clone()),
            vehicle: Some(vehicle),
            controller: VehicleController::new(config.vehicle),
            scene,
            camera: config.camera,
            csm,
            last_input: InputSample::default(),
            elapsed: 0.0,
        })
    }

    /// Queue a platform event for the next frame's input sample.
    pub fn handle_event(&mut self, event: &InputEvent) {
        self.input.handle_event(event);
    }

    /// Bind a render entity to a body so it follows the simulation.
    pub fn bind(&mut self, body: B::Handle) -> hecs::Entity {
        let transform = self
            .physics
            .query_transform(body)
            .map(|pose| Transform::from_pose(&pose))
            .unwrap_or_default();
        self.scene.spawn((transform, RigidBodyBinding { body }))
    }

    /// Advance everything by `dt` seconds.
    pub fn frame<G>(&mut self, gamepads: &G, dt: f64) -> Result<FrameReport, Error>
    where
        G: GamepadSource + ?Sized,
    {
        let mut report = FrameReport::default();

        // 1. Input
        let input = self.input.sample(gamepads);
        self.last_input = input;

        // 2. Vehicle control
        if let Some(vehicle) = self.vehicle.as_mut() {
            if self.physics.body_state(vehicle.chassis()).is_none() {
                tracing::warn!(
                    "Chassis {:?} is gone, skipping vehicle control",
                    vehicle.chassis()
                );
            } else {
                if input.respawn {
                    self.controller.respawn(vehicle, &mut self.physics)?;
                    report.respawned = true;
                }
                self.controller
                    .tick(vehicle, &mut self.physics, &input, dt as f32)?;
                report.speed_kmh = self.controller.state().speed_kmh;
            }
        }

        // 3. Physics
        report.substeps = self.physics.step(dt);

        // 4. Read-back
        report.synced_bodies = sync_bindings(&mut self.scene, &self.physics);
        if let Some(wheels) = self
            .vehicle
            .as_ref()
            .and_then(|vehicle| vehicle.wheel_poses(&self.physics))
        {
            report.synced_wheels = sync_wheel_visuals(&mut self.scene, &wheels);
        }

        // 5. Shadows
        self.csm.update(&self.camera)?;

        self.elapsed += dt;
        Ok(report)
    }

    /// Release the chassis, the vehicle's render entities and all material
    /// registrations, and drop device state. Frames after this only step
    /// the remaining bodies.
    pub fn shutdown(&mut self) {
        if let Some(vehicle) = self.vehicle.take() {
            let chassis = vehicle.chassis();
            if !vehicle.despawn(&mut self.physics) {
                tracing::warn!("Chassis {:?} was already removed", chassis);
            }
        }

        let bound: Vec<hecs::Entity> = self
            .scene
            .query::<&RigidBodyBinding<B::Handle>>()
            .iter()
            .map(|(entity, _)| entity)
            .chain(
                self.scene
                    .query::<&WheelBinding>()
                    .iter()
                    .map(|(entity, _)| entity),
            )
            .collect();
        for entity in bound {
            if let Err(err) = self.scene.despawn(entity) {
                tracing::trace!("Entity {:?} already despawned: {}", entity, err);
            }
        }

        self.csm.dispose();
        self.input.reset();
        tracing::info!("Drive loop shut down after {:.2}s", self.elapsed);
    }

    pub fn physics(&self) -> &B {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut B {
        &mut self.physics
    }

    pub fn scene(&self) -> &hecs::World {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut hecs::World {
        &mut self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn csm(&self) -> &CascadedShadowMap {
        &self.csm
    }

    pub fn csm_mut(&mut self) -> &mut CascadedShadowMap {
        &mut self.csm
    }

    pub fn vehicle(&self) -> Option<&Vehicle<B::Handle>> {
        self.vehicle.as_ref()
    }

    pub fn controller(&self) -> &VehicleController {
        &self.controller
    }

    pub fn input(&self) -> &InputSampler {
        &self.input
    }

    /// The input sample used by the last frame.
    pub fn last_input(&self) -> &InputSample {
        &self.last_input
    }

    /// Simulated time so far.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}
