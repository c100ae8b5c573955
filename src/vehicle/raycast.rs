//! Raycast vehicle dynamics.
//!
//! Each wheel is a suspension ray from its mount point. A ray that hits the
//! ground produces a spring/damper impulse along the contact normal, a side
//! impulse that cancels lateral sliding, and a forward impulse from the engine
//! or from rolling/brake friction. Combined friction is clamped by the
//! suspension load times the wheel's friction slip.

use glam::{Mat3, Quat, Vec3};

use crate::error::PhysicsError;
use crate::physics::{BodyState, PhysicsBackend, Pose, Ray};

use super::wheel::{Wheel, WheelContact};

/// Chassis-local forward axis.
pub const CHASSIS_FORWARD: Vec3 = Vec3::NEG_Z;

/// Contacts this close to parallel with the suspension get a fixed response.
const MIN_CONTACT_DOT_SUSPENSION: f32 = -0.1;
/// Share of the lateral velocity removed per update.
const SIDE_FRICTION_DAMPING: f32 = 0.2;
const FORWARD_SKID_FACTOR: f32 = 0.5;
const SIDE_SKID_FACTOR: f32 = 1.0;
/// Spin decay of a wheel in the air.
const AIR_SPIN_DECAY: f32 = 0.99;

/// Velocity response of a body at a point, gathered once per update.
struct ImpulseBody {
    inv_mass: f32,
    inv_inertia: Mat3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    position: Vec3,
}

impl ImpulseBody {
    fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.position)
    }

    /// Inverse effective mass along `direction` at `point`.
    fn denominator(&self, point: Vec3, direction: Vec3) -> f32 {
        let rxn = (point - self.position).cross(direction);
        self.inv_mass + (self.inv_inertia * rxn).dot(rxn)
    }

    /// The ground's rotational response is not exposed by the backend, so
    /// only its mass takes part.
    fn ground(state: Option<BodyState>) -> Self {
        match state {
            Some(state) => Self {
                inv_mass: if state.mass > 0.0 { 1.0 / state.mass } else { 0.0 },
                inv_inertia: Mat3::ZERO,
                linear_velocity: state.linear_velocity,
                angular_velocity: state.angular_velocity,
                position: state.pose.position,
            },
            None => Self {
                inv_mass: 0.0,
                inv_inertia: Mat3::ZERO,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                position: Vec3::ZERO,
            },
        }
    }
}

/// Four raycast wheels attached to one chassis body.
#[derive(Debug, Clone)]
pub struct RaycastVehicle<H> {
    wheels: [Wheel<H>; 4],
    /// Principal inverse inertia of the chassis in body space.
    chassis_inv_inertia: Vec3,
    speed_kmh: f32,
}

impl<H: Copy + PartialEq> RaycastVehicle<H> {
    pub fn new(wheels: [Wheel<H>; 4], chassis_inv_inertia: Vec3) -> Self {
        Self {
            wheels,
            chassis_inv_inertia,
            speed_kmh: 0.0,
        }
    }

    pub fn wheels(&self) -> &[Wheel<H>; 4] {
        &self.wheels
    }

    /// Signed forward speed measured by the last update.
    pub fn speed_kmh(&self) -> f32 {
        self.speed_kmh
    }

    pub fn set_steering(&mut self, value: f32, wheel: usize) {
        if let Some(w) = self.wheels.get_mut(wheel) {
            w.steering = value;
        }
    }

    pub fn apply_engine_force(&mut self, force: f32, wheel: usize) {
        if let Some(w) = self.wheels.get_mut(wheel) {
            w.engine_force = force;
        }
    }

    pub fn set_brake(&mut self, brake: f32, wheel: usize) {
        if let Some(w) = self.wheels.get_mut(wheel) {
            w.brake = brake;
        }
    }

    /// Drop all wheel motion and contact state.
    pub fn reset(&mut self) {
        for wheel in &mut self.wheels {
            wheel.reset();
        }
        self.speed_kmh = 0.0;
    }

    /// Visual wheel poses for the given chassis pose, in wheel order.
    pub fn wheel_poses(&self, chassis: &Pose) -> [Pose; 4] {
        std::array::from_fn(|i| self.wheels[i].world_pose(chassis))
    }

    fn chassis_body(&self, state: &BodyState) -> ImpulseBody {
        let r = Mat3::from_quat(state.pose.rotation);
        ImpulseBody {
            inv_mass: if state.mass > 0.0 { 1.0 / state.mass } else { 0.0 },
            inv_inertia: r * Mat3::from_diagonal(self.chassis_inv_inertia) * r.transpose(),
            linear_velocity: state.linear_velocity,
            angular_velocity: state.angular_velocity,
            position: state.pose.position,
        }
    }

    /// Run one vehicle update: suspension rays, suspension impulses, friction
    /// impulses and wheel spin. Returns the signed forward speed in km/h.
    pub fn update<B>(&mut self, physics: &mut B, chassis: H, dt: f32) -> Result<f32, PhysicsError>
    where
        B: PhysicsBackend<Handle = H> + ?Sized,
    {
        let state = physics
            .body_state(chassis)
            .ok_or(PhysicsError::UnknownBody)?;
        let pose = state.pose;

        let forward_ws = pose.rotation * CHASSIS_FORWARD;
        let mut speed = 3.6 * state.linear_velocity.length();
        if forward_ws.dot(state.linear_velocity) < 0.0 {
            speed = -speed;
        }
        self.speed_kmh = speed;

        for wheel in &mut self.wheels {
            wheel.update_transform(&pose);
            cast_suspension_ray(wheel, &*physics, chassis, &state);
        }

        // Suspension
        for wheel in &mut self.wheels {
            wheel.suspension_force = suspension_force(wheel, state.mass);
        }
        for wheel in &self.wheels {
            if let Some(contact) = &wheel.contact {
                let impulse = contact.normal * (wheel.suspension_force * dt);
                physics.apply_impulse_at_point(chassis, impulse, contact.point)?;
            }
        }

        // Friction sees the velocity after the suspension impulses.
        let state = physics
            .body_state(chassis)
            .ok_or(PhysicsError::UnknownBody)?;
        self.update_friction(physics, chassis, &state, dt)?;

        // Wheel spin
        for wheel in &mut self.wheels {
            match &wheel.contact {
                Some(contact) => {
                    let velocity = state.linear_velocity
                        + state
                            .angular_velocity
                            .cross(wheel.hard_point_ws - state.pose.position);
                    let mut forward = forward_ws;
                    forward -= contact.normal * forward.dot(contact.normal);
                    wheel.delta_rotation = forward.dot(velocity) * dt / wheel.spec.radius;
                    wheel.rotation += wheel.delta_rotation;
                }
                None => {
                    wheel.rotation += wheel.delta_rotation;
                    wheel.delta_rotation *= AIR_SPIN_DECAY;
                }
            }
        }

        Ok(speed)
    }

    fn update_friction<B>(
        &mut self,
        physics: &mut B,
        chassis: H,
        state: &BodyState,
        dt: f32,
    ) -> Result<(), PhysicsError>
    where
        B: PhysicsBackend<Handle = H> + ?Sized,
    {
        let body = self.chassis_body(state);
        let rotation = state.pose.rotation;

        let mut axles = [Vec3::ZERO; 4];
        let mut forwards = [Vec3::ZERO; 4];

        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            wheel.side_impulse = 0.0;
            wheel.forward_impulse = 0.0;
            wheel.skid_info = 1.0;

            let Some(contact) = wheel.contact else {
                continue;
            };
            let steer = Quat::from_axis_angle(wheel.spec.up(), wheel.steering);
            let mut axle = rotation * (steer * wheel.spec.axle.normalize());
            axle -= contact.normal * axle.dot(contact.normal);
            let axle = axle.normalize_or_zero();
            let forward = contact.normal.cross(axle).normalize_or_zero();
            axles[i] = axle;
            forwards[i] = forward;

            let ground = ImpulseBody::ground(physics.body_state(contact.ground));
            wheel.side_impulse = resolve_bilateral(&body, &ground, contact.point, axle);
        }

        let wheels_on_ground = self.wheels.iter().filter(|w| w.in_contact()).count().max(1);
        let mut sliding = false;
        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            let Some(contact) = wheel.contact else {
                continue;
            };

            let rolling = if wheel.engine_force != 0.0 {
                wheel.engine_force * dt
            } else {
                let ground = ImpulseBody::ground(physics.body_state(contact.ground));
                rolling_friction(
                    &body,
                    &ground,
                    contact.point,
                    forwards[i],
                    wheel.brake,
                    wheels_on_ground,
                )
            };
            wheel.forward_impulse = rolling;

            let max_impulse = wheel.suspension_force * dt * wheel.spec.friction_slip;
            let x = wheel.forward_impulse * FORWARD_SKID_FACTOR;
            let y = wheel.side_impulse * SIDE_SKID_FACTOR;
            let impulse_squared = x * x + y * y;
            if impulse_squared > max_impulse * max_impulse {
                sliding = true;
                wheel.skid_info *= max_impulse / impulse_squared.sqrt();
            }
        }

        if sliding {
            for wheel in &mut self.wheels {
                if wheel.side_impulse != 0.0 && wheel.skid_info < 1.0 {
                    wheel.forward_impulse *= wheel.skid_info;
                    wheel.side_impulse *= wheel.skid_info;
                }
            }
        }

        for (i, wheel) in self.wheels.iter().enumerate() {
            let Some(contact) = wheel.contact else {
                continue;
            };

            if wheel.forward_impulse != 0.0 {
                physics.apply_impulse_at_point(
                    chassis,
                    forwards[i] * wheel.forward_impulse,
                    contact.point,
                )?;
            }

            if wheel.side_impulse != 0.0 {
                let side = axles[i] * wheel.side_impulse;
                // Move the application point towards the chassis' center height
                // to limit body roll.
                let up = rotation * wheel.spec.up();
                let rel_pos = contact.point - state.pose.position;
                let rel_pos = rel_pos - up * up.dot(rel_pos) * (1.0 - wheel.spec.roll_influence);
                physics.apply_impulse_at_point(chassis, side, state.pose.position + rel_pos)?;
                if contact.ground != chassis {
                    physics.apply_impulse_at_point(contact.ground, -side, contact.point)?;
                }
            }
        }

        Ok(())
    }
}

fn cast_suspension_ray<B, H>(wheel: &mut Wheel<H>, physics: &B, chassis: H, state: &BodyState)
where
    B: PhysicsBackend<Handle = H> + ?Sized,
    H: Copy,
{
    let spec = &wheel.spec;
    let ray = Ray {
        origin: wheel.hard_point_ws,
        direction: wheel.direction_ws,
        max_toi: spec.suspension_rest_length + spec.radius,
    };

    let Some(hit) = physics.cast_ray(&ray, Some(chassis)) else {
        wheel.contact = None;
        wheel.suspension_length = spec.suspension_rest_length;
        wheel.suspension_relative_velocity = 0.0;
        wheel.clipped_inv_contact_dot_suspension = 1.0;
        return;
    };

    let min_length = spec.suspension_rest_length - spec.max_suspension_travel;
    let max_length = spec.suspension_rest_length + spec.max_suspension_travel;
    wheel.suspension_length = (hit.toi - spec.radius).clamp(min_length.max(0.0), max_length);

    let denominator = hit.normal.dot(wheel.direction_ws);
    let chassis_velocity =
        state.linear_velocity + state.angular_velocity.cross(hit.point - state.pose.position);
    let projected_velocity = hit.normal.dot(chassis_velocity);

    if denominator >= MIN_CONTACT_DOT_SUSPENSION {
        wheel.suspension_relative_velocity = 0.0;
        wheel.clipped_inv_contact_dot_suspension = 1.0 / -MIN_CONTACT_DOT_SUSPENSION;
    } else {
        let inv = -1.0 / denominator;
        wheel.suspension_relative_velocity = projected_velocity * inv;
        wheel.clipped_inv_contact_dot_suspension = inv;
    }

    wheel.contact = Some(WheelContact {
        point: hit.point,
        normal: hit.normal,
        ground: hit.body,
    });
}

/// Spring/damper force scaled by the chassis mass. Never pulls the chassis down.
fn suspension_force<H>(wheel: &Wheel<H>, chassis_mass: f32) -> f32 {
    if wheel.contact.is_none() {
        return 0.0;
    }
    let spec = &wheel.spec;
    let compression = spec.suspension_rest_length - wheel.suspension_length;
    let mut force =
        spec.suspension_stiffness * compression * wheel.clipped_inv_contact_dot_suspension;

    let damping = if wheel.suspension_relative_velocity < 0.0 {
        spec.damping_compression
    } else {
        spec.damping_relaxation
    };
    force -= damping * wheel.suspension_relative_velocity;

    (force * chassis_mass).max(0.0).min(spec.max_suspension_force)
}

/// Impulse along `axis` that removes part of the relative velocity between
/// the chassis and the ground at `point`.
fn resolve_bilateral(chassis: &ImpulseBody, ground: &ImpulseBody, point: Vec3, axis: Vec3) -> f32 {
    if axis.length_squared() > 1.1 || axis == Vec3::ZERO {
        return 0.0;
    }
    let relative = chassis.velocity_at(point) - ground.velocity_at(point);
    let denominator = chassis.denominator(point, axis) + ground.denominator(point, axis);
    if denominator <= 0.0 {
        return 0.0;
    }
    -SIDE_FRICTION_DAMPING * axis.dot(relative) / denominator
}

/// Impulse along `direction` that stops the wheel from rolling, limited to
/// `max_impulse`. Zero when not braking. Callers share it between the wheels
/// on the ground.
fn rolling_friction(
    chassis: &ImpulseBody,
    ground: &ImpulseBody,
    point: Vec3,
    direction: Vec3,
    max_impulse: f32,
    wheels_on_ground: usize,
) -> f32 {
    let denominator = chassis.denominator(point, direction) + ground.denominator(point, direction);
    if denominator <= 0.0 {
        return 0.0;
    }
    let relative = chassis.velocity_at(point) - ground.velocity_at(point);
    let j = -direction.dot(relative) / denominator / wheels_on_ground as f32;
    j.clamp(-max_impulse, max_impulse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyDesc, BodyHandle, ColliderShape, PhysicsConfig, PhysicsWorld};
    use crate::vehicle::wheel::WheelSpec;

    const MASS: f32 = 1685.0;
    const HALF: Vec3 = Vec3::new(0.9, 0.35, 2.3);

    fn setup(height: f32) -> (PhysicsWorld, BodyHandle, RaycastVehicle<BodyHandle>) {
        let mut physics = PhysicsWorld::new(PhysicsConfig::default());
        physics
            .create_body(BodyDesc::fixed(ColliderShape::Plane))
            .unwrap();
        let shape = ColliderShape::Box { half_extents: HALF };
        let inertia = shape.local_inertia(MASS);
        let chassis = physics
            .create_body(
                BodyDesc::new(shape, MASS)
                    .with_position(Vec3::new(0.0, height, 0.0))
                    .with_sleep(false),
            )
            .unwrap();
        let specs = WheelSpec::standard_layout(1.5, 0.2, 1.3, -1.45, &WheelSpec::default());
        let wheels = std::array::from_fn(|i| Wheel::new(specs[i].clone()));
        let vehicle = RaycastVehicle::new(wheels, inertia.recip());
        (physics, chassis, vehicle)
    }

    #[test]
    fn test_wheels_in_air_have_no_contact() {
        let (mut physics, chassis, mut vehicle) = setup(5.0);
        vehicle.update(&mut physics, chassis, 1.0 / 60.0).unwrap();
        for wheel in vehicle.wheels() {
            assert!(!wheel.in_contact());
            assert_eq!(wheel.suspension_force, 0.0);
            assert_eq!(wheel.suspension_length, wheel.spec.suspension_rest_length);
        }
    }

    #[test]
    fn test_suspension_holds_chassis_up() {
        let (mut physics, chassis, mut vehicle) = setup(0.62);
        let dt = 1.0 / 60.0;
        for _ in 0..180 {
            vehicle.update(&mut physics, chassis, dt).unwrap();
            physics.step(dt as f64);
        }
        let pose = physics.query_transform(chassis).unwrap();
        // Rest length 0.5 minus a little sag, plus radius, minus the mount height.
        assert!(
            pose.position.y > 0.5 && pose.position.y < 0.7,
            "chassis height = {}",
            pose.position.y
        );
        assert!(vehicle.wheels().iter().all(Wheel::in_contact));
        // The load is shared by all four wheels.
        let total: f32 = vehicle.wheels().iter().map(|w| w.suspension_force).sum();
        assert!((total - MASS * 9.81).abs() < MASS * 9.81 * 0.2, "total = {total}");
    }

    #[test]
    fn test_brake_stops_rolling_chassis() {
        let (mut physics, chassis, mut vehicle) = setup(0.61);
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            vehicle.update(&mut physics, chassis, dt).unwrap();
            physics.step(dt as f64);
        }
        physics
            .set_velocity(chassis, Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO)
            .unwrap();
        for i in 0..4 {
            vehicle.set_brake(65.0, i);
        }
        for _ in 0..240 {
            vehicle.update(&mut physics, chassis, dt).unwrap();
            physics.step(dt as f64);
        }
        let speed = physics.body_state(chassis).unwrap().linear_velocity.length();
        assert!(speed < 0.5, "speed = {speed}");
    }

    #[test]
    fn test_speed_sign_follows_forward_axis() {
        let (mut physics, chassis, mut vehicle) = setup(5.0);
        physics
            .set_velocity(chassis, Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO)
            .unwrap();
        let speed = vehicle.update(&mut physics, chassis, 1.0 / 60.0).unwrap();
        assert!((speed + 36.0).abs() < 1e-3);
        assert_eq!(vehicle.speed_kmh(), speed);
    }

    #[test]
    fn test_side_friction_pushes_dynamic_ground_back() {
        let (mut physics, chassis, mut vehicle) = setup(5.0);
        let platform = physics
            .create_body(
                BodyDesc::new(
                    ColliderShape::Box {
                        half_extents: Vec3::new(5.0, 0.5, 5.0),
                    },
                    500.0,
                )
                .with_position(Vec3::new(0.0, 0.5, 0.0)),
            )
            .unwrap();
        // Wheels touch the platform top at y = 1, chassis sliding sideways.
        physics
            .set_pose(chassis, Pose::from_position(Vec3::new(0.0, 1.55, 0.0)))
            .unwrap();
        physics
            .set_velocity(chassis, Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO)
            .unwrap();

        vehicle.update(&mut physics, chassis, 1.0 / 60.0).unwrap();

        assert!(vehicle
            .wheels()
            .iter()
            .all(|w| w.contact.is_some_and(|c| c.ground == platform)));
        assert!(vehicle.wheels().iter().all(|w| w.side_impulse < 0.0));
        let ground = physics.body_state(platform).unwrap();
        assert!(ground.linear_velocity.x > 0.0, "ground = {}", ground.linear_velocity);
        let body = physics.body_state(chassis).unwrap();
        assert!(body.linear_velocity.x < 3.0);
    }

    #[test]
    fn test_unknown_chassis() {
        let (mut physics, chassis, mut vehicle) = setup(5.0);
        physics.remove_body(chassis);
        assert_eq!(
            vehicle.update(&mut physics, chassis, 1.0 / 60.0),
            Err(PhysicsError::UnknownBody)
        );
    }
}
