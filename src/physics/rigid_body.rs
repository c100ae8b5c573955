//! Rigid body integration functions.

use glam::{Quat, Vec3};

use super::body::{Pose, RigidBody, SleepInfo, SleepState};
use super::PhysicsConfig;

/// Apply gravity force to all awake dynamic rigid bodies.
pub fn apply_gravity(world: &mut hecs::World, gravity: Vec3) {
    for (_, (rb, sleep)) in world.query_mut::<(&mut RigidBody, &SleepInfo)>() {
        if rb.is_dynamic() && !sleep.is_sleeping() {
            rb.force_accumulator += gravity * rb.mass * rb.gravity_scale;
        }
    }
}

/// Integrate velocities using semi-implicit Euler: v += (F/m) * dt.
///
/// Damping is applied as `v *= (1 - d)^dt` so the loss per second does not
/// depend on the step size.
pub fn integrate_velocities(world: &mut hecs::World, dt: f32) {
    for (_, (rb, pose, sleep)) in world.query_mut::<(&mut RigidBody, &Pose, &SleepInfo)>() {
        if !rb.is_dynamic() || sleep.is_sleeping() {
            continue;
        }

        rb.linear_velocity += rb.force_accumulator * rb.inv_mass * dt;
        rb.angular_velocity += rb.inv_inertia_world(pose.rotation) * rb.torque_accumulator * dt;

        rb.linear_velocity *= (1.0 - rb.linear_damping).clamp(0.0, 1.0).powf(dt);
        rb.angular_velocity *= (1.0 - rb.angular_damping).clamp(0.0, 1.0).powf(dt);
    }
}

/// Integrate positions: p += v * dt, q += 0.5 * omega * q * dt.
pub fn integrate_positions(world: &mut hecs::World, dt: f32) {
    for (_, (rb, pose, sleep)) in world.query_mut::<(&RigidBody, &mut Pose, &SleepInfo)>() {
        if !rb.is_dynamic() || sleep.is_sleeping() {
            continue;
        }

        pose.position += rb.linear_velocity * dt;

        // q' = q + 0.5 * dt * omega_quat * q
        let omega = rb.angular_velocity;
        if omega.length_squared() > 1e-10 {
            let omega_quat = Quat::from_xyzw(omega.x, omega.y, omega.z, 0.0);
            let q_dot = omega_quat * pose.rotation * 0.5;
            pose.rotation = Quat::from_xyzw(
                pose.rotation.x + q_dot.x * dt,
                pose.rotation.y + q_dot.y * dt,
                pose.rotation.z + q_dot.z * dt,
                pose.rotation.w + q_dot.w * dt,
            )
            .normalize();
        }
    }
}

/// Clear force and torque accumulators on all rigid bodies.
pub fn clear_forces(world: &mut hecs::World) {
    for (_, rb) in world.query_mut::<&mut RigidBody>() {
        rb.force_accumulator = Vec3::ZERO;
        rb.torque_accumulator = Vec3::ZERO;
    }
}

/// Update sleep states for all dynamic bodies.
///
/// Bodies whose velocities stay below the configured thresholds for
/// `sleep_time` seconds transition to `Sleeping`. Sleeping bodies skip
/// integration and gravity until woken.
pub fn update_sleep_states(world: &mut hecs::World, config: &PhysicsConfig, dt: f32) {
    for (_, (rb, sleep)) in world.query_mut::<(&mut RigidBody, &mut SleepInfo)>() {
        if !rb.is_dynamic() || !sleep.can_sleep || sleep.is_sleeping() {
            continue;
        }

        let linear_speed = rb.linear_velocity.length();
        let angular_speed = rb.angular_velocity.length();

        if linear_speed < config.sleep_linear_threshold
            && angular_speed < config.sleep_angular_threshold
        {
            sleep.timer += dt;
            if sleep.timer >= config.sleep_time {
                sleep.state = SleepState::Sleeping;
                rb.linear_velocity = Vec3::ZERO;
                rb.angular_velocity = Vec3::ZERO;
            }
        } else {
            sleep.timer = 0.0;
        }
    }
}

/// Wake up a specific body (contacts with moving bodies, impulses, teleports).
pub fn wake_body(world: &mut hecs::World, entity: hecs::Entity) {
    if let Ok(mut sleep) = world.get::<&mut SleepInfo>(entity) {
        if sleep.is_sleeping() {
            sleep.wake();
        }
    }
}
