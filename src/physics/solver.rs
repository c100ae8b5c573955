//! Sequential impulse constraint solver.

use std::collections::HashMap;

use glam::{Mat3, Vec3};

use super::body::{Pose, RigidBody};
use super::contact::ContactManifold;

/// Baumgarte stabilization parameter.
const BAUMGARTE_BETA: f32 = 0.2;
/// Penetration slop (allowed penetration before position correction).
const PENETRATION_SLOP: f32 = 0.005;
/// Closing speeds below this do not bounce.
const RESTITUTION_THRESHOLD: f32 = 1.0;

/// Velocity state of one body, gathered once per solve.
struct SolverBody {
    inv_mass: f32,
    inv_inertia: Mat3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    position: Vec3,
}

impl SolverBody {
    #[inline]
    fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    #[inline]
    fn effective_inv_mass(&self, r: Vec3, direction: Vec3) -> f32 {
        let rxd = r.cross(direction);
        self.inv_mass + (self.inv_inertia * rxd).dot(rxd)
    }

    #[inline]
    fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * r.cross(impulse);
    }
}

/// Solve contact constraints using sequential impulse iteration.
///
/// Velocities are gathered from `world`, iterated on, then written back to
/// the dynamic bodies only.
pub fn solve_contacts(
    manifolds: &mut [ContactManifold],
    world: &mut hecs::World,
    solver_iterations: u32,
    dt: f32,
) {
    let mut bodies: Vec<SolverBody> = Vec::new();
    let mut index: HashMap<hecs::Entity, usize> = HashMap::new();

    for manifold in manifolds.iter() {
        for entity in manifold.bodies {
            if index.contains_key(&entity) {
                continue;
            }
            let Ok(mut query) = world.query_one::<(&RigidBody, &Pose)>(entity) else {
                continue;
            };
            let Some((rb, pose)) = query.get() else {
                continue;
            };
            index.insert(entity, bodies.len());
            bodies.push(SolverBody {
                inv_mass: if rb.is_dynamic() { rb.inv_mass } else { 0.0 },
                inv_inertia: rb.inv_inertia_world(pose.rotation),
                linear_velocity: rb.linear_velocity,
                angular_velocity: rb.angular_velocity,
                position: pose.position,
            });
        }
    }

    // Bounce targets from the pre-solve closing velocity.
    let mut bounce: Vec<Vec<f32>> = Vec::with_capacity(manifolds.len());
    for manifold in manifolds.iter() {
        let [entity_a, entity_b] = manifold.bodies;
        let targets = match (index.get(&entity_a), index.get(&entity_b)) {
            (Some(&ia), Some(&ib)) => manifold
                .points
                .iter()
                .map(|p| {
                    let a = &bodies[ia];
                    let b = &bodies[ib];
                    let closing = (b.velocity_at(p.contact.point - b.position)
                        - a.velocity_at(p.contact.point - a.position))
                    .dot(p.contact.normal);
                    if -closing > RESTITUTION_THRESHOLD {
                        -manifold.material.restitution * closing
                    } else {
                        0.0
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        bounce.push(targets);
    }

    for _ in 0..solver_iterations {
        for (manifold, targets) in manifolds.iter_mut().zip(&bounce) {
            let [entity_a, entity_b] = manifold.bodies;
            let (Some(&ia), Some(&ib)) = (index.get(&entity_a), index.get(&entity_b)) else {
                continue;
            };
            if ia == ib {
                continue;
            }
            solve_manifold(manifold, targets, &mut bodies, ia, ib, dt);
        }
    }

    for (entity, i) in index {
        if let Ok(mut rb) = world.get::<&mut RigidBody>(entity) {
            if rb.is_dynamic() {
                rb.linear_velocity = bodies[i].linear_velocity;
                rb.angular_velocity = bodies[i].angular_velocity;
            }
        }
    }
}

fn solve_manifold(
    manifold: &mut ContactManifold,
    bounce: &[f32],
    bodies: &mut [SolverBody],
    ia: usize,
    ib: usize,
    dt: f32,
) {
    if bodies[ia].inv_mass == 0.0 && bodies[ib].inv_mass == 0.0 {
        return;
    }

    let friction = manifold.material.friction;

    for (k, p) in manifold.points.iter_mut().enumerate() {
        let normal = p.contact.normal;
        let r_a = p.contact.point - bodies[ia].position;
        let r_b = p.contact.point - bodies[ib].position;

        // Normal impulse
        let relative_velocity = bodies[ib].velocity_at(r_b) - bodies[ia].velocity_at(r_a);
        let contact_velocity = relative_velocity.dot(normal);

        let inv_mass_sum =
            bodies[ia].effective_inv_mass(r_a, normal) + bodies[ib].effective_inv_mass(r_b, normal);
        if inv_mass_sum <= 0.0 {
            continue;
        }

        // Baumgarte position correction
        let bias = BAUMGARTE_BETA / dt * (p.contact.depth - PENETRATION_SLOP).max(0.0);
        let target = bias.max(bounce.get(k).copied().unwrap_or(0.0));

        let j_normal = (target - contact_velocity) / inv_mass_sum;

        // Clamp accumulated normal impulse
        let old_impulse = p.normal_impulse;
        p.normal_impulse = (old_impulse + j_normal).max(0.0);
        let j_normal = p.normal_impulse - old_impulse;

        let impulse = normal * j_normal;
        bodies[ia].apply_impulse(-impulse, r_a);
        bodies[ib].apply_impulse(impulse, r_b);

        // Coulomb friction along two tangent directions: |Jt| <= mu * |Jn|
        let max_friction = friction * p.normal_impulse;
        let (t1, t2) = normal.any_orthonormal_pair();
        for (d, tangent) in [t1, t2].into_iter().enumerate() {
            let rel_vel = bodies[ib].velocity_at(r_b) - bodies[ia].velocity_at(r_a);
            let inv_mass_t = bodies[ia].effective_inv_mass(r_a, tangent)
                + bodies[ib].effective_inv_mass(r_b, tangent);
            if inv_mass_t <= 0.0 {
                continue;
            }

            let j_tangent = -rel_vel.dot(tangent) / inv_mass_t;
            let old = p.tangent_impulse[d];
            p.tangent_impulse[d] = (old + j_tangent).clamp(-max_friction, max_friction);
            let j_tangent = p.tangent_impulse[d] - old;

            let friction_impulse = tangent * j_tangent;
            bodies[ia].apply_impulse(-friction_impulse, r_a);
            bodies[ib].apply_impulse(friction_impulse, r_b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::{Collider, SleepInfo};
    use crate::physics::collider::ColliderShape;
    use crate::physics::contact::{Contact, ContactMaterial};

    fn spawn(world: &mut hecs::World, position: Vec3, rb: RigidBody) -> hecs::Entity {
        world.spawn((
            Pose::from_position(position),
            rb,
            Collider {
                shape: ColliderShape::Sphere { radius: 0.5 },
            },
            SleepInfo::new(true),
        ))
    }

    fn manifold(a: hecs::Entity, b: hecs::Entity, point: Vec3, normal: Vec3) -> ContactManifold {
        let material = ContactMaterial {
            friction: 0.5,
            restitution: 0.0,
        };
        let contact = Contact {
            point,
            normal,
            depth: 0.0,
        };
        ContactManifold::new([a, b], material, [contact]).unwrap()
    }

    #[test]
    fn test_falling_ball_stops_on_ground() {
        let mut world = hecs::World::new();
        let ground = spawn(&mut world, Vec3::ZERO, RigidBody::new_static());
        let mut rb = RigidBody::new_dynamic(1.0, &ColliderShape::Sphere { radius: 0.5 });
        rb.linear_velocity = Vec3::new(0.0, -0.5, 0.0);
        let ball = spawn(&mut world, Vec3::new(0.0, 0.5, 0.0), rb);

        let mut manifolds = vec![manifold(ground, ball, Vec3::ZERO, Vec3::Y)];
        solve_contacts(&mut manifolds, &mut world, 8, 1.0 / 60.0);

        let rb = world.get::<&RigidBody>(ball).unwrap();
        assert!(rb.linear_velocity.y.abs() < 1e-4);
        assert!(manifolds[0].points[0].normal_impulse > 0.0);
    }

    #[test]
    fn test_separating_bodies_are_not_pulled_together() {
        let mut world = hecs::World::new();
        let ground = spawn(&mut world, Vec3::ZERO, RigidBody::new_static());
        let mut rb = RigidBody::new_dynamic(1.0, &ColliderShape::Sphere { radius: 0.5 });
        rb.linear_velocity = Vec3::new(0.0, 2.0, 0.0);
        let ball = spawn(&mut world, Vec3::new(0.0, 0.5, 0.0), rb);

        let mut manifolds = vec![manifold(ground, ball, Vec3::ZERO, Vec3::Y)];
        solve_contacts(&mut manifolds, &mut world, 8, 1.0 / 60.0);

        let rb = world.get::<&RigidBody>(ball).unwrap();
        assert!((rb.linear_velocity.y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_friction_slows_sliding_body() {
        let mut world = hecs::World::new();
        let ground = spawn(&mut world, Vec3::ZERO, RigidBody::new_static());
        let mut rb = RigidBody::new_dynamic(1.0, &ColliderShape::Sphere { radius: 0.5 });
        rb.linear_velocity = Vec3::new(1.0, -1.0, 0.0);
        let ball = spawn(&mut world, Vec3::new(0.0, 0.5, 0.0), rb);

        let mut manifolds = vec![manifold(ground, ball, Vec3::ZERO, Vec3::Y)];
        solve_contacts(&mut manifolds, &mut world, 8, 1.0 / 60.0);

        let rb = world.get::<&RigidBody>(ball).unwrap();
        // A sphere contact point rolls, so part of the slide becomes spin.
        let contact_velocity =
            rb.linear_velocity + rb.angular_velocity.cross(Vec3::new(0.0, -0.5, 0.0));
        assert!(contact_velocity.x.abs() < 1.0);
        assert!(rb.linear_velocity.x < 1.0);
    }

    #[test]
    fn test_static_body_velocity_untouched() {
        let mut world = hecs::World::new();
        let ground = spawn(&mut world, Vec3::ZERO, RigidBody::new_static());
        let mut rb = RigidBody::new_dynamic(1.0, &ColliderShape::Sphere { radius: 0.5 });
        rb.linear_velocity = Vec3::new(0.0, -3.0, 0.0);
        let ball = spawn(&mut world, Vec3::new(0.0, 0.5, 0.0), rb);

        let mut manifolds = vec![manifold(ground, ball, Vec3::ZERO, Vec3::Y)];
        solve_contacts(&mut manifolds, &mut world, 8, 1.0 / 60.0);

        let rb = world.get::<&RigidBody>(ground).unwrap();
        assert_eq!(rb.linear_velocity, Vec3::ZERO);
    }
}
