//! Broadphase collision detection using AABB overlap tests.

use super::body::{Collider, Pose, RigidBody, SleepInfo};
use super::collider::PhysicsAabb;

/// Sweep-and-prune broadphase (currently O(n^2) pair-wise AABB test).
#[derive(Debug, Default)]
pub struct SweepAndPrune;

impl SweepAndPrune {
    pub fn new() -> Self {
        Self
    }

    /// Find all pairs of entities whose AABBs overlap.
    ///
    /// Only returns pairs where at least one entity is an awake dynamic body.
    pub fn find_pairs(&self, world: &hecs::World) -> Vec<(hecs::Entity, hecs::Entity)> {
        // (entity, bounds, dynamic, awake)
        let mut entries: Vec<(hecs::Entity, PhysicsAabb, bool, bool)> = Vec::new();

        for (entity, (collider, pose, rb, sleep)) in world
            .query::<(&Collider, &Pose, &RigidBody, &SleepInfo)>()
            .iter()
        {
            let aabb = collider.shape.compute_aabb(pose);
            let dynamic = rb.is_dynamic();
            entries.push((entity, aabb, dynamic, dynamic && !sleep.is_sleeping()));
        }

        let mut pairs = Vec::new();

        // O(n^2) brute force - sufficient for small numbers of entities
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (entity_a, aabb_a, dynamic_a, awake_a) = &entries[i];
                let (entity_b, aabb_b, dynamic_b, awake_b) = &entries[j];

                // Skip static-static pairs
                if !dynamic_a && !dynamic_b {
                    continue;
                }
                // Nothing moved: a sleeping body against a sleeping or static one.
                if !awake_a && !awake_b {
                    continue;
                }

                if aabb_a.overlaps(aabb_b) {
                    pairs.push((*entity_a, *entity_b));
                }
            }
        }

        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::SleepState;
    use crate::physics::collider::ColliderShape;
    use glam::Vec3;

    fn spawn_sphere(
        world: &mut hecs::World,
        position: Vec3,
        radius: f32,
        dynamic: bool,
    ) -> hecs::Entity {
        let shape = ColliderShape::Sphere { radius };
        let rb = if dynamic {
            RigidBody::new_dynamic(1.0, &shape)
        } else {
            RigidBody::new_static()
        };
        world.spawn((Pose::from_position(position), rb, Collider { shape }, SleepInfo::new(true)))
    }

    #[test]
    fn test_broadphase_overlapping() {
        let mut world = hecs::World::new();
        spawn_sphere(&mut world, Vec3::ZERO, 1.0, true);
        spawn_sphere(&mut world, Vec3::new(1.0, 0.0, 0.0), 1.0, true);

        let pairs = SweepAndPrune::new().find_pairs(&world);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_broadphase_no_overlap() {
        let mut world = hecs::World::new();
        spawn_sphere(&mut world, Vec3::ZERO, 0.5, true);
        spawn_sphere(&mut world, Vec3::new(10.0, 0.0, 0.0), 0.5, true);

        let pairs = SweepAndPrune::new().find_pairs(&world);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_broadphase_static_static_skipped() {
        let mut world = hecs::World::new();
        spawn_sphere(&mut world, Vec3::ZERO, 1.0, false);
        spawn_sphere(&mut world, Vec3::ZERO, 1.0, false);

        let pairs = SweepAndPrune::new().find_pairs(&world);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_broadphase_sleeping_on_ground_skipped() {
        let mut world = hecs::World::new();
        world.spawn((
            Pose::identity(),
            RigidBody::new_static(),
            Collider {
                shape: ColliderShape::Plane,
            },
            SleepInfo::new(false),
        ));
        let ball = spawn_sphere(&mut world, Vec3::new(0.0, 0.5, 0.0), 0.5, true);

        assert_eq!(SweepAndPrune::new().find_pairs(&world).len(), 1);

        world.get::<&mut SleepInfo>(ball).unwrap().state = SleepState::Sleeping;
        assert!(SweepAndPrune::new().find_pairs(&world).is_empty());
    }
}
