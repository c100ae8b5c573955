//! One-way synchronization from simulated bodies to render transforms.

use crate::physics::{PhysicsBackend, Pose};

use super::transform::{RenderTransform, Transform};

/// Ties a render entity to a simulated body. The next read-back overwrites
/// any transform written by user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigidBodyBinding<H> {
    pub body: H,
}

/// Ties a render entity to one of the vehicle's wheels, in wheel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelBinding {
    pub wheel: usize,
}

/// Copy a body's pose into `target`.
///
/// Sleeping and missing bodies leave the target untouched. Returns whether it
/// was written.
pub fn sync_body<B, T>(physics: &B, body: B::Handle, target: &mut T) -> bool
where
    B: PhysicsBackend + ?Sized,
    T: RenderTransform + ?Sized,
{
    match physics.body_state(body) {
        Some(state) if !state.sleeping => {
            target.set_pose(&state.pose);
            true
        }
        Some(_) => {
            tracing::trace!("Skipping read-back of sleeping body {:?}", body);
            false
        }
        None => {
            tracing::trace!("Skipping read-back of missing body {:?}", body);
            false
        }
    }
}

/// Copy every bound body's pose into its entity's [`Transform`].
///
/// Returns the number of updated entities.
pub fn sync_bindings<B: PhysicsBackend>(scene: &mut hecs::World, physics: &B) -> usize {
    let mut updated = 0;
    for (_, (binding, transform)) in
        scene.query_mut::<(&RigidBodyBinding<B::Handle>, &mut Transform)>()
    {
        if sync_body(physics, binding.body, transform) {
            updated += 1;
        }
    }
    updated
}

/// Move the visual wheel entities to the given world-space wheel poses.
///
/// Returns the number of updated entities.
pub fn sync_wheel_visuals(scene: &mut hecs::World, wheels: &[Pose]) -> usize {
    let mut updated = 0;
    for (_, (binding, transform)) in scene.query_mut::<(&WheelBinding, &mut Transform)>() {
        if let Some(pose) = wheels.get(binding.wheel) {
            transform.set_pose(pose);
            updated += 1;
        }
    }
    updated
}
