//! Render-side scene state written by the physics read-back.
//!
//! The renderer itself is an external collaborator. It owns a `hecs::World`
//! of render entities; entities carrying a [`RigidBodyBinding`] or a
//! [`WheelBinding`] have their [`Transform`] overwritten every frame.

mod binding;
mod transform;

pub use binding::{sync_bindings, sync_body, sync_wheel_visuals, RigidBodyBinding, WheelBinding};
pub use transform::{RenderTransform, Transform};
