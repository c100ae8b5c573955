//! Contacts produced by the narrowphase and consumed by the solver.

use glam::Vec3;

use super::body::RigidBody;

/// One point where two shapes overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// World-space point, halfway through the overlap.
    pub point: Vec3,
    /// Unit normal from the first shape to the second.
    pub normal: Vec3,
    /// Overlap along `normal`. Always positive.
    pub depth: f32,
}

impl Contact {
    /// Same contact seen from the other shape.
    #[inline]
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

/// Surface response of a body pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMaterial {
    pub friction: f32,
    pub restitution: f32,
}

impl ContactMaterial {
    /// Mean of both bodies' coefficients.
    pub fn mix(a: &RigidBody, b: &RigidBody) -> Self {
        Self {
            friction: (a.friction + b.friction) * 0.5,
            restitution: (a.restitution + b.restitution) * 0.5,
        }
    }
}

/// A contact plus the impulses the solver accumulated on it.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    pub contact: Contact,
    pub normal_impulse: f32,
    /// Two friction directions.
    pub tangent_impulse: [f32; 2],
}

impl From<Contact> for ContactPoint {
    fn from(contact: Contact) -> Self {
        Self {
            contact,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
        }
    }
}

/// Every contact between one pair of bodies in one substep.
#[derive(Debug, Clone)]
pub struct ContactManifold {
    pub bodies: [hecs::Entity; 2],
    pub material: ContactMaterial,
    pub points: Vec<ContactPoint>,
}

impl ContactManifold {
    /// `None` when the pair does not touch.
    pub fn new(
        bodies: [hecs::Entity; 2],
        material: ContactMaterial,
        contacts: impl IntoIterator<Item = Contact>,
    ) -> Option<Self> {
        let points: Vec<ContactPoint> = contacts.into_iter().map(ContactPoint::from).collect();
        (!points.is_empty()).then_some(Self {
            bodies,
            material,
            points,
        })
    }

    pub fn max_depth(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.contact.depth)
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collider::ColliderShape;

    #[test]
    fn test_material_is_mean_of_bodies() {
        let mut a = RigidBody::new_dynamic(1.0, &ColliderShape::Sphere { radius: 0.5 });
        a.friction = 0.8;
        a.restitution = 0.0;
        let mut b = RigidBody::new_static();
        b.friction = 0.2;
        b.restitution = 0.5;
        let material = ContactMaterial::mix(&a, &b);
        assert!((material.friction - 0.5).abs() < 1e-6);
        assert!((material.restitution - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_manifold_needs_contacts() {
        let mut world = hecs::World::new();
        let bodies = [world.spawn(()), world.spawn(())];
        let material = ContactMaterial {
            friction: 0.5,
            restitution: 0.0,
        };
        assert!(ContactManifold::new(bodies, material, []).is_none());

        let contact = Contact {
            point: Vec3::ZERO,
            normal: Vec3::Y,
            depth: 0.02,
        };
        let deeper = Contact {
            depth: 0.07,
            ..contact
        };
        let manifold = ContactManifold::new(bodies, material, [contact, deeper]).unwrap();
        assert_eq!(manifold.points.len(), 2);
        assert_eq!(manifold.points[0].normal_impulse, 0.0);
        assert_eq!(manifold.max_depth(), 0.07);
        assert_eq!(contact.flipped().normal, Vec3::NEG_Y);
    }
}
