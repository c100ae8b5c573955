//! Rigid body components stored in the physics world.

use glam::{Mat3, Mat4, Quat, Vec3};

use super::collider::ColliderShape;

/// Rigid body type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigidBodyType {
    /// Affected by forces and collisions.
    Dynamic,
    /// Immovable. Every zero-mass body is static.
    Static,
}

/// World-space position and orientation of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Convert to a 4x4 matrix (translation * rotation).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    #[inline]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    #[inline]
    pub fn transform_vector(&self, local: Vec3) -> Vec3 {
        self.rotation * local
    }

    #[inline]
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.conjugate() * (world - self.position)
    }

    #[inline]
    pub fn inverse_transform_vector(&self, world: Vec3) -> Vec3 {
        self.rotation.conjugate() * world
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Rigid body component.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub body_type: RigidBodyType,
    pub mass: f32,
    pub inv_mass: f32,
    /// Principal moments of inertia in body space.
    pub local_inertia: Vec3,
    pub inv_local_inertia: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force_accumulator: Vec3,
    pub torque_accumulator: Vec3,
    /// Fraction of linear velocity lost per second (default: 0.01).
    pub linear_damping: f32,
    /// Fraction of angular velocity lost per second (default: 0.01).
    pub angular_damping: f32,
    /// Coefficient of restitution (0.0 - 1.0).
    pub restitution: f32,
    /// Friction coefficient.
    pub friction: f32,
    /// Gravity scale (default: 1.0).
    pub gravity_scale: f32,
}

impl RigidBody {
    /// Create a new dynamic rigid body with inertia derived from its shape.
    pub fn new_dynamic(mass: f32, shape: &ColliderShape) -> Self {
        let local_inertia = shape.local_inertia(mass);
        Self {
            body_type: RigidBodyType::Dynamic,
            mass,
            inv_mass: 1.0 / mass,
            local_inertia,
            inv_local_inertia: invert_diagonal(local_inertia),
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            linear_damping: 0.01,
            angular_damping: 0.01,
            restitution: 0.0,
            friction: 0.5,
            gravity_scale: 1.0,
        }
    }

    /// Create a new static rigid body.
    pub fn new_static() -> Self {
        Self {
            body_type: RigidBodyType::Static,
            mass: 0.0,
            inv_mass: 0.0,
            local_inertia: Vec3::ZERO,
            inv_local_inertia: Vec3::ZERO,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            linear_damping: 0.0,
            angular_damping: 0.0,
            restitution: 0.0,
            friction: 0.5,
            gravity_scale: 0.0,
        }
    }

    /// True for bodies that respond to forces.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == RigidBodyType::Dynamic && self.inv_mass > 0.0
    }

    /// Inverse inertia tensor rotated into world space.
    pub fn inv_inertia_world(&self, rotation: Quat) -> Mat3 {
        if !self.is_dynamic() {
            return Mat3::ZERO;
        }
        let r = Mat3::from_quat(rotation);
        r * Mat3::from_diagonal(self.inv_local_inertia) * r.transpose()
    }
}

fn invert_diagonal(v: Vec3) -> Vec3 {
    let inv = |x: f32| if x > 0.0 { 1.0 / x } else { 0.0 };
    Vec3::new(inv(v.x), inv(v.y), inv(v.z))
}

/// Collision shape attached to a body at creation time.
#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: ColliderShape,
}

/// Sleep state of a dynamic body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepState {
    Awake,
    Sleeping,
}

/// Sleep bookkeeping for a body.
#[derive(Debug, Clone, Copy)]
pub struct SleepInfo {
    pub state: SleepState,
    /// Seconds spent below the sleep thresholds.
    pub timer: f32,
    /// Bodies with this cleared never fall asleep.
    pub can_sleep: bool,
}

impl SleepInfo {
    pub fn new(can_sleep: bool) -> Self {
        Self {
            state: SleepState::Awake,
            timer: 0.0,
            can_sleep,
        }
    }

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.state == SleepState::Sleeping
    }

    pub fn wake(&mut self) {
        self.state = SleepState::Awake;
        self.timer = 0.0;
    }
}
