//! Wheel configuration and per-wheel simulation state.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::physics::Pose;

/// Which side of the chassis a wheel sits on. Used to mirror wheel meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WheelSide {
    Left,
    Right,
}

/// Static configuration of one wheel, in chassis-local space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelSpec {
    /// Suspension mount point on the chassis.
    pub connection_point: Vec3,
    /// Direction the suspension extends in. Default: -Y.
    pub direction: Vec3,
    /// Axle direction. Default: +X.
    pub axle: Vec3,
    pub suspension_rest_length: f32,
    pub suspension_stiffness: f32,
    /// Damping while the suspension compresses.
    pub damping_compression: f32,
    /// Damping while the suspension extends.
    pub damping_relaxation: f32,
    /// Maximum deviation from the rest length.
    pub max_suspension_travel: f32,
    pub max_suspension_force: f32,
    /// Grip limit. Impulses beyond `suspension force * dt * friction_slip` slide.
    pub friction_slip: f32,
    /// 0 applies side impulses at the chassis' height (no body roll), 1 at the contact.
    pub roll_influence: f32,
    pub radius: f32,
    pub is_steerable: bool,
}

impl Default for WheelSpec {
    fn default() -> Self {
        Self {
            connection_point: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            axle: Vec3::X,
            suspension_rest_length: 0.5,
            suspension_stiffness: 200.0,
            damping_compression: 4.4,
            damping_relaxation: 2.3,
            max_suspension_travel: 10.0,
            max_suspension_force: f32::MAX,
            friction_slip: 10.0,
            roll_influence: 0.0,
            radius: 0.32,
            is_steerable: false,
        }
    }
}

impl WheelSpec {
    /// Side derived from the mount point. Right is +X.
    pub fn side(&self) -> WheelSide {
        if self.connection_point.x >= 0.0 {
            WheelSide::Right
        } else {
            WheelSide::Left
        }
    }

    /// Four wheels in the order front-right, front-left, rear-right, rear-left.
    ///
    /// `front` and `back` are signed distances along the chassis' forward axis
    /// (so `back` is negative). Front wheels steer. All other parameters come
    /// from `template`.
    pub fn standard_layout(
        width: f32,
        height: f32,
        front: f32,
        back: f32,
        template: &WheelSpec,
    ) -> Vec<WheelSpec> {
        (0..4)
            .map(|index| {
                let along = if index < 2 { front } else { back };
                let side = if index % 2 == 0 { 0.5 } else { -0.5 };
                WheelSpec {
                    // Forward is -Z.
                    connection_point: Vec3::new(width * side, height, -along),
                    is_steerable: index < 2,
                    ..template.clone()
                }
            })
            .collect()
    }

    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let positive = |v: f32| v > 0.0 && v.is_finite();
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::invalid(
                    "vehicle.wheels",
                    format!("wheel {index}: {what}"),
                ))
            }
        };
        check(positive(self.radius), "radius must be positive")?;
        check(
            positive(self.suspension_rest_length),
            "suspension rest length must be positive",
        )?;
        check(
            self.suspension_stiffness >= 0.0
                && self.damping_compression >= 0.0
                && self.damping_relaxation >= 0.0,
            "stiffness and damping must be non-negative",
        )?;
        check(
            self.max_suspension_travel >= 0.0 && self.max_suspension_force > 0.0,
            "suspension limits must be positive",
        )?;
        check(self.friction_slip >= 0.0, "friction slip must be non-negative")?;
        check(
            self.direction.length_squared() > 1e-6 && self.axle.length_squared() > 1e-6,
            "direction and axle must be non-zero",
        )?;
        check(
            self.connection_point.is_finite(),
            "connection point must be finite",
        )
    }

    /// Local up axis of the wheel (opposite to the suspension direction).
    pub(crate) fn up(&self) -> Vec3 {
        -self.direction.normalize()
    }
}

/// Where a wheel's suspension ray touched the ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelContact<H> {
    pub point: Vec3,
    pub normal: Vec3,
    pub ground: H,
}

/// Runtime state of one wheel.
#[derive(Debug, Clone)]
pub struct Wheel<H> {
    pub spec: WheelSpec,
    /// Steering angle in radians. Positive turns left.
    pub steering: f32,
    pub engine_force: f32,
    pub brake: f32,
    /// Accumulated spin angle in radians. Grows while rolling forward.
    pub rotation: f32,
    pub delta_rotation: f32,
    pub suspension_length: f32,
    pub suspension_relative_velocity: f32,
    pub clipped_inv_contact_dot_suspension: f32,
    pub suspension_force: f32,
    pub side_impulse: f32,
    pub forward_impulse: f32,
    /// 1 while gripping, below 1 while sliding.
    pub skid_info: f32,
    pub contact: Option<WheelContact<H>>,
    /// World-space suspension mount and direction, refreshed every update.
    pub hard_point_ws: Vec3,
    pub direction_ws: Vec3,
}

impl<H> Wheel<H> {
    pub fn new(spec: WheelSpec) -> Self {
        let suspension_length = spec.suspension_rest_length;
        Self {
            spec,
            steering: 0.0,
            engine_force: 0.0,
            brake: 0.0,
            rotation: 0.0,
            delta_rotation: 0.0,
            suspension_length,
            suspension_relative_velocity: 0.0,
            clipped_inv_contact_dot_suspension: 1.0,
            suspension_force: 0.0,
            side_impulse: 0.0,
            forward_impulse: 0.0,
            skid_info: 1.0,
            contact: None,
            hard_point_ws: Vec3::ZERO,
            direction_ws: Vec3::NEG_Y,
        }
    }

    /// Clear everything but the configuration.
    pub fn reset(&mut self) {
        *self = Self::new(self.spec.clone());
    }

    pub fn in_contact(&self) -> bool {
        self.contact.is_some()
    }

    /// Refresh the world-space mount point and suspension direction from the chassis pose.
    pub(crate) fn update_transform(&mut self, chassis: &Pose) {
        self.hard_point_ws = chassis.transform_point(self.spec.connection_point);
        self.direction_ws = chassis.transform_vector(self.spec.direction.normalize());
    }

    /// Visual pose of the wheel for a chassis pose: suspension offset, steering, spin.
    pub fn world_pose(&self, chassis: &Pose) -> Pose {
        let direction = self.spec.direction.normalize();
        let hub = self.spec.connection_point + direction * self.suspension_length;
        let steer = Quat::from_axis_angle(self.spec.up(), self.steering);
        // Rolling forward about a +X axle is a negative rotation.
        let spin = Quat::from_axis_angle(self.spec.axle.normalize(), -self.rotation);
        Pose::new(
            chassis.transform_point(hub),
            (chassis.rotation * steer * spin).normalize(),
        )
    }
}
