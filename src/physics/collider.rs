//! Collider shapes, bounding boxes and support functions.

use glam::Vec3;

use crate::error::PhysicsError;

use super::body::Pose;

/// Number of rim samples per cylinder cap used for manifold generation.
const CYLINDER_RIM_SAMPLES: usize = 8;

/// Collider shape. Immutable once attached to a body.
#[derive(Debug, Clone, PartialEq)]
pub enum ColliderShape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    /// Cylinder along the local Y axis.
    Cylinder { radius: f32, height: f32 },
    /// Infinite half-space whose surface passes through the body origin with
    /// a local +Y normal.
    Plane,
    Heightfield(Heightfield),
}

/// Regular grid of heights centered on the body origin.
///
/// `matrix[i][j]` is the height of the sample at local
/// `x = i * element_size - half_width_x`, `z = j * element_size - half_width_z`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightfield {
    heights: Vec<f32>,
    rows: usize,
    cols: usize,
    element_size: f32,
    min_height: f32,
    max_height: f32,
}

impl Heightfield {
    /// Build a heightfield from a rectangular matrix of at least 2x2 samples.
    pub fn new(matrix: Vec<Vec<f32>>, element_size: f32) -> Result<Self, PhysicsError> {
        if !(element_size > 0.0 && element_size.is_finite()) {
            return Err(PhysicsError::InvalidShape(format!(
                "heightfield element size must be positive, got {element_size}"
            )));
        }
        let rows = matrix.len();
        let cols = matrix.first().map_or(0, Vec::len);
        if rows < 2 || cols < 2 {
            return Err(PhysicsError::InvalidShape(format!(
                "heightfield needs at least 2x2 samples, got {rows}x{cols}"
            )));
        }
        if matrix.iter().any(|row| row.len() != cols) {
            return Err(PhysicsError::InvalidShape(
                "heightfield rows must all have the same length".into(),
            ));
        }

        let heights: Vec<f32> = matrix.into_iter().flatten().collect();
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(PhysicsError::InvalidShape(
                "heightfield heights must be finite".into(),
            ));
        }
        let min_height = heights.iter().copied().fold(f32::MAX, f32::min);
        let max_height = heights.iter().copied().fold(f32::MIN, f32::max);

        Ok(Self {
            heights,
            rows,
            cols,
            element_size,
            min_height,
            max_height,
        })
    }

    pub fn element_size(&self) -> f32 {
        self.element_size
    }

    /// Half of the grid extent along local X and Z.
    pub fn half_extents(&self) -> (f32, f32) {
        (
            (self.rows - 1) as f32 * self.element_size * 0.5,
            (self.cols - 1) as f32 * self.element_size * 0.5,
        )
    }

    #[inline]
    fn sample(&self, i: usize, j: usize) -> f32 {
        self.heights[i * self.cols + j]
    }

    /// Bilinearly interpolated height at local `(x, z)`, or `None` outside the grid.
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let (hx, hz) = self.half_extents();
        let fi = (x + hx) / self.element_size;
        let fj = (z + hz) / self.element_size;
        let max_i = (self.rows - 1) as f32;
        let max_j = (self.cols - 1) as f32;
        if !(0.0..=max_i).contains(&fi) || !(0.0..=max_j).contains(&fj) {
            return None;
        }

        let i0 = (fi.floor() as usize).min(self.rows - 2);
        let j0 = (fj.floor() as usize).min(self.cols - 2);
        let tx = fi - i0 as f32;
        let tz = fj - j0 as f32;

        let h00 = self.sample(i0, j0);
        let h10 = self.sample(i0 + 1, j0);
        let h01 = self.sample(i0, j0 + 1);
        let h11 = self.sample(i0 + 1, j0 + 1);
        let near = h00 + (h10 - h00) * tx;
        let far = h01 + (h11 - h01) * tx;
        Some(near + (far - near) * tz)
    }

    /// Surface normal at local `(x, z)` from central differences.
    pub fn normal_at(&self, x: f32, z: f32) -> Vec3 {
        let (hx, hz) = self.half_extents();
        let d = self.element_size * 0.5;
        let clamp_x = |v: f32| v.clamp(-hx, hx);
        let clamp_z = |v: f32| v.clamp(-hz, hz);
        let h = |x: f32, z: f32| self.height_at(clamp_x(x), clamp_z(z)).unwrap_or(0.0);

        let dhdx = (h(x + d, z) - h(x - d, z)) / (2.0 * d);
        let dhdz = (h(x, z + d) - h(x, z - d)) / (2.0 * d);
        Vec3::new(-dhdx, 1.0, -dhdz).normalize()
    }

    fn local_aabb(&self) -> (Vec3, Vec3) {
        let (hx, hz) = self.half_extents();
        (
            Vec3::new(-hx, self.min_height, -hz),
            Vec3::new(hx, self.max_height, hz),
        )
    }
}

/// Axis-aligned bounding box for broadphase collision detection.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl PhysicsAabb {
    /// Bounds that overlap everything; used for infinite planes.
    pub fn infinite() -> Self {
        Self {
            min: Vec3::splat(f32::MIN),
            max: Vec3::splat(f32::MAX),
        }
    }

    /// Test whether two AABBs overlap.
    #[inline]
    pub fn overlaps(&self, other: &PhysicsAabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Slab test. Returns the entry distance along the ray if it hits within `max_toi`.
    pub fn ray_entry(&self, origin: Vec3, direction: Vec3, max_toi: f32) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = max_toi;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-12 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - o) * inv;
            let mut t1 = (self.max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

impl ColliderShape {
    /// Reject degenerate dimensions.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let positive = |v: f32| v > 0.0 && v.is_finite();
        match self {
            ColliderShape::Box { half_extents } => {
                if !(positive(half_extents.x)
                    && positive(half_extents.y)
                    && positive(half_extents.z))
                {
                    return Err(PhysicsError::InvalidShape(format!(
                        "box half extents must be positive, got {half_extents}"
                    )));
                }
            }
            ColliderShape::Sphere { radius } => {
                if !positive(*radius) {
                    return Err(PhysicsError::InvalidShape(format!(
                        "sphere radius must be positive, got {radius}"
                    )));
                }
            }
            ColliderShape::Cylinder { radius, height } => {
                if !(positive(*radius) && positive(*height)) {
                    return Err(PhysicsError::InvalidShape(format!(
                        "cylinder radius and height must be positive, got {radius} x {height}"
                    )));
                }
            }
            // Validated at construction.
            ColliderShape::Plane | ColliderShape::Heightfield(_) => {}
        }
        Ok(())
    }

    /// Finite convex shapes. Planes and heightfields are surfaces.
    #[inline]
    pub fn is_convex(&self) -> bool {
        matches!(
            self,
            ColliderShape::Box { .. }
                | ColliderShape::Sphere { .. }
                | ColliderShape::Cylinder { .. }
        )
    }

    /// Principal moments of inertia for a solid body of the given mass.
    pub fn local_inertia(&self, mass: f32) -> Vec3 {
        match self {
            ColliderShape::Box { half_extents: h } => {
                let h2 = *h * *h;
                Vec3::new(h2.y + h2.z, h2.x + h2.z, h2.x + h2.y) * (mass / 3.0)
            }
            ColliderShape::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
            ColliderShape::Cylinder { radius, height } => {
                let r2 = radius * radius;
                let side = mass * (3.0 * r2 + height * height) / 12.0;
                Vec3::new(side, 0.5 * mass * r2, side)
            }
            ColliderShape::Plane | ColliderShape::Heightfield(_) => Vec3::ZERO,
        }
    }

    /// Support mapping: the farthest point of the shape in `direction`.
    #[inline]
    pub fn support(&self, direction: Vec3, pose: &Pose) -> Vec3 {
        let local_dir = pose.inverse_transform_vector(direction).normalize_or_zero();

        let local_point = match self {
            ColliderShape::Sphere { radius } => local_dir * *radius,
            ColliderShape::Box { half_extents } => Vec3::new(
                half_extents.x.copysign(local_dir.x),
                half_extents.y.copysign(local_dir.y),
                half_extents.z.copysign(local_dir.z),
            ),
            ColliderShape::Cylinder { radius, height } => {
                let y = (height * 0.5).copysign(local_dir.y);
                let xz = Vec3::new(local_dir.x, 0.0, local_dir.z);
                let xz_len = xz.length();
                let xz_point = if xz_len > 1e-6 {
                    xz * (*radius / xz_len)
                } else {
                    Vec3::ZERO
                };
                Vec3::new(xz_point.x, y, xz_point.z)
            }
            // Not convex; the narrowphase never asks. Use the bounding box corner.
            ColliderShape::Heightfield(field) => {
                let (min, max) = field.local_aabb();
                Vec3::new(
                    if local_dir.x >= 0.0 { max.x } else { min.x },
                    if local_dir.y >= 0.0 { max.y } else { min.y },
                    if local_dir.z >= 0.0 { max.z } else { min.z },
                )
            }
            ColliderShape::Plane => Vec3::ZERO,
        };

        pose.transform_point(local_point)
    }

    /// Representative surface points used for contacts against planes and heightfields.
    pub fn contact_vertices(&self, pose: &Pose) -> Vec<Vec3> {
        match self {
            ColliderShape::Box { half_extents: h } => {
                let mut corners = Vec::with_capacity(8);
                for sx in [-1.0, 1.0] {
                    for sy in [-1.0, 1.0] {
                        for sz in [-1.0, 1.0] {
                            let local = Vec3::new(h.x * sx, h.y * sy, h.z * sz);
                            corners.push(pose.transform_point(local));
                        }
                    }
                }
                corners
            }
            ColliderShape::Cylinder { radius, height } => {
                let mut rim = Vec::with_capacity(CYLINDER_RIM_SAMPLES * 2);
                for k in 0..CYLINDER_RIM_SAMPLES {
                    let angle = k as f32 * std::f32::consts::TAU / CYLINDER_RIM_SAMPLES as f32;
                    let (s, c) = angle.sin_cos();
                    for y in [-height * 0.5, height * 0.5] {
                        rim.push(pose.transform_point(Vec3::new(c * radius, y, s * radius)));
                    }
                }
                rim
            }
            _ => Vec::new(),
        }
    }

    /// Compute the world-space AABB for this shape.
    #[inline]
    pub fn compute_aabb(&self, pose: &Pose) -> PhysicsAabb {
        match self {
            ColliderShape::Sphere { radius } => PhysicsAabb {
                min: pose.position - Vec3::splat(*radius),
                max: pose.position + Vec3::splat(*radius),
            },
            ColliderShape::Box { half_extents } => aabb_from_extents(*half_extents, pose),
            ColliderShape::Cylinder { radius, height } => {
                aabb_from_extents(Vec3::new(*radius, height * 0.5, *radius), pose)
            }
            ColliderShape::Plane => PhysicsAabb::infinite(),
            ColliderShape::Heightfield(field) => {
                let (min, max) = field.local_aabb();
                let center = (min + max) * 0.5;
                let mut aabb = aabb_from_extents((max - min) * 0.5, pose);
                let offset = pose.transform_vector(center);
                aabb.min += offset;
                aabb.max += offset;
                aabb
            }
        }
    }
}

/// Compute world-space AABB from local half-extents and a pose.
#[inline]
fn aabb_from_extents(half_extents: Vec3, pose: &Pose) -> PhysicsAabb {
    let center = pose.position;

    // For each world axis, compute the extent by projecting the local box axes
    let abs_col0 = (pose.rotation * Vec3::X).abs();
    let abs_col1 = (pose.rotation * Vec3::Y).abs();
    let abs_col2 = (pose.rotation * Vec3::Z).abs();

    let extent = abs_col0 * half_extents.x + abs_col1 * half_extents.y + abs_col2 * half_extents.z;

    PhysicsAabb {
        min: center - extent,
        max: center + extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn ramp() -> Heightfield {
        // Height grows by 1 per sample along X.
        Heightfield::new(vec![vec![0.0; 3], vec![1.0; 3], vec![2.0; 3]], 1.0).unwrap()
    }

    #[test]
    fn test_sphere_aabb() {
        let shape = ColliderShape::Sphere { radius: 1.0 };
        let aabb = shape.compute_aabb(&Pose::from_position(Vec3::new(0.0, 5.0, 0.0)));

        let eps = 1e-5;
        assert!((aabb.min - Vec3::new(-1.0, 4.0, -1.0)).length() < eps);
        assert!((aabb.max - Vec3::new(1.0, 6.0, 1.0)).length() < eps);
    }

    #[test]
    fn test_box_aabb() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        let aabb = shape.compute_aabb(&Pose::identity());

        let eps = 1e-5;
        assert!((aabb.min - Vec3::new(-1.0, -2.0, -3.0)).length() < eps);
        assert!((aabb.max - Vec3::new(1.0, 2.0, 3.0)).length() < eps);
    }

    #[test]
    fn test_aabb_overlap() {
        let a = PhysicsAabb {
            min: Vec3::new(-1.0, -1.0, -1.0),
            max: Vec3::new(1.0, 1.0, 1.0),
        };
        let b = PhysicsAabb {
            min: Vec3::new(0.5, 0.5, 0.5),
            max: Vec3::new(2.0, 2.0, 2.0),
        };
        let c = PhysicsAabb {
            min: Vec3::new(2.0, 2.0, 2.0),
            max: Vec3::new(3.0, 3.0, 3.0),
        };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(PhysicsAabb::infinite().overlaps(&c));
    }

    #[test]
    fn test_sphere_support() {
        let shape = ColliderShape::Sphere { radius: 2.0 };
        let support = shape.support(Vec3::Y, &Pose::from_position(Vec3::new(0.0, 5.0, 0.0)));
        assert!((support - Vec3::new(0.0, 7.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_cylinder_support_respects_rotation() {
        let shape = ColliderShape::Cylinder {
            radius: 0.5,
            height: 2.0,
        };
        // Lay the cylinder along X: its cap now faces +X.
        let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2));
        let support = shape.support(Vec3::X, &pose);
        assert!((support.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_shape_validation() {
        assert!(ColliderShape::Sphere { radius: 0.0 }.validate().is_err());
        assert!(ColliderShape::Box {
            half_extents: Vec3::new(1.0, -1.0, 1.0)
        }
        .validate()
        .is_err());
        assert!(ColliderShape::Cylinder {
            radius: 0.3,
            height: 0.2
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_heightfield_rejects_ragged_matrix() {
        assert!(Heightfield::new(vec![vec![0.0, 1.0], vec![0.0]], 1.0).is_err());
        assert!(Heightfield::new(vec![vec![0.0, 1.0]], 1.0).is_err());
        assert!(Heightfield::new(vec![vec![0.0; 2]; 2], 0.0).is_err());
    }

    #[test]
    fn test_heightfield_interpolation() {
        let field = ramp();
        // Grid spans x in [-1, 1]; heights 0, 1, 2 at x = -1, 0, 1.
        let eps = 1e-5;
        assert!((field.height_at(-1.0, 0.0).unwrap() - 0.0).abs() < eps);
        assert!((field.height_at(0.5, 0.3).unwrap() - 1.5).abs() < eps);
        assert!(field.height_at(1.5, 0.0).is_none());

        let n = field.normal_at(0.0, 0.0);
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize();
        assert!((n - expected).length() < 1e-4);
    }

    #[test]
    fn test_box_inertia() {
        let shape = ColliderShape::Box {
            half_extents: Vec3::new(0.5, 0.5, 0.5),
        };
        // Unit cube: I = m/6.
        let i = shape.local_inertia(6.0);
        assert!((i - Vec3::ONE).length() < 1e-5);
    }

    #[test]
    fn test_ray_entry() {
        let aabb = PhysicsAabb {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        };
        let t = aabb.ray_entry(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 10.0);
        assert!((t.unwrap() - 4.0).abs() < 1e-5);
        assert!(aabb.ray_entry(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 3.0).is_none());
        assert!(aabb.ray_entry(Vec3::new(3.0, 5.0, 0.0), Vec3::NEG_Y, 10.0).is_none());
    }
}
