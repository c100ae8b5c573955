//! Ray casts against collider shapes.

use glam::Vec3;

use super::body::Pose;
use super::collider::{ColliderShape, Heightfield};

/// Bisection iterations used to refine a heightfield crossing.
const HEIGHTFIELD_REFINE_STEPS: usize = 16;

/// A finite ray in world space.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    /// Maximum distance along `direction`.
    pub max_toi: f32,
}

impl Ray {
    /// Build a ray from `from` to `to`.
    pub fn between(from: Vec3, to: Vec3) -> Self {
        let delta = to - from;
        let length = delta.length();
        Self {
            origin: from,
            direction: delta.normalize_or_zero(),
            max_toi: length,
        }
    }

    #[inline]
    pub fn at(&self, toi: f32) -> Vec3 {
        self.origin + self.direction * toi
    }
}

/// Closest hit of a ray against the bodies of a world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit<H> {
    pub body: H,
    /// Distance from the ray origin.
    pub toi: f32,
    pub point: Vec3,
    /// World-space surface normal, facing the ray origin.
    pub normal: Vec3,
}

/// Intersect a world-space ray with a posed shape.
///
/// Returns the distance along the ray and the world-space normal. Rays that
/// start inside a solid report no hit.
pub fn cast_shape(shape: &ColliderShape, pose: &Pose, ray: &Ray) -> Option<(f32, Vec3)> {
    let origin = pose.inverse_transform_point(ray.origin);
    let direction = pose.inverse_transform_vector(ray.direction);

    let (toi, local_normal) = match shape {
        ColliderShape::Sphere { radius } => cast_sphere(*radius, origin, direction, ray.max_toi)?,
        ColliderShape::Box { half_extents } => {
            cast_box(*half_extents, origin, direction, ray.max_toi)?
        }
        ColliderShape::Cylinder { radius, height } => {
            cast_cylinder(*radius, height * 0.5, origin, direction, ray.max_toi)?
        }
        ColliderShape::Plane => cast_plane(origin, direction, ray.max_toi)?,
        ColliderShape::Heightfield(field) => {
            cast_heightfield(field, origin, direction, ray.max_toi)?
        }
    };

    Some((toi, pose.transform_vector(local_normal).normalize_or_zero()))
}

fn cast_sphere(radius: f32, origin: Vec3, direction: Vec3, max_toi: f32) -> Option<(f32, Vec3)> {
    let b = origin.dot(direction);
    let c = origin.length_squared() - radius * radius;
    if c < 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    if !(0.0..=max_toi).contains(&t) {
        return None;
    }
    Some((t, (origin + direction * t) / radius))
}

fn cast_box(half: Vec3, origin: Vec3, direction: Vec3, max_toi: f32) -> Option<(f32, Vec3)> {
    let mut t_min = f32::MIN;
    let mut t_max = f32::MAX;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < 1e-12 {
            if o < -half[axis] || o > half[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t0 = (-half[axis] - o) * inv;
        let mut t1 = (half[axis] - o) * inv;
        // Entering through the face whose outward normal opposes the ray.
        let mut sign = -1.0;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > t_min {
            t_min = t0;
            normal = Vec3::ZERO;
            normal[axis] = sign;
        }
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }

    if t_min < 0.0 || t_min > max_toi {
        return None;
    }
    Some((t_min, normal))
}

fn cast_cylinder(
    radius: f32,
    half_height: f32,
    origin: Vec3,
    direction: Vec3,
    max_toi: f32,
) -> Option<(f32, Vec3)> {
    let mut best: Option<(f32, Vec3)> = None;
    let mut consider = |t: f32, n: Vec3| {
        if (0.0..=max_toi).contains(&t) && best.map_or(true, |(bt, _)| t < bt) {
            best = Some((t, n));
        }
    };

    // Curved side.
    let a = direction.x * direction.x + direction.z * direction.z;
    if a > 1e-12 {
        let b = origin.x * direction.x + origin.z * direction.z;
        let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
        let discriminant = b * b - a * c;
        if discriminant >= 0.0 {
            let t = (-b - discriminant.sqrt()) / a;
            let p = origin + direction * t;
            if p.y.abs() <= half_height {
                consider(t, Vec3::new(p.x, 0.0, p.z) / radius);
            }
        }
    }

    // Caps.
    if direction.y.abs() > 1e-12 {
        for (cap_y, normal) in [(half_height, Vec3::Y), (-half_height, Vec3::NEG_Y)] {
            if (origin.y - cap_y) * normal.y < 0.0 {
                continue;
            }
            let t = (cap_y - origin.y) / direction.y;
            let p = origin + direction * t;
            if p.x * p.x + p.z * p.z <= radius * radius {
                consider(t, normal);
            }
        }
    }

    best
}

/// The plane only blocks rays arriving from its front side.
fn cast_plane(origin: Vec3, direction: Vec3, max_toi: f32) -> Option<(f32, Vec3)> {
    if origin.y < 0.0 || direction.y >= 0.0 {
        return None;
    }
    let t = -origin.y / direction.y;
    (t <= max_toi).then_some((t, Vec3::Y))
}

/// March along the ray and bisect the first crossing below the surface.
fn cast_heightfield(
    field: &Heightfield,
    origin: Vec3,
    direction: Vec3,
    max_toi: f32,
) -> Option<(f32, Vec3)> {
    let step = field.element_size() * 0.25;
    let above = |t: f32| {
        let p = origin + direction * t;
        field.height_at(p.x, p.z).map(|h| p.y - h)
    };

    let mut prev_t = 0.0;
    let mut prev_gap = above(0.0);
    if prev_gap.is_some_and(|gap| gap < 0.0) {
        return None;
    }

    let mut t = 0.0;
    while t < max_toi {
        t = (t + step).min(max_toi);
        let gap = above(t);
        if let (Some(g0), Some(g1)) = (prev_gap, gap) {
            if g0 >= 0.0 && g1 <= 0.0 {
                let (mut lo, mut hi) = (prev_t, t);
                for _ in 0..HEIGHTFIELD_REFINE_STEPS {
                    let mid = 0.5 * (lo + hi);
                    match above(mid) {
                        Some(g) if g > 0.0 => lo = mid,
                        _ => hi = mid,
                    }
                }
                let hit = origin + direction * hi;
                return Some((hi, field.normal_at(hit.x, hit.z)));
            }
        }
        prev_t = t;
        prev_gap = gap;
    }
    None
}
