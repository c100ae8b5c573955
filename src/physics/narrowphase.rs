//! Narrowphase collision detection.
//!
//! Finite convex shapes are tested with separating axes projected through
//! their support functions. Spheres get exact closed-form tests. Planes and
//! heightfields are sampled under the convex shape's contact vertices.

use glam::Vec3;

use super::body::Pose;
use super::collider::{ColliderShape, Heightfield};
use super::contact::Contact;

/// Exact sphere-sphere test. The normal points from A to B.
pub fn sphere_sphere(
    radius_a: f32,
    pose_a: &Pose,
    radius_b: f32,
    pose_b: &Pose,
) -> Option<Contact> {
    let offset = pose_b.position - pose_a.position;
    let reach = radius_a + radius_b;
    let distance_sq = offset.length_squared();
    if distance_sq >= reach * reach {
        return None;
    }

    let distance = distance_sq.sqrt();
    let normal = if distance > 1e-6 {
        offset / distance
    } else {
        Vec3::Y
    };
    let depth = reach - distance;
    Some(Contact {
        point: pose_a.position + normal * (radius_a - depth * 0.5),
        normal,
        depth,
    })
}

/// Exact sphere-box test against the closest point of the box. The normal
/// points from the sphere to the box.
pub fn sphere_box(
    radius: f32,
    sphere: &Pose,
    half_extents: Vec3,
    cuboid: &Pose,
) -> Option<Contact> {
    let local = cuboid.inverse_transform_point(sphere.position);
    let closest = local.clamp(-half_extents, half_extents);

    if closest != local {
        let outside = local - closest;
        let distance = outside.length();
        if distance >= radius {
            return None;
        }
        return Some(Contact {
            point: cuboid.transform_point(closest),
            normal: -cuboid.transform_vector(outside / distance),
            depth: radius - distance,
        });
    }

    // Center inside the box: push out through the nearest face.
    let room = half_extents - local.abs();
    let axis = if room.x <= room.y && room.x <= room.z {
        0
    } else if room.y <= room.z {
        1
    } else {
        2
    };
    let mut face = Vec3::ZERO;
    face[axis] = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    let mut on_face = local;
    on_face[axis] = half_extents[axis] * face[axis];
    Some(Contact {
        point: cuboid.transform_point(on_face),
        normal: -cuboid.transform_vector(face),
        depth: radius + room[axis],
    })
}

/// Directions along which a shape has flat features or straight edges.
fn feature_axes(shape: &ColliderShape, pose: &Pose) -> Vec<Vec3> {
    match shape {
        ColliderShape::Box { .. } => vec![
            pose.transform_vector(Vec3::X),
            pose.transform_vector(Vec3::Y),
            pose.transform_vector(Vec3::Z),
        ],
        ColliderShape::Cylinder { .. } => vec![pose.transform_vector(Vec3::Y)],
        _ => Vec::new(),
    }
}

/// Candidate separating axes for a pair of convex shapes: face normals and
/// edge cross products of both, the center offset, and the offset seen
/// radially from each cylinder's axis.
pub fn candidate_axes(
    shape_a: &ColliderShape,
    pose_a: &Pose,
    shape_b: &ColliderShape,
    pose_b: &Pose,
) -> Vec<Vec3> {
    let features_a = feature_axes(shape_a, pose_a);
    let features_b = feature_axes(shape_b, pose_b);
    let offset = pose_b.position - pose_a.position;

    let mut axes: Vec<Vec3> = features_a.iter().chain(&features_b).copied().collect();
    for a in &features_a {
        axes.extend(features_b.iter().map(|b| a.cross(*b)));
    }
    axes.push(offset);
    for (shape, pose) in [(shape_a, pose_a), (shape_b, pose_b)] {
        if let ColliderShape::Cylinder { .. } = shape {
            let axis = pose.transform_vector(Vec3::Y);
            axes.push(offset - axis * axis.dot(offset));
        }
    }

    axes.into_iter().filter_map(Vec3::try_normalize).collect()
}

/// Overlap of the two shapes' projections onto `axis`, which must point from
/// A towards B. Negative when the axis separates them.
fn projected_overlap(
    shape_a: &ColliderShape,
    pose_a: &Pose,
    shape_b: &ColliderShape,
    pose_b: &Pose,
    axis: Vec3,
) -> f32 {
    let reach_a = shape_a.support(axis, pose_a).dot(axis);
    let reach_b = shape_b.support(-axis, pose_b).dot(axis);
    reach_a - reach_b
}

/// Separating-axis test for any two finite convex shapes.
///
/// Exact for box pairs. For curved shapes the result is bounded by the
/// candidate axes, which cover face, edge, side and center-line contacts.
pub fn convex_convex(
    shape_a: &ColliderShape,
    pose_a: &Pose,
    shape_b: &ColliderShape,
    pose_b: &Pose,
) -> Option<Contact> {
    let offset = pose_b.position - pose_a.position;
    let mut best: Option<(Vec3, f32)> = None;

    for axis in candidate_axes(shape_a, pose_a, shape_b, pose_b) {
        let axis = if axis.dot(offset) < 0.0 { -axis } else { axis };
        let depth = projected_overlap(shape_a, pose_a, shape_b, pose_b, axis);
        if depth <= 0.0 {
            return None;
        }
        if best.map_or(true, |(_, min)| depth < min) {
            best = Some((axis, depth));
        }
    }

    let (normal, depth) = best?;
    // Deepest point of B, pulled back to the middle of the overlap.
    let deepest_b = shape_b.support(-normal, pose_b);
    Some(Contact {
        point: deepest_b + normal * (depth * 0.5),
        normal,
        depth,
    })
}

/// Contacts of a convex shape resting on an infinite plane.
///
/// Normals point out of the plane, towards the convex shape.
pub fn convex_plane(shape: &ColliderShape, pose: &Pose, plane_pose: &Pose) -> Vec<Contact> {
    let normal = plane_pose.transform_vector(Vec3::Y);
    let height = |p: Vec3| normal.dot(p - plane_pose.position);

    if let ColliderShape::Sphere { radius } = shape {
        let depth = radius - height(pose.position);
        if depth <= 0.0 {
            return Vec::new();
        }
        return vec![Contact {
            normal,
            depth,
            point: pose.position - normal * (radius - depth * 0.5),
        }];
    }

    shape
        .contact_vertices(pose)
        .into_iter()
        .filter_map(|vertex| {
            let depth = -height(vertex);
            (depth > 0.0).then(|| Contact {
                normal,
                depth,
                point: vertex + normal * (depth * 0.5),
            })
        })
        .collect()
}

/// Contacts of a convex shape against a heightfield surface.
///
/// Each vertex below the surface gets its own contact with the local surface
/// normal. Normals point out of the surface, towards the convex shape.
pub fn convex_heightfield(
    shape: &ColliderShape,
    pose: &Pose,
    field: &Heightfield,
    field_pose: &Pose,
) -> Vec<Contact> {
    let sample = |world: Vec3, radius: f32| -> Option<Contact> {
        let local = field_pose.inverse_transform_point(world);
        let surface = field.height_at(local.x, local.z)?;
        let local_normal = field.normal_at(local.x, local.z);
        let depth = (surface - local.y) * local_normal.y + radius;
        if depth <= 0.0 {
            return None;
        }
        let normal = field_pose.transform_vector(local_normal);
        Some(Contact {
            normal,
            depth,
            point: world - normal * (radius - depth * 0.5),
        })
    };

    if let ColliderShape::Sphere { radius } = shape {
        return sample(pose.position, *radius).into_iter().collect();
    }

    shape
        .contact_vertices(pose)
        .into_iter()
        .filter_map(|vertex| sample(vertex, 0.0))
        .collect()
}

/// Detect collision between two shapes, dispatching to specialized tests where possible.
///
/// Every returned normal points from shape A to shape B.
pub fn detect_collision(
    shape_a: &ColliderShape,
    pose_a: &Pose,
    shape_b: &ColliderShape,
    pose_b: &Pose,
) -> Vec<Contact> {
    use ColliderShape as Shape;

    match (shape_a, shape_b) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(*ra, pose_a, *rb, pose_b).into_iter().collect()
        }
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
            sphere_box(*radius, pose_a, *half_extents, pose_b).into_iter().collect()
        }
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            sphere_box(*radius, pose_b, *half_extents, pose_a)
                .map(Contact::flipped)
                .into_iter()
                .collect()
        }
        (Shape::Plane, other) if other.is_convex() => convex_plane(other, pose_b, pose_a),
        (other, Shape::Plane) if other.is_convex() => convex_plane(other, pose_a, pose_b)
            .into_iter()
            .map(Contact::flipped)
            .collect(),
        (Shape::Heightfield(field), other) if other.is_convex() => {
            convex_heightfield(other, pose_b, field, pose_a)
        }
        (other, Shape::Heightfield(field)) if other.is_convex() => {
            convex_heightfield(other, pose_a, field, pose_b)
                .into_iter()
                .map(Contact::flipped)
                .collect()
        }
        (a, b) if a.is_convex() && b.is_convex() => {
            convex_convex(a, pose_a, b, pose_b).into_iter().collect()
        }
        // Surfaces never collide with each other.
        _ => Vec::new(),
    }
}
