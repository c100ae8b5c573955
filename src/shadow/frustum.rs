//! View frustum corners and their cascade slices.

use glam::{Mat4, Vec3};

use crate::camera::Projection;

/// Corner order of each quad: top-right, bottom-right, bottom-left, top-left.
const NDC_CORNERS: [(f32, f32); 4] = [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0)];

/// Eight corners of a frustum: the near quad and the far quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsmFrustum {
    pub near: [Vec3; 4],
    pub far: [Vec3; 4],
}

impl CsmFrustum {
    /// View-space corners of `projection`, with the far quad pulled in to at
    /// most `max_far` along the view axis.
    pub fn from_projection(projection: &Projection, max_far: f32) -> Self {
        let inverse = projection.matrix().inverse();
        let orthographic = matches!(projection, Projection::Orthographic { .. });

        // Depth range is [0, 1] in normalized device coordinates.
        let near = NDC_CORNERS.map(|(x, y)| inverse.project_point3(Vec3::new(x, y, 0.0)));
        let far = NDC_CORNERS.map(|(x, y)| {
            let mut corner = inverse.project_point3(Vec3::new(x, y, 1.0));
            let scale = (max_far / corner.z.abs()).min(1.0);
            if orthographic {
                corner.z *= scale;
            } else {
                corner *= scale;
            }
            corner
        });
        Self { near, far }
    }

    /// Slice the frustum at the given depth fractions. Slice `i` spans
    /// `breaks[i - 1]..breaks[i]`, the first starting at the near quad and the
    /// last ending at the far quad.
    pub fn split(&self, breaks: &[f32]) -> Vec<CsmFrustum> {
        let lerp =
            |t: f32| -> [Vec3; 4] { std::array::from_fn(|j| self.near[j].lerp(self.far[j], t)) };
        let last = breaks.len().saturating_sub(1);
        breaks
            .iter()
            .enumerate()
            .map(|(i, &split)| CsmFrustum {
                near: if i == 0 { self.near } else { lerp(breaks[i - 1]) },
                far: if i == last { self.far } else { lerp(split) },
            })
            .collect()
    }

    /// The same corners transformed by `matrix`.
    pub fn to_space(&self, matrix: &Mat4) -> CsmFrustum {
        CsmFrustum {
            near: self.near.map(|p| matrix.transform_point3(p)),
            far: self.far.map(|p| matrix.transform_point3(p)),
        }
    }

    pub fn corners(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.near.iter().chain(self.far.iter()).copied()
    }
}
