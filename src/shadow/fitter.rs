//! Fits one orthographic shadow camera around each cascade slice.

use glam::{Mat4, Quat, Vec3};

use super::frustum::CsmFrustum;

/// Snap `value` to the nearest multiple of `step`. Idempotent.
pub fn snap(value: f32, step: f32) -> f32 {
    if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    }
}

/// Orthographic extents of a shadow camera, in light space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShadowBounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl ShadowBounds {
    /// Square bounds of side `size` centered on the light axis.
    pub fn square(size: f32) -> Self {
        let half = size * 0.5;
        Self {
            left: -half,
            right: half,
            top: half,
            bottom: -half,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
}

/// A directional light rendering one cascade's shadow map.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowLight {
    pub position: Vec3,
    /// Unit direction the light shines in.
    pub direction: Vec3,
    /// Up vector of the light basis. Never parallel to `direction`.
    pub up: Vec3,
    pub bounds: ShadowBounds,
    pub near: f32,
    pub far: f32,
    pub bias: f32,
    pub map_size: u32,
    pub intensity: f32,
}

impl ShadowLight {
    /// The rotation part depends on `direction` and `up` only, so it stays
    /// the same while the light follows the camera.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::orthographic_rh(
            self.bounds.left,
            self.bounds.right,
            self.bounds.bottom,
            self.bounds.top,
            self.near,
            self.far,
        )
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// One shadow-map texel in light-space units: `(width, height)`.
    pub fn texel_size(&self) -> (f32, f32) {
        let size = self.map_size.max(1) as f32;
        (self.bounds.width() / size, self.bounds.height() / size)
    }
}

/// One cascade: its depth range as fractions of the shadowed distance and
/// the light that covers it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub split_near: f32,
    pub split_far: f32,
    pub light: ShadowLight,
}

/// Positions cascade lights in a fixed light-space basis.
///
/// The basis only depends on the light direction, so the texel grid the
/// cascade centers are snapped to does not move with the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumFitter {
    direction: Vec3,
    up: Vec3,
    /// World to light space, rotation only.
    light_from_world: Mat4,
    world_from_light: Mat4,
}

impl FrustumFitter {
    pub fn new(direction: Vec3) -> Self {
        let direction = direction.normalize_or(Vec3::NEG_Y);
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let light_from_world = Mat4::look_to_rh(Vec3::ZERO, direction, up);
        Self {
            direction,
            up,
            light_from_world,
            world_from_light: light_from_world.transpose(),
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Up vector for light view matrices.
    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn light_rotation(&self) -> Quat {
        Quat::from_mat4(&self.world_from_light)
    }

    /// Side of the square shadow camera covering `slice` (view space).
    ///
    /// The larger of the far-quad diagonal and the full diagonal bounds every
    /// pair of corners. With fading, distant slices get a margin growing with
    /// the square of their depth.
    pub fn bounds_size(slice: &CsmFrustum, fade: Option<FadeRange>) -> f32 {
        let point1 = slice.far[0];
        let point2 = if point1.distance(slice.far[2]) > point1.distance(slice.near[2]) {
            slice.far[2]
        } else {
            slice.near[2]
        };
        let mut size = point1.distance(point2);

        if let Some(FadeRange { near, far }) = fade {
            let linear_depth = slice.far[0].z / (far - near);
            size += 0.25 * linear_depth * linear_depth * (far - near);
        }
        size
    }

    /// Move `light` so its shadow camera covers `slice`.
    ///
    /// `camera_world` is the camera's camera-to-world matrix. The light-space
    /// center is snapped to whole texels and pushed `margin` towards the light
    /// past the nearest corner.
    pub fn fit(
        &self,
        light: &mut ShadowLight,
        slice: &CsmFrustum,
        camera_world: &Mat4,
        margin: f32,
    ) {
        let light_from_camera = self.light_from_world * *camera_world;
        let light_space = slice.to_space(&light_from_camera);

        let (min, max) = light_space
            .corners()
            .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(min, max), p| {
                (min.min(p), max.max(p))
            });

        let (texel_width, texel_height) = light.texel_size();
        let mut center = (min + max) * 0.5;
        center.z = max.z + margin;
        center.x = snap(center.x, texel_width);
        center.y = snap(center.y, texel_height);

        light.position = self.world_from_light.transform_point3(center);
        light.direction = self.direction;
        light.up = self.up;
    }
}

/// Depth range used for the fade margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRange {
    pub near: f32,
    pub far: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, Projection};

    fn light(size: f32) -> ShadowLight {
        ShadowLight {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            up: Vec3::Z,
            bounds: ShadowBounds::square(size),
            near: 1.0,
            far: 2000.0,
            bias: 0.000001,
            map_size: 2048,
            intensity: 1.0,
        }
    }

    #[test]
    fn test_snap_idempotent() {
        for step in [0.01, 0.137, 1.0, 25.0] {
            for value in [-123.456, -0.5, 0.0, 0.004, 7.77, 1e4] {
                let once = snap(value, step);
                assert_eq!(snap(once, step), once, "value {value}, step {step}");
                assert!((once - value).abs() <= step * 0.5 + 1e-3);
            }
        }
        assert_eq!(snap(3.3, 0.0), 3.3);
    }

    #[test]
    fn test_light_basis_handles_vertical_direction() {
        let fitter = FrustumFitter::new(Vec3::NEG_Y);
        assert_eq!(fitter.up(), Vec3::Z);
        let view = fitter.light_from_world;
        // Light looks down its -Z axis.
        assert!((view.transform_vector3(Vec3::NEG_Y) - Vec3::NEG_Z).length() < 1e-5);
        assert!(view.is_finite());

        let fitter = FrustumFitter::new(Vec3::new(1.0, -1.0, 1.0));
        assert_eq!(fitter.up(), Vec3::Y);
        assert!((fitter.direction().length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounds_size_grows_with_fade() {
        let projection = Projection::perspective(60.0, 1.5, 0.1, 100.0);
        let frustum = CsmFrustum::from_projection(&projection, 1000.0);
        let slices = frustum.split(&[0.1, 0.4, 1.0]);
        let plain: Vec<f32> = slices
            .iter()
            .map(|s| FrustumFitter::bounds_size(s, None))
            .collect();
        let faded: Vec<f32> = slices
            .iter()
            .map(|s| {
                FrustumFitter::bounds_size(
                    s,
                    Some(FadeRange {
                        near: 0.1,
                        far: 1000.0,
                    }),
                )
            })
            .collect();
        for i in 0..3 {
            assert!(faded[i] > plain[i]);
        }
        assert!(plain[0] < plain[1] && plain[1] < plain[2]);
    }

    #[test]
    fn test_fade_margin_grows_with_squared_depth() {
        let slice = CsmFrustum {
            near: [
                Vec3::new(0.1, 0.1, -5.0),
                Vec3::new(0.1, -0.1, -5.0),
                Vec3::new(-0.1, -0.1, -5.0),
                Vec3::new(-0.1, 0.1, -5.0),
            ],
            far: [
                Vec3::new(1.0, 1.0, -50.0),
                Vec3::new(1.0, -1.0, -50.0),
                Vec3::new(-1.0, -1.0, -50.0),
                Vec3::new(-1.0, 1.0, -50.0),
            ],
        };
        // The full diagonal is longer than the far quad's.
        let plain = FrustumFitter::bounds_size(&slice, None);
        let diagonal = Vec3::new(1.1, 1.1, -45.0).length();
        assert!((plain - diagonal).abs() < 1e-4);

        let fade = FadeRange {
            near: 0.1,
            far: 1000.0,
        };
        let faded = FrustumFitter::bounds_size(&slice, Some(fade));
        // 0.25 * (50 / 999.9)^2 * 999.9
        let margin = 0.25 * 50.0 * 50.0 / 999.9;
        assert!((faded - plain - margin).abs() < 1e-4, "margin = {}", faded - plain);
    }

    #[test]
    fn test_fit_covers_slice() {
        let camera = Camera::new_perspective(
            Vec3::new(12.0, 3.0, -7.0),
            Vec3::new(20.0, 0.0, -30.0),
            Vec3::Y,
            60.0,
            16.0 / 9.0,
            0.1,
            100.0,
        );
        let fitter = FrustumFitter::new(Vec3::new(1.0, -1.0, 1.0));
        let frustum = CsmFrustum::from_projection(&camera.projection, 1000.0);
        let camera_world = camera.world_matrix();

        for slice in frustum.split(&[0.2, 0.5, 1.0]) {
            let mut light = light(FrustumFitter::bounds_size(&slice, None));
            fitter.fit(&mut light, &slice, &camera_world, 200.0);

            let clip = light.view_projection_matrix();
            let tolerance = 2.0 / light.map_size as f32 + 1e-4;
            for corner in slice.to_space(&camera_world).corners() {
                let ndc = clip.project_point3(corner);
                assert!(ndc.x.abs() <= 1.0 + tolerance, "ndc = {ndc}");
                assert!(ndc.y.abs() <= 1.0 + tolerance, "ndc = {ndc}");
                assert!((0.0..=1.0).contains(&ndc.z), "ndc = {ndc}");
            }
        }
    }

    #[test]
    fn test_fit_snaps_to_texels() {
        let mut camera = Camera::default();
        let fitter = FrustumFitter::new(Vec3::new(1.0, -1.0, 1.0));
        let frustum = CsmFrustum::from_projection(&camera.projection, 1000.0);
        let slice = frustum.split(&[1.0])[0];
        let mut light = light(FrustumFitter::bounds_size(&slice, None));
        let (texel, _) = light.texel_size();

        for offset in [0.0, 0.37, 13.9] {
            camera.position.x += offset;
            camera.target.x += offset;
            fitter.fit(&mut light, &slice, &camera.world_matrix(), 200.0);

            // The view rotation is the fixed light basis, wherever the light moved.
            let view = light.view_matrix();
            assert_eq!(view.x_axis.truncate(), fitter.light_from_world.x_axis.truncate());
            assert_eq!(view.y_axis.truncate(), fitter.light_from_world.y_axis.truncate());
            assert_eq!(view.z_axis.truncate(), fitter.light_from_world.z_axis.truncate());

            // The light-space translation sits on the texel grid.
            let steps = view.w_axis.x / texel;
            assert!((steps - steps.round()).abs() < 1e-2, "steps = {steps}");
            let steps = view.w_axis.y / texel;
            assert!((steps - steps.round()).abs() < 1e-2, "steps = {steps}");
            assert_eq!(light.direction, fitter.direction());
        }
    }
}
