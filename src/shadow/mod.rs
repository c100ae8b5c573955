//! Cascaded shadow maps for a directional light.
//!
//! The camera's depth range is split into cascades ([`split`]); each cascade
//! slice of the view frustum ([`frustum`]) is covered by its own orthographic
//! shadow light ([`fitter`]); materials receive the split ranges as uniforms
//! ([`material`]).

pub mod fitter;
pub mod frustum;
pub mod material;
pub mod split;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, Projection};
use crate::error::ConfigError;

pub use self::fitter::{snap, Cascade, FadeRange, FrustumFitter, ShadowBounds, ShadowLight};
pub use self::frustum::CsmFrustum;
pub use self::material::{
    CsmMaterials, CsmUniformBlock, CsmUniforms, MaterialId, ShaderVariant, MAX_CASCADES,
};
pub use self::split::{CascadeSplitter, CustomSplitFn, SplitMode};

/// Cascaded shadow map configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsmConfig {
    /// Number of cascades. Default: 3.
    pub cascades: usize,
    /// Shadows are not rendered past this distance. Default: 100000.
    pub max_far: f32,
    pub mode: SplitMode,
    /// Blend factor of the practical split mode. Default: 0.5.
    pub practical_lambda: f32,
    /// Shadow map resolution per cascade. Default: 2048.
    pub shadow_map_size: u32,
    /// Default: 0.000001.
    pub shadow_bias: f32,
    /// Direction the light travels in. Default: normalized (1, -1, 1).
    pub light_direction: Vec3,
    pub light_intensity: f32,
    /// Shadow camera depth range. Default: 1 to 2000.
    pub light_near: f32,
    pub light_far: f32,
    /// Distance the lights are pulled back past the slice. Default: 200.
    pub light_margin: f32,
    /// Blend between cascades. Default: true.
    pub fade: bool,
}

impl Default for CsmConfig {
    fn default() -> Self {
        Self {
            cascades: 3,
            max_far: 100000.0,
            mode: SplitMode::Practical,
            practical_lambda: 0.5,
            shadow_map_size: 2048,
            shadow_bias: 0.000001,
            light_direction: Vec3::new(1.0, -1.0, 1.0).normalize(),
            light_intensity: 1.0,
            light_near: 1.0,
            light_far: 2000.0,
            light_margin: 200.0,
            fade: true,
        }
    }
}

impl CsmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cascades == 0 || self.cascades > MAX_CASCADES {
            return Err(ConfigError::InvalidCascadeCount {
                count: self.cascades,
                max: MAX_CASCADES,
            });
        }
        if self.shadow_map_size == 0 {
            return Err(ConfigError::invalid("csm.shadow_map_size", "must be positive"));
        }
        if !(self.max_far > 0.0) {
            return Err(ConfigError::invalid("csm.max_far", "must be positive"));
        }
        if (self.light_direction.length() - 1.0).abs() > 1e-3 {
            return Err(ConfigError::invalid(
                "csm.light_direction",
                format!("must be a unit vector, got {}", self.light_direction),
            ));
        }
        if !(self.light_near > 0.0 && self.light_far > self.light_near) {
            return Err(ConfigError::InvalidDepthRange {
                near: self.light_near,
                far: self.light_far,
            });
        }
        if !(0.0..=1.0).contains(&self.practical_lambda) {
            return Err(ConfigError::invalid(
                "csm.practical_lambda",
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Cascade lights and material uniforms following one camera.
#[derive(Debug)]
pub struct CascadedShadowMap {
    config: CsmConfig,
    splitter: CascadeSplitter,
    fitter: FrustumFitter,
    breaks: Vec<f32>,
    /// View-space slices of the camera frustum, one per cascade.
    frustums: Vec<CsmFrustum>,
    cascades: Vec<Cascade>,
    /// Projection the slices were built for.
    projection: Option<Projection>,
    uniforms: CsmUniforms,
    materials: CsmMaterials,
}

impl CascadedShadowMap {
    /// Set up cascades with a built-in split mode.
    pub fn new(config: CsmConfig, camera: &Camera) -> Result<Self, ConfigError> {
        Self::build(config, None, camera)
    }

    /// Set up cascades with a user split scheme.
    pub fn with_custom_splits(
        mut config: CsmConfig,
        custom: CustomSplitFn,
        camera: &Camera,
    ) -> Result<Self, ConfigError> {
        config.mode = SplitMode::Custom;
        Self::build(config, Some(custom), camera)
    }

    fn build(
        config: CsmConfig,
        custom: Option<CustomSplitFn>,
        camera: &Camera,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let splitter = CascadeSplitter::new(config.mode, config.practical_lambda, custom)?;

        let fitter = FrustumFitter::new(config.light_direction);
        let light = ShadowLight {
            position: Vec3::ZERO,
            direction: fitter.direction(),
            up: fitter.up(),
            bounds: ShadowBounds::default(),
            near: config.light_near,
            far: config.light_far,
            bias: config.shadow_bias,
            map_size: config.shadow_map_size,
            intensity: config.light_intensity,
        };
        let cascades = (0..config.cascades)
            .map(|_| Cascade {
                split_near: 0.0,
                split_far: 0.0,
                light: light.clone(),
            })
            .collect();

        let mut csm = Self {
            fitter,
            config,
            splitter,
            breaks: Vec::new(),
            frustums: Vec::new(),
            cascades,
            projection: None,
            uniforms: CsmUniforms::default(),
            materials: CsmMaterials::new(),
        };
        csm.update_frustums(camera)?;
        tracing::info!(
            "Cascaded shadow map created: {} cascades, {:?} splits, {}px maps",
            csm.config.cascades,
            csm.config.mode,
            csm.config.shadow_map_size
        );
        Ok(csm)
    }

    pub fn config(&self) -> &CsmConfig {
        &self.config
    }

    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    /// Current split fractions, one per cascade.
    pub fn breaks(&self) -> &[f32] {
        &self.breaks
    }

    pub fn uniforms(&self) -> &CsmUniforms {
        &self.uniforms
    }

    pub fn fitter(&self) -> &FrustumFitter {
        &self.fitter
    }

    pub fn materials(&self) -> &CsmMaterials {
        &self.materials
    }

    fn shadow_far(&self, camera: &Camera) -> f32 {
        camera.far().min(self.config.max_far)
    }

    /// Recompute splits, slices, light bounds and uniforms for `camera`.
    pub fn update_frustums(&mut self, camera: &Camera) -> Result<(), ConfigError> {
        let near = camera.near();
        let far = self.shadow_far(camera);
        self.breaks = self.splitter.compute(self.config.cascades, near, far)?;

        let main = CsmFrustum::from_projection(&camera.projection, self.config.max_far);
        self.frustums = main.split(&self.breaks);

        let fade = self.config.fade.then(|| FadeRange {
            near,
            far: camera.far().max(self.config.max_far),
        });
        let mut previous = 0.0;
        for ((cascade, slice), &split) in self
            .cascades
            .iter_mut()
            .zip(&self.frustums)
            .zip(&self.breaks)
        {
            cascade.split_near = previous;
            cascade.split_far = split;
            cascade.light.bounds = ShadowBounds::square(FrustumFitter::bounds_size(slice, fade));
            previous = split;
        }

        self.uniforms = CsmUniforms::from_splits(&self.breaks, near, far);
        self.materials.update(&self.uniforms, self.config.fade);
        self.projection = Some(camera.projection);
        Ok(())
    }

    /// Per-frame update: rebuild the slices if the camera projection changed,
    /// then move every light to its slice.
    pub fn update(&mut self, camera: &Camera) -> Result<(), ConfigError> {
        if self.projection != Some(camera.projection) {
            self.update_frustums(camera)?;
        }
        let camera_world = camera.world_matrix();
        for (cascade, slice) in self.cascades.iter_mut().zip(&self.frustums) {
            self.fitter
                .fit(&mut cascade.light, slice, &camera_world, self.config.light_margin);
        }
        Ok(())
    }

    /// Change the split mode. Slices are rebuilt on the next update.
    pub fn set_split_mode(&mut self, mode: SplitMode) -> Result<(), ConfigError> {
        self.splitter.set_mode(mode)?;
        self.config.mode = mode;
        self.projection = None;
        Ok(())
    }

    pub fn set_custom_splits(&mut self, custom: CustomSplitFn) {
        self.splitter.set_custom(custom);
        self.config.mode = SplitMode::Custom;
        self.projection = None;
    }

    /// Toggle cascade blending. Registered materials are flagged for rebuild.
    pub fn set_fade(&mut self, fade: bool) {
        if self.config.fade != fade {
            self.config.fade = fade;
            self.projection = None;
        }
    }

    pub fn setup_material(&mut self, material: MaterialId) {
        self.materials
            .setup_material(material, self.config.cascades, self.config.fade);
    }

    /// Shader variant for a material being built. `None` if it was never set up.
    pub fn compile_material(&mut self, material: MaterialId) -> Option<ShaderVariant> {
        self.materials
            .compile_material(material, self.uniforms.clone())
    }

    pub fn needs_update(&self, material: MaterialId) -> bool {
        self.materials.needs_update(material)
    }

    pub fn remove_material(&mut self, material: MaterialId) -> bool {
        self.materials.remove_material(material)
    }

    /// Release all material registrations. Returns the affected materials.
    pub fn dispose(&mut self) -> Vec<MaterialId> {
        let released = self.materials.dispose();
        tracing::info!(
            "Cascaded shadow map disposed, {} materials released",
            released.len()
        );
        released
    }
}
