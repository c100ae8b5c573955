//! Per-material shader integration for cascaded shadows.
//!
//! A material is registered with [`CsmMaterials::setup_material`] and gets
//! its uniforms when its shader is built ([`CsmMaterials::compile_material`]).
//! Until then the registration is deferred: uniform refreshes skip it, but
//! define changes still mark it for rebuild.

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;

/// Largest cascade count the uniform block can carry.
pub const MAX_CASCADES: usize = 8;

pub const DEFINE_USE_CSM: &str = "USE_CSM";
pub const DEFINE_CASCADES: &str = "CSM_CASCADES";
pub const DEFINE_FADE: &str = "CSM_FADE";

/// Identity of a material in the host renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Shadow uniforms of one material.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CsmUniforms {
    /// `(near, far)` split fractions per cascade.
    pub cascades: Vec<Vec2>,
    pub camera_near: f32,
    /// Shadowed distance: the smaller of the camera far plane and `max_far`.
    pub shadow_far: f32,
}

impl CsmUniforms {
    /// Pair each split with the previous one (or zero) as `(near, far)`.
    pub fn from_splits(splits: &[f32], camera_near: f32, shadow_far: f32) -> Self {
        let cascades = splits
            .iter()
            .scan(0.0, |previous, &split| {
                let range = Vec2::new(*previous, split);
                *previous = split;
                Some(range)
            })
            .collect();
        Self {
            cascades,
            camera_near,
            shadow_far,
        }
    }

    /// GPU layout of these uniforms. Cascades past [`MAX_CASCADES`] are dropped.
    pub fn to_block(&self) -> CsmUniformBlock {
        let mut block = CsmUniformBlock {
            cascades: [[0.0; 4]; MAX_CASCADES],
            camera_near: self.camera_near,
            shadow_far: self.shadow_far,
            cascade_count: self.cascades.len().min(MAX_CASCADES) as u32,
            _padding: 0,
        };
        for (slot, range) in block.cascades.iter_mut().zip(&self.cascades) {
            slot[0] = range.x;
            slot[1] = range.y;
        }
        block
    }
}

/// Shadow uniform data for GPU. Each cascade range sits in its own 16-byte
/// slot (`xy` used).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CsmUniformBlock {
    pub cascades: [[f32; 4]; MAX_CASCADES],
    pub camera_near: f32,
    pub shadow_far: f32,
    pub cascade_count: u32,
    pub _padding: u32,
}

/// Defines and uniforms a material's shader is built with.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderVariant {
    pub defines: BTreeMap<String, String>,
    pub uniforms: CsmUniforms,
}

impl ShaderVariant {
    pub fn has_define(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }
}

#[derive(Debug, Clone)]
struct MaterialRecord {
    defines: BTreeMap<String, String>,
    /// `None` until the shader is built.
    uniforms: Option<CsmUniforms>,
    needs_update: bool,
}

/// Registry of materials receiving cascaded shadows.
#[derive(Debug, Default)]
pub struct CsmMaterials {
    materials: HashMap<MaterialId, MaterialRecord>,
}

impl CsmMaterials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn contains(&self, material: MaterialId) -> bool {
        self.materials.contains_key(&material)
    }

    /// Register `material`. Re-registering resets it to uncompiled.
    pub fn setup_material(&mut self, material: MaterialId, cascades: usize, fade: bool) {
        let mut defines = BTreeMap::new();
        defines.insert(DEFINE_USE_CSM.to_string(), "1".to_string());
        defines.insert(DEFINE_CASCADES.to_string(), cascades.to_string());
        if fade {
            defines.insert(DEFINE_FADE.to_string(), String::new());
        }
        tracing::debug!("CSM material {:?} registered ({} cascades)", material, cascades);
        self.materials.insert(
            material,
            MaterialRecord {
                defines,
                uniforms: None,
                needs_update: true,
            },
        );
    }

    /// Build the shader variant of a registered material with the current
    /// uniforms. Returns `None` for unknown materials.
    pub fn compile_material(
        &mut self,
        material: MaterialId,
        uniforms: CsmUniforms,
    ) -> Option<ShaderVariant> {
        let record = self.materials.get_mut(&material)?;
        record.uniforms = Some(uniforms.clone());
        record.needs_update = false;
        tracing::debug!("CSM material {:?} compiled", material);
        Some(ShaderVariant {
            defines: record.defines.clone(),
            uniforms,
        })
    }

    /// Refresh the uniforms of compiled materials and sync the fade define.
    /// Materials whose defines change are flagged for rebuild.
    pub fn update(&mut self, uniforms: &CsmUniforms, fade: bool) {
        for record in self.materials.values_mut() {
            if let Some(current) = record.uniforms.as_mut() {
                current.clone_from(uniforms);
            }
            let has_fade = record.defines.contains_key(DEFINE_FADE);
            if has_fade && !fade {
                record.defines.remove(DEFINE_FADE);
                record.needs_update = true;
            } else if fade && !has_fade {
                record.defines.insert(DEFINE_FADE.to_string(), String::new());
                record.needs_update = true;
            }
        }
    }

    pub fn needs_update(&self, material: MaterialId) -> bool {
        self.materials
            .get(&material)
            .is_some_and(|record| record.needs_update)
    }

    /// Current uniforms of a compiled material.
    pub fn uniforms(&self, material: MaterialId) -> Option<&CsmUniforms> {
        self.materials.get(&material)?.uniforms.as_ref()
    }

    pub fn defines(&self, material: MaterialId) -> Option<&BTreeMap<String, String>> {
        self.materials.get(&material).map(|record| &record.defines)
    }

    /// Stop managing `material`. Returns `false` if it was not registered.
    pub fn remove_material(&mut self, material: MaterialId) -> bool {
        self.materials.remove(&material).is_some()
    }

    /// Forget every material. Returns the ids that need a rebuild without
    /// shadow defines.
    pub fn dispose(&mut self) -> Vec<MaterialId> {
        let mut released: Vec<MaterialId> = self.materials.drain().map(|(id, _)| id).collect();
        released.sort();
        released
    }
}
