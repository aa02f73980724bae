//! The engine's material binding convention.
//!
//! Which texture units and uniform blocks a material-using program binds is
//! engine policy, not a graphics-API requirement, so the assignments live in
//! an explicit table that hosts can override and validate on their own.

use std::collections::HashSet;

use crate::error::ProgramError;

pub const DIFFUSE_SAMPLER: &str = "diffuseSampler";
pub const AMBIENT_SAMPLER: &str = "ambientSampler";
pub const SPECULAR_SAMPLER: &str = "specularSampler";
pub const OPACITY_SAMPLER: &str = "opacitySampler";
pub const NORMAL_SAMPLER: &str = "normalSampler";
pub const SHADOW_DIRECTIONAL_SAMPLER: &str = "pre_shadowDirectional";
pub const SHADOW_POINT_SAMPLER: &str = "pre_shadowPoint";

/// Texture-unit assignments for material programs.
///
/// The shadow offsets count down from the device's texture unit maximum: the
/// top two units are reserved for the shadow pre-pass results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialBindings {
    pub diffuse_unit: i32,
    pub ambient_unit: i32,
    pub specular_unit: i32,
    pub opacity_unit: i32,
    pub normal_unit: i32,
    pub shadow_directional_offset: i32,
    pub shadow_point_offset: i32,
}

impl Default for MaterialBindings {
    fn default() -> Self {
        Self {
            diffuse_unit: 1,
            ambient_unit: 2,
            specular_unit: 3,
            opacity_unit: 4,
            normal_unit: 5,
            shadow_directional_offset: 1,
            shadow_point_offset: 2,
        }
    }
}

impl MaterialBindings {
    /// Shadow directional unit on a device with the given unit budget.
    pub fn shadow_directional_unit(&self, max_texture_image_units: i32) -> i32 {
        max_texture_image_units - self.shadow_directional_offset
    }

    /// Shadow point unit on a device with the given unit budget.
    pub fn shadow_point_unit(&self, max_texture_image_units: i32) -> i32 {
        max_texture_image_units - self.shadow_point_offset
    }

    /// Check the table against a device's texture unit budget: every unit in
    /// range, no unit assigned twice, material units clear of the reserved
    /// shadow units.
    pub fn validate(&self, max_texture_image_units: i32) -> Result<(), ProgramError> {
        let units = [
            self.diffuse_unit,
            self.ambient_unit,
            self.specular_unit,
            self.opacity_unit,
            self.normal_unit,
            self.shadow_directional_unit(max_texture_image_units),
            self.shadow_point_unit(max_texture_image_units),
        ];

        if let Some(unit) = units
            .iter()
            .find(|unit| **unit < 0 || **unit >= max_texture_image_units)
        {
            return Err(ProgramError::InvalidBindings(format!(
                "texture unit {unit} out of range for a device with {max_texture_image_units} units"
            )));
        }

        let mut seen = HashSet::new();
        for unit in units {
            if !seen.insert(unit) {
                return Err(ProgramError::InvalidBindings(format!(
                    "texture unit {unit} assigned twice"
                )));
            }
        }
        Ok(())
    }
}
