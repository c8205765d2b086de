//! Terrain surface material layers.
//!
//! The surface list order defines the 0..255 index space referenced by the
//! control map's base and overlay channels.

use glam::{Vec3, Vec4};

use crate::terrain::map::MapImage;

/// One paintable material layer: albedo + normal textures, uv scale, tint
#[derive(Debug, Clone)]
pub struct Surface {
    albedo_texture: Option<MapImage>,
    normal_texture: Option<MapImage>,
    uv_scale: Vec3,
    albedo: Vec4,
}

impl Surface {
    /// Create a surface with no textures, unit uv scale and white tint
    pub fn new() -> Self {
        Self {
            albedo_texture: None,
            normal_texture: None,
            uv_scale: Vec3::ONE,
            albedo: Vec4::ONE,
        }
    }

    pub fn with_albedo_texture(mut self, texture: MapImage) -> Self {
        self.albedo_texture = Some(texture);
        self
    }

    pub fn with_normal_texture(mut self, texture: MapImage) -> Self {
        self.normal_texture = Some(texture);
        self
    }

    pub fn with_uv_scale(mut self, uv_scale: Vec3) -> Self {
        self.uv_scale = uv_scale;
        self
    }

    pub fn with_albedo(mut self, albedo: Vec4) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn albedo_texture(&self) -> Option<&MapImage> {
        self.albedo_texture.as_ref()
    }

    pub fn normal_texture(&self) -> Option<&MapImage> {
        self.normal_texture.as_ref()
    }

    pub fn uv_scale(&self) -> Vec3 {
        self.uv_scale
    }

    /// Albedo tint color
    pub fn albedo(&self) -> Vec4 {
        self.albedo
    }

    /// Set the albedo texture. The owning storage must be told via
    /// `update_surface_textures` for the change to reach the GPU arrays.
    pub fn set_albedo_texture(&mut self, texture: Option<MapImage>) {
        self.albedo_texture = texture;
    }

    pub fn set_normal_texture(&mut self, texture: Option<MapImage>) {
        self.normal_texture = texture;
    }

    pub fn set_uv_scale(&mut self, uv_scale: Vec3) {
        self.uv_scale = uv_scale;
    }

    pub fn set_albedo(&mut self, albedo: Vec4) {
        self.albedo = albedo;
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}
