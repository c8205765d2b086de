//! Injected GPU texture and material collaborator.
//!
//! The terrain core never talks to a graphics API directly. Everything
//! render-facing goes through [`RenderBackend`], so the storage and editor
//! run (and are tested) without a live renderer.

use glam::{Vec2, Vec3, Vec4};

use crate::terrain::map::MapImage;

/// Opaque handle to a GPU texture owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a backend material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u64);

/// Value pushed to a named shader uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    /// A texture binding; `None` unbinds
    Texture(Option<TextureHandle>),
}

/// GPU and material operations the terrain core needs from its host.
///
/// Array textures are created from an ordered list of equally sized layers.
/// Freed handles must not be reused by the caller.
pub trait RenderBackend {
    /// Upload a single image as a 2D texture
    fn texture_create(&mut self, image: &MapImage) -> TextureHandle;

    /// Upload an ordered list of images as a 2D array texture.
    /// Callers must not pass an empty list; release the handle instead.
    fn texture_array_create(&mut self, layers: &[MapImage]) -> TextureHandle;

    /// Release a texture handle
    fn texture_free(&mut self, texture: TextureHandle);

    /// Create an empty material
    fn material_create(&mut self) -> MaterialHandle;

    /// Replace the material's shader source text
    fn material_set_shader_code(&mut self, material: MaterialHandle, code: &str);

    /// Set a named shader uniform on the material
    fn material_set_param(&mut self, material: MaterialHandle, name: &str, value: UniformValue);
}
