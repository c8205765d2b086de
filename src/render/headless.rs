//! Recording render backend with no GPU behind it.
//!
//! Used by tests and offline tools: uploads, frees, shader code and uniform
//! pushes are recorded so callers can inspect what the terrain core would
//! have handed a real renderer. Clones share state, so a test can keep one
//! handle while the storage owns another.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::backend::{MaterialHandle, RenderBackend, TextureHandle, UniformValue};
use crate::terrain::map::MapImage;

#[derive(Debug, Default)]
struct MaterialState {
    shader_code: String,
    params: HashMap<String, UniformValue>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_handle: u64,
    live_textures: HashSet<TextureHandle>,
    /// (width, height, layer count) per live texture
    texture_sizes: HashMap<TextureHandle, (u32, u32, u32)>,
    freed_textures: Vec<TextureHandle>,
    materials: HashMap<MaterialHandle, MaterialState>,
}

impl HeadlessState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// In-memory [`RenderBackend`] that records every call
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    /// Create a new backend with empty recorded state
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures created and not yet freed
    pub fn live_texture_count(&self) -> usize {
        self.state.borrow().live_textures.len()
    }

    /// Whether the handle refers to a texture that is still live
    pub fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.state.borrow().live_textures.contains(&texture)
    }

    /// Dimensions and layer count of a live texture
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32, u32)> {
        self.state.borrow().texture_sizes.get(&texture).copied()
    }

    /// Handles freed so far, in order
    pub fn freed_textures(&self) -> Vec<TextureHandle> {
        self.state.borrow().freed_textures.clone()
    }

    /// Last shader source set on the material
    pub fn shader_code(&self, material: MaterialHandle) -> Option<String> {
        self.state
            .borrow()
            .materials
            .get(&material)
            .map(|m| m.shader_code.clone())
    }

    /// Last value pushed to the named uniform
    pub fn material_param(&self, material: MaterialHandle, name: &str) -> Option<UniformValue> {
        self.state
            .borrow()
            .materials
            .get(&material)
            .and_then(|m| m.params.get(name).cloned())
    }
}

impl RenderBackend for HeadlessBackend {
    fn texture_create(&mut self, image: &MapImage) -> TextureHandle {
        let mut state = self.state.borrow_mut();
        let handle = TextureHandle(state.next());
        state.live_textures.insert(handle);
        state
            .texture_sizes
            .insert(handle, (image.width(), image.height(), 1));
        handle
    }

    fn texture_array_create(&mut self, layers: &[MapImage]) -> TextureHandle {
        debug_assert!(!layers.is_empty(), "empty array texture upload");
        let mut state = self.state.borrow_mut();
        let handle = TextureHandle(state.next());
        let (w, h) = layers
            .first()
            .map(|l| (l.width(), l.height()))
            .unwrap_or((0, 0));
        state.live_textures.insert(handle);
        state
            .texture_sizes
            .insert(handle, (w, h, layers.len() as u32));
        handle
    }

    fn texture_free(&mut self, texture: TextureHandle) {
        let mut state = self.state.borrow_mut();
        state.live_textures.remove(&texture);
        state.texture_sizes.remove(&texture);
        state.freed_textures.push(texture);
    }

    fn material_create(&mut self) -> MaterialHandle {
        let mut state = self.state.borrow_mut();
        let handle = MaterialHandle(state.next());
        state.materials.insert(handle, MaterialState::default());
        handle
    }

    fn material_set_shader_code(&mut self, material: MaterialHandle, code: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(m) = state.materials.get_mut(&material) {
            m.shader_code = code.to_string();
        }
    }

    fn material_set_param(&mut self, material: MaterialHandle, name: &str, value: UniformValue) {
        let mut state = self.state.borrow_mut();
        if let Some(m) = state.materials.get_mut(&material) {
            m.params.insert(name.to_string(), value);
        }
    }
}
