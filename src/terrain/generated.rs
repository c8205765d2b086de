//! Lazily rebuilt GPU artifacts derived from raster tiles.
//!
//! Each cache is a two-state machine: any mutation of its source data marks
//! it `Dirty`, a rebuild marks it `Clean`. A clean cache's handle is always
//! pixel-consistent with the tiles it was built from; the caches are never
//! partially updated.

use crate::render::{RenderBackend, TextureHandle};
use crate::terrain::map::MapImage;

/// One derived GPU texture with optional retained source image
#[derive(Debug)]
pub struct Generated {
    handle: Option<TextureHandle>,
    image: Option<MapImage>,
    dirty: bool,
}

impl Generated {
    /// Create an empty, dirty cache
    pub fn new() -> Self {
        Self {
            handle: None,
            image: None,
            dirty: true,
        }
    }

    /// Upload a layer list as an array texture and mark clean.
    /// An empty list releases instead: an empty array texture is invalid.
    pub fn create_array(&mut self, backend: &mut dyn RenderBackend, layers: &[MapImage]) {
        if layers.is_empty() {
            self.clear(backend);
            return;
        }
        if let Some(old) = self.handle.take() {
            backend.texture_free(old);
        }
        self.handle = Some(backend.texture_array_create(layers));
        self.dirty = false;
    }

    /// Upload a single image, retain it for CPU-side reads, mark clean
    pub fn create(&mut self, backend: &mut dyn RenderBackend, image: MapImage) {
        if let Some(old) = self.handle.take() {
            backend.texture_free(old);
        }
        self.handle = Some(backend.texture_create(&image));
        self.image = Some(image);
        self.dirty = false;
    }

    /// Release the GPU handle and retained image, mark dirty
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(handle) = self.handle.take() {
            backend.texture_free(handle);
        }
        self.image = None;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    /// Retained source image, if this cache keeps one and is built
    pub fn image(&self) -> Option<&MapImage> {
        self.image.as_ref()
    }
}

impl Default for Generated {
    fn default() -> Self {
        Self::new()
    }
}
