//! Region-addressed terrain storage.
//!
//! Terrain is a sparse grid of fixed-size regions keyed by an integer offset
//! on the world grid. Each region owns one height, one control and one color
//! tile; the four parallel lists (offsets + three tile lists) are only ever
//! mutated together. Derived GPU artifacts are tracked by [`Generated`]
//! caches and rebuilt lazily in [`TerrainStorage::update_regions`].

use glam::{IVec2, Vec2, Vec3, Vec4};
use image::imageops::FilterType;

use crate::core::{Error, Result};
use crate::render::{MaterialHandle, RenderBackend, UniformValue};
use crate::terrain::generated::Generated;
use crate::terrain::map::{MapImage, MapType, PixelFormat};
use crate::terrain::shader::{generate_shader_code, ShaderFeatures};
use crate::terrain::surface::Surface;

/// Edge length of the region map; hard capacity bound per axis
pub const REGION_MAP_SIZE: i32 = 16;

/// World height spanned by a height value of 1.0
pub const TERRAIN_MAX_HEIGHT: f32 = 512.0;

/// Pixel dimensions of the region blend map
const REGION_BLEND_SIZE: u32 = 512;

const COLOR_BLACK: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);
/// Fallback albedo layer for surfaces without a texture
const COLOR_ALBEDO_FALLBACK: Vec4 = Vec4::new(0.7, 0.3, 0.2, 1.0);
/// Flat tangent-space normal
const COLOR_NORMAL: Vec4 = Vec4::new(0.5, 0.5, 1.0, 1.0);

/// Allowed region tile edge lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RegionSize {
    Size64 = 64,
    Size128 = 128,
    Size256 = 256,
    Size512 = 512,
    Size1024 = 1024,
    Size2048 = 2048,
}

impl RegionSize {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for RegionSize {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            64 => Ok(RegionSize::Size64),
            128 => Ok(RegionSize::Size128),
            256 => Ok(RegionSize::Size256),
            512 => Ok(RegionSize::Size512),
            1024 => Ok(RegionSize::Size1024),
            2048 => Ok(RegionSize::Size2048),
            _ => Err(Error::RegionSize(value)),
        }
    }
}

/// Region directory plus derived texture caches and the terrain material
pub struct TerrainStorage {
    region_size: u32,
    region_offsets: Vec<IVec2>,
    height_maps: Vec<MapImage>,
    control_maps: Vec<MapImage>,
    color_maps: Vec<MapImage>,

    surfaces: Vec<Surface>,
    surfaces_enabled: bool,

    noise_enabled: bool,
    noise_scale: f32,
    noise_height: f32,
    noise_blend_near: f32,
    noise_blend_far: f32,

    shader_override: Option<String>,
    shader_override_enabled: bool,

    generated_height_maps: Generated,
    generated_control_maps: Generated,
    generated_color_maps: Generated,
    generated_albedo_textures: Generated,
    generated_normal_textures: Generated,
    generated_region_map: Generated,
    generated_region_blend_map: Generated,

    material: Option<MaterialHandle>,
    backend: Box<dyn RenderBackend>,
    changed: bool,
}

impl TerrainStorage {
    /// Create empty storage bound to a render backend
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        log::info!("Initializing terrain storage");
        let mut storage = Self {
            region_size: 1024,
            region_offsets: Vec::new(),
            height_maps: Vec::new(),
            control_maps: Vec::new(),
            color_maps: Vec::new(),
            surfaces: Vec::new(),
            surfaces_enabled: false,
            noise_enabled: false,
            noise_scale: 2.0,
            noise_height: 1.0,
            noise_blend_near: 0.5,
            noise_blend_far: 1.0,
            shader_override: None,
            shader_override_enabled: false,
            generated_height_maps: Generated::new(),
            generated_control_maps: Generated::new(),
            generated_color_maps: Generated::new(),
            generated_albedo_textures: Generated::new(),
            generated_normal_textures: Generated::new(),
            generated_region_map: Generated::new(),
            generated_region_blend_map: Generated::new(),
            material: None,
            backend,
            changed: false,
        };
        storage.update_material();
        storage
    }

    pub fn region_size(&self) -> u32 {
        self.region_size
    }

    /// Set the tile edge length for regions created afterwards.
    /// Regenerates the shader and scalar uniforms.
    pub fn set_region_size(&mut self, size: RegionSize) {
        log::info!("Setting region size: {}", size.as_u32());
        self.region_size = size.as_u32();
        self.update_material();
    }

    /// Grid offset of the region containing a world position
    fn offset_at(&self, position: Vec3) -> IVec2 {
        let p = Vec2::new(position.x, position.z) / self.region_size as f32 + Vec2::splat(0.5);
        p.floor().as_ivec2()
    }

    /// Whether an offset has a pixel in the region map
    fn offset_in_bounds(offset: IVec2) -> bool {
        let half = REGION_MAP_SIZE / 2;
        offset.x >= -half && offset.x < half && offset.y >= -half && offset.y < half
    }

    /// Append a region at the world position, tiles filled to defaults
    pub fn add_region(&mut self, position: Vec3) -> Result<()> {
        let offset = self.offset_at(position);
        if self.has_region(position) {
            return Err(Error::RegionExists(offset.x, offset.y));
        }
        if !Self::offset_in_bounds(offset) {
            return Err(Error::RegionCapacity(offset.x, offset.y));
        }

        log::info!("Adding region at: {:?}", offset);
        self.height_maps
            .push(MapImage::for_map_type(MapType::Height, self.region_size));
        log::debug!("Height maps size after push: {}", self.height_maps.len());
        self.control_maps
            .push(MapImage::for_map_type(MapType::Control, self.region_size));
        log::debug!("Control maps size after push: {}", self.control_maps.len());
        self.color_maps
            .push(MapImage::for_map_type(MapType::Color, self.region_size));
        log::debug!("Color maps size after push: {}", self.color_maps.len());
        self.region_offsets.push(offset);
        log::debug!("Total regions after push: {}", self.region_offsets.len());

        self.clear_map_caches();
        self.update_regions();
        self.changed = true;
        Ok(())
    }

    /// Remove the region at the world position, keeping the rest in order
    pub fn remove_region(&mut self, position: Vec3) -> Result<()> {
        if self.region_count() == 1 {
            return Err(Error::LastRegion);
        }
        let index = self
            .get_region_index(position)
            .ok_or(Error::RegionNotFound)?;

        log::info!("Removing region at: {:?}", self.offset_at(position));
        self.region_offsets.remove(index);
        log::debug!("Region offsets size after removal: {}", self.region_offsets.len());
        self.height_maps.remove(index);
        log::debug!("Height maps size after removal: {}", self.height_maps.len());
        self.control_maps.remove(index);
        log::debug!("Control maps size after removal: {}", self.control_maps.len());
        self.color_maps.remove(index);
        log::debug!("Color maps size after removal: {}", self.color_maps.len());

        self.clear_map_caches();
        self.update_regions();
        self.changed = true;
        Ok(())
    }

    pub fn has_region(&self, position: Vec3) -> bool {
        self.get_region_index(position).is_some()
    }

    /// Directory index of the region containing the position.
    ///
    /// Reads the cached region map when clean, otherwise scans the offset
    /// list. The two paths agree for every position.
    pub fn get_region_index(&self, position: Vec3) -> Option<usize> {
        let offset = self.offset_at(position);
        if !Self::offset_in_bounds(offset) {
            return None;
        }

        if !self.generated_region_map.is_dirty() {
            if let Some(img) = self.generated_region_map.image() {
                let pixel = offset + IVec2::splat(REGION_MAP_SIZE / 2);
                let value = img.get_pixel(pixel.x as u32, pixel.y as u32).x;
                let index = (value * 255.0).round() as i32 - 1;
                return if index >= 0 { Some(index as usize) } else { None };
            }
        }

        self.region_offsets.iter().position(|o| *o == offset)
    }

    pub fn region_count(&self) -> usize {
        self.region_offsets.len()
    }

    pub fn region_offsets(&self) -> &[IVec2] {
        &self.region_offsets
    }

    /// Replace the offset list (deserialization path). Callers must follow
    /// with matching `set_maps` calls for each map type.
    pub fn set_region_offsets(&mut self, offsets: Vec<IVec2>) {
        log::info!("Setting region offsets with array sized: {}", offsets.len());
        self.region_offsets = offsets;
        self.generated_region_map.clear(self.backend.as_mut());
        self.generated_region_blend_map.clear(self.backend.as_mut());
        self.update_regions();
        self.changed = true;
    }

    fn maps(&self, map_type: MapType) -> &Vec<MapImage> {
        match map_type {
            MapType::Height => &self.height_maps,
            MapType::Control => &self.control_maps,
            MapType::Color => &self.color_maps,
        }
    }

    fn maps_mut(&mut self, map_type: MapType) -> &mut Vec<MapImage> {
        match map_type {
            MapType::Height => &mut self.height_maps,
            MapType::Control => &mut self.control_maps,
            MapType::Color => &mut self.color_maps,
        }
    }

    /// Tile of the given map type at a region index
    pub fn get_map(&self, map_type: MapType, index: usize) -> Result<&MapImage> {
        let maps = self.maps(map_type);
        let count = maps.len();
        maps.get(index).ok_or_else(|| {
            log::error!("Requested index is out of bounds. {map_type:?} maps size: {count}");
            Error::MapIndex { index, count }
        })
    }

    /// Mutable tile access for the brush loop. Callers are responsible for
    /// invalidating the map type's cache via `force_update_maps` afterwards.
    pub(crate) fn map_mut(&mut self, map_type: MapType, index: usize) -> Option<&mut MapImage> {
        self.maps_mut(map_type).get_mut(index)
    }

    /// Replace one tile, invalidating that map type's derived cache
    pub fn set_map(&mut self, map_type: MapType, index: usize, image: MapImage) -> Result<()> {
        let count = self.maps(map_type).len();
        if index >= count {
            log::error!("Requested index is out of bounds. {map_type:?} maps size: {count}");
            return Err(Error::MapIndex { index, count });
        }
        self.check_tile(map_type, &image)?;
        self.maps_mut(map_type)[index] = image;
        self.force_update_maps(Some(map_type));
        Ok(())
    }

    pub fn get_maps(&self, map_type: MapType) -> &[MapImage] {
        self.maps(map_type)
    }

    pub fn get_maps_copy(&self, map_type: MapType) -> Vec<MapImage> {
        self.maps(map_type).clone()
    }

    /// Replace a whole tile list; its length must match the directory
    pub fn set_maps(&mut self, map_type: MapType, maps: Vec<MapImage>) -> Result<()> {
        if maps.len() != self.region_offsets.len() {
            return Err(Error::MapCount {
                expected: self.region_offsets.len(),
                actual: maps.len(),
            });
        }
        for map in &maps {
            self.check_tile(map_type, map)?;
        }
        log::info!("Setting {map_type:?} maps: {}", maps.len());
        *self.maps_mut(map_type) = maps;
        self.force_update_maps(Some(map_type));
        Ok(())
    }

    fn check_tile(&self, map_type: MapType, image: &MapImage) -> Result<()> {
        if image.format() != map_type.format()
            || image.width() != self.region_size
            || image.height() != self.region_size
        {
            return Err(Error::Data(format!(
                "{map_type:?} tile is {}x{} {:?}, expected {}x{} {:?}",
                image.width(),
                image.height(),
                image.format(),
                self.region_size,
                self.region_size,
                map_type.format()
            )));
        }
        Ok(())
    }

    /// Invalidate the named map cache (or all three) and rebuild
    pub fn force_update_maps(&mut self, map_type: Option<MapType>) {
        match map_type {
            Some(MapType::Height) => self.generated_height_maps.clear(self.backend.as_mut()),
            Some(MapType::Control) => self.generated_control_maps.clear(self.backend.as_mut()),
            Some(MapType::Color) => self.generated_color_maps.clear(self.backend.as_mut()),
            None => {
                self.generated_height_maps.clear(self.backend.as_mut());
                self.generated_control_maps.clear(self.backend.as_mut());
                self.generated_color_maps.clear(self.backend.as_mut());
            }
        }
        self.update_regions();
    }

    fn clear_map_caches(&mut self) {
        self.generated_height_maps.clear(self.backend.as_mut());
        self.generated_control_maps.clear(self.backend.as_mut());
        self.generated_color_maps.clear(self.backend.as_mut());
        self.generated_region_map.clear(self.backend.as_mut());
        self.generated_region_blend_map.clear(self.backend.as_mut());
    }

    /// Rebuild whichever derived caches are dirty and refresh their uniforms
    pub fn update_regions(&mut self) {
        if self.generated_height_maps.is_dirty() {
            log::info!(
                "Regenerating height layered texture from {} maps",
                self.height_maps.len()
            );
            self.generated_height_maps
                .create_array(self.backend.as_mut(), &self.height_maps);
            self.push_param(
                "height_maps",
                UniformValue::Texture(self.generated_height_maps.handle()),
            );
        }

        if self.generated_control_maps.is_dirty() {
            log::info!(
                "Regenerating control layered texture from {} maps",
                self.control_maps.len()
            );
            self.generated_control_maps
                .create_array(self.backend.as_mut(), &self.control_maps);
            self.push_param(
                "control_maps",
                UniformValue::Texture(self.generated_control_maps.handle()),
            );
        }

        if self.generated_color_maps.is_dirty() {
            log::info!(
                "Regenerating color layered texture from {} maps",
                self.color_maps.len()
            );
            self.generated_color_maps
                .create_array(self.backend.as_mut(), &self.color_maps);
            self.push_param(
                "color_maps",
                UniformValue::Texture(self.generated_color_maps.handle()),
            );
        }

        if self.generated_region_map.is_dirty() {
            log::info!("Regenerating {REGION_MAP_SIZE}x{REGION_MAP_SIZE} region map");
            let size = REGION_MAP_SIZE as u32;
            let mut region_map_img = MapImage::filled(PixelFormat::Rg8, size, size, COLOR_BLACK);

            for (i, offset) in self.region_offsets.iter().enumerate() {
                let pixel = *offset + IVec2::splat(REGION_MAP_SIZE / 2);
                if pixel.x < 0 || pixel.y < 0 || pixel.x >= REGION_MAP_SIZE || pixel.y >= REGION_MAP_SIZE
                {
                    log::warn!("Region offset {:?} falls outside the region map", offset);
                    continue;
                }
                let color = Vec4::new((i + 1) as f32 / 255.0, 1.0, 0.0, 1.0);
                region_map_img.put_pixel(pixel.x as u32, pixel.y as u32, color);
            }

            let blend_source = if self.noise_enabled {
                Some(region_map_img.clone())
            } else {
                None
            };

            self.generated_region_map
                .create(self.backend.as_mut(), region_map_img);
            self.push_param(
                "region_map",
                UniformValue::Texture(self.generated_region_map.handle()),
            );
            self.push_param("region_map_size", UniformValue::Int(REGION_MAP_SIZE));
            let offsets: Vec<Vec2> = self.region_offsets.iter().map(|o| o.as_vec2()).collect();
            self.push_param("region_offsets", UniformValue::Vec2Array(offsets));

            if let Some(region_map_img) = blend_source {
                log::info!("Regenerating {REGION_BLEND_SIZE}x{REGION_BLEND_SIZE} region blend map");
                let mut blend_img = MapImage::new(PixelFormat::Rf, size, size);
                for y in 0..size {
                    for x in 0..size {
                        let c = region_map_img.get_pixel(x, y);
                        blend_img.put_pixel(x, y, Vec4::new(c.y, 0.0, 0.0, 1.0));
                    }
                }
                let blend_img =
                    blend_img.resized(REGION_BLEND_SIZE, REGION_BLEND_SIZE, FilterType::Lanczos3);

                self.generated_region_blend_map
                    .create(self.backend.as_mut(), blend_img);
                self.push_param(
                    "region_blend_map",
                    UniformValue::Texture(self.generated_region_blend_map.handle()),
                );
            }
        }
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn get_surface(&self, index: usize) -> Option<&Surface> {
        self.surfaces.get(index)
    }

    /// Mutable surface access. Follow up with `update_surface_textures` or
    /// `update_surface_values` depending on what changed.
    pub fn get_surface_mut(&mut self, index: usize) -> Option<&mut Surface> {
        self.surfaces.get_mut(index)
    }

    /// Replace, append or remove (with `None`) a surface at the index
    pub fn set_surface(&mut self, index: usize, surface: Option<Surface>) -> Result<()> {
        log::info!("Setting surface index: {index}");
        let mut surfaces = self.surfaces.clone();
        if index < surfaces.len() {
            match surface {
                Some(s) => surfaces[index] = s,
                None => {
                    surfaces.remove(index);
                }
            }
        } else if let Some(s) = surface {
            surfaces.push(s);
        }
        self.set_surfaces(surfaces)
    }

    /// Replace the surface list. A list with mismatched texture sizes is
    /// rejected whole; the previous surfaces and arrays are kept.
    pub fn set_surfaces(&mut self, surfaces: Vec<Surface>) -> Result<()> {
        log::info!("Setting surfaces");
        Self::surface_texture_sizes(&surfaces)?;
        self.surfaces = surfaces;
        self.changed = true;
        self.update_surfaces()
    }

    pub fn surfaces_enabled(&self) -> bool {
        self.surfaces_enabled
    }

    /// Rebuild surface texture arrays and value uniforms from scratch
    pub fn update_surfaces(&mut self) -> Result<()> {
        log::info!("Regenerating material surfaces");
        Self::surface_texture_sizes(&self.surfaces)?;
        self.generated_albedo_textures.clear(self.backend.as_mut());
        self.generated_normal_textures.clear(self.backend.as_mut());
        self.update_surface_data(true, true)
    }

    /// A surface texture changed: rebuild the albedo and normal arrays
    pub fn update_surface_textures(&mut self) -> Result<()> {
        Self::surface_texture_sizes(&self.surfaces)?;
        self.generated_albedo_textures.clear(self.backend.as_mut());
        self.generated_normal_textures.clear(self.backend.as_mut());
        self.update_surface_data(true, false)
    }

    /// A surface scalar changed: refresh the uniform arrays only
    pub fn update_surface_values(&mut self) -> Result<()> {
        self.update_surface_data(false, true)
    }

    /// Common texture dimensions of a surface list, albedo and normal.
    /// Mismatched sizes within either family are an invariant-guard error.
    fn surface_texture_sizes(
        surfaces: &[Surface],
    ) -> Result<(Option<(u32, u32)>, Option<(u32, u32)>)> {
        let mut albedo_size: Option<(u32, u32)> = None;
        let mut normal_size: Option<(u32, u32)> = None;
        for surface in surfaces {
            if let Some(tex) = surface.albedo_texture() {
                let size = (tex.width(), tex.height());
                match albedo_size {
                    None => albedo_size = Some(size),
                    Some(existing) if existing != size => {
                        return Err(Error::SurfaceTextureSize(format!(
                            "albedo {}x{} vs {}x{}",
                            size.0, size.1, existing.0, existing.1
                        )));
                    }
                    Some(_) => {}
                }
            }
            if let Some(tex) = surface.normal_texture() {
                let size = (tex.width(), tex.height());
                match normal_size {
                    None => normal_size = Some(size),
                    Some(existing) if existing != size => {
                        return Err(Error::SurfaceTextureSize(format!(
                            "normal {}x{} vs {}x{}",
                            size.0, size.1, existing.0, existing.1
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok((albedo_size.or(normal_size), normal_size.or(albedo_size)))
    }

    fn update_surface_data(&mut self, update_textures: bool, update_values: bool) -> Result<()> {
        if update_textures {
            log::info!("Regenerating terrain textures");
            let (albedo_size, normal_size) = Self::surface_texture_sizes(&self.surfaces)?;

            let was_surfaces_enabled = self.surfaces_enabled;

            if self.generated_albedo_textures.is_dirty() {
                if let Some((w, h)) = albedo_size {
                    log::info!("Regenerating terrain albedo arrays");
                    let layers: Vec<MapImage> = self
                        .surfaces
                        .iter()
                        .map(|s| match s.albedo_texture() {
                            Some(tex) => tex.clone(),
                            None => {
                                MapImage::filled(PixelFormat::Rgba8, w, h, COLOR_ALBEDO_FALLBACK)
                            }
                        })
                        .collect();
                    self.generated_albedo_textures
                        .create_array(self.backend.as_mut(), &layers);
                }
            }
            self.surfaces_enabled = self.generated_albedo_textures.handle().is_some();

            if self.generated_normal_textures.is_dirty() {
                if let Some((w, h)) = normal_size {
                    log::info!("Regenerating terrain normal arrays");
                    let layers: Vec<MapImage> = self
                        .surfaces
                        .iter()
                        .map(|s| match s.normal_texture() {
                            Some(tex) => tex.clone(),
                            None => MapImage::filled(PixelFormat::Rgba8, w, h, COLOR_NORMAL),
                        })
                        .collect();
                    self.generated_normal_textures
                        .create_array(self.backend.as_mut(), &layers);
                }
            }

            if was_surfaces_enabled != self.surfaces_enabled {
                self.update_material();
            }

            self.push_param(
                "texture_array_albedo",
                UniformValue::Texture(self.generated_albedo_textures.handle()),
            );
            self.push_param(
                "texture_array_normal",
                UniformValue::Texture(self.generated_normal_textures.handle()),
            );
        }

        if update_values {
            log::info!("Updating terrain color and scale arrays");
            let uv_scales: Vec<Vec3> = self.surfaces.iter().map(|s| s.uv_scale()).collect();
            let colors: Vec<Vec4> = self.surfaces.iter().map(|s| s.albedo()).collect();
            self.push_param("texture_uv_scale_array", UniformValue::Vec3Array(uv_scales));
            self.push_param("texture_color_array", UniformValue::Vec4Array(colors));
        }

        Ok(())
    }

    pub fn noise_enabled(&self) -> bool {
        self.noise_enabled
    }

    /// Toggle procedural noise terrain; rebuilds the blend map when enabled
    pub fn set_noise_enabled(&mut self, enabled: bool) {
        log::info!("Enable noise: {enabled}");
        self.noise_enabled = enabled;
        self.update_material();
        if enabled {
            self.generated_region_map.clear(self.backend.as_mut());
            self.generated_region_blend_map.clear(self.backend.as_mut());
            self.update_regions();
        }
    }

    pub fn noise_scale(&self) -> f32 {
        self.noise_scale
    }

    pub fn set_noise_scale(&mut self, scale: f32) {
        log::info!("Setting noise scale: {scale}");
        self.noise_scale = scale;
        self.push_param("noise_scale", UniformValue::Float(scale));
    }

    pub fn noise_height(&self) -> f32 {
        self.noise_height
    }

    pub fn set_noise_height(&mut self, height: f32) {
        log::info!("Setting noise height: {height}");
        self.noise_height = height;
        self.push_param("noise_height", UniformValue::Float(height));
    }

    pub fn noise_blend_near(&self) -> f32 {
        self.noise_blend_near
    }

    pub fn set_noise_blend_near(&mut self, near: f32) {
        log::info!("Setting noise blend near: {near}");
        self.noise_blend_near = near;
        if self.noise_blend_near > self.noise_blend_far {
            self.set_noise_blend_far(near);
        }
        self.push_param("noise_blend_near", UniformValue::Float(near));
    }

    pub fn noise_blend_far(&self) -> f32 {
        self.noise_blend_far
    }

    pub fn set_noise_blend_far(&mut self, far: f32) {
        log::info!("Setting noise blend far: {far}");
        self.noise_blend_far = far;
        if self.noise_blend_far < self.noise_blend_near {
            self.set_noise_blend_near(far);
        }
        self.push_param("noise_blend_far", UniformValue::Float(far));
    }

    pub fn is_shader_override_enabled(&self) -> bool {
        self.shader_override_enabled
    }

    pub fn shader_override(&self) -> Option<&str> {
        self.shader_override.as_deref()
    }

    /// Install (or clear) replacement shader source
    pub fn set_shader_override(&mut self, code: Option<String>) {
        log::info!("Setting override shader");
        self.shader_override = code;
        self.update_material();
    }

    /// Toggle the override. Enabling with no stored override snapshots the
    /// currently generated code so the user has a starting point to edit.
    pub fn enable_shader_override(&mut self, enabled: bool) {
        log::info!("Enable shader override: {enabled}");
        self.shader_override_enabled = enabled;
        if enabled && self.shader_override.is_none() {
            self.shader_override = Some(generate_shader_code(&self.shader_features()));
        }
        self.update_material();
    }

    fn shader_features(&self) -> ShaderFeatures {
        ShaderFeatures {
            surfaces_enabled: self.surfaces_enabled,
            noise_enabled: self.noise_enabled,
        }
    }

    /// The shader source currently installed on the material
    pub fn shader_code(&self) -> String {
        if self.shader_override_enabled {
            if let Some(code) = &self.shader_override {
                return code.clone();
            }
        }
        generate_shader_code(&self.shader_features())
    }

    /// Recreate the shader and scalar uniforms on the material
    pub fn update_material(&mut self) {
        log::info!("Updating material");
        let material = match self.material {
            Some(m) => m,
            None => {
                let m = self.backend.material_create();
                self.material = Some(m);
                m
            }
        };

        let code = self.shader_code();
        self.backend.material_set_shader_code(material, &code);

        self.push_param("terrain_height", UniformValue::Float(TERRAIN_MAX_HEIGHT));
        self.push_param("region_size", UniformValue::Float(self.region_size as f32));
        self.push_param(
            "region_pixel_size",
            UniformValue::Float(1.0 / self.region_size as f32),
        );
    }

    /// Backend material this storage renders with
    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    fn push_param(&mut self, name: &str, value: UniformValue) {
        if let Some(material) = self.material {
            self.backend.material_set_param(material, name, value);
        }
    }

    /// True once since the last call if the directory changed structurally
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Log directory and cache state
    pub fn audit(&self) {
        log::info!("Dumping storage data");
        log::info!(
            "region_offsets({}): {:?}",
            self.region_offsets.len(),
            self.region_offsets
        );
        log::info!("Map type height size: {}", self.height_maps.len());
        log::info!("Map type control size: {}", self.control_maps.len());
        log::info!("Map type color size: {}", self.color_maps.len());
        for (name, cache) in [
            ("generated_region_map", &self.generated_region_map),
            ("generated_region_blend_map", &self.generated_region_blend_map),
            ("generated_height_maps", &self.generated_height_maps),
            ("generated_control_maps", &self.generated_control_maps),
            ("generated_color_maps", &self.generated_color_maps),
            ("generated_albedo_textures", &self.generated_albedo_textures),
            ("generated_normal_textures", &self.generated_normal_textures),
        ] {
            log::info!(
                "{name} handle: {:?}, dirty: {}",
                cache.handle(),
                cache.is_dirty()
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn invalidate_region_map(&mut self) {
        self.generated_region_map.clear(self.backend.as_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;

    fn test_storage() -> (TerrainStorage, HeadlessBackend) {
        let backend = HeadlessBackend::new();
        let mut storage = TerrainStorage::new(Box::new(backend.clone()));
        storage.set_region_size(RegionSize::Size64);
        (storage, backend)
    }

    fn lists_len(storage: &TerrainStorage) -> (usize, usize, usize, usize) {
        (
            storage.get_maps(MapType::Height).len(),
            storage.get_maps(MapType::Control).len(),
            storage.get_maps(MapType::Color).len(),
            storage.region_offsets().len(),
        )
    }

    #[test]
    fn test_add_region_offset_math() {
        let (mut storage, _) = test_storage();

        storage.add_region(Vec3::ZERO).unwrap();
        assert_eq!(storage.region_count(), 1);
        assert_eq!(storage.region_offsets()[0], IVec2::new(0, 0));

        storage.add_region(Vec3::new(100.0, 0.0, 0.0)).unwrap();
        assert_eq!(storage.region_count(), 2);
        assert_eq!(storage.region_offsets()[1], IVec2::new(2, 0));

        storage.remove_region(Vec3::ZERO).unwrap();
        assert_eq!(storage.region_count(), 1);
        assert_eq!(storage.region_offsets()[0], IVec2::new(2, 0));
    }

    #[test]
    fn test_add_region_twice_is_rejected() {
        let (mut storage, _) = test_storage();

        storage.add_region(Vec3::ZERO).unwrap();
        let before = lists_len(&storage);

        let err = storage.add_region(Vec3::new(1.0, 0.0, 1.0));
        assert!(matches!(err, Err(Error::RegionExists(0, 0))));
        assert_eq!(lists_len(&storage), before);
    }

    #[test]
    fn test_parallel_lists_stay_aligned() {
        let (mut storage, _) = test_storage();
        let (h, c, col, o) = lists_len(&storage);
        assert_eq!((h, c, col, o), (0, 0, 0, 0));

        storage.add_region(Vec3::ZERO).unwrap();
        storage.add_region(Vec3::new(100.0, 0.0, 0.0)).unwrap();
        storage.add_region(Vec3::new(0.0, 0.0, 100.0)).unwrap();
        assert_eq!(lists_len(&storage), (3, 3, 3, 3));

        storage.remove_region(Vec3::new(100.0, 0.0, 0.0)).unwrap();
        assert_eq!(lists_len(&storage), (2, 2, 2, 2));
    }

    #[test]
    fn test_capacity_bounds() {
        let (mut storage, _) = test_storage();

        // offset -8 is the first valid column, offset 8 the first invalid one
        storage.add_region(Vec3::new(-512.0, 0.0, 0.0)).unwrap();
        assert_eq!(storage.region_offsets()[0], IVec2::new(-8, 0));

        let err = storage.add_region(Vec3::new(512.0, 0.0, 0.0));
        assert!(matches!(err, Err(Error::RegionCapacity(8, 0))));

        let err = storage.add_region(Vec3::new(0.0, 0.0, 2000.0));
        assert!(matches!(err, Err(Error::RegionCapacity(0, 31))));
    }

    #[test]
    fn test_last_region_protection() {
        let (mut storage, _) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let err = storage.remove_region(Vec3::ZERO);
        assert!(matches!(err, Err(Error::LastRegion)));
        assert_eq!(storage.region_count(), 1);

        // Position argument is irrelevant with a single region
        let err = storage.remove_region(Vec3::new(500.0, 0.0, 500.0));
        assert!(matches!(err, Err(Error::LastRegion)));
    }

    #[test]
    fn test_remove_missing_region() {
        let (mut storage, _) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();
        storage.add_region(Vec3::new(100.0, 0.0, 0.0)).unwrap();

        let err = storage.remove_region(Vec3::new(0.0, 0.0, 300.0));
        assert!(matches!(err, Err(Error::RegionNotFound)));
        assert_eq!(storage.region_count(), 2);
    }

    #[test]
    fn test_cached_and_scanned_lookup_agree() {
        let (mut storage, _) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();
        storage.add_region(Vec3::new(100.0, 0.0, 0.0)).unwrap();
        storage.add_region(Vec3::new(-200.0, 0.0, 150.0)).unwrap();

        let positions: Vec<Vec3> = (-10..10)
            .flat_map(|x| (-10..10).map(move |z| Vec3::new(x as f32 * 37.0, 0.0, z as f32 * 37.0)))
            .collect();

        let cached: Vec<Option<usize>> = positions
            .iter()
            .map(|p| storage.get_region_index(*p))
            .collect();

        storage.invalidate_region_map();
        let scanned: Vec<Option<usize>> = positions
            .iter()
            .map(|p| storage.get_region_index(*p))
            .collect();

        assert_eq!(cached, scanned);

        // Rebuild and compare once more
        storage.update_regions();
        let rebuilt: Vec<Option<usize>> = positions
            .iter()
            .map(|p| storage.get_region_index(*p))
            .collect();
        assert_eq!(cached, rebuilt);
    }

    #[test]
    fn test_map_accessor_bounds() {
        let (mut storage, _) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        assert!(storage.get_map(MapType::Height, 0).is_ok());
        let err = storage.get_map(MapType::Height, 3);
        assert!(matches!(err, Err(Error::MapIndex { index: 3, count: 1 })));

        let tile = MapImage::for_map_type(MapType::Color, 64);
        let err = storage.set_map(MapType::Color, 9, tile);
        assert!(matches!(err, Err(Error::MapIndex { index: 9, count: 1 })));
    }

    #[test]
    fn test_set_map_rejects_mismatched_tile() {
        let (mut storage, _) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let wrong_size = MapImage::for_map_type(MapType::Height, 32);
        assert!(storage.set_map(MapType::Height, 0, wrong_size).is_err());

        let wrong_format = MapImage::for_map_type(MapType::Color, 64);
        assert!(storage.set_map(MapType::Height, 0, wrong_format).is_err());
    }

    #[test]
    fn test_set_map_refreshes_cache() {
        let (mut storage, backend) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();
        let material = storage.material().unwrap();

        let before = backend.material_param(material, "height_maps");
        let mut tile = MapImage::for_map_type(MapType::Height, 64);
        tile.fill(Vec4::new(0.5, 0.0, 0.0, 1.0));
        storage.set_map(MapType::Height, 0, tile).unwrap();
        let after = backend.material_param(material, "height_maps");

        assert_ne!(before, after);
    }

    #[test]
    fn test_set_maps_count_must_match() {
        let (mut storage, _) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let err = storage.set_maps(MapType::Height, Vec::new());
        assert!(matches!(
            err,
            Err(Error::MapCount {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_region_map_uniforms_pushed() {
        let (mut storage, backend) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();
        storage.add_region(Vec3::new(100.0, 0.0, 0.0)).unwrap();
        let material = storage.material().unwrap();

        match backend.material_param(material, "region_map") {
            Some(UniformValue::Texture(Some(_))) => {}
            other => panic!("region_map uniform missing: {other:?}"),
        }
        match backend.material_param(material, "region_offsets") {
            Some(UniformValue::Vec2Array(offsets)) => {
                assert_eq!(offsets.len(), 2);
                assert_eq!(offsets[1], Vec2::new(2.0, 0.0));
            }
            other => panic!("region_offsets uniform missing: {other:?}"),
        }
        assert_eq!(
            backend.material_param(material, "region_map_size"),
            Some(UniformValue::Int(16))
        );
    }

    #[test]
    fn test_surfaces_enabled_follows_albedo_array() {
        let (mut storage, backend) = test_storage();
        assert!(!storage.surfaces_enabled());

        storage
            .set_surfaces(vec![Surface::new().with_albedo_texture(MapImage::filled(
                PixelFormat::Rgba8,
                8,
                8,
                Vec4::ONE,
            ))])
            .unwrap();
        assert!(storage.surfaces_enabled());

        let material = storage.material().unwrap();
        let code = backend.shader_code(material).unwrap();
        assert!(code.contains("texture_array_albedo"));

        storage.set_surfaces(Vec::new()).unwrap();
        assert!(!storage.surfaces_enabled());
    }

    #[test]
    fn test_surface_size_mismatch_is_rejected() {
        let (mut storage, _) = test_storage();
        storage
            .set_surfaces(vec![Surface::new().with_albedo_texture(MapImage::filled(
                PixelFormat::Rgba8,
                8,
                8,
                Vec4::ONE,
            ))])
            .unwrap();
        assert!(storage.surfaces_enabled());

        let mismatched = vec![
            Surface::new().with_albedo_texture(MapImage::filled(
                PixelFormat::Rgba8,
                8,
                8,
                Vec4::ONE,
            )),
            Surface::new().with_albedo_texture(MapImage::filled(
                PixelFormat::Rgba8,
                16,
                16,
                Vec4::ONE,
            )),
        ];
        assert!(storage.set_surfaces(mismatched).is_err());
    }

    #[test]
    fn test_noise_rebuilds_blend_map() {
        let (mut storage, backend) = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();
        let material = storage.material().unwrap();

        assert_eq!(backend.material_param(material, "region_blend_map"), None);

        storage.set_noise_enabled(true);
        match backend.material_param(material, "region_blend_map") {
            Some(UniformValue::Texture(Some(handle))) => {
                assert_eq!(backend.texture_size(handle), Some((512, 512, 1)));
            }
            other => panic!("region_blend_map uniform missing: {other:?}"),
        }

        let code = backend.shader_code(material).unwrap();
        assert!(code.contains("noise_2d"));
    }

    #[test]
    fn test_noise_blend_range_stays_ordered() {
        let (mut storage, _) = test_storage();

        storage.set_noise_blend_far(0.8);
        storage.set_noise_blend_near(0.9);
        assert!(storage.noise_blend_near() <= storage.noise_blend_far());

        storage.set_noise_blend_far(0.2);
        assert!(storage.noise_blend_near() <= storage.noise_blend_far());
    }

    #[test]
    fn test_shader_override_snapshot() {
        let (mut storage, backend) = test_storage();
        let material = storage.material().unwrap();

        storage.enable_shader_override(true);
        assert!(storage.shader_override().is_some());

        storage.set_shader_override(Some("fn fs_main() {}".into()));
        assert_eq!(
            backend.shader_code(material).as_deref(),
            Some("fn fs_main() {}")
        );

        storage.enable_shader_override(false);
        assert_ne!(
            backend.shader_code(material).as_deref(),
            Some("fn fs_main() {}")
        );
    }

    #[test]
    fn test_take_changed_reports_structural_changes() {
        let (mut storage, _) = test_storage();
        assert!(!storage.take_changed());

        storage.add_region(Vec3::ZERO).unwrap();
        assert!(storage.take_changed());
        assert!(!storage.take_changed());
    }

    #[test]
    fn test_scalar_uniforms_follow_region_size() {
        let (mut storage, backend) = test_storage();
        let material = storage.material().unwrap();

        assert_eq!(
            backend.material_param(material, "region_size"),
            Some(UniformValue::Float(64.0))
        );
        storage.set_region_size(RegionSize::Size256);
        assert_eq!(
            backend.material_param(material, "region_size"),
            Some(UniformValue::Float(256.0))
        );
        assert_eq!(
            backend.material_param(material, "region_pixel_size"),
            Some(UniformValue::Float(1.0 / 256.0))
        );
    }
}
