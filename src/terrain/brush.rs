//! Sculpting brush parameters and falloff mask.
//!
//! A brush is decoded once per editor update from a [`BrushConfig`] and is
//! immutable for the duration of a stroke. Unknown or missing config keys
//! are rejected at this boundary, not deep in the stroke loop.

use glam::{IVec2, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::terrain::map::{MapImage, PixelFormat};
use crate::terrain::storage::TERRAIN_MAX_HEIGHT;

/// Validated brush parameters, as supplied by the editor UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrushConfig {
    /// Footprint edge length in world units (one pixel per unit)
    pub size: u32,
    /// Surface index painted by the texture tool
    pub index: u8,
    /// Stroke strength, 0..1
    pub opacity: f32,
    /// Falloff curve exponent
    pub gamma: f32,
    /// Height target in world units
    pub height: f32,
    /// Random per-stroke rotation amount, 0..1
    pub jitter: f32,
    /// RGB tint painted by the color tool
    pub color: [f32; 3],
    /// Add the camera yaw to the stroke rotation
    pub align_to_view: bool,
    /// Create missing regions touched by the footprint
    pub auto_regions: bool,
}

impl BrushConfig {
    /// Decode from JSON, rejecting unknown keys
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::BrushData(e.to_string()))
    }

    /// Range-check every field
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::BrushData("size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(Error::BrushData(format!(
                "opacity {} outside 0..1",
                self.opacity
            )));
        }
        if self.gamma <= 0.0 {
            return Err(Error::BrushData(format!(
                "gamma {} must be positive",
                self.gamma
            )));
        }
        if !(0.0..=TERRAIN_MAX_HEIGHT).contains(&self.height) {
            return Err(Error::BrushData(format!(
                "height {} outside 0..{TERRAIN_MAX_HEIGHT}",
                self.height
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::BrushData(format!(
                "jitter {} outside 0..1",
                self.jitter
            )));
        }
        if self.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(Error::BrushData("color channels outside 0..1".into()));
        }
        Ok(())
    }
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            size: 16,
            index: 0,
            opacity: 1.0,
            gamma: 1.0,
            height: 10.0,
            jitter: 0.0,
            color: [1.0, 1.0, 1.0],
            align_to_view: false,
            auto_regions: false,
        }
    }
}

/// Immutable per-stroke parameter bundle with its falloff mask
#[derive(Debug, Clone)]
pub struct Brush {
    size: u32,
    index: u8,
    opacity: f32,
    gamma: f32,
    height: f32,
    jitter: f32,
    color: Vec3,
    align_to_view: bool,
    auto_regions: bool,
    falloff: MapImage,
    falloff_size: Vec2,
}

impl Brush {
    /// Build a brush from validated config and a grayscale falloff mask
    pub fn new(config: &BrushConfig, falloff: MapImage) -> Result<Self> {
        config.validate()?;
        if falloff.width() == 0 || falloff.height() == 0 {
            return Err(Error::BrushData("falloff image is empty".into()));
        }
        let falloff_size = Vec2::new(falloff.width() as f32, falloff.height() as f32);
        Ok(Self {
            size: config.size,
            index: config.index,
            opacity: config.opacity,
            gamma: config.gamma,
            height: config.height,
            jitter: config.jitter,
            color: Vec3::from_array(config.color),
            align_to_view: config.align_to_view,
            auto_regions: config.auto_regions,
            falloff,
            falloff_size,
        })
    }

    /// A smooth radial mask, full strength at the center and zero at the rim
    pub fn radial_falloff(resolution: u32) -> MapImage {
        let mut mask = MapImage::new(PixelFormat::Rf, resolution, resolution);
        let center = Vec2::splat(resolution as f32 / 2.0);
        for y in 0..resolution {
            for x in 0..resolution {
                let pos = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let dist = pos.distance(center) / (resolution as f32 / 2.0);
                let t = (1.0 - dist).clamp(0.0, 1.0);
                let alpha = t * t * (3.0 - 2.0 * t);
                mask.put_pixel(x, y, Vec4::new(alpha, 0.0, 0.0, 1.0));
            }
        }
        mask
    }

    /// Falloff strength at a mask pixel
    pub fn alpha(&self, pixel: IVec2) -> f32 {
        self.falloff.get_pixel(pixel.x as u32, pixel.y as u32).x
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn jitter(&self) -> f32 {
        self.jitter
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn is_aligned_to_view(&self) -> bool {
        self.align_to_view
    }

    pub fn auto_regions_enabled(&self) -> bool {
        self.auto_regions
    }

    /// Falloff mask dimensions in pixels
    pub fn falloff_size(&self) -> Vec2 {
        self.falloff_size
    }
}
