//! Terrain editing engine: tools, operations and brush rasterization.
//!
//! One `operate` call per input update. Map tools run on continuous updates
//! (drags) and share a single rotation draw across the whole footprint; the
//! region tool runs once per discrete gesture.

use std::f32::consts::PI;

use glam::{IVec2, Vec2, Vec3, Vec4};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::core::Result;
use crate::terrain::brush::{Brush, BrushConfig};
use crate::terrain::map::{MapImage, MapType};
use crate::terrain::storage::{TerrainStorage, TERRAIN_MAX_HEIGHT};

/// What the active brush edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Add or remove whole regions
    Region,
    #[default]
    Height,
    /// Paints the control map
    Texture,
    Color,
}

impl Tool {
    /// Map type this tool writes, if any
    pub fn map_type(&self) -> Option<MapType> {
        match self {
            Tool::Region => None,
            Tool::Height => Some(MapType::Height),
            Tool::Texture => Some(MapType::Control),
            Tool::Color => Some(MapType::Color),
        }
    }
}

/// How a stroke combines with existing map values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Add,
    Subtract,
    Multiply,
    Replace,
}

/// Editor engine driving a [`TerrainStorage`]
pub struct TerrainEditor {
    tool: Tool,
    operation: Operation,
    brush: Option<Brush>,
    operation_position: Option<Vec3>,
    operation_interval: f32,
    rng: SmallRng,
}

impl TerrainEditor {
    pub fn new() -> Self {
        Self {
            tool: Tool::default(),
            operation: Operation::default(),
            brush: None,
            operation_position: None,
            operation_interval: 0.0,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Editor with deterministic jitter, for reproducible strokes
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Decode and validate brush parameters with their falloff mask
    pub fn set_brush_data(&mut self, config: &BrushConfig, falloff: MapImage) -> Result<()> {
        self.brush = Some(Brush::new(config, falloff)?);
        Ok(())
    }

    /// Like `set_brush_data`, from a JSON config payload
    pub fn set_brush_data_json(&mut self, json: &str, falloff: MapImage) -> Result<()> {
        let config = BrushConfig::from_json(json)?;
        self.set_brush_data(&config, falloff)
    }

    pub fn brush(&self) -> Option<&Brush> {
        self.brush.as_ref()
    }

    /// Distance between the last two operate calls of the current stroke
    pub fn operation_interval(&self) -> f32 {
        self.operation_interval
    }

    /// Apply the active tool at a world position.
    ///
    /// `continuous` is true while a drag gesture is in progress; the first
    /// call of a stroke passes false and resets the position tracker.
    pub fn operate(
        &mut self,
        storage: &mut TerrainStorage,
        position: Vec3,
        camera_yaw: f32,
        continuous: bool,
    ) {
        if !continuous {
            self.operation_position = None;
        }
        self.operation_interval = self
            .operation_position
            .map(|last| last.distance(position))
            .unwrap_or(0.0);
        self.operation_position = Some(position);

        match self.tool {
            Tool::Region => {
                if !continuous {
                    self.operate_region(storage, position);
                }
            }
            Tool::Height | Tool::Texture | Tool::Color => {
                if continuous {
                    if let Some(map_type) = self.tool.map_type() {
                        self.operate_map(storage, map_type, position, camera_yaw);
                    }
                }
            }
        }
    }

    fn operate_region(&mut self, storage: &mut TerrainStorage, position: Vec3) {
        let has_region = storage.has_region(position);

        match self.operation {
            Operation::Add => {
                if !has_region {
                    if let Err(e) = storage.add_region(position) {
                        log::debug!("Region add skipped: {e}");
                    }
                }
            }
            Operation::Subtract => {
                if has_region {
                    if let Err(e) = storage.remove_region(position) {
                        log::debug!("Region remove skipped: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn operate_map(
        &mut self,
        storage: &mut TerrainStorage,
        map_type: MapType,
        position: Vec3,
        camera_yaw: f32,
    ) {
        let Some(brush) = self.brush.as_ref() else {
            return;
        };
        let region_size = storage.region_size() as i32;
        if storage.get_region_index(position).is_none() {
            return;
        }

        let s = brush.size() as i32;
        let index = brush.index();
        let mask_size = brush.falloff_size();
        let o = brush.opacity();
        let h = brush.height() / TERRAIN_MAX_HEIGHT;
        let g = brush.gamma();

        // One rotation draw per stroke update, shared by the footprint
        let randf: f32 = self.rng.random();
        let mut rot = randf * PI * brush.jitter();
        if brush.is_aligned_to_view() {
            rot += camera_yaw;
        }

        for x in 0..s {
            for y in 0..s {
                let brush_offset = IVec2::new(x, y) - IVec2::splat(s) / 2;
                let brush_position = Vec3::new(
                    position.x + brush_offset.x as f32,
                    position.y,
                    position.z + brush_offset.y as f32,
                );

                // Re-resolve the region per cell so the active tile always
                // matches the cell; stale tiles across boundaries corrupt
                // neighboring regions.
                let region_index = match storage.get_region_index(brush_position) {
                    Some(i) => i,
                    None => {
                        if !brush.auto_regions_enabled() {
                            continue;
                        }
                        if storage.add_region(brush_position).is_err() {
                            continue;
                        }
                        match storage.get_region_index(brush_position) {
                            Some(i) => i,
                            None => continue,
                        }
                    }
                };

                let uv = region_uv(brush_position, region_size);
                let map_pixel = (uv * region_size as f32).as_ivec2();
                if !is_in_bounds(map_pixel, IVec2::splat(region_size)) {
                    continue;
                }

                let brush_uv = Vec2::new(x as f32, y as f32) / s as f32;
                let brush_pixel = (rotate_uv(brush_uv, rot) * mask_size).as_ivec2();
                if !is_in_bounds(brush_pixel, mask_size.as_ivec2()) {
                    continue;
                }

                let alpha = brush.alpha(brush_pixel).powf(g);
                let Some(map) = storage.map_mut(map_type, region_index) else {
                    continue;
                };
                let src = map.get_pixel(map_pixel.x as u32, map_pixel.y as u32);
                let dest = match map_type {
                    MapType::Height => height_operation(self.operation, src, h, alpha, o),
                    MapType::Control => control_operation(self.operation, src, index, alpha, o),
                    MapType::Color => color_operation(src, brush.color(), alpha, o),
                };
                map.put_pixel(map_pixel.x as u32, map_pixel.y as u32, dest);
            }
        }

        storage.force_update_maps(Some(map_type));
    }
}

impl Default for TerrainEditor {
    fn default() -> Self {
        Self::new()
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn is_in_bounds(position: IVec2, max: IVec2) -> bool {
    position.x >= 0 && position.y >= 0 && position.x < max.x && position.y < max.y
}

/// Fractional position of a world point within its region, in [0, 1)
fn region_uv(position: Vec3, region_size: i32) -> Vec2 {
    let p = Vec2::new(position.x, position.z) / region_size as f32 + Vec2::splat(0.5);
    p - p.floor()
}

/// Rotate a [0,1]² uv about the mask center, clamped back into [0,1]
fn rotate_uv(uv: Vec2, angle: f32) -> Vec2 {
    let center = Vec2::splat(0.5);
    let rotated = Vec2::from_angle(angle).rotate(uv - center) + center;
    rotated.clamp(Vec2::ZERO, Vec2::ONE)
}

fn height_operation(operation: Operation, src: Vec4, h: f32, alpha: f32, opacity: f32) -> Vec4 {
    let srcf = src.x;
    let destf = match operation {
        Operation::Add => srcf + h * alpha * opacity,
        Operation::Subtract => srcf - h * alpha * opacity,
        Operation::Multiply => srcf * (alpha * h * opacity + 1.0),
        Operation::Replace => lerp(srcf, h, alpha),
    };
    Vec4::new(destf.clamp(0.0, 1.0), 0.0, 0.0, 1.0)
}

fn control_operation(operation: Operation, src: Vec4, index: u8, alpha: f32, opacity: f32) -> Vec4 {
    let alpha_clip = if alpha < 0.1 { 0.0 } else { 1.0 };
    let index_base = (src.x * 255.0).round() as i32;
    let index_overlay = (src.y * 255.0).round() as i32;
    let mut dest = src;

    match operation {
        Operation::Add => {
            let dest_index = lerp(index_overlay as f32, index as f32, alpha_clip).round() as i32;
            if dest_index == index_base {
                // Painting the base surface again: fade out the overlay
                dest.z = lerp(src.z, 0.0, alpha_clip);
            } else {
                dest.y = dest_index as f32 / 255.0;
                dest.z = lerp(src.z, (src.z + opacity * alpha).clamp(0.0, 1.0), alpha_clip);
            }
        }
        Operation::Replace => {
            let dest_index = lerp(index_base as f32, index as f32, alpha_clip).round() as i32;
            dest.x = dest_index as f32 / 255.0;
            dest.z = lerp(src.z, 0.0, alpha_clip);
        }
        _ => {}
    }
    dest
}

fn color_operation(src: Vec4, tint: Vec3, alpha: f32, opacity: f32) -> Vec4 {
    let mix = (alpha * opacity).clamp(0.0, 1.0);
    Vec4::new(
        lerp(src.x, tint.x, mix),
        lerp(src.y, tint.y, mix),
        lerp(src.z, tint.z, mix),
        src.w,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use crate::terrain::map::PixelFormat;
    use crate::terrain::storage::RegionSize;

    fn test_storage() -> TerrainStorage {
        let mut storage = TerrainStorage::new(Box::new(HeadlessBackend::new()));
        storage.set_region_size(RegionSize::Size64);
        storage
    }

    fn flat_mask() -> MapImage {
        MapImage::filled(PixelFormat::Rf, 64, 64, Vec4::ONE)
    }

    fn zero_mask() -> MapImage {
        MapImage::filled(PixelFormat::Rf, 64, 64, Vec4::new(0.0, 0.0, 0.0, 1.0))
    }

    fn editor_with(config: BrushConfig, mask: MapImage) -> TerrainEditor {
        let mut editor = TerrainEditor::with_seed(7);
        editor.set_brush_data(&config, mask).unwrap();
        editor
    }

    fn count_height_pixels(storage: &TerrainStorage, region: usize, value: f32) -> usize {
        let map = storage.get_map(MapType::Height, region).unwrap();
        let mut count = 0;
        for y in 0..map.height() {
            for x in 0..map.width() {
                if (map.get_pixel(x, y).x - value).abs() < 1e-6 {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn test_region_tool_add_and_subtract() {
        let mut storage = test_storage();
        let mut editor = editor_with(BrushConfig::default(), flat_mask());
        editor.set_tool(Tool::Region);

        editor.set_operation(Operation::Add);
        editor.operate(&mut storage, Vec3::ZERO, 0.0, false);
        assert_eq!(storage.region_count(), 1);

        editor.operate(&mut storage, Vec3::new(100.0, 0.0, 0.0), 0.0, false);
        assert_eq!(storage.region_count(), 2);

        editor.set_operation(Operation::Subtract);
        editor.operate(&mut storage, Vec3::ZERO, 0.0, false);
        assert_eq!(storage.region_count(), 1);
        assert_eq!(storage.region_offsets()[0], IVec2::new(2, 0));
    }

    #[test]
    fn test_region_tool_ignores_continuous_updates() {
        let mut storage = test_storage();
        let mut editor = editor_with(BrushConfig::default(), flat_mask());
        editor.set_tool(Tool::Region);
        editor.set_operation(Operation::Add);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);
        assert_eq!(storage.region_count(), 0);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, false);
        assert_eq!(storage.region_count(), 1);
    }

    #[test]
    fn test_height_replace_full_alpha_hits_target() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 4,
            height: TERRAIN_MAX_HEIGHT * 0.5,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        // alpha=1, gamma=1 replace writes the height fraction exactly
        assert_eq!(count_height_pixels(&storage, 0, 0.5), 16);
    }

    #[test]
    fn test_zero_alpha_leaves_pixels_unchanged() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 4,
            height: TERRAIN_MAX_HEIGHT,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, zero_mask());
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        assert_eq!(count_height_pixels(&storage, 0, 0.0), 64 * 64);
    }

    #[test]
    fn test_height_add_and_subtract_clamp() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 2,
            height: TERRAIN_MAX_HEIGHT,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Height);

        editor.set_operation(Operation::Add);
        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);
        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);
        assert_eq!(count_height_pixels(&storage, 0, 1.0), 4);

        editor.set_operation(Operation::Subtract);
        for _ in 0..3 {
            editor.operate(&mut storage, Vec3::ZERO, 0.0, true);
        }
        assert_eq!(count_height_pixels(&storage, 0, 0.0), 64 * 64);
    }

    #[test]
    fn test_footprint_skips_missing_regions() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        // Footprint reaching past the region edge: cells falling in the
        // neighboring, absent region are skipped, not substituted.
        let config = BrushConfig {
            size: 8,
            height: TERRAIN_MAX_HEIGHT,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);

        // Region spans x in [-32, 32); offsets -4..3 around x=31 put three
        // columns beyond the edge
        editor.operate(&mut storage, Vec3::new(31.0, 0.0, 0.0), 0.0, true);

        assert_eq!(storage.region_count(), 1);
        assert_eq!(count_height_pixels(&storage, 0, 1.0), 5 * 8);
    }

    #[test]
    fn test_footprint_auto_creates_regions() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 8,
            height: TERRAIN_MAX_HEIGHT,
            auto_regions: true,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);

        editor.operate(&mut storage, Vec3::new(31.0, 0.0, 0.0), 0.0, true);

        assert_eq!(storage.region_count(), 2);
        assert_eq!(storage.region_offsets()[1], IVec2::new(1, 0));
        assert_eq!(
            count_height_pixels(&storage, 0, 1.0) + count_height_pixels(&storage, 1, 1.0),
            8 * 8
        );
    }

    #[test]
    fn test_no_op_without_center_region() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 4,
            height: TERRAIN_MAX_HEIGHT,
            auto_regions: true,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);

        // Stroke centered far outside any region: whole update is a no-op,
        // even with auto regions on.
        editor.operate(&mut storage, Vec3::new(300.0, 0.0, 300.0), 0.0, true);
        assert_eq!(storage.region_count(), 1);
    }

    #[test]
    fn test_control_add_paints_overlay_and_blend() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 2,
            index: 3,
            opacity: 0.5,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Texture);
        editor.set_operation(Operation::Add);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        let map = storage.get_map(MapType::Control, 0).unwrap();
        let px = map.get_pixel(31, 31);
        assert_eq!((px.y * 255.0).round() as i32, 3);
        assert!((px.z - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_control_add_collapses_self_overlay() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        // Base index 3 everywhere, with a partially blended overlay
        let mut tile = MapImage::for_map_type(MapType::Control, 64);
        tile.fill(Vec4::new(3.0 / 255.0, 7.0 / 255.0, 0.8, 1.0));
        storage.set_map(MapType::Control, 0, tile).unwrap();

        let config = BrushConfig {
            size: 2,
            index: 3,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Texture);
        editor.set_operation(Operation::Add);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        // Painting the base index drives the blend toward zero instead of
        // raising a self-overlay
        let map = storage.get_map(MapType::Control, 0).unwrap();
        let px = map.get_pixel(31, 31);
        assert_eq!((px.x * 255.0).round() as i32, 3);
        assert_eq!(px.z, 0.0);
    }

    #[test]
    fn test_control_replace_overwrites_base() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let mut tile = MapImage::for_map_type(MapType::Control, 64);
        tile.fill(Vec4::new(1.0 / 255.0, 5.0 / 255.0, 0.6, 1.0));
        storage.set_map(MapType::Control, 0, tile).unwrap();

        let config = BrushConfig {
            size: 2,
            index: 9,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Texture);
        editor.set_operation(Operation::Replace);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        let map = storage.get_map(MapType::Control, 0).unwrap();
        let px = map.get_pixel(31, 31);
        assert_eq!((px.x * 255.0).round() as i32, 9);
        assert_eq!(px.z, 0.0);
    }

    #[test]
    fn test_control_multiply_and_subtract_are_no_ops() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let fill = Vec4::new(2.0 / 255.0, 4.0 / 255.0, 0.3, 1.0);
        let mut tile = MapImage::for_map_type(MapType::Control, 64);
        tile.fill(fill);
        storage.set_map(MapType::Control, 0, tile).unwrap();

        for operation in [Operation::Multiply, Operation::Subtract] {
            let config = BrushConfig {
                size: 2,
                index: 9,
                ..BrushConfig::default()
            };
            let mut editor = editor_with(config, flat_mask());
            editor.set_tool(Tool::Texture);
            editor.set_operation(operation);
            editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

            let map = storage.get_map(MapType::Control, 0).unwrap();
            let px = map.get_pixel(31, 31);
            assert_eq!((px.x * 255.0).round() as i32, 2);
            assert_eq!((px.y * 255.0).round() as i32, 4);
        }
    }

    #[test]
    fn test_color_tint_blend() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 2,
            opacity: 0.5,
            color: [1.0, 0.0, 0.0],
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Color);
        editor.set_operation(Operation::Replace);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        // White tile blended halfway toward red
        let map = storage.get_map(MapType::Color, 0).unwrap();
        let px = map.get_pixel(31, 31);
        assert_eq!(px.x, 1.0);
        assert!((px.y - 0.5).abs() < 0.01);
        assert!((px.z - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_map_tools_require_continuous_updates() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let config = BrushConfig {
            size: 4,
            height: TERRAIN_MAX_HEIGHT,
            ..BrushConfig::default()
        };
        let mut editor = editor_with(config, flat_mask());
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, false);
        assert_eq!(count_height_pixels(&storage, 0, 1.0), 0);
    }

    #[test]
    fn test_operation_interval_resets_per_stroke() {
        let mut storage = test_storage();
        let mut editor = editor_with(BrushConfig::default(), flat_mask());
        editor.set_tool(Tool::Height);

        editor.operate(&mut storage, Vec3::ZERO, 0.0, false);
        assert_eq!(editor.operation_interval(), 0.0);

        editor.operate(&mut storage, Vec3::new(3.0, 0.0, 4.0), 0.0, true);
        assert_eq!(editor.operation_interval(), 5.0);

        // New stroke: tracker resets even at a distant position
        editor.operate(&mut storage, Vec3::new(100.0, 0.0, 100.0), 0.0, false);
        assert_eq!(editor.operation_interval(), 0.0);
    }

    #[test]
    fn test_operate_without_brush_is_no_op() {
        let mut storage = test_storage();
        storage.add_region(Vec3::ZERO).unwrap();

        let mut editor = TerrainEditor::with_seed(1);
        editor.set_tool(Tool::Height);
        editor.set_operation(Operation::Replace);
        editor.operate(&mut storage, Vec3::ZERO, 0.0, true);

        assert_eq!(count_height_pixels(&storage, 0, 0.0), 64 * 64);
    }

    #[test]
    fn test_rotate_uv_identity_and_clamp() {
        let uv = Vec2::new(0.25, 0.75);
        let same = rotate_uv(uv, 0.0);
        assert!((same - uv).length() < 1e-6);

        let spun = rotate_uv(Vec2::new(1.0, 1.0), PI / 4.0);
        assert!(spun.x >= 0.0 && spun.x <= 1.0);
        assert!(spun.y >= 0.0 && spun.y <= 1.0);
    }

    #[test]
    fn test_region_uv_wraps_into_unit_square() {
        let uv = region_uv(Vec3::new(0.0, 0.0, 0.0), 64);
        assert!((uv - Vec2::splat(0.5)).length() < 1e-6);

        let uv = region_uv(Vec3::new(-33.0, 0.0, 95.0), 64);
        assert!(uv.x >= 0.0 && uv.x < 1.0);
        assert!(uv.y >= 0.0 && uv.y < 1.0);
    }
}
