//! Raster map tiles and their pixel formats.
//!
//! Every region owns one tile per [`MapType`], all of identical dimensions.
//! Tiles expose a uniform `Vec4`-valued pixel API regardless of storage
//! format, so the brush blend math reads the same for every layer.

use glam::Vec4;
use image::imageops::{self, FilterType};
use image::{GrayAlphaImage, ImageBuffer, Luma, LumaA, Rgba, RgbaImage};

use crate::core::{Error, Result};

/// Single-channel f32 buffer (height data, region blend weights)
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The three co-registered raster layers of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapType {
    /// Single-channel elevation, 0..1 spans zero to max terrain height
    Height,
    /// Surface selection: r = base index, g = overlay index, b = blend
    Control,
    /// RGB albedo tint, alpha reserved
    Color,
}

impl MapType {
    /// Storage format for tiles of this map type
    pub fn format(&self) -> PixelFormat {
        match self {
            MapType::Height => PixelFormat::Rf,
            MapType::Control => PixelFormat::Rgba8,
            MapType::Color => PixelFormat::Rgba8,
        }
    }

    /// Fill color for freshly created tiles
    pub fn fill_color(&self) -> Vec4 {
        match self {
            MapType::Height => Vec4::new(0.0, 0.0, 0.0, 1.0),
            MapType::Control => Vec4::new(0.0, 0.0, 0.0, 1.0),
            MapType::Color => Vec4::ONE,
        }
    }
}

/// Pixel storage format of a [`MapImage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// One f32 channel
    Rf = 0,
    /// Two u8 channels
    Rg8 = 1,
    /// Four u8 channels
    Rgba8 = 2,
}

impl TryFrom<u8> for PixelFormat {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PixelFormat::Rf),
            1 => Ok(PixelFormat::Rg8),
            2 => Ok(PixelFormat::Rgba8),
            _ => Err(Error::Data(format!("unknown pixel format tag {value}"))),
        }
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

fn from_u8(v: u8) -> f32 {
    v as f32 / 255.0
}

/// One 2D raster tile.
///
/// Channels absent from the storage format read as 0 (alpha as 1) and are
/// dropped on write, mirroring how narrow formats behave in the host image
/// library.
#[derive(Debug, Clone)]
pub enum MapImage {
    Rf(FloatImage),
    Rg8(GrayAlphaImage),
    Rgba8(RgbaImage),
}

impl MapImage {
    /// Create a tile of the given format, filled with zeroes
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        match format {
            PixelFormat::Rf => MapImage::Rf(FloatImage::new(width, height)),
            PixelFormat::Rg8 => MapImage::Rg8(GrayAlphaImage::new(width, height)),
            PixelFormat::Rgba8 => MapImage::Rgba8(RgbaImage::new(width, height)),
        }
    }

    /// Create a tile filled with the given color
    pub fn filled(format: PixelFormat, width: u32, height: u32, color: Vec4) -> Self {
        let mut image = Self::new(format, width, height);
        image.fill(color);
        image
    }

    /// Default tile for a map type at the given region size
    pub fn for_map_type(map_type: MapType, region_size: u32) -> Self {
        Self::filled(
            map_type.format(),
            region_size,
            region_size,
            map_type.fill_color(),
        )
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            MapImage::Rf(_) => PixelFormat::Rf,
            MapImage::Rg8(_) => PixelFormat::Rg8,
            MapImage::Rgba8(_) => PixelFormat::Rgba8,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            MapImage::Rf(img) => img.width(),
            MapImage::Rg8(img) => img.width(),
            MapImage::Rgba8(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            MapImage::Rf(img) => img.height(),
            MapImage::Rg8(img) => img.height(),
            MapImage::Rgba8(img) => img.height(),
        }
    }

    /// Read a pixel as normalized RGBA
    pub fn get_pixel(&self, x: u32, y: u32) -> Vec4 {
        match self {
            MapImage::Rf(img) => {
                let Luma([v]) = *img.get_pixel(x, y);
                Vec4::new(v, 0.0, 0.0, 1.0)
            }
            MapImage::Rg8(img) => {
                let LumaA([r, g]) = *img.get_pixel(x, y);
                Vec4::new(from_u8(r), from_u8(g), 0.0, 1.0)
            }
            MapImage::Rgba8(img) => {
                let Rgba([r, g, b, a]) = *img.get_pixel(x, y);
                Vec4::new(from_u8(r), from_u8(g), from_u8(b), from_u8(a))
            }
        }
    }

    /// Write a pixel from normalized RGBA
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Vec4) {
        match self {
            MapImage::Rf(img) => img.put_pixel(x, y, Luma([color.x])),
            MapImage::Rg8(img) => {
                img.put_pixel(x, y, LumaA([to_u8(color.x), to_u8(color.y)]))
            }
            MapImage::Rgba8(img) => img.put_pixel(
                x,
                y,
                Rgba([
                    to_u8(color.x),
                    to_u8(color.y),
                    to_u8(color.z),
                    to_u8(color.w),
                ]),
            ),
        }
    }

    /// Fill the whole tile with one color
    pub fn fill(&mut self, color: Vec4) {
        match self {
            MapImage::Rf(img) => {
                for p in img.pixels_mut() {
                    *p = Luma([color.x]);
                }
            }
            MapImage::Rg8(img) => {
                let px = LumaA([to_u8(color.x), to_u8(color.y)]);
                for p in img.pixels_mut() {
                    *p = px;
                }
            }
            MapImage::Rgba8(img) => {
                let px = Rgba([
                    to_u8(color.x),
                    to_u8(color.y),
                    to_u8(color.z),
                    to_u8(color.w),
                ]);
                for p in img.pixels_mut() {
                    *p = px;
                }
            }
        }
    }

    /// Resample to new dimensions with the named filter
    pub fn resized(&self, width: u32, height: u32, filter: FilterType) -> MapImage {
        match self {
            MapImage::Rf(img) => MapImage::Rf(imageops::resize(img, width, height, filter)),
            MapImage::Rg8(img) => MapImage::Rg8(imageops::resize(img, width, height, filter)),
            MapImage::Rgba8(img) => MapImage::Rgba8(imageops::resize(img, width, height, filter)),
        }
    }

    /// Raw channel data as bytes, row-major
    pub fn raw_bytes(&self) -> Vec<u8> {
        match self {
            MapImage::Rf(img) => bytemuck::cast_slice(img.as_raw().as_slice()).to_vec(),
            MapImage::Rg8(img) => img.as_raw().clone(),
            MapImage::Rgba8(img) => img.as_raw().clone(),
        }
    }

    /// Rebuild a tile from raw channel bytes produced by [`Self::raw_bytes`]
    pub fn from_raw_bytes(
        format: PixelFormat,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<MapImage> {
        let pixels = (width as usize) * (height as usize);
        let expected = match format {
            PixelFormat::Rf => pixels * 4,
            PixelFormat::Rg8 => pixels * 2,
            PixelFormat::Rgba8 => pixels * 4,
        };
        if data.len() != expected {
            return Err(Error::Data(format!(
                "raster payload is {} bytes, expected {expected} for {width}x{height} {format:?}",
                data.len()
            )));
        }
        let image = match format {
            PixelFormat::Rf => {
                let floats: Vec<f32> = bytemuck::pod_collect_to_vec(data);
                FloatImage::from_raw(width, height, floats).map(MapImage::Rf)
            }
            PixelFormat::Rg8 => {
                GrayAlphaImage::from_raw(width, height, data.to_vec()).map(MapImage::Rg8)
            }
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(width, height, data.to_vec()).map(MapImage::Rgba8)
            }
        };
        image.ok_or_else(|| Error::Data("raster payload does not fit its dimensions".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_type_formats() {
        assert_eq!(MapType::Height.format(), PixelFormat::Rf);
        assert_eq!(MapType::Control.format(), PixelFormat::Rgba8);
        assert_eq!(MapType::Color.format(), PixelFormat::Rgba8);
    }

    #[test]
    fn test_filled_tile_reads_back_fill_color() {
        let img = MapImage::for_map_type(MapType::Color, 8);
        assert_eq!(img.width(), 8);
        assert_eq!(img.height(), 8);
        assert_eq!(img.get_pixel(0, 0), Vec4::ONE);
        assert_eq!(img.get_pixel(7, 7), Vec4::ONE);
    }

    #[test]
    fn test_height_pixel_roundtrip_is_exact() {
        let mut img = MapImage::new(PixelFormat::Rf, 4, 4);
        img.put_pixel(2, 1, Vec4::new(0.123456, 0.0, 0.0, 1.0));
        assert_eq!(img.get_pixel(2, 1).x, 0.123456);
    }

    #[test]
    fn test_rgba8_quantizes_to_nearest_step() {
        let mut img = MapImage::new(PixelFormat::Rgba8, 2, 2);
        img.put_pixel(0, 0, Vec4::new(3.0 / 255.0, 0.5, 1.0, 1.0));
        let px = img.get_pixel(0, 0);
        assert_eq!((px.x * 255.0).round() as i32, 3);
        assert_eq!(px.z, 1.0);
    }

    #[test]
    fn test_rg8_drops_extra_channels() {
        let mut img = MapImage::new(PixelFormat::Rg8, 2, 2);
        img.put_pixel(1, 1, Vec4::new(0.5, 1.0, 0.7, 0.2));
        let px = img.get_pixel(1, 1);
        assert_eq!(px.y, 1.0);
        assert_eq!(px.z, 0.0);
        assert_eq!(px.w, 1.0);
    }

    #[test]
    fn test_resized_changes_dimensions() {
        let img = MapImage::filled(PixelFormat::Rf, 16, 16, Vec4::new(0.25, 0.0, 0.0, 1.0));
        let resized = img.resized(64, 64, FilterType::Lanczos3);
        assert_eq!(resized.width(), 64);
        assert_eq!(resized.height(), 64);
        assert_eq!(resized.format(), PixelFormat::Rf);
    }

    #[test]
    fn test_raw_bytes_roundtrip_bit_identical() {
        let mut img = MapImage::new(PixelFormat::Rf, 3, 3);
        img.put_pixel(0, 0, Vec4::new(0.123456789, 0.0, 0.0, 1.0));
        img.put_pixel(2, 2, Vec4::new(-4.5, 0.0, 0.0, 1.0));

        let bytes = img.raw_bytes();
        let restored = MapImage::from_raw_bytes(PixelFormat::Rf, 3, 3, &bytes).unwrap();

        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(img.get_pixel(x, y), restored.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_from_raw_bytes_rejects_bad_length() {
        let err = MapImage::from_raw_bytes(PixelFormat::Rgba8, 4, 4, &[0u8; 7]);
        assert!(err.is_err());
    }

    #[test]
    fn test_pixel_format_tag_roundtrip() {
        for format in [PixelFormat::Rf, PixelFormat::Rg8, PixelFormat::Rgba8] {
            assert_eq!(PixelFormat::try_from(format as u8).unwrap(), format);
        }
        assert!(PixelFormat::try_from(9u8).is_err());
    }
}
