//! Terrain data serialization and storage.
//!
//! The persisted form is the region directory itself: the ordered offset
//! list plus the three index-aligned tile lists. Pixels survive the round
//! trip bit-identically; LZ4 is lossless and payloads are raw channel data.

use rkyv::{Archive, Deserialize, Serialize};
use std::io;
use std::path::Path;

use glam::IVec2;

use crate::terrain::map::{MapImage, MapType, PixelFormat};
use crate::terrain::storage::{RegionSize, TerrainStorage};

/// Current version of terrain data format
pub const TERRAIN_DATA_VERSION: u32 = 1;

/// File extension for terrain data files
pub const TERRAIN_FILE_EXTENSION: &str = "rlf";

/// One raster tile as raw channel bytes
#[derive(Archive, Deserialize, Serialize)]
pub struct RasterPayload {
    /// [`PixelFormat`] tag
    pub format: u8,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterPayload {
    fn from_image(image: &MapImage) -> Self {
        Self {
            format: image.format() as u8,
            width: image.width(),
            height: image.height(),
            data: image.raw_bytes(),
        }
    }

    fn to_image(&self) -> Result<MapImage, io::Error> {
        let format = PixelFormat::try_from(self.format)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        MapImage::from_raw_bytes(format, self.width, self.height, &self.data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

/// Serializable terrain snapshot with metadata
#[derive(Archive, Deserialize, Serialize)]
pub struct TerrainData {
    /// Format version for compatibility
    pub version: u32,
    /// Tile edge length shared by every region
    pub region_size: u32,
    /// Region grid offsets, in directory order
    pub region_offsets: Vec<[i32; 2]>,
    /// Height tiles, index-aligned with the offsets
    pub height_maps: Vec<RasterPayload>,
    /// Control tiles, index-aligned with the offsets
    pub control_maps: Vec<RasterPayload>,
    /// Color tiles, index-aligned with the offsets
    pub color_maps: Vec<RasterPayload>,
}

impl TerrainData {
    /// Snapshot the storage's region directory
    pub fn from_storage(storage: &TerrainStorage) -> Self {
        let payloads = |map_type: MapType| -> Vec<RasterPayload> {
            storage
                .get_maps(map_type)
                .iter()
                .map(RasterPayload::from_image)
                .collect()
        };
        Self {
            version: TERRAIN_DATA_VERSION,
            region_size: storage.region_size(),
            region_offsets: storage.region_offsets().iter().map(|o| [o.x, o.y]).collect(),
            height_maps: payloads(MapType::Height),
            control_maps: payloads(MapType::Control),
            color_maps: payloads(MapType::Color),
        }
    }

    /// Restore this snapshot into the storage, re-deriving every cache
    pub fn apply(&self, storage: &mut TerrainStorage) -> Result<(), io::Error> {
        let count = self.region_offsets.len();
        if self.height_maps.len() != count
            || self.control_maps.len() != count
            || self.color_maps.len() != count
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "tile lists ({}, {}, {}) do not match {count} region offsets",
                    self.height_maps.len(),
                    self.control_maps.len(),
                    self.color_maps.len()
                ),
            ));
        }
        let region_size = RegionSize::try_from(self.region_size)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let decode = |payloads: &[RasterPayload]| -> Result<Vec<MapImage>, io::Error> {
            payloads.iter().map(|p| p.to_image()).collect()
        };
        let height_maps = decode(&self.height_maps)?;
        let control_maps = decode(&self.control_maps)?;
        let color_maps = decode(&self.color_maps)?;

        storage.set_region_size(region_size);
        storage.set_region_offsets(
            self.region_offsets
                .iter()
                .map(|o| IVec2::new(o[0], o[1]))
                .collect(),
        );
        for (map_type, maps) in [
            (MapType::Height, height_maps),
            (MapType::Control, control_maps),
            (MapType::Color, color_maps),
        ] {
            storage
                .set_maps(map_type, maps)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        }
        Ok(())
    }

    /// Serialize to compressed bytes (rkyv + LZ4)
    pub fn to_bytes(&self) -> Result<Vec<u8>, io::Error> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(lz4_flex::compress_prepend_size(&bytes))
    }

    /// Deserialize from compressed bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, io::Error> {
        let decompressed = lz4_flex::decompress_size_prepended(data).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("LZ4 decompression failed: {}", e),
            )
        })?;

        let archived = rkyv::access::<ArchivedTerrainData, rkyv::rancor::Error>(&decompressed)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let terrain_data: TerrainData =
            rkyv::deserialize::<TerrainData, rkyv::rancor::Error>(archived)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        if terrain_data.version != TERRAIN_DATA_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Terrain data version mismatch: expected {}, got {}",
                    TERRAIN_DATA_VERSION, terrain_data.version
                ),
            ));
        }

        Ok(terrain_data)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), io::Error> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
    }

    /// Load from file
    pub fn load(path: &Path) -> Result<Self, io::Error> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
