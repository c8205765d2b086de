//! Error types for the Relief engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("region already exists at offset ({0}, {1})")]
    RegionExists(i32, i32),

    #[error("region offset ({0}, {1}) exceeds the region map bounds")]
    RegionCapacity(i32, i32),

    #[error("no region at the given position")]
    RegionNotFound,

    #[error("the last remaining region cannot be removed")]
    LastRegion,

    #[error("map index {index} is out of bounds for {count} maps")]
    MapIndex { index: usize, count: usize },

    #[error("expected {expected} maps to match the region directory, got {actual}")]
    MapCount { expected: usize, actual: usize },

    #[error("invalid region size: {0}")]
    RegionSize(u32),

    #[error("surface textures do not have the same size: {0}")]
    SurfaceTextureSize(String),

    #[error("invalid brush data: {0}")]
    BrushData(String),

    #[error("terrain data: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
