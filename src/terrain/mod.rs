//! Region-tiled terrain storage, sculpting and material synthesis.
//!
//! Terrain is a sparse grid of fixed-size regions addressed by world
//! position, each holding co-registered height, control and color rasters.
//! An editor brush mutates the rasters; derived GPU textures and the
//! terrain shader are regenerated lazily.

pub mod map;
pub mod surface;
pub mod generated;
pub mod shader;
pub mod brush;
pub mod storage;
pub mod editor;
pub mod data;

pub use map::{MapImage, MapType, PixelFormat};
pub use surface::Surface;
pub use generated::Generated;
pub use shader::{generate_shader_code, ShaderFeatures};
pub use brush::{Brush, BrushConfig};
pub use storage::{RegionSize, TerrainStorage, REGION_MAP_SIZE, TERRAIN_MAX_HEIGHT};
pub use editor::{Operation, TerrainEditor, Tool};
pub use data::{TerrainData, TERRAIN_DATA_VERSION, TERRAIN_FILE_EXTENSION};
