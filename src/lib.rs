pub mod cache;
pub mod config;
pub mod math;
pub mod procgen;
pub mod streaming;
pub mod terrain;

pub use config::{ConfigError, TerrainConfig};
pub use math::Vec3;
pub use streaming::{
    ExternalHandle, GridEvents, GridKind, ReleaseError, StreamUpdate, TileReleaser, TileRecord, TileStreamer,
};
pub use terrain::Terrain;
