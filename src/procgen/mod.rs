/// Procedural world generation module for ApexSim
///
/// This module provides the seeded terrain height field, the parametric road
/// and its blend into the terrain, tile heightfield sampling and vegetation
/// scatter.

pub mod blend;
pub mod environment_presets;
pub mod hash;
pub mod heightfield;
pub mod noise;
pub mod road;
pub mod vegetation;
pub mod world_data;

// Re-export main types for convenience
pub use blend::RoadBlender;
pub use environment_presets::EnvironmentPreset;
pub use heightfield::HeightfieldBuilder;
pub use noise::NoiseField;
pub use road::RoadPath;
pub use vegetation::{SurfaceQuery, VegetationBuffer, VegetationPlacer};
pub use world_data::{BlendResult, HeightSample, RoadState, TileCoord};
