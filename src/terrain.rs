/// Terrain context: owns the noise field, road path and road blender
use crate::cache::CacheStats;
use crate::config::{ConfigError, TerrainConfig};
use crate::math::Vec3;
use crate::procgen::blend::RoadBlender;
use crate::procgen::noise::NoiseField;
use crate::procgen::road::RoadPath;
use crate::procgen::vegetation::SurfaceQuery;
use crate::procgen::world_data::{BlendResult, RoadState};
use std::sync::Arc;

/// One independent terrain instance.
///
/// Two instances built from equal configs answer every query identically.
pub struct Terrain {
    config: TerrainConfig,
    noise: Arc<NoiseField>,
    blender: RoadBlender,
}

impl Terrain {
    pub fn new(config: &TerrainConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let noise = Arc::new(NoiseField::new(&config.world));
        let road = RoadPath::new(&config.road, config.world.seed, Arc::clone(&noise));
        let blender = RoadBlender::new(Arc::clone(&noise), road, &config.road);

        Ok(Self {
            config: config.clone(),
            noise,
            blender,
        })
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn seed(&self) -> u32 {
        self.config.world.seed
    }

    pub fn blender(&self) -> &RoadBlender {
        &self.blender
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Final surface height in meters, road included
    pub fn height(&self, x: f32, z: f32) -> f32 {
        self.blender.height(x, z)
    }

    /// Natural terrain height in meters, ignoring the road
    pub fn base_height(&self, x: f32, z: f32) -> f32 {
        self.noise.world_height(x, z)
    }

    /// Base terrain normal
    pub fn normal(&self, x: f32, z: f32) -> Vec3 {
        self.noise.normal(x, z)
    }

    pub fn road_info(&self, x: f32, z: f32) -> BlendResult {
        self.blender.blend(x, z)
    }

    pub fn road_state(&self, z: f32) -> RoadState {
        self.blender.road().state(z)
    }

    /// Point on the road centerline at `z`, at road height
    pub fn road_center(&self, z: f32) -> Vec3 {
        self.blender.road().center(z)
    }

    pub fn elevation_memo_stats(&self) -> CacheStats {
        self.blender.road().memo_stats()
    }
}

impl SurfaceQuery for Terrain {
    fn height(&self, x: f32, z: f32) -> f32 {
        Terrain::height(self, x, z)
    }

    fn normal(&self, x: f32, z: f32) -> Vec3 {
        Terrain::normal(self, x, z)
    }

    fn road_blend(&self, x: f32, z: f32) -> f32 {
        self.road_info(x, z).blend_factor
    }
}
