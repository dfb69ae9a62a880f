use crate::procgen::environment_presets::EnvironmentPreset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub world: WorldSettings,
    pub road: RoadSettings,
    pub streaming: StreamingSettings,
    pub vegetation: VegetationSettings,
    pub logging: LoggingSettings,
}

/// Base terrain noise parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub seed: u32,
    /// World units per noise unit; larger values give broader hills
    pub smoothness: f32,
    /// Height in meters of a normalized sample of 1.0
    pub max_height: f32,
    pub octaves: u8,
    pub persistence: f32,
    pub lacunarity: f32,
    /// Radius of the perfectly flat spawn disc
    pub flat_area_radius: f32,
    /// Radius where the spawn ramp reaches full terrain height
    pub flat_transition_end: f32,
    pub regional_modulation: bool,
    /// World units per noise unit of the regional layer
    pub regional_scale: f32,
    /// Lowest multiplier the regional layer applies
    pub regional_min: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadSettings {
    pub half_width: f32,
    pub shoulder_width: f32,
    pub transition_width: f32,
    pub spawn_flat_radius: f32,
    pub spawn_transition_end: f32,
    pub primary_amplitude: f32,
    pub primary_frequency: f32,
    pub secondary_amplitude: f32,
    pub secondary_frequency: f32,
    /// Half-length of the elevation smoothing window
    pub elevation_sample_distance: f32,
    pub elevation_samples: u32,
    pub elevation_damping: f32,
    /// Bank angle in radians per meter of lateral centerline offset
    pub bank_factor: f32,
    pub max_bank: f32,
    pub memo_capacity: usize,
    pub memo_precision: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    pub tile_size: f32,
    pub resolution: u32,
    pub view_distance: f32,
    pub physics_tile_size: f32,
    pub physics_resolution: u32,
    pub physics_distance: f32,
    /// Seconds a newly admitted visual tile takes to reach full opacity
    pub fade_duration: f32,
    pub visual_cache_capacity: usize,
    pub physics_cache_capacity: usize,
    /// Seconds an evicted tile stays reusable in the recent cache
    pub cache_ttl_secs: f32,
    /// World units per texture repeat
    pub uv_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VegetationSettings {
    pub enabled: bool,
    pub salt: u32,
    /// Multiplier on the patch count range
    pub density: f32,
    pub patches_min: u32,
    pub patches_max: u32,
    pub patch_radius_min: f32,
    pub patch_radius_max: f32,
    pub blades_min: u32,
    pub blades_max: u32,
    /// Patches whose center normal is flatter than this are skipped
    pub min_normal_y: f32,
    /// Patches whose center road blend exceeds this are skipped
    pub max_road_blend: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    pub lod_near: f32,
    pub lod_far: f32,
    pub lod_min_factor: f32,
    /// Seconds between level-of-detail refreshes
    pub lod_interval: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            world: WorldSettings::default(),
            road: RoadSettings::default(),
            streaming: StreamingSettings::default(),
            vegetation: VegetationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            seed: 12345,
            smoothness: 180.0,
            max_height: 40.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            flat_area_radius: 40.0,
            flat_transition_end: 120.0,
            regional_modulation: true,
            regional_scale: 4000.0,
            regional_min: 0.35,
        }
    }
}

impl Default for RoadSettings {
    fn default() -> Self {
        Self {
            half_width: 6.0,
            shoulder_width: 2.0,
            transition_width: 14.0,
            spawn_flat_radius: 60.0,
            spawn_transition_end: 220.0,
            primary_amplitude: 45.0,
            primary_frequency: 0.004,
            secondary_amplitude: 12.0,
            secondary_frequency: 0.013,
            elevation_sample_distance: 60.0,
            elevation_samples: 13,
            elevation_damping: 0.6,
            bank_factor: 0.002,
            max_bank: 0.12,
            memo_capacity: 4096,
            memo_precision: 0.5,
        }
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            tile_size: 64.0,
            resolution: 32,
            view_distance: 320.0,
            physics_tile_size: 16.0,
            physics_resolution: 16,
            physics_distance: 48.0,
            fade_duration: 0.6,
            visual_cache_capacity: 24,
            physics_cache_capacity: 32,
            cache_ttl_secs: 10.0,
            uv_scale: 8.0,
        }
    }
}

impl Default for VegetationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            salt: 0x5EED_6A55,
            density: 1.0,
            patches_min: 4,
            patches_max: 10,
            patch_radius_min: 1.5,
            patch_radius_max: 4.0,
            blades_min: 24,
            blades_max: 64,
            min_normal_y: 0.8,
            max_road_blend: 0.0,
            scale_min: 0.7,
            scale_max: 1.3,
            lod_near: 60.0,
            lod_far: 240.0,
            lod_min_factor: 0.15,
            lod_interval: 0.25,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TerrainConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: TerrainConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config {}: {}, using defaults", path.display(), e);
            Self::default()
        })
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Overlay an environment preset's terrain character onto this config
    pub fn apply_preset(&mut self, preset: &EnvironmentPreset) {
        self.world.smoothness = preset.smoothness;
        self.world.max_height = preset.max_height;
        self.world.octaves = preset.octaves;
        self.world.regional_min = preset.regional_min;
        self.vegetation.density = preset.vegetation_density;
        self.vegetation.min_normal_y = preset.min_normal_y;
    }

    /// Apply a named preset such as `"desert"` or `"forest"`
    pub fn with_preset(mut self, name: &str) -> Result<Self, ConfigError> {
        let preset = crate::procgen::environment_presets::get_preset(name)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown environment preset '{}'", name)))?;
        self.apply_preset(&preset);
        Ok(self)
    }

    /// Reject configurations that would produce NaN/Inf geometry or break
    /// the visual/physics grid relationship.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.world;
        positive("world.smoothness", w.smoothness)?;
        positive("world.max_height", w.max_height)?;
        positive("world.lacunarity", w.lacunarity)?;
        positive("world.persistence", w.persistence)?;
        if w.octaves == 0 {
            return invalid("world.octaves must be at least 1");
        }
        non_negative("world.flat_area_radius", w.flat_area_radius)?;
        if w.flat_transition_end <= w.flat_area_radius {
            return invalid("world.flat_transition_end must be greater than world.flat_area_radius");
        }
        positive("world.regional_scale", w.regional_scale)?;
        unit_interval("world.regional_min", w.regional_min)?;

        let r = &self.road;
        positive("road.half_width", r.half_width)?;
        non_negative("road.shoulder_width", r.shoulder_width)?;
        positive("road.transition_width", r.transition_width)?;
        non_negative("road.spawn_flat_radius", r.spawn_flat_radius)?;
        if r.spawn_transition_end <= r.spawn_flat_radius {
            return invalid("road.spawn_transition_end must be greater than road.spawn_flat_radius");
        }
        positive("road.elevation_sample_distance", r.elevation_sample_distance)?;
        if r.elevation_samples == 0 {
            return invalid("road.elevation_samples must be at least 1");
        }
        if !(r.elevation_damping > 0.0 && r.elevation_damping < 1.0) {
            return invalid("road.elevation_damping must be in (0, 1)");
        }
        non_negative("road.max_bank", r.max_bank)?;
        if r.memo_capacity == 0 {
            return invalid("road.memo_capacity must be at least 1");
        }
        positive("road.memo_precision", r.memo_precision)?;

        let s = &self.streaming;
        positive("streaming.tile_size", s.tile_size)?;
        positive("streaming.physics_tile_size", s.physics_tile_size)?;
        positive("streaming.view_distance", s.view_distance)?;
        positive("streaming.physics_distance", s.physics_distance)?;
        positive("streaming.uv_scale", s.uv_scale)?;
        non_negative("streaming.fade_duration", s.fade_duration)?;
        non_negative("streaming.cache_ttl_secs", s.cache_ttl_secs)?;
        if s.resolution == 0 || s.physics_resolution == 0 {
            return invalid("streaming resolutions must be at least 1");
        }
        if s.physics_tile_size >= s.tile_size {
            return invalid("streaming.physics_tile_size must be smaller than streaming.tile_size");
        }
        if s.physics_distance >= s.view_distance {
            return invalid("streaming.physics_distance must be smaller than streaming.view_distance");
        }

        let v = &self.vegetation;
        non_negative("vegetation.density", v.density)?;
        if v.patches_min > v.patches_max {
            return invalid("vegetation.patches_min must not exceed vegetation.patches_max");
        }
        if v.blades_min > v.blades_max {
            return invalid("vegetation.blades_min must not exceed vegetation.blades_max");
        }
        positive("vegetation.patch_radius_min", v.patch_radius_min)?;
        if v.patch_radius_min > v.patch_radius_max {
            return invalid("vegetation.patch_radius_min must not exceed vegetation.patch_radius_max");
        }
        positive("vegetation.scale_min", v.scale_min)?;
        if v.scale_min > v.scale_max {
            return invalid("vegetation.scale_min must not exceed vegetation.scale_max");
        }
        unit_interval("vegetation.min_normal_y", v.min_normal_y)?;
        unit_interval("vegetation.max_road_blend", v.max_road_blend)?;
        unit_interval("vegetation.lod_min_factor", v.lod_min_factor)?;
        non_negative("vegetation.lod_near", v.lod_near)?;
        if v.lod_far <= v.lod_near {
            return invalid("vegetation.lod_far must be greater than vegetation.lod_near");
        }
        non_negative("vegetation.lod_interval", v.lod_interval)?;

        Ok(())
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.to_string()))
}

fn positive(name: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
    }
}

fn non_negative(name: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be non-negative, got {}", name, value)))
    }
}

fn unit_interval(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procgen::environment_presets::get_preset;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = TerrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.seed, 12345);
        assert!(config.streaming.tile_size > config.streaming.physics_tile_size);
        assert!(config.streaming.view_distance > config.streaming.physics_distance);
    }

    #[test]
    fn test_with_preset_by_name() {
        let config = TerrainConfig::default().with_preset("Mountains").unwrap();
        assert_eq!(config.world.max_height, get_preset("mountains").unwrap().max_height);
        assert!(config.validate().is_ok());

        assert!(matches!(
            TerrainConfig::default().with_preset("swamp"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = TerrainConfig::default();
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("tile_size"));
        assert!(toml_str.contains("half_width"));

        let parsed: TerrainConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[world]\nseed = 7\n\n[streaming]\ntile_size = 128.0").unwrap();

        let config = TerrainConfig::load(file.path()).unwrap();
        assert_eq!(config.world.seed, 7);
        assert_eq!(config.streaming.tile_size, 128.0);
        assert_eq!(config.road.half_width, RoadSettings::default().half_width);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("terrain.toml");
        let config = TerrainConfig::load(path).unwrap();
        assert_eq!(config, TerrainConfig::default());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = TerrainConfig::load_or_default("/nonexistent/terrain.toml");
        assert_eq!(config, TerrainConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[road]\ntransition_width = 0.0").unwrap();

        match TerrainConfig::load(file.path()) {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("transition_width")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_width_transition_is_rejected() {
        let mut config = TerrainConfig::default();
        config.world.flat_transition_end = config.world.flat_area_radius;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_physics_grid_must_be_smaller() {
        let mut config = TerrainConfig::default();
        config.streaming.physics_tile_size = config.streaming.tile_size;
        assert!(config.validate().is_err());

        let mut config = TerrainConfig::default();
        config.streaming.physics_distance = config.streaming.view_distance + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_vegetation_ranges_are_rejected() {
        let mut config = TerrainConfig::default();
        config.vegetation.blades_min = 100;
        config.vegetation.blades_max = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_preset() {
        let mut config = TerrainConfig::default();
        let mountains = get_preset("mountains").unwrap();
        config.apply_preset(&mountains);

        assert_eq!(config.world.max_height, mountains.max_height);
        assert_eq!(config.vegetation.density, mountains.vegetation_density);
        assert!(config.validate().is_ok());
    }
}
