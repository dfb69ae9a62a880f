/// Environment preset definitions for different biomes
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Terrain character applied on top of a base configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPreset {
    /// World units per noise unit for the base terrain
    pub smoothness: f32,
    /// Maximum terrain height in meters
    pub max_height: f32,
    /// Noise octaves; more octaves add fine detail
    pub octaves: u8,
    /// Floor of the regional flat/hilly modulation
    pub regional_min: f32,
    /// Multiplier on vegetation patch counts
    pub vegetation_density: f32,
    /// Steepest ground vegetation may grow on, as a normal Y component
    pub min_normal_y: f32,
}

impl EnvironmentPreset {
    /// Dunes: broad, low and sparse
    pub fn desert() -> Self {
        Self {
            smoothness: 260.0,
            max_height: 15.0,
            octaves: 3,
            regional_min: 0.5,
            vegetation_density: 0.2,
            min_normal_y: 0.9,
        }
    }

    pub fn forest() -> Self {
        Self {
            smoothness: 160.0,
            max_height: 40.0,
            octaves: 5,
            regional_min: 0.35,
            vegetation_density: 1.6,
            min_normal_y: 0.75,
        }
    }

    pub fn mountains() -> Self {
        Self {
            smoothness: 140.0,
            max_height: 90.0,
            octaves: 6,
            regional_min: 0.25,
            vegetation_density: 0.6,
            min_normal_y: 0.85,
        }
    }

    pub fn plains() -> Self {
        Self {
            smoothness: 240.0,
            max_height: 20.0,
            octaves: 4,
            regional_min: 0.4,
            vegetation_density: 1.2,
            min_normal_y: 0.8,
        }
    }

    /// Countryside rolling hills
    pub fn country() -> Self {
        Self {
            smoothness: 180.0,
            max_height: 35.0,
            octaves: 4,
            regional_min: 0.35,
            vegetation_density: 1.0,
            min_normal_y: 0.8,
        }
    }

    /// Manicured, mostly flat
    pub fn park() -> Self {
        Self {
            smoothness: 300.0,
            max_height: 8.0,
            octaves: 3,
            regional_min: 0.6,
            vegetation_density: 1.4,
            min_normal_y: 0.7,
        }
    }
}

/// Load all environment presets keyed by name
pub fn load_presets() -> HashMap<String, EnvironmentPreset> {
    let mut presets = HashMap::new();

    presets.insert("desert".to_string(), EnvironmentPreset::desert());
    presets.insert("forest".to_string(), EnvironmentPreset::forest());
    presets.insert("mountains".to_string(), EnvironmentPreset::mountains());
    presets.insert("plains".to_string(), EnvironmentPreset::plains());
    presets.insert("country".to_string(), EnvironmentPreset::country());
    presets.insert("park".to_string(), EnvironmentPreset::park());

    presets
}

/// Get a specific environment preset by name (case insensitive)
pub fn get_preset(environment_type: &str) -> Option<EnvironmentPreset> {
    match environment_type.to_lowercase().as_str() {
        "desert" => Some(EnvironmentPreset::desert()),
        "forest" => Some(EnvironmentPreset::forest()),
        "mountains" => Some(EnvironmentPreset::mountains()),
        "plains" => Some(EnvironmentPreset::plains()),
        "country" => Some(EnvironmentPreset::country()),
        "park" => Some(EnvironmentPreset::park()),
        _ => None,
    }
}
