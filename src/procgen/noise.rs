/// Seeded multi-octave noise height field
use crate::config::WorldSettings;
use crate::math::{ramp, Vec3};
use noise::{NoiseFn, Perlin};

/// Finite-difference step used for normals, in world units
pub const NORMAL_EPSILON: f64 = 0.01;

/// Regional layer seed offset, kept clear of the per-octave offsets
const REGIONAL_SEED_OFFSET: u32 = 0x0001_0000;

struct Octave {
    perlin: Perlin,
    frequency: f64,
    amplitude: f64,
}

/// Pure height/normal function of world XZ and a seed.
///
/// Holds only immutable Perlin tables, so it can be shared across threads.
pub struct NoiseField {
    octaves: Vec<Octave>,
    amplitude_sum: f64,
    regional: Option<Perlin>,
    smoothness: f64,
    max_height: f32,
    flat_radius: f64,
    transition_end: f64,
    regional_scale: f64,
    regional_min: f64,
}

impl NoiseField {
    pub fn new(settings: &WorldSettings) -> Self {
        let mut octaves = Vec::with_capacity(settings.octaves as usize);
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        for i in 0..settings.octaves as u32 {
            octaves.push(Octave {
                perlin: Perlin::new(settings.seed.wrapping_add(i)),
                frequency,
                amplitude,
            });
            frequency *= settings.lacunarity as f64;
            amplitude *= settings.persistence as f64;
        }
        let amplitude_sum = octaves.iter().map(|o| o.amplitude).sum();

        let regional = settings
            .regional_modulation
            .then(|| Perlin::new(settings.seed.wrapping_add(REGIONAL_SEED_OFFSET)));

        Self {
            octaves,
            amplitude_sum,
            regional,
            smoothness: settings.smoothness as f64,
            max_height: settings.max_height,
            flat_radius: settings.flat_area_radius as f64,
            transition_end: settings.flat_transition_end as f64,
            regional_scale: settings.regional_scale as f64,
            regional_min: settings.regional_min as f64,
        }
    }

    pub fn max_height(&self) -> f32 {
        self.max_height
    }

    /// Normalized terrain height in [0, 1]
    pub fn height(&self, x: f32, z: f32) -> f32 {
        self.sample(x as f64, z as f64) as f32
    }

    /// Terrain height in meters
    pub fn world_height(&self, x: f32, z: f32) -> f32 {
        self.height(x, z) * self.max_height
    }

    /// Surface normal from a central difference of the world height
    pub fn normal(&self, x: f32, z: f32) -> Vec3 {
        let (x, z) = (x as f64, z as f64);
        let scale = self.max_height as f64;
        let e = NORMAL_EPSILON;

        let dh_dx = (self.sample(x + e, z) - self.sample(x - e, z)) * scale / (2.0 * e);
        let dh_dz = (self.sample(x, z + e) - self.sample(x, z - e)) * scale / (2.0 * e);

        let normal = Vec3::new(-dh_dx as f32, 1.0, -dh_dz as f32).normalize();
        debug_assert!(normal.is_finite(), "non-finite terrain normal at ({}, {})", x, z);
        normal
    }

    fn sample(&self, x: f64, z: f64) -> f64 {
        let radius = (x * x + z * z).sqrt();
        if radius < self.flat_radius {
            return 0.0;
        }

        let mut value = self.normalized_noise(x, z);
        if let Some(regional) = &self.regional {
            let r = regional.get([x / self.regional_scale, z / self.regional_scale]);
            let t = ((r + 1.0) * 0.5).clamp(0.0, 1.0);
            value *= self.regional_min + (1.0 - self.regional_min) * t;
        }

        if radius < self.transition_end {
            value *= ramp(radius as f32, self.flat_radius as f32, self.transition_end as f32) as f64;
        }

        debug_assert!(value.is_finite(), "non-finite terrain height at ({}, {})", x, z);
        value
    }

    /// Octave sum remapped from roughly [-1, 1] to [0, 1]
    fn normalized_noise(&self, x: f64, z: f64) -> f64 {
        let nx = x / self.smoothness;
        let nz = z / self.smoothness;

        let sum: f64 = self
            .octaves
            .iter()
            .map(|o| o.perlin.get([nx * o.frequency, nz * o.frequency]) * o.amplitude)
            .sum();

        ((sum / self.amplitude_sum + 1.0) * 0.5).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(seed: u32) -> NoiseField {
        NoiseField::new(&WorldSettings {
            seed,
            ..WorldSettings::default()
        })
    }

    #[test]
    fn test_deterministic_noise() {
        let a = field(12345);
        let b = field(12345);

        for i in 0..20 {
            let (x, z) = (137.0 + i as f32 * 53.7, -420.0 + i as f32 * 31.1);
            assert_eq!(a.height(x, z).to_bits(), b.height(x, z).to_bits());
            assert_eq!(a.normal(x, z), b.normal(x, z));
        }
    }

    #[test]
    fn test_different_seeds_produce_different_values() {
        let a = field(12345);
        let b = field(54321);

        let found_difference = (0..25).any(|i| {
            let (x, z) = (300.0 + (i % 5) as f32 * 50.0, 300.0 + (i / 5) as f32 * 50.0);
            a.height(x, z) != b.height(x, z)
        });

        assert!(found_difference, "Different seeds should produce different values");
    }

    #[test]
    fn test_height_in_unit_range() {
        let noise = field(42);
        for x in -20..20 {
            for z in -20..20 {
                let h = noise.height(x as f32 * 37.3, z as f32 * 41.9);
                assert!((0.0..=1.0).contains(&h), "height {} out of range", h);
            }
        }
    }

    #[test]
    fn test_spawn_disc_is_flat() {
        let noise = field(7);
        let radius = WorldSettings::default().flat_area_radius;
        for i in 0..50 {
            let angle = i as f32 * 0.37;
            let r = radius * (i as f32 / 50.0);
            assert_eq!(noise.height(r * angle.cos(), r * angle.sin()), 0.0);
        }
        assert_eq!(noise.normal(0.0, 0.0), crate::math::UP);
    }

    #[test]
    fn test_transition_ramp_limits_height() {
        let settings = WorldSettings {
            seed: 99,
            regional_modulation: false,
            ..WorldSettings::default()
        };
        let noise = NoiseField::new(&settings);
        let unramped = NoiseField::new(&WorldSettings {
            flat_area_radius: 0.0,
            flat_transition_end: 0.001,
            ..settings.clone()
        });

        let x = (settings.flat_area_radius + settings.flat_transition_end) * 0.5;
        assert!(noise.height(x, 0.0) <= unramped.height(x, 0.0));

        let beyond = settings.flat_transition_end + 10.0;
        assert_eq!(noise.height(beyond, 0.0), unramped.height(beyond, 0.0));
    }

    #[test]
    fn test_normals_are_unit_and_upward() {
        let noise = field(3);
        for i in 0..30 {
            let n = noise.normal(200.0 + i as f32 * 17.0, -150.0 + i as f32 * 23.0);
            assert!((n.length() - 1.0).abs() < 1e-4);
            assert!(n.y > 0.0);
        }
    }

    #[test]
    fn test_noise_field_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoiseField>();
    }
}
