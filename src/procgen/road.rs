/// Parametric road centerline, elevation profile and banking
use super::hash::{splitmix64, unit_f64};
use super::noise::NoiseField;
use super::world_data::RoadState;
use crate::cache::{BoundedCache, CacheStats};
use crate::config::RoadSettings;
use crate::math::{lerp, ramp, Vec3};
use std::cell::RefCell;
use std::f64::consts::TAU;
use std::sync::Arc;

/// Half-step for the centerline tangent difference, in meters
const TANGENT_DELTA: f32 = 0.5;

/// Road running along +Z whose lateral position and height vary with Z.
///
/// Everything except `elevation` is a pure function of Z. Elevations are
/// memoized at quantized Z keys in a FIFO-bounded cache and interpolated
/// between keys, so a cache hit and a miss return the same value.
pub struct RoadPath {
    noise: Arc<NoiseField>,
    primary_amplitude: f64,
    primary_frequency: f64,
    primary_phase: f64,
    secondary_amplitude: f64,
    secondary_frequency: f64,
    secondary_phase: f64,
    spawn_flat_radius: f32,
    spawn_transition_end: f32,
    sample_distance: f64,
    samples: u32,
    damping: f32,
    bank_factor: f32,
    max_bank: f32,
    precision: f64,
    memo: RefCell<BoundedCache<i64, f32>>,
}

impl RoadPath {
    pub fn new(settings: &RoadSettings, seed: u32, noise: Arc<NoiseField>) -> Self {
        let phase_seed = splitmix64(seed as u64 ^ 0x524F_4144);
        Self {
            noise,
            primary_amplitude: settings.primary_amplitude as f64,
            primary_frequency: settings.primary_frequency as f64,
            primary_phase: unit_f64(phase_seed) * TAU,
            secondary_amplitude: settings.secondary_amplitude as f64,
            secondary_frequency: settings.secondary_frequency as f64,
            secondary_phase: unit_f64(splitmix64(phase_seed)) * TAU,
            spawn_flat_radius: settings.spawn_flat_radius,
            spawn_transition_end: settings.spawn_transition_end,
            sample_distance: settings.elevation_sample_distance as f64,
            samples: settings.elevation_samples,
            damping: settings.elevation_damping,
            bank_factor: settings.bank_factor,
            max_bank: settings.max_bank,
            precision: settings.memo_precision as f64,
            memo: RefCell::new(BoundedCache::new(settings.memo_capacity)),
        }
    }

    /// 0 near spawn, easing to 1 once far enough along the road
    pub fn spawn_envelope(&self, z: f32) -> f32 {
        ramp(z.abs(), self.spawn_flat_radius, self.spawn_transition_end)
    }

    /// Lateral X position of the road center
    pub fn centerline_x(&self, z: f32) -> f32 {
        let envelope = self.spawn_envelope(z);
        if envelope == 0.0 {
            return 0.0;
        }
        let zf = z as f64;
        let curve = self.primary_amplitude * (self.primary_frequency * zf + self.primary_phase).sin()
            + self.secondary_amplitude * (self.secondary_frequency * zf + self.secondary_phase).sin();
        curve as f32 * envelope
    }

    /// Smoothed, damped road height in meters
    pub fn elevation(&self, z: f32) -> f32 {
        let k = z as f64 / self.precision;
        let k0 = k.floor();
        let t = (k - k0) as f32;
        let key = k0 as i64;

        let e0 = self.memoized_elevation(key);
        if t == 0.0 {
            return e0;
        }
        let e1 = self.memoized_elevation(key + 1);
        lerp(e0, e1, t)
    }

    /// 3D centerline position
    pub fn center(&self, z: f32) -> Vec3 {
        Vec3::new(self.centerline_x(z), self.elevation(z), z)
    }

    /// Unit direction of travel along +Z
    pub fn tangent(&self, z: f32) -> Vec3 {
        let ahead = self.center(z + TANGENT_DELTA);
        let behind = self.center(z - TANGENT_DELTA);
        (ahead - behind).normalize()
    }

    /// Lateral tilt in radians.
    ///
    /// Proportional to the centerline's lateral offset rather than to true
    /// path curvature, clamped to `max_bank`.
    pub fn bank_angle(&self, z: f32) -> f32 {
        (self.centerline_x(z) * self.bank_factor).clamp(-self.max_bank, self.max_bank)
    }

    pub fn state(&self, z: f32) -> RoadState {
        RoadState {
            center_position: self.center(z),
            tangent: self.tangent(z),
            bank_angle: self.bank_angle(z),
        }
    }

    pub fn memo_stats(&self) -> CacheStats {
        self.memo.borrow().stats()
    }

    fn memoized_elevation(&self, key: i64) -> f32 {
        if let Some(value) = self.memo.borrow_mut().get(&key) {
            return *value;
        }
        let value = self.compute_elevation(key as f64 * self.precision);
        self.memo.borrow_mut().insert(key, value);
        value
    }

    /// Gaussian-weighted mean of terrain height along the centerline
    fn compute_elevation(&self, z: f64) -> f32 {
        let envelope = self.spawn_envelope(z as f32);
        if envelope == 0.0 {
            return 0.0;
        }

        let sigma = self.sample_distance * 0.5;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for i in 0..self.samples {
            let offset = if self.samples == 1 {
                0.0
            } else {
                -self.sample_distance + 2.0 * self.sample_distance * i as f64 / (self.samples - 1) as f64
            };
            let sz = (z + offset) as f32;
            let weight = (-(offset * offset) / two_sigma_sq).exp();
            weighted += self.noise.world_height(self.centerline_x(sz), sz) as f64 * weight;
            total_weight += weight;
        }

        let elevation = (weighted / total_weight) as f32 * self.damping * envelope;
        debug_assert!(elevation.is_finite(), "non-finite road elevation at z={}", z);
        elevation
    }
}
