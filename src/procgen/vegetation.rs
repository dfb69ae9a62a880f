/// Deterministic ground vegetation scatter over a tile
use super::hash::{hash_tile, hash_tile_item};
use super::world_data::TileCoord;
use crate::config::VegetationSettings;
use crate::math::{Vec3, UP};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Column-major 4x4 object-to-world transform
pub type InstanceTransform = [f32; 16];

/// Surface queries the placer needs from the terrain
pub trait SurfaceQuery {
    fn height(&self, x: f32, z: f32) -> f32;

    fn normal(&self, x: f32, z: f32) -> Vec3;

    /// Road weight in [0, 1]; surfaces without a road report 0
    fn road_blend(&self, _x: f32, _z: f32) -> f32 {
        0.0
    }
}

/// A cluster of blades sharing one placement and orientation basis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VegetationPatch {
    pub center: Vec3,
    pub radius: f32,
    pub normal: Vec3,
    pub blade_count: u32,
    /// Index of this patch's first transform in the tile buffer
    pub first_instance: u32,
}

/// All blade transforms for one tile, stored contiguously per patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationBuffer {
    pub coord: TileCoord,
    pub patches: Vec<VegetationPatch>,
    pub transforms: Vec<InstanceTransform>,
}

impl VegetationBuffer {
    pub fn instance_count(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Transforms to submit when patch `i` shows only `visible[i]` blades
    pub fn visible_transforms<'a>(
        &'a self,
        visible: &'a [u32],
    ) -> impl Iterator<Item = &'a InstanceTransform> + 'a {
        self.patches.iter().zip(visible).flat_map(move |(patch, count)| {
            let start = patch.first_instance as usize;
            let end = start + (*count).min(patch.blade_count) as usize;
            self.transforms[start..end].iter()
        })
    }
}

/// Scatters blades from seeds derived from the tile coordinate.
///
/// Every blade in a patch is aligned to the patch-center normal rather than
/// sampling the normal per blade, so blades can tilt visibly off the surface
/// on strongly curved slopes.
#[derive(Debug, Clone)]
pub struct VegetationPlacer {
    settings: VegetationSettings,
    salt: u64,
    exclusion_radius: f32,
}

impl VegetationPlacer {
    pub fn new(settings: &VegetationSettings, seed: u32, exclusion_radius: f32) -> Self {
        Self {
            settings: settings.clone(),
            salt: ((seed as u64) << 32) | settings.salt as u64,
            exclusion_radius,
        }
    }

    pub fn place_for_tile<S: SurfaceQuery + ?Sized>(
        &self,
        coord: TileCoord,
        origin: (f32, f32),
        tile_size: f32,
        surface: &S,
    ) -> VegetationBuffer {
        let s = &self.settings;
        let mut rng = ChaCha8Rng::seed_from_u64(hash_tile(coord.x, coord.z, self.salt));
        let base_count = rng.gen_range(s.patches_min..=s.patches_max);
        let patch_count = (base_count as f32 * s.density).round() as u32;

        let mut buffer = VegetationBuffer {
            coord,
            patches: Vec::new(),
            transforms: Vec::new(),
        };

        for patch_index in 0..patch_count {
            // Draw every random value up front so rejections don't shift later patches
            let offset_x = rng.gen::<f32>() * tile_size;
            let offset_z = rng.gen::<f32>() * tile_size;
            let radius = rng.gen_range(s.patch_radius_min..=s.patch_radius_max);

            let cx = origin.0 + offset_x;
            let cz = origin.1 + offset_z;

            if (cx * cx + cz * cz).sqrt() - radius < self.exclusion_radius {
                continue;
            }
            let normal = surface.normal(cx, cz);
            if normal.y < s.min_normal_y {
                continue;
            }
            if surface.road_blend(cx, cz) > s.max_road_blend {
                continue;
            }

            let mut patch_rng =
                ChaCha8Rng::seed_from_u64(hash_tile_item(coord.x, coord.z, self.salt, patch_index));
            let blade_count = patch_rng.gen_range(s.blades_min..=s.blades_max);
            let first_instance = buffer.transforms.len() as u32;

            for _ in 0..blade_count {
                // sqrt keeps the disk uniform instead of clustering at the center
                let r = patch_rng.gen::<f32>().sqrt() * radius;
                let theta = patch_rng.gen::<f32>() * std::f32::consts::TAU;
                let yaw = patch_rng.gen::<f32>() * std::f32::consts::TAU;
                let scale = patch_rng.gen_range(s.scale_min..=s.scale_max);

                let bx = cx + r * theta.cos();
                let bz = cz + r * theta.sin();
                let position = Vec3::new(bx, surface.height(bx, bz), bz);
                buffer.transforms.push(blade_transform(position, normal, yaw, scale));
            }

            buffer.patches.push(VegetationPatch {
                center: Vec3::new(cx, surface.height(cx, cz), cz),
                radius,
                normal,
                blade_count,
                first_instance,
            });
        }

        buffer
    }

    /// Blade-count multiplier for a patch `distance` meters from the observer
    pub fn lod_factor(&self, distance: f32) -> f32 {
        let s = &self.settings;
        if distance <= s.lod_near {
            1.0
        } else if distance >= s.lod_far {
            s.lod_min_factor
        } else {
            let t = (distance - s.lod_near) / (s.lod_far - s.lod_near);
            1.0 + (s.lod_min_factor - 1.0) * t
        }
    }

    /// Visible blade count per patch for an observer at (x, z)
    pub fn visible_counts(&self, buffer: &VegetationBuffer, observer_x: f32, observer_z: f32) -> Vec<u32> {
        buffer
            .patches
            .iter()
            .map(|patch| {
                let dx = patch.center.x - observer_x;
                let dz = patch.center.z - observer_z;
                let factor = self.lod_factor((dx * dx + dz * dz).sqrt());
                ((patch.blade_count as f32 * factor).ceil() as u32).min(patch.blade_count)
            })
            .collect()
    }
}

/// Yaw around local up, tilt local up onto `normal`, then scale uniformly
fn blade_transform(position: Vec3, normal: Vec3, yaw: f32, scale: f32) -> InstanceTransform {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let mut x_axis = Vec3::new(cos_yaw, 0.0, -sin_yaw);
    let mut z_axis = Vec3::new(sin_yaw, 0.0, cos_yaw);

    let tilt_axis = UP.cross(&normal);
    let sin_tilt = tilt_axis.length();
    if sin_tilt > 1e-6 {
        let axis = tilt_axis * (1.0 / sin_tilt);
        let angle = sin_tilt.atan2(UP.dot(&normal));
        x_axis = x_axis.rotate_about(&axis, angle);
        z_axis = z_axis.rotate_about(&axis, angle);
    }

    let x = x_axis * scale;
    let y = normal * scale;
    let z = z_axis * scale;
    #[rustfmt::skip]
    let matrix = [
        x.x, x.y, x.z, 0.0,
        y.x, y.y, y.z, 0.0,
        z.x, z.y, z.z, 0.0,
        position.x, position.y, position.z, 1.0,
    ];
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plane {
        height: f32,
        normal: Vec3,
        road: f32,
    }

    impl SurfaceQuery for Plane {
        fn height(&self, _x: f32, _z: f32) -> f32 {
            self.height
        }

        fn normal(&self, _x: f32, _z: f32) -> Vec3 {
            self.normal
        }

        fn road_blend(&self, _x: f32, _z: f32) -> f32 {
            self.road
        }
    }

    fn level() -> Plane {
        Plane {
            height: 3.0,
            normal: UP,
            road: 0.0,
        }
    }

    fn placer() -> VegetationPlacer {
        VegetationPlacer::new(&VegetationSettings::default(), 12345, 60.0)
    }

    const FAR_TILE: TileCoord = TileCoord::new(10, 10);
    const FAR_ORIGIN: (f32, f32) = (640.0, 640.0);

    #[test]
    fn test_placement_is_deterministic() {
        let a = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level());
        let b = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level());
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_tiles_and_seeds_differ() {
        let a = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level());
        let b = placer().place_for_tile(TileCoord::new(11, 10), (704.0, 640.0), 64.0, &level());
        assert_ne!(a.transforms, b.transforms);

        let other_seed = VegetationPlacer::new(&VegetationSettings::default(), 777, 60.0);
        let c = other_seed.place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level());
        assert_ne!(a.transforms, c.transforms);
    }

    #[test]
    fn test_spawn_exclusion_yields_no_patches() {
        let placer = VegetationPlacer::new(&VegetationSettings::default(), 1, 200.0);
        let buffer = placer.place_for_tile(TileCoord::new(0, 0), (0.0, 0.0), 64.0, &level());
        assert!(buffer.patches.is_empty());
        assert!(buffer.transforms.is_empty());
    }

    #[test]
    fn test_blades_stay_outside_exclusion_radius() {
        let placer = placer();
        for coord in [TileCoord::new(0, 0), TileCoord::new(-1, 0), TileCoord::new(0, -1)] {
            let origin = coord.world_origin(64.0);
            let buffer = placer.place_for_tile(coord, origin, 64.0, &level());
            for t in &buffer.transforms {
                assert!((t[12] * t[12] + t[14] * t[14]).sqrt() >= 60.0 - 1e-3);
            }
        }
    }

    #[test]
    fn test_steep_slopes_yield_no_patches() {
        let steep = Plane {
            height: 0.0,
            normal: Vec3::new(0.8, 0.6, 0.0),
            road: 0.0,
        };
        let buffer = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &steep);
        assert!(buffer.patches.is_empty());
    }

    #[test]
    fn test_road_surface_yields_no_patches() {
        let road = Plane {
            height: 0.0,
            normal: UP,
            road: 1.0,
        };
        let buffer = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &road);
        assert!(buffer.patches.is_empty());
    }

    #[test]
    fn test_patch_layout_is_contiguous() {
        let buffer = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level());
        let settings = VegetationSettings::default();
        let mut expected_first = 0;
        for patch in &buffer.patches {
            assert_eq!(patch.first_instance, expected_first);
            assert!(patch.blade_count >= settings.blades_min && patch.blade_count <= settings.blades_max);
            expected_first += patch.blade_count;

            let start = patch.first_instance as usize;
            for t in &buffer.transforms[start..start + patch.blade_count as usize] {
                let dx = t[12] - patch.center.x;
                let dz = t[14] - patch.center.z;
                assert!((dx * dx + dz * dz).sqrt() <= patch.radius + 1e-3);
                assert_eq!(t[13], 3.0);
            }
        }
        assert_eq!(expected_first as usize, buffer.instance_count());
    }

    #[test]
    fn test_blade_up_axis_follows_patch_normal() {
        let tilted_normal = Vec3::new(0.3, 0.9, 0.1).normalize();
        let tilted = Plane {
            height: 0.0,
            normal: tilted_normal,
            road: 0.0,
        };
        let buffer = placer().place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &tilted);
        assert!(!buffer.is_empty());
        for t in &buffer.transforms {
            let y_axis = Vec3::new(t[4], t[5], t[6]);
            let x_axis = Vec3::new(t[0], t[1], t[2]);
            let scale = y_axis.length();
            let dir = y_axis * (1.0 / scale);
            assert!((dir.dot(&tilted_normal) - 1.0).abs() < 1e-4);
            assert!(x_axis.dot(&y_axis).abs() < 1e-4);
            assert!((x_axis.length() - scale).abs() < 1e-4);
        }
    }

    #[test]
    fn test_density_scales_patch_count() {
        let sparse = VegetationPlacer::new(
            &VegetationSettings {
                density: 0.0,
                ..VegetationSettings::default()
            },
            12345,
            60.0,
        );
        assert!(sparse.place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level()).patches.is_empty());
    }

    #[test]
    fn test_lod_factor_falls_off_with_distance() {
        let placer = placer();
        let s = VegetationSettings::default();
        assert_eq!(placer.lod_factor(0.0), 1.0);
        assert_eq!(placer.lod_factor(s.lod_near), 1.0);
        assert_eq!(placer.lod_factor(s.lod_far + 100.0), s.lod_min_factor);

        let mid = placer.lod_factor((s.lod_near + s.lod_far) * 0.5);
        assert!(mid < 1.0 && mid > s.lod_min_factor);
    }

    #[test]
    fn test_visible_counts_and_transforms() {
        let placer = placer();
        let buffer = placer.place_for_tile(FAR_TILE, FAR_ORIGIN, 64.0, &level());

        let near = placer.visible_counts(&buffer, 672.0, 672.0);
        assert_eq!(near.iter().sum::<u32>() as usize, buffer.instance_count());
        assert_eq!(buffer.visible_transforms(&near).count(), buffer.instance_count());

        let far = placer.visible_counts(&buffer, -5000.0, -5000.0);
        let far_total: u32 = far.iter().sum();
        assert!((far_total as usize) < buffer.instance_count());
        assert!(far.iter().zip(&buffer.patches).all(|(c, p)| *c >= 1 && *c <= p.blade_count));
        assert_eq!(buffer.visible_transforms(&far).count(), far_total as usize);
    }
}
