use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use apexsim_terrain::procgen::TileCoord;
use apexsim_terrain::streaming::{ExternalHandle, GridKind, ReleaseError, TileReleaser, TileStreamer};
use apexsim_terrain::{TerrainConfig, Vec3};

fn scenario_config() -> TerrainConfig {
    let mut config = TerrainConfig::default();
    config.streaming.tile_size = 32.0;
    config.streaming.resolution = 2;
    config.streaming.view_distance = 160.0;
    config.streaming.physics_tile_size = 16.0;
    config.streaming.physics_resolution = 2;
    config.streaming.physics_distance = 48.0;
    config.vegetation.enabled = false;
    config
}

/// Every tile within `radius` of the observer, found by scanning a wide area
fn brute_force_tiles(observer: Vec3, tile_size: f32, radius: f32) -> BTreeSet<TileCoord> {
    let mut tiles = BTreeSet::new();
    for z in -40..=40 {
        for x in -40..=40 {
            let min_x = x as f32 * tile_size;
            let min_z = z as f32 * tile_size;
            let dx = (min_x - observer.x).max(0.0).max(observer.x - (min_x + tile_size));
            let dz = (min_z - observer.z).max(0.0).max(observer.z - (min_z + tile_size));
            if (dx * dx + dz * dz).sqrt() <= radius {
                tiles.insert(TileCoord::new(x, z));
            }
        }
    }
    tiles
}

fn tile_center(x: i32, z: i32, tile_size: f32) -> Vec3 {
    Vec3::new((x as f32 + 0.5) * tile_size, 0.0, (z as f32 + 0.5) * tile_size)
}

#[derive(Clone, Default)]
struct CountingReleaser {
    calls: Rc<RefCell<HashMap<ExternalHandle, u32>>>,
    reject_next: Rc<RefCell<u32>>,
}

impl TileReleaser for CountingReleaser {
    fn release(&mut self, _grid: GridKind, _coord: TileCoord, handle: ExternalHandle) -> Result<(), ReleaseError> {
        let mut reject = self.reject_next.borrow_mut();
        if *reject > 0 {
            *reject -= 1;
            return Err(ReleaseError::Rejected {
                handle,
                reason: "renderer still uploading".to_string(),
            });
        }
        *self.calls.borrow_mut().entry(handle).or_insert(0) += 1;
        Ok(())
    }
}

#[test]
fn test_move_to_tile_five_five_leaves_exact_active_set() {
    let config = scenario_config();
    let mut streamer = TileStreamer::new(&config).unwrap();

    let start = tile_center(0, 0, 32.0);
    streamer.update(0.016, start);
    let before = streamer.grid(GridKind::Visual).active_keys();
    assert_eq!(before, brute_force_tiles(start, 32.0, 160.0));

    let target = tile_center(5, 5, 32.0);
    let update = streamer.update(0.016, target);
    let expected = brute_force_tiles(target, 32.0, 160.0);
    let after = streamer.grid(GridKind::Visual).active_keys();
    assert_eq!(after, expected);

    let evicted: BTreeSet<TileCoord> = update.visual.evicted.iter().map(|e| e.coord).collect();
    let spawned: BTreeSet<TileCoord> = update.visual.spawned.iter().copied().collect();
    assert_eq!(evicted, before.difference(&expected).copied().collect());
    assert_eq!(spawned, expected.difference(&before).copied().collect());

    let physics_expected = brute_force_tiles(target, 16.0, 48.0);
    assert_eq!(streamer.grid(GridKind::Physics).active_keys(), physics_expected);
}

#[test]
fn test_walk_keeps_active_set_exact_at_every_crossing() {
    let config = scenario_config();
    let mut streamer = TileStreamer::new(&config).unwrap();

    for step in 0..120 {
        let observer = Vec3::new(3.0 + step as f32 * 1.7, 0.0, -20.0 + step as f32 * 2.3);
        let update = streamer.update(0.016, observer);
        if !update.visual.is_empty() {
            assert_eq!(
                streamer.grid(GridKind::Visual).active_keys(),
                brute_force_tiles(observer, 32.0, 160.0),
                "visual set wrong at step {}",
                step
            );
        }
        if !update.physics.is_empty() {
            assert_eq!(
                streamer.grid(GridKind::Physics).active_keys(),
                brute_force_tiles(observer, 16.0, 48.0),
                "physics set wrong at step {}",
                step
            );
        }
    }
}

#[test]
fn test_every_handle_released_exactly_once() {
    let releaser = CountingReleaser::default();
    *releaser.reject_next.borrow_mut() = 3;
    let mut streamer = TileStreamer::new(&scenario_config())
        .unwrap()
        .with_releaser(releaser.clone());

    let mut next_id = 0u64;
    let mut attached = Vec::new();
    let stops = [(0, 0), (5, 5), (0, 0), (-4, 2), (5, 5), (0, 0)];

    for (x, z) in stops {
        streamer.update(0.016, tile_center(x, z, 32.0));
        for kind in [GridKind::Visual, GridKind::Physics] {
            let keys = streamer.grid(kind).active_keys();
            for coord in keys {
                let handle = ExternalHandle(next_id);
                if streamer.attach_handle(kind, coord, handle).is_ok() {
                    attached.push((kind, coord, handle));
                    next_id += 1;
                }
            }
        }
    }

    // Park the observer far away so everything attached leaves both grids
    let far = tile_center(200, 200, 32.0);
    for _ in 0..6 {
        streamer.update(0.016, far);
    }
    assert_eq!(streamer.pending_releases(), 0);

    let calls = releaser.calls.borrow();
    assert_eq!(calls.len(), attached.len());
    assert!(calls.values().all(|count| *count == 1));
}

#[test]
fn test_fresh_streamers_build_identical_tiles() {
    let mut config = scenario_config();
    config.vegetation.enabled = true;
    let mut a = TileStreamer::new(&config).unwrap();
    let mut b = TileStreamer::new(&config).unwrap();

    let observer = tile_center(12, 30, 32.0);
    a.update(0.016, observer);
    b.update(0.016, observer);

    for tile in a.visual_tiles() {
        let other = b.visual_tile(tile.key).unwrap();
        assert_eq!(tile.height_sample().heights, other.height_sample().heights);
        assert_eq!(tile.vegetation(), other.vegetation());
        assert_eq!(tile.visible_blades, other.visible_blades);
    }
}

#[test]
fn test_visual_and_physics_heights_agree() {
    let mut streamer = TileStreamer::new(&scenario_config()).unwrap();
    let observer = tile_center(3, 9, 32.0);
    streamer.update(0.016, observer);

    let terrain = streamer.terrain();
    for tile in streamer.physics_tiles() {
        let sample = tile.height_sample();
        for (i, position) in sample.positions.iter().enumerate() {
            assert_eq!(position.y.to_bits(), terrain.height(position.x, position.z).to_bits());
            assert!((sample.heights[i] * sample.height_scale - position.y).abs() < 1e-4);
        }
    }
}
