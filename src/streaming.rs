/// Observer-driven tile streaming for the visual and physics grids
use crate::cache::{BoundedCache, CacheStats};
use crate::config::{ConfigError, StreamingSettings, TerrainConfig};
use crate::math::Vec3;
use crate::procgen::heightfield::HeightfieldBuilder;
use crate::procgen::vegetation::{InstanceTransform, VegetationBuffer, VegetationPlacer};
use crate::procgen::world_data::{HeightSample, TileCoord};
use crate::terrain::Terrain;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridKind {
    /// Large render tiles out to the view distance
    Visual,
    /// Small collision tiles close to the observer
    Physics,
}

impl fmt::Display for GridKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridKind::Visual => write!(f, "visual"),
            GridKind::Physics => write!(f, "physics"),
        }
    }
}

/// Opaque id of a render mesh or collision body the host built for a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalHandle(pub u64);

impl fmt::Display for ExternalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Handle {handle} rejected: {reason}")]
    Rejected { handle: ExternalHandle, reason: String },
}

/// Disposes of the host objects owned by evicted tiles.
///
/// Each handle is passed here until one call succeeds; after that it is
/// never seen again.
pub trait TileReleaser {
    fn release(&mut self, grid: GridKind, coord: TileCoord, handle: ExternalHandle) -> Result<(), ReleaseError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeState {
    FadingIn { opacity: f32 },
    Active,
}

impl FadeState {
    pub fn opacity(&self) -> f32 {
        match self {
            FadeState::FadingIn { opacity } => *opacity,
            FadeState::Active => 1.0,
        }
    }

    fn advance(self, dt: f32, duration: f32) -> Self {
        match self {
            FadeState::FadingIn { opacity } => {
                let next = if duration > 0.0 { opacity + dt / duration } else { 1.0 };
                if next >= 1.0 {
                    FadeState::Active
                } else {
                    FadeState::FadingIn { opacity: next }
                }
            }
            FadeState::Active => FadeState::Active,
        }
    }
}

/// Generated content of one tile, shared between the active set and the
/// recent cache
#[derive(Debug)]
pub struct TileData {
    pub heights: HeightSample,
    pub vegetation: Option<VegetationBuffer>,
}

#[derive(Debug)]
pub struct TileRecord {
    pub key: TileCoord,
    pub world_origin: (f32, f32),
    pub fade: FadeState,
    pub data: Arc<TileData>,
    pub handle: Option<ExternalHandle>,
    /// Visible blade count per vegetation patch after LOD
    pub visible_blades: Vec<u32>,
}

impl TileRecord {
    pub fn fade_opacity(&self) -> f32 {
        self.fade.opacity()
    }

    pub fn height_sample(&self) -> &HeightSample {
        &self.data.heights
    }

    pub fn vegetation(&self) -> Option<&VegetationBuffer> {
        self.data.vegetation.as_ref()
    }

    /// Blade transforms to draw this frame
    pub fn visible_transforms(&self) -> impl Iterator<Item = &InstanceTransform> + '_ {
        self.data
            .vegetation
            .iter()
            .flat_map(move |buffer| buffer.visible_transforms(&self.visible_blades))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedTile {
    pub coord: TileCoord,
    /// Set only when no releaser is installed; the host must dispose of it
    pub handle: Option<ExternalHandle>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridEvents {
    pub spawned: Vec<TileCoord>,
    pub evicted: Vec<EvictedTile>,
}

impl GridEvents {
    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty() && self.evicted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamUpdate {
    pub visual: GridEvents,
    pub physics: GridEvents,
    /// Previously failed releases that went through this tick
    pub retried_releases: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub active: usize,
    pub builds: u64,
    pub cache_hits: u64,
    pub spawned: u64,
    pub evicted: u64,
    pub recent: CacheStats,
}

struct RecentTile {
    data: Arc<TileData>,
    evicted_at: f64,
}

struct TilePlan {
    evict: Vec<TileCoord>,
    admit: Vec<TileCoord>,
    first_population: bool,
}

/// One grid's active set, its recent-tile cache and its counters
pub struct TileGrid {
    kind: GridKind,
    builder: HeightfieldBuilder,
    activation_radius: f32,
    fade_duration: f32,
    cache_ttl: f64,
    active: HashMap<TileCoord, TileRecord>,
    recent: BoundedCache<TileCoord, RecentTile>,
    current: Option<TileCoord>,
    clock: f64,
    builds: u64,
    cache_hits: u64,
    spawned: u64,
    evicted: u64,
}

impl TileGrid {
    pub fn visual(settings: &StreamingSettings) -> Self {
        Self::new(
            GridKind::Visual,
            HeightfieldBuilder::new(settings.tile_size, settings.resolution, settings.uv_scale),
            settings.view_distance,
            settings.fade_duration,
            settings.visual_cache_capacity,
            settings.cache_ttl_secs,
        )
    }

    /// Collision tiles appear at full strength, there is nothing to fade
    pub fn physics(settings: &StreamingSettings) -> Self {
        Self::new(
            GridKind::Physics,
            HeightfieldBuilder::new(settings.physics_tile_size, settings.physics_resolution, settings.uv_scale),
            settings.physics_distance,
            0.0,
            settings.physics_cache_capacity,
            settings.cache_ttl_secs,
        )
    }

    fn new(
        kind: GridKind,
        builder: HeightfieldBuilder,
        activation_radius: f32,
        fade_duration: f32,
        cache_capacity: usize,
        cache_ttl: f32,
    ) -> Self {
        Self {
            kind,
            builder,
            activation_radius,
            fade_duration,
            cache_ttl: cache_ttl as f64,
            active: HashMap::new(),
            recent: BoundedCache::new(cache_capacity),
            current: None,
            clock: 0.0,
            builds: 0,
            cache_hits: 0,
            spawned: 0,
            evicted: 0,
        }
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    pub fn tile_size(&self) -> f32 {
        self.builder.tile_size
    }

    pub fn activation_radius(&self) -> f32 {
        self.activation_radius
    }

    /// Tile the observer stood in at the last boundary crossing
    pub fn current(&self) -> Option<TileCoord> {
        self.current
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn get(&self, coord: &TileCoord) -> Option<&TileRecord> {
        self.active.get(coord)
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.active.contains_key(coord)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &TileRecord> {
        self.active.values()
    }

    pub fn active_keys(&self) -> BTreeSet<TileCoord> {
        self.active.keys().copied().collect()
    }

    pub fn is_cached(&self, coord: &TileCoord) -> bool {
        self.recent.contains(coord)
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            active: self.active.len(),
            builds: self.builds,
            cache_hits: self.cache_hits,
            spawned: self.spawned,
            evicted: self.evicted,
            recent: self.recent.stats(),
        }
    }

    /// Every tile whose closest point lies within the activation radius of
    /// an observer standing in `center`
    pub fn tiles_in_range(&self, center: TileCoord, observer: Vec3) -> BTreeSet<TileCoord> {
        let size = self.tile_size();
        // An observer on a tile edge is a full radius from tiles one step past radius/size
        let reach = (self.activation_radius / size).floor() as i32 + 1;
        let mut tiles = BTreeSet::new();
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                let coord = TileCoord::new(center.x + dx, center.z + dz);
                if coord.distance_to_point(observer.x, observer.z, size) <= self.activation_radius {
                    tiles.insert(coord);
                }
            }
        }
        tiles
    }

    fn advance(&mut self, dt: f32) {
        self.clock += dt as f64;
        for record in self.active.values_mut() {
            record.fade = record.fade.advance(dt, self.fade_duration);
        }
    }

    fn plan(&mut self, observer: Vec3) -> Option<TilePlan> {
        let coord = TileCoord::from_world(observer.x, observer.z, self.tile_size());
        if self.current == Some(coord) {
            return None;
        }

        let first_population = self.current.is_none();
        if let Some(previous) = self.current {
            debug!("{} grid: observer moved from tile {} to {}", self.kind, previous, coord);
        }
        self.current = Some(coord);

        let wanted = self.tiles_in_range(coord, observer);
        let mut evict: Vec<TileCoord> = self.active.keys().filter(|k| !wanted.contains(k)).copied().collect();
        evict.sort();
        let admit: Vec<TileCoord> = wanted.into_iter().filter(|k| !self.active.contains_key(k)).collect();

        debug!(
            "{} grid: {} tiles to evict, {} to admit around {}",
            self.kind,
            evict.len(),
            admit.len(),
            coord
        );

        Some(TilePlan {
            evict,
            admit,
            first_population,
        })
    }

    /// Remove an active tile, parking its data in the recent cache. Returns
    /// the handle that still has to be released.
    fn evict(&mut self, coord: TileCoord) -> Option<ExternalHandle> {
        let mut record = self.active.remove(&coord)?;
        self.evicted += 1;
        let handle = record.handle.take();
        self.recent.insert(
            coord,
            RecentTile {
                data: record.data,
                evicted_at: self.clock,
            },
        );
        handle
    }

    fn expire_recent(&mut self) {
        let now = self.clock;
        let ttl = self.cache_ttl;
        self.recent.retain(|_, tile| now - tile.evicted_at <= ttl);
    }

    fn admit(
        &mut self,
        coord: TileCoord,
        terrain: &Terrain,
        vegetation: Option<&VegetationPlacer>,
        observer: Vec3,
        first_population: bool,
    ) {
        let size = self.tile_size();
        let world_origin = coord.world_origin(size);

        let cached = self.recent.get(&coord).map(|tile| Arc::clone(&tile.data));
        let data = match cached {
            Some(data) => {
                self.recent.remove(&coord);
                self.cache_hits += 1;
                debug!("{} grid: reused cached tile {}", self.kind, coord);
                data
            }
            None => {
                self.builds += 1;
                let heights = self.builder.build_tile(terrain.blender(), coord);
                let scatter = vegetation.map(|placer| placer.place_for_tile(coord, world_origin, size, terrain));
                debug!(
                    "{} grid: built tile {} ({} vertices, {} blades)",
                    self.kind,
                    coord,
                    heights.vertex_count(),
                    scatter.as_ref().map_or(0, |v| v.instance_count())
                );
                Arc::new(TileData {
                    heights,
                    vegetation: scatter,
                })
            }
        };

        let visible_blades = match (vegetation, data.vegetation.as_ref()) {
            (Some(placer), Some(buffer)) => placer.visible_counts(buffer, observer.x, observer.z),
            _ => Vec::new(),
        };

        let fade = if first_population || self.fade_duration <= 0.0 {
            FadeState::Active
        } else {
            FadeState::FadingIn { opacity: 0.0 }
        };

        self.spawned += 1;
        self.active.insert(
            coord,
            TileRecord {
                key: coord,
                world_origin,
                fade,
                data,
                handle: None,
                visible_blades,
            },
        );
    }

    fn refresh_lod(&mut self, placer: &VegetationPlacer, observer: Vec3) {
        for record in self.active.values_mut() {
            if let Some(buffer) = record.data.vegetation.as_ref() {
                record.visible_blades = placer.visible_counts(buffer, observer.x, observer.z);
            }
        }
    }
}

struct PendingRelease {
    grid: GridKind,
    coord: TileCoord,
    handle: ExternalHandle,
}

/// Keeps the visual and physics grids populated around a moving observer.
///
/// Call [`TileStreamer::update`] once per tick. Within a grid, tiles leaving
/// the activation radius are evicted before new ones are admitted.
pub struct TileStreamer {
    terrain: Terrain,
    visual: TileGrid,
    physics: TileGrid,
    vegetation: Option<VegetationPlacer>,
    lod_interval: f32,
    lod_elapsed: f32,
    releaser: Option<Box<dyn TileReleaser>>,
    pending: VecDeque<PendingRelease>,
    peak_resident: usize,
}

impl TileStreamer {
    pub fn new(config: &TerrainConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_terrain(Terrain::new(config)?))
    }

    pub fn with_terrain(terrain: Terrain) -> Self {
        let config = terrain.config();
        let vegetation = config.vegetation.enabled.then(|| {
            VegetationPlacer::new(&config.vegetation, config.world.seed, config.road.spawn_flat_radius)
        });

        info!(
            "Tile streamer ready: visual {}m tiles to {}m, physics {}m tiles to {}m, vegetation {}",
            config.streaming.tile_size,
            config.streaming.view_distance,
            config.streaming.physics_tile_size,
            config.streaming.physics_distance,
            if vegetation.is_some() { "on" } else { "off" }
        );

        Self {
            visual: TileGrid::visual(&config.streaming),
            physics: TileGrid::physics(&config.streaming),
            lod_interval: config.vegetation.lod_interval,
            lod_elapsed: 0.0,
            vegetation,
            releaser: None,
            pending: VecDeque::new(),
            peak_resident: 0,
            terrain,
        }
    }

    pub fn with_releaser<R: TileReleaser + 'static>(mut self, releaser: R) -> Self {
        self.set_releaser(Box::new(releaser));
        self
    }

    pub fn set_releaser(&mut self, releaser: Box<dyn TileReleaser>) {
        self.releaser = Some(releaser);
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn grid(&self, kind: GridKind) -> &TileGrid {
        match kind {
            GridKind::Visual => &self.visual,
            GridKind::Physics => &self.physics,
        }
    }

    fn grid_mut(&mut self, kind: GridKind) -> &mut TileGrid {
        match kind {
            GridKind::Visual => &mut self.visual,
            GridKind::Physics => &mut self.physics,
        }
    }

    pub fn visual_tiles(&self) -> impl Iterator<Item = &TileRecord> {
        self.visual.tiles()
    }

    pub fn physics_tiles(&self) -> impl Iterator<Item = &TileRecord> {
        self.physics.tiles()
    }

    pub fn visual_tile(&self, coord: TileCoord) -> Option<&TileRecord> {
        self.visual.get(&coord)
    }

    pub fn physics_tile(&self, coord: TileCoord) -> Option<&TileRecord> {
        self.physics.get(&coord)
    }

    pub fn stats(&self, kind: GridKind) -> GridStats {
        self.grid(kind).stats()
    }

    /// Most tiles held across both grids at any point so far
    pub fn peak_resident(&self) -> usize {
        self.peak_resident
    }

    /// Handles whose release failed and will be retried next tick
    pub fn pending_releases(&self) -> usize {
        self.pending.len()
    }

    /// Bind a host object to an active tile. The handle is given back when
    /// the tile is not active or already owns one.
    pub fn attach_handle(
        &mut self,
        kind: GridKind,
        coord: TileCoord,
        handle: ExternalHandle,
    ) -> Result<(), ExternalHandle> {
        match self.grid_mut(kind).active.get_mut(&coord) {
            Some(record) if record.handle.is_none() => {
                record.handle = Some(handle);
                Ok(())
            }
            _ => Err(handle),
        }
    }

    /// Advance both grids by `dt`. Evictions of both grids finish before
    /// either grid admits anything.
    pub fn update(&mut self, dt: f32, observer: Vec3) -> StreamUpdate {
        let retried_releases = self.retry_pending();
        let (mut visual, visual_admit) = self.evict_phase(GridKind::Visual, dt, observer);
        let (mut physics, physics_admit) = self.evict_phase(GridKind::Physics, dt, observer);
        if let Some(plan) = visual_admit {
            visual.spawned = self.admit_phase(GridKind::Visual, plan, observer);
        }
        if let Some(plan) = physics_admit {
            physics.spawned = self.admit_phase(GridKind::Physics, plan, observer);
        }

        if let Some(placer) = self.vegetation.as_ref() {
            self.lod_elapsed += dt;
            if self.lod_elapsed >= self.lod_interval {
                self.lod_elapsed = 0.0;
                self.visual.refresh_lod(placer, observer);
            }
        }

        StreamUpdate {
            visual,
            physics,
            retried_releases,
        }
    }

    /// Advance fades, evict tiles that left range and release their handles.
    /// Returns the admissions still to do when the observer changed tile.
    fn evict_phase(&mut self, kind: GridKind, dt: f32, observer: Vec3) -> (GridEvents, Option<TilePlan>) {
        let Self {
            visual,
            physics,
            releaser,
            pending,
            ..
        } = self;
        let grid = match kind {
            GridKind::Visual => visual,
            GridKind::Physics => physics,
        };

        grid.advance(dt);
        let mut plan = match grid.plan(observer) {
            Some(plan) => plan,
            None => return (GridEvents::default(), None),
        };

        let mut events = GridEvents::default();
        for coord in plan.evict.drain(..) {
            let handle = grid
                .evict(coord)
                .and_then(|handle| release_handle(releaser, pending, kind, coord, handle));
            events.evicted.push(EvictedTile { coord, handle });
        }
        grid.expire_recent();
        (events, Some(plan))
    }

    fn admit_phase(&mut self, kind: GridKind, plan: TilePlan, observer: Vec3) -> Vec<TileCoord> {
        let Self {
            terrain,
            visual,
            physics,
            vegetation,
            peak_resident,
            ..
        } = self;
        let (grid, other, placer) = match kind {
            GridKind::Visual => (visual, &*physics, vegetation.as_ref()),
            GridKind::Physics => (physics, &*visual, None),
        };

        for coord in &plan.admit {
            grid.admit(*coord, terrain, placer, observer, plan.first_population);
            *peak_resident = (*peak_resident).max(grid.len() + other.len());
        }
        plan.admit
    }

    fn retry_pending(&mut self) -> usize {
        let releaser = match self.releaser.as_mut() {
            Some(releaser) => releaser,
            None => return 0,
        };

        let mut released = 0;
        for _ in 0..self.pending.len() {
            let entry = match self.pending.pop_front() {
                Some(entry) => entry,
                None => break,
            };
            match releaser.release(entry.grid, entry.coord, entry.handle) {
                Ok(()) => {
                    info!(
                        "Released handle {} of {} tile {} on retry",
                        entry.handle, entry.grid, entry.coord
                    );
                    released += 1;
                }
                Err(e) => {
                    warn!("Retry failed for {} tile {}: {}", entry.grid, entry.coord, e);
                    self.pending.push_back(entry);
                }
            }
        }
        released
    }
}

/// Hand the handle to the releaser, or back to the caller when there is none
fn release_handle(
    releaser: &mut Option<Box<dyn TileReleaser>>,
    pending: &mut VecDeque<PendingRelease>,
    grid: GridKind,
    coord: TileCoord,
    handle: ExternalHandle,
) -> Option<ExternalHandle> {
    let releaser = match releaser.as_mut() {
        Some(releaser) => releaser,
        None => return Some(handle),
    };
    if let Err(e) = releaser.release(grid, coord, handle) {
        warn!("Failed to release {} tile {}: {}, will retry", grid, coord, e);
        pending.push_back(PendingRelease { grid, coord, handle });
    }
    None
}
