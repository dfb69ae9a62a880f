use apexsim_terrain::{
    config::{ConfigError, TerrainConfig},
    math::Vec3,
    procgen::{BlendResult, HeightSample, HeightfieldBuilder, TileCoord, VegetationBuffer, VegetationPlacer},
    streaming::{GridKind, GridStats, TileStreamer},
    terrain::Terrain,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to terrain.toml configuration file
    #[arg(short, long, default_value = "./terrain.toml")]
    config: String,

    /// Override log level (trace|debug|info|warn|error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override the world seed
    #[arg(long)]
    seed: Option<u32>,

    /// Environment preset (desert|forest|mountains|plains|country|park)
    #[arg(long)]
    preset: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive an observer along the road and stream tiles around it
    Drive {
        #[arg(long, default_value_t = 600)]
        ticks: u32,
        /// Meters per second
        #[arg(long, default_value_t = 30.0)]
        speed: f32,
        /// Seconds per tick
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f32,
    },
    /// Print height, normal and road info at a world position
    Sample {
        #[arg(long, allow_negative_numbers = true)]
        x: f32,
        #[arg(long, allow_negative_numbers = true)]
        z: f32,
    },
    /// Print one tile's heightfield (and vegetation) as JSON
    ExportTile {
        #[arg(long, allow_negative_numbers = true)]
        x: i32,
        #[arg(long, allow_negative_numbers = true)]
        z: i32,
        /// Use the physics grid's tile size and resolution
        #[arg(long)]
        physics: bool,
    },
}

#[derive(Serialize)]
struct SampleReport {
    x: f32,
    z: f32,
    height: f32,
    base_height: f32,
    normal: Vec3,
    road: BlendResult,
}

#[derive(Serialize)]
struct TileExport<'a> {
    grid: &'static str,
    heights: &'a HeightSample,
    vegetation: Option<&'a VegetationBuffer>,
}

#[derive(Serialize)]
struct GridSummary {
    active: usize,
    builds: u64,
    cache_hits: u64,
    evicted: u64,
}

impl From<GridStats> for GridSummary {
    fn from(stats: GridStats) -> Self {
        Self {
            active: stats.active,
            builds: stats.builds,
            cache_hits: stats.cache_hits,
            evicted: stats.evicted,
        }
    }
}

#[derive(Serialize)]
struct DriveSummary {
    ticks: u32,
    distance: f32,
    observer: Vec3,
    visual: GridSummary,
    physics: GridSummary,
    visible_blades: usize,
    visual_height_bytes: usize,
    physics_height_bytes: usize,
    memo_hits: u64,
    memo_misses: u64,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout is reserved for command output
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The config can carry the log level, so read it before installing the subscriber
    let loaded = TerrainConfig::load(&args.config);
    let log_level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|config| config.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&log_level, args.json_logs);

    info!("Starting ApexSim terrain streamer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => {
            info!("Configuration loaded from: {}", args.config);
            config
        }
        Err(ConfigError::Io(_)) if !Path::new(&args.config).exists() => {
            info!("No config at {}, using defaults", args.config);
            TerrainConfig::default()
        }
        Err(e) => {
            warn!("Failed to load config {}: {}, using defaults", args.config, e);
            TerrainConfig::default()
        }
    };

    if let Some(preset) = args.preset.as_deref() {
        config = config.with_preset(preset)?;
        info!("Applied environment preset: {}", preset);
    }
    if let Some(seed) = args.seed {
        config.world.seed = seed;
    }
    info!("World seed: {}", config.world.seed);

    match args.command {
        Command::Drive { ticks, speed, dt } => drive(&config, ticks, speed, dt),
        Command::Sample { x, z } => sample(&config, x, z),
        Command::ExportTile { x, z, physics } => export_tile(&config, TileCoord::new(x, z), physics),
    }
}

fn drive(config: &TerrainConfig, ticks: u32, speed: f32, dt: f32) -> Result<(), Box<dyn std::error::Error>> {
    let mut streamer = TileStreamer::new(config)?;
    let mut distance = 0.0f32;
    let mut observer = streamer.terrain().road_center(0.0);

    for tick in 0..ticks {
        observer = streamer.terrain().road_center(distance);
        let update = streamer.update(dt, observer);

        if !update.visual.is_empty() || !update.physics.is_empty() {
            debug!(
                "Tick {}: z={:.1} visual +{}/-{} physics +{}/-{}",
                tick,
                distance,
                update.visual.spawned.len(),
                update.visual.evicted.len(),
                update.physics.spawned.len(),
                update.physics.evicted.len()
            );
        }
        distance += speed * dt;
    }

    let visual = streamer.stats(GridKind::Visual);
    let physics = streamer.stats(GridKind::Physics);
    info!(
        "Visual grid: {} active, {} built, {} cache hits, {} evicted",
        visual.active, visual.builds, visual.cache_hits, visual.evicted
    );
    info!(
        "Physics grid: {} active, {} built, {} cache hits, {} evicted",
        physics.active, physics.builds, physics.cache_hits, physics.evicted
    );

    let memo = streamer.terrain().elevation_memo_stats();
    let summary = DriveSummary {
        ticks,
        distance,
        observer,
        visual: visual.into(),
        physics: physics.into(),
        visible_blades: streamer.visual_tiles().map(|t| t.visible_transforms().count()).sum(),
        visual_height_bytes: streamer.visual_tiles().map(|t| t.height_sample().byte_size()).sum(),
        physics_height_bytes: streamer.physics_tiles().map(|t| t.height_sample().byte_size()).sum(),
        memo_hits: memo.hits,
        memo_misses: memo.misses,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn sample(config: &TerrainConfig, x: f32, z: f32) -> Result<(), Box<dyn std::error::Error>> {
    let terrain = Terrain::new(config)?;
    let report = SampleReport {
        x,
        z,
        height: terrain.height(x, z),
        base_height: terrain.base_height(x, z),
        normal: terrain.normal(x, z),
        road: terrain.road_info(x, z),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn export_tile(config: &TerrainConfig, coord: TileCoord, physics: bool) -> Result<(), Box<dyn std::error::Error>> {
    let terrain = Terrain::new(config)?;
    let s = &config.streaming;
    let (grid, builder) = if physics {
        (
            "physics",
            HeightfieldBuilder::new(s.physics_tile_size, s.physics_resolution, s.uv_scale),
        )
    } else {
        ("visual", HeightfieldBuilder::new(s.tile_size, s.resolution, s.uv_scale))
    };

    let heights = builder.build_tile(terrain.blender(), coord);
    let vegetation = (!physics && config.vegetation.enabled).then(|| {
        VegetationPlacer::new(&config.vegetation, config.world.seed, config.road.spawn_flat_radius).place_for_tile(
            coord,
            coord.world_origin(builder.tile_size),
            builder.tile_size,
            &terrain,
        )
    });
    info!(
        "Exported {} tile {} ({} vertices, {} blades)",
        grid,
        coord,
        heights.vertex_count(),
        vegetation.as_ref().map_or(0, |v| v.instance_count())
    );

    let export = TileExport {
        grid,
        heights: &heights,
        vegetation: vegetation.as_ref(),
    };
    println!("{}", serde_json::to_string(&export)?);
    Ok(())
}
