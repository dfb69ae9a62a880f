/// Data structures shared by the generation and streaming layers
use crate::math::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer tile address within one grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub z: i32,
}

impl TileCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Tile containing a world position for the given tile size
    pub fn from_world(world_x: f32, world_z: f32, tile_size: f32) -> Self {
        Self {
            x: (world_x / tile_size).floor() as i32,
            z: (world_z / tile_size).floor() as i32,
        }
    }

    /// World-space corner with the smallest X and Z
    pub fn world_origin(&self, tile_size: f32) -> (f32, f32) {
        (
            (self.x as f64 * tile_size as f64) as f32,
            (self.z as f64 * tile_size as f64) as f32,
        )
    }

    /// Distance from a world point to the closest point of this tile's square
    pub fn distance_to_point(&self, world_x: f32, world_z: f32, tile_size: f32) -> f32 {
        let (min_x, min_z) = self.world_origin(tile_size);
        let dx = (min_x - world_x).max(0.0).max(world_x - (min_x + tile_size));
        let dz = (min_z - world_z).max(0.0).max(world_z - (min_z + tile_size));
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

/// Immutable sampled heightfield for one tile
///
/// All per-vertex arrays are row-major: `index = j * (resolution + 1) + i`,
/// with `i` running along X and `j` along Z.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightSample {
    pub coord: TileCoord,
    pub origin_x: f32,
    pub origin_z: f32,
    pub size: f32,
    pub resolution: u32,
    /// Meters represented by a normalized height of 1.0
    pub height_scale: f32,
    /// Normalized heights in [0, 1]
    pub heights: Vec<f32>,
    /// World-space vertex positions
    pub positions: Vec<Vec3>,
    /// Base terrain normals (the road surface is not considered)
    pub normals: Vec<Vec3>,
    /// World-space texture coordinates
    pub uvs: Vec<[f32; 2]>,
}

impl HeightSample {
    /// Vertices per side
    pub fn stride(&self) -> usize {
        self.resolution as usize + 1
    }

    pub fn vertex_count(&self) -> usize {
        self.stride() * self.stride()
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.stride() + i
    }

    /// Normalized height at grid coordinates
    pub fn get_height(&self, i: usize, j: usize) -> Option<f32> {
        if i >= self.stride() || j >= self.stride() {
            return None;
        }
        self.heights.get(self.index(i, j)).copied()
    }

    /// World height at grid coordinates
    pub fn get_world_height(&self, i: usize, j: usize) -> Option<f32> {
        self.get_height(i, j).map(|h| h * self.height_scale)
    }

    /// World height at a world position using bilinear interpolation
    ///
    /// Returns `None` outside this tile.
    pub fn sample(&self, world_x: f32, world_z: f32) -> Option<f32> {
        let cell = self.size / self.resolution as f32;
        let grid_x = (world_x - self.origin_x) / cell;
        let grid_z = (world_z - self.origin_z) / cell;

        let last = self.resolution as f32;
        if !(0.0..=last).contains(&grid_x) || !(0.0..=last).contains(&grid_z) {
            return None;
        }

        let i0 = (grid_x.floor() as usize).min(self.resolution as usize - 1);
        let j0 = (grid_z.floor() as usize).min(self.resolution as usize - 1);
        let fx = grid_x - i0 as f32;
        let fz = grid_z - j0 as f32;

        let h00 = self.get_world_height(i0, j0)?;
        let h10 = self.get_world_height(i0 + 1, j0)?;
        let h01 = self.get_world_height(i0, j0 + 1)?;
        let h11 = self.get_world_height(i0 + 1, j0 + 1)?;

        let h0 = h00 * (1.0 - fx) + h10 * fx;
        let h1 = h01 * (1.0 - fx) + h11 * fx;

        Some(h0 * (1.0 - fz) + h1 * fz)
    }

    /// Lowest and highest world height in this tile
    pub fn height_range(&self) -> (f32, f32) {
        let (min, max) = self
            .heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), h| (lo.min(*h), hi.max(*h)));
        (min * self.height_scale, max * self.height_scale)
    }

    /// Approximate heap footprint of the generated arrays
    pub fn byte_size(&self) -> usize {
        self.heights.len() * std::mem::size_of::<f32>()
            + self.positions.len() * std::mem::size_of::<Vec3>() * 2
            + self.uvs.len() * std::mem::size_of::<[f32; 2]>()
    }
}

/// Road centerline state at one Z coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadState {
    pub center_position: Vec3,
    pub tangent: Vec3,
    pub bank_angle: f32,
}

/// How a world point relates to the road surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendResult {
    /// Lateral distance along the banked right vector; positive to the right
    pub signed_distance: f32,
    /// 1 where the road fully determines height, 0 for natural terrain
    pub blend_factor: f32,
    /// Height of the banked road plane at this point
    pub road_height: f32,
    pub is_on_road: bool,
    pub is_in_transition: bool,
}
