/// Tile heightfield sampling
use super::blend::RoadBlender;
use super::world_data::{HeightSample, TileCoord};
use crate::math::Vec3;
use tracing::trace;

/// Samples the blended surface over a square tile's vertex grid.
///
/// One builder exists per grid: the visual grid uses large tiles, the physics
/// grid small ones. Vertex positions come from a global lattice index, so two
/// neighbouring tiles compute bit-identical values on their shared edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightfieldBuilder {
    pub tile_size: f32,
    pub resolution: u32,
    /// World units per texture repeat
    pub uv_scale: f32,
}

impl HeightfieldBuilder {
    pub fn new(tile_size: f32, resolution: u32, uv_scale: f32) -> Self {
        Self {
            tile_size,
            resolution,
            uv_scale,
        }
    }

    /// World coordinate of lattice line `index` within tile `tile`
    pub fn lattice_coord(&self, tile: i32, index: u32) -> f32 {
        let global = tile as i64 * self.resolution as i64 + index as i64;
        (global as f64 * self.tile_size as f64 / self.resolution as f64) as f32
    }

    pub fn build_tile(&self, blender: &RoadBlender, coord: TileCoord) -> HeightSample {
        let stride = self.resolution as usize + 1;
        let vertex_count = stride * stride;
        let max_height = blender.noise().max_height();

        let mut heights = Vec::with_capacity(vertex_count);
        let mut positions = Vec::with_capacity(vertex_count);
        let mut normals = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);

        let xs: Vec<f32> = (0..=self.resolution).map(|i| self.lattice_coord(coord.x, i)).collect();

        for j in 0..=self.resolution {
            let world_z = self.lattice_coord(coord.z, j);
            for &world_x in &xs {
                let height = blender.height(world_x, world_z);

                heights.push(height / max_height);
                positions.push(Vec3::new(world_x, height, world_z));
                // Lighting ignores the road surface and uses the base terrain
                normals.push(blender.noise().normal(world_x, world_z));
                uvs.push([world_x / self.uv_scale, world_z / self.uv_scale]);
            }
        }

        let (origin_x, origin_z) = (xs[0], self.lattice_coord(coord.z, 0));
        trace!(
            "Sampled tile {} ({} vertices, {:.1}m) at ({:.1}, {:.1})",
            coord,
            vertex_count,
            self.tile_size,
            origin_x,
            origin_z
        );

        HeightSample {
            coord,
            origin_x,
            origin_z,
            size: self.tile_size,
            resolution: self.resolution,
            height_scale: max_height,
            heights,
            positions,
            normals,
            uvs,
        }
    }
}
