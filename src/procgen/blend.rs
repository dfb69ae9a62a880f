/// Blends the road surface into the natural terrain
use super::noise::NoiseField;
use super::road::RoadPath;
use super::world_data::BlendResult;
use crate::config::RoadSettings;
use crate::math::{lerp, smootherstep, Vec3, UP};
use std::sync::Arc;

/// Cross-section zones, measured as |signed distance| from the centerline:
///
/// ```text
/// | road (half_width) | shoulder | transition | terrain ...
///   blend = 1           blend = 1  1 -> 0       blend = 0
/// ```
pub struct RoadBlender {
    noise: Arc<NoiseField>,
    road: RoadPath,
    half_width: f32,
    shoulder_edge: f32,
    transition_width: f32,
}

impl RoadBlender {
    pub fn new(noise: Arc<NoiseField>, road: RoadPath, settings: &RoadSettings) -> Self {
        Self {
            noise,
            road,
            half_width: settings.half_width,
            shoulder_edge: settings.half_width + settings.shoulder_width,
            transition_width: settings.transition_width,
        }
    }

    pub fn road(&self) -> &RoadPath {
        &self.road
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Outer edge of the transition band
    pub fn influence_width(&self) -> f32 {
        self.shoulder_edge + self.transition_width
    }

    pub fn blend(&self, world_x: f32, world_z: f32) -> BlendResult {
        let state = self.road.state(world_z);
        let center = state.center_position;

        let right = UP.cross(&state.tangent).normalize();
        let banked_right = right.rotate_about(&state.tangent, state.bank_angle);

        let offset = Vec3::new(world_x - center.x, 0.0, world_z - center.z);
        let signed_distance = offset.dot(&banked_right);
        let road_height = center.y + banked_right.y * signed_distance;

        let distance = signed_distance.abs();
        let (blend_factor, is_on_road, is_in_transition) = if distance <= self.half_width {
            (1.0, true, false)
        } else if distance <= self.shoulder_edge {
            (1.0, false, false)
        } else if distance <= self.influence_width() {
            let t = (distance - self.shoulder_edge) / self.transition_width;
            (1.0 - smootherstep(t), false, true)
        } else {
            (0.0, false, false)
        };

        debug_assert!(
            signed_distance.is_finite() && road_height.is_finite() && blend_factor.is_finite(),
            "non-finite road blend at ({}, {})",
            world_x,
            world_z
        );

        BlendResult {
            signed_distance,
            blend_factor,
            road_height,
            is_on_road,
            is_in_transition,
        }
    }

    /// Final surface height in meters, clamped to [0, max_height]
    pub fn height(&self, world_x: f32, world_z: f32) -> f32 {
        self.height_with_blend(world_x, world_z).0
    }

    /// Final surface height together with the blend that produced it
    pub fn height_with_blend(&self, world_x: f32, world_z: f32) -> (f32, BlendResult) {
        let terrain = self.noise.world_height(world_x, world_z);
        let blend = self.blend(world_x, world_z);
        let height = if blend.blend_factor > 0.0 {
            lerp(terrain, blend.road_height, blend.blend_factor)
        } else {
            terrain
        };
        (height.clamp(0.0, self.noise.max_height()), blend)
    }
}
