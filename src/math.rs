/// Small vector helpers shared by the terrain, road and vegetation code
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

pub const UP: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or straight up for degenerate input
    pub fn normalize(&self) -> Self {
        let length = self.length();
        if length > 0.0001 {
            Self {
                x: self.x / length,
                y: self.y / length,
                z: self.z / length,
            }
        } else {
            UP
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Rotate around a unit `axis` by `angle` radians (Rodrigues' formula)
    pub fn rotate_about(&self, axis: &Vec3, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        let k_cross_v = axis.cross(self);
        let k_dot_v = axis.dot(self);
        *self * cos + k_cross_v * sin + *axis * (k_dot_v * (1.0 - cos))
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Quintic ease (6t^5 - 15t^4 + 10t^3), input clamped to [0, 1]
pub fn smootherstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

/// Smootherstep ramp of `value` between `start` and `end`
///
/// Returns 0 at or below `start` and 1 at or above `end`.
pub fn ramp(value: f32, start: f32, end: f32) -> f32 {
    if value <= start {
        0.0
    } else if value >= end {
        1.0
    } else {
        smootherstep((value - start) / (end - start))
    }
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_smootherstep_endpoints() {
        assert_eq!(smootherstep(0.0), 0.0);
        assert_eq!(smootherstep(1.0), 1.0);
        assert!(approx(smootherstep(0.5), 0.5));
        assert_eq!(smootherstep(-3.0), 0.0);
        assert_eq!(smootherstep(7.0), 1.0);
    }

    #[test]
    fn test_ramp_is_monotonic() {
        let mut previous = 0.0;
        for i in 0..=100 {
            let value = ramp(i as f32, 20.0, 80.0);
            assert!(value >= previous);
            previous = value;
        }
        assert_eq!(ramp(10.0, 20.0, 80.0), 0.0);
        assert_eq!(ramp(90.0, 20.0, 80.0), 1.0);
    }

    #[test]
    fn test_cross_of_up_and_forward_points_right() {
        let forward = Vec3::new(0.0, 0.0, 1.0);
        let right = UP.cross(&forward);
        assert!(approx(right.x, 1.0));
        assert!(approx(right.y, 0.0));
        assert!(approx(right.z, 0.0));
    }

    #[test]
    fn test_rotate_about_preserves_length() {
        let axis = Vec3::new(0.0, 0.0, 1.0);
        let v = Vec3::new(1.0, 0.0, 0.0);
        let rotated = v.rotate_about(&axis, std::f32::consts::FRAC_PI_2);
        assert!(approx(rotated.length(), 1.0));
        assert!(approx(rotated.x, 0.0));
        assert!(approx(rotated.y, 1.0));
    }

    #[test]
    fn test_normalize_degenerate_vector() {
        let zero = Vec3::default();
        assert_eq!(zero.normalize(), UP);
    }
}
