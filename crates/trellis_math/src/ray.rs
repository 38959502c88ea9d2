//! Rays and ray/primitive intersection tests

use serde::{Serialize, Deserialize};
use crate::{mat4, Mat4, Vec3};

/// A half-line with an origin and a (normalized) direction
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Result of a ray vs box test
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayBoxHit {
    /// Parameter along the ray
    pub t: f32,
    /// Outward face normal of the entered face
    pub normal: Vec3,
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Vec3::ZERO, -Vec3::Z)
    }
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
        }
    }

    /// Ray from `from` toward `to`
    pub fn between(from: Vec3, to: Vec3) -> Self {
        Self::new(from, to - from)
    }

    /// Point along the ray at parameter t
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform the ray into another space
    pub fn transformed(&self, m: &Mat4) -> Self {
        Self::new(
            mat4::transform_point(m, self.origin),
            mat4::transform_vector(m, self.direction),
        )
    }

    /// Slab test against an axis-aligned box
    ///
    /// Returns the entry point, or the exit point if the origin is inside.
    pub fn intersect_box(&self, min: Vec3, max: Vec3) -> Option<RayBoxHit> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        let mut enter_axis = 0;
        let mut exit_axis = 0;

        for axis in 0..3 {
            let o = self.origin.axis(axis);
            let d = self.direction.axis(axis);
            let (lo, hi) = (min.axis(axis), max.axis(axis));

            if d.abs() < 1e-8 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_min {
                t_min = t0;
                enter_axis = axis;
            }
            if t1 < t_max {
                t_max = t1;
                exit_axis = axis;
            }
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }

        let (t, axis, sign) = if t_min >= 0.0 {
            (t_min, enter_axis, -self.direction.axis(enter_axis).signum())
        } else {
            (t_max, exit_axis, self.direction.axis(exit_axis).signum())
        };

        let normal = match axis {
            0 => Vec3::X * sign,
            1 => Vec3::Y * sign,
            _ => Vec3::Z * sign,
        };

        Some(RayBoxHit { t, normal })
    }

    /// Nearest non-negative intersection parameter with a sphere
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - radius * radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let sqrt = disc.sqrt();
        let t0 = -b - sqrt;
        let t1 = -b + sqrt;
        if t0 >= 0.0 {
            Some(t0)
        } else if t1 >= 0.0 {
            Some(t1)
        } else {
            None
        }
    }

    /// Intersection parameter with the plane `normal · p = constant`
    pub fn intersect_plane(&self, normal: Vec3, constant: f32) -> Option<f32> {
        let denom = normal.dot(self.direction);
        if denom.abs() < 1e-8 {
            return None;
        }
        let t = (constant - normal.dot(self.origin)) / denom;
        (t >= 0.0).then_some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_hit_front_face() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let hit = ray.intersect_box(Vec3::splat(-1.0), Vec3::splat(1.0)).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Z);
    }

    #[test]
    fn test_box_miss() {
        let ray = Ray::new(Vec3::new(3.0, 0.0, 5.0), -Vec3::Z);
        assert!(ray.intersect_box(Vec3::splat(-1.0), Vec3::splat(1.0)).is_none());
    }

    #[test]
    fn test_box_behind_origin() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(ray.intersect_box(Vec3::splat(-1.0), Vec3::splat(1.0)).is_none());
    }

    #[test]
    fn test_sphere_hit() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z);
        let t = ray.intersect_sphere(Vec3::ZERO, 2.0).unwrap();
        assert!((t - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_plane_hit() {
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y);
        let t = ray.intersect_plane(Vec3::Y, 0.0).unwrap();
        assert!((t - 5.0).abs() < 1e-5);
        assert_eq!(ray.at(t), Vec3::ZERO);
    }

    #[test]
    fn test_transformed_ray() {
        let m = mat4::from_trs(Vec3::new(0.0, 0.0, -5.0), crate::Quat::IDENTITY, Vec3::ONE);
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z).transformed(&m);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, -5.0));
    }
}
