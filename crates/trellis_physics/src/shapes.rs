//! Collision shapes
//!
//! [`BodyShape`] is the shape a body is declared with, in body-local space.
//! Each step it is placed in the world as a [`Collider`]: boxes become the
//! axis-aligned bounds of the rotated box, planes take their normal from the
//! body's orientation.

use serde::{Deserialize, Serialize};
use trellis_math::{Quat, Ray, Vec3};

/// Shape of a body in its local frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BodyShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Infinite plane through the body origin facing local +Z
    Plane,
}

impl BodyShape {
    /// Place the shape at a world transform
    pub fn collider(&self, position: Vec3, quaternion: Quat) -> Collider {
        match *self {
            BodyShape::Sphere { radius } => Collider::Sphere(Sphere::new(position, radius)),
            BodyShape::Box { half_extents } => {
                let axes = [
                    quaternion.rotate(Vec3::X * half_extents.x),
                    quaternion.rotate(Vec3::Y * half_extents.y),
                    quaternion.rotate(Vec3::Z * half_extents.z),
                ];
                let extent = axes[0].abs() + axes[1].abs() + axes[2].abs();
                Collider::Aabb(Aabb::from_center_half_extents(position, extent))
            }
            BodyShape::Plane => Collider::Plane(Plane::from_point_normal(position, quaternion.rotate(Vec3::Z))),
        }
    }

    /// Scalar moment of inertia for a body of `mass`
    pub fn inertia(&self, mass: f32) -> f32 {
        match *self {
            BodyShape::Sphere { radius } => 0.4 * mass * radius * radius,
            BodyShape::Box { half_extents } => {
                let size = half_extents * 2.0;
                mass * (size.x * size.x + size.y * size.y + size.z * size.z) / 18.0
            }
            BodyShape::Plane => 0.0,
        }
    }
}

/// A sphere defined by center and radius
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        (point - self.center).length_squared() <= self.radius * self.radius
    }
}

/// An axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.clamp_components(self.min, self.max) == point
    }

    /// Closest point inside or on the box
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp_components(self.min, self.max)
    }
}

/// An infinite plane `normal · p = distance`
///
/// Points with `normal · p > distance` are above the plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Unit normal pointing to the positive side
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// The normal is normalized
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self {
            normal: normal.normalized(),
            distance,
        }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalized();
        Self {
            normal: n,
            distance: n.dot(point),
        }
    }

    /// Horizontal floor at height `y`
    pub fn floor(y: f32) -> Self {
        Self::from_point_normal(Vec3::new(0.0, y, 0.0), Vec3::Y)
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// A shape placed in the world
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Collider {
    Sphere(Sphere),
    Aabb(Aabb),
    Plane(Plane),
}

impl Collider {
    /// Nearest ray parameter and surface normal where `ray` enters the collider
    pub fn raycast(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        match self {
            Collider::Sphere(s) => {
                let t = ray.intersect_sphere(s.center, s.radius)?;
                Some((t, (ray.at(t) - s.center).normalized()))
            }
            Collider::Aabb(b) => ray.intersect_box(b.min, b.max).map(|hit| (hit.t, hit.normal)),
            Collider::Plane(p) => {
                // Planes are one-sided
                if p.normal.dot(ray.direction) >= 0.0 {
                    return None;
                }
                ray.intersect_plane(p.normal, p.distance).map(|t| (t, p.normal))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn test_sphere_contains() {
        let sphere = Sphere::new(Vec3::ZERO, 1.0);
        assert!(sphere.contains(Vec3::new(1.0, 0.0, 0.0)));
        assert!(!sphere.contains(Vec3::new(1.1, 0.0, 0.0)));
    }

    #[test]
    fn test_aabb_closest_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let inside = Vec3::new(0.5, 0.5, 0.5);
        assert_eq!(aabb.closest_point(inside), inside);
        assert_eq!(aabb.closest_point(Vec3::new(2.0, 0.5, 0.5)), Vec3::new(1.0, 0.5, 0.5));
        assert!(aabb.contains(Vec3::ZERO));
        assert!(!aabb.contains(Vec3::new(-0.1, 0.5, 0.5)));
    }

    #[test]
    fn test_rotated_box_bounds_grow() {
        let shape = BodyShape::Box { half_extents: Vec3::splat(0.5) };
        let Collider::Aabb(aabb) = shape.collider(Vec3::ZERO, Quat::from_axis_angle(Vec3::Y, FRAC_PI_4)) else {
            panic!("box should place as an aabb");
        };
        let expected = 0.5 * std::f32::consts::SQRT_2;
        assert!((aabb.max.x - expected).abs() < 1e-4);
        assert!((aabb.max.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_plane_faces_rotated_z() {
        // Rotating -90 degrees about X turns +Z into +Y
        let q = Quat::from_axis_angle(Vec3::X, -std::f32::consts::FRAC_PI_2);
        let Collider::Plane(plane) = BodyShape::Plane.collider(Vec3::new(0.0, 2.0, 0.0), q) else {
            panic!("plane should place as a plane");
        };
        assert!((plane.normal - Vec3::Y).length() < 1e-5);
        assert!((plane.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_plane_signed_distance() {
        let floor = Plane::floor(0.0);
        assert!((floor.signed_distance(Vec3::new(0.0, 1.0, 0.0)) - 1.0).abs() < 1e-6);
        assert!((floor.signed_distance(Vec3::new(0.0, -1.0, 0.0)) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_collider_raycast() {
        let ray = Ray::new(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y);
        let floor = Collider::Plane(Plane::floor(0.0));
        let (t, normal) = floor.raycast(&ray).unwrap();
        assert!((t - 5.0).abs() < 1e-5);
        assert_eq!(normal, Vec3::Y);

        // From below, the plane is not hit
        let up = Ray::new(Vec3::new(0.0, -5.0, 0.0), Vec3::Y);
        assert!(floor.raycast(&up).is_none());

        let sphere = Collider::Sphere(Sphere::new(Vec3::new(0.0, 2.0, 0.0), 1.0));
        let (t, normal) = sphere.raycast(&ray).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
        assert!((normal - Vec3::Y).length() < 1e-5);
    }
}
