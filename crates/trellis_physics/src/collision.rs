//! Contact generation and collision filtering
//!
//! Every test reports a [`Contact`] whose normal points from the second
//! shape toward the first, so pushing the first shape along the normal by
//! the penetration depth separates the pair.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use trellis_math::Vec3;

use crate::shapes::{Aabb, Collider, Plane, Sphere};

bitflags! {
    /// Collision groups a body belongs to or collides with
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CollisionLayer: u32 {
        const DEFAULT = 1 << 0;
        const STATIC = 1 << 1;
        const PLAYER = 1 << 2;
        /// Bodies that report collide events but are never pushed
        const SENSOR = 1 << 3;
        const ALL = 0xFFFF_FFFF;
    }
}

/// Layer membership plus the layers a body collides with
///
/// Two bodies collide only if each one's layer intersects the other's mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layer: CollisionLayer,
    pub mask: CollisionLayer,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: CollisionLayer::DEFAULT,
            mask: CollisionLayer::ALL,
        }
    }
}

impl CollisionFilter {
    pub fn new(layer: CollisionLayer, mask: CollisionLayer) -> Self {
        Self { layer, mask }
    }

    pub fn collides_with(&self, other: &Self) -> bool {
        self.layer.intersects(other.mask) && other.layer.intersects(self.mask)
    }

    /// Floors and walls
    pub fn static_world() -> Self {
        Self {
            layer: CollisionLayer::STATIC,
            mask: CollisionLayer::ALL,
        }
    }

    /// A body that only ever collides with `detects`
    pub fn only(layer: CollisionLayer, detects: CollisionLayer) -> Self {
        Self { layer, mask: detects }
    }
}

/// Contact between two colliders
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    pub point: Vec3,
    /// Points from the second shape toward the first
    pub normal: Vec3,
    /// Overlap depth, positive when intersecting
    pub penetration: f32,
}

impl Contact {
    pub fn new(point: Vec3, normal: Vec3, penetration: f32) -> Self {
        Self {
            point,
            normal,
            penetration,
        }
    }

    /// The same contact seen from the other shape
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

/// Contact between any two colliders, normal pointing from `b` toward `a`
///
/// Plane pairs never collide.
pub fn collide(a: &Collider, b: &Collider) -> Option<Contact> {
    match (a, b) {
        (Collider::Sphere(a), Collider::Sphere(b)) => sphere_vs_sphere(a, b),
        (Collider::Sphere(s), Collider::Aabb(bx)) => sphere_vs_aabb(s, bx),
        (Collider::Aabb(bx), Collider::Sphere(s)) => sphere_vs_aabb(s, bx).map(Contact::flipped),
        (Collider::Aabb(a), Collider::Aabb(b)) => aabb_vs_aabb(a, b),
        (Collider::Sphere(s), Collider::Plane(p)) => sphere_vs_plane(s, p),
        (Collider::Plane(p), Collider::Sphere(s)) => sphere_vs_plane(s, p).map(Contact::flipped),
        (Collider::Aabb(bx), Collider::Plane(p)) => aabb_vs_plane(bx, p),
        (Collider::Plane(p), Collider::Aabb(bx)) => aabb_vs_plane(bx, p).map(Contact::flipped),
        (Collider::Plane(_), Collider::Plane(_)) => None,
    }
}

pub fn sphere_vs_sphere(a: &Sphere, b: &Sphere) -> Option<Contact> {
    let delta = a.center - b.center;
    let radii = a.radius + b.radius;
    let dist_squared = delta.length_squared();
    if dist_squared >= radii * radii {
        return None;
    }
    let dist = dist_squared.sqrt();
    let normal = if dist > 0.0001 { delta / dist } else { Vec3::Y };
    Some(Contact::new(b.center + normal * b.radius, normal, radii - dist))
}

/// Normal points from the plane toward the sphere
pub fn sphere_vs_plane(sphere: &Sphere, plane: &Plane) -> Option<Contact> {
    let penetration = sphere.radius - plane.signed_distance(sphere.center);
    if penetration <= 0.0 {
        return None;
    }
    let point = sphere.center - plane.normal * sphere.radius;
    Some(Contact::new(point, plane.normal, penetration))
}

pub fn aabb_vs_plane(aabb: &Aabb, plane: &Plane) -> Option<Contact> {
    // Vertex deepest along -normal
    let deepest = aabb.center() - aabb.half_extents().component_mul(plane.normal.sign());
    let signed_dist = plane.signed_distance(deepest);
    if signed_dist >= 0.0 {
        return None;
    }
    Some(Contact::new(deepest, plane.normal, -signed_dist))
}

/// Normal points from the box toward the sphere
pub fn sphere_vs_aabb(sphere: &Sphere, aabb: &Aabb) -> Option<Contact> {
    let closest = aabb.closest_point(sphere.center);
    let delta = sphere.center - closest;
    let dist_squared = delta.length_squared();
    if dist_squared >= sphere.radius * sphere.radius {
        return None;
    }

    let dist = dist_squared.sqrt();
    if dist > 0.0001 {
        return Some(Contact::new(closest, delta / dist, sphere.radius - dist));
    }

    // Center inside the box: leave through the nearest face
    let to_min = sphere.center - aabb.min;
    let to_max = aabb.max - sphere.center;
    let mut best = (f32::INFINITY, Vec3::Y);
    for (i, axis) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        if to_min.axis(i) < best.0 {
            best = (to_min.axis(i), -axis);
        }
        if to_max.axis(i) < best.0 {
            best = (to_max.axis(i), axis);
        }
    }
    Some(Contact::new(closest, best.1, sphere.radius + best.0))
}

/// Separates along the axis of least overlap
pub fn aabb_vs_aabb(a: &Aabb, b: &Aabb) -> Option<Contact> {
    let mut best: Option<(f32, Vec3)> = None;
    let (ca, cb) = (a.center(), b.center());
    for (i, axis) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        let overlap = a.max.axis(i).min(b.max.axis(i)) - a.min.axis(i).max(b.min.axis(i));
        if overlap <= 0.0 {
            return None;
        }
        if best.map_or(true, |(min, _)| overlap < min) {
            let normal = if ca.axis(i) < cb.axis(i) { -axis } else { axis };
            best = Some((overlap, normal));
        }
    }
    let (penetration, normal) = best?;
    let lo = a.min.max_components(b.min);
    let hi = a.max.min_components(b.max);
    Some(Contact::new((lo + hi) * 0.5, normal, penetration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_default_collides() {
        let a = CollisionFilter::default();
        assert!(a.collides_with(&CollisionFilter::static_world()));
    }

    #[test]
    fn test_filter_is_mutual() {
        let player = CollisionFilter::only(CollisionLayer::PLAYER, CollisionLayer::STATIC);
        let ball = CollisionFilter::default();
        assert!(!player.collides_with(&ball));
        assert!(!ball.collides_with(&player));
        assert!(player.collides_with(&CollisionFilter::static_world()));
    }

    #[test]
    fn test_sphere_resting_on_floor() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.4, 0.0), 0.5);
        let contact = sphere_vs_plane(&sphere, &Plane::floor(0.0)).unwrap();
        assert_eq!(contact.normal, Vec3::Y);
        assert!((contact.penetration - 0.1).abs() < 1e-5);

        let above = Sphere::new(Vec3::new(0.0, 0.6, 0.0), 0.5);
        assert!(sphere_vs_plane(&above, &Plane::floor(0.0)).is_none());
    }

    #[test]
    fn test_box_vs_floor() {
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.25, 0.0), Vec3::splat(0.5));
        let contact = aabb_vs_plane(&aabb, &Plane::floor(0.0)).unwrap();
        assert!((contact.penetration - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_vs_sphere() {
        let a = Sphere::new(Vec3::new(1.5, 0.0, 0.0), 1.0);
        let b = Sphere::new(Vec3::ZERO, 1.0);
        let contact = sphere_vs_sphere(&a, &b).unwrap();
        assert_eq!(contact.normal, Vec3::X);
        assert!((contact.penetration - 0.5).abs() < 1e-5);
        assert!(sphere_vs_sphere(&Sphere::new(Vec3::new(3.0, 0.0, 0.0), 1.0), &b).is_none());
    }

    #[test]
    fn test_sphere_center_inside_box() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let sphere = Sphere::new(Vec3::new(0.0, 0.8, 0.0), 0.5);
        let contact = sphere_vs_aabb(&sphere, &aabb).unwrap();
        assert_eq!(contact.normal, Vec3::Y);
        assert!((contact.penetration - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_aabb_vs_aabb_least_overlap_axis() {
        let a = Aabb::from_center_half_extents(Vec3::new(0.0, 0.9, 0.0), Vec3::splat(0.5));
        let b = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));
        let contact = aabb_vs_aabb(&a, &b).unwrap();
        assert_eq!(contact.normal, Vec3::Y);
        assert!((contact.penetration - 0.1).abs() < 1e-5);

        let apart = Aabb::from_center_half_extents(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(0.5));
        assert!(aabb_vs_aabb(&apart, &b).is_none());
    }

    #[test]
    fn test_collide_flips_for_reversed_pairs() {
        let sphere = Collider::Sphere(Sphere::new(Vec3::new(0.0, 0.4, 0.0), 0.5));
        let floor = Collider::Plane(Plane::floor(0.0));
        assert_eq!(collide(&sphere, &floor).unwrap().normal, Vec3::Y);
        assert_eq!(collide(&floor, &sphere).unwrap().normal, -Vec3::Y);
        assert!(collide(&floor, &floor).is_none());
    }
}
