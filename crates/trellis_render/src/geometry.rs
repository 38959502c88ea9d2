//! Triangle tessellation of node shapes
//!
//! Shapes are expanded into non-indexed triangle lists in the node's local
//! space. Winding is counter-clockwise seen from outside.

use trellis_core::Shape;
use trellis_math::Vec3;

/// Longitude segments of a tessellated sphere
pub const SPHERE_SEGMENTS: usize = 24;
/// Latitude rings of a tessellated sphere
pub const SPHERE_RINGS: usize = 12;

/// One triangle corner in local space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalVertex {
    pub position: Vec3,
    pub normal: Vec3,
}

/// Expand `shape` into a triangle list
pub fn tessellate(shape: &Shape) -> Vec<LocalVertex> {
    match *shape {
        Shape::Box { size } => box_triangles(size * 0.5),
        Shape::Sphere { radius } => sphere_triangles(radius, SPHERE_SEGMENTS, SPHERE_RINGS),
        Shape::Plane { width, height } => plane_triangles(width * 0.5, height * 0.5),
    }
}

fn push_quad(out: &mut Vec<LocalVertex>, corners: [Vec3; 4], normal: Vec3) {
    for i in [0, 1, 2, 0, 2, 3] {
        out.push(LocalVertex { position: corners[i], normal });
    }
}

fn box_triangles(h: Vec3) -> Vec<LocalVertex> {
    let mut out = Vec::with_capacity(36);
    let (x, y, z) = (h.x, h.y, h.z);

    // +X / -X
    push_quad(&mut out, [Vec3::new(x, -y, z), Vec3::new(x, -y, -z), Vec3::new(x, y, -z), Vec3::new(x, y, z)], Vec3::X);
    push_quad(&mut out, [Vec3::new(-x, -y, -z), Vec3::new(-x, -y, z), Vec3::new(-x, y, z), Vec3::new(-x, y, -z)], -Vec3::X);
    // +Y / -Y
    push_quad(&mut out, [Vec3::new(-x, y, z), Vec3::new(x, y, z), Vec3::new(x, y, -z), Vec3::new(-x, y, -z)], Vec3::Y);
    push_quad(&mut out, [Vec3::new(-x, -y, -z), Vec3::new(x, -y, -z), Vec3::new(x, -y, z), Vec3::new(-x, -y, z)], -Vec3::Y);
    // +Z / -Z
    push_quad(&mut out, [Vec3::new(-x, -y, z), Vec3::new(x, -y, z), Vec3::new(x, y, z), Vec3::new(-x, y, z)], Vec3::Z);
    push_quad(&mut out, [Vec3::new(x, -y, -z), Vec3::new(-x, -y, -z), Vec3::new(-x, y, -z), Vec3::new(x, y, -z)], -Vec3::Z);

    out
}

fn plane_triangles(hw: f32, hh: f32) -> Vec<LocalVertex> {
    let mut out = Vec::with_capacity(6);
    push_quad(
        &mut out,
        [Vec3::new(-hw, -hh, 0.0), Vec3::new(hw, -hh, 0.0), Vec3::new(hw, hh, 0.0), Vec3::new(-hw, hh, 0.0)],
        Vec3::Z,
    );
    out
}

fn sphere_triangles(radius: f32, segments: usize, rings: usize) -> Vec<LocalVertex> {
    let point = |ring: usize, segment: usize| {
        let theta = std::f32::consts::PI * ring as f32 / rings as f32;
        let phi = std::f32::consts::TAU * segment as f32 / segments as f32;
        let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), -theta.sin() * phi.sin());
        LocalVertex { position: normal * radius, normal }
    };

    let mut out = Vec::with_capacity(segments * rings * 6);
    for ring in 0..rings {
        for segment in 0..segments {
            let a = point(ring, segment);
            let b = point(ring + 1, segment);
            let c = point(ring + 1, segment + 1);
            let d = point(ring, segment + 1);
            if ring != 0 {
                out.extend_from_slice(&[a, b, d]);
            }
            if ring != rings - 1 {
                out.extend_from_slice(&[b, c, d]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winding_normal(tri: &[LocalVertex]) -> Vec3 {
        (tri[1].position - tri[0].position).cross(tri[2].position - tri[0].position)
    }

    #[test]
    fn test_box_has_twelve_outward_triangles() {
        let tris = tessellate(&Shape::Box { size: Vec3::new(2.0, 4.0, 6.0) });
        assert_eq!(tris.len(), 36);
        for tri in tris.chunks(3) {
            assert!(winding_normal(tri).dot(tri[0].normal) > 0.0);
            for v in tri {
                assert!(v.position.x.abs() <= 1.0 && v.position.y.abs() <= 2.0 && v.position.z.abs() <= 3.0);
            }
        }
    }

    #[test]
    fn test_plane_faces_positive_z() {
        let tris = tessellate(&Shape::Plane { width: 2.0, height: 1.0 });
        assert_eq!(tris.len(), 6);
        for tri in tris.chunks(3) {
            assert!(winding_normal(tri).z > 0.0);
        }
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let tris = tessellate(&Shape::Sphere { radius: 2.0 });
        assert_eq!(tris.len(), (SPHERE_RINGS - 1) * SPHERE_SEGMENTS * 6);
        for v in &tris {
            assert!((v.position.length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_sphere_winding_outward() {
        let tris = tessellate(&Shape::Sphere { radius: 1.0 });
        for tri in tris.chunks(3) {
            let center = (tri[0].position + tri[1].position + tri[2].position) / 3.0;
            assert!(winding_normal(tri).dot(center) > 0.0);
        }
    }
}
