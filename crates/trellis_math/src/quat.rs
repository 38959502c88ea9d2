//! Unit quaternion rotations
//!
//! Quaternions are stored as `(x, y, z, w)` with `w` the scalar part, matching
//! the layout of transform buffers streamed back from the physics worker.

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};
use crate::Vec3;

/// Unit quaternion representing a 3D rotation
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    /// Identity rotation
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Build from an `[x, y, z, w]` array
    #[inline]
    pub const fn from_array(a: [f32; 4]) -> Self {
        Self { x: a[0], y: a[1], z: a[2], w: a[3] }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Rotation of `angle` radians around a (not necessarily unit) axis
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalized();
        let half = angle * 0.5;
        let s = half.sin();
        Self::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    /// Rotation from Euler angles applied in XYZ order
    pub fn from_euler_xyz(x: f32, y: f32, z: f32) -> Self {
        let (s1, c1) = (x * 0.5).sin_cos();
        let (s2, c2) = (y * 0.5).sin_cos();
        let (s3, c3) = (z * 0.5).sin_cos();

        Self::new(
            s1 * c2 * c3 + c1 * s2 * s3,
            c1 * s2 * c3 - s1 * c2 * s3,
            c1 * c2 * s3 + s1 * s2 * c3,
            c1 * c2 * c3 - s1 * s2 * s3,
        )
    }

    /// Euler angles (XYZ order) of this rotation
    pub fn to_euler_xyz(&self) -> Vec3 {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        let m11 = 1.0 - 2.0 * (y * y + z * z);
        let m12 = 2.0 * (x * y - z * w);
        let m13 = 2.0 * (x * z + y * w);
        let m22 = 1.0 - 2.0 * (x * x + z * z);
        let m23 = 2.0 * (y * z - x * w);
        let m32 = 2.0 * (y * z + x * w);
        let m33 = 1.0 - 2.0 * (x * x + y * y);

        let ey = m13.clamp(-1.0, 1.0).asin();
        if m13.abs() < 0.999_999 {
            Vec3::new((-m23).atan2(m33), ey, (-m12).atan2(m11))
        } else {
            // Gimbal lock
            Vec3::new(m32.atan2(m22), ey, 0.0)
        }
    }

    /// Squared magnitude
    #[inline]
    pub fn magnitude_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Normalize to unit magnitude, falling back to identity for degenerate input
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude_squared().sqrt();
        if mag > 0.0 {
            let inv = 1.0 / mag;
            Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    /// Conjugate; the inverse rotation for unit quaternions
    #[inline]
    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Compose rotations: the result applies `other` first, then `self`
    pub fn compose(&self, other: &Self) -> Self {
        let (ax, ay, az, aw) = (self.x, self.y, self.z, self.w);
        let (bx, by, bz, bw) = (other.x, other.y, other.z, other.w);

        Self::new(
            ax * bw + aw * bx + ay * bz - az * by,
            ay * bw + aw * by + az * bx - ax * bz,
            az * bw + aw * bz + ax * by - ay * bx,
            aw * bw - ax * bx - ay * by - az * bz,
        )
    }

    /// Rotate a vector
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Advance this orientation by an angular velocity over `dt` seconds
    pub fn integrate(&self, angular_velocity: Vec3, dt: f32) -> Self {
        let half_dt = dt * 0.5;
        let w = Self::new(angular_velocity.x, angular_velocity.y, angular_velocity.z, 0.0);
        let dq = w.compose(self);
        Self::new(
            self.x + dq.x * half_dt,
            self.y + dq.y * half_dt,
            self.z + dq.z * half_dt,
            self.w + dq.w * half_dt,
        )
        .normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 0.0001
    }

    #[test]
    fn test_identity_rotation() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(Quat::IDENTITY.rotate(v), v);
    }

    #[test]
    fn test_axis_angle_rotation() {
        let q = Quat::from_axis_angle(Vec3::Y, FRAC_PI_2);
        assert!(approx(q.rotate(Vec3::X), -Vec3::Z));
    }

    #[test]
    fn test_compose_order() {
        let a = Quat::from_axis_angle(Vec3::Z, FRAC_PI_2);
        let b = Quat::from_axis_angle(Vec3::Y, FRAC_PI_2);
        // b first, then a
        let v = a.compose(&b).rotate(Vec3::X);
        assert!(approx(v, a.rotate(b.rotate(Vec3::X))));
    }

    #[test]
    fn test_conjugate_inverts() {
        let q = Quat::from_euler_xyz(0.3, -0.7, 1.1);
        let v = Vec3::new(0.5, -2.0, 4.0);
        assert!(approx(q.conjugate().rotate(q.rotate(v)), v));
    }

    #[test]
    fn test_euler_round_trip() {
        let q = Quat::from_euler_xyz(0.3, -0.7, 1.1);
        let e = q.to_euler_xyz();
        assert!((e.x - 0.3).abs() < 1e-4);
        assert!((e.y + 0.7).abs() < 1e-4);
        assert!((e.z - 1.1).abs() < 1e-4);
    }

    #[test]
    fn test_integrate_stays_normalized() {
        let q = Quat::IDENTITY.integrate(Vec3::new(0.0, 3.0, 0.0), 0.016);
        assert!((q.magnitude_squared() - 1.0).abs() < 0.0001);
        assert!(q.y > 0.0);
    }
}
