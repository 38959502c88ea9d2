//! 3D Mathematics Library
//!
//! This crate provides the vector, rotation and matrix types shared by the
//! scene graph, the raycaster and the physics simulation.
//!
//! ## Core Types
//!
//! - [`Vec2`] - 2D vector, used for normalized pointer coordinates
//! - [`Vec3`] - 3D vector with x, y, z components
//! - [`Quat`] - Unit quaternion rotation
//! - [`Mat4`] - Column-major 4x4 affine/projection matrix
//! - [`Ray`] - Half-line used for picking and physics queries

mod vec2;
mod vec3;
mod quat;
pub mod mat4;
pub mod ray;

pub use vec2::Vec2;
pub use vec3::Vec3;
pub use quat::Quat;
pub use mat4::Mat4;
pub use ray::{Ray, RayBoxHit};
