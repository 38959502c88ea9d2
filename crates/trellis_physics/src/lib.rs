//! Rigid body physics for trellis scenes
//!
//! The simulation runs on a worker reached only by messages:
//! - [`PhysicsWorld`] - Bodies, contacts, constraints and ray queries
//! - [`Worker`] - Applies [`WorkerRequest`]s and reports [`WorkerEvent`]s
//! - [`Transport`] - Channel to a worker ([`ThreadTransport`], [`ManualTransport`])
//! - [`PhysicsBridge`] - Declares bodies and copies their transforms onto scene nodes

pub mod body;
pub mod bridge;
pub mod collision;
mod error;
pub mod material;
pub mod protocol;
pub mod shapes;
pub mod worker;
pub mod world;

pub use body::{BodyId, BodyKey, BodyProps, BodyType, RigidBody};
pub use bridge::{BodyHandle, PhysicsBridge};
pub use collision::{CollisionFilter, CollisionLayer, Contact};
pub use error::PhysicsError;
pub use material::PhysicsMaterial;
pub use protocol::{RayId, WorkerEvent, WorkerRequest, POSITION_STRIDE};
pub use shapes::{Aabb, BodyShape, Collider, Plane, Sphere};
pub use worker::{ManualTransport, ThreadTransport, Transport, Waker, Worker, EVENT_CAPACITY};
pub use world::{
    CollideEvent, ConstraintId, DistanceConstraint, PhysicsConfig, PhysicsWorld, RayHit, RayMode, RayOptions,
};
