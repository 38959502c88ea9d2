//! Physics error types

use std::fmt;

use crate::body::BodyId;
use crate::protocol::RayId;

#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// The worker thread is gone; requests can no longer be delivered
    TransportClosed,
    /// No body with this id is known to the bridge
    UnknownBody(BodyId),
    /// No ray with this id is registered
    UnknownRay(RayId),
    /// Body properties were rejected
    InvalidBody(String),
    /// The worker thread could not be started
    Spawn(String),
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::TransportClosed => write!(f, "Physics worker is no longer running"),
            PhysicsError::UnknownBody(id) => write!(f, "Unknown physics body {}", id),
            PhysicsError::UnknownRay(id) => write!(f, "Unknown physics ray {}", id),
            PhysicsError::InvalidBody(msg) => write!(f, "Invalid body: {}", msg),
            PhysicsError::Spawn(msg) => write!(f, "Failed to start physics worker: {}", msg),
        }
    }
}

impl std::error::Error for PhysicsError {}
