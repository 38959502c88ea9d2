//! Messages exchanged with the physics worker
//!
//! Both directions are plain serde enums so a transport may move them over a
//! channel as values or encode them for another process. Body transforms are
//! batched into one flat `f32` buffer per step.

use std::fmt;

use serde::{Deserialize, Serialize};
use trellis_math::{Quat, Vec3};

use crate::body::{BodyId, BodyProps, RigidBody};
use crate::world::{CollideEvent, ConstraintId, DistanceConstraint, RayHit, RayOptions};

/// Floats per body in a positions buffer: position xyz, quaternion xyzw
pub const POSITION_STRIDE: usize = 7;

/// Identity of a registered ray query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RayId(pub u64);

impl fmt::Display for RayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ray#{}", self.0)
    }
}

/// Bridge to worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerRequest {
    AddBody { id: BodyId, props: BodyProps },
    RemoveBody { id: BodyId },
    SetPosition { id: BodyId, position: Vec3 },
    SetQuaternion { id: BodyId, quaternion: Quat },
    SetVelocity { id: BodyId, velocity: Vec3 },
    SetAngularVelocity { id: BodyId, angular_velocity: Vec3 },
    ApplyImpulse { id: BodyId, impulse: Vec3, world_point: Vec3 },
    ApplyForce { id: BodyId, force: Vec3, world_point: Vec3 },
    SetGravity { gravity: Vec3 },
    AddConstraint { id: ConstraintId, constraint: DistanceConstraint },
    RemoveConstraint { id: ConstraintId },
    AddRay { id: RayId, options: RayOptions },
    RemoveRay { id: RayId },
    Shutdown,
}

impl WorkerRequest {
    /// Short operation name for logs
    pub fn op(&self) -> &'static str {
        match self {
            WorkerRequest::AddBody { .. } => "addBody",
            WorkerRequest::RemoveBody { .. } => "removeBody",
            WorkerRequest::SetPosition { .. } => "setPosition",
            WorkerRequest::SetQuaternion { .. } => "setQuaternion",
            WorkerRequest::SetVelocity { .. } => "setVelocity",
            WorkerRequest::SetAngularVelocity { .. } => "setAngularVelocity",
            WorkerRequest::ApplyImpulse { .. } => "applyImpulse",
            WorkerRequest::ApplyForce { .. } => "applyForce",
            WorkerRequest::SetGravity { .. } => "setGravity",
            WorkerRequest::AddConstraint { .. } => "addConstraint",
            WorkerRequest::RemoveConstraint { .. } => "removeConstraint",
            WorkerRequest::AddRay { .. } => "addRay",
            WorkerRequest::RemoveRay { .. } => "removeRay",
            WorkerRequest::Shutdown => "shutdown",
        }
    }
}

/// Worker to bridge
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WorkerEvent {
    /// Transforms of every body after a step, `ids[i]` owning
    /// `buffer[i * POSITION_STRIDE..(i + 1) * POSITION_STRIDE]`
    Positions { ids: Vec<BodyId>, buffer: Vec<f32> },
    RayHit { ray: RayId, hits: Vec<RayHit> },
    Collide(CollideEvent),
    /// A request could not be applied
    Error { message: String },
}

impl WorkerEvent {
    /// Pack body transforms into a positions event
    pub fn positions<'a>(bodies: impl IntoIterator<Item = &'a RigidBody>) -> Self {
        let mut ids = Vec::new();
        let mut buffer = Vec::new();
        for body in bodies {
            ids.push(body.id);
            buffer.extend_from_slice(&body.position.to_array());
            buffer.extend_from_slice(&body.quaternion.to_array());
        }
        WorkerEvent::Positions { ids, buffer }
    }
}

/// Unpack a positions buffer; a truncated tail is ignored
pub fn decode_positions(ids: &[BodyId], buffer: &[f32]) -> Vec<(BodyId, Vec3, Quat)> {
    ids.iter()
        .zip(buffer.chunks_exact(POSITION_STRIDE))
        .map(|(&id, chunk)| {
            let position = Vec3::new(chunk[0], chunk[1], chunk[2]);
            let quaternion = Quat::new(chunk[3], chunk[4], chunk[5], chunk[6]);
            (id, position, quaternion)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_pack_and_unpack() {
        let mut a = RigidBody::new(BodyId(3), &BodyProps::sphere(1.0));
        a.position = Vec3::new(1.0, 2.0, 3.0);
        let b = RigidBody::new(BodyId(9), &BodyProps::sphere(1.0));

        let WorkerEvent::Positions { ids, buffer } = WorkerEvent::positions([&a, &b]) else {
            panic!("expected positions");
        };
        assert_eq!(buffer.len(), 2 * POSITION_STRIDE);

        let decoded = decode_positions(&ids, &buffer);
        assert_eq!(decoded[0], (BodyId(3), Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY));
        assert_eq!(decoded[1].0, BodyId(9));
    }

    #[test]
    fn test_truncated_buffer_is_ignored() {
        let decoded = decode_positions(&[BodyId(1), BodyId(2)], &[0.0; POSITION_STRIDE + 3]);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_op_names() {
        assert_eq!(WorkerRequest::Shutdown.op(), "shutdown");
        assert_eq!(WorkerRequest::RemoveRay { id: RayId(1) }.op(), "removeRay");
    }
}
