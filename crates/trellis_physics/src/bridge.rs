//! Scene-side half of the physics integration
//!
//! The bridge assigns body ids, forwards mutations to the worker and keeps
//! the latest transform the worker reported for each body. [`PhysicsBridge::sync`]
//! writes those transforms straight onto scene nodes once per frame, outside
//! of any property diffing.

use std::collections::HashMap;

use trellis_core::{NodeKey, SceneGraph};
use trellis_math::{Quat, Vec3};

use crate::body::{BodyId, BodyProps};
use crate::error::PhysicsError;
use crate::protocol::{decode_positions, RayId, WorkerEvent, WorkerRequest};
use crate::world::{CollideEvent, ConstraintId, DistanceConstraint, RayHit, RayOptions};
use crate::worker::Transport;

pub type RayCallback = Box<dyn FnMut(&[RayHit])>;
pub type CollideCallback = Box<dyn FnMut(&CollideEvent)>;

/// A body declared through the bridge and the node it drives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    pub id: BodyId,
    pub node: NodeKey,
}

struct TrackedBody {
    node: NodeKey,
    latest: Option<(Vec3, Quat)>,
}

pub struct PhysicsBridge {
    transport: Box<dyn Transport>,
    bodies: HashMap<BodyId, TrackedBody>,
    rays: HashMap<RayId, RayCallback>,
    collide_handlers: HashMap<BodyId, CollideCallback>,
    constraints: HashMap<ConstraintId, DistanceConstraint>,
    next_id: u64,
    dropped: u64,
}

impl PhysicsBridge {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            bodies: HashMap::new(),
            rays: HashMap::new(),
            collide_handlers: HashMap::new(),
            constraints: HashMap::new(),
            next_id: 1,
            dropped: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn known(&self, id: BodyId) -> Result<(), PhysicsError> {
        if self.bodies.contains_key(&id) {
            Ok(())
        } else {
            Err(PhysicsError::UnknownBody(id))
        }
    }

    // --- Bodies ---

    /// Register a body whose transform will drive `node`
    pub fn add_body(&mut self, node: NodeKey, props: BodyProps) -> Result<BodyHandle, PhysicsError> {
        props.validate().map_err(PhysicsError::InvalidBody)?;
        let id = BodyId(self.next_id());
        self.transport.send(WorkerRequest::AddBody { id, props })?;
        self.bodies.insert(id, TrackedBody { node, latest: None });
        log::debug!("Added body {} for node {:?}", id, node);
        Ok(BodyHandle { id, node })
    }

    /// Unregister a body; transforms still in flight for it are discarded
    pub fn remove_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        if self.bodies.remove(&id).is_none() {
            return Err(PhysicsError::UnknownBody(id));
        }
        self.collide_handlers.remove(&id);
        self.constraints.retain(|_, c| c.a != id && c.b != id);
        log::debug!("Removed body {}", id);
        self.transport.send(WorkerRequest::RemoveBody { id })
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn set_position(&mut self, id: BodyId, position: Vec3) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.transport.send(WorkerRequest::SetPosition { id, position })
    }

    pub fn set_quaternion(&mut self, id: BodyId, quaternion: Quat) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.transport.send(WorkerRequest::SetQuaternion { id, quaternion })
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: Vec3) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.transport.send(WorkerRequest::SetVelocity { id, velocity })
    }

    pub fn set_angular_velocity(&mut self, id: BodyId, angular_velocity: Vec3) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.transport
            .send(WorkerRequest::SetAngularVelocity { id, angular_velocity })
    }

    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec3, world_point: Vec3) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.transport.send(WorkerRequest::ApplyImpulse {
            id,
            impulse,
            world_point,
        })
    }

    pub fn apply_force(&mut self, id: BodyId, force: Vec3, world_point: Vec3) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.transport.send(WorkerRequest::ApplyForce { id, force, world_point })
    }

    pub fn set_gravity(&mut self, gravity: Vec3) -> Result<(), PhysicsError> {
        self.transport.send(WorkerRequest::SetGravity { gravity })
    }

    // --- Constraints ---

    /// Keep the centers of `a` and `b` `distance` apart
    pub fn add_constraint(&mut self, a: BodyId, b: BodyId, distance: f32) -> Result<ConstraintId, PhysicsError> {
        self.known(a)?;
        self.known(b)?;
        let id = ConstraintId(self.next_id());
        let constraint = DistanceConstraint { a, b, distance };
        self.transport.send(WorkerRequest::AddConstraint { id, constraint })?;
        self.constraints.insert(id, constraint);
        Ok(id)
    }

    /// Returns false if the constraint was already gone
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<bool, PhysicsError> {
        if self.constraints.remove(&id).is_none() {
            return Ok(false);
        }
        self.transport.send(WorkerRequest::RemoveConstraint { id })?;
        Ok(true)
    }

    // --- Rays ---

    /// Register a ray query; `callback` runs whenever the worker reports hits
    pub fn add_ray(
        &mut self,
        options: RayOptions,
        callback: impl FnMut(&[RayHit]) + 'static,
    ) -> Result<RayId, PhysicsError> {
        let id = RayId(self.next_id());
        self.transport.send(WorkerRequest::AddRay { id, options })?;
        self.rays.insert(id, Box::new(callback));
        Ok(id)
    }

    pub fn remove_ray(&mut self, id: RayId) -> Result<(), PhysicsError> {
        if self.rays.remove(&id).is_none() {
            return Err(PhysicsError::UnknownRay(id));
        }
        self.transport.send(WorkerRequest::RemoveRay { id })
    }

    pub fn ray_count(&self) -> usize {
        self.rays.len()
    }

    /// Run `callback` for every contact involving `id`; replaces any earlier one
    pub fn on_collide(&mut self, id: BodyId, callback: impl FnMut(&CollideEvent) + 'static) -> Result<(), PhysicsError> {
        self.known(id)?;
        self.collide_handlers.insert(id, Box::new(callback));
        Ok(())
    }

    // --- Inbound ---

    /// Drain worker events, returning how many were read
    ///
    /// Transforms are kept per body, newest wins. Anything addressed to a
    /// body or ray that is no longer registered is dropped.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.transport.try_recv() {
            count += 1;
            match event {
                WorkerEvent::Positions { ids, buffer } => {
                    for (id, position, quaternion) in decode_positions(&ids, &buffer) {
                        match self.bodies.get_mut(&id) {
                            Some(tracked) => tracked.latest = Some((position, quaternion)),
                            None => self.dropped += 1,
                        }
                    }
                }
                WorkerEvent::RayHit { ray, hits } => match self.rays.get_mut(&ray) {
                    Some(callback) => callback(hits.as_slice()),
                    None => log::trace!("Hit for removed {}", ray),
                },
                WorkerEvent::Collide(collision) => {
                    if let Some(callback) = self.collide_handlers.get_mut(&collision.body) {
                        callback(&collision);
                    }
                }
                WorkerEvent::Error { message } => log::warn!("Physics worker: {}", message),
            }
        }
        count
    }

    /// Poll, then write the newest transforms onto their nodes
    ///
    /// Returns the number of nodes updated. Bodies whose node is gone are
    /// skipped.
    pub fn sync(&mut self, graph: &mut SceneGraph) -> usize {
        self.poll();
        let mut applied = 0;
        for (id, tracked) in self.bodies.iter_mut() {
            let Some((position, quaternion)) = tracked.latest.take() else {
                continue;
            };
            let Some(node) = graph.get_mut(tracked.node) else {
                log::trace!("Node for body {} is gone", id);
                continue;
            };
            node.position = position;
            node.quaternion = quaternion;
            node.rotation = quaternion.to_euler_xyz();
            applied += 1;
        }
        applied
    }

    /// Transforms discarded because their body was already removed
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use trellis_core::SceneNode;

    use crate::body::BodyType;
    use crate::worker::ManualTransport;
    use crate::world::RayMode;

    const STEP: f32 = 1.0 / 60.0;

    fn setup() -> (PhysicsBridge, ManualTransport, SceneGraph) {
        let transport = ManualTransport::weightless();
        let bridge = PhysicsBridge::new(Box::new(transport.clone()));
        (bridge, transport, SceneGraph::new())
    }

    #[test]
    fn test_sync_applies_worker_transform() {
        let (mut bridge, transport, mut graph) = setup();
        let node = graph.insert(SceneNode::mesh());
        let props = BodyProps::sphere(0.5)
            .with_position(Vec3::new(0.0, 5.0, 0.0))
            .with_velocity(Vec3::X * 6.0);
        bridge.add_body(node, props).unwrap();

        // Nothing arrives before the worker runs
        assert_eq!(bridge.sync(&mut graph), 0);

        transport.step(STEP);
        assert_eq!(bridge.sync(&mut graph), 1);
        let position = graph.get(node).unwrap().position;
        assert!(position.x > 0.0);
        assert!((position.y - 5.0).abs() < 1e-5);

        // Each report is applied once
        assert_eq!(bridge.sync(&mut graph), 0);
    }

    #[test]
    fn test_remove_before_reply_applies_nothing() {
        let (mut bridge, transport, mut graph) = setup();
        let node = graph.insert(SceneNode::mesh());
        let handle = bridge.add_body(node, BodyProps::sphere(0.5)).unwrap();
        bridge.remove_body(handle.id).unwrap();

        // A reply already in flight for the removed body
        transport.inject(WorkerEvent::Positions {
            ids: vec![handle.id],
            buffer: vec![9.0, 9.0, 9.0, 0.0, 0.0, 0.0, 1.0],
        });
        transport.step(STEP);

        assert_eq!(bridge.sync(&mut graph), 0);
        assert_eq!(graph.get(node).unwrap().position, Vec3::ZERO);
        assert_eq!(bridge.dropped(), 1);
        assert_eq!(transport.worker().world().body_count(), 0);
    }

    #[test]
    fn test_newest_transform_wins() {
        let (mut bridge, transport, mut graph) = setup();
        let node = graph.insert(SceneNode::mesh());
        let handle = bridge.add_body(node, BodyProps::sphere(0.5)).unwrap();
        for x in [1.0, 2.0, 3.0] {
            transport.inject(WorkerEvent::Positions {
                ids: vec![handle.id],
                buffer: vec![x, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            });
        }
        assert_eq!(bridge.sync(&mut graph), 1);
        assert_eq!(graph.get(node).unwrap().position.x, 3.0);
    }

    #[test]
    fn test_sync_sets_rotation_from_quaternion() {
        let (mut bridge, transport, mut graph) = setup();
        let node = graph.insert(SceneNode::mesh());
        let handle = bridge.add_body(node, BodyProps::sphere(0.5)).unwrap();
        let q = Quat::from_axis_angle(Vec3::Y, 0.5);
        transport.inject(WorkerEvent::Positions {
            ids: vec![handle.id],
            buffer: vec![0.0, 0.0, 0.0, q.x, q.y, q.z, q.w],
        });
        bridge.sync(&mut graph);
        let scene_node = graph.get(node).unwrap();
        assert_eq!(scene_node.quaternion, q);
        assert!((scene_node.rotation.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_missing_node_is_skipped() {
        let (mut bridge, transport, mut graph) = setup();
        let node = graph.insert(SceneNode::mesh());
        bridge.add_body(node, BodyProps::sphere(0.5)).unwrap();
        graph.dispose(node);
        transport.step(STEP);
        assert_eq!(bridge.sync(&mut graph), 0);
    }

    #[test]
    fn test_ray_callback_until_removed() {
        let (mut bridge, transport, mut graph) = setup();
        let node = graph.insert(SceneNode::mesh());
        let target = bridge
            .add_body(node, BodyProps::sphere(0.5).with_position(Vec3::new(0.0, 0.0, -4.0)))
            .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let options = RayOptions::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0)).with_mode(RayMode::Closest);
        let ray = bridge
            .add_ray(options, move |hits| sink.borrow_mut().extend(hits.iter().map(|h| h.body)))
            .unwrap();

        transport.step(STEP);
        bridge.poll();
        assert_eq!(*seen.borrow(), vec![target.id]);

        bridge.remove_ray(ray).unwrap();
        transport.step(STEP);
        bridge.poll();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(bridge.remove_ray(ray), Err(PhysicsError::UnknownRay(ray)));
    }

    #[test]
    fn test_on_collide_reports_other_body() {
        let (mut bridge, transport, mut graph) = setup();
        let floor = bridge
            .add_body(graph.insert(SceneNode::mesh()), BodyProps::cuboid(Vec3::new(5.0, 0.5, 5.0)).with_type(BodyType::Static))
            .unwrap();
        let ball = bridge
            .add_body(
                graph.insert(SceneNode::mesh()),
                BodyProps::sphere(0.5).with_position(Vec3::new(0.0, 0.9, 0.0)),
            )
            .unwrap();

        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let floor_id = floor.id;
        bridge
            .on_collide(ball.id, move |event| {
                assert_eq!(event.other, floor_id);
                counter.set(counter.get() + 1);
            })
            .unwrap();

        transport.step(STEP);
        bridge.sync(&mut graph);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_unknown_bodies_are_rejected() {
        let (mut bridge, transport, mut graph) = setup();
        assert_eq!(
            bridge.set_velocity(BodyId(99), Vec3::X),
            Err(PhysicsError::UnknownBody(BodyId(99)))
        );
        assert!(bridge.remove_body(BodyId(99)).is_err());

        let node = graph.insert(SceneNode::mesh());
        let result = bridge.add_body(node, BodyProps::sphere(-1.0));
        assert!(matches!(result, Err(PhysicsError::InvalidBody(_))));
        assert_eq!(transport.sent(), 0);
    }

    #[test]
    fn test_constraints_follow_their_bodies() {
        let (mut bridge, transport, mut graph) = setup();
        let a = bridge.add_body(graph.insert(SceneNode::mesh()), BodyProps::sphere(0.2)).unwrap();
        let b = bridge
            .add_body(
                graph.insert(SceneNode::mesh()),
                BodyProps::sphere(0.2).with_position(Vec3::new(1.0, 0.0, 0.0)),
            )
            .unwrap();
        let constraint = bridge.add_constraint(a.id, b.id, 1.0).unwrap();
        transport.step(STEP);
        assert_eq!(transport.worker().world().constraint_count(), 1);

        bridge.remove_body(b.id).unwrap();
        assert_eq!(bridge.remove_constraint(constraint), Ok(false));
        transport.step(STEP);
        assert_eq!(transport.worker().world().constraint_count(), 0);
    }
}
