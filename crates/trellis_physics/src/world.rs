//! Physics world and simulation

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use trellis_math::{Ray, Vec3};

use crate::body::{BodyId, BodyKey, BodyProps, RigidBody};
use crate::collision::{collide, CollisionLayer};
use crate::error::PhysicsError;

/// Configuration for the physics simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration in m/s²
    pub gravity: Vec3,
    /// Fixed simulation step in seconds
    pub fixed_step: f32,
    /// Most steps taken for one `advance`; surplus time is dropped
    pub max_sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_step: 1.0 / 60.0,
            max_sub_steps: 10,
        }
    }
}

impl PhysicsConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }
}

/// Identity of a distance constraint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub u64);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint#{}", self.0)
    }
}

/// Keeps two body centers a fixed distance apart
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceConstraint {
    pub a: BodyId,
    pub b: BodyId,
    pub distance: f32,
}

/// One body's view of a contact during a step
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollideEvent {
    pub body: BodyId,
    pub other: BodyId,
    pub point: Vec3,
    /// Points from `other` toward `body`
    pub normal: Vec3,
    /// Closing speed along the normal, never negative
    pub impact_velocity: f32,
}

/// How many hits a ray query reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RayMode {
    #[default]
    Closest,
    /// First hit found, not necessarily the nearest
    Any,
    /// Every hit, nearest first
    All,
}

/// A ray query from `from` to `to`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RayOptions {
    pub from: Vec3,
    pub to: Vec3,
    pub mode: RayMode,
    /// Layers the ray can hit
    pub mask: CollisionLayer,
}

impl RayOptions {
    pub fn new(from: Vec3, to: Vec3) -> Self {
        Self {
            from,
            to,
            mode: RayMode::Closest,
            mask: CollisionLayer::ALL,
        }
    }

    pub fn with_mode(mut self, mode: RayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mask(mut self, mask: CollisionLayer) -> Self {
        self.mask = mask;
        self
    }
}

/// A body struck by a ray
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    pub body: BodyId,
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

/// The physics world containing all rigid bodies
pub struct PhysicsWorld {
    bodies: SlotMap<BodyKey, RigidBody>,
    ids: HashMap<BodyId, BodyKey>,
    constraints: HashMap<ConstraintId, DistanceConstraint>,
    collisions: Vec<CollideEvent>,
    accumulator: f32,
    pub config: PhysicsConfig,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    pub fn with_config(config: PhysicsConfig) -> Self {
        Self {
            bodies: SlotMap::with_key(),
            ids: HashMap::new(),
            constraints: HashMap::new(),
            collisions: Vec::new(),
            accumulator: 0.0,
            config,
        }
    }

    // --- Bodies ---

    /// Add a body; an existing body with the same id is replaced
    pub fn add_body(&mut self, id: BodyId, props: &BodyProps) -> Result<BodyKey, PhysicsError> {
        props.validate().map_err(PhysicsError::InvalidBody)?;
        if let Some(old) = self.ids.remove(&id) {
            log::warn!("Body {} added twice, replacing", id);
            self.bodies.remove(old);
        }
        let key = self.bodies.insert(RigidBody::new(id, props));
        self.ids.insert(id, key);
        Ok(key)
    }

    /// Remove a body and every constraint that references it
    pub fn remove_body(&mut self, id: BodyId) -> Option<RigidBody> {
        let key = self.ids.remove(&id)?;
        self.constraints.retain(|_, c| c.a != id && c.b != id);
        self.bodies.remove(key)
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.ids.get(&id).and_then(|&key| self.bodies.get(key))
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        let key = *self.ids.get(&id)?;
        self.bodies.get_mut(key)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.values()
    }

    // --- Constraints ---

    pub fn add_constraint(&mut self, id: ConstraintId, constraint: DistanceConstraint) -> Result<(), PhysicsError> {
        for body in [constraint.a, constraint.b] {
            if !self.ids.contains_key(&body) {
                return Err(PhysicsError::UnknownBody(body));
            }
        }
        self.constraints.insert(id, constraint);
        Ok(())
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> bool {
        self.constraints.remove(&id).is_some()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // --- Simulation ---

    /// Advance by wall-clock `elapsed` seconds using fixed steps
    ///
    /// Returns the number of steps taken.
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        let step = self.config.fixed_step;
        if !(step > 0.0) || !(elapsed > 0.0) {
            return 0;
        }
        self.accumulator += elapsed;
        let mut steps = 0;
        while self.accumulator >= step && steps < self.config.max_sub_steps {
            self.step(step);
            self.accumulator -= step;
            steps += 1;
        }
        if self.accumulator >= step {
            log::debug!("Physics fell behind, dropping {:.3}s", self.accumulator);
            self.accumulator %= step;
        }
        steps
    }

    /// Run one step of `dt` seconds
    ///
    /// 1. Integrate forces and velocities
    /// 2. Resolve contacts between every colliding pair
    /// 3. Project distance constraints
    pub fn step(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            body.integrate(gravity, dt);
        }
        self.resolve_contacts();
        self.solve_constraints();
    }

    /// Collide events gathered since the last drain
    pub fn drain_collisions(&mut self) -> Vec<CollideEvent> {
        std::mem::take(&mut self.collisions)
    }

    fn resolve_contacts(&mut self) {
        let keys: Vec<BodyKey> = self.bodies.keys().collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                self.resolve_pair(keys[i], keys[j]);
            }
        }
    }

    fn resolve_pair(&mut self, key_a: BodyKey, key_b: BodyKey) {
        let (a, b) = (&self.bodies[key_a], &self.bodies[key_b]);
        if !a.is_dynamic() && !b.is_dynamic() {
            return;
        }
        if !a.filter.collides_with(&b.filter) {
            return;
        }
        let Some(contact) = collide(&a.collider(), &b.collider()) else {
            return;
        };

        let n = contact.normal;
        let closing = (a.velocity - b.velocity).dot(n);
        let impact_velocity = (-closing).max(0.0);
        self.collisions.push(CollideEvent {
            body: a.id,
            other: b.id,
            point: contact.point,
            normal: n,
            impact_velocity,
        });
        self.collisions.push(CollideEvent {
            body: b.id,
            other: a.id,
            point: contact.point,
            normal: -n,
            impact_velocity,
        });

        // Sensors report but are never pushed
        if a.filter.layer.contains(CollisionLayer::SENSOR) || b.filter.layer.contains(CollisionLayer::SENSOR) {
            return;
        }

        let (ia, ib) = (a.inverse_mass(), b.inverse_mass());
        let total = ia + ib;
        if total <= 0.0 {
            return;
        }
        let material = a.material.combine(&b.material);

        // Split the correction by inverse mass
        let correction = n * (contact.penetration / total);
        self.bodies[key_a].position += correction * ia;
        self.bodies[key_b].position -= correction * ib;

        if closing >= 0.0 {
            return;
        }
        let relative = self.bodies[key_a].velocity - self.bodies[key_b].velocity;
        let j = -(1.0 + material.restitution) * closing / total;
        let tangent = relative - n * closing;
        let friction = tangent * (material.friction / total);

        let body_a = &mut self.bodies[key_a];
        body_a.velocity += n * (j * ia) - friction * ia;
        let body_b = &mut self.bodies[key_b];
        body_b.velocity -= n * (j * ib) - friction * ib;
    }

    fn solve_constraints(&mut self) {
        let constraints: Vec<DistanceConstraint> = self.constraints.values().copied().collect();
        for c in constraints {
            let (Some(&key_a), Some(&key_b)) = (self.ids.get(&c.a), self.ids.get(&c.b)) else {
                continue;
            };
            let (a, b) = (&self.bodies[key_a], &self.bodies[key_b]);
            let (ia, ib) = (a.inverse_mass(), b.inverse_mass());
            let total = ia + ib;
            let delta = a.position - b.position;
            let length = delta.length();
            if total <= 0.0 || length < 1e-6 {
                continue;
            }
            let dir = delta / length;
            let error = length - c.distance;
            let along = (a.velocity - b.velocity).dot(dir);

            let body_a = &mut self.bodies[key_a];
            body_a.position -= dir * (error * ia / total);
            body_a.velocity -= dir * (along * ia / total);
            let body_b = &mut self.bodies[key_b];
            body_b.position += dir * (error * ib / total);
            body_b.velocity += dir * (along * ib / total);
        }
    }

    // --- Queries ---

    /// Cast a ray between two points; hits beyond `to` are ignored
    pub fn raycast(&self, options: &RayOptions) -> Vec<RayHit> {
        let length = options.from.distance(options.to);
        if length < 1e-6 {
            return Vec::new();
        }
        let ray = Ray::between(options.from, options.to);
        let mut hits = Vec::new();
        for body in self.bodies.values() {
            if !body.filter.layer.intersects(options.mask) {
                continue;
            }
            let Some((t, normal)) = body.collider().raycast(&ray) else {
                continue;
            };
            if t > length {
                continue;
            }
            hits.push(RayHit {
                body: body.id,
                distance: t,
                point: ray.at(t),
                normal,
            });
            if options.mode == RayMode::Any {
                return hits;
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        if options.mode == RayMode::Closest {
            hits.truncate(1);
        }
        hits
    }
}
