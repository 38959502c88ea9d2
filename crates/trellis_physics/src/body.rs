//! Rigid bodies and the properties they are declared with

use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use trellis_math::{Quat, Vec3};

use crate::collision::CollisionFilter;
use crate::material::PhysicsMaterial;
use crate::shapes::{BodyShape, Collider};

new_key_type! {
    /// Key to a rigid body inside one physics world
    pub struct BodyKey;
}

/// Stable body identity shared by the bridge and the worker
///
/// Worker replies name bodies by this id, so a reply for a body removed in
/// the meantime is recognised and dropped instead of reaching a reused slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a body takes part in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Moved by gravity, forces and contacts
    #[default]
    Dynamic,
    /// Never moves
    Static,
    /// Moves by its own velocity only; pushes dynamic bodies, ignores gravity
    Kinematic,
}

/// Everything needed to create a body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyProps {
    pub shape: BodyShape,
    pub body_type: BodyType,
    pub mass: f32,
    pub position: Vec3,
    pub quaternion: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Fraction of linear velocity lost per second
    pub linear_damping: f32,
    /// Fraction of angular velocity lost per second
    pub angular_damping: f32,
    pub material: PhysicsMaterial,
    pub filter: CollisionFilter,
}

impl Default for BodyProps {
    fn default() -> Self {
        Self {
            shape: BodyShape::Box { half_extents: Vec3::splat(0.5) },
            body_type: BodyType::Dynamic,
            mass: 1.0,
            position: Vec3::ZERO,
            quaternion: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            linear_damping: 0.01,
            angular_damping: 0.01,
            material: PhysicsMaterial::default(),
            filter: CollisionFilter::default(),
        }
    }
}

impl BodyProps {
    pub fn sphere(radius: f32) -> Self {
        Self {
            shape: BodyShape::Sphere { radius },
            ..Default::default()
        }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self {
            shape: BodyShape::Box { half_extents },
            ..Default::default()
        }
    }

    /// A static plane; rotate it to choose the facing
    pub fn plane() -> Self {
        Self {
            shape: BodyShape::Plane,
            body_type: BodyType::Static,
            mass: 0.0,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_quaternion(mut self, quaternion: Quat) -> Self {
        self.quaternion = quaternion;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Reject properties the simulation cannot honour
    pub fn validate(&self) -> Result<(), String> {
        if self.body_type == BodyType::Dynamic && !(self.mass > 0.0) {
            return Err(format!("dynamic body needs a positive mass, got {}", self.mass));
        }
        if self.shape == BodyShape::Plane && self.body_type != BodyType::Static {
            return Err("plane bodies must be static".to_string());
        }
        match self.shape {
            BodyShape::Sphere { radius } if !(radius > 0.0) => Err(format!("sphere radius must be positive, got {}", radius)),
            BodyShape::Box { half_extents } if !(half_extents.x > 0.0 && half_extents.y > 0.0 && half_extents.z > 0.0) => {
                Err("box half extents must be positive".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// A body inside the simulation
#[derive(Clone, Debug)]
pub struct RigidBody {
    pub id: BodyId,
    pub shape: BodyShape,
    pub body_type: BodyType,
    pub position: Vec3,
    pub quaternion: Quat,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub material: PhysicsMaterial,
    pub filter: CollisionFilter,
    inverse_mass: f32,
    inverse_inertia: f32,
    force: Vec3,
    torque: Vec3,
}

impl RigidBody {
    pub fn new(id: BodyId, props: &BodyProps) -> Self {
        let dynamic = props.body_type == BodyType::Dynamic;
        let inverse_mass = if dynamic && props.mass > 0.0 { 1.0 / props.mass } else { 0.0 };
        let inertia = props.shape.inertia(props.mass);
        let inverse_inertia = if dynamic && inertia > 0.0 { 1.0 / inertia } else { 0.0 };
        Self {
            id,
            shape: props.shape,
            body_type: props.body_type,
            position: props.position,
            quaternion: props.quaternion.normalize(),
            velocity: if props.body_type == BodyType::Static { Vec3::ZERO } else { props.velocity },
            angular_velocity: if props.body_type == BodyType::Static {
                Vec3::ZERO
            } else {
                props.angular_velocity
            },
            linear_damping: props.linear_damping.clamp(0.0, 1.0),
            angular_damping: props.angular_damping.clamp(0.0, 1.0),
            material: props.material,
            filter: props.filter,
            inverse_mass,
            inverse_inertia,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    /// Current world-space collider
    pub fn collider(&self) -> Collider {
        self.shape.collider(self.position, self.quaternion)
    }

    /// Accumulate a force (N) at a world point until the next step
    pub fn apply_force(&mut self, force: Vec3, world_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
        self.torque += (world_point - self.position).cross(force);
    }

    /// Instantly change momentum by `impulse` applied at a world point
    pub fn apply_impulse(&mut self, impulse: Vec3, world_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.velocity += impulse * self.inverse_mass;
        self.angular_velocity += (world_point - self.position).cross(impulse) * self.inverse_inertia;
    }

    /// Integrate accumulated forces and velocities over `dt`
    ///
    /// Gravity only acts on dynamic bodies. Accumulators are cleared.
    pub(crate) fn integrate(&mut self, gravity: Vec3, dt: f32) {
        match self.body_type {
            BodyType::Static => {}
            BodyType::Kinematic => {
                self.position += self.velocity * dt;
                self.quaternion = self.quaternion.integrate(self.angular_velocity, dt);
            }
            BodyType::Dynamic => {
                self.velocity += (gravity + self.force * self.inverse_mass) * dt;
                self.angular_velocity += self.torque * (self.inverse_inertia * dt);
                self.velocity *= (1.0 - self.linear_damping).powf(dt);
                self.angular_velocity *= (1.0 - self.angular_damping).powf(dt);
                self.position += self.velocity * dt;
                self.quaternion = self.quaternion.integrate(self.angular_velocity, dt);
            }
        }
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_body_integrates_gravity() {
        let mut body = RigidBody::new(BodyId(1), &BodyProps::sphere(0.5).with_position(Vec3::new(0.0, 10.0, 0.0)));
        body.linear_damping = 0.0;
        body.integrate(Vec3::new(0.0, -10.0, 0.0), 0.1);
        assert!((body.velocity.y + 1.0).abs() < 1e-5);
        assert!((body.position.y - 9.9).abs() < 1e-5);
    }

    #[test]
    fn test_static_body_ignores_everything() {
        let props = BodyProps::cuboid(Vec3::ONE)
            .with_type(BodyType::Static)
            .with_velocity(Vec3::X);
        let mut body = RigidBody::new(BodyId(1), &props);
        body.apply_impulse(Vec3::Y * 5.0, Vec3::ZERO);
        body.integrate(Vec3::new(0.0, -10.0, 0.0), 1.0);
        assert_eq!(body.position, Vec3::ZERO);
        assert_eq!(body.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_kinematic_body_ignores_gravity() {
        let props = BodyProps::cuboid(Vec3::ONE)
            .with_type(BodyType::Kinematic)
            .with_velocity(Vec3::X);
        let mut body = RigidBody::new(BodyId(1), &props);
        body.integrate(Vec3::new(0.0, -10.0, 0.0), 0.5);
        assert!((body.position - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_force_is_cleared_after_step() {
        let mut body = RigidBody::new(BodyId(1), &BodyProps::sphere(1.0).with_mass(2.0));
        body.linear_damping = 0.0;
        body.apply_force(Vec3::X * 4.0, body.position);
        body.integrate(Vec3::ZERO, 1.0);
        assert!((body.velocity.x - 2.0).abs() < 1e-5);
        body.integrate(Vec3::ZERO, 1.0);
        assert!((body.velocity.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_off_center_impulse_spins() {
        let mut body = RigidBody::new(BodyId(1), &BodyProps::sphere(1.0));
        body.apply_impulse(Vec3::X, Vec3::new(0.0, 1.0, 0.0));
        assert!(body.velocity.x > 0.0);
        // r = +Y, J = +X -> torque about -Z
        assert!(body.angular_velocity.z < 0.0);
    }

    #[test]
    fn test_validate() {
        assert!(BodyProps::sphere(1.0).validate().is_ok());
        assert!(BodyProps::sphere(0.0).validate().is_err());
        assert!(BodyProps::sphere(1.0).with_mass(0.0).validate().is_err());
        assert!(BodyProps::plane().validate().is_ok());
        assert!(BodyProps::plane().with_type(BodyType::Dynamic).with_mass(1.0).validate().is_err());
        assert!(BodyProps::sphere(1.0).with_mass(0.0).with_type(BodyType::Kinematic).validate().is_ok());
    }
}
