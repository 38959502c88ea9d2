//! Surface response of a body in contact

use serde::{Deserialize, Serialize};

/// Friction and restitution, both in `[0, 1]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsMaterial {
    /// Share of tangential velocity removed per contact
    pub friction: f32,
    /// Share of normal velocity kept after a bounce
    pub restitution: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self::new(0.3, 0.0)
    }
}

impl PhysicsMaterial {
    /// Slides without bouncing
    pub const SLICK: Self = Self { friction: 0.02, restitution: 0.0 };
    /// Grips and bounces back most of its speed
    pub const RUBBER: Self = Self { friction: 0.9, restitution: 0.8 };
    /// Grips and absorbs impacts
    pub const FELT: Self = Self { friction: 1.0, restitution: 0.0 };

    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction: friction.clamp(0.0, 1.0),
            restitution: restitution.clamp(0.0, 1.0),
        }
    }

    pub fn with_friction(self, friction: f32) -> Self {
        Self::new(friction, self.restitution)
    }

    pub fn with_restitution(self, restitution: f32) -> Self {
        Self::new(self.friction, restitution)
    }

    /// Response used for a contact between two surfaces
    ///
    /// The grippier surface is limited by the slicker one (geometric mean);
    /// the bouncier surface wins.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            friction: (self.friction * other.friction).sqrt(),
            restitution: self.restitution.max(other.restitution),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_clamped() {
        let material = PhysicsMaterial::new(1.5, -0.5);
        assert_eq!((material.friction, material.restitution), (1.0, 0.0));
        assert_eq!(PhysicsMaterial::default().with_restitution(2.0).restitution, 1.0);
    }

    #[test]
    fn test_slick_surface_limits_friction() {
        let contact = PhysicsMaterial::SLICK.combine(&PhysicsMaterial::FELT);
        assert!((contact.friction - 0.02_f32.sqrt()).abs() < 1e-6);
        assert_eq!(contact.restitution, 0.0);
    }

    #[test]
    fn test_bounce_comes_from_either_side() {
        let a = PhysicsMaterial::RUBBER.combine(&PhysicsMaterial::FELT);
        let b = PhysicsMaterial::FELT.combine(&PhysicsMaterial::RUBBER);
        assert_eq!(a, b);
        assert_eq!(a.restitution, 0.8);
    }
}
