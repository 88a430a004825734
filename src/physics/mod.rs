//! Physics collaborator boundary.
//!
//! The simulator does not own rigid-body dynamics. It only needs:
//! - a source of per-substep contact manifolds (`ContactSource`)
//! - a world it can step forward (`PhysicsWorld`)
//!
//! `contact` turns manifolds into collision events; `kinematic` is a minimal world used by the CLI
//! and the tests.

pub mod contact;
pub mod kinematic;

use serde::Deserialize;
use std::ops::{Add, Mul, Sub};

pub use contact::{Contact, ContactBridge, ContactManifold, ContactPoint, ContactSource};
pub use kinematic::{KinematicBody, KinematicWorld, PhysicsWorld};

/// Identifier of a physical body in the physics world.
pub type BodyId = u32;

/// World-space vector in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length2(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(self) -> f64 {
        self.length2().sqrt()
    }

    pub fn distance(self, other: Vec3) -> f64 {
        (self - other).length()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Vec3 { x, y, z }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}
