//! Minimal kinematic world: spheres moving at constant velocity.
//!
//! There is no collision response; overlapping spheres simply report a one-point contact manifold
//! for as long as they overlap. Stepping follows the usual fixed-substep scheme: simulated time is
//! accumulated and integrated in whole fixed sub-steps, at most `max_substeps` per call.

use std::collections::BTreeMap;

use crate::physics::{BodyId, ContactManifold, ContactPoint, ContactSource, Vec3};

/// A world the driving loop can advance between event dispatches.
pub trait PhysicsWorld: ContactSource {
    /// Push externally driven state into the world before a step.
    fn sync_external_state(&mut self) {}

    /// Advance by `step_secs`, integrating in fixed sub-steps of `fixed_substep_secs`.
    fn step_simulation(&mut self, step_secs: f64, max_substeps: u32, fixed_substep_secs: f64);

    fn body_position(&self, body: BodyId) -> Option<Vec3>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicBody {
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f64,
}

#[derive(Debug, Default)]
pub struct KinematicWorld {
    bodies: BTreeMap<BodyId, KinematicBody>,
    accumulator: f64,
    elapsed_secs: f64,
}

impl KinematicWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_body(&mut self, id: BodyId, body: KinematicBody) {
        self.bodies.insert(id, body);
    }

    pub fn body(&self, id: BodyId) -> Option<&KinematicBody> {
        self.bodies.get(&id)
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&id) {
            body.velocity = velocity;
        }
    }

    /// Physics time integrated so far.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    fn integrate(&mut self, dt: f64) {
        for body in self.bodies.values_mut() {
            body.position = body.position + body.velocity * dt;
        }
        self.elapsed_secs += dt;
    }
}

impl PhysicsWorld for KinematicWorld {
    fn step_simulation(&mut self, step_secs: f64, max_substeps: u32, fixed_substep_secs: f64) {
        if step_secs <= 0.0 {
            return;
        }
        if max_substeps == 0 || fixed_substep_secs <= 0.0 {
            self.integrate(step_secs);
            return;
        }
        self.accumulator += step_secs;
        // tolerate float residue from repeated accumulation
        let whole = (self.accumulator / fixed_substep_secs + 1e-9).floor() as u64;
        let substeps = whole.min(u64::from(max_substeps));
        for _ in 0..substeps {
            self.integrate(fixed_substep_secs);
        }
        // time beyond the sub-step cap is dropped rather than carried forward
        self.accumulator = if whole > substeps { 0.0 } else { (self.accumulator - substeps as f64 * fixed_substep_secs).max(0.0) };
    }

    fn body_position(&self, body: BodyId) -> Option<Vec3> {
        self.bodies.get(&body).map(|body| body.position)
    }
}

impl ContactSource for KinematicWorld {
    fn contact_manifolds(&self) -> Vec<ContactManifold> {
        let bodies: Vec<(&BodyId, &KinematicBody)> = self.bodies.iter().collect();
        let mut manifolds = Vec::new();
        for (i, (id_a, a)) in bodies.iter().enumerate() {
            for (id_b, b) in bodies.iter().skip(i + 1) {
                let offset = b.position - a.position;
                let distance = offset.length();
                if distance >= a.radius + b.radius {
                    continue;
                }
                let normal = if distance > 0.0 { offset * (1.0 / distance) } else { Vec3::new(1.0, 0.0, 0.0) };
                let world_on_a = a.position + normal * a.radius;
                let world_on_b = b.position - normal * b.radius;
                manifolds.push(ContactManifold {
                    body_a: **id_a,
                    body_b: **id_b,
                    points: vec![ContactPoint {
                        local_on_a: world_on_a - a.position,
                        world_on_a,
                        local_on_b: world_on_b - b.position,
                        world_on_b,
                    }],
                });
            }
        }
        manifolds
    }
}
