//! Contact bridge between the physics world and the event engine.
//!
//! Every call to [`ContactBridge::update`] rebuilds the contact-point lists from the manifolds the
//! physics world reports and diffs the touching pairs against the previous call. A pair that starts
//! touching produces one collision event per listener on each of its two bodies; pairs that stay in
//! contact stay silent.

use log::{trace, warn};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::Result;
use crate::kernel::{CollisionEvent, Event, ModelId, Scheduler, SimTime};
use crate::physics::{BodyId, Vec3};

/// One contact point of a manifold, in both bodies' frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub local_on_a: Vec3,
    pub world_on_a: Vec3,
    pub local_on_b: Vec3,
    pub world_on_b: Vec3,
}

/// All contact points between one pair of bodies after a sub-step.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub points: Vec<ContactPoint>,
}

/// Anything that can report the current contact manifolds.
pub trait ContactSource {
    fn contact_manifolds(&self) -> Vec<ContactManifold>;
}

/// A contact as seen from one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub body_local: Vec3,
    pub world: Vec3,
    pub other: BodyId,
}

#[derive(Debug, Default)]
struct BodyEntry {
    listeners: BTreeSet<ModelId>,
    contacts: Vec<Contact>,
}

#[derive(Debug, Default)]
pub struct ContactBridge {
    bodies: HashMap<BodyId, BodyEntry>,
    touching: HashMap<BodyId, HashSet<BodyId>>,
}

impl ContactBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `body` known to the bridge so its contacts are tracked.
    pub fn register_body(&mut self, body: BodyId) {
        self.bodies.entry(body).or_default();
    }

    /// Notify `model` whenever `body` starts touching something.
    pub fn add_collision_listener(&mut self, body: BodyId, model: ModelId) {
        self.bodies.entry(body).or_default().listeners.insert(model);
    }

    pub fn remove_collision_listener(&mut self, body: BodyId, model: ModelId) {
        if let Some(entry) = self.bodies.get_mut(&body) {
            entry.listeners.remove(&model);
        }
    }

    /// Contact points of `body` as of the last update.
    pub fn contacts(&self, body: BodyId) -> &[Contact] {
        self.bodies.get(&body).map(|entry| entry.contacts.as_slice()).unwrap_or(&[])
    }

    pub fn is_touching(&self, a: BodyId, b: BodyId) -> bool {
        self.touching.get(&a).is_some_and(|others| others.contains(&b))
    }

    /// Rebuild contacts from `source` and schedule collision events for new contacts.
    ///
    /// # Parameters
    ///
    /// * `source` - physics world after the latest sub-step
    /// * `sched` - scheduler receiving the collision events
    /// * `last_time` - simulated time the physics world was last synchronised to
    /// * `elapsed_ns` - physics time stepped since `last_time`
    ///
    /// # Returns
    ///
    /// Whether any collision event was scheduled.
    pub fn update(&mut self, source: &dyn ContactSource, sched: &mut Scheduler, last_time: SimTime, elapsed_ns: u64) -> Result<bool> {
        for entry in self.bodies.values_mut() {
            entry.contacts.clear();
        }

        let event_time = last_time.after_nanos(elapsed_ns);
        let mut next_touching: HashMap<BodyId, HashSet<BodyId>> = HashMap::new();
        let mut scheduled = false;

        for manifold in source.contact_manifolds() {
            let (a, b) = (manifold.body_a, manifold.body_b);
            if manifold.points.is_empty() {
                continue;
            }
            if a == b {
                warn!("ignoring self-contact manifold for body {}", a);
                continue;
            }
            for point in &manifold.points {
                if let Some(entry) = self.bodies.get_mut(&a) {
                    entry.contacts.push(Contact { body_local: point.local_on_a, world: point.world_on_a, other: b });
                }
                if let Some(entry) = self.bodies.get_mut(&b) {
                    entry.contacts.push(Contact { body_local: point.local_on_b, world: point.world_on_b, other: a });
                }
            }

            let first_manifold_for_pair = next_touching.entry(a).or_default().insert(b);
            next_touching.entry(b).or_default().insert(a);

            if first_manifold_for_pair && !self.is_touching(a, b) {
                trace!("new contact between bodies {} and {} at {}", a, b, event_time);
                scheduled |= self.notify(sched, event_time, a, b)?;
                scheduled |= self.notify(sched, event_time, b, a)?;
            }
        }

        self.touching = next_touching;
        Ok(scheduled)
    }

    fn notify(&self, sched: &mut Scheduler, time: SimTime, body: BodyId, other: BodyId) -> Result<bool> {
        let Some(entry) = self.bodies.get(&body) else {
            return Ok(false);
        };
        let mut scheduled = false;
        for listener in &entry.listeners {
            let id = sched.schedule(*listener, time, Event::Collision(CollisionEvent { body, other }))?;
            scheduled |= !id.is_rejected();
        }
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Model, ModelReport, ModelType, SimEngine};
    use std::any::Any;
    use std::cell::RefCell;

    struct Script(RefCell<Vec<Vec<ContactManifold>>>);

    impl Script {
        fn new(frames: Vec<Vec<ContactManifold>>) -> Self {
            let mut frames = frames;
            frames.reverse();
            Script(RefCell::new(frames))
        }
    }

    impl ContactSource for Script {
        fn contact_manifolds(&self) -> Vec<ContactManifold> {
            self.0.borrow_mut().pop().unwrap_or_default()
        }
    }

    struct Listener(ModelId);

    impl Model for Listener {
        fn id(&self) -> ModelId {
            self.0
        }
        fn name(&self) -> Option<&str> {
            None
        }
        fn model_type(&self) -> ModelType {
            ModelType::CollisionProbe
        }
        fn handle_event(&mut self, _sched: &mut Scheduler, _time: SimTime, _event: Event) -> Result<()> {
            Ok(())
        }
        fn report(&self) -> ModelReport {
            ModelReport::new(self.0, None, ModelType::CollisionProbe)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn manifold(a: BodyId, b: BodyId, points: usize) -> ContactManifold {
        let point = ContactPoint { local_on_a: Vec3::ZERO, world_on_a: Vec3::new(1.0, 0.0, 0.0), local_on_b: Vec3::ZERO, world_on_b: Vec3::new(1.0, 0.0, 0.0) };
        ContactManifold { body_a: a, body_b: b, points: vec![point; points] }
    }

    fn setup() -> (SimEngine, ContactBridge) {
        let mut engine = SimEngine::new();
        for id in 1..=3 {
            engine.add_model(Box::new(Listener(ModelId(id)))).unwrap();
        }
        let mut bridge = ContactBridge::new();
        bridge.add_collision_listener(10, ModelId(1));
        bridge.add_collision_listener(10, ModelId(2));
        bridge.add_collision_listener(20, ModelId(3));
        (engine, bridge)
    }

    fn drain(engine: &mut SimEngine) -> usize {
        let mut dispatched = 0;
        while engine.next_event_time().is_some() {
            engine.dispatch_next().unwrap();
            dispatched += 1;
        }
        dispatched
    }

    #[test]
    fn new_contact_notifies_every_listener_of_both_bodies() {
        let (mut engine, mut bridge) = setup();
        let script = Script::new(vec![vec![manifold(10, 20, 2)]]);
        let scheduled = bridge.update(&script, engine.scheduler_mut(), SimTime::from_millis(100), 16_000_000).unwrap();
        assert!(scheduled);
        assert_eq!(engine.scheduler().pending_events(), 3);
        assert_eq!(engine.next_event_time(), Some(SimTime::from_millis(116)));
        assert_eq!(bridge.contacts(10).len(), 2);
        assert_eq!(bridge.contacts(20)[0].other, 10);
        assert_eq!(drain(&mut engine), 3);
    }

    #[test]
    fn persistent_contact_does_not_retrigger() {
        let (mut engine, mut bridge) = setup();
        let script = Script::new(vec![vec![manifold(10, 20, 1)], vec![manifold(20, 10, 1)], vec![], vec![manifold(10, 20, 1)]]);
        assert!(bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 1).unwrap());
        assert!(!bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 2).unwrap());
        assert_eq!(engine.scheduler().pending_events(), 3);

        // separation clears the adjacency, the next touch is new again
        assert!(!bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 3).unwrap());
        assert!(bridge.contacts(10).is_empty());
        assert!(!bridge.is_touching(10, 20));
        assert!(bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 4).unwrap());
        assert_eq!(engine.scheduler().pending_events(), 6);
    }

    #[test]
    fn empty_manifolds_and_unlistened_bodies_schedule_nothing() {
        let (mut engine, mut bridge) = setup();
        bridge.register_body(30);
        let script = Script::new(vec![vec![manifold(10, 20, 0), manifold(30, 40, 1)]]);
        assert!(!bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 5).unwrap());
        assert!(!bridge.is_touching(10, 20));
        assert!(bridge.is_touching(30, 40));
        assert_eq!(bridge.contacts(30).len(), 1);
        assert_eq!(engine.scheduler().pending_events(), 0);
    }

    #[test]
    fn contact_lists_are_rebuilt_each_call() {
        let (mut engine, mut bridge) = setup();
        let script = Script::new(vec![vec![manifold(10, 20, 3)], vec![manifold(10, 20, 1)]]);
        bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 0).unwrap();
        assert_eq!(bridge.contacts(10).len(), 3);
        bridge.update(&script, engine.scheduler_mut(), SimTime::ZERO, 0).unwrap();
        assert_eq!(bridge.contacts(10).len(), 1);
    }
}
