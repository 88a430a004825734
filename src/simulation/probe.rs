//! Collision probe: a sensor-like child model that counts the contacts of its parent's body.

use log::{info, warn};
use std::any::Any;

use crate::error::Result;
use crate::kernel::{CollisionEvent, Event, Model, ModelId, ModelReport, ModelType, Scheduler, SimTime};

pub struct CollisionProbe {
    id: ModelId,
    name: Option<String>,
    parent: Option<ModelId>,
    hits: Vec<(SimTime, CollisionEvent)>,
}

impl CollisionProbe {
    pub fn new(id: ModelId, name: Option<String>, parent: Option<ModelId>) -> Self {
        Self { id, name, parent, hits: Vec::new() }
    }

    /// Every new contact seen so far, in dispatch order.
    pub fn hits(&self) -> &[(SimTime, CollisionEvent)] {
        &self.hits
    }
}

impl Model for CollisionProbe {
    fn id(&self) -> ModelId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn model_type(&self) -> ModelType {
        ModelType::CollisionProbe
    }

    fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    fn handle_event(&mut self, _sched: &mut Scheduler, time: SimTime, event: Event) -> Result<()> {
        match event {
            Event::Collision(collision) => {
                info!("[{}] probe: body {} touched body {} at {}", self.id, collision.body, collision.other, time);
                self.hits.push((time, collision));
            }
            other => warn!("[{}] probe ignoring {} event", self.id, other.kind()),
        }
        Ok(())
    }

    fn report(&self) -> ModelReport {
        let mut report = ModelReport::new(self.id, self.name.as_deref(), ModelType::CollisionProbe);
        report.parent = self.parent;
        report.collisions = self.hits.len() as u64;
        report
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
