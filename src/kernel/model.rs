//! Model abstraction: anything that receives events from the engine.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::kernel::{Event, Scheduler, SimTime};
use crate::protocol::MacStats;
use crate::radio::RadioStats;
use crate::simulation::TrafficStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared type tag of a model. Scenario files name models by this tag and the scenario builder
/// maps each tag to its factory at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "station-802.11")]
    Station80211,
    #[serde(rename = "station-802.15.4")]
    Station802154,
    #[serde(rename = "collision-probe")]
    CollisionProbe,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Station80211 => "station-802.11",
            ModelType::Station802154 => "station-802.15.4",
            ModelType::CollisionProbe => "collision-probe",
        }
    }

    pub fn is_station(self) -> bool {
        matches!(self, ModelType::Station80211 | ModelType::Station802154)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// End-of-run snapshot of a model's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub id: ModelId,
    pub name: Option<String>,
    pub model_type: ModelType,
    pub parent: Option<ModelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio: Option<RadioStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficStats>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub radio_notifications: BTreeMap<String, u64>,
    pub collisions: u64,
}

impl ModelReport {
    pub fn new(id: ModelId, name: Option<&str>, model_type: ModelType) -> Self {
        Self {
            id,
            name: name.map(str::to_string),
            model_type,
            parent: None,
            radio: None,
            mac: None,
            traffic: None,
            radio_notifications: BTreeMap::new(),
            collisions: 0,
        }
    }
}

/// A simulation participant registered with the engine.
///
/// Handlers run to completion and may schedule or cancel events through the scheduler they are
/// handed. They must log and ignore events or nested PDUs they do not understand.
pub trait Model: Any {
    fn id(&self) -> ModelId;

    fn name(&self) -> Option<&str>;

    fn model_type(&self) -> ModelType;

    /// Physical entity this model is attached to, if any.
    fn parent(&self) -> Option<ModelId> {
        None
    }

    /// Called once, in id order, before the first dispatch.
    fn initialize(&mut self, _sched: &mut Scheduler) -> Result<()> {
        Ok(())
    }

    fn handle_event(&mut self, sched: &mut Scheduler, time: SimTime, event: Event) -> Result<()>;

    /// Called once after the driving loop stops, with the last processed time.
    fn finish(&mut self, _end: SimTime) {}

    fn report(&self) -> ModelReport;

    fn as_any(&self) -> &dyn Any;
}
