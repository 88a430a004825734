//! Event scheduler and simulation engine.
//!
//! The engine is split in two so that a handler can hold a mutable model and the scheduler at the
//! same time:
//! - [`Scheduler`] owns the time-ordered queue and enforces causality.
//! - [`SimEngine`] owns the model registry (by id, name and type) and dispatches one event at a time.
//!
//! Dispatch order is the total order `(time, model id, event id)`.

use log::{debug, trace};
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::error::{Result, SimError};
use crate::kernel::event::QueueKey;
use crate::kernel::{Event, EventId, Model, ModelId, ModelReport, ModelType, ScheduledEvent, SimTime, TimeUnit};

/// Time-ordered queue with causality enforcement.
#[derive(Debug)]
pub struct Scheduler {
    queue: BTreeMap<QueueKey, Event>,
    index: HashMap<EventId, QueueKey>,
    registered: HashSet<ModelId>,
    processing: Option<SimTime>,
    last_processed: SimTime,
    next_id: u64,
    terminated: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            index: HashMap::new(),
            registered: HashSet::new(),
            processing: None,
            last_processed: SimTime::ZERO,
            next_id: 1,
            terminated: false,
        }
    }

    /// The instant currently being processed, or the last processed one while idle.
    pub fn now(&self) -> SimTime {
        self.processing.unwrap_or(self.last_processed)
    }

    /// Enqueue `event` for `model` at `time`.
    ///
    /// # Returns
    ///
    /// The id needed to cancel the event. After [`Scheduler::terminate`] the call is logged and
    /// answered with [`EventId::REJECTED`].
    ///
    /// # Errors
    ///
    /// - `CausalityViolation` if `time` precedes [`Scheduler::now`]
    /// - `ModelNotFound` if `model` is not registered
    pub fn schedule(&mut self, model: ModelId, time: SimTime, event: Event) -> Result<EventId> {
        if self.terminated {
            debug!("[{}] engine terminated, dropping {} event for {}", model, event.kind(), time);
            return Ok(EventId::REJECTED);
        }
        let current = self.now();
        if time < current {
            return Err(SimError::CausalityViolation { requested: time, current });
        }
        if !self.registered.contains(&model) {
            return Err(SimError::ModelNotFound(model));
        }

        let id = EventId(self.next_id);
        self.next_id += 1;
        let key = QueueKey { time, model, id };
        self.queue.insert(key, event);
        self.index.insert(id, key);
        Ok(id)
    }

    /// Schedule relative to [`Scheduler::now`]. Negative deltas target the past and fail.
    pub fn schedule_in(&mut self, model: ModelId, delta: i64, unit: TimeUnit, event: Event) -> Result<EventId> {
        let now = self.now();
        let requested = SimTime::new(now, delta, unit);
        if delta < 0 {
            return Err(SimError::CausalityViolation { requested, current: now });
        }
        self.schedule(model, requested, event)
    }

    pub fn schedule_after_nanos(&mut self, model: ModelId, nanos: u64, event: Event) -> Result<EventId> {
        let time = self.now().after_nanos(nanos);
        self.schedule(model, time, event)
    }

    /// Remove a pending event. Unknown, dispatched or already cancelled ids are ignored.
    pub fn cancel(&mut self, id: EventId) {
        if let Some(key) = self.index.remove(&id) {
            self.queue.remove(&key);
        }
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.keys().next().map(|key| key.time)
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Drain the queue and refuse further scheduling.
    pub fn terminate(&mut self) {
        if !self.terminated {
            debug!("terminating engine with {} pending events", self.queue.len());
        }
        self.terminated = true;
        self.queue.clear();
        self.index.clear();
    }

    pub(crate) fn register(&mut self, model: ModelId) {
        self.registered.insert(model);
    }

    /// Pop the head event and make its time the current processing time.
    pub(crate) fn begin_dispatch(&mut self) -> Option<ScheduledEvent> {
        let (key, event) = self.queue.pop_first()?;
        self.index.remove(&key.id);
        self.processing = Some(key.time);
        Some(ScheduledEvent { id: key.id, time: key.time, model: key.model, event })
    }

    pub(crate) fn end_dispatch(&mut self, time: SimTime) {
        self.last_processed = time;
        self.processing = None;
    }
}

/// Dispatch instrumentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub events_dispatched: u64,
    pub handler_time: Duration,
}

/// Model registry plus the scheduler that feeds it.
pub struct SimEngine {
    scheduler: Scheduler,
    models: BTreeMap<ModelId, Box<dyn Model>>,
    names: HashMap<String, Vec<ModelId>>,
    type_index: OnceCell<HashMap<ModelType, Vec<ModelId>>>,
    stats: EngineStats,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEngine {
    pub fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            models: BTreeMap::new(),
            names: HashMap::new(),
            type_index: OnceCell::new(),
            stats: EngineStats::default(),
        }
    }

    /// Register a model under its own id (and name, if any).
    pub fn add_model(&mut self, model: Box<dyn Model>) -> Result<ModelId> {
        let id = model.id();
        if self.type_index.get().is_some() {
            return Err(SimError::RegistrySealed(id));
        }
        if self.models.contains_key(&id) {
            return Err(SimError::DuplicateModel(id));
        }
        if let Some(name) = model.name() {
            self.names.entry(name.to_string()).or_default().push(id);
        }
        debug!("[{}] registered {} model {:?}", id, model.model_type(), model.name().unwrap_or("-"));
        self.scheduler.register(id);
        self.models.insert(id, model);
        Ok(id)
    }

    /// Run every model's `initialize` in id order.
    pub fn initialize(&mut self) -> Result<()> {
        for model in self.models.values_mut() {
            model.initialize(&mut self.scheduler)?;
        }
        Ok(())
    }

    /// Pop the head event and hand it to its model.
    ///
    /// # Returns
    ///
    /// The time of the new queue head, or `None` once the queue is empty.
    pub fn dispatch_next(&mut self) -> Result<Option<SimTime>> {
        let Some(next) = self.scheduler.begin_dispatch() else {
            return Ok(None);
        };
        let Some(model) = self.models.get_mut(&next.model) else {
            self.scheduler.end_dispatch(next.time);
            return Err(SimError::ModelNotFound(next.model));
        };

        trace!("[{}] dispatch {} {} at {}", next.model, next.id, next.event.kind(), next.time);
        let started = Instant::now();
        let outcome = model.handle_event(&mut self.scheduler, next.time, next.event);
        self.stats.handler_time += started.elapsed();
        self.stats.events_dispatched += 1;
        self.scheduler.end_dispatch(next.time);
        outcome?;

        Ok(self.scheduler.next_event_time())
    }

    pub fn schedule(&mut self, model: ModelId, time: SimTime, event: Event) -> Result<EventId> {
        self.scheduler.schedule(model, time, event)
    }

    pub fn cancel(&mut self, id: EventId) {
        self.scheduler.cancel(id);
    }

    pub fn terminate(&mut self) {
        self.scheduler.terminate();
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn next_event_time(&self) -> Option<SimTime> {
        self.scheduler.next_event_time()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Call `finish` on every model in id order with the final simulated time.
    pub fn finish(&mut self) {
        let end = self.scheduler.now();
        for model in self.models.values_mut() {
            model.finish(end);
        }
    }

    pub fn model_ids(&self) -> impl Iterator<Item = ModelId> + '_ {
        self.models.keys().copied()
    }

    pub fn model(&self, id: ModelId) -> Option<&dyn Model> {
        self.models.get(&id).map(|model| model.as_ref())
    }

    /// Borrow a registered model as its concrete type.
    pub fn model_as<T: Model>(&self, id: ModelId) -> Option<&T> {
        self.models.get(&id)?.as_any().downcast_ref::<T>()
    }

    pub fn reports(&self) -> Vec<ModelReport> {
        self.models.values().map(|model| model.report()).collect()
    }

    pub fn find_models_by_name(&self, name: &str) -> &[ModelId] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// At most one model may carry `name`; several is a configuration bug.
    pub fn find_model_by_name(&self, name: &str) -> Result<Option<ModelId>> {
        single(format!("name={name}"), self.find_models_by_name(name))
    }

    /// Models tagged `model_type`, in id order. The first call seals the registry.
    pub fn find_models_by_type(&self, model_type: ModelType) -> Vec<ModelId> {
        let index = self.type_index.get_or_init(|| {
            let mut index: HashMap<ModelType, Vec<ModelId>> = HashMap::new();
            for (id, model) in &self.models {
                index.entry(model.model_type()).or_default().push(*id);
            }
            index
        });
        index.get(&model_type).cloned().unwrap_or_default()
    }

    pub fn find_model_by_type(&self, model_type: ModelType) -> Result<Option<ModelId>> {
        single(format!("type={model_type}"), &self.find_models_by_type(model_type))
    }
}

fn single(query: String, matches: &[ModelId]) -> Result<Option<ModelId>> {
    match matches {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        many => Err(SimError::AmbiguousLookup { query, matches: many.len() }),
    }
}
