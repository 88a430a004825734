//! Discrete-event simulation kernel.
//!
//! Contains:
//! - Simulated time (`time`)
//! - Events and queue entries (`event`)
//! - The model abstraction and type tags (`model`)
//! - The causality-enforcing scheduler and model registry (`engine`)
//! - Pending protocol timers keyed by purpose (`timers`)
//! - Wall-clock pacing and the pause gate (`clock`)

pub mod clock;
pub mod engine;
pub mod event;
pub mod model;
pub mod time;
pub mod timers;

pub use clock::{ClockControl, ClockHandle, ClockListener, ProgressReporter};
pub use engine::{EngineStats, Scheduler, SimEngine};
pub use event::{CollisionEvent, Event, EventId, ProtocolTimer, ScheduledEvent, Transmission};
pub use model::{Model, ModelId, ModelReport, ModelType};
pub use time::{SimTime, TimeUnit};
pub use timers::TimerSet;
