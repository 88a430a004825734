//! Scenario-level pieces built on top of the kernel, radio and MAC layers.
//!
//! ## Module Organization
//!
//! - `station`: radio-equipped stations (one radio, one MAC, one traffic agent)
//! - `traffic`: periodic frame generator and delivery sink above a MAC
//! - `probe`: collision probe attached to a parent's physical body
//! - `scenario`: scenario file loading, validation and the model factory
//! - `runner`: the driving loop interleaving physics with event dispatch
//! - `log_capture`: per-model capture of `[id]`-prefixed log lines

pub mod log_capture;
pub mod probe;
pub mod runner;
pub mod scenario;
pub mod station;
pub mod traffic;

pub use probe::CollisionProbe;
pub use runner::{RunSummary, SimulationRunner};
pub use scenario::{
    BodyConfig, BuiltScenario, ModelConfig, BuildContext, PhysicsConfig, Scenario, ScenarioFormat, ScenarioLoadError, build_scenario,
    load_scenario, parse_scenario, validate_scenario,
};
pub use station::{RadioNode, Station80211, Station802154};
pub use traffic::{TrafficAgent, TrafficConfig, TrafficPlan, TrafficStats};
