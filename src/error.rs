//! Error taxonomy for the simulation kernel.
//!
//! Only engine-level violations are errors. Protocol outcomes on the shared medium (busy radio,
//! exhausted retries, lost frames) are reported through notifications and confirmations instead.

use thiserror::Error;

use crate::kernel::{ModelId, SimTime};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// An event was scheduled before the time currently being processed.
    #[error("causality violation: event scheduled at {requested} while processing {current}")]
    CausalityViolation { requested: SimTime, current: SimTime },

    #[error("model {0} is not registered")]
    ModelNotFound(ModelId),

    /// A name or type query that must resolve to at most one model matched several.
    #[error("ambiguous lookup for '{query}': {matches} models match")]
    AmbiguousLookup { query: String, matches: usize },

    #[error("model id {0} is already registered")]
    DuplicateModel(ModelId),

    /// Models can no longer be added once the type index has been built.
    #[error("cannot register model {0}: the type index has already been queried")]
    RegistrySealed(ModelId),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
