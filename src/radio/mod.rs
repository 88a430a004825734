//! Radio physical layer.
//!
//! Contains:
//! - Band, rate presets and power figures (`config`)
//! - The half-duplex radio state machine and its notifications (`half_duplex`)
//! - The propagation service radios transmit through (`propagation`)

pub mod config;
pub mod half_duplex;
pub mod propagation;

pub use config::{Band, RadioConfig, RadioProfile};
pub use half_duplex::{HalfDuplexRadio, Radio, RadioEventListener, RadioNotification, RadioState, RadioStats, RadioTrace};
pub use propagation::{LogDistancePropagation, PathLossParameters, PropagationModel, SharedPropagation};
