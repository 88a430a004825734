//! Discrete-event radio network simulator.
//!
//! Stations with half-duplex radios and an 802.11 DCF or 802.15.4 CSMA-CA MAC share a
//! log-distance propagation channel, while a physics collaborator supplies body positions and
//! contacts. Everything runs on one cooperative event kernel driven by `simulation::runner`.

pub mod error;
pub mod kernel;
pub mod physics;
pub mod protocol;
pub mod radio;
pub mod simulation;

pub use error::{Result, SimError};
