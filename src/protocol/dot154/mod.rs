//! IEEE 802.15.4 MAC: frame formats and unslotted CSMA-CA.

pub mod csma;
pub mod frame;

pub use csma::{CsmaCa, CsmaParameters, CsmaState, CsmaTimer};
pub use frame::{Dot154Frame, FrameControl, FrameType};
