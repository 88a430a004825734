//! IEEE 802.11 b/g MAC: frame formats and the DCF state machine.

pub mod dcf;
pub mod frame;

pub use dcf::{Dcf, DcfParameters, DcfState, DcfTimer};
pub use frame::{Dot11Frame, FrameControl, FrameType, Subtype};
