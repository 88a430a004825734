//! Link-layer protocol stack.
//!
//! Contains:
//! - Nested protocol data units and their wire sizes (`pdu`)
//! - Link addresses for both MAC families (`address`)
//! - The MAC service interface shared by every state machine (`service`)
//! - IEEE 802.11 DCF (`dot11`)
//! - IEEE 802.15.4 unslotted CSMA-CA (`dot154`)

pub mod address;
pub mod dot11;
pub mod dot154;
pub mod pdu;
pub mod service;

#[cfg(test)]
pub mod testing;

pub use address::{AddressingMode, EthernetAddress, ExtendedAddress, Ieee802154Address, LinkAddress, MacAddress, ShortAddress};
pub use pdu::{Payload, Pdu, PduWrap};
pub use service::{MacConfirm, MacContext, MacDataRequest, MacIndication, MacProtocol, MacStats, TxStatus, UpperLayer};
