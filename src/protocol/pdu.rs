//! Protocol data units.
//!
//! A PDU is a frame that may wrap the PDU of the layer above it. Every frame type reports its wire
//! size from fixed per-field constants, so `size = header + size(upper)` holds at every level.

use std::rc::Rc;

use crate::protocol::dot11::Dot11Frame;
use crate::protocol::dot154::Dot154Frame;

/// Capability shared by every PDU variant.
pub trait PduWrap {
    /// Bytes this layer adds on the wire (the whole payload for a leaf).
    fn header_len(&self) -> usize;

    /// The wrapped upper-layer unit, if any.
    fn upper(&self) -> Option<&Pdu>;

    fn size_bytes(&self) -> usize {
        self.header_len() + self.upper().map_or(0, PduWrap::size_bytes)
    }
}

/// Leaf payload handed down by an upper layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Rc<[u8]>),
    /// Payload known only by its length.
    Opaque { len: usize },
}

impl PduWrap for Payload {
    fn header_len(&self) -> usize {
        match self {
            Payload::Bytes(data) => data.len(),
            Payload::Opaque { len } => *len,
        }
    }

    fn upper(&self) -> Option<&Pdu> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    Payload(Payload),
    Dot11(Dot11Frame),
    Dot154(Dot154Frame),
}

impl Pdu {
    pub fn bytes(data: impl Into<Rc<[u8]>>) -> Pdu {
        Pdu::Payload(Payload::Bytes(data.into()))
    }

    pub fn opaque(len: usize) -> Pdu {
        Pdu::Payload(Payload::Opaque { len })
    }

    /// Zero-byte leaf.
    pub fn empty() -> Pdu {
        Pdu::opaque(0)
    }

    pub fn as_dot11(&self) -> Option<&Dot11Frame> {
        match self {
            Pdu::Dot11(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_dot154(&self) -> Option<&Dot154Frame> {
        match self {
            Pdu::Dot154(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Pdu::Payload(_) => "payload",
            Pdu::Dot11(frame) => frame.kind_name(),
            Pdu::Dot154(frame) => frame.kind_name(),
        }
    }
}

impl PduWrap for Pdu {
    fn header_len(&self) -> usize {
        match self {
            Pdu::Payload(payload) => payload.header_len(),
            Pdu::Dot11(frame) => frame.header_len(),
            Pdu::Dot154(frame) => frame.header_len(),
        }
    }

    fn upper(&self) -> Option<&Pdu> {
        match self {
            Pdu::Payload(payload) => payload.upper(),
            Pdu::Dot11(frame) => frame.upper(),
            Pdu::Dot154(frame) => frame.upper(),
        }
    }
}

impl From<Dot11Frame> for Pdu {
    fn from(frame: Dot11Frame) -> Self {
        Pdu::Dot11(frame)
    }
}

impl From<Dot154Frame> for Pdu {
    fn from(frame: Dot154Frame) -> Self {
        Pdu::Dot154(frame)
    }
}
