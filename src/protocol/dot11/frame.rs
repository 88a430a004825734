//! 802.11 MAC frames.

use crate::protocol::{EthernetAddress, Pdu, PduWrap};

pub const FRAME_CONTROL_LEN: usize = 2;
pub const DURATION_LEN: usize = 2;
pub const ADDRESS_LEN: usize = EthernetAddress::LEN;
pub const SEQUENCE_CONTROL_LEN: usize = 2;
pub const FCS_LEN: usize = 4;

pub const RTS_LEN: usize = FRAME_CONTROL_LEN + DURATION_LEN + 2 * ADDRESS_LEN + FCS_LEN;
pub const CTS_LEN: usize = FRAME_CONTROL_LEN + DURATION_LEN + ADDRESS_LEN + FCS_LEN;
pub const ACK_LEN: usize = CTS_LEN;
pub const DATA_HEADER_LEN: usize = FRAME_CONTROL_LEN + DURATION_LEN + 3 * ADDRESS_LEN + SEQUENCE_CONTROL_LEN + FCS_LEN;

/// Sequence numbers are 12 bits wide.
pub const SEQUENCE_MODULO: u16 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Control,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    Rts,
    Cts,
    Ack,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub frame_type: FrameType,
    pub subtype: Subtype,
    pub retry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dot11Frame {
    Rts {
        duration_us: u32,
        receiver: EthernetAddress,
        transmitter: EthernetAddress,
    },
    Cts {
        duration_us: u32,
        receiver: EthernetAddress,
    },
    Ack {
        duration_us: u32,
        receiver: EthernetAddress,
    },
    Data {
        duration_us: u32,
        destination: EthernetAddress,
        source: EthernetAddress,
        sequence: u16,
        retry: bool,
        body: Box<Pdu>,
    },
}

impl Dot11Frame {
    pub fn rts(receiver: EthernetAddress, transmitter: EthernetAddress, duration_us: u32) -> Self {
        Dot11Frame::Rts { duration_us, receiver, transmitter }
    }

    pub fn cts(receiver: EthernetAddress, duration_us: u32) -> Self {
        Dot11Frame::Cts { duration_us, receiver }
    }

    pub fn ack(receiver: EthernetAddress) -> Self {
        Dot11Frame::Ack { duration_us: 0, receiver }
    }

    pub fn data(destination: EthernetAddress, source: EthernetAddress, sequence: u16, retry: bool, duration_us: u32, body: Pdu) -> Self {
        Dot11Frame::Data { duration_us, destination, source, sequence, retry, body: Box::new(body) }
    }

    pub fn frame_control(&self) -> FrameControl {
        let (frame_type, subtype, retry) = match self {
            Dot11Frame::Rts { .. } => (FrameType::Control, Subtype::Rts, false),
            Dot11Frame::Cts { .. } => (FrameType::Control, Subtype::Cts, false),
            Dot11Frame::Ack { .. } => (FrameType::Control, Subtype::Ack, false),
            Dot11Frame::Data { retry, .. } => (FrameType::Data, Subtype::Data, *retry),
        };
        FrameControl { frame_type, subtype, retry }
    }

    /// Microseconds the medium stays reserved after this frame.
    pub fn duration_us(&self) -> u32 {
        match self {
            Dot11Frame::Rts { duration_us, .. }
            | Dot11Frame::Cts { duration_us, .. }
            | Dot11Frame::Ack { duration_us, .. }
            | Dot11Frame::Data { duration_us, .. } => *duration_us,
        }
    }

    /// Address the frame is meant for.
    pub fn receiver(&self) -> EthernetAddress {
        match self {
            Dot11Frame::Rts { receiver, .. } | Dot11Frame::Cts { receiver, .. } | Dot11Frame::Ack { receiver, .. } => *receiver,
            Dot11Frame::Data { destination, .. } => *destination,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Dot11Frame::Rts { .. } => "rts",
            Dot11Frame::Cts { .. } => "cts",
            Dot11Frame::Ack { .. } => "ack",
            Dot11Frame::Data { .. } => "data",
        }
    }
}

impl PduWrap for Dot11Frame {
    fn header_len(&self) -> usize {
        match self {
            Dot11Frame::Rts { .. } => RTS_LEN,
            Dot11Frame::Cts { .. } => CTS_LEN,
            Dot11Frame::Ack { .. } => ACK_LEN,
            Dot11Frame::Data { .. } => DATA_HEADER_LEN,
        }
    }

    fn upper(&self) -> Option<&Pdu> {
        match self {
            Dot11Frame::Data { body, .. } => Some(body.as_ref()),
            _ => None,
        }
    }
}
