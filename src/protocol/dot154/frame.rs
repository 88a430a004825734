//! 802.15.4 MAC frames.

use crate::protocol::{AddressingMode, Ieee802154Address, LinkAddress, Pdu, PduWrap};

pub const FRAME_CONTROL_LEN: usize = 2;
pub const SEQUENCE_LEN: usize = 1;
pub const FCS_LEN: usize = 2;
pub const COMMAND_ID_LEN: usize = 1;

pub const ACK_LEN: usize = FRAME_CONTROL_LEN + SEQUENCE_LEN + FCS_LEN;
/// Smallest data frame overhead (short addressing on both ends).
pub const MIN_MPDU_OVERHEAD: usize = FRAME_CONTROL_LEN + SEQUENCE_LEN + 2 * 2 + FCS_LEN;
pub const MAX_PHY_PACKET: usize = 127;
pub const MAX_MAC_PAYLOAD: usize = MAX_PHY_PACKET - MIN_MPDU_OVERHEAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Ack,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub frame_type: FrameType,
    pub ack_request: bool,
    pub destination_mode: AddressingMode,
    pub source_mode: AddressingMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dot154Frame {
    Data {
        sequence: u8,
        destination: Ieee802154Address,
        source: Ieee802154Address,
        ack_request: bool,
        payload: Box<Pdu>,
    },
    Ack {
        sequence: u8,
    },
    Command {
        sequence: u8,
        destination: Ieee802154Address,
        source: Ieee802154Address,
        ack_request: bool,
        command_id: u8,
    },
}

impl Dot154Frame {
    pub fn data(sequence: u8, destination: Ieee802154Address, source: Ieee802154Address, ack_request: bool, payload: Pdu) -> Self {
        Dot154Frame::Data { sequence, destination, source, ack_request, payload: Box::new(payload) }
    }

    pub fn ack(sequence: u8) -> Self {
        Dot154Frame::Ack { sequence }
    }

    pub fn command(sequence: u8, destination: Ieee802154Address, source: Ieee802154Address, command_id: u8) -> Self {
        Dot154Frame::Command { sequence, destination, source, ack_request: false, command_id }
    }

    pub fn sequence(&self) -> u8 {
        match self {
            Dot154Frame::Data { sequence, .. } | Dot154Frame::Ack { sequence } | Dot154Frame::Command { sequence, .. } => *sequence,
        }
    }

    pub fn frame_control(&self) -> FrameControl {
        match self {
            Dot154Frame::Data { destination, source, ack_request, .. } => FrameControl {
                frame_type: FrameType::Data,
                ack_request: *ack_request,
                destination_mode: destination.mode(),
                source_mode: source.mode(),
            },
            Dot154Frame::Ack { .. } => FrameControl {
                frame_type: FrameType::Ack,
                ack_request: false,
                destination_mode: AddressingMode::NotPresent,
                source_mode: AddressingMode::NotPresent,
            },
            Dot154Frame::Command { destination, source, ack_request, .. } => FrameControl {
                frame_type: FrameType::Command,
                ack_request: *ack_request,
                destination_mode: destination.mode(),
                source_mode: source.mode(),
            },
        }
    }

    pub fn destination(&self) -> Option<Ieee802154Address> {
        match self {
            Dot154Frame::Data { destination, .. } | Dot154Frame::Command { destination, .. } => Some(*destination),
            Dot154Frame::Ack { .. } => None,
        }
    }

    /// Whether the sender expects an acknowledgment. Never true for broadcast.
    pub fn wants_ack(&self) -> bool {
        let control = self.frame_control();
        control.ack_request && self.destination().is_some_and(|destination| !destination.is_broadcast())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Dot154Frame::Data { .. } => "data",
            Dot154Frame::Ack { .. } => "ack",
            Dot154Frame::Command { .. } => "command",
        }
    }
}

impl PduWrap for Dot154Frame {
    fn header_len(&self) -> usize {
        let control = self.frame_control();
        let base = FRAME_CONTROL_LEN + SEQUENCE_LEN + control.destination_mode.len() + control.source_mode.len() + FCS_LEN;
        match self {
            Dot154Frame::Command { .. } => base + COMMAND_ID_LEN,
            _ => base,
        }
    }

    fn upper(&self) -> Option<&Pdu> {
        match self {
            Dot154Frame::Data { payload, .. } => Some(payload.as_ref()),
            _ => None,
        }
    }
}
