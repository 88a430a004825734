//! Events and their queue entries.

use crate::kernel::{ModelId, SimTime};
use crate::physics::BodyId;
use crate::protocol::Pdu;
use crate::protocol::dot11::DcfTimer;
use crate::protocol::dot154::CsmaTimer;
use std::fmt;

/// Handle returned by scheduling; the only way to cancel a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub(crate) u64);

impl EventId {
    /// Returned for schedule calls made after the engine terminated. Never present in the queue.
    pub const REJECTED: EventId = EventId(0);

    pub fn is_rejected(self) -> bool {
        self == EventId::REJECTED
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A new contact between `body` and `other`, delivered to each listener of `body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionEvent {
    pub body: BodyId,
    pub other: BodyId,
}

/// A frame on the air as seen by one receiving radio.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub pdu: Pdu,
    pub rx_power_dbm: f64,
    pub frequency_mhz: f64,
}

/// Protocol timer tags. The owning MAC keeps the event id under the same tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTimer {
    Dcf(DcfTimer),
    Csma(CsmaTimer),
}

impl From<DcfTimer> for ProtocolTimer {
    fn from(timer: DcfTimer) -> Self {
        ProtocolTimer::Dcf(timer)
    }
}

impl From<CsmaTimer> for ProtocolTimer {
    fn from(timer: CsmaTimer) -> Self {
        ProtocolTimer::Csma(timer)
    }
}

/// Payload delivered to exactly one model.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Collision(CollisionEvent),
    /// Leading edge of a frame reaching a radio, scheduled by the propagation service.
    Reception(Transmission),
    EndOfTransmission,
    EndOfReception(Transmission),
    Timer(ProtocolTimer),
    /// Upper-layer traffic generator tick handled inside the owning station.
    Traffic,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Collision(_) => "collision",
            Event::Reception(_) => "reception",
            Event::EndOfTransmission => "end-of-transmission",
            Event::EndOfReception(_) => "end-of-reception",
            Event::Timer(_) => "timer",
            Event::Traffic => "traffic",
        }
    }
}

/// Queue entry; owned by the scheduler from `schedule` until dispatch or cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub id: EventId,
    pub time: SimTime,
    pub model: ModelId,
    pub event: Event,
}

/// Total dispatch order: time, then target model, then schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct QueueKey {
    pub(crate) time: SimTime,
    pub(crate) model: ModelId,
    pub(crate) id: EventId,
}
