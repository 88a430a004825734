//! MAC service interface: requests from the upper layer, confirmations and indications back to it,
//! and the context a MAC state machine runs in.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Debug;

use crate::error::Result;
use crate::kernel::{ModelId, ProtocolTimer, Scheduler, SimTime};
use crate::protocol::{LinkAddress, Pdu};
use crate::radio::{Radio, RadioNotification};

/// Outcome of a data request, reported exactly once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Success,
    ChannelAccessFailure,
    NoAck,
    RetryLimitExceeded,
    FrameTooLong,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacDataRequest<A> {
    /// Caller-chosen tag echoed in the confirmation.
    pub handle: u32,
    pub destination: A,
    pub msdu: Pdu,
    pub ack_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacConfirm {
    pub handle: u32,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacIndication<A> {
    pub source: A,
    pub destination: A,
    pub msdu: Pdu,
    pub sequence: u16,
    pub rx_power_dbm: f64,
}

/// The layer above a MAC.
pub trait UpperLayer<A> {
    fn data_indication(&mut self, time: SimTime, indication: MacIndication<A>);

    fn data_confirm(&mut self, time: SimTime, confirm: MacConfirm);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MacStats {
    pub requests: u64,
    pub tx_success: u64,
    pub tx_failed: u64,
    pub frames_too_long: u64,
    pub channel_access_failures: u64,
    pub retransmissions: u64,
    pub backoff_draws: u64,
    pub indications: u64,
    pub acks_sent: u64,
    pub nav_deferrals: u64,
    pub stale_acks: u64,
    pub duplicates: u64,
}

/// Everything a MAC may touch while handling one call.
///
/// Radio notifications produced while the MAC is running (a refused transmission) are queued in
/// `notifications` and delivered once the current call has returned.
pub struct MacContext<'a, A> {
    pub owner: ModelId,
    pub sched: &'a mut Scheduler,
    pub radio: &'a mut dyn Radio,
    pub upper: &'a mut dyn UpperLayer<A>,
    pub notifications: &'a mut VecDeque<RadioNotification>,
}

impl<A> MacContext<'_, A> {
    pub fn now(&self) -> SimTime {
        self.sched.now()
    }

    pub fn transmit(&mut self, pdu: impl Into<Pdu>) -> Result<()> {
        if let Some(notification) = self.radio.transmit(self.sched, pdu.into())? {
            self.notifications.push_back(notification);
        }
        Ok(())
    }

    pub fn confirm(&mut self, handle: u32, status: TxStatus) {
        let now = self.now();
        self.upper.data_confirm(now, MacConfirm { handle, status });
    }

    pub fn indicate(&mut self, indication: MacIndication<A>) {
        let now = self.now();
        self.upper.data_indication(now, indication);
    }
}

/// A medium access control state machine driven by radio notifications and its own timers.
pub trait MacProtocol {
    type Address: LinkAddress;
    type Timer: Ord + Copy + Debug + Into<ProtocolTimer>;

    fn address(&self) -> Self::Address;

    /// Recognise one of this MAC's timer tags.
    fn timer(tag: ProtocolTimer) -> Option<Self::Timer>;

    fn request(&mut self, ctx: &mut MacContext<'_, Self::Address>, request: MacDataRequest<Self::Address>) -> Result<()>;

    fn on_radio_event(&mut self, ctx: &mut MacContext<'_, Self::Address>, notification: RadioNotification) -> Result<()>;

    fn on_timer(&mut self, ctx: &mut MacContext<'_, Self::Address>, timer: Self::Timer) -> Result<()>;

    fn state_name(&self) -> &'static str;

    /// Frames waiting behind the one in progress.
    fn queue_len(&self) -> usize;

    fn stats(&self) -> &MacStats;
}
