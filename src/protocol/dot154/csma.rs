//! 802.15.4 unslotted CSMA-CA.
//!
//! A new frame waits a random number of unit backoff periods, then goes out if the radio is
//! listening. A busy radio at the end of the delay counts as one failed clear-channel assessment:
//! the backoff exponent grows up to `max_be` and a new delay is drawn, until `max_csma_backoffs`
//! is exceeded. Acknowledged frames are retried from a fresh delay when no matching ACK arrives.

use log::{debug, info, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};

use crate::error::Result;
use crate::kernel::{ModelId, ProtocolTimer, TimerSet, Transmission};
use crate::protocol::dot154::Dot154Frame;
use crate::protocol::dot154::frame::MAX_MAC_PAYLOAD;
use crate::protocol::{
    Ieee802154Address, LinkAddress, MacContext, MacDataRequest, MacIndication, MacProtocol, MacStats, PduWrap, TxStatus,
};
use crate::radio::RadioNotification;
use crate::radio::propagation::NANOS_PER_METER;

/// PHY and MAC attributes. Durations are derived from the current values on every use.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CsmaParameters {
    pub symbol_rate: u32,
    pub shr_symbols: u32,
    pub symbols_per_octet: f64,
    pub min_be: u32,
    pub max_be: u32,
    pub max_csma_backoffs: u32,
    pub max_frame_retries: u32,
    pub unit_backoff_symbols: u32,
    pub turnaround_symbols: u32,
    /// Farthest peer expected to answer, used to stretch the ACK wait.
    pub radio_range_m: f64,
}

impl Default for CsmaParameters {
    fn default() -> Self {
        Self {
            symbol_rate: 62_500,
            shr_symbols: 10,
            symbols_per_octet: 2.0,
            min_be: 3,
            max_be: 5,
            max_csma_backoffs: 4,
            max_frame_retries: 3,
            unit_backoff_symbols: 20,
            turnaround_symbols: 12,
            radio_range_m: 300.0,
        }
    }
}

impl CsmaParameters {
    fn symbols_ns(&self, symbols: u32) -> u64 {
        u64::from(symbols) * 1_000_000_000 / u64::from(self.symbol_rate.max(1))
    }

    pub fn unit_backoff_ns(&self) -> u64 {
        self.symbols_ns(self.unit_backoff_symbols)
    }

    pub fn turnaround_ns(&self) -> u64 {
        self.symbols_ns(self.turnaround_symbols)
    }

    /// Unit backoff, turnaround, SHR and a 6-octet ACK, in symbols.
    pub fn ack_wait_symbols(&self) -> u32 {
        let ack_symbols = (6.0 * self.symbols_per_octet).ceil() as u32;
        self.unit_backoff_symbols + self.turnaround_symbols + self.shr_symbols + ack_symbols
    }

    pub fn ack_wait_ns(&self) -> u64 {
        self.symbols_ns(self.ack_wait_symbols()) + (self.radio_range_m * NANOS_PER_METER) as u64
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.symbol_rate == 0 {
            return Err("symbol_rate must be positive".to_string());
        }
        if self.min_be > self.max_be {
            return Err(format!("min_be ({}) must not exceed max_be ({})", self.min_be, self.max_be));
        }
        if self.max_be > 16 {
            return Err(format!("max_be ({}) is out of range", self.max_be));
        }
        if self.symbols_per_octet <= 0.0 || self.radio_range_m < 0.0 {
            return Err("symbols_per_octet must be positive and radio_range_m non-negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CsmaTimer {
    Delay,
    WaitForAck,
    WaitToAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmaState {
    Init,
    Delay,
    TxData,
    WaitingForAck,
    WaitingToAck,
    TxAck,
}

impl CsmaState {
    pub fn name(self) -> &'static str {
        match self {
            CsmaState::Init => "INIT",
            CsmaState::Delay => "DELAY",
            CsmaState::TxData => "TX_DATA",
            CsmaState::WaitingForAck => "WAITING_FOR_ACK",
            CsmaState::WaitingToAck => "WAITING_TO_ACK",
            CsmaState::TxAck => "TX_ACK",
        }
    }
}

#[derive(Debug)]
struct Outgoing {
    request: MacDataRequest<Ieee802154Address>,
    sequence: u8,
    retries: u32,
}

pub struct CsmaCa {
    owner: ModelId,
    address: Ieee802154Address,
    params: CsmaParameters,
    state: CsmaState,
    timers: TimerSet<CsmaTimer>,
    rng: ChaCha8Rng,
    queue: VecDeque<MacDataRequest<Ieee802154Address>>,
    current: Option<Outgoing>,
    backoffs: u32,
    backoff_exponent: u32,
    next_sequence: u8,
    /// Sequence number of the ACK we owe.
    pending_ack: Option<u8>,
    last_sequence: BTreeMap<Ieee802154Address, u8>,
    stats: MacStats,
}

impl CsmaCa {
    pub fn new(owner: ModelId, address: Ieee802154Address, params: CsmaParameters, seed: u64) -> Self {
        Self {
            owner,
            address,
            backoff_exponent: params.min_be,
            params,
            state: CsmaState::Init,
            timers: TimerSet::new(owner),
            rng: ChaCha8Rng::seed_from_u64(seed),
            queue: VecDeque::new(),
            current: None,
            backoffs: 0,
            next_sequence: 0,
            pending_ack: None,
            last_sequence: BTreeMap::new(),
            stats: MacStats::default(),
        }
    }

    pub fn state(&self) -> CsmaState {
        self.state
    }

    pub fn params(&self) -> &CsmaParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut CsmaParameters {
        &mut self.params
    }

    pub fn backoff_exponent(&self) -> u32 {
        self.backoff_exponent
    }

    /// Failed clear-channel assessments for the frame in progress.
    pub fn backoffs(&self) -> u32 {
        self.backoffs
    }

    pub fn retries(&self) -> u32 {
        self.current.as_ref().map_or(0, |outgoing| outgoing.retries)
    }

    fn enter(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, state: CsmaState) {
        self.timers.cancel_all(ctx.sched);
        if self.state != state {
            trace!("[{}] csma {} -> {}", self.owner, self.state.name(), state.name());
        }
        self.state = state;
    }

    fn try_send(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        if self.state != CsmaState::Init || self.current.is_some() {
            return Ok(());
        }
        let Some(request) = self.queue.pop_front() else {
            return Ok(());
        };
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.current = Some(Outgoing { request, sequence, retries: 0 });
        self.start_delay(ctx)
    }

    /// Fresh CSMA attempt for the current frame.
    fn start_delay(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        self.backoffs = 0;
        self.backoff_exponent = self.params.min_be;
        self.delay(ctx)
    }

    fn delay(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        let units = self.rng.gen_range(0..(1u64 << self.backoff_exponent));
        self.stats.backoff_draws += 1;
        trace!("[{}] csma delay {} units (be {})", self.owner, units, self.backoff_exponent);
        self.enter(ctx, CsmaState::Delay);
        self.timers.arm(ctx.sched, CsmaTimer::Delay, units * self.params.unit_backoff_ns())
    }

    /// Back to INIT, or to the delay of the frame an ACK interrupted.
    fn resume(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        if self.current.is_some() {
            self.delay(ctx)
        } else {
            self.enter(ctx, CsmaState::Init);
            self.try_send(ctx)
        }
    }

    fn finish_frame(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, status: TxStatus) -> Result<()> {
        if let Some(outgoing) = self.current.take() {
            match status {
                TxStatus::Success => self.stats.tx_success += 1,
                TxStatus::ChannelAccessFailure => {
                    self.stats.channel_access_failures += 1;
                    self.stats.tx_failed += 1;
                }
                _ => self.stats.tx_failed += 1,
            }
            ctx.confirm(outgoing.request.handle, status);
        }
        self.backoffs = 0;
        self.backoff_exponent = self.params.min_be;
        self.enter(ctx, CsmaState::Init);
        self.try_send(ctx)
    }

    fn transmit_frame(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        let Some(outgoing) = self.current.as_ref() else {
            self.enter(ctx, CsmaState::Init);
            return self.try_send(ctx);
        };
        let frame = Dot154Frame::data(
            outgoing.sequence,
            outgoing.request.destination,
            self.address,
            outgoing.request.ack_requested,
            outgoing.request.msdu.clone(),
        );
        self.enter(ctx, CsmaState::TxData);
        ctx.transmit(frame)
    }

    /// The channel was found busy at the end of a delay.
    fn channel_busy(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        self.backoffs += 1;
        if self.backoffs > self.params.max_csma_backoffs {
            if let Some(outgoing) = self.current.as_ref() {
                info!("[{}] csma channel access failure for frame {} after {} backoffs", self.owner, outgoing.request.handle, self.backoffs);
            }
            return self.finish_frame(ctx, TxStatus::ChannelAccessFailure);
        }
        debug!("[{}] csma channel busy, backoff {}", self.owner, self.backoffs);
        self.backoff_exponent = (self.backoff_exponent + 1).min(self.params.max_be);
        self.delay(ctx)
    }

    fn data_sent(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        let wants_ack = self
            .current
            .as_ref()
            .is_some_and(|outgoing| outgoing.request.ack_requested && !outgoing.request.destination.is_broadcast());
        if wants_ack {
            self.enter(ctx, CsmaState::WaitingForAck);
            self.timers.arm(ctx.sched, CsmaTimer::WaitForAck, self.params.ack_wait_ns())
        } else {
            self.finish_frame(ctx, TxStatus::Success)
        }
    }

    fn ack_timeout(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>) -> Result<()> {
        let Some(outgoing) = self.current.as_mut() else {
            return self.resume(ctx);
        };
        outgoing.retries += 1;
        if outgoing.retries > self.params.max_frame_retries {
            info!("[{}] csma no ack for frame {} after {} retries", self.owner, outgoing.request.handle, self.params.max_frame_retries);
            return self.finish_frame(ctx, TxStatus::NoAck);
        }
        debug!("[{}] csma ack wait expired, retry {}", self.owner, outgoing.retries);
        self.stats.retransmissions += 1;
        self.start_delay(ctx)
    }

    /// Reception while idle or delaying: deliver it and schedule the ACK if one is owed.
    fn on_incoming(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, transmission: Transmission) -> Result<()> {
        let Some(frame) = transmission.pdu.as_dot154() else {
            warn!("[{}] csma ignoring non-802.15.4 {} frame", self.owner, transmission.pdu.kind());
            return Ok(());
        };
        let Some(destination) = frame.destination() else {
            debug!("[{}] csma ignoring stray ack {}", self.owner, frame.sequence());
            return Ok(());
        };
        if destination != self.address && !destination.is_broadcast() {
            trace!("[{}] csma frame for {} is not ours", self.owner, destination);
            return Ok(());
        }

        match frame {
            Dot154Frame::Data { sequence, source, ack_request, payload, .. } => {
                let duplicate = *ack_request && self.last_sequence.get(source) == Some(sequence);
                self.last_sequence.insert(*source, *sequence);
                if duplicate {
                    debug!("[{}] csma duplicate frame {} from {}", self.owner, sequence, source);
                    self.stats.duplicates += 1;
                } else {
                    self.stats.indications += 1;
                    ctx.indicate(MacIndication {
                        source: *source,
                        destination,
                        msdu: payload.as_ref().clone(),
                        sequence: u16::from(*sequence),
                        rx_power_dbm: transmission.rx_power_dbm,
                    });
                }
            }
            Dot154Frame::Command { command_id, source, .. } => {
                warn!("[{}] csma unsupported command {} from {}", self.owner, command_id, source);
            }
            Dot154Frame::Ack { .. } => {}
        }

        if frame.wants_ack() {
            self.pending_ack = Some(frame.sequence());
            self.enter(ctx, CsmaState::WaitingToAck);
            self.timers.arm(ctx.sched, CsmaTimer::WaitToAck, self.params.turnaround_ns())?;
        }
        Ok(())
    }

    fn on_received(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, transmission: Transmission) -> Result<()> {
        match self.state {
            CsmaState::Init | CsmaState::Delay => self.on_incoming(ctx, transmission),
            CsmaState::WaitingForAck => {
                let expected = self.current.as_ref().map(|outgoing| outgoing.sequence);
                match transmission.pdu.as_dot154() {
                    Some(Dot154Frame::Ack { sequence }) if Some(*sequence) == expected => self.finish_frame(ctx, TxStatus::Success),
                    Some(Dot154Frame::Ack { sequence }) => {
                        debug!("[{}] csma stale ack {} (waiting for {:?})", self.owner, sequence, expected);
                        self.stats.stale_acks += 1;
                        Ok(())
                    }
                    _ => {
                        debug!("[{}] csma expecting ack instead of {}", self.owner, transmission.pdu.kind());
                        Ok(())
                    }
                }
            }
            CsmaState::TxData | CsmaState::WaitingToAck | CsmaState::TxAck => Ok(()),
        }
    }
}

impl MacProtocol for CsmaCa {
    type Address = Ieee802154Address;
    type Timer = CsmaTimer;

    fn address(&self) -> Ieee802154Address {
        self.address
    }

    fn timer(tag: ProtocolTimer) -> Option<CsmaTimer> {
        match tag {
            ProtocolTimer::Csma(timer) => Some(timer),
            _ => None,
        }
    }

    fn request(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, request: MacDataRequest<Ieee802154Address>) -> Result<()> {
        self.stats.requests += 1;
        if request.msdu.size_bytes() > MAX_MAC_PAYLOAD {
            debug!("[{}] csma payload of {} bytes is too long", self.owner, request.msdu.size_bytes());
            self.stats.frames_too_long += 1;
            ctx.confirm(request.handle, TxStatus::FrameTooLong);
            return Ok(());
        }
        self.queue.push_back(request);
        self.try_send(ctx)
    }

    fn on_radio_event(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, notification: RadioNotification) -> Result<()> {
        trace!("[{}] csma {} got {}", self.owner, self.state.name(), notification.kind());
        match notification {
            RadioNotification::RxReceived(transmission) => self.on_received(ctx, transmission),
            RadioNotification::Listen => match self.state {
                CsmaState::Init => self.try_send(ctx),
                CsmaState::TxData => self.data_sent(ctx),
                CsmaState::TxAck => {
                    self.stats.acks_sent += 1;
                    self.resume(ctx)
                }
                _ => Ok(()),
            },
            RadioNotification::Error(pdu) => match self.state {
                CsmaState::TxData => self.channel_busy(ctx),
                CsmaState::TxAck => {
                    debug!("[{}] csma radio refused the ack", self.owner);
                    self.resume(ctx)
                }
                _ => {
                    warn!("[{}] csma radio refused {} in {}", self.owner, pdu.kind(), self.state.name());
                    Ok(())
                }
            },
            RadioNotification::StartRx | RadioNotification::RxCollision => Ok(()),
        }
    }

    fn on_timer(&mut self, ctx: &mut MacContext<'_, Ieee802154Address>, timer: CsmaTimer) -> Result<()> {
        if !self.timers.fire(timer) {
            trace!("[{}] csma stale {:?} timer", self.owner, timer);
            return Ok(());
        }
        match timer {
            CsmaTimer::Delay => {
                if ctx.radio.is_listening() {
                    self.transmit_frame(ctx)
                } else {
                    self.channel_busy(ctx)
                }
            }
            CsmaTimer::WaitForAck => self.ack_timeout(ctx),
            CsmaTimer::WaitToAck => {
                let Some(sequence) = self.pending_ack.take() else {
                    return self.resume(ctx);
                };
                if !ctx.radio.is_listening() {
                    info!("[{}] csma radio busy at ack time, skipping ack {}", self.owner, sequence);
                    return self.resume(ctx);
                }
                self.enter(ctx, CsmaState::TxAck);
                ctx.transmit(Dot154Frame::ack(sequence))
            }
        }
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn stats(&self) -> &MacStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::SimTime;
    use crate::protocol::testing::{MacHarness, OWNER};
    use crate::protocol::{Pdu, ShortAddress};
    use crate::radio::RadioState;

    /// 250 kbit/s
    const RATE: u64 = 31_250;

    fn me() -> Ieee802154Address {
        Ieee802154Address::Short(ShortAddress::for_node(1))
    }

    fn peer() -> Ieee802154Address {
        Ieee802154Address::Short(ShortAddress::for_node(2))
    }

    fn harness() -> MacHarness<CsmaCa> {
        MacHarness::new(CsmaCa::new(OWNER, me(), CsmaParameters::default(), 7), RATE)
    }

    fn sent_data(h: &MacHarness<CsmaCa>) -> (u8, bool) {
        match h.last_sent() {
            Pdu::Dot154(Dot154Frame::Data { sequence, ack_request, .. }) => (*sequence, *ack_request),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn derived_durations() {
        let mut params = CsmaParameters::default();
        assert_eq!(params.unit_backoff_ns(), 320_000);
        assert_eq!(params.turnaround_ns(), 192_000);
        assert_eq!(params.ack_wait_symbols(), 54);
        assert_eq!(params.ack_wait_ns(), 865_000);
        params.symbol_rate = 125_000;
        assert_eq!(params.unit_backoff_ns(), 160_000);
        assert!(params.validate().is_ok());
        params.min_be = 6;
        assert!(params.validate().is_err());
    }

    #[test]
    fn acknowledged_unicast() {
        let mut h = harness();
        h.request(1, peer(), 20);
        assert_eq!(h.mac.state(), CsmaState::Delay);
        let sent_at = h.fire_until(CsmaTimer::Delay);
        assert_eq!(sent_at.as_nanos() % 320_000, 0);
        assert!(sent_at.as_nanos() < 8 * 320_000);
        assert_eq!(h.mac.state(), CsmaState::TxData);
        assert_eq!(sent_data(&h), (0, true));

        h.end_transmission();
        assert_eq!(h.mac.state(), CsmaState::WaitingForAck);
        h.receive(Dot154Frame::ack(0));
        assert_eq!(h.upper.statuses(), vec![TxStatus::Success]);
        assert_eq!(h.mac.state(), CsmaState::Init);
        assert_eq!(h.next_timer_at(), None);
    }

    #[test]
    fn stale_ack_is_ignored_and_retry_reuses_sequence() {
        let mut h = harness();
        h.request(1, peer(), 20);
        h.fire_until(CsmaTimer::Delay);
        h.end_transmission();
        h.receive(Dot154Frame::ack(5));
        assert_eq!(h.mac.state(), CsmaState::WaitingForAck);
        assert_eq!(h.mac.stats().stale_acks, 1);

        h.fire_until(CsmaTimer::WaitForAck);
        assert_eq!(h.mac.state(), CsmaState::Delay);
        assert_eq!(h.mac.retries(), 1);
        h.fire_until(CsmaTimer::Delay);
        assert_eq!(sent_data(&h).0, 0);
        assert_eq!(h.radio.sent.len(), 2);
    }

    #[test]
    fn no_ack_after_retry_limit() {
        let mut h = harness();
        h.request(9, peer(), 20);
        for _ in 0..4 {
            h.fire_until(CsmaTimer::Delay);
            h.end_transmission();
            h.fire_until(CsmaTimer::WaitForAck);
        }
        assert_eq!(h.radio.sent.len(), 4);
        assert_eq!(h.upper.statuses(), vec![TxStatus::NoAck]);
        assert_eq!(h.mac.stats().retransmissions, 3);
        assert_eq!(h.mac.state(), CsmaState::Init);
        assert!(h.fire_next().is_none());
    }

    #[test]
    fn busy_channel_ends_in_one_channel_access_failure() {
        let mut h = harness();
        h.request(2, peer(), 20);
        assert_eq!(h.mac.backoff_exponent(), 3);
        h.radio.state = RadioState::RxBusy;
        let mut exponents = Vec::new();
        while h.fire_next().is_some() {
            exponents.push(h.mac.backoff_exponent());
        }
        assert_eq!(exponents, vec![4, 5, 5, 5, 3]);
        assert_eq!(h.upper.statuses(), vec![TxStatus::ChannelAccessFailure]);
        assert_eq!(h.mac.stats().channel_access_failures, 1);
        assert_eq!(h.mac.stats().backoff_draws, 5);
        assert!(h.radio.sent.is_empty());
    }

    #[test]
    fn broadcast_is_confirmed_when_sent() {
        let mut h = harness();
        h.request(3, Ieee802154Address::broadcast(), 10);
        h.fire_until(CsmaTimer::Delay);
        h.end_transmission();
        assert_eq!(h.upper.statuses(), vec![TxStatus::Success]);
        assert_eq!(h.mac.state(), CsmaState::Init);
    }

    #[test]
    fn data_arriving_during_ack_wait_is_neither_indicated_nor_acked() {
        let mut h = harness();
        h.request(1, peer(), 20);
        h.fire_until(CsmaTimer::Delay);
        h.end_transmission();
        assert_eq!(h.mac.state(), CsmaState::WaitingForAck);

        h.receive(Dot154Frame::data(9, me(), peer(), true, Pdu::opaque(12)));
        assert!(h.upper.indications.is_empty());
        assert_eq!(h.mac.state(), CsmaState::WaitingForAck);
        assert_eq!(h.mac.stats().acks_sent, 0);
        assert_eq!(h.radio.sent.len(), 1);

        // the ack wait keeps running and our own ack still completes the frame
        h.receive(Dot154Frame::ack(0));
        assert_eq!(h.upper.statuses(), vec![TxStatus::Success]);
        assert_eq!(h.radio.sent.len(), 1);
    }

    #[test]
    fn receiver_acks_after_turnaround() {
        let mut h = harness();
        h.receive(Dot154Frame::data(4, me(), peer(), true, Pdu::opaque(12)));
        assert_eq!(h.upper.indications.len(), 1);
        assert_eq!(h.upper.indications[0].1.sequence, 4);
        assert_eq!(h.mac.state(), CsmaState::WaitingToAck);
        let acked_at = h.fire_until(CsmaTimer::WaitToAck);
        assert_eq!(acked_at, SimTime::from_nanos(192_000));
        assert_eq!(h.last_sent(), &Pdu::from(Dot154Frame::ack(4)));
        h.end_transmission();
        assert_eq!(h.mac.state(), CsmaState::Init);
        assert_eq!(h.mac.stats().acks_sent, 1);

        // the same frame again means our ack was lost
        h.receive(Dot154Frame::data(4, me(), peer(), true, Pdu::opaque(12)));
        assert_eq!(h.upper.indications.len(), 1);
        assert_eq!(h.mac.stats().duplicates, 1);
        assert_eq!(h.mac.state(), CsmaState::WaitingToAck);
    }

    #[test]
    fn ack_interrupts_delay_and_delay_resumes() {
        let mut h = harness();
        h.mac.params_mut().min_be = 5;
        h.request(1, peer(), 20);
        assert_eq!(h.mac.state(), CsmaState::Delay);
        h.receive(Dot154Frame::data(0, me(), peer(), true, Pdu::opaque(5)));
        h.fire_until(CsmaTimer::WaitToAck);
        assert_eq!(h.mac.state(), CsmaState::TxAck);
        h.end_transmission();
        assert_eq!(h.mac.state(), CsmaState::Delay);
        h.fire_until(CsmaTimer::Delay);
        assert_eq!(h.mac.state(), CsmaState::TxData);
        assert_eq!(h.radio.sent.len(), 2);
    }

    #[test]
    fn frames_for_others_are_ignored() {
        let mut h = harness();
        let other = Ieee802154Address::Short(ShortAddress::for_node(3));
        h.receive(Dot154Frame::data(0, other, peer(), true, Pdu::opaque(5)));
        assert!(h.upper.indications.is_empty());
        assert_eq!(h.mac.state(), CsmaState::Init);
        h.receive(Pdu::opaque(3));
        assert_eq!(h.mac.state(), CsmaState::Init);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let mut h = harness();
        h.request(4, peer(), MAX_MAC_PAYLOAD + 1);
        assert_eq!(h.upper.statuses(), vec![TxStatus::FrameTooLong]);
        assert_eq!(h.mac.state(), CsmaState::Init);
    }

    #[test]
    fn queued_frames_go_out_in_order() {
        let mut h = harness();
        h.request(1, Ieee802154Address::broadcast(), 4);
        h.request(2, Ieee802154Address::broadcast(), 4);
        assert_eq!(h.mac.queue_len(), 1);
        h.fire_until(CsmaTimer::Delay);
        h.end_transmission();
        h.fire_until(CsmaTimer::Delay);
        assert_eq!(sent_data(&h).0, 1);
        h.end_transmission();
        let handles: Vec<u32> = h.upper.confirms.iter().map(|(_, confirm)| confirm.handle).collect();
        assert_eq!(handles, vec![1, 2]);
    }
}
