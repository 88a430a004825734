//! 802.11 distributed coordination function.
//!
//! Unicast frames always go through an RTS/CTS handshake followed by DATA/ACK; broadcast frames are
//! sent as bare DATA. A station defers for DIFS after the medium goes idle, then counts down any
//! pending backoff one slot at a time. Receptions pause the count without resetting it.
//! Overheard reservations addressed to someone else put the station in NAV for the announced time;
//! a later-ending reservation heard during NAV extends it. A CTS or ACK owed to a peer goes out
//! once SIFS has elapsed, whatever the medium does in between.
//!
//! Every state transition goes through [`Dcf::enter`], which cancels all pending timers.

use log::{debug, info, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};

use crate::error::Result;
use crate::kernel::{ModelId, ProtocolTimer, SimTime, TimerSet, Transmission};
use crate::protocol::dot11::frame::{ACK_LEN, CTS_LEN, DATA_HEADER_LEN, SEQUENCE_MODULO};
use crate::protocol::dot11::Dot11Frame;
use crate::protocol::{
    EthernetAddress, MacContext, MacDataRequest, MacIndication, MacProtocol, MacStats, Pdu, PduWrap, TxStatus,
};
use crate::radio::RadioNotification;

/// DCF timing and retry parameters. Derived intervals are computed on use.
#[derive(Debug, Clone, PartialEq)]
pub struct DcfParameters {
    /// SIFS including the worst-case one-way propagation delay.
    pub sifs_pd_us: u64,
    /// SIFS as seen by the station that answers.
    pub sifs_no_pd_us: u64,
    pub slot_us: u64,
    pub cw_min: u32,
    pub cw_max: u32,
    /// Transmission attempts per frame, the first one included.
    pub max_attempts: u32,
    pub max_payload: usize,
}

impl Default for DcfParameters {
    fn default() -> Self {
        Self { sifs_pd_us: 10, sifs_no_pd_us: 9, slot_us: 9, cw_min: 16, cw_max: 128, max_attempts: 5, max_payload: 2312 }
    }
}

impl DcfParameters {
    pub fn difs_us(&self) -> u64 {
        self.sifs_pd_us + 2 * self.slot_us
    }

    /// How long to wait for the leading edge of a CTS, DATA or ACK answer.
    pub fn response_timeout_us(&self) -> u64 {
        self.sifs_pd_us + self.slot_us
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DcfTimer {
    Difs,
    BackoffSlot,
    WaitForCts,
    WaitToTxData,
    WaitForAck,
    WaitToCts,
    WaitForRxData,
    WaitToAck,
    Nav,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcfState {
    Init,
    WaitingDifs,
    Ready,
    Backoff,
    TxRts,
    WaitingCts,
    WaitingToTxData,
    TxData,
    WaitingForAck,
    WaitingToCts,
    TxCts,
    WaitingForRxData,
    WaitingToAck,
    TxAck,
    Nav,
}

impl DcfState {
    pub fn name(self) -> &'static str {
        match self {
            DcfState::Init => "INIT",
            DcfState::WaitingDifs => "WAITING_DIFS",
            DcfState::Ready => "READY",
            DcfState::Backoff => "BACKOFF",
            DcfState::TxRts => "TX_RTS",
            DcfState::WaitingCts => "WAITING_CTS",
            DcfState::WaitingToTxData => "WAITING_TO_TX_DATA",
            DcfState::TxData => "TX_DATA",
            DcfState::WaitingForAck => "WAITING_FOR_ACK",
            DcfState::WaitingToCts => "WAITING_TO_CTS",
            DcfState::TxCts => "TX_CTS",
            DcfState::WaitingForRxData => "WAITING_FOR_RX_DATA",
            DcfState::WaitingToAck => "WAITING_TO_ACK",
            DcfState::TxAck => "TX_ACK",
            DcfState::Nav => "NAV",
        }
    }
}

/// The frame being delivered.
#[derive(Debug)]
struct Outgoing {
    request: MacDataRequest<EthernetAddress>,
    sequence: u16,
    attempts: u32,
}

/// Peer we owe a CTS or an ACK.
#[derive(Debug, Clone, Copy)]
struct Reply {
    to: EthernetAddress,
    rts_duration_us: u32,
}

pub struct Dcf {
    owner: ModelId,
    address: EthernetAddress,
    params: DcfParameters,
    state: DcfState,
    timers: TimerSet<DcfTimer>,
    rng: ChaCha8Rng,
    queue: VecDeque<MacDataRequest<EthernetAddress>>,
    current: Option<Outgoing>,
    cw: u32,
    backoff: u32,
    next_sequence: u16,
    reply: Option<Reply>,
    nav_until: SimTime,
    last_sequence: BTreeMap<EthernetAddress, u16>,
    stats: MacStats,
}

fn ceil_us(nanos: u64) -> u64 {
    nanos.div_ceil(1000)
}

impl Dcf {
    pub fn new(owner: ModelId, address: EthernetAddress, params: DcfParameters, seed: u64) -> Self {
        let cw = params.cw_min;
        Self {
            owner,
            address,
            params,
            state: DcfState::Init,
            timers: TimerSet::new(owner),
            rng: ChaCha8Rng::seed_from_u64(seed),
            queue: VecDeque::new(),
            current: None,
            cw,
            backoff: 0,
            next_sequence: 0,
            reply: None,
            nav_until: SimTime::ZERO,
            last_sequence: BTreeMap::new(),
            stats: MacStats::default(),
        }
    }

    pub fn state(&self) -> DcfState {
        self.state
    }

    pub fn params(&self) -> &DcfParameters {
        &self.params
    }

    pub fn contention_window(&self) -> u32 {
        self.cw
    }

    pub fn backoff_slots(&self) -> u32 {
        self.backoff
    }

    /// Attempts made so far for the frame in progress.
    pub fn attempts(&self) -> u32 {
        self.current.as_ref().map_or(0, |outgoing| outgoing.attempts)
    }

    fn enter(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, state: DcfState) {
        self.timers.cancel_all(ctx.sched);
        if self.state != state {
            trace!("[{}] dcf {} -> {}", self.owner, self.state.name(), state.name());
        }
        self.state = state;
    }

    fn arm(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, timer: DcfTimer, micros: u64) -> Result<()> {
        self.timers.arm(ctx.sched, timer, micros * 1000)
    }

    fn wait_difs(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        self.enter(ctx, DcfState::WaitingDifs);
        if ctx.radio.is_listening() {
            self.arm(ctx, DcfTimer::Difs, self.params.difs_us())?;
        }
        Ok(())
    }

    fn draw_backoff(&mut self) {
        self.backoff = self.rng.gen_range(1..=self.cw);
        self.stats.backoff_draws += 1;
        trace!("[{}] dcf backoff {} slots (cw {})", self.owner, self.backoff, self.cw);
    }

    fn try_transmission(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        if self.current.is_none() {
            let Some(request) = self.queue.pop_front() else {
                return Ok(());
            };
            let sequence = self.next_sequence;
            self.next_sequence = (self.next_sequence + 1) % SEQUENCE_MODULO;
            self.current = Some(Outgoing { request, sequence, attempts: 0 });
        }
        let Some(outgoing) = self.current.as_mut() else {
            return Ok(());
        };
        outgoing.attempts += 1;
        if outgoing.attempts > 1 {
            self.stats.retransmissions += 1;
        }

        if outgoing.request.destination.is_broadcast() {
            self.enter(ctx, DcfState::TxData);
            self.send_data(ctx, 0)
        } else {
            let body_len = outgoing.request.msdu.size_bytes();
            let destination = outgoing.request.destination;
            let exchange_ns = ctx.radio.airtime_ns(CTS_LEN + ACK_LEN + DATA_HEADER_LEN + body_len);
            let duration_us = 3 * self.params.sifs_pd_us + ceil_us(exchange_ns);
            self.enter(ctx, DcfState::TxRts);
            ctx.transmit(Dot11Frame::rts(destination, self.address, duration_us as u32))
        }
    }

    fn send_data(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, duration_us: u32) -> Result<()> {
        let Some(outgoing) = self.current.as_ref() else {
            return Ok(());
        };
        let frame = Dot11Frame::data(
            outgoing.request.destination,
            self.address,
            outgoing.sequence,
            outgoing.attempts > 1,
            duration_us,
            outgoing.request.msdu.clone(),
        );
        ctx.transmit(frame)
    }

    fn tx_data_done(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        self.backoff = 0;
        let broadcast = self.current.as_ref().is_some_and(|outgoing| outgoing.request.destination.is_broadcast());
        if broadcast {
            self.tx_succeeded(ctx)
        } else {
            self.enter(ctx, DcfState::WaitingForAck);
            self.arm(ctx, DcfTimer::WaitForAck, self.params.response_timeout_us())
        }
    }

    fn tx_succeeded(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        if let Some(outgoing) = self.current.take() {
            self.stats.tx_success += 1;
            ctx.confirm(outgoing.request.handle, TxStatus::Success);
        }
        self.cw = self.params.cw_min;
        self.wait_difs(ctx)
    }

    fn tx_failed(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        let exhausted = self.current.as_ref().is_some_and(|outgoing| outgoing.attempts >= self.params.max_attempts);
        if exhausted {
            if let Some(outgoing) = self.current.take() {
                info!("[{}] dcf dropping frame {} after {} attempts", self.owner, outgoing.request.handle, outgoing.attempts);
                self.stats.tx_failed += 1;
                ctx.confirm(outgoing.request.handle, TxStatus::RetryLimitExceeded);
            }
            self.cw = self.params.cw_min;
        } else {
            self.cw = (self.cw * 2).min(self.params.cw_max);
            if self.backoff == 0 {
                self.draw_backoff();
            }
        }
        self.wait_difs(ctx)
    }

    fn nav(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, duration_us: u32) -> Result<()> {
        let until = ctx.sched.now().after_micros(u64::from(duration_us));
        if duration_us == 0 || (self.state == DcfState::Nav && until <= self.nav_until) {
            return Ok(());
        }
        if self.state == DcfState::Nav {
            trace!("[{}] dcf nav extended to {}", self.owner, until);
        } else {
            self.stats.nav_deferrals += 1;
        }
        self.nav_until = until;
        self.enter(ctx, DcfState::Nav);
        self.arm(ctx, DcfTimer::Nav, u64::from(duration_us))
    }

    /// Reservations overheard while already deferring.
    fn extend_nav(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, frame: &Dot11Frame) -> Result<()> {
        if frame.receiver() == self.address {
            return Ok(());
        }
        match *frame {
            Dot11Frame::Rts { duration_us, .. } | Dot11Frame::Cts { duration_us, .. } => self.nav(ctx, duration_us),
            Dot11Frame::Data { duration_us, destination, .. } if !destination.is_broadcast() => self.nav(ctx, duration_us),
            _ => Ok(()),
        }
    }

    /// Send the CTS or ACK owed in the current state.
    fn send_reply(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        match self.state {
            DcfState::WaitingToCts => {
                let Some(reply) = self.reply else {
                    return self.wait_difs(ctx);
                };
                let cts_us = ceil_us(ctx.radio.airtime_ns(CTS_LEN));
                let duration_us = u64::from(reply.rts_duration_us).saturating_sub(self.params.sifs_pd_us + cts_us);
                self.enter(ctx, DcfState::TxCts);
                ctx.transmit(Dot11Frame::cts(reply.to, duration_us as u32))
            }
            DcfState::WaitingToAck => {
                let Some(reply) = self.reply.take() else {
                    return self.wait_difs(ctx);
                };
                self.stats.acks_sent += 1;
                self.enter(ctx, DcfState::TxAck);
                ctx.transmit(Dot11Frame::ack(reply.to))
            }
            _ => Ok(()),
        }
    }

    /// The medium went idle while a reply is owed: send it if SIFS is already over.
    fn resume_reply(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        let sifs = if self.state == DcfState::WaitingToCts { DcfTimer::WaitToCts } else { DcfTimer::WaitToAck };
        if self.timers.is_armed(sifs) || !ctx.radio.is_listening() {
            return Ok(());
        }
        self.send_reply(ctx)
    }

    fn parse_rts(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, frame: &Dot11Frame) -> Result<()> {
        let Dot11Frame::Rts { duration_us, receiver, transmitter } = *frame else {
            return Ok(());
        };
        if receiver != self.address {
            return self.nav(ctx, duration_us);
        }
        self.reply = Some(Reply { to: transmitter, rts_duration_us: duration_us });
        self.enter(ctx, DcfState::WaitingToCts);
        self.arm(ctx, DcfTimer::WaitToCts, self.params.sifs_no_pd_us)
    }

    fn parse_data(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, frame: &Dot11Frame, rx_power_dbm: f64) -> Result<()> {
        let Dot11Frame::Data { duration_us, destination, source, sequence, retry, ref body } = *frame else {
            return Ok(());
        };
        if destination.is_broadcast() {
            self.indicate(ctx, source, destination, sequence, body, rx_power_dbm);
            return Ok(());
        }
        if destination != self.address {
            return self.nav(ctx, duration_us);
        }

        let duplicate = retry && self.last_sequence.get(&source) == Some(&sequence);
        self.last_sequence.insert(source, sequence);
        if duplicate {
            debug!("[{}] dcf duplicate frame {} from {}", self.owner, sequence, source);
            self.stats.duplicates += 1;
        } else {
            self.indicate(ctx, source, destination, sequence, body, rx_power_dbm);
        }
        self.reply = Some(Reply { to: source, rts_duration_us: 0 });
        self.enter(ctx, DcfState::WaitingToAck);
        self.arm(ctx, DcfTimer::WaitToAck, self.params.sifs_no_pd_us)
    }

    fn indicate(
        &mut self,
        ctx: &mut MacContext<'_, EthernetAddress>,
        source: EthernetAddress,
        destination: EthernetAddress,
        sequence: u16,
        body: &Pdu,
        rx_power_dbm: f64,
    ) {
        self.stats.indications += 1;
        ctx.indicate(MacIndication { source, destination, msdu: body.clone(), sequence, rx_power_dbm });
    }

    fn on_listen(&mut self, ctx: &mut MacContext<'_, EthernetAddress>) -> Result<()> {
        match self.state {
            DcfState::Init
            | DcfState::Ready
            | DcfState::WaitingDifs
            | DcfState::Backoff
            | DcfState::TxAck
            | DcfState::WaitingForRxData => self.wait_difs(ctx),
            DcfState::WaitingToAck | DcfState::WaitingToCts => self.resume_reply(ctx),
            DcfState::TxData => self.tx_data_done(ctx),
            DcfState::TxRts => {
                self.enter(ctx, DcfState::WaitingCts);
                self.arm(ctx, DcfTimer::WaitForCts, self.params.response_timeout_us())
            }
            DcfState::TxCts => {
                self.enter(ctx, DcfState::WaitingForRxData);
                self.arm(ctx, DcfTimer::WaitForRxData, self.params.response_timeout_us())
            }
            DcfState::WaitingCts | DcfState::WaitingForAck | DcfState::WaitingToTxData => self.tx_failed(ctx),
            DcfState::Nav => Ok(()),
        }
    }

    fn on_frame(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, transmission: Transmission) -> Result<()> {
        let Some(frame) = transmission.pdu.as_dot11() else {
            warn!("[{}] dcf ignoring non-802.11 {} frame", self.owner, transmission.pdu.kind());
            return self.on_listen(ctx);
        };
        let for_us = frame.receiver() == self.address;

        match self.state {
            DcfState::Init | DcfState::Ready | DcfState::WaitingDifs | DcfState::Backoff => {
                let before = self.state;
                match frame {
                    Dot11Frame::Rts { .. } => self.parse_rts(ctx, frame)?,
                    Dot11Frame::Data { .. } => self.parse_data(ctx, frame, transmission.rx_power_dbm)?,
                    Dot11Frame::Cts { duration_us, .. } if !for_us => self.nav(ctx, *duration_us)?,
                    _ => {}
                }
                if self.state == before { self.wait_difs(ctx) } else { Ok(()) }
            }
            DcfState::WaitingCts => {
                if matches!(frame, Dot11Frame::Cts { .. }) && for_us {
                    self.enter(ctx, DcfState::WaitingToTxData);
                    self.arm(ctx, DcfTimer::WaitToTxData, self.params.sifs_no_pd_us)
                } else {
                    self.tx_failed(ctx)
                }
            }
            DcfState::WaitingForAck => {
                if matches!(frame, Dot11Frame::Ack { .. }) && for_us { self.tx_succeeded(ctx) } else { self.tx_failed(ctx) }
            }
            DcfState::WaitingToAck | DcfState::WaitingToCts => self.resume_reply(ctx),
            DcfState::WaitingToTxData => self.tx_failed(ctx),
            DcfState::WaitingForRxData => {
                if matches!(frame, Dot11Frame::Data { .. }) {
                    self.parse_data(ctx, frame, transmission.rx_power_dbm)?;
                }
                if self.state == DcfState::WaitingForRxData { self.wait_difs(ctx) } else { Ok(()) }
            }
            DcfState::Nav => self.extend_nav(ctx, frame),
            DcfState::TxRts | DcfState::TxData | DcfState::TxCts | DcfState::TxAck => Ok(()),
        }
    }
}

impl MacProtocol for Dcf {
    type Address = EthernetAddress;
    type Timer = DcfTimer;

    fn address(&self) -> EthernetAddress {
        self.address
    }

    fn timer(tag: ProtocolTimer) -> Option<DcfTimer> {
        match tag {
            ProtocolTimer::Dcf(timer) => Some(timer),
            _ => None,
        }
    }

    fn request(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, request: MacDataRequest<EthernetAddress>) -> Result<()> {
        self.stats.requests += 1;
        if request.msdu.size_bytes() > self.params.max_payload {
            debug!("[{}] dcf payload of {} bytes is too long", self.owner, request.msdu.size_bytes());
            self.stats.frames_too_long += 1;
            ctx.confirm(request.handle, TxStatus::FrameTooLong);
            return Ok(());
        }
        self.queue.push_back(request);

        let listening = ctx.radio.is_listening();
        match self.state {
            DcfState::Init if listening => self.wait_difs(ctx),
            DcfState::Ready if listening => self.try_transmission(ctx),
            _ => Ok(()),
        }
    }

    fn on_radio_event(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, notification: RadioNotification) -> Result<()> {
        trace!("[{}] dcf {} got {}", self.owner, self.state.name(), notification.kind());
        match notification {
            RadioNotification::StartRx | RadioNotification::RxCollision => {
                if !matches!(self.state, DcfState::Nav | DcfState::WaitingToAck | DcfState::WaitingToCts) {
                    self.timers.cancel_all(ctx.sched);
                }
                Ok(())
            }
            RadioNotification::Listen => self.on_listen(ctx),
            RadioNotification::RxReceived(transmission) => self.on_frame(ctx, transmission),
            RadioNotification::Error(pdu) => match self.state {
                DcfState::TxRts | DcfState::TxData => self.tx_failed(ctx),
                DcfState::TxCts | DcfState::TxAck => self.wait_difs(ctx),
                _ => {
                    warn!("[{}] dcf radio refused {} in {}", self.owner, pdu.kind(), self.state.name());
                    Ok(())
                }
            },
        }
    }

    fn on_timer(&mut self, ctx: &mut MacContext<'_, EthernetAddress>, timer: DcfTimer) -> Result<()> {
        if !self.timers.fire(timer) {
            trace!("[{}] dcf stale {:?} timer", self.owner, timer);
            return Ok(());
        }
        let listening = ctx.radio.is_listening();

        match timer {
            DcfTimer::Difs if listening => {
                if self.backoff > 0 {
                    self.enter(ctx, DcfState::Backoff);
                    self.arm(ctx, DcfTimer::BackoffSlot, self.params.slot_us)
                } else {
                    self.enter(ctx, DcfState::Ready);
                    self.try_transmission(ctx)
                }
            }
            DcfTimer::BackoffSlot => {
                self.backoff = self.backoff.saturating_sub(1);
                if !listening {
                    return Ok(());
                }
                if self.backoff > 0 {
                    self.arm(ctx, DcfTimer::BackoffSlot, self.params.slot_us)
                } else {
                    self.enter(ctx, DcfState::Ready);
                    self.try_transmission(ctx)
                }
            }
            DcfTimer::WaitForCts | DcfTimer::WaitForAck if listening => self.tx_failed(ctx),
            DcfTimer::WaitToTxData if listening => {
                let duration_us = ceil_us(ctx.radio.airtime_ns(ACK_LEN)) + self.params.sifs_pd_us;
                self.enter(ctx, DcfState::TxData);
                self.send_data(ctx, duration_us as u32)
            }
            // a reception in progress delays the reply until the radio is back to LISTENING
            DcfTimer::WaitToCts | DcfTimer::WaitToAck if listening => self.send_reply(ctx),
            DcfTimer::WaitForRxData if listening => self.wait_difs(ctx),
            DcfTimer::Nav => self.wait_difs(ctx),
            // the radio is busy; its next notification moves the state machine on
            _ => Ok(()),
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
