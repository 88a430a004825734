//! Half-duplex radio state machine.
//!
//! The radio either transmits or receives, never both. Frames that arrive while a reception is in
//! progress corrupt it: the radio keeps listening until the longest of the overlapping frames has
//! ended and then reports nothing but a return to LISTEN.
//!
//! Entry points return the notification they produce instead of calling listeners, so the owning
//! station decides when the MAC and the other listeners see it.

use log::{debug, trace};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::kernel::{Event, EventId, ModelId, Scheduler, SimTime, Transmission};
use crate::protocol::{Pdu, PduWrap};
use crate::radio::{Band, RadioConfig, SharedPropagation};

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Off,
    Listening,
    TxBusy,
    RxBusy,
    RxBusyCollision,
    Sleep,
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RadioState::Off => "OFF",
            RadioState::Listening => "LISTENING",
            RadioState::TxBusy => "TX_BUSY",
            RadioState::RxBusy => "RX_BUSY",
            RadioState::RxBusyCollision => "RX_BUSY_COLLISION",
            RadioState::Sleep => "SLEEP",
        };
        f.write_str(name)
    }
}

/// What a radio tells the layers above it.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioNotification {
    /// The radio is back in LISTENING after a transmission or a reception.
    Listen,
    StartRx,
    RxReceived(Transmission),
    RxCollision,
    /// The radio could not transmit; the frame is handed back.
    Error(Pdu),
}

impl RadioNotification {
    pub fn kind(&self) -> &'static str {
        match self {
            RadioNotification::Listen => "listen",
            RadioNotification::StartRx => "start-rx",
            RadioNotification::RxReceived(_) => "rx-received",
            RadioNotification::RxCollision => "rx-collision",
            RadioNotification::Error(_) => "error",
        }
    }
}

/// Synchronous observer of a station's radio notifications.
pub trait RadioEventListener {
    fn notify_radio_event(&mut self, owner: ModelId, time: SimTime, notification: &RadioNotification);

    /// Counters merged into the owning model's report.
    fn summary(&self) -> BTreeMap<String, u64> {
        BTreeMap::new()
    }
}

/// Counts notifications by kind.
#[derive(Debug, Default)]
pub struct RadioTrace {
    counts: BTreeMap<&'static str, u64>,
}

impl RadioTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).copied().unwrap_or(0)
    }
}

impl RadioEventListener for RadioTrace {
    fn notify_radio_event(&mut self, owner: ModelId, time: SimTime, notification: &RadioNotification) {
        trace!("[{}] radio {} at {}", owner, notification.kind(), time);
        *self.counts.entry(notification.kind()).or_insert(0) += 1;
    }

    fn summary(&self) -> BTreeMap<String, u64> {
        self.counts.iter().map(|(kind, count)| (kind.to_string(), *count)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RadioStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub collisions: u64,
    pub errors: u64,
    pub below_margin: u64,
    pub missed_while_busy: u64,
    pub tx_airtime_ns: u64,
    pub rx_airtime_ns: u64,
    pub energy_mah: f64,
}

/// Capability a MAC needs from its radio.
pub trait Radio {
    fn state(&self) -> RadioState;

    fn is_listening(&self) -> bool {
        self.state() == RadioState::Listening
    }

    fn band(&self) -> Band;

    /// Nanoseconds `size_bytes` occupy the medium, rounded up.
    fn airtime_ns(&self, size_bytes: usize) -> u64;

    /// Start sending `pdu` at maximum power.
    ///
    /// # Returns
    ///
    /// `Some(RadioNotification::Error)` carrying the frame back if the radio cannot transmit in its
    /// current state.
    fn transmit(&mut self, sched: &mut Scheduler, pdu: Pdu) -> Result<Option<RadioNotification>>;
}

pub struct HalfDuplexRadio {
    owner: ModelId,
    config: RadioConfig,
    propagation: SharedPropagation,
    state: RadioState,
    state_since: SimTime,
    end_of_reception: Option<(EventId, SimTime)>,
    idle_ns: u64,
    stats: RadioStats,
}

impl HalfDuplexRadio {
    pub fn new(owner: ModelId, config: RadioConfig, propagation: SharedPropagation) -> Self {
        Self {
            owner,
            config,
            propagation,
            state: RadioState::Off,
            state_since: SimTime::ZERO,
            end_of_reception: None,
            idle_ns: 0,
            stats: RadioStats::default(),
        }
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn stats(&self) -> &RadioStats {
        &self.stats
    }

    /// Switch on silently; the MAC starts from its own initial state.
    pub fn initialize(&mut self, now: SimTime) {
        self.set_state(now, RadioState::Listening);
    }

    /// Wake from OFF or SLEEP. The returned LISTEN restarts a MAC left idle while the radio was down.
    pub fn turn_on(&mut self, now: SimTime) -> Option<RadioNotification> {
        match self.state {
            RadioState::Off | RadioState::Sleep => {
                self.set_state(now, RadioState::Listening);
                Some(RadioNotification::Listen)
            }
            _ => None,
        }
    }

    /// Enter SLEEP from an idle state. Busy radios refuse.
    pub fn sleep(&mut self, now: SimTime) -> bool {
        match self.state {
            RadioState::Listening | RadioState::Off | RadioState::Sleep => {
                self.set_state(now, RadioState::Sleep);
                true
            }
            busy => {
                debug!("[{}] radio cannot sleep while {}", self.owner, busy);
                false
            }
        }
    }

    /// Switch off, abandoning any reception in progress.
    pub fn turn_off(&mut self, sched: &mut Scheduler) {
        if let Some((id, _)) = self.end_of_reception.take() {
            sched.cancel(id);
        }
        self.set_state(sched.now(), RadioState::Off);
    }

    pub fn end_of_transmission(&mut self, now: SimTime) -> Option<RadioNotification> {
        if self.state != RadioState::TxBusy {
            return None;
        }
        trace!("[{}] radio end of transmission", self.owner);
        self.set_state(now, RadioState::Listening);
        Some(RadioNotification::Listen)
    }

    /// Leading edge of a frame reaching this radio.
    pub fn receive(&mut self, sched: &mut Scheduler, transmission: Transmission) -> Result<Option<RadioNotification>> {
        let noise_floor = self.propagation.borrow().noise_floor(self.config.band);
        let snr = transmission.rx_power_dbm - noise_floor;
        if snr < self.config.snr_margin_db {
            self.stats.below_margin += 1;
            return Ok(None);
        }

        match self.state {
            RadioState::Listening => {
                debug!("[{}] radio started to receive {}", self.owner, transmission.pdu.kind());
                self.set_state(sched.now(), RadioState::RxBusy);
                self.schedule_end_of_reception(sched, transmission)?;
                Ok(Some(RadioNotification::StartRx))
            }
            RadioState::RxBusy | RadioState::RxBusyCollision => {
                debug!("[{}] radio collision detected", self.owner);
                self.state = RadioState::RxBusyCollision;
                self.stats.collisions += 1;
                let new_end = sched.now().after_nanos(self.airtime_ns(transmission.pdu.size_bytes()));
                let current_end = self.end_of_reception.map(|(_, end)| end);
                if current_end.is_none_or(|end| new_end > end) {
                    if let Some((id, _)) = self.end_of_reception.take() {
                        sched.cancel(id);
                    }
                    self.schedule_end_of_reception(sched, transmission)?;
                }
                Ok(Some(RadioNotification::RxCollision))
            }
            _ => {
                self.stats.missed_while_busy += 1;
                Ok(None)
            }
        }
    }

    pub fn end_of_reception(&mut self, now: SimTime, transmission: Transmission) -> Option<RadioNotification> {
        self.end_of_reception = None;
        match self.state {
            RadioState::RxBusyCollision => {
                trace!("[{}] radio discarding corrupted reception", self.owner);
                self.set_state(now, RadioState::Listening);
                Some(RadioNotification::Listen)
            }
            RadioState::RxBusy => {
                self.set_state(now, RadioState::Listening);
                self.stats.frames_received += 1;
                Some(RadioNotification::RxReceived(transmission))
            }
            _ => None,
        }
    }

    /// Close the energy books at the end of the run.
    pub fn finish(&mut self, end: SimTime) {
        self.set_state(end, self.state);
        let hours = |ns: u64| ns as f64 / 3.6e12;
        self.stats.energy_mah = self.config.tx_current_ma * hours(self.stats.tx_airtime_ns)
            + self.config.rx_current_ma * hours(self.stats.rx_airtime_ns)
            + self.config.idle_current_ma * hours(self.idle_ns);
    }

    fn schedule_end_of_reception(&mut self, sched: &mut Scheduler, transmission: Transmission) -> Result<()> {
        let end = sched.now().after_nanos(self.airtime_ns(transmission.pdu.size_bytes()));
        let id = sched.schedule(self.owner, end, Event::EndOfReception(transmission))?;
        if !id.is_rejected() {
            self.end_of_reception = Some((id, end));
        }
        Ok(())
    }

    fn set_state(&mut self, now: SimTime, next: RadioState) {
        let spent = now.checked_sub(self.state_since).unwrap_or(0);
        match self.state {
            RadioState::TxBusy => self.stats.tx_airtime_ns += spent,
            RadioState::RxBusy | RadioState::RxBusyCollision => self.stats.rx_airtime_ns += spent,
            RadioState::Listening => self.idle_ns += spent,
            RadioState::Off | RadioState::Sleep => {}
        }
        self.state = next;
        self.state_since = now;
    }
}

impl Radio for HalfDuplexRadio {
    fn state(&self) -> RadioState {
        self.state
    }

    fn band(&self) -> Band {
        self.config.band
    }

    fn airtime_ns(&self, size_bytes: usize) -> u64 {
        let bytes_per_sec = u128::from(self.config.bytes_per_sec());
        ((size_bytes as u128 * NANOS_PER_SEC).div_ceil(bytes_per_sec)) as u64
    }

    fn transmit(&mut self, sched: &mut Scheduler, pdu: Pdu) -> Result<Option<RadioNotification>> {
        match self.state {
            RadioState::Off | RadioState::RxBusy | RadioState::RxBusyCollision | RadioState::TxBusy => {
                debug!("[{}] radio cannot transmit {} while {}", self.owner, pdu.kind(), self.state);
                self.stats.errors += 1;
                return Ok(Some(RadioNotification::Error(pdu)));
            }
            RadioState::Listening | RadioState::Sleep => {}
        }

        let airtime = self.airtime_ns(pdu.size_bytes());
        trace!("[{}] radio start of transmission: {} ({} bytes, {}ns)", self.owner, pdu.kind(), pdu.size_bytes(), airtime);
        self.propagation.borrow_mut().transmit(sched, self.owner, &pdu, self.config.max_power_dbm, self.config.band)?;
        self.set_state(sched.now(), RadioState::TxBusy);
        self.stats.frames_sent += 1;
        sched.schedule_after_nanos(self.owner, airtime, Event::EndOfTransmission)?;
        Ok(None)
    }
}
