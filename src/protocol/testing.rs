//! Test doubles for driving a MAC without a full station.

use std::collections::VecDeque;

use crate::error::Result;
use crate::kernel::{Event, ModelId, Scheduler, SimTime, Transmission};
use crate::protocol::{MacConfirm, MacContext, MacDataRequest, MacIndication, MacProtocol, Pdu, TxStatus, UpperLayer};
use crate::radio::{Band, Radio, RadioNotification, RadioState};

pub const OWNER: ModelId = ModelId(1);

/// Radio that records what it is asked to send and changes state only when told to.
pub struct FakeRadio {
    pub state: RadioState,
    pub bytes_per_sec: u64,
    pub sent: Vec<(SimTime, Pdu)>,
}

impl FakeRadio {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self { state: RadioState::Listening, bytes_per_sec, sent: Vec::new() }
    }
}

impl Radio for FakeRadio {
    fn state(&self) -> RadioState {
        self.state
    }

    fn band(&self) -> Band {
        Band::default()
    }

    fn airtime_ns(&self, size_bytes: usize) -> u64 {
        ((size_bytes as u128 * 1_000_000_000).div_ceil(u128::from(self.bytes_per_sec))) as u64
    }

    fn transmit(&mut self, sched: &mut Scheduler, pdu: Pdu) -> Result<Option<RadioNotification>> {
        match self.state {
            RadioState::Listening | RadioState::Sleep => {
                self.sent.push((sched.now(), pdu));
                self.state = RadioState::TxBusy;
                Ok(None)
            }
            _ => Ok(Some(RadioNotification::Error(pdu))),
        }
    }
}

pub struct RecordingUpper<A> {
    pub indications: Vec<(SimTime, MacIndication<A>)>,
    pub confirms: Vec<(SimTime, MacConfirm)>,
}

impl<A> Default for RecordingUpper<A> {
    fn default() -> Self {
        Self { indications: Vec::new(), confirms: Vec::new() }
    }
}

impl<A> RecordingUpper<A> {
    pub fn statuses(&self) -> Vec<TxStatus> {
        self.confirms.iter().map(|(_, confirm)| confirm.status).collect()
    }
}

impl<A> UpperLayer<A> for RecordingUpper<A> {
    fn data_indication(&mut self, time: SimTime, indication: MacIndication<A>) {
        self.indications.push((time, indication));
    }

    fn data_confirm(&mut self, time: SimTime, confirm: MacConfirm) {
        self.confirms.push((time, confirm));
    }
}

/// One MAC wired to a fake radio, a recording upper layer and a private scheduler.
pub struct MacHarness<M: MacProtocol> {
    pub sched: Scheduler,
    pub radio: FakeRadio,
    pub upper: RecordingUpper<M::Address>,
    pub mac: M,
    notifications: VecDeque<RadioNotification>,
}

impl<M: MacProtocol> MacHarness<M> {
    pub fn new(mac: M, bytes_per_sec: u64) -> Self {
        let mut sched = Scheduler::new();
        sched.register(OWNER);
        Self { sched, radio: FakeRadio::new(bytes_per_sec), upper: RecordingUpper::default(), mac, notifications: VecDeque::new() }
    }

    fn run(&mut self, call: impl FnOnce(&mut M, &mut MacContext<'_, M::Address>) -> Result<()>) {
        let mut ctx = MacContext {
            owner: OWNER,
            sched: &mut self.sched,
            radio: &mut self.radio,
            upper: &mut self.upper,
            notifications: &mut self.notifications,
        };
        call(&mut self.mac, &mut ctx).unwrap();
        while let Some(notification) = ctx.notifications.pop_front() {
            self.mac.on_radio_event(&mut ctx, notification).unwrap();
        }
    }

    pub fn request(&mut self, handle: u32, destination: M::Address, payload_bytes: usize) {
        let request = MacDataRequest { handle, destination, msdu: Pdu::opaque(payload_bytes), ack_requested: true };
        self.run(|mac, ctx| mac.request(ctx, request));
    }

    pub fn notify(&mut self, notification: RadioNotification) {
        self.run(|mac, ctx| mac.on_radio_event(ctx, notification));
    }

    /// Complete an outgoing frame: the radio returns to LISTENING and says so.
    pub fn end_transmission(&mut self) {
        self.radio.state = RadioState::Listening;
        self.notify(RadioNotification::Listen);
    }

    /// A whole frame arrives cleanly.
    pub fn receive(&mut self, pdu: impl Into<Pdu>) {
        self.radio.state = RadioState::RxBusy;
        self.notify(RadioNotification::StartRx);
        self.radio.state = RadioState::Listening;
        let transmission = Transmission { pdu: pdu.into(), rx_power_dbm: -60.0, frequency_mhz: 2442.5 };
        self.notify(RadioNotification::RxReceived(transmission));
    }

    pub fn next_timer_at(&self) -> Option<SimTime> {
        self.sched.next_event_time()
    }

    /// Fire the earliest pending timer.
    pub fn fire_next(&mut self) -> Option<(SimTime, M::Timer)> {
        let next = self.sched.begin_dispatch()?;
        let fired = match next.event {
            Event::Timer(tag) => M::timer(tag),
            _ => None,
        };
        if let Some(timer) = fired {
            self.run(|mac, ctx| mac.on_timer(ctx, timer));
        }
        self.sched.end_dispatch(next.time);
        fired.map(|timer| (next.time, timer))
    }

    /// Fire timers until `timer` fires; panics if the queue runs dry first.
    pub fn fire_until(&mut self, timer: M::Timer) -> SimTime {
        loop {
            match self.fire_next() {
                Some((time, fired)) if fired == timer => return time,
                Some(_) => {}
                None => panic!("queue ran dry before {:?} fired", timer),
            }
        }
    }

    pub fn last_sent(&self) -> &Pdu {
        &self.radio.sent.last().expect("nothing was transmitted").1
    }
}
