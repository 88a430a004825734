//! Upper-layer traffic: a periodic frame generator and a sink for whatever the MAC delivers.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::kernel::{ModelId, SimTime};
use crate::protocol::{MacConfirm, MacDataRequest, MacIndication, Pdu, PduWrap, TxStatus, UpperLayer};

/// Generator settings as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Name of the receiving station; broadcast when absent.
    pub destination: Option<String>,
    pub payload_bytes: usize,
    pub interval_ms: u64,
    pub start_ms: u64,
    /// Number of frames to generate; unlimited when absent.
    pub count: Option<u32>,
    pub ack: bool,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self { destination: None, payload_bytes: 20, interval_ms: 1000, start_ms: 0, count: None, ack: true }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("Invalid traffic interval_ms, must be positive".to_string());
        }
        Ok(())
    }
}

/// A generator with its destination resolved to a link address.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficPlan<A> {
    pub destination: A,
    pub payload_bytes: usize,
    pub interval: SimTime,
    pub start: SimTime,
    pub count: Option<u32>,
    pub ack: bool,
}

impl<A> TrafficPlan<A> {
    pub fn new(destination: A, config: &TrafficConfig) -> Self {
        Self {
            destination,
            payload_bytes: config.payload_bytes,
            interval: SimTime::from_millis(config.interval_ms),
            start: SimTime::from_millis(config.start_ms),
            count: config.count,
            ack: config.ack,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficStats {
    pub generated: u64,
    pub received: u64,
    pub received_bytes: u64,
    pub delivered: u64,
    pub channel_access_failures: u64,
    pub no_ack: u64,
    pub retry_limit_exceeded: u64,
    pub frames_too_long: u64,
}

impl TrafficStats {
    fn record(&mut self, status: TxStatus) {
        let counter = match status {
            TxStatus::Success => &mut self.delivered,
            TxStatus::ChannelAccessFailure => &mut self.channel_access_failures,
            TxStatus::NoAck => &mut self.no_ack,
            TxStatus::RetryLimitExceeded => &mut self.retry_limit_exceeded,
            TxStatus::FrameTooLong => &mut self.frames_too_long,
        };
        *counter += 1;
    }

    /// Requests still waiting for their confirmation.
    pub fn outstanding(&self) -> u64 {
        let confirmed = self.delivered + self.channel_access_failures + self.no_ack + self.retry_limit_exceeded + self.frames_too_long;
        self.generated.saturating_sub(confirmed)
    }
}

/// The layer above a station's MAC.
pub struct TrafficAgent<A> {
    owner: ModelId,
    plan: Option<TrafficPlan<A>>,
    next_handle: u32,
    stats: TrafficStats,
}

impl<A: Copy> TrafficAgent<A> {
    pub fn new(owner: ModelId, plan: Option<TrafficPlan<A>>) -> Self {
        Self { owner, plan, next_handle: 1, stats: TrafficStats::default() }
    }

    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    pub fn plan(&self) -> Option<&TrafficPlan<A>> {
        self.plan.as_ref()
    }

    fn exhausted(&self) -> bool {
        match &self.plan {
            Some(plan) => plan.count.is_some_and(|count| self.stats.generated >= u64::from(count)),
            None => true,
        }
    }

    /// When the first frame is due, if the agent generates anything at all.
    pub fn first_tick(&self) -> Option<SimTime> {
        if self.exhausted() { None } else { self.plan.as_ref().map(|plan| plan.start) }
    }

    /// Build the next data request.
    ///
    /// # Returns
    ///
    /// The request and the time of the following tick, if any.
    pub fn generate(&mut self, now: SimTime) -> Option<(MacDataRequest<A>, Option<SimTime>)> {
        if self.exhausted() {
            return None;
        }
        let plan = self.plan.as_ref()?;
        let request = MacDataRequest {
            handle: self.next_handle,
            destination: plan.destination,
            msdu: Pdu::opaque(plan.payload_bytes),
            ack_requested: plan.ack,
        };
        let interval = plan.interval.as_nanos();
        self.next_handle = self.next_handle.wrapping_add(1);
        self.stats.generated += 1;
        trace!("[{}] traffic generated frame {}", self.owner, request.handle);
        let next = if self.exhausted() { None } else { Some(now.after_nanos(interval)) };
        Some((request, next))
    }
}

impl<A> UpperLayer<A> for TrafficAgent<A> {
    fn data_indication(&mut self, time: SimTime, indication: MacIndication<A>) {
        self.stats.received += 1;
        self.stats.received_bytes += indication.msdu.size_bytes() as u64;
        trace!("[{}] traffic received {} bytes at {}", self.owner, indication.msdu.size_bytes(), time);
    }

    fn data_confirm(&mut self, time: SimTime, confirm: MacConfirm) {
        debug!("[{}] traffic frame {} confirmed {:?} at {}", self.owner, confirm.handle, confirm.status, time);
        self.stats.record(confirm.status);
    }
}
