//! A radio-equipped station: one half-duplex radio, one MAC and the traffic agent above it.
//!
//! Radio entry points hand back the notification they produce. The station queues it and, once the
//! triggering call has returned, delivers each queued notification to the MAC first and then to
//! every registered listener in registration order. Notifications raised while the MAC is running
//! (a refused transmission) join the same queue.

use log::{debug, warn};
use std::any::Any;
use std::collections::VecDeque;

use crate::error::Result;
use crate::kernel::{Event, Model, ModelId, ModelReport, ModelType, Scheduler, SimTime};
use crate::protocol::dot11::Dcf;
use crate::protocol::dot154::CsmaCa;
use crate::protocol::{MacContext, MacDataRequest, MacProtocol};
use crate::radio::{HalfDuplexRadio, RadioEventListener, RadioNotification};
use crate::simulation::traffic::TrafficAgent;

pub type Station80211 = RadioNode<Dcf>;
pub type Station802154 = RadioNode<CsmaCa>;

pub struct RadioNode<M: MacProtocol> {
    id: ModelId,
    name: Option<String>,
    model_type: ModelType,
    parent: Option<ModelId>,
    radio: HalfDuplexRadio,
    mac: M,
    traffic: TrafficAgent<M::Address>,
    notifications: VecDeque<RadioNotification>,
    listeners: Vec<Box<dyn RadioEventListener>>,
    collisions: u64,
}

impl<M: MacProtocol + 'static> RadioNode<M> {
    pub fn new(
        id: ModelId,
        name: Option<String>,
        model_type: ModelType,
        radio: HalfDuplexRadio,
        mac: M,
        traffic: TrafficAgent<M::Address>,
    ) -> Self {
        Self {
            id,
            name,
            model_type,
            parent: None,
            radio,
            mac,
            traffic,
            notifications: VecDeque::new(),
            listeners: Vec::new(),
            collisions: 0,
        }
    }

    pub fn with_parent(mut self, parent: Option<ModelId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn RadioEventListener>) {
        self.listeners.push(listener);
    }

    pub fn radio(&self) -> &HalfDuplexRadio {
        &self.radio
    }

    pub fn mac(&self) -> &M {
        &self.mac
    }

    pub fn traffic(&self) -> &TrafficAgent<M::Address> {
        &self.traffic
    }

    /// Hand a frame to the MAC as the traffic agent would.
    pub fn submit(&mut self, sched: &mut Scheduler, request: MacDataRequest<M::Address>) -> Result<()> {
        self.with_mac(sched, |mac, ctx| mac.request(ctx, request))?;
        self.deliver(sched)
    }

    fn with_mac(
        &mut self,
        sched: &mut Scheduler,
        call: impl FnOnce(&mut M, &mut MacContext<'_, M::Address>) -> Result<()>,
    ) -> Result<()> {
        let mut ctx = MacContext {
            owner: self.id,
            sched,
            radio: &mut self.radio,
            upper: &mut self.traffic,
            notifications: &mut self.notifications,
        };
        call(&mut self.mac, &mut ctx)
    }

    fn deliver(&mut self, sched: &mut Scheduler) -> Result<()> {
        while let Some(notification) = self.notifications.pop_front() {
            self.with_mac(sched, |mac, ctx| mac.on_radio_event(ctx, notification.clone()))?;
            let now = sched.now();
            for listener in self.listeners.iter_mut() {
                listener.notify_radio_event(self.id, now, &notification);
            }
        }
        Ok(())
    }

    fn generate_traffic(&mut self, sched: &mut Scheduler, time: SimTime) -> Result<()> {
        let Some((request, next)) = self.traffic.generate(time) else {
            return Ok(());
        };
        if let Some(next) = next {
            sched.schedule(self.id, next, Event::Traffic)?;
        }
        self.with_mac(sched, |mac, ctx| mac.request(ctx, request))
    }
}

impl<M: MacProtocol + 'static> Model for RadioNode<M> {
    fn id(&self) -> ModelId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    fn initialize(&mut self, sched: &mut Scheduler) -> Result<()> {
        self.radio.initialize(sched.now());
        if let Some(start) = self.traffic.first_tick() {
            sched.schedule(self.id, start, Event::Traffic)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, sched: &mut Scheduler, time: SimTime, event: Event) -> Result<()> {
        match event {
            Event::Reception(transmission) => {
                if let Some(notification) = self.radio.receive(sched, transmission)? {
                    self.notifications.push_back(notification);
                }
            }
            Event::EndOfTransmission => {
                if let Some(notification) = self.radio.end_of_transmission(time) {
                    self.notifications.push_back(notification);
                }
            }
            Event::EndOfReception(transmission) => {
                if let Some(notification) = self.radio.end_of_reception(time, transmission) {
                    self.notifications.push_back(notification);
                }
            }
            Event::Timer(tag) => match M::timer(tag) {
                Some(timer) => self.with_mac(sched, |mac, ctx| mac.on_timer(ctx, timer))?,
                None => warn!("[{}] station ignoring foreign timer {:?}", self.id, tag),
            },
            Event::Traffic => self.generate_traffic(sched, time)?,
            Event::Collision(collision) => {
                self.collisions += 1;
                debug!("[{}] station body {} hit body {}", self.id, collision.body, collision.other);
            }
        }
        self.deliver(sched)
    }

    fn finish(&mut self, end: SimTime) {
        self.radio.finish(end);
        debug!(
            "[{}] station finished in {} with {} queued frames",
            self.id,
            self.mac.state_name(),
            self.mac.queue_len()
        );
    }

    fn report(&self) -> ModelReport {
        let mut report = ModelReport::new(self.id, self.name.as_deref(), self.model_type);
        report.parent = self.parent;
        report.radio = Some(self.radio.stats().clone());
        report.mac = Some(self.mac.stats().clone());
        report.traffic = Some(self.traffic.stats().clone());
        for listener in &self.listeners {
            for (kind, count) in listener.summary() {
                *report.radio_notifications.entry(kind).or_insert(0) += count;
            }
        }
        report.collisions = self.collisions;
        report
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::SimEngine;
    use crate::physics::Vec3;
    use crate::protocol::dot11::DcfParameters;
    use crate::protocol::{EthernetAddress, LinkAddress};
    use crate::radio::{LogDistancePropagation, PathLossParameters, RadioConfig, RadioProfile, RadioTrace, SharedPropagation};
    use crate::simulation::traffic::{TrafficConfig, TrafficPlan};

    fn station(id: u32, propagation: &SharedPropagation, plan: Option<TrafficPlan<EthernetAddress>>) -> Station80211 {
        let owner = ModelId(id);
        let config = RadioConfig::with_profile(RadioProfile::Ieee80211bg);
        propagation.borrow_mut().attach(owner, Vec3::new(f64::from(id), 0.0, 0.0), config.band);
        let radio = HalfDuplexRadio::new(owner, config, propagation.clone());
        let mac = Dcf::new(owner, EthernetAddress::for_node(id), DcfParameters::default(), u64::from(id));
        let mut node = RadioNode::new(owner, None, ModelType::Station80211, radio, mac, TrafficAgent::new(owner, plan));
        node.add_listener(Box::new(RadioTrace::new()));
        node
    }

    #[test]
    fn broadcast_is_heard_and_counted_by_listeners() {
        let propagation = LogDistancePropagation::new(PathLossParameters::default(), 1).shared();
        let config = TrafficConfig { count: Some(1), ..TrafficConfig::default() };
        let plan = TrafficPlan::new(EthernetAddress::broadcast(), &config);

        let mut engine = SimEngine::new();
        engine.add_model(Box::new(station(1, &propagation, Some(plan)))).unwrap();
        engine.add_model(Box::new(station(2, &propagation, None))).unwrap();
        engine.initialize().unwrap();
        while engine.dispatch_next().unwrap().is_some() {}

        let sender = engine.model_as::<Station80211>(ModelId(1)).unwrap();
        assert_eq!(sender.traffic().stats().delivered, 1);
        let receiver = engine.model_as::<Station80211>(ModelId(2)).unwrap();
        assert_eq!(receiver.traffic().stats().received, 1);
        let report = receiver.report();
        assert_eq!(report.radio_notifications.get("rx-received"), Some(&1));
        assert_eq!(report.radio_notifications.get("start-rx"), Some(&1));
        assert_eq!(report.mac.unwrap().indications, 1);
    }
}
