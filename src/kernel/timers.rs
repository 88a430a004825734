//! Pending protocol timers keyed by purpose.
//!
//! A MAC keeps exactly one outstanding event per timer purpose. Re-arming a purpose cancels the
//! previous event, and a state transition clears the whole set so no stale expiry can reach the
//! new state.

use log::trace;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::Result;
use crate::kernel::{Event, EventId, ModelId, ProtocolTimer, Scheduler};

#[derive(Debug)]
pub struct TimerSet<K> {
    owner: ModelId,
    pending: BTreeMap<K, EventId>,
}

impl<K> TimerSet<K>
where
    K: Ord + Copy + Debug + Into<ProtocolTimer>,
{
    pub fn new(owner: ModelId) -> Self {
        Self { owner, pending: BTreeMap::new() }
    }

    /// Schedule `key` to fire `delay_ns` after now, replacing any pending timer with the same purpose.
    pub fn arm(&mut self, sched: &mut Scheduler, key: K, delay_ns: u64) -> Result<()> {
        self.cancel(sched, key);
        let id = sched.schedule_after_nanos(self.owner, delay_ns, Event::Timer(key.into()))?;
        if !id.is_rejected() {
            trace!("[{}] timer {:?} armed for +{}ns ({})", self.owner, key, delay_ns, id);
            self.pending.insert(key, id);
        }
        Ok(())
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&mut self, sched: &mut Scheduler, key: K) -> bool {
        match self.pending.remove(&key) {
            Some(id) => {
                sched.cancel(id);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self, sched: &mut Scheduler) {
        for (_, id) in std::mem::take(&mut self.pending) {
            sched.cancel(id);
        }
    }

    /// Consume the entry of a timer that just fired. `false` means the expiry is stale and must be ignored.
    pub fn fire(&mut self, key: K) -> bool {
        self.pending.remove(&key).is_some()
    }

    pub fn is_armed(&self, key: K) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn armed(&self) -> impl Iterator<Item = K> + '_ {
        self.pending.keys().copied()
    }
}
