//! Wall-clock pacing and the pause/resume gate consulted by the driving loop.
//!
//! Nothing here influences event ordering: the clock only decides how long the host waits before
//! the next dispatch. Simulated time is mapped to host time through a scaled clock,
//! `real = origin_real + (virtual - origin_virtual) * scale`, where the scale is stored in Q32.32
//! fixed point. Changing the scale or resuming from a pause rebases the origins so the mapping
//! stays continuous.

use log::{debug, info};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::kernel::SimTime;

// Fixed-point Q32.32. 1.0 == 1<<32
const ONE_Q32: u64 = 1u64 << 32;
/// Longest uninterrupted sleep, so pause and scale changes apply promptly.
const MAX_WAIT_SLICE: Duration = Duration::from_millis(25);
const MAX_REAL_TIME_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, Copy)]
struct ScaledClock {
    origin_real: Instant,
    origin_virtual_ns: u64,
}

#[derive(Debug)]
struct ClockState {
    paused: bool,
    paused_since: Option<Instant>,
    // host nanoseconds per simulated nanosecond; 0 disables pacing
    scale_q32: u64,
    clock: Option<ScaledClock>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ClockState>,
    cv: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn scale_to_q32(real_time_scale: f64) -> u64 {
    if !(real_time_scale > 0.0) {
        return 0;
    }
    (real_time_scale.min(MAX_REAL_TIME_SCALE) * ONE_Q32 as f64) as u64
}

fn map_virtual_to_real(clock: &ScaledClock, scale_q32: u64, virtual_ns: u64) -> Instant {
    // targets behind the origin are due now
    let Some(virt_dt) = virtual_ns.checked_sub(clock.origin_virtual_ns) else {
        return clock.origin_real;
    };
    let real_ns = (virt_dt as u128) * (scale_q32 as u128) / (ONE_Q32 as u128);
    clock.origin_real + Duration::from_nanos(real_ns.min(u64::MAX as u128) as u64)
}

fn map_real_to_virtual(clock: &ScaledClock, scale_q32: u64, real: Instant) -> u64 {
    if scale_q32 == 0 {
        return clock.origin_virtual_ns;
    }
    let real_dt = real.saturating_duration_since(clock.origin_real).as_nanos();
    let virt_dt = real_dt * (ONE_Q32 as u128) / (scale_q32 as u128);
    clock.origin_virtual_ns.saturating_add(virt_dt.min(u64::MAX as u128) as u64)
}

/// Cloneable handle for pausing, resuming and re-scaling a run from another thread.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    shared: Arc<Shared>,
}

impl ClockHandle {
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if !state.paused {
            state.paused = true;
            state.paused_since = Some(Instant::now());
            debug!("simulation paused");
        }
    }

    pub fn resume(&self) {
        let mut state = self.shared.lock();
        if state.paused {
            state.paused = false;
            let paused_for = state.paused_since.take().map(|since| since.elapsed()).unwrap_or_default();
            // time spent paused must not be caught up afterwards
            if let Some(clock) = state.clock.as_mut() {
                clock.origin_real += paused_for;
            }
            debug!("simulation resumed after {:?}", paused_for);
        }
        drop(state);
        self.shared.cv.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// Change host seconds per simulated second, keeping the current mapping continuous.
    ///
    /// `0.0` disables pacing; values are clamped to `0.0..=1000.0`.
    pub fn set_real_time_scale(&self, real_time_scale: f64) {
        let new_scale_q32 = scale_to_q32(real_time_scale);
        let mut state = self.shared.lock();
        if state.scale_q32 == new_scale_q32 {
            return;
        }
        if let Some(clock) = state.clock {
            let now = Instant::now();
            let virtual_now = map_real_to_virtual(&clock, state.scale_q32, now);
            state.clock = Some(ScaledClock { origin_real: now, origin_virtual_ns: virtual_now });
        }
        state.scale_q32 = new_scale_q32;
        drop(state);
        self.shared.cv.notify_all();
    }

    pub fn real_time_scale(&self) -> f64 {
        self.shared.lock().scale_q32 as f64 / ONE_Q32 as f64
    }
}

/// Notified with the next event time just before it is dispatched.
pub trait ClockListener {
    fn clock_updated(&mut self, time: SimTime);
}

/// Start/end of the run plus the pacing gate.
pub struct ClockControl {
    start: SimTime,
    end: SimTime,
    shared: Arc<Shared>,
    listeners: Vec<Box<dyn ClockListener>>,
}

impl ClockControl {
    pub fn new(start: SimTime, end: SimTime, real_time_scale: f64) -> Self {
        Self {
            start,
            end,
            shared: Arc::new(Shared {
                state: Mutex::new(ClockState { paused: false, paused_since: None, scale_q32: scale_to_q32(real_time_scale), clock: None }),
                cv: Condvar::new(),
            }),
            listeners: Vec::new(),
        }
    }

    pub fn handle(&self) -> ClockHandle {
        ClockHandle { shared: self.shared.clone() }
    }

    pub fn start_time(&self) -> SimTime {
        self.start
    }

    pub fn end_time(&self) -> SimTime {
        self.end
    }

    pub fn add_listener(&mut self, listener: Box<dyn ClockListener>) {
        self.listeners.push(listener);
    }

    pub fn notify_listeners(&mut self, time: SimTime) {
        for listener in self.listeners.iter_mut() {
            listener.clock_updated(time);
        }
    }

    /// Block while the run is paused.
    pub fn wait_until_started(&self) {
        let mut state = self.shared.lock();
        while state.paused {
            state = self.shared.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sleep until host time catches up with `next` under the current scale.
    ///
    /// The first paced event anchors the mapping. Returns immediately when pacing is disabled.
    pub fn pace(&self, next: SimTime) {
        let virtual_ns = next.checked_sub(self.start).unwrap_or(0);
        let mut state = self.shared.lock();
        loop {
            if state.paused {
                state = self.shared.cv.wait(state).unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            if state.scale_q32 == 0 {
                return;
            }
            let clock = *state
                .clock
                .get_or_insert_with(|| ScaledClock { origin_real: Instant::now(), origin_virtual_ns: virtual_ns });
            let target = map_virtual_to_real(&clock, state.scale_q32, virtual_ns);
            let now = Instant::now();
            if target <= now {
                return;
            }
            let wait = (target - now).min(MAX_WAIT_SLICE);
            let (guard, _) = self.shared.cv.wait_timeout(state, wait).unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

/// Logs simulated progress every `interval` of simulated time.
pub struct ProgressReporter {
    interval: u64,
    next_report: SimTime,
    end: SimTime,
}

impl ProgressReporter {
    pub fn new(interval: SimTime, end: SimTime) -> Self {
        Self { interval: interval.as_nanos().max(1), next_report: interval, end }
    }
}

impl ClockListener for ProgressReporter {
    fn clock_updated(&mut self, time: SimTime) {
        if time < self.next_report {
            return;
        }
        info!("simulated {} of {}", time, self.end);
        let periods = time.as_nanos() / self.interval + 1;
        self.next_report = SimTime::from_nanos(periods.saturating_mul(self.interval));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;

    fn anchored(scale: f64) -> (ClockControl, ClockHandle) {
        let control = ClockControl::new(SimTime::ZERO, SimTime::from_millis(1_000), scale);
        let handle = control.handle();
        control.pace(SimTime::ZERO);
        (control, handle)
    }

    #[test]
    fn virtual_to_real_scales_with_factor() {
        let clock = ScaledClock { origin_real: Instant::now(), origin_virtual_ns: 1_000 };
        let target = map_virtual_to_real(&clock, scale_to_q32(0.5), 1_000 + 200_000_000);
        let real_dt = target.duration_since(clock.origin_real);
        assert!((real_dt.as_secs_f64() - 0.1).abs() < 1e-6, "got {:?}", real_dt);
    }

    #[test]
    fn past_targets_are_due_at_origin() {
        let clock = ScaledClock { origin_real: Instant::now(), origin_virtual_ns: 5_000 };
        assert_eq!(map_virtual_to_real(&clock, ONE_Q32, 4_999), clock.origin_real);
    }

    #[test]
    fn continuity_on_scale_change() {
        let (control, handle) = anchored(1.0);
        let before = {
            let state = control.shared.lock();
            let clock = state.clock.unwrap();
            map_real_to_virtual(&clock, state.scale_q32, Instant::now())
        };
        handle.set_real_time_scale(4.0);
        let after = {
            let state = control.shared.lock();
            let clock = state.clock.unwrap();
            map_real_to_virtual(&clock, state.scale_q32, Instant::now())
        };
        // virtual time never jumps backwards and moves less than a few ms across the change
        assert!(after + 1_000_000 >= before);
        assert!(after.abs_diff(before) < 5_000_000, "before={before} after={after}");
        assert!((handle.real_time_scale() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_pacing_returns_immediately() {
        let control = ClockControl::new(SimTime::ZERO, SimTime::from_millis(1), 0.0);
        let started = Instant::now();
        control.pace(SimTime::from_secs_f64(3600.0));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn pacing_waits_for_scaled_host_time() {
        let (control, _handle) = anchored(1.0);
        let started = Instant::now();
        control.pace(SimTime::from_millis(30));
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn pause_gate_blocks_until_resume() {
        let control = ClockControl::new(SimTime::ZERO, SimTime::from_millis(1), 0.0);
        let handle = control.handle();
        handle.pause();
        assert!(handle.is_paused());
        let resumer = {
            let handle = handle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                handle.resume();
            })
        };
        let started = Instant::now();
        control.wait_until_started();
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!handle.is_paused());
        resumer.join().unwrap();
    }

    struct Seen(Rc<RefCell<Vec<SimTime>>>);

    impl ClockListener for Seen {
        fn clock_updated(&mut self, time: SimTime) {
            self.0.borrow_mut().push(time);
        }
    }

    #[test]
    fn listeners_see_every_update() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut control = ClockControl::new(SimTime::ZERO, SimTime::from_millis(1), 0.0);
        control.add_listener(Box::new(Seen(seen.clone())));
        control.notify_listeners(SimTime::from_nanos(3));
        control.notify_listeners(SimTime::from_nanos(9));
        assert_eq!(*seen.borrow(), vec![SimTime::from_nanos(3), SimTime::from_nanos(9)]);
    }

    #[test]
    fn progress_reporter_advances_by_interval() {
        let mut reporter = ProgressReporter::new(SimTime::from_millis(100), SimTime::from_millis(1_000));
        reporter.clock_updated(SimTime::from_millis(50));
        assert_eq!(reporter.next_report, SimTime::from_millis(100));
        reporter.clock_updated(SimTime::from_millis(250));
        assert_eq!(reporter.next_report, SimTime::from_millis(300));
    }
}
