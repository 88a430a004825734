//! The driving loop.
//!
//! Each iteration waits on the pause gate, advances the physics world up to the head event in
//! bounded steps (re-checking contacts after every step and stopping early as soon as a new contact
//! schedules a collision), notifies clock listeners, paces against wall time and dispatches exactly
//! one event. The run ends when the queue empties or its head lies past the end time.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::kernel::{ClockControl, ClockHandle, ClockListener, ModelId, ModelReport, ProgressReporter, SimEngine, SimTime};
use crate::physics::{BodyId, ContactBridge, KinematicWorld, PhysicsWorld};
use crate::radio::SharedPropagation;
use crate::simulation::scenario::{BuiltScenario, PhysicsConfig, Scenario, build_scenario};

const NANOS_PER_SEC: f64 = 1e9;

/// Number of progress lines logged over a whole run.
const PROGRESS_REPORTS: u64 = 10;

#[derive(Debug, Clone, Copy, Default)]
struct RunTimings {
    init: Duration,
    events: Duration,
    physics: Duration,
}

/// Outcome of one run, written as the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub end_time: SimTime,
    pub final_time: SimTime,
    pub events_dispatched: u64,
    /// Events still queued (past the end time) when the run stopped.
    pub pending_events: usize,
    pub init_ms: f64,
    pub events_ms: f64,
    pub physics_ms: f64,
    pub handler_ms: f64,
    pub models: Vec<ModelReport>,
}

pub struct SimulationRunner<W: PhysicsWorld = KinematicWorld> {
    seed: u64,
    engine: SimEngine,
    world: W,
    bridge: ContactBridge,
    propagation: SharedPropagation,
    placements: Vec<(ModelId, BodyId)>,
    clock: ClockControl,
    physics: PhysicsConfig,
    /// Simulated time the physics world has been advanced to.
    physics_time: SimTime,
    timings: RunTimings,
}

impl SimulationRunner<KinematicWorld> {
    /// Build the engine and world for a scenario and wrap them in a runner.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        let end = SimTime::from_millis(scenario.end_time_ms);
        let mut clock = ClockControl::new(SimTime::ZERO, end, scenario.real_time_scale);
        if scenario.start_paused {
            clock.handle().pause();
        }
        let interval = SimTime::from_nanos((end.as_nanos() / PROGRESS_REPORTS).max(1));
        clock.add_listener(Box::new(ProgressReporter::new(interval, end)));

        let started = Instant::now();
        let built = build_scenario(scenario)?;
        let mut runner = Self::new(built, clock, scenario.physics.clone());
        runner.timings.init = started.elapsed();
        Ok(runner)
    }
}

impl<W: PhysicsWorld> SimulationRunner<W> {
    pub fn new(built: BuiltScenario<W>, clock: ClockControl, physics: PhysicsConfig) -> Self {
        Self {
            seed: built.seed,
            engine: built.engine,
            world: built.world,
            bridge: built.bridge,
            propagation: built.propagation,
            placements: built.placements,
            clock,
            physics,
            physics_time: SimTime::ZERO,
            timings: RunTimings::default(),
        }
    }

    /// Pause/resume handle usable from another thread.
    pub fn clock_handle(&self) -> ClockHandle {
        self.clock.handle()
    }

    pub fn add_clock_listener(&mut self, listener: Box<dyn ClockListener>) {
        self.clock.add_listener(listener);
    }

    pub fn engine(&self) -> &SimEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SimEngine {
        &mut self.engine
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    /// Run to completion.
    ///
    /// # Returns
    ///
    /// The run summary, or the first error raised by a model or by the scheduler.
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        self.engine.initialize()?;
        self.sync_positions();
        self.timings.init += started.elapsed();

        let end = self.clock.end_time();
        info!("running until {} (seed {})", end, self.seed);
        while let Some(next) = self.engine.next_event_time() {
            if next > end {
                break;
            }
            self.clock.wait_until_started();
            self.advance_physics(next)?;

            // a new contact may have queued an event ahead of the target
            let Some(next) = self.engine.next_event_time() else {
                break;
            };
            debug!("executing event at time {}", next);
            self.clock.notify_listeners(next);
            self.clock.pace(next);

            let started = Instant::now();
            self.engine.dispatch_next()?;
            self.timings.events += started.elapsed();
        }

        self.engine.finish();
        let summary = self.summary();
        info!(
            "run finished at {} after {} events ({} still pending)",
            summary.final_time, summary.events_dispatched, summary.pending_events
        );
        Ok(summary)
    }

    /// Advance physics from where it stands to `target`.
    fn advance_physics(&mut self, target: SimTime) -> Result<()> {
        let Some(total_ns) = target.checked_sub(self.physics_time).filter(|ns| *ns > 0) else {
            return Ok(());
        };
        let started = Instant::now();
        let step_ns = ((self.physics.step_secs * NANOS_PER_SEC) as u64).max(1);
        let last = self.physics_time;
        let mut updated_ns = 0;

        while updated_ns < total_ns {
            self.world.sync_external_state();
            let slice_ns = step_ns.min(total_ns - updated_ns);
            let slice_secs = slice_ns as f64 / NANOS_PER_SEC;
            let substeps = (slice_secs / self.physics.substep_secs).ceil().max(1.0) as u32;
            self.world.step_simulation(slice_secs, substeps, self.physics.substep_secs);
            updated_ns += slice_ns;
            self.sync_positions();

            if self.bridge.update(&self.world, self.engine.scheduler_mut(), last, updated_ns)? {
                break;
            }
        }

        self.physics_time = last.after_nanos(updated_ns);
        self.timings.physics += started.elapsed();
        Ok(())
    }

    /// Move every body-mounted radio to its body's current position.
    fn sync_positions(&mut self) {
        let mut propagation = self.propagation.borrow_mut();
        for (radio, body) in &self.placements {
            if let Some(position) = self.world.body_position(*body) {
                propagation.set_position(*radio, position);
            }
        }
    }

    fn summary(&self) -> RunSummary {
        let stats = self.engine.stats();
        let millis = |duration: Duration| duration.as_secs_f64() * 1000.0;
        RunSummary {
            generated_at: Utc::now(),
            seed: self.seed,
            end_time: self.clock.end_time(),
            final_time: self.engine.now(),
            events_dispatched: stats.events_dispatched,
            pending_events: self.engine.scheduler().pending_events(),
            init_ms: millis(self.timings.init),
            events_ms: millis(self.timings.events),
            physics_ms: millis(self.timings.physics),
            handler_ms: millis(stats.handler_time),
            models: self.engine.reports(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Event;
    use crate::simulation::probe::CollisionProbe;
    use crate::simulation::scenario::{ScenarioFormat, parse_scenario};
    use std::cell::RefCell;
    use std::rc::Rc;

    const APPROACH: &str = r#"
        seed = 3
        end_time_ms = 12000

        [[models]]
        type = "station-802.15.4"
        name = "mover"
        body = { position = [0.0, 0.0, 0.0], velocity = [1.0, 0.0, 0.0], radius = 0.5 }
        traffic = { interval_ms = 1000 }

        [[models]]
        type = "station-802.15.4"
        name = "post"
        body = { position = [10.0, 0.0, 0.0], radius = 0.5 }

        [[models]]
        type = "collision-probe"
        name = "bumper"
        parent = "post"
    "#;

    fn runner() -> SimulationRunner {
        let scenario = parse_scenario(APPROACH, ScenarioFormat::Toml).unwrap();
        SimulationRunner::from_scenario(&scenario).unwrap()
    }

    #[test]
    fn approaching_bodies_raise_one_collision() {
        let mut runner = runner();
        let summary = runner.run().unwrap();

        let probe = runner.engine().model_as::<CollisionProbe>(ModelId(3)).unwrap();
        assert_eq!(probe.hits().len(), 1);
        let (time, collision) = &probe.hits()[0];
        assert!(*time >= SimTime::from_secs_f64(9.0) && *time < SimTime::from_secs_f64(9.2), "contact at {}", time);
        assert_eq!((collision.body, collision.other), (2, 1));

        let collisions: Vec<u64> = summary.models.iter().map(|report| report.collisions).collect();
        assert_eq!(collisions, vec![1, 1, 1]);
    }

    struct Ticks(Rc<RefCell<Vec<SimTime>>>);

    impl ClockListener for Ticks {
        fn clock_updated(&mut self, time: SimTime) {
            self.0.borrow_mut().push(time);
        }
    }

    #[test]
    fn contact_interrupts_physics_before_a_later_event() {
        let quiet = APPROACH.replace("traffic = { interval_ms = 1000 }", "");
        let scenario = parse_scenario(&quiet, ScenarioFormat::Toml).unwrap();
        let mut runner = SimulationRunner::from_scenario(&scenario).unwrap();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        runner.add_clock_listener(Box::new(Ticks(ticks.clone())));
        let late = SimTime::from_secs_f64(11.0);
        runner.engine_mut().scheduler_mut().schedule(ModelId(3), late, Event::Traffic).unwrap();

        let summary = runner.run().unwrap();

        let ticks = ticks.borrow();
        assert!(ticks.windows(2).all(|pair| pair[0] <= pair[1]), "clock went backwards: {:?}", ticks);
        assert_eq!(ticks.len(), 4);
        assert!(ticks[..3].iter().all(|time| *time < SimTime::from_secs_f64(9.2)));
        assert_eq!(ticks[3], late);

        let probe = runner.engine().model_as::<CollisionProbe>(ModelId(3)).unwrap();
        assert_eq!(probe.hits().len(), 1);
        assert!(probe.hits()[0].0 < late);
        assert_eq!(summary.final_time, late);
        assert_eq!(runner.physics_time, late);
        // the world integrates whole sub-steps and carries the remainder
        let lag = 11.0 - runner.world().elapsed_secs();
        assert!((-1e-9..1.0 / 60.0 + 1e-9).contains(&lag), "world lags by {}", lag);
    }

    #[test]
    fn run_stops_at_end_time() {
        let mut runner = runner();
        let summary = runner.run().unwrap();
        assert_eq!(summary.end_time, SimTime::from_millis(12000));
        assert_eq!(summary.final_time, summary.end_time);
        assert!(summary.pending_events > 0);
        assert_eq!(summary.models[0].traffic.as_ref().unwrap().generated, 13);
        assert!(runner.world().elapsed_secs() <= 12.0 + 1e-9);
    }

    #[test]
    fn same_seed_gives_same_report() {
        let first = runner().run().unwrap();
        let second = runner().run().unwrap();
        assert_eq!(first.events_dispatched, second.events_dispatched);
        assert_eq!(serde_json::to_value(&first.models).unwrap(), serde_json::to_value(&second.models).unwrap());
    }
}
