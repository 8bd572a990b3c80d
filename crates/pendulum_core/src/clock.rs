//! Wall-clock pacing of the simulation.

use std::cell::Cell;
use std::time::Instant;

use log::{trace, Level};

use crate::simulation::StatusSink;

/// Nominal display refresh interval. Not measured per frame.
pub const NOMINAL_FRAME_DURATION: f64 = 1.0 / 60.0;

/// Overrun after which a run can no longer claim to follow real time.
pub const FATAL_DRIFT: f64 = 1.0;

/// Source of monotonic wall time in seconds.
pub trait Clock {
    fn seconds(&self) -> f64;
}

/// `Instant` based clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl Clock for ManualClock {
    fn seconds(&self) -> f64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn seconds(&self) -> f64 {
        (**self).seconds()
    }
}

/// Result of comparing elapsed wall time with the last frame target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Integrity {
    OnSchedule,
    /// Behind by `drift` seconds.
    Behind { drift: f64 },
    /// Behind by more than `FATAL_DRIFT`. Reported once per run.
    Fatal { drift: f64 },
}

impl Integrity {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Integrity::Fatal { .. })
    }
}

/// Translates wall time into frame targets for one run.
pub struct FrameClock<C: Clock> {
    clock: C,
    frame_duration: f64,
    origin: f64,
    target: f64,
    last_lap: Option<f64>,
    escalated: bool,
}

impl<C: Clock> FrameClock<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            frame_duration: NOMINAL_FRAME_DURATION,
            origin: 0.0,
            target: 0.0,
            last_lap: None,
            escalated: false,
        }
    }

    pub fn frame_duration(&self) -> f64 {
        self.frame_duration
    }

    /// Seconds since `start`.
    pub fn elapsed(&self) -> f64 {
        self.clock.seconds() - self.origin
    }

    /// The most recent frame target.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Records the wall-clock origin of a run.
    pub fn start(&mut self) {
        self.origin = self.clock.seconds();
        self.target = 0.0;
        self.escalated = false;
    }

    /// Simulation time the next frame has to show.
    pub fn next_frame_target(&mut self) -> f64 {
        self.target = self.elapsed() + self.frame_duration;
        self.target
    }

    /// Behind iff the elapsed time strictly exceeds the last target.
    pub fn check_integrity(&mut self, sink: &mut dyn StatusSink) -> Integrity {
        let elapsed = self.elapsed();
        if elapsed <= self.target {
            return Integrity::OnSchedule;
        }

        let drift = elapsed - self.target;
        sink.report(
            Level::Warn,
            &format!("next frame is from the past! time delay: {drift:.6} s"),
        );
        if drift > FATAL_DRIFT && !self.escalated {
            self.escalated = true;
            sink.report(
                Level::Error,
                &format!("simulation fell {drift:.3} s behind real time"),
            );
            return Integrity::Fatal { drift };
        }
        Integrity::Behind { drift }
    }

    /// Wall time since the previous call, logged for frame rate diagnostics.
    pub fn lap(&mut self) -> Option<f64> {
        let now = self.clock.seconds();
        let interval = self.last_lap.map(|before| now - before);
        self.last_lap = Some(now);
        if let Some(interval) = interval {
            trace!("frame interval {:.6} s", interval);
        }
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::MemorySink;
    use approx::assert_relative_eq;

    #[test]
    fn target_is_elapsed_plus_one_frame() {
        let clock = ManualClock::new(100.0);
        let mut frames = FrameClock::new(&clock);
        frames.start();
        assert_relative_eq!(frames.next_frame_target(), 1.0 / 60.0);

        clock.advance(0.5);
        assert_relative_eq!(frames.next_frame_target(), 0.5 + 1.0 / 60.0);
        assert_relative_eq!(frames.target(), 0.5 + 1.0 / 60.0);
    }

    #[test]
    fn exactly_on_target_is_not_behind() {
        let clock = ManualClock::new(0.0);
        let mut frames = FrameClock::new(&clock);
        let mut sink = MemorySink::default();
        frames.start();
        let target = frames.next_frame_target();

        clock.set(target);
        assert_eq!(frames.check_integrity(&mut sink), Integrity::OnSchedule);
        assert!(sink.lines().is_empty());

        clock.set(target + 0.25);
        match frames.check_integrity(&mut sink) {
            Integrity::Behind { drift } => assert_relative_eq!(drift, 0.25, epsilon = 1e-12),
            other => panic!("expected Behind, got {other:?}"),
        }
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn large_drift_escalates_once() {
        let clock = ManualClock::new(0.0);
        let mut frames = FrameClock::new(&clock);
        let mut sink = MemorySink::default();
        frames.start();
        frames.next_frame_target();

        clock.set(2.0);
        assert!(frames.check_integrity(&mut sink).is_fatal());
        for _ in 0..3 {
            clock.advance(0.5);
            let integrity = frames.check_integrity(&mut sink);
            assert!(matches!(integrity, Integrity::Behind { .. }), "{integrity:?}");
        }

        // A new run may escalate again.
        frames.start();
        frames.next_frame_target();
        clock.advance(3.0);
        assert!(frames.check_integrity(&mut sink).is_fatal());
    }

    #[test]
    fn lap_measures_between_calls() {
        let clock = ManualClock::new(0.0);
        let mut frames = FrameClock::new(&clock);
        assert_eq!(frames.lap(), None);
        clock.advance(0.02);
        assert_relative_eq!(frames.lap().unwrap(), 0.02);
    }
}
