//! The per-run control loop: operator setup, then stepping in lockstep with the wall clock.
//!
//! Everything outside the numerical core is reached through the collaborator traits in
//! this module, so the loop runs unchanged against real hardware or scripted test doubles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::Level;

use crate::clock::{Clock, FrameClock, Integrity};
use crate::driver::IntegratorDriver;
use crate::error::{RunError, SolverError};
use crate::params::{DisplayGeometry, PendulumConfiguration};

/// Starting angle change per key press during setup, in radians.
pub const ANGLE_DELTA: f64 = 0.02;
/// Geometry change per key press during setup, in screen units.
pub const GEOMETRY_DELTA: f32 = 0.01;

/// Write-only channel for human-readable status and error lines.
pub trait StatusSink {
    fn report(&mut self, level: Level, message: &str);
}

/// Forwards status lines to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&mut self, level: Level, message: &str) {
        log::log!(level, "{message}");
    }
}

/// Keeps every status line, for tests and for replaying a run's diagnostics.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Vec<(Level, String)>,
}

impl MemorySink {
    pub fn entries(&self) -> &[(Level, String)] {
        &self.entries
    }

    pub fn lines(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, line)| line.as_str()).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|(_, line)| line.contains(needle))
    }
}

impl StatusSink for MemorySink {
    fn report(&mut self, level: Level, message: &str) {
        self.entries.push((level, message.to_string()));
    }
}

/// Draws the pendulum. Receives one angle per frame.
pub trait Renderer {
    fn init(&mut self, geometry: &DisplayGeometry) -> anyhow::Result<()>;
    fn draw_frame(&mut self, angle: f64, geometry: &DisplayGeometry);
    fn terminate(&mut self);
}

/// Non-blocking source of operator commands.
pub trait OperatorInput {
    fn poll(&mut self) -> Option<Command>;
}

/// The electromagnet holding the physical pendulum until release.
pub trait Magnet {
    fn check(&mut self) -> anyhow::Result<()>;
    fn acquire(&mut self) -> anyhow::Result<()>;
    fn release(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ToggleTransparency,
    NudgeAngle(f64),
    AdjustGeometry { rod_length: f32, x: f32, y: f32 },
    /// Ends setup; during a simulation it ends the run.
    FinishSetup,
    Abort,
}

/// Shared stop request, set from outside the control loop (e.g. a signal handler).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The underlying flag, for handlers that can only store into an `AtomicBool`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

/// Level-triggered flags of the control loop, checked once per iteration.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub stop_requested: bool,
    pub setup_finished: bool,
    pub abort_simulation: bool,
    token: CancellationToken,
}

impl RunContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Latches an external cancellation into `stop_requested`.
    pub fn poll_cancellation(&mut self) -> bool {
        if self.token.is_cancelled() {
            self.stop_requested = true;
        }
        self.stop_requested
    }

    fn begin_run(&mut self) {
        self.setup_finished = false;
        self.abort_simulation = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    /// The operator aborted before the pendulum was released.
    AbortedDuringSetup,
    /// The operator ended the simulation.
    Stopped,
    /// External stop request.
    Cancelled,
    /// The configured simulated duration was reached.
    DurationReached,
    /// The simulation fell behind real time by more than a second.
    Drift { drift: f64 },
    StepFailed(SolverError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub simulated_time: f64,
    pub end: EndReason,
}

/// One pendulum run wired to its collaborators.
pub struct Simulation<'a, C: Clock> {
    renderer: &'a mut dyn Renderer,
    input: &'a mut dyn OperatorInput,
    magnet: &'a mut dyn Magnet,
    sink: &'a mut dyn StatusSink,
    frames: FrameClock<C>,
    duration: Option<f64>,
}

impl<'a, C: Clock> Simulation<'a, C> {
    pub fn new(
        renderer: &'a mut dyn Renderer,
        input: &'a mut dyn OperatorInput,
        magnet: &'a mut dyn Magnet,
        sink: &'a mut dyn StatusSink,
        clock: C,
    ) -> Self {
        Self {
            renderer,
            input,
            magnet,
            sink,
            frames: FrameClock::new(clock),
            duration: None,
        }
    }

    /// Ends the run once the simulation time reaches `seconds`.
    pub fn with_duration(mut self, seconds: Option<f64>) -> Self {
        self.duration = seconds;
        self
    }

    fn info(&mut self, message: &str) {
        self.sink.report(Level::Info, message);
    }

    fn release_magnet_quietly(&mut self) {
        if let Err(err) = self.magnet.release() {
            self.sink
                .report(Level::Warn, &format!("magnet not released: {err:#}"));
        }
    }

    /// Runs setup and simulation for `conf`.
    ///
    /// Errors are reserved for failures the caller has to act on: renderer or magnet
    /// trouble, and solver allocation. Everything that merely ends the run (operator
    /// input, drift, a failed step) is reported through the summary.
    pub fn setup_and_run(
        &mut self,
        conf: &mut PendulumConfiguration,
        ctx: &mut RunContext,
    ) -> Result<RunSummary, RunError> {
        self.info("starting renderer, magnet...");
        self.renderer
            .init(&conf.geometry)
            .map_err(|err| RunError::Render(format!("{err:#}")))?;

        if let Err(err) = self.magnet.check() {
            self.sink.report(
                Level::Error,
                &format!("magnet check failed! magnet won't work: {err:#}"),
            );
            self.renderer.terminate();
            return Err(RunError::Hardware(format!("{err:#}")));
        }
        if let Err(err) = self.magnet.acquire() {
            self.sink
                .report(Level::Error, &format!("magnet could not be turned on: {err:#}"));
            self.renderer.terminate();
            return Err(RunError::Hardware(format!("{err:#}")));
        }

        ctx.begin_run();
        conf.reset_angle();

        self.info("graphical setup...");
        self.setup_loop(conf, ctx);

        if ctx.abort_simulation || ctx.stop_requested {
            self.info("aborted during setup...");
            self.release_magnet_quietly();
            self.renderer.terminate();
            return Ok(RunSummary {
                frames: 0,
                simulated_time: 0.0,
                end: if ctx.stop_requested {
                    EndReason::Cancelled
                } else {
                    EndReason::AbortedDuringSetup
                },
            });
        }

        self.info("initializing solver and starting simulation...");
        let mut driver = IntegratorDriver::new();
        if let Err(err) = driver.init(conf, &mut *self.sink) {
            self.release_magnet_quietly();
            self.renderer.terminate();
            driver.terminate(&mut *self.sink);
            return Err(RunError::Solver(err));
        }

        if let Err(err) = self.magnet.release() {
            self.sink
                .report(Level::Error, &format!("magnet not released? {err:#}"));
            self.renderer.terminate();
            driver.terminate(&mut *self.sink);
            return Err(RunError::Hardware(format!("{err:#}")));
        }

        self.frames.start();
        let (frames, end) = self.simulation_loop(conf, ctx, &mut driver);

        self.renderer.terminate();
        driver.terminate(&mut *self.sink);
        self.info("simulation terminated...");

        Ok(RunSummary {
            frames,
            simulated_time: driver.time(),
            end,
        })
    }

    fn setup_loop(&mut self, conf: &mut PendulumConfiguration, ctx: &mut RunContext) {
        while !ctx.abort_simulation && !ctx.setup_finished && !ctx.poll_cancellation() {
            match self.input.poll() {
                Some(Command::ToggleTransparency) => conf.toggle_transparency(),
                Some(Command::NudgeAngle(delta)) => conf.nudge_angle(delta),
                Some(Command::AdjustGeometry { rod_length, x, y }) => {
                    conf.adjust_geometry(rod_length, x, y)
                }
                Some(Command::FinishSetup) => ctx.setup_finished = true,
                Some(Command::Abort) => ctx.abort_simulation = true,
                None => {}
            }

            self.frames.lap();
            self.renderer.draw_frame(conf.angle(), &conf.geometry);
        }
    }

    fn simulation_loop(
        &mut self,
        conf: &mut PendulumConfiguration,
        ctx: &mut RunContext,
        driver: &mut IntegratorDriver,
    ) -> (u64, EndReason) {
        let mut frames = 0_u64;
        let mut end = None;

        while !ctx.abort_simulation && !ctx.poll_cancellation() {
            match self.input.poll() {
                Some(Command::FinishSetup | Command::Abort) => {
                    ctx.abort_simulation = true;
                    end.get_or_insert(EndReason::Stopped);
                }
                Some(Command::ToggleTransparency) => conf.toggle_transparency(),
                _ => {}
            }

            let target = self.frames.next_frame_target();
            if let Err(err) = driver.advance(conf, target, &mut *self.sink) {
                ctx.abort_simulation = true;
                end.get_or_insert(EndReason::StepFailed(err));
            }

            if let Integrity::Fatal { drift } = self.frames.check_integrity(&mut *self.sink) {
                ctx.abort_simulation = true;
                end.get_or_insert(EndReason::Drift { drift });
            }

            self.frames.lap();
            self.renderer.draw_frame(conf.angle(), &conf.geometry);
            frames += 1;

            if let Some(limit) = self.duration {
                if driver.time() >= limit {
                    ctx.abort_simulation = true;
                    end.get_or_insert(EndReason::DurationReached);
                }
            }
        }

        let end = end.unwrap_or(if ctx.stop_requested {
            EndReason::Cancelled
        } else {
            EndReason::Stopped
        });
        (frames, end)
    }
}
