use std::collections::VecDeque;
use std::path::Path;

use anyhow::Result;
use pendulum_core::analysis::small_angle_solution;
use pendulum_core::clock::ManualClock;
use pendulum_core::config::{self, ConfigStore};
use pendulum_core::params::DisplayGeometry;
use pendulum_core::simulation::{
    Command, EndReason, LogSink, Magnet, MemorySink, OperatorInput, Renderer, RunContext,
    Simulation,
};
use pendulum_core::{DriverState, IntegratorDriver};

const REFERENCE: &str = r#"
[geometry]
suspension_x = 0.0
suspension_y = 0.8
screen_width = 1.2

[environment]
gravity = 9.81

[bearing]
friction_constant = 0.0
friction_linear = 0.0
friction_quadratic = 0.0

[rod]
mass = 0.1
length = 1.0

[bob]
mass = 1.0
radius = 0.05

[solver]
initialstep = 1e-3
maxstep = 0.01
abserr = 1e-8
relerr = 1e-8
substeps = 10
adaptive = true
stepper = "rk8pd"

[model]
linear = false
pointmass = true
gyration = false
initial_angle = 0.1
"#;

#[test]
fn reference_pendulum_follows_the_small_angle_solution() -> Result<()> {
    let mut conf = config::parse(REFERENCE)?;
    let mut sink = LogSink;
    let mut driver = IntegratorDriver::new();
    driver.init(&conf, &mut sink)?;

    for frame in 1..=60 {
        driver.advance(&mut conf, frame as f64 / 60.0, &mut sink)?;
    }
    assert_eq!(driver.time(), 1.0);

    let expected = small_angle_solution(&conf, 1.0)?;
    let error = (conf.angle() - expected).abs();
    assert!(
        error <= 0.01 * conf.initial_angle(),
        "angle {} vs small-angle {expected}",
        conf.angle()
    );

    driver.terminate(&mut sink);
    assert_eq!(driver.state(), DriverState::Terminated);
    Ok(())
}

struct FrameRecorder<'c> {
    clock: &'c ManualClock,
    angles: Vec<f64>,
}

impl Renderer for FrameRecorder<'_> {
    fn init(&mut self, _geometry: &DisplayGeometry) -> Result<()> {
        Ok(())
    }

    fn draw_frame(&mut self, angle: f64, _geometry: &DisplayGeometry) {
        self.angles.push(angle);
        self.clock.advance(1.0 / 60.0);
    }

    fn terminate(&mut self) {}
}

struct Keys(VecDeque<Command>);

impl OperatorInput for Keys {
    fn poll(&mut self) -> Option<Command> {
        self.0.pop_front()
    }
}

struct Held(bool);

impl Magnet for Held {
    fn check(&mut self) -> Result<()> {
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        self.0 = true;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.0 = false;
        Ok(())
    }
}

#[test]
fn scripted_run_of_the_linear_preset_matches_the_exact_solution() -> Result<()> {
    let store = ConfigStore::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs"));
    let mut conf = store.load("conf-earth-undamped-pointmass-linear")?;
    assert!(!conf.solver().adaptive);

    let clock = ManualClock::new(0.0);
    let mut renderer = FrameRecorder {
        clock: &clock,
        angles: Vec::new(),
    };
    let mut input = Keys(VecDeque::from([Command::FinishSetup]));
    let mut magnet = Held(false);
    let mut sink = MemorySink::default();
    let mut ctx = RunContext::default();

    let summary = Simulation::new(&mut renderer, &mut input, &mut magnet, &mut sink, &clock)
        .with_duration(Some(2.0))
        .setup_and_run(&mut conf, &mut ctx)?;

    assert_eq!(summary.end, EndReason::DurationReached);
    assert!(!magnet.0);
    assert!(sink.entries().iter().all(|(level, _)| *level > log::Level::Warn));

    // Linear and undamped: θ₀·cos(ω_n t) is the exact solution.
    let t = summary.simulated_time;
    let exact = small_angle_solution(&conf, t)?;
    assert!((conf.angle() - exact).abs() < 1e-5, "{} vs {exact}", conf.angle());
    assert_eq!(renderer.angles.len() as u64, summary.frames + 1);
    Ok(())
}
