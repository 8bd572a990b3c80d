mod input;
mod magnet;
mod signals;
mod terminal;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use pendulum_core::clock::MonotonicClock;
use pendulum_core::config::{preset_for_key, ConfigStore, DEFAULT_PRESET, PRESETS};
use pendulum_core::simulation::{CancellationToken, LogSink, Magnet, RunContext, Simulation};
use pendulum_core::{PendulumConfiguration, RunError};

use input::{Key, LineInput};
use magnet::{NoMagnet, SysfsMagnet, DEFAULT_GPIO_ROOT, DEFAULT_PIN};
use terminal::TerminalRenderer;

/// Idle wait between configuration menu polls.
const MENU_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Didactic pendulum simulation
///
/// Pick a preset with the keys 1-8, set up the starting angle, then release.
#[derive(Parser)]
#[command(name = "pendulum")]
#[command(version, long_about = None)]
struct Cli {
    /// Directory holding the preset documents
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,

    /// Run this preset once instead of showing the menu
    #[arg(long)]
    preset: Option<String>,

    /// End each run after this many simulated seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Drive the electromagnet over sysfs GPIO
    #[arg(long)]
    magnet: bool,

    /// GPIO pin of the electromagnet
    #[arg(long, default_value_t = DEFAULT_PIN)]
    gpio_pin: u32,

    /// Width of the text display in columns
    #[arg(long, default_value_t = 61)]
    columns: usize,
}

struct Session {
    store: ConfigStore,
    conf: PendulumConfiguration,
    input: LineInput,
    magnet: Box<dyn Magnet>,
    columns: usize,
    duration: Option<f64>,
    ctx: RunContext,
}

impl Session {
    /// One run. Only renderer and magnet failures end the program.
    fn run(&mut self) -> Result<()> {
        let mut renderer = TerminalRenderer::new(std::io::stdout(), self.columns);
        let mut sink = LogSink;
        let result = Simulation::new(
            &mut renderer,
            &mut self.input,
            self.magnet.as_mut(),
            &mut sink,
            MonotonicClock::new(),
        )
        .with_duration(self.duration)
        .setup_and_run(&mut self.conf, &mut self.ctx);

        match result {
            Ok(summary) => {
                info!(
                    "run ended ({:?}) after {} frames, t = {:.3} s",
                    summary.end, summary.frames, summary.simulated_time
                );
                Ok(())
            }
            Err(RunError::Solver(err)) => {
                error!("{err}");
                Ok(())
            }
            Err(err) => Err(err).context("Simulation could not run"),
        }
    }

    fn select(&mut self, name: &str) {
        if let Err(err) = self.store.reload_into(name, &mut self.conf) {
            warn!("{name}: {err}; keeping the previous configuration");
        }
    }

    fn menu(&mut self) -> Result<()> {
        print_menu();
        while !self.ctx.poll_cancellation() {
            match self.input.poll_key() {
                Some(Key::EndOfInput) => self.ctx.token().cancel(),
                Some(Key::Char(key)) => {
                    if let Some(name) = preset_for_key(key) {
                        self.select(name);
                        self.run()?;
                        print_menu();
                    }
                }
                _ => {}
            }
            thread::sleep(MENU_POLL_INTERVAL);
        }
        Ok(())
    }
}

fn print_menu() {
    println!("select a configuration:");
    for (key, name) in PRESETS {
        println!("  {key}  {name}");
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let store = ConfigStore::new(&cli.config_dir);
    let conf = store
        .load(DEFAULT_PRESET)
        .with_context(|| format!("No usable configuration in '{}'", cli.config_dir.display()))?;

    let magnet: Box<dyn Magnet> = if cli.magnet {
        Box::new(SysfsMagnet::new(DEFAULT_GPIO_ROOT, cli.gpio_pin))
    } else {
        Box::new(NoMagnet)
    };

    let token = CancellationToken::new();
    signals::install(&token)?;

    let mut session = Session {
        store,
        conf,
        input: LineInput::stdin(),
        magnet,
        columns: cli.columns,
        duration: cli.duration,
        ctx: RunContext::new(token),
    };

    match cli.preset.as_deref() {
        Some(name) => {
            session.select(name);
            session.run()?;
        }
        None => session.menu()?,
    }

    info!("shutdown complete...");
    Ok(())
}
