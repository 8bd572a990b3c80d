//! A one-line text renderer: the bob is drawn where it would be on a screen spanning
//! `[-1, 1]` horizontally. Frames are paced to the display refresh like a swap interval.

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::warn;
use pendulum_core::clock::NOMINAL_FRAME_DURATION;
use pendulum_core::params::DisplayGeometry;
use pendulum_core::simulation::Renderer;

pub struct TerminalRenderer<W: Write> {
    out: W,
    columns: usize,
    failed: bool,
    last_frame: Option<Instant>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, columns: usize) -> Self {
        Self {
            out,
            columns: columns.max(3),
            failed: false,
            last_frame: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Column of the bob for `angle`, clamped to the drawable width.
    fn bob_column(&self, angle: f64, geometry: &DisplayGeometry) -> usize {
        let x = geometry.suspension_x as f64 + geometry.virtual_rod_length as f64 * angle.sin();
        let last = (self.columns - 1) as f64;
        ((x + 1.0) * 0.5 * last).round().clamp(0.0, last) as usize
    }

    pub fn frame_line(&self, angle: f64, geometry: &DisplayGeometry) -> String {
        let background = if geometry.transparency { ' ' } else { '.' };
        let pivot = self.bob_column(0.0, geometry);
        let bob = self.bob_column(angle, geometry);
        let row: String = (0..self.columns)
            .map(|c| match c {
                c if c == bob => 'o',
                c if c == pivot => '|',
                _ => background,
            })
            .collect();
        format!("[{row}] {angle:+.4} rad")
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn init(&mut self, geometry: &DisplayGeometry) -> Result<()> {
        self.failed = false;
        writeln!(
            self.out,
            "pendulum: rod {:.3}, suspension ({:.2}, {:.2})",
            geometry.virtual_rod_length, geometry.suspension_x, geometry.suspension_y
        )
        .context("Failed to write to the terminal")?;
        Ok(())
    }

    fn draw_frame(&mut self, angle: f64, geometry: &DisplayGeometry) {
        let interval = Duration::from_secs_f64(NOMINAL_FRAME_DURATION);
        if let Some(remaining) = self
            .last_frame
            .and_then(|last| interval.checked_sub(last.elapsed()))
        {
            thread::sleep(remaining);
        }
        self.last_frame = Some(Instant::now());

        let line = self.frame_line(angle, geometry);
        let result = write!(self.out, "\r{line}").and_then(|_| self.out.flush());
        if let Err(err) = result {
            if !self.failed {
                warn!("terminal output failed: {err}");
                self.failed = true;
            }
        }
    }

    fn terminate(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}
