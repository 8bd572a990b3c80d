//! Line-based operator input read from a background thread.
//!
//! Every character of a line is one key press and an empty line is Enter, so the
//! terminal does not have to be switched to raw mode.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use log::debug;
use pendulum_core::simulation::{Command, OperatorInput, ANGLE_DELTA, GEOMETRY_DELTA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    EndOfInput,
}

pub struct LineInput {
    keys: Receiver<Key>,
    closed: bool,
}

impl LineInput {
    pub fn stdin() -> Self {
        Self::spawn(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let keys: Vec<Key> = if line.is_empty() {
                    vec![Key::Enter]
                } else {
                    line.chars().map(Key::Char).collect()
                };
                for key in keys {
                    if tx.send(key).is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(Key::EndOfInput);
        });
        Self {
            keys: rx,
            closed: false,
        }
    }

    /// Next key if one is waiting. Keeps answering `EndOfInput` once the input closed.
    pub fn poll_key(&mut self) -> Option<Key> {
        if self.closed {
            return Some(Key::EndOfInput);
        }
        match self.keys.try_recv() {
            Ok(Key::EndOfInput) | Err(TryRecvError::Disconnected) => {
                debug!("operator input closed");
                self.closed = true;
                Some(Key::EndOfInput)
            }
            Ok(key) => Some(key),
            Err(TryRecvError::Empty) => None,
        }
    }
}

/// Setup and simulation key bindings.
pub fn command_for(key: Key) -> Option<Command> {
    let command = match key {
        Key::Enter | Key::Char(' ') => Command::FinishSetup,
        Key::Char('q') | Key::Char('\u{1b}') | Key::EndOfInput => Command::Abort,
        Key::Char('v') => Command::ToggleTransparency,
        Key::Char('<') => Command::NudgeAngle(-ANGLE_DELTA),
        Key::Char('>') => Command::NudgeAngle(ANGLE_DELTA),
        Key::Char('+') => geometry(GEOMETRY_DELTA, 0.0, 0.0),
        Key::Char('-') => geometry(-GEOMETRY_DELTA, 0.0, 0.0),
        Key::Char('w') => geometry(0.0, 0.0, GEOMETRY_DELTA),
        Key::Char('s') => geometry(0.0, 0.0, -GEOMETRY_DELTA),
        Key::Char('d') => geometry(0.0, GEOMETRY_DELTA, 0.0),
        Key::Char('a') => geometry(0.0, -GEOMETRY_DELTA, 0.0),
        Key::Char(_) => return None,
    };
    Some(command)
}

fn geometry(rod_length: f32, x: f32, y: f32) -> Command {
    Command::AdjustGeometry { rod_length, x, y }
}

impl OperatorInput for LineInput {
    fn poll(&mut self) -> Option<Command> {
        self.poll_key().and_then(command_for)
    }
}
