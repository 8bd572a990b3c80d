use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::debug;
use pendulum_core::simulation::Magnet;

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
pub const DEFAULT_PIN: u32 = 17;

/// Electromagnet on a sysfs GPIO line that has already been exported as an output.
#[derive(Debug, Clone)]
pub struct SysfsMagnet {
    pin_dir: PathBuf,
}

impl SysfsMagnet {
    pub fn new(root: impl Into<PathBuf>, pin: u32) -> Self {
        Self {
            pin_dir: root.into().join(format!("gpio{pin}")),
        }
    }

    fn write(&self, value: &str) -> Result<()> {
        let path = self.pin_dir.join("value");
        fs::write(&path, value)
            .with_context(|| format!("Failed to write gpio value '{}'", path.display()))?;
        debug!("gpio {} <- {value}", path.display());
        Ok(())
    }
}

impl Magnet for SysfsMagnet {
    fn check(&mut self) -> Result<()> {
        let path = self.pin_dir.join("direction");
        let direction = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read gpio direction '{}'", path.display()))?;
        if direction.trim() != "out" {
            bail!(
                "Gpio direction of '{}' is '{}', expected 'out'.",
                path.display(),
                direction.trim()
            );
        }
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        self.write("1")
    }

    fn release(&mut self) -> Result<()> {
        self.write("0")
    }
}

/// Stand-in when no magnet is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMagnet;

impl Magnet for NoMagnet {
    fn check(&mut self) -> Result<()> {
        Ok(())
    }

    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exported(direction: &str) -> (tempfile::TempDir, SysfsMagnet) {
        let root = tempdir().unwrap();
        let pin_dir = root.path().join("gpio17");
        fs::create_dir(&pin_dir).unwrap();
        fs::write(pin_dir.join("direction"), direction).unwrap();
        fs::write(pin_dir.join("value"), "0").unwrap();
        let magnet = SysfsMagnet::new(root.path(), DEFAULT_PIN);
        (root, magnet)
    }

    #[test]
    fn acquire_and_release_write_the_value_file() {
        let (root, mut magnet) = exported("out\n");
        magnet.check().unwrap();
        magnet.acquire().unwrap();
        let value = root.path().join("gpio17/value");
        assert_eq!(fs::read_to_string(&value).unwrap(), "1");
        magnet.release().unwrap();
        assert_eq!(fs::read_to_string(&value).unwrap(), "0");
    }

    #[test]
    fn input_direction_fails_the_check() {
        let (_root, mut magnet) = exported("in\n");
        let err = magnet.check().unwrap_err();
        assert!(err.to_string().contains("expected 'out'"));
    }

    #[test]
    fn unexported_pin_fails_the_check() {
        let root = tempdir().unwrap();
        let mut magnet = SysfsMagnet::new(root.path(), 4);
        let err = magnet.check().unwrap_err();
        assert!(format!("{err:#}").contains("gpio4"));
    }
}
