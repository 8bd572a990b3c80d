//! Loading configuration documents from a directory of TOML presets.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::ConfigError;
use crate::params::{PendulumConfiguration, RawParameters};

pub const DEFAULT_PRESET: &str = "conf-default";

/// Preset selection keys of the configuration menu.
pub const PRESETS: [(char, &str); 8] = [
    ('1', "conf-default"),
    ('2', "conf-earth-damped"),
    ('3', "conf-earth-damped-pointmass"),
    ('4', "conf-earth-undamped"),
    ('5', "conf-earth-undamped-pointmass-linear"),
    ('6', "conf-jupiter-damped"),
    ('7', "conf-moon-undamped"),
    ('8', "conf-water-damped"),
];

pub fn preset_for_key(key: char) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
}

/// Parses and derives a configuration document.
pub fn parse(text: &str) -> Result<PendulumConfiguration, ConfigError> {
    let raw: RawParameters = toml::from_str(text)?;
    PendulumConfiguration::derive(raw)
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.toml"))
    }

    fn read(&self, name: &str) -> Result<(PathBuf, String), ConfigError> {
        let path = self.path_for(name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok((path, text)),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    /// Loads `name`, falling back to the default preset when that document cannot be read.
    /// Parse and validation errors never fall back.
    pub fn load(&self, name: &str) -> Result<PendulumConfiguration, ConfigError> {
        let (path, text) = match self.read(name) {
            Ok(found) => found,
            Err(err) if name != DEFAULT_PRESET => {
                warn!("{err}; falling back to default configuration");
                self.read(DEFAULT_PRESET)?
            }
            Err(err) => return Err(err),
        };

        let conf = parse(&text)?;
        debug!("loaded configuration {}", path.display());
        Ok(conf)
    }

    /// Replaces `current` wholesale with `name`. On error `current` is left as it was.
    pub fn reload_into(
        &self,
        name: &str,
        current: &mut PendulumConfiguration,
    ) -> Result<(), ConfigError> {
        *current = self.load(name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::reference_raw;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, raw: &RawParameters) {
        let text = toml::to_string(raw).unwrap();
        fs::write(dir.join(format!("{name}.toml")), text).unwrap();
    }

    #[test]
    fn preset_keys_map_to_documents() {
        assert_eq!(preset_for_key('1'), Some(DEFAULT_PRESET));
        assert_eq!(
            preset_for_key('5'),
            Some("conf-earth-undamped-pointmass-linear")
        );
        assert_eq!(preset_for_key('9'), None);
    }

    #[test]
    fn loads_a_named_preset() {
        let dir = tempdir().unwrap();
        let mut raw = reference_raw();
        raw.environment.gravity = 1.62;
        write(dir.path(), "conf-moon-undamped", &raw);

        let conf = ConfigStore::new(dir.path())
            .load("conf-moon-undamped")
            .unwrap();
        assert_eq!(conf.raw().environment.gravity, 1.62);
        assert_eq!(conf.angle(), 0.1);
        assert!(conf.geometry.transparency);
    }

    #[test]
    fn unreadable_preset_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let mut raw = reference_raw();
        raw.model.initial_angle = 0.3;
        write(dir.path(), DEFAULT_PRESET, &raw);

        let conf = ConfigStore::new(dir.path()).load("conf-missing").unwrap();
        assert_eq!(conf.initial_angle(), 0.3);
    }

    #[test]
    fn missing_default_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = ConfigStore::new(dir.path()).load("conf-missing").unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.ends_with("conf-default.toml")));
    }

    #[test]
    fn failed_reload_keeps_the_current_configuration() {
        let dir = tempdir().unwrap();
        write(dir.path(), DEFAULT_PRESET, &reference_raw());
        let text = toml::to_string(&reference_raw())
            .unwrap()
            .replace("gravity = 9.81", "gravity = nan");
        fs::write(dir.path().join("conf-broken.toml"), text).unwrap();

        let store = ConfigStore::new(dir.path());
        let mut current = store.load(DEFAULT_PRESET).unwrap();
        current.nudge_angle(0.5);
        let before = current.clone();

        let err = store.reload_into("conf-broken", &mut current).unwrap_err();
        assert!(err.to_string().contains("environment.gravity"));
        assert_eq!(current, before);

        store.reload_into(DEFAULT_PRESET, &mut current).unwrap();
        assert_eq!(current.angle(), 0.1);
    }

    #[test]
    fn rejects_unknown_stepper_and_fields() {
        let mut raw = reference_raw();
        raw.solver.stepper = "rk45".to_string();
        let text = toml::to_string(&raw).unwrap();
        assert!(matches!(parse(&text), Err(ConfigError::UnknownStepper(name)) if name == "rk45"));

        let text = toml::to_string(&reference_raw()).unwrap() + "\n[extra]\nvalue = 1\n";
        assert!(matches!(parse(&text), Err(ConfigError::Parse(_))));

        let text = toml::to_string(&reference_raw())
            .unwrap()
            .replace("gravity = 9.81\n", "");
        assert!(matches!(parse(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn shipped_presets_all_derive() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs");
        let store = ConfigStore::new(&dir);
        for (key, name) in PRESETS {
            assert!(store.path_for(name).exists(), "preset {key} missing: {name}");
            let conf = store
                .load(name)
                .unwrap_or_else(|err| panic!("preset {name}: {err}"));
            assert!(conf.model().moment_of_inertia > 0.0);
        }
    }
}
