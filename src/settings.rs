//! Driver settings with persistence
//!
//! Settings are read from `~/.config/sde/settings.toml`

use std::fs;
use std::path::{Path, PathBuf};

use sde_core::TimeConfig;
use serde::{Deserialize, Serialize};

/// All driver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub simulation: SimulationSettings,
    pub time: TimeConfig,
    pub logging: LoggingSettings,
}

/// Where the settings in use came from
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsSource {
    File(PathBuf),
    /// Defaults, with the reason no file was used
    Defaults(String),
}

impl DriverSettings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sde"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from the config directory, or fall back to defaults.
    ///
    /// Logging is not up yet when this runs, so the outcome is returned for
    /// the caller to report.
    pub fn load() -> (Self, SettingsSource) {
        let Some(path) = Self::settings_path() else {
            return (
                Self::default(),
                SettingsSource::Defaults("could not determine config directory".into()),
            );
        };
        if !path.exists() {
            return (
                Self::default(),
                SettingsSource::Defaults(format!("no settings file at {}", path.display())),
            );
        }
        match Self::load_from(&path) {
            Ok(settings) => (settings, SettingsSource::File(path)),
            Err(e) => (
                Self::default(),
                SettingsSource::Defaults(format!("failed to read {}: {e:#}", path.display())),
            ),
        }
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save settings to the config directory
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let Some(path) = Self::settings_path() else {
            anyhow::bail!("Could not determine config directory");
        };
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Demo simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Number of bodies spawned at startup
    pub entity_count: u32,
    /// Simulation ticks to run before exiting
    pub ticks: u64,
    /// Wall-clock delta fed to the clock each frame (the driver is headless)
    pub frame_delta: f32,
    /// Radius of the arena bodies bounce inside
    pub arena_radius: f32,
    /// Upper bound for each velocity axis
    pub max_speed: f32,
    /// Longest lifetime a body can be spawned with, in ticks
    pub max_lifetime: u32,
    /// Ticks between progress reports
    pub report_every: u64,
    /// Fixed RNG seed, random if absent
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            entity_count: 64,
            ticks: 600,
            frame_delta: 1.0 / 30.0,
            arena_radius: 50.0,
            max_speed: 20.0,
            max_lifetime: 900,
            report_every: 120,
            seed: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info`, `sde_ecs=debug`)
    pub filter: String,
    /// Include the event target in log lines
    pub show_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            show_target: false,
        }
    }
}
