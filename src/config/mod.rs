pub mod inittab;

use crate::error::{MinderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Shortest period `every` accepts, in seconds
pub const MIN_PERIOD_SECS: u32 = 1;

/// Longest period `every` accepts (one day), in seconds
pub const MAX_PERIOD_SECS: u32 = 86_400;

/// Tunables shared by all of the supervisors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pacing for single-child respawn supervision
    pub respawn: RespawnSettings,

    /// Directory-scanning service registry
    pub registry: RegistrySettings,

    /// Inittab supervisor tick
    pub inittab: InittabSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnSettings {
    /// A child that dies sooner than this after its start is "too fast"
    pub too_fast_secs: u64,

    /// Cooldown after a too-fast death or a failed fork (in seconds)
    pub delay_secs: u64,
}

impl Default for RespawnSettings {
    fn default() -> Self {
        Self {
            too_fast_secs: 2,
            delay_secs: 5,
        }
    }
}

impl RespawnSettings {
    pub fn too_fast(&self) -> Duration {
        Duration::from_secs(self.too_fast_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Pause between scan cycles (in seconds)
    pub scan_interval_secs: u64,

    /// Maximum number of distinct services tracked
    pub max_services: usize,

    /// Program each discovered service is launched under
    pub respawn_program: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 2,
            max_services: 5000,
            respawn_program: "always".to_string(),
        }
    }
}

impl RegistrySettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InittabSettings {
    pub tick_initial_ms: u64,
    pub tick_step_ms: u64,
    pub tick_max_ms: u64,
}

impl Default for InittabSettings {
    fn default() -> Self {
        Self {
            tick_initial_ms: 100,
            tick_step_ms: 100,
            tick_max_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Settings> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MinderError::ConfigError(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Determine format based on file extension
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let settings = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(MinderError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path` if given, otherwise use the defaults
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Settings::default()),
        }
    }

    fn parse_toml(contents: &str) -> Result<Settings> {
        toml::from_str(contents)
            .map_err(|e| MinderError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<Settings> {
        serde_json::from_str(contents)
            .map_err(|e| MinderError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.respawn.delay_secs == 0 {
            return Err(MinderError::InvalidConfig(
                "respawn.delay_secs must be at least 1".to_string(),
            ));
        }

        if self.registry.scan_interval_secs == 0 {
            return Err(MinderError::InvalidConfig(
                "registry.scan_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.registry.max_services == 0 {
            return Err(MinderError::InvalidConfig(
                "registry.max_services must be at least 1".to_string(),
            ));
        }

        if self.registry.respawn_program.is_empty() {
            return Err(MinderError::InvalidConfig(
                "registry.respawn_program must not be empty".to_string(),
            ));
        }

        if self.inittab.tick_initial_ms == 0 {
            return Err(MinderError::InvalidConfig(
                "inittab.tick_initial_ms must be at least 1".to_string(),
            ));
        }

        if self.inittab.tick_max_ms < self.inittab.tick_initial_ms {
            return Err(MinderError::InvalidConfig(format!(
                "inittab.tick_max_ms ({}) cannot be below inittab.tick_initial_ms ({})",
                self.inittab.tick_max_ms, self.inittab.tick_initial_ms
            )));
        }

        Ok(())
    }
}

/// Parse the period argument of `every`: an optional `+`, then digits only.
pub fn parse_period(value: &str) -> Result<Duration> {
    let invalid = || {
        MinderError::InvalidArgument(format!(
            "invalid value for N '{}' (must be between {}-{}, inclusive)",
            value, MIN_PERIOD_SECS, MAX_PERIOD_SECS
        ))
    };

    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty() {
        return Err(invalid());
    }

    let mut secs: u32 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(10).ok_or_else(invalid)?;
        secs = secs * 10 + digit;
        if secs > MAX_PERIOD_SECS {
            return Err(invalid());
        }
    }

    if secs < MIN_PERIOD_SECS {
        return Err(invalid());
    }

    Ok(Duration::from_secs(u64::from(secs)))
}
