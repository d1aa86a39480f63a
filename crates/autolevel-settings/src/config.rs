//! Configuration and settings management for Autolevel
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in the platform configuration directory.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (CNC and switch ports, timeouts)
//! - Probing settings (delays, safety limits, default grid)
//! - Contour settings (cutting depth, unmatched-line policy)

use crate::error::{SettingsError, SettingsResult};
use autolevel_communication::ProtocolConfig;
use autolevel_contour::{ContourOptions, UnmatchedLines};
use autolevel_probing::{CalibrationParams, ProbeTiming};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Last used CNC port
    pub cnc_port: Option<String>,
    /// Baud rate for the CNC port
    pub cnc_baud: u32,
    /// Last used touch-off switch port
    pub switch_port: Option<String>,
    /// Baud rate for the switch port
    pub switch_baud: u32,
    /// How long to wait for a firmware response in milliseconds
    pub read_timeout_ms: u64,
    /// Drop buffered input before each command
    pub discard_stale_input: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            cnc_port: None,
            cnc_baud: 115200,
            switch_port: None,
            switch_baud: 9600,
            read_timeout_ms: 60_000,
            discard_stale_input: true,
        }
    }
}

impl ConnectionSettings {
    /// Protocol settings for the CNC link
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            discard_stale_input: self.discard_stale_input,
        }
    }
}

/// Probing run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbingSettings {
    /// Wait after reaching a point before probing (ms)
    pub settle_delay_ms: u64,
    /// Wait after each step-down (ms)
    pub step_delay_ms: u64,
    /// Lift after the last row (mm)
    pub safety_lift_mm: f64,
    /// Give up on a point after this many step-downs
    pub max_probe_steps: Option<u32>,
    /// Default grid width (mm)
    pub x: f64,
    /// Default grid height (mm)
    pub y: f64,
    /// Default points per row
    pub xn: u32,
    /// Default number of rows
    pub yn: u32,
    /// Default step-down (mm)
    pub zstep: f64,
    /// Default travel height (mm)
    pub ztrav: f64,
    /// Default probes per point
    pub samples: u32,
}

impl Default for ProbingSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1500,
            step_delay_ms: 600,
            safety_lift_mm: 15.0,
            max_probe_steps: None,
            x: 100.0,
            y: 100.0,
            xn: 5,
            yn: 5,
            zstep: 0.1,
            ztrav: 1.0,
            samples: 1,
        }
    }
}

impl ProbingSettings {
    /// Timing for the calibration engine
    pub fn timing(&self) -> ProbeTiming {
        ProbeTiming {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            step_delay: Duration::from_millis(self.step_delay_ms),
            safety_lift: self.safety_lift_mm,
            max_probe_steps: self.max_probe_steps,
        }
    }

    /// Default grid
    pub fn calibration_params(&self) -> CalibrationParams {
        CalibrationParams::new(self.x, self.y, self.xn, self.yn, self.zstep, self.ztrav)
            .with_samples(self.samples)
    }
}

/// Contouring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourSettings {
    /// Cutting depth below the measured surface (mm)
    pub target_z_depth: f64,
    /// Copy lines that are not rewritten to the output
    pub pass_through_unmatched: bool,
}

impl Default for ContourSettings {
    fn default() -> Self {
        Self {
            target_z_depth: 0.1,
            pass_through_unmatched: false,
        }
    }
}

impl ContourSettings {
    /// Options for the contour engine
    pub fn options(&self) -> ContourOptions {
        let unmatched = if self.pass_through_unmatched {
            UnmatchedLines::PassThrough
        } else {
            UnmatchedLines::Drop
        };
        ContourOptions::new(self.target_z_depth).with_unmatched(unmatched)
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Probing settings
    pub probing: ProbingSettings,
    /// Contour settings
    pub contour: ContourSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("autolevel").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from the default location, or defaults when absent
    pub fn load_or_default() -> SettingsResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        // Connection
        if self.connection.cnc_baud == 0 {
            return Err(SettingsError::invalid("connection.cnc_baud", "must be > 0"));
        }
        if self.connection.switch_baud == 0 {
            return Err(SettingsError::invalid("connection.switch_baud", "must be > 0"));
        }
        if self.connection.read_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.read_timeout_ms", "must be > 0"));
        }

        // Probing
        if !self.probing.safety_lift_mm.is_finite() || self.probing.safety_lift_mm < 0.0 {
            return Err(SettingsError::invalid("probing.safety_lift_mm", "must be >= 0"));
        }
        if self.probing.max_probe_steps == Some(0) {
            return Err(SettingsError::invalid("probing.max_probe_steps", "must be > 0"));
        }
        self.probing
            .calibration_params()
            .validate()
            .map_err(|e| SettingsError::invalid("probing", e.to_string()))?;

        // Contour
        if !self.contour.target_z_depth.is_finite() {
            return Err(SettingsError::invalid("contour.target_z_depth", "must be finite"));
        }

        Ok(())
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}
