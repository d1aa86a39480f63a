//! Autolevel Settings Crate
//!
//! Handles application configuration and its persistence.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, ContourSettings, ProbingSettings};
pub use error::{SettingsError, SettingsResult};
