//! # Autolevel
//!
//! Auto-leveling for CNC machines driven by Marlin firmware:
//! - Probes a rectangular grid with a touch-off switch on a second serial port
//! - Stores the measured surface as a JSON height map
//! - Rewrites G-code toolpaths so cutting depth follows the measured surface
//!
//! ## Architecture
//!
//! Autolevel is organized as a workspace with multiple crates:
//!
//! 1. **autolevel-core** - Data model, height map files, error types
//! 2. **autolevel-communication** - Serial transport, probe signal, Marlin protocol
//! 3. **autolevel-probing** - Grid probing engine
//! 4. **autolevel-contour** - G-code contouring against a height map
//! 5. **autolevel-settings** - Configuration files
//! 6. **autolevel** - Machine session and the command line binary

pub mod session;

pub use autolevel_communication::{
    list_ports, CommandParams, CommandProtocol, LogicalCommand, ProbeSignal, ProtocolConfig,
    SerialPortInfo, SerialTransport,
};
pub use autolevel_contour::{
    contour_gcode, contour_gcode_text, contour_gcode_with, ContourOptions, GCodeLine,
    UnmatchedLines,
};
pub use autolevel_core::{
    CalibrationError, ConnectionError, ContourError, Error, HeightMap, HeightMapMetadata,
    HeightMapPoint, Position, ProtocolError, Result,
};
pub use autolevel_probing::{
    CalibrationEngine, CalibrationEvent, CalibrationParams, CalibrationState, ProbeTiming,
};
pub use autolevel_settings::Config;
pub use session::MachineSession;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Log output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(LogFormat::default())
}

/// Initialize logging with an explicit output layout
pub fn init_logging_with(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .pretty();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_line_number(true)
                .json();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
