//! Error handling for Autolevel
//!
//! Provides error types for all layers of the application:
//! - Connection errors (serial port transport)
//! - Protocol errors (command mapping and firmware responses)
//! - Calibration errors (probing runs)
//! - Height map errors (file format and shape)
//! - G-Code and contouring errors
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors on a serial link: opening the port, writing a line,
/// and reading a response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Port is already in use
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The name of the port that is in use.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No port has been opened for this role
    #[error("{role} port is not open")]
    NotOpen {
        /// Which link is missing ("CNC" or "switch").
        role: String,
    },

    /// Writing or draining a line failed part way through
    #[error("Write failed: {reason}")]
    Write {
        /// The reason the write failed.
        reason: String,
    },

    /// No complete line arrived in time
    #[error("Read timed out after {timeout_ms}ms")]
    ReadTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },
}

/// Protocol error type
///
/// Raised by the command layer that maps logical machine commands onto
/// literal G-code lines and consumes firmware responses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The requested command has no entry in the command table
    #[error("Invalid command: {command}")]
    InvalidCommand {
        /// The command as it was requested.
        command: String,
    },

    /// A firmware response could not be interpreted
    #[error("Malformed response '{response}': {reason}")]
    MalformedResponse {
        /// The raw response line.
        response: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Transport failure, propagated unchanged
    #[error(transparent)]
    Transport(#[from] ConnectionError),
}

/// Calibration error type
///
/// Every variant raised while a run is active ends that run; partial
/// height maps are discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The run was stopped by the user
    #[error("Calibration aborted")]
    Aborted,

    /// Unexpected serial failure during a run
    #[error("Calibration fault: {0}")]
    Fault(#[from] ProtocolError),

    /// Grid parameters cannot describe a probing grid
    #[error("Invalid calibration parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters were rejected.
        reason: String,
    },

    /// Invalid state transition
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidState {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },

    /// The probe signal stream ended while the engine was waiting on it
    #[error("Probe signal lost")]
    SignalLost,

    /// The probe never touched within the configured number of steps
    #[error("Probe not triggered at ({x:.3}, {y:.3}) after {steps} steps")]
    ProbeNotTriggered {
        /// Grid X coordinate being probed.
        x: f64,
        /// Grid Y coordinate being probed.
        y: f64,
        /// Number of step-downs issued.
        steps: u32,
    },
}

/// Height map error type
#[derive(Error, Debug)]
pub enum HeightMapError {
    /// JSON serialization/deserialization error
    #[error("Invalid height map JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Point count does not match the grid dimensions
    #[error("Height map has {actual} points, expected {expected}")]
    PointCount {
        /// xpoints * ypoints
        expected: usize,
        /// Number of points present.
        actual: usize,
    },

    /// A map with no points
    #[error("Height map is empty")]
    Empty,
}

/// G-Code error type
///
/// Represents errors related to parsing a single G-Code line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Line has no command word
    #[error("Empty G-Code line")]
    EmptyLine,

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' in '{line}'")]
    InvalidParameter {
        /// The raw line.
        line: String,
        /// The parameter word that failed to parse.
        param: String,
    },
}

/// Contouring error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContourError {
    /// Interpolation needs at least two reference points
    #[error("Height map needs at least 2 points to contour, got {points}")]
    InsufficientHeightMap {
        /// Number of points in the supplied map.
        points: usize,
    },
}

/// Main error type for Autolevel
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Calibration error
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Height map error
    #[error(transparent)]
    HeightMap(#[from] HeightMapError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Contour error
    #[error(transparent)]
    Contour(#[from] ContourError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a read timeout anywhere in the chain
    pub fn is_timeout(&self) -> bool {
        let connection = match self {
            Error::Connection(e) => Some(e),
            Error::Protocol(ProtocolError::Transport(e)) => Some(e),
            Error::Calibration(CalibrationError::Fault(ProtocolError::Transport(e))) => Some(e),
            _ => None,
        };
        matches!(connection, Some(ConnectionError::ReadTimeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Protocol(ProtocolError::Transport(_))
        )
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a calibration error
    pub fn is_calibration_error(&self) -> bool {
        matches!(self, Error::Calibration(_))
    }

    /// Check if this error is a user-requested calibration stop
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Calibration(CalibrationError::Aborted))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
