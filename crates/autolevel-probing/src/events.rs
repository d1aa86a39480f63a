//! Engine state and progress events

use autolevel_core::{CalibrationError, HeightMap, HeightMapPoint};
use std::fmt;

/// Lifecycle of the calibration engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    /// No run active
    #[default]
    Idle,
    /// A run is probing the grid
    Running,
    /// The last run was stopped by the user
    Stopped,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationState::Idle => write!(f, "Idle"),
            CalibrationState::Running => write!(f, "Running"),
            CalibrationState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Progress of a run
///
/// Every run ends with exactly one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    /// A grid point was measured
    Point(HeightMapPoint),
    /// The whole grid was measured
    Done(HeightMap),
    /// The run ended without a map
    Error(CalibrationError),
}

impl CalibrationEvent {
    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CalibrationEvent::Point(_))
    }
}
