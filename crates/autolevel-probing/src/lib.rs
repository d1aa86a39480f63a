//! # Autolevel Probing
//!
//! Drives a probing run over a rectangular grid and assembles the measured
//! points into a [`HeightMap`](autolevel_core::HeightMap).
//!
//! The engine talks to the machine through [`CommandSender`] and listens for
//! the touch-off switch through [`TriggerSource`], so it can be driven by the
//! real serial links or by scripted fakes.
//!
//! [`CommandSender`]: autolevel_communication::CommandSender

pub mod engine;
pub mod events;
pub mod params;
pub mod source;

pub use engine::{CalibrationEngine, CalibrationEvents};
pub use events::{CalibrationEvent, CalibrationState};
pub use params::{CalibrationParams, ProbeTiming};
pub use source::TriggerSource;
