//! # Autolevel Core
//!
//! Core types and error handling for Autolevel.
//! Provides the machine position and height map data models shared by the
//! communication, probing, and contouring crates, plus the error taxonomy
//! every layer reports through.

pub mod data;
pub mod error;

pub use data::{HeightMap, HeightMapMetadata, HeightMapPoint, Position};

pub use error::{
    CalibrationError, ConnectionError, ContourError, Error, GcodeError, HeightMapError,
    ProtocolError, Result,
};
