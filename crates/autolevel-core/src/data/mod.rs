//! Data models for machine positions and measured surfaces
//!
//! Contains the coordinate types shared by the protocol, probing and
//! contouring crates, and the height map produced by a calibration run.

pub mod height_map;

use serde::{Deserialize, Serialize};

pub use height_map::{HeightMap, HeightMapMetadata};

/// Absolute machine position in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// One measured point of a height map
///
/// Serialized as a plain `[x, y, z]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct HeightMapPoint {
    /// Grid X coordinate
    pub x: f64,
    /// Grid Y coordinate
    pub y: f64,
    /// Measured Z at (x, y)
    pub z: f64,
}

impl HeightMapPoint {
    /// Create a new height map point
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for HeightMapPoint {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<HeightMapPoint> for [f64; 3] {
    fn from(point: HeightMapPoint) -> Self {
        [point.x, point.y, point.z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_serializes_as_triple() {
        let point = HeightMapPoint::new(5.0, 10.0, -0.25);
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, "[5.0,10.0,-0.25]");

        let back: HeightMapPoint = serde_json::from_str("[5, 10, -0.25]").unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_position_display() {
        let pos = Position::new(1.0, 2.5, -0.125);
        assert_eq!(pos.to_string(), "X:1.000 Y:2.500 Z:-0.125");
    }
}
