//! Height maps and their JSON file format
//!
//! A height map is the ordered list of probed points, row-major in the order
//! the probing run visited them, plus the grid metadata. On disk it is
//!
//! ```json
//! { "metadata": { "x": 20, "y": 20, "xpoints": 5, "ypoints": 5,
//!                 "timestamp": "...", "switchPort": "...", "cncPort": "..." },
//!   "map": [[0, 0, -0.12], [5, 0, -0.1], ...] }
//! ```
//!
//! Older files store `map` as nested rows, or are a bare point array
//! without metadata; both are accepted on load.

use crate::data::HeightMapPoint;
use crate::error::HeightMapError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grid description stored alongside the points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightMapMetadata {
    /// Probed width along X (mm)
    #[serde(rename = "x")]
    pub width: f64,
    /// Probed height along Y (mm)
    #[serde(rename = "y")]
    pub height: f64,
    /// Points per row
    pub xpoints: usize,
    /// Number of rows
    pub ypoints: usize,
    /// When the run finished
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Serial port of the touch-off switch used for the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_port: Option<String>,
    /// Serial port of the CNC used for the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnc_port: Option<String>,
}

/// A measured work surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightMap {
    /// Grid description
    pub metadata: HeightMapMetadata,
    /// Points in probing order
    #[serde(rename = "map")]
    pub points: Vec<HeightMapPoint>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapPoints {
    Flat(Vec<HeightMapPoint>),
    Rows(Vec<Vec<HeightMapPoint>>),
}

impl MapPoints {
    fn flatten(self) -> Vec<HeightMapPoint> {
        match self {
            MapPoints::Flat(points) => points,
            MapPoints::Rows(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeightMapFile {
    Document {
        metadata: HeightMapMetadata,
        map: MapPoints,
    },
    Bare(MapPoints),
}

impl HeightMap {
    /// Create a height map from points and metadata
    pub fn new(metadata: HeightMapMetadata, points: Vec<HeightMapPoint>) -> Self {
        Self { metadata, points }
    }

    /// Build a height map from points alone, inferring the grid metadata
    /// from the distinct X and Y coordinates.
    pub fn from_points(points: Vec<HeightMapPoint>) -> Self {
        let xs = distinct(points.iter().map(|p| p.x));
        let ys = distinct(points.iter().map(|p| p.y));
        let span = |values: &[f64]| match (values.first(), values.last()) {
            (Some(min), Some(max)) => max - min,
            _ => 0.0,
        };

        let metadata = HeightMapMetadata {
            width: span(&xs),
            height: span(&ys),
            xpoints: xs.len(),
            ypoints: ys.len(),
            timestamp: None,
            switch_port: None,
            cnc_port: None,
        };
        Self { metadata, points }
    }

    /// Parse a height map from any supported JSON layout
    pub fn from_json(contents: &str) -> Result<Self, HeightMapError> {
        let map = match serde_json::from_str::<HeightMapFile>(contents)? {
            HeightMapFile::Document { metadata, map } => Self::new(metadata, map.flatten()),
            HeightMapFile::Bare(points) => Self::from_points(points.flatten()),
        };

        if map.points.is_empty() {
            return Err(HeightMapError::Empty);
        }
        if let Err(e) = map.validate() {
            tracing::warn!("Loaded height map does not match its grid: {}", e);
        }
        Ok(map)
    }

    /// Serialize to the current file layout
    pub fn to_json(&self) -> Result<String, HeightMapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a height map file
    pub fn load_from_file(path: &Path) -> Result<Self, HeightMapError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Save a height map file
    pub fn save_to_file(&self, path: &Path) -> Result<(), HeightMapError> {
        std::fs::write(path, self.to_json()?)?;
        tracing::info!("Wrote height map with {} points to {}", self.len(), path.display());
        Ok(())
    }

    /// Check that the point count matches `xpoints * ypoints`
    pub fn validate(&self) -> Result<(), HeightMapError> {
        let expected = self.metadata.xpoints * self.metadata.ypoints;
        if self.points.len() != expected {
            return Err(HeightMapError::PointCount {
                expected,
                actual: self.points.len(),
            });
        }
        Ok(())
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the map holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over rows of `xpoints` points
    pub fn rows(&self) -> impl Iterator<Item = &[HeightMapPoint]> {
        self.points.chunks(self.metadata.xpoints.max(1))
    }

    /// Lowest and highest measured Z, if any
    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.points.iter().map(|p| p.z).fold(None, |acc, z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        })
    }
}

fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    values
}
