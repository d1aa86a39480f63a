//! Probing run parameters

use autolevel_core::CalibrationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Grid to probe
///
/// The grid spans `[0, x] x [0, y]` from the work origin with `xn` points per
/// row and `yn` rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Width along X (mm)
    pub x: f64,
    /// Height along Y (mm)
    pub y: f64,
    /// Points per row
    pub xn: u32,
    /// Number of rows
    pub yn: u32,
    /// Step-down per probe step (mm); only the magnitude is used
    pub zstep: f64,
    /// Travel height above the surface between points (mm)
    pub ztrav: f64,
    /// Probes averaged per point
    #[serde(default = "default_samples")]
    pub samples: u32,
}

fn default_samples() -> u32 {
    1
}

impl CalibrationParams {
    /// Grid with one sample per point
    pub fn new(x: f64, y: f64, xn: u32, yn: u32, zstep: f64, ztrav: f64) -> Self {
        Self {
            x,
            y,
            xn,
            yn,
            zstep,
            ztrav,
            samples: default_samples(),
        }
    }

    /// Set the number of probes averaged per point
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Check that the parameters describe a probeable grid
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let invalid = |reason: String| Err(CalibrationError::InvalidParameters { reason });

        if self.xn < 2 || self.yn < 2 {
            return invalid(format!(
                "grid needs at least 2x2 points, got {}x{}",
                self.xn, self.yn
            ));
        }
        if !(self.x.is_finite() && self.x > 0.0 && self.y.is_finite() && self.y > 0.0) {
            return invalid(format!("grid size {} x {} must be positive", self.x, self.y));
        }
        if !self.zstep.is_finite() || self.zstep == 0.0 {
            return invalid(format!("z step {} must be non-zero", self.zstep));
        }
        if !self.ztrav.is_finite() {
            return invalid(format!("travel height {} must be finite", self.ztrav));
        }
        if self.samples == 0 {
            return invalid("at least one sample per point is required".to_string());
        }
        Ok(())
    }

    /// Spacing between columns
    pub fn step_x(&self) -> f64 {
        self.x / (self.xn - 1) as f64
    }

    /// Spacing between rows
    pub fn step_y(&self) -> f64 {
        self.y / (self.yn - 1) as f64
    }

    /// X coordinate of column `i`
    pub fn column_x(&self, i: u32) -> f64 {
        grid_coord(self.x, i, self.xn)
    }

    /// Y coordinate of row `j`
    pub fn row_y(&self, j: u32) -> f64 {
        grid_coord(self.y, j, self.yn)
    }

    /// Number of points in the finished map
    pub fn point_count(&self) -> usize {
        self.xn as usize * self.yn as usize
    }
}

// Clamped so rounding never places the last point outside the grid
fn grid_coord(extent: f64, index: u32, count: u32) -> f64 {
    (extent * index as f64 / (count - 1) as f64).min(extent)
}

/// Machine timing and safety settings for a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeTiming {
    /// Wait after reaching a point before probing
    pub settle_delay: Duration,
    /// Wait after each step-down before checking the switch
    pub step_delay: Duration,
    /// Lift after the last row (mm)
    pub safety_lift: f64,
    /// Give up on a point after this many step-downs
    pub max_probe_steps: Option<u32>,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
            step_delay: Duration::from_millis(600),
            safety_lift: 15.0,
            max_probe_steps: None,
        }
    }
}
