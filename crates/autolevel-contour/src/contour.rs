//! Contouring G-code against a height map
//!
//! Cutting moves get a new Z: the surface height at the move's XY, estimated
//! from the two nearest probed points, plus the target cutting depth. Rapid
//! XY moves are split into a level travel move followed by a plunge to the
//! corrected depth.

use crate::line::GCodeLine;
use autolevel_core::{ContourError, HeightMap, HeightMapPoint};
use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use serde::{Deserialize, Serialize};

/// Points sharing one coordinate that a single tree bucket can hold
const BUCKET_SIZE: usize = 256;

type SurfaceTree = KdTree<f64, u32, 2, BUCKET_SIZE, u32>;

/// What to do with lines that are neither travel nor cutting moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedLines {
    /// Leave them out of the output
    #[default]
    Drop,
    /// Copy them to the output unchanged
    PassThrough,
}

/// Contouring settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContourOptions {
    /// Cutting depth below the surface; the sign is ignored
    pub target_z_depth: f64,
    /// Handling of lines the engine does not rewrite
    #[serde(default)]
    pub unmatched: UnmatchedLines,
}

impl ContourOptions {
    /// Options with the default unmatched-line policy
    pub fn new(target_z_depth: f64) -> Self {
        Self {
            target_z_depth,
            unmatched: UnmatchedLines::default(),
        }
    }

    /// Set the unmatched-line policy
    pub fn with_unmatched(mut self, unmatched: UnmatchedLines) -> Self {
        self.unmatched = unmatched;
        self
    }

    /// Depth as a Z offset, always `<= 0`
    pub fn depth_offset(&self) -> f64 {
        -self.target_z_depth.abs()
    }
}

/// Nearest-neighbour lookup over the probed points
struct Surface<'a> {
    points: &'a [HeightMapPoint],
    tree: Option<SurfaceTree>,
}

impl<'a> Surface<'a> {
    fn new(points: &'a [HeightMapPoint]) -> Self {
        // The tree cannot split a bucket whose points all share one coordinate
        let tree = if max_shared_coordinate(points) < BUCKET_SIZE {
            let mut tree = SurfaceTree::new();
            for (index, point) in points.iter().enumerate() {
                tree.add(&[point.x, point.y], index as u32);
            }
            Some(tree)
        } else {
            tracing::debug!("Height map too dense along one axis for a k-d tree; using linear search");
            None
        };
        Self { points, tree }
    }

    /// The two probed points closest to (x, y), nearest first
    fn nearest_two(&self, x: f64, y: f64) -> (HeightMapPoint, HeightMapPoint) {
        match &self.tree {
            Some(tree) => {
                let found = tree.nearest_n::<SquaredEuclidean>(&[x, y], 2);
                let first = self.points[found[0].item as usize];
                let second = self.points[found[1].item as usize];
                (first, second)
            }
            None => {
                let mut ranked: Vec<&HeightMapPoint> = self.points.iter().collect();
                ranked.sort_by(|a, b| {
                    squared_distance(a, x, y).total_cmp(&squared_distance(b, x, y))
                });
                (*ranked[0], *ranked[1])
            }
        }
    }

    /// Estimated surface height at (x, y)
    fn height_at(&self, x: f64, y: f64) -> f64 {
        let (a, b) = self.nearest_two(x, y);

        if b.x != a.x {
            a.z + (x - a.x) * ((b.z - a.z) / (b.x - a.x))
        } else if b.y != a.y {
            a.z + (y - a.y) * ((b.z - a.z) / (b.y - a.y))
        } else {
            (a.z + b.z) / 2.0
        }
    }
}

fn squared_distance(point: &HeightMapPoint, x: f64, y: f64) -> f64 {
    (point.x - x).powi(2) + (point.y - y).powi(2)
}

fn max_shared_coordinate(points: &[HeightMapPoint]) -> usize {
    let longest_run = |mut values: Vec<f64>| {
        values.sort_by(|a, b| a.total_cmp(b));
        values
            .chunk_by(|a, b| a == b)
            .map(|run| run.len())
            .max()
            .unwrap_or(0)
    };
    longest_run(points.iter().map(|p| p.x).collect())
        .max(longest_run(points.iter().map(|p| p.y).collect()))
}

/// Split G-code text into parsed lines, skipping blanks, comment lines and
/// lines that do not parse
pub fn parse_program(raw: &str) -> Vec<GCodeLine> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('(') && !line.starts_with(';'))
        .filter_map(|line| match GCodeLine::parse(line) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Skipping unparseable G-code line: {}", e);
                None
            }
        })
        .collect()
}

/// Contour a program, dropping lines that are not rewritten
pub fn contour_gcode(
    raw: &str,
    height_map: &HeightMap,
    target_z_depth: f64,
) -> Result<Vec<GCodeLine>, ContourError> {
    contour_gcode_with(raw, height_map, &ContourOptions::new(target_z_depth))
}

/// Contour a program with explicit options
pub fn contour_gcode_with(
    raw: &str,
    height_map: &HeightMap,
    options: &ContourOptions,
) -> Result<Vec<GCodeLine>, ContourError> {
    if height_map.len() < 2 {
        return Err(ContourError::InsufficientHeightMap {
            points: height_map.len(),
        });
    }

    let surface = Surface::new(&height_map.points);
    let depth = options.depth_offset();
    let mut output = Vec::new();
    let mut dropped = 0usize;

    for mut line in parse_program(raw) {
        let is_travel_lift =
            line.is_rapid() && line.x.is_none() && line.y.is_none() && line.z.is_some_and(|z| z >= 0.0);
        let is_cut = line.has_xy() && (line.is_linear() || (line.is_rapid() && line.z.is_none()));

        if is_travel_lift {
            output.push(line);
        } else if is_cut {
            let (x, y) = (line.x.unwrap_or_default(), line.y.unwrap_or_default());
            let z = surface.height_at(x, y) + depth;
            if line.is_rapid() {
                output.push(line.clone());
            }
            line.z = Some(z);
            output.push(line);
        } else {
            match options.unmatched {
                UnmatchedLines::Drop => dropped += 1,
                UnmatchedLines::PassThrough => output.push(line),
            }
        }
    }

    if dropped > 0 {
        tracing::info!("Dropped {} G-code lines that are not motion moves", dropped);
    }
    Ok(output)
}

/// Contour a program and render the result as newline-separated text
pub fn contour_gcode_text(
    raw: &str,
    height_map: &HeightMap,
    options: &ContourOptions,
) -> Result<String, ContourError> {
    let lines = contour_gcode_with(raw, height_map, options)?;
    Ok(lines
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(z: f64) -> HeightMap {
        let points = (0..3)
            .flat_map(|j| (0..3).map(move |i| HeightMapPoint::new(i as f64 * 10.0, j as f64 * 10.0, z)))
            .collect();
        HeightMap::from_points(points)
    }

    fn corners() -> HeightMap {
        HeightMap::from_points(vec![
            HeightMapPoint::new(0.0, 0.0, 0.0),
            HeightMapPoint::new(20.0, 0.0, 2.0),
            HeightMapPoint::new(0.0, 20.0, 1.0),
            HeightMapPoint::new(20.0, 20.0, 3.0),
        ])
    }

    #[test]
    fn test_flat_map_cuts_at_depth() {
        let lines = contour_gcode("G1 X5 Y5 F300\nG01 X12 Y18", &flat(0.0), -1.0).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].to_string(), "G1 X5.00000000 Y5.00000000 Z-1.00000000 F300.00000000");
        assert_eq!(lines[1].z, Some(-1.0));
    }

    #[test]
    fn test_depth_sign_is_ignored() {
        let lines = contour_gcode("G1 X5 Y5", &flat(0.5), 0.25).unwrap();
        assert_eq!(lines[0].z, Some(0.25));
    }

    #[test]
    fn test_corner_interpolation_stays_between_corners() {
        let lines = contour_gcode("G1 X10 Y10", &corners(), -1.0).unwrap();
        let z = lines[0].z.unwrap();
        assert!((-1.0..=2.0).contains(&z), "z = {}", z);
    }

    #[test]
    fn test_interpolates_along_x_first() {
        // Nearest two are (0,0,0) and (20,0,2): X differs
        let lines = contour_gcode("G1 X5 Y1", &corners(), 0.0).unwrap();
        assert!((lines[0].z.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_interpolates_along_y_when_x_matches() {
        // Nearest two are (0,0,0) and (0,20,1): same X
        let lines = contour_gcode("G1 X1 Y5", &corners(), 0.0).unwrap();
        assert!((lines[0].z.unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_identical_neighbours_use_mean() {
        let map = HeightMap::from_points(vec![
            HeightMapPoint::new(0.0, 0.0, 1.0),
            HeightMapPoint::new(0.0, 0.0, 3.0),
            HeightMapPoint::new(50.0, 50.0, 9.0),
        ]);
        let lines = contour_gcode("G1 X1 Y1", &map, 0.0).unwrap();
        assert_eq!(lines[0].z, Some(2.0));
    }

    #[test]
    fn test_rapid_xy_is_split() {
        let lines = contour_gcode("G0 X10 Y10", &flat(0.0), 1.0).unwrap();
        let text: Vec<String> = lines.iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            vec![
                "G0 X10.00000000 Y10.00000000",
                "G0 X10.00000000 Y10.00000000 Z-1.00000000",
            ]
        );
    }

    #[test]
    fn test_travel_lift_passes_through() {
        let lines = contour_gcode("G0 Z5\nG00 Z0", &flat(-3.0), 1.0).unwrap();
        assert_eq!(lines[0].to_string(), "G0 Z5.00000000");
        assert_eq!(lines[1].z, Some(0.0));
    }

    #[test]
    fn test_unmatched_policy() {
        let program = "(header)\n; note\n\nM3 S1000\nG1 Z-1\nG0 X1 Y1 Z2\nG1 X1 Y1\nG1 X1 Ybad";

        let dropped = contour_gcode(program, &flat(0.0), 1.0).unwrap();
        assert_eq!(dropped.len(), 1);

        let options = ContourOptions::new(1.0).with_unmatched(UnmatchedLines::PassThrough);
        let kept = contour_gcode_with(program, &flat(0.0), &options).unwrap();
        let text: Vec<String> = kept.iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            vec![
                "M3",
                "G1 Z-1.00000000",
                "G0 X1.00000000 Y1.00000000 Z2.00000000",
                "G1 X1.00000000 Y1.00000000 Z-1.00000000",
            ]
        );
    }

    #[test]
    fn test_existing_z_on_cut_is_replaced() {
        let lines = contour_gcode("G1 X10 Y10 Z-7", &flat(0.5), 1.0).unwrap();
        assert_eq!(lines[0].z, Some(-0.5));
    }

    #[test]
    fn test_insufficient_height_map() {
        let map = HeightMap::from_points(vec![HeightMapPoint::new(0.0, 0.0, 0.0)]);
        assert_eq!(
            contour_gcode("G1 X1 Y1", &map, 1.0),
            Err(ContourError::InsufficientHeightMap { points: 1 })
        );
    }

    #[test]
    fn test_dense_column_uses_linear_search() {
        let points: Vec<HeightMapPoint> = (0..300)
            .map(|j| HeightMapPoint::new(0.0, j as f64, j as f64 / 100.0))
            .collect();
        let map = HeightMap::from_points(points);
        let lines = contour_gcode("G1 X0.5 Y10.5", &map, 0.0).unwrap();
        assert!((lines[0].z.unwrap() - 0.105).abs() < 1e-9);
    }

    #[test]
    fn test_text_output() {
        let text = contour_gcode_text("G0 Z5\nG1 X5 Y5", &flat(0.0), &ContourOptions::new(1.0)).unwrap();
        assert_eq!(text, "G0 Z5.00000000\nG1 X5.00000000 Y5.00000000 Z-1.00000000");
    }
}
