//! # Autolevel Contour
//!
//! Rewrites the Z heights of a G-code program so the cut follows a probed
//! surface. The transformation is synchronous and free of I/O.

pub mod contour;
pub mod line;

pub use contour::{
    contour_gcode, contour_gcode_text, contour_gcode_with, parse_program, ContourOptions,
    UnmatchedLines,
};
pub use line::GCodeLine;
