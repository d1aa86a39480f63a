//! Parsed G-code motion lines

use autolevel_core::GcodeError;
use std::fmt;
use std::str::FromStr;

/// One G-code line reduced to its command word and motion parameters
///
/// Words other than X, Y, Z and F are not kept.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GCodeLine {
    /// Command word as written, e.g. `G1`
    pub cmd: String,
    /// X coordinate
    pub x: Option<f64>,
    /// Y coordinate
    pub y: Option<f64>,
    /// Z coordinate
    pub z: Option<f64>,
    /// Feed rate
    pub f: Option<f64>,
}

impl GCodeLine {
    /// Parse a line; anything after `;` is a comment
    pub fn parse(raw: &str) -> Result<Self, GcodeError> {
        let code = raw.split(';').next().unwrap_or_default();
        let mut words = code.split_whitespace();
        let cmd = words.next().ok_or(GcodeError::EmptyLine)?;

        let mut line = GCodeLine {
            cmd: cmd.to_string(),
            ..Default::default()
        };

        for word in words {
            let mut chars = word.chars();
            let Some(letter) = chars.next() else {
                continue;
            };
            let slot = match letter.to_ascii_uppercase() {
                'X' => &mut line.x,
                'Y' => &mut line.y,
                'Z' => &mut line.z,
                'F' => &mut line.f,
                _ => continue,
            };
            let value = chars
                .as_str()
                .parse::<f64>()
                .map_err(|_| GcodeError::InvalidParameter {
                    line: raw.to_string(),
                    param: word.to_string(),
                })?;
            *slot = Some(value);
        }

        Ok(line)
    }

    /// Whether the command is a rapid move (`G0`/`G00`)
    pub fn is_rapid(&self) -> bool {
        self.cmd.eq_ignore_ascii_case("G0") || self.cmd.eq_ignore_ascii_case("G00")
    }

    /// Whether the command is a linear feed move (`G1`/`G01`)
    pub fn is_linear(&self) -> bool {
        self.cmd.eq_ignore_ascii_case("G1") || self.cmd.eq_ignore_ascii_case("G01")
    }

    /// Whether both X and Y are set
    pub fn has_xy(&self) -> bool {
        self.x.is_some() && self.y.is_some()
    }
}

impl FromStr for GCodeLine {
    type Err = GcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GCodeLine::parse(s)
    }
}

impl fmt::Display for GCodeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cmd)?;
        for (axis, value) in [('X', self.x), ('Y', self.y), ('Z', self.z), ('F', self.f)] {
            if let Some(value) = value {
                write!(f, " {}{:.8}", axis, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_motion_words() {
        let line = GCodeLine::parse("G1 X10 y-2.5 Z0 F300 S1000").unwrap();
        assert_eq!(line.cmd, "G1");
        assert_eq!(line.x, Some(10.0));
        assert_eq!(line.y, Some(-2.5));
        assert_eq!(line.z, Some(0.0));
        assert_eq!(line.f, Some(300.0));
    }

    #[test]
    fn test_comment_is_ignored() {
        let line = GCodeLine::parse("G0 X1 ; move Y99").unwrap();
        assert_eq!(line.x, Some(1.0));
        assert_eq!(line.y, None);
        assert!(matches!(GCodeLine::parse("  ; only a comment"), Err(GcodeError::EmptyLine)));
    }

    #[test]
    fn test_bad_number_is_an_error() {
        assert_eq!(
            GCodeLine::parse("G1 X1 Yabc"),
            Err(GcodeError::InvalidParameter {
                line: "G1 X1 Yabc".to_string(),
                param: "Yabc".to_string(),
            })
        );
    }

    #[test]
    fn test_display_keeps_zero_and_omits_unset() {
        let line = GCodeLine::parse("G1 Y0 X2").unwrap();
        assert_eq!(line.to_string(), "G1 X2.00000000 Y0.00000000");

        let bare = GCodeLine::parse("M3").unwrap();
        assert_eq!(bare.to_string(), "M3");
    }

    #[test]
    fn test_command_classes() {
        assert!(GCodeLine::parse("g00 Z5").unwrap().is_rapid());
        assert!(GCodeLine::parse("G01 X1 Y1").unwrap().is_linear());
        assert!(!GCodeLine::parse("G2 X1 Y1").unwrap().is_linear());
        assert!(GCodeLine::parse("G1 X1 Y1").unwrap().has_xy());
        assert!(!GCodeLine::parse("G1 X1").unwrap().has_xy());
    }
}
