//! Marlin response parsing
//!
//! Marlin answers `M114` with a line such as
//! `X:10.00 Y:5.00 Z:-0.12 E:0.00 Count X:800 Y:400 Z:-10`; only the first
//! three fields are the logical position.

use autolevel_core::{Position, ProtocolError};

/// Parse a position report into a [`Position`]
pub fn parse_position(response: &str) -> Result<Position, ProtocolError> {
    let malformed = |reason: &str| ProtocolError::MalformedResponse {
        response: response.to_string(),
        reason: reason.to_string(),
    };

    let mut fields = response.split_whitespace();
    let mut axis = || -> Result<f64, ProtocolError> {
        let field = fields
            .next()
            .ok_or_else(|| malformed("expected three position fields"))?;
        let (_, value) = field
            .rsplit_once(':')
            .ok_or_else(|| malformed("position field has no ':'"))?;
        value
            .parse::<f64>()
            .map_err(|_| malformed("position value is not a number"))
    };

    let x = axis()?;
    let y = axis()?;
    let z = axis()?;
    Ok(Position::new(x, y, z))
}

/// Whether a response line is a plain acknowledgment
pub fn is_ok(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case("ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_report() {
        let pos = parse_position("X:10.00 Y:5.00 Z:-0.12 E:0.00 Count X:800 Y:400 Z:-10").unwrap();
        assert_eq!(pos, Position::new(10.0, 5.0, -0.12));
    }

    #[test]
    fn test_parse_uses_text_after_last_colon() {
        let pos = parse_position("ok:X:1 Y:2 Z:3.5").unwrap();
        assert_eq!(pos.z, 3.5);
    }

    #[test]
    fn test_malformed_reports() {
        assert!(matches!(
            parse_position("ok"),
            Err(ProtocolError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_position("X:1 Y:2"),
            Err(ProtocolError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_position("X:1 Y:2 Z:abc"),
            Err(ProtocolError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_is_ok() {
        assert!(is_ok("ok"));
        assert!(is_ok(" OK "));
        assert!(!is_ok("echo:busy: processing"));
    }
}
