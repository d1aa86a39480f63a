//! Marlin command table
//!
//! Maps the closed set of logical machine commands onto the literal G-code
//! lines Marlin understands, and formats numeric parameters for them.

use autolevel_core::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical machine commands
///
/// The discriminants match the numeric command ids used by older front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalCommand {
    /// Dwell for zero time; a cheap round trip
    Nop = 0,
    /// Make the current position the work origin
    SetWork = 1,
    /// Home all axes
    Home = 2,
    /// Rapid move to absolute coordinates
    MoveAbs = 3,
    /// Rapid move relative to the current position
    MoveRel = 4,
    /// Rapid move to the work origin
    GoToOrigin = 5,
    /// Rapid move over the work origin without touching Z
    GoToOriginZ = 6,
    /// Report the current position
    GetPosition = 7,
}

impl LogicalCommand {
    /// All commands in discriminant order
    pub const ALL: [LogicalCommand; 8] = [
        LogicalCommand::Nop,
        LogicalCommand::SetWork,
        LogicalCommand::Home,
        LogicalCommand::MoveAbs,
        LogicalCommand::MoveRel,
        LogicalCommand::GoToOrigin,
        LogicalCommand::GoToOriginZ,
        LogicalCommand::GetPosition,
    ];

    /// Command name as used on the wire between front ends
    pub fn name(&self) -> &'static str {
        match self {
            LogicalCommand::Nop => "NOP",
            LogicalCommand::SetWork => "SET_WORK",
            LogicalCommand::Home => "HOME",
            LogicalCommand::MoveAbs => "MOVE_ABS",
            LogicalCommand::MoveRel => "MOVE_REL",
            LogicalCommand::GoToOrigin => "GO_TO_ORIGIN",
            LogicalCommand::GoToOriginZ => "GO_TO_ORIGIN_Z",
            LogicalCommand::GetPosition => "GET_POSITION",
        }
    }

    /// Whether the command takes a parameter string
    pub fn takes_params(&self) -> bool {
        command_table(*self)
            .iter()
            .any(|literal| matches!(literal, Literal::WithParams(_)))
    }
}

impl fmt::Display for LogicalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        LogicalCommand::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ProtocolError::InvalidCommand {
                command: s.to_string(),
            })
    }
}

impl TryFrom<u8> for LogicalCommand {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        LogicalCommand::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| ProtocolError::InvalidCommand {
                command: value.to_string(),
            })
    }
}

/// One entry of a command's literal sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    /// Sent verbatim
    Fixed(&'static str),
    /// Sent with the formatted parameter string appended
    WithParams(&'static str),
}

/// Literal lines for a logical command, in send order
pub fn command_table(cmd: LogicalCommand) -> &'static [Literal] {
    use Literal::*;

    match cmd {
        LogicalCommand::Nop => &[Fixed("G4 P0")],
        LogicalCommand::SetWork => &[Fixed("G92 X0 Y0 Z0 B0")],
        LogicalCommand::Home => &[Fixed("G28")],
        LogicalCommand::MoveAbs => &[Fixed("G90"), WithParams("G0")],
        LogicalCommand::MoveRel => &[Fixed("G91"), WithParams("G0")],
        LogicalCommand::GoToOrigin => &[Fixed("G90"), Fixed("G0 X0 Y0 Z0")],
        LogicalCommand::GoToOriginZ => &[Fixed("G90"), Fixed("G0 X0 Y0")],
        LogicalCommand::GetPosition => &[Fixed("M114")],
    }
}

/// Optional numeric parameters for a command
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandParams {
    /// X coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Z coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Feed rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f: Option<f64>,
    /// Spindle speed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<f64>,
}

impl CommandParams {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set X
    pub fn x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    /// Set Y
    pub fn y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    /// Set Z
    pub fn z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// Set feed rate
    pub fn f(mut self, f: f64) -> Self {
        self.f = Some(f);
        self
    }

    /// Set spindle speed
    pub fn s(mut self, s: f64) -> Self {
        self.s = Some(s);
        self
    }

    /// Whether no parameter is set
    pub fn is_empty(&self) -> bool {
        self.to_param_string().is_empty()
    }

    /// Format the set parameters as `X<n> Y<n> ...` with 8 decimals
    pub fn to_param_string(&self) -> String {
        [
            ('X', self.x),
            ('Y', self.y),
            ('Z', self.z),
            ('F', self.f),
            ('S', self.s),
        ]
        .into_iter()
        .filter_map(|(axis, value)| value.map(|v| format!("{}{:.8}", axis, v)))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Render the literal lines for a command and its parameters
pub fn render_lines(cmd: LogicalCommand, params: Option<&CommandParams>) -> Vec<String> {
    let params = params.map(CommandParams::to_param_string).unwrap_or_default();

    command_table(cmd)
        .iter()
        .map(|literal| match literal {
            Literal::Fixed(line) => line.to_string(),
            Literal::WithParams(line) if params.is_empty() => line.to_string(),
            Literal::WithParams(line) => format!("{} {}", line, params),
        })
        .collect()
}
