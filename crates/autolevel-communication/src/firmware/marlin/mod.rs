//! Marlin firmware support
//!
//! Command table, command/response protocol, and response parsing for
//! Marlin-based machines.

pub mod commands;
pub mod protocol;
pub mod response_parser;

pub use commands::{command_table, render_lines, CommandParams, Literal, LogicalCommand};
pub use protocol::{CommandProtocol, CommandSender, ProtocolConfig};
pub use response_parser::{is_ok, parse_position};
