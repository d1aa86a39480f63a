//! # Autolevel Communication
//!
//! Serial links and the firmware command protocol for Autolevel.
//! The CNC link is a line-oriented request/response transport; the touch-off
//! switch is a second, receive-only link that delivers trigger edges.
//! Commands are expressed as a closed set of logical commands and mapped to
//! Marlin G-code.

pub mod communication;
pub mod firmware;

pub use communication::{
    list_ports, LineTransport, ProbeSignal, SerialPortInfo, SerialTransport, Transport, Trigger,
    TriggerStream,
};
pub use firmware::marlin::{
    parse_position, CommandParams, CommandProtocol, CommandSender, LogicalCommand,
    ProtocolConfig,
};
