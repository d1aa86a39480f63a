//! Marlin command/response protocol
//!
//! Sends one logical command as its literal line sequence and consumes
//! exactly one response line afterwards, regardless of how many lines were
//! sent. Marlin acknowledges every line, so the acknowledgment of the second
//! line of a move is still in flight when `send` returns. With
//! `discard_stale_input` (the default) it is dropped before the next command.

use super::commands::{render_lines, CommandParams, LogicalCommand};
use super::response_parser::parse_position;
use crate::communication::transport::LineTransport;
use async_trait::async_trait;
use autolevel_core::{Position, ProtocolError};
use std::time::Duration;

/// Protocol tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// How long to wait for the response line
    pub read_timeout: Duration,
    /// Drop buffered input before each logical command
    pub discard_stale_input: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            discard_stale_input: true,
        }
    }
}

/// Anything that can execute logical machine commands
#[async_trait]
pub trait CommandSender: Send + Sync {
    /// Send a command and return the firmware's response line
    async fn send(
        &self,
        cmd: LogicalCommand,
        params: Option<CommandParams>,
    ) -> Result<String, ProtocolError>;
}

/// Command protocol over one line transport
pub struct CommandProtocol {
    transport: Box<dyn LineTransport>,
    config: ProtocolConfig,
}

impl CommandProtocol {
    /// Create a protocol with default settings
    pub fn new(transport: Box<dyn LineTransport>) -> Self {
        Self::with_config(transport, ProtocolConfig::default())
    }

    /// Create a protocol with explicit settings
    pub fn with_config(transport: Box<dyn LineTransport>, config: ProtocolConfig) -> Self {
        Self { transport, config }
    }

    /// Current settings
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Name of the underlying port
    pub fn port_name(&self) -> &str {
        self.transport.name()
    }

    /// Send a logical command and read one response line
    pub async fn send(
        &mut self,
        cmd: LogicalCommand,
        params: Option<&CommandParams>,
    ) -> Result<String, ProtocolError> {
        if self.config.discard_stale_input {
            self.transport.discard_pending().await?;
        }

        for line in render_lines(cmd, params) {
            self.transport.write_line(&line).await?;
        }

        let response = self.transport.read_line(self.config.read_timeout).await?;
        let response = response.trim().to_string();
        tracing::debug!("{} -> {}", cmd, response);
        Ok(response)
    }

    /// Ask the machine for its current position
    pub async fn query_position(&mut self) -> Result<Position, ProtocolError> {
        let response = self.send(LogicalCommand::GetPosition, None).await?;
        parse_position(&response)
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        self.transport.close().await?;
        Ok(())
    }
}

#[async_trait]
impl CommandSender for tokio::sync::Mutex<CommandProtocol> {
    async fn send(
        &self,
        cmd: LogicalCommand,
        params: Option<CommandParams>,
    ) -> Result<String, ProtocolError> {
        self.lock().await.send(cmd, params.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::transport::Transport;
    use autolevel_core::ConnectionError;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn protocol(discard_stale_input: bool) -> (CommandProtocol, BufReader<DuplexStream>) {
        let (client, machine) = duplex(1024);
        let config = ProtocolConfig {
            read_timeout: TIMEOUT,
            discard_stale_input,
        };
        let protocol =
            CommandProtocol::with_config(Box::new(Transport::new("test", client)), config);
        (protocol, BufReader::new(machine))
    }

    /// Read `count` lines on the machine side, then answer with `reply`
    async fn machine_reply(
        machine: &mut BufReader<DuplexStream>,
        count: usize,
        reply: &str,
    ) -> Vec<String> {
        let mut received = Vec::new();
        for _ in 0..count {
            let mut line = String::new();
            machine.read_line(&mut line).await.unwrap();
            received.push(line.trim_end().to_string());
        }
        machine.get_mut().write_all(reply.as_bytes()).await.unwrap();
        received
    }

    #[tokio::test]
    async fn test_home_writes_one_line() {
        let (mut protocol, mut machine) = protocol(false);

        let (response, received) = tokio::join!(
            protocol.send(LogicalCommand::Home, None),
            machine_reply(&mut machine, 1, "ok\n")
        );

        assert_eq!(response.unwrap(), "ok");
        assert_eq!(received, vec!["G28"]);
    }

    #[tokio::test]
    async fn test_move_abs_sends_sequence_and_reads_once() {
        let (mut protocol, mut machine) = protocol(false);
        let params = CommandParams::new().x(10.0).y(5.0);

        let (response, received) = tokio::join!(
            protocol.send(LogicalCommand::MoveAbs, Some(&params)),
            machine_reply(&mut machine, 2, "ok\nok\n")
        );

        assert_eq!(response.unwrap(), "ok");
        assert_eq!(received, vec!["G90", "G0 X10.00000000 Y5.00000000"]);

        // The second acknowledgment is still buffered
        let (position, _) = tokio::join!(
            protocol.send(LogicalCommand::GetPosition, None),
            machine_reply(&mut machine, 1, "X:10.00 Y:5.00 Z:0.00\n")
        );
        assert_eq!(position.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_discard_stale_input() {
        let (mut protocol, mut machine) = protocol(true);
        machine.get_mut().write_all(b"ok\n").await.unwrap();

        let (position, received) = tokio::join!(
            protocol.query_position(),
            machine_reply(&mut machine, 1, "X:10.00 Y:5.00 Z:-0.25 E:0.00\n")
        );

        assert_eq!(received, vec!["M114"]);
        assert_eq!(position.unwrap(), Position::new(10.0, 5.0, -0.25));
    }

    #[tokio::test]
    async fn test_default_config_drops_second_acknowledgment() {
        let (client, machine) = duplex(1024);
        let mut protocol = CommandProtocol::new(Box::new(Transport::new("test", client)));
        let mut machine = BufReader::new(machine);
        assert!(protocol.config().discard_stale_input);

        let params = CommandParams::new().z(-0.1);
        let (response, _) = tokio::join!(
            protocol.send(LogicalCommand::MoveRel, Some(&params)),
            machine_reply(&mut machine, 2, "ok\nok\n")
        );
        assert_eq!(response.unwrap(), "ok");

        let (position, received) = tokio::join!(
            protocol.query_position(),
            machine_reply(&mut machine, 1, "X:0.00 Y:0.00 Z:-0.10 E:0.00\n")
        );
        assert_eq!(received, vec!["M114"]);
        assert_eq!(position.unwrap(), Position::new(0.0, 0.0, -0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_propagates_as_transport_error() {
        let (mut protocol, _machine) = protocol(false);

        let err = protocol.send(LogicalCommand::Nop, None).await.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Transport(ConnectionError::ReadTimeout { timeout_ms: 500 })
        );
    }

    #[tokio::test]
    async fn test_shared_sender() {
        let (protocol, mut machine) = protocol(false);
        let shared = tokio::sync::Mutex::new(protocol);
        let sender: &dyn CommandSender = &shared;

        let (response, received) = tokio::join!(
            sender.send(LogicalCommand::MoveRel, Some(CommandParams::new().z(-0.1))),
            machine_reply(&mut machine, 2, "ok\n")
        );

        assert_eq!(response.unwrap(), "ok");
        assert_eq!(received, vec!["G91", "G0 Z-0.10000000"]);
    }
}
