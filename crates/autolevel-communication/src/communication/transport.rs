//! Line-oriented transport over a serial stream
//!
//! One open connection to the machine. Lines are written with a trailing
//! newline and drained before the write is reported complete; reads return
//! a single line without its delimiter. Bytes that arrive unsolicited stay
//! buffered until a `read_line` consumes them.

use crate::communication::serial::open_serial_stream;
use async_trait::async_trait;
use autolevel_core::ConnectionError;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio_serial::SerialStream;

/// Line-level access to one open connection
#[async_trait]
pub trait LineTransport: Send {
    /// Write `line` followed by a newline and wait until it is drained
    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError>;

    /// Read the next line, excluding the delimiter
    async fn read_line(&mut self, timeout: Duration) -> Result<String, ConnectionError>;

    /// Drop anything received but not yet consumed
    async fn discard_pending(&mut self) -> Result<usize, ConnectionError>;

    /// Release the connection
    async fn close(&mut self) -> Result<(), ConnectionError>;

    /// Port name for logging
    fn name(&self) -> &str;
}

/// Transport over any async byte stream
pub struct Transport<S> {
    name: String,
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    /// Bytes of a line whose delimiter has not arrived yet
    pending: Vec<u8>,
}

/// Transport over a real serial port
pub type SerialTransport = Transport<SerialStream>;

impl SerialTransport {
    /// Open a serial port at the given baud rate
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ConnectionError> {
        let stream = open_serial_stream(path, baud_rate)?;
        tracing::info!("Opened CNC port {} at {} baud", path, baud_rate);
        Ok(Self::new(path, stream))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Wrap an already open stream
    pub fn new(name: impl Into<String>, stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            name: name.into(),
            reader: BufReader::new(reader),
            writer,
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.pending.clear();
        line
    }
}

#[async_trait]
impl<S> LineTransport for Transport<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        tracing::debug!("{} >> {}", self.name, line);
        let write_error = |e: std::io::Error| ConnectionError::Write {
            reason: e.to_string(),
        };

        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(write_error)?;
        self.writer.flush().await.map_err(write_error)
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, ConnectionError> {
        let read = tokio::time::timeout(
            timeout,
            self.reader.read_until(b'\n', &mut self.pending),
        )
        .await;

        match read {
            // read_until keeps partial bytes in `pending`, so the next call resumes the line
            Err(_) => Err(ConnectionError::ReadTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(ConnectionError::ConnectionLost {
                reason: e.to_string(),
            }),
            Ok(Ok(0)) if self.pending.is_empty() => Err(ConnectionError::ConnectionLost {
                reason: "end of stream".to_string(),
            }),
            Ok(Ok(_)) => {
                let line = self.take_line();
                tracing::debug!("{} << {}", self.name, line);
                Ok(line)
            }
        }
    }

    async fn discard_pending(&mut self) -> Result<usize, ConnectionError> {
        let mut discarded = self.pending.len() + self.reader.buffer().len();
        self.pending.clear();
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);

        let mut scratch = [0u8; 256];
        loop {
            match tokio::time::timeout(Duration::ZERO, self.reader.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => {
                    return Err(ConnectionError::ConnectionLost {
                        reason: e.to_string(),
                    })
                }
            }
        }

        if discarded > 0 {
            tracing::debug!("{} discarded {} stale bytes", self.name, discarded);
        }
        Ok(discarded)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        tracing::info!("Closing {}", self.name);
        self.writer
            .shutdown()
            .await
            .map_err(|e| ConnectionError::Write {
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let (client, mut machine) = duplex(256);
        let mut transport = Transport::new("test", client);

        transport.write_line("G28").await.unwrap();

        let mut buf = [0u8; 4];
        machine.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"G28\n");
    }

    #[tokio::test]
    async fn test_read_line_strips_delimiters() {
        let (client, mut machine) = duplex(256);
        let mut transport = Transport::new("test", client);

        machine.write_all(b"ok\r\nX:1.00 Y:2.00 Z:3.00\n").await.unwrap();

        assert_eq!(transport.read_line(TIMEOUT).await.unwrap(), "ok");
        assert_eq!(
            transport.read_line(TIMEOUT).await.unwrap(),
            "X:1.00 Y:2.00 Z:3.00"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_line_survives_timeout() {
        let (client, mut machine) = duplex(256);
        let mut transport = Transport::new("test", client);

        machine.write_all(b"o").await.unwrap();
        assert_eq!(
            transport.read_line(TIMEOUT).await,
            Err(ConnectionError::ReadTimeout { timeout_ms: 200 })
        );

        machine.write_all(b"k\n").await.unwrap();
        assert_eq!(transport.read_line(TIMEOUT).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_closed_peer_is_connection_lost() {
        let (client, machine) = duplex(256);
        let mut transport = Transport::new("test", client);
        drop(machine);

        assert!(matches!(
            transport.read_line(TIMEOUT).await,
            Err(ConnectionError::ConnectionLost { .. })
        ));
    }

    #[tokio::test]
    async fn test_discard_pending_drops_unread_lines() {
        let (client, mut machine) = duplex(256);
        let mut transport = Transport::new("test", client);

        machine.write_all(b"ok\nok\n").await.unwrap();
        assert_eq!(transport.discard_pending().await.unwrap(), 6);

        machine.write_all(b"fresh\n").await.unwrap();
        assert_eq!(transport.read_line(TIMEOUT).await.unwrap(), "fresh");
    }
}
