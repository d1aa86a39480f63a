//! Touch-off switch signal
//!
//! The switch is a second serial device that writes a few bytes whenever the
//! tool closes the circuit against the work surface. Each chunk of bytes is
//! one trigger edge. There is no request/response traffic on this link.

use crate::communication::serial::open_serial_stream;
use autolevel_core::ConnectionError;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Buffered edges per subscriber before older ones are folded into a lag count
const TRIGGER_BUFFER: usize = 64;

/// A single touch edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger;

/// An open touch-off switch connection
pub struct ProbeSignal {
    name: String,
    /// Never read; only used to mint new subscriptions
    template: broadcast::Receiver<Trigger>,
    shutdown: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ProbeSignal {
    /// Open the switch's serial port and start listening for edges
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ConnectionError> {
        let stream = open_serial_stream(path, baud_rate)?;
        tracing::info!("Opened switch port {} at {} baud", path, baud_rate);
        Ok(Self::from_reader(path, stream))
    }

    /// Listen for edges on an already open byte stream
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_reader<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let name = name.into();
        let (sender, template) = broadcast::channel(TRIGGER_BUFFER);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(read_edges(name.clone(), reader, sender, shutdown.clone()));

        Self {
            name,
            template,
            shutdown,
            reader: Mutex::new(Some(handle)),
        }
    }

    /// Start a new stream of edges arriving from now on
    pub fn subscribe(&self) -> TriggerStream {
        TriggerStream::new(self.template.resubscribe())
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the reader task is still listening
    pub fn is_open(&self) -> bool {
        self.reader
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop listening and release the port
    ///
    /// Subscribers observe the end of their stream.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Switch reader for {} ended abnormally: {}", self.name, e);
            }
        }
        tracing::info!("Closed switch port {}", self.name);
    }
}

impl Drop for ProbeSignal {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_edges<R>(
    name: String,
    mut reader: R,
    sender: broadcast::Sender<Trigger>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::warn!("Switch port {} reached end of stream", name);
                    break;
                }
                Ok(n) => {
                    tracing::debug!("Switch {} triggered ({} bytes)", name, n);
                    // No subscribers is fine; the edge is simply unobserved
                    let _ = sender.send(Trigger);
                }
                Err(e) => {
                    tracing::error!("Switch port {} read failed: {}", name, e);
                    break;
                }
            },
        }
    }
}

/// Lazy, infinite sequence of trigger edges for one subscriber
///
/// Ends only when the switch connection closes.
pub struct TriggerStream {
    receiver: broadcast::Receiver<Trigger>,
}

impl TriggerStream {
    /// Wrap a broadcast receiver
    pub fn new(receiver: broadcast::Receiver<Trigger>) -> Self {
        Self { receiver }
    }

    /// Wait for the next edge; `None` once the connection has closed
    pub async fn next(&mut self) -> Option<Trigger> {
        match self.receiver.recv().await {
            Ok(trigger) => Some(trigger),
            // Edges were missed, but the switch did fire
            Err(broadcast::error::RecvError::Lagged(_)) => Some(Trigger),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Count edges that arrived since the last call without waiting
    ///
    /// Returns `ConnectionLost` when the connection has closed and no edges
    /// are left to report.
    pub fn drain(&mut self) -> Result<u64, ConnectionError> {
        let mut edges = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(_) => edges += 1,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => edges += missed,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(edges),
                Err(broadcast::error::TryRecvError::Closed) if edges > 0 => return Ok(edges),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(ConnectionError::ConnectionLost {
                        reason: "switch signal closed".to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn test_each_chunk_is_one_edge() {
        let (reader, mut switch) = duplex(64);
        let signal = ProbeSignal::from_reader("switch", reader);
        let mut stream = signal.subscribe();

        switch.write_all(b"T\n").await.unwrap();
        assert_eq!(stream.next().await, Some(Trigger));
    }

    #[tokio::test]
    async fn test_many_subscribers() {
        let (reader, mut switch) = duplex(64);
        let signal = ProbeSignal::from_reader("switch", reader);
        let mut streams: Vec<_> = (0..100).map(|_| signal.subscribe()).collect();

        switch.write_all(b"1").await.unwrap();
        for stream in streams.iter_mut() {
            assert_eq!(stream.next().await, Some(Trigger));
        }
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let (reader, _switch) = duplex(64);
        let signal = ProbeSignal::from_reader("switch", reader);
        let mut stream = signal.subscribe();
        assert!(signal.is_open());

        signal.close().await;
        assert!(!signal.is_open());
        assert_eq!(stream.next().await, None);
        assert!(stream.drain().is_err());
    }

    #[tokio::test]
    async fn test_drain_counts_without_waiting() {
        let (sender, receiver) = broadcast::channel(8);
        let mut stream = TriggerStream::new(receiver);

        assert_eq!(stream.drain().unwrap(), 0);
        sender.send(Trigger).unwrap();
        sender.send(Trigger).unwrap();
        assert_eq!(stream.drain().unwrap(), 2);
        assert_eq!(stream.drain().unwrap(), 0);

        sender.send(Trigger).unwrap();
        drop(sender);
        assert_eq!(stream.drain().unwrap(), 1);
        assert!(stream.drain().is_err());
    }
}
