//! Serial links to the machine and the touch-off switch

pub mod probe_signal;
pub mod serial;
pub mod transport;

pub use probe_signal::{ProbeSignal, Trigger, TriggerStream};
pub use serial::{list_ports, open_serial_stream, SerialPortInfo};
pub use transport::{LineTransport, SerialTransport, Transport};
