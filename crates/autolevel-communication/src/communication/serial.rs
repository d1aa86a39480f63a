//! Serial port discovery and opening
//!
//! Provides port enumeration for picking the CNC and touch-off switch
//! devices, and opens ports as async streams for the line transport and the
//! probe signal.
//!
//! Supports:
//! - Port enumeration with USB metadata
//! - Filtering to CNC-like device names
//! - Mapping open failures onto typed connection errors

use autolevel_core::{ConnectionError, Error, Result};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

impl std::fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.port_name, self.description)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        Ok(())
    }
}

/// List available serial ports on the system
///
/// Returns the ports that look like a CNC controller or a microcontroller
/// acting as a touch-off switch:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .filter(|port| is_valid_cnc_port(&port.port_name))
            .map(|port| {
                let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

                match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb_info) => {
                        let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                        if let Some(ref mfg) = usb_info.manufacturer {
                            info = info.with_manufacturer(mfg);
                        }
                        if let Some(ref serial) = usb_info.serial_number {
                            info = info.with_serial_number(serial);
                        }
                        info
                    }
                    _ => info,
                }
            })
            .collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(Error::other(format!("Failed to enumerate ports: {}", e)))
        }
    }
}

/// Check if a port name matches CNC controller patterns
fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Open a serial port as an async stream (8N1, no flow control)
pub fn open_serial_stream(
    path: &str,
    baud_rate: u32,
) -> std::result::Result<SerialStream, ConnectionError> {
    tokio_serial::new(path, baud_rate)
        .open_native_async()
        .map_err(|e| {
            tracing::warn!("Failed to open serial port {}: {}", path, e);
            map_open_error(path, e)
        })
}

fn map_open_error(path: &str, error: tokio_serial::Error) -> ConnectionError {
    use std::io::ErrorKind;
    use tokio_serial::ErrorKind as SerialErrorKind;

    match error.kind() {
        SerialErrorKind::NoDevice | SerialErrorKind::Io(ErrorKind::NotFound) => {
            ConnectionError::PortNotFound {
                port: path.to_string(),
            }
        }
        SerialErrorKind::Io(ErrorKind::PermissionDenied)
        | SerialErrorKind::Io(ErrorKind::ResourceBusy)
        | SerialErrorKind::Io(ErrorKind::AddrInUse) => ConnectionError::PortInUse {
            port: path.to_string(),
        },
        _ => ConnectionError::FailedToOpen {
            port: path.to_string(),
            reason: error.description,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_name_filter() {
        assert!(is_valid_cnc_port("COM3"));
        assert!(is_valid_cnc_port("/dev/ttyUSB0"));
        assert!(is_valid_cnc_port("/dev/ttyACM1"));
        assert!(is_valid_cnc_port("/dev/cu.usbmodem14101"));
        assert!(!is_valid_cnc_port("COM"));
        assert!(!is_valid_cnc_port("COMX"));
        assert!(!is_valid_cnc_port("/dev/ttyS0"));
    }

    #[test]
    fn test_open_error_mapping() {
        let missing = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "gone");
        assert_eq!(
            map_open_error("/dev/ttyUSB9", missing),
            ConnectionError::PortNotFound {
                port: "/dev/ttyUSB9".to_string()
            }
        );

        let busy = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::ResourceBusy),
            "busy",
        );
        assert!(matches!(
            map_open_error("COM3", busy),
            ConnectionError::PortInUse { .. }
        ));

        let other = tokio_serial::Error::new(tokio_serial::ErrorKind::InvalidInput, "bad baud");
        assert_eq!(
            map_open_error("COM3", other),
            ConnectionError::FailedToOpen {
                port: "COM3".to_string(),
                reason: "bad baud".to_string()
            }
        );
    }

    #[test]
    fn test_port_info_display() {
        let info = SerialPortInfo::new("/dev/ttyUSB0", "USB Arduino Serial Port")
            .with_usb_ids(0x2341, 0x0043);
        assert_eq!(
            info.to_string(),
            "/dev/ttyUSB0 (USB Arduino Serial Port) [2341:0043]"
        );
    }
}
