//! Local serial transport
//!
//! Opens OS serial devices directly. Devices are discovered by matching
//! configured alias wildcards against `serialport` enumeration and the
//! filesystem. The port is opened at a placeholder baud and the real
//! rate is applied afterwards with the `TCGETS2`/`TCSETS2` ioctl pair,
//! because the high-level serial API cannot express arbitrary
//! non-standard rates.

use std::io::{Read, Write};
use std::time::Duration;

use printhost_core::{CancelToken, Result, TransportError};

use crate::alias::{self, Alias};
use crate::device::{Device, DeviceFactory, DeviceInfo};

/// Baud the port is initially opened at before the ioctl override
const PLACEHOLDER_BAUD: u32 = 9600;

/// Read timeout; timed-out reads are retried, they are not end of stream
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Factory for directly attached serial MCUs
pub struct SerialFactory {
    aliases: Vec<Alias>,
}

impl SerialFactory {
    /// Create a factory resolving the given aliases
    pub fn new(aliases: Vec<Alias>) -> Self {
        Self { aliases }
    }

    /// Candidate endpoint paths visible on this host
    fn discover_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                tracing::warn!("Serial port enumeration failed: {}", e);
                Vec::new()
            }
        };

        // Stable paths under /dev/serial are not reported by the
        // enumerator on every platform; scan the alias directories too.
        for alias in &self.aliases {
            if let Some(dir) = directory_of(&alias.pattern) {
                if let Ok(entries) = std::fs::read_dir(dir) {
                    for entry in entries.flatten() {
                        if let Some(path) = entry.path().to_str() {
                            paths.push(path.to_string());
                        }
                    }
                }
            }
        }
        paths.sort();
        paths.dedup();
        paths
    }
}

impl DeviceFactory for SerialFactory {
    fn device_names(&self, cancel: &CancelToken) -> Result<Vec<DeviceInfo>> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        Ok(alias::resolve(&self.aliases, &self.discover_paths()))
    }

    fn open(&self, info: &DeviceInfo, cancel: &CancelToken) -> Result<Box<dyn Device>> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let port = serialport::new(&info.endpoint, PLACEHOLDER_BAUD)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open_native()
            .map_err(|e| TransportError::FailedToOpen {
                endpoint: info.endpoint.clone(),
                reason: e.to_string(),
            })?;

        apply_baud(&port, info)?;
        tracing::info!("Opened {} at {} baud", info.endpoint, info.baud);
        Ok(Box::new(LocalSerialDevice {
            port,
            name: info.name.clone(),
        }))
    }
}

/// Longest literal directory prefix of a wildcard pattern
fn directory_of(pattern: &str) -> Option<&str> {
    let wildcard = pattern.find(['*', '?'])?;
    pattern[..wildcard].rfind('/').map(|i| &pattern[..i])
}

/// Apply the requested baud with the termios2 ioctl pair
///
/// Reads the current termios2 configuration, patches the speed fields
/// to `BOTHER` with the raw rate, and writes it back.
#[cfg(target_os = "linux")]
fn apply_baud(port: &serialport::TTYPort, info: &DeviceInfo) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = port.as_raw_fd();
    unsafe {
        let mut tio: libc::termios2 = std::mem::zeroed();
        if libc::ioctl(fd, libc::TCGETS2, &mut tio) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        tio.c_cflag &= !(libc::CBAUD | libc::CBAUDEX);
        tio.c_cflag |= libc::BOTHER;
        tio.c_ispeed = info.baud;
        tio.c_ospeed = info.baud;
        if libc::ioctl(fd, libc::TCSETS2, &tio) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn apply_baud(port: &serialport::TTYPort, info: &DeviceInfo) -> Result<()> {
    use serialport::SerialPort;

    // No termios2 off Linux; only rates the driver accepts will work.
    let mut port = port
        .try_clone_native()
        .map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;
    port.set_baud_rate(info.baud)
        .map_err(|_| TransportError::UnsupportedBaudRate {
            baud: info.baud,
            endpoint: info.endpoint.clone(),
        })?;
    Ok(())
}

/// Directly opened serial device
struct LocalSerialDevice {
    port: serialport::TTYPort,
    name: String,
}

impl Device for LocalSerialDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.port.read(buf) {
                Ok(n) => return Ok(n),
                // A timed-out read only means no bytes arrived yet.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::from(e).into()),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::from(e).into())
    }

    fn flush(&mut self) -> Result<()> {
        self.port
            .flush()
            .map_err(|e| TransportError::from(e).into())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_of() {
        assert_eq!(
            directory_of("/dev/serial/by-id/usb-MCU_*"),
            Some("/dev/serial/by-id")
        );
        assert_eq!(directory_of("/dev/ttyACM*"), Some("/dev"));
        assert_eq!(directory_of("/dev/ttyACM0"), None);
        assert_eq!(directory_of("relative?"), None);
    }

    #[test]
    fn test_open_missing_endpoint_fails() {
        let factory = SerialFactory::new(vec![]);
        let info = DeviceInfo::new("ghost", "/dev/printhost-test-does-not-exist", 115200);
        let err = factory
            .open(&info, &CancelToken::new())
            .err()
            .expect("open must fail");
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_cancelled_enumeration() {
        let factory = SerialFactory::new(vec![Alias::parse("any", "/dev/ttyACM*")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = factory.device_names(&cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
