//! Transport abstraction
//!
//! A `Device` is one bidirectional byte stream to an MCU; a
//! `DeviceFactory` enumerates candidate endpoints and opens them.
//! Three factories exist: local serial, SSH-tunneled serial, and
//! TCP-proxied serial. All three satisfy the same read/write/flush
//! contract, selected at configuration time via trait objects.

use printhost_core::{CancelToken, Result};

/// Immutable description of one physical/logical MCU connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Configured alias this device matched (e.g. "laser").
    pub alias: String,
    /// Human-readable name of the connection.
    pub name: String,
    /// Endpoint path ("/dev/ttyACM0", remote path, or proxy endpoint).
    pub endpoint: String,
    /// Baud rate to apply when opening.
    pub baud: u32,
}

impl DeviceInfo {
    /// Create a device info with the name derived from the endpoint
    pub fn new(alias: impl Into<String>, endpoint: impl Into<String>, baud: u32) -> Self {
        let alias = alias.into();
        let endpoint = endpoint.into();
        let name = format!("{} ({})", alias, endpoint);
        Self {
            alias,
            name,
            endpoint,
            baud,
        }
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.name, self.baud)
    }
}

/// Bidirectional byte stream to one MCU
///
/// Reads block until at least one byte is available and return 0 only
/// at end of stream. Dropping the device closes the transport.
pub trait Device: Send {
    /// Read available bytes into `buf`, returning the count (0 = end of stream)
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data` to the device
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush any buffered outgoing bytes
    fn flush(&mut self) -> Result<()>;

    /// Identifier for logging
    fn name(&self) -> &str;
}

/// Factory for one transport kind
///
/// Factories never retry: connection, authentication and open failures
/// propagate to the caller, which owns the retry policy.
pub trait DeviceFactory: Send + Sync {
    /// Enumerate endpoints matching the configured aliases
    fn device_names(&self, cancel: &CancelToken) -> Result<Vec<DeviceInfo>>;

    /// Open the transport described by `info`
    fn open(&self, info: &DeviceInfo, cancel: &CancelToken) -> Result<Box<dyn Device>>;
}
