//! Error handling for printhost
//!
//! Provides error types for all layers of the controller:
//! - Transport errors (serial, SSH, proxy connections)
//! - Schedule errors (command slot discipline)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Represents errors related to opening and using MCU byte streams.
/// Transport errors are terminal for the factory or reader that raised
/// them; retry policy belongs to the owning client layer.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The underlying byte stream returned zero bytes
    #[error("End of stream")]
    EndOfStream,

    /// No device path matched the configured alias pattern
    #[error("No device matches pattern '{pattern}'")]
    DeviceNotFound {
        /// The alias pattern that matched nothing.
        pattern: String,
    },

    /// Failed to open an endpoint
    #[error("Failed to open {endpoint}: {reason}")]
    FailedToOpen {
        /// The endpoint path that failed to open.
        endpoint: String,
        /// The reason the open failed.
        reason: String,
    },

    /// SSH connection or authentication failure
    #[error("SSH authentication/connection to {host} failed: {reason}")]
    AuthFailed {
        /// The remote host.
        host: String,
        /// The reason reported by the SSH client.
        reason: String,
    },

    /// A remote command run over SSH failed
    #[error("Remote command '{command}' failed: {reason}")]
    RemoteCommand {
        /// The command that was executed remotely.
        command: String,
        /// stderr or exit status description.
        reason: String,
    },

    /// Proxy wire protocol violation
    #[error("Proxy protocol error: {reason}")]
    Protocol {
        /// The reason for the protocol violation.
        reason: String,
    },

    /// Baud rate could not be applied
    #[error("Baud rate {baud} not supported on {endpoint}")]
    UnsupportedBaudRate {
        /// The requested baud rate.
        baud: u32,
        /// The endpoint the rate was requested for.
        endpoint: String,
    },

    /// Operation was cancelled before completion
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io {
            reason: e.to_string(),
        }
    }
}

/// Schedule error type
///
/// Errors raised by the command scheduling discipline. Misuse of the
/// master-queue lock is a programming invariant and is asserted, not
/// represented here.
#[derive(Error, Debug, Clone)]
pub enum ScheduleError {
    /// The shared device clock has not been established yet
    #[error("Device clock not established")]
    ClockNotSet,

    /// Command could not be enqueued
    #[error("Command rejected: {reason}")]
    CommandRejected {
        /// The reason the command was rejected.
        reason: String,
    },
}

/// Main error type for printhost
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Schedule error
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is the end-of-stream signal
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::Transport(TransportError::EndOfStream))
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Cancelled))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_of_stream_classification() {
        let err: Error = TransportError::EndOfStream.into();
        assert!(err.is_end_of_stream());
        assert!(err.is_transport_error());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::from(io);
        assert!(matches!(err, TransportError::Io { .. }));
    }

    #[test]
    fn test_display() {
        let err = TransportError::FailedToOpen {
            endpoint: "/dev/ttyACM0".to_string(),
            reason: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open /dev/ttyACM0: busy");
    }
}
