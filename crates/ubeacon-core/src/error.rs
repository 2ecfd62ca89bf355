//! Error types for the uBeacon driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, protocol-version
//! gating, timeouts and payload decode failures are all captured here.

use crate::eddystone::EddystoneError;

/// The error type for all uBeacon operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with something the driver cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A transport read produced no data within its deadline.
    ///
    /// The IO task treats this as "idle" and keeps polling.
    #[error("operation timed out")]
    Timeout,

    /// No response arrived for `opcode` within the command timeout.
    ///
    /// Usually means UART is disabled on the board or the baud rate is wrong.
    #[error("receiving response for cmd=0x{opcode:02x} timed out; is UART enabled on the board?")]
    ResponseTimeout {
        /// Opcode of the request that timed out.
        opcode: u8,
    },

    /// The command needs a newer UART protocol than the device reported.
    ///
    /// Reported before anything is written to the transport.
    #[error("command {command} requires UART protocol {required}, device reports {}", .actual.as_deref().unwrap_or("unknown"))]
    VersionUnsupported {
        /// Logical command name.
        command: &'static str,
        /// Minimum protocol version required by the command.
        required: &'static str,
        /// Protocol version reported by the device, if known.
        actual: Option<String>,
    },

    /// A newer request for the same opcode evicted this one before it resolved.
    #[error("request for cmd=0x{opcode:02x} superseded by a newer request")]
    Superseded {
        /// Opcode whose pending slot was overwritten.
        opcode: u8,
    },

    /// A payload could not be decoded (malformed hex, wrong length, bad BCD).
    #[error("decode error: {0}")]
    Decode(String),

    /// Eddystone-URL encode/decode failure.
    #[error(transparent)]
    Eddystone(#[from] EddystoneError),

    /// An invalid parameter was passed to a device command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the device (IO task gone or transport closed).
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "operation timed out");
    }

    #[test]
    fn error_display_response_timeout_names_opcode() {
        let e = Error::ResponseTimeout { opcode: 0x68 };
        assert_eq!(
            e.to_string(),
            "receiving response for cmd=0x68 timed out; is UART enabled on the board?"
        );
    }

    #[test]
    fn error_display_version_unsupported() {
        let e = Error::VersionUnsupported {
            command: "eddystone_url",
            required: "0.2.1",
            actual: Some("0.1.0".into()),
        };
        assert_eq!(
            e.to_string(),
            "command eddystone_url requires UART protocol 0.2.1, device reports 0.1.0"
        );

        let e = Error::VersionUnsupported {
            command: "mesh_stats",
            required: "0.2.1",
            actual: None,
        };
        assert!(e.to_string().ends_with("device reports unknown"));
    }

    #[test]
    fn error_display_superseded() {
        let e = Error::Superseded { opcode: 0x5e };
        assert_eq!(
            e.to_string(),
            "request for cmd=0x5e superseded by a newer request"
        );
    }

    #[test]
    fn error_from_eddystone_is_transparent() {
        let e: Error = EddystoneError::UnsupportedScheme.into();
        assert_eq!(
            e.to_string(),
            r#"Only "http://" and "https://" URLs can be encoded"#
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
