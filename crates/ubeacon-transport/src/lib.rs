//! Transport implementations for the uBeacon driver.
//!
//! This crate provides [`SerialTransport`], the implementation of the
//! [`Transport`](ubeacon_core::Transport) trait used against real hardware.
//! Tests and the simulator use the transports in `ubeacon-test-harness`
//! instead.
//!
//! # Example
//!
//! ```no_run
//! use ubeacon_transport::SerialTransport;
//! use ubeacon_core::transport::Transport;
//!
//! # async fn example() -> ubeacon_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115200).await?;
//! transport.send(b"g:1\r\n").await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{DEFAULT_BAUD_RATE, SerialConfig, SerialTransport, available_ports};
