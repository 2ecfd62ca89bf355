//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts the byte link to a uBeacon. The IO task
//! in `ubeacon-uart` operates on a `Transport` rather than directly on a
//! serial port, so the same code drives real hardware and the mock
//! transports of `ubeacon-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
///
/// Implementations deliver raw bytes; line splitting and `r:` frame
/// extraction happen in the protocol layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Returns once all bytes have been handed to the underlying link.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data and
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if none arrives.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard any input the link has buffered but not yet delivered.
    ///
    /// Best effort; the default does nothing.
    async fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
