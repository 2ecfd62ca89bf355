//! UBeaconBuilder -- fluent builder for constructing [`UBeaconController`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, timeouts and logging before the transport is
//! opened and the IO task starts.
//!
//! # Example
//!
//! ```no_run
//! use ubeacon_uart::builder::UBeaconBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> ubeacon_core::Result<()> {
//! let beacon = UBeaconBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .command_timeout(Duration::from_secs(2))
//!     .build()
//!     .await?;
//! println!("firmware {}", beacon.firmware_version().await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ubeacon_core::error::{Error, Result};
use ubeacon_core::events::{DEFAULT_EVENT_CAPACITY, EventBus};
use ubeacon_core::transport::Transport;
use ubeacon_transport::{DEFAULT_BAUD_RATE, SerialTransport};

use crate::controller::UBeaconController;
use crate::io::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_READY_SETTLE, IoConfig};

/// Fluent builder for [`UBeaconController`].
///
/// ```ignore
/// let beacon = UBeaconBuilder::new()
///     .serial_port("/dev/ttyUSB0")
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct UBeaconBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    command_timeout: Duration,
    ready_settle: Duration,
    log_traffic: bool,
    log_raw_input: bool,
    discover_on_build: bool,
    event_capacity: usize,
}

impl UBeaconBuilder {
    pub fn new() -> Self {
        UBeaconBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ready_settle: DEFAULT_READY_SETTLE,
            log_traffic: false,
            log_raw_input: false,
            discover_on_build: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 115200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Response window for a single command (default: 5000ms).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Delay between the device's ready frame and the ready event (default: 200ms).
    pub fn ready_settle(mut self, delay: Duration) -> Self {
        self.ready_settle = delay;
        self
    }

    /// Log every frame sent and received at `debug` level.
    pub fn log_traffic(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    /// Log every raw inbound line at `debug` level, garbage included.
    pub fn log_raw_input(mut self, enabled: bool) -> Self {
        self.log_raw_input = enabled;
        self
    }

    /// Query the device identity right after connecting (default: on).
    ///
    /// Commands gated on a protocol version fail until the version is known.
    pub fn discover_on_build(mut self, enabled: bool) -> Self {
        self.discover_on_build = enabled;
        self
    }

    /// Capacity of the event broadcast channel.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    fn io_config(&self) -> IoConfig {
        IoConfig {
            command_timeout: self.command_timeout,
            ready_settle: self.ready_settle,
            log_traffic: self.log_traffic,
            log_raw_input: self.log_raw_input,
        }
    }

    /// Build a [`UBeaconController`] with a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` or
    /// `SimulatedBeacon` from `ubeacon-test-harness`).
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<UBeaconController> {
        if self.command_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "command_timeout must be greater than zero".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be greater than zero".into(),
            ));
        }

        let events = EventBus::with_capacity(self.event_capacity);
        let controller = UBeaconController::new(transport, self.io_config(), events);
        if self.discover_on_build {
            controller.discover().await?;
        }
        Ok(controller)
    }

    /// Build a [`UBeaconController`] on a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<UBeaconController> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = SerialTransport::open(port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for UBeaconBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubeacon_test_harness::{MockTransport, SimulatedBeacon};

    #[test]
    fn builder_defaults() {
        let b = UBeaconBuilder::new();
        assert_eq!(b.baud_rate, 115_200);
        assert_eq!(b.command_timeout, Duration::from_millis(5000));
        assert_eq!(b.ready_settle, Duration::from_millis(200));
        assert!(b.discover_on_build);
        assert!(!b.log_traffic);
        assert!(b.serial_port.is_none());
    }

    #[test]
    fn builder_chaining() {
        let b = UBeaconBuilder::new()
            .serial_port("/dev/ttyACM0")
            .baud_rate(9600)
            .command_timeout(Duration::from_millis(250))
            .log_traffic(true)
            .log_raw_input(true)
            .discover_on_build(false);
        let config = b.io_config();
        assert_eq!(b.serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(b.baud_rate, 9600);
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert!(config.log_traffic);
        assert!(config.log_raw_input);
    }

    #[tokio::test]
    async fn build_without_port_fails() {
        let result = UBeaconBuilder::new().build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let result = UBeaconBuilder::new()
            .command_timeout(Duration::ZERO)
            .discover_on_build(false)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_runs_discovery() {
        let beacon = UBeaconBuilder::new()
            .build_with_transport(Box::new(SimulatedBeacon::new()))
            .await
            .unwrap();
        let data = beacon.device_data().await.unwrap();
        assert!(data.is_complete());
        assert_eq!(data.uart_protocol_version.as_deref(), Some("0.2.2"));
    }

    #[tokio::test]
    async fn build_without_discovery_sends_nothing() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let beacon = UBeaconBuilder::new()
            .discover_on_build(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert!(handle.sent_data().is_empty());
        assert!(!beacon.device_data().await.unwrap().is_complete());
    }
}
