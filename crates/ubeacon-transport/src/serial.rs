//! Serial port transport for uBeacon devices.
//!
//! A uBeacon exposes its UART through a USB-serial bridge (FTDI or CP210x)
//! that shows up as `/dev/ttyUSB*`, `/dev/tty.usbserial-*` or `COMx`. The
//! firmware runs 8N1 at 115200 baud unless its UART settings register says
//! otherwise.
//!
//! # Example
//!
//! ```no_run
//! use ubeacon_transport::SerialTransport;
//! use ubeacon_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> ubeacon_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115200).await?;
//!
//! // Ask for the UART protocol version.
//! transport.send(b"g:0\r\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use ubeacon_core::error::{Error, Result};
use ubeacon_core::transport::Transport;

/// Baud rate the uBeacon firmware ships with.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port configuration.
///
/// The firmware always frames 8N1; only the speed and RTS/CTS are
/// configurable through its UART settings register.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Use RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,
    /// Discard input the OS queued before the port was opened.
    pub discard_stale_input: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            hardware_flow_control: false,
            discard_stale_input: true,
        }
    }
}

impl SerialConfig {
    fn flow_control(&self) -> FlowControl {
        if self.hardware_flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        }
    }
}

/// List serial ports the OS reports, by name.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Transport(format!("failed to enumerate serial ports: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Serial link to a uBeacon.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open `port` at `baud_rate` with 8N1 and no flow control.
    ///
    /// ```no_run
    /// # use ubeacon_transport::SerialTransport;
    /// # async fn example() -> ubeacon_core::Result<()> {
    /// let transport = SerialTransport::open("/dev/tty.usbserial-A9030UTP", 115200).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    ///
    /// With `discard_stale_input` set, boot chatter queued by the OS is
    /// dropped so it is never mistaken for a response.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            hardware_flow_control = config.hardware_flow_control,
            "opening uBeacon UART"
        );

        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(config.flow_control())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open serial port");
                Error::Transport(format!("failed to open serial port {port}: {e}"))
            })?;

        if config.discard_stale_input {
            if let Err(e) = stream.clear(ClearBuffer::Input) {
                tracing::warn!(port = %port, error = %e, "could not discard stale input");
            }
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "uBeacon UART open");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    /// Name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = %String::from_utf8_lossy(data).escape_debug(),
            "sending"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "write failed");
            map_io_error(e)
        })?;
        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "flush failed");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::warn!(port = %self.port_name, "serial port reported EOF");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "received");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "read failed");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn clear_input(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| Error::Transport(format!("failed to clear input: {e}")))?;
        tracing::debug!(port = %self.port_name, "input buffer cleared");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "flush before close failed"
                );
            }
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_config_defaults_match_firmware() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert!(!config.hardware_flow_control);
        assert!(config.discard_stale_input);
        assert_eq!(config.flow_control(), FlowControl::None);
    }

    #[test]
    fn rts_cts_maps_to_hardware_flow_control() {
        let config = SerialConfig {
            hardware_flow_control: true,
            ..Default::default()
        };
        assert_eq!(config.flow_control(), FlowControl::Hardware);
    }

    #[tokio::test]
    async fn open_missing_port_is_transport_error() {
        let result = SerialTransport::open("/dev/ubeacon-does-not-exist", 115_200).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
