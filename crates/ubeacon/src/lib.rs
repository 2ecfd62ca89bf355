//! # ubeacon -- Host-side driver for uBeacon BLE beacons
//!
//! `ubeacon` is an asynchronous Rust library for configuring and monitoring
//! uBeacon devices over their UART interface. It reads and writes every
//! register the firmware exposes (iBeacon identity, Eddystone URL, LED, RTC,
//! mesh settings), sends mesh messages and reports the events the device
//! pushes on its own.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ubeacon::UBeaconBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let beacon = UBeaconBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     println!("firmware {}", beacon.firmware_version().await?);
//!     beacon.set_led(1).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                          |
//! |------------------------|--------------------------------------------------|
//! | `ubeacon-core`         | Codecs, registers, events, errors, [`Transport`] |
//! | `ubeacon-transport`    | Serial port transport                            |
//! | `ubeacon-uart`         | Framing, correlation, decoding, device facade    |
//! | **`ubeacon`**          | This facade crate -- re-exports everything       |
//!
//! One IO task owns the serial port. Each request waits in a slot keyed by
//! its opcode until the device answers or the command timeout fires; a
//! second request on a busy opcode replaces the first, which then fails
//! with [`Error::Superseded`].
//!
//! ## Events
//!
//! ```no_run
//! use ubeacon::{BeaconEvent, EventKind, UBeaconController};
//! # async fn example(beacon: &UBeaconController) {
//! let mut buttons = beacon.subscribe_to(&[EventKind::Button]);
//! while let Some(event) = buttons.recv().await {
//!     if let BeaconEvent::Button { pressed, .. } = event {
//!         println!("button {}", if pressed { "down" } else { "up" });
//!     }
//! }
//! # }
//! ```

pub use ubeacon_core::*;

pub use ubeacon_uart::{
    CommandDescriptor, CommandKind, CommandType, IoConfig, UBeaconBuilder, UBeaconController,
};

/// Command table, framing and the IO engine.
pub mod uart {
    pub use ubeacon_uart::*;
}

/// Serial port access.
pub mod serial {
    pub use ubeacon_transport::*;
}
