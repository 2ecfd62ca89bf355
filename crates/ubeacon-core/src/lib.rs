//! ubeacon-core: Core types, codecs and error definitions for the uBeacon
//! UART driver.
//!
//! This crate holds everything that does not touch a serial port: the wire
//! value conversions, the bit-packed register objects, the Eddystone-URL
//! codec, device events and the [`Transport`] abstraction the IO task runs on.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`BeaconEvent`] / [`EventBus`] -- asynchronous device notifications
//! - [`AdvertisingSettingsRegister`], [`MeshSettingsRegister`], [`MeshStats`] -- registers
//! - [`Response`] -- decoded command responses
//! - [`Error`] / [`Result`] -- error handling

pub mod codec;
pub mod eddystone;
pub mod error;
pub mod events;
pub mod registers;
pub mod transport;
pub mod types;

pub use eddystone::EddystoneError;
pub use error::{Error, Result};
pub use events::{BeaconEvent, EventBus, EventKind, EventSubscription, RemoteResponse};
pub use registers::{AdvertisingSettingsRegister, MeshSettingsRegister, MeshStats};
pub use transport::Transport;
pub use types::*;
