//! uBeacon UART protocol engine.
//!
//! One tokio task owns the serial transport and runs the whole line
//! protocol: request framing, per-opcode response correlation with
//! timeouts, response and event decoding, and graceful shutdown.
//! [`UBeaconController`] is the typed facade on top.
//!
//! # Architecture
//!
//! - [`protocol`] -- `g:`/`s:` request framing and `r:` line decoding
//! - [`commands`] -- static command table with opcodes and version gates
//! - [`decode`] -- per-opcode response payload decoding
//! - [`events`] -- unsolicited frame decoding
//! - [`correlator`] -- pending-request slots and timers
//! - [`io`] -- IO task types, spawn, and the select loop
//! - [`controller`] / [`builder`] -- public device API

pub mod builder;
pub mod commands;
pub mod controller;
pub mod correlator;
pub mod decode;
pub mod events;
pub mod io;
pub mod protocol;

pub use builder::UBeaconBuilder;
pub use commands::{CommandDescriptor, CommandKind};
pub use controller::UBeaconController;
pub use io::IoConfig;
pub use protocol::CommandType;
