//! ubeacon-test-harness: Mock transports and a simulated device for testing
//! the uBeacon driver without hardware.
//!
//! - [`MockTransport`] replays scripted request/response pairs and lets a
//!   test inject unsolicited device output through a [`MockHandle`].
//! - [`SimulatedBeacon`] behaves like a real device: it keeps register
//!   state, echoes setters and acknowledges mesh sends.

mod inbound;
pub mod mock_serial;
pub mod simulated;

pub use mock_serial::{MockHandle, MockTransport};
pub use simulated::{SimulatedBeacon, SimulatorHandle};
