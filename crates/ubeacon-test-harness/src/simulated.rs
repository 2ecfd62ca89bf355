//! A stateful fake uBeacon.
//!
//! [`SimulatedBeacon`] parses the frames the host writes and answers them the
//! way the firmware does: getters return the stored payload, setters store
//! the new payload and echo it back, and mesh sends are acknowledged by a
//! mesh ACK event. It is used by the integration tests and by the CLI's
//! `--simulate` mode.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ubeacon_core::error::{Error, Result};
use ubeacon_core::transport::Transport;

use crate::inbound::Inbound;

const GET: u8 = b'g';
const SET: u8 = b's';
const EDDYSTONE_URL: u8 = 0x65;
const EDDYSTONE_FRAME_PREFIX: &str = "1000";
const COMMAND: u8 = 0x63;
const MESH_STATS: u8 = 0x71;
const MESH_MESSAGE: u8 = 0x5e;
const PROTOCOL_VERSION: u8 = 0x30;

/// Initial register contents of a freshly flashed device.
const FACTORY_VALUES: &[(u8, &str)] = &[
    (0x30, "0.2.2"),
    (0x31, "2.2.0"),
    (0x32, "uBeacon"),
    (0x33, "1.0"),
    (0x34, "c8a1b2c3d4e5"),
    (0x35, "03"),
    (0x36, "20160315"),
    (0x37, "UB00000042"),
    (0x38, "5a"),
    (0x39, "0017"),
    (0x61, "b9407f30f5f8466eaff925556b57fe6d"),
    (0x62, "0000"),
    (0x64, "00030100"),
    (0x65, EDDYSTONE_FRAME_PREFIX),
    (0x66, "0001"),
    (0x67, "0002"),
    (0x68, "00"),
    (0x69, "01f4"),
    (0x6a, "00"),
    (0x6b, "00"),
    (0x6c, "00"),
    (0x6d, "0000"),
    (0x6e, "00"),
    (0x6f, "00"),
    (0x71, "000000000000"),
    (0x72, "000008c3000018c3"),
    (0x74, "01"),
    (0x75, "01"),
    (0x76, "c5"),
    (0x77, "00000006010116"),
    (0x78, "0123456789abcdef0123456789abcdef"),
    (0x79, "00"),
    (0x7a, "0001"),
];

#[derive(Debug)]
struct SimState {
    registers: HashMap<u8, String>,
    silent: HashSet<u8>,
    ack_mesh: bool,
    connected: bool,
    lines: Vec<String>,
    pending: Vec<u8>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SimState>,
    inbound: Inbound,
}

/// A fake device implementing [`Transport`].
#[derive(Debug)]
pub struct SimulatedBeacon {
    shared: Arc<Shared>,
}

/// Remote control for a [`SimulatedBeacon`] owned by an IO task.
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    shared: Arc<Shared>,
}

impl SimulatedBeacon {
    /// A device with factory defaults and UART protocol 0.2.2.
    pub fn new() -> Self {
        let registers = FACTORY_VALUES
            .iter()
            .map(|(op, v)| (*op, v.to_string()))
            .collect();
        SimulatedBeacon {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    registers,
                    silent: HashSet::new(),
                    ack_mesh: true,
                    connected: true,
                    lines: Vec::new(),
                    pending: Vec::new(),
                }),
                inbound: Inbound::default(),
            }),
        }
    }

    /// A device reporting a specific UART protocol version.
    pub fn with_protocol_version(version: &str) -> Self {
        let sim = Self::new();
        sim.handle().set_value(PROTOCOL_VERSION, version);
        sim
    }

    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SimulatedBeacon {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorHandle {
    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut guard = match self.shared.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Overwrite the payload the device reports for `opcode`.
    pub fn set_value(&self, opcode: u8, payload: &str) {
        self.with_state(|s| s.registers.insert(opcode, payload.to_string()));
    }

    /// Current payload stored for `opcode`.
    pub fn value(&self, opcode: u8) -> Option<String> {
        self.with_state(|s| s.registers.get(&opcode).cloned())
    }

    /// Stop (or resume) answering frames for `opcode`.
    pub fn set_silent(&self, opcode: u8, silent: bool) {
        self.with_state(|s| {
            if silent {
                s.silent.insert(opcode);
            } else {
                s.silent.remove(&opcode);
            }
        });
    }

    /// Whether mesh sends are acknowledged with a mesh ACK event.
    pub fn set_mesh_ack(&self, enabled: bool) {
        self.with_state(|s| s.ack_mesh = enabled);
    }

    /// Emit a raw line as if the device printed it. `\r\n` is appended.
    pub fn inject_line(&self, line: &str) {
        self.shared.inbound.push(format!("{line}\r\n").as_bytes());
    }

    /// Emit an event frame `r:<opcode><payload>`.
    pub fn inject_event(&self, opcode: u8, payload: &str) {
        self.shared
            .inbound
            .push(&response_frame(opcode, payload));
    }

    /// Every complete line the host has written, without the terminator.
    pub fn received_lines(&self) -> Vec<String> {
        self.with_state(|s| s.lines.clone())
    }
}

fn response_frame(opcode: u8, payload: &str) -> Vec<u8> {
    let mut frame = vec![b'r', b':', opcode];
    frame.extend_from_slice(payload.as_bytes());
    frame.extend_from_slice(b"\r\n");
    frame
}

/// Checksum the simulator reports in mesh ACKs.
fn mesh_crc(payload: &str) -> u16 {
    payload
        .bytes()
        .fold(0u16, |acc, b| acc.rotate_left(5) ^ u16::from(b))
}

fn bump_mesh_stats(stats: &str, acked: bool) -> String {
    let field = |r: std::ops::Range<usize>| {
        stats
            .get(r)
            .and_then(|s| u16::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    let sent = field(0..4).wrapping_add(1);
    let ack = field(4..8).wrapping_add(u16::from(acked));
    let received = field(8..12);
    format!("{sent:04x}{ack:04x}{received:04x}")
}

impl SimState {
    /// Handle one host line and return the bytes the device answers with.
    fn handle_line(&mut self, line: &[u8]) -> Vec<u8> {
        self.lines.push(String::from_utf8_lossy(line).into_owned());

        let (kind, opcode, payload) = match line {
            [kind, b':', opcode, payload @ ..] => {
                (*kind, *opcode, String::from_utf8_lossy(payload).into_owned())
            }
            _ => {
                tracing::debug!(line = ?String::from_utf8_lossy(line), "simulator ignoring malformed line");
                return Vec::new();
            }
        };

        if self.silent.contains(&opcode) {
            return Vec::new();
        }

        match (kind, opcode) {
            (SET, COMMAND) => Vec::new(),
            (SET, MESH_MESSAGE) => {
                let dst = payload.get(0..4).unwrap_or("0000").to_string();
                let msg_type = payload.get(4..6).unwrap_or("02").to_string();
                let stats = self
                    .registers
                    .get(&MESH_STATS)
                    .cloned()
                    .unwrap_or_default();
                self.registers
                    .insert(MESH_STATS, bump_mesh_stats(&stats, self.ack_mesh));
                if self.ack_mesh {
                    let ack = format!("{dst}01{msg_type}01{:04x}", mesh_crc(&payload));
                    response_frame(MESH_MESSAGE, &ack)
                } else {
                    Vec::new()
                }
            }
            (SET, EDDYSTONE_URL) => {
                let stored = format!("{EDDYSTONE_FRAME_PREFIX}{payload}");
                self.registers.insert(opcode, stored.clone());
                response_frame(opcode, &stored)
            }
            (SET, _) => {
                self.registers.insert(opcode, payload.clone());
                response_frame(opcode, &payload)
            }
            (GET, _) => {
                let value = self.registers.get(&opcode).cloned().unwrap_or_default();
                response_frame(opcode, &value)
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Transport for SimulatedBeacon {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let reply = self.handle().with_state(|s| {
            if !s.connected {
                return Err(Error::NotConnected);
            }
            s.pending.extend_from_slice(data);
            let mut reply = Vec::new();
            while let Some(pos) = s.pending.windows(2).position(|w| w == b"\r\n") {
                let line: Vec<u8> = s.pending.drain(..pos + 2).take(pos).collect();
                reply.extend(s.handle_line(&line));
            }
            Ok(reply)
        })?;
        if !reply.is_empty() {
            self.shared.inbound.push(&reply);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.shared.inbound.read(buf, timeout).await
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.shared.inbound.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle().with_state(|s| s.connected = false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle().with_state(|s| s.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(sim: &mut SimulatedBeacon) -> String {
        let mut buf = [0u8; 256];
        let n = sim
            .receive(&mut buf, Duration::from_millis(10))
            .await
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn get_returns_factory_value() {
        let mut sim = SimulatedBeacon::new();
        sim.send(b"g:0\r\n").await.unwrap();
        assert_eq!(read_all(&mut sim).await, "r:00.2.2\r\n");
    }

    #[tokio::test]
    async fn set_stores_and_echoes() {
        let mut sim = SimulatedBeacon::new();
        let handle = sim.handle();
        sim.send(b"s:h01\r\n").await.unwrap();
        assert_eq!(read_all(&mut sim).await, "r:h01\r\n");
        assert_eq!(handle.value(0x68).as_deref(), Some("01"));
    }

    #[tokio::test]
    async fn eddystone_set_adds_frame_prefix() {
        let mut sim = SimulatedBeacon::new();
        sim.send(b"s:e02676f6f676c6507\r\n").await.unwrap();
        assert_eq!(read_all(&mut sim).await, "r:e100002676f6f676c6507\r\n");
    }

    #[tokio::test]
    async fn split_writes_are_reassembled() {
        let mut sim = SimulatedBeacon::new();
        let handle = sim.handle();
        sim.send(b"g:").await.unwrap();
        sim.send(b"1\r").await.unwrap();
        sim.send(b"\n").await.unwrap();
        assert_eq!(read_all(&mut sim).await, "r:12.2.0\r\n");
        assert_eq!(handle.received_lines(), vec!["g:1".to_string()]);
    }

    #[tokio::test]
    async fn mesh_send_is_acknowledged() {
        let mut sim = SimulatedBeacon::new();
        let handle = sim.handle();
        sim.send(b"s:^00020248690a\r\n").await.unwrap();
        let reply = read_all(&mut sim).await;
        assert!(reply.starts_with("r:^0002010201"), "{reply}");
        assert_eq!(handle.value(MESH_STATS).as_deref(), Some("000100010000"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_opcode_gets_no_answer() {
        let mut sim = SimulatedBeacon::new();
        sim.handle().set_silent(0x68, true);
        sim.send(b"g:h\r\n").await.unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            sim.receive(&mut buf, Duration::from_millis(50)).await,
            Err(Error::Timeout)
        ));
    }

    #[tokio::test]
    async fn command_has_no_response() {
        let mut sim = SimulatedBeacon::new();
        sim.send(b"s:c01\r\n").await.unwrap();
        sim.handle().inject_event(b'!', "01");
        assert_eq!(read_all(&mut sim).await, "r:!01\r\n");
    }

    #[test]
    fn protocol_version_override() {
        let sim = SimulatedBeacon::with_protocol_version("0.1.0");
        assert_eq!(sim.handle().value(0x30).as_deref(), Some("0.1.0"));
    }
}
