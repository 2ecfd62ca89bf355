//! Unsolicited frame decoding.
//!
//! Event opcodes are routed here before response correlation. Decoding never
//! fails: a malformed payload turns into [`BeaconEvent::Error`] so that noise
//! on the line cannot break an outstanding request.

use std::ops::Range;

use ubeacon_core::codec::{hex_string_to_string, hex_to_u16, hex_to_uint8};
use ubeacon_core::error::{Error, Result};
use ubeacon_core::events::{BeaconEvent, RemoteResponse};
use ubeacon_core::types::{ConnectionInfo, MeshAck, MeshMessageType};

use crate::commands as cmd;
use crate::decode::decode_response;

/// What the IO task must do with a decoded event frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Publish right away.
    Publish(BeaconEvent),
    /// Publish [`BeaconEvent::Ready`] once the settle delay has elapsed.
    Ready(bool),
    /// Resolve the pending mesh send, then publish.
    MeshAck(MeshAck),
    /// Nothing to report.
    Ignored,
}

fn field<'a>(payload: &'a str, range: Range<usize>, what: &str) -> Result<&'a str> {
    payload
        .get(range)
        .ok_or_else(|| Error::Decode(format!("{what} missing in {payload:?}")))
}

fn hex_u8_at(payload: &str, range: Range<usize>, what: &str) -> Result<u8> {
    hex_to_uint8(field(payload, range, what)?)
}

fn hex_u16_at(payload: &str, range: Range<usize>, what: &str) -> Result<u16> {
    hex_to_u16(field(payload, range, what)?)
}

/// Decode the payload of an event frame with the given opcode.
pub fn decode_event(opcode: u8, payload: &str) -> DecodedEvent {
    let payload = payload.trim();
    match try_decode_event(opcode, payload) {
        Ok(event) => event,
        Err(e) => DecodedEvent::Publish(BeaconEvent::Error {
            message: format!("event 0x{opcode:02x}: {e}"),
        }),
    }
}

fn try_decode_event(opcode: u8, payload: &str) -> Result<DecodedEvent> {
    let event = match opcode {
        op if op == cmd::EVENT_READY.opcode => {
            let digits = payload.get(..2).unwrap_or(payload);
            DecodedEvent::Ready(hex_to_uint8(digits)? == 0x01)
        }
        op if op == cmd::EVENT_BUTTON.opcode => DecodedEvent::Publish(BeaconEvent::Button {
            pressed: hex_u8_at(payload, 0..2, "button state")? == 0x01,
            event_type: hex_u8_at(payload, 2..4, "button event type")?,
        }),
        op if op == cmd::MESH_MESSAGE.opcode => decode_mesh_message(payload)?,
        op if op == cmd::EVENT_CONNECTED.opcode => {
            let info = ConnectionInfo::from_hex(payload)?;
            DecodedEvent::Publish(BeaconEvent::Connected {
                connected: info.connected,
                mac_address: info.mac_address,
            })
        }
        op if op == cmd::EVENT_DFU_ERROR.opcode => DecodedEvent::Publish(BeaconEvent::DfuError {
            raw: payload.to_string(),
        }),
        op if op == cmd::EVENT_DFU_WRITTEN.opcode => {
            let control_value = u32::from_str_radix(payload, 16)
                .map_err(|e| Error::Decode(format!("DFU control value {payload:?}: {e}")))?;
            DecodedEvent::Publish(BeaconEvent::DfuWritten { control_value })
        }
        op if op == cmd::EVENT_BLE_SCAN_REPORT.opcode => {
            DecodedEvent::Publish(BeaconEvent::BleScanReport {
                raw: payload.to_string(),
            })
        }
        op if op == cmd::EVENT_MESSAGE.opcode => DecodedEvent::Publish(BeaconEvent::Message {
            raw: payload.to_string(),
        }),
        _ => DecodedEvent::Ignored,
    };
    Ok(event)
}

/// Decode a mesh message: `[src u16][type u8][body...]`, all hex.
fn decode_mesh_message(payload: &str) -> Result<DecodedEvent> {
    let src = hex_u16_at(payload, 0..4, "mesh source address")?;
    let msg_type = hex_u8_at(payload, 4..6, "mesh message type")?;

    let event = match MeshMessageType::from_u8(msg_type) {
        Some(MeshMessageType::Ack) => DecodedEvent::MeshAck(MeshAck {
            src,
            msg_type: hex_u8_at(payload, 6..8, "acknowledged message type")?,
            success: hex_u8_at(payload, 8..10, "ack status")? == 0x01,
            crc16: hex_u16_at(payload, 10..14, "ack crc")?,
        }),
        Some(MeshMessageType::User) => {
            let body = payload.get(6..).unwrap_or_default();
            DecodedEvent::Publish(BeaconEvent::MeshUser {
                src,
                msg_type,
                text: hex_string_to_string(body)?,
            })
        }
        Some(MeshMessageType::RemoteManagement) => {
            // hex[6..12] is the embedded `r:X` header; X is the answered opcode.
            let opcode = hex_u8_at(payload, 10..12, "remote opcode")?;
            let body = payload.get(12..).unwrap_or_default();
            DecodedEvent::Publish(BeaconEvent::MeshRemoteManagement {
                src,
                msg_type,
                response: RemoteResponse {
                    opcode,
                    value: decode_response(opcode, body)?,
                    raw: payload.to_string(),
                },
            })
        }
        Some(MeshMessageType::None) | None => {
            tracing::debug!(src, msg_type, "ignoring mesh message of unknown type");
            DecodedEvent::Ignored
        }
    };
    Ok(event)
}
