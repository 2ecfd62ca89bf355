//! Response payload decoding.
//!
//! The payload shape depends only on the opcode. The same decoder serves
//! local responses and remote-management answers that arrive over the mesh.

use ubeacon_core::codec::{hex_string_to_bytes, hex_to_u16, hex_to_uint8};
use ubeacon_core::eddystone;
use ubeacon_core::error::{Error, Result};
use ubeacon_core::registers::{AdvertisingSettingsRegister, MeshStats};
use ubeacon_core::types::{ConnectionInfo, OpenDaySchedule, Response, rtc_from_bcd};

use crate::commands as cmd;

/// Hex prefix of the stored Eddystone-URL frame (frame type and TX power bytes).
pub const EDDYSTONE_FRAME_PREFIX: &str = "1000";

/// Payload shape for an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Raw,
    Text,
    U8,
    U16,
    Bool,
    Temperature,
    ConnectionInfo,
    AdvertisingSettings,
    MeshStats,
    RtcTime,
    Schedule,
    EddystoneUrl,
    Empty,
}

/// Schema of the response to `opcode`. Unknown opcodes pass through raw.
///
/// The mesh settings register also passes through raw so callers can see the
/// exact bytes, `ffff` sentinel included.
pub fn schema_for(opcode: u8) -> Schema {
    match opcode {
        op if op == cmd::PROTOCOL_VERSION.opcode
            || op == cmd::FIRMWARE_VERSION.opcode
            || op == cmd::HARDWARE_MODEL.opcode
            || op == cmd::HARDWARE_VERSION.opcode
            || op == cmd::BDADDR.opcode
            || op == cmd::FIRMWARE_BUILD.opcode
            || op == cmd::SERIAL_NUMBER.opcode =>
        {
            Schema::Text
        }
        op if op == cmd::TX_POWER.opcode
            || op == cmd::BATTERY_LEVEL.opcode
            || op == cmd::LED.opcode
            || op == cmd::MEASURED_STRENGTH.opcode =>
        {
            Schema::U8
        }
        op if op == cmd::ADVERTISING_INTERVAL.opcode
            || op == cmd::MAJOR.opcode
            || op == cmd::MINOR.opcode
            || op == cmd::MESH_DEVICE_ID.opcode =>
        {
            Schema::U16
        }
        op if op == cmd::ADVERTISING.opcode
            || op == cmd::CONNECTABLE.opcode
            || op == cmd::RTC_ALARM_ENABLED.opcode
            || op == cmd::BLE_SCAN.opcode =>
        {
            Schema::Bool
        }
        op if op == cmd::TEMPERATURE.opcode => Schema::Temperature,
        op if op == cmd::CONNECTION_INFO.opcode => Schema::ConnectionInfo,
        op if op == cmd::ADVERTISING_SETTINGS_REGISTER.opcode => Schema::AdvertisingSettings,
        op if op == cmd::MESH_STATS.opcode => Schema::MeshStats,
        op if op == cmd::RTC_TIME.opcode => Schema::RtcTime,
        op if op == cmd::RTC_SCHEDULE.opcode => Schema::Schedule,
        op if op == cmd::EDDYSTONE_URL.opcode => Schema::EddystoneUrl,
        op if op == cmd::COMMAND.opcode => Schema::Empty,
        _ => Schema::Raw,
    }
}

fn leading_hex_u8(payload: &str) -> Result<u8> {
    let digits = payload.get(..2.min(payload.len())).unwrap_or(payload);
    hex_to_uint8(digits)
}

fn leading_hex_u16(payload: &str) -> Result<u16> {
    let digits = payload.get(..4.min(payload.len())).unwrap_or(payload);
    hex_to_u16(digits)
}

/// Convert the raw temperature reading to degrees.
///
/// Readings at or above `0x8000` are negative and map to `value - 0xFFFF`.
pub fn temperature_from_raw(raw: u16) -> i32 {
    if raw >= 0x8000 {
        i32::from(raw) - 0xFFFF
    } else {
        i32::from(raw)
    }
}

/// Decode an Eddystone-URL response payload.
///
/// The payload is the hex of the stored frame: the `10 00` prefix followed by
/// the compressed URL. A bare prefix, or a payload too short to hold one,
/// means the URL is cleared. Anything longer without the prefix is malformed.
pub fn decode_eddystone_payload(payload: &str) -> Result<String> {
    let body = match payload.strip_prefix(EDDYSTONE_FRAME_PREFIX) {
        Some(body) => body,
        None if payload.len() < EDDYSTONE_FRAME_PREFIX.len() => return Ok(String::new()),
        None => {
            return Err(Error::Decode(format!(
                "eddystone frame without {EDDYSTONE_FRAME_PREFIX} prefix: {payload:?}"
            )));
        }
    };
    let bytes = hex_string_to_bytes(body)?;
    Ok(eddystone::decode(&bytes)?)
}

/// Decode the payload of a response to `opcode`.
pub fn decode_response(opcode: u8, payload: &str) -> Result<Response> {
    let payload = payload.trim();
    let value = match schema_for(opcode) {
        Schema::Raw => Response::Raw(payload.to_string()),
        Schema::Text => Response::Text(payload.to_string()),
        Schema::U8 => Response::U8(leading_hex_u8(payload)?),
        Schema::U16 => Response::U16(leading_hex_u16(payload)?),
        Schema::Bool => Response::Bool(leading_hex_u8(payload)? == 0x01),
        Schema::Temperature => Response::Temperature(temperature_from_raw(hex_to_u16(payload)?)),
        Schema::ConnectionInfo => Response::ConnectionInfo(ConnectionInfo::from_hex(payload)?),
        Schema::AdvertisingSettings => {
            Response::AdvertisingSettings(AdvertisingSettingsRegister::from_bytes(payload)?)
        }
        Schema::MeshStats => Response::MeshStats(MeshStats::from_bytes(payload)),
        Schema::RtcTime => Response::RtcTime(rtc_from_bcd(payload)?),
        Schema::Schedule => Response::Schedule(OpenDaySchedule::from_bcd(payload)?),
        Schema::EddystoneUrl => Response::EddystoneUrl(decode_eddystone_payload(payload)?),
        Schema::Empty => Response::None,
    };
    Ok(value)
}

/// `true` for errors caused by a malformed payload rather than the link.
pub fn is_decode_failure(err: &Error) -> bool {
    matches!(err, Error::Decode(_) | Error::Eddystone(_))
}
