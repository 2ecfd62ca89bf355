//! Value types exchanged with the device.
//!
//! These types are manufacturer-protocol shaped but transport agnostic: they
//! know how to read and write their own hex payloads and nothing else.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::codec::{bcd_to_number, hex_to_uint8, number_to_bcd_hex, uint8_to_hex};
use crate::error::{Error, Result};
use crate::registers::{AdvertisingSettingsRegister, MeshStats};

/// Identity reported by the device during discovery.
///
/// Every field stays `None` until the matching response has been seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceData {
    pub hardware_model: Option<String>,
    pub hardware_version: Option<String>,
    pub firmware_version: Option<String>,
    /// Version of the UART protocol; gates newer commands.
    pub uart_protocol_version: Option<String>,
}

impl DeviceData {
    /// `true` once all four identity fields are known.
    pub fn is_complete(&self) -> bool {
        self.hardware_model.is_some()
            && self.hardware_version.is_some()
            && self.firmware_version.is_some()
            && self.uart_protocol_version.is_some()
    }
}

/// Length in hex characters of a Bluetooth device address.
const MAC_HEX_LEN: usize = 12;

/// Central connection state (`y` response and `@` event).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub connected: bool,
    /// Address of the connected central, present only while connected.
    pub mac_address: Option<String>,
}

impl ConnectionInfo {
    /// Parse `[flag byte][mac...]` hex. The address is only read when the flag is `01`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let flag = hex
            .get(0..2)
            .ok_or_else(|| Error::Decode(format!("connection info too short: {hex:?}")))?;
        let connected = hex_to_uint8(flag)? == 0x01;
        let mac_address = if connected {
            let end = hex.len().min(2 + MAC_HEX_LEN);
            hex.get(2..end).filter(|s| !s.is_empty()).map(str::to_string)
        } else {
            None
        };
        Ok(ConnectionInfo {
            connected,
            mac_address,
        })
    }
}

/// Sub-type byte of a mesh message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MeshMessageType {
    None = 0x00,
    Ack = 0x01,
    User = 0x02,
    RemoteManagement = 0x03,
}

impl MeshMessageType {
    /// Map a wire byte to a message type.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(MeshMessageType::None),
            0x01 => Some(MeshMessageType::Ack),
            0x02 => Some(MeshMessageType::User),
            0x03 => Some(MeshMessageType::RemoteManagement),
            _ => None,
        }
    }
}

/// Delivery acknowledgment for a mesh message sent from this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshAck {
    /// Mesh address of the acknowledging node.
    pub src: u16,
    /// Type of the message being acknowledged.
    pub msg_type: u8,
    pub success: bool,
    pub crc16: u16,
}

/// Daily on/off window, stored on the device as two DS1337 alarm entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenDaySchedule {
    pub on_time: NaiveTime,
    pub off_time: NaiveTime,
}

/// Alarm control byte; the firmware overwrites it, kept for compatibility.
const ALARM_CONTROL_BYTE: u8 = 0xC3;

/// Hex length of one alarm entry (4 bytes).
const ALARM_HEX_LEN: usize = 8;

impl OpenDaySchedule {
    /// Encode as 16 hex characters: on alarm then off alarm.
    pub fn to_bcd(&self) -> String {
        format!(
            "{}{}",
            time_to_bcd_alarm(&self.on_time),
            time_to_bcd_alarm(&self.off_time)
        )
    }

    /// Decode from exactly 16 hex characters.
    pub fn from_bcd(hex: &str) -> Result<Self> {
        if hex.len() != 2 * ALARM_HEX_LEN {
            return Err(Error::Decode(format!(
                "schedule must be {} hex chars, got {hex:?}",
                2 * ALARM_HEX_LEN
            )));
        }
        let (on, off) = (hex.get(..ALARM_HEX_LEN), hex.get(ALARM_HEX_LEN..));
        match (on, off) {
            (Some(on), Some(off)) => Ok(OpenDaySchedule {
                on_time: bcd_alarm_to_time(on)?,
                off_time: bcd_alarm_to_time(off)?,
            }),
            _ => Err(Error::Decode(format!("non-ASCII schedule payload {hex:?}"))),
        }
    }
}

fn time_to_bcd_alarm(t: &NaiveTime) -> String {
    format!(
        "{}{}{}{}",
        number_to_bcd_hex(t.second() as u8),
        number_to_bcd_hex(t.minute() as u8),
        number_to_bcd_hex(t.hour() as u8),
        uint8_to_hex(ALARM_CONTROL_BYTE)
    )
}

fn bcd_field(hex: &str, index: usize) -> Result<u32> {
    let pair = hex
        .get(index * 2..index * 2 + 2)
        .ok_or_else(|| Error::Decode(format!("BCD field {index} missing in {hex:?}")))?;
    Ok(bcd_to_number(&[hex_to_uint8(pair)?]) as u32)
}

fn bcd_alarm_to_time(hex: &str) -> Result<NaiveTime> {
    let sec = bcd_field(hex, 0)?;
    let min = bcd_field(hex, 1)?;
    let hour = bcd_field(hex, 2)?;
    NaiveTime::from_hms_opt(hour, min, sec)
        .ok_or_else(|| Error::Decode(format!("invalid alarm time in {hex:?}")))
}

/// Hex length of an RTC timestamp (7 BCD bytes).
pub const RTC_HEX_LEN: usize = 14;

/// Encode a timestamp as the RTC's 7 BCD bytes.
///
/// Layout: seconds, minutes, hours, weekday (1 = Sunday), day, month
/// (1-12), year - 2000. Only years 2000-2099 are representable.
pub fn rtc_to_bcd(time: &NaiveDateTime) -> Result<String> {
    let year = time.year();
    if !(2000..=2099).contains(&year) {
        return Err(Error::InvalidParameter(format!(
            "RTC year must be within 2000-2099, got {year}"
        )));
    }
    let fields = [
        time.second() as u8,
        time.minute() as u8,
        time.hour() as u8,
        time.weekday().number_from_sunday() as u8,
        time.day() as u8,
        time.month() as u8,
        (year - 2000) as u8,
    ];
    Ok(fields.iter().map(|f| number_to_bcd_hex(*f)).collect())
}

/// Decode the RTC's 7 BCD bytes. The weekday byte is ignored.
pub fn rtc_from_bcd(hex: &str) -> Result<NaiveDateTime> {
    if hex.len() < RTC_HEX_LEN {
        return Err(Error::Decode(format!(
            "RTC time must be {RTC_HEX_LEN} hex chars, got {hex:?}"
        )));
    }
    let sec = bcd_field(hex, 0)?;
    let min = bcd_field(hex, 1)?;
    let hour = bcd_field(hex, 2)?;
    let day = bcd_field(hex, 4)?;
    let month = bcd_field(hex, 5)?;
    let year = 2000 + bcd_field(hex, 6)? as i32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .ok_or_else(|| Error::Decode(format!("invalid RTC timestamp {hex:?}")))
}

/// A decoded response payload.
///
/// The variant depends on the opcode the response answers.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command completed without a value (fire-and-forget writes).
    None,
    /// Payload passed through unchanged.
    Raw(String),
    /// Payload interpreted as ASCII text.
    Text(String),
    Bool(bool),
    U8(u8),
    U16(u16),
    /// Temperature in degrees Celsius.
    Temperature(i32),
    ConnectionInfo(ConnectionInfo),
    AdvertisingSettings(AdvertisingSettingsRegister),
    MeshStats(MeshStats),
    RtcTime(NaiveDateTime),
    Schedule(OpenDaySchedule),
    EddystoneUrl(String),
    MeshAck(MeshAck),
}

macro_rules! response_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Extract the value, failing with [`Error::Protocol`] on any other variant.
        pub fn $name(self) -> Result<$ty> {
            match self {
                Response::$variant(v) => Ok(v),
                other => Err(Error::Protocol(format!(
                    concat!("expected ", stringify!($variant), " response, got {:?}"),
                    other
                ))),
            }
        }
    };
}

impl Response {
    response_accessor!(into_raw, Raw, String);
    response_accessor!(into_text, Text, String);
    response_accessor!(into_bool, Bool, bool);
    response_accessor!(into_u8, U8, u8);
    response_accessor!(into_u16, U16, u16);
    response_accessor!(into_temperature, Temperature, i32);
    response_accessor!(into_connection_info, ConnectionInfo, ConnectionInfo);
    response_accessor!(
        into_advertising_settings,
        AdvertisingSettings,
        AdvertisingSettingsRegister
    );
    response_accessor!(into_mesh_stats, MeshStats, MeshStats);
    response_accessor!(into_rtc_time, RtcTime, NaiveDateTime);
    response_accessor!(into_schedule, Schedule, OpenDaySchedule);
    response_accessor!(into_eddystone_url, EddystoneUrl, String);
    response_accessor!(into_mesh_ack, MeshAck, MeshAck);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn device_data_completeness() {
        let mut data = DeviceData::default();
        assert!(!data.is_complete());
        data.hardware_model = Some("uBeacon".into());
        data.hardware_version = Some("1".into());
        data.firmware_version = Some("2.2.0".into());
        assert!(!data.is_complete());
        data.uart_protocol_version = Some("0.2.1".into());
        assert!(data.is_complete());
    }

    #[test]
    fn connection_info_connected_with_mac() {
        let info = ConnectionInfo::from_hex("01aabbccddeeff").unwrap();
        assert!(info.connected);
        assert_eq!(info.mac_address.as_deref(), Some("aabbccddeeff"));
    }

    #[test]
    fn connection_info_disconnected_has_no_mac() {
        let info = ConnectionInfo::from_hex("00aabbccddeeff").unwrap();
        assert!(!info.connected);
        assert_eq!(info.mac_address, None);
        let info = ConnectionInfo::from_hex("00").unwrap();
        assert_eq!(info, ConnectionInfo::default());
    }

    #[test]
    fn connection_info_malformed() {
        assert!(ConnectionInfo::from_hex("").is_err());
        assert!(ConnectionInfo::from_hex("x1").is_err());
    }

    #[test]
    fn mesh_message_type_mapping() {
        assert_eq!(MeshMessageType::from_u8(1), Some(MeshMessageType::Ack));
        assert_eq!(MeshMessageType::from_u8(3), Some(MeshMessageType::RemoteManagement));
        assert_eq!(MeshMessageType::from_u8(9), None);
        assert_eq!(MeshMessageType::User as u8, 2);
    }

    #[test]
    fn rtc_encode_known_date() {
        // 2016-03-15 was a Tuesday (weekday 3 counting from Sunday = 1).
        let t = dt(2016, 3, 15, 14, 5, 9);
        assert_eq!(rtc_to_bcd(&t).unwrap(), "09051403150316");
    }

    #[test]
    fn rtc_decode_known_date() {
        assert_eq!(
            rtc_from_bcd("09051403150316").unwrap(),
            dt(2016, 3, 15, 14, 5, 9)
        );
    }

    #[test]
    fn rtc_encode_decode_keeps_timestamp() {
        for t in [dt(2000, 1, 1, 0, 0, 0), dt(2099, 12, 31, 23, 59, 59), dt(2024, 2, 29, 12, 30, 45)] {
            assert_eq!(rtc_from_bcd(&rtc_to_bcd(&t).unwrap()).unwrap(), t);
        }
    }

    #[test]
    fn rtc_rejects_out_of_range() {
        assert!(matches!(
            rtc_to_bcd(&dt(1999, 12, 31, 0, 0, 0)),
            Err(Error::InvalidParameter(_))
        ));
        assert!(rtc_from_bcd("0905140315").is_err());
        assert!(rtc_from_bcd("09051403151316").is_err());
    }

    #[test]
    fn schedule_encode() {
        let s = OpenDaySchedule {
            on_time: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            off_time: NaiveTime::from_hms_opt(19, 0, 15).unwrap(),
        };
        assert_eq!(s.to_bcd(), "003008c3150019c3");
        assert_eq!(OpenDaySchedule::from_bcd(&s.to_bcd()).unwrap(), s);
    }

    #[test]
    fn schedule_rejects_bad_length() {
        assert!(OpenDaySchedule::from_bcd("003008c3").is_err());
    }

    #[test]
    fn response_accessors() {
        assert_eq!(Response::U8(7).into_u8().unwrap(), 7);
        assert!(matches!(
            Response::Text("x".into()).into_bool(),
            Err(Error::Protocol(_))
        ));
        assert_eq!(
            Response::EddystoneUrl("http://a.com".into())
                .into_eddystone_url()
                .unwrap(),
            "http://a.com"
        );
    }
}
