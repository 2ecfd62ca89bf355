//! Bit-packed device registers.
//!
//! Each register converts between a typed structure and the hex text the
//! device sends and accepts. None of these types perform I/O.

use crate::codec::{hex_string_to_bytes, hex_to_u16, uint8_to_hex};
use crate::error::{Error, Result};

/// Scan response interval the firmware always runs with.
///
/// The device cannot disable scan responses, so this value is written on
/// every encode regardless of what the register holds.
pub const SCAN_RESPONSE_INTERVAL: u8 = 0x03;

/// Eddystone interval written by [`AdvertisingSettingsRegister::set_eddystone_enabled`].
pub const EDDYSTONE_ENABLED_INTERVAL: u8 = 0x02;

/// Advertising settings register (`d` opcode).
///
/// Wire layout: 4 bytes, hex-encoded, `[eddystone, scan_response, ibeacon, 0x00]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingSettingsRegister {
    /// Eddystone frame interval multiplier; `0` disables Eddystone.
    pub eddystone_interval: u8,
    /// Scan response interval. Ignored on encode.
    pub scan_response_interval: u8,
    /// iBeacon frame interval multiplier.
    pub ibeacon_interval: u8,
}

impl Default for AdvertisingSettingsRegister {
    fn default() -> Self {
        AdvertisingSettingsRegister {
            eddystone_interval: 0x00,
            scan_response_interval: SCAN_RESPONSE_INTERVAL,
            ibeacon_interval: 0x01,
        }
    }
}

impl AdvertisingSettingsRegister {
    /// Decode a register from its hex form.
    pub fn from_bytes(hex: &str) -> Result<Self> {
        let mut reg = Self::default();
        reg.set_from_bytes(hex)?;
        Ok(reg)
    }

    /// Encode as 8 hex characters. The scan response byte is always `0x03`.
    pub fn get_bytes(&self) -> String {
        [
            self.eddystone_interval,
            SCAN_RESPONSE_INTERVAL,
            self.ibeacon_interval,
            0x00,
        ]
        .iter()
        .map(|b| uint8_to_hex(*b))
        .collect()
    }

    /// Overwrite all fields from the hex form.
    ///
    /// At least 3 bytes are required; the trailing reserved byte is optional.
    pub fn set_from_bytes(&mut self, hex: &str) -> Result<()> {
        let bytes = hex_string_to_bytes(hex)?;
        if bytes.len() < 3 {
            return Err(Error::Decode(format!(
                "advertising settings register needs at least 3 bytes, got {hex:?}"
            )));
        }
        self.eddystone_interval = bytes[0];
        self.scan_response_interval = bytes[1];
        self.ibeacon_interval = bytes[2];
        Ok(())
    }

    /// Turn Eddystone advertising on (interval `0x02`) or off (`0x00`).
    pub fn set_eddystone_enabled(&mut self, enabled: bool) {
        self.eddystone_interval = if enabled {
            EDDYSTONE_ENABLED_INTERVAL
        } else {
            0x00
        };
    }

    /// Whether Eddystone frames are being advertised.
    pub fn eddystone_enabled(&self) -> bool {
        self.eddystone_interval != 0
    }
}

const MESH_ENABLED: u8 = 1 << 0;
const MESH_ALLOW_NON_AUTH: u8 = 1 << 1;
const MESH_ALWAYS_CONNECTABLE: u8 = 1 << 2;
const MESH_WINDOW_ENABLED: u8 = 1 << 3;
const MESH_HOUR_MASK: u8 = 0x1F;
const MESH_DURATION_SHIFT: u8 = 5;

/// Longest mesh window the device supports, in minutes.
pub const MESH_WINDOW_MAX_DURATION: u8 = 60;

/// Mesh settings register (`m` opcode).
///
/// Wire layout: 2 bytes, hex-encoded. Byte 0 bits 0..=3 carry the four
/// flags. Byte 1 low 5 bits are the window start hour, top 3 bits the window
/// duration in units of 10 minutes. `ffff` is the device's unset sentinel and
/// decodes to all-false/zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshSettingsRegister {
    pub enabled: bool,
    pub allow_non_auth_connections: bool,
    pub always_connectable: bool,
    pub enable_mesh_window: bool,
    /// Hour (0-23) at which the mesh window opens.
    pub mesh_window_on_hour: u8,
    /// Window length in minutes, multiple of 10 in `0..=60`.
    pub mesh_window_duration: u8,
}

impl MeshSettingsRegister {
    /// Decode a register from its hex form.
    pub fn from_bytes(hex: &str) -> Result<Self> {
        let mut reg = Self::default();
        reg.set_from_bytes(hex)?;
        Ok(reg)
    }

    /// Build a register from the two raw bytes.
    pub fn from_raw(byte0: u8, byte1: u8) -> Self {
        if byte0 == 0xFF && byte1 == 0xFF {
            return Self::default();
        }
        MeshSettingsRegister {
            enabled: byte0 & MESH_ENABLED != 0,
            allow_non_auth_connections: byte0 & MESH_ALLOW_NON_AUTH != 0,
            always_connectable: byte0 & MESH_ALWAYS_CONNECTABLE != 0,
            enable_mesh_window: byte0 & MESH_WINDOW_ENABLED != 0,
            mesh_window_on_hour: byte1 & MESH_HOUR_MASK,
            mesh_window_duration: ((byte1 >> MESH_DURATION_SHIFT) * 10)
                .min(MESH_WINDOW_MAX_DURATION),
        }
    }

    /// The two raw register bytes.
    ///
    /// The duration is clamped to `0..=60` and rounded to the nearest 10.
    pub fn raw(&self) -> [u8; 2] {
        let mut byte0 = 0u8;
        if self.enabled {
            byte0 |= MESH_ENABLED;
        }
        if self.allow_non_auth_connections {
            byte0 |= MESH_ALLOW_NON_AUTH;
        }
        if self.always_connectable {
            byte0 |= MESH_ALWAYS_CONNECTABLE;
        }
        if self.enable_mesh_window {
            byte0 |= MESH_WINDOW_ENABLED;
        }

        let duration = self.mesh_window_duration.min(MESH_WINDOW_MAX_DURATION);
        let units = (duration + 5) / 10;
        let byte1 = (self.mesh_window_on_hour & MESH_HOUR_MASK) | (units << MESH_DURATION_SHIFT);
        [byte0, byte1]
    }

    /// Encode as 4 hex characters.
    pub fn get_bytes(&self) -> String {
        let [b0, b1] = self.raw();
        format!("{}{}", uint8_to_hex(b0), uint8_to_hex(b1))
    }

    /// Overwrite all fields from the hex form.
    pub fn set_from_bytes(&mut self, hex: &str) -> Result<()> {
        let bytes = hex_string_to_bytes(hex)?;
        if bytes.len() != 2 {
            return Err(Error::Decode(format!(
                "mesh settings register must be 2 bytes, got {hex:?}"
            )));
        }
        *self = Self::from_raw(bytes[0], bytes[1]);
        Ok(())
    }

    /// Copy every field from another register.
    pub fn set_from(&mut self, other: &MeshSettingsRegister) {
        *self = *other;
    }
}

/// Mesh traffic counters (`q` opcode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub sent: u16,
    pub acked: u16,
    pub received: u16,
}

impl MeshStats {
    /// Hex length of a well-formed stats payload.
    pub const HEX_LEN: usize = 12;

    /// Decode from a stats payload; malformed payloads give all-zero counters.
    pub fn from_bytes(hex: &str) -> Self {
        let mut stats = Self::default();
        stats.set_from_bytes(hex);
        stats
    }

    /// Update the counters from a 12-hex-character payload.
    ///
    /// Any other length, or non-hex content, leaves the counters untouched.
    pub fn set_from_bytes(&mut self, hex: &str) {
        if hex.len() != Self::HEX_LEN {
            return;
        }
        let field = |range: std::ops::Range<usize>| hex.get(range).and_then(|s| hex_to_u16(s).ok());
        if let (Some(sent), Some(acked), Some(received)) =
            (field(0..4), field(4..8), field(8..12))
        {
            self.sent = sent;
            self.acked = acked;
            self.received = received;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertising_defaults() {
        let reg = AdvertisingSettingsRegister::default();
        assert_eq!(reg.eddystone_interval, 0x00);
        assert_eq!(reg.scan_response_interval, 0x03);
        assert_eq!(reg.ibeacon_interval, 0x01);
        assert_eq!(reg.get_bytes(), "00030100");
    }

    #[test]
    fn advertising_to_bytes() {
        let reg = AdvertisingSettingsRegister {
            eddystone_interval: 0x02,
            scan_response_interval: 0x03,
            ibeacon_interval: 0x01,
        };
        assert_eq!(reg.get_bytes(), "02030100");
    }

    #[test]
    fn advertising_from_bytes() {
        let reg = AdvertisingSettingsRegister::from_bytes("03030400").unwrap();
        assert_eq!(reg.eddystone_interval, 0x03);
        assert_eq!(reg.scan_response_interval, 0x03);
        assert_eq!(reg.ibeacon_interval, 0x04);
    }

    #[test]
    fn advertising_scan_response_forced_on_encode() {
        let mut reg = AdvertisingSettingsRegister {
            eddystone_interval: 0x02,
            scan_response_interval: 0x00,
            ibeacon_interval: 0x01,
        };
        assert_eq!(reg.get_bytes(), "02030100");

        reg.scan_response_interval = 0xFF;
        reg.eddystone_interval = 0x04;
        reg.ibeacon_interval = 0x05;
        assert_eq!(reg.get_bytes(), "04030500");
    }

    #[test]
    fn advertising_eddystone_toggle() {
        let mut reg = AdvertisingSettingsRegister::default();
        reg.set_eddystone_enabled(true);
        assert_eq!(reg.get_bytes(), "02030100");
        assert!(reg.eddystone_enabled());
        reg.set_eddystone_enabled(false);
        assert_eq!(reg.get_bytes(), "00030100");
        assert!(!reg.eddystone_enabled());
    }

    #[test]
    fn advertising_short_payload_is_error() {
        let mut reg = AdvertisingSettingsRegister::default();
        assert!(reg.set_from_bytes("0203").is_err());
        assert_eq!(reg, AdvertisingSettingsRegister::default());
    }

    #[test]
    fn mesh_defaults() {
        let reg = MeshSettingsRegister::default();
        assert!(!reg.enabled);
        assert!(!reg.allow_non_auth_connections);
        assert!(!reg.always_connectable);
        assert!(!reg.enable_mesh_window);
        assert_eq!(reg.mesh_window_on_hour, 0);
        assert_eq!(reg.mesh_window_duration, 0);
        assert_eq!(reg.get_bytes(), "0000");
    }

    #[test]
    fn mesh_fields_to_bytes_incremental() {
        let mut reg = MeshSettingsRegister::default();
        reg.enabled = true;
        assert_eq!(reg.get_bytes(), "0100");
        reg.allow_non_auth_connections = true;
        assert_eq!(reg.get_bytes(), "0300");
        reg.always_connectable = true;
        assert_eq!(reg.get_bytes(), "0700");
        reg.enable_mesh_window = true;
        assert_eq!(reg.get_bytes(), "0f00");
        reg.mesh_window_on_hour = 13;
        assert_eq!(reg.get_bytes(), "0f0d");
        reg.mesh_window_duration = 60;
        assert_eq!(reg.get_bytes(), "0fcd");
    }

    #[test]
    fn mesh_bytes_to_fields() {
        let reg = MeshSettingsRegister::from_bytes("0fcd").unwrap();
        assert!(reg.enabled);
        assert!(reg.allow_non_auth_connections);
        assert!(reg.always_connectable);
        assert!(reg.enable_mesh_window);
        assert_eq!(reg.mesh_window_on_hour, 13);
        assert_eq!(reg.mesh_window_duration, 60);

        let reg = MeshSettingsRegister::from_bytes("0500").unwrap();
        assert!(reg.enabled && reg.always_connectable);
        assert!(!reg.allow_non_auth_connections && !reg.enable_mesh_window);

        let reg = MeshSettingsRegister::from_bytes("00c0").unwrap();
        assert!(!reg.enabled);
        assert_eq!(reg.mesh_window_on_hour, 0);
        assert_eq!(reg.mesh_window_duration, 60);
    }

    #[test]
    fn mesh_duration_clamped_on_decode() {
        let reg = MeshSettingsRegister::from_bytes("00e0").unwrap();
        assert_eq!(reg.mesh_window_duration, 60);
        let reg = MeshSettingsRegister::from_bytes("00ff").unwrap();
        assert_eq!(reg.mesh_window_on_hour, 31);
        assert_eq!(reg.mesh_window_duration, 60);
    }

    #[test]
    fn mesh_unset_sentinel_clears_prior_state() {
        let mut reg = MeshSettingsRegister::from_bytes("0fcd").unwrap();
        reg.set_from_bytes("ffff").unwrap();
        assert_eq!(reg, MeshSettingsRegister::default());
    }

    #[test]
    fn mesh_roundtrip_all_combinations() {
        for flags in 0..16u8 {
            for hour in 0..24u8 {
                for duration in (0..=60u8).step_by(10) {
                    let reg = MeshSettingsRegister {
                        enabled: flags & 1 != 0,
                        allow_non_auth_connections: flags & 2 != 0,
                        always_connectable: flags & 4 != 0,
                        enable_mesh_window: flags & 8 != 0,
                        mesh_window_on_hour: hour,
                        mesh_window_duration: duration,
                    };
                    let decoded = MeshSettingsRegister::from_bytes(&reg.get_bytes()).unwrap();
                    assert_eq!(decoded, reg);
                }
            }
        }
    }

    #[test]
    fn mesh_duration_clamped_and_rounded() {
        let mut reg = MeshSettingsRegister {
            mesh_window_duration: 200,
            ..Default::default()
        };
        assert_eq!(reg.get_bytes(), "00c0");
        reg.mesh_window_duration = 24;
        assert_eq!(reg.get_bytes(), "0040");
        reg.mesh_window_duration = 25;
        assert_eq!(reg.get_bytes(), "0060");
    }

    #[test]
    fn mesh_set_from_copies() {
        let src = MeshSettingsRegister::from_bytes("0fcd").unwrap();
        let mut dst = MeshSettingsRegister::default();
        dst.set_from(&src);
        assert_eq!(dst, src);
    }

    #[test]
    fn mesh_stats_decode() {
        let stats = MeshStats::from_bytes("000a00090010");
        assert_eq!(stats.sent, 10);
        assert_eq!(stats.acked, 9);
        assert_eq!(stats.received, 16);
    }

    #[test]
    fn mesh_stats_bad_length_keeps_prior_values() {
        let mut stats = MeshStats::from_bytes("000100020003");
        stats.set_from_bytes("0001");
        assert_eq!(
            stats,
            MeshStats {
                sent: 1,
                acked: 2,
                received: 3
            }
        );
        stats.set_from_bytes("zz0100020003");
        assert_eq!(stats.sent, 1);
        assert_eq!(MeshStats::from_bytes(""), MeshStats::default());
    }
}
