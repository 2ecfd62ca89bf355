//! UBeaconController -- typed facade over the UART protocol engine.
//!
//! Every method is one round trip through the IO task: frame the request,
//! wait for the matching response (or mesh ACK), decode it into the type the
//! caller asked for. Setters return the value the device echoed back.
//!
//! Constructed via [`UBeaconBuilder`](crate::builder::UBeaconBuilder).

use chrono::NaiveDateTime;
use tokio::sync::broadcast;
use tracing::debug;

use ubeacon_core::codec::{bytes_to_hex_string, u16_to_hex, uint8_to_hex};
use ubeacon_core::eddystone;
use ubeacon_core::error::{Error, Result};
use ubeacon_core::events::{BeaconEvent, EventBus, EventKind, EventSubscription};
use ubeacon_core::registers::{AdvertisingSettingsRegister, MeshSettingsRegister, MeshStats};
use ubeacon_core::transport::Transport;
use ubeacon_core::types::{
    ConnectionInfo, DeviceData, MeshAck, MeshMessageType, OpenDaySchedule, Response, rtc_to_bcd,
};

use crate::commands::{self as cmd, CommandDescriptor};
use crate::io::{BeaconIo, IoConfig, spawn_io_task};
use crate::protocol::{CommandType, encode_command};

/// Hex length of a proximity or mesh network UUID.
const UUID_HEX_LEN: usize = 32;

fn bool_payload(on: bool) -> String {
    uint8_to_hex(u8::from(on))
}

/// Strip dashes from a UUID and check it is 16 bytes of hex.
fn normalize_uuid(uuid: &str) -> Result<String> {
    let hex: String = uuid.chars().filter(|c| *c != '-').collect();
    if hex.len() != UUID_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidParameter(format!(
            "UUID must be {UUID_HEX_LEN} hex digits, got {uuid:?}"
        )));
    }
    Ok(hex.to_ascii_lowercase())
}

/// Prepend `http://` when the URL carries no scheme; empty stays empty.
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Mesh message payload: `[dst u16][type u8][body hex]`.
fn mesh_payload(dst: u16, msg_type: MeshMessageType, body: &[u8]) -> String {
    format!(
        "{}{}{}",
        u16_to_hex(dst),
        uint8_to_hex(msg_type as u8),
        bytes_to_hex_string(body)
    )
}

/// A uBeacon attached over UART.
pub struct UBeaconController {
    io: BeaconIo,
    events: EventBus,
}

impl UBeaconController {
    /// Start the IO task on `transport`.
    ///
    /// Called by [`UBeaconBuilder`](crate::builder::UBeaconBuilder); callers
    /// should use the builder API instead.
    pub(crate) fn new(transport: Box<dyn Transport>, config: IoConfig, events: EventBus) -> Self {
        let io = spawn_io_task(transport, config, events.clone());
        UBeaconController { io, events }
    }

    async fn get(&self, descriptor: &'static CommandDescriptor) -> Result<Response> {
        self.io.command(descriptor, CommandType::Get, None).await
    }

    async fn set(&self, descriptor: &'static CommandDescriptor, payload: String) -> Result<Response> {
        self.io
            .command(descriptor, CommandType::Set, Some(payload))
            .await
    }

    // -----------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------

    /// Query the identity opcodes and return what the device reported.
    ///
    /// The protocol version learned here gates newer commands.
    pub async fn discover(&self) -> Result<DeviceData> {
        self.protocol_version().await?;
        self.firmware_version().await?;
        self.hardware_model().await?;
        self.hardware_version().await?;
        let data = self.device_data().await?;
        debug!(
            protocol = data.uart_protocol_version.as_deref().unwrap_or("?"),
            firmware = data.firmware_version.as_deref().unwrap_or("?"),
            "uBeacon discovered"
        );
        Ok(data)
    }

    /// Identity learned so far.
    pub async fn device_data(&self) -> Result<DeviceData> {
        self.io.device_data().await
    }

    /// Discard unread serial input.
    pub async fn flush_serial(&self) -> Result<()> {
        self.io.flush_input().await
    }

    /// Receive every device event. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<BeaconEvent> {
        self.events.subscribe()
    }

    /// Receive only events of the given kinds.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        self.events.subscribe_to(kinds)
    }

    /// The event bus this controller publishes on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stop the IO task and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.io.shutdown().await
    }

    // -----------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------

    pub async fn protocol_version(&self) -> Result<String> {
        self.get(&cmd::PROTOCOL_VERSION).await?.into_text()
    }

    pub async fn firmware_version(&self) -> Result<String> {
        self.get(&cmd::FIRMWARE_VERSION).await?.into_text()
    }

    /// Firmware build identifier (protocol 0.2.0 and later).
    pub async fn firmware_build(&self) -> Result<String> {
        self.get(&cmd::FIRMWARE_BUILD).await?.into_text()
    }

    pub async fn hardware_model(&self) -> Result<String> {
        self.get(&cmd::HARDWARE_MODEL).await?.into_text()
    }

    pub async fn hardware_version(&self) -> Result<String> {
        self.get(&cmd::HARDWARE_VERSION).await?.into_text()
    }

    /// Bluetooth device address.
    pub async fn mac_address(&self) -> Result<String> {
        self.get(&cmd::BDADDR).await?.into_text()
    }

    pub async fn serial_number(&self) -> Result<String> {
        self.get(&cmd::SERIAL_NUMBER).await?.into_text()
    }

    pub async fn connection_info(&self) -> Result<ConnectionInfo> {
        self.get(&cmd::CONNECTION_INFO).await?.into_connection_info()
    }

    // -----------------------------------------------------------------
    // Radio and sensors
    // -----------------------------------------------------------------

    pub async fn tx_power(&self) -> Result<u8> {
        self.get(&cmd::TX_POWER).await?.into_u8()
    }

    pub async fn set_tx_power(&self, power: u8) -> Result<u8> {
        self.set(&cmd::TX_POWER, uint8_to_hex(power)).await?.into_u8()
    }

    pub async fn battery_level(&self) -> Result<u8> {
        self.get(&cmd::BATTERY_LEVEL).await?.into_u8()
    }

    /// Board temperature in degrees Celsius (protocol 0.2.0 and later).
    pub async fn temperature(&self) -> Result<i32> {
        self.get(&cmd::TEMPERATURE).await?.into_temperature()
    }

    pub async fn measured_strength(&self) -> Result<u8> {
        self.get(&cmd::MEASURED_STRENGTH).await?.into_u8()
    }

    pub async fn set_measured_strength(&self, strength: u8) -> Result<u8> {
        self.set(&cmd::MEASURED_STRENGTH, uint8_to_hex(strength))
            .await?
            .into_u8()
    }

    pub async fn led(&self) -> Result<u8> {
        self.get(&cmd::LED).await?.into_u8()
    }

    /// Set the LED state; `0` is off, `1` is on, higher values are firmware patterns.
    pub async fn set_led(&self, state: u8) -> Result<u8> {
        self.set(&cmd::LED, uint8_to_hex(state)).await?.into_u8()
    }

    // -----------------------------------------------------------------
    // Advertising
    // -----------------------------------------------------------------

    pub async fn advertising_state(&self) -> Result<bool> {
        self.get(&cmd::ADVERTISING).await?.into_bool()
    }

    pub async fn set_advertising_state(&self, on: bool) -> Result<bool> {
        self.set(&cmd::ADVERTISING, bool_payload(on)).await?.into_bool()
    }

    /// Advertising interval in milliseconds.
    pub async fn advertising_interval(&self) -> Result<u16> {
        self.get(&cmd::ADVERTISING_INTERVAL).await?.into_u16()
    }

    pub async fn set_advertising_interval(&self, interval_ms: u16) -> Result<u16> {
        self.set(&cmd::ADVERTISING_INTERVAL, u16_to_hex(interval_ms))
            .await?
            .into_u16()
    }

    pub async fn connectable(&self) -> Result<bool> {
        self.get(&cmd::CONNECTABLE).await?.into_bool()
    }

    pub async fn set_connectable(&self, on: bool) -> Result<bool> {
        self.set(&cmd::CONNECTABLE, bool_payload(on)).await?.into_bool()
    }

    /// iBeacon proximity UUID as 32 hex digits.
    pub async fn proximity_uuid(&self) -> Result<String> {
        self.get(&cmd::UUID).await?.into_raw()
    }

    /// Set the iBeacon proximity UUID. Dashes are accepted and stripped.
    pub async fn set_proximity_uuid(&self, uuid: &str) -> Result<String> {
        let uuid = normalize_uuid(uuid)?;
        self.set(&cmd::UUID, uuid).await?.into_raw()
    }

    pub async fn major(&self) -> Result<u16> {
        self.get(&cmd::MAJOR).await?.into_u16()
    }

    pub async fn set_major(&self, major: u16) -> Result<u16> {
        self.set(&cmd::MAJOR, u16_to_hex(major)).await?.into_u16()
    }

    pub async fn minor(&self) -> Result<u16> {
        self.get(&cmd::MINOR).await?.into_u16()
    }

    pub async fn set_minor(&self, minor: u16) -> Result<u16> {
        self.set(&cmd::MINOR, u16_to_hex(minor)).await?.into_u16()
    }

    /// Advertised Eddystone URL; empty when none is stored.
    ///
    /// A stored frame that does not decode fails this call with the decode
    /// error. The same failure is also published as [`BeaconEvent::Error`].
    pub async fn eddystone_url(&self) -> Result<String> {
        self.get(&cmd::EDDYSTONE_URL).await?.into_eddystone_url()
    }

    /// Store an Eddystone URL.
    ///
    /// A URL without a scheme gets `http://`. An empty URL clears the stored one.
    pub async fn set_eddystone_url(&self, url: &str) -> Result<String> {
        let url = normalize_url(url);
        let encoded = eddystone::encode(&url)?;
        self.set(&cmd::EDDYSTONE_URL, bytes_to_hex_string(&encoded))
            .await?
            .into_eddystone_url()
    }

    pub async fn advertising_settings(&self) -> Result<AdvertisingSettingsRegister> {
        self.get(&cmd::ADVERTISING_SETTINGS_REGISTER)
            .await?
            .into_advertising_settings()
    }

    pub async fn set_advertising_settings(
        &self,
        register: &AdvertisingSettingsRegister,
    ) -> Result<AdvertisingSettingsRegister> {
        self.set(&cmd::ADVERTISING_SETTINGS_REGISTER, register.get_bytes())
            .await?
            .into_advertising_settings()
    }

    pub async fn ble_scan(&self) -> Result<bool> {
        self.get(&cmd::BLE_SCAN).await?.into_bool()
    }

    /// Start or stop BLE scanning (protocol 0.2.2 and later).
    pub async fn set_ble_scan(&self, on: bool) -> Result<bool> {
        self.set(&cmd::BLE_SCAN, bool_payload(on)).await?.into_bool()
    }

    // -----------------------------------------------------------------
    // Raw settings registers
    // -----------------------------------------------------------------

    pub async fn led_settings_register(&self) -> Result<String> {
        self.get(&cmd::LED_SETTINGS_REGISTER).await?.into_raw()
    }

    pub async fn set_led_settings_register(&self, hex: &str) -> Result<String> {
        self.set(&cmd::LED_SETTINGS_REGISTER, hex.to_string())
            .await?
            .into_raw()
    }

    pub async fn uart_settings_register(&self) -> Result<String> {
        self.get(&cmd::UART_SETTINGS_REGISTER).await?.into_raw()
    }

    pub async fn set_uart_settings_register(&self, hex: &str) -> Result<String> {
        self.set(&cmd::UART_SETTINGS_REGISTER, hex.to_string())
            .await?
            .into_raw()
    }

    pub async fn rtc_settings_register(&self) -> Result<String> {
        self.get(&cmd::RTC_SETTINGS_REGISTER).await?.into_raw()
    }

    pub async fn set_rtc_settings_register(&self, hex: &str) -> Result<String> {
        self.set(&cmd::RTC_SETTINGS_REGISTER, hex.to_string())
            .await?
            .into_raw()
    }

    // -----------------------------------------------------------------
    // Real-time clock
    // -----------------------------------------------------------------

    pub async fn rtc_alarm_enabled(&self) -> Result<bool> {
        self.get(&cmd::RTC_ALARM_ENABLED).await?.into_bool()
    }

    pub async fn set_rtc_alarm_enabled(&self, on: bool) -> Result<bool> {
        self.set(&cmd::RTC_ALARM_ENABLED, bool_payload(on))
            .await?
            .into_bool()
    }

    pub async fn rtc_time(&self) -> Result<NaiveDateTime> {
        self.get(&cmd::RTC_TIME).await?.into_rtc_time()
    }

    /// Set the board clock. Only years 2000 to 2099 fit the RTC.
    pub async fn set_rtc_time(&self, time: &NaiveDateTime) -> Result<NaiveDateTime> {
        let payload = rtc_to_bcd(time)?;
        self.set(&cmd::RTC_TIME, payload).await?.into_rtc_time()
    }

    pub async fn open_day_schedule(&self) -> Result<OpenDaySchedule> {
        self.get(&cmd::RTC_SCHEDULE).await?.into_schedule()
    }

    pub async fn set_open_day_schedule(&self, schedule: &OpenDaySchedule) -> Result<OpenDaySchedule> {
        self.set(&cmd::RTC_SCHEDULE, schedule.to_bcd())
            .await?
            .into_schedule()
    }

    // -----------------------------------------------------------------
    // Mesh
    // -----------------------------------------------------------------

    pub async fn mesh_settings(&self) -> Result<MeshSettingsRegister> {
        MeshSettingsRegister::from_bytes(&self.mesh_settings_raw().await?)
    }

    /// Mesh settings as the 4 hex digits stored on the device, unmodified.
    pub async fn mesh_settings_raw(&self) -> Result<String> {
        self.get(&cmd::MESH_SETTINGS_REGISTER).await?.into_raw()
    }

    pub async fn set_mesh_settings(
        &self,
        register: &MeshSettingsRegister,
    ) -> Result<MeshSettingsRegister> {
        let echo = self
            .set(&cmd::MESH_SETTINGS_REGISTER, register.get_bytes())
            .await?
            .into_raw()?;
        MeshSettingsRegister::from_bytes(&echo)
    }

    /// Write the two mesh settings bytes as they are.
    pub async fn set_mesh_settings_raw(&self, byte0: u8, byte1: u8) -> Result<MeshSettingsRegister> {
        let payload = format!("{}{}", uint8_to_hex(byte0), uint8_to_hex(byte1));
        let echo = self
            .set(&cmd::MESH_SETTINGS_REGISTER, payload)
            .await?
            .into_raw()?;
        MeshSettingsRegister::from_bytes(&echo)
    }

    pub async fn mesh_network_uuid(&self) -> Result<String> {
        self.get(&cmd::MESH_NETWORK_UUID).await?.into_raw()
    }

    pub async fn set_mesh_network_uuid(&self, uuid: &str) -> Result<String> {
        let uuid = normalize_uuid(uuid)?;
        self.set(&cmd::MESH_NETWORK_UUID, uuid).await?.into_raw()
    }

    pub async fn mesh_device_id(&self) -> Result<u16> {
        self.get(&cmd::MESH_DEVICE_ID).await?.into_u16()
    }

    pub async fn set_mesh_device_id(&self, id: u16) -> Result<u16> {
        self.set(&cmd::MESH_DEVICE_ID, u16_to_hex(id))
            .await?
            .into_u16()
    }

    /// Mesh traffic counters (protocol 0.2.1 and later).
    pub async fn mesh_stats(&self) -> Result<MeshStats> {
        self.get(&cmd::MESH_STATS).await?.into_mesh_stats()
    }

    /// Send a text message to mesh node `dst` and wait for its ACK.
    pub async fn send_mesh_user_message(&self, dst: u16, text: &str) -> Result<MeshAck> {
        let payload = mesh_payload(dst, MeshMessageType::User, text.as_bytes());
        self.set(&cmd::MESH_MESSAGE, payload).await?.into_mesh_ack()
    }

    /// Send a raw remote-management message (a complete UART frame) to `dst`.
    pub async fn send_mesh_remote_management(&self, dst: u16, message: &str) -> Result<MeshAck> {
        let payload = mesh_payload(dst, MeshMessageType::RemoteManagement, message.as_bytes());
        self.set(&cmd::MESH_MESSAGE, payload).await?.into_mesh_ack()
    }

    /// Run `descriptor` on mesh node `dst`.
    ///
    /// The answer arrives later as [`BeaconEvent::MeshRemoteManagement`].
    pub async fn send_mesh_remote_command(
        &self,
        dst: u16,
        descriptor: &'static CommandDescriptor,
        kind: CommandType,
        payload: Option<&str>,
    ) -> Result<MeshAck> {
        let frame = encode_command(kind, descriptor.opcode, payload.map(str::as_bytes));
        let body = mesh_payload(dst, MeshMessageType::RemoteManagement, &frame);
        self.set(&cmd::MESH_MESSAGE, body).await?.into_mesh_ack()
    }

    // -----------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------

    /// Execute a device command (reset and friends). The device never answers,
    /// so this returns as soon as the frame is written.
    pub async fn execute_command(&self, command: u8) -> Result<()> {
        self.set(&cmd::COMMAND, uint8_to_hex(command)).await?;
        Ok(())
    }
}
