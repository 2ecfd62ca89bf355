//! Command table: logical operation -> opcode and minimum protocol version.
//!
//! Every device operation is described once here. The correlator consults
//! the descriptor for version gating and response expectations; the event
//! decoder uses the event entries to route unsolicited frames.

/// How a command is exchanged with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Get/set property; the device answers with a response frame.
    Property,
    /// Write-only action; the device never answers.
    Action,
    /// Device-initiated notification.
    Event,
}

/// Immutable description of one command or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub opcode: u8,
    /// Lowest UART protocol version implementing the command.
    pub min_version: Option<&'static str>,
    pub kind: CommandKind,
}

impl CommandDescriptor {
    const fn property(name: &'static str, opcode: u8) -> Self {
        CommandDescriptor {
            name,
            opcode,
            min_version: None,
            kind: CommandKind::Property,
        }
    }

    const fn since(mut self, version: &'static str) -> Self {
        self.min_version = Some(version);
        self
    }

    const fn event(name: &'static str, opcode: u8) -> Self {
        CommandDescriptor {
            name,
            opcode,
            min_version: None,
            kind: CommandKind::Event,
        }
    }

    /// `false` for fire-and-forget actions.
    pub fn expects_response(&self) -> bool {
        self.kind != CommandKind::Action
    }
}

pub const PROTOCOL_VERSION: CommandDescriptor = CommandDescriptor::property("protocol_version", 0x30);
pub const FIRMWARE_VERSION: CommandDescriptor = CommandDescriptor::property("firmware_version", 0x31);
pub const HARDWARE_MODEL: CommandDescriptor = CommandDescriptor::property("hardware_model", 0x32);
pub const HARDWARE_VERSION: CommandDescriptor = CommandDescriptor::property("hardware_version", 0x33);
pub const BDADDR: CommandDescriptor = CommandDescriptor::property("bdaddr", 0x34);
pub const TX_POWER: CommandDescriptor = CommandDescriptor::property("tx_power", 0x35);
pub const FIRMWARE_BUILD: CommandDescriptor =
    CommandDescriptor::property("firmware_build", 0x36).since("0.2.0");
pub const SERIAL_NUMBER: CommandDescriptor = CommandDescriptor::property("serial_number", 0x37);
pub const BATTERY_LEVEL: CommandDescriptor = CommandDescriptor::property("battery_level", 0x38);
pub const TEMPERATURE: CommandDescriptor =
    CommandDescriptor::property("temperature", 0x39).since("0.2.0");

pub const UUID: CommandDescriptor = CommandDescriptor::property("uuid", 0x61);
pub const SERVICE_ID: CommandDescriptor = CommandDescriptor::property("service_id", 0x62);
pub const COMMAND: CommandDescriptor = CommandDescriptor {
    name: "command",
    opcode: 0x63,
    min_version: None,
    kind: CommandKind::Action,
};
pub const ADVERTISING_SETTINGS_REGISTER: CommandDescriptor =
    CommandDescriptor::property("advertising_settings_register", 0x64).since("0.2.1");
pub const EDDYSTONE_URL: CommandDescriptor =
    CommandDescriptor::property("eddystone_url", 0x65).since("0.2.1");
pub const MAJOR: CommandDescriptor = CommandDescriptor::property("major", 0x66);
pub const MINOR: CommandDescriptor = CommandDescriptor::property("minor", 0x67);
pub const LED: CommandDescriptor = CommandDescriptor::property("led", 0x68);
pub const ADVERTISING_INTERVAL: CommandDescriptor =
    CommandDescriptor::property("advertising_interval", 0x69);
pub const RTC_SETTINGS_REGISTER: CommandDescriptor =
    CommandDescriptor::property("rtc_settings_register", 0x6a);
pub const RTC_ALARM_ENABLED: CommandDescriptor =
    CommandDescriptor::property("rtc_alarm_enabled", 0x6b);
pub const LED_SETTINGS_REGISTER: CommandDescriptor =
    CommandDescriptor::property("led_settings_register", 0x6c);
pub const MESH_SETTINGS_REGISTER: CommandDescriptor =
    CommandDescriptor::property("mesh_settings_register", 0x6d);
pub const BLE_SCAN: CommandDescriptor = CommandDescriptor::property("ble_scan", 0x6e).since("0.2.2");
pub const UART_SETTINGS_REGISTER: CommandDescriptor =
    CommandDescriptor::property("uart_settings_register", 0x6f);
pub const MESH_STATS: CommandDescriptor =
    CommandDescriptor::property("mesh_stats", 0x71).since("0.2.1");
pub const RTC_SCHEDULE: CommandDescriptor = CommandDescriptor::property("rtc_schedule", 0x72);
pub const ADVERTISING: CommandDescriptor = CommandDescriptor::property("advertising", 0x74);
pub const CONNECTABLE: CommandDescriptor = CommandDescriptor::property("connectable", 0x75);
pub const MEASURED_STRENGTH: CommandDescriptor =
    CommandDescriptor::property("measured_strength", 0x76);
pub const RTC_TIME: CommandDescriptor = CommandDescriptor::property("rtc_time", 0x77);
pub const MESH_NETWORK_UUID: CommandDescriptor =
    CommandDescriptor::property("mesh_network_uuid", 0x78);
pub const CONNECTION_INFO: CommandDescriptor = CommandDescriptor::property("connection_info", 0x79);
pub const MESH_DEVICE_ID: CommandDescriptor = CommandDescriptor::property("mesh_device_id", 0x7a);

pub const EVENT_READY: CommandDescriptor = CommandDescriptor::event("event_ready", 0x21);
pub const EVENT_BLE_SCAN_REPORT: CommandDescriptor =
    CommandDescriptor::event("event_ble_scan_report", 0x23);
pub const EVENT_BUTTON: CommandDescriptor = CommandDescriptor::event("event_button", 0x24);
pub const EVENT_DFU_ERROR: CommandDescriptor = CommandDescriptor::event("event_dfu_error", 0x25);
pub const EVENT_DFU_WRITTEN: CommandDescriptor =
    CommandDescriptor::event("event_dfu_written", 0x26);
pub const EVENT_MESSAGE: CommandDescriptor = CommandDescriptor::event("event_message", 0x3f);
pub const EVENT_CONNECTED: CommandDescriptor = CommandDescriptor::event("event_connected", 0x40);
/// Mesh traffic: the host sends messages with it, the device reports with it.
pub const MESH_MESSAGE: CommandDescriptor = CommandDescriptor::event("mesh_message", 0x5e);

/// Every known command and event.
pub static COMMANDS: &[CommandDescriptor] = &[
    PROTOCOL_VERSION,
    FIRMWARE_VERSION,
    HARDWARE_MODEL,
    HARDWARE_VERSION,
    BDADDR,
    TX_POWER,
    FIRMWARE_BUILD,
    SERIAL_NUMBER,
    BATTERY_LEVEL,
    TEMPERATURE,
    UUID,
    SERVICE_ID,
    COMMAND,
    ADVERTISING_SETTINGS_REGISTER,
    EDDYSTONE_URL,
    MAJOR,
    MINOR,
    LED,
    ADVERTISING_INTERVAL,
    RTC_SETTINGS_REGISTER,
    RTC_ALARM_ENABLED,
    LED_SETTINGS_REGISTER,
    MESH_SETTINGS_REGISTER,
    BLE_SCAN,
    UART_SETTINGS_REGISTER,
    MESH_STATS,
    RTC_SCHEDULE,
    ADVERTISING,
    CONNECTABLE,
    MEASURED_STRENGTH,
    RTC_TIME,
    MESH_NETWORK_UUID,
    CONNECTION_INFO,
    MESH_DEVICE_ID,
    EVENT_READY,
    EVENT_BLE_SCAN_REPORT,
    EVENT_BUTTON,
    EVENT_DFU_ERROR,
    EVENT_DFU_WRITTEN,
    EVENT_MESSAGE,
    EVENT_CONNECTED,
    MESH_MESSAGE,
];

/// Look up a descriptor by opcode.
pub fn by_opcode(opcode: u8) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|c| c.opcode == opcode)
}

/// Look up a descriptor by its logical name.
pub fn by_name(name: &str) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// `true` if frames with this opcode are device events.
pub fn is_event_opcode(opcode: u8) -> bool {
    by_opcode(opcode).is_some_and(|c| c.kind == CommandKind::Event)
}
