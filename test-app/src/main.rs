// ubeacon-cli -- command-line tool for exercising a uBeacon over UART,
// against real hardware or the built-in simulated device.
//
// Usage:
//   ubeacon-cli --port /dev/ttyUSB0 info
//   ubeacon-cli --simulate info
//   ubeacon-cli --port /dev/ttyUSB0 led set 1
//   ubeacon-cli --port /dev/ttyUSB0 eddystone set ubudu.com
//   ubeacon-cli --port /dev/ttyUSB0 mesh enable
//   ubeacon-cli --port /dev/ttyUSB0 mesh send 2 "hello"
//   ubeacon-cli --port /dev/ttyUSB0 time sync
//   ubeacon-cli --port /dev/ttyUSB0 --raw-log monitor --duration 30
//   ubeacon-cli --port /dev/ttyUSB0 exec 0x01
//   ubeacon-cli ports
//   ubeacon-cli commands

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ubeacon::uart::commands::{self, COMMANDS, CommandKind};
use ubeacon::{BeaconEvent, CommandType, Error, UBeaconBuilder, UBeaconController};
use ubeacon_test_harness::SimulatedBeacon;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// ubeacon-cli -- reads, configures and monitors a uBeacon from the command line.
#[derive(Parser)]
#[command(name = "ubeacon-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required unless --simulate is used.
    #[arg(long)]
    port: Option<String>,

    /// Override the default baud rate (115200).
    #[arg(long)]
    baud: Option<u32>,

    /// Response window for a single command, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Log filter used when RUST_LOG is not set (e.g. info, ubeacon_uart=debug).
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log every line read from the port, garbage included.
    #[arg(long)]
    raw_log: bool,

    /// Talk to a simulated device instead of a serial port.
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

/// Parse a hex string like "0x01" or "01" into a u8.
fn parse_hex_u8(s: &str) -> std::result::Result<u8, String> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(s, 16).map_err(|e| format!("invalid hex byte: {e}"))
}

#[derive(Subcommand)]
enum Command {
    /// Print device identity and status.
    Info,

    /// LED operations.
    Led {
        #[command(subcommand)]
        action: LedAction,
    },

    /// Eddystone-URL operations.
    Eddystone {
        #[command(subcommand)]
        action: EddystoneAction,
    },

    /// Mesh operations.
    Mesh {
        #[command(subcommand)]
        action: MeshAction,
    },

    /// Real-time clock operations.
    Time {
        #[command(subcommand)]
        action: TimeAction,
    },

    /// Print device events as they arrive.
    Monitor {
        /// Duration in seconds (0 = until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Execute a device command code (hex, e.g. 0x01). The device never answers.
    Exec {
        #[arg(value_parser = parse_hex_u8)]
        code: u8,
    },

    /// List serial ports on this machine.
    Ports,

    /// List every command the driver knows.
    Commands,
}

#[derive(Subcommand)]
enum LedAction {
    /// Read the LED state.
    Get,
    /// Set the LED state (0 = off, 1 = on, higher = firmware pattern).
    Set { state: u8 },
}

#[derive(Subcommand)]
enum EddystoneAction {
    /// Read the advertised URL.
    Get,
    /// Set the advertised URL; `http://` is assumed when no scheme is given.
    Set { url: String },
}

#[derive(Subcommand)]
enum MeshAction {
    /// Print the mesh settings register.
    Settings,
    /// Turn mesh participation on.
    Enable,
    /// Turn mesh participation off.
    Disable,
    /// Send a text message to a mesh node and wait for its ACK.
    Send { dst: u16, text: String },
    /// Read a property on a remote node; the answer arrives as an event.
    Remote {
        dst: u16,
        /// Command name as listed by `commands` (e.g. tx_power).
        name: String,
        /// Wait this many seconds for the answer.
        #[arg(long, default_value_t = 5)]
        wait: u64,
    },
    /// Print mesh traffic counters.
    Stats,
}

#[derive(Subcommand)]
enum TimeAction {
    /// Read the device clock.
    Get,
    /// Set the device clock to this machine's local time.
    Sync,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)
            .with_context(|| format!("invalid --log-level {:?}", cli.log_level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

async fn connect(cli: &Cli) -> Result<UBeaconController> {
    let mut builder = UBeaconBuilder::new()
        .command_timeout(Duration::from_millis(cli.timeout_ms))
        .log_raw_input(cli.raw_log);
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }

    if cli.simulate {
        let beacon = builder
            .build_with_transport(Box::new(SimulatedBeacon::new()))
            .await
            .context("failed to start simulated device")?;
        println!("Connected (simulated device)");
        return Ok(beacon);
    }

    let port = cli
        .port
        .as_deref()
        .context("--port is required when not using --simulate")?;
    let beacon = builder
        .serial_port(port)
        .build()
        .await
        .with_context(|| format!("failed to connect on {port}"))?;
    println!("Connected on {port}");
    Ok(beacon)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_info(beacon: &UBeaconController) -> Result<()> {
    let device = beacon.device_data().await?;
    let unknown = || "?".to_string();

    println!("Device");
    println!("  Model:          {}", device.hardware_model.unwrap_or_else(unknown));
    println!("  Hardware:       {}", device.hardware_version.unwrap_or_else(unknown));
    println!("  Firmware:       {}", device.firmware_version.unwrap_or_else(unknown));
    println!("  UART protocol:  {}", device.uart_protocol_version.unwrap_or_else(unknown));
    println!("  MAC address:    {}", beacon.mac_address().await?);
    println!("  Serial number:  {}", beacon.serial_number().await?);
    println!();
    println!("Status");
    println!("  Battery:        {}%", beacon.battery_level().await?);
    match beacon.temperature().await {
        Ok(t) => println!("  Temperature:    {t} C"),
        Err(Error::VersionUnsupported { .. }) => println!("  Temperature:    n/a"),
        Err(e) => return Err(e.into()),
    }
    let conn = beacon.connection_info().await?;
    println!(
        "  Connection:     {}",
        match conn.mac_address {
            Some(mac) if conn.connected => format!("connected ({mac})"),
            _ if conn.connected => "connected".to_string(),
            _ => "idle".to_string(),
        }
    );
    println!();
    println!("iBeacon");
    println!("  UUID:           {}", beacon.proximity_uuid().await?);
    println!("  Major/minor:    {}/{}", beacon.major().await?, beacon.minor().await?);
    println!("  TX power:       {}", beacon.tx_power().await?);
    println!("  Advertising:    {}", beacon.advertising_state().await?);
    println!("  Interval:       {} ms", beacon.advertising_interval().await?);
    Ok(())
}

async fn cmd_led(beacon: &UBeaconController, action: &LedAction) -> Result<()> {
    let state = match action {
        LedAction::Get => beacon.led().await?,
        LedAction::Set { state } => beacon.set_led(*state).await?,
    };
    println!("LED: {state}");
    Ok(())
}

async fn cmd_eddystone(beacon: &UBeaconController, action: &EddystoneAction) -> Result<()> {
    let url = match action {
        EddystoneAction::Get => beacon.eddystone_url().await?,
        EddystoneAction::Set { url } => beacon.set_eddystone_url(url).await?,
    };
    if url.is_empty() {
        println!("Eddystone URL: (none)");
    } else {
        println!("Eddystone URL: {url}");
    }
    Ok(())
}

async fn cmd_mesh_enable(beacon: &UBeaconController, enabled: bool) -> Result<()> {
    let mut settings = beacon.mesh_settings().await?;
    settings.enabled = enabled;
    let settings = beacon.set_mesh_settings(&settings).await?;
    println!("Mesh enabled: {}", settings.enabled);
    Ok(())
}

async fn cmd_mesh_remote(beacon: &UBeaconController, dst: u16, name: &str, wait: u64) -> Result<()> {
    let Some(descriptor) = commands::by_name(name) else {
        bail!("unknown command {name:?} (see `ubeacon-cli commands`)");
    };
    if descriptor.kind != CommandKind::Property {
        bail!("{name} is not a readable property");
    }

    let mut events = beacon.subscribe();
    let ack = beacon
        .send_mesh_remote_command(dst, descriptor, CommandType::Get, None)
        .await?;
    println!("Node {:04x} acknowledged (success: {})", ack.src, ack.success);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(wait);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(BeaconEvent::MeshRemoteManagement { src, response, .. }))
                if src == dst && response.opcode == descriptor.opcode =>
            {
                println!("{name} on {src:04x}: {:?}", response.value);
                return Ok(());
            }
            Ok(Ok(_)) => {}
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => {}
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                bail!("event channel closed");
            }
            Err(_) => bail!("no answer from node {dst:04x} within {wait}s"),
        }
    }
}

async fn cmd_mesh(beacon: &UBeaconController, action: &MeshAction) -> Result<()> {
    match action {
        MeshAction::Settings => {
            let s = beacon.mesh_settings().await?;
            println!("Mesh settings ({})", beacon.mesh_settings_raw().await?);
            println!("  Enabled:            {}", s.enabled);
            println!("  Non-auth allowed:   {}", s.allow_non_auth_connections);
            println!("  Always connectable: {}", s.always_connectable);
            println!("  Window enabled:     {}", s.enable_mesh_window);
            println!("  Window opens at:    {:02}:00", s.mesh_window_on_hour);
            println!("  Window length:      {} min", s.mesh_window_duration);
            println!("  Device id:          {}", beacon.mesh_device_id().await?);
            println!("  Network UUID:       {}", beacon.mesh_network_uuid().await?);
        }
        MeshAction::Enable => cmd_mesh_enable(beacon, true).await?,
        MeshAction::Disable => cmd_mesh_enable(beacon, false).await?,
        MeshAction::Send { dst, text } => {
            let ack = beacon.send_mesh_user_message(*dst, text).await?;
            println!(
                "Node {:04x} acknowledged (success: {}, crc {:04x})",
                ack.src, ack.success, ack.crc16
            );
        }
        MeshAction::Remote { dst, name, wait } => {
            cmd_mesh_remote(beacon, *dst, name, *wait).await?;
        }
        MeshAction::Stats => {
            let stats = beacon.mesh_stats().await?;
            println!("Mesh traffic");
            println!("  Sent:      {}", stats.sent);
            println!("  Acked:     {}", stats.acked);
            println!("  Received:  {}", stats.received);
        }
    }
    Ok(())
}

async fn cmd_time(beacon: &UBeaconController, action: &TimeAction) -> Result<()> {
    let time = match action {
        TimeAction::Get => beacon.rtc_time().await?,
        TimeAction::Sync => {
            let now = chrono::Local::now().naive_local();
            beacon.set_rtc_time(&now).await?
        }
    };
    println!("Device time: {}", time.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

async fn cmd_monitor(beacon: &UBeaconController, duration_secs: u64) -> Result<()> {
    let mut events = beacon.subscribe();

    println!("Monitoring device events (Ctrl-C to stop)...");

    let deadline = if duration_secs > 0 {
        Some(Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Ok(event)) => {
                println!("[event] {event:?}");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn cmd_exec(beacon: &UBeaconController, code: u8) -> Result<()> {
    beacon.execute_command(code).await?;
    println!("Command 0x{code:02x} sent");
    Ok(())
}

fn cmd_ports() -> Result<()> {
    let ports = ubeacon::serial::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn cmd_commands() {
    println!("{:<32} {:<8} {:<10} MIN PROTOCOL", "NAME", "OPCODE", "KIND");
    for c in COMMANDS {
        println!(
            "{:<32} 0x{:02x}     {:<10} {}",
            c.name,
            c.opcode,
            format!("{:?}", c.kind),
            c.min_version.unwrap_or("-")
        );
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // These commands do not require a device.
    match &cli.command {
        Command::Ports => return cmd_ports(),
        Command::Commands => {
            cmd_commands();
            return Ok(());
        }
        _ => {}
    }

    let beacon = connect(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&beacon).await,
        Command::Led { action } => cmd_led(&beacon, action).await,
        Command::Eddystone { action } => cmd_eddystone(&beacon, action).await,
        Command::Mesh { action } => cmd_mesh(&beacon, action).await,
        Command::Time { action } => cmd_time(&beacon, action).await,
        Command::Monitor { duration } => cmd_monitor(&beacon, *duration).await,
        Command::Exec { code } => cmd_exec(&beacon, *code).await,
        Command::Ports => unreachable!("ports handled above"),
        Command::Commands => unreachable!("commands handled above"),
    };

    beacon.shutdown().await.ok();
    result
}
