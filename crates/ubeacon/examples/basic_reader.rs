//! Read the identity and configuration of a uBeacon.
//!
//! Connects over UART, prints what the device reports about itself and its
//! current advertising setup, then blinks the LED once.
//!
//! # Requirements
//!
//! - A uBeacon connected via its USB-UART bridge
//! - The serial port path adjusted for your system (e.g. `/dev/ttyUSB0`
//!   on Linux, `COM3` on Windows)
//!
//! # Usage
//!
//! ```sh
//! cargo run -p ubeacon --example basic_reader
//! ```

use std::time::Duration;

use ubeacon::UBeaconBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Adjust this to match your system's serial port.
    let serial_port = "/dev/ttyUSB0";

    println!("Connecting to uBeacon on {}...", serial_port);

    let beacon = UBeaconBuilder::new()
        .serial_port(serial_port)
        .command_timeout(Duration::from_secs(2))
        .build()
        .await?;

    let device = beacon.device_data().await?;
    println!(
        "Connected: {} hw {} (firmware {}, UART protocol {})",
        device.hardware_model.as_deref().unwrap_or("?"),
        device.hardware_version.as_deref().unwrap_or("?"),
        device.firmware_version.as_deref().unwrap_or("?"),
        device.uart_protocol_version.as_deref().unwrap_or("?"),
    );

    println!("MAC address:      {}", beacon.mac_address().await?);
    println!("Serial number:    {}", beacon.serial_number().await?);
    println!("Battery:          {}%", beacon.battery_level().await?);
    println!("TX power:         {}", beacon.tx_power().await?);
    println!("Proximity UUID:   {}", beacon.proximity_uuid().await?);
    println!(
        "Major / minor:    {} / {}",
        beacon.major().await?,
        beacon.minor().await?
    );
    println!(
        "Advertising:      {} every {} ms",
        beacon.advertising_state().await?,
        beacon.advertising_interval().await?
    );

    // Blink the LED.
    beacon.set_led(1).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    beacon.set_led(0).await?;

    beacon.shutdown().await?;
    Ok(())
}
