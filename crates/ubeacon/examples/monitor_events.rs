//! Monitor events pushed by a uBeacon.
//!
//! Subscribes to every event the device emits (ready, button presses,
//! connections, mesh traffic, firmware-update progress) and prints them as
//! they arrive.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=ubeacon_uart=debug cargo run -p ubeacon --example monitor_events
//! ```

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use ubeacon::{BeaconEvent, UBeaconBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let serial_port = "/dev/ttyUSB0";
    println!("Connecting to uBeacon on {}...", serial_port);

    let beacon = UBeaconBuilder::new()
        .serial_port(serial_port)
        .log_traffic(true)
        .build()
        .await?;

    let mut events = beacon.subscribe();
    println!("Monitoring for 60 seconds (press the button or connect a phone)...\n");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(BeaconEvent::Button {
                pressed,
                event_type,
            })) => {
                println!("Button {} (type {event_type})", if pressed { "pressed" } else { "released" });
            }
            Ok(Ok(BeaconEvent::Connected {
                connected,
                mac_address,
            })) => {
                println!(
                    "Central {} {}",
                    if connected { "connected" } else { "disconnected" },
                    mac_address.as_deref().unwrap_or("")
                );
            }
            Ok(Ok(event)) => println!("{event:?}"),
            Ok(Err(RecvError::Lagged(n))) => println!("[warning] missed {n} events"),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                println!("\nMonitor duration elapsed.");
                break;
            }
        }
    }

    beacon.shutdown().await?;
    Ok(())
}
