//! Join a uBeacon mesh and print the messages it delivers.
//!
//! Enables the mesh, optionally greets another node, then prints every user
//! message and remote-management answer that arrives.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p ubeacon --example mesh_receiver -- /dev/ttyUSB0 [greet-node-id]
//! ```

use ubeacon::{BeaconEvent, EventKind, UBeaconBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let serial_port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let greet: Option<u16> = args.next().map(|s| s.parse()).transpose()?;

    let beacon = UBeaconBuilder::new()
        .serial_port(&serial_port)
        .build()
        .await?;

    let mut settings = beacon.mesh_settings().await?;
    if !settings.enabled {
        settings.enabled = true;
        settings = beacon.set_mesh_settings(&settings).await?;
    }
    println!(
        "Mesh enabled: {} (device id {}, network {})",
        settings.enabled,
        beacon.mesh_device_id().await?,
        beacon.mesh_network_uuid().await?
    );

    // Subscribe before sending so the ACK event is not missed.
    let mut events = beacon.subscribe_to(&[
        EventKind::MeshUser,
        EventKind::MeshRemoteManagement,
        EventKind::MeshAck,
    ]);

    if let Some(dst) = greet {
        let ack = beacon.send_mesh_user_message(dst, "hello").await?;
        println!("Node {} acknowledged (success: {})", ack.src, ack.success);
    }

    println!("Waiting for mesh traffic (Ctrl-C to stop)...");
    while let Some(event) = events.recv().await {
        match event {
            BeaconEvent::MeshUser { src, text, .. } => {
                println!("[{src:04x}] {text}");
            }
            BeaconEvent::MeshRemoteManagement { src, response, .. } => {
                println!(
                    "[{src:04x}] answer to 0x{:02x}: {:?}",
                    response.opcode, response.value
                );
            }
            BeaconEvent::MeshAck { src, success, .. } => {
                println!("[{src:04x}] ack (success: {success})");
            }
            _ => {}
        }
    }

    Ok(())
}
