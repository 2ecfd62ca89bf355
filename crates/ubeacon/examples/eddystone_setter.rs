//! Configure a uBeacon to advertise an Eddystone-URL frame.
//!
//! Writes the URL, enables Eddystone in the advertising settings register
//! and reads both back. URLs without a scheme are sent as `http://`.
//!
//! Eddystone needs UART protocol 0.2.1 or later; older firmware rejects the
//! commands before anything is written to the port.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p ubeacon --example eddystone_setter -- /dev/ttyUSB0 ubudu.com
//! ```

use ubeacon::{Error, UBeaconBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let serial_port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let url = args.next().unwrap_or_else(|| "ubudu.com".to_string());

    let beacon = UBeaconBuilder::new()
        .serial_port(&serial_port)
        .build()
        .await?;

    let written = match beacon.set_eddystone_url(&url).await {
        Ok(written) => written,
        Err(Error::VersionUnsupported {
            required, actual, ..
        }) => {
            anyhow::bail!(
                "firmware speaks UART protocol {}, Eddystone needs {}",
                actual.as_deref().unwrap_or("unknown"),
                required
            );
        }
        Err(e) => return Err(e.into()),
    };
    println!("Eddystone URL set to {written}");

    let mut settings = beacon.advertising_settings().await?;
    if !settings.eddystone_enabled() {
        settings.set_eddystone_enabled(true);
        settings = beacon.set_advertising_settings(&settings).await?;
    }
    println!(
        "Advertising settings: {} (eddystone enabled: {})",
        settings.get_bytes(),
        settings.eddystone_enabled()
    );

    println!("Device now reports {}", beacon.eddystone_url().await?);
    beacon.shutdown().await?;
    Ok(())
}
