//! Monitor - connect to a thermostat and print every state change.
//!
//! # Running
//!
//! ```bash
//! cargo run --example mock_server -- --port 7001 &
//! RUST_LOG=aprilaire_client=info cargo run --example monitor -- --port 7001
//! ```

use std::time::Duration;

use aprilaire_client::Client;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Watch an Aprilaire thermostat")]
struct Args {
    /// Thermostat host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Thermostat port
    #[arg(long, default_value_t = 7000)]
    port: u16,

    /// Seconds to wait for the device to identify itself
    #[arg(long, default_value_t = 30)]
    ready_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let client = Client::builder().host(args.host).port(args.port).build();
    let mut updates = client.subscribe();
    client.start_listen();

    let device = client
        .wait_for_ready(Duration::from_secs(args.ready_timeout))
        .await?;
    println!(
        "{} {} (hw {}, sw {}) at {}",
        device.manufacturer,
        device.model.as_deref().unwrap_or("unknown model"),
        device.hw_version,
        device.sw_version.as_deref().unwrap_or("unknown"),
        device.mac_address,
    );

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => println!("{}", serde_json::to_string(&update.changes)?),
                Err(RecvError::Lagged(skipped)) => eprintln!("Skipped {} updates", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&client.state())?);
    Ok(())
}
