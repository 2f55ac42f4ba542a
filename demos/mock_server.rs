//! Mock thermostat - serve a fake device for local testing.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=debug cargo run --example mock_server -- --port 7001
//! ```
//!
//! Then point the `monitor` example (or any client) at the same port.

use aprilaire_client::mock::MockThermostat;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Serve a mock Aprilaire thermostat")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(long, default_value_t = 7001)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mock = MockThermostat::bind((args.host.as_str(), args.port)).await?;
    println!("Mock thermostat listening on {}", mock.local_addr());

    tokio::select! {
        _ = mock.serve_forever() => {}
        _ = tokio::signal::ctrl_c() => println!("Shutting down"),
    }

    Ok(())
}
