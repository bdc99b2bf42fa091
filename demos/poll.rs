//! Connect to an amplifier, print what it offers, then poll it.
//!
//! ```text
//! cargo run --example poll -- 192.168.1.60 [port] [interval-secs]
//! ```

use nad_remote::{ClientConfig, Coordinator, CoordinatorUpdate, NadClient};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: poll <host> [port] [interval-secs]")?;
    let mut config = ClientConfig::new(host);
    if let Some(port) = args.next() {
        config.port = port.parse()?;
    }
    if let Some(secs) = args.next() {
        config.poll_interval_secs = secs.parse()?;
    }
    config.validate()?;

    if !NadClient::check_connection(&config).await {
        return Err(format!("no supported amplifier at {}:{}", config.host, config.port).into());
    }

    let client = Arc::new(NadClient::from_config(&config).await?);
    let caps = client.capabilities().await?;
    println!("Device:  {}", config.unique_id());
    println!("Model:   {}", client.model().await?.unwrap_or_default());
    println!("Zones:   {:?}", caps.zones());
    println!("Sources: {}", caps.sources().join(", "));
    for zone in caps.zones() {
        let range = caps.volume_range(zone);
        println!("{} volume range: {} .. {} dB", zone, range.min_db, range.max_db);
    }

    let mut coordinator = Coordinator::new(client, config.poll_interval());
    let first = coordinator.first_refresh().await?;
    println!("{}", serde_json::to_string_pretty(&first)?);

    let mut updates = coordinator.subscribe();
    coordinator.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update? {
                CoordinatorUpdate::Refreshed(snapshot) => {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
                CoordinatorUpdate::Failed(reason) => {
                    println!("update failed, showing stale data: {}", reason);
                }
            },
        }
    }

    coordinator.stop().await;
    Ok(())
}
