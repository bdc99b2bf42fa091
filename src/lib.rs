//! Rust library for polling and controlling NAD multi-zone amplifiers
//!
//! This library talks to NAD amplifiers over their line-oriented telnet
//! protocol and republishes their state as normalized values. It supports:
//!
//! - Capability discovery (enabled sources, per-zone volume ranges, zone 2)
//! - Per-zone power, source, volume, mute and listening mode control
//! - Conversion between native dB and a normalized 0.0–1.0 volume scale
//! - Fixed-interval polling with stale-data tracking and update subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use nad_remote::{NadClient, Zone};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connecting reads the amplifier's capabilities
//!     let client = NadClient::connect("192.168.1.60", 23).await?;
//!
//!     println!("Model: {:?}", client.model().await?);
//!     println!("Sources: {:?}", client.sources().await?);
//!
//!     client.set_power(Zone::Main, true).await?;
//!     client.set_source(Zone::Main, "CD").await?;
//!     client.set_volume_level(Zone::Main, 0.35).await?;
//!
//!     let snapshot = client.refresh().await?;
//!     println!("{:?}", snapshot.zone(Zone::Main));
//!     Ok(())
//! }
//! ```
//!
//! # Polling
//!
//! ```no_run
//! use nad_remote::{ClientConfig, Coordinator, CoordinatorUpdate, NadClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_json(r#"{"host": "192.168.1.60", "poll_interval_secs": 10}"#)?;
//!     let client = Arc::new(NadClient::from_config(&config).await?);
//!
//!     let mut coordinator = Coordinator::new(client, config.poll_interval());
//!     coordinator.first_refresh().await?;
//!     let mut updates = coordinator.subscribe();
//!     coordinator.start();
//!
//!     while let Ok(update) = updates.recv().await {
//!         if let CoordinatorUpdate::Failed(reason) = update {
//!             println!("State is stale: {}", reason);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Connection**: persistent TCP session, one request in flight at a time
//! - **Protocol**: request line encoding and reply parsing
//! - **Capabilities**: the bulk status table, read once and cached
//! - **Client**: normalized per-zone getters/setters and the aggregate refresh
//! - **Zone**: a per-zone handle for entity layers
//! - **Coordinator**: fixed-interval polling and update broadcast

mod capabilities;
mod client;
mod config;
mod connection;
mod coordinator;
mod error;
mod protocol;
mod subscription;
#[cfg(test)]
mod testing;
mod types;
mod zone;

// Public exports
pub use capabilities::{DeviceCapabilities, MAX_SOURCE_SLOTS};
pub use client::NadClient;
pub use config::ClientConfig;
pub use connection::{Connection, Transport, DEFAULT_PORT};
pub use coordinator::{Coordinator, CoordinatorState};
pub use error::{NadError, Result};
pub use protocol::{Control, Operator, Parameter, Request};
pub use subscription::{CoordinatorUpdate, SnapshotReceiver};
pub use types::{
    ListeningMode, PowerState, SlotId, Snapshot, VolumeLevel, VolumeRange, Zone, ZoneState,
    DEFAULT_MAX_DB, DEFAULT_MIN_DB,
};
pub use zone::ZoneControl;
