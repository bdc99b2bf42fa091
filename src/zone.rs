use crate::client::NadClient;
use crate::connection::{Connection, Transport};
use crate::error::Result;
use crate::types::{ListeningMode, PowerState, VolumeLevel, Zone, ZoneState};
use std::sync::Arc;

/// Interface for controlling one zone
///
/// A `ZoneControl` is a cheap handle onto a shared [`NadClient`], bound to a
/// single zone. It is what a media-player entity talks to.
pub struct ZoneControl<T = Connection> {
    client: Arc<NadClient<T>>,
    zone: Zone,
}

impl<T> Clone for ZoneControl<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            zone: self.zone,
        }
    }
}

impl<T: Transport> ZoneControl<T> {
    /// Create a handle for `zone` on a shared client
    pub fn new(client: Arc<NadClient<T>>, zone: Zone) -> Self {
        Self { client, zone }
    }

    /// Zone this handle controls
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Only the primary zone has a selectable listening mode
    pub fn supports_listening_mode(&self) -> bool {
        self.zone.is_primary()
    }

    /// Read every field of this zone.
    ///
    /// Unlike a coordinator refresh, any failure is returned to the caller.
    pub async fn state(&self) -> Result<ZoneState> {
        let power = self.client.power_state(self.zone).await?;
        if !power.is_on() {
            return Ok(ZoneState {
                power,
                ..Default::default()
            });
        }
        Ok(ZoneState {
            power,
            source: self.client.source(self.zone).await?,
            volume: self.client.volume_level(self.zone).await?,
            muted: Some(self.client.muted(self.zone).await?),
            listening_mode: self.client.listening_mode(self.zone).await?,
        })
    }

    // ========== Power ==========

    /// Current power state
    pub async fn power_state(&self) -> Result<PowerState> {
        self.client.power_state(self.zone).await
    }

    /// Power the zone on
    pub async fn turn_on(&self) -> Result<()> {
        self.client.set_power(self.zone, true).await
    }

    /// Power the zone off
    pub async fn turn_off(&self) -> Result<()> {
        self.client.set_power(self.zone, false).await
    }

    /// Toggle power; returns the requested state
    pub async fn toggle(&self) -> Result<PowerState> {
        self.client.toggle_power(self.zone).await
    }

    // ========== Source ==========

    /// Current source name, if it resolves
    pub async fn source(&self) -> Result<Option<String>> {
        self.client.source(self.zone).await
    }

    /// Enabled source names of the device
    pub async fn source_list(&self) -> Result<Vec<String>> {
        self.client.sources().await
    }

    /// Select a source by name
    pub async fn select_source(&self, name: &str) -> Result<()> {
        self.client.set_source(self.zone, name).await
    }

    // ========== Volume ==========

    /// Normalized volume (0.0 to 1.0)
    pub async fn volume_level(&self) -> Result<Option<VolumeLevel>> {
        self.client.volume_level(self.zone).await
    }

    /// Set the normalized volume (0.0 to 1.0)
    pub async fn set_volume_level(&self, level: VolumeLevel) -> Result<()> {
        self.client.set_volume_level(self.zone, level).await
    }

    /// Step the volume up; returns the new level
    pub async fn volume_up(&self) -> Result<Option<VolumeLevel>> {
        self.client.volume_up(self.zone).await
    }

    /// Step the volume down; returns the new level
    pub async fn volume_down(&self) -> Result<Option<VolumeLevel>> {
        self.client.volume_down(self.zone).await
    }

    // ========== Mute ==========

    /// Whether the zone is muted
    pub async fn is_muted(&self) -> Result<bool> {
        self.client.muted(self.zone).await
    }

    /// Mute or unmute the zone
    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.client.set_mute(self.zone, mute).await
    }

    /// Flip the current mute state; returns the new state
    pub async fn toggle_mute(&self) -> Result<bool> {
        let mute = !self.client.muted(self.zone).await?;
        self.client.set_mute(self.zone, mute).await?;
        Ok(mute)
    }

    // ========== Listening mode ==========

    /// Listening mode; `None` outside the primary zone
    pub async fn listening_mode(&self) -> Result<Option<ListeningMode>> {
        self.client.listening_mode(self.zone).await
    }

    /// Select a listening mode by name
    pub async fn select_listening_mode(&self, mode: &str) -> Result<()> {
        self.client.set_listening_mode(self.zone, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{status_table, MockTransport};

    async fn shared_client() -> Arc<NadClient<MockTransport>> {
        let transport = MockTransport::new(status_table()).with_zone2();
        Arc::new(NadClient::with_transport(transport).await.unwrap())
    }

    #[tokio::test]
    async fn test_handles_address_their_own_zone() {
        let client = shared_client().await;
        let main = ZoneControl::new(client.clone(), Zone::Main);
        let zone2 = ZoneControl::new(client.clone(), Zone::Zone2);

        zone2.turn_on().await.unwrap();
        assert_eq!(client.transport().value("zone2_power").as_deref(), Some("On"));
        assert_eq!(main.power_state().await.unwrap(), PowerState::Off);

        assert!(main.supports_listening_mode());
        assert!(!zone2.supports_listening_mode());
    }

    #[tokio::test]
    async fn test_state_of_zone_that_is_off() {
        let client = shared_client().await;
        let zone2 = ZoneControl::new(client.clone(), Zone::Zone2);
        client.transport().clear_sent();

        let state = zone2.state().await.unwrap();
        assert_eq!(state, ZoneState {
            power: PowerState::Off,
            ..Default::default()
        });
        assert_eq!(client.transport().sent().len(), 1);
    }

    #[tokio::test]
    async fn test_state_of_zone_that_is_on() {
        let client = shared_client().await;
        let zone2 = ZoneControl::new(client.clone(), Zone::Zone2);
        zone2.turn_on().await.unwrap();
        zone2.select_source("CD").await.unwrap();

        let state = zone2.state().await.unwrap();
        assert_eq!(state.power, PowerState::On);
        assert_eq!(state.source.as_deref(), Some("CD"));
        assert_eq!(state.muted, Some(false));
        assert_eq!(state.listening_mode, None);
        assert!(state.volume.is_some());
    }

    #[tokio::test]
    async fn test_toggle_mute() {
        let client = shared_client().await;
        let main = ZoneControl::new(client, Zone::Main);
        assert!(main.toggle_mute().await.unwrap());
        assert!(main.is_muted().await.unwrap());
        assert!(!main.toggle_mute().await.unwrap());
    }
}
