use crate::capabilities::DeviceCapabilities;
use crate::config::ClientConfig;
use crate::connection::{Connection, Transport};
use crate::error::{NadError, Result};
use crate::protocol::{self, Control, Operator, Parameter, Request};
use crate::types::{
    on_off_token, ListeningMode, PowerState, SlotId, Snapshot, VolumeLevel, Zone, ZoneState,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Client for one NAD amplifier
///
/// `NadClient` owns the transport to the device and the capabilities read from
/// it, and exposes normalized per-zone getters and setters. Every getter
/// re-queries the device; only the capabilities are cached.
pub struct NadClient<T = Connection> {
    transport: T,
    capabilities: Mutex<Option<Arc<DeviceCapabilities>>>,
}

impl NadClient<Connection> {
    /// Connect to an amplifier and read its capabilities
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nad_remote::{NadClient, Zone};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = NadClient::connect("192.168.1.60", 23).await?;
    ///     client.set_power(Zone::Main, true).await?;
    ///     client.set_volume_level(Zone::Main, 0.4).await?;
    ///     println!("sources: {:?}", client.sources().await?);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::with_transport(Connection::new(host, port)).await
    }

    /// Connect using the host, port and timeouts from `config`
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Self::with_transport(Connection::from_config(config)).await
    }

    /// Check that `config` points at a supported amplifier.
    ///
    /// Used when validating user-entered connection details; never fails.
    pub async fn check_connection(config: &ClientConfig) -> bool {
        tracing::debug!("Checking connection to amplifier at {}:{}", config.host, config.port);
        let connection = Connection::from_config(config).with_request_timeout(config.probe_timeout());
        let client = Self::lazy(connection);
        match client.model().await {
            Ok(Some(model)) => {
                tracing::debug!("Amplifier model={}", model);
                true
            }
            Ok(None) => {
                tracing::error!("Amplifier model not supported");
                false
            }
            Err(e) => {
                tracing::warn!("Connection check failed: {}", e);
                false
            }
        }
    }
}

impl<T: Transport> NadClient<T> {
    /// Wrap a transport and read the device capabilities.
    ///
    /// Fails if the device cannot be reached or reports no status.
    pub async fn with_transport(transport: T) -> Result<Self> {
        let client = Self::lazy(transport);
        client.capabilities().await?;
        Ok(client)
    }

    /// Wrap a transport without contacting the device
    pub fn lazy(transport: T) -> Self {
        Self {
            transport,
            capabilities: Mutex::new(None),
        }
    }

    /// Underlying transport
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    async fn query(&self, zone: Zone, control: Control) -> Result<String> {
        self.transport
            .send(&Request::query(Parameter::new(zone, control)))
            .await
    }

    async fn set(&self, zone: Zone, control: Control, argument: impl ToString) -> Result<String> {
        self.transport
            .send(&Request::set(Parameter::new(zone, control), argument))
            .await
    }

    /// Model name, or `None` if the reply does not look like a NAD model
    pub async fn model(&self) -> Result<Option<String>> {
        let reply = self.transport.send(&Request::query(Parameter::model())).await?;
        if protocol::is_model_name(&reply) {
            tracing::debug!("Amplifier model='{}'", reply);
            Ok(Some(reply))
        } else {
            tracing::debug!("Amplifier model '{}' not recognised", reply);
            Ok(None)
        }
    }

    // ========== Capabilities ==========

    /// Cached capabilities, fetched from the device on first use
    pub async fn capabilities(&self) -> Result<Arc<DeviceCapabilities>> {
        let mut cached = self.capabilities.lock().await;
        if let Some(caps) = cached.as_ref() {
            return Ok(caps.clone());
        }

        tracing::debug!("Fetching amplifier capabilities");
        let table = self.transport.status_all().await?;
        let has_zone2 = self.probe_zone2().await?;
        let caps = Arc::new(DeviceCapabilities::from_table(table, has_zone2)?);
        tracing::info!(
            "Amplifier has {} source(s), zone2={}",
            caps.sources().len(),
            caps.has_zone2()
        );
        *cached = Some(caps.clone());
        Ok(caps)
    }

    /// Forget the cached capabilities; the next call re-reads them
    pub async fn invalidate_capabilities(&self) {
        if self.capabilities.lock().await.take().is_some() {
            tracing::debug!("Capabilities invalidated");
        }
    }

    /// Some firmware leaves zone 2 out of the status table, so ask the zone itself
    async fn probe_zone2(&self) -> Result<bool> {
        let request = Request::query(Parameter::new(Zone::Zone2, Control::Source));
        match self.transport.probe(&request).await {
            Ok(_) => Ok(true),
            Err(NadError::Rejected { .. }) => Ok(false),
            Err(NadError::Timeout) => {
                tracing::warn!("No reply from Zone2, assuming it is absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the device has a secondary zone
    pub async fn has_zone2(&self) -> Result<bool> {
        Ok(self.capabilities().await?.has_zone2())
    }

    /// Zones present on the device, primary first
    pub async fn zones(&self) -> Result<Vec<Zone>> {
        Ok(self.capabilities().await?.zones())
    }

    /// Enabled source names in ascending slot order
    pub async fn sources(&self) -> Result<Vec<String>> {
        Ok(self.capabilities().await?.sources())
    }

    // ========== Power ==========

    /// Power state of a zone; unrecognised tokens map to `Unknown`
    pub async fn power_state(&self, zone: Zone) -> Result<PowerState> {
        let token = self.query(zone, Control::Power).await?;
        let state = PowerState::from_token(&token);
        if state == PowerState::Unknown {
            tracing::warn!("Unrecognised power state for {}: '{}'", zone, token);
        }
        Ok(state)
    }

    /// Turn a zone on or off
    pub async fn set_power(&self, zone: Zone, on: bool) -> Result<()> {
        tracing::debug!("Setting {} power {}", zone, on_off_token(on));
        self.set(zone, Control::Power, on_off_token(on)).await?;
        Ok(())
    }

    /// Turn an off zone on and anything else off; returns the requested state
    pub async fn toggle_power(&self, zone: Zone) -> Result<PowerState> {
        let on = self.power_state(zone).await? == PowerState::Off;
        self.set_power(zone, on).await?;
        Ok(if on { PowerState::On } else { PowerState::Off })
    }

    // ========== Source ==========

    /// Current source name; `None` if the slot cannot be resolved
    pub async fn source(&self, zone: Zone) -> Result<Option<String>> {
        let caps = self.capabilities().await?;
        let reply = self.query(zone, Control::Source).await?;
        let name = reply
            .trim()
            .parse::<SlotId>()
            .ok()
            .and_then(|slot| caps.source_name(slot));
        match name {
            Some(name) => Ok(Some(name.to_string())),
            None => {
                tracing::error!("Unknown source '{}' on {}", reply, zone);
                Ok(None)
            }
        }
    }

    /// Select a source by name; unknown names are logged and not sent
    pub async fn set_source(&self, zone: Zone, name: &str) -> Result<()> {
        let caps = self.capabilities().await?;
        let Some(slot) = caps.source_slot(name) else {
            tracing::error!("Unknown source '{}' for {}", name, zone);
            return Ok(());
        };
        tracing::debug!("Selecting source '{}' (slot {}) on {}", name, slot, zone);
        self.set(zone, Control::Source, slot).await?;
        Ok(())
    }

    // ========== Volume ==========

    /// Normalized volume; `None` when the device reports a non-numeric level
    pub async fn volume_level(&self, zone: Zone) -> Result<Option<VolumeLevel>> {
        let caps = self.capabilities().await?;
        let reply = self.query(zone, Control::Volume).await?;
        Ok(parse_db(zone, &reply).map(|db| caps.volume_range(zone).to_normalized(db)))
    }

    /// Set the normalized volume, truncated to whole device dB
    pub async fn set_volume_level(&self, zone: Zone, level: VolumeLevel) -> Result<()> {
        let range = self.capabilities().await?.volume_range(zone);
        let db = range.from_normalized(level);
        tracing::debug!("Setting {} volume {:.3} -> {} dB", zone, level, db);
        self.set(zone, Control::Volume, db).await?;
        Ok(())
    }

    /// Step the volume up by the device's own increment
    pub async fn volume_up(&self, zone: Zone) -> Result<Option<VolumeLevel>> {
        self.step_volume(zone, Operator::Increment).await
    }

    /// Step the volume down by the device's own increment
    pub async fn volume_down(&self, zone: Zone) -> Result<Option<VolumeLevel>> {
        self.step_volume(zone, Operator::Decrement).await
    }

    async fn step_volume(&self, zone: Zone, operator: Operator) -> Result<Option<VolumeLevel>> {
        let range = self.capabilities().await?.volume_range(zone);
        let request = Request::new(Parameter::new(zone, Control::Volume), operator);
        let reply = self.transport.send(&request).await?;
        Ok(parse_db(zone, &reply).map(|db| range.to_normalized(db)))
    }

    // ========== Mute ==========

    /// Whether a zone is muted
    pub async fn muted(&self, zone: Zone) -> Result<bool> {
        let token = self.query(zone, Control::Mute).await?;
        match PowerState::from_token(&token) {
            PowerState::On => Ok(true),
            PowerState::Off => Ok(false),
            PowerState::Unknown => Err(NadError::Protocol(format!(
                "unexpected mute state for {}: '{}'",
                zone, token
            ))),
        }
    }

    /// Mute or unmute a zone
    pub async fn set_mute(&self, zone: Zone, mute: bool) -> Result<()> {
        tracing::debug!("Setting {} mute {}", zone, on_off_token(mute));
        self.set(zone, Control::Mute, on_off_token(mute)).await?;
        Ok(())
    }

    // ========== Listening mode ==========

    /// Listening mode of the primary zone; always `None` for the secondary zone
    pub async fn listening_mode(&self, zone: Zone) -> Result<Option<ListeningMode>> {
        if !zone.is_primary() {
            return Ok(None);
        }
        let token = self.query(zone, Control::ListeningMode).await?;
        match token.parse::<ListeningMode>() {
            Ok(mode) => Ok(Some(mode)),
            Err(_) => {
                tracing::warn!("Unrecognised listening mode '{}'", token);
                Ok(None)
            }
        }
    }

    /// Select a listening mode by name; ignored on the secondary zone and for unknown names
    pub async fn set_listening_mode(&self, zone: Zone, mode: &str) -> Result<()> {
        if !zone.is_primary() {
            tracing::debug!("Listening mode is not supported on {}", zone);
            return Ok(());
        }
        let mode = match mode.parse::<ListeningMode>() {
            Ok(mode) => mode,
            Err(e) => {
                tracing::error!("{}", e);
                return Ok(());
            }
        };
        tracing::debug!("Setting listening mode {}", mode);
        self.set(zone, Control::ListeningMode, mode.token()).await?;
        Ok(())
    }

    // ========== Refresh ==========

    /// Read the state of every zone.
    ///
    /// Volume, mute and source are only read for zones that are on. A field
    /// whose reply cannot be interpreted is left empty; transport failures
    /// abort the whole cycle.
    pub async fn refresh(&self) -> Result<Snapshot> {
        let caps = self.capabilities().await?;
        let mut snapshot = Snapshot::default();

        for zone in caps.zones() {
            let mut state = ZoneState {
                power: absorb(zone, "power", self.power_state(zone).await)?.unwrap_or_default(),
                ..Default::default()
            };
            if state.power.is_on() {
                state.volume = absorb(zone, "volume", self.volume_level(zone).await)?.flatten();
                state.muted = absorb(zone, "mute", self.muted(zone).await)?;
                state.source = absorb(zone, "source", self.source(zone).await)?.flatten();
            }
            snapshot.zones.insert(zone, state);
        }

        if snapshot.any_on() {
            snapshot.sources = caps.sources();
            snapshot.listening_mode =
                absorb(Zone::Main, "listening mode", self.listening_mode(Zone::Main).await)?.flatten();
            if let Some(main) = snapshot.zones.get_mut(&Zone::Main) {
                main.listening_mode = snapshot.listening_mode;
            }
        }

        tracing::debug!("Refreshed {} zone(s)", snapshot.zones.len());
        Ok(snapshot)
    }
}

/// Keep a refresh going past a field the device answered badly
fn absorb<V>(zone: Zone, field: &str, result: Result<V>) -> Result<Option<V>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_connection_fault() => Err(e),
        Err(e) => {
            tracing::warn!("Failed to read {} {}: {}", zone, field, e);
            Ok(None)
        }
    }
}

/// Parse a dB reading; anything non-numeric means the level is unavailable
fn parse_db(zone: Zone, reply: &str) -> Option<f64> {
    match reply.trim().parse::<f64>() {
        Ok(db) if db.is_finite() => Some(db),
        _ => {
            tracing::warn!("Unsupported volume status for {}: '{}'", zone, reply);
            None
        }
    }
}
