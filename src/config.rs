use crate::connection::{BULK_IDLE_TIMEOUT, DEFAULT_PORT, PROBE_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::{NadError, Result};
use crate::types::Zone;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and polling settings for one amplifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Display name, also the stem of entity names
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Bound for probes such as the secondary-zone check
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Quiet gap that ends a bulk status dump
    #[serde(default = "default_bulk_idle_ms")]
    pub bulk_idle_ms: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_name() -> String {
    "NAD".to_string()
}

fn default_request_timeout_ms() -> u64 {
    REQUEST_TIMEOUT.as_millis() as u64
}

fn default_probe_timeout_ms() -> u64 {
    PROBE_TIMEOUT.as_millis() as u64
}

fn default_bulk_idle_ms() -> u64 {
    BULK_IDLE_TIMEOUT.as_millis() as u64
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Config for `host` with every other setting at its default
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            name: default_name(),
            request_timeout_ms: default_request_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            bulk_idle_ms: default_bulk_idle_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }

    /// Set the TCP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty hosts, port 0 and zero durations
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(NadError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(NadError::Config("port must not be 0".to_string()));
        }
        if self.request_timeout_ms == 0 || self.probe_timeout_ms == 0 || self.bulk_idle_ms == 0 {
            return Err(NadError::Config("timeouts must be positive".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(NadError::Config("poll interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Bound on one request/reply exchange
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Bound on probes and connection checks
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Quiet gap that ends the bulk status dump
    pub fn bulk_idle(&self) -> Duration {
        Duration::from_millis(self.bulk_idle_ms)
    }

    /// Time between coordinator refreshes
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Stable identifier of the device
    pub fn unique_id(&self) -> String {
        format!("{} ({})", self.name, self.host)
    }

    /// Name of the entity that represents `zone`
    pub fn entity_name(&self, zone: Zone) -> String {
        format!("{} ({})", self.name, zone)
    }
}
