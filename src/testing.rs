//! In-memory transport for unit tests

use crate::connection::Transport;
use crate::error::{NadError, Result};
use crate::protocol::{Operator, Request};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Failure = fn() -> NadError;

/// Status table of a small amplifier with one enabled source
pub(crate) fn status_table() -> BTreeMap<String, String> {
    [
        ("source1_name", "CD"),
        ("source1_enabled", "Yes"),
        ("source2_enabled", "No"),
        ("main_volume_min", "-90"),
        ("main_volume_max", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Fake amplifier keyed by parameter key (`main_power`).
///
/// Queries for keys it does not hold are rejected, the way a device without
/// the parameter would.
pub(crate) struct MockTransport {
    table: BTreeMap<String, String>,
    values: Mutex<BTreeMap<String, String>>,
    sent: Mutex<Vec<Request>>,
    failures: Mutex<BTreeMap<String, Failure>>,
    status_failure: Mutex<Option<Failure>>,
    status_calls: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub(crate) fn new(table: BTreeMap<String, String>) -> Self {
        let values = [
            ("main_model", "C368"),
            ("main_power", "Off"),
            ("main_volume", "-30"),
            ("main_mute", "Off"),
            ("main_source", "1"),
            ("main_listeningmode", "Stereo"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            table,
            values: Mutex::new(values),
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(BTreeMap::new()),
            status_failure: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            latency: Mutex::new(None),
        }
    }

    pub(crate) fn with_zone2(self) -> Self {
        for (key, value) in [
            ("zone2_power", "Off"),
            ("zone2_volume", "-30"),
            ("zone2_mute", "Off"),
            ("zone2_source", "1"),
        ] {
            self.set_value(key, value);
        }
        self
    }

    pub(crate) fn set_value(&self, key: &str, value: &str) {
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    /// Make every request for `key` fail
    pub(crate) fn fail(&self, key: &str, failure: Failure) {
        self.failures.lock().unwrap().insert(key.to_string(), failure);
    }

    pub(crate) fn recover(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    pub(crate) fn fail_status(&self, failure: Failure) {
        *self.status_failure.lock().unwrap() = Some(failure);
    }

    /// Delay every later reply by `latency`
    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub(crate) fn sent(&self) -> Vec<Request> {
        self.sent.lock().unwrap().clone()
    }

    /// Requests that change device state
    pub(crate) fn writes(&self) -> Vec<Request> {
        self.sent()
            .into_iter()
            .filter(|r| r.operator != Operator::Query)
            .collect()
    }

    pub(crate) fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &Request) -> Result<String> {
        request.validate()?;
        self.sent.lock().unwrap().push(request.clone());
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let key = request.parameter.key();
        if let Some(failure) = self.failures.lock().unwrap().get(&key) {
            return Err(failure());
        }

        let rejected = || NadError::Rejected {
            parameter: request.parameter.wire_name(),
            value: request.argument.clone(),
        };
        let mut values = self.values.lock().unwrap();
        match request.operator {
            Operator::Query => values.get(&key).cloned().ok_or_else(rejected),
            Operator::Set => {
                let arg = request.argument.clone().ok_or_else(rejected)?;
                values.insert(key, arg.clone());
                Ok(arg)
            }
            Operator::Increment | Operator::Decrement => {
                let current: i32 = values
                    .get(&key)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(rejected)?;
                let next = if request.operator == Operator::Increment {
                    current + 1
                } else {
                    current - 1
                };
                values.insert(key, next.to_string());
                Ok(next.to_string())
            }
        }
    }

    async fn status_all(&self) -> Result<BTreeMap<String, String>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.status_failure.lock().unwrap() {
            return Err(failure());
        }
        if self.table.is_empty() {
            return Err(NadError::NoData);
        }
        Ok(self.table.clone())
    }
}
