use crate::client::NadClient;
use crate::connection::{Connection, Transport};
use crate::error::Result;
use crate::subscription::{CoordinatorUpdate, SnapshotReceiver};
use crate::types::{Snapshot, Zone};
use crate::zone::ZoneControl;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Last known result of the polling loop
#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    /// Last successfully read snapshot; kept while later cycles fail
    pub data: Option<Snapshot>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    /// Failed cycles since the last success
    pub consecutive_failures: u32,
}

/// Polls an amplifier on a fixed interval
///
/// Each tick runs [`NadClient::refresh`]. A failed cycle keeps the previous
/// snapshot, marks it stale and is retried on the next tick.
///
/// # Example
///
/// ```no_run
/// use nad_remote::{Coordinator, NadClient};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(NadClient::connect("192.168.1.60", 23).await?);
///     let mut coordinator = Coordinator::new(client, Duration::from_secs(30));
///     coordinator.first_refresh().await?;
///
///     let mut updates = coordinator.subscribe();
///     coordinator.start();
///     while let Ok(update) = updates.recv().await {
///         println!("{:?}", update);
///     }
///     Ok(())
/// }
/// ```
pub struct Coordinator<T: Transport + 'static = Connection> {
    client: Arc<NadClient<T>>,
    interval: Duration,
    state: Arc<Mutex<CoordinatorState>>,
    update_tx: broadcast::Sender<CoordinatorUpdate>,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl<T: Transport + 'static> Coordinator<T> {
    /// Create a stopped coordinator polling `client` every `interval`
    pub fn new(client: Arc<NadClient<T>>, interval: Duration) -> Self {
        let (update_tx, _) = broadcast::channel(16);
        Self {
            client,
            interval,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            update_tx,
            stop_tx: None,
            task_handle: None,
        }
    }

    /// Shared client used for polling
    pub fn client(&self) -> Arc<NadClient<T>> {
        self.client.clone()
    }

    /// Polling interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle for one zone, sharing this coordinator's client
    pub fn zone(&self, zone: Zone) -> ZoneControl<T> {
        ZoneControl::new(self.client.clone(), zone)
    }

    /// Subscribe to the outcome of every cycle
    pub fn subscribe(&self) -> SnapshotReceiver {
        SnapshotReceiver::new(self.update_tx.subscribe())
    }

    /// Copy of the current polling state
    pub fn state(&self) -> CoordinatorState {
        lock_state(&self.state).clone()
    }

    /// Last successfully read snapshot
    pub fn data(&self) -> Option<Snapshot> {
        lock_state(&self.state).data.clone()
    }

    /// Whether the most recent cycle succeeded
    pub fn last_update_success(&self) -> bool {
        lock_state(&self.state).last_update_success
    }

    /// Run the first cycle; an error means the device is not ready
    pub async fn first_refresh(&self) -> Result<Snapshot> {
        run_cycle(&self.client, &self.state, &self.update_tx).await
    }

    /// Refresh now, e.g. right after a user command; returns whether it succeeded
    pub async fn request_refresh(&self) -> bool {
        run_cycle(&self.client, &self.state, &self.update_tx)
            .await
            .is_ok()
    }

    /// Whether the polling task is alive
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start polling; the first tick fires one interval from now.
    ///
    /// If polling is already running it is restarted.
    pub fn start(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx);

        let client = self.client.clone();
        let state = self.state.clone();
        let update_tx = self.update_tx.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Polling amplifier every {:?}", period);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Polling stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let _ = run_cycle(&client, &state, &update_tx).await;
                    }
                }
            }
        });

        self.task_handle = Some(handle);
    }

    /// Stop polling; the last known state stays available
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.task_handle.take() {
            // an in-flight refresh is allowed to finish its current request
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Polling task did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

impl<T: Transport + 'static> Drop for Coordinator<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

fn lock_state(state: &Mutex<CoordinatorState>) -> std::sync::MutexGuard<'_, CoordinatorState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_cycle<T: Transport>(
    client: &Arc<NadClient<T>>,
    state: &Arc<Mutex<CoordinatorState>>,
    update_tx: &broadcast::Sender<CoordinatorUpdate>,
) -> Result<Snapshot> {
    tracing::debug!("Updating data via coordinator");
    let result = client.refresh().await;

    match &result {
        Ok(snapshot) => {
            {
                let mut state = lock_state(state);
                state.data = Some(snapshot.clone());
                state.last_update_success = true;
                state.last_error = None;
                state.consecutive_failures = 0;
            }
            let _ = update_tx.send(CoordinatorUpdate::Refreshed(Box::new(snapshot.clone())));
        }
        Err(e) => {
            tracing::error!("Error updating state: {}", e);
            {
                let mut state = lock_state(state);
                state.last_update_success = false;
                state.last_error = Some(e.to_string());
                state.consecutive_failures += 1;
            }
            let _ = update_tx.send(CoordinatorUpdate::Failed(e.to_string()));
        }
    }

    result
}
