use crate::error::{NadError, Result};
use crate::types::Snapshot;
use tokio::sync::broadcast;

/// Outcome of one refresh cycle
#[derive(Debug, Clone)]
pub enum CoordinatorUpdate {
    /// Fresh state was read from the amplifier
    Refreshed(Box<Snapshot>),

    /// The cycle failed; previously published state is now stale
    Failed(String),
}

/// Receiver for coordinator updates
pub struct SnapshotReceiver {
    rx: broadcast::Receiver<CoordinatorUpdate>,
}

impl SnapshotReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<CoordinatorUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next update
    ///
    /// Fails once the coordinator has been dropped.
    pub async fn recv(&mut self) -> Result<CoordinatorUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => {
                NadError::ChannelError("coordinator stopped".to_string())
            }
            broadcast::error::RecvError::Lagged(n) => {
                NadError::ChannelError(format!("Lagged by {} updates", n))
            }
        })
    }

    /// Try to receive an update without waiting
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<CoordinatorUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => {
                Err(NadError::ChannelError("coordinator stopped".to_string()))
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(NadError::ChannelError(format!("Lagged by {} updates", n)))
            }
        }
    }
}
