//! Trip synchronization: stream reconciliation, per-stop listeners,
//! debounced count notifications, and trip completion.
//!
//! [`TripSyncManager`] is the facade: it owns the shared session, wires the
//! broadcast channels, and runs the stream-consumption and debounce loops.

mod completion;
mod debounce;
mod listeners;
mod reconciler;
mod types;

pub use completion::TripCompletionWatcher;
pub use debounce::CountChangeDebouncer;
pub use listeners::{ActionListenerManager, ListenerError};
pub use reconciler::StopReconciler;
pub use types::{
    CountChangeSender, CountNotificationSender, StopCountChange, StopCountNotification,
    StopCountStatus, TripEvent, TripEventSender,
};

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::arrival::{ArrivalCoordinator, ArrivalHandle, PromptEvent, PromptEventSender};
use crate::config::CoreConfig;
use crate::models::{DriverIdentity, Stop, TripActiveState};
use crate::providers::storage::keys;
use crate::providers::{DispatchFeed, JobScheduler, MapLink, ProfileStore};
use crate::session::{SharedSession, TripSession};

/// Facade over the synchronization core for one driver session.
pub struct TripSyncManager {
    config: CoreConfig,
    session: SharedSession,
    feed: Arc<dyn DispatchFeed>,
    reconciler: StopReconciler,
    completion: Arc<TripCompletionWatcher>,
    arrival: ArrivalHandle,
    events_tx: TripEventSender,
    count_tx: CountChangeSender,
    notifications_tx: CountNotificationSender,
    prompt_tx: PromptEventSender,
}

impl TripSyncManager {
    /// Build the core against its collaborators. The trip active state is
    /// derived once from the persisted dispatch identifiers.
    pub async fn new(
        config: CoreConfig,
        identity: DriverIdentity,
        feed: Arc<dyn DispatchFeed>,
        map: Arc<dyn MapLink>,
        store: Arc<dyn ProfileStore>,
        scheduler: Arc<dyn JobScheduler>,
    ) -> Result<Arc<Self>, SyncError> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let active = store
            .get(keys::ACTIVE_DISPATCH)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        let selected = store
            .get(keys::SELECTED_DISPATCH)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        let state = TripActiveState::from_dispatch_ids(active.as_deref(), selected.as_deref());
        let dispatch_id = selected.or(active).unwrap_or_default();
        info!(dispatch_id = %dispatch_id, ?state, "Initializing trip session");

        let session = TripSession::new(dispatch_id, state).shared();

        // Create broadcast channels; capacities follow expected burst sizes
        // (count tags can arrive one per stream record).
        let (events_tx, _) = broadcast::channel(64);
        let (count_tx, _) = broadcast::channel(64);
        let (notifications_tx, _) = broadcast::channel(16);
        let (prompt_tx, _) = broadcast::channel(32);

        let completion =
            TripCompletionWatcher::new(feed.clone(), map.clone(), events_tx.clone());
        let listeners = ActionListenerManager::new(
            session.clone(),
            feed.clone(),
            map.clone(),
            store.clone(),
            completion.clone(),
            events_tx.clone(),
            identity,
            config.listeners.empty_timeout(),
        );
        let reconciler = StopReconciler::new(
            session.clone(),
            store.clone(),
            listeners,
            count_tx.clone(),
            events_tx.clone(),
        );
        let arrival = ArrivalCoordinator::spawn(
            session.clone(),
            feed.clone(),
            map,
            store,
            scheduler,
            completion.clone(),
            prompt_tx.clone(),
            config.arrival.clone(),
        );

        Ok(Arc::new(Self {
            config,
            session,
            feed,
            reconciler,
            completion,
            arrival,
            events_tx,
            count_tx,
            notifications_tx,
            prompt_tx,
        }))
    }

    /// Shared handle to the trip state store.
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Subscribe to trip lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TripEvent> {
        self.events_tx.subscribe()
    }

    /// Subscribe to debounced stop-count notifications.
    pub fn count_notifications(&self) -> broadcast::Receiver<StopCountNotification> {
        self.notifications_tx.subscribe()
    }

    /// Subscribe to arrival prompt UI events.
    pub fn prompt_events(&self) -> broadcast::Receiver<PromptEvent> {
        self.prompt_tx.subscribe()
    }

    /// Front door to the arrival confirmation coordinator.
    pub fn arrival(&self) -> ArrivalHandle {
        self.arrival.clone()
    }

    /// The single-flight trip completion watcher.
    pub fn completion(&self) -> Arc<TripCompletionWatcher> {
        self.completion.clone()
    }

    /// Start the background loops; runs until the change stream ends.
    pub async fn start(self: Arc<Self>) {
        info!("Starting trip sync manager");

        let debouncer = CountChangeDebouncer::new(
            self.session.clone(),
            self.config.debounce.window(),
            self.notifications_tx.clone(),
        );
        let count_rx = self.count_tx.subscribe();
        let debounce_handle = tokio::spawn(debouncer.run(count_rx));

        let stream_self = self.clone();
        let stream_handle = tokio::spawn(async move {
            stream_self.run_stop_stream().await;
        });

        // Wait for both loops (the stream loop runs until the feed closes)
        let _ = tokio::join!(debounce_handle, stream_handle);
    }

    async fn run_stop_stream(&self) {
        let dispatch_id = self.session.read().await.dispatch_id().to_string();
        let max_attempts = self.config.retry.max_attempts;
        let mut attempt = 0;

        let mut stream = loop {
            attempt += 1;
            match self.feed.stop_batches(&dispatch_id).await {
                Ok(stream) => break stream,
                Err(e) => {
                    if attempt >= max_attempts {
                        error!(
                            dispatch_id = %dispatch_id,
                            error = %e,
                            attempts = attempt,
                            "Failed to open stop stream after max retries"
                        );
                        let _ = self.events_tx.send(TripEvent::ConnectivityHint {
                            message: "stop change stream unavailable".into(),
                        });
                        return;
                    }
                    warn!(error = %e, attempt, "Failed to open stop stream, retrying...");
                    tokio::time::sleep(self.config.retry.backoff(attempt)).await;
                }
            }
        };

        info!(dispatch_id = %dispatch_id, "Consuming stop change stream");
        while let Some(batch) = stream.next().await {
            self.reconciler.apply_batch(batch).await;
        }
        info!(dispatch_id = %dispatch_id, "Stop change stream ended");
    }

    /// Read the current stop, retrying while the initial load races us.
    ///
    /// After the retry ceiling a connectivity hint is surfaced and the
    /// caller gets an error; the worst case is a degraded view, never a
    /// crash.
    pub async fn current_stop_with_retry(&self) -> Result<Stop, SyncError> {
        let max_attempts = self.config.retry.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(stop) = self.session.read().await.current_stop() {
                return Ok(stop);
            }
            if attempt >= max_attempts {
                warn!(attempts = attempt, "Current stop still unavailable");
                let _ = self.events_tx.send(TripEvent::ConnectivityHint {
                    message: "current stop unavailable, check connectivity".into(),
                });
                return Err(SyncError::NotYetAvailable("current stop".into()));
            }
            tokio::time::sleep(self.config.retry.backoff(attempt)).await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("{0} not available yet")]
    NotYetAvailable(String),
}
