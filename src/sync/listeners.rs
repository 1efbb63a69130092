use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{Action, ActionKey, ActionRecord, DriverIdentity, Stop};
use crate::providers::storage::keys;
use crate::providers::{DispatchFeed, MapLink, ProfileStore};
use crate::session::SharedSession;
use crate::sync::completion::TripCompletionWatcher;
use crate::sync::types::{TripEvent, TripEventSender};

/// Per-stop action subscription lifecycle.
///
/// `subscribe` is last-writer-wins: it supersedes any existing listener for
/// the stop. Cancellation alone is best-effort (an in-flight emission can
/// outlive the abort), so every merge carries the generation it was
/// subscribed under and the session rejects stale ones.
pub struct ActionListenerManager {
    session: SharedSession,
    feed: Arc<dyn DispatchFeed>,
    map: Arc<dyn MapLink>,
    store: Arc<dyn ProfileStore>,
    completion: Arc<TripCompletionWatcher>,
    events_tx: TripEventSender,
    identity: DriverIdentity,
    empty_timeout: Duration,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ActionListenerManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: SharedSession,
        feed: Arc<dyn DispatchFeed>,
        map: Arc<dyn MapLink>,
        store: Arc<dyn ProfileStore>,
        completion: Arc<TripCompletionWatcher>,
        events_tx: TripEventSender,
        identity: DriverIdentity,
        empty_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            feed,
            map,
            store,
            completion,
            events_tx,
            identity,
            empty_timeout,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Start (or restart) the action listener for one stop.
    pub async fn subscribe(self: &Arc<Self>, stop: &Stop) {
        let generation = self.session.write().await.bump_generation(&stop.stop_id);

        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.remove(&stop.stop_id) {
            previous.abort();
        }

        let this = Arc::clone(self);
        let stop_id = stop.stop_id.clone();
        let dispatch_id = stop.dispatch_id.clone();
        let handle = tokio::spawn(async move {
            if let Err(error) = this.run_listener(&stop_id, &dispatch_id, generation).await {
                warn!(
                    stop_id = %stop_id,
                    dispatch_id = %dispatch_id,
                    error = %error,
                    "Action listener failed"
                );
                this.session.write().await.record_read_failure(&stop_id);
                let _ = this.events_tx.send(TripEvent::StopReadFailed {
                    stop_id: stop_id.clone(),
                });
            }
        });
        jobs.insert(stop.stop_id.clone(), handle);
    }

    /// Stop listening for a removed stop.
    pub async fn cancel(&self, stop_id: &str) {
        if let Some(handle) = self.jobs.lock().await.remove(stop_id) {
            handle.abort();
        }
    }

    async fn run_listener(
        &self,
        stop_id: &str,
        dispatch_id: &str,
        generation: u64,
    ) -> Result<(), ListenerError> {
        let key = ActionKey {
            customer_id: self.identity.customer_id.clone(),
            vehicle_id: self.identity.vehicle_id.clone(),
            dispatch_id: dispatch_id.to_string(),
            stop_id: stop_id.to_string(),
        };

        let state = self.session.read().await.active_state();
        if !state.live_subscription() {
            // Previewed trips get a point read instead of a subscription and
            // do not count toward the geofence gate.
            let records = self.feed.fetch_actions(&key).await?;
            return self
                .apply_emission(stop_id, dispatch_id, generation, records, false)
                .await;
        }

        let mut stream = self.feed.action_updates(&key).await?;

        match tokio::time::timeout(self.empty_timeout, stream.next()).await {
            Err(_) => {
                warn!(stop_id = %stop_id, "No actions received before timeout");
                let _ = self.events_tx.send(TripEvent::ConnectivityHint {
                    message: format!("no actions received for stop {stop_id}"),
                });
            }
            Ok(None) => return Ok(()),
            Ok(Some(records)) => {
                self.apply_emission(stop_id, dispatch_id, generation, records, true)
                    .await?;
            }
        }

        while let Some(records) = stream.next().await {
            self.apply_emission(stop_id, dispatch_id, generation, records, true)
                .await?;
        }
        Ok(())
    }

    async fn apply_emission(
        &self,
        stop_id: &str,
        dispatch_id: &str,
        generation: u64,
        records: Vec<ActionRecord>,
        gate_push: bool,
    ) -> Result<(), ListenerError> {
        if records.is_empty() {
            return Ok(());
        }
        let actions: Vec<Action> = records.into_iter().map(Action::from).collect();

        let merge = self
            .session
            .write()
            .await
            .merge_actions(stop_id, generation, actions);
        let Some(merge) = merge else {
            debug!(stop_id = %stop_id, generation, "Discarding superseded action emission");
            return Ok(());
        };

        // External consumers read these between sessions, so keep them
        // current on every merge.
        let snapshot = serde_json::to_string(&merge.incomplete_ordered)
            .map_err(|e| ListenerError::Encode(e.to_string()))?;
        self.store
            .put(&keys::incomplete_stops(dispatch_id), &snapshot)
            .await?;
        self.store
            .put(
                &keys::form_count(stop_id),
                &merge.uncompleted_form_count.to_string(),
            )
            .await?;

        if !merge.new_forms.is_empty() {
            self.feed.sync_forms(&merge.new_forms).await?;
        }

        if merge.stop_completed {
            let _ = self.events_tx.send(TripEvent::StopCompleted {
                stop_id: stop_id.to_string(),
            });
            self.completion.check_completion(dispatch_id).await;
        }

        if gate_push {
            let fired = self.session.write().await.record_actions_read(stop_id);
            if let Some(stops) = fired {
                let state = self.session.read().await.active_state();
                self.map.push_geofences(&stops).await;
                let _ = self.events_tx.send(TripEvent::GeofencesPushed {
                    stop_count: stops.len(),
                });
                if state.side_effects_permitted() {
                    self.map.request_route_recalculation(dispatch_id).await;
                    let _ = self.events_tx.send(TripEvent::RouteRecalculated {
                        dispatch_id: dispatch_id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Feed error: {0}")]
    Feed(#[from] crate::providers::FeedError),
    #[error("Storage error: {0}")]
    Store(#[from] crate::providers::StoreError),
    #[error("Encode error: {0}")]
    Encode(String),
}
