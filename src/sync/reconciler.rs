use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::StopRecord;
use crate::providers::storage::keys;
use crate::providers::{ProfileStore, StopBatch};
use crate::session::{CountShift, SharedSession};
use crate::sync::listeners::ActionListenerManager;
use crate::sync::types::{
    CountChangeSender, StopCountChange, StopCountStatus, TripEvent, TripEventSender,
};

/// Turns raw change-stream batches into consistent trip state.
///
/// Each record is classified as add-or-update (merge by id) or removal
/// (soft-delete marker). Add/remove detection compares list size against the
/// count observed after the previous record, so mixed batches surface every
/// shift; the store itself stays correct because merges are by id.
pub struct StopReconciler {
    session: SharedSession,
    store: Arc<dyn ProfileStore>,
    listeners: Arc<ActionListenerManager>,
    count_tx: CountChangeSender,
    events_tx: TripEventSender,
}

impl StopReconciler {
    pub fn new(
        session: SharedSession,
        store: Arc<dyn ProfileStore>,
        listeners: Arc<ActionListenerManager>,
        count_tx: CountChangeSender,
        events_tx: TripEventSender,
    ) -> Self {
        Self {
            session,
            store,
            listeners,
            count_tx,
            events_tx,
        }
    }

    /// Apply one emission of the change stream.
    pub async fn apply_batch(&self, batch: StopBatch) {
        if batch.is_empty() {
            // The caller decides the UX (offline banner); this is not an error.
            info!("Change stream returned no stops");
            let _ = self.events_tx.send(TripEvent::NoStopsAvailable);
            return;
        }

        let first_read = !self.session.read().await.first_read_complete();
        let batch_size = batch.len();

        for value in batch {
            let record: StopRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(error) => {
                    warn!(error = %error, "Skipping malformed stop record");
                    continue;
                }
            };
            if record.is_deleted() {
                self.apply_removal(&record, first_read).await;
            } else {
                self.apply_upsert(&record, first_read).await;
            }
        }

        debug!(batch_size, first_read, "Applied stop batch");
        self.finish_batch(first_read).await;
    }

    async fn apply_upsert(&self, record: &StopRecord, first_read: bool) {
        let (shift, newly_manipulated) = {
            let mut session = self.session.write().await;
            let shift = session.merge_stop(record);
            let newly = shift == CountShift::Grew
                && !first_read
                && session.dispatch_id() == record.dispatch_id
                && session.mark_manipulated();
            (shift, newly)
        };

        if shift == CountShift::Grew && !first_read {
            debug!(stop_id = %record.stop_id, "Stop added after initial load");
            // Ignore send errors - they just mean no one is listening
            let _ = self.count_tx.send(StopCountChange {
                status: StopCountStatus::Added,
            });
        }
        if newly_manipulated {
            let _ = self.events_tx.send(TripEvent::TripManipulated {
                dispatch_id: record.dispatch_id.clone(),
            });
        }
    }

    async fn apply_removal(&self, record: &StopRecord, first_read: bool) {
        let (shift, newly_manipulated) = {
            let mut session = self.session.write().await;
            let shift = session.remove_stop(&record.stop_id);
            let newly = shift == CountShift::Shrank
                && !first_read
                && session.dispatch_id() == record.dispatch_id
                && session.mark_manipulated();
            (shift, newly)
        };

        if shift == CountShift::Shrank {
            debug!(stop_id = %record.stop_id, "Stop removed");
            self.listeners.cancel(&record.stop_id).await;
            if let Err(error) = self.store.delete(&keys::form_count(&record.stop_id)).await {
                warn!(
                    stop_id = %record.stop_id,
                    error = %error,
                    "Failed to clear form count for removed stop"
                );
            }
            if !first_read {
                let _ = self.count_tx.send(StopCountChange {
                    status: StopCountStatus::Removed,
                });
            }
        }
        if newly_manipulated {
            let _ = self.events_tx.send(TripEvent::TripManipulated {
                dispatch_id: record.dispatch_id.clone(),
            });
        }
    }

    async fn finish_batch(&self, first_read: bool) {
        let (candidate, stops, dispatch_id) = {
            let mut session = self.session.write().await;
            if first_read {
                session.mark_first_read_complete();
            }
            (
                session.take_eligibility_candidate(),
                session.stops(),
                session.dispatch_id().to_string(),
            )
        };

        if let Some(stop) = candidate {
            self.record_eligibility(&dispatch_id, &stop.stop_id).await;
        }

        for stop in &stops {
            self.listeners.subscribe(stop).await;
        }
    }

    /// Persist the first eligible navigation target, unless a previous
    /// session already sequenced this trip.
    async fn record_eligibility(&self, dispatch_id: &str, stop_id: &str) {
        let flag_key = keys::sequenced(dispatch_id);
        match self.store.get(&flag_key).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(dispatch_id = %dispatch_id, stop_id = %stop_id, "Recording navigation eligibility");
                if let Err(error) = self
                    .store
                    .put(&keys::eligible_stop(dispatch_id), stop_id)
                    .await
                {
                    warn!(error = %error, "Failed to persist eligible stop");
                }
                if let Err(error) = self.store.put(&flag_key, "1").await {
                    warn!(error = %error, "Failed to persist sequencing flag");
                }
            }
            Err(error) => {
                warn!(error = %error, "Failed to read sequencing flag");
            }
        }
    }
}
