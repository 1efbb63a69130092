use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::TripEndReason;
use crate::providers::{DispatchFeed, MapLink};
use crate::sync::types::{TripEvent, TripEventSender};

type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Single-flight watcher for "all stops and actions complete".
///
/// Each `check_completion` supersedes the previous watch job rather than
/// stacking listeners; the end-of-trip pipeline runs exactly once per trip
/// session no matter how many times completion is re-evaluated.
pub struct TripCompletionWatcher {
    feed: Arc<dyn DispatchFeed>,
    map: Arc<dyn MapLink>,
    events_tx: TripEventSender,
    job: Mutex<Option<JoinHandle<()>>>,
    ended: AtomicBool,
}

impl TripCompletionWatcher {
    pub fn new(
        feed: Arc<dyn DispatchFeed>,
        map: Arc<dyn MapLink>,
        events_tx: TripEventSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            feed,
            map,
            events_tx,
            job: Mutex::new(None),
            ended: AtomicBool::new(false),
        })
    }

    /// Re-evaluate trip completion without a caller callback.
    pub async fn check_completion(self: &Arc<Self>, dispatch_id: &str) {
        self.watch(dispatch_id, None).await;
    }

    /// Re-evaluate trip completion; `on_complete` runs after the first
    /// `is_complete == true` emission seen by this evaluation.
    pub async fn check_completion_with<F>(self: &Arc<Self>, dispatch_id: &str, on_complete: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.watch(dispatch_id, Some(Box::new(on_complete))).await;
    }

    async fn watch(self: &Arc<Self>, dispatch_id: &str, on_complete: Option<CompletionCallback>) {
        let mut job = self.job.lock().await;
        if let Some(previous) = job.take() {
            previous.abort();
        }

        let this = Arc::clone(self);
        let dispatch = dispatch_id.to_string();
        *job = Some(tokio::spawn(async move {
            let mut stream = match this.feed.completion_status(&dispatch).await {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(dispatch_id = %dispatch, error = %error, "Completion status subscription failed");
                    return;
                }
            };

            let mut on_complete = on_complete;
            // The subscription stays live so later stop edits can still
            // complete the trip.
            while let Some((dispatch_id, is_complete)) = stream.next().await {
                if !is_complete {
                    continue;
                }
                if !this.ended.swap(true, Ordering::SeqCst) {
                    info!(dispatch_id = %dispatch_id, "All stops complete, running end-of-trip");
                    this.map.clear_route(&dispatch_id).await;
                    let _ = this.events_tx.send(TripEvent::TripEnded {
                        reason: TripEndReason::Automatic,
                    });
                }
                if let Some(callback) = on_complete.take() {
                    callback();
                }
            }
        }));
    }

    pub fn trip_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}
