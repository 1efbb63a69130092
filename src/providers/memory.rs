//! In-memory collaborator implementations.
//!
//! Used as fixtures in the crate's tests and as lightweight defaults when
//! embedding the core without the real services. Streams are backed by
//! unbounded channels; everything pushed before a subscriber exists is
//! dropped, matching the live-stream semantics of the real feed.

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{Action, ActionKey, ActionRecord, ArrivalResponse, FormRef, Stop};
use crate::providers::map::MapLink;
use crate::providers::scheduler::JobScheduler;
use crate::providers::storage::{ProfileStore, StoreError};
use crate::providers::stream::{DispatchFeed, FeedError, StopBatch};

/// Channel-backed dispatch feed: the harness pushes, subscribers receive.
#[derive(Default)]
pub struct MemoryDispatchFeed {
    inner: Mutex<FeedInner>,
}

#[derive(Default)]
struct FeedInner {
    stop_subscribers: Vec<UnboundedSender<StopBatch>>,
    action_subscribers: HashMap<ActionKey, Vec<UnboundedSender<Vec<ActionRecord>>>>,
    fetch_results: HashMap<ActionKey, Vec<ActionRecord>>,
    completion_subscribers: Vec<UnboundedSender<(String, bool)>>,
    responses: Vec<ArrivalResponse>,
    synced_forms: Vec<FormRef>,
}

impl MemoryDispatchFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a stop batch to every live subscriber.
    pub fn push_stop_batch(&self, batch: StopBatch) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .stop_subscribers
            .retain(|tx| tx.unbounded_send(batch.clone()).is_ok());
    }

    /// Deliver an action batch to every live subscriber of one stop.
    pub fn push_actions(&self, key: &ActionKey, batch: Vec<ActionRecord>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(subscribers) = inner.action_subscribers.get_mut(key) {
            subscribers.retain(|tx| tx.unbounded_send(batch.clone()).is_ok());
        }
    }

    /// Stage the result of a one-shot action fetch for one stop.
    pub fn set_fetch_result(&self, key: ActionKey, actions: Vec<ActionRecord>) {
        self.inner.lock().unwrap().fetch_results.insert(key, actions);
    }

    /// Deliver a completion-status evaluation.
    pub fn push_completion(&self, dispatch_id: &str, is_complete: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .completion_subscribers
            .retain(|tx| tx.unbounded_send((dispatch_id.to_string(), is_complete)).is_ok());
    }

    /// Arrival responses submitted so far.
    pub fn submitted_responses(&self) -> Vec<ArrivalResponse> {
        self.inner.lock().unwrap().responses.clone()
    }

    /// Forms synchronized so far.
    pub fn synced_forms(&self) -> Vec<FormRef> {
        self.inner.lock().unwrap().synced_forms.clone()
    }

    /// Number of live action subscriptions for one stop.
    pub fn action_subscriber_count(&self, key: &ActionKey) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match inner.action_subscribers.get_mut(key) {
            Some(subscribers) => {
                subscribers.retain(|tx| !tx.is_closed());
                subscribers.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl DispatchFeed for MemoryDispatchFeed {
    async fn stop_batches(
        &self,
        _dispatch_id: &str,
    ) -> Result<BoxStream<'static, StopBatch>, FeedError> {
        let (tx, rx) = unbounded();
        self.inner.lock().unwrap().stop_subscribers.push(tx);
        Ok(rx.boxed())
    }

    async fn action_updates(
        &self,
        key: &ActionKey,
    ) -> Result<BoxStream<'static, Vec<ActionRecord>>, FeedError> {
        let (tx, rx) = unbounded();
        self.inner
            .lock()
            .unwrap()
            .action_subscribers
            .entry(key.clone())
            .or_default()
            .push(tx);
        Ok(rx.boxed())
    }

    async fn fetch_actions(&self, key: &ActionKey) -> Result<Vec<ActionRecord>, FeedError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .fetch_results
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn completion_status(
        &self,
        _dispatch_id: &str,
    ) -> Result<BoxStream<'static, (String, bool)>, FeedError> {
        let (tx, rx) = unbounded();
        self.inner.lock().unwrap().completion_subscribers.push(tx);
        Ok(rx.boxed())
    }

    async fn submit_arrival_response(&self, response: ArrivalResponse) -> Result<(), FeedError> {
        self.inner.lock().unwrap().responses.push(response);
        Ok(())
    }

    async fn sync_forms(&self, forms: &[FormRef]) -> Result<(), FeedError> {
        self.inner.lock().unwrap().synced_forms.extend_from_slice(forms);
        Ok(())
    }
}

/// Map link that records every command it receives.
#[derive(Default)]
pub struct RecordingMapLink {
    inner: Mutex<MapCalls>,
}

#[derive(Default)]
struct MapCalls {
    geofence_pushes: Vec<Vec<String>>,
    removed_geofences: Vec<String>,
    cleared_routes: Vec<String>,
    current_data_sends: Vec<Vec<String>>,
    recalculations: Vec<String>,
}

impl RecordingMapLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop-id lists from each geofence push, in order.
    pub fn geofence_pushes(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().geofence_pushes.clone()
    }

    pub fn removed_geofences(&self) -> Vec<String> {
        self.inner.lock().unwrap().removed_geofences.clone()
    }

    pub fn cleared_routes(&self) -> Vec<String> {
        self.inner.lock().unwrap().cleared_routes.clone()
    }

    pub fn current_data_sends(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().current_data_sends.clone()
    }

    pub fn recalculations(&self) -> Vec<String> {
        self.inner.lock().unwrap().recalculations.clone()
    }
}

#[async_trait]
impl MapLink for RecordingMapLink {
    async fn push_geofences(&self, stops: &[Stop]) {
        let ids = stops.iter().map(|s| s.stop_id.clone()).collect();
        self.inner.lock().unwrap().geofence_pushes.push(ids);
    }

    async fn remove_arrival_geofence(&self, action: &Action) {
        self.inner
            .lock()
            .unwrap()
            .removed_geofences
            .push(action.action_id.clone());
    }

    async fn clear_route(&self, dispatch_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .cleared_routes
            .push(dispatch_id.to_string());
    }

    async fn send_current_data(&self, stops: &[Stop]) {
        let ids = stops.iter().map(|s| s.stop_id.clone()).collect();
        self.inner.lock().unwrap().current_data_sends.push(ids);
    }

    async fn request_route_recalculation(&self, dispatch_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .recalculations
            .push(dispatch_id.to_string());
    }
}

/// Plain map-backed profile store.
#[derive(Default)]
pub struct MemoryProfileStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Scheduler that records the dispatch ids it was asked to check.
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<String> {
        self.scheduled.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule_late_check(&self, dispatch_id: &str) {
        self.scheduled.lock().unwrap().push(dispatch_id.to_string());
    }
}
