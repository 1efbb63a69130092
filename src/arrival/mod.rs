//! The "did you arrive" confirmation protocol.
//!
//! One actor task owns the prompt queue, the trip-panel display priority,
//! and the form-flow reentrancy lock; everything reaches it through an mpsc
//! command channel and prompt UI events leave over a broadcast channel. At
//! most one prompt is visible at any time.

mod queue;

pub use queue::{
    is_confirmation_priority, ArrivalTrigger, PromptQueue, CURRENT_STOP_PRIORITY, GENERAL_PRIORITY,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ArrivalConfig;
use crate::models::{Action, ArrivalResponse, GufType, ResponseReason};
use crate::providers::storage::keys;
use crate::providers::{DispatchFeed, JobScheduler, MapLink, ProfileStore};
use crate::session::SharedSession;
use crate::sync::TripCompletionWatcher;

/// How an arrival prompt was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalOutcome {
    Confirmed,
    Declined,
    TimedOut,
}

/// Prompt UI events consumed by the trip panel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptEvent {
    Shown {
        stop_id: String,
        message: String,
        /// Present for negative-guf arrivals that auto-confirm on expiry
        countdown_secs: Option<u64>,
    },
    CountdownTick {
        stop_id: String,
        remaining_secs: u64,
    },
    Dismissed {
        stop_id: String,
        outcome: ArrivalOutcome,
    },
}

/// Sender for prompt UI events
pub type PromptEventSender = broadcast::Sender<PromptEvent>;

/// Trip-panel display priority while prompts are pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayPriority {
    Normal,
    Confirmation,
}

/// Commands accepted by the coordinator actor
#[derive(Debug)]
enum ArrivalCommand {
    TriggerRecorded(ArrivalTrigger),
    SyncPending,
    Accept { stop_id: String },
    Decline { stop_id: String },
    CountdownExpired { stop_id: String },
    FormFlowFinished,
}

#[derive(Debug, thiserror::Error)]
pub enum ArrivalError {
    #[error("Arrival coordinator is not running")]
    CoordinatorStopped,
}

/// Cloneable front door to the coordinator actor.
#[derive(Clone)]
pub struct ArrivalHandle {
    tx: mpsc::Sender<ArrivalCommand>,
}

impl ArrivalHandle {
    /// Record a geofence-arrival trigger and offer it for display.
    pub async fn record_trigger(&self, trigger: ArrivalTrigger) -> Result<(), ArrivalError> {
        self.send(ArrivalCommand::TriggerRecorded(trigger)).await
    }

    /// Re-promote persisted pending triggers, e.g. after a process restart.
    pub async fn sync_pending(&self) -> Result<(), ArrivalError> {
        self.send(ArrivalCommand::SyncPending).await
    }

    /// Driver accepted the visible prompt.
    pub async fn accept(&self, stop_id: &str) -> Result<(), ArrivalError> {
        self.send(ArrivalCommand::Accept {
            stop_id: stop_id.to_string(),
        })
        .await
    }

    /// Driver declined the visible prompt.
    pub async fn decline(&self, stop_id: &str) -> Result<(), ArrivalError> {
        self.send(ArrivalCommand::Decline {
            stop_id: stop_id.to_string(),
        })
        .await
    }

    /// The form flow returned; prompts may be shown again.
    pub async fn form_flow_finished(&self) -> Result<(), ArrivalError> {
        self.send(ArrivalCommand::FormFlowFinished).await
    }

    async fn send(&self, command: ArrivalCommand) -> Result<(), ArrivalError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ArrivalError::CoordinatorStopped)
    }
}

struct Countdown {
    stop_id: String,
    token: CancellationToken,
}

/// The single-writer actor behind [`ArrivalHandle`].
pub struct ArrivalCoordinator {
    session: SharedSession,
    feed: Arc<dyn DispatchFeed>,
    map: Arc<dyn MapLink>,
    store: Arc<dyn ProfileStore>,
    scheduler: Arc<dyn JobScheduler>,
    completion: Arc<TripCompletionWatcher>,
    prompt_tx: PromptEventSender,
    config: ArrivalConfig,
    tx: mpsc::Sender<ArrivalCommand>,
    rx: mpsc::Receiver<ArrivalCommand>,
    queue: PromptQueue,
    display: DisplayPriority,
    visible: Option<String>,
    navigating_to_form: bool,
    countdown: Option<Countdown>,
}

impl ArrivalCoordinator {
    /// Spawn the actor, restoring persisted pending triggers first.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        session: SharedSession,
        feed: Arc<dyn DispatchFeed>,
        map: Arc<dyn MapLink>,
        store: Arc<dyn ProfileStore>,
        scheduler: Arc<dyn JobScheduler>,
        completion: Arc<TripCompletionWatcher>,
        prompt_tx: PromptEventSender,
        config: ArrivalConfig,
    ) -> ArrivalHandle {
        let (tx, rx) = mpsc::channel(32);
        let handle = ArrivalHandle { tx: tx.clone() };
        let coordinator = Self {
            session,
            feed,
            map,
            store,
            scheduler,
            completion,
            prompt_tx,
            queue: PromptQueue::new(config.queue_capacity),
            config,
            tx,
            rx,
            display: DisplayPriority::Normal,
            visible: None,
            navigating_to_form: false,
            countdown: None,
        };
        tokio::spawn(coordinator.run());
        handle
    }

    async fn run(mut self) {
        self.restore_pending().await;
        self.offer_next().await;

        while let Some(command) = self.rx.recv().await {
            match command {
                ArrivalCommand::TriggerRecorded(trigger) => self.on_trigger(trigger).await,
                ArrivalCommand::SyncPending => {
                    self.restore_pending().await;
                    self.offer_next().await;
                }
                ArrivalCommand::Accept { stop_id } => self.on_accept(&stop_id).await,
                ArrivalCommand::Decline { stop_id } => self.on_decline(&stop_id).await,
                ArrivalCommand::CountdownExpired { stop_id } => self.on_timeout(&stop_id).await,
                ArrivalCommand::FormFlowFinished => {
                    debug!("Form flow finished, prompts unlocked");
                    self.navigating_to_form = false;
                    self.offer_next().await;
                }
            }
        }
        debug!("Arrival coordinator stopped");
    }

    async fn on_trigger(&mut self, trigger: ArrivalTrigger) {
        info!(
            stop_id = %trigger.stop_id,
            priority = trigger.priority,
            "Arrival trigger recorded"
        );
        if self.queue.push(trigger) {
            self.persist_pending().await;
        }
        self.offer_next().await;
    }

    /// Surface the head of the queue, unless something is already visible
    /// or the driver is inside a form flow.
    async fn offer_next(&mut self) {
        if self.visible.is_some() || self.navigating_to_form {
            return;
        }
        let Some(head) = self.queue.peek().cloned() else {
            self.set_display(DisplayPriority::Normal);
            return;
        };

        self.set_display(DisplayPriority::Confirmation);
        if !is_confirmation_priority(head.priority) {
            // Head is ordinary trip-panel traffic, not a confirmation.
            debug!(priority = head.priority, "Head entry is not a confirmation prompt");
            self.set_display(DisplayPriority::Normal);
            return;
        }

        self.visible = Some(head.stop_id.clone());
        if let Err(error) = self.store.put(keys::DIALOG_ACTIVE, "1").await {
            warn!(error = %error, "Failed to persist dialog-active flag");
        }

        let negative_guf = self
            .arrived_action(&head.stop_id)
            .await
            .map(|action| action.guf_type == GufType::Negative)
            .unwrap_or(false);
        let countdown_secs = negative_guf.then_some(self.config.countdown_secs);

        info!(stop_id = %head.stop_id, negative_guf, "Showing arrival confirmation");
        // Ignore send errors - they just mean no one is listening
        let _ = self.prompt_tx.send(PromptEvent::Shown {
            stop_id: head.stop_id.clone(),
            message: head.message.clone(),
            countdown_secs,
        });

        if negative_guf {
            self.start_countdown(head.stop_id.clone());
            // Redundant wake-up path in case the panel timer is backgrounded
            let dispatch_id = self.dispatch_id().await;
            self.scheduler.schedule_late_check(&dispatch_id).await;
        }
    }

    async fn on_accept(&mut self, stop_id: &str) {
        if self.visible.as_deref() != Some(stop_id) {
            warn!(stop_id = %stop_id, "Accept for a prompt that is not visible");
            return;
        }
        self.cancel_countdown();
        self.clear_prompt(stop_id).await;

        if let Some(action) = self.arrived_action(stop_id).await {
            self.map.remove_arrival_geofence(&action).await;
            let negative_guf = action.guf_type == GufType::Negative;
            self.submit_response(&action, ResponseReason::Normal, negative_guf)
                .await;
            let dispatch_id = action.dispatch_id.clone();
            self.completion.check_completion(&dispatch_id).await;
            if action.has_form() {
                // Block further prompts while the driver is routed into the
                // form screen.
                info!(stop_id = %stop_id, "Locking prompts for form flow");
                self.navigating_to_form = true;
            }
        } else {
            warn!(stop_id = %stop_id, "Accepted arrival has no arrived action");
        }

        let _ = self.prompt_tx.send(PromptEvent::Dismissed {
            stop_id: stop_id.to_string(),
            outcome: ArrivalOutcome::Confirmed,
        });
        self.offer_next().await;
    }

    async fn on_decline(&mut self, stop_id: &str) {
        if self.visible.as_deref() != Some(stop_id) {
            warn!(stop_id = %stop_id, "Decline for a prompt that is not visible");
            return;
        }
        self.cancel_countdown();
        self.navigating_to_form = false;
        self.clear_prompt(stop_id).await;
        self.set_display(DisplayPriority::Normal);

        // The map clears a crossed stop on a declined arrival; re-send the
        // trip so it comes back.
        let stops = self.session.read().await.stops();
        self.map.send_current_data(&stops).await;

        info!(stop_id = %stop_id, "Arrival declined");
        let _ = self.prompt_tx.send(PromptEvent::Dismissed {
            stop_id: stop_id.to_string(),
            outcome: ArrivalOutcome::Declined,
        });
        self.offer_next().await;
    }

    async fn on_timeout(&mut self, stop_id: &str) {
        if self.visible.as_deref() != Some(stop_id) {
            // A cancelled countdown's expiry can still be in the channel.
            debug!(stop_id = %stop_id, "Ignoring stale countdown expiry");
            return;
        }
        self.countdown = None;
        self.clear_prompt(stop_id).await;

        if let Some(action) = self.arrived_action(stop_id).await {
            self.map.remove_arrival_geofence(&action).await;
            self.submit_response(&action, ResponseReason::Timeout, true).await;
            let dispatch_id = action.dispatch_id.clone();
            self.completion.check_completion(&dispatch_id).await;
        }

        info!(stop_id = %stop_id, "Arrival auto-confirmed after countdown");
        let _ = self.prompt_tx.send(PromptEvent::Dismissed {
            stop_id: stop_id.to_string(),
            outcome: ArrivalOutcome::TimedOut,
        });
        self.offer_next().await;
    }

    /// Remove the visible prompt from the queue and persisted pending list.
    async fn clear_prompt(&mut self, stop_id: &str) {
        self.queue.remove(stop_id);
        self.visible = None;
        self.persist_pending().await;
        if let Err(error) = self.store.put(keys::DIALOG_ACTIVE, "0").await {
            warn!(error = %error, "Failed to clear dialog-active flag");
        }
    }

    fn set_display(&mut self, display: DisplayPriority) {
        if self.display != display {
            debug!(?display, "Trip panel display priority changed");
            self.display = display;
        }
    }

    fn start_countdown(&mut self, stop_id: String) {
        self.cancel_countdown();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let prompt_tx = self.prompt_tx.clone();
        let total = self.config.countdown_secs;
        let countdown_stop = stop_id.clone();

        tokio::spawn(async move {
            let mut remaining = total;
            loop {
                if remaining == 0 {
                    let _ = tx
                        .send(ArrivalCommand::CountdownExpired {
                            stop_id: countdown_stop,
                        })
                        .await;
                    return;
                }
                let _ = prompt_tx.send(PromptEvent::CountdownTick {
                    stop_id: countdown_stop.clone(),
                    remaining_secs: remaining,
                });
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                remaining -= 1;
            }
        });

        self.countdown = Some(Countdown { stop_id, token });
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            debug!(stop_id = %countdown.stop_id, "Cancelling arrival countdown");
            countdown.token.cancel();
        }
    }

    async fn arrived_action(&self, stop_id: &str) -> Option<Action> {
        self.session
            .read()
            .await
            .stop(stop_id)
            .and_then(|stop| stop.arrived_action().cloned())
    }

    async fn dispatch_id(&self) -> String {
        self.session.read().await.dispatch_id().to_string()
    }

    async fn submit_response(&self, action: &Action, reason: ResponseReason, negative_guf: bool) {
        let response = ArrivalResponse {
            action_id: action.action_id.clone(),
            stop_id: action.stop_id.clone(),
            dispatch_id: action.dispatch_id.clone(),
            reason,
            negative_guf,
            responded_at: Utc::now(),
        };
        if let Err(error) = self.feed.submit_arrival_response(response).await {
            warn!(
                stop_id = %action.stop_id,
                action_id = %action.action_id,
                error = %error,
                "Failed to submit arrival response"
            );
        }
    }

    async fn restore_pending(&mut self) {
        let raw = match self.store.get(keys::PENDING_TRIGGERS).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(error) => {
                warn!(error = %error, "Failed to read pending arrival triggers");
                return;
            }
        };
        match serde_json::from_str::<Vec<ArrivalTrigger>>(&raw) {
            Ok(triggers) => {
                for trigger in triggers {
                    self.queue.push(trigger);
                }
            }
            Err(error) => {
                warn!(error = %error, "Discarding corrupt pending trigger list");
            }
        }
    }

    async fn persist_pending(&self) {
        let snapshot = self.queue.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(raw) => {
                if let Err(error) = self.store.put(keys::PENDING_TRIGGERS, &raw).await {
                    warn!(error = %error, "Failed to persist pending arrival triggers");
                }
            }
            Err(error) => {
                warn!(error = %error, "Failed to encode pending arrival triggers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionRecord, ActionType, StopRecord, TripActiveState};
    use crate::providers::memory::{
        MemoryDispatchFeed, MemoryProfileStore, RecordingMapLink, RecordingScheduler,
    };
    use crate::session::TripSession;
    use crate::sync::TripEvent;

    fn make_stop_record(stop_id: &str, guf_type: GufType, form_id: i64) -> StopRecord {
        StopRecord {
            stop_id: stop_id.into(),
            dispatch_id: "d1".into(),
            deleted: 0,
            completed_time: String::new(),
            sequenced: false,
            manual_arrival: false,
            manual_arrival_position: None,
            leg: None,
            eta: None,
            actions: vec![ActionRecord {
                action_id: format!("{stop_id}-arrived"),
                stop_id: stop_id.into(),
                dispatch_id: "d1".into(),
                action_type: ActionType::Arrived,
                response_sent: false,
                driver_form_id: form_id,
                driver_form_class: if form_id > 0 { 1 } else { 0 },
                guf_type,
            }],
        }
    }

    struct Harness {
        handle: ArrivalHandle,
        feed: Arc<MemoryDispatchFeed>,
        map: Arc<RecordingMapLink>,
        store: Arc<MemoryProfileStore>,
        scheduler: Arc<RecordingScheduler>,
        prompts_rx: broadcast::Receiver<PromptEvent>,
        _events_rx: broadcast::Receiver<TripEvent>,
    }

    async fn make_harness(stops: Vec<StopRecord>) -> Harness {
        make_harness_with_store(stops, Arc::new(MemoryProfileStore::new())).await
    }

    async fn make_harness_with_store(
        stops: Vec<StopRecord>,
        store: Arc<MemoryProfileStore>,
    ) -> Harness {
        let mut session = TripSession::new("d1", TripActiveState::Active);
        for record in &stops {
            session.merge_stop(record);
        }
        session.mark_first_read_complete();
        let session = session.shared();

        let feed = Arc::new(MemoryDispatchFeed::new());
        let map = Arc::new(RecordingMapLink::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let (events_tx, events_rx) = broadcast::channel(64);
        let (prompt_tx, prompts_rx) = broadcast::channel(64);
        let completion = TripCompletionWatcher::new(feed.clone(), map.clone(), events_tx);

        let handle = ArrivalCoordinator::spawn(
            session,
            feed.clone(),
            map.clone(),
            store.clone(),
            scheduler.clone(),
            completion,
            prompt_tx,
            ArrivalConfig::default(),
        );

        Harness {
            handle,
            feed,
            map,
            store,
            scheduler,
            prompts_rx,
            _events_rx: events_rx,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn drain(rx: &mut broadcast::Receiver<PromptEvent>) -> Vec<PromptEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn shown_stop_ids(events: &[PromptEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PromptEvent::Shown { stop_id, .. } => Some(stop_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn one_prompt_at_a_time_then_next_is_offered() {
        let mut harness = make_harness(vec![
            make_stop_record("a", GufType::None, 0),
            make_stop_record("b", GufType::None, 0),
        ])
        .await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new(
                "a",
                CURRENT_STOP_PRIORITY,
                "Arrived at A?",
            ))
            .await
            .unwrap();
        harness
            .handle
            .record_trigger(ArrivalTrigger::new("b", GENERAL_PRIORITY, "Arrived at B?"))
            .await
            .unwrap();
        settle().await;

        // B stays queued behind the visible prompt
        let events = drain(&mut harness.prompts_rx);
        assert_eq!(shown_stop_ids(&events), vec!["a".to_string()]);

        harness.handle.accept("a").await.unwrap();
        settle().await;

        let events = drain(&mut harness.prompts_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PromptEvent::Dismissed {
                stop_id,
                outcome: ArrivalOutcome::Confirmed
            } if stop_id == "a"
        )));
        assert_eq!(shown_stop_ids(&events), vec!["b".to_string()]);

        // Accepting submitted the response and removed the geofence
        let responses = harness.feed.submitted_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].reason, ResponseReason::Normal);
        assert!(!responses[0].negative_guf);
        assert_eq!(harness.map.removed_geofences(), vec!["a-arrived".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn decline_resends_trip_data_and_offers_next() {
        let mut harness = make_harness(vec![
            make_stop_record("a", GufType::None, 0),
            make_stop_record("b", GufType::None, 0),
        ])
        .await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new("a", CURRENT_STOP_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        harness
            .handle
            .record_trigger(ArrivalTrigger::new("b", GENERAL_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        settle().await;
        drain(&mut harness.prompts_rx);

        harness.handle.decline("a").await.unwrap();
        settle().await;

        // No response goes out on decline; the map gets the trip re-sent
        assert!(harness.feed.submitted_responses().is_empty());
        assert!(harness.map.removed_geofences().is_empty());
        assert_eq!(harness.map.current_data_sends().len(), 1);

        let events = drain(&mut harness.prompts_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PromptEvent::Dismissed {
                outcome: ArrivalOutcome::Declined,
                ..
            }
        )));
        assert_eq!(shown_stop_ids(&events), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_guf_times_out_into_automatic_confirmation() {
        let mut harness =
            make_harness(vec![make_stop_record("a", GufType::Negative, 0)]).await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new("a", CURRENT_STOP_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        settle().await;

        let events = drain(&mut harness.prompts_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            PromptEvent::Shown {
                countdown_secs: Some(20),
                ..
            }
        )));
        // The fallback check was scheduled alongside the countdown
        assert_eq!(harness.scheduler.scheduled(), vec!["d1".to_string()]);

        tokio::time::sleep(Duration::from_secs(25)).await;

        let events = drain(&mut harness.prompts_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, PromptEvent::CountdownTick { remaining_secs: 20, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            PromptEvent::Dismissed {
                outcome: ArrivalOutcome::TimedOut,
                ..
            }
        )));

        let responses = harness.feed.submitted_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].reason, ResponseReason::Timeout);
        assert!(responses[0].negative_guf);
        assert_eq!(harness.map.removed_geofences().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_cancels_countdown() {
        let mut harness =
            make_harness(vec![make_stop_record("a", GufType::Negative, 0)]).await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new("a", CURRENT_STOP_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        settle().await;
        harness.handle.accept("a").await.unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(25)).await;

        let responses = harness.feed.submitted_responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].reason, ResponseReason::Normal);
        let events = drain(&mut harness.prompts_rx);
        assert!(!events.iter().any(|e| matches!(
            e,
            PromptEvent::Dismissed {
                outcome: ArrivalOutcome::TimedOut,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn form_flow_blocks_next_prompt_until_finished() {
        let mut harness = make_harness(vec![
            make_stop_record("a", GufType::None, 7),
            make_stop_record("b", GufType::None, 0),
        ])
        .await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new("a", CURRENT_STOP_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        harness
            .handle
            .record_trigger(ArrivalTrigger::new("b", GENERAL_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        settle().await;
        drain(&mut harness.prompts_rx);

        harness.handle.accept("a").await.unwrap();
        settle().await;

        // B stays held back while the driver fills the form
        let events = drain(&mut harness.prompts_rx);
        assert!(shown_stop_ids(&events).is_empty());

        harness.handle.form_flow_finished().await.unwrap();
        settle().await;
        let events = drain(&mut harness.prompts_rx);
        assert_eq!(shown_stop_ids(&events), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_pending_prompts_surface_by_priority() {
        // Two triggers persisted by a previous run: the current-stop one
        // outranks the earlier general one.
        let store = Arc::new(MemoryProfileStore::new());
        let pending = vec![
            ArrivalTrigger::new("b", GENERAL_PRIORITY, "Arrived at B?"),
            ArrivalTrigger::new("a", CURRENT_STOP_PRIORITY, "Arrived at A?"),
        ];
        store
            .put(
                keys::PENDING_TRIGGERS,
                &serde_json::to_string(&pending).unwrap(),
            )
            .await
            .unwrap();

        let mut harness = make_harness_with_store(
            vec![
                make_stop_record("a", GufType::None, 0),
                make_stop_record("b", GufType::None, 0),
            ],
            store,
        )
        .await;
        settle().await;

        let events = drain(&mut harness.prompts_rx);
        assert_eq!(shown_stop_ids(&events), vec!["a".to_string()]);

        harness.handle.accept("a").await.unwrap();
        settle().await;
        let events = drain(&mut harness.prompts_rx);
        assert_eq!(shown_stop_ids(&events), vec!["b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn non_confirmation_priority_is_not_shown() {
        let mut harness = make_harness(vec![make_stop_record("a", GufType::None, 0)]).await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new("a", 7, "Low fuel"))
            .await
            .unwrap();
        settle().await;

        assert!(drain(&mut harness.prompts_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_triggers_are_persisted_and_cleared() {
        let mut harness = make_harness(vec![make_stop_record("a", GufType::None, 0)]).await;

        harness
            .handle
            .record_trigger(ArrivalTrigger::new("a", CURRENT_STOP_PRIORITY, "Arrived?"))
            .await
            .unwrap();
        settle().await;

        let raw = harness
            .store
            .get(keys::PENDING_TRIGGERS)
            .await
            .unwrap()
            .unwrap();
        let pending: Vec<ArrivalTrigger> = serde_json::from_str(&raw).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            harness.store.get(keys::DIALOG_ACTIVE).await.unwrap().as_deref(),
            Some("1")
        );

        harness.handle.accept("a").await.unwrap();
        settle().await;

        let raw = harness
            .store
            .get(keys::PENDING_TRIGGERS)
            .await
            .unwrap()
            .unwrap();
        let pending: Vec<ArrivalTrigger> = serde_json::from_str(&raw).unwrap();
        assert!(pending.is_empty());
        assert_eq!(
            harness.store.get(keys::DIALOG_ACTIVE).await.unwrap().as_deref(),
            Some("0")
        );
        drain(&mut harness.prompts_rx);
    }
}
