use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::TripEndReason;

/// Direction of a stop-count change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopCountStatus {
    Added,
    Removed,
}

/// Raw count-change tag emitted by the reconciler and consumed by the
/// debouncer; one tag per detected size shift.
#[derive(Debug, Clone, Copy)]
pub struct StopCountChange {
    pub status: StopCountStatus,
}

/// Aggregated, debounced user-facing notification
#[derive(Debug, Clone, Serialize)]
pub struct StopCountNotification {
    pub status: StopCountStatus,
    /// Number of stops added or removed across the burst window
    pub delta: usize,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle and side-effect events published by the sync core
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripEvent {
    /// The stream returned an empty snapshot; caller decides the UX
    NoStopsAvailable,
    /// Every action of a stop now has a synced response
    StopCompleted { stop_id: String },
    /// The trip was edited after its initial load
    TripManipulated { dispatch_id: String },
    /// The one-shot geofence push fired with the full stop list
    GeofencesPushed { stop_count: usize },
    /// Route recalculation was requested for the active trip
    RouteRecalculated { dispatch_id: String },
    /// A stop's action read failed; it will be retried on resubscribe
    StopReadFailed { stop_id: String },
    /// Bounded retries were exhausted or a stream went quiet
    ConnectivityHint { message: String },
    /// The end-of-trip pipeline ran
    TripEnded { reason: TripEndReason },
}

/// Sender for trip lifecycle events
pub type TripEventSender = broadcast::Sender<TripEvent>;

/// Sender for raw count-change tags
pub type CountChangeSender = broadcast::Sender<StopCountChange>;

/// Sender for debounced count notifications
pub type CountNotificationSender = broadcast::Sender<StopCountNotification>;
