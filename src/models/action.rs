use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of driver response required at a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Approaching,
    Arrived,
    Departed,
    /// Used when the stream carries a type this build does not know
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Approaching => "approaching",
            ActionType::Arrived => "arrived",
            ActionType::Departed => "departed",
            ActionType::Unknown => "unknown",
        }
    }
}

/// Geofence acknowledgment mode for an arrival.
///
/// `Negative` means the driver must confirm within a countdown; the other
/// modes accept automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GufType {
    #[default]
    None,
    Positive,
    Negative,
}

/// A required driver response at a stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub stop_id: String,
    pub dispatch_id: String,
    pub action_type: ActionType,
    /// Whether the driver's response has been durably synced upstream
    pub response_sent: bool,
    /// 0 or negative = no associated form
    pub driver_form_id: i64,
    pub driver_form_class: i64,
    pub guf_type: GufType,
}

impl Action {
    pub fn has_form(&self) -> bool {
        self.driver_form_id > 0
    }

    pub fn form_ref(&self) -> Option<FormRef> {
        self.has_form().then(|| FormRef {
            form_id: self.driver_form_id,
            form_class: self.driver_form_class,
        })
    }
}

/// Wire-format action record from the change stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: String,
    pub stop_id: String,
    pub dispatch_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub response_sent: bool,
    #[serde(default)]
    pub driver_form_id: i64,
    #[serde(default)]
    pub driver_form_class: i64,
    #[serde(default)]
    pub guf_type: GufType,
}

impl From<ActionRecord> for Action {
    fn from(record: ActionRecord) -> Self {
        Action {
            action_id: record.action_id,
            stop_id: record.stop_id,
            dispatch_id: record.dispatch_id,
            action_type: record.action_type,
            response_sent: record.response_sent,
            driver_form_id: record.driver_form_id,
            driver_form_class: record.driver_form_class,
            guf_type: record.guf_type,
        }
    }
}

/// Key addressing one stop's action sub-stream in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub customer_id: String,
    pub vehicle_id: String,
    pub dispatch_id: String,
    pub stop_id: String,
}

/// Reference to a driver form attached to an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormRef {
    pub form_id: i64,
    pub form_class: i64,
}

/// Why an arrival response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseReason {
    /// Driver confirmed the prompt
    Normal,
    /// Countdown expired without acknowledgment
    Timeout,
}

/// Outgoing arrival confirmation handed to the response pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalResponse {
    pub action_id: String,
    pub stop_id: String,
    pub dispatch_id: String,
    pub reason: ResponseReason,
    pub negative_guf: bool,
    pub responded_at: DateTime<Utc>,
}
