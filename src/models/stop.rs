use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{Action, ActionRecord, ActionType};

/// Geographic coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A location the trip must visit, with its required driver actions.
///
/// Stops are created on first sighting in the change stream and mutated in
/// place on every later record for the same id; they are never replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub dispatch_id: String,
    pub actions: Vec<Action>,
    pub sequenced: bool,
    /// Empty string = not completed (wire convention)
    pub completed_time: String,
    pub manual_arrival: bool,
    pub manual_arrival_position: Option<GeoPoint>,
    pub leg: Option<i64>,
    pub eta: Option<DateTime<Utc>>,
}

impl Stop {
    pub fn from_record(record: &StopRecord) -> Self {
        let mut stop = Stop {
            stop_id: record.stop_id.clone(),
            dispatch_id: record.dispatch_id.clone(),
            actions: Vec::new(),
            sequenced: record.sequenced,
            completed_time: record.completed_time.clone(),
            manual_arrival: record.manual_arrival,
            manual_arrival_position: record.manual_arrival_position,
            leg: record.leg,
            eta: record.eta,
        };
        for action in &record.actions {
            stop.merge_action(Action::from(action.clone()));
        }
        stop
    }

    /// Overwrite stream-owned attributes with a newer record's values.
    /// Locally-merged actions survive unless the record carries replacements.
    pub fn apply_record(&mut self, record: &StopRecord) {
        self.dispatch_id = record.dispatch_id.clone();
        self.sequenced = record.sequenced;
        self.completed_time = record.completed_time.clone();
        self.manual_arrival = record.manual_arrival;
        self.manual_arrival_position = record.manual_arrival_position;
        self.leg = record.leg;
        self.eta = record.eta;
        for action in &record.actions {
            self.merge_action(Action::from(action.clone()));
        }
    }

    /// Merge one action by id: replace in place if known, append otherwise.
    pub fn merge_action(&mut self, action: Action) {
        match self
            .actions
            .iter_mut()
            .find(|a| a.action_id == action.action_id)
        {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
    }

    pub fn is_completed(&self) -> bool {
        !self.completed_time.is_empty()
    }

    pub fn arrived_action(&self) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.action_type == ActionType::Arrived)
    }

    /// True when every action has a durably-synced response.
    /// A stop with no actions is not considered responded.
    pub fn all_responses_sent(&self) -> bool {
        !self.actions.is_empty() && self.actions.iter().all(|a| a.response_sent)
    }

    /// Number of attached forms whose action response has not synced yet
    pub fn uncompleted_form_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.has_form() && !a.response_sent)
            .count()
    }
}

/// Wire-format stop record from the change stream.
///
/// Records arrive unordered and may replay; every field except the identity
/// pair is optional on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    pub dispatch_id: String,
    /// Non-zero = soft-deleted upstream
    #[serde(default)]
    pub deleted: i64,
    #[serde(default)]
    pub completed_time: String,
    #[serde(default)]
    pub sequenced: bool,
    #[serde(default)]
    pub manual_arrival: bool,
    #[serde(default)]
    pub manual_arrival_position: Option<GeoPoint>,
    #[serde(default)]
    pub leg: Option<i64>,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

impl StopRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted != 0
    }
}
