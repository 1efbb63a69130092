//! The Trip State Store: one `TripSession` object owns the authoritative
//! stop list and every piece of bookkeeping derived from it.
//!
//! The session is shared as `Arc<RwLock<TripSession>>`. Compound operations
//! (merge-and-compare, record-read-then-latch) run under a single write-lock
//! acquisition and return structured outcomes, so callers fire side effects
//! from returned facts instead of re-reading state they could race on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{FormRef, Stop, StopRecord, TripActiveState};

pub type SharedSession = Arc<RwLock<TripSession>>;

/// Direction of a store-size change relative to the last observed count.
///
/// The observed count advances with every merge or removal, so each record
/// reports its own shift even inside a mixed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountShift {
    Grew,
    Shrank,
    Flat,
}

/// Snapshot of active (uncompleted) and inactive (completed) stop counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopCounts {
    pub active: usize,
    pub inactive: usize,
}

impl StopCounts {
    pub fn total(&self) -> usize {
        self.active + self.inactive
    }
}

/// Facts produced by one action merge.
///
/// The caller persists and fires from these; the session does not perform
/// I/O itself.
#[derive(Debug, Clone)]
pub struct ActionMerge {
    /// Every action of the stop now has a synced response
    pub stop_completed: bool,
    /// Forms referenced for the first time this trip session
    pub new_forms: Vec<FormRef>,
    /// Ordered ids of stops that are not completed yet
    pub incomplete_ordered: Vec<String>,
    /// Uncompleted form count for the merged stop
    pub uncompleted_form_count: usize,
}

/// Authoritative in-memory state of the selected trip
pub struct TripSession {
    dispatch_id: String,
    active_state: TripActiveState,
    stops: Vec<Stop>,
    last_observed_count: usize,
    first_read_complete: bool,
    read_completion: HashMap<String, bool>,
    generations: HashMap<String, u64>,
    side_effects_fired: bool,
    manipulated: bool,
    eligibility_done: bool,
    count_baseline: StopCounts,
    synced_forms: HashSet<FormRef>,
}

impl TripSession {
    pub fn new(dispatch_id: impl Into<String>, active_state: TripActiveState) -> Self {
        Self {
            dispatch_id: dispatch_id.into(),
            active_state,
            stops: Vec::new(),
            last_observed_count: 0,
            first_read_complete: false,
            read_completion: HashMap::new(),
            generations: HashMap::new(),
            side_effects_fired: false,
            manipulated: false,
            eligibility_done: false,
            count_baseline: StopCounts::default(),
            synced_forms: HashSet::new(),
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn dispatch_id(&self) -> &str {
        &self.dispatch_id
    }

    pub fn active_state(&self) -> TripActiveState {
        self.active_state
    }

    pub fn set_active_state(&mut self, state: TripActiveState) {
        self.active_state = state;
    }

    pub fn stops(&self) -> Vec<Stop> {
        self.stops.clone()
    }

    pub fn stop(&self, stop_id: &str) -> Option<Stop> {
        self.stops.iter().find(|s| s.stop_id == stop_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// First stop in order with no completion time
    pub fn current_stop(&self) -> Option<Stop> {
        self.stops.iter().find(|s| !s.is_completed()).cloned()
    }

    pub fn counts(&self) -> StopCounts {
        let active = self.stops.iter().filter(|s| !s.is_completed()).count();
        StopCounts {
            active,
            inactive: self.stops.len() - active,
        }
    }

    /// Merge a stream record into the stop list by id, creating the stop if
    /// absent, and report how the list size moved against the last observed
    /// count.
    pub fn merge_stop(&mut self, record: &StopRecord) -> CountShift {
        match self
            .stops
            .iter_mut()
            .find(|s| s.stop_id == record.stop_id)
        {
            Some(stop) => stop.apply_record(record),
            None => self.stops.push(Stop::from_record(record)),
        }
        self.observe_count()
    }

    /// Drop a soft-deleted stop and its per-stop bookkeeping.
    pub fn remove_stop(&mut self, stop_id: &str) -> CountShift {
        self.stops.retain(|s| s.stop_id != stop_id);
        self.read_completion.remove(stop_id);
        self.generations.remove(stop_id);
        self.observe_count()
    }

    fn observe_count(&mut self) -> CountShift {
        let len = self.stops.len();
        let shift = match len.cmp(&self.last_observed_count) {
            std::cmp::Ordering::Greater => CountShift::Grew,
            std::cmp::Ordering::Less => CountShift::Shrank,
            std::cmp::Ordering::Equal => CountShift::Flat,
        };
        self.last_observed_count = len;
        shift
    }

    pub fn first_read_complete(&self) -> bool {
        self.first_read_complete
    }

    /// Close the baseline read: later size changes become add/remove events,
    /// and the notification count baseline starts here.
    pub fn mark_first_read_complete(&mut self) {
        self.first_read_complete = true;
        self.count_baseline = self.counts();
    }

    /// Returns true the first time the trip is marked edited-after-load.
    pub fn mark_manipulated(&mut self) -> bool {
        !std::mem::replace(&mut self.manipulated, true)
    }

    pub fn is_manipulated(&self) -> bool {
        self.manipulated
    }

    /// Signed total-count delta since the last baseline, refreshing the
    /// baseline for the next burst window.
    pub fn rebaseline_counts(&mut self) -> i64 {
        let current = self.counts();
        let delta = current.total() as i64 - self.count_baseline.total() as i64;
        self.count_baseline = current;
        delta
    }

    /// One-shot candidate for the sequential-navigation eligibility
    /// calculation: the first uncompleted stop, only if the trip is not
    /// sequenced yet and nothing is completed.
    pub fn take_eligibility_candidate(&mut self) -> Option<Stop> {
        if self.eligibility_done {
            return None;
        }
        self.eligibility_done = true;
        if self.stops.iter().any(|s| s.sequenced || s.is_completed()) {
            return None;
        }
        self.stops.first().cloned()
    }

    /// Supersede the current listener for a stop. Emissions from earlier
    /// generations are rejected by [`TripSession::merge_actions`].
    pub fn bump_generation(&mut self, stop_id: &str) -> u64 {
        let generation = self.generations.entry(stop_id.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Merge an action batch for one stop.
    ///
    /// Returns `None` when the generation is stale (a newer listener took
    /// over) or the stop no longer exists; the caller must then discard the
    /// emission entirely.
    pub fn merge_actions(
        &mut self,
        stop_id: &str,
        generation: u64,
        actions: Vec<crate::models::Action>,
    ) -> Option<ActionMerge> {
        if self.generations.get(stop_id) != Some(&generation) {
            return None;
        }
        let stop = self.stops.iter_mut().find(|s| s.stop_id == stop_id)?;
        for action in actions {
            stop.merge_action(action);
        }

        let stop_completed = stop.all_responses_sent();
        let uncompleted_form_count = stop.uncompleted_form_count();
        let form_refs: Vec<FormRef> = stop.actions.iter().filter_map(|a| a.form_ref()).collect();
        let new_forms: Vec<FormRef> = form_refs
            .into_iter()
            .filter(|form| self.synced_forms.insert(*form))
            .collect();
        let incomplete_ordered = self
            .stops
            .iter()
            .filter(|s| !s.is_completed())
            .map(|s| s.stop_id.clone())
            .collect();

        Some(ActionMerge {
            stop_completed,
            new_forms,
            incomplete_ordered,
            uncompleted_form_count,
        })
    }

    /// Record that a stop's actions were durably read at least once.
    ///
    /// When this closes the full stop set and the one-shot latch has not
    /// fired for this trip session, the latch trips and the full stop list
    /// is returned for the geofence push.
    pub fn record_actions_read(&mut self, stop_id: &str) -> Option<Vec<Stop>> {
        self.read_completion.insert(stop_id.to_string(), true);

        if self.side_effects_fired || self.stops.is_empty() {
            return None;
        }
        let all_read = self
            .stops
            .iter()
            .all(|s| self.read_completion.get(&s.stop_id) == Some(&true));
        if !all_read {
            return None;
        }
        self.side_effects_fired = true;
        Some(self.stops.clone())
    }

    /// Mark a failed read so a later subscription attempt retries the stop.
    pub fn record_read_failure(&mut self, stop_id: &str) {
        self.read_completion.insert(stop_id.to_string(), false);
    }

    pub fn side_effects_fired(&self) -> bool {
        self.side_effects_fired
    }

    /// Reset everything owned by the session when the trip is cleared.
    pub fn clear(&mut self) {
        self.stops.clear();
        self.last_observed_count = 0;
        self.first_read_complete = false;
        self.read_completion.clear();
        self.generations.clear();
        self.side_effects_fired = false;
        self.manipulated = false;
        self.eligibility_done = false;
        self.count_baseline = StopCounts::default();
        self.synced_forms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, ActionRecord, ActionType, GufType};

    fn make_record(stop_id: &str) -> StopRecord {
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
            actions: vec![],
        }
    }

    fn make_action(stop_id: &str, action_id: &str, form_id: i64) -> Action {
        Action::from(ActionRecord {
            action_id: action_id.into(),
            stop_id: stop_id.into(),
            dispatch_id: "d1".into(),
            action_type: ActionType::Arrived,
            response_sent: false,
            driver_form_id: form_id,
            driver_form_class: 1,
            guf_type: GufType::None,
        })
    }

    fn make_session() -> TripSession {
        TripSession::new("d1", TripActiveState::Active)
    }

    #[test]
    fn merge_same_record_twice_is_flat() {
        let mut session = make_session();
        assert_eq!(session.merge_stop(&make_record("s1")), CountShift::Grew);
        assert_eq!(session.merge_stop(&make_record("s1")), CountShift::Flat);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn removal_shrinks_once() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        session.merge_stop(&make_record("s2"));
        assert_eq!(session.remove_stop("s1"), CountShift::Shrank);
        assert_eq!(session.remove_stop("s1"), CountShift::Flat);
    }

    #[test]
    fn stale_generation_merge_is_rejected() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        let old = session.bump_generation("s1");
        let new = session.bump_generation("s1");

        assert!(session
            .merge_actions("s1", old, vec![make_action("s1", "a1", 0)])
            .is_none());
        assert!(session
            .merge_actions("s1", new, vec![make_action("s1", "a1", 0)])
            .is_some());
    }

    #[test]
    fn read_latch_fires_once_when_all_stops_read() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        session.merge_stop(&make_record("s2"));

        assert!(session.record_actions_read("s1").is_none());
        let fired = session.record_actions_read("s2");
        assert_eq!(fired.map(|stops| stops.len()), Some(2));

        // Latch holds on re-delivery
        assert!(session.record_actions_read("s1").is_none());
        assert!(session.record_actions_read("s2").is_none());
        assert!(session.side_effects_fired());
    }

    #[test]
    fn read_failure_keeps_latch_open() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        session.merge_stop(&make_record("s2"));

        session.record_read_failure("s2");
        assert!(session.record_actions_read("s1").is_none());
        // Retry succeeds later
        assert!(session.record_actions_read("s2").is_some());
    }

    #[test]
    fn new_forms_reported_once() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        let generation = session.bump_generation("s1");

        let merge = session
            .merge_actions("s1", generation, vec![make_action("s1", "a1", 9)])
            .unwrap();
        assert_eq!(merge.new_forms.len(), 1);
        assert_eq!(merge.uncompleted_form_count, 1);

        let merge = session
            .merge_actions("s1", generation, vec![make_action("s1", "a1", 9)])
            .unwrap();
        assert!(merge.new_forms.is_empty());
    }

    #[test]
    fn eligibility_runs_once_and_respects_guard() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        session.merge_stop(&make_record("s2"));

        let candidate = session.take_eligibility_candidate();
        assert_eq!(candidate.map(|s| s.stop_id), Some("s1".to_string()));
        assert!(session.take_eligibility_candidate().is_none());
    }

    #[test]
    fn eligibility_skipped_for_sequenced_trip() {
        let mut session = make_session();
        let mut record = make_record("s1");
        record.sequenced = true;
        session.merge_stop(&record);
        assert!(session.take_eligibility_candidate().is_none());
    }

    #[test]
    fn rebaseline_reports_signed_delta() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        session.mark_first_read_complete();

        session.merge_stop(&make_record("s2"));
        session.merge_stop(&make_record("s3"));
        assert_eq!(session.rebaseline_counts(), 2);
        // Baseline refreshed
        assert_eq!(session.rebaseline_counts(), 0);
        session.remove_stop("s3");
        assert_eq!(session.rebaseline_counts(), -1);
    }

    #[test]
    fn clear_resets_latches() {
        let mut session = make_session();
        session.merge_stop(&make_record("s1"));
        session.record_actions_read("s1");
        assert!(session.side_effects_fired());

        session.clear();
        assert!(!session.side_effects_fired());
        assert!(!session.first_read_complete());
        assert!(session.is_empty());
    }
}
