use serde::{Deserialize, Serialize};

/// Whether a trip is currently being driven, previewed, or absent.
///
/// Derived once per observed change of the active/selected dispatch
/// identifiers; decides live subscriptions versus one-shot reads and whether
/// route/geofence side effects are permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripActiveState {
    Active,
    Previewing,
    NoTripActive,
}

impl TripActiveState {
    /// Derive the state from the persisted dispatch identifiers.
    pub fn from_dispatch_ids(active: Option<&str>, selected: Option<&str>) -> Self {
        match (active, selected) {
            (Some(active), Some(selected)) if active != selected => TripActiveState::Previewing,
            (Some(_), _) => TripActiveState::Active,
            (None, _) => TripActiveState::NoTripActive,
        }
    }

    /// Live action subscriptions are used for these states; previewing an
    /// inactive trip falls back to one-shot reads.
    pub fn live_subscription(&self) -> bool {
        matches!(
            self,
            TripActiveState::Active | TripActiveState::NoTripActive
        )
    }

    /// Geofence/route side effects only run for the trip being driven.
    pub fn side_effects_permitted(&self) -> bool {
        matches!(self, TripActiveState::Active)
    }
}

/// Why the end-of-trip pipeline ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEndReason {
    /// All stops and actions were observed complete
    Automatic,
    /// Explicitly requested by the driver or dispatcher
    Manual,
}

/// Identity of the driver session, used to key per-stop action sub-streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverIdentity {
    pub customer_id: String,
    pub vehicle_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_when_selected_matches_active() {
        let state = TripActiveState::from_dispatch_ids(Some("d1"), Some("d1"));
        assert_eq!(state, TripActiveState::Active);
        assert!(state.live_subscription());
        assert!(state.side_effects_permitted());
    }

    #[test]
    fn previewing_when_selected_differs() {
        let state = TripActiveState::from_dispatch_ids(Some("d1"), Some("d2"));
        assert_eq!(state, TripActiveState::Previewing);
        assert!(!state.live_subscription());
        assert!(!state.side_effects_permitted());
    }

    #[test]
    fn no_trip_without_active_dispatch() {
        let state = TripActiveState::from_dispatch_ids(None, Some("d2"));
        assert_eq!(state, TripActiveState::NoTripActive);
        assert!(state.live_subscription());
        assert!(!state.side_effects_permitted());
    }

    #[test]
    fn active_with_no_selection() {
        let state = TripActiveState::from_dispatch_ids(Some("d1"), None);
        assert_eq!(state, TripActiveState::Active);
    }
}
