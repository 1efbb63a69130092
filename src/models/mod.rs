//! Domain types shared across the synchronization core.

mod action;
mod stop;
mod trip;

pub use action::{
    Action, ActionKey, ActionRecord, ActionType, ArrivalResponse, FormRef, GufType, ResponseReason,
};
pub use stop::{GeoPoint, Stop, StopRecord};
pub use trip::{DriverIdentity, TripActiveState, TripEndReason};
