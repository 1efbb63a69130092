use async_trait::async_trait;

use crate::models::{Action, Stop};

/// Command surface of the mapping/geofencing subsystem.
///
/// Delivery is fire-and-forget: the map owes no response, so none of these
/// return errors. Implementations log their own failures.
#[async_trait]
pub trait MapLink: Send + Sync {
    /// Push the full current stop list for geofence registration.
    async fn push_geofences(&self, stops: &[Stop]);

    /// Remove the arrival geofence belonging to one action.
    async fn remove_arrival_geofence(&self, action: &Action);

    /// Clear the displayed route for a dispatch.
    async fn clear_route(&self, dispatch_id: &str);

    /// Re-send the current trip data, e.g. after a declined arrival cleared
    /// a crossed stop on the map side.
    async fn send_current_data(&self, stops: &[Stop]);

    /// Ask the navigation layer to recalculate the route.
    async fn request_route_recalculation(&self, dispatch_id: &str);
}
