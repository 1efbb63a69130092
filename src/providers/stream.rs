use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::{ActionKey, ActionRecord, ArrivalResponse, FormRef};

/// One emission of the stop change stream: raw records, decoded
/// individually so a malformed record cannot poison the batch.
pub type StopBatch = Vec<serde_json::Value>;

/// Change-stream and response surface of the remote dispatch store.
///
/// Batches are unordered and may replay previously-seen records; the core is
/// responsible for making merges idempotent.
#[async_trait]
pub trait DispatchFeed: Send + Sync {
    /// Live stream of stop-record batches for a dispatch.
    async fn stop_batches(&self, dispatch_id: &str)
        -> Result<BoxStream<'static, StopBatch>, FeedError>;

    /// Live stream of action batches for one stop.
    async fn action_updates(
        &self,
        key: &ActionKey,
    ) -> Result<BoxStream<'static, Vec<ActionRecord>>, FeedError>;

    /// One-shot read of a stop's actions, used for inactive/previewed trips.
    async fn fetch_actions(&self, key: &ActionKey) -> Result<Vec<ActionRecord>, FeedError>;

    /// Stream of `(dispatch_id, is_complete)` trip-completion evaluations.
    async fn completion_status(
        &self,
        dispatch_id: &str,
    ) -> Result<BoxStream<'static, (String, bool)>, FeedError>;

    /// Submit a driver's arrival confirmation downstream.
    async fn submit_arrival_response(&self, response: ArrivalResponse) -> Result<(), FeedError>;

    /// Ensure the referenced driver forms are synchronized locally.
    async fn sync_forms(&self, forms: &[FormRef]) -> Result<(), FeedError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_stream() {
        let err = FeedError::Stream("listener dropped".into());
        assert_eq!(err.to_string(), "Stream error: listener dropped");
    }

    #[test]
    fn error_display_fetch() {
        let err = FeedError::Fetch("timed out".into());
        assert_eq!(err.to_string(), "Fetch error: timed out");
    }
}
