use async_trait::async_trait;

/// Background job scheduler boundary.
///
/// Accepts a "schedule late-notification check" request keyed by dispatch
/// id. Scheduling is idempotent per dispatch, so redundant requests (e.g.
/// the countdown's fallback timer) are harmless.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn schedule_late_check(&self, dispatch_id: &str);
}
