use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::session::SharedSession;
use crate::sync::types::{
    CountNotificationSender, StopCountChange, StopCountNotification, StopCountStatus,
};

/// Coalesces bursts of stop add/remove tags into one aggregated
/// notification per quiet window.
///
/// A dispatcher editing a trip produces many rapid stream events; the
/// driver should see "3 stops added", not three separate banners. Each new
/// tag restarts the window (debounce, not throttle). The whole thing is one
/// owner task, so there is no cancel-and-replace race to lose a window to.
pub struct CountChangeDebouncer {
    session: SharedSession,
    window: Duration,
    notifications_tx: CountNotificationSender,
}

impl CountChangeDebouncer {
    pub fn new(
        session: SharedSession,
        window: Duration,
        notifications_tx: CountNotificationSender,
    ) -> Self {
        Self {
            session,
            window,
            notifications_tx,
        }
    }

    /// Consume count-change tags until the channel closes.
    pub async fn run(self, mut tags: broadcast::Receiver<StopCountChange>) {
        loop {
            match tags.recv().await {
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Dropped tags still shifted the counts; the recount below
                    // picks them up.
                    warn!(skipped, "Count-change stream lagged");
                }
                Ok(_) => {}
            }

            let closed = self.quiet_window(&mut tags).await;
            self.emit_if_changed().await;
            if closed {
                break;
            }
        }
        debug!("Count-change debouncer stopped");
    }

    /// Wait out the burst: every further tag restarts the window.
    /// Returns true when the tag channel closed.
    async fn quiet_window(&self, tags: &mut broadcast::Receiver<StopCountChange>) -> bool {
        loop {
            let sleep = tokio::time::sleep(self.window);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => return false,
                tag = tags.recv() => match tag {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return true,
                },
            }
        }
    }

    async fn emit_if_changed(&self) {
        let delta = self.session.write().await.rebaseline_counts();
        if delta == 0 {
            debug!("Stop count settled with no net change");
            return;
        }
        let (status, magnitude) = if delta > 0 {
            (StopCountStatus::Added, delta as usize)
        } else {
            (StopCountStatus::Removed, delta.unsigned_abs() as usize)
        };
        info!(?status, delta = magnitude, "Stop count changed");
        // Ignore send errors - they just mean no one is listening
        let _ = self.notifications_tx.send(StopCountNotification {
            status,
            delta: magnitude,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StopRecord, TripActiveState};
    use crate::session::TripSession;

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

    struct Harness {
        session: SharedSession,
        tags_tx: broadcast::Sender<StopCountChange>,
        notifications_rx: broadcast::Receiver<StopCountNotification>,
    }

    async fn make_harness() -> Harness {
        let mut session = TripSession::new("d1", TripActiveState::Active);
        session.merge_stop(&make_record("s1"));
        session.mark_first_read_complete();
        let session = session.shared();

        let (tags_tx, tags_rx) = broadcast::channel(64);
        let (notifications_tx, notifications_rx) = broadcast::channel(16);
        let debouncer = CountChangeDebouncer::new(
            session.clone(),
            Duration::from_secs(3),
            notifications_tx,
        );
        tokio::spawn(debouncer.run(tags_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;

        Harness {
            session,
            tags_tx,
            notifications_rx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_notification() {
        let mut harness = make_harness().await;

        for i in 0..5 {
            harness
                .session
                .write()
                .await
                .merge_stop(&make_record(&format!("n{i}")));
            harness
                .tags_tx
                .send(StopCountChange {
                    status: StopCountStatus::Added,
                })
                .unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        tokio::time::sleep(Duration::from_secs(4)).await;

        let notification = harness.notifications_rx.try_recv().unwrap();
        assert_eq!(notification.status, StopCountStatus::Added);
        assert_eq!(notification.delta, 5);
        assert!(harness.notifications_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn later_event_opens_a_second_window() {
        let mut harness = make_harness().await;

        harness
            .session
            .write()
            .await
            .merge_stop(&make_record("n1"));
        harness
            .tags_tx
            .send(StopCountChange {
                status: StopCountStatus::Added,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        harness
            .session
            .write()
            .await
            .merge_stop(&make_record("n2"));
        harness
            .tags_tx
            .send(StopCountChange {
                status: StopCountStatus::Added,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;

        let first = harness.notifications_rx.try_recv().unwrap();
        let second = harness.notifications_rx.try_recv().unwrap();
        assert_eq!(first.delta, 1);
        assert_eq!(second.delta, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn net_zero_burst_stays_silent() {
        let mut harness = make_harness().await;

        harness
            .session
            .write()
            .await
            .merge_stop(&make_record("n1"));
        harness
            .tags_tx
            .send(StopCountChange {
                status: StopCountStatus::Added,
            })
            .unwrap();
        harness.session.write().await.remove_stop("n1");
        harness
            .tags_tx
            .send(StopCountChange {
                status: StopCountStatus::Removed,
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(harness.notifications_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn removal_reports_removed_status() {
        let mut harness = make_harness().await;

        harness.session.write().await.remove_stop("s1");
        harness
            .tags_tx
            .send(StopCountChange {
                status: StopCountStatus::Removed,
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        let notification = harness.notifications_rx.try_recv().unwrap();
        assert_eq!(notification.status, StopCountStatus::Removed);
        assert_eq!(notification.delta, 1);
    }
}
