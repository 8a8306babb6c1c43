use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Totals snapshot broadcast after every ledger append, so cross-tab and
/// cross-device sessions can refresh without re-reading the event log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PointsChanged {
    pub user_id: i64,
    pub lifetime_points: i32,
    pub spendable_points: i32,
}

/// In-process fan-out for ledger change notifications. Subscribers that lag
/// behind skip straight to newer snapshots; each message carries the full
/// totals, so missed intermediates are harmless.
#[derive(Clone)]
pub struct PointsNotifier {
    sender: broadcast::Sender<PointsChanged>,
}

impl PointsNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        PointsNotifier { sender }
    }

    /// Best effort: a notification with no live subscribers is dropped.
    pub fn notify(&self, change: PointsChanged) {
        let _ = self.sender.send(change);
    }

    /// Subscription handle; dropping the receiver is the unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<PointsChanged> {
        self.sender.subscribe()
    }
}

impl Default for PointsNotifier {
    fn default() -> Self {
        PointsNotifier::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_change_snapshots() {
        let notifier = PointsNotifier::new(8);
        let mut receiver = notifier.subscribe();

        let change = PointsChanged {
            user_id: 7,
            lifetime_points: 95,
            spendable_points: 95,
        };
        notifier.notify(change.clone());

        assert_eq!(receiver.recv().await.expect("change delivered"), change);
    }

    #[test]
    fn notifying_without_subscribers_is_a_no_op() {
        let notifier = PointsNotifier::new(8);
        notifier.notify(PointsChanged {
            user_id: 1,
            lifetime_points: 0,
            spendable_points: 0,
        });
    }
}
