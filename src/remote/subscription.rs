// ============================================================================
// Subscription Handles
// ============================================================================
//
// A subscription stays registered with its store until `unsubscribe` is
// called or the handle is dropped. Teardown runs exactly once.
//
// ============================================================================

use super::{ChangeEvent, Table};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

type Teardown = Box<dyn FnOnce(SubscriptionId) + Send>;

pub struct Subscription {
    id: SubscriptionId,
    table: Table,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    teardown: Option<Teardown>,
}

impl Subscription {
    pub fn new<F>(
        id: SubscriptionId,
        table: Table,
        receiver: mpsc::UnboundedReceiver<ChangeEvent>,
        teardown: F,
    ) -> Self
    where
        F: FnOnce(SubscriptionId) + Send + 'static,
    {
        Self {
            id,
            table,
            receiver,
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Waits for the next event. Returns `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn is_active(&self) -> bool {
        self.teardown.is_some()
    }

    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            self.receiver.close();
            teardown(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_teardown_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&calls);
        let subscription = Subscription::new(SubscriptionId(7), Table::Document, rx, move |id| {
            assert_eq!(id, SubscriptionId(7));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_tears_down() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&calls);
        {
            let _subscription = Subscription::new(SubscriptionId(1), Table::Revision, rx, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
