use super::MutationKind;
use std::sync::Mutex;
use tracing::{Level, event};

/// A user-visible, transient failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: MutationKind,
    pub message: String,
}

/// Surfaces failed mutations to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        event!(
            Level::WARN,
            mutation = %notification.kind,
            message = %notification.message,
            "mutation failed"
        );
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|mut received| std::mem::take(&mut *received))
            .unwrap_or_default()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut received) = self.received.lock() {
            received.push(notification);
        }
    }
}
