//! Single-slot notification channel.
//!
//! At most one message is live. `show` overwrites whatever is displayed,
//! dismissed or not; superseded messages are gone.

use crate::types::NotificationMessage;
use tokio::sync::watch;

pub struct NotificationChannel {
    slot: watch::Sender<Option<NotificationMessage>>,
}

impl NotificationChannel {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Replace the live message.
    pub fn show(&self, message: NotificationMessage) {
        tracing::debug!(
            operation = ?message.operation,
            outcome = ?message.outcome,
            "notification shown"
        );
        if let Some(previous) = self.slot.send_replace(Some(message)) {
            tracing::trace!(operation = ?previous.operation, "previous notification superseded");
        }
    }

    /// Clear the slot, returning the message that was live.
    pub fn dismiss(&self) -> Option<NotificationMessage> {
        self.slot.send_replace(None)
    }

    pub fn current(&self) -> Option<NotificationMessage> {
        self.slot.borrow().clone()
    }

    /// A receiver that observes every slot change, for renderers.
    pub fn subscribe(&self) -> watch::Receiver<Option<NotificationMessage>> {
        self.slot.subscribe()
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}
