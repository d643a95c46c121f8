//! Single-slot buffer for status characteristic notifications
//!
//! The transport writes every notification into the slot from its own task;
//! the session consumes it. Only the latest value is kept: a notification
//! that arrives before the previous one was consumed replaces it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::*;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct StatusNotificationHandler {
    latest: Mutex<Option<Vec<u8>>>,
    pending: Notify,
}

impl StatusNotificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the transport for every incoming notification
    pub fn on_notify(&self, value: Vec<u8>) {
        info!("Status notification: {}", data_encoding::HEXLOWER.encode(&value));
        *self.slot() = Some(value);
        self.pending.notify_one();
    }

    pub fn has_pending(&self) -> bool {
        self.slot().is_some()
    }

    /// Consume the pending notification, if any
    pub fn take(&self) -> Option<Vec<u8>> {
        self.slot().take()
    }

    /// Wait until a notification is pending, then consume and return it.
    ///
    /// Returns at once if one is already pending. There is no timeout here;
    /// callers wrap this in `tokio::time::timeout`.
    pub async fn wait(&self) -> Vec<u8> {
        loop {
            if let Some(value) = self.take() {
                return value;
            }
            // notify_one stores a permit when nobody is waiting, so a value
            // set between take() and here still wakes us.
            self.pending.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pending_value_is_returned_immediately() {
        let handler = StatusNotificationHandler::new();
        handler.on_notify(vec![0x03, 0x00]);
        assert!(handler.has_pending());
        assert_eq!(handler.wait().await, vec![0x03, 0x00]);
        assert!(!handler.has_pending());
    }

    #[tokio::test]
    async fn newer_notification_overwrites_unconsumed_one() {
        let handler = StatusNotificationHandler::new();
        handler.on_notify(vec![0x02, 0x05]);
        handler.on_notify(vec![0x03, 0x05]);
        assert_eq!(handler.take(), Some(vec![0x03, 0x05]));
        assert_eq!(handler.take(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_suspends_until_notified() {
        let handler = Arc::new(StatusNotificationHandler::new());

        let notifier = handler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            notifier.on_notify(vec![0x00]);
        });

        let started = tokio::time::Instant::now();
        assert_eq!(handler.wait().await, vec![0x00]);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_wakeup_does_not_return_an_empty_slot() {
        let handler = Arc::new(StatusNotificationHandler::new());

        // Consumed through take(), leaving a stored permit behind
        handler.on_notify(vec![0x00]);
        assert!(handler.take().is_some());

        let waited = tokio::time::timeout(Duration::from_secs(1), handler.wait()).await;
        assert!(waited.is_err());
    }
}
