//! Process-wide transient notification slot.
//!
//! A single message with a severity and an auto-expiry. Showing a new
//! notification replaces whatever is in the slot and re-arms the expiry
//! deadline; the UI shell watches the slot and renders it as-is.

use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

/// Cheaply cloneable handle for posting notifications.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Spawn the slot task. Returns the posting handle and the receiver the
    /// shell watches; `None` means the slot is empty.
    pub fn new(ttl: Duration) -> (Self, watch::Receiver<Option<Notification>>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let (slot_tx, slot_rx) = watch::channel(None);

        tokio::spawn(async move {
            let mut deadline: Option<tokio::time::Instant> = None;
            loop {
                let sleep_until = deadline.unwrap_or_else(|| {
                    tokio::time::Instant::now() + Duration::from_secs(3600)
                });
                tokio::select! {
                    message = rx.recv() => match message {
                        Some(notification) => {
                            // Replace the slot and re-arm expiry.
                            let _ = slot_tx.send(Some(notification));
                            deadline = Some(tokio::time::Instant::now() + ttl);
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                        deadline = None;
                        let _ = slot_tx.send(None);
                    }
                }
            }
        });

        (Self { tx }, slot_rx)
    }

    pub fn show(&self, message: impl Into<String>, severity: Severity) {
        let notification = Notification {
            message: message.into(),
            severity,
        };
        if self.tx.send(notification).is_err() {
            tracing::warn!("notification slot task is gone, message dropped");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(message, Severity::Success);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.show(message, Severity::Error);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.show(message, Severity::Info);
    }

    /// Handle wired to nothing, for contexts that don't render notifications.
    #[cfg(test)]
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slot_holds_latest_message_and_expires() {
        let (notifier, mut slot) = Notifier::new(Duration::from_secs(4));

        notifier.info("first");
        notifier.error("second");
        tokio::task::yield_now().await;

        let current = slot.borrow_and_update().clone().unwrap();
        assert_eq!(current.message, "second");
        assert_eq!(current.severity, Severity::Error);

        // Expiry clears the slot.
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(slot.borrow_and_update().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_message_rearms_expiry() {
        let (notifier, mut slot) = Notifier::new(Duration::from_secs(4));

        notifier.info("a");
        tokio::time::advance(Duration::from_secs(3)).await;
        notifier.info("b");
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;

        // 6s after the first message, but only 3s after the second.
        assert_eq!(slot.borrow_and_update().clone().unwrap().message, "b");
    }
}
