//! User-facing notification channel. The UI shell owns the only receiver.

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Publishing half handed to the session, view and mutation components.
/// Without a subscriber, notifications are written to the log instead.
#[derive(Debug, Clone, Default)]
pub struct NotificationSink {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl NotificationSink {
    pub fn channel() -> (Self, NotificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification {
            message: message.into(),
            level,
        };
        let undelivered = match &self.tx {
            Some(tx) => match tx.send(notification) {
                Ok(()) => return,
                Err(mpsc::error::SendError(notification)) => notification,
            },
            None => notification,
        };
        match undelivered.level {
            NotificationLevel::Error => warn!(message = %undelivered.message, "notification"),
            _ => info!(message = %undelivered.message, level = ?undelivered.level, "notification"),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_the_single_subscriber_in_order() {
        let (sink, mut rx) = NotificationSink::channel();
        sink.success("saved");
        sink.clone().error("failed");

        assert_eq!(
            rx.try_recv().expect("first"),
            Notification {
                message: "saved".into(),
                level: NotificationLevel::Success
            }
        );
        assert_eq!(rx.try_recv().expect("second").level, NotificationLevel::Error);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscriber_does_not_fail() {
        let (sink, rx) = NotificationSink::channel();
        drop(rx);
        sink.info("nobody listening");
        NotificationSink::detached().error("still fine");
    }
}
