//! Detached and recording notifiers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::foundation::DomainError;
use crate::ports::{Notification, Notifier};

/// Hands each notification to a detached tokio task.
///
/// `send` returns as soon as the task is spawned, so callers never wait on
/// or fail because of delivery. Failures are logged from the task.
pub struct SpawningNotifier {
    inner: Arc<dyn Notifier>,
}

impl SpawningNotifier {
    pub fn new(inner: Arc<dyn Notifier>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Notifier for SpawningNotifier {
    async fn send(&self, notification: Notification) -> Result<(), DomainError> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let trigger = notification.name();
            let user_id = notification.user_id().map(|u| u.to_string());
            if let Err(err) = inner.send(notification).await {
                tracing::warn!(
                    trigger,
                    user_id = user_id.as_deref().unwrap_or("-"),
                    error = %err,
                    "notification delivery failed"
                );
            }
        });
        Ok(())
    }
}

/// Keeps every notification in memory. Used by tests and `--dry-run` style
/// local setups.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose `send` always fails, after recording.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    /// Trigger names in send order.
    pub async fn triggers(&self) -> Vec<&'static str> {
        self.sent.lock().await.iter().map(Notification::name).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), DomainError> {
        self.sent.lock().await.push(notification);
        if self.fail {
            return Err(DomainError::new(
                crate::domain::foundation::ErrorCode::NotificationFailed,
                "recording notifier configured to fail",
            ));
        }
        Ok(())
    }
}
