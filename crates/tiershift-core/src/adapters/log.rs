//! Notification channel backed by `tracing`

use crate::error::NotificationError;
use crate::ports::Notifier;
use crate::types::Notification;

/// Publishes notifications as `tracing` events on the
/// `tiershift::notification` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl Notifier for TracingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            target: "tiershift::notification",
            subject = %notification.subject,
            "{}",
            notification.message
        );
        Ok(())
    }
}
