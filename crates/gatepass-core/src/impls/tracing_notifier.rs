//! TracingNotifier - 通知をログに出すだけの Notifier（CLI 用）

use tracing::info;

use crate::domain::notification::Notification;
use crate::ports::{NotifyError, Notifier};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl Notifier for TracingNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user_id = %notification.user_id,
            category = %notification.category,
            reference = ?notification.reference.map(|id| id.to_string()),
            "{}",
            notification.message
        );
        Ok(())
    }
}
