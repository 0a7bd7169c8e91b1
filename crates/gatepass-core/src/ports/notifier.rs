//! Notifier port - 通知チャネルの抽象化
//!
//! 配送はベストエフォート。呼び出し側は失敗をログに残すだけで、
//! 状態遷移の結果には影響させません。

use crate::domain::notification::Notification;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Notifier は 1 ユーザーに 1 通届ける
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}
