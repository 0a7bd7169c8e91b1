//! InMemoryInbox - 開発用のユーザー別受信箱
//!
//! # 実装詳細
//! - HashMap<UserId, Vec<Notification>> でユーザーごとに保持
//! - `set_failing(true)` で配送失敗を再現できる

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::domain::ids::UserId;
use crate::domain::notification::Notification;
use crate::ports::{NotifyError, Notifier};

#[derive(Default)]
pub struct InMemoryInbox {
    inboxes: Mutex<HashMap<UserId, Vec<Notification>>>,
    failing: AtomicBool,
}

impl InMemoryInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// ユーザーの受信箱（届いた順）
    pub async fn inbox(&self, user: UserId) -> Vec<Notification> {
        self.inboxes
            .lock()
            .await
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    /// 全受信箱の合計件数
    pub async fn total(&self) -> usize {
        self.inboxes.lock().await.values().map(Vec::len).sum()
    }

    /// 全ユーザーの受信箱を空にする
    pub async fn clear(&self) {
        self.inboxes.lock().await.clear();
    }
}

#[async_trait::async_trait]
impl Notifier for InMemoryInbox {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("inbox is failing".into()));
        }
        self.inboxes
            .lock()
            .await
            .entry(notification.user_id)
            .or_default()
            .push(notification.clone());
        Ok(())
    }
}
