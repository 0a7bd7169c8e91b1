//! Notification - 通知メッセージ
//!
//! コアは `deliver(user, message, category, reference)` という契約だけを前提にします。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PassId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Approval,
    Status,
    Inquiry,
    Alert,
    Reminder,
    ReturnOverdue,
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationCategory::Approval => "approval",
            NotificationCategory::Status => "status",
            NotificationCategory::Inquiry => "inquiry",
            NotificationCategory::Alert => "alert",
            NotificationCategory::Reminder => "reminder",
            NotificationCategory::ReturnOverdue => "return_overdue",
        };
        f.write_str(s)
    }
}

/// Notification は 1 ユーザー宛ての 1 通
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub message: String,
    pub category: NotificationCategory,
    pub reference: Option<PassId>,
}
