//! Escalation - 延滞エスカレーションの段階
//!
//! 延滞日数（切り捨て）から段階を決めます。
//! 1 日 → reminder、2〜3 日 → warning、4〜7 日 → alert、8 日以上 → critical。
//! 0 日（期限を過ぎて 24h 未満）はまだエスカレーションしません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PassId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Reminder,
    Warning,
    Alert,
    Critical,
}

impl EscalationTier {
    pub fn for_days_overdue(days: i64) -> Option<Self> {
        match days {
            i64::MIN..=0 => None,
            1 => Some(EscalationTier::Reminder),
            2..=3 => Some(EscalationTier::Warning),
            4..=7 => Some(EscalationTier::Alert),
            _ => Some(EscalationTier::Critical),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationTier::Reminder => "reminder",
            EscalationTier::Warning => "warning",
            EscalationTier::Alert => "alert",
            EscalationTier::Critical => "critical",
        }
    }
}

impl fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalation は 1 回のスキャンで送った延滞通知の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Escalation {
    pub pass_id: PassId,
    pub pass_number: Option<String>,
    pub tier: EscalationTier,
    pub days_overdue: i64,
    pub recipients: Vec<UserId>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-3, None)]
    #[case(0, None)]
    #[case(1, Some(EscalationTier::Reminder))]
    #[case(2, Some(EscalationTier::Warning))]
    #[case(3, Some(EscalationTier::Warning))]
    #[case(4, Some(EscalationTier::Alert))]
    #[case(7, Some(EscalationTier::Alert))]
    #[case(8, Some(EscalationTier::Critical))]
    #[case(120, Some(EscalationTier::Critical))]
    fn tier_boundaries(#[case] days: i64, #[case] expected: Option<EscalationTier>) {
        assert_eq!(EscalationTier::for_days_overdue(days), expected);
    }
}
