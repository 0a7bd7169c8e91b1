//! State - ゲートパスのライフサイクル状態
//!
//! # 状態遷移
//! draft → pending_department → pending_store → pending_security → approved
//! → gone_from_gate → {returned | overdue | force_returned}
//!
//! 分岐:
//! - rejected: どの pending 状態からも到達する終端
//! - inquiry: pending_department からのみ。pending_department へ戻れる

use serde::{Deserialize, Serialize};
use std::fmt;

/// PassState はパスの状態を表現
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Draft,
    PendingDepartment,
    PendingStore,
    PendingSecurity,
    Approved,
    GoneFromGate,
    Returned,
    /// Kept for records imported from older systems; no transition produces it.
    Overdue,
    ForceReturned,
    Rejected,
    Inquiry,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassState::Draft => "draft",
            PassState::PendingDepartment => "pending_department",
            PassState::PendingStore => "pending_store",
            PassState::PendingSecurity => "pending_security",
            PassState::Approved => "approved",
            PassState::GoneFromGate => "gone_from_gate",
            PassState::Returned => "returned",
            PassState::Overdue => "overdue",
            PassState::ForceReturned => "force_returned",
            PassState::Rejected => "rejected",
            PassState::Inquiry => "inquiry",
        }
    }

    /// 終端状態（通常の遷移を一切受け付けない）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PassState::Returned | PassState::ForceReturned | PassState::Rejected
        )
    }

    /// 3 つのゲートをすべて通過済み（返却・延滞監視の対象）
    pub fn has_cleared_gates(&self) -> bool {
        matches!(
            self,
            PassState::Approved | PassState::GoneFromGate | PassState::Overdue
        )
    }

    /// 返却が記録済み
    pub fn is_closed_by_return(&self) -> bool {
        matches!(self, PassState::Returned | PassState::ForceReturned)
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate は 3 つの承認チェックポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Department,
    Store,
    Security,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Department => "department",
            Gate::Store => "store",
            Gate::Security => "security",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GateOutcome はゲートごとの判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pending,
    Approved,
    Rejected,
    Inquiry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PassState::Returned.is_terminal());
        assert!(PassState::ForceReturned.is_terminal());
        assert!(PassState::Rejected.is_terminal());
        assert!(!PassState::Inquiry.is_terminal());
        assert!(!PassState::Overdue.is_terminal());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&PassState::PendingDepartment).unwrap();
        assert_eq!(json, "\"pending_department\"");
        let back: PassState = serde_json::from_str("\"gone_from_gate\"").unwrap();
        assert_eq!(back, PassState::GoneFromGate);
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(PassState::ForceReturned.to_string(), "force_returned");
        assert_eq!(Gate::Store.to_string(), "store");
    }
}
