//! Actor - ロールと遷移テーブル
//!
//! ロールは閉じた enum で、遷移規則はデータ（`TRANSITIONS`）として持ちます。
//! `permitted_actions` はこのテーブルを引くだけの純粋関数です。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::ids::{DepartmentId, UserId};
use super::state::{Gate, GateOutcome, PassState};

/// StoreLocation は倉庫の場所（例: "store_1"）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreLocation(String);

impl StoreLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role は操作者の役割
///
/// 部門長は自部門、倉庫管理者は自倉庫にスコープされます。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "scope", rename_all = "snake_case")]
pub enum Role {
    Requester,
    DepartmentHead(DepartmentId),
    StoreManager(StoreLocation),
    Security,
    Admin,
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Requester => RoleKind::Requester,
            Role::DepartmentHead(_) => RoleKind::DepartmentHead,
            Role::StoreManager(_) => RoleKind::StoreManager,
            Role::Security => RoleKind::Security,
            Role::Admin => RoleKind::Admin,
        }
    }
}

/// RoleKind はスコープを除いたロールの種類（テーブルのキー）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Requester,
    DepartmentHead,
    StoreManager,
    Security,
    Admin,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoleKind::Requester => "requester",
            RoleKind::DepartmentHead => "department_head",
            RoleKind::StoreManager => "store_manager",
            RoleKind::Security => "security",
            RoleKind::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Actor は操作を行うユーザーとそのロール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Action はゲート遷移の操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    Approve,
    Reject,
    Inquiry,
    Reopen,
    Dispatch,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Submit => "submit",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Inquiry => "inquiry",
            Action::Reopen => "reopen",
            Action::Dispatch => "dispatch",
        };
        f.write_str(s)
    }
}

/// TransitionRule は遷移テーブルの 1 行
///
/// `gate` が Some のとき、そのゲートの判定を `outcome` に書き換えます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: PassState,
    pub by: RoleKind,
    pub action: Action,
    pub to: PassState,
    pub gate: Option<(Gate, GateOutcome)>,
}

const fn rule(
    from: PassState,
    by: RoleKind,
    action: Action,
    to: PassState,
    gate: Option<(Gate, GateOutcome)>,
) -> TransitionRule {
    TransitionRule {
        from,
        by,
        action,
        to,
        gate,
    }
}

use Action as A;
use GateOutcome as O;
use PassState as S;
use RoleKind as R;

/// 全遷移規則
pub const TRANSITIONS: &[TransitionRule] = &[
    rule(S::Draft, R::Requester, A::Submit, S::PendingDepartment, Some((Gate::Department, O::Pending))),
    rule(S::Draft, R::DepartmentHead, A::Submit, S::PendingDepartment, Some((Gate::Department, O::Pending))),
    rule(S::PendingDepartment, R::DepartmentHead, A::Approve, S::PendingStore, Some((Gate::Department, O::Approved))),
    rule(S::PendingDepartment, R::DepartmentHead, A::Reject, S::Rejected, Some((Gate::Department, O::Rejected))),
    rule(S::PendingDepartment, R::DepartmentHead, A::Inquiry, S::Inquiry, Some((Gate::Department, O::Inquiry))),
    rule(S::Inquiry, R::DepartmentHead, A::Approve, S::PendingStore, Some((Gate::Department, O::Approved))),
    rule(S::Inquiry, R::DepartmentHead, A::Reject, S::Rejected, Some((Gate::Department, O::Rejected))),
    rule(S::Inquiry, R::DepartmentHead, A::Reopen, S::PendingDepartment, Some((Gate::Department, O::Pending))),
    rule(S::Inquiry, R::Requester, A::Reopen, S::PendingDepartment, Some((Gate::Department, O::Pending))),
    rule(S::PendingStore, R::StoreManager, A::Approve, S::PendingSecurity, Some((Gate::Store, O::Approved))),
    rule(S::PendingStore, R::StoreManager, A::Reject, S::Rejected, Some((Gate::Store, O::Rejected))),
    rule(S::PendingSecurity, R::Security, A::Approve, S::Approved, Some((Gate::Security, O::Approved))),
    rule(S::PendingSecurity, R::Security, A::Reject, S::Rejected, Some((Gate::Security, O::Rejected))),
    rule(S::Approved, R::Security, A::Dispatch, S::GoneFromGate, None),
];

/// (state, role, action) に一致する規則を探す
pub fn find_rule(state: PassState, role: RoleKind, action: Action) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|r| r.from == state && r.by == role && r.action == action)
}

/// このロールがどこかの状態でこの操作を行えるか
pub fn role_can_ever(role: RoleKind, action: Action) -> bool {
    TRANSITIONS.iter().any(|r| r.by == role && r.action == action)
}

/// 現在状態でロールに許可された操作の集合
pub fn permitted_actions(state: PassState, role: &Role) -> BTreeSet<Action> {
    let kind = role.kind();
    TRANSITIONS
        .iter()
        .filter(|r| r.from == state && r.by == kind)
        .map(|r| r.action)
        .collect()
}
