//! Routing - 通知の宛先とメッセージの規則
//!
//! `for_*` 関数は純粋関数で、遷移ごとに「誰に（Audience）」「何を」送るかを決めます。
//! Audience を実際のユーザーに解決するのは `resolve`（ディレクトリ参照）です。

use tracing::warn;

use crate::domain::actor::{Action, RoleKind, StoreLocation};
use crate::domain::escalation::EscalationTier;
use crate::domain::ids::UserId;
use crate::domain::notification::{Notification, NotificationCategory};
use crate::domain::pass::GatePass;
use crate::domain::state::PassState;
use crate::ports::{Notifier, OrgDirectory};

/// 宛先の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Creator,
    /// パスの部門の部門長
    DepartmentHeads,
    /// None なら全倉庫
    StoreManagers(Option<StoreLocation>),
    Security,
    Admins,
    User(UserId),
}

/// 1 回の通知の宛先とメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub audiences: Vec<Audience>,
    pub message: String,
    pub category: NotificationCategory,
}

impl Route {
    fn new(audiences: Vec<Audience>, category: NotificationCategory, message: String) -> Self {
        Self {
            audiences,
            message,
            category,
        }
    }
}

fn label(pass: &GatePass) -> String {
    match &pass.pass_number {
        Some(number) => format!("Gate pass {number}"),
        None => format!("Gate pass {}", pass.id),
    }
}

/// ゲート遷移の通知。`pass` は遷移後の状態
pub fn for_transition(
    pass: &GatePass,
    from: PassState,
    action: Action,
    comment: Option<&str>,
) -> Route {
    use Audience::*;
    use NotificationCategory as C;

    let name = label(pass);
    let location = pass.store_location.clone();
    match (from, action) {
        (_, Action::Submit) => Route::new(
            vec![DepartmentHeads, Creator],
            C::Approval,
            format!("{name} submitted and awaiting department approval"),
        ),
        (_, Action::Reopen) => Route::new(
            vec![DepartmentHeads],
            C::Approval,
            format!("{name} reopened and awaiting department approval"),
        ),
        (_, Action::Reject) => Route::new(
            vec![Creator],
            C::Status,
            match comment {
                Some(reason) => format!("{name} was rejected at {from}: {reason}"),
                None => format!("{name} was rejected at {from}"),
            },
        ),
        (_, Action::Inquiry) => Route::new(
            vec![StoreManagers(None)],
            C::Inquiry,
            format!(
                "{name} has a department inquiry: {}",
                comment.unwrap_or_default()
            ),
        ),
        (PassState::PendingStore, Action::Approve) => Route::new(
            vec![Creator, Security],
            C::Approval,
            format!("{name} approved by store, awaiting security"),
        ),
        (PassState::PendingSecurity, Action::Approve) => Route::new(
            vec![Creator, DepartmentHeads, StoreManagers(location), Admins],
            C::Approval,
            format!("{name} fully approved"),
        ),
        (_, Action::Approve) => Route::new(
            vec![Creator, StoreManagers(None), Security],
            C::Approval,
            format!("{name} approved by department, awaiting store"),
        ),
        (_, Action::Dispatch) => Route::new(
            vec![Creator, DepartmentHeads, StoreManagers(location), Admins],
            C::Status,
            format!("{name} material has left the gate"),
        ),
    }
}

pub fn for_return(pass: &GatePass) -> Route {
    Route::new(
        vec![
            Audience::Creator,
            Audience::DepartmentHeads,
            Audience::StoreManagers(pass.store_location.clone()),
            Audience::Admins,
        ],
        NotificationCategory::Status,
        format!("{} material returned", label(pass)),
    )
}

pub fn for_force_return(pass: &GatePass, remarks: &str) -> Route {
    Route::new(
        vec![Audience::Creator, Audience::DepartmentHeads, Audience::Admins],
        NotificationCategory::Alert,
        format!("{} was force-returned by an administrator: {remarks}", label(pass)),
    )
}

pub fn for_amendment(pass: &GatePass) -> Route {
    Route::new(
        vec![Audience::Creator, Audience::Admins],
        NotificationCategory::Status,
        format!("{} details were amended by the department head", label(pass)),
    )
}

pub fn for_deletion(pass: &GatePass) -> Route {
    Route::new(
        vec![Audience::Admins, Audience::Creator],
        NotificationCategory::Status,
        format!("{} draft was deleted by the department head", label(pass)),
    )
}

/// 延滞エスカレーション。段階が上がるほど宛先が広がる
pub fn for_escalation(pass: &GatePass, tier: EscalationTier, days_overdue: i64) -> Route {
    let audiences = match tier {
        EscalationTier::Reminder | EscalationTier::Warning => vec![Audience::Creator],
        EscalationTier::Alert => vec![Audience::Creator, Audience::DepartmentHeads],
        EscalationTier::Critical => vec![
            Audience::Creator,
            Audience::DepartmentHeads,
            Audience::Admins,
        ],
    };
    Route::new(
        audiences,
        NotificationCategory::ReturnOverdue,
        format!(
            "[{tier}] {} is {days_overdue} day(s) overdue for return",
            label(pass)
        ),
    )
}

/// 手動リマインダー：作成者宛てと送信者への確認
pub fn for_manual_reminder(pass: &GatePass, sender: UserId) -> (Route, Route) {
    let name = label(pass);
    (
        Route::new(
            vec![Audience::Creator],
            NotificationCategory::Reminder,
            format!("Reminder: {name} is overdue for return"),
        ),
        Route::new(
            vec![Audience::User(sender)],
            NotificationCategory::Status,
            format!("Reminder sent for {name}"),
        ),
    )
}

/// Audience をユーザーに解決する（重複除去・順序保持、`exclude` は除外）
pub async fn resolve(
    directory: &dyn OrgDirectory,
    pass: &GatePass,
    audiences: &[Audience],
    exclude: Option<UserId>,
) -> Vec<UserId> {
    let mut recipients: Vec<UserId> = Vec::new();
    for audience in audiences {
        let users = match audience {
            Audience::Creator => vec![pass.created_by],
            Audience::DepartmentHeads => directory.department_heads(pass.department_id).await,
            Audience::StoreManagers(location) => directory.store_managers(location.as_ref()).await,
            Audience::Security => directory.users_with_role(RoleKind::Security).await,
            Audience::Admins => directory.users_with_role(RoleKind::Admin).await,
            Audience::User(user) => vec![*user],
        };
        for user in users {
            if Some(user) != exclude && !recipients.contains(&user) {
                recipients.push(user);
            }
        }
    }
    recipients
}

/// 全員に配送する。失敗はログに残して無視する
pub async fn deliver_all(
    notifier: &dyn Notifier,
    pass: &GatePass,
    recipients: &[UserId],
    route: &Route,
) {
    for user in recipients {
        let notification = Notification {
            user_id: *user,
            message: route.message.clone(),
            category: route.category,
            reference: Some(pass.id),
        };
        if let Err(e) = notifier.deliver(&notification).await {
            warn!(pass_id = %pass.id, user_id = %user, error = %e, "notification delivery failed");
        }
    }
}
