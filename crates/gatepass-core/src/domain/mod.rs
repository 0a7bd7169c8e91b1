//! Domain model (ids, states, roles, pass records, audit events, ...).
//!
//! - ids: ULID ベースの型付き ID
//! - state: ライフサイクル状態とゲート
//! - actor: ロールと遷移テーブル
//! - pass: GatePass 本体と PassUpdate
//! - event: 監査ログ（ApprovalEvent, ForceReturnRecord）
//! - escalation: 延滞エスカレーションの段階
//! - notification: 通知メッセージ
//! - errors: エラー分類

pub mod actor;
pub mod errors;
pub mod escalation;
pub mod event;
pub mod ids;
pub mod notification;
pub mod pass;
pub mod state;

pub use actor::{Action, Actor, Role, RoleKind, StoreLocation, TransitionRule, permitted_actions};
pub use errors::{ErrorKind, GatePassError, TokenError};
pub use escalation::{Escalation, EscalationTier};
pub use event::{ApprovalEvent, AuditEntry, EventOutcome, ForceReturnRecord};
pub use ids::{DepartmentId, DivisionId, EventId, PassId, UserId};
pub use notification::{Notification, NotificationCategory};
pub use pass::{
    GatePass, GateRecord, MaterialCondition, MaterialDetails, MaterialType, NewGatePass,
    PassNumber, PassUpdate, Receiver,
};
pub use state::{Gate, GateOutcome, PassState};
