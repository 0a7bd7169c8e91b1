//! PassStore port - パス記録の正本（source of truth）
//!
//! PassStore は以下を管理します：
//! - パス本体（GatePass）
//! - 承認の監査ログ（ApprovalEvent）
//! - 強制返却の監査ログ（ForceReturnRecord）
//!
//! # 設計原則
//! - 更新は「直前に観測した状態」を条件にした条件付き更新（楽観的排他）
//! - 状態の変更と監査行の追加は同一の原子的操作
//! - エスカレーションの記録も check-and-set で、二重送信を防ぐ

use chrono::{DateTime, Duration, Utc};

use crate::domain::errors::GatePassError;
use crate::domain::escalation::EscalationTier;
use crate::domain::event::{ApprovalEvent, AuditEntry, ForceReturnRecord};
use crate::domain::ids::PassId;
use crate::domain::pass::{GatePass, PassUpdate};

/// 返却セッションの束縛方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBinding {
    /// 既存のセッションがあればそれを返す（同じ印刷物の再生成）
    KeepExisting,
    /// 新しいセッションで置き換える（再発行。古い印刷物は無効になる）
    Replace,
}

#[async_trait::async_trait]
pub trait PassStore: Send + Sync {
    /// 新しいパスを保存
    async fn insert(&self, pass: GatePass) -> Result<(), GatePassError>;

    /// ID で取得（なければ NotFound）
    async fn get(&self, id: PassId) -> Result<GatePass, GatePassError>;

    async fn find_by_number(&self, number: &str) -> Result<Option<GatePass>, GatePassError>;

    /// 条件付き更新 + 監査行の追加
    ///
    /// # エラー
    /// - 現在の状態が `update.expected` と異なる → Conflict
    /// - pass number が他のパスで使用済み → DuplicatePassNumber
    async fn apply(
        &self,
        id: PassId,
        update: PassUpdate,
        audit: Vec<AuditEntry>,
    ) -> Result<GatePass, GatePassError>;

    /// 返却セッション ID を束縛し、有効なセッション ID を返す
    async fn bind_return_session(
        &self,
        id: PassId,
        candidate: String,
        binding: SessionBinding,
    ) -> Result<String, GatePassError>;

    /// draft のパスを削除し、そのパスの監査行も消す
    async fn delete_draft(&self, id: PassId) -> Result<GatePass, GatePassError>;

    async fn history(&self, id: PassId) -> Result<Vec<ApprovalEvent>, GatePassError>;

    async fn force_return_log(&self, id: PassId) -> Result<Vec<ForceReturnRecord>, GatePassError>;

    /// 返却期限を過ぎた未返却の持ち出し中パス
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<GatePass>, GatePassError>;

    /// エスカレーション送信権の取得（check-and-set）
    ///
    /// まだ延滞中で、直近のエスカレーションから `min_interval` 以上経っていれば
    /// `tier` の送信時刻を `now` に更新して true を返します。
    async fn claim_escalation(
        &self,
        id: PassId,
        tier: EscalationTier,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<bool, GatePassError>;
}
