//! Errors - エラー型と分類
//!
//! すべての操作エラーは `GatePassError` として呼び出し元にそのまま返します。
//! 例外は通知配送の失敗だけで、これはログに残して握りつぶします。

use super::ids::PassId;
use super::state::PassState;

/// ErrorKind はエラーの運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 入力不正
    Validation,
    /// ロール・スコープ違反
    Authorization,
    /// 楽観的排他の競合（再読込して判断し直す）
    Conflict,
    /// 終端状態に対する操作
    AlreadyTerminal,
    /// トークン検証の失敗
    Token,
    /// 対象が存在しない
    NotFound,
    /// ストア障害（リトライ推奨）
    Infrastructure,
}

/// GatePassError はドメインエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatePassError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("pass {pass_id} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        pass_id: PassId,
        expected: PassState,
        actual: PassState,
    },

    #[error("pass number {0} is already taken")]
    DuplicatePassNumber(String),

    #[error("pass {pass_id} is already {state}")]
    AlreadyTerminal { pass_id: PassId, state: PassState },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("pass store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("pass {0} not found")]
    NotFound(PassId),

    #[error("no pass with number {0}")]
    UnknownPassNumber(String),
}

impl GatePassError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatePassError::Validation(_) => ErrorKind::Validation,
            GatePassError::Authorization(_) => ErrorKind::Authorization,
            GatePassError::Conflict { .. } | GatePassError::DuplicatePassNumber(_) => {
                ErrorKind::Conflict
            }
            GatePassError::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
            GatePassError::Token(_) => ErrorKind::Token,
            GatePassError::StoreUnavailable(_) => ErrorKind::Infrastructure,
            GatePassError::NotFound(_) | GatePassError::UnknownPassNumber(_) => {
                ErrorKind::NotFound
            }
        }
    }

    /// 同じ要求をそのまま再試行して意味があるか
    ///
    /// pass number の衝突は秒単位の採番なので、再試行で解消します。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatePassError::StoreUnavailable(_) | GatePassError::DuplicatePassNumber(_)
        )
    }
}

/// TokenError は返却トークンの検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid session - possible photo fraud")]
    SessionMismatch,

    #[error("token expired ({age_secs}s old)")]
    Expired { age_secs: i64 },

    #[error("token signature mismatch - tampered")]
    Tampered,

    #[error("sticker codes are not accepted as return proof")]
    NotReturnProof,

    #[error("token does not match pass: {0}")]
    PassMismatch(String),
}
