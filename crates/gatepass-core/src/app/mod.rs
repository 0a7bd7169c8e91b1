//! App - アプリケーションロジック
//!
//! - approvals: 承認の状態機械（ApprovalService）
//! - tokens: 返却トークン（TokenService）
//! - monitor: 延滞監視（OverdueMonitor）
//! - routing: 通知の宛先規則
//! - builder: 起動時検証付きのワイヤリング

pub mod approvals;
pub mod builder;
pub mod monitor;
pub mod routing;
pub mod tokens;

pub use self::approvals::{ApprovalService, ReturnProof};
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::monitor::{OverdueAlarm, OverdueMonitor};
pub use self::tokens::{IssuedToken, ReturnToken, TokenService};

use crate::domain::actor::Actor;
use crate::domain::errors::GatePassError;
use crate::ports::OrgDirectory;

/// ディレクトリ上のロールと名乗ったロールが一致するか
pub(crate) async fn authenticate(
    directory: &dyn OrgDirectory,
    actor: &Actor,
) -> Result<(), GatePassError> {
    match directory.role_of(actor.user_id).await {
        Some(role) if role == actor.role => Ok(()),
        Some(_) => Err(GatePassError::Authorization(format!(
            "{} does not hold role {}",
            actor.user_id,
            actor.role.kind()
        ))),
        None => Err(GatePassError::Authorization(format!(
            "{} is not in the directory",
            actor.user_id
        ))),
    }
}
