//! OrgDirectory port - 組織ディレクトリ（読み取り専用）
//!
//! ロール判定、所属部門、組織単位から責任者を引く問い合わせを提供します。

use crate::domain::actor::{Role, RoleKind, StoreLocation};
use crate::domain::ids::{DepartmentId, UserId};

#[async_trait::async_trait]
pub trait OrgDirectory: Send + Sync {
    /// ユーザーのロール（未登録なら None）
    async fn role_of(&self, user: UserId) -> Option<Role>;

    /// ユーザーの所属部門（未所属なら None）
    async fn department_of(&self, user: UserId) -> Option<DepartmentId>;

    /// 部門の部門長
    async fn department_heads(&self, department: DepartmentId) -> Vec<UserId>;

    /// 倉庫管理者。`location` が None なら全倉庫
    async fn store_managers(&self, location: Option<&StoreLocation>) -> Vec<UserId>;

    /// 指定ロールのユーザー全員
    async fn users_with_role(&self, role: RoleKind) -> Vec<UserId>;
}
