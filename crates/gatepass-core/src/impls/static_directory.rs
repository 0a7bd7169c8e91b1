//! StaticDirectory - 固定のユーザー一覧による OrgDirectory

use crate::domain::actor::{Role, RoleKind, StoreLocation};
use crate::domain::ids::{DepartmentId, UserId};
use crate::ports::OrgDirectory;

/// StaticDirectory は登録順を保つユーザー一覧
///
/// 部門長は自分の部門に所属しているものとして扱う。
///
/// # 使用例
/// ```ignore
/// let directory = StaticDirectory::new()
///     .with_user(clerk, Role::Requester)
///     .with_member(clerk, dept)
///     .with_user(head, Role::DepartmentHead(dept))
///     .with_user(guard, Role::Security);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Vec<(UserId, Role)>,
    members: Vec<(UserId, DepartmentId)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーを追加（既に登録済みならロールを置き換える）
    pub fn with_user(mut self, user: UserId, role: Role) -> Self {
        match self.users.iter_mut().find(|(id, _)| *id == user) {
            Some(entry) => entry.1 = role,
            None => self.users.push((user, role)),
        }
        self
    }

    /// 所属部門を登録（既にあれば置き換える）
    pub fn with_member(mut self, user: UserId, department: DepartmentId) -> Self {
        match self.members.iter_mut().find(|(id, _)| *id == user) {
            Some(entry) => entry.1 = department,
            None => self.members.push((user, department)),
        }
        self
    }

    fn matching(&self, predicate: impl Fn(&Role) -> bool) -> Vec<UserId> {
        self.users
            .iter()
            .filter(|(_, role)| predicate(role))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[async_trait::async_trait]
impl OrgDirectory for StaticDirectory {
    async fn role_of(&self, user: UserId) -> Option<Role> {
        self.users
            .iter()
            .find(|(id, _)| *id == user)
            .map(|(_, role)| role.clone())
    }

    async fn department_of(&self, user: UserId) -> Option<DepartmentId> {
        if let Some((_, dept)) = self.members.iter().find(|(id, _)| *id == user) {
            return Some(*dept);
        }
        match self.role_of(user).await? {
            Role::DepartmentHead(dept) => Some(dept),
            _ => None,
        }
    }

    async fn department_heads(&self, department: DepartmentId) -> Vec<UserId> {
        self.matching(|role| matches!(role, Role::DepartmentHead(d) if *d == department))
    }

    async fn store_managers(&self, location: Option<&StoreLocation>) -> Vec<UserId> {
        self.matching(|role| match role {
            Role::StoreManager(l) => location.is_none_or(|want| want == l),
            _ => false,
        })
    }

    async fn users_with_role(&self, kind: RoleKind) -> Vec<UserId> {
        self.matching(|role| role.kind() == kind)
    }
}
