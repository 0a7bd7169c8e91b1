//! ApprovalService - ゲート承認の状態機械
//!
//! # 遷移の流れ
//! 1. ディレクトリでロールを確認し、組織スコープ（自部門・作成者本人）を検査
//! 2. 現在の状態を読み直し、遷移テーブルから規則を引く
//! 3. 「観測した状態」を条件に PassStore::apply（状態更新と監査行を原子的に）
//! 4. コミット後に通知（失敗はログのみ）
//!
//! 同じパスへの同時操作は 3 の条件付き更新で 1 つだけが成功し、
//! 残りは Conflict になります。負けた側は通知を送りません。

use std::sync::Arc;

use tracing::info;

use crate::app::authenticate;
use crate::app::routing::{self, Route};
use crate::app::tokens::{IssuedToken, ReturnToken, TokenService};
use crate::domain::actor::{Action, Actor, Role, TRANSITIONS, find_rule, role_can_ever};
use crate::domain::errors::{GatePassError, TokenError};
use crate::domain::event::{ApprovalEvent, AuditEntry, EventOutcome, ForceReturnRecord};
use crate::domain::ids::{PassId, UserId};
use crate::domain::pass::{GatePass, MaterialDetails, NewGatePass, PassNumber, PassUpdate};
use crate::domain::state::{Gate, PassState};
use crate::ports::{Clock, IdGenerator, Notifier, OrgDirectory, PassStore, SessionBinding};

/// 返却の証明
#[derive(Debug, Clone)]
pub enum ReturnProof {
    /// 守衛が読み取った返却トークン
    ScannedToken { scanner: Actor, token: String },
    /// 守衛による手動確認。パス番号の明示が必要
    ManualOverride { officer: Actor, pass_number: String },
}

pub struct ApprovalService {
    store: Arc<dyn PassStore>,
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn OrgDirectory>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    tokens: Arc<TokenService>,
    number_prefix: String,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn PassStore>,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn OrgDirectory>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        tokens: Arc<TokenService>,
        number_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            directory,
            clock,
            ids,
            tokens,
            number_prefix: number_prefix.into(),
        }
    }

    // ========================================
    // Draft management
    // ========================================

    pub async fn create_draft(
        &self,
        requester: &Actor,
        input: NewGatePass,
    ) -> Result<GatePass, GatePassError> {
        self.authenticate(requester).await?;
        match &requester.role {
            Role::Requester => {
                let home = self.directory.department_of(requester.user_id).await;
                if home != Some(input.department_id) {
                    return Err(GatePassError::Authorization(format!(
                        "requester does not belong to department {}",
                        input.department_id
                    )));
                }
            }
            Role::DepartmentHead(dept) if *dept == input.department_id => {}
            _ => {
                return Err(GatePassError::Authorization(
                    "only requesters and their department head create passes".into(),
                ));
            }
        }
        input.validate()?;

        let pass = GatePass::draft(
            self.ids.generate_pass_id(),
            requester.user_id,
            input,
            self.clock.now(),
        );
        self.store.insert(pass.clone()).await?;
        info!(pass_id = %pass.id, created_by = %pass.created_by, "draft created");
        Ok(pass)
    }

    /// draft を提出し、pass number を採番する
    pub async fn submit_draft(
        &self,
        pass_id: PassId,
        actor: &Actor,
    ) -> Result<GatePass, GatePassError> {
        self.transition(pass_id, actor, Action::Submit, None).await
    }

    pub async fn amend_details(
        &self,
        pass_id: PassId,
        actor: &Actor,
        details: MaterialDetails,
    ) -> Result<GatePass, GatePassError> {
        self.authenticate(actor).await?;
        let pass = self.store.get(pass_id).await?;
        require_department_head(actor, &pass)?;
        if !matches!(pass.state, PassState::Draft | PassState::PendingDepartment) {
            return Err(self.refusal(&pass, PassState::PendingDepartment));
        }
        details.validate()?;

        let now = self.clock.now();
        let update = PassUpdate::new(pass.state, now).details(details);
        let audit = self.event(&pass, actor.user_id, None, EventOutcome::Amended, None);
        let updated = self.commit(pass_id, update, vec![audit]).await?;
        info!(pass_id = %pass_id, actor = %actor.user_id, "details amended");

        self.notify(&updated, &routing::for_amendment(&updated), None).await;
        Ok(updated)
    }

    pub async fn delete_draft(&self, pass_id: PassId, actor: &Actor) -> Result<(), GatePassError> {
        self.authenticate(actor).await?;
        let pass = self.store.get(pass_id).await?;
        require_department_head(actor, &pass)?;
        if pass.state != PassState::Draft {
            return Err(self.refusal(&pass, PassState::Draft));
        }

        let removed = self.store.delete_draft(pass_id).await?;
        info!(pass_id = %pass_id, actor = %actor.user_id, "draft deleted");
        self.notify(&removed, &routing::for_deletion(&removed), None).await;
        Ok(())
    }

    // ========================================
    // Gate transitions
    // ========================================

    /// ゲート遷移を 1 つ実行し、遷移後の状態を返す
    pub async fn submit_transition(
        &self,
        pass_id: PassId,
        actor: &Actor,
        action: Action,
        comment: Option<&str>,
    ) -> Result<PassState, GatePassError> {
        self.transition(pass_id, actor, action, comment)
            .await
            .map(|pass| pass.state)
    }

    async fn transition(
        &self,
        pass_id: PassId,
        actor: &Actor,
        action: Action,
        comment: Option<&str>,
    ) -> Result<GatePass, GatePassError> {
        self.authenticate(actor).await?;
        let kind = actor.role.kind();
        if !role_can_ever(kind, action) {
            return Err(GatePassError::Authorization(format!(
                "{kind} cannot {action} gate passes"
            )));
        }

        let pass = self.store.get(pass_id).await?;
        check_scope(actor, action, &pass)?;

        let Some(rule) = find_rule(pass.state, kind, action) else {
            let wanted = TRANSITIONS
                .iter()
                .find(|r| r.by == kind && r.action == action)
                .map_or(pass.state, |r| r.from);
            return Err(self.refusal(&pass, wanted));
        };

        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        if action == Action::Inquiry && comment.is_none() {
            return Err(GatePassError::Validation("an inquiry needs a comment".into()));
        }

        let now = self.clock.now();
        let mut update = PassUpdate::new(pass.state, now).transition(rule.to);
        if let Some((gate, outcome)) = rule.gate {
            update = update.gate(gate, outcome, actor.user_id);
        }
        match (&actor.role, action) {
            (_, Action::Submit) if pass.pass_number.is_none() => {
                update = update.pass_number(PassNumber::generate(&self.number_prefix, now));
            }
            (Role::StoreManager(location), Action::Approve) => {
                update = update.store_location(location.clone());
            }
            (_, Action::Dispatch) => {
                update = update.exited_at(now);
            }
            _ => {}
        }

        let outcome = match action {
            Action::Submit => EventOutcome::Submitted,
            Action::Approve => EventOutcome::Approved,
            Action::Reject => EventOutcome::Rejected,
            Action::Inquiry => EventOutcome::Inquiry,
            Action::Reopen => EventOutcome::Reopened,
            Action::Dispatch => EventOutcome::Dispatched,
        };
        let gate = rule.gate.map(|(gate, _)| gate);
        let audit = self.event(&pass, actor.user_id, gate, outcome, comment);
        let updated = self.commit(pass_id, update, vec![audit]).await?;
        info!(
            pass_id = %pass_id,
            actor = %actor.user_id,
            %action,
            from = %pass.state,
            to = %updated.state,
            "transition committed"
        );

        let route = routing::for_transition(&updated, pass.state, action, comment);
        self.notify(&updated, &route, None).await;
        Ok(updated)
    }

    // ========================================
    // Return sub-machine
    // ========================================

    pub async fn mark_returned(
        &self,
        pass_id: PassId,
        proof: ReturnProof,
    ) -> Result<GatePass, GatePassError> {
        let officer = match &proof {
            ReturnProof::ScannedToken { scanner, .. } => scanner,
            ReturnProof::ManualOverride { officer, .. } => officer,
        };
        self.authenticate(officer).await?;
        if officer.role != Role::Security {
            return Err(GatePassError::Authorization(
                "only security records returns".into(),
            ));
        }

        let pass = self.store.get(pass_id).await?;
        if !pass.is_returnable() {
            return Err(GatePassError::Validation(format!(
                "pass {pass_id} is non-returnable"
            )));
        }
        if !pass.state.has_cleared_gates() {
            return Err(self.refusal(&pass, PassState::GoneFromGate));
        }

        let note = match &proof {
            ReturnProof::ScannedToken { token, .. } => {
                let session = pass
                    .return_session
                    .as_deref()
                    .ok_or(TokenError::SessionMismatch)?;
                let parsed = self.tokens.verify(token, Some(session))?;
                if parsed.pass_id != pass_id {
                    return Err(TokenError::PassMismatch(format!(
                        "token is for {}, not {pass_id}",
                        parsed.pass_id
                    ))
                    .into());
                }
                "return token verified"
            }
            ReturnProof::ManualOverride { pass_number, .. } => {
                if pass.number_str() != Some(pass_number.trim()) {
                    return Err(GatePassError::Validation(format!(
                        "cited pass number {pass_number} does not match pass {pass_id}"
                    )));
                }
                "manual return override"
            }
        };

        let now = self.clock.now();
        let update = PassUpdate::new(pass.state, now)
            .transition(PassState::Returned)
            .returned_at(now);
        let audit = self.event(&pass, officer.user_id, None, EventOutcome::Returned, Some(note));
        let updated = self.commit(pass_id, update, vec![audit]).await?;
        info!(pass_id = %pass_id, officer = %officer.user_id, note, "material returned");

        self.notify(&updated, &routing::for_return(&updated), None).await;
        Ok(updated)
    }

    /// 管理者による強制返却
    ///
    /// 提出済みで未返却の返却対象パスなら、rejected を含めてどの状態からでも閉じられる。
    pub async fn force_return(
        &self,
        pass_id: PassId,
        admin: &Actor,
        remarks: &str,
    ) -> Result<GatePass, GatePassError> {
        self.authenticate(admin).await?;
        if admin.role != Role::Admin {
            return Err(GatePassError::Authorization(
                "only administrators force a return".into(),
            ));
        }
        let remarks = remarks.trim();
        if remarks.is_empty() {
            return Err(GatePassError::Validation("force return needs remarks".into()));
        }

        let pass = self.store.get(pass_id).await?;
        if !pass.is_returnable() {
            return Err(GatePassError::Validation(format!(
                "pass {pass_id} is non-returnable"
            )));
        }
        if pass.actual_return.is_some() || pass.state.is_closed_by_return() {
            return Err(GatePassError::AlreadyTerminal {
                pass_id,
                state: pass.state,
            });
        }
        if pass.state == PassState::Draft {
            return Err(GatePassError::Validation(
                "a draft has not been submitted and cannot be force-returned".into(),
            ));
        }

        let now = self.clock.now();
        let update = PassUpdate::new(pass.state, now)
            .transition(PassState::ForceReturned)
            .returned_at(now)
            .remarks(remarks);
        let record = AuditEntry::ForceReturn(ForceReturnRecord {
            id: self.ids.generate_event_id(),
            pass_id,
            admin: admin.user_id,
            remarks: remarks.to_string(),
            at: now,
        });
        let updated = self.commit(pass_id, update, vec![record]).await?;
        info!(pass_id = %pass_id, admin = %admin.user_id, from = %pass.state, "force return recorded");

        let route = routing::for_force_return(&updated, remarks);
        self.notify(&updated, &route, Some(admin.user_id)).await;
        Ok(updated)
    }

    // ========================================
    // Return tokens
    // ========================================

    /// 返却トークンを発行。既存のセッションがあれば再利用する
    pub async fn generate_return_token(&self, pass_id: PassId) -> Result<IssuedToken, GatePassError> {
        self.issue_token(pass_id, SessionBinding::KeepExisting).await
    }

    /// セッションを作り直して再発行する。以前に印刷したコードは無効になる
    pub async fn reissue_return_token(
        &self,
        pass_id: PassId,
        actor: &Actor,
    ) -> Result<IssuedToken, GatePassError> {
        self.authenticate(actor).await?;
        if !matches!(actor.role, Role::Security | Role::Admin) {
            return Err(GatePassError::Authorization(
                "only security or administrators reissue return codes".into(),
            ));
        }
        self.issue_token(pass_id, SessionBinding::Replace).await
    }

    async fn issue_token(
        &self,
        pass_id: PassId,
        binding: SessionBinding,
    ) -> Result<IssuedToken, GatePassError> {
        let pass = self.store.get(pass_id).await?;
        if !pass.is_returnable() {
            return Err(GatePassError::Validation(format!(
                "pass {pass_id} is non-returnable"
            )));
        }
        if !pass.state.has_cleared_gates() {
            return Err(self.refusal(&pass, PassState::Approved));
        }
        let number = pass
            .number_str()
            .ok_or_else(|| GatePassError::Validation(format!("pass {pass_id} has no number")))?;

        let session = self
            .store
            .bind_return_session(pass_id, TokenService::mint_session_id(), binding)
            .await?;
        Ok(self.tokens.generate(pass_id, number, Some(&session)))
    }

    /// トークンを検証し、保存されているパスと一致するか確認する
    pub async fn verify_return_token(
        &self,
        token: &str,
        expected_session: Option<&str>,
    ) -> Result<ReturnToken, GatePassError> {
        let parsed = self.tokens.verify(token, expected_session).inspect_err(|e| {
            info!(error = %e, "return token rejected");
        })?;
        let pass = match self.store.get(parsed.pass_id).await {
            Ok(pass) => pass,
            Err(GatePassError::NotFound(id)) => {
                return Err(TokenError::PassMismatch(format!("no pass {id}")).into());
            }
            Err(e) => return Err(e),
        };
        if pass.number_str() != Some(parsed.pass_number.as_str()) {
            return Err(TokenError::PassMismatch(format!(
                "number {} does not belong to {}",
                parsed.pass_number, pass.id
            ))
            .into());
        }
        Ok(parsed)
    }

    /// 物品タグ用のステッカーコード
    pub async fn sticker_token(&self, pass_id: PassId) -> Result<String, GatePassError> {
        let pass = self.store.get(pass_id).await?;
        let number = pass
            .number_str()
            .ok_or_else(|| GatePassError::Validation(format!("pass {pass_id} has no number")))?;
        Ok(self.tokens.sticker(pass_id, number))
    }

    // ========================================
    // Queries
    // ========================================

    pub async fn get(&self, pass_id: PassId) -> Result<GatePass, GatePassError> {
        self.store.get(pass_id).await
    }

    pub async fn find_by_number(&self, number: &str) -> Result<GatePass, GatePassError> {
        self.store
            .find_by_number(number)
            .await?
            .ok_or_else(|| GatePassError::UnknownPassNumber(number.to_string()))
    }

    pub async fn history(&self, pass_id: PassId) -> Result<Vec<ApprovalEvent>, GatePassError> {
        self.store.history(pass_id).await
    }

    pub async fn force_return_log(
        &self,
        pass_id: PassId,
    ) -> Result<Vec<ForceReturnRecord>, GatePassError> {
        self.store.force_return_log(pass_id).await
    }

    // ========================================
    // Helpers
    // ========================================

    async fn authenticate(&self, actor: &Actor) -> Result<(), GatePassError> {
        authenticate(self.directory.as_ref(), actor).await
    }

    /// 現在状態では受け付けられない操作のエラー
    fn refusal(&self, pass: &GatePass, wanted: PassState) -> GatePassError {
        if pass.state.is_terminal() {
            GatePassError::AlreadyTerminal {
                pass_id: pass.id,
                state: pass.state,
            }
        } else {
            GatePassError::Conflict {
                pass_id: pass.id,
                expected: wanted,
                actual: pass.state,
            }
        }
    }

    async fn commit(
        &self,
        pass_id: PassId,
        update: PassUpdate,
        audit: Vec<AuditEntry>,
    ) -> Result<GatePass, GatePassError> {
        match self.store.apply(pass_id, update, audit).await {
            Err(GatePassError::Conflict { actual, .. }) if actual.is_terminal() => {
                Err(GatePassError::AlreadyTerminal {
                    pass_id,
                    state: actual,
                })
            }
            other => other,
        }
    }

    fn event(
        &self,
        pass: &GatePass,
        actor: UserId,
        gate: Option<Gate>,
        outcome: EventOutcome,
        comment: Option<&str>,
    ) -> AuditEntry {
        AuditEntry::Approval(ApprovalEvent {
            id: self.ids.generate_event_id(),
            pass_id: pass.id,
            actor,
            gate,
            outcome,
            comment: comment.map(str::to_string),
            at: self.clock.now(),
        })
    }

    async fn notify(&self, pass: &GatePass, route: &Route, exclude: Option<UserId>) {
        let recipients =
            routing::resolve(self.directory.as_ref(), pass, &route.audiences, exclude).await;
        routing::deliver_all(self.notifier.as_ref(), pass, &recipients, route).await;
    }
}

/// 部門長が自部門のパスを操作しているか
fn require_department_head(actor: &Actor, pass: &GatePass) -> Result<(), GatePassError> {
    match &actor.role {
        Role::DepartmentHead(dept) if *dept == pass.department_id => Ok(()),
        _ => Err(GatePassError::Authorization(format!(
            "only the head of {} may change pass {}",
            pass.department_id, pass.id
        ))),
    }
}

/// 組織スコープの検査（状態に依存しない部分）
fn check_scope(actor: &Actor, action: Action, pass: &GatePass) -> Result<(), GatePassError> {
    match (&actor.role, action) {
        (Role::DepartmentHead(_), _) => require_department_head(actor, pass),
        (Role::Requester, Action::Submit | Action::Reopen) if actor.user_id != pass.created_by => {
            Err(GatePassError::Authorization(format!(
                "only the creator may {action} pass {}",
                pass.id
            )))
        }
        _ => Ok(()),
    }
}
