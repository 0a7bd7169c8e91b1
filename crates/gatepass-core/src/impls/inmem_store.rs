//! InMemoryPassStore - 開発用のパスストア
//!
//! # 実装詳細
//! - パス・番号索引・監査ログを 1 つの tokio Mutex の下に置く
//! - 1 回のロックの中で「状態確認 → 更新 → 監査行追加」を行うので原子的
//! - `set_offline(true)` でストア障害を再現できる（監視ループのテスト用）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::errors::GatePassError;
use crate::domain::escalation::EscalationTier;
use crate::domain::event::{ApprovalEvent, AuditEntry, ForceReturnRecord};
use crate::domain::ids::PassId;
use crate::domain::pass::{GatePass, PassUpdate};
use crate::domain::state::PassState;
use crate::ports::{PassStore, SessionBinding};

#[derive(Default)]
struct StoreState {
    passes: HashMap<PassId, GatePass>,
    /// pass number → id（一意性の保証）
    numbers: HashMap<String, PassId>,
    events: Vec<ApprovalEvent>,
    force_returns: Vec<ForceReturnRecord>,
}

impl StoreState {
    fn pass(&self, id: PassId) -> Result<&GatePass, GatePassError> {
        self.passes.get(&id).ok_or(GatePassError::NotFound(id))
    }

    fn append(&mut self, audit: Vec<AuditEntry>) {
        for entry in audit {
            match entry {
                AuditEntry::Approval(event) => self.events.push(event),
                AuditEntry::ForceReturn(record) => self.force_returns.push(record),
            }
        }
    }
}

/// InMemoryPassStore は開発用の PassStore
#[derive(Default)]
pub struct InMemoryPassStore {
    state: Mutex<StoreState>,
    offline: AtomicBool,
}

impl InMemoryPassStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// true の間、すべての操作が StoreUnavailable を返す
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), GatePassError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatePassError::StoreUnavailable(
                "in-memory store is offline".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PassStore for InMemoryPassStore {
    async fn insert(&self, pass: GatePass) -> Result<(), GatePassError> {
        self.ensure_online()?;
        pass.check_invariants()?;
        let mut state = self.state.lock().await;
        if let Some(number) = pass.number_str() {
            if state.numbers.contains_key(number) {
                return Err(GatePassError::DuplicatePassNumber(number.to_string()));
            }
            state.numbers.insert(number.to_string(), pass.id);
        }
        state.passes.insert(pass.id, pass);
        Ok(())
    }

    async fn get(&self, id: PassId) -> Result<GatePass, GatePassError> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        state.pass(id).cloned()
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<GatePass>, GatePassError> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        Ok(state
            .numbers
            .get(number)
            .and_then(|id| state.passes.get(id))
            .cloned())
    }

    async fn apply(
        &self,
        id: PassId,
        update: PassUpdate,
        audit: Vec<AuditEntry>,
    ) -> Result<GatePass, GatePassError> {
        self.ensure_online()?;
        if let Some(stray) = audit.iter().find(|entry| entry.pass_id() != id) {
            return Err(GatePassError::Validation(format!(
                "audit entry for {} cannot be written with {id}",
                stray.pass_id()
            )));
        }
        let mut state = self.state.lock().await;
        let current = state.pass(id)?;
        if current.state != update.expected {
            return Err(GatePassError::Conflict {
                pass_id: id,
                expected: update.expected,
                actual: current.state,
            });
        }
        if let Some(number) = &update.pass_number
            && state
                .numbers
                .get(number.as_str())
                .is_some_and(|owner| *owner != id)
        {
            return Err(GatePassError::DuplicatePassNumber(number.to_string()));
        }

        let mut next = current.clone();
        update.apply_to(&mut next);
        next.check_invariants()?;

        if let Some(number) = next.number_str() {
            state.numbers.insert(number.to_string(), id);
        }
        debug!(pass_id = %id, from = %update.expected, to = %next.state, "pass updated");
        state.passes.insert(id, next.clone());
        state.append(audit);
        Ok(next)
    }

    async fn bind_return_session(
        &self,
        id: PassId,
        candidate: String,
        binding: SessionBinding,
    ) -> Result<String, GatePassError> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let pass = state.passes.get_mut(&id).ok_or(GatePassError::NotFound(id))?;
        match (&pass.return_session, binding) {
            (Some(existing), SessionBinding::KeepExisting) => Ok(existing.clone()),
            _ => {
                pass.return_session = Some(candidate.clone());
                Ok(candidate)
            }
        }
    }

    async fn delete_draft(&self, id: PassId) -> Result<GatePass, GatePassError> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let actual = state.pass(id)?.state;
        if actual != PassState::Draft {
            return Err(GatePassError::Conflict {
                pass_id: id,
                expected: PassState::Draft,
                actual,
            });
        }
        let removed = state.passes.remove(&id).ok_or(GatePassError::NotFound(id))?;
        if let Some(number) = removed.number_str() {
            state.numbers.remove(number);
        }
        state.events.retain(|e| e.pass_id != id);
        Ok(removed)
    }

    async fn history(&self, id: PassId) -> Result<Vec<ApprovalEvent>, GatePassError> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        state.pass(id)?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.pass_id == id)
            .cloned()
            .collect())
    }

    async fn force_return_log(&self, id: PassId) -> Result<Vec<ForceReturnRecord>, GatePassError> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        state.pass(id)?;
        Ok(state
            .force_returns
            .iter()
            .filter(|r| r.pass_id == id)
            .cloned()
            .collect())
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<GatePass>, GatePassError> {
        self.ensure_online()?;
        let state = self.state.lock().await;
        let mut passes: Vec<GatePass> = state
            .passes
            .values()
            .filter(|p| p.is_overdue(now))
            .cloned()
            .collect();
        passes.sort_by_key(|p| (p.expected_return, p.id));
        Ok(passes)
    }

    async fn claim_escalation(
        &self,
        id: PassId,
        tier: EscalationTier,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<bool, GatePassError> {
        self.ensure_online()?;
        let mut state = self.state.lock().await;
        let pass = state.passes.get_mut(&id).ok_or(GatePassError::NotFound(id))?;
        if !pass.is_overdue(now) {
            return Ok(false);
        }
        if let Some(last) = pass.last_escalated_at()
            && now - last < min_interval
        {
            return Ok(false);
        }
        pass.last_escalation.insert(tier, now);
        Ok(true)
    }
}
