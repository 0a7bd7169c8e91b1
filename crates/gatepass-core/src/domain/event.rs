//! Audit records for pass history.
//!
//! Both trails are append-only: rows are never mutated. The only removal is
//! the cascade when a draft is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EventId, PassId, UserId};
use super::state::Gate;

/// What an approval event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Submitted,
    Approved,
    Rejected,
    Inquiry,
    Reopened,
    Dispatched,
    Returned,
    Amended,
}

/// One row of the approval audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub id: EventId,
    pub pass_id: PassId,
    pub actor: UserId,
    /// None for events that are not tied to a gate (dispatch, return, amend).
    pub gate: Option<Gate>,
    pub outcome: EventOutcome,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

/// Administrative closure of a returnable pass, kept in its own trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceReturnRecord {
    pub id: EventId,
    pub pass_id: PassId,
    pub admin: UserId,
    pub remarks: String,
    pub at: DateTime<Utc>,
}

/// Audit row written atomically with a pass update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trail", rename_all = "snake_case")]
pub enum AuditEntry {
    Approval(ApprovalEvent),
    ForceReturn(ForceReturnRecord),
}

impl AuditEntry {
    pub fn pass_id(&self) -> PassId {
        match self {
            AuditEntry::Approval(e) => e.pass_id,
            AuditEntry::ForceReturn(r) => r.pass_id,
        }
    }
}
