//! Pass record: the gate pass and the updates applied to it.
//!
//! Design:
//! - `GatePass` is the single source of truth for a pass.
//! - Every mutation goes through a `PassUpdate`, which names the state it
//!   expects to find. The store applies it only if that state still holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::actor::StoreLocation;
use super::errors::GatePassError;
use super::escalation::EscalationTier;
use super::ids::{DepartmentId, DivisionId, PassId, UserId};
use super::state::{Gate, GateOutcome, PassState};

/// Human-facing pass number, e.g. `GP20240301093000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassNumber(String);

impl PassNumber {
    /// Timestamp-derived number. Two submissions in the same second collide;
    /// the store rejects the second one.
    pub fn generate(prefix: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{prefix}{}", at.format("%Y%m%d%H%M%S")))
    }

    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PassNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    Returnable,
    NonReturnable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialCondition {
    Damaged,
    Repair,
    New,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    pub contact: String,
}

/// Editable description of what leaves the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialDetails {
    pub description: String,
    pub destination: String,
    pub purpose: String,
    pub receiver: Receiver,
}

impl MaterialDetails {
    pub fn validate(&self) -> Result<(), GatePassError> {
        let required = [
            ("description", &self.description),
            ("destination", &self.destination),
            ("purpose", &self.purpose),
            ("receiver name", &self.receiver.name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(GatePassError::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Input for a new draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGatePass {
    pub division_id: DivisionId,
    pub department_id: DepartmentId,
    pub details: MaterialDetails,
    pub condition: MaterialCondition,
    pub material_type: MaterialType,
    pub sent_at: DateTime<Utc>,
    pub expected_return: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urgent: bool,
}

impl NewGatePass {
    pub fn validate(&self) -> Result<(), GatePassError> {
        self.details.validate()?;
        match (self.material_type, self.expected_return) {
            (MaterialType::Returnable, None) => Err(GatePassError::Validation(
                "returnable material needs an expected return date".into(),
            )),
            (MaterialType::Returnable, Some(expected)) if expected <= self.sent_at => {
                Err(GatePassError::Validation(
                    "expected return must be after the send date".into(),
                ))
            }
            (MaterialType::NonReturnable, Some(_)) => Err(GatePassError::Validation(
                "non-returnable material cannot have an expected return date".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Outcome of one gate plus who decided it and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRecord {
    pub outcome: GateOutcome,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl GateRecord {
    fn pending() -> Self {
        Self {
            outcome: GateOutcome::Pending,
            decided_by: None,
            decided_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePass {
    pub id: PassId,
    /// Assigned when the draft is submitted.
    pub pass_number: Option<PassNumber>,
    pub created_by: UserId,
    pub division_id: DivisionId,
    pub department_id: DepartmentId,
    pub details: MaterialDetails,
    pub condition: MaterialCondition,
    pub material_type: MaterialType,
    pub sent_at: DateTime<Utc>,
    pub expected_return: Option<DateTime<Utc>>,
    pub actual_return: Option<DateTime<Utc>>,
    pub state: PassState,
    pub department_gate: GateRecord,
    pub store_gate: GateRecord,
    pub security_gate: GateRecord,
    /// Set once the store gate resolves.
    pub store_location: Option<StoreLocation>,
    /// Binds printed return codes to one print cycle.
    pub return_session: Option<String>,
    pub last_escalation: BTreeMap<EscalationTier, DateTime<Utc>>,
    pub urgent: bool,
    pub gate_exit_at: Option<DateTime<Utc>>,
    pub force_return_remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GatePass {
    pub fn draft(id: PassId, created_by: UserId, input: NewGatePass, now: DateTime<Utc>) -> Self {
        Self {
            id,
            pass_number: None,
            created_by,
            division_id: input.division_id,
            department_id: input.department_id,
            details: input.details,
            condition: input.condition,
            material_type: input.material_type,
            sent_at: input.sent_at,
            expected_return: input.expected_return,
            actual_return: None,
            state: PassState::Draft,
            department_gate: GateRecord::pending(),
            store_gate: GateRecord::pending(),
            security_gate: GateRecord::pending(),
            store_location: None,
            return_session: None,
            last_escalation: BTreeMap::new(),
            urgent: input.urgent,
            gate_exit_at: None,
            force_return_remarks: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn gate_mut(&mut self, gate: Gate) -> &mut GateRecord {
        match gate {
            Gate::Department => &mut self.department_gate,
            Gate::Store => &mut self.store_gate,
            Gate::Security => &mut self.security_gate,
        }
    }

    pub fn is_returnable(&self) -> bool {
        self.material_type == MaterialType::Returnable
    }

    pub fn number_str(&self) -> Option<&str> {
        self.pass_number.as_ref().map(PassNumber::as_str)
    }

    /// Whole days past the expected return, if the pass is out and late.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.is_returnable() || self.actual_return.is_some() || !self.state.has_cleared_gates() {
            return None;
        }
        let expected = self.expected_return?;
        if expected >= now {
            return None;
        }
        Some((now - expected).num_days())
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.days_overdue(now).is_some()
    }

    /// Most recent escalation of any tier.
    pub fn last_escalated_at(&self) -> Option<DateTime<Utc>> {
        self.last_escalation.values().max().copied()
    }

    pub fn check_invariants(&self) -> Result<(), GatePassError> {
        if self.actual_return.is_some() && !self.state.is_closed_by_return() {
            return Err(GatePassError::Validation(format!(
                "pass {} has a return date but is {}",
                self.id, self.state
            )));
        }
        if self.expected_return.is_some() && !self.is_returnable() {
            return Err(GatePassError::Validation(format!(
                "pass {} is non-returnable but has an expected return",
                self.id
            )));
        }
        Ok(())
    }
}

/// Conditional mutation of a pass.
///
/// `expected` is the state observed before the change; the store refuses the
/// update with a conflict if the pass has moved on since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassUpdate {
    pub expected: PassState,
    pub at: DateTime<Utc>,
    pub to: Option<PassState>,
    pub gate: Option<(Gate, GateOutcome, UserId)>,
    pub store_location: Option<StoreLocation>,
    pub details: Option<MaterialDetails>,
    pub pass_number: Option<PassNumber>,
    pub actual_return: Option<DateTime<Utc>>,
    pub gate_exit_at: Option<DateTime<Utc>>,
    pub force_return_remarks: Option<String>,
}

impl PassUpdate {
    pub fn new(expected: PassState, at: DateTime<Utc>) -> Self {
        Self {
            expected,
            at,
            to: None,
            gate: None,
            store_location: None,
            details: None,
            pass_number: None,
            actual_return: None,
            gate_exit_at: None,
            force_return_remarks: None,
        }
    }

    pub fn transition(mut self, to: PassState) -> Self {
        self.to = Some(to);
        self
    }

    pub fn gate(mut self, gate: Gate, outcome: GateOutcome, by: UserId) -> Self {
        self.gate = Some((gate, outcome, by));
        self
    }

    pub fn store_location(mut self, location: StoreLocation) -> Self {
        self.store_location = Some(location);
        self
    }

    pub fn details(mut self, details: MaterialDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn pass_number(mut self, number: PassNumber) -> Self {
        self.pass_number = Some(number);
        self
    }

    pub fn returned_at(mut self, at: DateTime<Utc>) -> Self {
        self.actual_return = Some(at);
        self
    }

    pub fn exited_at(mut self, at: DateTime<Utc>) -> Self {
        self.gate_exit_at = Some(at);
        self
    }

    pub fn remarks(mut self, remarks: impl Into<String>) -> Self {
        self.force_return_remarks = Some(remarks.into());
        self
    }

    /// Apply to a pass whose state has already been checked against `expected`.
    pub fn apply_to(&self, pass: &mut GatePass) {
        if let Some(to) = self.to {
            pass.state = to;
        }
        if let Some((gate, outcome, by)) = self.gate {
            let record = pass.gate_mut(gate);
            record.outcome = outcome;
            if outcome == GateOutcome::Pending {
                record.decided_by = None;
                record.decided_at = None;
            } else {
                record.decided_by = Some(by);
                record.decided_at = Some(self.at);
            }
        }
        if let Some(location) = &self.store_location {
            pass.store_location = Some(location.clone());
        }
        if let Some(details) = &self.details {
            pass.details = details.clone();
        }
        if let Some(number) = &self.pass_number {
            pass.pass_number = Some(number.clone());
        }
        if let Some(at) = self.actual_return {
            pass.actual_return = Some(at);
        }
        if let Some(at) = self.gate_exit_at {
            pass.gate_exit_at = Some(at);
        }
        if let Some(remarks) = &self.force_return_remarks {
            pass.force_return_remarks = Some(remarks.clone());
        }
        pass.updated_at = self.at;
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::Duration;
    use ulid::Ulid;

    fn pass() -> GatePass {
        GatePass::draft(
            PassId::from_ulid(Ulid::new()),
            UserId::from_ulid(Ulid::new()),
            returnable(DepartmentId::from_ulid(Ulid::new())),
            t0(),
        )
    }

    #[test]
    fn pass_number_is_prefix_plus_timestamp() {
        assert_eq!(PassNumber::generate("GP", t0()).as_str(), "GP20240301090000");
    }

    #[test]
    fn returnable_requires_expected_return_after_send() {
        let mut input = returnable(DepartmentId::from_ulid(Ulid::new()));
        input.expected_return = None;
        assert!(matches!(input.validate(), Err(GatePassError::Validation(_))));

        input.expected_return = Some(t0() - Duration::hours(1));
        assert!(matches!(input.validate(), Err(GatePassError::Validation(_))));
    }

    #[test]
    fn non_returnable_rejects_expected_return() {
        let mut input = returnable(DepartmentId::from_ulid(Ulid::new()));
        input.material_type = MaterialType::NonReturnable;
        assert!(input.validate().is_err());
        input.expected_return = None;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn blank_details_are_rejected() {
        let mut input = returnable(DepartmentId::from_ulid(Ulid::new()));
        input.details.purpose = "   ".into();
        let err = input.validate().unwrap_err();
        assert_eq!(err, GatePassError::Validation("purpose is required".into()));
    }

    #[test]
    fn update_applies_gate_outcome_and_state() {
        let mut p = pass();
        let approver = UserId::from_ulid(Ulid::new());
        let at = t0() + Duration::minutes(5);
        PassUpdate::new(PassState::PendingDepartment, at)
            .transition(PassState::PendingStore)
            .gate(Gate::Department, GateOutcome::Approved, approver)
            .apply_to(&mut p);

        assert_eq!(p.state, PassState::PendingStore);
        assert_eq!(p.department_gate.outcome, GateOutcome::Approved);
        assert_eq!(p.department_gate.decided_by, Some(approver));
        assert_eq!(p.department_gate.decided_at, Some(at));
        assert_eq!(p.updated_at, at);
    }

    #[test]
    fn days_overdue_counts_whole_days_after_gates_clear() {
        let mut p = pass();
        let expected = p.expected_return.unwrap();
        assert_eq!(p.days_overdue(expected + Duration::days(3)), None);

        p.state = PassState::Approved;
        assert_eq!(p.days_overdue(expected - Duration::hours(1)), None);
        assert_eq!(p.days_overdue(expected + Duration::hours(23)), Some(0));
        assert_eq!(p.days_overdue(expected + Duration::days(3) + Duration::hours(2)), Some(3));
    }

    #[test]
    fn invariant_catches_return_date_on_open_pass() {
        let mut p = pass();
        p.actual_return = Some(t0());
        assert!(p.check_invariants().is_err());
        p.state = PassState::Returned;
        assert!(p.check_invariants().is_ok());
    }
}
