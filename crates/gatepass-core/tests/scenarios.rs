//! End-to-end scenarios against the in-memory adapters.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatepass_core::app::{App, AppBuilder, ReturnProof};
use gatepass_core::domain::{
    Action, Actor, DepartmentId, DivisionId, EscalationTier, GatePassError, MaterialCondition,
    MaterialDetails, MaterialType, NewGatePass, NotificationCategory, PassId, PassState, Receiver,
    Role, StoreLocation, TokenError, UserId,
};
use gatepass_core::impls::{InMemoryInbox, InMemoryPassStore, StaticDirectory};
use gatepass_core::ports::ManualClock;
use gatepass_core::{ErrorKind, GatePassConfig};
use tokio::sync::watch;
use ulid::Ulid;

const SECRET: &str = "00112233445566778899aabbccddeeff";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn actor(role: Role) -> Actor {
    Actor::new(UserId::from_ulid(Ulid::new()), role)
}

struct Harness {
    app: App,
    store: Arc<InMemoryPassStore>,
    inbox: Arc<InMemoryInbox>,
    clock: ManualClock,
    dept: DepartmentId,
    requester: Actor,
    head: Actor,
    other_head: Actor,
    store_1: Actor,
    store_2: Actor,
    security: Actor,
    admin: Actor,
    admin_2: Actor,
}

impl Harness {
    fn new() -> Self {
        let dept = DepartmentId::from_ulid(Ulid::new());
        let requester = actor(Role::Requester);
        let head = actor(Role::DepartmentHead(dept));
        let other_head = actor(Role::DepartmentHead(DepartmentId::from_ulid(Ulid::new())));
        let store_1 = actor(Role::StoreManager(StoreLocation::new("store_1")));
        let store_2 = actor(Role::StoreManager(StoreLocation::new("store_2")));
        let security = actor(Role::Security);
        let admin = actor(Role::Admin);
        let admin_2 = actor(Role::Admin);

        let mut directory = StaticDirectory::new().with_member(requester.user_id, dept);
        for a in [&requester, &head, &other_head, &store_1, &store_2, &security, &admin, &admin_2] {
            directory = directory.with_user(a.user_id, a.role.clone());
        }

        let clock = ManualClock::new(t0());
        let store = Arc::new(InMemoryPassStore::new());
        let inbox = Arc::new(InMemoryInbox::new());
        let app = AppBuilder::new(GatePassConfig::with_secret_hex(SECRET))
            .store(store.clone())
            .notifier(inbox.clone())
            .directory(Arc::new(directory))
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap();

        Self {
            app,
            store,
            inbox,
            clock,
            dept,
            requester,
            head,
            other_head,
            store_1,
            store_2,
            security,
            admin,
            admin_2,
        }
    }

    fn everyone(&self) -> Vec<&Actor> {
        vec![
            &self.requester,
            &self.head,
            &self.other_head,
            &self.store_1,
            &self.store_2,
            &self.security,
            &self.admin,
            &self.admin_2,
        ]
    }

    /// Users with at least one notification since the last clear.
    async fn notified(&self) -> BTreeSet<UserId> {
        let mut users = BTreeSet::new();
        for a in self.everyone() {
            if !self.inbox.inbox(a.user_id).await.is_empty() {
                users.insert(a.user_id);
            }
        }
        users
    }

    fn input(&self, sent_at: DateTime<Utc>, expected_return: DateTime<Utc>) -> NewGatePass {
        NewGatePass {
            division_id: DivisionId::from_ulid(Ulid::new()),
            department_id: self.dept,
            details: MaterialDetails {
                description: "Spare pump impeller".into(),
                destination: "Northside workshop".into(),
                purpose: "Balancing".into(),
                receiver: Receiver {
                    name: "Workshop desk".into(),
                    contact: "ext. 4411".into(),
                },
            },
            condition: MaterialCondition::Repair,
            material_type: MaterialType::Returnable,
            sent_at,
            expected_return: Some(expected_return),
            urgent: false,
        }
    }

    async fn submitted(&self, input: NewGatePass) -> PassId {
        let approvals = &self.app.approvals;
        let pass = approvals.create_draft(&self.requester, input).await.unwrap();
        approvals.submit_draft(pass.id, &self.requester).await.unwrap();
        pass.id
    }

    async fn approved(&self, input: NewGatePass) -> PassId {
        let id = self.submitted(input).await;
        for a in [&self.head, &self.store_1, &self.security] {
            self.app
                .approvals
                .submit_transition(id, a, Action::Approve, None)
                .await
                .unwrap();
        }
        id
    }
}

fn ids(actors: &[&Actor]) -> BTreeSet<UserId> {
    actors.iter().map(|a| a.user_id).collect()
}

#[tokio::test]
async fn three_gate_approval_notifies_each_step() {
    let h = Harness::new();
    let approvals = &h.app.approvals;
    let draft = approvals
        .create_draft(&h.requester, h.input(t0(), t0() + Duration::days(5)))
        .await
        .unwrap();
    assert_eq!(draft.state, PassState::Draft);
    assert!(h.notified().await.is_empty());

    approvals.submit_draft(draft.id, &h.requester).await.unwrap();
    assert_eq!(h.notified().await, ids(&[&h.head, &h.requester]));
    h.inbox.clear().await;

    let state = approvals
        .submit_transition(draft.id, &h.head, Action::Approve, None)
        .await
        .unwrap();
    assert_eq!(state, PassState::PendingStore);
    assert_eq!(
        h.notified().await,
        ids(&[&h.requester, &h.store_1, &h.store_2, &h.security])
    );
    h.inbox.clear().await;

    let state = approvals
        .submit_transition(draft.id, &h.store_1, Action::Approve, None)
        .await
        .unwrap();
    assert_eq!(state, PassState::PendingSecurity);
    assert_eq!(h.notified().await, ids(&[&h.requester, &h.security]));
    h.inbox.clear().await;

    let state = approvals
        .submit_transition(draft.id, &h.security, Action::Approve, None)
        .await
        .unwrap();
    assert_eq!(state, PassState::Approved);
    assert_eq!(
        h.notified().await,
        ids(&[&h.requester, &h.head, &h.store_1, &h.admin, &h.admin_2])
    );

    let history = approvals.history(draft.id).await.unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn dispatch_notifies_creator_department_store_and_admins() {
    let h = Harness::new();
    let id = h.approved(h.input(t0(), t0() + Duration::days(5))).await;
    h.inbox.clear().await;

    let state = h
        .app
        .approvals
        .submit_transition(id, &h.security, Action::Dispatch, None)
        .await
        .unwrap();
    assert_eq!(state, PassState::GoneFromGate);
    assert_eq!(
        h.notified().await,
        ids(&[&h.requester, &h.head, &h.store_1, &h.admin, &h.admin_2])
    );
    let note = &h.inbox.inbox(h.admin_2.user_id).await[0];
    assert_eq!(note.category, NotificationCategory::Status);
}

#[tokio::test]
async fn requester_outside_the_department_cannot_open_a_pass() {
    let h = Harness::new();
    let mut input = h.input(t0(), t0() + Duration::days(5));
    input.department_id = DepartmentId::from_ulid(Ulid::new());
    let err = h
        .app
        .approvals
        .create_draft(&h.requester, input)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn inquiry_then_reapproval_goes_to_store() {
    let h = Harness::new();
    let approvals = &h.app.approvals;
    let id = h.submitted(h.input(t0(), t0() + Duration::days(5))).await;
    h.inbox.clear().await;

    let state = approvals
        .submit_transition(id, &h.head, Action::Inquiry, Some("Which workshop bay?"))
        .await
        .unwrap();
    assert_eq!(state, PassState::Inquiry);
    assert_eq!(h.notified().await, ids(&[&h.store_1, &h.store_2]));
    let note = &h.inbox.inbox(h.store_1.user_id).await[0];
    assert_eq!(note.category, NotificationCategory::Inquiry);
    assert!(note.message.contains("Which workshop bay?"));

    let state = approvals
        .submit_transition(id, &h.head, Action::Approve, None)
        .await
        .unwrap();
    assert_eq!(state, PassState::PendingStore);
}

#[tokio::test]
async fn department_head_of_another_department_is_refused() {
    let h = Harness::new();
    let id = h.submitted(h.input(t0(), t0() + Duration::days(5))).await;
    let err = h
        .app
        .approvals
        .submit_transition(id, &h.other_head, Action::Approve, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(
        h.app.approvals.get(id).await.unwrap().state,
        PassState::PendingDepartment
    );
}

#[tokio::test]
async fn security_reject_is_terminal_except_for_force_return() {
    let h = Harness::new();
    let approvals = &h.app.approvals;
    let id = h.submitted(h.input(t0(), t0() + Duration::days(5))).await;
    for a in [&h.head, &h.store_1] {
        approvals
            .submit_transition(id, a, Action::Approve, None)
            .await
            .unwrap();
    }
    let state = approvals
        .submit_transition(id, &h.security, Action::Reject, Some("Seal broken"))
        .await
        .unwrap();
    assert_eq!(state, PassState::Rejected);

    let err = approvals
        .submit_transition(id, &h.security, Action::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatePassError::AlreadyTerminal { state: PassState::Rejected, .. }
    ));
    let err = approvals
        .submit_transition(id, &h.security, Action::Dispatch, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);

    let pass = approvals
        .force_return(id, &h.admin, "Material never left; closing record")
        .await
        .unwrap();
    assert_eq!(pass.state, PassState::ForceReturned);
    assert!(pass.actual_return.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_approvals_yield_one_success() {
    let h = Harness::new();
    let id = h.submitted(h.input(t0(), t0() + Duration::days(5))).await;
    h.inbox.clear().await;

    let (a, b) = (h.app.approvals.clone(), h.app.approvals.clone());
    let (head_a, head_b) = (h.head.clone(), h.head.clone());
    let first = tokio::spawn(async move { a.submit_transition(id, &head_a, Action::Approve, None).await });
    let second = tokio::spawn(async move { b.submit_transition(id, &head_b, Action::Approve, None).await });
    let results = [first.await.unwrap(), second.await.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(GatePassError::Conflict { .. })))
        .count();
    assert_eq!((successes, conflicts), (1, 1));

    // 勝った側の通知だけが届く
    assert_eq!(h.inbox.inbox(h.requester.user_id).await.len(), 1);
    assert_eq!(h.inbox.inbox(h.security.user_id).await.len(), 1);
    assert_eq!(h.app.approvals.history(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn return_token_round_trip_and_expiry() {
    let h = Harness::new();
    let id = h.approved(h.input(t0(), t0() + Duration::days(5))).await;
    let issued = h.app.approvals.generate_return_token(id).await.unwrap();

    let parsed = h
        .app
        .approvals
        .verify_return_token(&issued.token, Some(&issued.session_id))
        .await
        .unwrap();
    assert_eq!(parsed.pass_id, id);

    h.clock.advance(Duration::seconds(301));
    let err = h
        .app
        .approvals
        .verify_return_token(&issued.token, Some(&issued.session_id))
        .await
        .unwrap_err();
    assert!(matches!(err, GatePassError::Token(TokenError::Expired { .. })));
    assert!(err.to_string().contains("expired"));
}

#[tokio::test]
async fn second_return_is_already_terminal_and_invariant_holds() {
    let h = Harness::new();
    let id = h.approved(h.input(t0(), t0() + Duration::days(5))).await;
    h.app
        .approvals
        .submit_transition(id, &h.security, Action::Dispatch, None)
        .await
        .unwrap();

    let issued = h.app.approvals.generate_return_token(id).await.unwrap();
    let proof = ReturnProof::ScannedToken {
        scanner: h.security.clone(),
        token: issued.token,
    };
    let returned = h.app.approvals.mark_returned(id, proof.clone()).await.unwrap();
    assert_eq!(returned.state, PassState::Returned);

    let err = h.app.approvals.mark_returned(id, proof).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);

    let pass = h.app.approvals.get(id).await.unwrap();
    assert_eq!(pass.state, PassState::Returned);
    assert!(pass.actual_return.is_some());
    assert!(pass.check_invariants().is_ok());

    let err = h
        .app
        .approvals
        .force_return(id, &h.admin, "late paperwork")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
}

#[tokio::test]
async fn overdue_scan_escalates_once_per_day() {
    let h = Harness::new();
    let now = t0();
    let id = h
        .approved(h.input(now - Duration::days(10), now - Duration::days(3)))
        .await;
    h.inbox.clear().await;

    let sent = h.app.monitor.scan_overdue().await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].pass_id, id);
    assert_eq!(sent[0].tier, EscalationTier::Warning);
    assert_eq!(sent[0].recipients, vec![h.requester.user_id]);

    h.clock.advance(Duration::hours(6));
    assert!(h.app.monitor.scan_overdue().await.unwrap().is_empty());

    h.clock.set(now + Duration::hours(25));
    let sent = h.app.monitor.scan_overdue().await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tier, EscalationTier::Alert);
    assert!(sent[0].recipients.contains(&h.head.user_id));

    // 監視は承認状態を変えない
    assert_eq!(h.app.approvals.get(id).await.unwrap().state, PassState::Approved);
}

#[tokio::test]
async fn one_day_overdue_reminds_only_the_creator() {
    let h = Harness::new();
    let id = h
        .approved(h.input(t0() - Duration::days(5), t0() - Duration::days(1) - Duration::hours(1)))
        .await;
    h.inbox.clear().await;

    let sent = h.app.monitor.scan_overdue().await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].pass_id, id);
    assert_eq!(sent[0].tier, EscalationTier::Reminder);
    assert_eq!(sent[0].days_overdue, 1);
    assert_eq!(h.notified().await, ids(&[&h.requester]));
    let note = &h.inbox.inbox(h.requester.user_id).await[0];
    assert_eq!(note.category, NotificationCategory::ReturnOverdue);
}

#[tokio::test]
async fn critical_overdue_reaches_every_admin() {
    let h = Harness::new();
    let id = h
        .approved(h.input(t0() - Duration::days(20), t0() - Duration::days(9)))
        .await;
    h.inbox.clear().await;

    let sent = h.app.monitor.scan_overdue().await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].pass_id, id);
    assert_eq!(sent[0].tier, EscalationTier::Critical);
    let expected = ids(&[&h.requester, &h.head, &h.admin, &h.admin_2]);
    assert_eq!(sent[0].recipients.iter().copied().collect::<BTreeSet<_>>(), expected);
    assert_eq!(h.notified().await, expected);

    // 同じ日のうちは再送しない
    h.clock.advance(Duration::hours(1));
    assert!(h.app.monitor.scan_overdue().await.unwrap().is_empty());
    assert_eq!(h.inbox.inbox(h.admin_2.user_id).await.len(), 1);
}

#[tokio::test]
async fn pass_overdue_less_than_a_day_is_not_escalated_yet() {
    let h = Harness::new();
    h.approved(h.input(t0() - Duration::days(2), t0() - Duration::hours(3)))
        .await;
    assert!(h.app.monitor.scan_overdue().await.unwrap().is_empty());
}

#[tokio::test]
async fn alarm_status_is_scoped_by_role() {
    let h = Harness::new();
    h.approved(h.input(t0() - Duration::days(10), t0() - Duration::days(2)))
        .await;

    let monitor = &h.app.monitor;
    assert_eq!(monitor.alarm_status(&h.admin).await.unwrap().count, 1);
    assert_eq!(monitor.alarm_status(&h.requester).await.unwrap().count, 1);
    assert_eq!(monitor.alarm_status(&h.head).await.unwrap().count, 1);
    assert_eq!(monitor.alarm_status(&h.other_head).await.unwrap().count, 0);
    assert_eq!(monitor.alarm_status(&h.store_1).await.unwrap().count, 1);
    assert_eq!(monitor.alarm_status(&h.store_2).await.unwrap().count, 0);
}

#[tokio::test]
async fn manual_reminder_is_not_throttled() {
    let h = Harness::new();
    let id = h
        .approved(h.input(t0() - Duration::days(10), t0() - Duration::days(2)))
        .await;
    h.app.monitor.scan_overdue().await.unwrap();
    h.inbox.clear().await;

    h.app.monitor.send_reminder(id, &h.head).await.unwrap();
    h.app.monitor.send_reminder(id, &h.head).await.unwrap();
    let reminders = h.inbox.inbox(h.requester.user_id).await;
    assert_eq!(reminders.len(), 2);
    assert_eq!(reminders[0].category, NotificationCategory::Reminder);
    assert_eq!(h.inbox.inbox(h.head.user_id).await.len(), 2);

    let err = h.app.monitor.send_reminder(id, &h.other_head).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test(start_paused = true)]
async fn monitor_loop_survives_store_outage() {
    let h = Harness::new();
    h.approved(h.input(t0() - Duration::days(10), t0() - Duration::days(2)))
        .await;
    h.inbox.clear().await;
    h.store.set_offline(true);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = h.app.monitor.clone().spawn(shutdown_rx);

    // 最初の fast tick はストア障害で失敗する
    tokio::time::sleep(std::time::Duration::from_secs(31)).await;
    assert_eq!(h.inbox.total().await, 0);
    assert!(!handle.is_finished());

    h.store.set_offline(false);
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert_eq!(h.inbox.inbox(h.requester.user_id).await.len(), 1);

    // 同じ日のうちは再送しない
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    assert_eq!(h.inbox.inbox(h.requester.user_id).await.len(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn sticker_code_is_never_return_proof() {
    let h = Harness::new();
    let id = h.approved(h.input(t0(), t0() + Duration::days(5))).await;
    h.app.approvals.generate_return_token(id).await.unwrap();
    let sticker = h.app.approvals.sticker_token(id).await.unwrap();

    let err = h
        .app
        .approvals
        .mark_returned(
            id,
            ReturnProof::ScannedToken {
                scanner: h.security.clone(),
                token: sticker,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, GatePassError::Token(TokenError::NotReturnProof));
    assert_eq!(h.app.approvals.get(id).await.unwrap().state, PassState::Approved);
}
