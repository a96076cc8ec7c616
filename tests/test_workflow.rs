//! End-to-end workflow tests against a real SQLite file.
//!
//! Org used throughout:
//!
//! ```text
//! HQ (leader: ceo)                fin1, fin2 hold post "FIN" in HQ
//! └── Engineering (leader: lead)  alice, bob
//! ```

use chrono::NaiveDate;
use tempfile::TempDir;

use approval_hub::auth::Auth;
use approval_hub::config::Config;
use approval_hub::error::AppError;
use approval_hub::store::Store;
use approval_hub::store::org::{DepartmentInput, PostInput};
use approval_hub::store::users::{NewUser, Role, User};
use approval_hub::workflow::Workflow;
use approval_hub::workflow::types::{
    ApplicationDetail, ApplicationInput, ApplicationStatus, ApplicationType, ApprovalMode,
    ApproverSpec, Decision, EventAction, PostScope, RuleInput, TaskStatus,
};

// ── helpers ──────────────────────────────────────────────────────────────────

struct Org {
    _tmp: TempDir,
    store: Store,
    auth: Auth,
    wf: Workflow,
    hq: i64,
    eng: i64,
    fin_post: i64,
    admin: User,
    ceo: User,
    lead: User,
    alice: User,
    bob: User,
    fin1: User,
    fin2: User,
}

fn user(auth: &Auth, username: &str, role: Role, department_id: Option<i64>, post_id: Option<i64>) -> User {
    auth.create_user(
        &NewUser {
            username: username.into(),
            display_name: username.to_uppercase(),
            role,
            department_id,
            post_id,
        },
        "password123",
    )
    .expect("create user")
}

fn setup() -> Org {
    let tmp = TempDir::new().expect("tempdir");
    let config = Config::test_default(tmp.path());
    let store = Store::open(&config.db_path).expect("open store");
    let auth = Auth::new(store.clone(), config.auth);

    let hq = store
        .create_department(&DepartmentInput { name: "HQ".into(), parent_id: None, leader_id: None })
        .unwrap();
    let eng = store
        .create_department(&DepartmentInput { name: "Engineering".into(), parent_id: Some(hq.id), leader_id: None })
        .unwrap();
    let fin_post = store
        .create_post(&PostInput { code: "FIN".into(), name: "Finance officer".into() })
        .unwrap();

    let admin = user(&auth, "admin", Role::Admin, None, None);
    let ceo = user(&auth, "ceo", Role::Employee, Some(hq.id), None);
    let lead = user(&auth, "lead", Role::Employee, Some(eng.id), None);
    let alice = user(&auth, "alice", Role::Employee, Some(eng.id), None);
    let bob = user(&auth, "bob", Role::Employee, Some(eng.id), None);
    let fin1 = user(&auth, "fin1", Role::Employee, Some(hq.id), Some(fin_post.id));
    let fin2 = user(&auth, "fin2", Role::Employee, Some(hq.id), Some(fin_post.id));

    store
        .update_department(hq.id, &DepartmentInput { name: "HQ".into(), parent_id: None, leader_id: Some(ceo.id) })
        .unwrap();
    store
        .update_department(
            eng.id,
            &DepartmentInput { name: "Engineering".into(), parent_id: Some(hq.id), leader_id: Some(lead.id) },
        )
        .unwrap();

    // Leave in Engineering: team leader, then the leader one level up.
    store
        .create_rule(&rule(
            "eng leave",
            ApplicationType::Leave,
            Some(eng.id),
            None,
            ApprovalMode::Sequential,
            vec![ApproverSpec::DepartmentLeader, ApproverSpec::SuperiorLeader { levels: 1 }],
        ))
        .unwrap();
    // Any reimbursement: one finance officer is enough.
    store
        .create_rule(&rule(
            "reimbursement",
            ApplicationType::Reimbursement,
            None,
            None,
            ApprovalMode::OrSign,
            vec![ApproverSpec::Post { post_id: fin_post.id, scope: PostScope::Any }],
        ))
        .unwrap();
    // Large reimbursements: every finance officer plus the team leader.
    store
        .create_rule(&rule(
            "large reimbursement",
            ApplicationType::Reimbursement,
            None,
            Some(100_000),
            ApprovalMode::Countersign,
            vec![
                ApproverSpec::Post { post_id: fin_post.id, scope: PostScope::Any },
                ApproverSpec::DepartmentLeader,
            ],
        ))
        .unwrap();

    let wf = Workflow::new(store.clone());
    Org {
        _tmp: tmp,
        store,
        auth,
        wf,
        hq: hq.id,
        eng: eng.id,
        fin_post: fin_post.id,
        admin,
        ceo,
        lead,
        alice,
        bob,
        fin1,
        fin2,
    }
}

fn rule(
    name: &str,
    app_type: ApplicationType,
    department_id: Option<i64>,
    min_magnitude: Option<i64>,
    mode: ApprovalMode,
    approvers: Vec<ApproverSpec>,
) -> RuleInput {
    RuleInput {
        name: name.into(),
        app_type,
        department_id,
        post_id: None,
        min_magnitude,
        priority: 0,
        mode,
        approvers,
        enabled: true,
    }
}

fn leave(days: i64) -> ApplicationInput {
    ApplicationInput {
        title: format!("{days} days off"),
        reason: "family trip".into(),
        detail: ApplicationDetail::Leave {
            leave_kind: "annual".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            days,
        },
    }
}

fn expense(amount_cents: i64) -> ApplicationInput {
    ApplicationInput {
        title: "conference travel".into(),
        reason: String::new(),
        detail: ApplicationDetail::Reimbursement { category: "travel".into(), amount_cents },
    }
}

/// The single pending task `who` holds for application `app_id`.
fn pending_task(org: &Org, who: &User, app_id: i64) -> i64 {
    let tasks: Vec<_> = org
        .wf
        .inbox(who, true)
        .unwrap()
        .into_iter()
        .filter(|t| t.task.application_id == app_id)
        .collect();
    assert_eq!(tasks.len(), 1, "{} should hold exactly one pending task", who.username);
    tasks[0].task.id
}

fn submitted(org: &Org, who: &User, input: &ApplicationInput) -> i64 {
    let draft = org.wf.create_draft(who, input).unwrap();
    org.wf.submit(who, draft.id).unwrap().id
}

// ── sequential ───────────────────────────────────────────────────────────────

#[test]
fn sequential_leave_goes_leader_then_superior() {
    let org = setup();
    let draft = org.wf.create_draft(&org.alice, &leave(3)).unwrap();
    assert_eq!(draft.status, ApplicationStatus::Draft);
    assert_eq!(draft.current_step, 0);

    let app = org.wf.submit(&org.alice, draft.id).unwrap();
    assert_eq!(app.status, ApplicationStatus::Pending);
    assert_eq!(app.mode, Some(ApprovalMode::Sequential));
    assert_eq!(app.plan, vec![vec![org.lead.id], vec![org.ceo.id]]);
    assert_eq!((app.current_step, app.total_steps, app.round), (1, 2, 1));
    assert!(org.wf.inbox(&org.ceo, true).unwrap().is_empty());

    let t1 = pending_task(&org, &org.lead, app.id);
    let app = org.wf.act(&org.lead, t1, Decision::Approve, None).unwrap();
    assert_eq!(app.status, ApplicationStatus::Pending);
    assert_eq!(app.current_step, 2);

    let t2 = pending_task(&org, &org.ceo, app.id);
    let app = org.wf.act(&org.ceo, t2, Decision::Approve, Some("enjoy")).unwrap();
    assert_eq!(app.status, ApplicationStatus::Approved);
    assert!(app.finished_at.is_some());

    let view = org.wf.detail(&org.alice, app.id).unwrap();
    let actions: Vec<_> = view.events.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            EventAction::Created,
            EventAction::Submitted,
            EventAction::Approved,
            EventAction::StepAdvanced,
            EventAction::Approved,
            EventAction::Completed,
        ]
    );
    assert!(view.tasks.iter().all(|t| t.status == TaskStatus::Approved));
}

#[test]
fn leader_applying_escalates_past_themselves() {
    let org = setup();
    // lead is Engineering's leader, so both slots land on the HQ leader,
    // and a sequential plan keeps the two steps.
    let app_id = submitted(&org, &org.lead, &leave(1));
    let view = org.wf.detail(&org.lead, app_id).unwrap();
    assert_eq!(view.application.plan, vec![vec![org.ceo.id], vec![org.ceo.id]]);
}

#[test]
fn plan_is_frozen_at_submission() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &leave(2));

    org.store
        .update_department(
            org.eng,
            &DepartmentInput { name: "Engineering".into(), parent_id: Some(org.hq), leader_id: Some(org.bob.id) },
        )
        .unwrap();

    let task = pending_task(&org, &org.lead, app_id);
    org.wf.act(&org.lead, task, Decision::Approve, None).unwrap();
    assert!(org.wf.inbox(&org.bob, true).unwrap().is_empty());
}

#[test]
fn deleted_rule_leaves_in_flight_application_running() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &leave(2));

    let rules = org.store.list_rules(Some(ApplicationType::Leave)).unwrap();
    let eng_leave = rules.iter().find(|r| r.name == "eng leave").unwrap();
    org.store.delete_rule(eng_leave.id).unwrap();
    org.store.set_active(org.ceo.id, false).unwrap();

    let task = pending_task(&org, &org.lead, app_id);
    let app = org.wf.act(&org.lead, task, Decision::Approve, None).unwrap();
    assert_eq!(app.rule_id, None);
    assert_eq!(app.current_step, 2);

    // ceo is the only planned approver of step 2, so the task still lands there.
    let view = org.wf.detail(&org.alice, app_id).unwrap();
    let step2: Vec<_> = view
        .tasks
        .iter()
        .filter(|t| t.step == 2)
        .map(|t| (t.approver_id, t.status))
        .collect();
    assert_eq!(step2, vec![(org.ceo.id, TaskStatus::Pending)]);

    let stuck = view.tasks.iter().find(|t| t.step == 2).unwrap().id;
    let moved = org.wf.transfer(&org.admin, stuck, org.bob.id, None).unwrap();
    let app = org.wf.act(&org.bob, moved.id, Decision::Approve, None).unwrap();
    assert_eq!(app.status, ApplicationStatus::Approved);
}

#[test]
fn inactive_planned_approver_is_skipped_in_later_step() {
    let org = setup();
    // Longer leave: team leader, then any finance officer.
    org.store
        .create_rule(&rule(
            "long eng leave",
            ApplicationType::Leave,
            Some(org.eng),
            Some(5),
            ApprovalMode::Sequential,
            vec![
                ApproverSpec::DepartmentLeader,
                ApproverSpec::Post { post_id: org.fin_post, scope: PostScope::Any },
            ],
        ))
        .unwrap();

    let app_id = submitted(&org, &org.alice, &leave(5));
    let view = org.wf.detail(&org.alice, app_id).unwrap();
    assert_eq!(view.application.plan, vec![vec![org.lead.id], vec![org.fin1.id, org.fin2.id]]);

    org.store.set_active(org.fin1.id, false).unwrap();
    let task = pending_task(&org, &org.lead, app_id);
    org.wf.act(&org.lead, task, Decision::Approve, None).unwrap();

    let view = org.wf.detail(&org.alice, app_id).unwrap();
    let step2: Vec<_> = view.tasks.iter().filter(|t| t.step == 2).map(|t| t.approver_id).collect();
    assert_eq!(step2, vec![org.fin2.id]);

    let task = pending_task(&org, &org.fin2, app_id);
    let app = org.wf.act(&org.fin2, task, Decision::Approve, None).unwrap();
    assert_eq!(app.status, ApplicationStatus::Approved);
}

// ── or-sign / countersign ────────────────────────────────────────────────────

#[test]
fn or_sign_first_decision_wins() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &expense(5_000));

    let view = org.wf.detail(&org.alice, app_id).unwrap();
    assert_eq!(view.application.mode, Some(ApprovalMode::OrSign));
    assert_eq!(view.application.plan, vec![vec![org.fin1.id, org.fin2.id]]);

    let task = pending_task(&org, &org.fin2, app_id);
    let app = org.wf.act(&org.fin2, task, Decision::Approve, None).unwrap();
    assert_eq!(app.status, ApplicationStatus::Approved);

    let view = org.wf.detail(&org.alice, app_id).unwrap();
    let fin1_task = view.tasks.iter().find(|t| t.approver_id == org.fin1.id).unwrap();
    assert_eq!(fin1_task.status, TaskStatus::Cancelled);
    assert!(org.wf.inbox(&org.fin1, true).unwrap().is_empty());
}

#[test]
fn countersign_needs_everyone() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &expense(250_000));

    let view = org.wf.detail(&org.alice, app_id).unwrap();
    assert_eq!(view.application.mode, Some(ApprovalMode::Countersign));
    assert_eq!(view.application.plan, vec![vec![org.fin1.id, org.fin2.id, org.lead.id]]);

    for approver in [&org.fin1, &org.lead] {
        let task = pending_task(&org, approver, app_id);
        let app = org.wf.act(approver, task, Decision::Approve, None).unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
    }
    let task = pending_task(&org, &org.fin2, app_id);
    let app = org.wf.act(&org.fin2, task, Decision::Approve, None).unwrap();
    assert_eq!(app.status, ApplicationStatus::Approved);
}

#[test]
fn countersign_rejection_closes_the_step() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &expense(250_000));

    let task = pending_task(&org, &org.fin1, app_id);
    assert!(matches!(
        org.wf.act(&org.fin1, task, Decision::Reject, Some("   ")),
        Err(AppError::Validation(_))
    ));
    let app = org.wf.act(&org.fin1, task, Decision::Reject, Some("no receipt")).unwrap();
    assert_eq!(app.status, ApplicationStatus::Rejected);

    let view = org.wf.detail(&org.alice, app_id).unwrap();
    let cancelled = view.tasks.iter().filter(|t| t.status == TaskStatus::Cancelled).count();
    assert_eq!(cancelled, 2);
    let rejected = view.tasks.iter().find(|t| t.status == TaskStatus::Rejected).unwrap();
    assert_eq!(rejected.comment.as_deref(), Some("no receipt"));
}

// ── lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn withdraw_reopen_resubmit() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &leave(2));
    let stale_task = pending_task(&org, &org.lead, app_id);

    let app = org.wf.withdraw(&org.alice, app_id, Some("plans changed")).unwrap();
    assert_eq!(app.status, ApplicationStatus::Withdrawn);
    assert!(matches!(
        org.wf.act(&org.lead, stale_task, Decision::Approve, None),
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(org.wf.update_draft(&org.alice, app_id, &leave(1)), Err(AppError::Conflict(_))));

    let app = org.wf.reopen(&org.alice, app_id).unwrap();
    assert_eq!(app.status, ApplicationStatus::Draft);
    let app = org.wf.update_draft(&org.alice, app_id, &leave(4)).unwrap();
    assert_eq!(app.detail.magnitude(), 4);

    let app = org.wf.submit(&org.alice, app_id).unwrap();
    assert_eq!(app.round, 2);
    assert_eq!(app.current_step, 1);
    let fresh = pending_task(&org, &org.lead, app_id);
    assert_ne!(fresh, stale_task);

    // Submitted once already, so the draft is history and cannot be deleted.
    org.wf.withdraw(&org.alice, app_id, None).unwrap();
    org.wf.reopen(&org.alice, app_id).unwrap();
    assert!(matches!(org.wf.delete_draft(&org.alice, app_id), Err(AppError::Conflict(_))));
}

#[test]
fn fresh_draft_can_be_deleted_only_by_owner() {
    let org = setup();
    let draft = org.wf.create_draft(&org.alice, &leave(1)).unwrap();
    assert!(matches!(org.wf.delete_draft(&org.bob, draft.id), Err(AppError::Forbidden(_))));
    org.wf.delete_draft(&org.alice, draft.id).unwrap();
    assert!(matches!(org.wf.detail(&org.alice, draft.id), Err(AppError::NotFound(_))));
}

#[test]
fn invalid_drafts_rejected() {
    let org = setup();
    let mut bad = leave(40);
    assert!(matches!(org.wf.create_draft(&org.alice, &bad), Err(AppError::Validation(_))));
    bad = leave(1);
    bad.title = " ".into();
    assert!(matches!(org.wf.create_draft(&org.alice, &bad), Err(AppError::Validation(_))));
    assert!(matches!(org.wf.create_draft(&org.alice, &expense(0)), Err(AppError::Validation(_))));
}

// ── transfer ─────────────────────────────────────────────────────────────────

#[test]
fn transfer_hands_task_to_another_user() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &leave(1));
    let task = pending_task(&org, &org.lead, app_id);

    assert!(matches!(
        org.wf.transfer(&org.bob, task, org.fin1.id, None),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        org.wf.transfer(&org.lead, task, org.alice.id, None),
        Err(AppError::Validation(_))
    ));

    let new_task = org.wf.transfer(&org.lead, task, org.bob.id, Some("on holiday")).unwrap();
    assert_eq!(new_task.approver_id, org.bob.id);
    assert_eq!(new_task.step, 1);
    assert!(org.wf.inbox(&org.lead, true).unwrap().is_empty());
    assert_eq!(org.wf.inbox(&org.lead, false).unwrap().len(), 1);

    let app = org.wf.act(&org.bob, new_task.id, Decision::Approve, None).unwrap();
    assert_eq!(app.current_step, 2);
}

#[test]
fn admin_may_transfer_any_task() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &leave(1));
    let task = pending_task(&org, &org.lead, app_id);
    let moved = org.wf.transfer(&org.admin, task, org.ceo.id, None).unwrap();
    assert_eq!(moved.approver_id, org.ceo.id);
}

#[test]
fn transfer_to_someone_who_already_approved_is_rejected() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &expense(250_000));

    let task = pending_task(&org, &org.fin1, app_id);
    org.wf.act(&org.fin1, task, Decision::Approve, None).unwrap();

    let task = pending_task(&org, &org.fin2, app_id);
    assert!(matches!(
        org.wf.transfer(&org.fin2, task, org.fin1.id, None),
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        org.wf.transfer(&org.fin2, task, org.lead.id, None),
        Err(AppError::Conflict(_))
    ));

    let view = org.wf.detail(&org.alice, app_id).unwrap();
    assert_eq!(view.application.status, ApplicationStatus::Pending);
    let fin2_task = view.tasks.iter().find(|t| t.id == task).unwrap();
    assert_eq!(fin2_task.status, TaskStatus::Pending);
}

// ── routing errors ───────────────────────────────────────────────────────────

#[test]
fn no_rule_for_unscoped_leave() {
    let org = setup();
    let loner = user(&org.auth, "loner", Role::Employee, None, None);
    let draft = org.wf.create_draft(&loner, &leave(1)).unwrap();
    assert!(matches!(org.wf.submit(&loner, draft.id), Err(AppError::NoApplicableRule(_))));
    // The draft is untouched by the failed submission.
    let view = org.wf.detail(&loner, draft.id).unwrap();
    assert_eq!(view.application.status, ApplicationStatus::Draft);
    assert!(view.tasks.is_empty());
}

#[test]
fn no_approver_when_post_is_vacant() {
    let org = setup();
    org.store.set_active(org.fin1.id, false).unwrap();
    org.store.set_active(org.fin2.id, false).unwrap();
    let draft = org.wf.create_draft(&org.alice, &expense(1_000)).unwrap();
    assert!(matches!(org.wf.submit(&org.alice, draft.id), Err(AppError::NoApprover(_))));
}

#[test]
fn disabled_rule_is_skipped() {
    let org = setup();
    let rules = org.store.list_rules(Some(ApplicationType::Reimbursement)).unwrap();
    let large = rules.iter().find(|r| r.min_magnitude.is_some()).unwrap();
    org.store.set_rule_enabled(large.id, false).unwrap();

    let preview = org
        .wf
        .preview(org.alice.id, &expense(250_000).detail)
        .unwrap();
    assert_eq!(preview.rule.mode, ApprovalMode::OrSign);
    assert_eq!(preview.plan, vec![vec![org.fin1.id, org.fin2.id]]);
}

#[test]
fn post_rule_in_department_beats_generic_rule() {
    let org = setup();
    let fin_rule = org
        .store
        .create_rule(&RuleInput {
            post_id: Some(org.fin_post),
            ..rule(
                "finance staff expenses",
                ApplicationType::Reimbursement,
                Some(org.hq),
                None,
                ApprovalMode::Sequential,
                vec![ApproverSpec::DepartmentLeader],
            )
        })
        .unwrap();
    let preview = org.wf.preview(org.fin1.id, &expense(500).detail).unwrap();
    assert_eq!(preview.rule.id, fin_rule.id);
    assert_eq!(preview.plan, vec![vec![org.ceo.id]]);
}

// ── permissions ──────────────────────────────────────────────────────────────

#[test]
fn only_involved_users_see_an_application() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &leave(1));

    assert!(org.wf.detail(&org.lead, app_id).is_ok());
    assert!(org.wf.detail(&org.admin, app_id).is_ok());
    assert!(matches!(org.wf.detail(&org.bob, app_id), Err(AppError::Forbidden(_))));

    let task = pending_task(&org, &org.lead, app_id);
    assert!(matches!(
        org.wf.act(&org.bob, task, Decision::Approve, None),
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(org.wf.withdraw(&org.bob, app_id, None), Err(AppError::Forbidden(_))));
}

#[test]
fn task_cannot_be_decided_twice() {
    let org = setup();
    let app_id = submitted(&org, &org.alice, &expense(900));
    let task = pending_task(&org, &org.fin1, app_id);
    org.wf.act(&org.fin1, task, Decision::Approve, None).unwrap();
    assert!(matches!(
        org.wf.act(&org.fin1, task, Decision::Reject, Some("changed my mind")),
        Err(AppError::Conflict(_))
    ));
}

// ── listings & stats ─────────────────────────────────────────────────────────

#[test]
fn listings_and_dashboard_counts() {
    let org = setup();
    let approved = submitted(&org, &org.alice, &expense(900));
    let task = pending_task(&org, &org.fin1, approved);
    org.wf.act(&org.fin1, task, Decision::Approve, None).unwrap();
    submitted(&org, &org.alice, &leave(2));
    org.wf.create_draft(&org.alice, &leave(1)).unwrap();

    let mine = org.wf.list_mine(&org.alice, None).unwrap();
    assert_eq!(mine.len(), 3);
    let pending = org.wf.list_mine(&org.alice, Some(ApplicationStatus::Pending)).unwrap();
    assert_eq!(pending.len(), 1);

    let dash = org.store.dashboard(org.alice.id).unwrap();
    assert_eq!(dash.applications.get("approved"), Some(&1));
    assert_eq!(dash.applications.get("pending"), Some(&1));
    assert_eq!(dash.applications.get("draft"), Some(&1));
    assert_eq!(dash.pending_tasks, 0);

    let lead_dash = org.store.dashboard(org.lead.id).unwrap();
    assert_eq!(lead_dash.pending_tasks, 1);

    let overview = org.store.overview().unwrap();
    assert_eq!(overview.by_type.get("reimbursement"), Some(&1));
    assert_eq!(overview.by_type.get("leave"), Some(&1));
    let fin1_load = overview.approvers.iter().find(|a| a.approver_id == org.fin1.id).unwrap();
    assert_eq!((fin1_load.approved, fin1_load.rejected, fin1_load.pending), (1, 0, 0));
}

#[test]
fn admin_filter_by_department_includes_subdepartments() {
    let org = setup();
    submitted(&org, &org.alice, &leave(1));
    submitted(&org, &org.fin1, &expense(100));

    let filter = approval_hub::store::applications::ApplicationFilter {
        department_id: Some(org.hq),
        ..Default::default()
    };
    assert_eq!(org.store.list_applications(&filter).unwrap().len(), 2);

    let filter = approval_hub::store::applications::ApplicationFilter {
        department_id: Some(org.eng),
        ..Default::default()
    };
    let eng_only = org.store.list_applications(&filter).unwrap();
    assert_eq!(eng_only.len(), 1);
    assert_eq!(eng_only[0].applicant_id, org.alice.id);
}
