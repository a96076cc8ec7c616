//! Application lifecycle: drafting, routing, step-by-step approval.
//!
//! ```text
//! draft ──submit──▶ pending ──(all steps approved)──▶ approved
//!   ▲                 │  └────(any rejection)───────▶ rejected ─┐
//!   │                 └──withdraw──▶ withdrawn ─────────────────┤
//!   └───────────────────────────── reopen ◀─────────────────────┘
//! ```
//!
//! Every state change runs in one IMMEDIATE transaction: routing on submit,
//! and "record decision → evaluate step → cancel / advance / finish" on act.

pub mod dispatch;
pub mod resolve;
pub mod types;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::store::applications::{
    self as rows, cancel_pending_tasks, events_of_application, fetch_task, insert_event,
    insert_task, require_application, set_application_status, set_task_status, tasks_of_application,
    tasks_of_step, ApplicationFilter, TaskView,
};
use crate::store::org::{SqliteOrg, department_chain};
use crate::store::rules::enabled_rules;
use crate::store::users::{User, fetch_user};
use crate::store::{Store, commit, write_tx};
use dispatch::{OrgDirectory, StepOutcome, plan_steps, resolve_approvers, step_outcome};
use resolve::{ApplicantProfile, select_rule};
use types::{
    Application, ApplicationDetail, ApplicationInput, ApplicationStatus, Decision, Event,
    EventAction, Rule, Task, TaskStatus,
};

/// An application with everything needed to render its approval history.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    pub application: Application,
    pub tasks: Vec<Task>,
    pub events: Vec<Event>,
}

/// Which rule an application would be routed by, and to whom.
#[derive(Debug, Clone, Serialize)]
pub struct RoutePreview {
    pub rule: Rule,
    pub plan: Vec<Vec<i64>>,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    store: Store,
}

fn applicant_profile(conn: &Connection, user: &User) -> Result<ApplicantProfile, AppError> {
    let department_chain = match user.department_id {
        Some(dept) => department_chain(conn, dept)?,
        None => Vec::new(),
    };
    Ok(ApplicantProfile {
        user_id: user.id,
        department_id: user.department_id,
        post_id: user.post_id,
        department_chain,
    })
}

/// Select the rule for an application and lay out its approver steps.
fn route(conn: &Connection, applicant: &User, detail: &ApplicationDetail) -> Result<RoutePreview, AppError> {
    let app_type = detail.app_type();
    let magnitude = detail.magnitude();
    let profile = applicant_profile(conn, applicant)?;
    let rules = enabled_rules(conn, app_type)?;

    let rule = select_rule(&rules, app_type, &profile, magnitude).ok_or_else(|| {
        AppError::NoApplicableRule(format!(
            "{app_type} for user #{} (department {:?}, post {:?}, magnitude {magnitude})",
            applicant.id, applicant.department_id, applicant.post_id
        ))
    })?;

    let groups = resolve_approvers(&rule.approvers, &profile, &SqliteOrg { conn })?;
    let plan = plan_steps(rule.mode, groups);
    debug!(rule_id = rule.id, mode = %rule.mode, steps = plan.len(), "route resolved");
    Ok(RoutePreview { rule: rule.clone(), plan })
}

/// Create pending tasks for one planned step.
///
/// Approvers deactivated since submission are skipped; when nobody is left the
/// step goes to the planned users anyway so an admin can transfer the tasks.
fn dispatch_step(conn: &Connection, app: &Application, round: i64, step: i64) -> Result<Vec<i64>, AppError> {
    let planned = app
        .plan
        .get((step - 1) as usize)
        .ok_or_else(|| AppError::Store(format!("application #{} has no step {step}", app.id)))?;

    let org = SqliteOrg { conn };
    let mut approvers = Vec::with_capacity(planned.len());
    for user_id in planned {
        if org.is_active_user(*user_id)? {
            approvers.push(*user_id);
        }
    }
    if approvers.is_empty() {
        warn!(application_id = app.id, step, "every planned approver is inactive");
        approvers = planned.clone();
    }

    let mut task_ids = Vec::with_capacity(approvers.len());
    for approver in &approvers {
        task_ids.push(insert_task(conn, app.id, round, step, *approver)?);
    }
    info!(application_id = app.id, round, step, approvers = ?approvers, "tasks dispatched");
    Ok(task_ids)
}

fn own_application(conn: &Connection, actor: &User, id: i64) -> Result<Application, AppError> {
    let app = require_application(conn, id)?;
    if app.applicant_id != actor.id {
        return Err(AppError::Forbidden(format!("application #{id} belongs to another user")));
    }
    Ok(app)
}

fn expect_status(app: &Application, allowed: &[ApplicationStatus]) -> Result<(), AppError> {
    if allowed.contains(&app.status) {
        return Ok(());
    }
    Err(AppError::Conflict(format!(
        "application #{} is {}, expected {}",
        app.id,
        app.status,
        allowed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" or ")
    )))
}

fn non_empty(comment: Option<&str>) -> Option<&str> {
    comment.map(str::trim).filter(|c| !c.is_empty())
}

impl Workflow {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn create_draft(&self, actor: &User, input: &ApplicationInput) -> Result<Application, AppError> {
        input.validate()?;
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let id = rows::insert_application(&tx, actor.id, input)?;
        insert_event(&tx, id, Some(actor.id), EventAction::Created, None)?;
        let app = require_application(&tx, id)?;
        commit(tx)?;
        info!(application_id = id, applicant_id = actor.id, app_type = %app.app_type, "draft created");
        Ok(app)
    }

    pub fn update_draft(&self, actor: &User, id: i64, input: &ApplicationInput) -> Result<Application, AppError> {
        input.validate()?;
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let app = own_application(&tx, actor, id)?;
        expect_status(&app, &[ApplicationStatus::Draft])?;
        rows::update_application_content(&tx, id, input)?;
        insert_event(&tx, id, Some(actor.id), EventAction::Updated, None)?;
        let app = require_application(&tx, id)?;
        commit(tx)?;
        Ok(app)
    }

    /// Delete a draft that was never submitted.
    pub fn delete_draft(&self, actor: &User, id: i64) -> Result<(), AppError> {
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let app = own_application(&tx, actor, id)?;
        expect_status(&app, &[ApplicationStatus::Draft])?;
        if app.round > 0 {
            return Err(AppError::Conflict(format!(
                "application #{id} has approval history and cannot be deleted"
            )));
        }
        rows::delete_application(&tx, id)?;
        commit(tx)?;
        info!(application_id = id, "draft deleted");
        Ok(())
    }

    /// Route a draft and dispatch its first step.
    pub fn submit(&self, actor: &User, id: i64) -> Result<Application, AppError> {
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let app = own_application(&tx, actor, id)?;
        expect_status(&app, &[ApplicationStatus::Draft])?;

        let applicant = fetch_user(&tx, app.applicant_id)?
            .ok_or_else(|| AppError::NotFound(format!("user #{}", app.applicant_id)))?;
        let RoutePreview { rule, plan } = route(&tx, &applicant, &app.detail)?;

        let round = app.round + 1;
        rows::mark_submitted(&tx, id, rule.id, rule.mode, &plan, round)?;
        insert_event(&tx, id, Some(actor.id), EventAction::Submitted, Some(&rule.name))?;
        let app = require_application(&tx, id)?;
        dispatch_step(&tx, &app, round, 1)?;
        commit(tx)?;

        info!(
            application_id = id,
            rule_id = rule.id,
            mode = %rule.mode,
            round,
            total_steps = app.total_steps,
            "application submitted"
        );
        Ok(app)
    }

    pub fn withdraw(&self, actor: &User, id: i64, comment: Option<&str>) -> Result<Application, AppError> {
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let app = own_application(&tx, actor, id)?;
        expect_status(&app, &[ApplicationStatus::Pending])?;
        let cancelled = cancel_pending_tasks(&tx, id, app.round, None)?;
        set_application_status(&tx, id, ApplicationStatus::Withdrawn)?;
        insert_event(&tx, id, Some(actor.id), EventAction::Withdrawn, non_empty(comment))?;
        let app = require_application(&tx, id)?;
        commit(tx)?;
        info!(application_id = id, cancelled, "application withdrawn");
        Ok(app)
    }

    /// Bring a rejected or withdrawn application back to draft for editing.
    pub fn reopen(&self, actor: &User, id: i64) -> Result<Application, AppError> {
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let app = own_application(&tx, actor, id)?;
        expect_status(&app, &[ApplicationStatus::Rejected, ApplicationStatus::Withdrawn])?;
        set_application_status(&tx, id, ApplicationStatus::Draft)?;
        insert_event(&tx, id, Some(actor.id), EventAction::Reopened, None)?;
        let app = require_application(&tx, id)?;
        commit(tx)?;
        Ok(app)
    }

    /// Record an approver's decision and advance the application.
    pub fn act(
        &self,
        actor: &User,
        task_id: i64,
        decision: Decision,
        comment: Option<&str>,
    ) -> Result<Application, AppError> {
        let comment = non_empty(comment);
        if decision == Decision::Reject && comment.is_none() {
            return Err(AppError::Validation("a rejection needs a comment".into()));
        }

        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let task = fetch_task(&tx, task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task #{task_id}")))?;
        if task.approver_id != actor.id {
            return Err(AppError::Forbidden(format!("task #{task_id} is assigned to another user")));
        }
        let app = live_task_application(&tx, &task)?;
        let mode = app
            .mode
            .ok_or_else(|| AppError::Store(format!("pending application #{} has no mode", app.id)))?;

        let (task_status, action) = match decision {
            Decision::Approve => (TaskStatus::Approved, EventAction::Approved),
            Decision::Reject => (TaskStatus::Rejected, EventAction::Rejected),
        };
        set_task_status(&tx, task.id, task_status, comment)?;
        insert_event(&tx, app.id, Some(actor.id), action, comment)?;

        let statuses: Vec<TaskStatus> = tasks_of_step(&tx, app.id, task.round, task.step)?
            .into_iter()
            .map(|t| t.status)
            .collect();

        match step_outcome(mode, &statuses) {
            StepOutcome::Waiting => {
                debug!(application_id = app.id, step = task.step, "step waiting for more decisions");
            }
            StepOutcome::Rejected => {
                cancel_pending_tasks(&tx, app.id, task.round, None)?;
                set_application_status(&tx, app.id, ApplicationStatus::Rejected)?;
                info!(application_id = app.id, step = task.step, by = actor.id, "application rejected");
            }
            StepOutcome::Approved => {
                cancel_pending_tasks(&tx, app.id, task.round, Some(task.step))?;
                if task.step < app.total_steps {
                    let next = task.step + 1;
                    rows::set_current_step(&tx, app.id, next)?;
                    dispatch_step(&tx, &app, task.round, next)?;
                    insert_event(&tx, app.id, None, EventAction::StepAdvanced, None)?;
                    info!(application_id = app.id, step = next, "advanced to next step");
                } else {
                    set_application_status(&tx, app.id, ApplicationStatus::Approved)?;
                    insert_event(&tx, app.id, None, EventAction::Completed, None)?;
                    info!(application_id = app.id, "application approved");
                }
            }
        }

        let app = require_application(&tx, app.id)?;
        commit(tx)?;
        Ok(app)
    }

    /// Hand a pending task to someone else. The holder or an admin may do it.
    pub fn transfer(
        &self,
        actor: &User,
        task_id: i64,
        to_user: i64,
        comment: Option<&str>,
    ) -> Result<Task, AppError> {
        let mut conn = self.store.conn()?;
        let tx = write_tx(&mut conn)?;
        let task = fetch_task(&tx, task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task #{task_id}")))?;
        if task.approver_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(format!("task #{task_id} is assigned to another user")));
        }
        let app = live_task_application(&tx, &task)?;

        let target = fetch_user(&tx, to_user)?
            .ok_or_else(|| AppError::NotFound(format!("user #{to_user}")))?;
        if !target.active {
            return Err(AppError::Validation(format!("user #{to_user} is inactive")));
        }
        if target.id == app.applicant_id {
            return Err(AppError::Validation("a task cannot go to the applicant".into()));
        }
        // A pending or decided task counts; transferred and cancelled ones do not.
        let already_holds = tasks_of_step(&tx, app.id, task.round, task.step)?
            .iter()
            .any(|t| {
                t.approver_id == to_user
                    && !matches!(t.status, TaskStatus::Transferred | TaskStatus::Cancelled)
            });
        if already_holds {
            return Err(AppError::Conflict(format!(
                "user #{to_user} already has a task in this step"
            )));
        }

        let note = match non_empty(comment) {
            Some(c) => format!("to user #{to_user}: {c}"),
            None => format!("to user #{to_user}"),
        };
        set_task_status(&tx, task.id, TaskStatus::Transferred, non_empty(comment))?;
        let new_id = insert_task(&tx, app.id, task.round, task.step, to_user)?;
        insert_event(&tx, app.id, Some(actor.id), EventAction::Transferred, Some(&note))?;
        let new_task = fetch_task(&tx, new_id)?
            .ok_or_else(|| AppError::Store(format!("task #{new_id} vanished after insert")))?;
        commit(tx)?;
        info!(task_id, new_task_id = new_id, to_user, "task transferred");
        Ok(new_task)
    }

    /// Dry-run routing for `applicant_id` without touching any application.
    pub fn preview(&self, applicant_id: i64, detail: &ApplicationDetail) -> Result<RoutePreview, AppError> {
        detail.validate()?;
        let conn = self.store.conn()?;
        let applicant = fetch_user(&conn, applicant_id)?
            .ok_or_else(|| AppError::NotFound(format!("user #{applicant_id}")))?;
        route(&conn, &applicant, detail)
    }

    /// Full application history, visible to the applicant, its approvers and admins.
    pub fn detail(&self, viewer: &User, id: i64) -> Result<ApplicationView, AppError> {
        let conn = self.store.conn()?;
        let application = require_application(&conn, id)?;
        let allowed = viewer.is_admin()
            || application.applicant_id == viewer.id
            || rows::is_task_holder(&conn, id, viewer.id)?;
        if !allowed {
            return Err(AppError::Forbidden(format!("no access to application #{id}")));
        }
        Ok(ApplicationView {
            tasks: tasks_of_application(&conn, id)?,
            events: events_of_application(&conn, id)?,
            application,
        })
    }

    pub fn list_mine(&self, user: &User, status: Option<ApplicationStatus>) -> Result<Vec<Application>, AppError> {
        self.store.list_applications(&ApplicationFilter {
            status,
            applicant_id: Some(user.id),
            ..ApplicationFilter::default()
        })
    }

    pub fn inbox(&self, user: &User, pending: bool) -> Result<Vec<TaskView>, AppError> {
        self.store.list_tasks_for(user.id, pending)
    }
}

/// The application of a task that can still be acted on.
fn live_task_application(conn: &Connection, task: &Task) -> Result<Application, AppError> {
    if task.status != TaskStatus::Pending {
        return Err(AppError::Conflict(format!("task #{} is already {}", task.id, task.status)));
    }
    let app = require_application(conn, task.application_id)?;
    if app.status != ApplicationStatus::Pending
        || task.round != app.round
        || task.step != app.current_step
    {
        return Err(AppError::Conflict(format!(
            "task #{} no longer belongs to an active step of application #{}",
            task.id, app.id
        )));
    }
    Ok(app)
}
