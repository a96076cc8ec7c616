//! Applications, their approval tasks, and the audit trail.
//!
//! Row-level functions take a `&Connection` so the workflow can compose them
//! inside one transaction; read-only listings are exposed on [`Store`].

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};

use super::org::subtree;
use super::{Store, now_iso8601, store_err};
use crate::error::AppError;
use crate::workflow::types::{
    Application, ApplicationInput, ApplicationStatus, ApplicationType, ApprovalMode, Event,
    EventAction, Task, TaskStatus,
};

const APPLICATION_COLUMNS: &str = "id, applicant_id, app_type, title, reason, detail, status, \
                                   rule_id, mode, plan, round, current_step, total_steps, \
                                   created_at, updated_at, submitted_at, finished_at";

const TASK_COLUMNS: &str =
    "id, application_id, round, step, approver_id, status, comment, created_at, acted_at";

fn conversion(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    let app_type: String = row.get(2)?;
    let detail: String = row.get(5)?;
    let status: String = row.get(6)?;
    let mode: Option<String> = row.get(8)?;
    let plan: String = row.get(9)?;
    Ok(Application {
        id: row.get(0)?,
        applicant_id: row.get(1)?,
        app_type: ApplicationType::parse(&app_type).map_err(|e| conversion(2, e))?,
        title: row.get(3)?,
        reason: row.get(4)?,
        detail: serde_json::from_str(&detail).map_err(|e| conversion(5, e))?,
        status: ApplicationStatus::parse(&status).map_err(|e| conversion(6, e))?,
        rule_id: row.get(7)?,
        mode: mode
            .as_deref()
            .map(ApprovalMode::parse)
            .transpose()
            .map_err(|e| conversion(8, e))?,
        plan: serde_json::from_str(&plan).map_err(|e| conversion(9, e))?,
        round: row.get(10)?,
        current_step: row.get(11)?,
        total_steps: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        submitted_at: row.get(15)?,
        finished_at: row.get(16)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        application_id: row.get(1)?,
        round: row.get(2)?,
        step: row.get(3)?,
        approver_id: row.get(4)?,
        status: TaskStatus::parse(&status).map_err(|e| conversion(5, e))?,
        comment: row.get(6)?,
        created_at: row.get(7)?,
        acted_at: row.get(8)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let action: String = row.get(3)?;
    Ok(Event {
        id: row.get(0)?,
        application_id: row.get(1)?,
        actor_id: row.get(2)?,
        action: EventAction::parse(&action).map_err(|e| conversion(3, e))?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn detail_json(input: &ApplicationInput) -> Result<String, AppError> {
    serde_json::to_string(&input.detail)
        .map_err(|e| AppError::Store(format!("serialize application detail: {e}")))
}

// ── Applications ────────────────────────────────────────────────────────────

pub(crate) fn insert_application(
    conn: &Connection,
    applicant_id: i64,
    input: &ApplicationInput,
) -> Result<i64, AppError> {
    let now = now_iso8601();
    conn.execute(
        "INSERT INTO applications (applicant_id, app_type, title, reason, detail, magnitude,
                                   status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            applicant_id,
            input.detail.app_type().as_str(),
            input.title.trim(),
            input.reason,
            detail_json(input)?,
            input.detail.magnitude(),
            ApplicationStatus::Draft.as_str(),
            now,
        ],
    )
    .map_err(store_err("insert application"))?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn fetch_application(conn: &Connection, id: i64) -> Result<Option<Application>, AppError> {
    conn.query_row(
        &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
        params![id],
        application_from_row,
    )
    .optional()
    .map_err(store_err("get application"))
}

pub(crate) fn require_application(conn: &Connection, id: i64) -> Result<Application, AppError> {
    fetch_application(conn, id)?.ok_or_else(|| AppError::NotFound(format!("application #{id}")))
}

pub(crate) fn update_application_content(
    conn: &Connection,
    id: i64,
    input: &ApplicationInput,
) -> Result<(), AppError> {
    conn.execute(
        "UPDATE applications SET app_type = ?2, title = ?3, reason = ?4, detail = ?5,
                                 magnitude = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            id,
            input.detail.app_type().as_str(),
            input.title.trim(),
            input.reason,
            detail_json(input)?,
            input.detail.magnitude(),
            now_iso8601(),
        ],
    )
    .map_err(store_err("update application"))?;
    Ok(())
}

pub(crate) fn delete_application(conn: &Connection, id: i64) -> Result<(), AppError> {
    conn.execute("DELETE FROM applications WHERE id = ?1", params![id])
        .map_err(store_err("delete application"))?;
    Ok(())
}

/// Record routing for a new round and move the application to `pending`.
pub(crate) fn mark_submitted(
    conn: &Connection,
    id: i64,
    rule_id: i64,
    mode: ApprovalMode,
    plan: &[Vec<i64>],
    round: i64,
) -> Result<(), AppError> {
    let plan_json = serde_json::to_string(plan)
        .map_err(|e| AppError::Store(format!("serialize plan: {e}")))?;
    let now = now_iso8601();
    conn.execute(
        "UPDATE applications SET status = ?2, rule_id = ?3, mode = ?4, plan = ?5, round = ?6,
                                 current_step = 1, total_steps = ?7, submitted_at = ?8,
                                 updated_at = ?8, finished_at = NULL
         WHERE id = ?1",
        params![
            id,
            ApplicationStatus::Pending.as_str(),
            rule_id,
            mode.as_str(),
            plan_json,
            round,
            plan.len() as i64,
            now,
        ],
    )
    .map_err(store_err("mark submitted"))?;
    Ok(())
}

/// Set the status; terminal statuses also stamp `finished_at`.
pub(crate) fn set_application_status(
    conn: &Connection,
    id: i64,
    status: ApplicationStatus,
) -> Result<(), AppError> {
    let now = now_iso8601();
    let finished = matches!(
        status,
        ApplicationStatus::Approved | ApplicationStatus::Rejected | ApplicationStatus::Withdrawn
    );
    conn.execute(
        "UPDATE applications
         SET status = ?2, updated_at = ?3,
             finished_at = CASE WHEN ?4 THEN ?3 ELSE NULL END,
             current_step = CASE WHEN ?2 = 'draft' THEN 0 ELSE current_step END
         WHERE id = ?1",
        params![id, status.as_str(), now, finished],
    )
    .map_err(store_err("set application status"))?;
    Ok(())
}

pub(crate) fn set_current_step(conn: &Connection, id: i64, step: i64) -> Result<(), AppError> {
    conn.execute(
        "UPDATE applications SET current_step = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, step, now_iso8601()],
    )
    .map_err(store_err("set current step"))?;
    Ok(())
}

// ── Tasks ───────────────────────────────────────────────────────────────────

pub(crate) fn insert_task(
    conn: &Connection,
    application_id: i64,
    round: i64,
    step: i64,
    approver_id: i64,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO tasks (application_id, round, step, approver_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            application_id,
            round,
            step,
            approver_id,
            TaskStatus::Pending.as_str(),
            now_iso8601(),
        ],
    )
    .map_err(store_err("insert task"))?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn fetch_task(conn: &Connection, id: i64) -> Result<Option<Task>, AppError> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        params![id],
        task_from_row,
    )
    .optional()
    .map_err(store_err("get task"))
}

fn query_tasks(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Task>, AppError> {
    let mut stmt = conn.prepare(sql).map_err(store_err("prepare tasks"))?;
    let rows = stmt.query_map(args, task_from_row).map_err(store_err("query tasks"))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map task row"))
}

pub(crate) fn tasks_of_step(
    conn: &Connection,
    application_id: i64,
    round: i64,
    step: i64,
) -> Result<Vec<Task>, AppError> {
    query_tasks(
        conn,
        &format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE application_id = ?1 AND round = ?2 AND step = ?3 ORDER BY id"
        ),
        params![application_id, round, step],
    )
}

pub(crate) fn tasks_of_application(conn: &Connection, application_id: i64) -> Result<Vec<Task>, AppError> {
    query_tasks(
        conn,
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE application_id = ?1 ORDER BY id"),
        params![application_id],
    )
}

pub(crate) fn set_task_status(
    conn: &Connection,
    id: i64,
    status: TaskStatus,
    comment: Option<&str>,
) -> Result<(), AppError> {
    conn.execute(
        "UPDATE tasks SET status = ?2, comment = ?3, acted_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), comment, now_iso8601()],
    )
    .map_err(store_err("set task status"))?;
    Ok(())
}

/// Cancel the pending tasks of a round (or of one step of it).
pub(crate) fn cancel_pending_tasks(
    conn: &Connection,
    application_id: i64,
    round: i64,
    step: Option<i64>,
) -> Result<usize, AppError> {
    conn.execute(
        "UPDATE tasks SET status = ?4, acted_at = ?5
         WHERE application_id = ?1 AND round = ?2 AND (?3 IS NULL OR step = ?3) AND status = ?6",
        params![
            application_id,
            round,
            step,
            TaskStatus::Cancelled.as_str(),
            now_iso8601(),
            TaskStatus::Pending.as_str(),
        ],
    )
    .map_err(store_err("cancel pending tasks"))
}

/// Whether `user_id` ever held a task on the application.
pub(crate) fn is_task_holder(conn: &Connection, application_id: i64, user_id: i64) -> Result<bool, AppError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE application_id = ?1 AND approver_id = ?2)",
        params![application_id, user_id],
        |row| row.get(0),
    )
    .map_err(store_err("check task holder"))
}

// ── Events ──────────────────────────────────────────────────────────────────

pub(crate) fn insert_event(
    conn: &Connection,
    application_id: i64,
    actor_id: Option<i64>,
    action: EventAction,
    comment: Option<&str>,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO events (application_id, actor_id, action, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![application_id, actor_id, action.as_str(), comment, now_iso8601()],
    )
    .map_err(store_err("insert event"))?;
    Ok(())
}

pub(crate) fn events_of_application(conn: &Connection, application_id: i64) -> Result<Vec<Event>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, application_id, actor_id, action, comment, created_at
             FROM events WHERE application_id = ?1 ORDER BY id",
        )
        .map_err(store_err("prepare events"))?;
    let rows = stmt
        .query_map(params![application_id], event_from_row)
        .map_err(store_err("query events"))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map event row"))
}

// ── Listings ────────────────────────────────────────────────────────────────

/// A task together with what an approver needs to see in an inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub title: String,
    pub app_type: ApplicationType,
    pub applicant_id: i64,
    pub applicant_name: String,
    pub application_status: ApplicationStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    pub app_type: Option<ApplicationType>,
    pub applicant_id: Option<i64>,
    /// Applicants in this department or any department below it.
    pub department_id: Option<i64>,
}

impl Store {
    pub fn list_applications(&self, filter: &ApplicationFilter) -> Result<Vec<Application>, AppError> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM applications a JOIN users u ON u.id = a.applicant_id WHERE 1 = 1",
            APPLICATION_COLUMNS
                .split(", ")
                .map(|c| format!("a.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut args: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            args.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND a.status = ?{}", args.len()));
        }
        if let Some(app_type) = filter.app_type {
            args.push(Value::Text(app_type.as_str().to_string()));
            sql.push_str(&format!(" AND a.app_type = ?{}", args.len()));
        }
        if let Some(applicant) = filter.applicant_id {
            args.push(Value::Integer(applicant));
            sql.push_str(&format!(" AND a.applicant_id = ?{}", args.len()));
        }
        if let Some(dept) = filter.department_id {
            let ids = subtree(&conn, dept)?;
            let placeholders: Vec<String> = ids
                .into_iter()
                .map(|id| {
                    args.push(Value::Integer(id));
                    format!("?{}", args.len())
                })
                .collect();
            sql.push_str(&format!(" AND u.department_id IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY a.id DESC");

        let mut stmt = conn.prepare(&sql).map_err(store_err("prepare list applications"))?;
        let rows = stmt
            .query_map(params_from_iter(args), application_from_row)
            .map_err(store_err("query applications"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map application row"))
    }

    /// Tasks assigned to `approver_id`: pending ones, or everything already
    /// resolved (approved, rejected, transferred) when `pending` is false.
    pub fn list_tasks_for(&self, approver_id: i64, pending: bool) -> Result<Vec<TaskView>, AppError> {
        let conn = self.conn()?;
        let status_clause = if pending {
            "t.status = 'pending'"
        } else {
            "t.status IN ('approved', 'rejected', 'transferred')"
        };
        let mut stmt = conn
            .prepare(&format!(
                "SELECT t.id, t.application_id, t.round, t.step, t.approver_id, t.status,
                        t.comment, t.created_at, t.acted_at,
                        a.title, a.app_type, a.applicant_id, u.display_name, a.status
                 FROM tasks t
                 JOIN applications a ON a.id = t.application_id
                 JOIN users u ON u.id = a.applicant_id
                 WHERE t.approver_id = ?1 AND {status_clause}
                 ORDER BY t.id DESC"
            ))
            .map_err(store_err("prepare task inbox"))?;
        let rows = stmt
            .query_map(params![approver_id], |row| {
                let app_type: String = row.get(10)?;
                let app_status: String = row.get(13)?;
                Ok(TaskView {
                    task: task_from_row(row)?,
                    title: row.get(9)?,
                    app_type: ApplicationType::parse(&app_type).map_err(|e| conversion(10, e))?,
                    applicant_id: row.get(11)?,
                    applicant_name: row.get(12)?,
                    application_status: ApplicationStatus::parse(&app_status)
                        .map_err(|e| conversion(13, e))?,
                })
            })
            .map_err(store_err("query task inbox"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map task inbox row"))
    }
}
