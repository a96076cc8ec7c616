//! Approval rules: persisted routing configuration.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use super::org::{fetch_department, fetch_post};
use super::users::fetch_user;
use super::{Store, commit, now_iso8601, store_err, write_tx};
use crate::error::AppError;
use crate::workflow::types::{ApplicationType, ApprovalMode, ApproverSpec, Rule, RuleInput};

const RULE_COLUMNS: &str = "id, name, app_type, department_id, post_id, min_magnitude, priority, \
                            mode, approvers, enabled, created_at, updated_at";

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let app_type: String = row.get(2)?;
    let mode: String = row.get(7)?;
    let approvers: String = row.get(8)?;
    let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };
    Ok(Rule {
        id: row.get(0)?,
        name: row.get(1)?,
        app_type: ApplicationType::parse(&app_type).map_err(|e| conversion(2, e.into()))?,
        department_id: row.get(3)?,
        post_id: row.get(4)?,
        min_magnitude: row.get(5)?,
        priority: row.get(6)?,
        mode: ApprovalMode::parse(&mode).map_err(|e| conversion(7, e.into()))?,
        approvers: serde_json::from_str(&approvers).map_err(|e| conversion(8, e.into()))?,
        enabled: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub(crate) fn fetch_rule(conn: &Connection, id: i64) -> Result<Option<Rule>, AppError> {
    conn.query_row(
        &format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1"),
        params![id],
        rule_from_row,
    )
    .optional()
    .map_err(store_err("get rule"))
}

/// Number of rules scoped to `post_id` or naming it among their approvers.
pub(crate) fn rules_using_post(conn: &Connection, post_id: i64) -> Result<usize, AppError> {
    let mut stmt = conn
        .prepare(&format!("SELECT {RULE_COLUMNS} FROM rules"))
        .map_err(store_err("prepare rules by post"))?;
    let rules = stmt
        .query_map([], rule_from_row)
        .map_err(store_err("query rules by post"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(store_err("map rule row"))?;
    Ok(rules
        .iter()
        .filter(|r| {
            r.post_id == Some(post_id)
                || r.approvers
                    .iter()
                    .any(|a| matches!(a, ApproverSpec::Post { post_id: p, .. } if *p == post_id))
        })
        .count())
}

/// Enabled rules of one application type, in id order.
pub(crate) fn enabled_rules(conn: &Connection, app_type: ApplicationType) -> Result<Vec<Rule>, AppError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE enabled = 1 AND app_type = ?1 ORDER BY id"
        ))
        .map_err(store_err("prepare enabled rules"))?;
    let rows = stmt
        .query_map(params![app_type.as_str()], rule_from_row)
        .map_err(store_err("query enabled rules"))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map rule row"))
}

fn validate_rule(conn: &Connection, input: &RuleInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::Validation("rule name must not be empty".into()));
    }
    if input.approvers.is_empty() {
        return Err(AppError::Validation("rule needs at least one approver".into()));
    }
    if matches!(input.min_magnitude, Some(m) if m < 0) {
        return Err(AppError::Validation("min_magnitude must not be negative".into()));
    }
    if let Some(dept) = input.department_id {
        if fetch_department(conn, dept)?.is_none() {
            return Err(AppError::NotFound(format!("department #{dept}")));
        }
    }
    if let Some(post) = input.post_id {
        if fetch_post(conn, post)?.is_none() {
            return Err(AppError::NotFound(format!("post #{post}")));
        }
    }
    for spec in &input.approvers {
        match spec {
            ApproverSpec::User { user_id } => {
                if fetch_user(conn, *user_id)?.is_none() {
                    return Err(AppError::NotFound(format!("approver user #{user_id}")));
                }
            }
            ApproverSpec::Post { post_id, .. } => {
                if fetch_post(conn, *post_id)?.is_none() {
                    return Err(AppError::NotFound(format!("approver post #{post_id}")));
                }
            }
            ApproverSpec::SuperiorLeader { levels } if *levels == 0 => {
                return Err(AppError::Validation(
                    "superior_leader levels must be at least 1".into(),
                ));
            }
            ApproverSpec::DepartmentLeader | ApproverSpec::SuperiorLeader { .. } => {}
        }
    }
    Ok(())
}

fn approvers_json(approvers: &[ApproverSpec]) -> Result<String, AppError> {
    serde_json::to_string(approvers)
        .map_err(|e| AppError::Store(format!("serialize approvers: {e}")))
}

impl Store {
    pub fn create_rule(&self, input: &RuleInput) -> Result<Rule, AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        validate_rule(&tx, input)?;
        let now = now_iso8601();
        tx.execute(
            "INSERT INTO rules (name, app_type, department_id, post_id, min_magnitude, priority,
                                mode, approvers, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                input.name.trim(),
                input.app_type.as_str(),
                input.department_id,
                input.post_id,
                input.min_magnitude,
                input.priority,
                input.mode.as_str(),
                approvers_json(&input.approvers)?,
                input.enabled,
                now,
            ],
        )
        .map_err(store_err("insert rule"))?;
        let id = tx.last_insert_rowid();
        let rule = fetch_rule(&tx, id)?
            .ok_or_else(|| AppError::Store(format!("rule #{id} vanished after insert")))?;
        commit(tx)?;
        info!(rule_id = id, app_type = %rule.app_type, mode = %rule.mode, "rule created");
        Ok(rule)
    }

    pub fn get_rule(&self, id: i64) -> Result<Rule, AppError> {
        let conn = self.conn()?;
        fetch_rule(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("rule #{id}")))
    }

    pub fn list_rules(&self, app_type: Option<ApplicationType>) -> Result<Vec<Rule>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RULE_COLUMNS} FROM rules WHERE (?1 IS NULL OR app_type = ?1) ORDER BY id"
            ))
            .map_err(store_err("prepare list rules"))?;
        let rows = stmt
            .query_map(params![app_type.map(|t| t.as_str())], rule_from_row)
            .map_err(store_err("query rules"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map rule row"))
    }

    pub fn update_rule(&self, id: i64, input: &RuleInput) -> Result<Rule, AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        if fetch_rule(&tx, id)?.is_none() {
            return Err(AppError::NotFound(format!("rule #{id}")));
        }
        validate_rule(&tx, input)?;
        tx.execute(
            "UPDATE rules SET name = ?2, app_type = ?3, department_id = ?4, post_id = ?5,
                              min_magnitude = ?6, priority = ?7, mode = ?8, approvers = ?9,
                              enabled = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                id,
                input.name.trim(),
                input.app_type.as_str(),
                input.department_id,
                input.post_id,
                input.min_magnitude,
                input.priority,
                input.mode.as_str(),
                approvers_json(&input.approvers)?,
                input.enabled,
                now_iso8601(),
            ],
        )
        .map_err(store_err("update rule"))?;
        let rule = fetch_rule(&tx, id)?.ok_or_else(|| AppError::NotFound(format!("rule #{id}")))?;
        commit(tx)?;
        info!(rule_id = id, "rule updated");
        Ok(rule)
    }

    pub fn set_rule_enabled(&self, id: i64, enabled: bool) -> Result<Rule, AppError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE rules SET enabled = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, enabled, now_iso8601()],
            )
            .map_err(store_err("toggle rule"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("rule #{id}")));
        }
        info!(rule_id = id, enabled, "rule toggled");
        fetch_rule(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("rule #{id}")))
    }

    /// Delete a rule. Applications routed by it keep their frozen plan.
    pub fn delete_rule(&self, id: i64) -> Result<(), AppError> {
        let conn = self.conn()?;
        let changed = conn
            .execute("DELETE FROM rules WHERE id = ?1", params![id])
            .map_err(store_err("delete rule"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("rule #{id}")));
        }
        info!(rule_id = id, "rule deleted");
        Ok(())
    }
}
