//! Aggregate counts behind the dashboard charts.

use std::collections::BTreeMap;

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::AppError;
use crate::store::{Store, store_err};

/// Per-user summary shown after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Own applications by status.
    pub applications: BTreeMap<String, i64>,
    pub pending_tasks: i64,
    pub handled_tasks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApproverLoad {
    pub approver_id: i64,
    pub display_name: String,
    pub approved: i64,
    pub rejected: i64,
    pub pending: i64,
}

/// Organisation-wide numbers for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub approvers: Vec<ApproverLoad>,
}

fn grouped(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<BTreeMap<String, i64>, AppError> {
    let mut stmt = conn.prepare(sql).map_err(store_err("prepare grouped count"))?;
    let rows = stmt
        .query_map(args, |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(store_err("query grouped count"))?;
    rows.collect::<Result<BTreeMap<_, _>, _>>().map_err(store_err("map grouped count"))
}

impl Store {
    pub fn dashboard(&self, user_id: i64) -> Result<Dashboard, AppError> {
        let conn = self.conn()?;
        let applications = grouped(
            &conn,
            "SELECT status, COUNT(*) FROM applications WHERE applicant_id = ?1 GROUP BY status",
            params![user_id],
        )?;
        let (pending_tasks, handled_tasks) = conn
            .query_row(
                "SELECT
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(SUM(status IN ('approved', 'rejected', 'transferred')), 0)
                 FROM tasks WHERE approver_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(store_err("count tasks"))?;
        Ok(Dashboard { applications, pending_tasks, handled_tasks })
    }

    pub fn overview(&self) -> Result<Overview, AppError> {
        let conn = self.conn()?;
        let by_status = grouped(
            &conn,
            "SELECT status, COUNT(*) FROM applications GROUP BY status",
            params![],
        )?;
        let by_type = grouped(
            &conn,
            "SELECT app_type, COUNT(*) FROM applications WHERE status != 'draft' GROUP BY app_type",
            params![],
        )?;

        let mut stmt = conn
            .prepare(
                "SELECT t.approver_id, u.display_name,
                        SUM(t.status = 'approved'), SUM(t.status = 'rejected'),
                        SUM(t.status = 'pending')
                 FROM tasks t JOIN users u ON u.id = t.approver_id
                 GROUP BY t.approver_id, u.display_name
                 ORDER BY t.approver_id",
            )
            .map_err(store_err("prepare approver load"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ApproverLoad {
                    approver_id: row.get(0)?,
                    display_name: row.get(1)?,
                    approved: row.get(2)?,
                    rejected: row.get(3)?,
                    pending: row.get(4)?,
                })
            })
            .map_err(store_err("query approver load"))?;
        let approvers = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err("map approver load"))?;

        Ok(Overview { by_status, by_type, approvers })
    }
}
