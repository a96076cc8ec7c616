//! Departments and posts: the organisational tree rules route against.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::rules::rules_using_post;
use super::{Store, commit, now_iso8601, store_err, write_tx};
use crate::error::AppError;
use crate::workflow::dispatch::OrgDirectory;

/// Guard against corrupted parent links when walking up the tree.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub leader_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepartmentInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub leader_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub code: String,
    pub name: String,
}

const DEPARTMENT_COLUMNS: &str = "id, name, parent_id, leader_id, created_at";
const POST_COLUMNS: &str = "id, code, name, created_at";

fn department_from_row(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        leader_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub(crate) fn fetch_department(conn: &Connection, id: i64) -> Result<Option<Department>, AppError> {
    conn.query_row(
        &format!("SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE id = ?1"),
        params![id],
        department_from_row,
    )
    .optional()
    .map_err(store_err("get department"))
}

pub(crate) fn fetch_post(conn: &Connection, id: i64) -> Result<Option<Post>, AppError> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        params![id],
        post_from_row,
    )
    .optional()
    .map_err(store_err("get post"))
}

/// `id` followed by its ancestors up to the root, nearest first.
pub(crate) fn department_chain(conn: &Connection, id: i64) -> Result<Vec<i64>, AppError> {
    let mut chain = vec![id];
    let mut current = id;
    while chain.len() <= MAX_DEPTH {
        let parent: Option<i64> = conn
            .query_row(
                "SELECT parent_id FROM departments WHERE id = ?1",
                params![current],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map_err(store_err("walk department tree"))?
            .flatten();
        match parent {
            Some(p) if !chain.contains(&p) => {
                chain.push(p);
                current = p;
            }
            Some(p) => {
                return Err(AppError::Store(format!("department cycle at #{p}")));
            }
            None => break,
        }
    }
    Ok(chain)
}

fn validate_department(conn: &Connection, id: Option<i64>, input: &DepartmentInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::Validation("department name must not be empty".into()));
    }
    if let Some(parent) = input.parent_id {
        if fetch_department(conn, parent)?.is_none() {
            return Err(AppError::NotFound(format!("parent department #{parent}")));
        }
        if let Some(id) = id {
            if department_chain(conn, parent)?.contains(&id) {
                return Err(AppError::Validation(format!(
                    "department #{parent} is #{id} or one of its descendants"
                )));
            }
        }
    }
    if let Some(leader) = input.leader_id {
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM users WHERE id = ?1", params![leader], |r| r.get(0))
            .optional()
            .map_err(store_err("check leader"))?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("user #{leader}")));
        }
    }
    Ok(())
}

fn count(conn: &Connection, sql: &str, id: i64) -> Result<i64, AppError> {
    conn.query_row(sql, params![id], |row| row.get(0))
        .map_err(store_err("count references"))
}

/// [`OrgDirectory`] over a live connection (or transaction).
pub(crate) struct SqliteOrg<'c> {
    pub conn: &'c Connection,
}

impl OrgDirectory for SqliteOrg<'_> {
    fn department_leader(&self, department_id: i64) -> Result<Option<i64>, AppError> {
        Ok(fetch_department(self.conn, department_id)?.and_then(|d| d.leader_id))
    }

    fn is_active_user(&self, user_id: i64) -> Result<bool, AppError> {
        let active: Option<bool> = self
            .conn
            .query_row("SELECT active FROM users WHERE id = ?1", params![user_id], |r| r.get(0))
            .optional()
            .map_err(store_err("check user active"))?;
        Ok(active.unwrap_or(false))
    }

    fn post_holders(&self, post_id: i64, department_id: Option<i64>) -> Result<Vec<i64>, AppError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM users
                 WHERE post_id = ?1 AND active = 1 AND (?2 IS NULL OR department_id = ?2)
                 ORDER BY id",
            )
            .map_err(store_err("prepare post holders"))?;
        let rows = stmt
            .query_map(params![post_id, department_id], |row| row.get::<_, i64>(0))
            .map_err(store_err("query post holders"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map post holder row"))
    }
}

impl Store {
    // ── Departments ─────────────────────────────────────────────────────────

    pub fn create_department(&self, input: &DepartmentInput) -> Result<Department, AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        validate_department(&tx, None, input)?;
        tx.execute(
            "INSERT INTO departments (name, parent_id, leader_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![input.name.trim(), input.parent_id, input.leader_id, now_iso8601()],
        )
        .map_err(store_err("insert department"))?;
        let id = tx.last_insert_rowid();
        let dept = fetch_department(&tx, id)?
            .ok_or_else(|| AppError::Store(format!("department #{id} vanished after insert")))?;
        commit(tx)?;
        info!(department_id = id, name = %dept.name, "department created");
        Ok(dept)
    }

    pub fn get_department(&self, id: i64) -> Result<Department, AppError> {
        let conn = self.conn()?;
        fetch_department(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("department #{id}")))
    }

    pub fn list_departments(&self) -> Result<Vec<Department>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {DEPARTMENT_COLUMNS} FROM departments ORDER BY id"))
            .map_err(store_err("prepare list departments"))?;
        let rows = stmt
            .query_map([], department_from_row)
            .map_err(store_err("query departments"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map department row"))
    }

    pub fn update_department(&self, id: i64, input: &DepartmentInput) -> Result<Department, AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        if fetch_department(&tx, id)?.is_none() {
            return Err(AppError::NotFound(format!("department #{id}")));
        }
        validate_department(&tx, Some(id), input)?;
        tx.execute(
            "UPDATE departments SET name = ?2, parent_id = ?3, leader_id = ?4 WHERE id = ?1",
            params![id, input.name.trim(), input.parent_id, input.leader_id],
        )
        .map_err(store_err("update department"))?;
        let dept = fetch_department(&tx, id)?
            .ok_or_else(|| AppError::NotFound(format!("department #{id}")))?;
        commit(tx)?;
        Ok(dept)
    }

    /// Delete an empty department. Members, children or rules scoped to it
    /// make this a [`AppError::Conflict`].
    pub fn delete_department(&self, id: i64) -> Result<(), AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        if fetch_department(&tx, id)?.is_none() {
            return Err(AppError::NotFound(format!("department #{id}")));
        }
        let checks = [
            ("SELECT COUNT(*) FROM users WHERE department_id = ?1", "users"),
            ("SELECT COUNT(*) FROM departments WHERE parent_id = ?1", "child departments"),
            ("SELECT COUNT(*) FROM rules WHERE department_id = ?1", "rules"),
        ];
        for (sql, what) in checks {
            let n = count(&tx, sql, id)?;
            if n > 0 {
                return Err(AppError::Conflict(format!("department #{id} still has {n} {what}")));
            }
        }
        tx.execute("DELETE FROM departments WHERE id = ?1", params![id])
            .map_err(store_err("delete department"))?;
        commit(tx)?;
        info!(department_id = id, "department deleted");
        Ok(())
    }

    /// The department followed by its ancestors, nearest first.
    pub fn department_ancestors(&self, id: i64) -> Result<Vec<i64>, AppError> {
        let conn = self.conn()?;
        if fetch_department(&conn, id)?.is_none() {
            return Err(AppError::NotFound(format!("department #{id}")));
        }
        department_chain(&conn, id)
    }

    // ── Posts ───────────────────────────────────────────────────────────────

    pub fn create_post(&self, input: &PostInput) -> Result<Post, AppError> {
        validate_post(input)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO posts (code, name, created_at) VALUES (?1, ?2, ?3)",
            params![input.code.trim(), input.name.trim(), now_iso8601()],
        )
        .map_err(store_err("insert post"))?;
        let id = conn.last_insert_rowid();
        info!(post_id = id, code = %input.code, "post created");
        fetch_post(&conn, id)?.ok_or_else(|| AppError::Store(format!("post #{id} vanished after insert")))
    }

    /// Active holders of a post, optionally only within one department.
    pub fn users_with_post(&self, post_id: i64, department_id: Option<i64>) -> Result<Vec<i64>, AppError> {
        let conn = self.conn()?;
        SqliteOrg { conn: &conn }.post_holders(post_id, department_id)
    }

    pub fn get_post(&self, id: i64) -> Result<Post, AppError> {
        let conn = self.conn()?;
        fetch_post(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("post #{id}")))
    }

    pub fn list_posts(&self) -> Result<Vec<Post>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id"))
            .map_err(store_err("prepare list posts"))?;
        let rows = stmt.query_map([], post_from_row).map_err(store_err("query posts"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map post row"))
    }

    pub fn update_post(&self, id: i64, input: &PostInput) -> Result<Post, AppError> {
        validate_post(input)?;
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE posts SET code = ?2, name = ?3 WHERE id = ?1",
                params![id, input.code.trim(), input.name.trim()],
            )
            .map_err(store_err("update post"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("post #{id}")));
        }
        fetch_post(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("post #{id}")))
    }

    pub fn delete_post(&self, id: i64) -> Result<(), AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        if fetch_post(&tx, id)?.is_none() {
            return Err(AppError::NotFound(format!("post #{id}")));
        }
        let holders = count(&tx, "SELECT COUNT(*) FROM users WHERE post_id = ?1", id)?;
        if holders > 0 {
            return Err(AppError::Conflict(format!("post #{id} is held by {holders} users")));
        }
        let rules = rules_using_post(&tx, id)?;
        if rules > 0 {
            return Err(AppError::Conflict(format!("post #{id} is used by {rules} rules")));
        }
        tx.execute("DELETE FROM posts WHERE id = ?1", params![id])
            .map_err(store_err("delete post"))?;
        commit(tx)
    }
}

fn validate_post(input: &PostInput) -> Result<(), AppError> {
    if input.code.trim().is_empty() || input.name.trim().is_empty() {
        return Err(AppError::Validation("post code and name must not be empty".into()));
    }
    Ok(())
}

/// Every department id below `root`, `root` included.
pub(crate) fn subtree(conn: &Connection, root: i64) -> Result<HashSet<i64>, AppError> {
    let mut seen = HashSet::from([root]);
    let mut frontier = vec![root];
    let mut stmt = conn
        .prepare("SELECT id FROM departments WHERE parent_id = ?1")
        .map_err(store_err("prepare subtree"))?;
    while let Some(id) = frontier.pop() {
        let children = stmt
            .query_map(params![id], |row| row.get::<_, i64>(0))
            .map_err(store_err("query children"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err("map child row"))?;
        for child in children {
            if seen.insert(child) {
                frontier.push(child);
            }
        }
    }
    Ok(seen)
}
