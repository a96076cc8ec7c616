//! Users and bearer-token sessions.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::org::{fetch_department, fetch_post};
use super::{Store, commit, now_iso8601, store_err, write_tx};
use crate::auth::PasswordHash;
use crate::error::AppError;
use crate::workflow::types::text_enum;

text_enum!(
    /// What a user may do beyond their own applications and tasks.
    Role {
        Admin => "admin",
        Employee => "employee",
    }
);

/// A user as exposed outside the store. Credentials never leave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub department_id: Option<i64>,
    pub post_id: Option<i64>,
    pub active: bool,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub department_id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
}

fn default_role() -> Role {
    Role::Employee
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserUpdate {
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub department_id: Option<i64>,
    #[serde(default)]
    pub post_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub department_id: Option<i64>,
    pub post_id: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    /// Unix seconds.
    pub expires_at: i64,
}

const USER_COLUMNS: &str =
    "id, username, display_name, role, department_id, post_id, active, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        role: Role::parse(&role).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        department_id: row.get(4)?,
        post_id: row.get(5)?,
        active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(crate) fn fetch_user(conn: &Connection, id: i64) -> Result<Option<User>, AppError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        user_from_row,
    )
    .optional()
    .map_err(store_err("get user"))
}

fn check_org_refs(conn: &Connection, department_id: Option<i64>, post_id: Option<i64>) -> Result<(), AppError> {
    if let Some(dept) = department_id {
        if fetch_department(conn, dept)?.is_none() {
            return Err(AppError::NotFound(format!("department #{dept}")));
        }
    }
    if let Some(post) = post_id {
        if fetch_post(conn, post)?.is_none() {
            return Err(AppError::NotFound(format!("post #{post}")));
        }
    }
    Ok(())
}

impl Store {
    pub fn create_user(&self, input: &NewUser, password: &PasswordHash) -> Result<User, AppError> {
        let username = input.username.trim();
        if username.is_empty() || username.contains(char::is_whitespace) {
            return Err(AppError::Validation("username must be non-empty without spaces".into()));
        }
        if input.display_name.trim().is_empty() {
            return Err(AppError::Validation("display_name must not be empty".into()));
        }

        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        check_org_refs(&tx, input.department_id, input.post_id)?;
        tx.execute(
            "INSERT INTO users (username, display_name, role, department_id, post_id,
                                password_salt, password_hash, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
            params![
                username,
                input.display_name.trim(),
                input.role.as_str(),
                input.department_id,
                input.post_id,
                password.salt,
                password.hash,
                now_iso8601(),
            ],
        )
        .map_err(store_err("insert user"))?;
        let id = tx.last_insert_rowid();
        let user = fetch_user(&tx, id)?
            .ok_or_else(|| AppError::Store(format!("user #{id} vanished after insert")))?;
        commit(tx)?;
        info!(user_id = id, username = %user.username, role = user.role.as_str(), "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> Result<User, AppError> {
        let conn = self.conn()?;
        fetch_user(&conn, id)?.ok_or_else(|| AppError::NotFound(format!("user #{id}")))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<User, AppError> {
        self.user_credentials(username)?
            .map(|(user, _)| user)
            .ok_or_else(|| AppError::NotFound(format!("user '{username}'")))
    }

    /// The user and stored password hash for `username`, if the user exists.
    pub fn user_credentials(&self, username: &str) -> Result<Option<(User, PasswordHash)>, AppError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {USER_COLUMNS}, password_salt, password_hash FROM users WHERE username = ?1"
            ),
            params![username],
            |row| {
                let user = user_from_row(row)?;
                let hash = PasswordHash { salt: row.get(8)?, hash: row.get(9)? };
                Ok((user, hash))
            },
        )
        .optional()
        .map_err(store_err("get user credentials"))
    }

    pub fn password_hash(&self, user_id: i64) -> Result<PasswordHash, AppError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT password_salt, password_hash FROM users WHERE id = ?1",
            params![user_id],
            |row| Ok(PasswordHash { salt: row.get(0)?, hash: row.get(1)? }),
        )
        .optional()
        .map_err(store_err("get password hash"))?
        .ok_or_else(|| AppError::NotFound(format!("user #{user_id}")))
    }

    pub fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NULL OR department_id = ?1)
                   AND (?2 IS NULL OR post_id = ?2)
                   AND (?3 IS NULL OR active = ?3)
                 ORDER BY id"
            ))
            .map_err(store_err("prepare list users"))?;
        let rows = stmt
            .query_map(
                params![filter.department_id, filter.post_id, filter.active],
                user_from_row,
            )
            .map_err(store_err("query users"))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err("map user row"))
    }

    pub fn count_users(&self) -> Result<i64, AppError> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(store_err("count users"))
    }

    pub fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User, AppError> {
        if update.display_name.trim().is_empty() {
            return Err(AppError::Validation("display_name must not be empty".into()));
        }
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        check_org_refs(&tx, update.department_id, update.post_id)?;
        let changed = tx
            .execute(
                "UPDATE users SET display_name = ?2, role = ?3, department_id = ?4, post_id = ?5
                 WHERE id = ?1",
                params![
                    id,
                    update.display_name.trim(),
                    update.role.as_str(),
                    update.department_id,
                    update.post_id,
                ],
            )
            .map_err(store_err("update user"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("user #{id}")));
        }
        let user = fetch_user(&tx, id)?.ok_or_else(|| AppError::NotFound(format!("user #{id}")))?;
        commit(tx)?;
        Ok(user)
    }

    /// Replace the password and drop every session of the user.
    pub fn set_password(&self, id: i64, password: &PasswordHash) -> Result<(), AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let changed = tx
            .execute(
                "UPDATE users SET password_salt = ?2, password_hash = ?3 WHERE id = ?1",
                params![id, password.salt, password.hash],
            )
            .map_err(store_err("set password"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("user #{id}")));
        }
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])
            .map_err(store_err("drop sessions"))?;
        commit(tx)?;
        info!(user_id = id, "password changed");
        Ok(())
    }

    /// Activate or deactivate a user. Deactivation also ends its sessions.
    pub fn set_active(&self, id: i64, active: bool) -> Result<User, AppError> {
        let mut conn = self.conn()?;
        let tx = write_tx(&mut conn)?;
        let changed = tx
            .execute("UPDATE users SET active = ?2 WHERE id = ?1", params![id, active])
            .map_err(store_err("set active"))?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("user #{id}")));
        }
        if !active {
            tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])
                .map_err(store_err("drop sessions"))?;
        }
        let user = fetch_user(&tx, id)?.ok_or_else(|| AppError::NotFound(format!("user #{id}")))?;
        commit(tx)?;
        info!(user_id = id, active, "user activation changed");
        Ok(user)
    }

    // ── Sessions ────────────────────────────────────────────────────────────

    pub fn create_session(&self, user_id: i64, ttl_minutes: i64) -> Result<Session, AppError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expires_at = ttl_minutes
            .checked_mul(60)
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .ok_or_else(|| AppError::Validation(format!("session ttl of {ttl_minutes} minutes is out of range")))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, now_iso8601(), expires_at],
        )
        .map_err(store_err("insert session"))?;
        debug!(user_id, "session created");
        Ok(Session { token, user_id, expires_at })
    }

    /// Resolve a bearer token to its active user. Expired tokens are removed.
    pub fn session_user(&self, token: &str) -> Result<User, AppError> {
        let conn = self.conn()?;
        let found: Option<(i64, i64)> = conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(store_err("get session"))?;

        let Some((user_id, expires_at)) = found else {
            return Err(AppError::Unauthorized("invalid or expired token".into()));
        };

        if expires_at <= Utc::now().timestamp() {
            conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
                .map_err(store_err("delete expired session"))?;
            return Err(AppError::Unauthorized("invalid or expired token".into()));
        }

        match fetch_user(&conn, user_id)? {
            Some(user) if user.active => Ok(user),
            _ => Err(AppError::Unauthorized("invalid or expired token".into())),
        }
    }

    pub fn delete_session(&self, token: &str) -> Result<(), AppError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(store_err("delete session"))?;
        Ok(())
    }

    /// Remove every expired session; returns how many were removed.
    pub fn purge_expired_sessions(&self) -> Result<usize, AppError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )
        .map_err(store_err("purge sessions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(&tmp.path().join("users.db")).unwrap();
        (tmp, store)
    }

    fn hash() -> PasswordHash {
        PasswordHash { salt: "00".into(), hash: "ff".into() }
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            display_name: username.to_uppercase(),
            role: Role::Employee,
            department_id: None,
            post_id: None,
        }
    }

    #[test]
    fn create_and_lookup() {
        let (_tmp, store) = store();
        let user = store.create_user(&new_user("alice"), &hash()).unwrap();
        assert_eq!(store.get_user(user.id).unwrap(), user);
        assert_eq!(store.get_user_by_username("alice").unwrap().id, user.id);
        let (_, creds) = store.user_credentials("alice").unwrap().unwrap();
        assert_eq!(creds, hash());
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn duplicate_username_conflicts() {
        let (_tmp, store) = store();
        store.create_user(&new_user("bob"), &hash()).unwrap();
        let err = store.create_user(&new_user("bob"), &hash()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn unknown_department_rejected() {
        let (_tmp, store) = store();
        let mut input = new_user("carol");
        input.department_id = Some(77);
        assert!(matches!(store.create_user(&input, &hash()), Err(AppError::NotFound(_))));
    }

    #[test]
    fn session_roundtrip_and_expiry() {
        let (_tmp, store) = store();
        let user = store.create_user(&new_user("dave"), &hash()).unwrap();
        let session = store.create_session(user.id, 10).unwrap();
        assert_eq!(store.session_user(&session.token).unwrap().id, user.id);

        let expired = store.create_session(user.id, -1).unwrap();
        assert!(matches!(store.session_user(&expired.token), Err(AppError::Unauthorized(_))));
        assert_eq!(store.purge_expired_sessions().unwrap(), 0);

        store.delete_session(&session.token).unwrap();
        assert!(store.session_user(&session.token).is_err());
    }

    #[test]
    fn out_of_range_session_ttl_rejected() {
        let (_tmp, store) = store();
        let user = store.create_user(&new_user("erin"), &hash()).unwrap();
        assert!(matches!(store.create_session(user.id, i64::MAX), Err(AppError::Validation(_))));
        assert!(matches!(store.create_session(user.id, i64::MAX / 60), Err(AppError::Validation(_))));
    }

    #[test]
    fn unknown_stored_role_is_an_error() {
        let (_tmp, store) = store();
        let user = store.create_user(&new_user("frank"), &hash()).unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE users SET role = 'boss' WHERE id = ?1", params![user.id])
            .unwrap();
        assert!(matches!(store.get_user(user.id), Err(AppError::Store(_))));
    }

    #[test]
    fn deactivation_ends_sessions() {
        let (_tmp, store) = store();
        let user = store.create_user(&new_user("erin"), &hash()).unwrap();
        let session = store.create_session(user.id, 10).unwrap();
        let user = store.set_active(user.id, false).unwrap();
        assert!(!user.active);
        assert!(store.session_user(&session.token).is_err());

        let filter = UserFilter { active: Some(true), ..UserFilter::default() };
        assert!(store.list_users(&filter).unwrap().is_empty());
    }
}
