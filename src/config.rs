//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the file named by `APPROVAL_HUB_CONFIG`), then applies the
//! `APPROVAL_HUB_DB_PATH`, `APPROVAL_HUB_BIND` and `APPROVAL_HUB_LOG_LEVEL`
//! env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

/// Upper bound for `auth.session_ttl_minutes`: one year.
pub const MAX_SESSION_TTL_MINUTES: i64 = 365 * 24 * 60;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Service name, used in logs and `/api/health`.
    pub name: String,
    /// Socket address to bind the API to.
    pub bind: String,
}

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Lifetime of a bearer token, in minutes.
    pub session_ttl_minutes: i64,
    /// Username of the admin account created on an empty database.
    pub bootstrap_admin: String,
    /// Password from `APPROVAL_HUB_ADMIN_PASSWORD`. Never sourced from TOML.
    pub bootstrap_password: Option<String>,
    pub password_min_len: usize,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// SQLite database file (already expanded, no `~`).
    pub db_path: PathBuf,
    pub log_level: String,
    pub auth: AuthConfig,
}

/// Values that replace their TOML counterparts when set.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub db_path: Option<String>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
    pub admin_password: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("APPROVAL_HUB_DB_PATH").ok(),
            bind: env::var("APPROVAL_HUB_BIND").ok(),
            log_level: env::var("APPROVAL_HUB_LOG_LEVEL").ok(),
            admin_password: env::var("APPROVAL_HUB_ADMIN_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
        }
    }
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    server: RawServer,
    database: RawDatabase,
    #[serde(default)]
    auth: RawAuth,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawDatabase {
    path: String,
}

#[derive(Deserialize)]
struct RawAuth {
    #[serde(default = "default_session_ttl")]
    session_ttl_minutes: i64,
    #[serde(default = "default_bootstrap_admin")]
    bootstrap_admin: String,
    #[serde(default = "default_password_min_len")]
    password_min_len: usize,
}

impl Default for RawAuth {
    fn default() -> Self {
        Self {
            session_ttl_minutes: default_session_ttl(),
            bootstrap_admin: default_bootstrap_admin(),
            password_min_len: default_password_min_len(),
        }
    }
}

fn default_name() -> String { "approval-hub".to_string() }
fn default_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_session_ttl() -> i64 { 720 }
fn default_bootstrap_admin() -> String { "admin".to_string() }
fn default_password_min_len() -> usize { 8 }

/// Load config from `path`, else `APPROVAL_HUB_CONFIG`, else
/// `config/default.toml`, then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = match path {
        Some(p) => p.to_string(),
        None => env::var("APPROVAL_HUB_CONFIG").unwrap_or_else(|_| "config/default.toml".into()),
    };
    load_from(Path::new(&path), &Overrides::from_env())
}

/// Loader with an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if parsed.auth.session_ttl_minutes <= 0 {
        return Err(AppError::Config(
            "auth.session_ttl_minutes must be positive".to_string(),
        ));
    }
    if parsed.auth.session_ttl_minutes > MAX_SESSION_TTL_MINUTES {
        return Err(AppError::Config(format!(
            "auth.session_ttl_minutes must be at most {MAX_SESSION_TTL_MINUTES}"
        )));
    }
    if parsed.auth.bootstrap_admin.trim().is_empty() {
        return Err(AppError::Config("auth.bootstrap_admin must not be empty".to_string()));
    }

    let db_path_str = overrides.db_path.as_deref().unwrap_or(&parsed.database.path);
    let bind = overrides.bind.clone().unwrap_or(parsed.server.bind);
    let log_level = overrides.log_level.clone().unwrap_or(parsed.server.log_level);
    logger::parse_level(&log_level).map_err(|e| AppError::Config(format!("server.log_level: {e}")))?;

    Ok(Config {
        server: ServerConfig {
            name: parsed.server.name,
            bind,
        },
        db_path: expand_home(db_path_str),
        log_level,
        auth: AuthConfig {
            session_ttl_minutes: parsed.auth.session_ttl_minutes,
            bootstrap_admin: parsed.auth.bootstrap_admin,
            bootstrap_password: overrides.admin_password.clone(),
            password_min_len: parsed.auth.password_min_len,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Config for tests: database under `dir`, short password rule.
    pub fn test_default(dir: &Path) -> Self {
        Self {
            server: ServerConfig {
                name: "test".into(),
                bind: "127.0.0.1:0".into(),
            },
            db_path: dir.join("approvals.db"),
            log_level: "info".into(),
            auth: AuthConfig {
                session_ttl_minutes: 60,
                bootstrap_admin: "admin".into(),
                bootstrap_password: Some("admin-pass".into()),
                password_min_len: 6,
            },
        }
    }
}
