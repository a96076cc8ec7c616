//! Credentials: salted password hashing, login and the bootstrap admin.
//!
//! Hash format: `hex(sha256^N(salt || password))` with a random 16-byte salt
//! stored next to it. Digests are compared in constant time.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::store::Store;
use crate::store::users::{NewUser, Role, Session, User};

const SALT_BYTES: usize = 16;
const HASH_ROUNDS: u32 = 10_000;

/// Stored password material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded digest.
    pub hash: String,
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut out: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize()
        .into();
    for _ in 1..HASH_ROUNDS {
        out = Sha256::digest(out).into();
    }
    out
}

pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    PasswordHash {
        salt: hex::encode(salt),
        hash: hex::encode(digest(&salt, password)),
    }
}

pub fn verify_password(password: &str, stored: &PasswordHash) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(&stored.salt), hex::decode(&stored.hash)) else {
        return false;
    };
    let actual = digest(&salt, password);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn check_strength(password: &str, min_len: usize) -> Result<(), AppError> {
    if password.chars().count() < min_len {
        return Err(AppError::Validation(format!(
            "password must be at least {min_len} characters"
        )));
    }
    Ok(())
}

/// Authentication service over the store.
#[derive(Debug, Clone)]
pub struct Auth {
    store: Store,
    config: AuthConfig,
}

impl Auth {
    pub fn new(store: Store, config: AuthConfig) -> Self {
        Self { store, config }
    }

    /// Exchange credentials for a session. Unknown users, wrong passwords
    /// and deactivated accounts fail identically.
    pub fn login(&self, username: &str, password: &str) -> Result<(Session, User), AppError> {
        let rejected = || AppError::Unauthorized("invalid username or password".into());

        let Some((user, stored)) = self.store.user_credentials(username.trim())? else {
            warn!(%username, "login for unknown user");
            return Err(rejected());
        };
        if !verify_password(password, &stored) {
            warn!(user_id = user.id, "login with wrong password");
            return Err(rejected());
        }
        if !user.active {
            warn!(user_id = user.id, "login for inactive user");
            return Err(rejected());
        }

        let session = self.store.create_session(user.id, self.config.session_ttl_minutes)?;
        info!(user_id = user.id, "user logged in");
        Ok((session, user))
    }

    pub fn logout(&self, token: &str) -> Result<(), AppError> {
        self.store.delete_session(token)
    }

    pub fn authenticate(&self, token: &str) -> Result<User, AppError> {
        self.store.session_user(token)
    }

    pub fn create_user(&self, input: &NewUser, password: &str) -> Result<User, AppError> {
        check_strength(password, self.config.password_min_len)?;
        self.store.create_user(input, &hash_password(password))
    }

    pub fn change_password(&self, user: &User, old: &str, new: &str) -> Result<(), AppError> {
        let stored = self.store.password_hash(user.id)?;
        if !verify_password(old, &stored) {
            return Err(AppError::Forbidden("current password does not match".into()));
        }
        check_strength(new, self.config.password_min_len)?;
        self.store.set_password(user.id, &hash_password(new))
    }

    /// Admin reset; no old password required.
    pub fn reset_password(&self, user_id: i64, new: &str) -> Result<(), AppError> {
        check_strength(new, self.config.password_min_len)?;
        self.store.set_password(user_id, &hash_password(new))
    }

    /// Create the configured admin if the database has no users yet.
    /// Returns the new admin, or `None` when nothing was done.
    pub fn bootstrap_admin(&self) -> Result<Option<User>, AppError> {
        if self.store.count_users()? > 0 {
            return Ok(None);
        }
        let Some(password) = self.config.bootstrap_password.as_deref() else {
            warn!("database has no users and APPROVAL_HUB_ADMIN_PASSWORD is unset");
            return Ok(None);
        };
        let admin = self.create_user(
            &NewUser {
                username: self.config.bootstrap_admin.clone(),
                display_name: "Administrator".into(),
                role: Role::Admin,
                department_id: None,
                post_id: None,
            },
            password,
        )?;
        info!(user_id = admin.id, username = %admin.username, "bootstrap admin created");
        Ok(Some(admin))
    }
}
