use std::collections::HashMap;

use tracing::{info, warn};

use super::user::User;
use crate::config::AuthConfig;
use crate::error::StartupError;
use crate::security::{secret_kind, SecretKind};
use crate::storage::{RecordId, SnapshotBackend};

/// Table the directory is loaded from.
pub const USER_TABLE: &str = "user";

/// Immutable snapshot of known users, built once at startup.
///
/// Usernames are matched case-sensitively.
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_id: HashMap<RecordId, User>,
    by_username: HashMap<String, RecordId>,
}

impl UserDirectory {
    /// Read the `user` table once. Any failure here is fatal to startup: a missing
    /// table is an error, not an empty directory.
    pub fn load(backend: &dyn SnapshotBackend, cfg: &AuthConfig) -> Result<Self, StartupError> {
        let records = backend.load(USER_TABLE)?;
        let mut users = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let user = User::from_record(record).map_err(|reason| StartupError::MalformedUser { index, reason })?;
            users.push(user);
        }
        let plaintext: Vec<&str> = users
            .iter()
            .filter(|u| secret_kind(u.secret()) == SecretKind::Plaintext)
            .map(|u| u.username.as_str())
            .collect();
        if !plaintext.is_empty() {
            if !cfg.allow_plaintext_secrets {
                return Err(StartupError::PlaintextSecret(plaintext[0].to_string()));
            }
            warn!(target: "recordkeep::auth", "{} user(s) have plaintext secrets; store Argon2 hashes instead", plaintext.len());
        }
        let dir = Self::from_users(users)?;
        info!(target: "recordkeep::auth", "user directory loaded users={}", dir.len());
        Ok(dir)
    }

    pub fn from_users(users: Vec<User>) -> Result<Self, StartupError> {
        let mut dir = Self::default();
        for user in users {
            if dir.by_id.contains_key(&user.id) {
                return Err(StartupError::DuplicateId(user.id.to_string()));
            }
            if dir.by_username.contains_key(&user.username) {
                return Err(StartupError::DuplicateUsername(user.username.clone()));
            }
            dir.by_username.insert(user.username.clone(), user.id.clone());
            dir.by_id.insert(user.id.clone(), user);
        }
        Ok(dir)
    }

    pub fn by_username(&self, username: &str) -> Option<&User> {
        self.by_username.get(username).and_then(|id| self.by_id.get(id))
    }

    pub fn by_id(&self, id: &RecordId) -> Option<&User> { self.by_id.get(id) }

    pub fn len(&self) -> usize { self.by_id.len() }

    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }
}
