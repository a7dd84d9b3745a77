use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::AuthService;
use super::user::User;
use crate::error::AuthResult;
use crate::storage::RecordId;

/// What a session stores about its user: the id and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionIdentity(pub RecordId);

/// Reduces a user to a [`SessionIdentity`] at login and expands it back on every
/// request. Expansion always reads the directory, so the session never holds stale
/// user data.
#[derive(Clone)]
pub struct SessionCodec {
    auth: Arc<AuthService>,
}

impl SessionCodec {
    pub fn new(auth: Arc<AuthService>) -> Self { Self { auth } }

    pub fn reduce(&self, user: &User) -> SessionIdentity { SessionIdentity(user.id.clone()) }

    pub fn expand(&self, identity: &SessionIdentity) -> AuthResult<User> { self.auth.find_by_id(&identity.0) }
}

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub identity: SessionIdentity,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_token() -> SessionToken {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Opaque token -> identity map owned by the HTTP state.
pub struct SessionManager {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, Session>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self { Self { ttl, sessions: RwLock::new(HashMap::new()) } }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn issue(&self, identity: SessionIdentity) -> Session {
        let now = Instant::now();
        let sess = Session {
            token: gen_token(),
            identity,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(sess.token.clone(), sess.clone());
        debug!(target: "recordkeep::session", "session.issue id={} ttl_secs={}", sess.identity.0, self.ttl.as_secs());
        sess
    }

    /// Identity for a live token. Expired sessions are dropped on sight.
    pub fn resolve(&self, token: &str) -> Option<SessionIdentity> {
        let now = Instant::now();
        let expired = {
            let map = self.sessions.read();
            match map.get(token) {
                Some(s) if s.expires_at > now => return Some(s.identity.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.sessions.write().remove(token);
        }
        None
    }

    pub fn revoke(&self, token: &str) -> bool { self.sessions.write().remove(token).is_some() }

    /// Drop every expired session. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.sessions.write();
        let before = map.len();
        map.retain(|_, s| s.expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }
}
