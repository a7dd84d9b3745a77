use std::sync::Arc;

use tracing::{debug, info};

use super::directory::UserDirectory;
use super::user::User;
use crate::error::{AuthError, AuthResult};
use crate::security;
use crate::storage::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    Rejected,
}

/// Hook consulted around every login attempt, e.g. for rate limiting or lockout.
///
/// `check` runs before any credential work; returning an error refuses the attempt.
/// `record` runs after verification with the outcome.
pub trait LoginGate: Send + Sync {
    fn check(&self, username: &str) -> AuthResult<()>;

    fn record(&self, _username: &str, _outcome: LoginOutcome) {}
}

/// Gate that admits every attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl LoginGate for OpenGate {
    fn check(&self, _username: &str) -> AuthResult<()> { Ok(()) }
}

/// Verifies credentials against the user directory and resolves session identities.
#[derive(Clone)]
pub struct AuthService {
    directory: Arc<UserDirectory>,
    gate: Arc<dyn LoginGate>,
}

impl AuthService {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self { directory, gate: Arc::new(OpenGate) }
    }

    pub fn with_gate(mut self, gate: Arc<dyn LoginGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn directory(&self) -> &UserDirectory { &self.directory }

    /// Case-sensitive username lookup followed by a constant-time secret check.
    /// Unknown usernames and wrong passwords produce the same error after the same
    /// amount of hashing work: one Argon2 verification, whatever the stored secret kind.
    pub fn authenticate(&self, username: &str, password: &str) -> AuthResult<User> {
        debug!(target: "recordkeep::auth", "login received user='{}'", username);
        self.gate.check(username)?;

        debug!(target: "recordkeep::auth", "login verifying user='{}'", username);
        let verified = match self.directory.by_username(username) {
            Some(user) if security::verify_secret(user.secret(), password) => Some(user.clone()),
            Some(_) => None,
            None => {
                security::verify_against_dummy(password);
                None
            }
        };

        match verified {
            Some(user) => {
                self.gate.record(username, LoginOutcome::Authenticated);
                info!(target: "recordkeep::auth", "login authenticated user='{}' id={}", username, user.id);
                Ok(user)
            }
            None => {
                self.gate.record(username, LoginOutcome::Rejected);
                info!(target: "recordkeep::auth", "login rejected user='{}'", username);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// In-memory lookup used to rehydrate a session; never touches storage.
    pub fn find_by_id(&self, id: &RecordId) -> AuthResult<User> {
        self.directory.by_id(id).cloned().ok_or(AuthError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn service() -> AuthService {
        let dir = UserDirectory::from_users(vec![
            User::new(1, "alice", "wonderland"),
            User::new(2, "carol", security::hash_password("argon-secret").unwrap()),
        ])
        .unwrap();
        AuthService::new(Arc::new(dir))
    }

    #[test]
    fn alice_authenticates_with_correct_secret() {
        let user = service().authenticate("alice", "wonderland").unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.id, RecordId::Int(1));
    }

    #[test]
    fn wrong_secret_and_unknown_user_are_indistinguishable() {
        let svc = service();
        assert_eq!(svc.authenticate("alice", "nope").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(svc.authenticate("bob", "wonderland").unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn username_is_case_sensitive() {
        assert_eq!(service().authenticate("Alice", "wonderland").unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn argon2_users_authenticate() {
        let svc = service();
        assert!(svc.authenticate("carol", "argon-secret").is_ok());
        assert!(svc.authenticate("carol", "argon-secreT").is_err());
    }

    #[test]
    fn find_by_id_normalizes_ids() {
        let svc = service();
        assert_eq!(svc.find_by_id(&RecordId::parse("1")).unwrap().username, "alice");
        assert_eq!(svc.find_by_id(&RecordId::Int(99)).unwrap_err(), AuthError::NotFound);
    }

    #[test]
    fn plaintext_wrong_password_costs_as_much_as_unknown_user() {
        use std::time::{Duration, Instant};
        let dir = UserDirectory::from_users(vec![User::new(1, "alice", "wonderland")]).unwrap();
        let svc = AuthService::new(Arc::new(dir));
        // Warm the dummy hash so neither side pays for its creation.
        let _ = svc.authenticate("nobody", "x");

        let time = |user: &str| {
            let t = Instant::now();
            for _ in 0..5 {
                assert!(svc.authenticate(user, "not-the-password").is_err());
            }
            t.elapsed()
        };
        let known = time("alice");
        let unknown = time("bob");
        let (fast, slow) = if known < unknown { (known, unknown) } else { (unknown, known) };
        assert!(
            fast * 4 >= slow && fast > Duration::from_micros(500),
            "known user {:?} vs unknown user {:?}",
            known,
            unknown
        );
    }

    #[derive(Default)]
    struct CountingGate {
        seen: Mutex<Vec<(String, LoginOutcome)>>,
        blocked: Vec<String>,
    }

    impl LoginGate for CountingGate {
        fn check(&self, username: &str) -> AuthResult<()> {
            if self.blocked.iter().any(|b| b == username) { Err(AuthError::Throttled) } else { Ok(()) }
        }

        fn record(&self, username: &str, outcome: LoginOutcome) {
            self.seen.lock().push((username.to_string(), outcome));
        }
    }

    #[test]
    fn gate_sees_outcomes_and_can_refuse() {
        let gate = Arc::new(CountingGate { blocked: vec!["carol".into()], ..Default::default() });
        let svc = service().with_gate(gate.clone());
        assert!(svc.authenticate("alice", "wonderland").is_ok());
        assert!(svc.authenticate("alice", "bad").is_err());
        assert_eq!(svc.authenticate("carol", "argon-secret").unwrap_err(), AuthError::Throttled);
        let seen = gate.seen.lock().clone();
        assert_eq!(seen, vec![
            ("alice".to_string(), LoginOutcome::Authenticated),
            ("alice".to_string(), LoginOutcome::Rejected),
        ]);
    }
}
