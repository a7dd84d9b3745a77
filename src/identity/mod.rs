//! Identity: the startup-loaded user directory, credential verification and the
//! session identity codec. Keep the public surface thin and split implementation
//! across sub-modules.

mod directory;
mod provider;
mod session;
mod user;

pub use directory::{UserDirectory, USER_TABLE};
pub use provider::{AuthService, LoginGate, LoginOutcome, OpenGate};
pub use session::{Session, SessionCodec, SessionIdentity, SessionManager, SessionToken};
pub use user::User;
