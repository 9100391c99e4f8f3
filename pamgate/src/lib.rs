//! Non-interactive PAM authentication.
//!
//! Checks passwords, reports account status and changes passwords through
//! the system PAM stack, feeding credentials to the PAM conversation from
//! memory instead of a terminal.
//!
//! The service is looked up in `/etc/pam.d/<service>` (`pamgate` unless
//! `/etc/pamgate/pamgate.toml` says otherwise), e.g.:
//!
//! ```text
//! #%PAM-1.0
//! auth       required     pam_sepermit.so
//! auth       substack     password-auth
//! account    include      password-auth
//! password   include      password-auth
//! ```
//!
//! Unless the process runs as root, most module stacks only verify the
//! password of the user running it.
//!
//! # Example
//!
//! ```no_run
//! use pamgate::ResultCode;
//!
//! match pamgate::authenticate("alice", "correct horse") {
//!     Ok(ResultCode::PasswordExpired) => println!("logged in, password must change"),
//!     Ok(_) => println!("logged in"),
//!     Err(rejection) => eprintln!("login failed: {}", rejection),
//! }
//! ```

mod auth;
mod conversation;
mod error;
mod relay;
mod transaction;
mod user;

use std::sync::LazyLock;
use tracing::warn;

pub use crate::auth::{Authenticator, classify_account, classify_change};
pub use crate::conversation::{NoTokens, TokenConversation, TokenSource};
pub use crate::error::{Error, Outcome, Rejection, Result};
pub use crate::relay::{CredentialRelay, RelayGuard};
pub use crate::transaction::{Backend, LibPam, PamTransaction, Session};
pub use crate::user::{LoginState, PamUser};
pub use pamgate_protocol::{PamStatus, ResultCode, ServiceConfig};

static DEFAULT: LazyLock<Authenticator> = LazyLock::new(|| {
    let config = pamgate_config::load().unwrap_or_else(|e| {
        warn!("failed to load {}: {}, using defaults", pamgate_config::CONFIG_PATH, e);
        ServiceConfig::default()
    });
    Authenticator::new(config)
});

/// Process-wide authenticator; its relay serialises every call below
pub fn default_authenticator() -> &'static Authenticator {
    &DEFAULT
}

pub fn authenticate(username: &str, password: &str) -> Outcome {
    DEFAULT.authenticate(username, password)
}

pub fn change_credential(username: &str, old_password: &str, new_password: &str) -> Outcome {
    DEFAULT.change_credential(username, old_password, new_password)
}

pub fn account_status(username: &str) -> Outcome {
    DEFAULT.account_status(username)
}

pub fn account_flags(username: &str) -> Result<PamStatus> {
    DEFAULT.account_flags(username)
}

pub fn verify_login_token(username: &str, password: &str) -> Result<()> {
    DEFAULT.verify_login_token(username, password)
}
