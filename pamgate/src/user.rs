use crate::auth::Authenticator;
use crate::error::Result;
use crate::transaction::Backend;
use std::fmt;
use zeroize::Zeroizing;

const NOT_RUN: &str = "authenticate not run yet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Pending,
    Authenticated,
    Rejected(String),
}

/// A username/password pair that remembers whether it checked out
pub struct PamUser {
    username: String,
    password: Zeroizing<String>,
    state: LoginState,
}

impl PamUser {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.to_owned()),
            state: LoginState::Pending,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Replace the password; the previous result no longer applies
    pub fn set_password(&mut self, password: &str) {
        self.password = Zeroizing::new(password.to_owned());
        self.state = LoginState::Pending;
    }

    pub fn authenticate<B: Backend>(&mut self, authenticator: &Authenticator<B>) -> Result<()> {
        let result = authenticator.verify_login_token(&self.username, &self.password);
        self.state = match &result {
            Ok(()) => LoginState::Authenticated,
            Err(e) => LoginState::Rejected(e.to_string()),
        };
        result
    }

    /// Authenticate against the process-wide default service
    pub fn validate(&mut self) -> Result<()> {
        self.authenticate(crate::default_authenticator())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == LoginState::Authenticated
    }

    /// Why the user is not authenticated, `None` once they are
    pub fn reason(&self) -> Option<&str> {
        match &self.state {
            LoginState::Pending => Some(NOT_RUN),
            LoginState::Authenticated => None,
            LoginState::Rejected(reason) => Some(reason.as_str()),
        }
    }
}

impl fmt::Debug for PamUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PamUser")
            .field("username", &self.username)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::auth::tests::{Account, FakePam, init_logging};
    use pamgate_protocol::ServiceConfig;

    fn authenticator() -> Authenticator<FakePam> {
        init_logging();
        let pam = FakePam::default().with_account("testana", Account::new("thisisatest123"));
        Authenticator::with_backend(ServiceConfig::default(), pam)
    }

    #[test]
    fn pending_until_authenticated() {
        let user = PamUser::new("testana", "thisisatest123");
        assert!(!user.is_authenticated());
        assert_eq!(user.reason(), Some("authenticate not run yet"));
    }

    #[test]
    fn successful_authentication() {
        let auth = authenticator();
        let mut user = PamUser::new("testana", "thisisatest123");

        user.authenticate(&auth).unwrap();
        assert!(user.is_authenticated());
        assert_eq!(user.reason(), None);
    }

    #[test]
    fn bad_password_records_reason() {
        let auth = authenticator();
        let mut user = PamUser::new("testana", "thisisatest123");
        user.authenticate(&auth).unwrap();

        user.set_password("BadPass");
        assert_eq!(user.state(), &LoginState::Pending);

        assert!(matches!(user.authenticate(&auth), Err(Error::Passphrase)));
        assert!(!user.is_authenticated());
        assert_eq!(user.reason(), Some("incorrect login passphrase"));
    }

    #[test]
    fn debug_hides_password() {
        let user = PamUser::new("testana", "thisisatest123");
        let shown = format!("{:?}", user);
        assert!(shown.contains("testana"));
        assert!(!shown.contains("thisisatest123"));
    }
}
