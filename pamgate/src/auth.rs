use crate::conversation::{NoTokens, TokenSource};
use crate::error::{Error, Outcome, Rejection, Result};
use crate::relay::CredentialRelay;
use crate::transaction::{Backend, LibPam, Session};
use pamgate_config::ConfigError;
use pamgate_protocol::{PamStatus, ResultCode, ServiceConfig};
use tracing::{debug, error, info, warn};

/// Runs authenticate, change-credential and account-status operations
/// against one PAM service.
///
/// All credential-bearing operations share a single [`CredentialRelay`], so
/// they run one after another even when called from several threads.
#[derive(Debug)]
pub struct Authenticator<B = LibPam> {
    config: ServiceConfig,
    backend: B,
    relay: CredentialRelay,
}

impl Authenticator<LibPam> {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_backend(config, LibPam)
    }

    /// Build from /etc/pamgate/pamgate.toml
    pub fn from_system_config() -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(pamgate_config::load()?))
    }
}

impl<B: Backend> Authenticator<B> {
    pub fn with_backend(config: ServiceConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            relay: CredentialRelay::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn relay(&self) -> &CredentialRelay {
        &self.relay
    }

    /// Raw account management status, no credential involved
    pub fn account_flags(&self, username: &str) -> Result<PamStatus> {
        let quiet = self.config.quiet_status;
        self.with_session(username, &NoTokens, |session| session.account_status(quiet))
    }

    pub fn account_status(&self, username: &str) -> Outcome {
        let flags = self.account_flags(username).map_err(Rejection::system)?;
        classify_account(flags)
    }

    /// Check a password, gated by the account status before and after
    pub fn authenticate(&self, username: &str, password: &str) -> Outcome {
        self.precheck(username)?;

        match self.check_token(username, password) {
            Ok(true) => {}
            Ok(false) => {
                info!("authentication failed for {}", username);
                return Err(Rejection::new(ResultCode::AuthError, Error::Passphrase));
            }
            Err(e) => {
                error!("authentication error for {}: {}", username, e);
                return Err(Rejection::system(e));
            }
        }

        // Some modules only report expiry once the credential checked out
        let flags = self.account_flags(username).map_err(Rejection::system)?;
        let code = classify_account(flags)?;
        info!("authenticated {}: {}", username, code);
        Ok(code)
    }

    /// Check a password without looking at the account status
    pub fn verify_login_token(&self, username: &str, password: &str) -> Result<()> {
        if self.check_token(username, password)? {
            Ok(())
        } else {
            Err(Error::Passphrase)
        }
    }

    /// Replace `old` with `new`; the old password must authenticate first
    pub fn change_credential(&self, username: &str, old: &str, new: &str) -> Outcome {
        self.precheck(username)?;
        self.warn_if_unverifiable(username);

        let quiet = self.config.quiet;
        let guard = self.relay.acquire(old, Some(new));
        let result = self.with_session(username, &guard, |session| {
            if !session.authenticate(quiet)? {
                return Ok(None);
            }
            guard.stage_next();
            session.change_credential(quiet).map(Some)
        });
        drop(guard);

        match result {
            Ok(Some(status)) => {
                let outcome = classify_change(status);
                match &outcome {
                    Ok(_) => info!("changed password for {}", username),
                    Err(rejection) => info!("password change for {} rejected: {}", username, rejection),
                }
                outcome
            }
            Ok(None) => {
                info!("password change for {}: old password rejected", username);
                Err(Rejection::new(ResultCode::InvalidOldCredential, Error::Passphrase))
            }
            Err(e) => {
                error!("password change error for {}: {}", username, e);
                Err(Rejection::system(e))
            }
        }
    }

    fn precheck(&self, username: &str) -> std::result::Result<(), Rejection> {
        let flags = self.account_flags(username).map_err(|e| {
            warn!("account status query for {} failed: {}", username, e);
            Rejection::system(e)
        })?;

        classify_account(flags).map(|_| ()).inspect_err(|rejection| {
            info!("rejecting {} before authentication: {}", username, rejection);
        })
    }

    fn check_token(&self, username: &str, password: &str) -> Result<bool> {
        self.warn_if_unverifiable(username);

        let quiet = self.config.quiet;
        let guard = self.relay.acquire(password, None);
        self.with_session(username, &guard, |session| session.authenticate(quiet))
    }

    fn warn_if_unverifiable(&self, username: &str) {
        if !pamgate_config::can_verify(username) {
            warn!(
                "not running as root or as {}, PAM may be unable to check the password",
                username
            );
        }
    }

    /// Open a session, run `op`, close the session whatever `op` returned
    fn with_session<T>(
        &self,
        username: &str,
        tokens: &dyn TokenSource,
        op: impl FnOnce(&mut dyn Session) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.backend.open(&self.config.service, username, tokens)?;
        let result = op(&mut *session);
        session.close();
        debug!("closed pam session for {}", username);
        result
    }
}

/// Map an account management status to an outcome.
///
/// Only `SUCCESS`, `NEW_AUTHTOK_REQD` and `AUTHTOK_EXPIRED` leave the account
/// usable. An expired account is always a hard rejection.
pub fn classify_account(flags: PamStatus) -> Outcome {
    match flags {
        PamStatus::Success => Ok(ResultCode::Success),
        PamStatus::NewAuthTokReqd | PamStatus::AuthTokExpired => Ok(ResultCode::PasswordExpired),
        PamStatus::UserUnknown | PamStatus::AuthInfoUnavail => {
            Err(Rejection::new(ResultCode::UnknownUser, Error::Account(flags)))
        }
        PamStatus::AcctExpired => Err(Rejection::new(ResultCode::AccountExpired, Error::Account(flags))),
        other => Err(Rejection::new(ResultCode::UnknownFlag, Error::UnknownFlag(other))),
    }
}

/// Map a `pam_chauthtok` status to an outcome
pub fn classify_change(status: PamStatus) -> Outcome {
    match status {
        PamStatus::Success => Ok(ResultCode::Success),
        PamStatus::AuthErr | PamStatus::AuthTokRecoveryErr => Err(Rejection::new(
            ResultCode::InvalidOldCredential,
            Error::OldCredential(status),
        )),
        PamStatus::AuthTokErr
        | PamStatus::TryAgain
        | PamStatus::AuthTokLockBusy
        | PamStatus::AuthTokDisableAging => Err(Rejection::new(
            ResultCode::CredentialUpdateError,
            Error::CredentialUpdate(status),
        )),
        other => Err(Rejection::system(Error::UnknownFlag(other))),
    }
}
