use crate::conversation::{TokenConversation, TokenSource};
use crate::error::{Error, Result};
use pam_client::{Context, ErrorCode, Flag};
use pamgate_protocol::PamStatus;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One open conversation with the PAM stack for a single user.
///
/// Every native call happens between `Backend::open` and `close`. Dropping a
/// session closes it as well.
pub trait Session {
    /// `Ok(false)` means the stack cleanly rejected the credential
    fn authenticate(&mut self, quiet: bool) -> Result<bool>;

    /// Raw status of the credential update
    fn change_credential(&mut self, quiet: bool) -> Result<PamStatus>;

    /// Raw account management status (usable, expired, must change password)
    fn account_status(&mut self, quiet: bool) -> Result<PamStatus>;

    /// End the transaction. Teardown errors are logged and discarded.
    fn close(self: Box<Self>);
}

/// Something that can open PAM transactions
pub trait Backend: Send + Sync {
    fn open<'a>(
        &self,
        service: &str,
        username: &str,
        tokens: &'a dyn TokenSource,
    ) -> Result<Box<dyn Session + 'a>>;
}

/// The system libpam
#[derive(Debug, Default, Clone, Copy)]
pub struct LibPam;

impl Backend for LibPam {
    fn open<'a>(
        &self,
        service: &str,
        username: &str,
        tokens: &'a dyn TokenSource,
    ) -> Result<Box<dyn Session + 'a>> {
        let transaction = PamTransaction::start(service, username, tokens).inspect_err(|e| {
            if let (Error::Start { .. }, Some(path)) = (e, missing_service_file(service)) {
                warn!("{} does not exist, PAM falls back to the \"other\" policy", path.display());
            }
        })?;
        Ok(Box::new(transaction))
    }
}

/// The policy file for `service`, when it is not there
fn missing_service_file(service: &str) -> Option<PathBuf> {
    let path = pamgate_config::service_file(service);
    (!path.exists()).then_some(path)
}

fn status_of(err: &pam_client::Error) -> PamStatus {
    PamStatus::from_raw(err.code() as i32)
}

/// A started libpam transaction; `pam_end` runs when it is dropped
pub struct PamTransaction<'a> {
    context: Context<TokenConversation<'a>>,
    service: String,
}

impl<'a> PamTransaction<'a> {
    pub fn start(service: &str, username: &str, tokens: &'a dyn TokenSource) -> Result<Self> {
        if service.contains('\0') {
            return Err(Error::Nul("service name"));
        }
        if username.contains('\0') {
            return Err(Error::Nul("username"));
        }

        let context = Context::new(service, Some(username), TokenConversation::new(tokens))
            .map_err(|e| Error::Start {
                service: service.to_string(),
                status: status_of(&e),
                message: e.to_string(),
            })?;

        debug!("started pam transaction service={} user={}", service, username);
        Ok(Self {
            context,
            service: service.to_string(),
        })
    }
}

fn native_error(call: &'static str, err: &pam_client::Error) -> Error {
    Error::Native {
        call,
        status: status_of(err),
        message: err.to_string(),
    }
}

/// Flags for calls where `PAM_SILENT` is the only one that applies
fn flags(quiet: bool) -> Flag {
    if quiet { Flag::SILENT } else { Flag::NONE }
}

/// Status of a call whose outcome the caller maps itself
fn status(result: pam_client::Result<()>) -> PamStatus {
    match result {
        Ok(()) => PamStatus::Success,
        Err(e) => status_of(&e),
    }
}

impl Session for PamTransaction<'_> {
    fn authenticate(&mut self, quiet: bool) -> Result<bool> {
        match self.context.authenticate(Flag::DISALLOW_NULL_AUTHTOK | flags(quiet)) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ErrorCode::AUTH_ERR => Ok(false),
            Err(e) => Err(native_error("pam_authenticate", &e)),
        }
    }

    fn change_credential(&mut self, quiet: bool) -> Result<PamStatus> {
        Ok(status(self.context.chauthtok(flags(quiet))))
    }

    fn account_status(&mut self, quiet: bool) -> Result<PamStatus> {
        Ok(status(self.context.acct_mgmt(flags(quiet))))
    }

    fn close(self: Box<Self>) {
        debug!("ending pam transaction service={}", self.service);
    }
}
