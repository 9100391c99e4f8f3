use pamgate_protocol::{PamStatus, ResultCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to start PAM transaction for service {service}: {message}")]
    Start {
        service: String,
        status: PamStatus,
        message: String,
    },
    #[error("{call} failed: {message}")]
    Native {
        call: &'static str,
        status: PamStatus,
        message: String,
    },
    #[error("embedded nul byte in {0}")]
    Nul(&'static str),
    #[error("account rejected: {0}")]
    Account(PamStatus),
    #[error("unknown flag on account: {0}")]
    UnknownFlag(PamStatus),
    #[error("incorrect login passphrase")]
    Passphrase,
    #[error("old credential rejected: {0}")]
    OldCredential(PamStatus),
    #[error("new credential rejected: {0}")]
    CredentialUpdate(PamStatus),
}

impl Error {
    /// Native status carried by this error, if any
    pub fn status(&self) -> Option<PamStatus> {
        match self {
            Error::Start { status, .. } | Error::Native { status, .. } => Some(*status),
            Error::Account(status)
            | Error::UnknownFlag(status)
            | Error::OldCredential(status)
            | Error::CredentialUpdate(status) => Some(*status),
            Error::Nul(_) | Error::Passphrase => None,
        }
    }
}

/// A failed operation: the code to report and the reason behind it
#[derive(Debug, Error)]
#[error("{code}: {reason}")]
pub struct Rejection {
    pub code: ResultCode,
    #[source]
    pub reason: Error,
}

impl Rejection {
    pub fn new(code: ResultCode, reason: Error) -> Self {
        Self { code, reason }
    }

    /// Any lower-level failure is reported as a system error
    pub fn system(reason: Error) -> Self {
        Self::new(ResultCode::SystemError, reason)
    }
}

/// Result of a high-level operation
pub type Outcome = std::result::Result<ResultCode, Rejection>;

pub type Result<T> = std::result::Result<T, Error>;
