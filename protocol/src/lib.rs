use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// PAM service used when the configuration does not name one
pub const DEFAULT_SERVICE: &str = "pamgate";

/// Label printed for any code that has no known mapping
pub const UNKNOWN_RESULT: &str = "unknown result";

/// Return codes of the Linux-PAM client library.
///
/// `from_raw` is total: anything outside the documented range lands in
/// `Unknown` instead of being coerced into one of the known codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PamStatus {
    Success,
    OpenErr,
    SymbolErr,
    ServiceErr,
    SystemErr,
    BufErr,
    PermDenied,
    AuthErr,
    CredInsufficient,
    AuthInfoUnavail,
    UserUnknown,
    MaxTries,
    NewAuthTokReqd,
    AcctExpired,
    SessionErr,
    CredUnavail,
    CredExpired,
    CredErr,
    NoModuleData,
    ConvErr,
    AuthTokErr,
    AuthTokRecoveryErr,
    AuthTokLockBusy,
    AuthTokDisableAging,
    TryAgain,
    Ignore,
    Abort,
    AuthTokExpired,
    ModuleUnknown,
    BadItem,
    ConvAgain,
    Incomplete,
    Unknown(i32),
}

const KNOWN_STATUSES: [(PamStatus, &str); 32] = [
    (PamStatus::Success, "SUCCESS"),
    (PamStatus::OpenErr, "OPEN_ERR"),
    (PamStatus::SymbolErr, "SYMBOL_ERR"),
    (PamStatus::ServiceErr, "SERVICE_ERR"),
    (PamStatus::SystemErr, "SYSTEM_ERR"),
    (PamStatus::BufErr, "BUF_ERR"),
    (PamStatus::PermDenied, "PERM_DENIED"),
    (PamStatus::AuthErr, "AUTH_ERR"),
    (PamStatus::CredInsufficient, "CRED_INSUFFICIENT"),
    (PamStatus::AuthInfoUnavail, "AUTHINFO_UNAVAIL"),
    (PamStatus::UserUnknown, "USER_UNKNOWN"),
    (PamStatus::MaxTries, "MAXTRIES"),
    (PamStatus::NewAuthTokReqd, "NEW_AUTHTOK_REQD"),
    (PamStatus::AcctExpired, "ACCT_EXPIRED"),
    (PamStatus::SessionErr, "SESSION_ERR"),
    (PamStatus::CredUnavail, "CRED_UNAVAIL"),
    (PamStatus::CredExpired, "CRED_EXPIRED"),
    (PamStatus::CredErr, "CRED_ERR"),
    (PamStatus::NoModuleData, "NO_MODULE_DATA"),
    (PamStatus::ConvErr, "CONV_ERR"),
    (PamStatus::AuthTokErr, "AUTHTOK_ERR"),
    (PamStatus::AuthTokRecoveryErr, "AUTHTOK_RECOVERY_ERR"),
    (PamStatus::AuthTokLockBusy, "AUTHTOK_LOCK_BUSY"),
    (PamStatus::AuthTokDisableAging, "AUTHTOK_DISABLE_AGING"),
    (PamStatus::TryAgain, "TRY_AGAIN"),
    (PamStatus::Ignore, "IGNORE"),
    (PamStatus::Abort, "ABORT"),
    (PamStatus::AuthTokExpired, "AUTHTOK_EXPIRED"),
    (PamStatus::ModuleUnknown, "MODULE_UNKNOWN"),
    (PamStatus::BadItem, "BAD_ITEM"),
    (PamStatus::ConvAgain, "CONV_AGAIN"),
    (PamStatus::Incomplete, "INCOMPLETE"),
];

impl PamStatus {
    pub fn from_raw(raw: i32) -> Self {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| KNOWN_STATUSES.get(idx))
            .map_or(PamStatus::Unknown(raw), |(status, _)| *status)
    }

    pub fn as_raw(self) -> i32 {
        match self {
            PamStatus::Unknown(raw) => raw,
            known => KNOWN_STATUSES
                .iter()
                .position(|(status, _)| *status == known)
                .map_or(-1, |idx| idx as i32),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PamStatus::Unknown(_) => UNKNOWN_RESULT,
            known => KNOWN_STATUSES
                .iter()
                .find(|(status, _)| *status == known)
                .map_or(UNKNOWN_RESULT, |(_, label)| *label),
        }
    }

    pub fn is_success(self) -> bool {
        self == PamStatus::Success
    }
}

impl fmt::Display for PamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PamStatus::Unknown(raw) => write!(f, "{} ({})", UNKNOWN_RESULT, raw),
            known => f.write_str(known.label()),
        }
    }
}

/// Outcome of a high-level operation, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    #[error("success")]
    Success,
    #[error("system error")]
    SystemError,
    #[error("unknown user")]
    UnknownUser,
    #[error("authentication error")]
    AuthError,
    /// Authenticated, but the password must be changed
    #[error("password expired")]
    PasswordExpired,
    #[error("account expired")]
    AccountExpired,
    #[error("unknown flag on account")]
    UnknownFlag,
    #[error("credential update error")]
    CredentialUpdateError,
    #[error("invalid old credential")]
    InvalidOldCredential,
}

const RESULT_CODES: [ResultCode; 9] = [
    ResultCode::Success,
    ResultCode::SystemError,
    ResultCode::UnknownUser,
    ResultCode::AuthError,
    ResultCode::PasswordExpired,
    ResultCode::AccountExpired,
    ResultCode::UnknownFlag,
    ResultCode::CredentialUpdateError,
    ResultCode::InvalidOldCredential,
];

impl ResultCode {
    pub fn from_raw(raw: i32) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| RESULT_CODES.get(idx).copied())
    }

    pub fn as_raw(self) -> i32 {
        RESULT_CODES
            .iter()
            .position(|code| *code == self)
            .map_or(-1, |idx| idx as i32)
    }

    /// Label for a raw code, falling back to "unknown result"
    pub fn describe(raw: i32) -> String {
        Self::from_raw(raw).map_or_else(|| UNKNOWN_RESULT.to_string(), |code| code.to_string())
    }

    /// Codes a caller may treat as a successful login
    pub fn is_authenticated(self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::PasswordExpired)
    }
}

/// Service settings (declarative, loaded from TOML)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// PAM service name, selects /etc/pam.d/<service>
    #[serde(default = "default_service")]
    pub service: String,
    /// Pass PAM_SILENT to authenticate and chauthtok
    #[serde(default)]
    pub quiet: bool,
    /// Pass PAM_SILENT to account status queries
    #[serde(default = "default_quiet_status")]
    pub quiet_status: bool,
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_quiet_status() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            quiet: false,
            quiet_status: default_quiet_status(),
        }
    }
}

impl ServiceConfig {
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }
}
