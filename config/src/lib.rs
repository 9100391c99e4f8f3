use pamgate_protocol::ServiceConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_PATH: &str = "/etc/pamgate/pamgate.toml";

/// Directory the native library looks up service files in
pub const PAM_CONFIG_DIR: &str = "/etc/pam.d";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error in {file}: {error}")]
    Parse { file: PathBuf, error: String },
    #[error("invalid service name {0:?}")]
    InvalidService(String),
}

/// Load the system configuration, falling back to defaults when absent
pub fn load() -> Result<ServiceConfig, ConfigError> {
    load_from_path(Path::new(CONFIG_PATH))
}

/// Load configuration from a specific file
pub fn load_from_path(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        debug!("config file {} does not exist, using defaults", path.display());
        return Ok(ServiceConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = parse(&content, path)?;
    info!("loaded config from {:?}: service={}", path, config.service);
    Ok(config)
}

/// Load configuration from a TOML string
pub fn load_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    parse(content, Path::new("<string>"))
}

fn parse(content: &str, file: &Path) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: file.to_path_buf(),
        error: e.to_string(),
    })?;
    validate_service(&config.service)?;
    Ok(config)
}

/// A service name becomes a file name under /etc/pam.d
pub fn validate_service(service: &str) -> Result<(), ConfigError> {
    let bad = service.is_empty()
        || service == "."
        || service == ".."
        || service.chars().any(|c| c == '/' || c == '\0' || c.is_whitespace());

    if bad {
        return Err(ConfigError::InvalidService(service.to_string()));
    }
    Ok(())
}

/// Path of the PAM policy file a service resolves to
pub fn service_file(service: &str) -> PathBuf {
    Path::new(PAM_CONFIG_DIR).join(service)
}

// --- User helpers ---

pub fn username_from_uid(uid: u32) -> Option<String> {
    users::get_user_by_uid(uid).map(|u| u.name().to_string_lossy().into_owned())
}

pub fn current_username() -> Option<String> {
    username_from_uid(users::get_current_uid())
}

/// Whether this process can have PAM check `username`'s password.
///
/// Modules such as pam_unix only verify other users' passwords when the
/// caller runs as root.
pub fn can_verify(username: &str) -> bool {
    if users::get_effective_uid() == 0 {
        return true;
    }
    current_username().is_some_and(|name| name == username)
}
