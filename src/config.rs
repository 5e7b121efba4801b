use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const CREDENTIALS_FILE: &str = "meteofr_credentials.json";
const HOME_CREDENTIALS_FILE: &str = ".meteofr_credentials.json";

/// Geoservices account, as stored in `{"username": ..., "password": ...}`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let creds = Self {
            username: username.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Reads a JSON credentials file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        let creds: Credentials = serde_json::from_str(&text).map_err(|e| {
            Error::Config(format!(
                "credentials file {} must look like {{\"username\": ..., \"password\": ...}}: {}",
                path.display(),
                e
            ))
        })?;
        creds.validate()?;
        Ok(creds)
    }

    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(Error::Authentication(
                "both username and password should be given".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Account used to obtain a token when none is supplied.
    pub credentials: Option<Credentials>,
    /// Pre-fetched API token; bypasses `GetAPIKey`.
    pub token: Option<String>,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

/// Resolves the client configuration, in order of precedence:
/// - explicit arguments
/// - environment variables `METEOFR_USERNAME` / `METEOFR_PASSWORD` / `METEOFR_TOKEN`
/// - a JSON credentials file (`METEOFR_CREDENTIALS`, `./meteofr_credentials.json`,
///   `~/.meteofr_credentials.json`)
pub fn load_config(
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let username = username.or_else(|| std::env::var("METEOFR_USERNAME").ok());
    let password = password.or_else(|| std::env::var("METEOFR_PASSWORD").ok());
    let token = token
        .or_else(|| std::env::var("METEOFR_TOKEN").ok())
        .filter(|t| !t.trim().is_empty());

    let verify = resolve_verify(verify);

    let credentials = match (username, password) {
        (Some(u), Some(p)) => Some(Credentials::new(u, p)?),
        (Some(_), None) | (None, Some(_)) => {
            return Err(Error::Authentication(
                "both username and password should be given".into(),
            ));
        }
        (None, None) => {
            let candidates = credential_candidates();
            match candidates.iter().find(|p| p.exists()) {
                Some(path) => Some(Credentials::from_json_file(path)?),
                None if token.is_some() => None,
                None => {
                    return Err(Error::Authentication(format!(
                        "missing credentials (set METEOFR_TOKEN, METEOFR_USERNAME/METEOFR_PASSWORD, or create one of: {})",
                        candidates
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }
            }
        }
    };

    Ok(ClientConfig {
        credentials,
        token,
        verify,
    })
}

impl ClientConfig {
    /// Configuration for an explicit credentials file. TLS verification still
    /// follows the argument, then `METEOFR_VERIFY`.
    pub fn from_credentials_file(
        path: &Path,
        token: Option<String>,
        verify: Option<bool>,
    ) -> Result<Self> {
        Ok(Self {
            credentials: Some(Credentials::from_json_file(path)?),
            token: token.filter(|t| !t.trim().is_empty()),
            verify: resolve_verify(verify),
        })
    }
}

fn resolve_verify(verify: Option<bool>) -> bool {
    verify
        .or_else(|| {
            std::env::var("METEOFR_VERIFY")
                .ok()
                .map(|v| v.trim() != "0")
        })
        .unwrap_or(true)
}

fn credential_candidates() -> Vec<PathBuf> {
    if let Ok(p) = std::env::var("METEOFR_CREDENTIALS") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(CREDENTIALS_FILE));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(HOME_CREDENTIALS_FILE));
    }
    v
}
