//! Account and connection configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Connection parameters and credentials for one mailbox account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// The account's email address, also used as the login name.
    pub address: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl AccountConfig {
    /// Load account configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `MAIL_ADDRESS`
    /// - `MAIL_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `MAIL_HOST` (default: `127.0.0.1`)
    /// - `MAIL_PORT` (default: `1143`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            address: env::var("MAIL_ADDRESS")
                .map_err(|_| Error::Config("MAIL_ADDRESS not set".into()))?,
            password: env::var("MAIL_PASSWORD")
                .map_err(|_| Error::Config("MAIL_PASSWORD not set".into()))?,
            host: env::var("MAIL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("MAIL_PORT")
                .unwrap_or_else(|_| "1143".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid MAIL_PORT: {e}")))?,
        })
    }
}

/// Load the list of previously-successful accounts from a JSON file.
///
/// The persistence collaborator writes this file after each successful
/// login; at startup the entries are fed one-by-one into
/// [`MailEngine::restore_accounts`](crate::MailEngine::restore_accounts).
/// A missing file yields an empty list.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or
/// parsed.
pub fn load_saved_accounts(path: &Path) -> Result<Vec<AccountConfig>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
}
