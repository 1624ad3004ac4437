//! Error types for mailtree

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The provider rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The provider could not be reached (network, DNS, timeout).
    #[error("provider unreachable: {0}")]
    Connectivity(String),

    /// The provider returned a malformed or unexpected response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A remote flag update was rejected; local state was left unchanged.
    #[error("local state error: {0}")]
    LocalState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, Error>;
