use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTimeError;

use thiserror::Error;

pub type CertResult<T> = Result<T, CertError>;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error("failed to decrypt private key: {0}")]
    Decryption(String),
    #[error("invalid issuance request: {0}")]
    Validation(String),
    #[error("operation requires a {0}, but none is held")]
    State(&'static str),
    #[error("openssl operation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
    #[error("TLS config build failed: {0}")]
    ConfigBuild(#[from] rustls::Error),
    #[error("system clock is set before the Unix epoch: {0}")]
    Clock(#[from] SystemTimeError),
    #[error("certificate pool lock poisoned")]
    LockPoisoned,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl CertError {
    pub(crate) fn parse(what: &'static str, detail: impl ToString) -> Self {
        Self::Parse {
            what,
            detail: detail.to_string(),
        }
    }
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CertError + '_ {
    move |source| CertError::Io {
        path: path.to_path_buf(),
        source,
    }
}
