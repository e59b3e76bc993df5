use thiserror::Error;

/// Failures that abort startup. The daemon logs these and exits non-zero;
/// nothing downstream of init ever sees them.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to read secret file {path}: {source}")]
    SecretUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secret file {path} is empty")]
    SecretEmpty { path: String },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("descriptor setup failed: {0}")]
    Descriptor(#[from] std::io::Error),
}

/// Transient failures on the data path. Counted and logged by the caller,
/// never turned into a process-ending error and never retried.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("sendto failed: {0}")]
    Udp(std::io::Error),
    #[error("tap write failed: {0}")]
    Tap(std::io::Error),
}

pub type InitResult<T> = std::result::Result<T, InitError>;
