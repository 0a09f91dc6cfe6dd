use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid OTP secret (base32): {0}")]
    InvalidSecret(String),

    #[error("unsupported OTP algorithm '{0}', expected SHA1/SHA256/SHA512")]
    UnsupportedAlgorithm(String),

    #[error("unsupported otpauth type '{0}', only 'totp' is supported")]
    UnsupportedType(String),

    #[error("otpauth URL missing 'secret' param")]
    MissingSecret,

    #[error("invalid otpauth URL: {0}")]
    InvalidUri(String),

    #[error("invalid OTP parameters: {0}")]
    InvalidParameters(String),

    #[error("service name cannot be empty")]
    InvalidName,

    #[error("no service named '{0}'")]
    NotFound(String),

    #[error("cannot generate code for '{name}': {source}")]
    CodeGenerationFailed {
        name: String,
        #[source]
        source: Box<AuthError>,
    },

    #[error("cannot write registry {}: {source}", path.display())]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
