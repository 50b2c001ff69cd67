use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by the sidecar and the licensing service.
///
/// Every fallible operation in the crate returns one of these variants so
/// the API layer can map it to a status code without inspecting strings.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("vault is locked")]
    VaultLocked,

    #[error("vault file is corrupt: {0}")]
    VaultCorrupt(String),

    #[error("missing X-Requested-With header")]
    CsrfRejected,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("all seats are in use")]
    SeatsExhausted,

    #[error("this machine has already used its free trial")]
    TrialUsed,

    #[error("license signature is invalid")]
    InvalidSignature,

    #[error("license has expired")]
    Expired,

    #[error("license was issued for a different machine")]
    WrongMachine,

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("degraded: {0}")]
    Degraded(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl Error {
    /// HTTP status the external router should answer with.
    ///
    /// License verification failures are client-actionable rejections
    /// (renew, reactivate, contact support), not server faults, so they
    /// sit with the other 403s rather than under 500.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::Conflict(_) => 400,
            Error::WrongPassphrase
            | Error::VaultLocked
            | Error::CsrfRejected
            | Error::InvalidSignature
            | Error::Expired
            | Error::WrongMachine => 403,
            Error::NotFound(_) => 404,
            Error::SeatsExhausted | Error::TrialUsed => 409,
            Error::RateLimited { .. } => 429,
            Error::VaultCorrupt(_) | Error::Degraded(_) | Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable name, used as the `error_type` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::WrongPassphrase => "wrong_passphrase",
            Error::VaultLocked => "vault_locked",
            Error::VaultCorrupt(_) => "vault_corrupt",
            Error::CsrfRejected => "csrf_rejected",
            Error::Conflict(_) => "conflict",
            Error::NotFound(_) => "not_found",
            Error::SeatsExhausted => "seats_exhausted",
            Error::TrialUsed => "trial_used",
            Error::InvalidSignature => "invalid_signature",
            Error::Expired => "expired",
            Error::WrongMachine => "wrong_machine",
            Error::RateLimited { .. } => "rate_limited",
            Error::Degraded(_) => "degraded",
            Error::Internal(_) => "internal",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            detail: self.to_string(),
        }
    }

    /// Log the error with structured fields. Only `Internal` carries its
    /// source chain into the log output.
    pub fn log(&self) {
        match self {
            Error::Internal(source) => {
                tracing::error!(error_type = self.kind(), exception = ?source, "internal error");
            }
            other => {
                tracing::warn!(error_type = other.kind(), detail = %other, "request failed");
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Internal(anyhow::Error::new(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(anyhow::Error::new(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
