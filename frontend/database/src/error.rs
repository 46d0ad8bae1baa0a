use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by a document store client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("document not found")]
    NotFound,

    /// A conditional write was made against a stale etag.
    #[error("precondition failed")]
    PreconditionFailed,

    /// A document with the same key already exists.
    #[error("document already exists")]
    Conflict,

    #[error("key {0:?} is not lower case")]
    InvalidKey(String),

    /// Precondition failures persisted through every retry.
    #[error("precondition failed after {attempts} attempts")]
    RetriesExhausted { attempts: usize },

    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

// === impl Error ===

impl Error {
    /// The HTTP status the store reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PreconditionFailed | Self::RetriesExhausted { .. } => 412,
            Self::InvalidKey(_) => 400,
            Self::Unavailable(_) => 503,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<Error> for rp_frontend_core::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound => Self::NotFound,
            Error::PreconditionFailed => Self::PreconditionFailed,
            Error::RetriesExhausted { attempts } => Self::Conflict { attempts },
            error => Self::Internal(error.into()),
        }
    }
}
