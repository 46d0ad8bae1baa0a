use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Well-known ARM error codes.
pub mod code {
    pub const CONFLICT: &str = "Conflict";
    pub const INTERNAL_SERVER_ERROR: &str = "InternalServerError";
    pub const INVALID_PARAMETER: &str = "InvalidParameter";
    pub const INVALID_REQUEST_CONTENT: &str = "InvalidRequestContent";
    pub const INVALID_RESOURCE_TYPE: &str = "InvalidResourceType";
    pub const INVALID_SUBSCRIPTION_STATE: &str = "InvalidSubscriptionState";
    pub const NOT_FOUND: &str = "NotFound";
    pub const PROPERTY_CHANGE_NOT_ALLOWED: &str = "PropertyChangeNotAllowed";
    pub const REQUEST_NOT_ALLOWED: &str = "RequestNotAllowed";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "UnsupportedMediaType";
}

/// The error kinds returned by the frontend API.
///
/// Each kind is chosen where the failure is detected; the HTTP layer only renders it.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation or resource does not exist, or belongs to a different subscription.
    #[error("the entity was not found")]
    NotFound,

    /// The document store rejected a write made against a stale version.
    #[error("precondition failed: the document was modified concurrently")]
    PreconditionFailed,

    /// Conflicting writes persisted through every retry.
    #[error("conflicting writes persisted after {attempts} attempts")]
    Conflict { attempts: usize },

    /// The request is not permitted in the resource's or subscription's current state, or is
    /// otherwise invalid.
    #[error(transparent)]
    InvalidState(CloudError),

    /// Any other failure. The detail is logged and never returned to clients.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// An ARM error: a status code and the body returned to clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudError {
    pub status: StatusCode,
    pub body: CloudErrorBody,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
}

// === impl Error ===

impl Error {
    /// Builds a 400 error naming the offending target.
    pub fn bad_request(code: &str, target: &str, message: impl Into<String>) -> Self {
        Self::InvalidState(CloudError::new(StatusCode::BAD_REQUEST, code, target, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidState(e) => e.status,
            Self::PreconditionFailed | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error as presented to API clients.
    ///
    /// Internal errors (including unrecovered precondition failures) are generalized so that
    /// store-specific detail never leaves the process.
    pub fn to_cloud_error(&self) -> CloudError {
        match self {
            Self::NotFound => CloudError::new(
                StatusCode::NOT_FOUND,
                code::NOT_FOUND,
                "",
                "The entity was not found.",
            ),
            Self::Conflict { .. } => CloudError::new(
                StatusCode::CONFLICT,
                code::CONFLICT,
                "",
                "The resource was modified concurrently. Retry the request.",
            ),
            Self::InvalidState(e) => e.clone(),
            Self::PreconditionFailed | Self::Internal(_) => CloudError::internal(),
        }
    }
}

// === impl CloudError ===

impl CloudError {
    pub fn new(status: StatusCode, code: &str, target: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: CloudErrorBody {
                code: code.to_string(),
                message: message.into(),
                target: target.to_string(),
            },
        }
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            code::INTERNAL_SERVER_ERROR,
            "",
            "Internal server error.",
        )
    }

    /// Rebuilds the error for a body persisted without its status code.
    pub fn from_body(body: CloudErrorBody) -> Self {
        Self {
            status: body.status(),
            body,
        }
    }
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}: {}",
            self.status.as_u16(),
            self.body.code,
            self.body.target,
            self.body.message
        )
    }
}

impl std::error::Error for CloudError {}

impl Serialize for CloudError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            error: &'a CloudErrorBody,
        }
        Envelope { error: &self.body }.serialize(serializer)
    }
}

// === impl CloudErrorBody ===

impl CloudErrorBody {
    /// The status a persisted error is replayed with. Operation records store only the body, so
    /// the status is recovered from the code.
    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            code::INTERNAL_SERVER_ERROR => StatusCode::INTERNAL_SERVER_ERROR,
            code::NOT_FOUND => StatusCode::NOT_FOUND,
            code::CONFLICT => StatusCode::CONFLICT,
            code::UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
