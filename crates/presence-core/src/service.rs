//! The remote attendance service boundary.
//!
//! Recognition, matching and storage all happen remotely; the client sees
//! six request/response exchanges that either yield a typed payload or one
//! of three failure kinds.

use crate::types::{DateRange, ImageCapture, UserIdentity, UserRecord};
use serde::Deserialize;
use thiserror::Error;

/// Structured error body returned with non-2xx responses.
///
/// Both fields are optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// `error` if present, else `message`.
    pub fn error_first(&self) -> Option<&str> {
        non_empty(&self.error).or_else(|| non_empty(&self.message))
    }

    /// `message` if present, else `error`.
    pub fn message_first(&self) -> Option<&str> {
        non_empty(&self.message).or_else(|| non_empty(&self.error))
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// No response was received.
    #[error("network error: {0}")]
    Network(String),
    /// A response arrived with a non-success status.
    #[error("server responded with status {status}")]
    Server { status: u16, body: ErrorBody },
    /// Success status, but the body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ServiceError {
    /// The server's structured error body, when there is one.
    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            ServiceError::Server { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// The six remote operations. One call is one exchange: no retries, no
/// pagination.
#[allow(async_fn_in_trait)]
pub trait AttendanceService {
    /// Enroll `image` under `identity`; returns the server's confirmation.
    async fn register(
        &self,
        identity: &UserIdentity,
        image: &ImageCapture,
    ) -> Result<String, ServiceError>;

    /// Resolve the identity shown in a probe image.
    async fn predict(&self, image: &ImageCapture) -> Result<UserIdentity, ServiceError>;

    async fn record_attendance(&self, identity: &UserIdentity) -> Result<(), ServiceError>;

    /// CSV bytes of the attendance report for `range`.
    async fn generate_report(&self, range: &DateRange) -> Result<Vec<u8>, ServiceError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, ServiceError>;

    async fn delete_user(&self, identity: &UserIdentity) -> Result<(), ServiceError>;
}
