use crate::capture::CaptureError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Upload,
    Camera,
}

/// A single still image ready for submission.
///
/// The payload is never empty and the mime type is always `image/*`;
/// [`ImageCapture::new`] is the only way to build one.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageCapture {
    payload: Vec<u8>,
    mime: String,
    file_name: String,
    source: ImageSource,
}

impl ImageCapture {
    pub fn new(
        payload: Vec<u8>,
        mime: impl Into<String>,
        file_name: impl Into<String>,
        source: ImageSource,
    ) -> Result<Self, CaptureError> {
        let mime = mime.into();
        if payload.is_empty() {
            return Err(CaptureError::EmptyPayload);
        }
        if !is_image_mime(&mime) {
            return Err(CaptureError::NotAnImage(mime));
        }
        Ok(Self {
            payload,
            mime,
            file_name: file_name.into(),
            source,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// File name sent alongside the payload in multipart bodies.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for ImageCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageCapture")
            .field("bytes", &self.payload.len())
            .field("mime", &self.mime)
            .field("file_name", &self.file_name)
            .field("source", &self.source)
            .finish()
    }
}

pub(crate) fn is_image_mime(mime: &str) -> bool {
    mime.strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Opaque identifier naming a registered person.
///
/// Uniqueness is the remote service's business. Identities from the service
/// are kept byte for byte; only operator input is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity typed by the operator, with surrounding whitespace removed.
    pub fn from_input(input: &str) -> Self {
        Self(input.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the registered-users listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    pub user_id: UserIdentity,
}

/// Inclusive calendar-date range for attendance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
#[error("start date {from} is after end date {to}")]
pub struct DateRangeError {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DateRangeError> {
        if from > to {
            return Err(DateRangeError { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// `start_date` query value, `YYYY-MM-DD`.
    pub fn start_param(&self) -> String {
        self.from.format("%Y-%m-%d").to_string()
    }

    /// `end_date` query value, `YYYY-MM-DD`.
    pub fn end_param(&self) -> String {
        self.to.format("%Y-%m-%d").to_string()
    }

    pub fn report_file_name(&self) -> String {
        format!(
            "attendance_report_{}_to_{}.csv",
            self.start_param(),
            self.end_param()
        )
    }
}

/// The five operator-triggered workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Register,
    IdentifyAndLog,
    Report,
    ListUsers,
    DeleteUser,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Register,
        Operation::IdentifyAndLog,
        Operation::Report,
        Operation::ListUsers,
        Operation::DeleteUser,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Operation::Register => "Registration",
            Operation::IdentifyAndLog => "Attendance logging",
            Operation::Report => "Report generation",
            Operation::ListUsers => "User listing",
            Operation::DeleteUser => "User deletion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Whether a message was raised locally (validation, busy) or reflects a
/// remote exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// The operator-facing result of one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub operation: Operation,
    pub outcome: Outcome,
    pub origin: Origin,
    pub body: String,
}

impl NotificationMessage {
    pub fn success(operation: Operation, body: impl Into<String>) -> Self {
        Self {
            operation,
            outcome: Outcome::Success,
            origin: Origin::Remote,
            body: body.into(),
        }
    }

    pub fn failure(operation: Operation, body: impl Into<String>) -> Self {
        Self {
            operation,
            outcome: Outcome::Failure,
            origin: Origin::Remote,
            body: body.into(),
        }
    }

    /// A blocking local alert; never the result of a network exchange.
    pub fn alert(operation: Operation, body: impl Into<String>) -> Self {
        Self {
            operation,
            outcome: Outcome::Failure,
            origin: Origin::Local,
            body: body.into(),
        }
    }

    pub fn is_alert(&self) -> bool {
        self.origin == Origin::Local
    }
}
