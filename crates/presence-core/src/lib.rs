//! presence-core — Capture-and-submit workflow engine for face attendance.
//!
//! Normalizes uploaded files and camera frames into one image payload,
//! drives one state machine per operator operation, and publishes each
//! outcome to a single-slot notification channel. Recognition, matching
//! and storage live behind the [`AttendanceService`] trait.

pub mod capture;
pub mod download;
pub mod notification;
pub mod service;
pub mod types;
pub mod workflow;

pub use capture::{AcquisitionManager, CameraSupport, CameraSurface, CaptureError};
pub use download::{DirectoryDownloader, DownloadError, Downloader};
pub use notification::NotificationChannel;
pub use service::{AttendanceService, ErrorBody, ServiceError};
pub use types::{
    DateRange, ImageCapture, ImageSource, NotificationMessage, Operation, Origin, Outcome,
    UserIdentity, UserRecord,
};
pub use workflow::{CaptureTarget, Completion, WorkflowController, WorkflowState};
