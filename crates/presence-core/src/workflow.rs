//! Per-operation workflow state machines.
//!
//! Every [`Operation`] runs its own machine:
//!
//! ```text
//! Idle ──submit──▶ Submitting ──▶ Success(msg) | Failure(msg) ──dismiss──▶ Idle
//! ```
//!
//! Preconditions are checked before leaving `Idle`; a failed check raises a
//! local alert and never reaches the network. A submission for an operation
//! that is already `Submitting` is rejected as busy. Remote failures are
//! always converted into a notification, never returned as errors. A
//! finished workflow whose message is pushed out of the slot by another
//! workflow's message is back in `Idle`.

use crate::download::Downloader;
use crate::notification::NotificationChannel;
use crate::service::{AttendanceService, ErrorBody, ServiceError};
use crate::types::{DateRange, ImageCapture, NotificationMessage, Operation, UserIdentity};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const GENERIC_FAILURE: &str = "An error occurred.";
const REGISTER_REQUIRED: &str = "Please enter User ID and select an image.";
const IMAGE_REQUIRED: &str = "Please select an image.";
const RANGE_REQUIRED: &str = "Please select a date range.";
const RANGE_REVERSED: &str = "Start date must not be after end date.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Submitting,
    Success(String),
    Failure(String),
}

/// Which workflow a staged capture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    Register,
    Attendance,
}

/// How a submission attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failure,
    /// Preconditions failed; no request was issued.
    Invalid,
    /// The same operation was already submitting; no request was issued.
    Busy,
    /// The operator backed out; nothing was issued or shown.
    Aborted,
}

enum Begin {
    Started(ImageCapture),
    MissingImage,
    Busy,
}

#[derive(Default)]
struct Board {
    states: HashMap<Operation, WorkflowState>,
    staged: HashMap<CaptureTarget, ImageCapture>,
}

impl Board {
    fn is_submitting(&self, op: Operation) -> bool {
        self.states.get(&op) == Some(&WorkflowState::Submitting)
    }

    fn mark_submitting(&mut self, op: Operation) {
        self.states.insert(op, WorkflowState::Submitting);
        tracing::debug!(operation = ?op, "submitting");
    }
}

/// Sequences acquisition, submission and notification for all five
/// workflows.
pub struct WorkflowController<S, D> {
    service: S,
    downloader: D,
    notifications: NotificationChannel,
    board: Mutex<Board>,
}

impl<S, D> WorkflowController<S, D>
where
    S: AttendanceService,
    D: Downloader,
{
    pub fn new(service: S, downloader: D) -> Self {
        Self {
            service,
            downloader,
            notifications: NotificationChannel::new(),
            board: Mutex::new(Board::default()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    pub fn state(&self, operation: Operation) -> WorkflowState {
        self.board()
            .states
            .get(&operation)
            .cloned()
            .unwrap_or(WorkflowState::Idle)
    }

    /// Stage a capture for a workflow, superseding any earlier one.
    pub fn stage(&self, target: CaptureTarget, capture: ImageCapture) {
        tracing::debug!(?target, ?capture, "capture staged");
        if self.board().staged.insert(target, capture).is_some() {
            tracing::debug!(?target, "previous capture superseded");
        }
    }

    pub fn has_staged(&self, target: CaptureTarget) -> bool {
        self.board().staged.contains_key(&target)
    }

    /// Dismiss the live notification and return its workflow to `Idle`.
    pub fn dismiss(&self) -> Option<NotificationMessage> {
        let message = self.notifications.dismiss()?;
        self.settle(message.operation);
        Some(message)
    }

    /// Register the staged capture under `identity`.
    pub async fn register(&self, identity: &str) -> Completion {
        let op = Operation::Register;
        let identity = UserIdentity::from_input(identity);
        if identity.is_empty() {
            return self.alert(op, REGISTER_REQUIRED);
        }
        let capture = match self.begin_with_image(op, CaptureTarget::Register) {
            Begin::Started(capture) => capture,
            Begin::MissingImage => return self.alert(op, REGISTER_REQUIRED),
            Begin::Busy => return self.busy(op),
        };

        tracing::info!(user_id = %identity, source = ?capture.source(), "register submitted");
        let result = self.service.register(&identity, &capture).await;
        drop(capture);

        match result {
            Ok(message) => self.succeed(op, message),
            Err(e) => self.fail(op, &e, ErrorBody::error_first),
        }
    }

    /// Identify the staged probe image, then log attendance for whoever it
    /// resolved to. The second call is issued only after the first succeeds.
    pub async fn identify_and_log(&self) -> Completion {
        let op = Operation::IdentifyAndLog;
        let capture = match self.begin_with_image(op, CaptureTarget::Attendance) {
            Begin::Started(capture) => capture,
            Begin::MissingImage => return self.alert(op, IMAGE_REQUIRED),
            Begin::Busy => return self.busy(op),
        };

        tracing::info!(source = ?capture.source(), "predict submitted");
        let predicted = self.service.predict(&capture).await;
        drop(capture);

        let identity = match predicted {
            Ok(identity) => identity,
            Err(e) => return self.fail(op, &e, ErrorBody::message_first),
        };
        tracing::info!(user_id = %identity, "identity resolved; recording attendance");

        match self.service.record_attendance(&identity).await {
            Ok(()) => self.succeed(op, format!("Attendance logged for user: {identity}")),
            Err(e) => self.fail(op, &e, ErrorBody::message_first),
        }
    }

    /// Fetch the report for `[from, to]` and hand it to the downloader.
    pub async fn generate_report(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Completion {
        let op = Operation::Report;
        let (Some(from), Some(to)) = (from, to) else {
            return self.alert(op, RANGE_REQUIRED);
        };
        let Ok(range) = DateRange::new(from, to) else {
            return self.alert(op, RANGE_REVERSED);
        };
        if !self.begin(op) {
            return self.busy(op);
        }

        tracing::info!(from = %range.start_param(), to = %range.end_param(), "report requested");
        let csv = match self.service.generate_report(&range).await {
            Ok(csv) => csv,
            Err(e) => return self.fail(op, &e, ErrorBody::error_first),
        };

        match self.downloader.trigger_download(&csv, &range.report_file_name()) {
            Ok(path) => self.succeed(op, format!("Attendance report saved to {}", path.display())),
            Err(e) => {
                tracing::warn!(error = %e, "report download failed");
                self.finish(
                    NotificationMessage::failure(op, format!("Could not save attendance report: {e}")),
                    Completion::Failure,
                )
            }
        }
    }

    pub async fn list_users(&self) -> Completion {
        let op = Operation::ListUsers;
        if !self.begin(op) {
            return self.busy(op);
        }

        match self.service.list_users().await {
            Ok(users) => {
                let ids: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
                tracing::info!(count = ids.len(), "users listed");
                self.succeed(op, format!("Registered Users:\n{}", ids.join("\n")))
            }
            Err(e) => self.fail(op, &e, ErrorBody::error_first),
        }
    }

    /// Delete the user named by the operator's confirmation input. Empty or
    /// cancelled input aborts silently.
    pub async fn delete_user(&self, confirmation: Option<&str>) -> Completion {
        let op = Operation::DeleteUser;
        let identity = UserIdentity::from_input(confirmation.unwrap_or_default());
        if identity.is_empty() {
            tracing::debug!("delete aborted: no confirmation");
            return Completion::Aborted;
        }
        if !self.begin(op) {
            return self.busy(op);
        }

        tracing::info!(user_id = %identity, "delete submitted");
        match self.service.delete_user(&identity).await {
            Ok(()) => self.succeed(op, format!("User {identity} deleted successfully.")),
            Err(e) => self.fail(op, &e, ErrorBody::error_first),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leave `Idle` for `Submitting`. False when `op` is already submitting.
    fn begin(&self, op: Operation) -> bool {
        let mut board = self.board();
        if board.is_submitting(op) {
            return false;
        }
        board.mark_submitting(op);
        true
    }

    /// Like [`Self::begin`], also taking the capture staged for `target`.
    /// The capture stays staged when the transition is refused.
    fn begin_with_image(&self, op: Operation, target: CaptureTarget) -> Begin {
        let mut board = self.board();
        if !board.staged.contains_key(&target) {
            return Begin::MissingImage;
        }
        if board.is_submitting(op) {
            return Begin::Busy;
        }
        let Some(capture) = board.staged.remove(&target) else {
            return Begin::MissingImage;
        };
        board.mark_submitting(op);
        Begin::Started(capture)
    }

    /// Return a finished workflow to `Idle` once its message is gone.
    fn settle(&self, op: Operation) {
        if let Some(state) = self.board().states.get_mut(&op) {
            if matches!(state, WorkflowState::Success(_) | WorkflowState::Failure(_)) {
                *state = WorkflowState::Idle;
            }
        }
    }

    /// Put `message` in the slot. A message it pushes out counts as
    /// dismissed for the workflow that produced it.
    fn publish(&self, message: NotificationMessage) {
        let superseded = self
            .notifications
            .current()
            .map(|live| live.operation)
            .filter(|op| *op != message.operation);
        if let Some(op) = superseded {
            tracing::debug!(operation = ?op, "notification superseded");
            self.settle(op);
        }
        self.notifications.show(message);
    }

    fn succeed(&self, op: Operation, body: impl Into<String>) -> Completion {
        self.finish(NotificationMessage::success(op, body), Completion::Success)
    }

    fn fail(
        &self,
        op: Operation,
        error: &ServiceError,
        detail: fn(&ErrorBody) -> Option<&str>,
    ) -> Completion {
        tracing::warn!(operation = ?op, %error, "remote call failed");
        let body = error
            .body()
            .and_then(detail)
            .unwrap_or(GENERIC_FAILURE)
            .to_string();
        self.finish(NotificationMessage::failure(op, body), Completion::Failure)
    }

    fn finish(&self, message: NotificationMessage, completion: Completion) -> Completion {
        let state = match completion {
            Completion::Success => WorkflowState::Success(message.body.clone()),
            _ => WorkflowState::Failure(message.body.clone()),
        };
        tracing::debug!(operation = ?message.operation, ?state, "finished");
        self.board().states.insert(message.operation, state);
        self.publish(message);
        completion
    }

    fn alert(&self, op: Operation, body: &str) -> Completion {
        tracing::debug!(operation = ?op, body, "precondition failed");
        self.publish(NotificationMessage::alert(op, body));
        Completion::Invalid
    }

    fn busy(&self, op: Operation) -> Completion {
        tracing::debug!(operation = ?op, "rejected: already submitting");
        self.publish(NotificationMessage::alert(
            op,
            format!("{} is already in progress.", op.label()),
        ));
        Completion::Busy
    }
}
