//! presence-client — HTTP implementation of [`AttendanceService`].
//!
//! Each operation is exactly one request against the remote attendance
//! backend. Transport failures, non-2xx responses and unexpected 2xx bodies
//! map onto [`ServiceError::Network`], [`ServiceError::Server`] and
//! [`ServiceError::MalformedResponse`]. There are no retries.

use presence_core::{
    AttendanceService, DateRange, ErrorBody, ImageCapture, ServiceError, UserIdentity, UserRecord,
};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Deserialize)]
struct PredictBody {
    user_id: String,
}

#[derive(Deserialize)]
struct UsersBody {
    users: Vec<UserRecord>,
}

#[derive(Serialize)]
struct UserIdBody<'a> {
    user_id: &'a str,
}

/// Typed client for the attendance backend.
#[derive(Debug, Clone)]
pub struct RemoteServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteServiceClient {
    /// Build a client for `base_url` (absolute `http`/`https` URL).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("presence/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", parsed.scheme())));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".into()));
        }

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Send one request. Non-2xx statuses become `ServiceError::Server`.
    async fn send(&self, endpoint: &'static str, request: RequestBuilder) -> Result<Response, ServiceError> {
        tracing::debug!(endpoint, "request issued");
        let response = request.send().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "no response");
            ServiceError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(endpoint, status = status.as_u16(), "response received");
            return Ok(response);
        }

        // The error body is best effort; an unreadable one still reports the status.
        let raw = response.bytes().await.unwrap_or_default();
        let body = serde_json::from_slice::<ErrorBody>(&raw).unwrap_or_default();
        tracing::warn!(
            endpoint,
            status = status.as_u16(),
            error = ?body.error_first(),
            "request rejected"
        );
        Err(ServiceError::Server {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(endpoint: &'static str, response: Response) -> Result<T, ServiceError> {
        let raw = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| {
            tracing::warn!(endpoint, error = %e, "unexpected response body");
            ServiceError::MalformedResponse(format!("{endpoint}: {e}"))
        })
    }
}

fn image_part(image: &ImageCapture) -> Result<Part, ServiceError> {
    Part::bytes(image.payload().to_vec())
        .file_name(image.file_name().to_string())
        .mime_str(image.mime())
        .map_err(|e| ServiceError::Network(format!("request not sent: {e}")))
}

impl AttendanceService for RemoteServiceClient {
    async fn register(
        &self,
        identity: &UserIdentity,
        image: &ImageCapture,
    ) -> Result<String, ServiceError> {
        let form = Form::new()
            .text("user_id", identity.as_str().to_string())
            .part("images", image_part(image)?);
        let request = self.http.post(self.endpoint("register")).multipart(form);

        let response = self.send("register", request).await?;
        let body: MessageBody = Self::json("register", response).await?;
        tracing::info!(user_id = %identity, "registered");
        Ok(body.message)
    }

    async fn predict(&self, image: &ImageCapture) -> Result<UserIdentity, ServiceError> {
        let form = Form::new().part("image", image_part(image)?);
        let request = self.http.post(self.endpoint("predict")).multipart(form);

        let response = self.send("predict", request).await?;
        let body: PredictBody = Self::json("predict", response).await?;
        if body.user_id.trim().is_empty() {
            return Err(ServiceError::MalformedResponse(
                "predict: empty user_id".into(),
            ));
        }
        let identity = UserIdentity::new(body.user_id);
        tracing::info!(user_id = %identity, "predicted");
        Ok(identity)
    }

    async fn record_attendance(&self, identity: &UserIdentity) -> Result<(), ServiceError> {
        let request = self
            .http
            .post(self.endpoint("attendance"))
            .json(&UserIdBody {
                user_id: identity.as_str(),
            });
        // Acknowledgement only; the body is not inspected.
        self.send("attendance", request).await?;
        tracing::info!(user_id = %identity, "attendance recorded");
        Ok(())
    }

    async fn generate_report(&self, range: &DateRange) -> Result<Vec<u8>, ServiceError> {
        let request = self.http.get(self.endpoint("attendance_report")).query(&[
            ("start_date", range.start_param()),
            ("end_date", range.end_param()),
        ]);

        let response = self.send("attendance_report", request).await?;
        let csv = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        tracing::info!(bytes = csv.len(), "report received");
        Ok(csv.to_vec())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, ServiceError> {
        let request = self.http.get(self.endpoint("list_users"));
        let response = self.send("list_users", request).await?;
        let body: UsersBody = Self::json("list_users", response).await?;
        Ok(body.users)
    }

    async fn delete_user(&self, identity: &UserIdentity) -> Result<(), ServiceError> {
        let request = self
            .http
            .delete(self.endpoint("delete_user"))
            .json(&UserIdBody {
                user_id: identity.as_str(),
            });
        self.send("delete_user", request).await?;
        tracing::info!(user_id = %identity, "user deleted");
        Ok(())
    }
}
