//! Image acquisition — normalizes file uploads and camera frames into one
//! [`ImageCapture`] shape.
//!
//! Camera frames arrive as `data:<mime>;base64,<payload>` screenshots and are
//! decoded exactly once, at capture time. Camera support is probed once at
//! startup and frozen into the [`AcquisitionManager`].

use crate::types::{is_image_mime, ImageCapture, ImageSource};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use std::path::Path;
use thiserror::Error;

/// Mime type assumed for camera screenshots whose header names none.
const DEFAULT_FRAME_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image payload is empty")]
    EmptyPayload,
    #[error("not an image (detected {0})")]
    NotAnImage(String),
    #[error("camera frame is not a base64 data URL")]
    MalformedFrame,
    #[error("camera frame is not valid base64: {0}")]
    FrameDecode(#[from] base64::DecodeError),
    #[error("camera capture is not available")]
    CameraUnavailable,
    #[error("camera failed: {0}")]
    Camera(String),
}

/// Result of the one-time startup probe for camera-capture capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSupport {
    Available { device: String },
    Unavailable,
}

impl CameraSupport {
    pub fn is_available(&self) -> bool {
        matches!(self, CameraSupport::Available { .. })
    }
}

/// An open camera surface that can yield one screenshot.
///
/// `screenshot` consumes the surface: the device is released on every exit
/// path, including errors and an empty grab. Implementations release in
/// `Drop` so a surface that is never shot is released too.
pub trait CameraSurface {
    type Error: std::fmt::Display;

    fn screenshot(self) -> Result<Option<String>, Self::Error>;
}

/// Turns operator input into submit-ready captures.
#[derive(Debug, Clone)]
pub struct AcquisitionManager {
    camera: CameraSupport,
}

impl AcquisitionManager {
    pub fn new(camera: CameraSupport) -> Self {
        Self { camera }
    }

    pub fn camera_available(&self) -> bool {
        self.camera.is_available()
    }

    pub fn camera(&self) -> &CameraSupport {
        &self.camera
    }

    /// Build a capture from a picked file. No selection is a no-op.
    pub fn from_file(&self, selected: Option<&Path>) -> Result<Option<ImageCapture>, CaptureError> {
        let Some(path) = selected else {
            return Ok(None);
        };

        let payload = std::fs::read(path).map_err(|source| CaptureError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if payload.is_empty() {
            return Err(CaptureError::EmptyPayload);
        }

        let mime = detect_mime(&payload, path)
            .ok_or_else(|| CaptureError::NotAnImage("application/octet-stream".into()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let capture = ImageCapture::new(payload, mime, file_name, ImageSource::Upload)?;
        tracing::debug!(
            path = %path.display(),
            bytes = capture.len(),
            mime = capture.mime(),
            "image selected"
        );
        Ok(Some(capture))
    }

    /// Build a capture from a single camera screenshot (`data:` URL).
    /// A missing or empty frame is a no-op.
    pub fn from_camera_frame(&self, frame: Option<&str>) -> Result<Option<ImageCapture>, CaptureError> {
        let Some(frame) = frame.filter(|f| !f.is_empty()) else {
            return Ok(None);
        };

        let (header, data) = frame.split_once(',').ok_or(CaptureError::MalformedFrame)?;
        let media = header
            .strip_prefix("data:")
            .and_then(|h| h.strip_suffix(";base64"))
            .ok_or(CaptureError::MalformedFrame)?;
        let mime = if is_image_mime(media) {
            media
        } else {
            DEFAULT_FRAME_MIME
        };

        let payload = general_purpose::STANDARD.decode(data.trim())?;
        let file_name = format!("captured_photo.{}", extension_for(mime));
        let capture = ImageCapture::new(payload, mime, file_name, ImageSource::Camera)?;
        tracing::debug!(bytes = capture.len(), mime = capture.mime(), "camera frame decoded");
        Ok(Some(capture))
    }

    /// Take one shot from an open camera surface and normalize it.
    pub fn capture_from_camera<S: CameraSurface>(
        &self,
        surface: S,
    ) -> Result<Option<ImageCapture>, CaptureError> {
        if !self.camera_available() {
            drop(surface);
            return Err(CaptureError::CameraUnavailable);
        }
        let frame = surface
            .screenshot()
            .map_err(|e| CaptureError::Camera(e.to_string()))?;
        self.from_camera_frame(frame.as_deref())
    }
}

/// Content sniffing first, file extension second.
fn detect_mime(payload: &[u8], path: &Path) -> Option<&'static str> {
    image::guess_format(payload)
        .or_else(|_| ImageFormat::from_path(path))
        .ok()
        .map(|format| format.to_mime_type())
        .filter(|mime| is_image_mime(mime))
}

fn extension_for(mime: &str) -> &str {
    match mime {
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        other => other.strip_prefix("image/").unwrap_or("img"),
    }
}
