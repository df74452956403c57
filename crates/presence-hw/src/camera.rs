//! V4L2 camera capture via the `v4l` crate.
//!
//! The device is held only for the lifetime of a [`CameraSession`]: open it
//! when the capture surface opens, shoot once, and it is gone.

use crate::frame::{self, Frame};
use presence_core::{CameraSupport, CameraSurface};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
/// Frames dropped after stream start while auto-exposure settles.
const WARMUP_FRAMES: usize = 3;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] frame::FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion-JPEG; each buffer is already a complete JPEG image.
    Mjpg,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
}

impl PixelFormat {
    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Mjpg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        // Webcams usually offer MJPG at useful resolutions; YUYV is the
        // universal fallback.
        let mut negotiated = None;
        for wanted in [PixelFormat::Mjpg, PixelFormat::Yuyv] {
            let mut fmt = device.format().map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
            })?;
            fmt.fourcc = wanted.fourcc();
            fmt.width = CAPTURE_WIDTH;
            fmt.height = CAPTURE_HEIGHT;

            let got = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
            if got.fourcc == wanted.fourcc() {
                negotiated = Some((wanted, got));
                break;
            }
        }
        let Some((pixel_format, fmt)) = negotiated else {
            return Err(CameraError::FormatNegotiationFailed(
                "device offers neither MJPG nor YUYV".into(),
            ));
        };

        tracing::info!(
            width = fmt.width,
            height = fmt.height,
            format = ?pixel_format,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: fmt.width,
            height: fmt.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Capture a single frame and return it JPEG-encoded.
    pub fn capture_jpeg(&self) -> Result<Vec<u8>, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        for _ in 0..WARMUP_FRAMES {
            stream
                .next()
                .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        }

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let used = (meta.bytesused as usize).min(buf.len());

        match self.pixel_format {
            PixelFormat::Mjpg => {
                if used == 0 {
                    return Err(CameraError::CaptureFailed("empty MJPG buffer".into()));
                }
                tracing::debug!(seq = meta.sequence, bytes = used, "captured MJPG frame");
                Ok(buf[..used].to_vec())
            }
            PixelFormat::Yuyv => {
                let frame = Frame {
                    data: frame::yuyv_to_rgb(buf, self.width, self.height)?,
                    width: self.width,
                    height: self.height,
                    sequence: meta.sequence,
                };
                tracing::debug!(seq = frame.sequence, "captured YUYV frame");
                Ok(frame.to_jpeg()?)
            }
        }
    }
}

/// An open capture surface holding the camera until it is shot or dropped.
pub struct CameraSession {
    camera: Camera,
}

impl CameraSession {
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        let camera = Camera::open(device_path)?;
        tracing::info!(device = device_path, "camera session opened");
        Ok(Self { camera })
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }
}

impl CameraSurface for CameraSession {
    type Error = CameraError;

    fn screenshot(self) -> Result<Option<String>, CameraError> {
        let jpeg = self.camera.capture_jpeg()?;
        Ok(Some(frame::to_data_url("image/jpeg", &jpeg)))
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        tracing::info!(device = %self.camera.device_path, "camera released");
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card.clone(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
        });
    }

    devices
}

/// One-time startup check for camera-capture capability.
///
/// With an explicit device, support means that device is a video-capture
/// node; otherwise the first capture device found is used.
pub fn probe(enabled: bool, device: Option<&str>) -> CameraSupport {
    if !enabled {
        tracing::info!("camera disabled by configuration");
        return CameraSupport::Unavailable;
    }

    let found = match device {
        Some(path) => {
            let capable = Path::new(path).exists()
                && Device::with_path(path)
                    .and_then(|dev| dev.query_caps())
                    .map(|caps| caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE))
                    .unwrap_or(false);
            capable.then(|| path.to_string())
        }
        None => list_devices().into_iter().next().map(|d| d.path),
    };

    match found {
        Some(device) => {
            tracing::info!(device = %device, "camera available");
            CameraSupport::Available { device }
        }
        None => {
            tracing::info!("no camera available");
            CameraSupport::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_disabled() {
        assert_eq!(probe(false, Some("/dev/video0")), CameraSupport::Unavailable);
    }

    #[test]
    fn test_probe_missing_device() {
        assert_eq!(
            probe(true, Some("/nonexistent/video9")),
            CameraSupport::Unavailable
        );
    }

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/nonexistent/video9"),
            Err(CameraError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(PixelFormat::Mjpg.fourcc(), FourCC::new(b"MJPG"));
        assert_eq!(PixelFormat::Yuyv.fourcc(), FourCC::new(b"YUYV"));
    }
}
