//! presence-hw — Camera access for single-shot face captures.
//!
//! Probes for a V4L2 capture device once at startup and opens short-lived
//! sessions that grab one frame and release the device.

pub mod camera;
pub mod frame;

pub use camera::{list_devices, probe, Camera, CameraError, CameraSession, DeviceInfo, PixelFormat};
pub use frame::Frame;
