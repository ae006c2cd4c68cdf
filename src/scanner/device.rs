use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::DeviceError;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoInputDevice {
    pub device_id: String,
    pub label: String,
}

/// Which camera to decode from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChoice {
    Device(VideoInputDevice),
    /// Let the platform pick; used when enumeration returned nothing.
    PlatformDefault,
}

/// Outcome of decoding one video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Decoded(String),
    /// No QR code visible in this frame. Not an error.
    NoCodeInFrame,
    ReaderFailure(String),
}

/// A running camera. `stop` must end every track and detach the stream.
pub trait CameraHandle: Send {
    fn label(&self) -> &str;
    fn stop(&mut self);
}

/// A started decode: the frame feed plus the camera producing it.
pub struct ActiveStream {
    pub frames: mpsc::Receiver<DecodeEvent>,
    pub camera: Box<dyn CameraHandle>,
}

/// The video decoding facility a scanner session drives.
#[async_trait]
pub trait DecodingFacility: Send + Sync {
    async fn request_permission(&self) -> Result<(), DeviceError>;

    async fn video_input_devices(&self) -> Result<Vec<VideoInputDevice>, DeviceError>;

    /// Start decoding. Returns [`DeviceError::NotFound`] when asked for the
    /// platform default and none exists.
    async fn start_decoding(&self, choice: DeviceChoice) -> Result<ActiveStream, DeviceError>;
}

/// Prefer a camera whose label mentions one of `keywords` (rear-facing
/// cameras read tags better), then the first camera, then the platform default.
pub fn select_device(devices: &[VideoInputDevice], keywords: &[String]) -> DeviceChoice {
    let preferred = devices.iter().find(|device| {
        let label = device.label.to_lowercase();
        keywords
            .iter()
            .any(|keyword| label.contains(&keyword.to_lowercase()))
    });

    match preferred.or_else(|| devices.first()) {
        Some(device) => {
            log_debug!("selected camera '{}' ({})", device.label, device.device_id);
            DeviceChoice::Device(device.clone())
        }
        None => {
            log_debug!("no cameras enumerated, falling back to platform default");
            DeviceChoice::PlatformDefault
        }
    }
}

/// Exclusive hold on a camera. Stops the camera when released or dropped,
/// so no path out of a session can leave it running.
pub struct CameraLease {
    camera: Option<Box<dyn CameraHandle>>,
    label: String,
}

impl CameraLease {
    pub fn new(camera: Box<dyn CameraHandle>) -> Self {
        let label = camera.label().to_string();
        Self {
            camera: Some(camera),
            label,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn release(mut self) {
        self.stop_camera();
    }

    fn stop_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
            log_debug!("camera '{}' released", self.label);
        }
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
