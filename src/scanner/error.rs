use thiserror::Error;

use super::state::ScanState;

/// Failure reported by a decoding facility while acquiring a camera.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

/// Errors returned from [`ScanSession::open`](super::ScanSession::open).
///
/// The first three are also delivered to the observer and leave the session
/// in [`ScanState::Error`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("Camera permission denied. Allow camera access for this app, then reload and try again.")]
    PermissionDenied,
    #[error("No camera found. Connect a camera and try again.")]
    NoCamera,
    #[error("Failed to start camera: {0}")]
    Acquisition(String),
    #[error("scanner is already {0}")]
    AlreadyActive(ScanState),
    #[error("scanner session is {0} and cannot be reopened")]
    Terminal(ScanState),
    #[error("scanner was closed before the camera started")]
    Cancelled,
}

impl From<DeviceError> for ScanError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied => ScanError::PermissionDenied,
            DeviceError::NotFound => ScanError::NoCamera,
            DeviceError::Other(message) => ScanError::Acquisition(message),
        }
    }
}
