pub mod controller;
mod decode_loop;
pub mod device;
pub mod error;
pub mod observer;
pub mod state;
pub mod validation;

#[cfg(test)]
mod tests;

pub use controller::{ScanSession, ScanSnapshot, STREAM_ENDED_MESSAGE};
pub use device::{
    select_device, ActiveStream, CameraHandle, CameraLease, DecodeEvent, DecodingFacility,
    DeviceChoice, VideoInputDevice,
};
pub use error::{DeviceError, ScanError};
pub use observer::{ChannelObserver, ScanEvent, ScanObserver};
pub use state::{ScanState, SessionState};
pub use validation::{IdentifierRules, Rejection};
