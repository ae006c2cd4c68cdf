use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::scanner::{
    ActiveStream, CameraHandle, DecodeEvent, DecodingFacility, DeviceChoice, DeviceError,
    VideoInputDevice,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error};

const FRAME_BUFFER: usize = 32;

/// A decoding facility whose single "camera" yields one decoded frame per
/// input line. Blank lines stand for frames with no QR code in view.
///
/// Lets the scanner run headless, fed from stdin or a pasted dump of
/// decoded payloads.
pub struct LineFeedFacility<R> {
    reader: Mutex<Option<R>>,
    device: VideoInputDevice,
}

impl<R> LineFeedFacility<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            device: VideoInputDevice {
                device_id: "line-feed".into(),
                label: label.into(),
            },
        }
    }
}

struct LineFeedCamera {
    label: String,
    cancel_token: CancellationToken,
}

impl CameraHandle for LineFeedCamera {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl<R> DecodingFacility for LineFeedFacility<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn request_permission(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn video_input_devices(&self) -> Result<Vec<VideoInputDevice>, DeviceError> {
        Ok(vec![self.device.clone()])
    }

    async fn start_decoding(&self, choice: DeviceChoice) -> Result<ActiveStream, DeviceError> {
        if let DeviceChoice::Device(device) = &choice {
            if device.device_id != self.device.device_id {
                return Err(DeviceError::NotFound);
            }
        }

        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| DeviceError::Other("line feed is already in use".into()))?;

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let cancel_token = CancellationToken::new();
        tokio::spawn(feed_lines(reader, tx, cancel_token.clone()));

        Ok(ActiveStream {
            frames: rx,
            camera: Box::new(LineFeedCamera {
                label: self.device.label.clone(),
                cancel_token,
            }),
        })
    }
}

async fn feed_lines<R>(reader: R, tx: mpsc::Sender<DecodeEvent>, cancel_token: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => DecodeEvent::NoCodeInFrame,
                Ok(Some(line)) => DecodeEvent::Decoded(line),
                Ok(None) => {
                    log_debug!("line feed reached end of input");
                    break;
                }
                Err(err) => {
                    log_error!("line feed read failed: {}", err);
                    let _ = tx.send(DecodeEvent::ReaderFailure(err.to_string())).await;
                    break;
                }
            },
        };

        if tx.send(event).await.is_err() {
            break;
        }
    }
}
