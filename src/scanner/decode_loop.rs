use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::controller::{FrameOutcome, WeakScanSession};
use super::device::DecodeEvent;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Feed decoded frames to the session, in arrival order, until the session
/// accepts an identifier or leaves `Scanning`, the token is cancelled, or
/// every session handle has been dropped.
pub(super) async fn decode_loop(
    session: WeakScanSession,
    mut frames: mpsc::Receiver<DecodeEvent>,
    cancel_token: CancellationToken,
) {
    let mut frame_count: u64 = 0;

    loop {
        tokio::select! {
            // Cancellation wins over any frames still buffered.
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("decode loop shutting down after {} frames", frame_count);
                break;
            }
            event = frames.recv() => {
                let Some(session) = session.upgrade() else {
                    log_info!("session dropped; decode loop exiting after {} frames", frame_count);
                    break;
                };
                let Some(event) = event else {
                    session.stream_ended().await;
                    break;
                };
                frame_count += 1;

                match session.handle_frame(event).await {
                    FrameOutcome::Ignored | FrameOutcome::Rejected => {}
                    FrameOutcome::Accepted | FrameOutcome::Stopped => {
                        log_debug!("decode loop finished at frame {}", frame_count);
                        break;
                    }
                }
            }
        }
    }
}
