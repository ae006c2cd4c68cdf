use serde::Serialize;
use tokio::sync::mpsc;

use super::state::ScanState;

/// Receives everything a scanner session reports. Callbacks run after the
/// session lock is released and must not block.
pub trait ScanObserver: Send + Sync {
    /// Called exactly once per session, after the camera is stopped.
    fn on_accept(&self, identifier: &str);

    /// Transient or terminal error text for the user.
    fn on_error(&self, message: &str);

    /// The session reached `Closed` through `close()`.
    fn on_close(&self);

    fn on_state_changed(&self, _state: ScanState) {}

    /// The transient message expired.
    fn on_message_cleared(&self) {}
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanEvent {
    Accepted { identifier: String },
    Error { message: String },
    Closed,
    StateChanged { state: ScanState },
    MessageCleared,
}

/// Forwards callbacks as [`ScanEvent`]s over an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ScanEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ScanObserver for ChannelObserver {
    fn on_accept(&self, identifier: &str) {
        self.send(ScanEvent::Accepted {
            identifier: identifier.to_string(),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(ScanEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_close(&self) {
        self.send(ScanEvent::Closed);
    }

    fn on_state_changed(&self, state: ScanState) {
        self.send(ScanEvent::StateChanged { state });
    }

    fn on_message_cleared(&self) {
        self.send(ScanEvent::MessageCleared);
    }
}
