use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanState {
    /// Constructed, `open()` not yet called.
    Idle,
    Initializing,
    Scanning,
    Accepted,
    Error,
    Closed,
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState::Idle
    }
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Accepted | ScanState::Closed)
    }

    /// Whether a camera may be held in this state.
    pub fn holds_camera(self) -> bool {
        matches!(self, ScanState::Scanning)
    }

    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::{Accepted, Closed, Error, Idle, Initializing, Scanning};

        match (self, next) {
            (Idle, Initializing | Closed) => true,
            (Initializing, Scanning | Error | Closed) => true,
            (Scanning, Scanning | Accepted | Closed) => true,
            (Error, Initializing | Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Initializing => "initializing",
            ScanState::Scanning => "scanning",
            ScanState::Accepted => "accepted",
            ScanState::Error => "in error",
            ScanState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Observable part of a scanner session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: ScanState,
    pub session_id: String,
    /// Bumped on every `open()`; lets a resumed acquisition detect that it
    /// was superseded.
    pub attempt: u64,
    /// Last genuine failure: reader exception or acquisition error.
    pub last_error: Option<String>,
    /// Message currently shown to the user, cleared after a short delay.
    pub transient_message: Option<String>,
    pub accepted: Option<String>,
    pub device_label: Option<String>,
    pub rejected_frames: u64,
}

impl SessionState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            ..Self::default()
        }
    }

    /// Move to `next` if the transition table allows it.
    pub fn transition(&mut self, next: ScanState) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub fn begin_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.last_error = None;
        self.transient_message = None;
        self.device_label = None;
        self.attempt
    }
}
