use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::extract::{extract_payload, IdentifierSource, RawScanPayload};
use crate::settings::ScannerSettings;

use super::decode_loop::decode_loop;
use super::device::{
    select_device, ActiveStream, CameraLease, DecodeEvent, DecodingFacility,
};
use super::error::ScanError;
use super::observer::ScanObserver;
use super::state::{ScanState, SessionState};
use super::validation::Rejection;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Reported through `on_error` when the frame feed closes while scanning.
pub const STREAM_ENDED_MESSAGE: &str = "Camera stream ended unexpectedly";

/// Serializable view of a session, for UIs and diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub session_id: String,
    pub state: ScanState,
    pub last_error: Option<String>,
    pub message: Option<String>,
    pub accepted: Option<String>,
    pub device_label: Option<String>,
    pub rejected_frames: u64,
    pub camera_held: bool,
}

/// What the decode loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FrameOutcome {
    Ignored,
    Rejected,
    Accepted,
    /// The session left `Scanning`; the loop must exit.
    Stopped,
}

struct SessionInner {
    state: SessionState,
    camera: Option<CameraLease>,
    cancel_token: Option<CancellationToken>,
    decode_task: Option<JoinHandle<()>>,
    clear_timer: Option<JoinHandle<()>>,
}

impl SessionInner {
    /// Stop the decode loop and give the camera back. Safe to call twice.
    fn teardown(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Some(lease) = self.camera.take() {
            lease.release();
        }
        if let Some(timer) = self.clear_timer.take() {
            timer.abort();
        }
        self.state.transient_message = None;
    }
}

impl Drop for SessionInner {
    // Last handle gone without close(): stop the loop and free the camera.
    fn drop(&mut self) {
        if self.camera.is_some() {
            log_warn!(
                "Scanner session {} dropped while {}; releasing camera",
                self.state.session_id,
                self.state.status
            );
        }
        self.teardown();
    }
}

/// A camera-owning scanner session.
///
/// Cheap to clone; all clones drive the same session. The session is the
/// only owner of its camera, and the camera is released on every path into
/// `Accepted`, `Closed` or `Error`. Dropping the last handle without calling
/// `close()` also releases it, but reports nothing to the observer.
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<Mutex<SessionInner>>,
    facility: Arc<dyn DecodingFacility>,
    observer: Arc<dyn ScanObserver>,
    settings: Arc<ScannerSettings>,
}

/// Handle held by background tasks so they don't keep the session alive.
pub(super) struct WeakScanSession {
    inner: Weak<Mutex<SessionInner>>,
    facility: Arc<dyn DecodingFacility>,
    observer: Arc<dyn ScanObserver>,
    settings: Arc<ScannerSettings>,
}

impl WeakScanSession {
    pub(super) fn upgrade(&self) -> Option<ScanSession> {
        Some(ScanSession {
            inner: self.inner.upgrade()?,
            facility: self.facility.clone(),
            observer: self.observer.clone(),
            settings: self.settings.clone(),
        })
    }
}

impl ScanSession {
    pub fn new(
        facility: Arc<dyn DecodingFacility>,
        observer: Arc<dyn ScanObserver>,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::new(Uuid::new_v4().to_string()),
                camera: None,
                cancel_token: None,
                decode_task: None,
                clear_timer: None,
            })),
            facility,
            observer,
            settings: Arc::new(settings),
        }
    }

    fn downgrade(&self) -> WeakScanSession {
        WeakScanSession {
            inner: Arc::downgrade(&self.inner),
            facility: self.facility.clone(),
            observer: self.observer.clone(),
            settings: self.settings.clone(),
        }
    }

    pub async fn state(&self) -> ScanState {
        self.inner.lock().await.state.status
    }

    pub async fn snapshot(&self) -> ScanSnapshot {
        let inner = self.inner.lock().await;
        ScanSnapshot {
            session_id: inner.state.session_id.clone(),
            state: inner.state.status,
            last_error: inner.state.last_error.clone(),
            message: inner.state.transient_message.clone(),
            accepted: inner.state.accepted.clone(),
            device_label: inner.state.device_label.clone(),
            rejected_frames: inner.state.rejected_frames,
            camera_held: inner.camera.is_some(),
        }
    }

    /// Acquire a camera and start decoding.
    ///
    /// Allowed from `Idle` and, as a retry, from `Error`. If `close()` runs
    /// while the camera is still being acquired, the camera is released as
    /// soon as it arrives and [`ScanError::Cancelled`] is returned.
    pub async fn open(&self) -> Result<(), ScanError> {
        let (attempt, session_id) = {
            let mut inner = self.inner.lock().await;
            let status = inner.state.status;
            if status.is_terminal() {
                return Err(ScanError::Terminal(status));
            }
            if !inner.state.transition(ScanState::Initializing) {
                return Err(ScanError::AlreadyActive(status));
            }
            (inner.state.begin_attempt(), inner.state.session_id.clone())
        };

        log_info!("Opening scanner session {} (attempt {})", session_id, attempt);
        self.observer.on_state_changed(ScanState::Initializing);

        match self.acquire(attempt).await {
            Ok(stream) => self.start_scanning(attempt, stream).await,
            Err(err) => self.fail_open(attempt, err).await,
        }
    }

    /// Stop scanning and release the camera. No-op once `Accepted` or `Closed`.
    pub async fn close(&self) {
        let decode_task = {
            let mut inner = self.inner.lock().await;
            let status = inner.state.status;
            if status.is_terminal() {
                log_debug!("close() on {} session ignored", status);
                return;
            }
            inner.state.transition(ScanState::Closed);
            inner.teardown();
            log_info!(
                "Scanner session {} closed from {}",
                inner.state.session_id,
                status
            );
            inner.decode_task.take()
        };

        if let Some(handle) = decode_task {
            if let Err(err) = handle.await {
                log_error!("decode loop task failed to join: {}", err);
            }
        }

        self.observer.on_state_changed(ScanState::Closed);
        self.observer.on_close();
    }

    async fn is_current_attempt(&self, attempt: u64) -> bool {
        let inner = self.inner.lock().await;
        inner.state.attempt == attempt && inner.state.status == ScanState::Initializing
    }

    async fn acquire(&self, attempt: u64) -> Result<ActiveStream, ScanError> {
        self.facility.request_permission().await?;
        let devices = self.facility.video_input_devices().await?;
        let choice = select_device(&devices, &self.settings.preferred_camera_keywords);

        // Don't start a camera nobody is waiting for.
        if !self.is_current_attempt(attempt).await {
            return Err(ScanError::Cancelled);
        }

        Ok(self.facility.start_decoding(choice).await?)
    }

    async fn start_scanning(&self, attempt: u64, stream: ActiveStream) -> Result<(), ScanError> {
        let ActiveStream { frames, camera } = stream;
        let lease = CameraLease::new(camera);

        let mut inner = self.inner.lock().await;
        if inner.state.attempt != attempt || !inner.state.transition(ScanState::Scanning) {
            drop(inner);
            log_warn!(
                "Scanner closed while camera '{}' was starting; releasing it",
                lease.label()
            );
            lease.release();
            return Err(ScanError::Cancelled);
        }

        log_info!("Scanning with camera '{}'", lease.label());
        inner.state.device_label = Some(lease.label().to_string());

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(decode_loop(self.downgrade(), frames, cancel_token.clone()));

        inner.camera = Some(lease);
        inner.cancel_token = Some(cancel_token);
        inner.decode_task = Some(handle);
        drop(inner);

        self.observer.on_state_changed(ScanState::Scanning);
        Ok(())
    }

    async fn fail_open(&self, attempt: u64, err: ScanError) -> Result<(), ScanError> {
        if err == ScanError::Cancelled {
            return Err(err);
        }

        let message = err.to_string();
        {
            let mut inner = self.inner.lock().await;
            if inner.state.attempt != attempt || !inner.state.transition(ScanState::Error) {
                return Err(ScanError::Cancelled);
            }
            inner.state.last_error = Some(message.clone());
        }

        log_error!("Failed to open scanner: {}", message);
        self.observer.on_state_changed(ScanState::Error);
        self.observer.on_error(&message);
        Err(err)
    }

    pub(super) async fn handle_frame(&self, event: DecodeEvent) -> FrameOutcome {
        match event {
            DecodeEvent::NoCodeInFrame => FrameOutcome::Ignored,
            DecodeEvent::ReaderFailure(reason) => self.reader_failure(reason).await,
            DecodeEvent::Decoded(text) => {
                let payload = RawScanPayload::new(text);
                let extracted = extract_payload(&payload);
                match self.settings.rules().validate(extracted.value.as_deref()) {
                    Ok(identifier) => self.accept(identifier.to_string(), extracted.source).await,
                    Err(rejection) => self.reject(&payload, rejection).await,
                }
            }
        }
    }

    /// Called when the facility's frame feed ends while the loop is running.
    pub(super) async fn stream_ended(&self) {
        let message = STREAM_ENDED_MESSAGE.to_string();
        {
            let mut inner = self.inner.lock().await;
            if inner.state.status != ScanState::Scanning {
                return;
            }
            inner.state.last_error = Some(message.clone());
            self.show_message(&mut inner, message.clone());
        }
        log_warn!("{}", message);
        self.observer.on_error(&message);
    }

    async fn accept(&self, identifier: String, source: IdentifierSource) -> FrameOutcome {
        {
            let mut inner = self.inner.lock().await;
            if !inner.state.transition(ScanState::Accepted) {
                return FrameOutcome::Stopped;
            }
            inner.state.accepted = Some(identifier.clone());
            inner.teardown();
            // This task is the decode loop; it exits on its own.
            inner.decode_task = None;
        }

        log_info!("Accepted identifier '{}' via {:?}", identifier, source);
        self.observer.on_state_changed(ScanState::Accepted);
        self.observer.on_accept(&identifier);
        FrameOutcome::Accepted
    }

    async fn reject(&self, payload: &RawScanPayload, rejection: Rejection) -> FrameOutcome {
        let message = rejection.to_string();
        {
            let mut inner = self.inner.lock().await;
            if inner.state.status != ScanState::Scanning {
                return FrameOutcome::Stopped;
            }
            inner.state.rejected_frames += 1;
            self.show_message(&mut inner, message.clone());
        }

        log_debug!(
            "Rejected frame at {} ({} chars): {}",
            payload.received_at,
            payload.text.chars().count(),
            message
        );
        self.observer.on_error(&message);
        FrameOutcome::Rejected
    }

    async fn reader_failure(&self, reason: String) -> FrameOutcome {
        let message = format!("Scanner error: {reason}");
        {
            let mut inner = self.inner.lock().await;
            if inner.state.status != ScanState::Scanning {
                return FrameOutcome::Stopped;
            }
            inner.state.last_error = Some(reason);
            self.show_message(&mut inner, message.clone());
        }

        log_warn!("{}", message);
        self.observer.on_error(&message);
        FrameOutcome::Rejected
    }

    /// Show `message` and (re)start its clear timer. A newer message replaces
    /// the old one; the old timer is aborted so it cannot clear the new text.
    fn show_message(&self, inner: &mut SessionInner, message: String) {
        if let Some(timer) = inner.clear_timer.take() {
            timer.abort();
        }
        inner.state.transient_message = Some(message);

        let shared = Arc::downgrade(&self.inner);
        let observer = self.observer.clone();
        let delay = self.settings.transient_message_delay();
        inner.clear_timer = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let cleared = {
                let mut guard = shared.lock().await;
                guard.clear_timer = None;
                guard.state.transient_message.take().is_some()
            };
            if cleared {
                observer.on_message_cleared();
            }
        }));
    }
}
