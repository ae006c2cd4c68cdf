use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time;

use super::controller::FrameOutcome;
use super::{
    ActiveStream, CameraHandle, ChannelObserver, DecodeEvent, DecodingFacility, DeviceChoice,
    DeviceError, ScanError, ScanEvent, ScanSession, ScanState, VideoInputDevice,
};
use crate::settings::ScannerSettings;

struct FakeCamera {
    label: String,
    live: Arc<AtomicUsize>,
    stopped: bool,
}

impl CameraHandle for FakeCamera {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Where a gated facility parks until its gate is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Permission,
    Start,
}

/// Scripted decoding facility that counts live cameras.
struct FakeFacility {
    permission: Result<(), DeviceError>,
    devices: Vec<VideoInputDevice>,
    has_default: bool,
    start_failures: Mutex<Vec<DeviceError>>,
    gate: Option<(Stage, Arc<Notify>)>,
    entered: Arc<Notify>,
    frames: Mutex<Option<mpsc::Receiver<DecodeEvent>>>,
    live: Arc<AtomicUsize>,
    starts: AtomicUsize,
    last_choice: Mutex<Option<DeviceChoice>>,
}

impl FakeFacility {
    fn new(devices: Vec<VideoInputDevice>) -> (Self, mpsc::Sender<DecodeEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let facility = Self {
            permission: Ok(()),
            devices,
            has_default: true,
            start_failures: Mutex::new(Vec::new()),
            gate: None,
            entered: Arc::new(Notify::new()),
            frames: Mutex::new(Some(rx)),
            live: Arc::new(AtomicUsize::new(0)),
            starts: AtomicUsize::new(0),
            last_choice: Mutex::new(None),
        };
        (facility, tx)
    }

    fn deny_permission(mut self) -> Self {
        self.permission = Err(DeviceError::PermissionDenied);
        self
    }

    fn without_default(mut self) -> Self {
        self.has_default = false;
        self
    }

    fn fail_next_start(self, err: DeviceError) -> Self {
        self.start_failures.lock().unwrap().push(err);
        self
    }

    /// Park at `stage` until the gate is notified.
    fn gated(mut self, stage: Stage, gate: Arc<Notify>) -> Self {
        self.gate = Some((stage, gate));
        self
    }

    async fn pass(&self, stage: Stage) {
        if let Some((gated, gate)) = &self.gate {
            if *gated == stage {
                self.entered.notify_one();
                gate.notified().await;
            }
        }
    }

    fn live_cameras(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn last_choice(&self) -> Option<DeviceChoice> {
        self.last_choice.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecodingFacility for FakeFacility {
    async fn request_permission(&self) -> Result<(), DeviceError> {
        self.pass(Stage::Permission).await;
        self.permission.clone()
    }

    async fn video_input_devices(&self) -> Result<Vec<VideoInputDevice>, DeviceError> {
        Ok(self.devices.clone())
    }

    async fn start_decoding(&self, choice: DeviceChoice) -> Result<ActiveStream, DeviceError> {
        self.pass(Stage::Start).await;

        let failure = self.start_failures.lock().unwrap().pop();
        if let Some(err) = failure {
            return Err(err);
        }

        let label = match &choice {
            DeviceChoice::Device(device) => device.label.clone(),
            DeviceChoice::PlatformDefault if self.has_default => "Default camera".to_string(),
            DeviceChoice::PlatformDefault => return Err(DeviceError::NotFound),
        };
        *self.last_choice.lock().unwrap() = Some(choice);

        let frames = self
            .frames
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DeviceError::Other("stream already started".into()))?;

        self.starts.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(ActiveStream {
            frames,
            camera: Box::new(FakeCamera {
                label,
                live: self.live.clone(),
                stopped: false,
            }),
        })
    }
}

fn device(id: &str, label: &str) -> VideoInputDevice {
    VideoInputDevice {
        device_id: id.to_string(),
        label: label.to_string(),
    }
}

fn two_cameras() -> Vec<VideoInputDevice> {
    vec![
        device("front-1", "Front Camera"),
        device("back-1", "Back Camera"),
    ]
}

fn session_with(
    facility: Arc<FakeFacility>,
) -> (ScanSession, mpsc::UnboundedReceiver<ScanEvent>) {
    let (observer, rx) = ChannelObserver::new();
    let session = ScanSession::new(facility, Arc::new(observer), ScannerSettings::default());
    (session, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> ScanEvent {
    time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for scan event")
        .expect("observer channel closed")
}

/// Next event that is not a state change notification.
async fn next_report(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> ScanEvent {
    loop {
        match next_event(rx).await {
            ScanEvent::StateChanged { .. } => continue,
            other => return other,
        }
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn error_event(message: &str) -> ScanEvent {
    ScanEvent::Error {
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_open_prefers_back_camera() {
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());

    session.open().await.unwrap();

    assert_eq!(
        facility.last_choice(),
        Some(DeviceChoice::Device(device("back-1", "Back Camera")))
    );
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Scanning);
    assert_eq!(snapshot.device_label.as_deref(), Some("Back Camera"));
    assert!(snapshot.camera_held);
    assert_eq!(facility.live_cameras(), 1);

    assert_eq!(
        drain(&mut rx),
        vec![
            ScanEvent::StateChanged {
                state: ScanState::Initializing
            },
            ScanEvent::StateChanged {
                state: ScanState::Scanning
            },
        ]
    );

    session.close().await;
}

#[tokio::test]
async fn test_open_uses_platform_default_without_devices() {
    let (facility, _frames) = FakeFacility::new(Vec::new());
    let facility = Arc::new(facility);
    let (session, _rx) = session_with(facility.clone());

    session.open().await.unwrap();

    assert_eq!(facility.last_choice(), Some(DeviceChoice::PlatformDefault));
    assert_eq!(session.state().await, ScanState::Scanning);
    session.close().await;
    assert_eq!(facility.live_cameras(), 0);
}

#[tokio::test]
async fn test_accept_releases_camera_then_reports() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());

    session.open().await.unwrap();
    frames
        .send(DecodeEvent::Decoded(
            r#"{"itemId": "EQ-00123", "name": "Microscope"}"#.into(),
        ))
        .await
        .unwrap();

    assert_eq!(
        next_report(&mut rx).await,
        ScanEvent::Accepted {
            identifier: "EQ-00123".into()
        }
    );
    assert_eq!(facility.live_cameras(), 0);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Accepted);
    assert_eq!(snapshot.accepted.as_deref(), Some("EQ-00123"));
    assert!(!snapshot.camera_held);
    assert_eq!(snapshot.camera_held, snapshot.state.holds_camera());
}

#[tokio::test]
async fn test_accept_happens_once_for_burst_of_frames() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());

    for id in ["EQ-1", "EQ-2", "EQ-3"] {
        frames.send(DecodeEvent::Decoded(id.into())).await.unwrap();
    }
    session.open().await.unwrap();

    assert_eq!(
        next_report(&mut rx).await,
        ScanEvent::Accepted {
            identifier: "EQ-1".into()
        }
    );

    // Late frames reaching the session after acceptance are ignored.
    assert_eq!(
        session
            .handle_frame(DecodeEvent::Decoded("EQ-4".into()))
            .await,
        FrameOutcome::Stopped
    );
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let accepted = drain(&mut rx)
        .into_iter()
        .filter(|event| matches!(event, ScanEvent::Accepted { .. }))
        .count();
    assert_eq!(accepted, 0);
    assert_eq!(session.state().await, ScanState::Accepted);
    assert_eq!(facility.live_cameras(), 0);
}

#[tokio::test]
async fn test_rejections_keep_scanning() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());
    session.open().await.unwrap();

    frames.send(DecodeEvent::Decoded("a".into())).await.unwrap();
    assert_eq!(
        next_report(&mut rx).await,
        error_event("No identifier found in QR code")
    );

    frames
        .send(DecodeEvent::Decoded(r#"{"id": "x"}"#.into()))
        .await
        .unwrap();
    assert_eq!(next_report(&mut rx).await, error_event("Identifier too short"));

    frames
        .send(DecodeEvent::Decoded(r#"{"id": "EQ/001"}"#.into()))
        .await
        .unwrap();
    assert_eq!(
        next_report(&mut rx).await,
        error_event("Identifier contains unsupported characters")
    );

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Scanning);
    assert_eq!(snapshot.rejected_frames, 3);
    assert_eq!(
        snapshot.message.as_deref(),
        Some("Identifier contains unsupported characters")
    );
    // Rejections are not reader failures.
    assert!(snapshot.last_error.is_none());
    assert_eq!(facility.live_cameras(), 1);

    session.close().await;
    assert_eq!(facility.live_cameras(), 0);
}

#[tokio::test]
async fn test_no_code_frames_are_silent() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let (session, mut rx) = session_with(Arc::new(facility));
    session.open().await.unwrap();

    for _ in 0..5 {
        frames.send(DecodeEvent::NoCodeInFrame).await.unwrap();
    }
    frames.send(DecodeEvent::Decoded("EQ-77".into())).await.unwrap();

    assert_eq!(
        next_report(&mut rx).await,
        ScanEvent::Accepted {
            identifier: "EQ-77".into()
        }
    );
    let snapshot = session.snapshot().await;
    assert!(snapshot.last_error.is_none());
    assert_eq!(snapshot.rejected_frames, 0);
}

#[tokio::test]
async fn test_reader_failure_sets_last_error() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let (session, mut rx) = session_with(Arc::new(facility));
    session.open().await.unwrap();

    frames
        .send(DecodeEvent::ReaderFailure("checksum mismatch".into()))
        .await
        .unwrap();

    assert_eq!(
        next_report(&mut rx).await,
        error_event("Scanner error: checksum mismatch")
    );
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Scanning);
    assert_eq!(snapshot.last_error.as_deref(), Some("checksum mismatch"));

    session.close().await;
}

#[tokio::test]
async fn test_permission_denied_never_starts_camera() {
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility.deny_permission());
    let (session, mut rx) = session_with(facility.clone());

    assert_eq!(session.open().await, Err(ScanError::PermissionDenied));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Error);
    assert!(!snapshot.camera_held);
    assert_eq!(facility.starts(), 0);
    assert_eq!(facility.live_cameras(), 0);

    let events = drain(&mut rx);
    assert_eq!(
        events[..2],
        [
            ScanEvent::StateChanged {
                state: ScanState::Initializing
            },
            ScanEvent::StateChanged {
                state: ScanState::Error
            },
        ]
    );
    match &events[2] {
        ScanEvent::Error { message } => {
            assert!(message.contains("permission"), "{message}");
            assert!(message.contains("reload"), "{message}");
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_camera_is_terminal_for_attempt() {
    let (facility, _frames) = FakeFacility::new(Vec::new());
    let facility = Arc::new(facility.without_default());
    let (session, _rx) = session_with(facility.clone());

    assert_eq!(session.open().await, Err(ScanError::NoCamera));
    assert_eq!(session.state().await, ScanState::Error);
    assert_eq!(facility.live_cameras(), 0);
}

#[tokio::test]
async fn test_retry_after_acquisition_failure() {
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility.fail_next_start(DeviceError::Other("device busy".into())));
    let (session, _rx) = session_with(facility.clone());

    assert_eq!(
        session.open().await,
        Err(ScanError::Acquisition("device busy".into()))
    );
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Error);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Failed to start camera: device busy")
    );

    session.open().await.unwrap();
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Scanning);
    assert!(snapshot.last_error.is_none());
    assert_eq!(facility.live_cameras(), 1);

    session.close().await;
}

#[tokio::test]
async fn test_close_while_initializing_releases_late_camera() {
    let gate = Arc::new(Notify::new());
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility.gated(Stage::Start, gate.clone()));
    let entered = facility.entered.clone();
    let (session, mut rx) = session_with(facility.clone());

    let opener = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });

    entered.notified().await;
    assert_eq!(session.state().await, ScanState::Initializing);

    session.close().await;
    gate.notify_one();

    assert_eq!(opener.await.unwrap(), Err(ScanError::Cancelled));
    assert_eq!(facility.starts(), 1);
    assert_eq!(facility.live_cameras(), 0);
    assert_eq!(session.state().await, ScanState::Closed);

    let events = drain(&mut rx);
    assert!(events.contains(&ScanEvent::Closed));
    assert!(!events.contains(&ScanEvent::StateChanged {
        state: ScanState::Scanning
    }));
}

#[tokio::test]
async fn test_close_during_permission_prompt_never_starts_camera() {
    let gate = Arc::new(Notify::new());
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility.gated(Stage::Permission, gate.clone()));
    let entered = facility.entered.clone();
    let (session, mut rx) = session_with(facility.clone());

    let opener = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });

    entered.notified().await;
    session.close().await;
    gate.notify_one();

    assert_eq!(opener.await.unwrap(), Err(ScanError::Cancelled));
    assert_eq!(facility.starts(), 0);
    assert_eq!(facility.live_cameras(), 0);
    assert_eq!(session.state().await, ScanState::Closed);
    assert!(drain(&mut rx).contains(&ScanEvent::Closed));
}

#[tokio::test]
async fn test_failed_start_after_close_stays_closed() {
    let gate = Arc::new(Notify::new());
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(
        facility
            .fail_next_start(DeviceError::Other("device busy".into()))
            .gated(Stage::Start, gate.clone()),
    );
    let entered = facility.entered.clone();
    let (session, mut rx) = session_with(facility.clone());

    let opener = tokio::spawn({
        let session = session.clone();
        async move { session.open().await }
    });

    entered.notified().await;
    session.close().await;
    gate.notify_one();

    assert_eq!(opener.await.unwrap(), Err(ScanError::Cancelled));
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, ScanState::Closed);
    assert!(snapshot.last_error.is_none());

    let events = drain(&mut rx);
    assert!(events.contains(&ScanEvent::Closed));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ScanEvent::Error { .. })));
    assert!(!events.contains(&ScanEvent::StateChanged {
        state: ScanState::Error
    }));
}

#[tokio::test]
async fn test_dropping_every_handle_releases_camera() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, rx) = session_with(facility.clone());

    session.open().await.unwrap();
    assert_eq!(facility.live_cameras(), 1);

    // The frame sender stays open, like a camera that never stops on its own.
    drop(session);
    drop(rx);

    assert_eq!(facility.live_cameras(), 0);
    time::timeout(Duration::from_secs(5), frames.closed())
        .await
        .expect("decode loop kept running after the session was dropped");
}

#[tokio::test]
async fn test_tab_in_payload_is_rejected() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());

    session.open().await.unwrap();
    frames.send(DecodeEvent::Decoded("EQ\t001".into())).await.unwrap();

    assert_eq!(
        next_report(&mut rx).await,
        error_event("Identifier contains unsupported characters")
    );
    assert_eq!(session.state().await, ScanState::Scanning);
    session.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_and_terminal() {
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());
    session.open().await.unwrap();

    session.close().await;
    session.close().await;

    assert_eq!(facility.live_cameras(), 0);
    let closes = drain(&mut rx)
        .into_iter()
        .filter(|event| *event == ScanEvent::Closed)
        .count();
    assert_eq!(closes, 1);
    assert_eq!(
        session.open().await,
        Err(ScanError::Terminal(ScanState::Closed))
    );
}

#[tokio::test]
async fn test_close_after_accept_is_noop() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let (session, mut rx) = session_with(Arc::new(facility));
    session.open().await.unwrap();
    frames.send(DecodeEvent::Decoded("EQ-5".into())).await.unwrap();
    next_report(&mut rx).await;

    session.close().await;

    assert_eq!(session.state().await, ScanState::Accepted);
    assert!(!drain(&mut rx).contains(&ScanEvent::Closed));
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let (session, _rx) = session_with(Arc::new(facility));
    session.open().await.unwrap();

    assert_eq!(
        session.open().await,
        Err(ScanError::AlreadyActive(ScanState::Scanning))
    );
    session.close().await;
}

#[tokio::test]
async fn test_close_before_open() {
    let (facility, _frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());

    session.close().await;

    assert_eq!(session.state().await, ScanState::Closed);
    assert!(drain(&mut rx).contains(&ScanEvent::Closed));
    assert_eq!(facility.starts(), 0);
}

#[tokio::test]
async fn test_stream_end_reports_error() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let facility = Arc::new(facility);
    let (session, mut rx) = session_with(facility.clone());
    session.open().await.unwrap();

    drop(frames);

    assert_eq!(
        next_report(&mut rx).await,
        error_event("Camera stream ended unexpectedly")
    );
    assert_eq!(session.state().await, ScanState::Scanning);

    session.close().await;
    assert_eq!(facility.live_cameras(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_message_clears_after_delay() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let (session, mut rx) = session_with(Arc::new(facility));
    session.open().await.unwrap();

    frames.send(DecodeEvent::Decoded("?".into())).await.unwrap();
    assert_eq!(
        next_report(&mut rx).await,
        error_event("No identifier found in QR code")
    );
    assert!(session.snapshot().await.message.is_some());

    time::sleep(Duration::from_millis(2_900)).await;
    assert!(session.snapshot().await.message.is_some());

    assert_eq!(next_report(&mut rx).await, ScanEvent::MessageCleared);
    let snapshot = session.snapshot().await;
    assert!(snapshot.message.is_none());
    assert_eq!(snapshot.state, ScanState::Scanning);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_newer_message_replaces_and_restarts_timer() {
    let (facility, frames) = FakeFacility::new(two_cameras());
    let (session, mut rx) = session_with(Arc::new(facility));
    session.open().await.unwrap();

    frames.send(DecodeEvent::Decoded("a".into())).await.unwrap();
    next_report(&mut rx).await;

    time::sleep(Duration::from_secs(2)).await;
    frames
        .send(DecodeEvent::ReaderFailure("glare".into()))
        .await
        .unwrap();
    assert_eq!(next_report(&mut rx).await, error_event("Scanner error: glare"));

    // Past the first message's deadline, the second is still showing.
    time::sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(
        session.snapshot().await.message.as_deref(),
        Some("Scanner error: glare")
    );

    assert_eq!(next_report(&mut rx).await, ScanEvent::MessageCleared);
    assert!(session.snapshot().await.message.is_none());

    session.close().await;
}
