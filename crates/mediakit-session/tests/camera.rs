use mediakit_models::{DeviceOrientation, ExposureMode, FocusMode, Notification, SessionEvent};
use mediakit_session::graph::GraphState;
use mediakit_session::null::{GraphCall, NullBackend, NullDriver, NullOptions};
use mediakit_session::{CaptureSession, SessionConfig, SessionError, SessionState};
use tempfile::TempDir;
use tokio::sync::mpsc;

struct CameraContext {
    camera: CaptureSession,
    driver: NullDriver,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    dir: TempDir,
}

impl CameraContext {
    fn new(options: NullOptions) -> anyhow::Result<Self> {
        let backend = NullBackend::new(options);
        let (tx, events) = mpsc::unbounded_channel();
        let camera = CaptureSession::new("camera-1", &backend, &SessionConfig::default(), tx)?;
        let driver = backend
            .last_driver()
            .ok_or_else(|| anyhow::anyhow!("backend built no graph"))?;
        Ok(Self {
            camera,
            driver,
            events,
            dir: tempfile::tempdir()?,
        })
    }

    fn held() -> anyhow::Result<Self> {
        Self::new(NullOptions {
            hold_captures: true,
            ..NullOptions::default()
        })
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn take(&mut self) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event.notification);
        }
        seen
    }
}

#[test]
fn camera_prerolls_on_creation() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    assert_eq!(ctx.driver.state(), GraphState::Paused);
    assert_eq!(ctx.camera.state(), SessionState::Ready);

    ctx.camera.play();
    assert_eq!(ctx.driver.state(), GraphState::Playing);
    ctx.camera.pause();
    assert_eq!(ctx.camera.state(), SessionState::Paused);
    ctx.camera.stop();
    assert_eq!(ctx.driver.state(), GraphState::Ready);
    assert_eq!(ctx.camera.state(), SessionState::Stopped);
    Ok(())
}

#[test]
fn picture_completes_on_poll() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    ctx.camera.play();
    let path = ctx.path("shot.jpg");
    ctx.camera.take_picture(&path);
    assert!(ctx.take().is_empty());

    ctx.camera.poll();
    assert_eq!(
        ctx.take(),
        vec![Notification::CaptureCompleted(path.display().to_string())]
    );
    assert!(!ctx.camera.capture_in_flight());
    Ok(())
}

#[test]
fn second_capture_is_answered_with_failure() -> anyhow::Result<()> {
    let mut ctx = CameraContext::held()?;
    ctx.camera.play();
    ctx.camera.take_picture(ctx.path("a.jpg"));
    ctx.camera.take_picture(ctx.path("b.jpg"));
    assert_eq!(ctx.take(), vec![Notification::CaptureCompleted(String::new())]);
    assert_eq!(
        ctx.driver
            .count(|c| matches!(c, GraphCall::StartImageCapture(_))),
        1
    );

    assert!(ctx.driver.finish_capture());
    ctx.camera.poll();
    let seen = ctx.take();
    assert_eq!(seen.len(), 1);
    assert!(matches!(&seen[0], Notification::CaptureCompleted(p) if p.ends_with("a.jpg")));
    Ok(())
}

#[test]
fn failed_capture_reports_empty_path() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    ctx.camera.play();
    ctx.driver.fail_captures(true);
    ctx.camera.take_picture(ctx.path("a.jpg"));
    let seen = ctx.take();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_capture_failure());
    assert!(!ctx.camera.capture_in_flight());
    Ok(())
}

#[test]
fn capture_error_on_bus_ends_the_capture() -> anyhow::Result<()> {
    let mut ctx = CameraContext::held()?;
    ctx.camera.play();
    ctx.camera.take_picture(ctx.path("a.jpg"));
    assert!(ctx.driver.abort_capture("encoder failed"));
    ctx.camera.poll();
    assert_eq!(
        ctx.take(),
        vec![
            Notification::Error("encoder failed".into()),
            Notification::CaptureCompleted(String::new()),
        ]
    );
    assert!(!ctx.camera.capture_in_flight());
    Ok(())
}

#[test]
fn video_recording_round() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    ctx.camera.play();
    let path = ctx.path("clip.mp4");
    ctx.camera.start_video_recording(&path);
    assert!(ctx.camera.is_recording());

    ctx.camera.take_picture(ctx.path("during.jpg"));
    assert_eq!(ctx.take(), vec![Notification::CaptureCompleted(String::new())]);

    ctx.camera.stop_video_recording();
    assert!(!ctx.camera.is_recording());
    ctx.camera.poll();
    assert_eq!(
        ctx.take(),
        vec![Notification::CaptureCompleted(path.display().to_string())]
    );
    Ok(())
}

#[test]
fn stop_without_recording_fails() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    ctx.camera.stop_video_recording();
    assert_eq!(ctx.take(), vec![Notification::CaptureCompleted(String::new())]);
    assert_eq!(ctx.driver.count(|c| *c == GraphCall::StopVideoCapture), 0);
    Ok(())
}

#[test]
fn zoom_is_validated_before_the_graph() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    assert!(matches!(
        ctx.camera.set_zoom_level(10.0),
        Err(SessionError::InvalidInput(_))
    ));
    assert_eq!(ctx.driver.count(|c| matches!(c, GraphCall::SetZoom(_))), 0);

    ctx.camera.set_zoom_level(3.0)?;
    assert_eq!(ctx.driver.zoom(), 3.0);
    Ok(())
}

#[test]
fn camera_controls_are_forwarded() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    ctx.camera.set_exposure_mode(ExposureMode::Locked);
    ctx.camera.set_focus_mode(FocusMode::Locked);
    ctx.camera.lock_capture_orientation(DeviceOrientation::PortraitUp);
    assert_eq!(ctx.camera.exposure_mode(), ExposureMode::Locked);
    assert_eq!(ctx.camera.focus_mode(), FocusMode::Locked);
    assert_eq!(
        ctx.camera.locked_capture_orientation(),
        Some(DeviceOrientation::PortraitUp)
    );

    ctx.camera.unlock_capture_orientation();
    assert_eq!(ctx.camera.locked_capture_orientation(), None);
    assert_eq!(
        ctx.driver
            .count(|c| matches!(c, GraphCall::SetCaptureOrientation(_))),
        2
    );
    Ok(())
}

#[test]
fn viewfinder_frames_are_announced() -> anyhow::Result<()> {
    let mut ctx = CameraContext::new(NullOptions::default())?;
    ctx.camera.play();
    ctx.driver.push_frame(320, 240);
    ctx.camera.poll();
    assert_eq!(ctx.take(), vec![Notification::FrameDecoded]);
    assert_eq!(ctx.camera.preview_size(), Some((320, 240)));
    Ok(())
}

#[test]
fn dispose_drops_capture_in_flight() -> anyhow::Result<()> {
    let mut ctx = CameraContext::held()?;
    ctx.camera.play();
    ctx.camera.take_picture(ctx.path("a.jpg"));
    ctx.camera.dispose();
    assert!(!ctx.camera.is_valid());
    assert!(ctx.driver.is_shut_down());

    let calls = ctx.driver.calls().len();
    ctx.camera.dispose();
    ctx.camera.take_picture(ctx.path("b.jpg"));
    assert_eq!(ctx.driver.calls().len(), calls);
    ctx.camera.poll();
    assert_eq!(ctx.take(), vec![Notification::CaptureCompleted(String::new())]);
    Ok(())
}

#[test]
fn camera_that_cannot_preroll_fails_to_build() {
    let backend = NullBackend::new(NullOptions {
        fail_build: true,
        ..NullOptions::default()
    });
    let result =
        CaptureSession::new("c", &backend, &SessionConfig::default(), |_e: SessionEvent| {});
    assert!(result.is_err());
}
