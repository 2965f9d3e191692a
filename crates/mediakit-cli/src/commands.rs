use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mediakit_models::{Notification, SessionEvent};
use mediakit_session::{CaptureSession, GraphBackend, MediaSession};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cli::{CameraArgs, PlayArgs};
use crate::config::Config;

/// How often sessions are polled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

type Events = mpsc::UnboundedReceiver<SessionEvent>;

fn print_json(value: &impl Serialize) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    Ok(())
}

/// Print everything queued so far. Returns the notifications for inspection.
fn flush(events: &mut Events) -> Result<Vec<Notification>> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        print_json(&event)?;
        seen.push(event.notification);
    }
    Ok(seen)
}

pub async fn play(backend: &dyn GraphBackend, config: &Config, args: PlayArgs) -> Result<()> {
    let mut session_config = config.session.clone();
    session_config.looping |= args.looping;

    let (tx, mut events) = mpsc::unbounded_channel();
    let mut session = MediaSession::with_generated_id(backend, &session_config, tx)
        .context("failed to create player")?;

    if let Some(volume) = args.volume {
        session.set_volume(volume);
    }
    if let Some(balance) = args.balance {
        session.set_balance(balance);
    }
    if let Some(rate) = args.rate {
        session.set_rate(rate);
    }

    session.set_source(&args.uri);
    flush(&mut events)?;
    if !session.is_initialized() {
        bail!("unable to prepare '{}'", args.uri);
    }
    if let Some(position) = args.seek {
        session.seek(position);
    }
    session.resume();

    let deadline = args
        .max_seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        session.poll();
        let position = session.query_position();
        debug!(position, "tick");

        let seen = flush(&mut events)?;
        let finished = seen.iter().any(|n| {
            matches!(n, Notification::PlaybackCompleted | Notification::Error(_))
        });
        if finished || deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    session.stop();
    session.dispose();
    flush(&mut events)?;
    Ok(())
}

pub fn probe(backend: &dyn GraphBackend, config: &Config, uri: &str) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut session = MediaSession::with_generated_id(backend, &config.session, tx)
        .context("failed to create player")?;
    session.set_source(uri);
    session.poll();
    let errors: Vec<String> = flush_quiet(&mut events)
        .into_iter()
        .filter_map(|n| match n {
            Notification::Error(message) => Some(message),
            _ => None,
        })
        .collect();

    let duration = session.query_duration();
    print_json(&json!({
        "uri": uri,
        "source": session.source(),
        "prepared": session.is_initialized(),
        "duration_ms": (duration >= 0).then_some(duration),
        "errors": errors,
    }))?;
    session.dispose();
    Ok(())
}

fn flush_quiet(events: &mut Events) -> Vec<Notification> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.notification);
    }
    seen
}

pub async fn camera(backend: &dyn GraphBackend, config: &Config, args: CameraArgs) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut camera = CaptureSession::with_generated_id(backend, &config.session, tx)
        .context("failed to open camera")?;
    camera.play();

    if let Some(zoom) = args.zoom {
        camera.set_zoom_level(zoom).context("invalid zoom level")?;
    }

    let preview = Duration::from_secs(args.seconds);
    let capture_timeout = Duration::from_secs(config.camera.capture_timeout_secs);
    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if let Some(name) = &args.snapshot {
        let path = config.snapshot_path(name);
        info!(path = %path.display(), "taking picture");
        camera.take_picture(&path);
        wait_for_capture(&mut camera, &mut events, &mut ticker, capture_timeout).await?;
    } else if let Some(name) = &args.record {
        let path = config.snapshot_path(name);
        info!(path = %path.display(), seconds = args.seconds, "recording");
        camera.start_video_recording(&path);
        run_for(&mut camera, &mut events, &mut ticker, preview).await?;
        camera.stop_video_recording();
        wait_for_capture(&mut camera, &mut events, &mut ticker, capture_timeout).await?;
    } else {
        run_for(&mut camera, &mut events, &mut ticker, preview).await?;
    }

    if let Some((width, height)) = camera.preview_size() {
        info!(width, height, "preview size");
    }
    camera.stop();
    camera.dispose();
    flush(&mut events)?;
    Ok(())
}

async fn run_for(
    camera: &mut CaptureSession,
    events: &mut Events,
    ticker: &mut tokio::time::Interval,
    duration: Duration,
) -> Result<()> {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        ticker.tick().await;
        camera.poll();
        flush(events)?;
    }
    Ok(())
}

async fn wait_for_capture(
    camera: &mut CaptureSession,
    events: &mut Events,
    ticker: &mut tokio::time::Interval,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        ticker.tick().await;
        camera.poll();
        for notification in flush(events)? {
            if let Notification::CaptureCompleted(path) = notification {
                if path.is_empty() {
                    bail!("capture failed");
                }
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            warn!(?timeout, "capture did not complete");
            bail!("capture timed out");
        }
    }
}

pub fn cameras(backend: &dyn GraphBackend) -> Result<()> {
    for camera in backend.available_cameras() {
        print_json(&camera)?;
    }
    Ok(())
}
