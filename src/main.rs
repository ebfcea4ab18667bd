//! Face Capture CLI
//!
//! Runs a simulated capture session against a mock camera, a scripted
//! detector and an in-memory backend, and prints a JSON summary.

use clap::{Parser, ValueEnum};
use face_capture::{
    backend::{AuthContext, MockBackend},
    capture::{FileConfig, MockCamera},
    detection::{BoundingBox, DetectedFace, ScriptedOracle},
    metrics::{MetricsRegistry, MetricsSnapshot},
    session::{
        CaptureState, SessionCallbacks, SessionCommand, SessionEvent, SessionManager,
        SessionMode, SessionOutcome,
    },
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Register,
    Verify,
}

/// What the simulated detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// A well-framed face in every frame.
    Centered,
    /// A face filling half the frame.
    TooClose,
    /// Nobody in front of the camera.
    NoFace,
    /// The face drops out every other frame.
    Flicker,
}

#[derive(Debug, Parser)]
#[command(name = "face-capture", version, about = "Simulated quality-gated face capture")]
struct Args {
    /// Backend operation performed on upload.
    #[arg(long, value_enum, default_value_t = Mode::Verify)]
    mode: Mode,

    /// Shots to collect before review (1-3).
    #[arg(long, default_value_t = 1)]
    shots: usize,

    /// Simulated detector behavior.
    #[arg(long, value_enum, default_value_t = Scenario::Centered)]
    scenario: Scenario,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics after the summary.
    #[arg(long)]
    metrics: bool,

    /// Close the session after this many seconds.
    #[arg(long, default_value_t = 20)]
    timeout_secs: u64,
}

fn oracle_for(scenario: Scenario) -> ScriptedOracle {
    let centered = DetectedFace::new(BoundingBox::centered(0.5, 0.5, 0.4, 0.45), 0.95);
    match scenario {
        Scenario::Centered => ScriptedOracle::constant(vec![centered]),
        Scenario::TooClose => ScriptedOracle::constant(vec![DetectedFace::new(
            BoundingBox::centered(0.5, 0.5, 0.7, 0.71),
            0.95,
        )]),
        Scenario::NoFace => ScriptedOracle::constant(Vec::new()),
        Scenario::Flicker => {
            let frames = (0..64)
                .map(|i| if i % 2 == 0 { vec![centered] } else { Vec::new() })
                .collect();
            ScriptedOracle::sequence(frames)
        }
    }
    .with_latency(Duration::from_millis(15))
}

fn load_config(args: &Args) -> Result<FileConfig, String> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path).map_err(|e| e.to_string())?,
        None => FileConfig::default(),
    };
    config.session.mode = match args.mode {
        Mode::Register => SessionMode::Register,
        Mode::Verify => SessionMode::Verify,
    };
    config.session.shots_per_session = args.shots;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Face Capture v{}", face_capture::VERSION);
    info!(scenario = ?args.scenario, mode = ?args.mode, "Running simulated session");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let scenario = args.scenario;
    let mut manager = SessionManager::new(
        MockCamera::new(),
        move || oracle_for(scenario),
        Arc::new(MockBackend::accepting()),
        AuthContext::new("demo-user", "demo-token"),
        config,
    );

    let succeeded = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(AtomicBool::new(false));
    let registered = Arc::new(AtomicBool::new(false));
    let callbacks = {
        let (s, c, r) = (succeeded.clone(), cancelled.clone(), registered.clone());
        SessionCallbacks::new()
            .on_success(move || s.store(true, Ordering::SeqCst))
            .on_cancel(move || c.store(true, Ordering::SeqCst))
            .on_registration_complete(move || r.store(true, Ordering::SeqCst))
    };

    let (handle, mut events) = match manager.start(callbacks).await {
        Ok(started) => started,
        Err(e) => {
            eprintln!("Failed to start session: {}", e.user_message());
            std::process::exit(1);
        }
    };

    let interrupt = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt.send_blocking(SessionCommand::Close);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.timeout_secs));
    tokio::pin!(deadline);
    let mut timed_out = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::StateChanged { from, to } => {
                        info!("{} -> {}", from, to);
                        if to == CaptureState::Preview {
                            let _ = handle.send(SessionCommand::Confirm).await;
                        }
                    }
                    SessionEvent::ManualCaptureAvailable => {
                        info!("Manual capture available, trying it");
                        let _ = handle.send(SessionCommand::ManualCapture).await;
                    }
                    SessionEvent::Message(message) => info!("{}", message),
                    SessionEvent::RetryPrompt(message) => warn!("{}", message),
                    SessionEvent::ShotCaptured { index, total } => info!("Captured {} of {}", index, total),
                    SessionEvent::CountdownTick(n) => info!("{}...", n),
                    SessionEvent::UploadProgress(p) => info!("Uploading {}% ({:?})", p.percent, p.phase),
                    other => debug!(?other, "event"),
                }
            }
            _ = &mut deadline, if !timed_out => {
                timed_out = true;
                warn!("Timed out after {}s, closing session", args.timeout_secs);
                let _ = handle.close().await;
            }
        }
    }

    let summary = match manager.wait().await {
        Ok(Some(summary)) => summary,
        Ok(None) => {
            eprintln!("Session ended without a report");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Session failed: {}", e);
            std::process::exit(1);
        }
    };

    let output = serde_json::json!({
        "scenario": format!("{:?}", args.scenario),
        "summary": summary,
        "callbacks": {
            "success": succeeded.load(Ordering::SeqCst),
            "cancel": cancelled.load(Ordering::SeqCst),
            "registration_complete": registered.load(Ordering::SeqCst),
        },
    });
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Could not serialize summary: {}", e),
    }

    if args.metrics {
        let mut snapshot = MetricsSnapshot::from_stats(&summary.stats);
        snapshot.sessions_started = 1;
        match summary.outcome {
            SessionOutcome::Success { .. } => snapshot.sessions_succeeded = 1,
            SessionOutcome::Cancelled => snapshot.sessions_cancelled = 1,
            SessionOutcome::Refused { .. } => {}
        }
        match MetricsRegistry::new().and_then(|registry| {
            registry.update(&snapshot);
            registry.encode()
        }) {
            Ok(text) => print!("{}", text),
            Err(e) => warn!("Metrics unavailable: {}", e),
        }
    }

    if !matches!(summary.outcome, SessionOutcome::Success { .. }) {
        std::process::exit(2);
    }
}
