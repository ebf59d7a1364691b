//! Demo: runs one simulated proctoring session end-to-end with the stub
//! detectors. The subject is "in frame" for a while (bright frames), then
//! leaves (dark frames) until the absence counter fails the session.
//! Pass a JSON policy file path as the first argument to override defaults.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use invigil::detect::stub::{LuminanceDetector, ScriptedAudioDetector};
use invigil::history::ConsequenceRecord;
use invigil::session::{ConsequenceSink, Session};
use invigil::{Frame, SessionPhase, SessionPolicy};

/// Logs every consequence as a structured event, the way a UI layer
/// would forward them to its render thread.
struct LoggingSink;

impl ConsequenceSink for LoggingSink {
    fn on_consequence(&self, record: &ConsequenceRecord) {
        info!(
            sequence = record.sequence,
            modality = ?record.modality,
            payload = %serde_json::to_string(&record.consequence).unwrap_or_default(),
            "consequence"
        );
    }
}

fn solid_frame(value: u8) -> Frame {
    Frame {
        pixels: vec![value; 4 * 64 * 64],
        width: 64,
        height: 64,
        rotation_degrees: 0,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invigil=debug".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let policy = match std::env::args().nth(1) {
        Some(path) => SessionPolicy::load_from_file(Path::new(&path)).unwrap_or_else(|e| {
            warn!(error = %e, "policy load failed, using defaults");
            SessionPolicy::default()
        }),
        None => {
            // Compressed intervals so the demo runs in seconds.
            SessionPolicy {
                presence_recheck_ms: 400,
                absence_recheck_ms: 150,
                ..SessionPolicy::default()
            }
        }
    };
    info!(?policy, "starting demo session");

    let vision = Box::new(LuminanceDetector::new(100.0, policy.presence_label.clone()));
    // Quiet throughout: the demo exercises the vision failure path.
    let audio = Box::new(ScriptedAudioDetector::new(
        vec![0.05; 40],
        Duration::from_millis(250),
    ));

    let mut session = match Session::begin(policy, vision, audio, Arc::new(LoggingSink)) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "session failed to start");
            return;
        }
    };

    let mut phase_rx = session.subscribe_phase();

    // Capture loop stand-in: ~10 fps, subject visible for 2s, then gone.
    let mut elapsed = Duration::ZERO;
    let frame_period = Duration::from_millis(100);
    while *phase_rx.borrow_and_update() != SessionPhase::Failed
        && elapsed < Duration::from_secs(10)
    {
        let luminance = if elapsed < Duration::from_secs(2) { 200 } else { 20 };
        session.submit_frame(solid_frame(luminance));
        std::thread::sleep(frame_period);
        elapsed += frame_period;
    }

    let final_phase = session.phase();
    info!(phase = %final_phase, "demo finished");
    for record in session.recent_consequences(10).into_iter().rev() {
        info!(
            sequence = record.sequence,
            payload = %serde_json::to_string(&record.consequence).unwrap_or_default(),
            "timeline"
        );
    }
    if let Ok(summary) = serde_json::to_string_pretty(&session.metrics().summary()) {
        info!("metrics summary:\n{summary}");
    }
    session.end();
}
