//! Session controller: lifecycle, per-modality worker threads, frame
//! gating, and consequence dispatch.
//!
//! Detection results arrive concurrently from two dedicated workers (one
//! per modality). The `ViolationMonitor` is the single serialization
//! point, behind one lock; consequences are dispatched outside the lock
//! on the worker that produced them, so each modality's consequences keep
//! arrival order while the two streams interleave freely.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionPolicy;
use crate::detect::{AudioDetector, Frame, SoundEvent, VisionDetector};
use crate::history::{ConsequenceLog, ConsequenceRecord};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::sampler::FrameSampler;
use crate::violation::{Consequence, Modality, SessionPhase, ViolationMonitor};

/// Receives every dispatched consequence. Implementations must be safe
/// to call from any worker thread; marshaling onto a UI thread is the
/// sink's responsibility, not the kernel's.
pub trait ConsequenceSink: Send + Sync {
    fn on_consequence(&self, record: &ConsequenceRecord);
}

#[derive(Debug)]
pub enum SessionError {
    AudioStart(crate::detect::DetectError),
    Spawn(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AudioStart(e) => write!(f, "audio detector start failed: {e}"),
            SessionError::Spawn(msg) => write!(f, "worker spawn failed: {msg}"),
        }
    }
}

/// A frame accepted by the sampler, waiting for the vision worker.
struct QueuedFrame {
    frame: Frame,
    enqueued_at: Instant,
}

/// One proctoring session. Created by `begin`, torn down by `end` (or
/// `Drop`): teardown cancels frame acceptance, stops the audio detector,
/// and joins both workers before the state is discarded.
pub struct Session {
    id: String,
    policy: SessionPolicy,
    sampler: Arc<Mutex<FrameSampler>>,
    monitor: Arc<Mutex<ViolationMonitor>>,
    phase_rx: watch::Receiver<SessionPhase>,
    frame_tx: Sender<QueuedFrame>,
    cancel: CancellationToken,
    audio_detector: Mutex<Box<dyn AudioDetector>>,
    vision_worker: Option<JoinHandle<()>>,
    audio_worker: Option<JoinHandle<()>>,
    metrics: Arc<MetricsRegistry>,
    log: Arc<ConsequenceLog>,
}

/// How long workers wait on their queues between cancellation checks.
const WORKER_POLL: Duration = Duration::from_millis(50);

/// Accepted frames pending inference. Small on purpose: a stale frame is
/// worthless, better to drop at the gate than queue behind slow inference.
const FRAME_QUEUE_DEPTH: usize = 4;

const LOG_CAPACITY: usize = 256;

impl Session {
    /// Start a session: fresh sampler and monitor, audio detector
    /// started, one worker thread per modality.
    pub fn begin(
        policy: SessionPolicy,
        vision_detector: Box<dyn VisionDetector>,
        mut audio_detector: Box<dyn AudioDetector>,
        sink: Arc<dyn ConsequenceSink>,
    ) -> Result<Self, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let metrics = Arc::new(MetricsRegistry::new());
        let log = Arc::new(ConsequenceLog::new(LOG_CAPACITY));

        let monitor = Arc::new(Mutex::new(ViolationMonitor::new(&policy)));
        let phase_rx = monitor.lock().subscribe();

        // Start narrow: the first frame is accepted unconditionally and
        // the subject should be acquired quickly.
        let sampler = Arc::new(Mutex::new(FrameSampler::new(policy.absence_recheck())));

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let sound_rx = audio_detector.start().map_err(SessionError::AudioStart)?;

        let vision_worker = {
            let ctx = WorkerCtx {
                session_id: id.clone(),
                monitor: Arc::clone(&monitor),
                sink: Arc::clone(&sink),
                log: Arc::clone(&log),
                metrics: Arc::clone(&metrics),
                cancel: cancel.clone(),
            };
            let policy = policy.clone();
            let sampler = Arc::clone(&sampler);
            std::thread::Builder::new()
                .name("vision-worker".into())
                .spawn(move || run_vision_loop(ctx, frame_rx, vision_detector, sampler, policy))
                .map_err(|e| SessionError::Spawn(e.to_string()))?
        };

        let audio_worker = {
            let ctx = WorkerCtx {
                session_id: id.clone(),
                monitor: Arc::clone(&monitor),
                sink,
                log: Arc::clone(&log),
                metrics: Arc::clone(&metrics),
                cancel: cancel.clone(),
            };
            std::thread::Builder::new()
                .name("audio-worker".into())
                .spawn(move || run_audio_loop(ctx, sound_rx))
                .map_err(|e| SessionError::Spawn(e.to_string()))?
        };

        info!(session_id = %id, "session started");

        Ok(Self {
            id,
            policy,
            sampler,
            monitor,
            phase_rx,
            frame_tx,
            cancel,
            audio_detector: Mutex::new(audio_detector),
            vision_worker: Some(vision_worker),
            audio_worker: Some(audio_worker),
            metrics,
            log,
        })
    }

    /// Offer a raw frame from the capture context. The sampler gate runs
    /// here, synchronously and cheaply; only accepted frames are queued
    /// for inference. Returns whether the frame was queued. Frames
    /// offered after `end` are silently dropped.
    pub fn submit_frame(&self, frame: Frame) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if !self.sampler.lock().should_sample(now) {
            self.metrics.record(metric_names::FRAMES_GATED, 1.0);
            return false;
        }
        self.metrics.record(metric_names::FRAMES_ACCEPTED, 1.0);
        match self.frame_tx.try_send(QueuedFrame {
            frame,
            enqueued_at: now,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Inference is behind; keep-only-latest semantics upstream
                // make the dropped frame redundant anyway.
                warn!("frame queue full, dropping accepted frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.monitor.lock().phase()
    }

    /// Subscribe to phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_rx.clone()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Most recent dispatched consequences, newest first.
    pub fn recent_consequences(&self, limit: usize) -> Vec<ConsequenceRecord> {
        self.log.recent(limit)
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// End the session: stop accepting input, stop the audio detector,
    /// join both workers. Idempotent; also runs on `Drop`.
    pub fn end(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.audio_detector.lock().stop();
        if let Some(handle) = self.vision_worker.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.audio_worker.take() {
            let _ = handle.join();
        }
        info!(session_id = %self.id, phase = %self.phase(), "session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

/// Everything a worker loop needs, bundled for the spawn.
struct WorkerCtx {
    session_id: String,
    monitor: Arc<Mutex<ViolationMonitor>>,
    sink: Arc<dyn ConsequenceSink>,
    log: Arc<ConsequenceLog>,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
}

impl WorkerCtx {
    /// Record and deliver consequences in order, outside the monitor lock.
    fn dispatch(&self, modality: Modality, consequences: Vec<Consequence>) {
        for consequence in consequences {
            let span = self.metrics.span(metric_names::CONSEQUENCE_DISPATCH);
            let record = self.log.record(&self.session_id, modality, consequence);
            self.sink.on_consequence(&record);
            span.finish();
        }
    }
}

fn run_vision_loop(
    ctx: WorkerCtx,
    frame_rx: Receiver<QueuedFrame>,
    mut detector: Box<dyn VisionDetector>,
    sampler: Arc<Mutex<FrameSampler>>,
    policy: SessionPolicy,
) {
    info!("vision worker started");
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let queued = match frame_rx.recv_timeout(WORKER_POLL) {
            Ok(q) => q,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        ctx.metrics.record(
            metric_names::VISION_QUEUE_WAIT,
            queued.enqueued_at.elapsed().as_micros() as f64,
        );

        match detector.detect(&queued.frame) {
            Ok(event) => {
                ctx.metrics.record(
                    metric_names::VISION_INFER,
                    event.inference_time_ms as f64 * 1000.0,
                );
                let presence =
                    event.has_label(&policy.presence_label, policy.presence_confidence);
                debug!(
                    presence,
                    labels = event.labels.len(),
                    inference_ms = event.inference_time_ms,
                    "vision classification"
                );
                let consequences = ctx.monitor.lock().on_frame(presence);
                // Presence is assumed stable and re-checked lazily; a lost
                // subject is re-checked quickly so the counter is not
                // starved of evidence.
                let next_interval = if presence {
                    policy.presence_recheck()
                } else {
                    policy.absence_recheck()
                };
                sampler.lock().set_interval(next_interval);
                ctx.dispatch(Modality::Vision, consequences);
            }
            Err(e) => {
                // Infrastructure fault, not evidence of absence: report
                // for display, leave the monitor untouched.
                warn!(error = %e, "vision detector failed on frame");
                ctx.dispatch(
                    Modality::Vision,
                    vec![Consequence::DetectorError { message: e.message }],
                );
            }
        }
    }
    info!("vision worker exiting");
}

fn run_audio_loop(ctx: WorkerCtx, sound_rx: Receiver<SoundEvent>) {
    info!("audio worker started");
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let event = match sound_rx.recv_timeout(WORKER_POLL) {
            Ok(e) => e,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        ctx.metrics.record(
            metric_names::AUDIO_QUEUE_WAIT,
            event.at.elapsed().as_micros() as f64,
        );
        let consequences = ctx.monitor.lock().on_sound(event.score);
        ctx.dispatch(Modality::Audio, consequences);
    }
    info!("audio worker exiting");
}
