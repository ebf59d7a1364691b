//! Detection types and detector capability traits.
//! The kernel treats both detectors as black boxes: vision produces a
//! labelled result per accepted frame, audio produces a scalar score per
//! window. Real model adapters live outside this crate; `stub` provides
//! energy/luminance stand-ins for the demo and tests.

pub mod stub;

use std::time::Instant;

use crossbeam_channel::Receiver;

/// One camera frame as handed to `Session::submit_frame`.
/// Pixels are RGBA8888 row-major, matching the capture format upstream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation the detector must apply, in degrees.
    pub rotation_degrees: i32,
}

/// A single label with its confidence, as reported by the vision detector.
#[derive(Debug, Clone)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

/// Result of one vision inference over one accepted frame.
/// Immutable once created; labels keep detector order.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub labels: Vec<LabelScore>,
    pub frame_width: u32,
    pub frame_height: u32,
    pub inference_time_ms: u64,
    pub at: Instant,
}

impl DetectionEvent {
    /// Whether any label satisfies the presence criterion.
    pub fn has_label(&self, label: &str, min_confidence: f32) -> bool {
        self.labels
            .iter()
            .any(|l| l.label == label && l.confidence >= min_confidence)
    }
}

/// One audio classification window. Produced at the detector's own fixed
/// cadence; never throttled by the kernel.
#[derive(Debug, Clone, Copy)]
pub struct SoundEvent {
    /// Probability in [0, 1] that a flagged sound occurred.
    pub score: f32,
    pub at: Instant,
}

/// Detector-level failure. Display-only: it never advances session state
/// and never counts as an absence.
#[derive(Debug, Clone)]
pub struct DetectError {
    pub message: String,
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "detector error: {}", self.message)
    }
}

impl DetectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Vision detector capability (model adapter).
/// Called on the session's vision worker thread, only for frames the
/// sampler accepted.
pub trait VisionDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionEvent, DetectError>;
}

/// Audio detector capability (model adapter).
/// `start` hands back the event stream and begins inferencing; `stop`
/// halts it. Both are driven by the session lifecycle.
pub trait AudioDetector: Send {
    fn start(&mut self) -> Result<Receiver<SoundEvent>, DetectError>;
    fn stop(&mut self);
}
