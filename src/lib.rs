//! Invigil: on-device proctoring session kernel.
//! Consumes noisy per-frame presence and per-window sound classifications
//! and turns them into discrete, rate-limited consequences: warning
//! markers, a debounced violation counter, and a terminal session-failed
//! latch. Camera plumbing, model inference, and UI rendering live
//! outside this crate behind the `detect` and `session` traits.

pub mod config;
pub mod detect;
pub mod history;
pub mod metrics;
pub mod sampler;
pub mod session;
pub mod violation;

pub use config::{ConfigError, SessionPolicy};
pub use detect::{AudioDetector, DetectError, DetectionEvent, Frame, SoundEvent, VisionDetector};
pub use history::ConsequenceRecord;
pub use sampler::FrameSampler;
pub use session::{ConsequenceSink, Session, SessionError};
pub use violation::{Consequence, Modality, SessionPhase, ViolationMonitor};
