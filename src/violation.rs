//! Violation state machine: turns noisy per-frame/per-window detector
//! classifications into discrete, rate-limited consequences.
//! Vision tolerates transient misses via consecutive-absence counting;
//! audio is zero-tolerance. Failure is a latch: once set, every further
//! input from either modality is routed as a no-op.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SessionPolicy;

/// Which detector stream produced an event or consequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Vision,
    Audio,
}

/// Observable phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionPhase {
    /// Presence held, or too few misses to matter yet.
    Ok,
    /// Presence lost, counter running, not yet failed.
    Warning,
    /// Terminal. Never leaves this phase.
    Failed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Ok => write!(f, "Ok"),
            SessionPhase::Warning => write!(f, "Warning"),
            SessionPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Discrete outcome of one classification input, in dispatch order.
/// `VisionFail`/`AudioFail` carry enough data for the dispatcher to show
/// the reason-specific modal ("did not show your face" vs. "talked during
/// the test") — the two failures need different remediation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Consequence {
    /// Subject re-acquired: hide the warning marker.
    PresenceShown,
    /// Subject missing: show the warning marker, counter ticked.
    AbsenceShown { consecutive_absences: u32 },
    /// Terminal: absence counter reached the policy limit.
    VisionFail { absent_for_ms: u64 },
    /// Terminal: a single flagged sound is the violation itself.
    AudioFail { score: f32 },
    /// Audio window below threshold; nothing changes.
    Quiet,
    /// Detector infrastructure fault, display-only. Never evidence of
    /// absence and never advances the counter.
    DetectorError { message: String },
    /// Input arrived after the failure latch; intentionally a no-op.
    Ignored,
}

/// The session's only mutable decision state. Shared between the vision
/// and audio workers behind a single lock (see `session`); all methods
/// are synchronous O(1) and never block.
pub struct ViolationMonitor {
    presence_detected: bool,
    consecutive_absences: u32,
    session_failed: bool,
    max_consecutive_absences: u32,
    sound_threshold: f32,
    absence_window_ms: u64,
    phase_tx: watch::Sender<SessionPhase>,
    phase_rx: watch::Receiver<SessionPhase>,
}

impl ViolationMonitor {
    pub fn new(policy: &SessionPolicy) -> Self {
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Ok);
        Self {
            presence_detected: false,
            consecutive_absences: 0,
            session_failed: false,
            max_consecutive_absences: policy.max_consecutive_absences,
            sound_threshold: policy.sound_threshold,
            absence_window_ms: policy.absence_window().as_millis() as u64,
            phase_tx,
            phase_rx,
        }
    }

    /// Feed one vision classification. Returns the consequences to
    /// dispatch, in order.
    pub fn on_frame(&mut self, presence: bool) -> Vec<Consequence> {
        if self.session_failed {
            return vec![Consequence::Ignored];
        }

        if presence {
            self.presence_detected = true;
            self.consecutive_absences = 0;
            self.publish_phase();
            return vec![Consequence::PresenceShown];
        }

        self.presence_detected = false;
        self.consecutive_absences += 1;
        let mut out = vec![Consequence::AbsenceShown {
            consecutive_absences: self.consecutive_absences,
        }];

        // Threshold-and-above, edge-triggered by the latch. The shipped
        // app compared `count++ == 3`, which silently under-triggers if
        // the counter ever overshoots; reaching the limit must fail.
        if self.consecutive_absences >= self.max_consecutive_absences {
            self.session_failed = true;
            warn!(
                consecutive_absences = self.consecutive_absences,
                "absence limit reached, session failed"
            );
            out.push(Consequence::VisionFail {
                absent_for_ms: self.absence_window_ms,
            });
        }
        self.publish_phase();
        out
    }

    /// Feed one audio score. A score strictly above the threshold fails
    /// the session immediately; equality is quiet.
    pub fn on_sound(&mut self, score: f32) -> Vec<Consequence> {
        if self.session_failed {
            return vec![Consequence::Ignored];
        }

        if score > self.sound_threshold {
            self.session_failed = true;
            warn!(score, "sound violation, session failed");
            self.publish_phase();
            return vec![Consequence::AudioFail { score }];
        }
        vec![Consequence::Quiet]
    }

    pub fn phase(&self) -> SessionPhase {
        if self.session_failed {
            SessionPhase::Failed
        } else if !self.presence_detected && self.consecutive_absences > 0 {
            SessionPhase::Warning
        } else {
            SessionPhase::Ok
        }
    }

    /// Subscribe to phase changes without polling.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_rx.clone()
    }

    pub fn consecutive_absences(&self) -> u32 {
        self.consecutive_absences
    }

    pub fn session_failed(&self) -> bool {
        self.session_failed
    }

    pub fn presence_detected(&self) -> bool {
        self.presence_detected
    }

    fn publish_phase(&self) {
        let phase = self.phase();
        if *self.phase_rx.borrow() != phase {
            info!(phase = %phase, "phase transition");
            let _ = self.phase_tx.send(phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(max_absences: u32) -> ViolationMonitor {
        let policy = SessionPolicy {
            max_consecutive_absences: max_absences,
            ..SessionPolicy::default()
        };
        ViolationMonitor::new(&policy)
    }

    fn feed(m: &mut ViolationMonitor, inputs: &[bool]) -> Vec<Consequence> {
        inputs.iter().flat_map(|&p| m.on_frame(p)).collect()
    }

    #[test]
    fn counter_tracks_trailing_absence_run() {
        let mut m = monitor(100);
        feed(&mut m, &[false, false, true, false, false, false]);
        assert_eq!(m.consecutive_absences(), 3);
        feed(&mut m, &[true]);
        assert_eq!(m.consecutive_absences(), 0);
    }

    #[test]
    fn four_absences_at_threshold_three() {
        let mut m = monitor(3);
        let consequences = feed(&mut m, &[false, false, false, false]);
        assert_eq!(
            consequences,
            vec![
                Consequence::AbsenceShown { consecutive_absences: 1 },
                Consequence::AbsenceShown { consecutive_absences: 2 },
                Consequence::AbsenceShown { consecutive_absences: 3 },
                Consequence::VisionFail { absent_for_ms: 9999 },
                Consequence::Ignored,
            ]
        );
        assert_eq!(m.phase(), SessionPhase::Failed);
        // Counter frozen at the point of failure.
        assert_eq!(m.consecutive_absences(), 3);
    }

    #[test]
    fn presence_resets_the_counter_before_threshold() {
        let mut m = monitor(3);
        let consequences = feed(&mut m, &[false, false, true, false, false]);
        assert!(!m.session_failed());
        assert_eq!(m.consecutive_absences(), 2);
        assert!(consequences.contains(&Consequence::PresenceShown));
    }

    #[test]
    fn failure_fires_exactly_at_the_threshold_boundary() {
        // Threshold-and-above semantics: the Nth consecutive absence fails.
        let mut m = monitor(2);
        assert!(!m.on_frame(false).contains(&Consequence::VisionFail { absent_for_ms: 6666 }));
        let second = m.on_frame(false);
        assert!(matches!(second.last(), Some(Consequence::VisionFail { .. })));
    }

    #[test]
    fn terminal_consequence_emitted_exactly_once() {
        let mut m = monitor(2);
        let all = feed(&mut m, &[false, false, false, true, false]);
        let fails = all
            .iter()
            .filter(|c| matches!(c, Consequence::VisionFail { .. }))
            .count();
        assert_eq!(fails, 1);
        assert!(m.session_failed());
    }

    #[test]
    fn sound_strictly_above_threshold_fails_immediately() {
        let mut m = monitor(3);
        assert_eq!(m.on_sound(0.51), vec![Consequence::AudioFail { score: 0.51 }]);
        assert!(m.session_failed());
        assert_eq!(m.phase(), SessionPhase::Failed);
    }

    #[test]
    fn sound_at_exactly_threshold_is_quiet() {
        let mut m = monitor(3);
        assert_eq!(m.on_sound(0.5), vec![Consequence::Quiet]);
        assert!(!m.session_failed());
    }

    #[test]
    fn latch_survives_inputs_from_both_modalities() {
        let mut m = monitor(3);
        assert_eq!(m.on_sound(0.9), vec![Consequence::AudioFail { score: 0.9 }]);
        assert_eq!(m.on_frame(true), vec![Consequence::Ignored]);
        assert_eq!(m.on_sound(0.0), vec![Consequence::Ignored]);
        assert_eq!(m.on_frame(false), vec![Consequence::Ignored]);
        assert!(m.session_failed());
    }

    #[test]
    fn phase_walks_ok_warning_failed() {
        let mut m = monitor(2);
        assert_eq!(m.phase(), SessionPhase::Ok);
        m.on_frame(true);
        assert_eq!(m.phase(), SessionPhase::Ok);
        m.on_frame(false);
        assert_eq!(m.phase(), SessionPhase::Warning);
        m.on_frame(false);
        assert_eq!(m.phase(), SessionPhase::Failed);
    }

    #[test]
    fn watch_subscribers_see_the_terminal_phase() {
        let mut m = monitor(1);
        let rx = m.subscribe();
        m.on_frame(false);
        assert_eq!(*rx.borrow(), SessionPhase::Failed);
    }
}
