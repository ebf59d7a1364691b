//! Adaptive frame sampler: gates how often frames reach the (expensive)
//! vision detector. The interval is owned by the caller's policy — widened
//! while the subject is in frame, narrowed while lost so the violation
//! counter is not starved.

use std::time::{Duration, Instant};

/// Decides whether a frame should be forwarded to the vision detector.
/// Not internally synchronized: mutated only on the thread delivering
/// frames, per the capture pipeline's single-analyzer contract.
pub struct FrameSampler {
    last_accepted_at: Option<Instant>,
    required_interval: Duration,
}

impl FrameSampler {
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            last_accepted_at: None,
            required_interval: initial_interval,
        }
    }

    /// Returns true iff this frame should be sampled. Advances
    /// `last_accepted_at` only on acceptance; rejected calls are no-ops,
    /// so hammering this under the interval never shifts the window.
    /// The first frame of a session is always accepted.
    pub fn should_sample(&mut self, now: Instant) -> bool {
        let due = match self.last_accepted_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.required_interval,
        };
        if due {
            self.last_accepted_at = Some(now);
        }
        due
    }

    /// Replace the required interval for future decisions. Past
    /// acceptances are not re-evaluated.
    pub fn set_interval(&mut self, interval: Duration) {
        self.required_interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.required_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn first_frame_always_sampled() {
        let mut s = FrameSampler::new(Duration::from_millis(5000));
        assert!(s.should_sample(Instant::now()));
    }

    #[test]
    fn second_call_within_interval_is_rejected_then_accepted_after() {
        let mut s = FrameSampler::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(s.should_sample(t0));
        assert!(!s.should_sample(t0 + 50 * MS));
        assert!(s.should_sample(t0 + 100 * MS));
    }

    #[test]
    fn rejection_does_not_advance_the_window() {
        let mut s = FrameSampler::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(s.should_sample(t0));
        // Rapid rejected calls must not push the acceptance point out.
        for delta in 1..100u32 {
            assert!(!s.should_sample(t0 + delta * MS));
        }
        assert!(s.should_sample(t0 + 100 * MS));
    }

    #[test]
    fn set_interval_applies_to_future_calls_only() {
        let mut s = FrameSampler::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(s.should_sample(t0));
        s.set_interval(Duration::from_millis(10));
        assert!(!s.should_sample(t0 + 5 * MS));
        assert!(s.should_sample(t0 + 10 * MS));
    }

    #[test]
    fn narrower_interval_accepts_more_over_same_span() {
        let span_ms = 1000u32;
        let count = |interval_ms: u64| {
            let mut s = FrameSampler::new(Duration::from_millis(interval_ms));
            let t0 = Instant::now();
            (0..span_ms)
                .filter(|&ms| s.should_sample(t0 + ms * MS))
                .count()
        };
        // Same simulated wall-clock span, frame per millisecond.
        assert!(count(100) > count(333));
    }
}
