//! Session policy: every tunable threshold and interval in one place.
//! Loaded from JSON with a defaulted fallback so a missing or broken
//! config file never blocks a session from starting.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Tunable parameters for one proctoring session.
/// Numeric defaults match the shipped app: presence is re-checked every
/// 5s once acquired, every ~3.3s while lost, and three consecutive
/// misses at that rate amount to roughly ten seconds out of frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Label the vision detector must report for a frame to count as presence.
    pub presence_label: String,
    /// Minimum confidence for a presence label to be accepted.
    pub presence_confidence: f32,
    /// Sampler interval while the subject is in frame.
    pub presence_recheck_ms: u64,
    /// Sampler interval while the subject is out of frame.
    pub absence_recheck_ms: u64,
    /// Consecutive absence classifications that fail the session.
    pub max_consecutive_absences: u32,
    /// Audio score strictly above this fails the session immediately.
    pub sound_threshold: f32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            presence_label: "person".to_string(),
            presence_confidence: 0.5,
            presence_recheck_ms: 5000,
            absence_recheck_ms: 3333,
            max_consecutive_absences: 3,
            sound_threshold: 0.5,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "policy IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "policy parse error: {e}"),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl SessionPolicy {
    /// Load policy from a JSON file. Unspecified fields take defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let policy: SessionPolicy = serde_json::from_str(&content)?;
        Ok(policy)
    }

    pub fn presence_recheck(&self) -> Duration {
        Duration::from_millis(self.presence_recheck_ms)
    }

    pub fn absence_recheck(&self) -> Duration {
        Duration::from_millis(self.absence_recheck_ms)
    }

    /// How long the subject was out of frame when the vision path fails,
    /// for the user-facing failure message.
    pub fn absence_window(&self) -> Duration {
        Duration::from_millis(self.absence_recheck_ms * self.max_consecutive_absences as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_policy() {
        let p = SessionPolicy::default();
        assert_eq!(p.presence_label, "person");
        assert_eq!(p.presence_recheck_ms, 5000);
        assert_eq!(p.absence_recheck_ms, 3333);
        assert_eq!(p.max_consecutive_absences, 3);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let p: SessionPolicy =
            serde_json::from_str(r#"{"max_consecutive_absences": 5}"#).unwrap();
        assert_eq!(p.max_consecutive_absences, 5);
        assert_eq!(p.presence_recheck_ms, 5000);
    }

    #[test]
    fn absence_window_is_interval_times_count() {
        let p = SessionPolicy::default();
        assert_eq!(p.absence_window(), Duration::from_millis(9999));
    }
}
