// Moderation policy - the process-wide configuration of the engine.
//
// Loaded once at startup (defaults -> optional JSON file -> env overrides)
// and validated before any engine is built, so a bad threshold or a broken
// pattern stops the bot at boot instead of surfacing mid-stream.

use super::content_classifier::ContentClassifier;
use super::moderation_models::ModerationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Obfuscation-tolerant patterns shipped with the bot. Each letter class
/// accepts common digit/symbol substitutions and `\W*` tolerates separators.
pub const DEFAULT_CONTENT_PATTERNS: &[&str] = &[
    r"n+\W*[i1!]+\W*[gq9]+\W*[e3a]+\W*[r]+",
    r"f+\W*[a@4]+\W*[gq9]+\W*[o0]+\W*[t]+",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModerationPolicy {
    /// Warnings before an automatic mute
    pub max_warnings: u32,
    /// How long an automatic mute lasts
    pub mute_duration_seconds: u64,
    /// Messages inside the window that count as spam
    pub spam_message_limit: u32,
    /// Sliding window for spam detection
    pub spam_time_window_seconds: u64,
    /// Ordered regex patterns for disallowed content
    pub content_patterns: Vec<String>,
    /// How long bot notices stay visible before being deleted
    pub notice_ttl_seconds: u64,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            max_warnings: 5,
            mute_duration_seconds: 300, // 5 minutes
            spam_message_limit: 5,      // 5 messages...
            spam_time_window_seconds: 7, // ...in 7 seconds
            content_patterns: DEFAULT_CONTENT_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            notice_ttl_seconds: 5,
        }
    }
}

impl ModerationPolicy {
    pub fn mute_duration(&self) -> Duration {
        Duration::from_secs(self.mute_duration_seconds)
    }

    pub fn spam_window(&self) -> Duration {
        Duration::from_secs(self.spam_time_window_seconds)
    }

    pub fn notice_ttl(&self) -> Option<Duration> {
        if self.notice_ttl_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.notice_ttl_seconds))
        }
    }

    /// Apply overrides from environment variables on top of this policy.
    ///
    /// Unset variables keep the current value; set-but-unparseable ones are
    /// a misconfiguration rather than being silently ignored.
    pub fn with_env_overrides(self) -> Result<Self, ModerationError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Same as `with_env_overrides` but reading from an arbitrary lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ModerationError> {
        if let Some(v) = parse_override(&lookup, "MAX_WARNINGS")? {
            self.max_warnings = v;
        }
        if let Some(v) = parse_override(&lookup, "MUTE_DURATION_SECONDS")? {
            self.mute_duration_seconds = v;
        }
        if let Some(v) = parse_override(&lookup, "SPAM_MESSAGE_LIMIT")? {
            self.spam_message_limit = v;
        }
        if let Some(v) = parse_override(&lookup, "SPAM_TIME_WINDOW_SECONDS")? {
            self.spam_time_window_seconds = v;
        }
        if let Some(v) = parse_override(&lookup, "NOTICE_TTL_SECONDS")? {
            self.notice_ttl_seconds = v;
        }
        Ok(self)
    }

    /// Reject thresholds that would make the engine meaningless and compile
    /// every pattern once so regex errors surface at load time.
    pub fn validate(&self) -> Result<(), ModerationError> {
        if self.max_warnings == 0 {
            return Err(misconfigured("max_warnings must be at least 1"));
        }
        if self.mute_duration_seconds == 0 {
            return Err(misconfigured("mute_duration_seconds must be at least 1"));
        }
        if self.spam_message_limit == 0 {
            return Err(misconfigured("spam_message_limit must be at least 1"));
        }
        if self.spam_time_window_seconds == 0 {
            return Err(misconfigured("spam_time_window_seconds must be at least 1"));
        }
        ContentClassifier::from_patterns(&self.content_patterns)?;
        Ok(())
    }
}

fn misconfigured(message: &str) -> ModerationError {
    ModerationError::PolicyMisconfiguration(message.to_string())
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ModerationError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ModerationError::PolicyMisconfiguration(format!("{key} has invalid value '{raw}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let policy = ModerationPolicy::default();
        assert_eq!(policy.max_warnings, 5);
        assert_eq!(policy.mute_duration_seconds, 300);
        assert_eq!(policy.spam_message_limit, 5);
        assert_eq!(policy.spam_time_window_seconds, 7);
        assert_eq!(policy.content_patterns.len(), 2);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let policy = ModerationPolicy {
            max_warnings: 0,
            ..Default::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(ModerationError::PolicyMisconfiguration(_))
        ));

        let policy = ModerationPolicy {
            spam_time_window_seconds: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_broken_pattern_is_rejected() {
        let policy = ModerationPolicy {
            content_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(ModerationError::PolicyMisconfiguration(_))
        ));
    }

    #[test]
    fn test_overrides_apply_and_reject_garbage() {
        let vars: HashMap<&str, &str> = [("MAX_WARNINGS", "3"), ("SPAM_TIME_WINDOW_SECONDS", " 10 ")]
            .into_iter()
            .collect();
        let policy = ModerationPolicy::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(policy.max_warnings, 3);
        assert_eq!(policy.spam_time_window_seconds, 10);
        assert_eq!(policy.mute_duration_seconds, 300);

        let result = ModerationPolicy::default().with_overrides(|k| {
            (k == "SPAM_MESSAGE_LIMIT").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_ttl_disables_auto_delete() {
        let policy = ModerationPolicy {
            notice_ttl_seconds: 0,
            ..Default::default()
        };
        assert_eq!(policy.notice_ttl(), None);
    }
}
