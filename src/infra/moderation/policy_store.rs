// JSON file store for the moderation policy.
//
// The policy file is optional: missing fields fall back to the defaults in
// `ModerationPolicy`, so a file containing only `content_patterns` is valid.

use crate::core::moderation::ModerationPolicy;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct JsonPolicyStore {
    path: PathBuf,
}

impl JsonPolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the policy. A missing file yields the defaults.
    pub fn load(&self) -> Result<ModerationPolicy> {
        if !self.path.exists() {
            tracing::info!(
                "No moderation policy at {}, using defaults",
                self.path.display()
            );
            return Ok(ModerationPolicy::default());
        }

        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let policy: ModerationPolicy = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(policy)
    }

    #[allow(dead_code)]
    pub fn save(&self, policy: &ModerationPolicy) -> Result<()> {
        let file = std::fs::File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        serde_json::to_writer_pretty(file, policy)?;
        Ok(())
    }
}

/// Resolve the process-wide policy: defaults, then the JSON file named by
/// `MODERATION_POLICY_FILE` (if set), then individual env overrides.
/// The result is validated before it is returned.
pub fn load_policy() -> Result<ModerationPolicy> {
    let base = match std::env::var("MODERATION_POLICY_FILE") {
        Ok(path) => JsonPolicyStore::new(path).load()?,
        Err(_) => ModerationPolicy::default(),
    };

    let policy = base.with_env_overrides()?;
    policy.validate()?;
    Ok(policy)
}
