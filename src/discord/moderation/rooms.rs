// One moderation engine per guild, created the first time the guild is seen.

use super::collaborators::{DiscordAuditLog, DiscordMutedRole, DiscordNotifier};
use crate::core::moderation::{Collaborators, ModerationEngine, ModerationError, ModerationPolicy};
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Discord-side settings that are not part of the moderation policy.
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Name of the text channel that receives the audit trail
    pub mod_log_channel: String,
    /// Name of the role used to mute users
    pub muted_role_name: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            mod_log_channel: "mod-logs".to_string(),
            muted_role_name: "Muted".to_string(),
        }
    }
}

impl HostSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mod_log_channel: std::env::var("MOD_LOG_CHANNEL").unwrap_or(defaults.mod_log_channel),
            muted_role_name: std::env::var("MUTED_ROLE_NAME").unwrap_or(defaults.muted_role_name),
        }
    }
}

pub struct RoomEngines {
    policy: ModerationPolicy,
    settings: HostSettings,
    http: Arc<serenity::Http>,
    engines: DashMap<u64, Arc<ModerationEngine>>,
}

impl RoomEngines {
    pub fn new(policy: ModerationPolicy, settings: HostSettings, http: Arc<serenity::Http>) -> Self {
        Self {
            policy,
            settings,
            http,
            engines: DashMap::new(),
        }
    }

    /// The engine for a guild, building it (and its collaborators) on first use.
    pub fn engine_for(&self, guild_id: u64) -> Result<Arc<ModerationEngine>, ModerationError> {
        if let Some(engine) = self.engines.get(&guild_id) {
            return Ok(Arc::clone(engine.value()));
        }

        let entry = self.engines.entry(guild_id);
        let engine = match entry {
            dashmap::mapref::entry::Entry::Occupied(e) => Arc::clone(e.get()),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let engine = Arc::new(ModerationEngine::new(
                    self.policy.clone(),
                    self.collaborators_for(guild_id),
                )?);
                tracing::info!(guild_id, "Moderation engine started for guild");
                Arc::clone(e.insert(engine).value())
            }
        };
        Ok(engine)
    }

    fn collaborators_for(&self, guild_id: u64) -> Collaborators {
        Collaborators {
            notifier: Arc::new(DiscordNotifier::new(Arc::clone(&self.http))),
            audit: Arc::new(DiscordAuditLog::new(
                Arc::clone(&self.http),
                guild_id,
                self.settings.mod_log_channel.clone(),
            )),
            restrictions: Arc::new(DiscordMutedRole::new(
                Arc::clone(&self.http),
                guild_id,
                self.settings.muted_role_name.clone(),
            )),
        }
    }
}
