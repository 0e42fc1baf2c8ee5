// Discord implementations of the moderation ports.
//
// - Notices go to the channel the violation happened in and are deleted
//   after the policy's notice TTL.
// - The audit trail is the guild's mod-log text channel (looked up by name).
// - The restriction is a "Muted" role that is denied Send Messages / Speak
//   in every channel; it is created on first use.

use crate::core::moderation::{
    Audience, AuditSink, CollaboratorError, NotificationSink, RestrictionGateway, UserId,
};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn discord_error(e: serenity::Error) -> CollaboratorError {
    CollaboratorError::new(e.to_string())
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

pub struct DiscordNotifier {
    http: Arc<serenity::Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn notify(
        &self,
        audience: Audience,
        text: &str,
        auto_delete_after: Option<Duration>,
    ) -> Result<(), CollaboratorError> {
        let channel_id = match audience {
            Audience::Channel(id) => serenity::ChannelId::new(id),
            Audience::User(id) => {
                serenity::UserId::new(id)
                    .create_dm_channel(&self.http)
                    .await
                    .map_err(discord_error)?
                    .id
            }
        };

        let message = channel_id
            .say(&self.http, text)
            .await
            .map_err(discord_error)?;

        if let Some(ttl) = auto_delete_after {
            // Delete in the background so enforcement is not held up.
            let http = Arc::clone(&self.http);
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Err(e) = message.delete(&http).await {
                    tracing::warn!("Failed to delete moderation notice: {}", e);
                }
            });
        }

        Ok(())
    }

    fn mention(&self, user_id: UserId) -> String {
        format!("<@{}>", user_id)
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

pub struct DiscordAuditLog {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
    channel_name: String,
}

impl DiscordAuditLog {
    pub fn new(http: Arc<serenity::Http>, guild_id: u64, channel_name: impl Into<String>) -> Self {
        Self {
            http,
            guild_id: serenity::GuildId::new(guild_id),
            channel_name: channel_name.into(),
        }
    }
}

#[async_trait]
impl AuditSink for DiscordAuditLog {
    async fn log_action(&self, text: &str) -> Result<(), CollaboratorError> {
        let channels = self
            .guild_id
            .channels(&self.http)
            .await
            .map_err(discord_error)?;

        let log_channel = channels
            .values()
            .find(|c| c.kind == serenity::ChannelType::Text && c.name == self.channel_name);

        match log_channel {
            Some(channel) => {
                channel.say(&self.http, text).await.map_err(discord_error)?;
            }
            None => {
                // Guilds without a log channel simply don't get an audit trail.
                tracing::debug!(
                    guild_id = self.guild_id.get(),
                    "No #{} channel, skipping audit entry",
                    self.channel_name
                );
            }
        }
        Ok(())
    }
}

// ============================================================================
// RESTRICTION (MUTED ROLE)
// ============================================================================

pub struct DiscordMutedRole {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
    role_name: String,
    /// Resolved role id, looked up (or created) once per guild.
    role_id: Mutex<Option<serenity::RoleId>>,
}

impl DiscordMutedRole {
    pub fn new(http: Arc<serenity::Http>, guild_id: u64, role_name: impl Into<String>) -> Self {
        Self {
            http,
            guild_id: serenity::GuildId::new(guild_id),
            role_name: role_name.into(),
            role_id: Mutex::new(None),
        }
    }

    async fn resolve_role(&self) -> Result<serenity::RoleId, CollaboratorError> {
        let mut cached = self.role_id.lock().await;
        if let Some(id) = *cached {
            return Ok(id);
        }

        let roles = self.guild_id.roles(&self.http).await.map_err(discord_error)?;
        let id = match roles.values().find(|r| r.name == self.role_name) {
            Some(role) => role.id,
            None => {
                let role = self
                    .guild_id
                    .create_role(
                        &self.http,
                        serenity::EditRole::new().name(self.role_name.clone()),
                    )
                    .await
                    .map_err(discord_error)?;
                tracing::info!(
                    guild_id = self.guild_id.get(),
                    role_id = role.id.get(),
                    "Created {} role",
                    self.role_name
                );
                self.deny_in_all_channels(role.id).await?;
                role.id
            }
        };

        *cached = Some(id);
        Ok(id)
    }

    async fn deny_in_all_channels(&self, role_id: serenity::RoleId) -> Result<(), CollaboratorError> {
        let channels = self
            .guild_id
            .channels(&self.http)
            .await
            .map_err(discord_error)?;

        for channel in channels.values() {
            let overwrite = serenity::PermissionOverwrite {
                allow: serenity::Permissions::empty(),
                deny: serenity::Permissions::SEND_MESSAGES | serenity::Permissions::SPEAK,
                kind: serenity::PermissionOverwriteType::Role(role_id),
            };
            if let Err(e) = channel.create_permission(&self.http, overwrite).await {
                tracing::warn!(
                    channel_id = channel.id.get(),
                    "Failed to restrict muted role in channel: {}",
                    e
                );
            }
        }
        Ok(())
    }

    /// Forget the cached role so the next call looks it up again
    /// (e.g. after someone deleted the role by hand).
    async fn forget_role(&self) {
        *self.role_id.lock().await = None;
    }
}

#[async_trait]
impl RestrictionGateway for DiscordMutedRole {
    async fn ensure_restriction_role_exists(&self) -> Result<(), CollaboratorError> {
        self.resolve_role().await.map(|_| ())
    }

    async fn grant_restriction(&self, user_id: UserId) -> Result<(), CollaboratorError> {
        let role_id = self.resolve_role().await?;
        let result = self
            .http
            .add_member_role(
                self.guild_id,
                serenity::UserId::new(user_id),
                role_id,
                Some("Moderation mute"),
            )
            .await;

        if let Err(e) = result {
            self.forget_role().await;
            return Err(discord_error(e));
        }
        Ok(())
    }

    async fn revoke_restriction(&self, user_id: UserId) -> Result<(), CollaboratorError> {
        let role_id = self.resolve_role().await?;
        self.http
            .remove_member_role(
                self.guild_id,
                serenity::UserId::new(user_id),
                role_id,
                Some("Moderation mute lifted"),
            )
            .await
            .map_err(discord_error)
    }
}
