// Moderation slash commands.
//
// Every admin command checks authorization here, in the host; the engine
// trusts its caller.

use super::{Context, Error};
use crate::core::moderation::ModerationEngine;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

const NOT_AUTHORIZED: &str = "❌ You must be an administrator to use this command.";

/// Whether the invoking member may run admin commands.
///
/// Slash command invocations carry the member's resolved permissions.
async fn is_authorized(ctx: Context<'_>) -> bool {
    match ctx.author_member().await {
        Some(member) => member
            .permissions
            .map(|p| p.administrator())
            .unwrap_or(false),
        None => false,
    }
}

fn room_engine(ctx: Context<'_>) -> Result<Arc<ModerationEngine>, Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    Ok(ctx.data().rooms.engine_for(guild_id.get())?)
}

/// Reply, then delete the reply after the policy's notice TTL.
async fn reply_briefly(
    ctx: Context<'_>,
    ttl: Option<Duration>,
    text: impl Into<String>,
) -> Result<(), Error> {
    let handle = ctx.say(text).await?;
    if let Some(ttl) = ttl {
        tokio::time::sleep(ttl).await;
        if let Err(e) = handle.delete(ctx).await {
            tracing::debug!("Failed to delete command reply: {}", e);
        }
    }
    Ok(())
}

/// Check a user's warnings.
#[poise::command(slash_command, guild_only)]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "User to check"] user: serenity::User,
) -> Result<(), Error> {
    let engine = room_engine(ctx)?;
    let count = engine.get_warning_count(user.id.get());

    reply_briefly(
        ctx,
        engine.policy().notice_ttl(),
        format!(
            "⚠️ <@{}> has {}/{} warnings.",
            user.id,
            count,
            engine.policy().max_warnings
        ),
    )
    .await
}

/// Clear a user's warnings (Admin only).
#[poise::command(slash_command, guild_only)]
pub async fn clearwarnings(
    ctx: Context<'_>,
    #[description = "User to clear warnings for"] user: serenity::User,
) -> Result<(), Error> {
    let engine = room_engine(ctx)?;
    let ttl = engine.policy().notice_ttl();
    if !is_authorized(ctx).await {
        return reply_briefly(ctx, ttl, NOT_AUTHORIZED).await;
    }

    engine
        .clear_warnings(user.id.get(), ctx.author().id.get())
        .await;
    reply_briefly(ctx, ttl, format!("✅ Warnings reset for <@{}>.", user.id)).await
}

/// Mute a user (Admin only).
#[poise::command(slash_command, guild_only)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "User to mute"] user: serenity::User,
) -> Result<(), Error> {
    let engine = room_engine(ctx)?;
    let ttl = engine.policy().notice_ttl();
    if !is_authorized(ctx).await {
        return reply_briefly(ctx, ttl, NOT_AUTHORIZED).await;
    }

    match engine
        .mute(user.id.get(), "Admin mute", ctx.author().id.get())
        .await
    {
        Ok(record) => {
            reply_briefly(
                ctx,
                ttl,
                format!(
                    "🔇 <@{}> has been muted by admin for {} minutes.",
                    user.id,
                    record.remaining().as_secs().div_ceil(60)
                ),
            )
            .await
        }
        Err(e) => {
            tracing::error!(user_id = user.id.get(), "Admin mute failed: {}", e);
            reply_briefly(ctx, ttl, format!("❌ Could not mute <@{}>: {}", user.id, e)).await
        }
    }
}

/// Unmute a user (Admin only).
#[poise::command(slash_command, guild_only)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "User to unmute"] user: serenity::User,
) -> Result<(), Error> {
    let engine = room_engine(ctx)?;
    let ttl = engine.policy().notice_ttl();
    if !is_authorized(ctx).await {
        return reply_briefly(ctx, ttl, NOT_AUTHORIZED).await;
    }

    let text = match engine.unmute(user.id.get(), ctx.author().id.get()).await {
        Ok(true) => format!("🔊 <@{}> has been unmuted by admin.", user.id),
        Ok(false) => format!("ℹ️ <@{}> is not muted.", user.id),
        Err(e) => {
            tracing::error!(user_id = user.id.get(), "Admin unmute failed: {}", e);
            format!("❌ Could not unmute <@{}>: {}", user.id, e)
        }
    };
    reply_briefly(ctx, ttl, text).await
}

/// Forget everything tracked for a user: warnings and message history (Admin only).
#[poise::command(slash_command, guild_only)]
pub async fn resetuser(
    ctx: Context<'_>,
    #[description = "User to reset"] user: serenity::User,
) -> Result<(), Error> {
    let engine = room_engine(ctx)?;
    let ttl = engine.policy().notice_ttl();
    if !is_authorized(ctx).await {
        return reply_briefly(ctx, ttl, NOT_AUTHORIZED).await;
    }

    engine.reset_user(user.id.get(), ctx.author().id.get()).await;
    reply_briefly(
        ctx,
        ttl,
        format!("♻️ Moderation state reset for <@{}>.", user.id),
    )
    .await
}

/// Show a user's moderation state and the active policy (Admin only).
#[poise::command(slash_command, guild_only)]
pub async fn modstatus(
    ctx: Context<'_>,
    #[description = "User to inspect"] user: serenity::User,
) -> Result<(), Error> {
    let engine = room_engine(ctx)?;
    if !is_authorized(ctx).await {
        return reply_briefly(ctx, engine.policy().notice_ttl(), NOT_AUTHORIZED).await;
    }

    let state = engine.user_state(user.id.get()).await;
    let policy = engine.policy();

    let mute_text = match state.active_mute_expiry {
        Some(expiry) => {
            let remaining = expiry.saturating_duration_since(tokio::time::Instant::now());
            format!("🔇 {} seconds remaining", remaining.as_secs())
        }
        None => "🔊 Not muted".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("🛡️ Moderation status for {}", user.name))
        .color(if state.active_mute_expiry.is_some() {
            0xFF0000
        } else {
            0x00FF00
        })
        .field(
            "Warnings",
            format!("{}/{}", state.warning_count, policy.max_warnings),
            true,
        )
        .field(
            "Recent messages",
            format!(
                "{} in the last {} seconds (limit {})",
                state.recent_message_timestamps.len(),
                policy.spam_time_window_seconds,
                policy.spam_message_limit
            ),
            true,
        )
        .field("Mute", mute_text, false)
        .field(
            "Escalation",
            format!(
                "{} warnings → {} minute mute",
                policy.max_warnings,
                policy.mute_duration_seconds / 60
            ),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
