// Discord-specific message handling - runs every guild message through the
// room's engine and applies the result.

use super::Data;
use crate::core::moderation::{Audience, ChatMessage, Decision};
use crate::discord::Error;
use poise::serenity_prelude as serenity;
use tokio::time::Instant;

/// Moderate a message.
///
/// Returns `true` if the message violated a policy and was handled.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    // Skip bots (including ourselves)
    if msg.author.bot {
        return Ok(false);
    }

    // Only moderate guild messages
    let guild_id = match msg.guild_id {
        Some(id) => id.get(),
        None => return Ok(false),
    };

    let engine = data.rooms.engine_for(guild_id)?;
    let user_id = msg.author.id.get();

    // Stamp with our monotonic clock on receipt so the spam window is not
    // affected by platform clock skew.
    let message = ChatMessage::new(user_id, msg.content.clone(), Instant::now());
    let violation = match engine.evaluate(&message)? {
        Decision::Allow => return Ok(false),
        Decision::Violation(violation) => violation,
    };

    if let Err(e) = msg.delete(&ctx.http).await {
        tracing::warn!("Failed to delete violating message: {}", e);
    }

    let outcome = engine
        .enforce(user_id, &violation, Audience::Channel(msg.channel_id.get()))
        .await?;

    if let Some(mute) = &outcome.mute {
        tracing::info!(
            user_id,
            guild_id,
            expires_at = %mute.expires_at_utc,
            "User muted after reaching max warnings"
        );
    }

    Ok(true)
}
