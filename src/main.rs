// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Moderation engine (platform-agnostic)
// - `infra/` = Policy loading
// - `discord/` = Discord-specific adapters (commands, events, collaborators)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::discord::moderation::{commands, message_handler, HostSettings, RoomEngines};
use crate::discord::{Data, Error};
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events.
/// Every guild message goes through the moderation engine.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        // A single bad message must never take the handler down.
        if let Err(e) = message_handler::handle_message(ctx, new_message, data).await {
            tracing::error!(
                message_id = new_message.id.get(),
                "Error moderating message: {}",
                e
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").context(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    )?;

    // Fail at boot on a bad policy rather than mid-stream.
    let policy = infra::moderation::load_policy().context("Invalid moderation policy")?;
    let settings = HostSettings::from_env();

    tracing::info!(
        max_warnings = policy.max_warnings,
        mute_duration_secs = policy.mute_duration_seconds,
        spam_message_limit = policy.spam_message_limit,
        spam_window_secs = policy.spam_time_window_seconds,
        content_patterns = policy.content_patterns.len(),
        "Moderation policy loaded"
    );

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::warnings(),
                commands::clearwarnings(),
                commands::mute(),
                commands::unmute(),
                commands::resetuser(),
                commands::modstatus(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!(bot = %ready.user.name, "Commands registered, bot is online");

                // The engines talk to Discord over the same HTTP client as the
                // framework, so they are built once the client exists.
                let rooms = RoomEngines::new(policy, settings, Arc::clone(&ctx.http));
                Ok(Data {
                    rooms: Arc::new(rooms),
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
