// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Moderation logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, config file)
// - `discord/` = Discord-specific adapters (commands, events, enforcement)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Start background tasks (persistence, config watcher, maintenance)

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{
    run_persistence_worker, ActorId, ConfigHandle, ModerationEngine, ModerationStore,
    PersistenceQueue,
};
use crate::discord::moderation::events as moderation_events;
use crate::discord::{Data, Error};
use crate::infra::moderation::{load_config, watch_config_file, SqliteModerationStore};
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = moderation_events::handle_message(ctx, data, new_message).await {
                tracing::error!("Error moderating message: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = moderation_events::handle_member_join(ctx, data, new_member).await {
                tracing::error!("Error handling member join: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime files in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory");

    let config_path = PathBuf::from(
        std::env::var("MODERATION_CONFIG_PATH")
            .unwrap_or_else(|_| format!("{}/moderation.json", data_dir)),
    );
    let db_path = std::env::var("MODERATION_DB_PATH")
        .unwrap_or_else(|_| format!("{}/moderation.db", data_dir));
    let poll_every = Duration::from_secs(env_or("MODERATION_CONFIG_POLL_SECS", 30u64).max(1));
    let write_timeout = Duration::from_millis(env_or("MODERATION_PERSIST_TIMEOUT_MS", 2_000u64));

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let settings = load_config(&config_path).expect("Failed to load moderation config");
    let config = Arc::new(ConfigHandle::new(settings).expect("Invalid moderation config"));

    let store = Arc::new(
        SqliteModerationStore::connect(&db_path)
            .await
            .expect("Failed to initialize moderation database"),
    );

    let (queue, receiver) = PersistenceQueue::new();
    let health = queue.health();
    let engine = Arc::new(ModerationEngine::new(Arc::clone(&config), queue));

    // Rebuild warnings and mutes from the last run before any event arrives.
    let snapshot = store
        .load_snapshot()
        .await
        .expect("Failed to load moderation ledger");
    engine.restore(snapshot);

    tokio::spawn(run_persistence_worker(
        Arc::clone(&store),
        receiver,
        write_timeout,
        health,
    ));

    tokio::spawn(watch_config_file(
        Arc::clone(&engine),
        config_path.clone(),
        poll_every,
    ));

    // Create the data structure that will be shared across all commands
    let data = Data {
        moderation: Arc::clone(&engine),
        store: Arc::clone(&store),
        config_path,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS; // Required for join events

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![discord::moderation::commands::moderation()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up as {}", ready.user.name);

                // Our own messages are never moderated.
                data.moderation
                    .register_system_actor(ActorId::from(ready.user.id.get()));

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // Housekeeping: evict idle rate windows and drop expired mutes.
                let engine = Arc::clone(&data.moderation);
                tokio::spawn(async move {
                    use tokio::time::sleep;

                    loop {
                        sleep(Duration::from_secs(60)).await;
                        engine.maintenance(chrono::Utc::now());
                    }
                });

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
