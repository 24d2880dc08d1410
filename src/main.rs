use poise::futures_util::lock::Mutex;
use poise::serenity_prelude as serenity;
use serenity::all::FullEvent;
use std::env;

mod commands;
mod helpers;

mod structs;
mod types;
use types::{Data, Error};

use crate::commands::all_commands;
use crate::helpers::starboard::Database;
use crate::helpers::starboard_manager::{handle_reaction_add, handle_reaction_remove};

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match &error {
        poise::FrameworkError::Setup { error, .. } => panic!("Failed to start bot: {}", error),
        poise::FrameworkError::Command { ctx, error, .. }
        | poise::FrameworkError::ArgumentParse { ctx, error, .. } => {
            log::error!("Command failed: `{}`: {:?}", ctx.command().name, error);
        }
        _ => {
            if let Err(e) = poise::builtins::on_error(error).await {
                log::error!("Unknown error {}", e);
            }
        }
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::ReactionAdd { add_reaction } => {
            handle_reaction_add(ctx, add_reaction, data).await?;
        }
        FullEvent::ReactionRemove { removed_reaction } => {
            handle_reaction_remove(ctx, removed_reaction, data).await?;
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let mut log_builder = pretty_env_logger::formatted_timed_builder();
    log_builder.parse_filters(&log_level);
    if log_builder.try_init().is_err() {
        eprintln!("Tried to init logger twice!");
    }

    let token = env::var("DISCORD_TOKEN").expect("Missing DISCORD_TOKEN");

    let db_url = env::var("DATABASE_URL").expect("Missing DATABASE_URL");

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: all_commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let starboard = Database::new(&db_url).await?;

                Ok(Data {
                    starboard,
                    starboard_lock: Mutex::new(()),
                })
            })
        })
        .build();

    let mut client = serenity::Client::builder(token, intents)
        .framework(framework)
        .await?;

    client.start().await?;

    Ok(())
}
