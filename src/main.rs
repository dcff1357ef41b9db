use std::sync::Arc;

use serenity::Client;
use thiserror::Error;

use crate::activity::ActivityLedger;
use crate::irc::{ChatSettings, run_chat_ingest};
use crate::util::env::{Env, EnvErr};
use crate::util::helix::{Helix, HelixErr};
use crate::util::telemetry;

mod activity;
mod constants;
mod discord;
mod irc;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Helix(#[from] HelixErr),

    #[error(transparent)]
    Discord(#[from] serenity::Error),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let env = Env::new()?;
    let telemetry_registry = telemetry::Telemetry::new(&env)?.register();

    tracing::info!(env = ?env, "starting watchtime bridge");

    let ledger = Arc::new(ActivityLedger::new());
    let channel_login = env.channel_login();
    let helix = Helix::new(&env.twitch_client_id, &env.twitch_access_token)?;

    let chat_settings =
        ChatSettings::new(&env.twitch_bot_username, &env.irc_password(), &channel_login);
    let chat_handle = tokio::spawn(run_chat_ingest(chat_settings, Arc::clone(&ledger)));

    let handler = discord::Handler::new(Arc::clone(&ledger), helix, &channel_login);
    let mut client = Client::builder(&env.discord_bot_token, discord::intents())
        .event_handler(handler)
        .await?;
    let shard_manager = Arc::clone(&client.shard_manager);

    tokio::select! {
        res = client.start() => {
            if let Err(e) = res {
                tracing::error!(error = ?e, "discord client stopped");
            }
        }

        _ = tokio::signal::ctrl_c() => {
            let chatters = ledger.len().await;
            tracing::info!(chatters, "shutting down");
            shard_manager.shutdown_all().await;
        }
    }

    chat_handle.abort();
    telemetry_registry.shutdown();
    Ok(())
}
