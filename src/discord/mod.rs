use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serenity::all::{Context, EventHandler, GatewayIntents, GuildId, Message, Ready};
use thiserror::Error;
use tracing::instrument;

use crate::activity::ActivityLedger;
use crate::constants::STATUS_REFRESH_INTERVAL;
use crate::util::helix::Helix;

pub mod status;
pub mod watchtime;

use status::{Reconciler, SerenityStatusTarget};
use watchtime::{SerenityCommand, WatchtimeCommand, handle_watchtime};

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
}

/// Gateway event handler: starts the status reconciler once the cache is warm and answers
/// watchtime commands.
pub struct Handler {
    ledger: Arc<ActivityLedger>,
    helix: Helix,
    channel_login: String,
    reconciler_started: AtomicBool,
}

impl Handler {
    pub fn new(ledger: Arc<ActivityLedger>, helix: Helix, channel_login: &str) -> Self {
        Self {
            ledger,
            helix,
            channel_login: channel_login.to_string(),
            reconciler_started: AtomicBool::new(false),
        }
    }

    /// `true` for the first caller only; the reconciler runs once per process.
    fn claim_reconciler_start(&self) -> bool {
        !self.reconciler_started.swap(true, Ordering::SeqCst)
    }
}

/// Commands from other bots (including this one) are never handled.
fn watchtime_command(author_is_bot: bool, content: &str) -> Option<WatchtimeCommand> {
    if author_is_bot {
        return None;
    }

    WatchtimeCommand::parse(content)
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guild_count = ready.guilds.len(),
            "discord gateway ready"
        );
    }

    // fires again after a gateway reconnect, hence the guard
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        if !self.claim_reconciler_start() {
            tracing::debug!("stream status reconciler already running");
            return;
        }

        tracing::info!(guild_count = guilds.len(), "cache ready, starting stream status reconciler");

        let target = SerenityStatusTarget::new(Arc::clone(&ctx.http), Arc::clone(&ctx.cache));
        let reconciler = Reconciler::new(self.helix.clone(), target, &self.channel_login);
        tokio::spawn(reconciler.run(STATUS_REFRESH_INTERVAL));
    }

    #[instrument(skip(self, ctx, msg), fields(author = %msg.author.name, channel = %msg.channel_id))]
    async fn message(&self, ctx: Context, msg: Message) {
        let Some(command) = watchtime_command(msg.author.bot, &msg.content) else {
            return;
        };

        let command_ctx = SerenityCommand::new(&ctx, &msg);
        match handle_watchtime(&command_ctx, &self.ledger, command).await {
            Ok(outcome) => tracing::debug!(?outcome, "watchtime command handled"),
            Err(e) => tracing::error!(error = ?e, "unable to reply to watchtime command"),
        }
    }
}

pub type DiscordResult<T> = core::result::Result<T, DiscordErr>;

#[derive(Debug, Error)]
pub enum DiscordErr {
    #[error(transparent)]
    Serenity(#[from] serenity::Error),

    #[error("command was not issued in a guild")]
    NotInGuild,
}
