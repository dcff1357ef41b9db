use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::all::{Cache, ChannelId, ChannelType, EditChannel, Http};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use crate::constants::STATUS_CHANNEL_PREFIX;
use crate::discord::{DiscordErr, DiscordResult};
use crate::util::helix::{HelixErr, HelixStream, StreamLookup};

/// Live status of the tracked channel, derived fresh on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatus {
    pub is_live: bool,
    pub viewer_count: u64,
}

impl StreamStatus {
    /// Only the first record matters; Helix returns at most one per login.
    pub fn from_streams(streams: &[HelixStream]) -> Self {
        match streams.first() {
            Some(stream) => Self {
                is_live: true,
                viewer_count: stream.viewer_count,
            },
            None => Self {
                is_live: false,
                viewer_count: 0,
            },
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_live {
            write!(f, "🔴 LIVE | {} viewers", self.viewer_count)
        } else {
            f.write_str("⚪ OFFLINE")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u64,
    pub name: String,
    pub is_text: bool,
}

/// Channels whose name can carry the stream status.
#[async_trait]
pub trait StatusTarget: Send + Sync {
    /// Every channel visible to the bot, in display order.
    async fn channels(&self) -> DiscordResult<Vec<ChannelInfo>>;

    async fn rename_channel(&self, channel_id: u64, name: &str) -> DiscordResult<()>;
}

/// First text channel whose current name starts with the status prefix.
pub fn find_status_channel(channels: &[ChannelInfo]) -> Option<&ChannelInfo> {
    channels
        .iter()
        .find(|ch| ch.is_text && ch.name.starts_with(STATUS_CHANNEL_PREFIX))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub channel_id: u64,
    pub status: String,
}

pub struct Reconciler<S, T> {
    streams: S,
    target: T,
    login: String,
}

impl<S, T> Reconciler<S, T>
where
    S: StreamLookup,
    T: StatusTarget,
{
    pub fn new(streams: S, target: T, login: &str) -> Self {
        Self {
            streams,
            target,
            login: login.to_string(),
        }
    }

    /// One pass: fetch live status, locate the status channel, rename it. The channel is looked
    /// up again every time rather than remembered.
    #[instrument(skip(self), fields(login = %self.login))]
    pub async fn reconcile(&self) -> ReconcileResult<Reconciled> {
        let streams = self.streams.live_streams(&self.login).await?;
        if let Some(live) = streams.first() {
            tracing::debug!(
                id = %live.id,
                login = %live.login,
                title = %live.title,
                game = %live.game,
                "stream is live"
            );
        }

        let status = StreamStatus::from_streams(&streams).to_string();

        let channels = self.target.channels().await?;
        let channel = find_status_channel(&channels).ok_or(ReconcileErr::ChannelNotFound {
            prefix: STATUS_CHANNEL_PREFIX,
        })?;

        self.target.rename_channel(channel.id, &status).await?;

        Ok(Reconciled {
            channel_id: channel.id,
            status,
        })
    }

    /// Reconciles immediately, then once per `period`. A failed cycle is logged and otherwise
    /// ignored; the next tick is the only retry.
    pub async fn run(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            report(&self.reconcile().await);
        }
    }
}

fn report(outcome: &ReconcileResult<Reconciled>) {
    match outcome {
        Ok(done) => tracing::info!(
            status = %done.status,
            channel = done.channel_id,
            "stream status updated"
        ),
        Err(ReconcileErr::ChannelNotFound { prefix }) => {
            tracing::error!(prefix, "status channel not found")
        }
        Err(e) => tracing::error!(error = ?e, "failed to update stream status"),
    }
}

/// Channel access backed by the gateway cache, renames through the REST client.
#[derive(Clone)]
pub struct SerenityStatusTarget {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityStatusTarget {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

#[async_trait]
impl StatusTarget for SerenityStatusTarget {
    async fn channels(&self) -> DiscordResult<Vec<ChannelInfo>> {
        let mut found = Vec::new();

        for guild_id in self.cache.guilds() {
            let Some(guild) = self.cache.guild(guild_id) else {
                continue;
            };

            let mut channels: Vec<_> = guild.channels.values().collect();
            channels.sort_by_key(|ch| (ch.position, ch.id));

            found.extend(channels.into_iter().map(|ch| ChannelInfo {
                id: ch.id.get(),
                name: ch.name.clone(),
                is_text: ch.kind == ChannelType::Text,
            }));
        }

        Ok(found)
    }

    #[instrument(skip(self))]
    async fn rename_channel(&self, channel_id: u64, name: &str) -> DiscordResult<()> {
        ChannelId::new(channel_id)
            .edit(&self.http, EditChannel::new().name(name))
            .await
            .map_err(DiscordErr::from)?;

        Ok(())
    }
}

pub type ReconcileResult<T> = core::result::Result<T, ReconcileErr>;

#[derive(Debug, Error)]
pub enum ReconcileErr {
    #[error("while fetching stream status: {0}")]
    Helix(#[from] HelixErr),

    #[error(transparent)]
    Discord(#[from] DiscordErr),

    #[error("no text channel name starts with '{prefix}'")]
    ChannelNotFound { prefix: &'static str },
}
