use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use irc::client::prelude::*;
use irc::proto::CapSubCommand;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::activity::ActivityLedger;
use crate::constants::{
    IRC_PING_SECS, RECONNECT_DELAY, REJOIN_CHECK_INTERVAL, TTV_IRC_PORT, TTV_IRC_URI,
};
use crate::irc::event::{ChatEvent, ingest};

/// Connection settings for the chat bot, taken from the environment at startup.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub login: String,
    pub password: String,
    pub channel: String,
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
}

impl ChatSettings {
    /// Settings for Twitch's TLS chat endpoint.
    pub fn new(login: &str, password: &str, channel: &str) -> Self {
        Self {
            login: login.to_string(),
            password: password.to_string(),
            channel: channel.to_string(),
            server: TTV_IRC_URI.to_string(),
            port: TTV_IRC_PORT,
            use_tls: true,
        }
    }
}

/// Runs the chat ingest loop forever: connect, count messages until the stream drops, wait a
/// fixed delay, reconnect.
#[instrument(skip(settings, ledger), fields(channel = %settings.channel))]
pub async fn run_chat_ingest(settings: ChatSettings, ledger: Arc<ActivityLedger>) {
    loop {
        match IrcConnection::init(&settings).await {
            Ok(mut conn) => {
                if let Err(e) = conn.read_loop(&ledger).await {
                    tracing::error!(error = ?e, id = %conn.id, "chat connection failed");
                } else {
                    tracing::warn!(id = %conn.id, "chat stream ended");
                }
            }
            Err(e) => tracing::error!(error = ?e, "unable to open chat connection"),
        }

        tracing::info!(delay = ?RECONNECT_DELAY, "reconnecting to chat");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[derive(Debug)]
pub struct IrcConnection {
    pub client: Client,
    pub channels: Vec<String>,
    pub login: String,
    pub id: Uuid,
}

impl IrcConnection {
    #[instrument(skip(settings))]
    pub async fn init(settings: &ChatSettings) -> IrcResult<Self> {
        let config = Config {
            use_tls: Some(settings.use_tls),
            nickname: Some(settings.login.clone()),
            password: Some(settings.password.clone()),
            server: Some(settings.server.clone()),
            port: Some(settings.port),
            ping_time: Some(IRC_PING_SECS),
            ..Config::default()
        };

        let client = Client::from_config(config).await?;
        let id = Uuid::new_v4();
        tracing::info!(%id, "chat client created");

        Ok(Self {
            client,
            channels: vec![format!("#{}", settings.channel)],
            login: settings.login.to_lowercase(),
            id,
        })
    }

    #[instrument(skip(self), fields(id = %self.id))]
    pub fn connect(&mut self) -> IrcResult<()> {
        self.client.identify()?;
        self.client.send_cap_req(&[
            TtvCap::Commands.into(),
            TtvCap::Membership.into(),
            TtvCap::Tags.into(),
        ])?;

        Ok(())
    }

    /// Reads the connection until the server stream ends. Returns an error when the stream
    /// yields one, so the caller can log it before reconnecting.
    #[instrument(skip(self, ledger), fields(id = %self.id))]
    pub async fn read_loop(&mut self, ledger: &ActivityLedger) -> IrcResult<()> {
        self.connect()?;
        let mut stream = self.client.stream()?;

        let mut check_interval = tokio::time::interval(REJOIN_CHECK_INTERVAL);
        check_interval.tick().await;

        loop {
            tokio::select! {
                msg_res = stream.next() => {
                    match msg_res {
                        Some(Ok(msg)) => self.handle_message(&msg, ledger).await?,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }

                _ = check_interval.tick() => {
                    if let Err(e) = self.rejoin_channels() {
                        tracing::error!(error = ?e, "channel rejoin failure");
                    }
                }
            }
        }
    }

    #[instrument(skip(self, msg, ledger))]
    async fn handle_message(&self, msg: &Message, ledger: &ActivityLedger) -> IrcResult<()> {
        match &msg.command {
            Command::PRIVMSG(_, _) => {
                if let Some(event) = ChatEvent::from_message(msg, &self.login) {
                    ingest(ledger, &event).await;
                }
            }

            Command::CAP(_, result, caps, _) => match result {
                CapSubCommand::ACK => {
                    if let Some(caps) = caps {
                        tracing::info!("CAP REQ {} ok", caps);
                    }

                    if self.get_joined().is_empty() {
                        self.join_channels(self.channels.clone())?;
                    }
                }

                CapSubCommand::NAK => tracing::warn!("CAP REQ {:?} invalid", caps),

                _ => tracing::debug!(?result, "unhandled CAP response"),
            },

            Command::NOTICE(target, notice) => {
                tracing::warn!(notice_target = %target, notice = %notice, "RX NOTICE");
            }

            Command::JOIN(channel, _, _) => {
                if let Some(nick) = msg.source_nickname()
                    && nick.eq_ignore_ascii_case(&self.login)
                {
                    tracing::info!(channel = %channel, "joined chat");
                }
            }

            Command::PART(channel, _) => {
                if let Some(nick) = msg.source_nickname()
                    && nick.eq_ignore_ascii_case(&self.login)
                {
                    tracing::warn!(channel = %channel, "parted chat");
                }
            }

            _ => tracing::trace!(command = ?msg.command, "IRC received generic cmd"),
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub fn join_channels(&self, channels: Vec<String>) -> IrcResult<()> {
        tracing::info!("sending join");
        self.client.send_join(channels.join(","))?;

        Ok(())
    }

    pub fn get_joined(&self) -> Vec<String> {
        self.client.list_channels().unwrap_or_default()
    }

    #[instrument(skip(self))]
    fn rejoin_channels(&self) -> IrcResult<()> {
        let joined: HashSet<String> = self
            .get_joined()
            .into_iter()
            .map(|ch| ch.to_lowercase())
            .collect();
        let missing = missing_channels(&self.channels, &joined);

        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "trying channel rejoin");
            self.join_channels(missing)?;
        } else {
            tracing::debug!(joined_count = joined.len(), "all channels appear joined");
        }

        Ok(())
    }
}

fn missing_channels(expected: &[String], joined: &HashSet<String>) -> Vec<String> {
    expected
        .iter()
        .filter(|ch| !joined.contains(&ch.to_lowercase()))
        .cloned()
        .collect()
}

pub type IrcResult<T> = core::result::Result<T, IrcClientErr>;

#[derive(Debug, Error)]
pub enum IrcClientErr {
    #[error(transparent)]
    ClientError(#[from] irc::error::Error),
}

#[derive(Debug)]
pub enum TtvCap {
    Tags,
    Commands,
    Membership,
}

impl From<TtvCap> for Capability {
    fn from(value: TtvCap) -> Self {
        match value {
            TtvCap::Tags => Capability::Custom("twitch.tv/tags"),
            TtvCap::Commands => Capability::Custom("twitch.tv/commands"),
            TtvCap::Membership => Capability::Custom("twitch.tv/membership"),
        }
    }
}
