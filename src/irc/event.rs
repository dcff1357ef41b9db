use irc::client::prelude::*;
use tracing::instrument;

use crate::activity::ActivityLedger;

/// One chat line from the streaming platform, reduced to what the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub channel: String,
    pub tags: ChatTags,
    pub message: String,
    pub is_self: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatTags {
    pub user_id: Option<String>,
    pub login: Option<String>,
    pub display_name: Option<String>,
}

impl ChatEvent {
    /// Builds an event from a `PRIVMSG`; any other command yields `None`.
    pub fn from_message(msg: &Message, bot_login: &str) -> Option<Self> {
        let Command::PRIVMSG(channel, content) = &msg.command else {
            return None;
        };

        let tags = parse_tags(msg);
        let is_self = tags
            .login
            .as_deref()
            .is_some_and(|login| login.eq_ignore_ascii_case(bot_login));

        Some(Self {
            channel: channel.trim_start_matches('#').to_string(),
            tags,
            message: content.to_string(),
            is_self,
        })
    }

    /// Display name when Twitch sent a non-empty one, otherwise the login.
    pub fn username(&self) -> Option<&str> {
        self.tags
            .display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.tags.login.as_deref())
            .filter(|name| !name.is_empty())
    }
}

fn parse_tags(msg: &Message) -> ChatTags {
    let mut result = ChatTags {
        login: msg.source_nickname().map(str::to_string),
        ..ChatTags::default()
    };

    for tag in msg.tags.iter().flatten() {
        match (tag.0.as_str(), &tag.1) {
            ("display-name", Some(name)) => result.display_name = Some(name.to_string()),
            ("user-id", Some(user_id)) => result.user_id = Some(user_id.to_string()),
            _ => (),
        }
    }

    result
}

/// Feeds one chat event into the ledger. Returns the chatter's new count, or `None` when the
/// event was the bot's own message or carried no username.
#[instrument(skip(ledger, event), fields(channel = %event.channel, is_self = event.is_self))]
pub async fn ingest(ledger: &ActivityLedger, event: &ChatEvent) -> Option<u64> {
    if event.is_self {
        return None;
    }

    let Some(username) = event.username() else {
        tracing::debug!(tags = ?event.tags, "chat event without a username");
        return None;
    };

    let count = ledger.record_message(username).await;
    tracing::trace!(
        username,
        user_id = ?event.tags.user_id,
        message_len = event.message.len(),
        count,
        "counted chat message"
    );

    Some(count)
}
