//! `!watchtime <username>`: grants the command issuer the role matching a chatter's activity.
//!
//! The queried username only selects the tier. The role always goes to whoever typed the
//! command, even when they looked up somebody else.

use async_trait::async_trait;
use serenity::all::{Context, GuildId, Message, RoleId, UserId};
use tracing::instrument;

use crate::activity::{ActivityLedger, RoleTier};
use crate::constants::WATCHTIME_TRIGGER;
use crate::discord::{DiscordErr, DiscordResult};

pub const USAGE_REPLY: &str = "Please provide a Twitch username.";
pub const FAILURE_REPLY: &str = "Failed to fetch user activity.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchtimeCommand {
    Lookup { username: String },
    MissingUsername,
}

impl WatchtimeCommand {
    /// `None` when the message is not a watchtime command at all.
    pub fn parse(content: &str) -> Option<Self> {
        let mut tokens = content.split_whitespace();
        if tokens.next()? != WATCHTIME_TRIGGER {
            return None;
        }

        Some(match tokens.next() {
            Some(username) => WatchtimeCommand::Lookup {
                username: username.to_string(),
            },
            None => WatchtimeCommand::MissingUsername,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHandle {
    pub user_id: u64,
}

/// The message a command arrived in, and the guild it arrived in.
#[async_trait]
pub trait CommandContext: Send + Sync {
    fn issuer_name(&self) -> &str;

    fn in_guild(&self) -> bool;

    async fn reply(&self, content: &str) -> DiscordResult<()>;

    /// Guild role with exactly this name.
    async fn find_role(&self, name: &str) -> DiscordResult<Option<RoleHandle>>;

    /// The command issuer as a guild member.
    async fn issuing_member(&self) -> DiscordResult<Option<MemberHandle>>;

    async fn grant_role(&self, member: &MemberHandle, role: &RoleHandle) -> DiscordResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchtimeOutcome {
    Usage,
    NotInGuild,
    RoleNotFound { count: u64 },
    MemberNotFound,
    Assigned { role: String, count: u64 },
    Failed,
}

/// Runs one command to completion. Lookup problems are answered in chat; anything unexpected is
/// logged and answered with a generic failure. Only a failure to send that last reply escapes.
#[instrument(skip(ctx, ledger), fields(issuer = ctx.issuer_name()))]
pub async fn handle_watchtime<C: CommandContext>(
    ctx: &C,
    ledger: &ActivityLedger,
    command: WatchtimeCommand,
) -> DiscordResult<WatchtimeOutcome> {
    let username = match command {
        WatchtimeCommand::MissingUsername => {
            ctx.reply(USAGE_REPLY).await?;
            return Ok(WatchtimeOutcome::Usage);
        }
        WatchtimeCommand::Lookup { username } => username,
    };

    match assign_role(ctx, ledger, &username).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            tracing::error!(error = ?e, username, "watchtime role assignment failed");
            ctx.reply(FAILURE_REPLY).await?;
            Ok(WatchtimeOutcome::Failed)
        }
    }
}

async fn assign_role<C: CommandContext>(
    ctx: &C,
    ledger: &ActivityLedger,
    username: &str,
) -> DiscordResult<WatchtimeOutcome> {
    let count = ledger.count(username).await;

    if !ctx.in_guild() {
        return Ok(WatchtimeOutcome::NotInGuild);
    }

    let tier = RoleTier::for_count(count);
    tracing::debug!(username, count, %tier, "resolved activity tier");

    let Some(role) = ctx.find_role(tier.role_name()).await? else {
        ctx.reply(&format!(
            "Appropriate role not found for activity level {}",
            count
        ))
        .await?;
        return Ok(WatchtimeOutcome::RoleNotFound { count });
    };

    let Some(member) = ctx.issuing_member().await? else {
        ctx.reply(&format!("Could not find member {}", ctx.issuer_name()))
            .await?;
        return Ok(WatchtimeOutcome::MemberNotFound);
    };

    ctx.grant_role(&member, &role).await?;
    ctx.reply(&format!(
        "Assigned role {} to {}",
        role.name,
        ctx.issuer_name()
    ))
    .await?;

    tracing::info!(role = %role.name, member = member.user_id, count, "granted activity role");
    Ok(WatchtimeOutcome::Assigned {
        role: role.name,
        count,
    })
}

/// A command message received over the gateway.
pub struct SerenityCommand<'a> {
    ctx: &'a Context,
    msg: &'a Message,
}

impl<'a> SerenityCommand<'a> {
    pub fn new(ctx: &'a Context, msg: &'a Message) -> Self {
        Self { ctx, msg }
    }

    fn guild_id(&self) -> DiscordResult<GuildId> {
        self.msg.guild_id.ok_or(DiscordErr::NotInGuild)
    }
}

#[async_trait]
impl CommandContext for SerenityCommand<'_> {
    fn issuer_name(&self) -> &str {
        &self.msg.author.name
    }

    fn in_guild(&self) -> bool {
        self.msg.guild_id.is_some()
    }

    async fn reply(&self, content: &str) -> DiscordResult<()> {
        self.msg.channel_id.say(&self.ctx.http, content).await?;
        Ok(())
    }

    async fn find_role(&self, name: &str) -> DiscordResult<Option<RoleHandle>> {
        let guild_id = self.guild_id()?;
        let to_handle = |role: &serenity::all::Role| RoleHandle {
            id: role.id.get(),
            name: role.name.clone(),
        };

        let cached = self
            .ctx
            .cache
            .guild(guild_id)
            .map(|guild| guild.roles.values().find(|r| r.name == name).map(to_handle));

        match cached {
            Some(found) => Ok(found),
            None => {
                let roles = guild_id.roles(&self.ctx.http).await?;
                Ok(roles.values().find(|r| r.name == name).map(to_handle))
            }
        }
    }

    async fn issuing_member(&self) -> DiscordResult<Option<MemberHandle>> {
        let guild_id = self.guild_id()?;

        match guild_id.member(self.ctx, self.msg.author.id).await {
            Ok(member) => Ok(Some(MemberHandle {
                user_id: member.user.id.get(),
            })),
            Err(serenity::Error::Http(e)) if e.status_code().map(|s| s.as_u16()) == Some(404) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn grant_role(&self, member: &MemberHandle, role: &RoleHandle) -> DiscordResult<()> {
        let guild_id = self.guild_id()?;

        self.ctx
            .http
            .add_member_role(
                guild_id,
                UserId::new(member.user_id),
                RoleId::new(role.id),
                Some("watchtime activity tier"),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    struct FakeCommand {
        issuer: String,
        issuer_id: Option<u64>,
        in_guild: bool,
        roles: Vec<RoleHandle>,
        fail_role_lookup: bool,
        replies: Mutex<Vec<String>>,
        grants: Mutex<Vec<(u64, String)>>,
    }

    impl FakeCommand {
        fn new(issuer: &str) -> Self {
            let roles = RoleTier::ALL
                .iter()
                .enumerate()
                .map(|(i, tier)| RoleHandle {
                    id: 100 + i as u64,
                    name: tier.role_name().to_string(),
                })
                .collect();

            Self {
                issuer: issuer.to_string(),
                issuer_id: Some(7),
                in_guild: true,
                roles,
                fail_role_lookup: false,
                replies: Mutex::new(Vec::new()),
                grants: Mutex::new(Vec::new()),
            }
        }

        fn replies(&self) -> Vec<String> {
            self.replies.lock().unwrap().clone()
        }

        fn grants(&self) -> Vec<(u64, String)> {
            self.grants.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandContext for FakeCommand {
        fn issuer_name(&self) -> &str {
            &self.issuer
        }

        fn in_guild(&self) -> bool {
            self.in_guild
        }

        async fn reply(&self, content: &str) -> DiscordResult<()> {
            self.replies.lock().unwrap().push(content.to_string());
            Ok(())
        }

        async fn find_role(&self, name: &str) -> DiscordResult<Option<RoleHandle>> {
            if self.fail_role_lookup {
                return Err(DiscordErr::NotInGuild);
            }
            Ok(self.roles.iter().find(|r| r.name == name).cloned())
        }

        async fn issuing_member(&self) -> DiscordResult<Option<MemberHandle>> {
            Ok(self.issuer_id.map(|user_id| MemberHandle { user_id }))
        }

        async fn grant_role(&self, member: &MemberHandle, role: &RoleHandle) -> DiscordResult<()> {
            self.grants
                .lock()
                .unwrap()
                .push((member.user_id, role.name.clone()));
            Ok(())
        }
    }

    async fn ledger_with(entries: &[(&str, u64)]) -> ActivityLedger {
        let ledger = ActivityLedger::new();
        for (name, count) in entries {
            for _ in 0..*count {
                ledger.record_message(name).await;
            }
        }
        ledger
    }

    fn lookup(username: &str) -> WatchtimeCommand {
        WatchtimeCommand::Lookup {
            username: username.to_string(),
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            WatchtimeCommand::parse("!watchtime Alice"),
            Some(lookup("Alice"))
        );
        assert_eq!(
            WatchtimeCommand::parse("  !watchtime   alice  extra"),
            Some(lookup("alice"))
        );
        assert_eq!(
            WatchtimeCommand::parse("!watchtime"),
            Some(WatchtimeCommand::MissingUsername)
        );
        assert_eq!(WatchtimeCommand::parse("!watchtimes alice"), None);
        assert_eq!(WatchtimeCommand::parse("hello !watchtime alice"), None);
        assert_eq!(WatchtimeCommand::parse(""), None);
    }

    #[tokio::test]
    async fn test_missing_username_prompts_without_grant() {
        let ctx = FakeCommand::new("bob");
        let ledger = ActivityLedger::new();

        let outcome = handle_watchtime(&ctx, &ledger, WatchtimeCommand::MissingUsername)
            .await
            .unwrap();

        assert_eq!(outcome, WatchtimeOutcome::Usage);
        assert_eq!(ctx.replies(), vec![USAGE_REPLY.to_string()]);
        assert!(ctx.grants().is_empty());
    }

    #[tokio::test]
    async fn test_role_goes_to_issuer_not_queried_user() {
        let ctx = FakeCommand::new("bob");
        let ledger = ledger_with(&[("alice", 0), ("bob", 600)]).await;

        let outcome = handle_watchtime(&ctx, &ledger, lookup("alice"))
            .await
            .unwrap();

        // alice's count picks the tier, bob (issuer id 7) receives it
        assert_eq!(
            outcome,
            WatchtimeOutcome::Assigned {
                role: "Lille Fisk".to_string(),
                count: 0
            }
        );
        assert_eq!(ctx.grants(), vec![(7, "Lille Fisk".to_string())]);
        assert_eq!(ctx.replies(), vec!["Assigned role Lille Fisk to bob".to_string()]);
    }

    #[tokio::test]
    async fn test_queried_count_selects_tier() {
        let ctx = FakeCommand::new("bob");
        let ledger = ledger_with(&[("Bob", 600)]).await;

        handle_watchtime(&ctx, &ledger, lookup("BOB")).await.unwrap();

        assert_eq!(ctx.grants(), vec![(7, "Kæmpe Fisk".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_role_is_reported() {
        let mut ctx = FakeCommand::new("bob");
        ctx.roles.retain(|r| r.name != "Stor Fisk");
        let ledger = ledger_with(&[("carol", 300)]).await;

        let outcome = handle_watchtime(&ctx, &ledger, lookup("carol"))
            .await
            .unwrap();

        assert_eq!(outcome, WatchtimeOutcome::RoleNotFound { count: 300 });
        assert_eq!(
            ctx.replies(),
            vec!["Appropriate role not found for activity level 300".to_string()]
        );
        assert!(ctx.grants().is_empty());
    }

    #[tokio::test]
    async fn test_missing_member_is_reported() {
        let mut ctx = FakeCommand::new("bob");
        ctx.issuer_id = None;
        let ledger = ActivityLedger::new();

        let outcome = handle_watchtime(&ctx, &ledger, lookup("alice"))
            .await
            .unwrap();

        assert_eq!(outcome, WatchtimeOutcome::MemberNotFound);
        assert_eq!(ctx.replies(), vec!["Could not find member bob".to_string()]);
        assert!(ctx.grants().is_empty());
    }

    #[tokio::test]
    async fn test_outside_guild_does_nothing() {
        let mut ctx = FakeCommand::new("bob");
        ctx.in_guild = false;
        let ledger = ActivityLedger::new();

        let outcome = handle_watchtime(&ctx, &ledger, lookup("alice"))
            .await
            .unwrap();

        assert_eq!(outcome, WatchtimeOutcome::NotInGuild);
        assert!(ctx.replies().is_empty());
        assert!(ctx.grants().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_error_replies_generic_failure() {
        let mut ctx = FakeCommand::new("bob");
        ctx.fail_role_lookup = true;
        let ledger = ActivityLedger::new();

        let outcome = handle_watchtime(&ctx, &ledger, lookup("alice"))
            .await
            .unwrap();

        assert_eq!(outcome, WatchtimeOutcome::Failed);
        assert_eq!(ctx.replies(), vec![FAILURE_REPLY.to_string()]);
        assert!(ctx.grants().is_empty());
    }

    #[tokio::test]
    async fn test_tier_boundary_roles() {
        for (count, role) in [(249, "Lille Fisk"), (250, "Stor Fisk"), (1500, "Veteran")] {
            let ctx = FakeCommand::new("bob");
            let ledger = ledger_with(&[("dave", count)]).await;

            handle_watchtime(&ctx, &ledger, lookup("dave")).await.unwrap();
            assert_eq!(ctx.grants(), vec![(7, role.to_string())]);
        }
    }
}
