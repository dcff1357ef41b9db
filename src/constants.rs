use std::time::Duration;

pub const API_HELIX_URL: &str = "https://api.twitch.tv/helix";

pub const TTV_IRC_URI: &str = "irc.chat.twitch.tv";
pub const TTV_IRC_PORT: u16 = 6697;
pub const IRC_PING_SECS: u32 = 300;

pub const REJOIN_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

pub const STATUS_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const STATUS_CHANNEL_PREFIX: &str = "status";

pub const WATCHTIME_TRIGGER: &str = "!watchtime";

pub const DEFAULT_SERVICE_NAME: &str = "watchtime-bridge";
pub const DEFAULT_LOG_FILTER: &str = "watchtime_bridge=debug,serenity=warn,irc=info,info";
