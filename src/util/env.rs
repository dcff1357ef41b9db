//! Process configuration, read from the environment (and a `.env` file when present).

use core::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::DEFAULT_SERVICE_NAME;

#[derive(Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub discord_bot_token: String,
    pub twitch_channel_name: String,
    pub twitch_client_id: String,
    pub twitch_access_token: String,
    pub twitch_bot_username: String,
    pub twitch_oauth_token: String,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        from_env::<Env>()
    }

    /// Channel login as Twitch expects it in both Helix queries and IRC rooms.
    pub fn channel_login(&self) -> String {
        self.twitch_channel_name
            .trim_start_matches('#')
            .to_lowercase()
    }

    /// IRC `PASS` value; accepts tokens stored with or without the `oauth:` prefix.
    pub fn irc_password(&self) -> String {
        let token = self.twitch_oauth_token.trim_start_matches("oauth:");
        format!("oauth:{}", token)
    }

    pub fn otel_endpoint(&self) -> Option<&str> {
        self.otel_exporter_otlp_endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
    }
}

// tokens stay out of logs
impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("twitch_channel_name", &self.twitch_channel_name)
            .field("twitch_bot_username", &self.twitch_bot_username)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

#[inline]
fn default_service_name() -> String {
    String::from(DEFAULT_SERVICE_NAME)
}

pub fn from_env<T>() -> EnvResult<T>
where
    T: DeserializeOwned,
{
    // a missing `.env` file is fine, variables may come from the process environment
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        return Err(EnvErr::Dotenvy(e));
    }

    // non-unicode variables can't be ours, skip them instead of panicking
    from_iter(
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
    )
}

/// Deserializes `T` from `(NAME, value)` pairs. Every value is treated as a string, and
/// unrelated variables in the iterator are ignored.
pub fn from_iter<Iter, T>(iter: Iter) -> EnvResult<T>
where
    T: DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    let vars: Map<String, Value> = iter
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    serde_json::from_value(Value::Object(vars)).map_err(EnvErr::from)
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("env deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),
}
