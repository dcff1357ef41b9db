use core::fmt;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::constants::API_HELIX_URL;

/// Source of live-stream records for a channel login.
#[async_trait]
pub trait StreamLookup: Send + Sync {
    async fn live_streams(&self, login: &str) -> HelixResult<Vec<HelixStream>>;
}

#[derive(Debug, Clone)]
pub struct Helix {
    client: reqwest::Client,
    base_uri: String,
    headers: HeaderMap,
}

impl Helix {
    pub fn new(client_id: &str, access_token: &str) -> HelixResult<Self> {
        Self::with_base_uri(API_HELIX_URL, client_id, access_token)
    }

    pub fn with_base_uri(base_uri: &str, client_id: &str, access_token: &str) -> HelixResult<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_uri: base_uri.trim_end_matches('/').to_string(),
            headers: bearer_headers(client_id, access_token)?,
        })
    }

    /// Fetches the live stream records for a channel login. An empty vector means the channel
    /// is offline.
    #[instrument(skip(self))]
    pub async fn fetch_streams_by_login(&self, login: &str) -> HelixResult<Vec<HelixStream>> {
        let uri = self.uri(HelixUri::Streams);
        let query = query_pairs(HelixParamType::UserLogin, &[login]);

        let streams = self
            .fetch::<HelixDataResponse<HelixStream>>(uri, &query)
            .await?
            .data;
        tracing::debug!(stream_count = streams.len(), "fetched live streams");

        Ok(streams)
    }

    fn uri(&self, uri: HelixUri) -> String {
        format!("{}/{}", self.base_uri, uri.urn())
    }

    #[instrument(skip(self))]
    async fn send(&self, uri: String, query: &[(&str, String)]) -> HelixResult<reqwest::Response> {
        self.client
            .get(uri)
            .query(query)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(HelixErr::ReqwestError)
    }

    /// Performs a GET request against a given URI and parses the response body as `T`
    #[instrument(skip(self, uri, query))]
    async fn fetch<T>(&self, uri: String, query: &[(&str, String)]) -> HelixResult<T>
    where
        T: DeserializeOwned + fmt::Debug,
    {
        let res = self.send(uri, query).await?;

        // helix usually attaches a `message` to error responses, which says far more than the
        // status code alone
        if !res.status().is_success() {
            let status_code = res.status();
            tracing::error!(code = %status_code, "non-2xx response");

            return Err(match res.json::<Value>().await {
                Ok(body) => match body["message"].as_str() {
                    Some(message) => HelixErr::FetchErrWithMessage {
                        status: status_code.as_u16(),
                        message: message.to_string(),
                    },
                    None => HelixErr::FetchErrWithBody { body },
                },
                Err(_) => HelixErr::FetchErr(status_code.to_string()),
            });
        }

        if let Some(remaining) = res.headers().get("ratelimit-remaining")
            && let Some(total) = res.headers().get("ratelimit-limit")
        {
            tracing::debug!(ratelimit_available = ?remaining, ratelimit_total = ?total, "rate-limit bucket");
        }

        res.json::<T>().await.map_err(HelixErr::ReqwestError)
    }
}

#[async_trait]
impl StreamLookup for Helix {
    async fn live_streams(&self, login: &str) -> HelixResult<Vec<HelixStream>> {
        self.fetch_streams_by_login(login).await
    }
}

fn bearer_headers(client_id: &str, access_token: &str) -> HelixResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", access_token))?,
    );
    headers.insert("Client-Id", HeaderValue::from_str(client_id)?);

    Ok(headers)
}

pub const HELIX_URN_STREAMS: &str = "streams";

#[derive(Debug)]
pub enum HelixUri {
    Streams,
}

impl HelixUri {
    fn urn(&self) -> &'static str {
        match self {
            HelixUri::Streams => HELIX_URN_STREAMS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum HelixParamType {
    UserLogin,
}

impl HelixParamType {
    fn key(&self) -> &'static str {
        match self {
            HelixParamType::UserLogin => "user_login",
        }
    }
}

/// Builds `(param, item)` query pairs; reqwest percent-encodes them. Logins are case-insensitive
/// on Twitch's side and are sent lower-cased.
pub fn query_pairs(param_type: HelixParamType, items: &[&str]) -> Vec<(&'static str, String)> {
    items
        .iter()
        .map(|item| (param_type.key(), item.to_lowercase()))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixStream {
    #[serde(rename = "user_id", default)]
    pub id: String,
    #[serde(rename = "user_login", default)]
    pub login: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "game_name", default)]
    pub game: String,
    pub viewer_count: u64,
}

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("error during helix fetch: {0}")]
    FetchErr(String),

    #[error("error during helix fetch ({status}): {message}")]
    FetchErrWithMessage { status: u16, message: String },

    #[error("error (with detail) during helix fetch: {:#?}", body)]
    FetchErrWithBody { body: Value },
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn mock_streams(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/streams"))
            .and(query_param("user_login", "fishstreamer"))
            .and(header("Client-Id", "client-id"))
            .and(header("Authorization", "Bearer access-token"))
            .respond_with(response)
            .expect(1)
            .mount(server)
            .await;
    }

    fn helix(server: &MockServer) -> Helix {
        Helix::with_base_uri(&server.uri(), "client-id", "access-token").unwrap()
    }

    #[test]
    fn test_query_pairs() {
        let query = query_pairs(HelixParamType::UserLogin, &["FishStreamer", "other"]);
        assert_eq!(
            query,
            vec![
                ("user_login", "fishstreamer".to_string()),
                ("user_login", "other".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_login_is_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/streams"))
            .and(query_param("user_login", "fish&first=100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": [], "pagination": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let streams = helix(&server)
            .fetch_streams_by_login("fish&first=100")
            .await
            .unwrap();
        assert!(streams.is_empty());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), Some("user_login=fish%26first%3D100"));
    }

    #[tokio::test]
    async fn test_fetch_live_stream() {
        let server = MockServer::start().await;
        mock_streams(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "40952121085",
                    "user_id": "101051819",
                    "user_login": "fishstreamer",
                    "user_name": "FishStreamer",
                    "game_name": "Just Chatting",
                    "type": "live",
                    "title": "fishing",
                    "viewer_count": 42
                }],
                "pagination": {}
            })),
        )
        .await;

        let streams = helix(&server)
            .fetch_streams_by_login("FishStreamer")
            .await
            .unwrap();

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].viewer_count, 42);
        assert_eq!(streams[0].login, "fishstreamer");
    }

    #[tokio::test]
    async fn test_fetch_offline_is_empty() {
        let server = MockServer::start().await;
        mock_streams(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({ "data": [], "pagination": {} })),
        )
        .await;

        let streams = helix(&server).live_streams("fishstreamer").await.unwrap();
        assert!(streams.is_empty());
    }

    #[tokio::test]
    async fn test_error_message_surfaces() {
        let server = MockServer::start().await;
        mock_streams(
            &server,
            ResponseTemplate::new(401).set_body_json(json!({
                "error": "Unauthorized",
                "status": 401,
                "message": "Invalid OAuth token"
            })),
        )
        .await;

        let err = helix(&server)
            .fetch_streams_by_login("fishstreamer")
            .await
            .unwrap_err();

        match err {
            HelixErr::FetchErrWithMessage { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid OAuth token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let server = MockServer::start().await;
        mock_streams(
            &server,
            ResponseTemplate::new(200).set_body_string("not json"),
        )
        .await;

        let res = helix(&server).fetch_streams_by_login("fishstreamer").await;
        assert!(matches!(res, Err(HelixErr::ReqwestError(_))));
    }
}
