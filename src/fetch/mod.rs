//! Remote stats API client.
//!
//! Three GET endpoints are consumed:
//! - `/squad/getSquadList` for the list of squad names
//! - `/squad/getSquadMembers?squadName=..` for a squad's members
//! - `/players/getPlayer?uid=..` for one player's stats
//!
//! Every transport, status or body failure of a single call becomes a
//! [`FetchError`]. Whether that failure is fatal is the pipeline's call.

mod throttle;

pub use throttle::Throttle;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::models::{json_kind, MemberRef, PlayerStatsRaw, SquadName};

const SQUAD_LIST_PATH: &str = "squad/getSquadList";
const SQUAD_MEMBERS_PATH: &str = "squad/getSquadMembers";
const PLAYER_PATH: &str = "players/getPlayer";

/// Errors that can occur during a remote call.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rate limited by {host}, retry after {retry_after_secs:?}s")]
    RateLimited {
        host: String,
        retry_after_secs: Option<u64>,
    },

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response shape from {endpoint}: expected {expected}, found {found}")]
    UnexpectedShape {
        endpoint: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Source of squad and player data.
///
/// [`StatsClient`] talks to the real API; tests drive the pipeline with
/// in-memory implementations.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// All squad names, in the order the remote returns them.
    async fn list_squads(&self) -> Result<Vec<SquadName>, FetchError>;

    /// Members of one squad. A successful non-list body yields an empty list.
    async fn list_members(&self, squad: &SquadName) -> Result<Vec<MemberRef>, FetchError>;

    /// Raw stats for one player.
    async fn get_player_stats(&self, uid: &str) -> Result<PlayerStatsRaw, FetchError>;
}

/// Configuration for the stats client.
#[derive(Debug, Clone)]
pub struct StatsClientConfig {
    /// API root, e.g. `https://wbapi.wbpjs.com`
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,
}

impl Default for StatsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wbapi.wbpjs.com".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("squad-rankings/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client for the stats API.
pub struct StatsClient {
    client: Client,
    base_url: Url,
}

impl StatsClient {
    /// Create a new client with the given configuration.
    pub fn new(config: StatsClientConfig) -> Result<Self, FetchError> {
        let base_url = Self::parse_base(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("squad-rankings")),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Parse the API root, making sure relative joins append to its path.
    fn parse_base(base: &str) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(base).map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base.to_string()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str, query: Option<String>) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))?;
        url.set_query(query.as_deref());
        Ok(url)
    }

    pub fn squad_list_url(&self) -> Result<Url, FetchError> {
        self.endpoint(SQUAD_LIST_PATH, None)
    }

    pub fn squad_members_url(&self, squad: &SquadName) -> Result<Url, FetchError> {
        self.endpoint(
            SQUAD_MEMBERS_PATH,
            Some(format!("squadName={}", squad.url_encoded())),
        )
    }

    pub fn player_url(&self, uid: &str) -> Result<Url, FetchError> {
        self.endpoint(
            PLAYER_PATH,
            Some(format!("uid={}", urlencoding::encode(uid))),
        )
    }

    /// GET a URL and parse the body as JSON.
    async fn get_json(&self, url: Url) -> Result<Value, FetchError> {
        debug!("GET {}", url);

        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());

            return Err(FetchError::RateLimited {
                host: url.host_str().unwrap_or("unknown").to_string(),
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl StatsSource for StatsClient {
    async fn list_squads(&self) -> Result<Vec<SquadName>, FetchError> {
        let body = self.get_json(self.squad_list_url()?).await?;
        parse_squad_list(body)
    }

    async fn list_members(&self, squad: &SquadName) -> Result<Vec<MemberRef>, FetchError> {
        let body = self.get_json(self.squad_members_url(squad)?).await?;
        Ok(parse_member_list(body))
    }

    async fn get_player_stats(&self, uid: &str) -> Result<PlayerStatsRaw, FetchError> {
        let body = self.get_json(self.player_url(uid)?).await?;
        Ok(PlayerStatsRaw::from_value(body))
    }
}

/// Squad list body: must be an array; non-string entries are dropped.
pub fn parse_squad_list(body: Value) -> Result<Vec<SquadName>, FetchError> {
    let entries = match body {
        Value::Array(entries) => entries,
        other => {
            return Err(FetchError::UnexpectedShape {
                endpoint: SQUAD_LIST_PATH,
                expected: "array",
                found: json_kind(&other),
            })
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(SquadName::from(name)),
            other => {
                warn!("Ignoring non-string squad list entry: {}", other);
                None
            }
        })
        .collect())
}

/// Member list body: anything but an array means "no members".
pub fn parse_member_list(body: Value) -> Vec<MemberRef> {
    match body {
        Value::Array(entries) => entries.into_iter().map(MemberRef::from_value).collect(),
        other => {
            debug!("Member list is a {}, treating as empty", json_kind(&other));
            Vec::new()
        }
    }
}
