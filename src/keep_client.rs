use crate::config::SyncConfig;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const LOGIN_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:78.0) Gecko/20100101 Firefox/78.0";

/// Workouts recorded with the Keep app itself carry a GPS point stream;
/// other genres (manual entries, third-party imports) do not.
const GPS_SOURCED_GENRE: &str = "KeepApp";

#[derive(Debug)]
pub enum ClientError {
    Authentication(String),
    Http(StatusCode),
    Network(reqwest::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Authentication(msg) => write!(f, "Authentication error: {msg}"),
            ClientError::Http(status) => write!(f, "HTTP {status}"),
            ClientError::Network(e) => write!(f, "Network error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err)
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct StatsDetailResponse {
    data: StatsDetailData,
}

#[derive(Debug, Deserialize)]
struct StatsDetailData {
    #[serde(default)]
    records: Vec<StatsRecord>,
    #[serde(rename = "lastTimestamp", default)]
    last_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct StatsRecord {
    #[serde(default)]
    logs: Vec<StatsLogEntry>,
}

#[derive(Debug, Deserialize)]
struct StatsLogEntry {
    stats: StatsSummary,
}

#[derive(Debug, Deserialize)]
struct StatsSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunLogResponse {
    data: WorkoutDetail,
}

/// Vendor JSON for one workout, immutable once fetched. `id` is the
/// composite identifier whose middle underscore segment is the stable
/// numeric id.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkoutDetail {
    pub id: String,
    #[serde(rename = "startTime")]
    pub start_time: i64,
    #[serde(rename = "endTime")]
    pub end_time: i64,
    pub duration: f64,
    pub distance: f64,
    pub timezone: Option<String>,
    #[serde(rename = "heartRate")]
    pub heart_rate: Option<HeartRateSummary>,
    pub vendor: Option<VendorInfo>,
    #[serde(rename = "rawDataURL")]
    pub raw_data_url: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartRateSummary {
    #[serde(rename = "averageHeartRate")]
    pub average_heart_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorInfo {
    pub genre: Option<String>,
    pub source: Option<String>,
}

impl WorkoutDetail {
    /// URL of the compressed point blob, present only for GPS-sourced
    /// workouts.
    pub fn point_stream_url(&self) -> Option<&str> {
        let genre = self.vendor.as_ref().and_then(|v| v.genre.as_deref());
        if genre == Some(GPS_SOURCED_GENRE) {
            self.raw_data_url.as_deref()
        } else {
            None
        }
    }
}

/// One page of the paginated workout listing. A `next_cursor` of zero
/// means this was the last page.
#[derive(Debug, Clone)]
pub struct WorkoutPage {
    pub workout_ids: Vec<String>,
    pub next_cursor: i64,
}

/// The vendor boundary the orchestrator drives. `KeepClient` is the real
/// implementation; tests substitute an in-memory one.
#[async_trait]
pub trait WorkoutSource {
    async fn login(&mut self, mobile: &str, password: &str) -> Result<(), ClientError>;
    async fn list_page(&self, last_date: i64) -> Result<WorkoutPage, ClientError>;
    async fn workout_detail(&self, workout_id: &str) -> Result<WorkoutDetail, ClientError>;
    async fn point_stream(&self, url: &str) -> Result<String, ClientError>;
}

pub struct KeepClient {
    client: reqwest::Client,
    config: SyncConfig,
    auth_header: Option<String>,
}

impl KeepClient {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            auth_header: None,
        }
    }

    fn auth_header(&self) -> Result<&str, ClientError> {
        self.auth_header
            .as_deref()
            .ok_or_else(|| ClientError::Authentication("not logged in".to_string()))
    }
}

#[async_trait]
impl WorkoutSource for KeepClient {
    async fn login(&mut self, mobile: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(&self.config.login_url)
            .header(USER_AGENT, LOGIN_USER_AGENT)
            .form(&[("mobile", mobile), ("password", password)])
            .send()
            .await
            .map_err(|e| ClientError::Authentication(format!("login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Authentication(format!(
                "login rejected with status {status}"
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Authentication(format!("malformed login response: {e}")))?;

        let token = body
            .data
            .map(|d| d.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ClientError::Authentication("login response carried no token".to_string())
            })?;

        self.auth_header = Some(format!("Bearer {token}"));
        Ok(())
    }

    async fn list_page(&self, last_date: i64) -> Result<WorkoutPage, ClientError> {
        let response = self
            .client
            .get(self.config.stats_page_url(last_date))
            .header(AUTHORIZATION, self.auth_header()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(status));
        }

        let body: StatsDetailResponse = response.json().await?;
        let workout_ids = body
            .data
            .records
            .iter()
            .filter_map(|record| record.logs.first())
            .map(|log| log.stats.id.clone())
            .collect();

        Ok(WorkoutPage {
            workout_ids,
            next_cursor: body.data.last_timestamp,
        })
    }

    async fn workout_detail(&self, workout_id: &str) -> Result<WorkoutDetail, ClientError> {
        let response = self
            .client
            .get(self.config.detail_url(workout_id))
            .header(AUTHORIZATION, self.auth_header()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(status));
        }

        let body: RunLogResponse = response.json().await?;
        Ok(body.data)
    }

    async fn point_stream(&self, url: &str) -> Result<String, ClientError> {
        // The blob URL is pre-signed; no vendor auth header here.
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(status));
        }

        Ok(response.text().await?)
    }
}

/// Finite lazy sequence of workout-id batches. Each call fetches one page,
/// sleeping the configured delay between successive requests; a zero
/// cursor from the vendor ends the sequence. Build a fresh pager to
/// restart from the beginning.
pub struct WorkoutPager<'a, S: WorkoutSource + ?Sized> {
    source: &'a S,
    page_delay: Duration,
    cursor: i64,
    started: bool,
    done: bool,
}

impl<'a, S: WorkoutSource + ?Sized> WorkoutPager<'a, S> {
    pub fn new(source: &'a S, page_delay: Duration) -> Self {
        Self {
            source,
            page_delay,
            cursor: 0,
            started: false,
            done: false,
        }
    }

    pub async fn next_batch(&mut self) -> Result<Option<Vec<String>>, ClientError> {
        if self.done {
            return Ok(None);
        }
        if self.started {
            tokio::time::sleep(self.page_delay).await;
        }

        let page = self.source.list_page(self.cursor).await?;
        self.started = true;
        self.cursor = page.next_cursor;
        if self.cursor == 0 {
            self.done = true;
        }

        if self.cursor != 0
            && let Some(since) = DateTime::from_timestamp_millis(self.cursor)
        {
            debug!("listed keep workout page, cursor at {since}");
        }

        Ok(Some(page.workout_ids))
    }
}
