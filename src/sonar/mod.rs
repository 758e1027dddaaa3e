pub mod types;

pub use types::{GateStatus, Hotspot, HotspotPage, Issue, IssuePage, QualityStatus, Tasks};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument};

use types::QualityGateResponse;

const QUALITY_API: &str = "/api/qualitygates/project_status";
const ISSUE_API: &str = "/api/issues/search";
const HOTSPOT_API: &str = "/api/hotspots/search";
const TASK_API: &str = "/api/ce/activity";
pub const PAGE_SIZE: u32 = 200;

#[derive(Debug, Error)]
pub enum SonarError {
    #[error("SonarQube API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("SonarQube token not found in config or environment")]
    MissingToken,

    #[error("SonarQube {0} is not configured")]
    MissingSetting(&'static str),
}

/// Read side of the analysis service used by the quality gate.
#[async_trait]
pub trait SonarApi: Send + Sync {
    /// Background tasks currently known for the project.
    async fn task_status(&self) -> Result<Tasks, SonarError>;

    /// Quality gate evaluation for the configured pull request.
    async fn quality_status(&self) -> Result<QualityStatus, SonarError>;

    /// One page (1-based) of issues raised on the pull request.
    async fn issue_page(&self, pull_request: &str, page: u32) -> Result<IssuePage, SonarError>;

    /// One page (1-based) of security hotspots raised on the pull request.
    async fn hotspot_page(&self, pull_request: &str, page: u32)
        -> Result<HotspotPage, SonarError>;
}

/// reqwest-backed SonarQube Web API client.
pub struct SonarClient {
    client: reqwest::Client,
    host: String,
    token: String,
    project_key: String,
    pull_request: String,
}

impl SonarClient {
    pub fn new(
        config: &crate::config::Config,
        pull_request: impl Into<String>,
    ) -> Result<Self, SonarError> {
        let token = config.sonar_token().ok_or(SonarError::MissingToken)?;
        let host = config
            .sonar
            .host
            .clone()
            .ok_or(SonarError::MissingSetting("host"))?;
        let project_key = config
            .sonar
            .project_key
            .clone()
            .ok_or(SonarError::MissingSetting("project key"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token,
            project_key,
            pull_request: pull_request.into(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        api: &str,
        query: &[(&str, String)],
    ) -> Result<T, SonarError> {
        let url = format!("{}{}", self.host, api);
        debug!(%url, ?query, "sonar request");
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.token, Some(""))
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SonarApi for SonarClient {
    #[instrument(skip(self), fields(project = %self.project_key))]
    async fn task_status(&self) -> Result<Tasks, SonarError> {
        self.get(
            TASK_API,
            &[
                ("component", self.project_key.clone()),
                ("onlyCurrents", "true".to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self), fields(project = %self.project_key, pr = %self.pull_request))]
    async fn quality_status(&self) -> Result<QualityStatus, SonarError> {
        let response: QualityGateResponse = self
            .get(
                QUALITY_API,
                &[
                    ("projectKey", self.project_key.clone()),
                    ("pullRequest", self.pull_request.clone()),
                ],
            )
            .await?;
        Ok(response.project_status)
    }

    #[instrument(skip(self), fields(project = %self.project_key))]
    async fn issue_page(&self, pull_request: &str, page: u32) -> Result<IssuePage, SonarError> {
        self.get(
            ISSUE_API,
            &[
                ("componentKeys", self.project_key.clone()),
                ("pullRequest", pull_request.to_string()),
                ("p", page.to_string()),
                ("ps", PAGE_SIZE.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self), fields(project = %self.project_key))]
    async fn hotspot_page(
        &self,
        pull_request: &str,
        page: u32,
    ) -> Result<HotspotPage, SonarError> {
        self.get(
            HOTSPOT_API,
            &[
                ("projectKey", self.project_key.clone()),
                ("pullRequest", pull_request.to_string()),
                ("p", page.to_string()),
                ("ps", PAGE_SIZE.to_string()),
            ],
        )
        .await
    }
}

/// Format a timestamp the way SonarQube date filters expect it,
/// e.g. `2024-03-01T09:59:00+0000`.
pub fn iso_date_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S+0000").to_string()
}

/// Parse a SonarQube timestamp (`2024-03-01T10:00:00+0000`).
pub fn parse_date_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
