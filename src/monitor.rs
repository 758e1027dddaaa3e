use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::analysis::AggregateCounts;
use crate::sonar::GateStatus;

const PR_CHECK_API: &str = "/pr_check";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitor request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Monitor rejected metrics with status {0}")]
    Rejected(u16),
}

/// Aggregate figures reported for one gate run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsPayload {
    pub bug_count: u32,
    pub vul_count: u32,
    pub smell_count: u32,
    pub closed_issue_count: u32,
    pub hotspot_count: u32,
    pub coverage_percentage: f64,
    pub duplication_percentage: f64,
    pub project_status: String,
}

impl MetricsPayload {
    pub fn new(
        counts: &AggregateCounts,
        coverage_pct: f64,
        duplication_pct: f64,
        status: GateStatus,
    ) -> Self {
        Self {
            bug_count: counts.bug_count,
            vul_count: counts.vulnerability_count,
            smell_count: counts.code_smell_count,
            closed_issue_count: counts.closed_count,
            hotspot_count: counts.hotspot_count,
            coverage_percentage: coverage_pct,
            duplication_percentage: duplication_pct,
            project_status: status.to_string(),
        }
    }
}

/// Destination for gate metrics. Failures never change the gate outcome.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn forward(&self, metrics: &MetricsPayload) -> Result<(), MonitorError>;
}

#[derive(Debug, Serialize)]
struct PrCheckRequest<'a> {
    project_id: &'a str,
    merge_id: &'a str,
    sonar_data: &'a MetricsPayload,
}

/// Posts gate metrics to the internal monitoring service.
pub struct MonitorClient {
    client: reqwest::Client,
    host: String,
    token: String,
    project_id: String,
    merge_id: String,
}

impl MonitorClient {
    /// Build a client when a monitor host is configured.
    pub fn from_config(
        config: &crate::config::Config,
        merge_id: impl Into<String>,
    ) -> Option<Self> {
        let host = config.monitor.host.as_deref()?;
        Some(Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token: config.monitor_token().unwrap_or_default(),
            project_id: config.monitor.project_id.clone().unwrap_or_default(),
            merge_id: merge_id.into(),
        })
    }
}

#[async_trait]
impl MetricsSink for MonitorClient {
    #[instrument(skip(self, metrics), fields(project = %self.project_id, merge = %self.merge_id))]
    async fn forward(&self, metrics: &MetricsPayload) -> Result<(), MonitorError> {
        let body = PrCheckRequest {
            project_id: &self.project_id,
            merge_id: &self.merge_id,
            sonar_data: metrics,
        };
        debug!(?metrics, "forwarding metrics");
        let response = self
            .client
            .post(format!("{}{}", self.host, PR_CHECK_API))
            .header("Authorization", format!("Basic {}", self.token))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
