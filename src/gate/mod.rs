use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::analysis::{self, AggregateCounts};
use crate::github::{GitError, GitPublisher};
use crate::monitor::{MetricsPayload, MetricsSink};
use crate::report::{self, ReportParams, ReportRenderer};
use crate::sonar::{self, GateStatus, QualityStatus, SonarApi};

/// Issues created shortly before the analysis task was submitted still
/// belong to it.
const ANALYSIS_WINDOW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Failed to publish quality report: {0}")]
    Publish(#[from] GitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No open bugs, vulnerabilities or code smells.
    Pass,
    Fail,
    /// The analysis data needed to decide was not available; nothing was
    /// published.
    Inconclusive,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, GateOutcome::Pass)
    }
}

impl std::fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateOutcome::Pass => write!(f, "PASS"),
            GateOutcome::Fail => write!(f, "FAIL"),
            GateOutcome::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

/// Result of one gate run.
#[derive(Debug, Clone)]
pub struct GateRun {
    pub outcome: GateOutcome,
    /// The published report, absent when the run was inconclusive.
    pub report: Option<String>,
    pub counts: Option<AggregateCounts>,
}

impl GateRun {
    fn inconclusive() -> Self {
        Self {
            outcome: GateOutcome::Inconclusive,
            report: None,
            counts: None,
        }
    }
}

/// Drives one pull request from SonarQube analysis to published report.
pub struct QualityGate {
    sonar: Arc<dyn SonarApi>,
    git: Arc<dyn GitPublisher>,
    monitor: Option<Arc<dyn MetricsSink>>,
    renderer: ReportRenderer,
    pull_request: String,
    retry_delay: Duration,
}

impl QualityGate {
    pub fn new(
        sonar: Arc<dyn SonarApi>,
        git: Arc<dyn GitPublisher>,
        renderer: ReportRenderer,
        pull_request: impl Into<String>,
    ) -> Self {
        Self {
            sonar,
            git,
            monitor: None,
            renderer,
            pull_request: pull_request.into(),
            retry_delay: Duration::from_secs(10),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MetricsSink>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run the gate once.
    ///
    /// Missing analysis data ends the run as [`GateOutcome::Inconclusive`]
    /// without publishing anything. Only publish failures are returned as
    /// errors.
    #[instrument(skip(self), fields(pr = %self.pull_request))]
    pub async fn run(&self) -> Result<GateRun, GateError> {
        info!("fetching analysis task status");
        let tasks = match self.sonar.task_status().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "task status unavailable");
                return Ok(GateRun::inconclusive());
            }
        };
        let Some(task) = tasks.tasks.first() else {
            warn!("no analysis task found for project");
            return Ok(GateRun::inconclusive());
        };
        match sonar::parse_date_time(&task.submitted_at) {
            Some(submitted) => {
                let window_start = submitted - chrono::Duration::seconds(ANALYSIS_WINDOW_SECS);
                debug!(
                    task = %task.id,
                    kind = %task.task_type,
                    status = %task.status,
                    window_start = %sonar::iso_date_time(window_start),
                    "analysis task found"
                );
            }
            None => {
                debug!(task = %task.id, submitted_at = %task.submitted_at, "analysis task found")
            }
        }

        info!("fetching quality gate status");
        let Some(quality) = self.fetch_quality_status().await else {
            return Ok(GateRun::inconclusive());
        };
        debug!(
            status = %quality.status,
            conditions = quality.conditions.len(),
            "quality gate status"
        );

        info!("fetching issues");
        let issues = analysis::fetch_all_issues(self.sonar.as_ref(), &self.pull_request).await;
        let issues = match issues {
            Ok(issues) => issues,
            Err(err) => {
                warn!(error = %err, "issue list unavailable");
                return Ok(GateRun::inconclusive());
            }
        };

        info!("fetching security hotspots");
        let hotspots = analysis::fetch_all_hotspots(self.sonar.as_ref(), &self.pull_request).await;
        let hotspots = match hotspots {
            Ok(collected) => collected,
            Err(err) => {
                warn!(error = %err, "hotspot list unavailable, continuing without hotspots");
                analysis::Collected {
                    items: Vec::new(),
                    total: 0,
                }
            }
        };
        debug!(
            issues = issues.len(),
            hotspots = hotspots.items.len(),
            hotspot_total = hotspots.total,
            "fetched findings"
        );

        let aggregation =
            analysis::aggregate(&issues, &hotspots.items, hotspots.total, &self.renderer);
        let counts = aggregation.counts;
        let facets = report::derive_security_facets(&quality.conditions);
        let markdown = self.renderer.render(&ReportParams {
            pull_request: &self.pull_request,
            status: quality.status,
            bug_count: counts.bug_count,
            vulnerability_count: counts.vulnerability_count,
            code_smell_count: counts.code_smell_count,
            closed_count: counts.closed_count,
            hotspot_count: counts.hotspot_count,
            facets: facets.clone(),
        });

        info!("publishing quality report");
        let comment = self.git.publish_report(&markdown).await?;
        debug!(comment = comment.id, url = ?comment.html_url, "report published");

        if aggregation.annotations.is_empty() {
            info!("no review annotations to publish");
        } else {
            info!(annotations = aggregation.annotations.len(), "publishing review annotations");
            self.git.publish_review(&aggregation.annotations).await?;
        }

        if let Some(monitor) = &self.monitor {
            let metrics = MetricsPayload::new(
                &counts,
                facets.coverage_pct,
                facets.duplication_pct,
                quality.status,
            );
            if let Err(err) = monitor.forward(&metrics).await {
                warn!(error = %err, "failed to forward metrics to monitor");
            }
        }

        let outcome = if counts.blocking() == 0 {
            GateOutcome::Pass
        } else {
            GateOutcome::Fail
        };
        info!(
            %outcome,
            bugs = counts.bug_count,
            vulnerabilities = counts.vulnerability_count,
            code_smells = counts.code_smell_count,
            "gate decided"
        );

        Ok(GateRun {
            outcome,
            report: Some(markdown),
            counts: Some(counts),
        })
    }

    /// Fetch the gate status, waiting once and re-fetching once when the
    /// analysis has not been ingested yet or the request failed.
    async fn fetch_quality_status(&self) -> Option<QualityStatus> {
        match self.sonar.quality_status().await {
            Ok(quality) if quality.status != GateStatus::None => return Some(quality),
            Ok(_) => info!(delay = ?self.retry_delay, "quality status not ready, retrying once"),
            Err(err) => warn!(
                error = %err,
                delay = ?self.retry_delay,
                "quality status fetch failed, retrying once"
            ),
        }

        tokio::time::sleep(self.retry_delay).await;

        match self.sonar.quality_status().await {
            Ok(quality) if quality.status != GateStatus::None => Some(quality),
            Ok(_) => {
                warn!("quality status still not ready after retry");
                None
            }
            Err(err) => {
                warn!(error = %err, "quality status unavailable after retry");
                None
            }
        }
    }
}
