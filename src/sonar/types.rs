use serde::{Deserialize, Serialize};

/// Metric keys of the quality gate conditions the report understands.
pub mod metric_key {
    pub const NEW_RELIABILITY_RATING: &str = "new_reliability_rating";
    pub const NEW_SECURITY_RATING: &str = "new_security_rating";
    pub const NEW_MAINTAINABILITY_RATING: &str = "new_maintainability_rating";
    pub const NEW_SECURITY_HOTSPOTS_REVIEWED: &str = "new_security_hotspots_reviewed";
    pub const NEW_DUPLICATED_LINES_DENSITY: &str = "new_duplicated_lines_density";
    pub const NEW_COVERAGE: &str = "new_coverage";
}

/// Issue status values that matter for aggregation.
pub mod issue_status {
    pub const CLOSED: &str = "CLOSED";
}

/// Overall quality gate result for one analysis.
///
/// `None` means the server has not ingested the analysis yet. Any status
/// other than `OK` or `NONE` (including `WARN` from older servers) is read
/// as `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Ok,
    None,
    #[serde(other)]
    Error,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateStatus::Ok => write!(f, "OK"),
            GateStatus::Error => write!(f, "ERROR"),
            GateStatus::None => write!(f, "NONE"),
        }
    }
}

/// Response of `/api/qualitygates/project_status`.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityGateResponse {
    #[serde(rename = "projectStatus")]
    pub project_status: QualityStatus,
}

/// Snapshot of one analysis run's gate evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityStatus {
    pub status: GateStatus,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(rename = "metricKey")]
    pub metric_key: String,
    #[serde(rename = "actualValue", default)]
    pub actual_value: String,
}

/// A rule violation reported by the analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub key: String,
    pub project: String,
    /// `"<project>:<relative path>"`
    pub component: String,
    pub rule: String,
    pub status: String,
    pub message: String,
    pub severity: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub effort: Option<String>,
    #[serde(rename = "type")]
    pub issue_type: String,
    #[serde(default)]
    pub assignee: Option<String>,
}

/// Classification used for counting. Unknown types count as code smells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Bug,
    Vulnerability,
    CodeSmell,
}

impl Issue {
    pub fn kind(&self) -> IssueKind {
        match self.issue_type.as_str() {
            "BUG" => IssueKind::Bug,
            "VULNERABILITY" => IssueKind::Vulnerability,
            _ => IssueKind::CodeSmell,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == issue_status::CLOSED
    }

    pub fn path(&self) -> &str {
        component_path(&self.component, &self.project)
    }
}

/// A security-sensitive location awaiting manual review.
///
/// Only the fields the review annotation needs are read.
#[derive(Debug, Clone, Deserialize)]
pub struct Hotspot {
    pub component: String,
    pub project: String,
    #[serde(default)]
    pub line: Option<u32>,
    pub message: String,
}

impl Hotspot {
    pub fn path(&self) -> &str {
        component_path(&self.component, &self.project)
    }
}

/// Strip the leading `"<project>:"` from a component key.
///
/// Only a prefix is removed; a component that does not start with the
/// project key is returned unchanged.
pub fn component_path<'a>(component: &'a str, project: &str) -> &'a str {
    component
        .strip_prefix(project)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(component)
}

/// One page of `/api/issues/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePage {
    #[serde(default)]
    pub issues: Vec<Issue>,
    pub total: u32,
    /// 1-based page index
    pub p: u32,
    pub ps: u32,
}

/// One page of `/api/hotspots/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct HotspotPage {
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
    pub paging: Paging,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    #[serde(rename = "pageIndex")]
    pub page_index: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    pub total: u32,
}

/// Response of `/api/ce/activity`.
#[derive(Debug, Clone, Deserialize)]
pub struct Tasks {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: String,
    #[serde(rename = "submittedAt")]
    pub submitted_at: String,
}
