pub mod types;

pub use types::{ReportParams, SecurityFacets, NO_DATA};

use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::rating::{grade, Grade};
use crate::sonar::types::{metric_key, Condition, Issue};
use crate::sonar::GateStatus;

/// First line of every report. The GitHub client looks for this prefix to
/// find a previously published report.
pub const REPORT_MARKER: &str = "# SonarQube Code Analytics";

const IMAGE_DIR_LINK: &str = "https://hsonar.s3.ap-southeast-1.amazonaws.com/images/";
/// Two ideographic spaces between note fields.
const NOTE_SEPARATOR: &str = "\u{3000}\u{3000}";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Renders issue notes and the pull request status report with links back
/// to one SonarQube project.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    host: String,
    project_key: String,
}

impl ReportRenderer {
    pub fn new(host: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            project_key: project_key.into(),
        }
    }

    /// Inline review text for one issue.
    ///
    /// ```text
    /// **<message>**  [<sub>Why is this an issue?</sub>](<rule link>)
    ///
    /// <icon> Bug　　<icon> **Major**　　:hourglass: *5min* effort　　:bust_in_silhouette: @dev
    /// ```
    pub fn issue_note(&self, issue: &Issue) -> String {
        let rule_link = format!(
            "{}/coding_rules?open={}&rule_key={}",
            self.host, issue.rule, issue.rule
        );
        let mut note = String::new();
        note.push_str(&format!(
            "**{}**  [<sub>Why is this an issue?</sub>]({}) \n\n",
            issue.message, rule_link
        ));
        note.push_str(&format!(
            "{} {}",
            icon(&issue.issue_type),
            capitalize(&issue.issue_type.replacen('_', "", 1))
        ));
        note.push_str(&format!(
            "{}{} **{}**",
            NOTE_SEPARATOR,
            icon(&issue.severity),
            capitalize(&issue.severity)
        ));
        note.push_str(&format!(
            "{}:hourglass: *{}* effort",
            NOTE_SEPARATOR,
            issue.effort.as_deref().unwrap_or("0min")
        ));
        if let Some(assignee) = issue.assignee.as_deref().filter(|a| !a.is_empty()) {
            note.push_str(&format!("{}:bust_in_silhouette: @{}", NOTE_SEPARATOR, assignee));
        }
        note
    }

    /// Render the full markdown status report.
    pub fn render(&self, params: &ReportParams<'_>) -> String {
        let pr = params.pull_request;
        let facets = &params.facets;

        let coverage_text = if facets.coverage_pct >= 0.0 {
            format!(
                " [{:.2}% Coverage]({})",
                facets.coverage_pct,
                self.metric_url("new_coverage", pr)
            )
        } else {
            "**Coverage**".to_string()
        };
        let duplicated_text = if facets.duplication_pct >= 0.0 {
            format!(
                " [{:.2}% Duplication]({})",
                facets.duplication_pct,
                self.metric_url("new_duplicated_lines_density", pr)
            )
        } else {
            "**Duplication**".to_string()
        };
        let status_icon = match params.status {
            GateStatus::Ok => icon("passed"),
            _ => icon("failed"),
        };
        let closed_text = if params.closed_count > 0 {
            format!("- Closed Issues: {} issues closed", params.closed_count)
        } else {
            String::new()
        };
        let dashboard = self.dashboard_url(pr);

        let mut md = String::new();
        md.push_str(&format!("{} \n", REPORT_MARKER));
        md.push_str(&format!("## Quality Gate Status: {}\n\n", params.status));
        md.push_str(&format!("{}\n\n", status_icon));
        md.push_str(&format!("[Sonar report]({}) ({})\n\n", dashboard, dashboard));
        md.push_str("## Additional information\n");
        md.push_str("*The following metrics might not affect the Quality Gate status but improving them will improve your project code quality.*\n\n");
        md.push_str("## Issues\n");
        md.push_str(&format!(
            "- Bugs: {} [{} Bugs]({})\n\n",
            grade_icon(facets.bug_grade),
            params.bug_count,
            self.issue_url("BUG", pr)
        ));
        md.push_str(&format!(
            "- Vulnerabilities: {} [{} Vulnerabilities]({})\n\n",
            grade_icon(facets.vulnerability_grade),
            params.vulnerability_count,
            self.issue_url("VULNERABILITY", pr)
        ));
        md.push_str(&format!(
            "- Code Smells: {} [{} Code Smells]({})\n\n",
            grade_icon(facets.code_smell_grade),
            params.code_smell_count,
            self.issue_url("CODE_SMELL", pr)
        ));
        md.push_str(&format!(
            "- Security Hotspots: {} [{} Security Hotspots]({})\n\n",
            grade_icon(facets.hotspot_grade),
            params.hotspot_count,
            self.hotspot_url(pr)
        ));
        md.push_str(&format!("{}\n\n", closed_text));
        md.push_str("## Coverage and Duplications\n");
        md.push_str(&format!("- Coverage: {}\n\n", coverage_text));
        md.push_str(&format!("- Duplications: {}", duplicated_text));
        md
    }

    fn issue_url(&self, issue_type: &str, pr: &str) -> String {
        format!(
            "{}/project/issues?id={}&resolved=false&sinceLeakPeriod=true&types={}&pullRequest={}",
            self.host, self.project_key, issue_type, pr
        )
    }

    fn dashboard_url(&self, pr: &str) -> String {
        format!("{}/dashboard?id={}&pullRequest={}", self.host, self.project_key, pr)
    }

    fn metric_url(&self, metric: &str, pr: &str) -> String {
        format!(
            "{}/project/issues?id={}&metric={}&view=list&pullRequest={}",
            self.host, self.project_key, metric, pr
        )
    }

    fn hotspot_url(&self, pr: &str) -> String {
        format!(
            "{}/security_hotspots?id={}&pullRequest={}&inNewCodePeriod=true",
            self.host, self.project_key, pr
        )
    }
}

/// Read grades and percentages out of the gate conditions in one pass.
///
/// Any condition on reviewed hotspots forces the hotspot grade to `E`,
/// whatever its value. Unknown metric keys are ignored and missing metrics
/// keep their "no data" value.
pub fn derive_security_facets(conditions: &[Condition]) -> SecurityFacets {
    let mut facets = SecurityFacets::default();
    for condition in conditions {
        let value = condition.actual_value.as_str();
        match condition.metric_key.as_str() {
            metric_key::NEW_RELIABILITY_RATING => facets.bug_grade = grade(value),
            metric_key::NEW_MAINTAINABILITY_RATING => facets.code_smell_grade = grade(value),
            metric_key::NEW_SECURITY_RATING => facets.vulnerability_grade = grade(value),
            metric_key::NEW_SECURITY_HOTSPOTS_REVIEWED => facets.hotspot_grade = Some(Grade::E),
            metric_key::NEW_DUPLICATED_LINES_DENSITY => {
                facets.duplication_pct = parse_percentage(value)
            }
            metric_key::NEW_COVERAGE => facets.coverage_pct = parse_percentage(value),
            _ => {}
        }
    }
    facets
}

/// Read the leading decimal number of `value`, so "42.5%" is 42.5.
fn parse_percentage(value: &str) -> f64 {
    let text = value.trim_start();
    let candidate = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .map_or(text, |end| &text[..end]);
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(NO_DATA)
}

fn capitalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Markdown image for `name`, or nothing when the name is empty.
fn icon(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    format!("![{}]({}{}.png)", name, IMAGE_DIR_LINK, name.to_lowercase())
}

fn grade_icon(grade: Option<Grade>) -> String {
    grade.map(|g| icon(g.as_str())).unwrap_or_default()
}

/// Write the rendered report to a markdown file.
#[instrument(skip(markdown), fields(bytes = markdown.len()))]
pub fn output(markdown: &str, path: &Path) -> Result<(), ReportError> {
    debug!(path = %path.display(), "writing report to file");
    std::fs::write(path, markdown)?;
    Ok(())
}
