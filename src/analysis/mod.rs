use std::future::Future;
use tracing::{debug, warn};

use crate::report::ReportRenderer;
use crate::sonar::types::IssueKind;
use crate::sonar::{Hotspot, HotspotPage, Issue, IssuePage, SonarApi, SonarError};

/// Issue and hotspot tallies for one pull request analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateCounts {
    pub bug_count: u32,
    pub vulnerability_count: u32,
    pub code_smell_count: u32,
    pub closed_count: u32,
    pub hotspot_count: u32,
}

impl AggregateCounts {
    /// Open issues that decide the gate. Closed issues and hotspots are not
    /// included.
    pub fn blocking(&self) -> u32 {
        self.bug_count + self.vulnerability_count + self.code_smell_count
    }
}

/// A review note on a file in the pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewAnnotation {
    pub path: String,
    /// `None` when the analysis did not report a line. Such notes go into
    /// the review body instead of an inline comment.
    pub line: Option<u32>,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub counts: AggregateCounts,
    pub annotations: Vec<ReviewAnnotation>,
}

/// A page of a paginated SonarQube search result.
pub trait Paged {
    type Item;

    /// Total number of items across all pages, as reported by the server.
    fn total(&self) -> u32;
    /// 1-based index of this page
    fn page_index(&self) -> u32;
    fn page_size(&self) -> u32;
    fn into_items(self) -> Vec<Self::Item>;
}

impl Paged for IssuePage {
    type Item = Issue;

    fn total(&self) -> u32 {
        self.total
    }

    fn page_index(&self) -> u32 {
        self.p
    }

    fn page_size(&self) -> u32 {
        self.ps
    }

    fn into_items(self) -> Vec<Issue> {
        self.issues
    }
}

impl Paged for HotspotPage {
    type Item = Hotspot;

    fn total(&self) -> u32 {
        self.paging.total
    }

    fn page_index(&self) -> u32 {
        self.paging.page_index
    }

    fn page_size(&self) -> u32 {
        self.paging.page_size
    }

    fn into_items(self) -> Vec<Hotspot> {
        self.hotspots
    }
}

/// Items gathered from every page, with the total the first page reported.
#[derive(Debug, Clone)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub total: u32,
}

fn page_count(total: u32, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    total.div_ceil(page_size)
}

/// Fetch page 1 and then every following page in order, concatenating the
/// items.
///
/// A failure on the first page is returned as an error. A failure on any
/// later page stops the walk and the items fetched so far are returned.
pub async fn collect_pages<P, F, Fut>(mut fetch: F) -> Result<Collected<P::Item>, SonarError>
where
    P: Paged,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<P, SonarError>>,
{
    let first = fetch(1).await?;
    let total = first.total();
    let total_pages = page_count(total, first.page_size());
    let next_page = first.page_index().max(1) + 1;
    let mut items = first.into_items();
    debug!(total, total_pages, "fetched first page");

    for page in next_page..=total_pages {
        match fetch(page).await {
            Ok(next) => items.extend(next.into_items()),
            Err(err) => {
                warn!(
                    page,
                    total_pages,
                    error = %err,
                    "page fetch failed, keeping partial results"
                );
                break;
            }
        }
    }

    Ok(Collected { items, total })
}

/// All issues raised on the pull request.
pub async fn fetch_all_issues(
    sonar: &dyn SonarApi,
    pull_request: &str,
) -> Result<Vec<Issue>, SonarError> {
    let collected = collect_pages(move |page| sonar.issue_page(pull_request, page)).await?;
    Ok(collected.items)
}

/// All security hotspots raised on the pull request, with the reported total.
pub async fn fetch_all_hotspots(
    sonar: &dyn SonarApi,
    pull_request: &str,
) -> Result<Collected<Hotspot>, SonarError> {
    collect_pages(move |page| sonar.hotspot_page(pull_request, page)).await
}

/// Count issues by type and build one review annotation per open issue and
/// per hotspot.
///
/// `hotspot_total` is the total the hotspot search reported, which can be
/// larger than `hotspots.len()` when pagination stopped early.
pub fn aggregate(
    issues: &[Issue],
    hotspots: &[Hotspot],
    hotspot_total: u32,
    renderer: &ReportRenderer,
) -> Aggregation {
    let mut counts = AggregateCounts {
        hotspot_count: hotspot_total,
        ..AggregateCounts::default()
    };
    let mut annotations = Vec::with_capacity(issues.len() + hotspots.len());

    for issue in issues {
        if issue.is_closed() {
            debug!(issue = %issue.key, "closed issue, no annotation");
            counts.closed_count += 1;
            continue;
        }
        match issue.kind() {
            IssueKind::Bug => counts.bug_count += 1,
            IssueKind::Vulnerability => counts.vulnerability_count += 1,
            IssueKind::CodeSmell => counts.code_smell_count += 1,
        }
        annotations.push(ReviewAnnotation {
            path: issue.path().to_string(),
            line: issue.line,
            comment: renderer.issue_note(issue),
        });
    }

    for hotspot in hotspots {
        annotations.push(ReviewAnnotation {
            path: hotspot.path().to_string(),
            line: hotspot.line,
            comment: format!("**{}**", hotspot.message),
        });
    }

    Aggregation {
        counts,
        annotations,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub fn test_issue(key: &str, issue_type: &str, status: &str) -> Issue {
        serde_json::from_value(serde_json::json!({
            "key": key, "project": "shop", "component": format!("shop:src/{}.rs", key),
            "rule": "rust:S100", "status": status, "message": format!("message {}", key),
            "severity": "MAJOR", "line": 7, "effort": "10min", "type": issue_type
        }))
        .unwrap()
    }

    pub fn test_hotspot(key: &str) -> Hotspot {
        serde_json::from_value(serde_json::json!({
            "key": key, "project": "shop", "component": format!("shop:src/{}.rs", key),
            "line": 3, "message": format!("Review {}", key)
        }))
        .unwrap()
    }

    pub fn issue_page(p: u32, ps: u32, total: u32, keys: &[&str]) -> IssuePage {
        IssuePage {
            issues: keys.iter().map(|k| test_issue(k, "BUG", "OPEN")).collect(),
            total,
            p,
            ps,
        }
    }

    fn renderer() -> ReportRenderer {
        ReportRenderer::new("https://sonar.example.com", "shop")
    }

    #[test]
    fn test_aggregate_counts_and_annotations() {
        let issues = vec![
            test_issue("b1", "BUG", "OPEN"),
            test_issue("b2", "BUG", "OPEN"),
            test_issue("b3", "BUG", "CONFIRMED"),
            test_issue("v1", "VULNERABILITY", "OPEN"),
            test_issue("v2", "VULNERABILITY", "OPEN"),
            test_issue("s1", "CODE_SMELL", "OPEN"),
            test_issue("c1", "BUG", "CLOSED"),
        ];
        let result = aggregate(&issues, &[], 0, &renderer());
        assert_eq!(
            result.counts,
            AggregateCounts {
                bug_count: 3,
                vulnerability_count: 2,
                code_smell_count: 1,
                closed_count: 1,
                hotspot_count: 0,
            }
        );
        assert_eq!(result.annotations.len(), 6);
        assert!(result.annotations.iter().all(|a| a.path != "src/c1.rs"));

        let c = result.counts;
        let sum = c.bug_count + c.vulnerability_count + c.code_smell_count + c.closed_count;
        assert_eq!(sum as usize, issues.len());
    }

    #[test]
    fn test_unknown_type_counts_as_code_smell() {
        let issues = vec![test_issue("x", "SECURITY_HOTSPOT", "OPEN")];
        let result = aggregate(&issues, &[], 0, &renderer());
        assert_eq!(result.counts.code_smell_count, 1);
    }

    #[test]
    fn test_issue_annotation_uses_note_and_path() {
        let issue = test_issue("cart", "BUG", "OPEN");
        let result = aggregate(std::slice::from_ref(&issue), &[], 0, &renderer());
        let annotation = &result.annotations[0];
        assert_eq!(annotation.path, "src/cart.rs");
        assert_eq!(annotation.line, Some(7));
        assert_eq!(annotation.comment, renderer().issue_note(&issue));
    }

    #[test]
    fn test_hotspots_always_annotated() {
        let hotspots = vec![test_hotspot("auth"), test_hotspot("crypto")];
        let result = aggregate(&[], &hotspots, 5, &renderer());
        assert_eq!(result.annotations.len(), 2);
        assert_eq!(result.annotations[0].comment, "**Review auth**");
        assert_eq!(result.annotations[1].path, "src/crypto.rs");
        // Reported total wins over the number of hotspots received.
        assert_eq!(result.counts.hotspot_count, 5);
        assert_eq!(result.counts.blocking(), 0);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(450, 200), 3);
        assert_eq!(page_count(400, 200), 2);
        assert_eq!(page_count(0, 200), 0);
        assert_eq!(page_count(10, 0), 1);
    }

    #[tokio::test]
    async fn test_collect_pages_fetches_all_pages() {
        let calls = AtomicU32::new(0);
        let collected = collect_pages(|page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let keys: &[&str] = match page {
                    1 => &["a", "b"],
                    2 => &["c", "d"],
                    _ => &["e"],
                };
                Ok::<_, SonarError>(issue_page(page, 200, 450, keys))
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(collected.total, 450);
        let keys: Vec<&str> = collected.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_failed_page() {
        let calls = AtomicU32::new(0);
        let collected = collect_pages(|page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match page {
                    1 => Ok(issue_page(1, 200, 450, &["a", "b"])),
                    _ => Err(SonarError::MissingSetting("page")),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(collected.items.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_pages_first_page_failure_is_error() {
        let result = collect_pages(|_page| async {
            Err::<IssuePage, _>(SonarError::MissingSetting("page"))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_collect_pages_single_page() {
        let calls = AtomicU32::new(0);
        let collected = collect_pages(|page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, SonarError>(issue_page(page, 200, 2, &["a", "b"])) }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(collected.items.len(), 2);
    }
}
