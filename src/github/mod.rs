pub mod types;

pub use types::{Comment, PrUrl};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::analysis::ReviewAnnotation;
use crate::config::ReportPolicy;
use crate::report::REPORT_MARKER;
use types::{CommentBody, ReviewComment, ReviewRequest};

const USER_AGENT: &str = "sonar-gate";
const ACCEPT: &str = "application/vnd.github.v3+json";
const COMMENTS_PER_PAGE: usize = 100;
const REVIEW_EVENT: &str = "COMMENT";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub token not found in environment")]
    MissingToken,
}

/// Write side of the git hosting platform.
#[async_trait]
pub trait GitPublisher: Send + Sync {
    /// Publish the status report as a pull request comment.
    async fn publish_report(&self, markdown: &str) -> Result<Comment, GitError>;

    /// Submit all annotations as one review. Returns `None` without calling
    /// the API when there is nothing to submit.
    async fn publish_review(
        &self,
        annotations: &[ReviewAnnotation],
    ) -> Result<Option<Comment>, GitError>;
}

/// Issue comment operations on one pull request.
#[async_trait]
pub trait CommentThread: Send + Sync {
    /// One page (1-based) of comments, at most 100 long.
    async fn list_comments(&self, page: usize) -> Result<Vec<Comment>, GitError>;

    async fn create_comment(&self, markdown: &str) -> Result<Comment, GitError>;

    async fn update_comment(&self, id: u64, markdown: &str) -> Result<Comment, GitError>;
}

/// Parse a GitHub PR URL into its component parts.
///
/// Expected format: https://<host>/{owner}/{repo}/pull/{number}. Any host is
/// accepted so GitHub Enterprise URLs work too.
pub fn parse_pr_url(url: &str) -> Result<PrUrl, GitError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| GitError::InvalidUrl(url.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(GitError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GitError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GitError::InvalidUrl(url.to_string()));
    }

    let pr_number = segments[3]
        .parse::<u64>()
        .map_err(|_| GitError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        pr_number,
    })
}

/// GitHub REST client scoped to one pull request.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    pr: PrUrl,
    policy: ReportPolicy,
}

impl GitHubClient {
    pub fn new(pr: PrUrl, config: &crate::config::Config) -> Result<Self, GitError> {
        let token = config.github_token().ok_or(GitError::MissingToken)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_url: config.github_api_url(),
            token,
            pr,
            policy: config.github.report_policy,
        })
    }

    fn issue_comments_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_url, self.pr.owner, self.pr.repo, self.pr.pr_number
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", ACCEPT)
            .header("Authorization", format!("token {}", self.token))
    }
}

#[async_trait]
impl CommentThread for GitHubClient {
    async fn list_comments(&self, page: usize) -> Result<Vec<Comment>, GitError> {
        let comments = self
            .request(reqwest::Method::GET, &self.issue_comments_url())
            .query(&[("per_page", COMMENTS_PER_PAGE), ("page", page)])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Comment>>()
            .await?;
        Ok(comments)
    }

    async fn create_comment(&self, markdown: &str) -> Result<Comment, GitError> {
        let comment = self
            .request(reqwest::Method::POST, &self.issue_comments_url())
            .json(&CommentBody { body: markdown })
            .send()
            .await?
            .error_for_status()?
            .json::<Comment>()
            .await?;
        Ok(comment)
    }

    async fn update_comment(&self, id: u64, markdown: &str) -> Result<Comment, GitError> {
        let url = format!(
            "{}/repos/{}/{}/issues/comments/{}",
            self.api_url, self.pr.owner, self.pr.repo, id
        );
        let comment = self
            .request(reqwest::Method::PATCH, &url)
            .json(&CommentBody { body: markdown })
            .send()
            .await?
            .error_for_status()?
            .json::<Comment>()
            .await?;
        Ok(comment)
    }
}

fn is_report_comment(comment: &Comment) -> bool {
    comment
        .body
        .as_deref()
        .is_some_and(|body| body.starts_with(REPORT_MARKER))
}

/// Find the first earlier report comment, walking pages until one comes
/// back shorter than a full page.
pub async fn find_report_comment(thread: &dyn CommentThread) -> Result<Option<Comment>, GitError> {
    let mut page = 1usize;
    loop {
        let comments = thread.list_comments(page).await?;
        let fetched = comments.len();
        debug!(page, count = fetched, "listed PR comments");

        if let Some(found) = comments.into_iter().find(is_report_comment) {
            return Ok(Some(found));
        }
        if fetched < COMMENTS_PER_PAGE {
            return Ok(None);
        }
        page += 1;
    }
}

/// Create the report comment, or edit the earlier one under
/// [`ReportPolicy::Update`].
#[instrument(skip(thread, markdown))]
pub async fn publish_with_policy(
    thread: &dyn CommentThread,
    policy: ReportPolicy,
    markdown: &str,
) -> Result<Comment, GitError> {
    if policy == ReportPolicy::Update {
        if let Some(existing) = find_report_comment(thread).await? {
            info!(comment = existing.id, "updating existing report comment");
            return thread.update_comment(existing.id, markdown).await;
        }
    }
    info!("creating report comment");
    thread.create_comment(markdown).await
}

/// Build the review payload. Annotations with a line become inline
/// comments; the rest are listed in the review body.
fn review_request(annotations: &[ReviewAnnotation]) -> ReviewRequest<'_> {
    let mut file_notes = Vec::new();
    let mut comments = Vec::with_capacity(annotations.len());
    for annotation in annotations {
        match annotation.line {
            Some(line) => comments.push(ReviewComment {
                path: &annotation.path,
                line,
                body: &annotation.comment,
            }),
            None => file_notes.push(format!("`{}`\n\n{}", annotation.path, annotation.comment)),
        }
    }
    ReviewRequest {
        body: file_notes.join("\n\n"),
        event: REVIEW_EVENT,
        comments,
    }
}

#[async_trait]
impl GitPublisher for GitHubClient {
    #[instrument(skip(self, markdown), fields(pr = self.pr.pr_number))]
    async fn publish_report(&self, markdown: &str) -> Result<Comment, GitError> {
        publish_with_policy(self, self.policy, markdown).await
    }

    #[instrument(
        skip(self, annotations),
        fields(pr = self.pr.pr_number, count = annotations.len())
    )]
    async fn publish_review(
        &self,
        annotations: &[ReviewAnnotation],
    ) -> Result<Option<Comment>, GitError> {
        if annotations.is_empty() {
            debug!("no annotations, skipping review");
            return Ok(None);
        }

        let request = review_request(annotations);
        debug!(
            inline = request.comments.len(),
            file_level = annotations.len() - request.comments.len(),
            "submitting review"
        );
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.api_url, self.pr.owner, self.pr.repo, self.pr.pr_number
        );
        let review = self
            .request(reqwest::Method::POST, &url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Comment>()
            .await?;
        debug!(review = review.id, "review submitted");
        Ok(Some(review))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn test_client() -> GitHubClient {
        let mut config = crate::config::Config::default();
        config.github.token = Some("ghp_test".to_string());
        // Unroutable so any accidental request fails fast.
        config.github.api_url = Some("http://127.0.0.1:9".to_string());
        GitHubClient::new(parse_pr_url("https://github.com/org/repo/pull/42").unwrap(), &config)
            .unwrap()
    }

    fn comment(id: u64, body: &str) -> Comment {
        Comment {
            id,
            body: Some(body.to_string()),
            html_url: None,
        }
    }

    /// Unrelated comments with ids starting at `first_id`.
    fn chatter(first_id: u64, count: usize) -> Vec<Comment> {
        (0..count as u64)
            .map(|i| comment(first_id + i, "LGTM"))
            .collect()
    }

    /// In-memory comment thread serving fixed pages.
    #[derive(Default)]
    struct FakeThread {
        pages: Vec<Vec<Comment>>,
        listed: Mutex<Vec<usize>>,
        created: Mutex<Vec<String>>,
        updated: Mutex<Vec<(u64, String)>>,
    }

    impl FakeThread {
        fn with_pages(pages: Vec<Vec<Comment>>) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl CommentThread for FakeThread {
        async fn list_comments(&self, page: usize) -> Result<Vec<Comment>, GitError> {
            self.listed.lock().unwrap().push(page);
            Ok(self.pages.get(page - 1).cloned().unwrap_or_default())
        }

        async fn create_comment(&self, markdown: &str) -> Result<Comment, GitError> {
            self.created.lock().unwrap().push(markdown.to_string());
            Ok(comment(9000, markdown))
        }

        async fn update_comment(&self, id: u64, markdown: &str) -> Result<Comment, GitError> {
            self.updated.lock().unwrap().push((id, markdown.to_string()));
            Ok(comment(id, markdown))
        }
    }

    const REPORT: &str = "# SonarQube Code Analytics \n## Quality Gate Status: OK";

    #[test]
    fn test_parse_valid_pr_url() {
        let url = parse_pr_url("https://github.com/org/repo/pull/42").unwrap();
        assert_eq!(url.owner, "org");
        assert_eq!(url.repo, "repo");
        assert_eq!(url.pr_number, 42);
    }

    #[test]
    fn test_parse_enterprise_pr_url() {
        let url = parse_pr_url("https://git.example.com/team/service/pull/7/").unwrap();
        assert_eq!(url.owner, "team");
        assert_eq!(url.pr_number, 7);
    }

    #[test]
    fn test_parse_invalid_pr_url() {
        assert!(parse_pr_url("https://example.com").is_err());
        assert!(parse_pr_url("not-a-url").is_err());
        assert!(parse_pr_url("https://github.com/org/repo/pulls/42").is_err());
        assert!(parse_pr_url("https://github.com/org/repo/pull/abc").is_err());
        assert!(parse_pr_url("ftp://github.com/org/repo/pull/42").is_err());
    }

    #[test]
    fn test_issue_comments_url() {
        assert_eq!(
            test_client().issue_comments_url(),
            "http://127.0.0.1:9/repos/org/repo/issues/42/comments"
        );
    }

    #[test]
    fn test_is_report_comment() {
        let quoted = comment(2, "> # SonarQube Code Analytics");
        let empty = Comment {
            id: 3,
            body: None,
            html_url: None,
        };
        assert!(is_report_comment(&comment(1, REPORT)));
        assert!(!is_report_comment(&quoted));
        assert!(!is_report_comment(&empty));
    }

    #[tokio::test]
    async fn test_update_patches_report_found_on_later_page() {
        let mut second = chatter(101, 5);
        second.insert(2, comment(150, REPORT));
        let thread = FakeThread::with_pages(vec![chatter(1, 100), second]);

        let published = publish_with_policy(&thread, ReportPolicy::Update, "new report")
            .await
            .unwrap();

        assert_eq!(published.id, 150);
        assert_eq!(*thread.listed.lock().unwrap(), vec![1, 2]);
        assert_eq!(
            *thread.updated.lock().unwrap(),
            vec![(150, "new report".to_string())]
        );
        assert!(thread.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_edits_first_report_only() {
        let page = vec![comment(7, REPORT), comment(8, REPORT)];
        let thread = FakeThread::with_pages(vec![page]);

        publish_with_policy(&thread, ReportPolicy::Update, "new report")
            .await
            .unwrap();

        let updated = thread.updated.lock().unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0, 7);
    }

    #[tokio::test]
    async fn test_update_creates_when_no_report_found() {
        let thread = FakeThread::with_pages(vec![chatter(1, 100), chatter(101, 30)]);

        let published = publish_with_policy(&thread, ReportPolicy::Update, "new report")
            .await
            .unwrap();

        assert_eq!(published.id, 9000);
        // The short second page ends the walk.
        assert_eq!(*thread.listed.lock().unwrap(), vec![1, 2]);
        assert_eq!(*thread.created.lock().unwrap(), vec!["new report".to_string()]);
        assert!(thread.updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_report_stops_after_short_first_page() {
        let thread = FakeThread::with_pages(vec![chatter(1, 40), vec![comment(99, REPORT)]]);
        let found = find_report_comment(&thread).await.unwrap();
        assert!(found.is_none());
        assert_eq!(*thread.listed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_find_report_checks_empty_page_after_full_one() {
        let thread = FakeThread::with_pages(vec![chatter(1, 100)]);
        let found = find_report_comment(&thread).await.unwrap();
        assert!(found.is_none());
        assert_eq!(*thread.listed.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_append_always_creates_without_listing() {
        let thread = FakeThread::with_pages(vec![vec![comment(1, REPORT)]]);

        publish_with_policy(&thread, ReportPolicy::Append, "new report")
            .await
            .unwrap();

        assert!(thread.listed.lock().unwrap().is_empty());
        assert!(thread.updated.lock().unwrap().is_empty());
        assert_eq!(thread.created.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_review_request_keeps_lined_annotations_inline() {
        let annotations = vec![
            ReviewAnnotation {
                path: "src/a.rs".to_string(),
                line: Some(3),
                comment: "**Fix a**".to_string(),
            },
            ReviewAnnotation {
                path: "src/b.rs".to_string(),
                line: Some(9),
                comment: "**Fix b**".to_string(),
            },
        ];
        let request = review_request(&annotations);
        assert_eq!(request.event, "COMMENT");
        assert!(request.body.is_empty());
        assert_eq!(request.comments.len(), 2);
        assert_eq!(request.comments[1].path, "src/b.rs");
        assert_eq!(request.comments[1].line, 9);
    }

    #[test]
    fn test_review_request_folds_lineless_annotations_into_body() {
        let annotations = vec![
            ReviewAnnotation {
                path: "src/a.rs".to_string(),
                line: Some(3),
                comment: "**Fix a**".to_string(),
            },
            ReviewAnnotation {
                path: "Cargo.toml".to_string(),
                line: None,
                comment: "**Pin this dependency**".to_string(),
            },
            ReviewAnnotation {
                path: "src/lib.rs".to_string(),
                line: None,
                comment: "**Split this file**".to_string(),
            },
        ];
        let request = review_request(&annotations);
        assert_eq!(request.comments.len(), 1);
        assert_eq!(request.comments[0].path, "src/a.rs");
        assert_eq!(
            request.body,
            "`Cargo.toml`\n\n**Pin this dependency**\n\n`src/lib.rs`\n\n**Split this file**"
        );
    }

    #[tokio::test]
    async fn test_empty_review_is_not_sent() {
        let result = test_client().publish_review(&[]).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_client_requires_token() {
        let config = crate::config::Config::default();
        if std::env::var("GITHUB_TOKEN").is_err() {
            let pr = parse_pr_url("https://github.com/org/repo/pull/1").unwrap();
            assert!(matches!(
                GitHubClient::new(pr, &config),
                Err(GitError::MissingToken)
            ));
        }
    }
}
