use serde::{Deserialize, Serialize};

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}

/// An issue comment or review as returned by the GitHub API.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentBody<'a> {
    pub body: &'a str,
}

/// Payload of `POST /repos/{owner}/{repo}/pulls/{number}/reviews`.
#[derive(Debug, Serialize)]
pub(crate) struct ReviewRequest<'a> {
    pub body: String,
    pub event: &'a str,
    pub comments: Vec<ReviewComment<'a>>,
}

/// An inline review comment. GitHub rejects review comments without a line.
#[derive(Debug, Serialize)]
pub(crate) struct ReviewComment<'a> {
    pub path: &'a str,
    pub line: u32,
    pub body: &'a str,
}
