//! GitHub REST v3 client.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::config::DevsoloConfig;
use crate::git::{GitRemoteUrl, Repository};

use super::retry::RetryConfig;
use super::{
    CheckRun, CheckRunSummary, MergeMethod, MergeResult, PlatformError, PlatformResult,
    PullRequest, Release, Review, ReviewSummary,
};

/// Per-call HTTP timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for [`GithubClient::create_pull_request`].
#[derive(Debug, Clone, Serialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    /// Head branch name.
    pub head: String,
    /// Base branch name (the trunk).
    pub base: String,
    #[serde(default)]
    pub draft: bool,
    pub maintainer_can_modify: bool,
}

/// Typed client for one `owner/repo` on a GitHub host.
///
/// Construction reads the repository's primary remote URL and resolves the
/// auth token from configuration, then `GITHUB_TOKEN`, then `GH_TOKEN`.
pub struct GithubClient {
    http: reqwest::blocking::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
    retry: RetryConfig,
}

impl GithubClient {
    /// Build a client for the repository's `origin` remote.
    pub fn from_repository(repo: &Repository, config: &DevsoloConfig) -> PlatformResult<Self> {
        let url = repo
            .remote_url()
            .map_err(|e| PlatformError::NotConfigured(e.to_string()))?
            .ok_or_else(|| PlatformError::NotConfigured("no origin remote".into()))?
            .to_string();
        let parsed = GitRemoteUrl::parse(&url).ok_or_else(|| {
            PlatformError::NotConfigured(format!("unsupported remote URL: {url}"))
        })?;
        let token = resolve_token(config).ok_or_else(|| {
            PlatformError::NotConfigured(
                "no token found (set git-platform.token, GITHUB_TOKEN, or GH_TOKEN)".into(),
            )
        })?;
        Self::new(parsed.host(), parsed.owner(), parsed.repo(), token)
    }

    /// Build a client against an explicit host/owner/repo.
    pub fn new(
        host: &str,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> PlatformResult<Self> {
        let api_base = if host == "github.com" {
            "https://api.github.com".to_string()
        } else {
            // GitHub Enterprise serves the v3 API under /api/v3
            format!("https://{host}/api/v3")
        };
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("devsolo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::NotConfigured(e.to_string()))?;
        Ok(Self {
            http,
            api_base,
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            retry: RetryConfig::default(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.repo, path)
    }

    // =========================================================================
    // Pull requests
    // =========================================================================

    /// Open a pull request.
    ///
    /// Idempotent on conflict: when the platform answers 422 (a PR already
    /// exists for this head), the existing open PR is returned instead.
    pub fn create_pull_request(&self, params: &CreatePullRequest) -> PlatformResult<PullRequest> {
        let url = self.repo_url("pulls");
        let body = serde_json::to_value(params).map_err(|e| PlatformError::Decode(e.to_string()))?;
        match self.send(Method::Post, &url, Some(&body)) {
            Ok(text) => decode(&text),
            Err(PlatformError::Api { status: 422, .. }) => {
                log::debug!("422 creating PR for {}; reusing existing open PR", params.head);
                self.pull_request_for_branch(&params.head)?.ok_or(PlatformError::Api {
                    status: 422,
                    message: format!("PR for {} rejected and no open PR found", params.head),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch one pull request by number.
    pub fn get_pull_request(&self, number: u64) -> PlatformResult<PullRequest> {
        let text = self.send(Method::Get, &self.repo_url(&format!("pulls/{number}")), None)?;
        decode(&text)
    }

    /// All open pull requests whose head is `branch` in this repository.
    pub fn open_pull_requests(&self, branch: &str) -> PlatformResult<Vec<PullRequest>> {
        let url = format!(
            "{}?state=open&head={}:{}",
            self.repo_url("pulls"),
            self.owner,
            branch
        );
        let text = self.send(Method::Get, &url, None)?;
        decode(&text)
    }

    /// The single open PR for `branch`, or `None`.
    ///
    /// More than one open PR for the same head is a broken invariant the
    /// caller must treat as fatal; this method reports it as an API-level
    /// error so it can never be silently collapsed to "the first one".
    pub fn pull_request_for_branch(&self, branch: &str) -> PlatformResult<Option<PullRequest>> {
        let mut prs = self.open_pull_requests(branch)?;
        match prs.len() {
            0 => Ok(None),
            1 => Ok(Some(prs.remove(0))),
            n => Err(PlatformError::Api {
                status: 200,
                message: format!("{n} open pull requests share head {branch}"),
            }),
        }
    }

    /// Merge a pull request. Already-merged PRs are detected and returned as
    /// a successful no-op so retries converge.
    pub fn merge_pull_request(
        &self,
        number: u64,
        method: MergeMethod,
        commit_title: Option<&str>,
    ) -> PlatformResult<MergeResult> {
        let existing = self.get_pull_request(number)?;
        if existing.merged {
            log::debug!("PR #{number} already merged; skipping merge call");
            return Ok(MergeResult {
                merged: true,
                sha: Some(existing.head.sha),
                message: Some("already merged".into()),
            });
        }
        let mut body = json!({ "merge_method": method.to_string() });
        if let Some(title) = commit_title {
            body["commit_title"] = json!(title);
        }
        let url = self.repo_url(&format!("pulls/{number}/merge"));
        let text = self.send(Method::Put, &url, Some(&body))?;
        decode(&text)
    }

    /// Update the title and/or body of an existing pull request. With
    /// nothing to change, this degrades to a plain fetch.
    pub fn update_pull_request(
        &self,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> PlatformResult<PullRequest> {
        let mut payload = serde_json::Map::new();
        if let Some(title) = title {
            payload.insert("title".into(), json!(title));
        }
        if let Some(body) = body {
            payload.insert("body".into(), json!(body));
        }
        if payload.is_empty() {
            return self.get_pull_request(number);
        }
        let url = self.repo_url(&format!("pulls/{number}"));
        let text = self.send(Method::Patch, &url, Some(&serde_json::Value::Object(payload)))?;
        decode(&text)
    }

    /// Close a pull request without merging.
    pub fn close_pull_request(&self, number: u64) -> PlatformResult<PullRequest> {
        let url = self.repo_url(&format!("pulls/{number}"));
        let text = self.send(Method::Patch, &url, Some(&json!({ "state": "closed" })))?;
        decode(&text)
    }

    /// Add a comment to a pull request.
    pub fn add_comment(&self, number: u64, body: &str) -> PlatformResult<()> {
        let url = self.repo_url(&format!("issues/{number}/comments"));
        self.send(Method::Post, &url, Some(&json!({ "body": body })))?;
        Ok(())
    }

    /// Review aggregation for a pull request.
    pub fn list_reviews(&self, number: u64) -> PlatformResult<ReviewSummary> {
        let url = self.repo_url(&format!("pulls/{number}/reviews"));
        let text = self.send(Method::Get, &url, None)?;
        let reviews: Vec<Review> = decode(&text)?;
        Ok(ReviewSummary::from_reviews(&reviews))
    }

    // =========================================================================
    // Checks and releases
    // =========================================================================

    /// CI check runs for a ref, summarized.
    pub fn check_runs(&self, git_ref: &str) -> PlatformResult<CheckRunSummary> {
        #[derive(serde::Deserialize)]
        struct CheckRunsResponse {
            check_runs: Vec<CheckRun>,
        }
        let url = self.repo_url(&format!("commits/{git_ref}/check-runs"));
        let text = self.send(Method::Get, &url, None)?;
        let response: CheckRunsResponse = decode(&text)?;
        Ok(CheckRunSummary::from_runs(response.check_runs))
    }

    /// Whether the repository has any check-suite history for a ref.
    ///
    /// Used by the advisory `ciConfigured` pre-flight: a repository with no
    /// suites will never produce check runs to wait for.
    pub fn has_check_history(&self, git_ref: &str) -> PlatformResult<bool> {
        #[derive(serde::Deserialize)]
        struct CheckSuitesResponse {
            total_count: u64,
        }
        let url = self.repo_url(&format!("commits/{git_ref}/check-suites"));
        let text = self.send(Method::Get, &url, None)?;
        let response: CheckSuitesResponse = decode(&text)?;
        Ok(response.total_count > 0)
    }

    /// Create a release for a tag.
    pub fn create_release(
        &self,
        tag: &str,
        name: &str,
        body: &str,
        prerelease: bool,
    ) -> PlatformResult<Release> {
        let url = self.repo_url("releases");
        let payload = json!({
            "tag_name": tag,
            "name": name,
            "body": body,
            "prerelease": prerelease,
        });
        let text = self.send(Method::Post, &url, Some(&payload))?;
        decode(&text)
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> PlatformResult<String> {
        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            let delay = self.retry.delay_for(attempt);
            if !delay.is_zero() {
                log::debug!("retrying {url} in {delay:?} (attempt {})", attempt + 1);
                std::thread::sleep(delay);
            }

            let request = match method {
                Method::Get => self.http.get(url),
                Method::Post => self.http.post(url),
                Method::Put => self.http.put(url),
                Method::Patch => self.http.patch(url),
            }
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json");
            let request = match body {
                Some(json) => request.json(json),
                None => request,
            };

            log::debug!("{method:?} {url}");
            match request.send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().unwrap_or_default();
                    match status {
                        200..=299 => return Ok(text),
                        401 | 403 => {
                            return Err(PlatformError::Forbidden {
                                status,
                                message: api_message(&text),
                            });
                        }
                        429 | 500..=599 => {
                            last_error = format!("HTTP {status}: {}", api_message(&text));
                            log::debug!("transient platform failure: {last_error}");
                        }
                        _ => {
                            return Err(PlatformError::Api {
                                status,
                                message: api_message(&text),
                            });
                        }
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    log::debug!("transport failure for {url}: {last_error}");
                }
            }
        }
        Err(PlatformError::Unreachable {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Put,
    Patch,
}

/// Token resolution order: configuration, `GITHUB_TOKEN`, `GH_TOKEN`.
fn resolve_token(config: &DevsoloConfig) -> Option<String> {
    if let Some(token) = &config.git_platform.token
        && !token.is_empty()
    {
        return Some(token.clone());
    }
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var)
            && !token.is_empty()
        {
            return Some(token);
        }
    }
    None
}

fn decode<T: serde::de::DeserializeOwned>(text: &str) -> PlatformResult<T> {
    serde_json::from_str(text).map_err(|e| PlatformError::Decode(e.to_string()))
}

/// Pull the `message` field out of a GitHub error body, falling back to the
/// raw text.
fn api_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| text.chars().take(200).collect())
}
