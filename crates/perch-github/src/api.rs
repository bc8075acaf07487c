//! GitHub REST collaborator.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::payloads::{Issue, Label, Repository};
use crate::transport::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// `owner/name` coordinates of a repository.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn from_repository(repository: &Repository) -> Self {
        Self::new(repository.owner.login.clone(), repository.name.clone())
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `CloseReason` values.
pub enum CloseReason {
    Completed,
    NotPlanned,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NotPlanned => "not_planned",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "completed" => Some(Self::Completed),
            "not_planned" => Some(Self::NotPlanned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
}

#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue>;
    /// Replaces the label set of an issue or pull request.
    async fn update_issue_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>>;
    async fn create_issue(&self, repo: &RepoRef, issue: &NewIssue) -> Result<Issue>;
    async fn close_issue(&self, repo: &RepoRef, number: u64, reason: CloseReason)
        -> Result<Issue>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Connection and retry settings for [`GithubApiClient`].
pub struct GithubClientConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(config: GithubClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("perch-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn issue_url(&self, repo: &RepoRef, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/issues/{number}",
            self.api_base, repo.owner, repo.name
        )
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-perch-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tracing::debug!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "retrying github request"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}

#[async_trait]
impl GithubApi for GithubApiClient {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Issue> {
        let url = self.issue_url(repo, number);
        self.request_json("get issue", || self.http.get(url.as_str()))
            .await
    }

    async fn update_issue_labels(
        &self,
        repo: &RepoRef,
        number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>> {
        let url = format!("{}/labels", self.issue_url(repo, number));
        let payload = json!({ "labels": labels });
        self.request_json("update issue labels", || {
            self.http.put(url.as_str()).json(&payload)
        })
        .await
    }

    async fn create_issue(&self, repo: &RepoRef, issue: &NewIssue) -> Result<Issue> {
        let url = format!("{}/repos/{}/{}/issues", self.api_base, repo.owner, repo.name);
        let mut payload = json!({ "title": issue.title, "labels": issue.labels });
        if let Some(body) = issue.body.as_deref() {
            payload["body"] = json!(body);
        }
        self.request_json("create issue", || self.http.post(url.as_str()).json(&payload))
            .await
    }

    async fn close_issue(
        &self,
        repo: &RepoRef,
        number: u64,
        reason: CloseReason,
    ) -> Result<Issue> {
        let url = self.issue_url(repo, number);
        let payload = json!({ "state": "closed", "state_reason": reason.as_str() });
        self.request_json("close issue", || self.http.patch(url.as_str()).json(&payload))
            .await
    }
}
