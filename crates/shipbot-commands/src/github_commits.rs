//! Source-control gateway: latest commits via the GitHub REST API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shipbot_core::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

/// One entry of a repository's commit listing. Only the identifier
/// matters to revision resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoCommit {
    #[serde(default)]
    pub sha: String,
}

/// Fetches the most recent commits for a repository.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Returns commits in the provider's default ordering, which is
    /// newest first. Revision resolution depends on that ordering; no
    /// client-side sort is applied.
    async fn latest_commits(&self, org: &str, repo: &str) -> Result<Vec<RepoCommit>>;
}

pub struct GithubCommitsClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubCommitsClient {
    pub fn new(
        api_base: String,
        token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("shipbot-deploy"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
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
                .header(
                    "x-shipbot-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
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
impl SourceControl for GithubCommitsClient {
    async fn latest_commits(&self, org: &str, repo: &str) -> Result<Vec<RepoCommit>> {
        let api_base = self.api_base.clone();
        let org = org.to_string();
        let repo = repo.to_string();
        self.request_json("list commits", || {
            self.http
                .get(format!("{}/repos/{}/{}/commits", api_base, org, repo))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{GithubCommitsClient, SourceControl};

    fn client(base_url: &str) -> GithubCommitsClient {
        GithubCommitsClient::new(base_url.to_string(), "token".to_string(), 5_000, 3, 10)
            .expect("client")
    }

    #[tokio::test]
    async fn integration_latest_commits_decodes_shas_in_listing_order() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/widgets/commits")
                .header("authorization", "Bearer token");
            then.status(200).json_body(json!([
                { "sha": "abcdef1234567890", "commit": { "message": "newest" } },
                { "sha": "0123456789abcdef", "commit": { "message": "older" } },
            ]));
        });

        let commits = client(&server.base_url())
            .latest_commits("acme", "widgets")
            .await
            .expect("commits");

        assert_eq!(mock.calls(), 1);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "abcdef1234567890");
        assert_eq!(commits[1].sha, "0123456789abcdef");
    }

    #[tokio::test]
    async fn integration_latest_commits_retries_rate_limits_before_succeeding() {
        let server = MockServer::start();
        let rate_limited = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/widgets/commits")
                .header("x-shipbot-retry-attempt", "0");
            then.status(429).header("retry-after", "0").body("slow down");
        });
        let ok = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/widgets/commits")
                .header("x-shipbot-retry-attempt", "1");
            then.status(200)
                .json_body(json!([{ "sha": "abcdef1234567890" }]));
        });

        let commits = client(&server.base_url())
            .latest_commits("acme", "widgets")
            .await
            .expect("commits");

        assert_eq!(rate_limited.calls(), 1);
        assert_eq!(ok.calls(), 1);
        assert_eq!(commits[0].sha, "abcdef1234567890");
    }

    #[tokio::test]
    async fn regression_latest_commits_surfaces_client_errors_without_retry() {
        let server = MockServer::start();
        let not_found = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/commits");
            then.status(404).body("{\"message\":\"Not Found\"}");
        });

        let error = client(&server.base_url())
            .latest_commits("acme", "widgets")
            .await
            .expect_err("should fail");

        assert_eq!(not_found.calls(), 1);
        assert!(error.to_string().contains("status 404"));
    }
}
