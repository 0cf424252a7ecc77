use serde::Deserialize;
use tracing::instrument;

use crate::error::{Result, ScmError};
use crate::fetcher::{ResolvedSource, SourceFetcher};

const API_BASE: &str = "https://api.github.com";

pub struct GitHubFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, base_url: API_BASE.to_string() }
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[async_trait::async_trait]
impl SourceFetcher for GitHubFetcher {
    #[instrument(skip(self, token), fields(provider = "github"))]
    async fn tarball_url(&self, repo_path: &str, branch: &str, token: Option<&str>) -> Result<ResolvedSource> {
        let (owner, repo) = split_owner_repo(repo_path)?;
        let base_url = &self.base_url;

        let mut request = self
            .client
            .get(format!("{base_url}/repos/{owner}/{repo}/commits/{branch}"))
            .header("User-Agent", "kubestage")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ScmError::UnexpectedResponse(format!(
                "GitHub commit lookup for {owner}/{repo}@{branch} returned {}",
                response.status()
            )));
        }
        let commit: CommitResponse = response.json().await?;
        let short_sha = &commit.sha[..commit.sha.len().min(7)];

        Ok(ResolvedSource {
            tarball_url: format!("{base_url}/repos/{owner}/{repo}/tarball/{branch}"),
            archive_root_prefix: format!("{owner}-{repo}-{short_sha}"),
        })
    }
}

fn split_owner_repo(repo_path: &str) -> Result<(&str, &str)> {
    repo_path
        .split_once('/')
        .ok_or_else(|| ScmError::InvalidUrl(repo_path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_tarball_url_and_short_sha_from_the_commit_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/models/commits/main"))
            .and(header("Accept", "application/vnd.github+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sha": "abc1234def5678"
            })))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher { client: reqwest::Client::new(), base_url: server.uri() };
        let resolved = fetcher.tarball_url("acme/models", "main", None).await.unwrap();

        assert_eq!(resolved.tarball_url, format!("{}/repos/acme/models/tarball/main", server.uri()));
        assert_eq!(resolved.archive_root_prefix, "acme-models-abc1234");
    }

    #[tokio::test]
    async fn a_non_success_status_becomes_an_unexpected_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/models/commits/main"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = GitHubFetcher { client: reqwest::Client::new(), base_url: server.uri() };
        let err = fetcher.tarball_url("acme/models", "main", None).await.unwrap_err();
        assert!(matches!(err, ScmError::UnexpectedResponse(_)));
    }
}
