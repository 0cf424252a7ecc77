use base64::Engine;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Result, ScmError};
use crate::fetcher::{ResolvedSource, SourceFetcher};

const API_BASE: &str = "https://api.bitbucket.org/2.0";

pub struct BitbucketFetcher {
    client: reqwest::Client,
}

impl BitbucketFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    hash: String,
}

#[async_trait::async_trait]
impl SourceFetcher for BitbucketFetcher {
    #[instrument(skip(self, token), fields(provider = "bitbucket"))]
    async fn tarball_url(&self, repo_path: &str, branch: &str, token: Option<&str>) -> Result<ResolvedSource> {
        let (owner, repo) = repo_path
            .split_once('/')
            .ok_or_else(|| ScmError::InvalidUrl(repo_path.to_string()))?;

        let mut request = self.client.get(format!("{API_BASE}/repositories/{owner}/{repo}/commit/{branch}"));
        if let Some(token) = token {
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("x-token-auth:{token}"));
            request = request.header("Authorization", format!("Basic {encoded}"));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ScmError::UnexpectedResponse(format!(
                "Bitbucket commit lookup for {owner}/{repo}@{branch} returned {}",
                response.status()
            )));
        }
        let commit: CommitResponse = response.json().await?;
        let short_hash = &commit.hash[..commit.hash.len().min(12)];

        Ok(ResolvedSource {
            tarball_url: format!("https://bitbucket.org/{owner}/{repo}/get/{branch}.tar.gz"),
            archive_root_prefix: format!("{owner}-{repo}-{short_hash}"),
        })
    }
}
