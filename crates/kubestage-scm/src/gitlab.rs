use serde::Deserialize;
use tracing::instrument;
use urlencoding::encode;

use crate::error::{Result, ScmError};
use crate::fetcher::{ResolvedSource, SourceFetcher};

const API_BASE: &str = "https://gitlab.com/api/v4";

pub struct GitLabFetcher {
    client: reqwest::Client,
}

impl GitLabFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    short_id: String,
}

#[async_trait::async_trait]
impl SourceFetcher for GitLabFetcher {
    #[instrument(skip(self, token), fields(provider = "gitlab"))]
    async fn tarball_url(&self, repo_path: &str, branch: &str, token: Option<&str>) -> Result<ResolvedSource> {
        let project_path = encode(repo_path);
        let repo_name = repo_path.rsplit('/').next().unwrap_or(repo_path);

        let mut request = self
            .client
            .get(format!("{API_BASE}/projects/{project_path}/repository/branches/{}", encode(branch)));
        if let Some(token) = token {
            request = request.header("PRIVATE-TOKEN", token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ScmError::UnexpectedResponse(format!(
                "GitLab branch lookup for {repo_path}@{branch} returned {}",
                response.status()
            )));
        }
        let branch_info: BranchResponse = response.json().await?;

        Ok(ResolvedSource {
            tarball_url: format!(
                "{API_BASE}/projects/{project_path}/repository/archive.tar.gz?sha={}",
                encode(branch)
            ),
            archive_root_prefix: format!("{repo_name}-{}-{}", branch, branch_info.commit.short_id),
        })
    }
}
