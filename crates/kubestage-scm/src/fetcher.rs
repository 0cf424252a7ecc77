use async_trait::async_trait;

use crate::error::Result;

/// What the Resource Synthesizer needs to build the init container: a
/// URL it can `curl`/`wget` and the prefix the VCS provider wraps the
/// extracted tree in (GitHub tarballs nest under `owner-repo-sha/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub tarball_url: String,
    pub archive_root_prefix: String,
}

/// Single capability shared by the three VCS providers (spec §9 Design
/// Notes: "model as a small interface... Do not carry the provider tag
/// past this boundary" — callers hold a `dyn SourceFetcher` and never
/// learn which provider backs it).
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn tarball_url(&self, repo_path: &str, branch: &str, token: Option<&str>) -> Result<ResolvedSource>;
}
