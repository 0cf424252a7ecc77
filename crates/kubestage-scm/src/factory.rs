use std::sync::Arc;

use crate::bitbucket::BitbucketFetcher;
use crate::error::{Result, ScmError};
use crate::fetcher::SourceFetcher;
use crate::github::GitHubFetcher;
use crate::gitlab::GitLabFetcher;

/// Picks a provider by host and immediately forgets which one it picked
/// (spec §9: "Do not carry the provider tag past this boundary") — the
/// caller only ever sees `Arc<dyn SourceFetcher>`.
pub fn fetcher_for_host(repository_url: &str, client: reqwest::Client) -> Result<Arc<dyn SourceFetcher>> {
    let host = host_of(repository_url)?;
    match host.as_str() {
        "github.com" => Ok(Arc::new(GitHubFetcher::new(client))),
        "gitlab.com" => Ok(Arc::new(GitLabFetcher::new(client))),
        "bitbucket.org" => Ok(Arc::new(BitbucketFetcher::new(client))),
        other => Err(ScmError::UnsupportedHost(other.to_string())),
    }
}

/// Extracts the host from either a bare `owner/repo` (defaults to
/// GitHub, matching spec.md's examples which omit the host entirely)
/// or a full `https://host/owner/repo` URL.
fn host_of(repository_url: &str) -> Result<String> {
    if !repository_url.contains("://") {
        return Ok("github.com".to_string());
    }
    let without_scheme = repository_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| ScmError::InvalidUrl(repository_url.to_string()))?;
    let host = without_scheme.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(ScmError::InvalidUrl(repository_url.to_string()));
    }
    Ok(host.to_string())
}

/// Strips scheme and host, leaving the `owner/repo` (or `group/sub/repo`
/// for GitLab) path the providers expect.
#[must_use]
pub fn repo_path_of(repository_url: &str) -> String {
    if let Some((_, rest)) = repository_url.split_once("://") {
        rest.split_once('/').map(|(_, path)| path.to_string()).unwrap_or_default()
    } else {
        repository_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_owner_repo_defaults_to_github() {
        assert_eq!(host_of("octo/example").unwrap(), "github.com");
    }

    #[test]
    fn full_url_extracts_host() {
        assert_eq!(host_of("https://gitlab.com/group/example").unwrap(), "gitlab.com");
    }

    #[test]
    fn repo_path_strips_scheme_and_host() {
        assert_eq!(repo_path_of("https://github.com/octo/example"), "octo/example");
        assert_eq!(repo_path_of("octo/example"), "octo/example");
    }

    #[test]
    fn unsupported_host_is_rejected() {
        let err = fetcher_for_host("https://git.example.com/a/b", reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, ScmError::UnsupportedHost(_)));
    }
}
