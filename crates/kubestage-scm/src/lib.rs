//! Source-fetcher contract and its three VCS-provider implementations
//! (spec §4.2, §6, §9): resolves a workflow's source ref to a tarball
//! URL the init container downloads.

mod bitbucket;
mod error;
mod factory;
mod fetcher;
mod github;
mod gitlab;

pub use error::{Result, ScmError};
pub use factory::{fetcher_for_host, repo_path_of};
pub use fetcher::{ResolvedSource, SourceFetcher};
