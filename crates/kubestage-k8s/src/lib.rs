//! Cluster client capability surface (spec §4.3) and its two
//! implementations: `live` (backed by `kube::Api<K>`) and `fake`
//! (in-memory, used by `kubestage-engine`'s integration tests).

mod client;
mod error;
mod fake;
mod kinds;
mod live;

pub use client::ClusterClient;
pub use error::{ClusterError, Result};
pub use fake::{ClusterErrorKind, FakeClusterClient};
pub use kinds::{Kind, ManagedObject, WatchEvent};
pub use live::LiveClusterClient;
