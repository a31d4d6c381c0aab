//! Container statistics backends.
//!
//! A backend answers a single question: "what containers exist below this name, and what are
//! their most recent resource usage samples?". The collection loop only talks to the
//! [`StatsBackend`] trait; [`cgroup::CgroupBackend`] is the implementation used by the binary.
use std::path::PathBuf;

pub mod cgroup;
mod types;

pub use types::{
    CfsStats, ContainerInfo, ContainerSpec, ContainerStats, CpuStats, CpuUsage, FilesystemStats,
    IdType, InterfaceStats, MemoryStats, NetworkStats, PerDiskStats, RequestOptions, TcpStat,
};

/// Name of the root of the container hierarchy.
pub const ROOT_NAME: &str = "/";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to detect cgroup root: {0}")]
    CgroupRoot(#[from] cgroup::mountinfo::Error),
    #[error("containerd state directory `{path}` is not accessible: {source}")]
    StateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backend was queried before it was started")]
    NotStarted,
    #[error("failed to list containers in `{path}`: {source}")]
    ListContainers {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown container `{0}`")]
    UnknownContainer(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Source of per-container statistics.
///
/// Both methods may block on file system access and are called from the blocking thread pool.
pub trait StatsBackend: Send + Sync {
    /// Prepares the backend. Called once before the first query; an error is fatal.
    fn start(&self) -> Result<()>;

    /// Returns the containers named by `name` (and, if requested, the ones below it) together
    /// with up to `options.count` of their most recent samples.
    fn container_info(&self, name: &str, options: &RequestOptions) -> Result<Vec<ContainerInfo>>;
}
