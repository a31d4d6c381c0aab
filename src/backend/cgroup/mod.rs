//! [`StatsBackend`] for Linux cgroup v2 hosts running containerd.
//!
//! Containers are discovered from containerd's task bundles, sampled from their cgroup
//! directory and the procfs of their init process, and kept in a bounded history.

mod bundle;
mod history;
pub mod mountinfo;
mod sampler;
pub mod stats;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

pub use bundle::{Bundle, expand_cgroups_path, scan_bundles};
pub use history::History;

use super::{
    ContainerInfo, ContainerSpec, Error, IdType, ROOT_NAME, RequestOptions, Result, StatsBackend,
};

#[derive(Debug)]
pub struct CgroupBackend {
    rootfs: PathBuf,
    state_dir: PathBuf,
    cgroup_root: OnceLock<PathBuf>,
    history: History,
}

impl CgroupBackend {
    /// Creates a backend for the host mounted at `rootfs`. `state_dir` is the containerd task
    /// state directory relative to `rootfs`.
    pub fn new(
        rootfs: impl Into<PathBuf>,
        state_dir: impl AsRef<Path>,
        history_len: usize,
    ) -> Self {
        let rootfs = rootfs.into();
        let state_dir = state_dir.as_ref();
        let state_dir = rootfs.join(state_dir.strip_prefix("/").unwrap_or(state_dir));
        Self {
            rootfs,
            state_dir,
            cgroup_root: OnceLock::new(),
            history: History::new(history_len),
        }
    }

    /// Whether a container is selected by a query for `name`.
    fn matches(
        bundle: &Bundle,
        container_name: &str,
        name: &str,
        options: &RequestOptions,
    ) -> bool {
        match options.id_type {
            IdType::Id => bundle.id == name,
            IdType::Name => {
                if container_name == name {
                    return true;
                }
                if !options.recursive {
                    return false;
                }
                name == ROOT_NAME
                    || container_name
                        .strip_prefix(name.trim_end_matches('/'))
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    fn sample_container(
        &self,
        cgroup_root: &Path,
        bundle: Bundle,
        name: String,
        count: usize,
        now: SystemTime,
    ) -> Option<ContainerInfo> {
        let dir = cgroup_root.join(name.trim_start_matches('/'));
        let previous = self.history.latest(&name);
        let (stats, caps) =
            match sampler::sample(&self.rootfs, &dir, bundle.pid, previous.as_ref(), now) {
                Ok(sample) => sample,
                Err(err) => {
                    log::warn!("Failed to sample container `{}`: {}", name, err);
                    return None;
                }
            };
        self.history.record(&name, stats);

        Some(ContainerInfo {
            stats: self.history.recent(&name, count),
            spec: ContainerSpec {
                labels: bundle.labels,
                has_cpu: caps.cpu,
                has_memory: caps.memory,
                has_network: caps.network,
                has_filesystem: false,
                has_diskio: caps.diskio,
            },
            name,
        })
    }
}

impl StatsBackend for CgroupBackend {
    fn start(&self) -> Result<()> {
        let cgroup_root = mountinfo::detect_validated_cgroup2_mount_point(&self.rootfs)?;
        log::info!("Using cgroup2 hierarchy at `{}`", cgroup_root.display());
        std::fs::read_dir(&self.state_dir).map_err(|source| Error::StateDir {
            path: self.state_dir.clone(),
            source,
        })?;
        // A repeated start keeps the root detected first.
        if let Err(detected) = self.cgroup_root.set(cgroup_root) {
            log::warn!(
                "Backend already started, ignoring cgroup root `{}`",
                detected.display()
            );
        }
        Ok(())
    }

    fn container_info(&self, name: &str, options: &RequestOptions) -> Result<Vec<ContainerInfo>> {
        let cgroup_root = self.cgroup_root.get().ok_or(Error::NotStarted)?;
        let bundles = scan_bundles(&self.state_dir).map_err(|source| Error::ListContainers {
            path: self.state_dir.clone(),
            source,
        })?;

        let now = SystemTime::now();
        let mut live = HashSet::with_capacity(bundles.len());
        let mut selected = Vec::new();
        for bundle in bundles {
            let Some(container_name) = bundle.cgroup_path(&self.rootfs) else {
                log::debug!(
                    "No cgroup for container `{}/{}`",
                    bundle.namespace,
                    bundle.id
                );
                continue;
            };
            live.insert(container_name.clone());
            if Self::matches(&bundle, &container_name, name, options) {
                selected.push((bundle, container_name));
            }
        }
        self.history.retain(&live);

        if selected.is_empty() && name != ROOT_NAME {
            return Err(Error::UnknownContainer(name.to_owned()));
        }

        Ok(selected
            .into_iter()
            .filter_map(|(bundle, container_name)| {
                self.sample_container(cgroup_root, bundle, container_name, options.count, now)
            })
            .collect())
    }
}
