//! Discovery of running containers from the containerd runtime v2 task state directory.
//!
//! containerd keeps one OCI bundle per running task at `<state_dir>/<namespace>/<id>/`. The
//! bundle's `config.json` carries the annotations set by the CRI plugin and the cgroup path,
//! `init.pid` holds the PID of the container's init process.

use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::{CONTAINER_NAME_LABEL, POD_NAME_LABEL, POD_NAMESPACE_LABEL};
use crate::fsutil;

const CRI_SANDBOX_NAMESPACE: &str = "io.kubernetes.cri.sandbox-namespace";
const CRI_SANDBOX_NAME: &str = "io.kubernetes.cri.sandbox-name";
const CRI_CONTAINER_NAME: &str = "io.kubernetes.cri.container-name";

/// The parts of an OCI runtime spec we read.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OciSpec {
    annotations: HashMap<String, String>,
    linux: Option<OciLinux>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OciLinux {
    cgroups_path: Option<String>,
}

/// A running container as described by its bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub namespace: String,
    pub id: String,
    pub labels: HashMap<String, String>,
    pub pid: Option<u32>,
    /// `linux.cgroupsPath` as written by the runtime.
    pub cgroups_path: Option<String>,
}

impl Bundle {
    /// Loads the bundle in `dir`, named `<namespace>/<id>` by its position in the state directory.
    pub fn load(namespace: &str, id: &str, dir: &Path) -> std::io::Result<Self> {
        let spec: OciSpec = {
            let reader = fsutil::open_file_reader(dir.join("config.json"))
                .map_err(|err| std::io::Error::new(err.source.kind(), err))?;
            serde_json::from_reader(reader)?
        };

        let pid = fsutil::read_with(dir.join("init.pid"), |buf| {
            let mut raw = String::new();
            buf.read_to_string(&mut raw)?;
            Ok(raw.trim().parse::<u32>().ok())
        })?
        .flatten();

        Ok(Self {
            namespace: namespace.to_owned(),
            id: id.to_owned(),
            labels: kubernetes_labels(spec.annotations),
            pid,
            cgroups_path: spec.linux.and_then(|linux| linux.cgroups_path),
        })
    }

    /// Resolves the container's cgroup, relative to the cgroup root and starting with `/`.
    ///
    /// The membership of the init process in `<rootfs>/proc/<pid>/cgroup` wins; the bundle's
    /// `cgroupsPath` is used when the process is gone or unreadable.
    pub fn cgroup_path(&self, rootfs: &Path) -> Option<String> {
        self.pid
            .and_then(|pid| read_process_cgroup(rootfs, pid))
            .or_else(|| self.cgroups_path.as_deref().and_then(expand_cgroups_path))
    }
}

/// Adds the Kubernetes identity labels derived from the CRI annotations.
fn kubernetes_labels(mut annotations: HashMap<String, String>) -> HashMap<String, String> {
    for (cri, label) in [
        (CRI_SANDBOX_NAMESPACE, POD_NAMESPACE_LABEL),
        (CRI_SANDBOX_NAME, POD_NAME_LABEL),
        (CRI_CONTAINER_NAME, CONTAINER_NAME_LABEL),
    ] {
        if let Some(value) = annotations.get(cri).cloned() {
            annotations.entry(label.to_owned()).or_insert(value);
        }
    }
    annotations
}

/// Loads every bundle below `state_dir`. Bundles that can't be read are skipped.
///
/// # Errors
///
/// Fails only if `state_dir` itself can't be listed.
pub fn scan_bundles(state_dir: &Path) -> std::io::Result<Vec<Bundle>> {
    let mut bundles = Vec::new();
    for namespace in std::fs::read_dir(state_dir)? {
        let namespace = namespace?;
        if !namespace.file_type()?.is_dir() {
            continue;
        }
        let ns_name = namespace.file_name().to_string_lossy().into_owned();
        let tasks = match std::fs::read_dir(namespace.path()) {
            Ok(tasks) => tasks,
            Err(err) => {
                log::warn!("Failed to list namespace `{}`: {}", ns_name, err);
                continue;
            }
        };
        for task in tasks.flatten() {
            let dir = task.path();
            let id = task.file_name().to_string_lossy().into_owned();
            match Bundle::load(&ns_name, &id, &dir) {
                Ok(bundle) => bundles.push(bundle),
                // tasks being torn down leave partial bundles behind
                Err(err) => log::debug!("Skipping bundle `{}`: {}", dir.display(), err),
            }
        }
    }
    bundles.sort_by(|a, b| (&a.namespace, &a.id).cmp(&(&b.namespace, &b.id)));
    Ok(bundles)
}

#[derive(Debug, thiserror::Error)]
pub enum CgroupLineError {
    #[error("invalid cgroup line format: {0}")]
    InvalidFormat(String),
    #[error("invalid hierarchy id in cgroup line: {0}")]
    InvalidHierarchyID(String),
}

#[derive(Debug, PartialEq, Eq)]
struct CgroupLine<'a> {
    hierarchy_id: u32,
    controllers: &'a str,
    cgroup_path: &'a str,
}

fn parse_cgroup_line(line: &str) -> Result<CgroupLine<'_>, CgroupLineError> {
    let mut it = line.splitn(3, ':');
    let hierarchy_id = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?
        .parse::<u32>()
        .map_err(|_| CgroupLineError::InvalidHierarchyID(line.to_owned()))?;
    let controllers = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?;
    let cgroup_path = it
        .next()
        .ok_or_else(|| CgroupLineError::InvalidFormat(line.to_owned()))?;

    Ok(CgroupLine {
        hierarchy_id,
        controllers,
        cgroup_path: cgroup_path.trim(),
    })
}

/// Finds the unified (`0::`) hierarchy entry of `<rootfs>/proc/<pid>/cgroup`.
fn read_process_cgroup(rootfs: &Path, pid: u32) -> Option<String> {
    let path = rootfs.join(format!("proc/{pid}/cgroup"));
    let buf = fsutil::open_file_reader(&path).ok()?;
    for line in buf.lines().map_while(Result::ok) {
        match parse_cgroup_line(&line) {
            Ok(cgl) if cgl.hierarchy_id == 0 && cgl.controllers.is_empty() => {
                return Some(cgl.cgroup_path.to_owned());
            }
            Ok(_) => {}
            Err(err) => log::warn!("invalid cgroup file `{}`: {}", path.display(), err),
        }
    }
    None
}

/// Turns an OCI `cgroupsPath` into a path below the cgroup root.
///
/// Plain paths are taken as they are. The systemd form `slice:prefix:name` expands to the
/// nested slices systemd creates, e.g. `kubepods-besteffort-pod1.slice:cri-containerd:abc`
/// becomes
/// `/kubepods.slice/kubepods-besteffort.slice/kubepods-besteffort-pod1.slice/cri-containerd-abc.scope`.
pub fn expand_cgroups_path(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with('/') {
        return Some(raw.to_owned());
    }

    let mut parts = raw.splitn(3, ':');
    let (slice, prefix, name) = (parts.next()?, parts.next()?, parts.next()?);

    let mut path = PathBuf::from("/");
    if let Some(stem) = slice.strip_suffix(".slice").filter(|s| !s.is_empty() && *s != "-") {
        let mut parent = String::new();
        for component in stem.split('-') {
            if !parent.is_empty() {
                parent.push('-');
            }
            parent.push_str(component);
            path.push(format!("{parent}.slice"));
        }
    }
    if prefix.is_empty() {
        path.push(format!("{name}.scope"));
    } else {
        path.push(format!("{prefix}-{name}.scope"));
    }

    Some(path.to_string_lossy().into_owned())
}
