//! Detection of the cgroup v2 hierarchy from a `/proc/<pid>/mountinfo` file.
//!
//! See [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html)
//! for the line format.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to detect cgroup v2 mount point in file `{path}`")]
    MissingCgroup2Mount { path: PathBuf },
    #[error("malformed line {line} in file `{path}`")]
    Parse { path: PathBuf, line: usize },
    #[error("failed to canonicalize cgroup2 mount path `{path}`: {source}")]
    Canonicalization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cgroup2 mount path `{path}` is not a directory")]
    NotADirectory { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The fields of a mountinfo line we need.
#[derive(Debug, PartialEq, Eq)]
struct MountEntry<'a> {
    mount_point: &'a str,
    fs_type: &'a str,
}

/// Splits a mountinfo line at its ` - ` separator and picks the mount point (5th field) and
/// filesystem type (1st field after the separator).
fn parse_mount_entry(line: &str) -> Option<MountEntry<'_>> {
    let (pre, post) = line.split_once(" - ")?;
    let mount_point = pre.split_whitespace().nth(4)?;
    let fs_type = post.split_whitespace().next()?;
    Some(MountEntry {
        mount_point,
        fs_type,
    })
}

/// Decodes the octal escapes (`\040` for a space) the kernel uses in mount paths.
fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn find_cgroup2_mount_point<R: BufRead>(mut reader: R, origin: &Path) -> Result<PathBuf> {
    let mut line = String::with_capacity(256);
    let mut lineno = 0;

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        lineno += 1;
        let entry = parse_mount_entry(&line).ok_or_else(|| Error::Parse {
            path: origin.to_path_buf(),
            line: lineno,
        })?;
        if entry.fs_type == "cgroup2" {
            log::debug!("Found `cgroup2` mount point: {}", entry.mount_point);
            return Ok(PathBuf::from(unescape_mount_path(entry.mount_point)));
        }
        line.clear();
    }

    Err(Error::MissingCgroup2Mount {
        path: origin.to_path_buf(),
    })
}

/// Finds the first `cgroup2` mount listed in `<rootfs>/proc/1/mountinfo` and returns its
/// canonical location below `rootfs`.
///
/// # Errors
///
/// Fails if the mountinfo file can't be read or parsed, lists no `cgroup2` mount, or the
/// mount point does not resolve to a directory.
///
/// ```no_run
/// use creo_collector::backend::cgroup::mountinfo::detect_validated_cgroup2_mount_point;
///
/// let root = detect_validated_cgroup2_mount_point("/").unwrap();
/// println!("cgroup2 root: {}", root.display());
/// ```
pub fn detect_validated_cgroup2_mount_point(rootfs: impl AsRef<Path>) -> Result<PathBuf> {
    let rootfs = rootfs.as_ref();
    let mountinfo = rootfs.join("proc/1/mountinfo");
    let reader = fsutil::open_file_reader(&mountinfo)?;
    let mount_point = find_cgroup2_mount_point(reader, &mountinfo)?;

    let raw = rootfs.join(mount_point.strip_prefix("/").unwrap_or(&mount_point));
    let canonical = std::fs::canonicalize(&raw).map_err(|source| Error::Canonicalization {
        path: raw.clone(),
        source,
    })?;
    if !canonical.is_dir() {
        return Err(Error::NotADirectory { path: canonical });
    }

    Ok(canonical)
}
