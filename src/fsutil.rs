use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use creo_collector::fsutil;
/// let reader = fsutil::open_file_reader("/proc/1/mountinfo")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Opens `path` and applies `reader` to it.
///
/// Returns `Ok(None)` if the file does not exist, which is how cgroup controllers that are
/// not enabled show up.
///
/// # Errors
///
/// Any other open error, and every error returned by `reader`.
pub fn read_with<T>(
    path: impl AsRef<Path>,
    reader: impl FnOnce(&mut BufReader<File>) -> io::Result<T>,
) -> io::Result<Option<T>> {
    let mut buf = match open_file_reader(path) {
        Ok(buf) => buf,
        Err(FileOpenError { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            return Ok(None);
        }
        Err(err) => return Err(io::Error::new(err.source.kind(), err)),
    };
    reader(&mut buf).map(Some)
}
