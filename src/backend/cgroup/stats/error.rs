//! Errors raised while parsing cgroup and procfs stat files.
//!
//! [`StatParseError`] converts into [`std::io::Error`] with kind
//! [`std::io::ErrorKind::InvalidData`] so stat readers can keep returning `io::Result`.
//!
//! ```rust
//! use creo_collector::backend::cgroup::stats::StatParseError;
//!
//! fn parse_counter(val: &str) -> std::io::Result<u64> {
//!     Ok(val.parse::<u64>().map_err(|source| StatParseError::InvalidValue {
//!         value: val.to_owned(),
//!         line: 1,
//!         source,
//!     })?)
//! }
//!
//! let err = parse_counter("twelve").unwrap_err();
//! assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
//! ```

use std::num::ParseIntError;

#[derive(Debug, thiserror::Error)]
pub enum StatParseError {
    #[error("duplicate field '{field}' at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value at line {line}: '{value}': {source}")]
    InvalidValue {
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid device number at line {line}: '{value}'")]
    InvalidDevice { value: String, line: usize },

    #[error("error during I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StatParseError> for std::io::Error {
    fn from(err: StatParseError) -> Self {
        match err {
            StatParseError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Extracts the `StatParseError` wrapped by an `std::io::Error`.
///
/// Panics if the inner error is not a `StatParseError`. Test assertions only.
#[cfg(test)]
pub(super) fn extract_stat_parse_error(err: &std::io::Error) -> &StatParseError {
    err.get_ref()
        .and_then(|e| e.downcast_ref::<StatParseError>())
        .unwrap()
}
