//! Parsing of the cgroup v2 memory controller files.
//!
//! - `memory.stat` is read into [`MemoryStat`] (whitespace separated key-value pairs).
//! - `memory.current` and `memory.swap.current` hold a single byte count and are read into
//!   [`MemoryCounter`].
//! - `memory.events` is read into [`MemoryEvents`].
//!
//! ```rust
//! use creo_collector::backend::cgroup::stats::{
//!     KeyValueStat, MemoryCounter, MemoryStat, SingleLineStat,
//! };
//!
//! let stat = MemoryStat::from_reader(&mut "anon 1000\nfile 2000\n".as_bytes()).unwrap();
//! assert_eq!(stat.file, 2000);
//!
//! let current = MemoryCounter::from_reader(&mut "8192\n".as_bytes()).unwrap();
//! assert_eq!(current.bytes, 8192);
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use super::parser::{FieldHandler, KeyValueStat, SingleLineStat};
use super::StatParseError;

/// Breakdown of `memory.stat`, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryStat {
    /// Anonymous memory (resident set).
    pub anon: u64,
    /// Page cache.
    pub file: u64,
    /// Page cache mapped into process address spaces.
    pub file_mapped: u64,
    pub active_file: u64,
    /// Page cache the kernel may reclaim first; excluded from the working set.
    pub inactive_file: u64,
    pub shmem: u64,
}

static STAT_SETTERS: LazyLock<HashMap<&'static str, FieldHandler<MemoryStat>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, FieldHandler<MemoryStat>> = HashMap::with_capacity(6);

        m.insert("anon", |s, v| s.anon = v);
        m.insert("file", |s, v| s.file = v);
        m.insert("file_mapped", |s, v| s.file_mapped = v);
        m.insert("active_file", |s, v| s.active_file = v);
        m.insert("inactive_file", |s, v| s.inactive_file = v);
        m.insert("shmem", |s, v| s.shmem = v);

        m
    });

impl KeyValueStat for MemoryStat {
    const SPLIT_CHAR: Option<char> = None;
    const SKIP_VALUES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &STAT_SETTERS
    }
}

/// Event counters of `memory.events`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryEvents {
    pub low: u64,
    pub high: u64,
    /// Number of times usage was about to exceed `memory.max`.
    pub max: u64,
    pub oom: u64,
    pub oom_kill: u64,
}

static EVENT_SETTERS: LazyLock<HashMap<&'static str, FieldHandler<MemoryEvents>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, FieldHandler<MemoryEvents>> = HashMap::with_capacity(5);

        m.insert("low", |s, v| s.low = v);
        m.insert("high", |s, v| s.high = v);
        m.insert("max", |s, v| s.max = v);
        m.insert("oom", |s, v| s.oom = v);
        m.insert("oom_kill", |s, v| s.oom_kill = v);

        m
    });

impl KeyValueStat for MemoryEvents {
    const SPLIT_CHAR: Option<char> = None;
    const SKIP_VALUES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &EVENT_SETTERS
    }
}

/// A single byte counter such as `memory.current` or `memory.swap.current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryCounter {
    pub bytes: u64,
}

impl SingleLineStat for MemoryCounter {
    /// # Errors
    ///
    /// Returns an error of kind [`std::io::ErrorKind::InvalidData`] if the value is not a `u64`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let line = line.trim();
        let bytes = line
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidValue {
                value: line.to_owned(),
                line: 1,
                source,
            })?;

        Ok(Self { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_empty_memory_stat() {
        let stat = MemoryStat::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, MemoryStat::default());
    }

    #[test]
    fn test_parse_kernel_memory_stat() {
        let data = "\
anon 1000
file 2000
kernel 128
kernel_stack 300
shmem 600
file_mapped 700
file_dirty 0
active_anon 10
inactive_anon 990
active_file 1500
inactive_file 500
";
        let stat = MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.anon, 1000);
        assert_eq!(stat.file, 2000);
        assert_eq!(stat.shmem, 600);
        assert_eq!(stat.file_mapped, 700);
        assert_eq!(stat.active_file, 1500);
        assert_eq!(stat.inactive_file, 500);
    }

    #[test]
    fn test_parse_invalid_memory_stat() {
        let data = "anon 1000\nfile xyz\n";
        let err = MemoryStat::from_reader(&mut data.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue {
                key, value, line, ..
            } => {
                assert_eq!(key, "file");
                assert_eq!(value, "xyz");
                assert_eq!(*line, 2);
            }
            other => panic!("Expected InvalidKeyValue error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_memory_events() {
        let data = "\
low 0
high 4
max 17
oom 1
oom_kill 1
oom_group_kill 0
";
        let events = MemoryEvents::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(events.high, 4);
        assert_eq!(events.max, 17);
        assert_eq!(events.oom, 1);
        assert_eq!(events.oom_kill, 1);
    }

    #[test]
    fn test_parse_memory_counter() {
        let counter = MemoryCounter::from_reader(&mut "  4096 \n".as_bytes()).unwrap();
        assert_eq!(counter.bytes, 4096);
    }

    #[test]
    fn test_parse_invalid_memory_counter() {
        let err = MemoryCounter::from_reader(&mut "max\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidValue { value, line, .. } => {
                assert_eq!(value, "max");
                assert_eq!(*line, 1);
            }
            other => panic!("Expected InvalidValue error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_memory_counter_fails() {
        let err = MemoryCounter::from_reader(&mut "".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
