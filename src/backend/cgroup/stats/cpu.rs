//! Parsing of the cgroup v2 `cpu.stat` file.
//!
//! ```rust
//! use creo_collector::backend::cgroup::stats::{CpuStat, KeyValueStat};
//!
//! let data = "usage_usec 1500\nuser_usec 1000\nsystem_usec 500\n";
//! let stat = CpuStat::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.usage_usec, 1500);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::parser::{FieldHandler, KeyValueStat};
use crate::backend::{CfsStats, CpuUsage};

const NANOS_PER_MICRO: u64 = 1_000;

/// Counters of `cpu.stat`, in microseconds (`*_usec`) or counts (`nr_*`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStat {
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
    pub nr_periods: u64,
    pub nr_throttled: u64,
    pub throttled_usec: u64,
}

impl CpuStat {
    /// CPU time in nanoseconds.
    pub fn usage(&self) -> CpuUsage {
        CpuUsage {
            total: self.usage_usec.saturating_mul(NANOS_PER_MICRO),
            user: self.user_usec.saturating_mul(NANOS_PER_MICRO),
            system: self.system_usec.saturating_mul(NANOS_PER_MICRO),
        }
    }

    /// CFS bandwidth counters, throttled time in nanoseconds.
    pub fn cfs(&self) -> CfsStats {
        CfsStats {
            periods: self.nr_periods,
            throttled_periods: self.nr_throttled,
            throttled_time: self.throttled_usec.saturating_mul(NANOS_PER_MICRO),
        }
    }
}

static SETTERS: LazyLock<HashMap<&'static str, FieldHandler<CpuStat>>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, FieldHandler<CpuStat>> = HashMap::with_capacity(6);

    m.insert("usage_usec", |s, v| s.usage_usec = v);
    m.insert("user_usec", |s, v| s.user_usec = v);
    m.insert("system_usec", |s, v| s.system_usec = v);
    m.insert("nr_periods", |s, v| s.nr_periods = v);
    m.insert("nr_throttled", |s, v| s.nr_throttled = v);
    m.insert("throttled_usec", |s, v| s.throttled_usec = v);

    m
});

impl KeyValueStat for CpuStat {
    const SPLIT_CHAR: Option<char> = None;
    const SKIP_VALUES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &SETTERS
    }
}
