use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// How the `name` argument of a backend query is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdType {
    /// Hierarchical container name, i.e. the cgroup path relative to the cgroup root
    /// (`/kubepods.slice/...`).
    #[default]
    Name,
    /// Runtime container id as reported by containerd.
    Id,
}

/// Options of a single [`StatsBackend::container_info`](super::StatsBackend::container_info) query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Number of most recent samples to return per container.
    pub count: usize,
    /// Whether containers below the requested name are included.
    pub recursive: bool,
    pub id_type: IdType,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            count: 1,
            recursive: false,
            id_type: IdType::Name,
        }
    }
}

/// A container as reported by a statistics backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub name: String,
    pub spec: ContainerSpec,
    /// Samples ordered from oldest to newest.
    pub stats: Vec<ContainerStats>,
}

impl ContainerInfo {
    /// Returns the most recent sample, if any was taken yet.
    pub fn latest_stats(&self) -> Option<&ContainerStats> {
        self.stats.last()
    }
}

/// Labels and capabilities of a container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    pub labels: HashMap<String, String>,
    pub has_cpu: bool,
    pub has_memory: bool,
    pub has_network: bool,
    pub has_filesystem: bool,
    pub has_diskio: bool,
}

/// A single statistics sample of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStats {
    pub timestamp: SystemTime,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub network: NetworkStats,
    /// Only present for backends that account container filesystems.
    pub filesystem: Option<FilesystemStats>,
    pub diskio: Vec<PerDiskStats>,
}

impl ContainerStats {
    /// Creates an empty sample taken at `timestamp`.
    pub fn new(timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            cpu: CpuStats::default(),
            memory: MemoryStats::default(),
            network: NetworkStats::default(),
            filesystem: None,
            diskio: Vec::new(),
        }
    }
}

impl Default for ContainerStats {
    fn default() -> Self {
        Self::new(UNIX_EPOCH)
    }
}

/// CPU usage. All times are cumulative nanoseconds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CpuStats {
    pub usage: CpuUsage,
    pub cfs: CfsStats,
    /// Smoothed number of runnable tasks.
    pub load_average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuUsage {
    pub total: u64,
    pub user: u64,
    pub system: u64,
}

/// CFS bandwidth control counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CfsStats {
    pub periods: u64,
    pub throttled_periods: u64,
    pub throttled_time: u64,
}

/// Memory usage in bytes, except `failcnt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    pub usage: u64,
    pub cache: u64,
    pub rss: u64,
    pub swap: u64,
    pub working_set: u64,
    pub mapped_file: u64,
    /// Number of times the memory limit was hit.
    pub failcnt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkStats {
    pub interfaces: Vec<InterfaceStats>,
    pub tcp: TcpStat,
    pub tcp6: TcpStat,
}

/// Cumulative counters of a single network interface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceStats {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

/// Number of sockets per TCP state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpStat {
    pub established: u64,
    pub syn_sent: u64,
    pub syn_recv: u64,
    pub fin_wait1: u64,
    pub fin_wait2: u64,
    pub time_wait: u64,
    pub close: u64,
    pub close_wait: u64,
    pub last_ack: u64,
    pub listen: u64,
    pub closing: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilesystemStats {
    pub total_usage_bytes: Option<u64>,
    pub base_usage_bytes: Option<u64>,
    pub inode_usage: Option<u64>,
}

/// Cumulative block I/O counters of a single device. Times are nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PerDiskStats {
    pub device: String,
    pub major: u64,
    pub minor: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub reads: u64,
    pub writes: u64,
    pub queued_reads: u64,
    pub queued_writes: u64,
    pub sector_reads: u64,
    pub sector_writes: u64,
    pub merged_reads: u64,
    pub merged_writes: u64,
    pub read_time: u64,
    pub write_time: u64,
}
