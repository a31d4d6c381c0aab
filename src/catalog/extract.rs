//! Extraction of single values from container samples.

use serde::Serialize;

use crate::backend::{ContainerStats, InterfaceStats, PerDiskStats, TcpStat};

const NANOS_PER_SECOND: f64 = 1e9;

/// Value of an emitted metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Unsigned(u64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Unsigned(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

fn seconds(nanos: u64) -> MetricValue {
    MetricValue::Float(nanos as f64 / NANOS_PER_SECOND)
}

/// What an extractor reads from: the whole sample, or one interface or disk of it.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Container(&'a ContainerStats),
    Interface(&'a InterfaceStats),
    Disk(&'a PerDiskStats),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuField {
    Total,
    User,
    System,
    Load,
    Periods,
    ThrottledPeriods,
    ThrottledTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
}

impl TcpState {
    fn count(self, stat: &TcpStat) -> u64 {
        match self {
            Self::Established => stat.established,
            Self::SynSent => stat.syn_sent,
            Self::SynRecv => stat.syn_recv,
            Self::FinWait1 => stat.fin_wait1,
            Self::FinWait2 => stat.fin_wait2,
            Self::TimeWait => stat.time_wait,
            Self::Close => stat.close,
            Self::CloseWait => stat.close_wait,
            Self::LastAck => stat.last_ack,
            Self::Listen => stat.listen,
            Self::Closing => stat.closing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryField {
    Cache,
    Usage,
    Rss,
    Swap,
    WorkingSet,
    MappedFile,
    Failcnt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemField {
    TotalUsage,
    BaseUsage,
    InodeUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceField {
    RxBytes,
    RxPackets,
    RxErrors,
    RxDropped,
    TxBytes,
    TxPackets,
    TxErrors,
    TxDropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskField {
    ReadBytes,
    WriteBytes,
    Reads,
    Writes,
    QueuedReads,
    QueuedWrites,
    SectorReads,
    SectorWrites,
    MergedReads,
    MergedWrites,
    ReadTime,
    WriteTime,
}

/// Tag selecting the value a [`super::MetricDefinition`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Cpu(CpuField),
    Tcp(TcpState),
    Tcp6(TcpState),
    Memory(MemoryField),
    Filesystem(FilesystemField),
    Interface(InterfaceField),
    Disk(DiskField),
}

impl Extractor {
    /// Reads the value from `source`.
    ///
    /// Returns `None` if the source kind does not fit the extractor or an optional field is
    /// absent from the sample.
    pub fn extract(&self, source: Source<'_>) -> Option<MetricValue> {
        match (*self, source) {
            (Self::Cpu(field), Source::Container(stats)) => Some(cpu(field, stats)),
            (Self::Tcp(state), Source::Container(stats)) => {
                Some(state.count(&stats.network.tcp).into())
            }
            (Self::Tcp6(state), Source::Container(stats)) => {
                Some(state.count(&stats.network.tcp6).into())
            }
            (Self::Memory(field), Source::Container(stats)) => Some(memory(field, stats)),
            (Self::Filesystem(field), Source::Container(stats)) => filesystem(field, stats),
            (Self::Interface(field), Source::Interface(iface)) => Some(interface(field, iface)),
            (Self::Disk(field), Source::Disk(disk)) => Some(disk_io(field, disk)),
            _ => None,
        }
    }
}

fn cpu(field: CpuField, stats: &ContainerStats) -> MetricValue {
    let cpu = &stats.cpu;
    match field {
        CpuField::Total => seconds(cpu.usage.total),
        CpuField::User => seconds(cpu.usage.user),
        CpuField::System => seconds(cpu.usage.system),
        CpuField::Load => cpu.load_average.into(),
        CpuField::Periods => cpu.cfs.periods.into(),
        CpuField::ThrottledPeriods => cpu.cfs.throttled_periods.into(),
        CpuField::ThrottledTime => seconds(cpu.cfs.throttled_time),
    }
}

fn memory(field: MemoryField, stats: &ContainerStats) -> MetricValue {
    let memory = &stats.memory;
    let value = match field {
        MemoryField::Cache => memory.cache,
        MemoryField::Usage => memory.usage,
        MemoryField::Rss => memory.rss,
        MemoryField::Swap => memory.swap,
        MemoryField::WorkingSet => memory.working_set,
        MemoryField::MappedFile => memory.mapped_file,
        MemoryField::Failcnt => memory.failcnt,
    };
    value.into()
}

fn filesystem(field: FilesystemField, stats: &ContainerStats) -> Option<MetricValue> {
    let fs = stats.filesystem.as_ref()?;
    let value = match field {
        FilesystemField::TotalUsage => fs.total_usage_bytes,
        FilesystemField::BaseUsage => fs.base_usage_bytes,
        FilesystemField::InodeUsage => fs.inode_usage,
    };
    value.map(MetricValue::from)
}

fn interface(field: InterfaceField, iface: &InterfaceStats) -> MetricValue {
    let value = match field {
        InterfaceField::RxBytes => iface.rx_bytes,
        InterfaceField::RxPackets => iface.rx_packets,
        InterfaceField::RxErrors => iface.rx_errors,
        InterfaceField::RxDropped => iface.rx_dropped,
        InterfaceField::TxBytes => iface.tx_bytes,
        InterfaceField::TxPackets => iface.tx_packets,
        InterfaceField::TxErrors => iface.tx_errors,
        InterfaceField::TxDropped => iface.tx_dropped,
    };
    value.into()
}

fn disk_io(field: DiskField, disk: &PerDiskStats) -> MetricValue {
    let value = match field {
        DiskField::ReadBytes => disk.read_bytes,
        DiskField::WriteBytes => disk.write_bytes,
        DiskField::Reads => disk.reads,
        DiskField::Writes => disk.writes,
        DiskField::QueuedReads => disk.queued_reads,
        DiskField::QueuedWrites => disk.queued_writes,
        DiskField::SectorReads => disk.sector_reads,
        DiskField::SectorWrites => disk.sector_writes,
        DiskField::MergedReads => disk.merged_reads,
        DiskField::MergedWrites => disk.merged_writes,
        DiskField::ReadTime => return seconds(disk.read_time),
        DiskField::WriteTime => return seconds(disk.write_time),
    };
    value.into()
}
