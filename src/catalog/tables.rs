//! The metric definitions, one table per family.

use super::extract::{
    CpuField, DiskField, Extractor, FilesystemField, InterfaceField, MemoryField, TcpState,
};
use super::{Family, MetricDefinition};

const fn def(
    family: Family,
    key: &'static str,
    unit: &'static str,
    description: &'static str,
    extractor: Extractor,
) -> MetricDefinition {
    MetricDefinition {
        family,
        key,
        suffix: None,
        unit,
        description,
        extractor,
    }
}

const fn cpu_usage(
    key: &'static str,
    description: &'static str,
    field: CpuField,
) -> MetricDefinition {
    MetricDefinition {
        suffix: Some("usage"),
        ..def(Family::Cpu, key, "s", description, Extractor::Cpu(field))
    }
}

pub(super) static CPU: &[MetricDefinition] = &[
    cpu_usage("total", "Total CPU time consumed", CpuField::Total),
    cpu_usage("user", "CPU time consumed in user mode", CpuField::User),
    cpu_usage("system", "CPU time consumed in kernel mode", CpuField::System),
    def(
        Family::Cpu,
        "load",
        "load",
        "Number of runnable tasks, smoothed over the last 10 seconds",
        Extractor::Cpu(CpuField::Load),
    ),
    def(
        Family::Cpu,
        "periods",
        "event",
        "Number of elapsed CFS enforcement periods",
        Extractor::Cpu(CpuField::Periods),
    ),
    def(
        Family::Cpu,
        "throttled_periods",
        "event",
        "Number of CFS periods in which the container was throttled",
        Extractor::Cpu(CpuField::ThrottledPeriods),
    ),
    def(
        Family::Cpu,
        "throttled_time",
        "s",
        "Total time the container was throttled",
        Extractor::Cpu(CpuField::ThrottledTime),
    ),
];

macro_rules! tcp_table {
    (@def $family:expr, $variant:path, $proto:literal, $key:literal, $state:expr) => {
        def(
            $family,
            $key,
            "event",
            concat!("Count of ", $proto, " connections in state '", $key, "'"),
            $variant($state),
        )
    };
    ($family:expr, $variant:path, $proto:literal) => {
        &[
            tcp_table!(@def $family, $variant, $proto, "ESTABLISHED", TcpState::Established),
            tcp_table!(@def $family, $variant, $proto, "SYN_SENT", TcpState::SynSent),
            tcp_table!(@def $family, $variant, $proto, "SYN_RECV", TcpState::SynRecv),
            tcp_table!(@def $family, $variant, $proto, "FIN_WAIT_1", TcpState::FinWait1),
            tcp_table!(@def $family, $variant, $proto, "FIN_WAIT_2", TcpState::FinWait2),
            tcp_table!(@def $family, $variant, $proto, "TIME_WAIT", TcpState::TimeWait),
            tcp_table!(@def $family, $variant, $proto, "CLOSE", TcpState::Close),
            tcp_table!(@def $family, $variant, $proto, "CLOSE_WAIT", TcpState::CloseWait),
            tcp_table!(@def $family, $variant, $proto, "LAST_ACK", TcpState::LastAck),
            tcp_table!(@def $family, $variant, $proto, "LISTEN", TcpState::Listen),
            tcp_table!(@def $family, $variant, $proto, "CLOSING", TcpState::Closing),
        ]
    };
}

pub(super) static TCP: &[MetricDefinition] = tcp_table!(Family::Tcp, Extractor::Tcp, "TCP");
pub(super) static TCP6: &[MetricDefinition] = tcp_table!(Family::Tcp6, Extractor::Tcp6, "TCP6");

pub(super) static MEMORY: &[MetricDefinition] = &[
    def(
        Family::Memory,
        "cache",
        "B",
        "Number of bytes of page cache memory",
        Extractor::Memory(MemoryField::Cache),
    ),
    def(
        Family::Memory,
        "usage",
        "B",
        "Current memory usage, including all memory regardless of when it was accessed",
        Extractor::Memory(MemoryField::Usage),
    ),
    def(
        Family::Memory,
        "rss",
        "B",
        "Amount of anonymous memory",
        Extractor::Memory(MemoryField::Rss),
    ),
    def(
        Family::Memory,
        "swap",
        "B",
        "Amount of swap currently used by the processes of the container",
        Extractor::Memory(MemoryField::Swap),
    ),
    def(
        Family::Memory,
        "working_set",
        "B",
        "Memory usage minus inactive page cache",
        Extractor::Memory(MemoryField::WorkingSet),
    ),
    def(
        Family::Memory,
        "mapped_file",
        "B",
        "Page cache mapped into the address space of processes",
        Extractor::Memory(MemoryField::MappedFile),
    ),
    def(
        Family::Memory,
        "failcnt",
        "event",
        "Number of times memory usage hit the limit",
        Extractor::Memory(MemoryField::Failcnt),
    ),
];

pub(super) static FILESYSTEM: &[MetricDefinition] = &[
    def(
        Family::Filesystem,
        "total_usage",
        "B",
        "Number of bytes consumed by the container",
        Extractor::Filesystem(FilesystemField::TotalUsage),
    ),
    def(
        Family::Filesystem,
        "base_usage",
        "B",
        "Number of bytes consumed by the container, excluding its volumes",
        Extractor::Filesystem(FilesystemField::BaseUsage),
    ),
    def(
        Family::Filesystem,
        "inode_usage",
        "inodes",
        "Number of inodes used within the container's root filesystem",
        Extractor::Filesystem(FilesystemField::InodeUsage),
    ),
];

macro_rules! disk {
    ($key:literal, $unit:literal, $description:literal, $field:ident) => {
        def(
            Family::DiskIo,
            $key,
            $unit,
            $description,
            Extractor::Disk(DiskField::$field),
        )
    };
}

pub(super) static DISK_IO: &[MetricDefinition] = &[
    disk!("read_bytes", "B", "Total number of bytes read", ReadBytes),
    disk!("write_bytes", "B", "Total number of bytes written", WriteBytes),
    disk!("reads", "event", "Total number of reads completed", Reads),
    disk!("writes", "event", "Total number of writes completed", Writes),
    disk!("queued_reads", "event", "Total number of reads queued", QueuedReads),
    disk!("queued_writes", "event", "Total number of writes queued", QueuedWrites),
    disk!("sector_reads", "event", "Total number of sectors read", SectorReads),
    disk!("sector_writes", "event", "Total number of sectors written", SectorWrites),
    disk!("merged_reads", "event", "Total number of reads merged", MergedReads),
    disk!("merged_writes", "event", "Total number of writes merged", MergedWrites),
    disk!("read_time", "s", "Total time spent reading", ReadTime),
    disk!("write_time", "s", "Total time spent writing", WriteTime),
];

macro_rules! iface {
    ($key:literal, $unit:literal, $description:literal, $field:ident) => {
        def(
            Family::Interface,
            $key,
            $unit,
            $description,
            Extractor::Interface(InterfaceField::$field),
        )
    };
}

pub(super) static INTERFACE: &[MetricDefinition] = &[
    iface!("rx_bytes", "B", "Cumulative count of bytes received", RxBytes),
    iface!("rx_packets", "pckt", "Cumulative count of packets received", RxPackets),
    iface!("rx_errors", "pckt", "Cumulative count of receive errors", RxErrors),
    iface!(
        "rx_dropped",
        "pckt",
        "Cumulative count of packets dropped while receiving",
        RxDropped
    ),
    iface!("tx_bytes", "B", "Cumulative count of bytes transmitted", TxBytes),
    iface!("tx_packets", "pckt", "Cumulative count of packets transmitted", TxPackets),
    iface!("tx_errors", "pckt", "Cumulative count of transmit errors", TxErrors),
    iface!(
        "tx_dropped",
        "pckt",
        "Cumulative count of packets dropped while transmitting",
        TxDropped
    ),
];

/// The smoothed load is reported as `cpu.load`; this family has no metrics of its own.
pub(super) static LOAD: &[MetricDefinition] = &[];
