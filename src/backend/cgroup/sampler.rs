//! Builds a [`ContainerStats`] sample from a container's cgroup directory and init process.

use std::io::{BufRead, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use super::stats::{
    CpuStat, IoStat, KeyValueStat, MemoryCounter, MemoryEvents, MemoryStat, NetDev,
    SingleLineStat, parse_tcp_states,
};
use crate::backend::{ContainerStats, MemoryStats, PerDiskStats};
use crate::fsutil::{self, read_with};

/// Window of the exponentially smoothed load average.
const LOAD_WINDOW: Duration = Duration::from_secs(10);
const SECTOR_SIZE: u64 = 512;

/// Which controllers and procfs tables could be read for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub cpu: bool,
    pub memory: bool,
    pub network: bool,
    pub diskio: bool,
}

/// Reads one sample of the cgroup at `cgroup_dir`.
///
/// `pid` is the container's init process, needed for the network tables of its namespace.
/// `previous` is the last sample of the same container and seeds the load average.
///
/// # Errors
///
/// Fails if the cgroup directory is gone or one of its stat files is malformed. Controllers
/// that are not enabled are not an error; their capability stays unset.
pub fn sample(
    rootfs: &Path,
    cgroup_dir: &Path,
    pid: Option<u32>,
    previous: Option<&ContainerStats>,
    now: SystemTime,
) -> std::io::Result<(ContainerStats, Capabilities)> {
    if !cgroup_dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("cgroup `{}` does not exist", cgroup_dir.display()),
        ));
    }

    let mut stats = ContainerStats::new(now);
    let mut caps = Capabilities::default();

    if let Some(cpu) = read_with(cgroup_dir.join("cpu.stat"), CpuStat::from_reader)? {
        caps.cpu = true;
        stats.cpu.usage = cpu.usage();
        stats.cpu.cfs = cpu.cfs();
        let runnable = count_runnable_threads(rootfs, cgroup_dir);
        stats.cpu.load_average = smooth_load(previous, runnable, now);
    }

    if let Some(memory) = read_memory(cgroup_dir)? {
        caps.memory = true;
        stats.memory = memory;
    }

    if let Some(io) = read_with(cgroup_dir.join("io.stat"), IoStat::from_reader)? {
        caps.diskio = true;
        stats.diskio = io
            .devices
            .into_iter()
            .map(|dev| PerDiskStats {
                device: device_name(rootfs, dev.major, dev.minor),
                major: dev.major,
                minor: dev.minor,
                read_bytes: dev.rbytes,
                write_bytes: dev.wbytes,
                reads: dev.rios,
                writes: dev.wios,
                sector_reads: dev.rbytes / SECTOR_SIZE,
                sector_writes: dev.wbytes / SECTOR_SIZE,
                ..Default::default()
            })
            .collect();
    }

    if let Some(pid) = pid {
        let net_dir = rootfs.join(format!("proc/{pid}/net"));
        if let Some(dev) = read_with(net_dir.join("dev"), NetDev::from_reader)? {
            caps.network = true;
            stats.network.interfaces = dev.interfaces;
            stats.network.tcp =
                read_with(net_dir.join("tcp"), parse_tcp_states)?.unwrap_or_default();
            stats.network.tcp6 =
                read_with(net_dir.join("tcp6"), parse_tcp_states)?.unwrap_or_default();
        }
    }

    Ok((stats, caps))
}

/// Combines `memory.current`, `memory.stat`, `memory.swap.current` and `memory.events`.
fn read_memory(cgroup_dir: &Path) -> std::io::Result<Option<MemoryStats>> {
    let Some(current) = read_with(cgroup_dir.join("memory.current"), MemoryCounter::from_reader)?
    else {
        return Ok(None);
    };
    let stat =
        read_with(cgroup_dir.join("memory.stat"), MemoryStat::from_reader)?.unwrap_or_default();
    let swap =
        read_with(cgroup_dir.join("memory.swap.current"), MemoryCounter::from_reader)?
            .unwrap_or_default();
    let events =
        read_with(cgroup_dir.join("memory.events"), MemoryEvents::from_reader)?.unwrap_or_default();

    Ok(Some(MemoryStats {
        usage: current.bytes,
        cache: stat.file,
        rss: stat.anon,
        swap: swap.bytes,
        working_set: current.bytes.saturating_sub(stat.inactive_file),
        mapped_file: stat.file_mapped,
        failcnt: events.max,
    }))
}

/// Counts the threads of the cgroup that are currently running or runnable.
///
/// Threads that exit while being read are not counted.
fn count_runnable_threads(rootfs: &Path, cgroup_dir: &Path) -> u64 {
    let Ok(threads) = fsutil::open_file_reader(cgroup_dir.join("cgroup.threads")) else {
        return 0;
    };
    threads
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|tid| thread_state(rootfs, *tid) == Some('R'))
        .count() as u64
}

/// Reads the state letter of `/proc/<tid>/stat`, which follows the parenthesized command name.
fn thread_state(rootfs: &Path, tid: u32) -> Option<char> {
    let mut raw = String::new();
    fsutil::open_file_reader(rootfs.join(format!("proc/{tid}/stat")))
        .ok()?
        .read_to_string(&mut raw)
        .ok()?;
    parse_thread_state(&raw)
}

fn parse_thread_state(stat: &str) -> Option<char> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

/// Exponentially decays the previous load towards the current number of runnable threads.
fn smooth_load(previous: Option<&ContainerStats>, runnable: u64, now: SystemTime) -> f64 {
    let runnable = runnable as f64;
    let Some(previous) = previous else {
        return runnable;
    };
    let elapsed = now.duration_since(previous.timestamp).unwrap_or_default();
    let decay = (-elapsed.as_secs_f64() / LOAD_WINDOW.as_secs_f64()).exp();
    previous.cpu.load_average * decay + runnable * (1.0 - decay)
}

/// Looks up the kernel name of a block device, falling back to `major:minor`.
fn device_name(rootfs: &Path, major: u64, minor: u64) -> String {
    let uevent = rootfs.join(format!("sys/dev/block/{major}:{minor}/uevent"));
    fsutil::open_file_reader(uevent)
        .ok()
        .and_then(|buf| {
            buf.lines()
                .map_while(Result::ok)
                .find_map(|line| line.strip_prefix("DEVNAME=").map(str::to_owned))
        })
        .unwrap_or_else(|| format!("{major}:{minor}"))
}
