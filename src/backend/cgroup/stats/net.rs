//! Parsing of `/proc/<pid>/net/dev`, the per-interface counters of a network namespace.

use std::io::BufRead;

use crate::backend::InterfaceStats;

/// Interface name prefixes that never belong to a container's own traffic.
const IGNORED_INTERFACES: [&str; 4] = ["lo", "veth", "docker", "nerdctl"];

/// Counters of every interface of a network namespace, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetDev {
    pub interfaces: Vec<InterfaceStats>,
}

/// Splits `  eth0: 1 2 3 ...` into the interface name and its fields.
fn parse_interface_line(line: &str) -> Option<(&str, impl Iterator<Item = &str>)> {
    let (iface, data) = line.trim().split_once(':')?;
    Some((iface.trim(), data.split_whitespace()))
}

fn is_ignored_interface(iface: &str) -> bool {
    IGNORED_INTERFACES
        .iter()
        .any(|prefix| iface.starts_with(prefix))
}

/// Reads the receive and transmit columns we report. Lines with fewer than 12 fields are
/// rejected; individual unparsable values count as zero.
fn stats_from_fields<'a>(
    name: &str,
    mut fields: impl Iterator<Item = &'a str>,
) -> Option<InterfaceStats> {
    let mut next = || fields.next().map(|v| v.parse::<u64>().unwrap_or(0));

    let rx_bytes = next()?;
    let rx_packets = next()?;
    let rx_errors = next()?;
    let rx_dropped = next()?;
    // fifo, frame, compressed, multicast
    for _ in 0..4 {
        next()?;
    }
    let tx_bytes = next()?;
    let tx_packets = next()?;
    let tx_errors = next()?;
    let tx_dropped = next()?;

    Some(InterfaceStats {
        name: name.to_owned(),
        rx_bytes,
        rx_packets,
        rx_errors,
        rx_dropped,
        tx_bytes,
        tx_packets,
        tx_errors,
        tx_dropped,
    })
}

impl NetDev {
    /// Reads a `/proc/<pid>/net/dev` file, skipping its two header lines.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let mut line = String::new();

        for _ in 0..2 {
            buf.read_line(&mut line)?;
            line.clear();
        }

        while buf.read_line(&mut line)? != 0 {
            if let Some((iface, fields)) = parse_interface_line(&line) {
                if !is_ignored_interface(iface) {
                    if let Some(s) = stats_from_fields(iface, fields) {
                        stat.interfaces.push(s);
                    }
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
";

    #[test]
    fn test_empty_input() {
        let stat = NetDev::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, NetDev::default());
    }

    #[test]
    fn test_only_headers() {
        let stat = NetDev::from_reader(&mut HEADER.as_bytes()).unwrap();
        assert!(stat.interfaces.is_empty());
    }

    #[test]
    fn test_parse_interfaces_in_order() {
        let data = format!(
            "{HEADER}\
    lo: 422198341   75815    0    0    0     0          0         0 422198341   75815    0    0    0     0       0          0
  eth0: 10240    100     1    2    0     0          0         0  20480   200     3    4    0     0       0          0
  eth1: 10 20 0 0 0 0 0 0  30 40 0 0 0 0 0 0
"
        );
        let stat = NetDev::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(stat.interfaces.len(), 2);
        assert_eq!(
            stat.interfaces[0],
            InterfaceStats {
                name: "eth0".to_owned(),
                rx_bytes: 10240,
                rx_packets: 100,
                rx_errors: 1,
                rx_dropped: 2,
                tx_bytes: 20480,
                tx_packets: 200,
                tx_errors: 3,
                tx_dropped: 4,
            }
        );
        assert_eq!(stat.interfaces[1].name, "eth1");
        assert_eq!(stat.interfaces[1].tx_packets, 40);
    }

    #[test]
    fn test_malformed_line_too_few_fields() {
        let data = format!("{HEADER} badif: 123 456\n");
        let stat = NetDev::from_reader(&mut data.as_bytes()).unwrap();
        assert!(stat.interfaces.is_empty());
    }

    #[test]
    fn test_ignored_interfaces() {
        let data = format!(
            "{HEADER}\
    lo: 999 999 0 0 0 0 0 0 999 999 0 0 0 0 0 0
    docker0: 999 999 0 0 0 0 0 0 999 999 0 0 0 0 0 0
    veth0: 999 999 0 0 0 0 0 0 999 999 0 0 0 0 0 0
    nerdctl0: 999 999 0 0 0 0 0 0 999 999 0 0 0 0 0 0
"
        );
        let stat = NetDev::from_reader(&mut data.as_bytes()).unwrap();
        assert!(stat.interfaces.is_empty());
    }

    #[test]
    fn test_unparsable_values_count_as_zero() {
        let data = format!("{HEADER}  eth0: xyz abc 0 0 0 0 0 0  20480 200 0 0 0 0 0 0\n");
        let stat = NetDev::from_reader(&mut data.as_bytes()).unwrap();
        let eth0 = &stat.interfaces[0];
        assert_eq!(eth0.rx_bytes, 0);
        assert_eq!(eth0.rx_packets, 0);
        assert_eq!(eth0.tx_bytes, 20480);
        assert_eq!(eth0.tx_packets, 200);
    }
}
