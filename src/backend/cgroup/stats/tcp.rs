//! Counting of sockets per state from `/proc/<pid>/net/tcp` and `/proc/<pid>/net/tcp6`.
//!
//! ```rust
//! use creo_collector::backend::cgroup::stats::parse_tcp_states;
//!
//! let data = "\
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
//!    0: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 1 1
//!    1: 0100007F:1F90 0100007F:A2C4 01 00000000:00000000 00:00000000 00000000     0        0 2 1
//! ";
//! let stat = parse_tcp_states(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.listen, 1);
//! assert_eq!(stat.established, 1);
//! ```

use std::io::BufRead;

use crate::backend::TcpStat;

/// Column of the connection state (`st`), counting the slot number as column 0.
const STATE_COLUMN: usize = 3;

/// Reads a procfs TCP socket table and counts the sockets per state.
///
/// Lines with an unknown or missing state are ignored.
pub fn parse_tcp_states<R: BufRead>(buf: &mut R) -> std::io::Result<TcpStat> {
    let mut stat = TcpStat::default();
    let mut line = String::new();

    // header
    buf.read_line(&mut line)?;
    line.clear();

    while buf.read_line(&mut line)? != 0 {
        if let Some(state) = line.split_whitespace().nth(STATE_COLUMN) {
            if let Some(counter) = counter_for_state(&mut stat, state) {
                *counter += 1;
            }
        }
        line.clear();
    }

    Ok(stat)
}

/// Maps the hexadecimal kernel state code (`include/net/tcp_states.h`) to its counter.
fn counter_for_state<'a>(stat: &'a mut TcpStat, state: &str) -> Option<&'a mut u64> {
    let counter = match u8::from_str_radix(state, 16).ok()? {
        0x01 => &mut stat.established,
        0x02 => &mut stat.syn_sent,
        0x03 => &mut stat.syn_recv,
        0x04 => &mut stat.fin_wait1,
        0x05 => &mut stat.fin_wait2,
        0x06 => &mut stat.time_wait,
        0x07 => &mut stat.close,
        0x08 => &mut stat.close_wait,
        0x09 => &mut stat.last_ack,
        0x0A => &mut stat.listen,
        0x0B => &mut stat.closing,
        _ => return None,
    };
    Some(counter)
}
