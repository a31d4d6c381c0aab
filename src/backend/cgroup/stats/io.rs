//! Parsing of the cgroup v2 `io.stat` file.
//!
//! Every line names a block device by its `major:minor` number followed by `key=value` pairs.
//! Unlike the other stat files the devices are kept apart, one [`DeviceIoStat`] per line.
//!
//! ```rust
//! use creo_collector::backend::cgroup::stats::IoStat;
//!
//! let data = "\
//! 8:0 rbytes=1024 wbytes=2048 rios=12 wios=24
//! 254:0 rbytes=512 wbytes=0 rios=1 wios=0
//! ";
//! let stat = IoStat::from_reader(&mut data.as_bytes()).unwrap();
//!
//! assert_eq!(stat.devices.len(), 2);
//! assert_eq!(stat.devices[1].major, 254);
//! assert_eq!(stat.devices[1].rbytes, 512);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::LazyLock;

use super::StatParseError;
use super::parser::{FieldHandler, KeyValueStat};

/// Counters of a single device line of `io.stat`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIoStat {
    pub major: u64,
    pub minor: u64,
    /// Bytes read.
    pub rbytes: u64,
    /// Bytes written.
    pub wbytes: u64,
    /// Read operations.
    pub rios: u64,
    /// Write operations.
    pub wios: u64,
    /// Bytes discarded.
    pub dbytes: u64,
    /// Discard operations.
    pub dios: u64,
}

static DEVICE_SETTERS: LazyLock<HashMap<&'static str, FieldHandler<DeviceIoStat>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, FieldHandler<DeviceIoStat>> = HashMap::with_capacity(6);

        m.insert("rbytes", |s, v| s.rbytes = v);
        m.insert("wbytes", |s, v| s.wbytes = v);
        m.insert("rios", |s, v| s.rios = v);
        m.insert("wios", |s, v| s.wios = v);
        m.insert("dbytes", |s, v| s.dbytes = v);
        m.insert("dios", |s, v| s.dios = v);

        m
    });

impl KeyValueStat for DeviceIoStat {
    const SPLIT_CHAR: Option<char> = Some('=');
    const SKIP_VALUES: usize = 1;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = true;

    #[inline]
    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>> {
        &DEVICE_SETTERS
    }
}

/// All device lines of an `io.stat` file, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IoStat {
    pub devices: Vec<DeviceIoStat>,
}

impl IoStat {
    /// Reads an `io.stat` file.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`std::io::ErrorKind::InvalidData`] if a device number is
    /// malformed, a known counter is not a `u64`, or a counter repeats within one line.
    pub fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let mut seen_keys = HashSet::new();

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            if let Some(device) = line.split_whitespace().next() {
                let (major, minor) = parse_device(device, lineno)?;
                let mut entry = DeviceIoStat {
                    major,
                    minor,
                    ..Default::default()
                };
                seen_keys.clear();
                DeviceIoStat::parse_line(&mut entry, &line, lineno, &mut seen_keys)?;
                stat.devices.push(entry);
            }
            line.clear();
        }

        Ok(stat)
    }
}

fn parse_device(device: &str, lineno: usize) -> Result<(u64, u64), StatParseError> {
    let invalid = || StatParseError::InvalidDevice {
        value: device.to_owned(),
        line: lineno,
    };
    let (major, minor) = device.split_once(':').ok_or_else(invalid)?;
    let major = major.parse().map_err(|_| invalid())?;
    let minor = minor.parse().map_err(|_| invalid())?;
    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_empty_io_stat() {
        let stat = IoStat::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stat, IoStat::default());
    }

    #[test]
    fn test_parse_complete_io_stat() {
        let data = "\
8:0 rbytes=1024 wbytes=2048 rios=12 wios=24 dbytes=0 dios=0
254:0 rbytes=4096 wbytes=8192 rios=1 wios=2 dbytes=512 dios=3
";
        let stat = IoStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(
            stat.devices,
            vec![
                DeviceIoStat {
                    major: 8,
                    minor: 0,
                    rbytes: 1024,
                    wbytes: 2048,
                    rios: 12,
                    wios: 24,
                    dbytes: 0,
                    dios: 0,
                },
                DeviceIoStat {
                    major: 254,
                    minor: 0,
                    rbytes: 4096,
                    wbytes: 8192,
                    rios: 1,
                    wios: 2,
                    dbytes: 512,
                    dios: 3,
                },
            ]
        );
    }

    #[test]
    fn test_ignore_unknown_and_malformed_pairs() {
        let data = "8:16 foo=100 rbytes=1024 malformedpair wios=24\n";
        let stat = IoStat::from_reader(&mut data.as_bytes()).unwrap();
        let dev = &stat.devices[0];
        assert_eq!(dev.minor, 16);
        assert_eq!(dev.rbytes, 1024);
        assert_eq!(dev.wios, 24);
        assert_eq!(dev.wbytes, 0);
    }

    #[test]
    fn test_device_without_counters_is_kept() {
        let data = "8:0\n\n259:1 rios=5\n";
        let stat = IoStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.devices.len(), 2);
        assert_eq!(stat.devices[0], DeviceIoStat { major: 8, ..Default::default() });
        assert_eq!(stat.devices[1].rios, 5);
    }

    #[test]
    fn test_parse_invalid_io_stat() {
        let data = "\
8:0 rbytes=1 wbytes=2
254:0 rbytes=abc wbytes=def
";
        let err = IoStat::from_reader(&mut data.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue {
                key, value, line, ..
            } => {
                assert_eq!(key, "rbytes");
                assert_eq!(value, "abc");
                assert_eq!(*line, 2);
            }
            other => panic!("Expected InvalidKeyValue error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_invalid_device() {
        let err = IoStat::from_reader(&mut "sda rbytes=1\n".as_bytes()).unwrap_err();
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidDevice { value, line } => {
                assert_eq!(value, "sda");
                assert_eq!(*line, 1);
            }
            other => panic!("Expected InvalidDevice error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_key_within_line() {
        let err = IoStat::from_reader(&mut "8:0 rbytes=1 rbytes=2\n".as_bytes()).unwrap_err();
        assert!(matches!(
            extract_stat_parse_error(&err),
            StatParseError::DuplicateField { line: 1, .. }
        ));
    }
}
