//! Generic readers for the flat stat file formats found under `/sys/fs/cgroup` and `/proc`.
//!
//! - [`KeyValueStat`] handles multi-line `key value` or `key=value` files such as `cpu.stat`,
//!   `memory.stat`, `memory.events` and the per-device lines of `io.stat`.
//! - [`SingleLineStat`] handles files holding a single value such as `memory.current`.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use creo_collector::backend::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct PidsEvents {
//!     max: u64,
//! }
//!
//! static HANDLERS: LazyLock<HashMap<&'static str, fn(&mut PidsEvents, u64)>> =
//!     LazyLock::new(|| {
//!         let mut m: HashMap<&'static str, fn(&mut PidsEvents, u64)> = HashMap::new();
//!         m.insert("max", |s, v| s.max = v);
//!         m
//!     });
//!
//! impl KeyValueStat for PidsEvents {
//!     const SPLIT_CHAR: Option<char> = None;
//!     const SKIP_VALUES: usize = 0;
//!     const ALLOW_DUPLICATE_KEYS: bool = false;
//!     const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;
//!
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &HANDLERS
//!     }
//! }
//!
//! let events = PidsEvents::from_reader(&mut "max 3\n".as_bytes()).unwrap();
//! assert_eq!(events.max, 3);
//! ```

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// Handler applying a parsed value to a field, e.g. by setting or accumulating it.
pub type FieldHandler<T> = fn(&mut T, u64);

/// A stat file made of key-value pairs.
///
/// Implementors list the keys they care about in [`KeyValueStat::field_handlers`]; all other
/// keys are ignored.
pub trait KeyValueStat: Default
where
    Self: 'static,
{
    /// Character joining key and value (`rbytes=1024`). `None` means the key and value are
    /// separate whitespace delimited tokens (`usage_usec 1024`).
    const SPLIT_CHAR: Option<char>;

    /// Number of leading whitespace delimited tokens skipped on every line.
    const SKIP_VALUES: usize;

    /// Whether a key may appear more than once.
    const ALLOW_DUPLICATE_KEYS: bool;

    /// Whether more than one pair is read per line.
    const ALLOW_MULTIPLE_KV_PER_LINE: bool;

    fn field_handlers() -> &'static HashMap<&'static str, FieldHandler<Self>>;

    /// Reads the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails, or a wrapped [`StatParseError`] of kind
    /// [`std::io::ErrorKind::InvalidData`] if a known key carries an invalid value or appears
    /// twice while duplicates are not allowed.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut stat = Self::default();
        let handlers = Self::field_handlers();
        let mut seen_keys = HashSet::with_capacity(handlers.len());

        let mut line = String::new();
        let mut lineno = 0;
        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            Self::parse_line(&mut stat, &line, lineno, &mut seen_keys)?;
            if !Self::ALLOW_DUPLICATE_KEYS && seen_keys.len() == handlers.len() {
                break;
            }
            line.clear();
        }

        Ok(stat)
    }

    /// Applies all pairs of a single line to `stat`.
    ///
    /// `lineno` is only used for error reporting.
    fn parse_line(
        stat: &mut Self,
        line: &str,
        lineno: usize,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        let mut tokens = line.split_whitespace().skip(Self::SKIP_VALUES);

        loop {
            let pair = match Self::SPLIT_CHAR {
                Some(split_char) => match tokens.next() {
                    // malformed pairs are skipped
                    Some(token) => token.split_once(split_char),
                    None => break,
                },
                None => match (tokens.next(), tokens.next()) {
                    (Some(key), Some(val)) => Some((key, val)),
                    _ => break,
                },
            };
            if let Some((key, val)) = pair {
                Self::apply(stat, key, val, lineno, seen_keys)?;
            }
            if !Self::ALLOW_MULTIPLE_KV_PER_LINE {
                break;
            }
        }

        Ok(())
    }

    /// Parses `val` and hands it to the handler registered for `key`.
    fn apply(
        stat: &mut Self,
        key: &str,
        val: &str,
        lineno: usize,
        seen_keys: &mut HashSet<&'static str>,
    ) -> std::io::Result<()> {
        let Some((known_key, handler)) = Self::field_handlers().get_key_value(key) else {
            return Ok(());
        };

        let parsed = val
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidKeyValue {
                key: key.to_owned(),
                value: val.to_owned(),
                line: lineno,
                source,
            })?;
        if !Self::ALLOW_DUPLICATE_KEYS && !seen_keys.insert(known_key) {
            return Err(StatParseError::DuplicateField {
                field: key.to_owned(),
                line: lineno,
            }
            .into());
        }
        handler(stat, parsed);

        Ok(())
    }
}

/// A stat file holding a single value.
pub trait SingleLineStat: Sized + Default {
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}
