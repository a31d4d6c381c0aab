//! Process settings and consumer-supplied metric configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{PLUGIN_NAME, VENDOR};

/// Key of the polling interval option, in seconds.
pub const INTERVAL_KEY: &str = "interval";
pub const DEFAULT_INTERVAL_SECS: i64 = 15;
pub const MIN_INTERVAL_SECS: i64 = 1;

const ROOTFS_VAR: &str = "ROOTFS_MOUNT_PATH";
const LISTEN_ADDR_VAR: &str = "CREO_LISTEN_ADDR";
const STATE_DIR_VAR: &str = "CREO_CONTAINERD_STATE_DIR";
const HISTORY_LEN_VAR: &str = "CREO_HISTORY_LEN";

const DEFAULT_ROOTFS: &str = "/";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STATE_DIR: &str = "run/containerd/io.containerd.runtime.v2.task";
const DEFAULT_HISTORY_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing config value `{0}`")]
    Missing(String),
    #[error("config value `{key}` is not an integer: {value}")]
    NotAnInteger { key: String, value: Value },
    #[error("invalid value `{value}` for environment variable `{name}`: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Free-form configuration attached to a metric request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(serde_json::Map<String, Value>);

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads an integer option. Numeric strings are accepted since query parameters arrive as
    /// text.
    pub fn get_int(&self, key: &str) -> Result<i64, Error> {
        let value = self.get(key).ok_or_else(|| Error::Missing(key.to_owned()))?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| Error::NotAnInteger {
            key: key.to_owned(),
            value: value.clone(),
        })
    }
}

impl From<HashMap<String, String>> for Config {
    fn from(params: HashMap<String, String>) -> Self {
        Self(
            params
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    }
}

/// An integer option accepted by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntRule {
    pub key: &'static str,
    pub required: bool,
    pub default: Option<i64>,
    pub minimum: Option<i64>,
}

/// The options a consumer may set, scoped under the collector's namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPolicy {
    pub namespace: [&'static str; 2],
    pub int_rules: Vec<IntRule>,
}

pub fn config_policy() -> ConfigPolicy {
    ConfigPolicy {
        namespace: [VENDOR, PLUGIN_NAME],
        int_rules: vec![IntRule {
            key: INTERVAL_KEY,
            required: false,
            default: Some(DEFAULT_INTERVAL_SECS),
            minimum: Some(MIN_INTERVAL_SECS),
        }],
    }
}

/// Settings of the process, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Mount point of the host's root filesystem.
    pub rootfs: PathBuf,
    pub listen_addr: SocketAddr,
    /// containerd task state directory, relative to `rootfs`.
    pub containerd_state_dir: PathBuf,
    /// Number of samples kept per container.
    pub history_len: usize,
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// # Errors
    ///
    /// Fails if a variable is set to a value that can't be parsed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let rootfs = PathBuf::from(lookup(ROOTFS_VAR).unwrap_or_else(|| DEFAULT_ROOTFS.to_owned()));
        let containerd_state_dir =
            PathBuf::from(lookup(STATE_DIR_VAR).unwrap_or_else(|| DEFAULT_STATE_DIR.to_owned()));

        let listen_addr = lookup(LISTEN_ADDR_VAR).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = listen_addr
            .parse()
            .map_err(|err: std::net::AddrParseError| Error::InvalidSetting {
                name: LISTEN_ADDR_VAR,
                value: listen_addr.clone(),
                reason: err.to_string(),
            })?;

        let history_len = match lookup(HISTORY_LEN_VAR) {
            None => DEFAULT_HISTORY_LEN,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(len) if len >= 1 => len,
                Ok(_) => {
                    return Err(Error::InvalidSetting {
                        name: HISTORY_LEN_VAR,
                        value: raw,
                        reason: "must be at least 1".to_owned(),
                    });
                }
                Err(err) => {
                    return Err(Error::InvalidSetting {
                        name: HISTORY_LEN_VAR,
                        value: raw,
                        reason: err.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            rootfs,
            listen_addr,
            containerd_state_dir,
            history_len,
        })
    }
}
