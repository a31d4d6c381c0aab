//! The set of metrics the consumer currently subscribes to.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, FAMILY_SEGMENT, Family, MetricDefinition};
use crate::config::{self, Config, DEFAULT_INTERVAL_SECS, INTERVAL_KEY, MIN_INTERVAL_SECS};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(DEFAULT_INTERVAL_SECS as u64);

/// A single metric requested by the consumer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRequest {
    /// Namespace segments, e.g.
    /// `["creo", "collector", "container", "*", "*", "*", "cpu", "total"]`.
    pub namespace: Vec<String>,
    #[serde(default)]
    pub config: Config,
}

impl MetricRequest {
    pub fn new<S: Into<String>>(namespace: impl IntoIterator<Item = S>) -> Self {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("namespace has {len} segments, expected at least {expected}")]
    TooShort { len: usize, expected: usize },
    #[error("unknown metric family `{0}`")]
    UnknownFamily(String),
    #[error("unknown metric `{family}/{key}`")]
    UnknownMetric { family: Family, key: String },
}

/// Resolves the catalog definition a request refers to.
pub fn resolve(
    catalog: &Catalog,
    request: &MetricRequest,
) -> Result<&'static MetricDefinition, RequestError> {
    let ns = &request.namespace;
    let segment = ns.get(FAMILY_SEGMENT).ok_or(RequestError::TooShort {
        len: ns.len(),
        expected: FAMILY_SEGMENT + 2,
    })?;
    let family =
        Family::from_segment(segment).ok_or_else(|| RequestError::UnknownFamily(segment.clone()))?;
    let key_index = family.key_index();
    let key = ns.get(key_index).ok_or(RequestError::TooShort {
        len: ns.len(),
        expected: key_index + 1,
    })?;
    catalog
        .lookup(family, key)
        .ok_or_else(|| RequestError::UnknownMetric {
            family,
            key: key.clone(),
        })
}

/// Requested keys per family plus the polling interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    keys: HashMap<Family, BTreeSet<&'static str>>,
    interval: Duration,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::empty()
    }
}

impl Manifest {
    /// A manifest requesting nothing, polled at the default interval.
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Keys requested for `family`, in lexical order.
    pub fn keys(&self, family: Family) -> impl Iterator<Item = &'static str> + '_ {
        self.keys.get(&family).into_iter().flatten().copied()
    }

    pub fn contains(&self, family: Family, key: &str) -> bool {
        self.keys.get(&family).is_some_and(|keys| keys.contains(key))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total number of requested metrics.
    pub fn len(&self) -> usize {
        self.keys.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the manifest with the metrics named by `requests` and returns the new interval.
    ///
    /// The interval is read from the config of the first request. Requests that don't resolve
    /// to a catalog definition are dropped.
    pub fn rebuild(&mut self, catalog: &Catalog, requests: &[MetricRequest]) -> Duration {
        self.keys.clear();
        self.interval = interval_from(requests.first().map(|r| &r.config));

        for request in requests {
            match resolve(catalog, request) {
                Ok(def) => {
                    self.keys.entry(def.family).or_default().insert(def.key);
                }
                Err(err) => log::warn!(
                    "Dropping metric request `/{}`: {err}",
                    request.namespace.join("/")
                ),
            }
        }

        log::debug!(
            "Rebuilt manifest with {} metrics, polling every {:?}",
            self.len(),
            self.interval
        );
        self.interval
    }
}

fn interval_from(config: Option<&Config>) -> Duration {
    let Some(config) = config else {
        return DEFAULT_INTERVAL;
    };
    match config.get_int(INTERVAL_KEY) {
        Ok(secs) if secs >= MIN_INTERVAL_SECS => Duration::from_secs(secs.unsigned_abs()),
        Ok(secs) => {
            log::warn!(
                "Interval of {secs}s is below the minimum of {MIN_INTERVAL_SECS}s, using the default"
            );
            DEFAULT_INTERVAL
        }
        Err(config::Error::Missing(_)) => DEFAULT_INTERVAL,
        Err(err) => {
            log::warn!("Invalid interval, using the default: {err}");
            DEFAULT_INTERVAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tail: &[&str]) -> MetricRequest {
        let mut ns = vec!["creo", "collector", "container", "*", "*", "*"];
        ns.extend_from_slice(tail);
        MetricRequest::new(ns)
    }

    fn with_interval(
        request: MetricRequest,
        interval: impl Into<serde_json::Value>,
    ) -> MetricRequest {
        let mut config = Config::new();
        config.insert(INTERVAL_KEY, interval);
        request.with_config(config)
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::empty();
        assert!(manifest.is_empty());
        assert_eq!(manifest.interval(), Duration::from_secs(15));
        assert_eq!(manifest.keys(Family::Cpu).count(), 0);
    }

    #[test]
    fn test_rebuild_reads_keys_by_family() {
        let catalog = Catalog::new();
        let mut manifest = Manifest::empty();
        manifest.rebuild(
            &catalog,
            &[
                request(&["cpu", "total", "usage"]),
                request(&["tcp6", "LISTEN"]),
                request(&["iface", "*", "rx_bytes"]),
                request(&["diskio", "sda", "read_time"]),
            ],
        );

        assert_eq!(manifest.len(), 4);
        assert!(manifest.contains(Family::Cpu, "total"));
        assert!(manifest.contains(Family::Tcp6, "LISTEN"));
        assert!(!manifest.contains(Family::Tcp, "LISTEN"));
        assert_eq!(manifest.keys(Family::Interface).collect::<Vec<_>>(), ["rx_bytes"]);
        assert_eq!(manifest.keys(Family::DiskIo).collect::<Vec<_>>(), ["read_time"]);
    }

    #[test]
    fn test_rebuild_drops_invalid_requests() {
        let catalog = Catalog::new();
        let mut manifest = Manifest::empty();
        manifest.rebuild(
            &catalog,
            &[
                request(&["udp", "total"]),
                request(&["cpu", "nonexistent"]),
                request(&["iface", "rx_bytes"]),
                MetricRequest::new(["creo", "collector"]),
                request(&["mem", "rss"]),
            ],
        );

        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(Family::Memory, "rss"));
    }

    #[test]
    fn test_resolve_errors() {
        let catalog = Catalog::new();
        assert_eq!(
            resolve(&catalog, &request(&["udp", "x"])).unwrap_err(),
            RequestError::UnknownFamily("udp".to_owned())
        );
        assert_eq!(
            resolve(&catalog, &request(&["iface", "eth0"])).unwrap_err(),
            RequestError::TooShort { len: 8, expected: 9 }
        );
        assert_eq!(
            resolve(&catalog, &request(&["load", "avg"])).unwrap_err(),
            RequestError::UnknownMetric {
                family: Family::Load,
                key: "avg".to_owned()
            }
        );
    }

    #[test]
    fn test_rebuild_replaces_previous_state() {
        let catalog = Catalog::new();
        let mut manifest = Manifest::empty();
        manifest.rebuild(&catalog, &[request(&["cpu", "total", "usage"])]);
        manifest.rebuild(&catalog, &[request(&["mem", "usage"])]);

        assert!(!manifest.contains(Family::Cpu, "total"));
        assert!(manifest.contains(Family::Memory, "usage"));

        manifest.rebuild(&catalog, &[]);
        assert!(manifest.is_empty());
        assert_eq!(manifest.interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let catalog = Catalog::new();
        let requests = [
            with_interval(request(&["cpu", "total", "usage"]), 7),
            request(&["tcp", "ESTABLISHED"]),
            request(&["tcp", "ESTABLISHED"]),
        ];

        let mut first = Manifest::empty();
        let interval = first.rebuild(&catalog, &requests);
        let mut second = first.clone();
        assert_eq!(second.rebuild(&catalog, &requests), interval);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_interval_from_first_request() {
        let catalog = Catalog::new();
        let mut manifest = Manifest::empty();

        let interval = manifest.rebuild(&catalog, &[with_interval(request(&["mem", "rss"]), 30)]);
        assert_eq!(interval, Duration::from_secs(30));

        let interval = manifest.rebuild(&catalog, &[request(&["mem", "rss"])]);
        assert_eq!(interval, Duration::from_secs(15));

        // Only the first request's config counts.
        let interval = manifest.rebuild(
            &catalog,
            &[request(&["mem", "rss"]), with_interval(request(&["mem", "usage"]), 30)],
        );
        assert_eq!(interval, Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_intervals_fall_back_to_default() {
        let catalog = Catalog::new();
        let mut manifest = Manifest::empty();
        for bad in [
            serde_json::json!(0),
            serde_json::json!(-5),
            serde_json::json!("soon"),
            serde_json::json!(2.5),
        ] {
            let interval =
                manifest.rebuild(&catalog, &[with_interval(request(&["mem", "rss"]), bad)]);
            assert_eq!(interval, DEFAULT_INTERVAL);
        }

        let interval = manifest.rebuild(&catalog, &[with_interval(request(&["mem", "rss"]), "1")]);
        assert_eq!(interval, Duration::from_secs(1));
    }

    #[test]
    fn test_deserialize_request() {
        let requests: Vec<MetricRequest> = serde_json::from_str(
            r#"[
                {"namespace": ["creo", "collector", "container", "*", "*", "*", "cpu", "load"], "config": {"interval": 5}},
                {"namespace": ["creo", "collector", "container", "*", "*", "*", "mem", "rss"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(requests[0].config.get_int(INTERVAL_KEY).unwrap(), 5);
        assert!(requests[1].config.is_empty());
    }
}
