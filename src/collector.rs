//! The collection loop: polls the backend and translates samples into metrics.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::backend::{
    self, ContainerInfo, ContainerStats, IdType, ROOT_NAME, RequestOptions, StatsBackend,
};
use crate::catalog::{Catalog, Family, Identity, MetricValue, Namespace, Source};
use crate::error::ResultOkLogExt;
use crate::manifest::{Manifest, MetricRequest};

/// A single emitted value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub namespace: Namespace,
    pub unit: &'static str,
    pub description: &'static str,
    pub value: MetricValue,
    /// Time the underlying sample was taken.
    #[serde(serialize_with = "unix_seconds")]
    pub timestamp: SystemTime,
}

fn unix_seconds<S: Serializer>(timestamp: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let secs = timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    serializer.serialize_f64(secs)
}

const QUERY: RequestOptions = RequestOptions {
    count: 1,
    recursive: true,
    id_type: IdType::Name,
};

pub struct Collector {
    catalog: Arc<Catalog>,
    manifest: Arc<Mutex<Manifest>>,
    backend: Arc<dyn StatsBackend>,
}

impl Collector {
    /// Creates a collector with an empty manifest. Nothing is emitted until the first
    /// subscription arrives.
    pub fn new(catalog: Arc<Catalog>, backend: Arc<dyn StatsBackend>) -> Self {
        Self {
            catalog,
            manifest: Arc::new(Mutex::new(Manifest::empty())),
            backend,
        }
    }

    pub fn manifest(&self) -> Arc<Mutex<Manifest>> {
        Arc::clone(&self.manifest)
    }

    /// Starts the backend and emits one batch of metrics per interval to `out` until `cancel`
    /// fires or `out` is closed. Subscriptions received on `updates` replace the manifest and
    /// take effect from the next cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend fails to start.
    pub async fn stream_metrics(
        &self,
        updates: mpsc::Receiver<Vec<MetricRequest>>,
        out: mpsc::Sender<Vec<Metric>>,
        cancel: CancellationToken,
    ) -> Result<(), backend::Error> {
        self.backend.start()?;
        log::debug!("Started statistics backend");

        let updater = tokio::spawn(run_updater(
            Arc::clone(&self.catalog),
            Arc::clone(&self.manifest),
            updates,
            cancel.clone(),
        ));

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let batch = {
                let manifest = self.manifest.lock().await;
                let containers = self.fetch_containers().await;
                let before = Instant::now();
                let batch = translate(&self.catalog, &manifest, &containers);
                log::trace!(
                    "translate() of {} containers took {} nanoseconds",
                    containers.len(),
                    before.elapsed().as_nanos()
                );
                batch
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = out.send(batch) => {
                    if sent.is_err() {
                        log::debug!("Metric receiver is gone, stopping collection");
                        break;
                    }
                }
            }

            // The send may have waited on a slow receiver; sleep for the interval of the
            // latest subscription.
            let interval = self.manifest.lock().await.interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        updater.abort();
        Ok(())
    }

    async fn fetch_containers(&self) -> Vec<ContainerInfo> {
        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || {
            let before = Instant::now();
            let result = backend.container_info(ROOT_NAME, &QUERY);
            log::trace!(
                "container_info() took {} nanoseconds",
                before.elapsed().as_nanos()
            );
            result
        })
        .await;

        match result {
            Ok(result) => result.ok_log().unwrap_or_default(),
            Err(err) => {
                log::error!("Container query panicked: {err}");
                Vec::new()
            }
        }
    }
}

async fn run_updater(
    catalog: Arc<Catalog>,
    manifest: Arc<Mutex<Manifest>>,
    mut updates: mpsc::Receiver<Vec<MetricRequest>>,
    cancel: CancellationToken,
) {
    loop {
        let requests = tokio::select! {
            _ = cancel.cancelled() => break,
            requests = updates.recv() => match requests {
                Some(requests) => requests,
                None => break,
            },
        };
        let interval = manifest.lock().await.rebuild(&catalog, &requests);
        log::debug!(
            "Applied subscription of {} requests, interval {interval:?}",
            requests.len()
        );
    }
}

/// Translates the latest sample of every identified container into the metrics requested by
/// `manifest`.
///
/// Containers without a sample or without the Kubernetes identity labels are skipped.
pub fn translate(
    catalog: &Catalog,
    manifest: &Manifest,
    containers: &[ContainerInfo],
) -> Vec<Metric> {
    let mut out = Vec::new();
    for container in containers {
        let Some(stats) = container.latest_stats() else {
            log::debug!("Skipping container `{}` without samples", container.name);
            continue;
        };
        let Some(identity) = Identity::from_labels(&container.spec.labels) else {
            log::debug!("Skipping container `{}` without identity labels", container.name);
            continue;
        };

        let mut emitter = Emitter {
            catalog,
            manifest,
            identity: &identity,
            stats,
            out: &mut out,
        };
        let spec = &container.spec;
        if spec.has_network {
            emitter.emit(Family::Tcp, None, Source::Container(stats));
            emitter.emit(Family::Tcp6, None, Source::Container(stats));
            for iface in &stats.network.interfaces {
                emitter.emit(
                    Family::Interface,
                    Some(iface.name.as_str()),
                    Source::Interface(iface),
                );
            }
        }
        if spec.has_memory {
            emitter.emit(Family::Memory, None, Source::Container(stats));
        }
        if spec.has_cpu {
            emitter.emit(Family::Cpu, None, Source::Container(stats));
            emitter.emit(Family::Load, None, Source::Container(stats));
        }
        if spec.has_filesystem {
            emitter.emit(Family::Filesystem, None, Source::Container(stats));
        }
        if spec.has_diskio {
            for disk in &stats.diskio {
                emitter.emit(Family::DiskIo, Some(disk.device.as_str()), Source::Disk(disk));
            }
        }
    }
    out
}

struct Emitter<'a> {
    catalog: &'a Catalog,
    manifest: &'a Manifest,
    identity: &'a Identity,
    stats: &'a ContainerStats,
    out: &'a mut Vec<Metric>,
}

impl Emitter<'_> {
    fn emit(&mut self, family: Family, device: Option<&str>, source: Source<'_>) {
        for key in self.manifest.keys(family) {
            let Some(def) = self.catalog.lookup(family, key) else {
                log::warn!("Unknown metric `{family}/{key}` in manifest");
                continue;
            };
            let Some(value) = def.extract(source) else {
                log::debug!("No value for `{family}/{key}` in sample");
                continue;
            };
            self.out.push(Metric {
                namespace: def.namespace(self.identity, device),
                unit: def.unit,
                description: def.description,
                value,
                timestamp: self.stats.timestamp,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::backend::{ContainerSpec, FilesystemStats, InterfaceStats, PerDiskStats};
    use crate::catalog::{CONTAINER_NAME_LABEL, POD_NAME_LABEL, POD_NAMESPACE_LABEL};

    fn labels() -> HashMap<String, String> {
        HashMap::from([
            (POD_NAMESPACE_LABEL.to_owned(), "default".to_owned()),
            (POD_NAME_LABEL.to_owned(), "web-1".to_owned()),
            (CONTAINER_NAME_LABEL.to_owned(), "app".to_owned()),
        ])
    }

    fn container(spec: ContainerSpec, stats: ContainerStats) -> ContainerInfo {
        ContainerInfo {
            name: "/kubepods/app".to_owned(),
            spec,
            stats: vec![stats],
        }
    }

    fn manifest(catalog: &Catalog, paths: &[&[&str]]) -> Manifest {
        let requests: Vec<_> = paths
            .iter()
            .map(|tail| {
                let mut ns = vec!["creo", "collector", "container", "*", "*", "*"];
                ns.extend_from_slice(tail);
                MetricRequest::new(ns)
            })
            .collect();
        let mut manifest = Manifest::empty();
        manifest.rebuild(catalog, &requests);
        manifest
    }

    #[test]
    fn test_translate_respects_capabilities() {
        let catalog = Catalog::new();
        let manifest = manifest(&catalog, &[&["mem", "usage"], &["cpu", "periods"]]);
        let mut stats = ContainerStats::new(UNIX_EPOCH + Duration::from_secs(100));
        stats.memory.usage = 4096;
        stats.cpu.cfs.periods = 12;

        let spec = ContainerSpec {
            labels: labels(),
            has_memory: true,
            ..Default::default()
        };
        let metrics = translate(&catalog, &manifest, &[container(spec, stats)]);

        assert_eq!(metrics.len(), 1);
        let metric = &metrics[0];
        assert_eq!(
            metric.namespace.to_string(),
            "/creo/collector/container/default/web-1/app/mem/usage"
        );
        assert_eq!(metric.unit, "B");
        assert_eq!(metric.value, MetricValue::Unsigned(4096));
        assert_eq!(metric.timestamp, UNIX_EPOCH + Duration::from_secs(100));
    }

    #[test]
    fn test_translate_per_device() {
        let catalog = Catalog::new();
        let manifest = manifest(&catalog, &[&["diskio", "*", "write_bytes"]]);
        let mut stats = ContainerStats::new(SystemTime::now());
        stats.diskio = vec![
            PerDiskStats {
                device: "sda".to_owned(),
                write_bytes: 10,
                ..Default::default()
            },
            PerDiskStats {
                device: "nvme0n1".to_owned(),
                write_bytes: 20,
                ..Default::default()
            },
        ];
        stats.network.interfaces = vec![InterfaceStats {
            name: "eth0".to_owned(),
            ..Default::default()
        }];

        let spec = ContainerSpec {
            labels: labels(),
            has_diskio: true,
            has_network: true,
            ..Default::default()
        };
        let metrics = translate(&catalog, &manifest, &[container(spec, stats)]);

        let paths: Vec<_> = metrics.iter().map(|m| m.namespace.to_string()).collect();
        assert_eq!(
            paths,
            [
                "/creo/collector/container/default/web-1/app/diskio/sda/write_bytes",
                "/creo/collector/container/default/web-1/app/diskio/nvme0n1/write_bytes",
            ]
        );
        assert_eq!(metrics[1].value, MetricValue::Unsigned(20));
    }

    #[test]
    fn test_translate_skips_absent_optional_values() {
        let catalog = Catalog::new();
        let manifest = manifest(&catalog, &[&["fs", "base_usage"], &["fs", "total_usage"]]);
        let mut stats = ContainerStats::new(SystemTime::now());
        stats.filesystem = Some(FilesystemStats {
            total_usage_bytes: Some(1024),
            base_usage_bytes: None,
            inode_usage: None,
        });

        let spec = ContainerSpec {
            labels: labels(),
            has_filesystem: true,
            ..Default::default()
        };
        let metrics = translate(&catalog, &manifest, &[container(spec, stats)]);

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value, MetricValue::Unsigned(1024));
    }

    #[test]
    fn test_translate_skips_containers_without_samples() {
        let catalog = Catalog::new();
        let manifest = manifest(&catalog, &[&["cpu", "periods"]]);
        let info = ContainerInfo {
            name: "/kubepods/app".to_owned(),
            spec: ContainerSpec {
                labels: labels(),
                has_cpu: true,
                ..Default::default()
            },
            stats: Vec::new(),
        };
        assert!(translate(&catalog, &manifest, &[info]).is_empty());
    }

    #[test]
    fn test_translate_uses_latest_sample() {
        let catalog = Catalog::new();
        let manifest = manifest(&catalog, &[&["cpu", "periods"]]);
        let mut old = ContainerStats::new(UNIX_EPOCH + Duration::from_secs(1));
        old.cpu.cfs.periods = 1;
        let mut new = ContainerStats::new(UNIX_EPOCH + Duration::from_secs(2));
        new.cpu.cfs.periods = 2;

        let info = ContainerInfo {
            name: "/kubepods/app".to_owned(),
            spec: ContainerSpec {
                labels: labels(),
                has_cpu: true,
                ..Default::default()
            },
            stats: vec![old, new],
        };
        let metrics = translate(&catalog, &manifest, &[info]);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value, MetricValue::Unsigned(2));
    }

    #[test]
    fn test_serialize_metric() {
        let catalog = Catalog::new();
        let manifest = manifest(&catalog, &[&["cpu", "load"]]);
        let mut stats = ContainerStats::new(UNIX_EPOCH + Duration::from_millis(1500));
        stats.cpu.load_average = 0.25;
        let spec = ContainerSpec {
            labels: labels(),
            has_cpu: true,
            ..Default::default()
        };
        let metrics = translate(&catalog, &manifest, &[container(spec, stats)]);

        let json = serde_json::to_value(&metrics[0]).unwrap();
        assert_eq!(json["value"], 0.25);
        assert_eq!(json["timestamp"], 1.5);
        assert_eq!(json["unit"], "load");
        assert_eq!(json["namespace"][7]["value"], "load");
    }
}
