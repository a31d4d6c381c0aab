//! Creo Collector: republishes per-container resource statistics as namespaced metrics.
//!
//! Containers are discovered from containerd's task bundles and sampled from their cgroup v2
//! directories. A consumer subscribes to a subset of the [`catalog::Catalog`] over HTTP; the
//! [`collector::Collector`] polls the backend on the requested interval and emits the
//! subscribed metrics as batches.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub mod api;
pub mod backend;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod introspection;
pub mod manifest;

use backend::cgroup::CgroupBackend;
use catalog::Catalog;
use collector::{Collector, Metric};
use config::Settings;
use manifest::MetricRequest;

const UPDATE_CHANNEL_CAPACITY: usize = 4;
const METRIC_CHANNEL_CAPACITY: usize = 10;

/// Runs the collector until interrupted with Ctrl-C.
///
/// # Errors
///
/// Fails on invalid settings, if the HTTP listener can't be bound, or if the statistics
/// backend can't be started.
pub async fn run() -> Result<(), error::Error> {
    let settings = Settings::from_env()?;
    log::debug!("Settings: {settings:?}");

    let catalog = Arc::new(Catalog::new());
    let backend = Arc::new(CgroupBackend::new(
        &settings.rootfs,
        &settings.containerd_state_dir,
        settings.history_len,
    ));
    let collector = Collector::new(Arc::clone(&catalog), backend);

    let cancel = CancellationToken::new();
    let (updates_tx, updates_rx) = mpsc::channel::<Vec<MetricRequest>>(UPDATE_CHANNEL_CAPACITY);
    let (metrics_tx, mut metrics_rx) = mpsc::channel::<Vec<Metric>>(METRIC_CHANNEL_CAPACITY);
    let (latest_tx, latest_rx) = watch::channel(Arc::new(Vec::<Metric>::new()));

    tokio::spawn(async move {
        while let Some(batch) = metrics_rx.recv().await {
            log::trace!("Publishing batch of {} metrics", batch.len());
            latest_tx.send_replace(Arc::new(batch));
        }
    });

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .map_err(|source| error::Error::Bind {
            addr: settings.listen_addr,
            source,
        })?;
    log::info!("Listening on {}", settings.listen_addr);
    let server = {
        let api = api::APIServer::new(api::ApiState {
            catalog,
            updates: updates_tx,
            latest: latest_rx,
        });
        tokio::spawn(api.listen(listener, cancel.clone()))
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Received Ctrl-C, shutting down"),
                Err(err) => {
                    log::error!("Failed to listen for Ctrl-C: {err}");
                    return;
                }
            }
            cancel.cancel();
        });
    }

    let result = collector
        .stream_metrics(updates_rx, metrics_tx, cancel.clone())
        .await;
    cancel.cancel();
    result?;

    match server.await {
        Ok(result) => result.map_err(error::Error::Serve),
        Err(err) => {
            log::error!("HTTP server task failed: {err}");
            Ok(())
        }
    }
}
