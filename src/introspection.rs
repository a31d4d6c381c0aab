//! Enumeration of every metric the collector can emit.

use serde::Serialize;

use crate::catalog::{Catalog, Identity, Namespace};
use crate::config::Config;

/// A metric as advertised to consumers, with wildcards in place of container and device names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDescriptor {
    pub namespace: Namespace,
    pub unit: &'static str,
    pub description: &'static str,
    pub config: Config,
}

/// Describes every catalog definition, echoing `config` on each entry.
pub fn describe_all(catalog: &Catalog, config: &Config) -> Vec<MetricDescriptor> {
    let identity = Identity::wildcard();
    catalog
        .iter()
        .map(|def| MetricDescriptor {
            namespace: def.namespace(&identity, None),
            unit: def.unit,
            description: def.description,
            config: config.clone(),
        })
        .collect()
}
