//! The static registry of every metric the collector can emit.
//!
//! A [`MetricDefinition`] is identified by its [`Family`] and key (`cpu` / `total`) and knows
//! how to build its namespace and how to read its value from a sample. Definitions live in
//! literal tables, one per family; the [`Catalog`] indexes them for lookup by key.

mod extract;
mod namespace;
mod tables;

use std::collections::HashMap;
use std::fmt;

pub use extract::{
    CpuField, DiskField, Extractor, FilesystemField, InterfaceField, MemoryField, MetricValue,
    Source, TcpState,
};
pub use namespace::{
    CONTAINER_NAME_LABEL, Identity, Namespace, NamespaceElement, PLUGIN_NAME, POD_NAME_LABEL,
    POD_NAMESPACE_LABEL, VENDOR, WILDCARD,
};

/// Index of the family segment in every metric namespace.
pub const FAMILY_SEGMENT: usize = 6;

/// A group of metrics read from the same part of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Cpu,
    Tcp,
    Tcp6,
    Memory,
    Filesystem,
    DiskIo,
    Interface,
    Load,
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::Cpu,
        Family::Tcp,
        Family::Tcp6,
        Family::Memory,
        Family::Filesystem,
        Family::DiskIo,
        Family::Interface,
        Family::Load,
    ];

    /// Namespace segment naming the family.
    pub const fn segment(self) -> &'static str {
        match self {
            Family::Cpu => "cpu",
            Family::Tcp => "tcp",
            Family::Tcp6 => "tcp6",
            Family::Memory => "mem",
            Family::Filesystem => "fs",
            Family::DiskIo => "diskio",
            Family::Interface => "iface",
            Family::Load => "load",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.segment() == segment)
    }

    /// Whether metrics of this family are reported once per disk or interface.
    pub const fn is_per_device(self) -> bool {
        matches!(self, Family::DiskIo | Family::Interface)
    }

    /// Index of the key segment; per-device families carry the device name before it.
    pub const fn key_index(self) -> usize {
        if self.is_per_device() {
            FAMILY_SEGMENT + 2
        } else {
            FAMILY_SEGMENT + 1
        }
    }

    const fn device_description(self) -> &'static str {
        match self {
            Family::DiskIo => "name of the disk",
            _ => "name of the interface",
        }
    }

    fn definitions(self) -> &'static [MetricDefinition] {
        match self {
            Family::Cpu => tables::CPU,
            Family::Tcp => tables::TCP,
            Family::Tcp6 => tables::TCP6,
            Family::Memory => tables::MEMORY,
            Family::Filesystem => tables::FILESYSTEM,
            Family::DiskIo => tables::DISK_IO,
            Family::Interface => tables::INTERFACE,
            Family::Load => tables::LOAD,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub family: Family,
    pub key: &'static str,
    /// Static segment appended after the key (`cpu/total/usage`).
    pub suffix: Option<&'static str>,
    pub unit: &'static str,
    pub description: &'static str,
    pub extractor: Extractor,
}

impl MetricDefinition {
    /// Builds the namespace of this metric for a container.
    ///
    /// For per-device families `device` fills the `device_name` segment; `None` leaves the
    /// wildcard in place. Scalar families ignore it.
    pub fn namespace(&self, identity: &Identity, device: Option<&str>) -> Namespace {
        let mut ns = Namespace::container(identity);
        ns.push(NamespaceElement::literal(self.family.segment()));
        if self.family.is_per_device() {
            ns.push(NamespaceElement::dynamic(
                "device_name",
                self.family.device_description(),
                device.unwrap_or(WILDCARD),
            ));
        }
        ns.push(NamespaceElement::literal(self.key));
        if let Some(suffix) = self.suffix {
            ns.push(NamespaceElement::literal(suffix));
        }
        ns
    }

    pub fn extract(&self, source: Source<'_>) -> Option<MetricValue> {
        self.extractor.extract(source)
    }
}

/// Read-only index over all metric definitions.
#[derive(Debug)]
pub struct Catalog {
    index: HashMap<Family, HashMap<&'static str, &'static MetricDefinition>>,
}

impl Catalog {
    pub fn new() -> Self {
        let index = Family::ALL
            .into_iter()
            .map(|family| {
                let keys = family.definitions().iter().map(|d| (d.key, d)).collect();
                (family, keys)
            })
            .collect();
        Self { index }
    }

    pub fn lookup(&self, family: Family, key: &str) -> Option<&'static MetricDefinition> {
        self.index.get(&family)?.get(key).copied()
    }

    /// All definitions of `family`, in table order.
    pub fn definitions(&self, family: Family) -> &'static [MetricDefinition] {
        family.definitions()
    }

    /// All definitions, family by family.
    pub fn iter(&self) -> impl Iterator<Item = &'static MetricDefinition> + '_ {
        Family::ALL
            .into_iter()
            .flat_map(|family| self.definitions(family).iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn identity() -> Identity {
        Identity {
            namespace: "default".to_owned(),
            pod_name: "web-1".to_owned(),
            container_name: "app".to_owned(),
        }
    }

    #[test]
    fn test_family_segments_round_trip() {
        for family in Family::ALL {
            assert_eq!(Family::from_segment(family.segment()), Some(family));
        }
        assert_eq!(Family::from_segment("udp"), None);
    }

    #[test]
    fn test_table_sizes() {
        let catalog = Catalog::new();
        let sizes: Vec<_> = Family::ALL
            .into_iter()
            .map(|f| catalog.definitions(f).len())
            .collect();
        assert_eq!(sizes, [7, 11, 11, 7, 3, 12, 8, 0]);
        assert_eq!(catalog.len(), 59);
    }

    #[test]
    fn test_definitions_belong_to_their_table_and_are_unique() {
        let catalog = Catalog::new();
        for family in Family::ALL {
            let mut keys = HashSet::new();
            for def in catalog.definitions(family) {
                assert_eq!(def.family, family);
                assert!(keys.insert(def.key), "duplicate key {family}.{}", def.key);
                assert_eq!(catalog.lookup(family, def.key), Some(def));
            }
        }
    }

    #[test]
    fn test_lookup() {
        let catalog = Catalog::new();
        let total = catalog.lookup(Family::Cpu, "total").unwrap();
        assert_eq!(total.unit, "s");
        assert_eq!(total.suffix, Some("usage"));

        assert!(catalog.lookup(Family::Tcp6, "LISTEN").is_some());
        assert!(catalog.lookup(Family::Tcp, "total").is_none());
        assert!(catalog.lookup(Family::Load, "load").is_none());
    }

    #[test]
    fn test_scalar_namespace() {
        let catalog = Catalog::new();
        let total = catalog.lookup(Family::Cpu, "total").unwrap();
        let ns = total.namespace(&identity(), Some("ignored"));
        assert_eq!(
            ns.to_string(),
            "/creo/collector/container/default/web-1/app/cpu/total/usage"
        );
        assert_eq!(ns.element(Family::Cpu.key_index()).unwrap().value, "total");
    }

    #[test]
    fn test_per_device_namespace() {
        let catalog = Catalog::new();
        let rx = catalog.lookup(Family::Interface, "rx_bytes").unwrap();

        let ns = rx.namespace(&identity(), Some("eth0"));
        assert_eq!(
            ns.to_string(),
            "/creo/collector/container/default/web-1/app/iface/eth0/rx_bytes"
        );
        let device = ns.element(7).unwrap();
        assert_eq!(device.name, Some("device_name"));
        assert_eq!(ns.element(Family::Interface.key_index()).unwrap().value, "rx_bytes");

        let discovery = rx.namespace(&Identity::wildcard(), None);
        assert_eq!(discovery.to_string(), "/creo/collector/container/*/*/*/iface/*/rx_bytes");
    }
}
