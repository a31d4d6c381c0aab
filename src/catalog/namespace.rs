//! Metric namespaces and the Kubernetes identity of containers.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

pub const VENDOR: &str = "creo";
pub const PLUGIN_NAME: &str = "collector";
/// Value of a dynamic segment in discovery namespaces.
pub const WILDCARD: &str = "*";

pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
pub const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

/// One segment of a metric namespace. Dynamic segments carry a `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceElement {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'static str>,
    #[serde(skip_serializing_if = "is_blank")]
    pub description: &'static str,
}

fn is_blank(description: &&str) -> bool {
    description.is_empty()
}

impl NamespaceElement {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: None,
            description: "",
        }
    }

    pub fn dynamic(
        name: &'static str,
        description: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            name: Some(name),
            description,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.name.is_some()
    }
}

/// Ordered namespace of a metric, e.g.
/// `/creo/collector/container/default/web-1/app/cpu/total/usage`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Namespace(Vec<NamespaceElement>);

impl Namespace {
    /// The six leading segments shared by every container metric.
    pub fn container(identity: &Identity) -> Self {
        Self(vec![
            NamespaceElement::literal(VENDOR),
            NamespaceElement::literal(PLUGIN_NAME),
            NamespaceElement::literal("container"),
            NamespaceElement::dynamic(
                "namespace",
                "Kubernetes namespace of the pod",
                &identity.namespace,
            ),
            NamespaceElement::dynamic("pod_name", "name of the pod", &identity.pod_name),
            NamespaceElement::dynamic(
                "container_name",
                "name of the container in the pod",
                &identity.container_name,
            ),
        ])
    }

    pub fn push(&mut self, element: NamespaceElement) {
        self.0.push(element);
    }

    pub fn elements(&self) -> &[NamespaceElement] {
        &self.0
    }

    pub fn element(&self, index: usize) -> Option<&NamespaceElement> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.value.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in self.values() {
            write!(f, "/{value}")?;
        }
        Ok(())
    }
}

/// Kubernetes identity of a container, taken from its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
}

impl Identity {
    /// Returns `None` unless all three identity labels are present.
    pub fn from_labels(labels: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            namespace: labels.get(POD_NAMESPACE_LABEL)?.clone(),
            pod_name: labels.get(POD_NAME_LABEL)?.clone(),
            container_name: labels.get(CONTAINER_NAME_LABEL)?.clone(),
        })
    }

    /// Identity matching every container, used in discovery namespaces.
    pub fn wildcard() -> Self {
        Self {
            namespace: WILDCARD.to_owned(),
            pod_name: WILDCARD.to_owned(),
            container_name: WILDCARD.to_owned(),
        }
    }
}
