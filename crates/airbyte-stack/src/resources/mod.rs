//! Declarations of the individual resources of a stack.
//!
//! Every declaration is a [`DeclaredResource`]: the object to apply, the resources it has
//! to wait for and the resources whose output it consumes. The ordering lives entirely in
//! these edges, the order in which resources are declared carries no meaning.

use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ConfigMap, Namespace, PersistentVolumeClaim, Secret, Service},
};
use serde::Serialize;
use strum::Display;

use crate::resources::release::HelmRelease;

pub mod credentials;
pub mod database;
pub mod namespace;
pub mod release;

/// The kinds of resources a stack can declare.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceKind {
    Namespace,
    ConfigMap,
    PersistentVolumeClaim,
    StatefulSet,
    Service,
    Secret,
    HelmRelease,
}

/// Identifies a resource within a stack by kind and logical name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{kind}/{name}", kind = self.kind, name = self.name)
    }
}

/// The desired state of a single resource.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Manifest {
    Namespace(Namespace),
    ConfigMap(ConfigMap),
    PersistentVolumeClaim(PersistentVolumeClaim),
    StatefulSet(StatefulSet),
    Service(Service),
    Secret(Secret),
    HelmRelease(HelmRelease),
}

impl Manifest {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Namespace(_) => ResourceKind::Namespace,
            Self::ConfigMap(_) => ResourceKind::ConfigMap,
            Self::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            Self::StatefulSet(_) => ResourceKind::StatefulSet,
            Self::Service(_) => ResourceKind::Service,
            Self::Secret(_) => ResourceKind::Secret,
            Self::HelmRelease(_) => ResourceKind::HelmRelease,
        }
    }
}

/// A resource together with its place in the dependency graph.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredResource {
    pub id: ResourceId,
    pub manifest: Manifest,

    /// Resources that must exist before this one is applied.
    pub depends_on: Vec<ResourceId>,

    /// Resources whose names or computed values end up in [`Self::manifest`]. Each of
    /// them must also be listed in [`Self::depends_on`].
    pub reads: Vec<ResourceId>,
}

impl DeclaredResource {
    pub fn new(name: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            id: ResourceId::new(manifest.kind(), name),
            manifest,
            depends_on: Vec::new(),
            reads: Vec::new(),
        }
    }

    /// Adds a dependency edge on `id` and records that the manifest consumes its output.
    pub fn reading(mut self, id: &ResourceId) -> Self {
        self.depends_on_id(id);
        if !self.reads.contains(id) {
            self.reads.push(id.clone());
        }
        self
    }

    /// Adds a pure ordering edge on `id`.
    pub fn after(mut self, id: &ResourceId) -> Self {
        self.depends_on_id(id);
        self
    }

    fn depends_on_id(&mut self, id: &ResourceId) {
        if !self.depends_on.contains(id) {
            self.depends_on.push(id.clone());
        }
    }
}
