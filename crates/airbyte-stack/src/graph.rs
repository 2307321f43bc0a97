//! The dependency graph of a stack.
//!
//! Resources are applied in layers: a layer holds every resource whose dependencies are
//! all part of earlier layers. Resources within one layer are independent of each other.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use snafu::{Snafu, ensure};

use crate::resources::{DeclaredResource, ResourceId};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("resource {id} is declared twice"))]
    DuplicateResource { id: ResourceId },

    #[snafu(display("resource {id} depends on {dependency}, which is not declared"))]
    UnknownDependency {
        id: ResourceId,
        dependency: ResourceId,
    },

    #[snafu(display("resource {id} reads {read} without depending on it"))]
    UndeclaredRead { id: ResourceId, read: ResourceId },

    #[snafu(display("dependency cycle between {}", display_ids(involved)))]
    Cycle { involved: Vec<ResourceId> },
}

fn display_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// An acyclic graph of declared resources.
///
/// Insertion order is only used to make the output deterministic, it never decides
/// whether one resource is applied before another.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceGraph {
    resources: IndexMap<ResourceId, DeclaredResource>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: DeclaredResource) -> Result<&mut Self, Error> {
        ensure!(
            !self.resources.contains_key(&resource.id),
            DuplicateResourceSnafu {
                id: resource.id.clone()
            }
        );
        self.resources.insert(resource.id.clone(), resource);
        Ok(self)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&DeclaredResource> {
        self.resources.get(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &DeclaredResource> {
        self.resources.values()
    }

    /// Checks that every dependency is declared, that every read is backed by a
    /// dependency edge and that there are no cycles.
    pub fn validate(&self) -> Result<(), Error> {
        for resource in self.resources.values() {
            for dependency in &resource.depends_on {
                ensure!(
                    self.resources.contains_key(dependency),
                    UnknownDependencySnafu {
                        id: resource.id.clone(),
                        dependency: dependency.clone(),
                    }
                );
            }

            for read in &resource.reads {
                ensure!(
                    resource.depends_on.contains(read),
                    UndeclaredReadSnafu {
                        id: resource.id.clone(),
                        read: read.clone(),
                    }
                );
            }
        }

        self.layers().map(|_| ())
    }

    /// Sorts the graph topologically into layers (Kahn's algorithm).
    pub fn layers(&self) -> Result<Vec<Vec<&DeclaredResource>>, Error> {
        let mut remaining: HashMap<&ResourceId, usize> = self
            .resources
            .values()
            .map(|resource| (&resource.id, unique_dependencies(resource)))
            .collect();
        let mut dependents: HashMap<&ResourceId, Vec<&ResourceId>> = HashMap::new();
        for resource in self.resources.values() {
            for dependency in resource.depends_on.iter().collect::<HashSet<_>>() {
                dependents.entry(dependency).or_default().push(&resource.id);
            }
        }

        let mut layers = Vec::new();
        let mut ready: Vec<&ResourceId> = self
            .resources
            .keys()
            .filter(|id| remaining.get(id) == Some(&0))
            .collect();

        while !ready.is_empty() {
            let mut next = Vec::new();
            for id in &ready {
                remaining.remove(id);
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }

            layers.push(
                self.resources
                    .values()
                    .filter(|resource| ready.contains(&&resource.id))
                    .collect(),
            );
            ready = next;
        }

        if !remaining.is_empty() {
            let involved = self
                .resources
                .keys()
                .filter(|id| remaining.contains_key(id))
                .cloned()
                .collect::<Vec<ResourceId>>();
            return CycleSnafu { involved }.fail();
        }

        Ok(layers)
    }

    /// All resources in an order in which they can be applied.
    pub fn apply_order(&self) -> Result<Vec<&DeclaredResource>, Error> {
        Ok(self.layers()?.into_iter().flatten().collect())
    }
}

fn unique_dependencies(resource: &DeclaredResource) -> usize {
    resource.depends_on.iter().collect::<HashSet<_>>().len()
}
