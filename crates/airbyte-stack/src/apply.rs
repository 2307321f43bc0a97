//! Walks a stack's dependency graph against a cluster.
//!
//! Layers are processed one after another, the resources of one layer concurrently.
//! A failed resource aborts the walk, nothing is retried.

use futures::future::try_join_all;
use snafu::{ResultExt, Snafu};
use tracing::{info, instrument};

use crate::{
    client::{self, Client},
    graph,
    helm::{self, HelmCli},
    resources::{DeclaredResource, Manifest, ResourceId},
    stack::Stack,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to order the stack's resources"))]
    OrderResources { source: graph::Error },

    #[snafu(display("failed to apply {id}"))]
    ApplyObject { source: client::Error, id: ResourceId },

    #[snafu(display("failed to delete {id}"))]
    DeleteObject { source: client::Error, id: ResourceId },

    #[snafu(display("failed to install release {id}"))]
    InstallRelease { source: helm::Error, id: ResourceId },

    #[snafu(display("failed to uninstall release {id}"))]
    UninstallRelease { source: helm::Error, id: ResourceId },
}

/// The layers [`Applier::apply`] walks, first to last. Every resource comes after all of
/// its dependencies.
pub fn apply_sequence(stack: &Stack) -> Result<Vec<Vec<&DeclaredResource>>, Error> {
    stack.graph().layers().context(OrderResourcesSnafu)
}

/// The layers [`Applier::destroy`] walks, first to last. Every resource comes before all of
/// its dependencies, so the release is removed first and the namespace last.
pub fn destroy_sequence(stack: &Stack) -> Result<Vec<Vec<&DeclaredResource>>, Error> {
    let mut layers = apply_sequence(stack)?;
    layers.reverse();
    Ok(layers)
}

pub struct Applier {
    client: Client,
    helm: HelmCli,
}

impl Applier {
    pub fn new(client: Client, helm: HelmCli) -> Self {
        Self { client, helm }
    }

    /// Brings the cluster to the state declared by `stack`. Applying an unchanged stack
    /// again changes nothing.
    #[instrument(skip_all, fields(namespace = %stack.outputs().namespace))]
    pub async fn apply(&self, stack: &Stack) -> Result<(), Error> {
        for (index, layer) in apply_sequence(stack)?.iter().enumerate() {
            info!(layer = index, resources = layer.len(), "applying layer");
            try_join_all(layer.iter().map(|resource| self.apply_resource(resource))).await?;
        }
        info!("stack applied");
        Ok(())
    }

    /// Removes everything `stack` declares, dependents before their dependencies.
    #[instrument(skip_all, fields(namespace = %stack.outputs().namespace))]
    pub async fn destroy(&self, stack: &Stack) -> Result<(), Error> {
        for (step, layer) in destroy_sequence(stack)?.iter().enumerate() {
            info!(step, resources = layer.len(), "destroying layer");
            try_join_all(layer.iter().map(|resource| self.delete_resource(resource))).await?;
        }
        info!("stack destroyed");
        Ok(())
    }

    async fn apply_resource(&self, resource: &DeclaredResource) -> Result<(), Error> {
        let id = &resource.id;
        match &resource.manifest {
            Manifest::Namespace(namespace) => self
                .client
                .apply_cluster(namespace)
                .await
                .map(drop)
                .context(ApplyObjectSnafu { id: id.clone() }),
            Manifest::ConfigMap(config_map) => self
                .client
                .replace_namespaced(config_map)
                .await
                .map(drop)
                .context(ApplyObjectSnafu { id: id.clone() }),
            Manifest::PersistentVolumeClaim(claim) => self
                .client
                .apply_namespaced(claim)
                .await
                .map(drop)
                .context(ApplyObjectSnafu { id: id.clone() }),
            Manifest::StatefulSet(stateful_set) => self
                .client
                .apply_namespaced(stateful_set)
                .await
                .map(drop)
                .context(ApplyObjectSnafu { id: id.clone() }),
            Manifest::Service(service) => self
                .client
                .apply_namespaced(service)
                .await
                .map(drop)
                .context(ApplyObjectSnafu { id: id.clone() }),
            Manifest::Secret(secret) => self
                .client
                .apply_namespaced(secret)
                .await
                .map(drop)
                .context(ApplyObjectSnafu { id: id.clone() }),
            Manifest::HelmRelease(release) => self
                .helm
                .upgrade_install(release)
                .await
                .context(InstallReleaseSnafu { id: id.clone() }),
        }
    }

    async fn delete_resource(&self, resource: &DeclaredResource) -> Result<(), Error> {
        let id = &resource.id;
        match &resource.manifest {
            Manifest::Namespace(namespace) => self
                .client
                .delete_cluster(namespace)
                .await
                .context(DeleteObjectSnafu { id: id.clone() }),
            Manifest::ConfigMap(config_map) => self
                .client
                .delete_namespaced(config_map)
                .await
                .context(DeleteObjectSnafu { id: id.clone() }),
            Manifest::PersistentVolumeClaim(claim) => self
                .client
                .delete_namespaced(claim)
                .await
                .context(DeleteObjectSnafu { id: id.clone() }),
            Manifest::StatefulSet(stateful_set) => self
                .client
                .delete_namespaced(stateful_set)
                .await
                .context(DeleteObjectSnafu { id: id.clone() }),
            Manifest::Service(service) => self
                .client
                .delete_namespaced(service)
                .await
                .context(DeleteObjectSnafu { id: id.clone() }),
            Manifest::Secret(secret) => self
                .client
                .delete_namespaced(secret)
                .await
                .context(DeleteObjectSnafu { id: id.clone() }),
            Manifest::HelmRelease(release) => self
                .helm
                .uninstall(release)
                .await
                .context(UninstallReleaseSnafu { id: id.clone() }),
        }
    }
}
