use std::fmt::Debug;

use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
    Api, Resource,
    api::{DeleteParams, Patch, PatchParams},
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info, instrument};

use crate::builder::meta::MANAGER_NAME;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("object is missing key {key:?}"))]
    MissingObjectKey { key: &'static str },

    #[snafu(display("failed to apply {kind} {name:?}"))]
    ApplyResource {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    DeleteResource {
        source: kube::Error,
        kind: String,
        name: String,
    },
}

impl Error {
    /// The API server rejected an apply as an invalid change, which is what an update of
    /// an immutable object results in.
    fn is_invalid_change(&self) -> bool {
        matches!(
            self,
            Self::ApplyResource { source: kube::Error::Api(error), .. } if error.code == 422
        )
    }
}

/// This `Client` can be used to access Kubernetes.
/// It wraps an underlying [`kube::Client`] and applies every object under the same field
/// manager.
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    apply_patch_params: PatchParams,
    delete_params: DeleteParams,
}

impl Client {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            // The stack is the sole manager of every field it sets.
            apply_patch_params: PatchParams::apply(MANAGER_NAME).force(),
            delete_params: DeleteParams::default(),
        }
    }

    /// Creates a client from the local kubeconfig or the in-cluster environment.
    pub async fn try_default() -> Result<Self, Error> {
        let client = kube::Client::try_default()
            .await
            .context(CreateClientSnafu)?;
        Ok(Self::new(client))
    }

    /// Creates or updates a namespaced object with server-side apply.
    #[instrument(skip(self, resource), fields(kind = %K::kind(&())))]
    pub async fn apply_namespaced<K>(&self, resource: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
    {
        let namespace = resource
            .meta()
            .namespace
            .as_deref()
            .context(MissingObjectKeySnafu { key: "namespace" })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        self.apply(&api, resource).await
    }

    /// Applies an immutable namespaced object. When the stored object differs and the
    /// cluster refuses the update, the object is deleted and created from `resource`.
    #[instrument(skip(self, resource), fields(kind = %K::kind(&())))]
    pub async fn replace_namespaced<K>(&self, resource: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
    {
        match self.apply_namespaced(resource).await {
            Err(error) if error.is_invalid_change() => {
                info!(name = ?resource.meta().name, "immutable object changed, replacing it");
                self.delete_namespaced(resource).await?;
                self.apply_namespaced(resource).await
            }
            result => result,
        }
    }

    /// Creates or updates a cluster scoped object with server-side apply.
    #[instrument(skip(self, resource), fields(kind = %K::kind(&())))]
    pub async fn apply_cluster<K>(&self, resource: &K) -> Result<K, Error>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
    {
        let api: Api<K> = Api::all(self.client.clone());
        self.apply(&api, resource).await
    }

    async fn apply<K>(&self, api: &Api<K>, resource: &K) -> Result<K, Error>
    where
        K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize,
    {
        let name = resource
            .meta()
            .name
            .as_deref()
            .context(MissingObjectKeySnafu { key: "name" })?;

        let applied = api
            .patch(name, &self.apply_patch_params, &Patch::Apply(resource))
            .await
            .with_context(|_| ApplyResourceSnafu {
                kind: K::kind(&()).to_string(),
                name,
            })?;
        debug!(name, "applied");
        Ok(applied)
    }

    /// Deletes a namespaced object. An object that does not exist counts as deleted.
    #[instrument(skip(self, resource), fields(kind = %K::kind(&())))]
    pub async fn delete_namespaced<K>(&self, resource: &K) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let namespace = resource
            .meta()
            .namespace
            .as_deref()
            .context(MissingObjectKeySnafu { key: "namespace" })?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        self.delete(&api, resource).await
    }

    /// Deletes a cluster scoped object. An object that does not exist counts as deleted.
    #[instrument(skip(self, resource), fields(kind = %K::kind(&())))]
    pub async fn delete_cluster<K>(&self, resource: &K) -> Result<(), Error>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let api: Api<K> = Api::all(self.client.clone());
        self.delete(&api, resource).await
    }

    async fn delete<K>(&self, api: &Api<K>, resource: &K) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned,
    {
        let name = resource
            .meta()
            .name
            .as_deref()
            .context(MissingObjectKeySnafu { key: "name" })?;

        match api.delete(name, &self.delete_params).await {
            Ok(_) => {
                debug!(name, "deleted");
                Ok(())
            }
            Err(kube::Error::Api(error)) if error.code == 404 => {
                debug!(name, "already gone");
                Ok(())
            }
            Err(source) => Err(Error::DeleteResource {
                source,
                kind: K::kind(&()).to_string(),
                name: name.to_owned(),
            }),
        }
    }
}
