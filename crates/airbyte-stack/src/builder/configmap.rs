use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};

use crate::builder::{Error, MissingObjectKeySnafu};

/// A builder to build [`ConfigMap`] objects.
#[derive(Clone, Debug, Default)]
pub struct ConfigMapBuilder {
    metadata: Option<ObjectMeta>,
    data: Option<BTreeMap<String, String>>,
    immutable: bool,
}

impl ConfigMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&mut self, metadata: impl Into<ObjectMeta>) -> &mut Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Marks the ConfigMap as immutable. Kubernetes then rejects every change to its data,
    /// the object has to be deleted and created again instead.
    pub fn immutable(&mut self) -> &mut Self {
        self.immutable = true;
        self
    }

    pub fn build(&self) -> Result<ConfigMap, Error> {
        let Some(metadata) = &self.metadata else {
            return MissingObjectKeySnafu { key: "metadata" }.fail();
        };

        Ok(ConfigMap {
            metadata: metadata.clone(),
            data: self.data.clone(),
            immutable: self.immutable.then_some(true),
            ..ConfigMap::default()
        })
    }
}
