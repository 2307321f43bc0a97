use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta};

use crate::builder::{Error, MissingObjectKeySnafu};

/// A builder to build [`Secret`] objects from plain string values.
///
/// Values end up in `stringData`, the API server takes care of the base64 encoding.
#[derive(Clone, Default)]
pub struct SecretBuilder {
    metadata: Option<ObjectMeta>,
    string_data: Option<BTreeMap<String, String>>,
}

impl SecretBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&mut self, metadata: impl Into<ObjectMeta>) -> &mut Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn add_string_data(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.string_data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn build(&self) -> Result<Secret, Error> {
        let Some(metadata) = &self.metadata else {
            return MissingObjectKeySnafu { key: "metadata" }.fail();
        };

        Ok(Secret {
            metadata: metadata.clone(),
            string_data: self.string_data.clone(),
            type_: Some("Opaque".to_owned()),
            ..Secret::default()
        })
    }
}

// Secret values must never end up in logs.
impl std::fmt::Debug for SecretBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuilder")
            .field("metadata", &self.metadata)
            .field(
                "keys",
                &self.string_data.as_ref().map(|data| data.keys().collect::<Vec<_>>()),
            )
            .finish()
    }
}
