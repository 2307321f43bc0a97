use std::collections::BTreeMap;

use const_format::concatcp;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

const APP_KUBERNETES_LABEL_BASE: &str = "app.kubernetes.io/";

/// The tool that manages the object.
pub const MANAGED_BY_LABEL: &str = concatcp!(APP_KUBERNETES_LABEL_BASE, "managed-by");
/// The release the object belongs to.
pub const PART_OF_LABEL: &str = concatcp!(APP_KUBERNETES_LABEL_BASE, "part-of");

/// Value of [`MANAGED_BY_LABEL`] on every object declared by this crate. It is also used
/// as field manager for server-side apply.
pub const MANAGER_NAME: &str = "airbyte-stack";

/// A builder to build [`ObjectMeta`] objects.
///
/// It is recommended to always call [`Self::with_recommended_labels()`].
#[derive(Clone, Debug, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    namespace: Option<String>,
    labels: Option<BTreeMap<String, String>>,
    annotations: Option<BTreeMap<String, String>>,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(&mut self, namespace: impl Into<String>) -> &mut Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// This adds a single label to the existing labels.
    /// It'll override a label with the same key.
    pub fn with_label(
        &mut self,
        label_key: impl Into<String>,
        label_value: impl Into<String>,
    ) -> &mut Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(label_key.into(), label_value.into());
        self
    }

    /// This adds multiple labels to the existing labels.
    /// Any existing label with a key that is contained in `labels` will be overwritten
    pub fn with_labels(&mut self, labels: BTreeMap<String, String>) -> &mut Self {
        self.labels.get_or_insert_with(BTreeMap::new).extend(labels);
        self
    }

    /// This adds a single annotation to the existing annotations.
    /// It'll override an annotation with the same key.
    pub fn with_annotation(
        &mut self,
        annotation_key: impl Into<String>,
        annotation_value: impl Into<String>,
    ) -> &mut Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(annotation_key.into(), annotation_value.into());
        self
    }

    /// Sets [`MANAGED_BY_LABEL`] and [`PART_OF_LABEL`].
    pub fn with_recommended_labels(&mut self, release_name: &str) -> &mut Self {
        self.with_label(MANAGED_BY_LABEL, MANAGER_NAME)
            .with_label(PART_OF_LABEL, release_name)
    }

    pub fn build(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            ..ObjectMeta::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_metadata_with_recommended_labels() {
        let meta = ObjectMetaBuilder::new()
            .name("postgres")
            .namespace("airbyte")
            .with_recommended_labels("airbyte")
            .with_label("app", "postgres")
            .build();

        assert_eq!(meta.name.as_deref(), Some("postgres"));
        assert_eq!(meta.namespace.as_deref(), Some("airbyte"));

        let labels = meta.labels.expect("labels must be set");
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["app.kubernetes.io/managed-by"], "airbyte-stack");
        assert_eq!(labels["app.kubernetes.io/part-of"], "airbyte");
        assert_eq!(labels["app"], "postgres");
    }

    #[test]
    fn later_labels_override_earlier_ones() {
        let meta = ObjectMetaBuilder::new()
            .with_label("app", "postgres")
            .with_labels(BTreeMap::from([("app".to_owned(), "db".to_owned())]))
            .build();

        assert_eq!(meta.labels.expect("labels must be set")["app"], "db");
    }

    #[test]
    fn annotations_are_kept_apart_from_labels() {
        let meta = ObjectMetaBuilder::new()
            .with_label("app", "postgres")
            .with_annotation("airbyte-stack/config-hash", "abc")
            .build();

        assert_eq!(meta.labels.expect("labels must be set").len(), 1);
        assert_eq!(
            meta.annotations.expect("annotations must be set")["airbyte-stack/config-hash"],
            "abc"
        );
    }
}
