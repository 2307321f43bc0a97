use k8s_openapi::api::core::v1::Namespace;

use crate::{
    builder::meta::ObjectMetaBuilder,
    config::StackSpec,
    resources::{DeclaredResource, Manifest},
};

pub const NAMESPACE_RESOURCE_NAME: &str = "airbyte-namespace";

/// Declares the namespace all other resources are scoped to.
///
/// It has no dependencies, everything else depends on it.
pub fn declare(spec: &StackSpec) -> DeclaredResource {
    let namespace = Namespace {
        metadata: ObjectMetaBuilder::new()
            .name(&spec.namespace)
            .with_recommended_labels(&spec.release_name)
            .build(),
        ..Namespace::default()
    };

    DeclaredResource::new(NAMESPACE_RESOURCE_NAME, Manifest::Namespace(namespace))
}
