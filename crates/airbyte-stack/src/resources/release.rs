use std::time::Duration;

use serde::Serialize;

use crate::{
    config::StackSpec,
    resources::{DeclaredResource, Manifest, ResourceId},
    values::ChartValues,
};

/// A chart installation. The chart owns every object it templates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    pub name: String,
    pub namespace: String,
    pub chart: String,
    pub version: String,
    pub repository: String,
    #[serde(rename = "timeoutSeconds", serialize_with = "serialize_seconds")]
    pub timeout: Duration,
    pub values: ChartValues,
}

fn serialize_seconds<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

impl HelmRelease {
    /// Arguments of a `helm upgrade --install` invocation that reads its values from
    /// stdin.
    pub fn upgrade_install_args(&self) -> Vec<String> {
        vec![
            "upgrade".to_owned(),
            "--install".to_owned(),
            self.name.clone(),
            self.chart.clone(),
            "--repo".to_owned(),
            self.repository.clone(),
            "--version".to_owned(),
            self.version.clone(),
            "--namespace".to_owned(),
            self.namespace.clone(),
            "--wait".to_owned(),
            "--timeout".to_owned(),
            format!("{}s", self.timeout.as_secs()),
            "--values".to_owned(),
            "-".to_owned(),
        ]
    }

    pub fn uninstall_args(&self) -> Vec<String> {
        vec![
            "uninstall".to_owned(),
            self.name.clone(),
            "--namespace".to_owned(),
            self.namespace.clone(),
            "--wait".to_owned(),
            "--timeout".to_owned(),
            format!("{}s", self.timeout.as_secs()),
        ]
    }
}

/// Declares the release. `reads` are the resources whose names the values refer to.
pub fn declare(
    spec: &StackSpec,
    values: ChartValues,
    namespace: &ResourceId,
    reads: &[&ResourceId],
) -> DeclaredResource {
    let release = HelmRelease {
        name: spec.release_name.clone(),
        namespace: spec.namespace.clone(),
        chart: spec.chart.name.clone(),
        version: spec.chart.version.to_string(),
        repository: spec.chart.repo_url.to_string(),
        timeout: spec.apply_timeout,
        values,
    };

    reads.iter().fold(
        DeclaredResource::new(&spec.release_name, Manifest::HelmRelease(release))
            .reading(namespace),
        |resource, id| resource.reading(id),
    )
}
