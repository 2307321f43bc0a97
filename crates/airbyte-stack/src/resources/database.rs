//! The self-hosted PostgreSQL tier: configuration, volume, workload and endpoint.

use std::{collections::BTreeMap, time::Duration};

use k8s_openapi::{
    api::{
        apps::v1::{StatefulSet, StatefulSetSpec},
        core::v1::{
            ConfigMap, ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, PersistentVolumeClaim,
            PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec,
            PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
            VolumeResourceRequirements,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    builder::{self, configmap::ConfigMapBuilder, meta::ObjectMetaBuilder, probe::ProbeBuilder},
    config::StackSpec,
    resources::{DeclaredResource, Manifest, ResourceId, credentials::DatabaseCredentials},
    topology::ManagedDatabase,
};

pub const POSTGRES_PORT: u16 = 5432;

pub const CONFIG_MAP_NAME: &str = "postgres-config";
pub const VOLUME_CLAIM_NAME: &str = "postgres-pvc";
pub const STATEFUL_SET_NAME: &str = "postgres";
/// The chart's external database values point at this name, see
/// [`crate::values::ChartValues`].
pub const SERVICE_NAME: &str = "airbyte-db-svc";

const CONTAINER_NAME: &str = "postgres";
const VOLUME_NAME: &str = "postgres-storage";
const DATA_MOUNT_PATH: &str = "/var/lib/postgresql/data";
// initdb refuses a mount point that already holds lost+found.
const PGDATA: &str = "/var/lib/postgresql/data/pgdata";

/// Pod template annotation holding the digest of the database configuration. A changed
/// configuration changes the template, which rolls the StatefulSet.
pub const CONFIG_HASH_ANNOTATION: &str = "airbyte-stack/config-hash";

const APP_LABEL_KEY: &str = "app";
const APP_LABEL_VALUE: &str = "postgres";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to build database configuration"))]
    BuildConfigMap { source: builder::Error },

    #[snafu(display("failed to build {probe} probe"))]
    BuildProbe {
        source: builder::Error,
        probe: &'static str,
    },

    #[snafu(display("database service is missing {key:?}"))]
    MissingServiceKey { key: &'static str },

    #[snafu(display("database service port {port} is out of range"))]
    InvalidServicePort { port: i32 },
}

/// All resources of the database tier plus the address they are reachable at.
#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseTier {
    pub config_map: DeclaredResource,
    pub volume_claim: DeclaredResource,
    pub stateful_set: DeclaredResource,
    pub service: DeclaredResource,
    pub endpoint: DatabaseEndpoint,
}

impl DatabaseTier {
    /// The resources in the order they were declared.
    pub fn into_resources(self) -> [DeclaredResource; 4] {
        [
            self.config_map,
            self.volume_claim,
            self.stateful_set,
            self.service,
        ]
    }
}

/// Declares the database tier inside the namespace identified by `namespace`.
pub fn declare(
    spec: &StackSpec,
    database: &ManagedDatabase,
    credentials: &DatabaseCredentials,
    namespace: &ResourceId,
) -> Result<DatabaseTier, Error> {
    let config_map = build_config_map(spec, database, credentials)?;
    let config_hash = config_hash(&config_map);
    let config_map = DeclaredResource::new(CONFIG_MAP_NAME, Manifest::ConfigMap(config_map))
        .reading(namespace);

    let volume_claim = DeclaredResource::new(
        VOLUME_CLAIM_NAME,
        Manifest::PersistentVolumeClaim(build_volume_claim(spec, database)),
    )
    .reading(namespace);

    let stateful_set = DeclaredResource::new(
        STATEFUL_SET_NAME,
        Manifest::StatefulSet(build_stateful_set(spec, database, &config_hash)?),
    )
    .reading(namespace)
    .reading(&config_map.id)
    .reading(&volume_claim.id);

    let service_object = build_service(spec);
    let endpoint = DatabaseEndpoint::from_service(&service_object, &spec.cluster_domain)?;
    let service = DeclaredResource::new(SERVICE_NAME, Manifest::Service(service_object))
        .reading(namespace)
        .after(&stateful_set.id);

    Ok(DatabaseTier {
        config_map,
        volume_claim,
        stateful_set,
        service,
        endpoint,
    })
}

fn metadata(spec: &StackSpec, name: &str) -> ObjectMetaBuilder {
    let mut builder = ObjectMetaBuilder::new();
    builder
        .name(name)
        .namespace(&spec.namespace)
        .with_recommended_labels(&spec.release_name)
        .with_labels(selector_labels());
    builder
}

fn selector_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL_KEY.to_owned(), APP_LABEL_VALUE.to_owned())])
}

/// Builds the environment of the PostgreSQL container.
///
/// The ConfigMap is immutable: a changed name, user or password is rolled out by
/// replacing the object, see [`crate::client::Client::replace_namespaced`].
///
/// # Security
///
/// `POSTGRES_PASSWORD` holds the resolved password in plaintext. Anyone allowed to read
/// ConfigMaps in the namespace can read it, and it shows up in rendered manifests. This is
/// a known exposure of the database tier; the Secret handed to the chart is not affected.
fn build_config_map(
    spec: &StackSpec,
    database: &ManagedDatabase,
    credentials: &DatabaseCredentials,
) -> Result<ConfigMap, Error> {
    ConfigMapBuilder::new()
        .metadata(metadata(spec, CONFIG_MAP_NAME).build())
        .immutable()
        .add_data("POSTGRES_DB", &database.name)
        .add_data("POSTGRES_USER", &credentials.user)
        .add_data("POSTGRES_PASSWORD", credentials.password.expose_secret())
        .add_data("PGDATA", PGDATA)
        .build()
        .context(BuildConfigMapSnafu)
}

/// SHA-256 over the ConfigMap's data, entries in key order.
fn config_hash(config_map: &ConfigMap) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in config_map.data.iter().flatten() {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(value.as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

fn build_volume_claim(spec: &StackSpec, database: &ManagedDatabase) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: metadata(spec, VOLUME_CLAIM_NAME).build(),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_owned(),
                    Quantity(database.storage.clone()),
                )])),
                ..VolumeResourceRequirements::default()
            }),
            storage_class_name: database.storage_class_name.clone(),
            ..PersistentVolumeClaimSpec::default()
        }),
        ..PersistentVolumeClaim::default()
    }
}

fn build_stateful_set(
    spec: &StackSpec,
    database: &ManagedDatabase,
    config_hash: &str,
) -> Result<StatefulSet, Error> {
    let health_check = [
        "pg_isready",
        "-U",
        database.user.as_str(),
        "-d",
        database.name.as_str(),
    ];

    let liveness_probe = ProbeBuilder::default()
        .with_exec_action_helper(health_check)
        .with_period(Duration::from_secs(10))
        .with_initial_delay(Duration::from_secs(30))
        .with_timeout(Duration::from_secs(5))
        .with_success_threshold(1)
        .with_failure_threshold(3)
        .build()
        .context(BuildProbeSnafu { probe: "liveness" })?;

    let readiness_probe = ProbeBuilder::default()
        .with_exec_action_helper(health_check)
        .with_period(Duration::from_secs(10))
        .with_initial_delay(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(1))
        .with_success_threshold(1)
        .with_failure_threshold(3)
        .build()
        .context(BuildProbeSnafu { probe: "readiness" })?;

    let container = Container {
        name: CONTAINER_NAME.to_owned(),
        image: Some(database.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: POSTGRES_PORT.into(),
            name: Some("postgres".to_owned()),
            ..ContainerPort::default()
        }]),
        env_from: Some(vec![EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: CONFIG_MAP_NAME.to_owned(),
                ..ConfigMapEnvSource::default()
            }),
            ..EnvFromSource::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_NAME.to_owned(),
            mount_path: DATA_MOUNT_PATH.to_owned(),
            ..VolumeMount::default()
        }]),
        liveness_probe: Some(liveness_probe),
        readiness_probe: Some(readiness_probe),
        ..Container::default()
    };

    Ok(StatefulSet {
        metadata: metadata(spec, STATEFUL_SET_NAME).build(),
        spec: Some(StatefulSetSpec {
            service_name: Some(SERVICE_NAME.to_owned()),
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(
                    ObjectMetaBuilder::new()
                        .with_labels(selector_labels())
                        .with_annotation(CONFIG_HASH_ANNOTATION, config_hash)
                        .build(),
                ),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: VOLUME_NAME.to_owned(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: VOLUME_CLAIM_NAME.to_owned(),
                            ..PersistentVolumeClaimVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    })
}

fn build_service(spec: &StackSpec) -> Service {
    Service {
        metadata: metadata(spec, SERVICE_NAME).build(),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels()),
            ports: Some(vec![ServicePort {
                port: POSTGRES_PORT.into(),
                target_port: Some(IntOrString::Int(POSTGRES_PORT.into())),
                protocol: Some("TCP".to_owned()),
                ..ServicePort::default()
            }]),
            type_: Some("ClusterIP".to_owned()),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// The in-cluster address of the database.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatabaseEndpoint {
    /// Fully qualified DNS name of the Service, e.g.
    /// `airbyte-db-svc.airbyte.svc.cluster.local`.
    pub host: String,
    pub port: u16,
}

impl DatabaseEndpoint {
    /// Derives the endpoint from the declared Service, so that every consumer of the
    /// address agrees with the object that is actually applied.
    pub fn from_service(service: &Service, cluster_domain: &str) -> Result<Self, Error> {
        let name = service
            .metadata
            .name
            .as_deref()
            .context(MissingServiceKeySnafu {
                key: "metadata.name",
            })?;
        let namespace = service
            .metadata
            .namespace
            .as_deref()
            .context(MissingServiceKeySnafu {
                key: "metadata.namespace",
            })?;
        let port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.first())
            .context(MissingServiceKeySnafu { key: "spec.ports" })?
            .port;
        let port = u16::try_from(port)
            .ok()
            .context(InvalidServicePortSnafu { port })?;

        Ok(Self {
            host: format!("{name}.{namespace}.svc.{cluster_domain}"),
            port,
        })
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{host}:{port}", host = self.host, port = self.port)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::{
        config::StackConfig,
        resources::{ResourceKind, namespace::NAMESPACE_RESOURCE_NAME},
    };

    fn fixture() -> (StackSpec, ManagedDatabase, DatabaseCredentials) {
        let spec = serde_yaml::from_str::<StackConfig>(
            "
            namespace: airbyte
            repoUrl: https://airbytehq.github.io/helm-charts
            chart: airbyte
            chartVersion: 0.50.0
            appImageTag: 0.50.0
            airbyteUrl: http://localhost:8000
            database:
              password:
                env: UNUSED
            ",
        )
        .expect("invalid test input")
        .validate()
        .expect("config must be valid");
        let database = spec
            .topology
            .managed_database()
            .expect("database must be declared")
            .clone();
        let credentials = DatabaseCredentials {
            user: database.user.clone(),
            password: SecretString::from("pw".to_owned()),
        };
        (spec, database, credentials)
    }

    fn declare_fixture() -> DatabaseTier {
        let (spec, database, credentials) = fixture();
        declare_with(&spec, &database, &credentials)
    }

    fn declare_with(
        spec: &StackSpec,
        database: &ManagedDatabase,
        credentials: &DatabaseCredentials,
    ) -> DatabaseTier {
        let namespace = ResourceId::new(ResourceKind::Namespace, NAMESPACE_RESOURCE_NAME);
        declare(spec, database, credentials, &namespace).expect("tier must declare")
    }

    fn template_config_hash(tier: &DatabaseTier) -> String {
        let Manifest::StatefulSet(stateful_set) = &tier.stateful_set.manifest else {
            panic!("expected a StatefulSet");
        };
        stateful_set
            .spec
            .as_ref()
            .and_then(|spec| spec.template.metadata.as_ref())
            .and_then(|metadata| metadata.annotations.as_ref())
            .and_then(|annotations| annotations.get(CONFIG_HASH_ANNOTATION))
            .cloned()
            .expect("config hash must be annotated")
    }

    #[test]
    fn config_map_is_immutable_and_holds_the_environment() {
        let tier = declare_fixture();
        let Manifest::ConfigMap(config_map) = &tier.config_map.manifest else {
            panic!("expected a ConfigMap");
        };

        assert_eq!(config_map.immutable, Some(true));
        let data = config_map.data.as_ref().expect("data must be set");
        assert_eq!(data["POSTGRES_DB"], "db-airbyte");
        assert_eq!(data["POSTGRES_USER"], "airbyte_user");
        assert_eq!(data["POSTGRES_PASSWORD"], "pw");
        assert_eq!(data["PGDATA"], PGDATA);

        assert_eq!(template_config_hash(&tier), super::config_hash(config_map));
    }

    #[test]
    fn changed_password_rolls_the_workload() {
        let (spec, database, credentials) = fixture();
        let before = declare_with(&spec, &database, &credentials);
        let rotated = DatabaseCredentials {
            user: credentials.user.clone(),
            password: SecretString::from("rotated".to_owned()),
        };
        let after = declare_with(&spec, &database, &rotated);

        assert_ne!(template_config_hash(&before), template_config_hash(&after));
        assert_eq!(
            template_config_hash(&before),
            template_config_hash(&declare_with(&spec, &database, &credentials))
        );
    }

    #[test]
    fn endpoint_is_service_fqdn() {
        let tier = declare_fixture();

        assert_eq!(
            tier.endpoint,
            DatabaseEndpoint {
                host: "airbyte-db-svc.airbyte.svc.cluster.local".to_owned(),
                port: 5432,
            }
        );
        assert_eq!(
            tier.endpoint.address(),
            "airbyte-db-svc.airbyte.svc.cluster.local:5432"
        );
    }

    #[test]
    fn probes_are_asymmetric() {
        let tier = declare_fixture();
        let Manifest::StatefulSet(stateful_set) = tier.stateful_set.manifest else {
            panic!("expected a StatefulSet");
        };
        let spec = stateful_set.spec.expect("spec must be set");
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.service_name.as_deref(), Some(SERVICE_NAME));

        let pod = spec.template.spec.expect("pod spec must be set");
        let container = &pod.containers[0];

        let liveness = container.liveness_probe.as_ref().expect("liveness probe");
        assert_eq!(liveness.initial_delay_seconds, Some(30));
        assert_eq!(liveness.period_seconds, Some(10));
        assert_eq!(liveness.timeout_seconds, Some(5));

        let readiness = container.readiness_probe.as_ref().expect("readiness probe");
        assert_eq!(readiness.initial_delay_seconds, Some(5));
        assert_eq!(readiness.period_seconds, Some(10));
        assert_eq!(readiness.timeout_seconds, Some(1));

        assert_eq!(
            readiness.exec.as_ref().and_then(|exec| exec.command.clone()),
            Some(
                ["pg_isready", "-U", "airbyte_user", "-d", "db-airbyte"]
                    .map(str::to_owned)
                    .to_vec()
            )
        );
    }

    #[test]
    fn workload_reads_its_configuration_and_claim() {
        let tier = declare_fixture();

        assert!(tier.stateful_set.reads.contains(&tier.config_map.id));
        assert!(tier.stateful_set.reads.contains(&tier.volume_claim.id));
        assert!(tier.service.depends_on.contains(&tier.stateful_set.id));
    }

    #[test]
    fn volume_claim_requests_fixed_storage() {
        let tier = declare_fixture();
        let Manifest::PersistentVolumeClaim(claim) = tier.volume_claim.manifest else {
            panic!("expected a PersistentVolumeClaim");
        };
        let spec = claim.spec.expect("spec must be set");

        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_owned()]));
        assert_eq!(
            spec.resources
                .and_then(|resources| resources.requests)
                .expect("requests must be set")["storage"],
            Quantity("10Gi".to_owned())
        );
        assert_eq!(spec.storage_class_name, None);
    }

    #[test]
    fn service_without_ports_is_rejected() {
        let service = Service {
            metadata: ObjectMetaBuilder::new()
                .name("db")
                .namespace("airbyte")
                .build(),
            ..Service::default()
        };

        assert!(matches!(
            DatabaseEndpoint::from_service(&service, "cluster.local"),
            Err(Error::MissingServiceKey { key: "spec.ports" })
        ));
    }
}
