//! Translation of a stack's topology into the value set of the Airbyte chart.
//!
//! The structs mirror the part of the chart's `values.yaml` this crate sets. Everything
//! else is left to the chart defaults.

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::{
    config::StackSpec,
    resources::{
        credentials::{self, PASSWORD_KEY, SECRET_NAME, URL_KEY},
        database::DatabaseEndpoint,
    },
    topology::ManagedDatabase,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "an external database is configured but the chart's bundled PostgreSQL is not disabled"
    ))]
    BundledDatabaseNotDisabled,

    #[snafu(display(
        "global.database, global.jobs.database and externalDatabase must be set together"
    ))]
    IncompleteExternalDatabase,

    #[snafu(display("the server and the job runners must read the same database secret key"))]
    DivergentDatabaseSecret,

    #[snafu(display("failed to serialize chart values"))]
    SerializeValues { source: serde_yaml::Error },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartValues {
    pub global: GlobalValues,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgresql: Option<BundledPostgresqlValues>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_database: Option<ExternalDatabaseValues>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalValues {
    pub airbyte_url: String,
    pub image: ImageValues,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSecretValues>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<JobsValues>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ImageValues {
    pub tag: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct JobsValues {
    pub database: DatabaseSecretValues,
}

/// Points a chart component at a key inside an existing Secret instead of carrying the
/// connection string itself.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSecretValues {
    pub secret_name: String,
    pub secret_value: String,
    #[serde(rename = "type")]
    pub type_: DatabaseType,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseType {
    Internal,
    External,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct BundledPostgresqlValues {
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDatabaseValues {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub existing_secret: String,
    pub existing_secret_password_key: String,
}

impl ChartValues {
    /// Values for a stack without a self-hosted database. The chart falls back to its
    /// bundled database.
    pub fn minimal(spec: &StackSpec) -> Self {
        Self {
            global: GlobalValues {
                airbyte_url: spec.airbyte_url.clone(),
                image: ImageValues {
                    tag: spec.app_image_tag.clone(),
                },
                database: None,
                jobs: None,
            },
            postgresql: None,
            external_database: None,
        }
    }

    /// Values for a stack with a self-hosted database reachable at `endpoint`.
    ///
    /// The server and the job runners both read the connection string from the same
    /// Secret key, and the password only ever appears in that Secret.
    pub fn with_external_database(
        spec: &StackSpec,
        database: &ManagedDatabase,
        endpoint: &DatabaseEndpoint,
    ) -> Self {
        let connection = DatabaseSecretValues {
            secret_name: SECRET_NAME.to_owned(),
            secret_value: credentials::hyphenated(URL_KEY),
            type_: DatabaseType::External,
        };

        let mut values = Self::minimal(spec);
        values.global.database = Some(connection.clone());
        values.global.jobs = Some(JobsValues {
            database: connection,
        });
        values.postgresql = Some(BundledPostgresqlValues { enabled: false });
        values.external_database = Some(ExternalDatabaseValues {
            host: endpoint.host.clone(),
            port: endpoint.port,
            database: database.name.clone(),
            user: database.user.clone(),
            existing_secret: SECRET_NAME.to_owned(),
            existing_secret_password_key: credentials::hyphenated(PASSWORD_KEY),
        });
        values
    }

    /// Checks that an external database and the chart's bundled one are never enabled at
    /// the same time. Both would claim the same Service name and port.
    ///
    /// An external database has to be wired into the server and the job runners alike,
    /// through the same Secret key.
    pub fn validate(&self) -> Result<(), Error> {
        match (&self.external_database, &self.global.database, &self.global.jobs) {
            (None, None, None) => Ok(()),
            (Some(_), Some(server), Some(JobsValues { database: jobs })) => {
                ensure!(server == jobs, DivergentDatabaseSecretSnafu);
                ensure!(
                    matches!(self.postgresql, Some(BundledPostgresqlValues { enabled: false })),
                    BundledDatabaseNotDisabledSnafu
                );
                Ok(())
            }
            _ => IncompleteExternalDatabaseSnafu.fail(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).context(SerializeValuesSnafu)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::config::StackConfig;

    fn spec() -> StackSpec {
        serde_yaml::from_str::<StackConfig>(indoc! {"
            namespace: airbyte
            repoUrl: https://airbytehq.github.io/helm-charts
            chart: airbyte
            chartVersion: 0.50.0
            appImageTag: 0.50.0
            airbyteUrl: http://localhost:8000
            database:
              password:
                env: UNUSED
        "})
        .expect("invalid test input")
        .validate()
        .expect("config must be valid")
    }

    fn external_values() -> ChartValues {
        let spec = spec();
        let database = spec
            .topology
            .managed_database()
            .expect("database must be declared");
        ChartValues::with_external_database(&spec, database, &endpoint())
    }

    fn endpoint() -> DatabaseEndpoint {
        DatabaseEndpoint {
            host: "airbyte-db-svc.airbyte.svc.cluster.local".to_owned(),
            port: 5432,
        }
    }

    #[test]
    fn minimal_values() {
        let values = ChartValues::minimal(&spec());

        assert_eq!(
            values.to_yaml().expect("values must serialize"),
            indoc! {"
                global:
                  airbyteUrl: http://localhost:8000
                  image:
                    tag: 0.50.0
            "}
        );
        values.validate().expect("values must be valid");
    }

    #[test]
    fn external_database_values() {
        let values = external_values();

        assert_eq!(
            values.to_yaml().expect("values must serialize"),
            indoc! {"
                global:
                  airbyteUrl: http://localhost:8000
                  image:
                    tag: 0.50.0
                  database:
                    secretName: airbyte-db-secret
                    secretValue: database-url
                    type: external
                  jobs:
                    database:
                      secretName: airbyte-db-secret
                      secretValue: database-url
                      type: external
                postgresql:
                  enabled: false
                externalDatabase:
                  host: airbyte-db-svc.airbyte.svc.cluster.local
                  port: 5432
                  database: db-airbyte
                  user: airbyte_user
                  existingSecret: airbyte-db-secret
                  existingSecretPasswordKey: database-password
            "}
        );
        values.validate().expect("values must be valid");
    }

    #[test]
    fn bundled_database_must_be_disabled() {
        let mut values = external_values();
        values.postgresql = None;
        assert!(matches!(values.validate(), Err(Error::BundledDatabaseNotDisabled)));

        values.postgresql = Some(BundledPostgresqlValues { enabled: true });
        assert!(matches!(values.validate(), Err(Error::BundledDatabaseNotDisabled)));
    }

    #[rstest]
    #[case::server_only(|values: &mut ChartValues| {
        values.global.jobs = None;
        values.external_database = None;
    })]
    #[case::jobs_only(|values: &mut ChartValues| {
        values.global.database = None;
        values.external_database = None;
    })]
    #[case::external_without_jobs(|values: &mut ChartValues| values.global.jobs = None)]
    #[case::external_without_server(|values: &mut ChartValues| values.global.database = None)]
    #[case::consumers_without_external(|values: &mut ChartValues| values.external_database = None)]
    fn half_configured_external_database_is_rejected(#[case] strip: fn(&mut ChartValues)) {
        let mut values = external_values();
        strip(&mut values);

        assert!(matches!(values.validate(), Err(Error::IncompleteExternalDatabase)));
    }

    #[test]
    fn jobs_must_read_the_server_secret_key() {
        let mut values = external_values();
        values.global.jobs = Some(JobsValues {
            database: DatabaseSecretValues {
                secret_name: SECRET_NAME.to_owned(),
                secret_value: "DATABASE_URL".to_owned(),
                type_: DatabaseType::External,
            },
        });

        assert!(matches!(values.validate(), Err(Error::DivergentDatabaseSecret)));
    }
}
