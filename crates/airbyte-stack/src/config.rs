//! Loading and validating stack configuration.
//!
//! Every stack has its own YAML file in a configuration directory, named after the
//! stack (`dev.yaml`, `prod.yaml`, ...). A file is first deserialized into a
//! [`StackConfig`], which mirrors the file one to one, and then validated into a
//! [`StackSpec`], which is what the rest of the crate works with.
//!
//! ```yaml
//! namespace: airbyte
//! repoUrl: https://airbytehq.github.io/helm-charts
//! chart: airbyte
//! chartVersion: 0.50.0
//! appImageTag: 0.50.0
//! airbyteUrl: http://localhost:8000
//! database:
//!   password:
//!     env: AIRBYTE_DB_PASSWORD
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    topology::{ManagedDatabase, Topology},
    validation,
};

pub const DEFAULT_RELEASE_NAME: &str = "airbyte";
pub const DEFAULT_APPLY_TIMEOUT_SECONDS: u64 = 1800;
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read stack configuration {path:?}"))]
    ReadConfig {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse stack configuration {path:?}"))]
    ParseConfig {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("invalid {key:?}: {value:?}"))]
    InvalidName {
        source: validation::Errors,
        key: &'static str,
        value: String,
    },

    #[snafu(display("invalid {key:?}: {value:?} is not a valid URL"))]
    InvalidUrl {
        source: url::ParseError,
        key: &'static str,
        value: String,
    },

    #[snafu(display("\"chartVersion\" {version:?} is not a pinned semantic version"))]
    UnpinnedChartVersion {
        source: semver::Error,
        version: String,
    },

    #[snafu(display("\"applyTimeoutSeconds\" must be greater than zero"))]
    ZeroApplyTimeout,
}

/// The raw content of a stack file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StackConfig {
    /// Namespace every resource of the stack lives in.
    pub namespace: String,

    /// Helm repository the chart is fetched from.
    pub repo_url: String,

    pub chart: String,

    /// Exact chart version. Ranges are rejected so that a stack always deploys the same
    /// chart.
    pub chart_version: String,

    /// Image tag used for all Airbyte components.
    pub app_image_tag: String,

    /// Externally reachable URL of the Airbyte web application.
    pub airbyte_url: String,

    #[serde(default = "StackConfig::default_release_name")]
    pub release_name: String,

    #[serde(default = "StackConfig::default_apply_timeout_seconds")]
    pub apply_timeout_seconds: u64,

    #[serde(default = "StackConfig::default_cluster_domain")]
    pub cluster_domain: String,

    /// Declares a self-hosted database tier. Omit it to run the chart's bundled database.
    #[serde(default)]
    pub database: Option<ManagedDatabase>,
}

impl StackConfig {
    fn default_release_name() -> String {
        DEFAULT_RELEASE_NAME.to_owned()
    }

    fn default_apply_timeout_seconds() -> u64 {
        DEFAULT_APPLY_TIMEOUT_SECONDS
    }

    fn default_cluster_domain() -> String {
        DEFAULT_CLUSTER_DOMAIN.to_owned()
    }

    /// Returns the path of the configuration file of `stack` inside `config_dir`.
    pub fn path_for(config_dir: impl AsRef<Path>, stack: &str) -> PathBuf {
        config_dir.as_ref().join(format!("{stack}.yaml"))
    }

    /// Loads the configuration of `stack` from `config_dir`.
    pub fn load(config_dir: impl AsRef<Path>, stack: &str) -> Result<Self, Error> {
        Self::from_file(Self::path_for(config_dir, stack))
    }

    #[instrument]
    pub fn from_file(path: PathBuf) -> Result<Self, Error> {
        debug!("reading stack configuration");
        let content = fs::read_to_string(&path).context(ReadConfigSnafu { path: &path })?;
        serde_yaml::from_str(&content).context(ParseConfigSnafu { path })
    }

    /// Checks every value that the Kubernetes API or Helm would otherwise reject later,
    /// and returns the validated [`StackSpec`].
    pub fn validate(self) -> Result<StackSpec, Error> {
        let Self {
            namespace,
            repo_url,
            chart,
            chart_version,
            app_image_tag,
            airbyte_url,
            release_name,
            apply_timeout_seconds,
            cluster_domain,
            database,
        } = self;

        validation::is_lowercase_rfc_1123_label(&namespace).context(InvalidNameSnafu {
            key: "namespace",
            value: &namespace,
        })?;
        validation::is_rfc_1035_label(&release_name).context(InvalidNameSnafu {
            key: "releaseName",
            value: &release_name,
        })?;
        validation::is_domain(&cluster_domain).context(InvalidNameSnafu {
            key: "clusterDomain",
            value: &cluster_domain,
        })?;
        validation::is_not_blank(&chart).context(InvalidNameSnafu {
            key: "chart",
            value: &chart,
        })?;
        validation::is_not_blank(&app_image_tag).context(InvalidNameSnafu {
            key: "appImageTag",
            value: &app_image_tag,
        })?;

        let repo_url = Url::parse(&repo_url).context(InvalidUrlSnafu {
            key: "repoUrl",
            value: &repo_url,
        })?;
        Url::parse(&airbyte_url).context(InvalidUrlSnafu {
            key: "airbyteUrl",
            value: &airbyte_url,
        })?;
        let version = semver::Version::parse(&chart_version).context(
            UnpinnedChartVersionSnafu {
                version: &chart_version,
            },
        )?;

        ensure!(apply_timeout_seconds > 0, ZeroApplyTimeoutSnafu);

        if let Some(database) = &database {
            for (key, value) in [
                ("database.name", &database.name),
                ("database.user", &database.user),
                ("database.storage", &database.storage),
                ("database.image", &database.image),
            ] {
                validation::is_not_blank(value).context(InvalidNameSnafu { key, value })?;
            }
        }

        Ok(StackSpec {
            namespace,
            release_name,
            chart: ChartSource {
                repo_url,
                name: chart,
                version,
            },
            app_image_tag,
            airbyte_url,
            apply_timeout: Duration::from_secs(apply_timeout_seconds),
            cluster_domain: cluster_domain.trim_end_matches('.').to_owned(),
            topology: Topology::from(database),
        })
    }
}

/// A validated stack configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSpec {
    pub namespace: String,
    pub release_name: String,
    pub chart: ChartSource,
    pub app_image_tag: String,
    pub airbyte_url: String,
    pub apply_timeout: Duration,
    pub cluster_domain: String,
    pub topology: Topology,
}

/// Coordinates of a chart in a Helm repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartSource {
    pub repo_url: Url,
    pub name: String,
    pub version: semver::Version,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    const MINIMAL: &str = indoc! {"
        namespace: airbyte
        repoUrl: https://airbytehq.github.io/helm-charts
        chart: airbyte
        chartVersion: 0.50.0
        appImageTag: 0.50.0
        airbyteUrl: http://localhost:8000
    "};

    fn parse(yaml: &str) -> StackConfig {
        serde_yaml::from_str(yaml).expect("invalid test input")
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let spec = parse(MINIMAL).validate().expect("config must be valid");

        assert_eq!(spec.namespace, "airbyte");
        assert_eq!(spec.release_name, "airbyte");
        assert_eq!(spec.chart.name, "airbyte");
        assert_eq!(spec.chart.version, semver::Version::new(0, 50, 0));
        assert_eq!(
            spec.chart.repo_url.as_str(),
            "https://airbytehq.github.io/helm-charts"
        );
        assert_eq!(spec.airbyte_url, "http://localhost:8000");
        assert_eq!(spec.apply_timeout, Duration::from_secs(1800));
        assert_eq!(spec.cluster_domain, "cluster.local");
        assert_eq!(spec.topology, Topology::Minimal);
    }

    #[test]
    fn database_block_selects_managed_topology() {
        let yaml = format!(
            "{MINIMAL}{}",
            indoc! {"
                database:
                  password:
                    file: /run/secrets/airbyte-db
            "}
        );
        let spec = parse(&yaml).validate().expect("config must be valid");

        let database = spec
            .topology
            .managed_database()
            .expect("database tier must be declared");
        assert_eq!(database.name, "db-airbyte");
    }

    #[test]
    fn missing_key_fails_to_parse() {
        let yaml = MINIMAL.replace("chart: airbyte\n", "");
        let error = serde_yaml::from_str::<StackConfig>(&yaml).expect_err("must fail");
        assert!(error.to_string().contains("missing field `chart`"));
    }

    #[test]
    fn unknown_key_fails_to_parse() {
        let yaml = format!("{MINIMAL}chartVerison: 0.50.1\n");
        assert!(serde_yaml::from_str::<StackConfig>(&yaml).is_err());
    }

    #[rstest]
    #[case("^0.50.0")]
    #[case("0.50")]
    #[case("latest")]
    #[case(">=0.50.0")]
    fn unpinned_chart_version_is_rejected(#[case] version: &str) {
        let mut config = parse(MINIMAL);
        config.chart_version = version.to_owned();

        let error = config.validate().expect_err("version must be rejected");
        assert!(matches!(error, Error::UnpinnedChartVersion { .. }));
    }

    #[rstest]
    #[case("1airbyte")]
    #[case("0-data")]
    #[case("airbyte-2")]
    fn namespace_may_start_with_digit(#[case] namespace: &str) {
        let mut config = parse(MINIMAL);
        config.namespace = namespace.to_owned();

        let spec = config.validate().expect("namespace must be accepted");
        assert_eq!(spec.namespace, namespace);
    }

    #[rstest]
    #[case::namespace_uppercase(|c: &mut StackConfig| c.namespace = "Airbyte".to_owned())]
    #[case::namespace_trailing_dash(|c: &mut StackConfig| c.namespace = "airbyte-".to_owned())]
    #[case::release_name(|c: &mut StackConfig| c.release_name = "air_byte".to_owned())]
    #[case::cluster_domain(|c: &mut StackConfig| c.cluster_domain = "cluster..local".to_owned())]
    #[case::blank_tag(|c: &mut StackConfig| c.app_image_tag = " ".to_owned())]
    #[case::blank_chart(|c: &mut StackConfig| c.chart = String::new())]
    fn invalid_names_are_rejected(#[case] mutate: fn(&mut StackConfig)) {
        let mut config = parse(MINIMAL);
        mutate(&mut config);

        let error = config.validate().expect_err("config must be rejected");
        assert!(matches!(error, Error::InvalidName { .. }));
    }

    #[rstest]
    #[case::repo_url(|c: &mut StackConfig| c.repo_url = "airbytehq.github.io".to_owned())]
    #[case::airbyte_url(|c: &mut StackConfig| c.airbyte_url = "not a url".to_owned())]
    fn invalid_urls_are_rejected(#[case] mutate: fn(&mut StackConfig)) {
        let mut config = parse(MINIMAL);
        mutate(&mut config);

        let error = config.validate().expect_err("config must be rejected");
        assert!(matches!(error, Error::InvalidUrl { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = parse(MINIMAL);
        config.apply_timeout_seconds = 0;

        assert!(matches!(config.validate(), Err(Error::ZeroApplyTimeout)));
    }

    #[test]
    fn loads_stack_file_from_directory() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::write(dir.path().join("dev.yaml"), MINIMAL).expect("failed to write stack file");

        let config = StackConfig::load(dir.path(), "dev").expect("stack file must load");
        assert_eq!(config, parse(MINIMAL));

        let error = StackConfig::load(dir.path(), "prod").expect_err("missing stack must fail");
        assert!(matches!(error, Error::ReadConfig { .. }));
    }
}
