//! References to secret material that is resolved when a stack is declared.
//!
//! Stack files never contain credentials. They name an environment variable or a file
//! that holds the value instead.

use std::{env, fs, path::PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("environment variable {var:?} holding a secret is not set"))]
    EnvNotSet { source: env::VarError, var: String },

    #[snafu(display("failed to read secret file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("secret resolved from {origin} is empty"))]
    EmptySecret { origin: String },
}

/// Where a secret value comes from.
///
/// ```yaml
/// password:
///   env: AIRBYTE_DB_PASSWORD
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretSource {
    /// Read the value from an environment variable of the process.
    Env(String),

    /// Read the value from a file. A single trailing newline is stripped.
    File(PathBuf),
}

impl SecretSource {
    pub fn resolve(&self) -> Result<SecretString, Error> {
        let value = match self {
            Self::Env(var) => {
                debug!(var, "resolving secret from environment");
                env::var(var).context(EnvNotSetSnafu { var })?
            }
            Self::File(path) => {
                debug!(path = %path.display(), "resolving secret from file");
                let mut value = fs::read_to_string(path).context(ReadFileSnafu { path })?;
                if value.ends_with('\n') {
                    value.pop();
                    if value.ends_with('\r') {
                        value.pop();
                    }
                }
                value
            }
        };

        ensure!(
            !value.is_empty(),
            EmptySecretSnafu {
                origin: self.to_string()
            }
        );

        Ok(SecretString::from(value))
    }
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env(var) => write!(f, "environment variable {var:?}"),
            Self::File(path) => write!(f, "file {:?}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn resolves_from_file_without_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
        writeln!(file, "s3cr3t").expect("failed to write temp file");

        let secret = SecretSource::File(file.path().to_owned())
            .resolve()
            .expect("secret must resolve");

        assert_eq!(secret.expose_secret(), "s3cr3t");
    }

    #[test]
    fn resolves_from_env() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            env::set_var("AIRBYTE_STACK_TEST_SECRET_RESOLVES", "from-env");
        }

        let secret = SecretSource::Env("AIRBYTE_STACK_TEST_SECRET_RESOLVES".to_owned())
            .resolve()
            .expect("secret must resolve");

        assert_eq!(secret.expose_secret(), "from-env");
    }

    #[test]
    fn missing_env_is_an_error() {
        let error = SecretSource::Env("AIRBYTE_STACK_TEST_SECRET_MISSING".to_owned())
            .resolve()
            .expect_err("unset variable must fail");

        assert!(matches!(error, Error::EnvNotSet { .. }));
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().expect("failed to create temp file");

        let error = SecretSource::File(file.path().to_owned())
            .resolve()
            .expect_err("empty file must fail");

        assert!(matches!(error, Error::EmptySecret { .. }));
    }

    #[test]
    fn deserializes_from_yaml() {
        let source: SecretSource =
            serde_yaml::from_str("env: AIRBYTE_DB_PASSWORD").expect("invalid test input");
        assert_eq!(source, SecretSource::Env("AIRBYTE_DB_PASSWORD".to_owned()));

        let source: SecretSource =
            serde_yaml::from_str("file: /run/secrets/db").expect("invalid test input");
        assert_eq!(source, SecretSource::File(PathBuf::from("/run/secrets/db")));
    }
}
