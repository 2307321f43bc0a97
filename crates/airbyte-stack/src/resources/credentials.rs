//! The Secret that publishes database credentials and the connection string.
//!
//! Airbyte reads the hyphenated keys while operator tooling expects upper snake case,
//! so every value is stored under both names.

use secrecy::{ExposeSecret, SecretString};
use snafu::{ResultExt, Snafu};

use crate::{
    builder::{self, meta::ObjectMetaBuilder, secret::SecretBuilder},
    config::StackSpec,
    resources::{DeclaredResource, Manifest, ResourceId, database::DatabaseEndpoint},
    secret,
    topology::ManagedDatabase,
};

pub const SECRET_NAME: &str = "airbyte-db-secret";

pub const USER_KEY: &str = "DATABASE_USER";
pub const PASSWORD_KEY: &str = "DATABASE_PASSWORD";
pub const URL_KEY: &str = "DATABASE_URL";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve the database password from {source_ref}"))]
    ResolvePassword {
        source: secret::Error,
        source_ref: String,
    },

    #[snafu(display("failed to build credentials secret"))]
    BuildSecret { source: builder::Error },
}

/// Database credentials with the password already resolved.
#[derive(Clone, Debug)]
pub struct DatabaseCredentials {
    pub user: String,
    pub password: SecretString,
}

impl DatabaseCredentials {
    pub fn resolve(database: &ManagedDatabase) -> Result<Self, Error> {
        let password = database
            .password
            .resolve()
            .context(ResolvePasswordSnafu {
                source_ref: database.password.to_string(),
            })?;

        Ok(Self {
            user: database.user.clone(),
            password,
        })
    }
}

/// Returns the hyphenated variant of an upper snake case key, e.g. `database-url` for
/// `DATABASE_URL`.
pub fn hyphenated(key: &str) -> String {
    key.to_lowercase().replace('_', "-")
}

/// JDBC URL of `database` behind `endpoint`.
pub fn jdbc_url(endpoint: &DatabaseEndpoint, database: &str) -> String {
    format!(
        "jdbc:postgresql://{host}:{port}/{database}",
        host = endpoint.host,
        port = endpoint.port
    )
}

/// Declares the credentials Secret. `service` must identify the Service `endpoint` was
/// derived from, since the connection string is only valid once it exists.
pub fn declare(
    spec: &StackSpec,
    database: &ManagedDatabase,
    endpoint: &DatabaseEndpoint,
    credentials: &DatabaseCredentials,
    namespace: &ResourceId,
    service: &ResourceId,
) -> Result<DeclaredResource, Error> {
    let url = jdbc_url(endpoint, &database.name);
    let mut builder = SecretBuilder::new();
    builder.metadata(
        ObjectMetaBuilder::new()
            .name(SECRET_NAME)
            .namespace(&spec.namespace)
            .with_recommended_labels(&spec.release_name)
            .build(),
    );

    for (key, value) in [
        (USER_KEY, credentials.user.as_str()),
        (PASSWORD_KEY, credentials.password.expose_secret()),
        (URL_KEY, url.as_str()),
    ] {
        builder
            .add_string_data(key, value)
            .add_string_data(hyphenated(key), value);
    }

    let secret = builder.build().context(BuildSecretSnafu)?;

    Ok(DeclaredResource::new(SECRET_NAME, Manifest::Secret(secret))
        .reading(namespace)
        .reading(service))
}
