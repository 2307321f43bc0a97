use serde::{Deserialize, Serialize};

use crate::secret::SecretSource;

/// The shape of a stack.
///
/// Both variants share every declaration that does not involve the database, so there
/// is exactly one code path per resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Topology {
    /// Only the namespace and the release. The chart runs its bundled database.
    Minimal,

    /// A self-hosted PostgreSQL tier is declared next to the release and the chart's
    /// bundled database is switched off.
    WithManagedDatabase(ManagedDatabase),
}

impl Topology {
    pub fn managed_database(&self) -> Option<&ManagedDatabase> {
        match self {
            Self::Minimal => None,
            Self::WithManagedDatabase(database) => Some(database),
        }
    }
}

impl From<Option<ManagedDatabase>> for Topology {
    fn from(database: Option<ManagedDatabase>) -> Self {
        database.map_or(Self::Minimal, Self::WithManagedDatabase)
    }
}

/// Settings of the self-hosted database tier, as written in the `database` block of a
/// stack file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManagedDatabase {
    #[serde(default = "ManagedDatabase::default_name")]
    pub name: String,

    #[serde(default = "ManagedDatabase::default_user")]
    pub user: String,

    /// Where the database password is read from when the stack is declared.
    pub password: SecretSource,

    /// Requested capacity of the data volume.
    #[serde(default = "ManagedDatabase::default_storage")]
    pub storage: String,

    /// Leave unset to use the cluster's default storage class.
    #[serde(default)]
    pub storage_class_name: Option<String>,

    #[serde(default = "ManagedDatabase::default_image")]
    pub image: String,
}

impl ManagedDatabase {
    fn default_name() -> String {
        "db-airbyte".to_owned()
    }

    fn default_user() -> String {
        "airbyte_user".to_owned()
    }

    fn default_storage() -> String {
        "10Gi".to_owned()
    }

    fn default_image() -> String {
        "postgres:13".to_owned()
    }
}
