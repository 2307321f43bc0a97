//! Declaration of a complete stack.

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, instrument};

use crate::{
    config::StackSpec,
    graph::{self, ResourceGraph},
    outputs::StackOutputs,
    resources::{
        DeclaredResource, Manifest,
        credentials::{self, DatabaseCredentials},
        database, namespace, release,
    },
    topology::Topology,
    values::{self, ChartValues},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to declare the database tier"))]
    DeclareDatabase { source: database::Error },

    #[snafu(display("failed to declare the database credentials"))]
    DeclareCredentials { source: credentials::Error },

    #[snafu(display("invalid chart values"))]
    InvalidValues { source: values::Error },

    #[snafu(display("invalid dependency graph"))]
    InvalidGraph { source: graph::Error },
}

/// Every resource of a stack together with the stack's outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Stack {
    graph: ResourceGraph,
    outputs: StackOutputs,
}

impl Stack {
    /// Declares all resources of `spec`.
    ///
    /// Secret references are resolved here. Declaring the same spec twice with the same
    /// secrets yields identical stacks.
    #[instrument(skip(spec), fields(namespace = %spec.namespace, release = %spec.release_name))]
    pub fn declare(spec: &StackSpec) -> Result<Self, Error> {
        let mut graph = ResourceGraph::new();

        let namespace = namespace::declare(spec);
        let namespace_id = namespace.id.clone();
        graph.add(namespace).context(InvalidGraphSnafu)?;

        let mut outputs = StackOutputs {
            namespace: spec.namespace.clone(),
            helm_release_name: spec.release_name.clone(),
            airbyte_url: spec.airbyte_url.clone(),
            database_endpoint: None,
            database_name: None,
        };

        let release = match &spec.topology {
            Topology::Minimal => {
                debug!("declaring minimal topology");
                release::declare(spec, ChartValues::minimal(spec), &namespace_id, &[])
            }
            Topology::WithManagedDatabase(database) => {
                debug!(database = %database.name, "declaring managed database topology");
                let credentials =
                    DatabaseCredentials::resolve(database).context(DeclareCredentialsSnafu)?;

                let tier = database::declare(spec, database, &credentials, &namespace_id)
                    .context(DeclareDatabaseSnafu)?;
                let endpoint = tier.endpoint.clone();
                let service_id = tier.service.id.clone();
                for resource in tier.into_resources() {
                    graph.add(resource).context(InvalidGraphSnafu)?;
                }

                let secret = credentials::declare(
                    spec,
                    database,
                    &endpoint,
                    &credentials,
                    &namespace_id,
                    &service_id,
                )
                .context(DeclareCredentialsSnafu)?;
                let secret_id = secret.id.clone();
                graph.add(secret).context(InvalidGraphSnafu)?;

                outputs.database_endpoint = Some(endpoint.address());
                outputs.database_name = Some(database.name.clone());

                release::declare(
                    spec,
                    ChartValues::with_external_database(spec, database, &endpoint),
                    &namespace_id,
                    &[&secret_id, &service_id],
                )
            }
        };

        if let Manifest::HelmRelease(release) = &release.manifest {
            release.values.validate().context(InvalidValuesSnafu)?;
        }
        graph.add(release).context(InvalidGraphSnafu)?;
        graph.validate().context(InvalidGraphSnafu)?;

        info!(resources = graph.len(), "stack declared");
        Ok(Self { graph, outputs })
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &StackOutputs {
        &self.outputs
    }

    /// The release of the stack. Every stack declares exactly one.
    pub fn release(&self) -> Option<&release::HelmRelease> {
        self.graph.resources().find_map(|resource| match &resource.manifest {
            Manifest::HelmRelease(release) => Some(release),
            _ => None,
        })
    }

    /// Resources in an order in which they can be applied.
    pub fn apply_order(&self) -> Result<Vec<&DeclaredResource>, Error> {
        self.graph.apply_order().context(InvalidGraphSnafu)
    }
}
