//! Declares, renders and applies an Airbyte deployment on Kubernetes.
//!
//! A stack is described by one YAML file (see [`config::StackConfig`]). Validating it
//! yields a [`config::StackSpec`], from which [`stack::Stack::declare`] builds the
//! dependency graph of every resource plus the stack outputs.

pub mod apply;
pub mod builder;
pub mod client;
pub mod config;
pub mod graph;
pub mod helm;
pub mod logging;
pub mod outputs;
pub mod resources;
pub mod secret;
pub mod stack;
pub mod topology;
pub mod validation;
pub mod values;
pub mod yaml;

use snafu::Snafu;

/// Errors of loading and declaring a stack, for callers that only forward them.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(context(false), display("invalid stack configuration"))]
    Config { source: config::Error },

    #[snafu(context(false), display("failed to declare stack"))]
    Stack { source: stack::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
