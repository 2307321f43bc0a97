//! Builders for the Kubernetes objects a stack declares.
//!
//! They are not _pure_ builders: some fill in the labels every object of a stack carries.
use snafu::Snafu;

pub mod configmap;
pub mod meta;
pub mod probe;
pub mod secret;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("object is missing key {key:?}"))]
    MissingObjectKey { key: &'static str },

    #[snafu(display("probe {field} of {seconds}s does not fit into the Kubernetes API"))]
    ProbeDurationOutOfRange { field: &'static str, seconds: u64 },
}
