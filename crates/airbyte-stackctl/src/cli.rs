use std::path::PathBuf;

use airbyte_stack::helm::DEFAULT_HELM_BINARY;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Declares and applies Airbyte stacks on Kubernetes")]
pub struct Cli {
    #[command(flatten)]
    pub stack: StackArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct StackArgs {
    /// Name of the stack, selects `<config-dir>/<stack>.yaml`.
    #[arg(long, global = true, env = "AIRBYTE_STACK", default_value = "dev")]
    pub stack: String,

    /// Directory holding the stack files.
    #[arg(long, global = true, env = "AIRBYTE_STACK_CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every manifest of the stack as multi-document YAML, in apply order.
    Render,

    /// Print the value set passed to the chart.
    Values,

    /// Print the apply layers and the dependencies of every resource.
    Plan,

    /// Print the stack outputs as JSON.
    Outputs,

    /// Apply the stack to the current cluster.
    Apply(HelmArgs),

    /// Remove everything the stack declares from the current cluster.
    Destroy(HelmArgs),
}

#[derive(Debug, Args)]
pub struct HelmArgs {
    /// Helm binary used to manage the release.
    #[arg(long, env = "AIRBYTE_STACK_HELM", default_value = DEFAULT_HELM_BINARY)]
    pub helm_binary: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn apply_takes_helm_binary() {
        let cli = Cli::try_parse_from([
            "airbyte-stackctl",
            "--stack",
            "prod",
            "apply",
            "--helm-binary",
            "/usr/local/bin/helm",
        ])
        .expect("arguments must parse");

        assert_eq!(cli.stack.stack, "prod");
        match cli.command {
            Command::Apply(helm) => {
                assert_eq!(helm.helm_binary, PathBuf::from("/usr/local/bin/helm"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
