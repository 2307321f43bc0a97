use std::io::{self, Write as _};

use airbyte_stack::{
    apply::{self, Applier},
    client::Client,
    config::StackConfig,
    helm::HelmCli,
    logging,
    stack::Stack,
    yaml,
};
use clap::Parser;
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::cli::{Cli, Command};

mod cli;

const APP_NAME: &str = "airbyte-stackctl";
const LOG_ENV: &str = "AIRBYTE_STACK_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to load stack {stack:?}"))]
    LoadStack {
        source: airbyte_stack::Error,
        stack: String,
    },

    #[snafu(display("failed to render manifests"))]
    RenderManifests { source: airbyte_stack::yaml::Error },

    #[snafu(display("failed to render chart values"))]
    RenderValues { source: airbyte_stack::values::Error },

    #[snafu(display("failed to order the stack's resources"))]
    OrderResources { source: airbyte_stack::apply::Error },

    #[snafu(display("failed to write to stdout"))]
    WriteStdout { source: io::Error },

    #[snafu(display("failed to serialize outputs"))]
    SerializeOutputs { source: serde_json::Error },

    #[snafu(display("failed to connect to kubernetes"))]
    Connect { source: airbyte_stack::client::Error },

    #[snafu(display("failed to apply stack"))]
    Apply { source: airbyte_stack::apply::Error },

    #[snafu(display("failed to destroy stack"))]
    Destroy { source: airbyte_stack::apply::Error },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    logging::initialize_logging(LOG_ENV, APP_NAME).context(InitializeLoggingSnafu)?;

    let stack = load(&cli).context(LoadStackSnafu {
        stack: &cli.stack.stack,
    })?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Render => {
            yaml::render_stack(&mut stdout, &stack).context(RenderManifestsSnafu)?;
        }
        Command::Values => {
            let values = match stack.release() {
                Some(release) => release.values.to_yaml().context(RenderValuesSnafu)?,
                None => String::new(),
            };
            stdout
                .write_all(values.as_bytes())
                .context(WriteStdoutSnafu)?;
        }
        Command::Plan => print_plan(&mut stdout, &stack)?,
        Command::Outputs => {
            let outputs = stack.outputs().to_json().context(SerializeOutputsSnafu)?;
            writeln!(stdout, "{outputs}").context(WriteStdoutSnafu)?;
        }
        Command::Apply(helm) => {
            let applier = applier(HelmCli::new(helm.helm_binary)).await?;
            applier.apply(&stack).await.context(ApplySnafu)?;
            info!(outputs = ?stack.outputs(), "apply complete");
        }
        Command::Destroy(helm) => {
            let applier = applier(HelmCli::new(helm.helm_binary)).await?;
            applier.destroy(&stack).await.context(DestroySnafu)?;
        }
    }

    Ok(())
}

fn load(cli: &Cli) -> Result<Stack, airbyte_stack::Error> {
    let spec = StackConfig::load(&cli.stack.config_dir, &cli.stack.stack)?.validate()?;
    Ok(Stack::declare(&spec)?)
}

async fn applier(helm: HelmCli) -> Result<Applier, Error> {
    let client = Client::try_default().await.context(ConnectSnafu)?;
    Ok(Applier::new(client, helm))
}

fn print_plan(mut writer: impl io::Write, stack: &Stack) -> Result<(), Error> {
    let layers = apply::apply_sequence(stack).context(OrderResourcesSnafu)?;

    for (index, layer) in layers.iter().enumerate() {
        writeln!(writer, "layer {index}:").context(WriteStdoutSnafu)?;
        for resource in layer {
            if resource.depends_on.is_empty() {
                writeln!(writer, "  {}", resource.id).context(WriteStdoutSnafu)?;
            } else {
                let dependencies = resource
                    .depends_on
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(writer, "  {} <- {dependencies}", resource.id)
                    .context(WriteStdoutSnafu)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn plan_lists_layers_and_dependencies() {
        let spec = serde_yaml::from_str::<StackConfig>(indoc! {"
            namespace: airbyte
            repoUrl: https://airbytehq.github.io/helm-charts
            chart: airbyte
            chartVersion: 0.50.0
            appImageTag: 0.50.0
            airbyteUrl: http://localhost:8000
        "})
        .expect("invalid test input")
        .validate()
        .expect("config must be valid");
        let stack = Stack::declare(&spec).expect("stack must be declared");

        let mut plan = Vec::new();
        print_plan(&mut plan, &stack).expect("plan must be written");

        assert_eq!(
            String::from_utf8(plan).expect("plan must be UTF-8"),
            indoc! {"
                layer 0:
                  Namespace/airbyte-namespace
                layer 1:
                  HelmRelease/airbyte <- Namespace/airbyte-namespace
            "}
        );
    }
}
