//! Runs the `helm` binary for a [`HelmRelease`].

use std::{path::PathBuf, process::Stdio, time::Duration};

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tokio::{io::AsyncWriteExt, process::Command, time::timeout};
use tracing::{debug, info, instrument};

use crate::{resources::release::HelmRelease, values};

pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Time granted on top of a release's own timeout, which only bounds helm's wait for the
/// workloads and not the chart download before it.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to render values of release {release:?}"))]
    RenderValues {
        source: values::Error,
        release: String,
    },

    #[snafu(display("failed to spawn {}", binary.display()))]
    Spawn {
        source: std::io::Error,
        binary: PathBuf,
    },

    #[snafu(display("failed to pass values to helm"))]
    WriteValues { source: std::io::Error },

    #[snafu(display("failed to wait for helm"))]
    Wait { source: std::io::Error },

    #[snafu(display("helm {command} of release {release:?} did not finish within {deadline:?}"))]
    TimedOut {
        command: &'static str,
        release: String,
        deadline: Duration,
    },

    #[snafu(display("helm {command} of release {release:?} failed ({status}): {stderr}"))]
    CommandFailed {
        command: &'static str,
        release: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Installs and removes releases through the `helm` command line tool.
#[derive(Clone, Debug)]
pub struct HelmCli {
    binary: PathBuf,
    timeout_margin: Duration,
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
        }
    }

    /// Overrides [`DEFAULT_TIMEOUT_MARGIN`].
    pub fn with_timeout_margin(mut self, timeout_margin: Duration) -> Self {
        self.timeout_margin = timeout_margin;
        self
    }

    /// Installs or upgrades `release` and waits until its workloads are ready or the
    /// release timeout expires.
    #[instrument(skip(self, release), fields(release = %release.name, version = %release.version))]
    pub async fn upgrade_install(&self, release: &HelmRelease) -> Result<(), Error> {
        let values = release.values.to_yaml().context(RenderValuesSnafu {
            release: &release.name,
        })?;
        self.run("upgrade", release, &release.upgrade_install_args(), Some(values))
            .await?;
        info!("release installed");
        Ok(())
    }

    /// Removes `release`. A release that is not installed counts as removed.
    #[instrument(skip(self, release), fields(release = %release.name))]
    pub async fn uninstall(&self, release: &HelmRelease) -> Result<(), Error> {
        match self
            .run("uninstall", release, &release.uninstall_args(), None)
            .await
        {
            Ok(()) => info!("release uninstalled"),
            Err(Error::CommandFailed { stderr, .. }) if is_release_not_found(&stderr) => {
                info!("release already gone")
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Every helm invocation is killed once this much time has passed.
    fn deadline(&self, release: &HelmRelease) -> Duration {
        release.timeout + self.timeout_margin
    }

    async fn run(
        &self,
        command: &'static str,
        release: &HelmRelease,
        args: &[String],
        stdin: Option<String>,
    ) -> Result<(), Error> {
        debug!(binary = %self.binary.display(), ?args, "running helm");
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context(SpawnSnafu {
                binary: &self.binary,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .context(WriteValuesSnafu)?;
            // Closing stdin signals the end of the values document.
            drop(pipe);
        }

        // Dropping the timed out future drops the child, which kills it.
        let deadline = self.deadline(release);
        let output = timeout(deadline, child.wait_with_output())
            .await
            .ok()
            .context(TimedOutSnafu {
                command,
                release: &release.name,
                deadline,
            })?
            .context(WaitSnafu)?;
        ensure!(
            output.status.success(),
            CommandFailedSnafu {
                command,
                release: &release.name,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
        );
        Ok(())
    }
}

fn is_release_not_found(stderr: &str) -> bool {
    stderr.contains("release: not found")
}
