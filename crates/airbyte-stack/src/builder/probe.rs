use std::time::Duration;

use k8s_openapi::api::core::v1::{ExecAction, Probe};
use snafu::OptionExt;

use crate::builder::{Error, ProbeDurationOutOfRangeSnafu};

/// Builds an exec [`Probe`].
///
/// The command and the period are mandatory and enforced through the type parameters,
/// everything else starts at the Kubernetes default.
#[derive(Debug)]
pub struct ProbeBuilder<Action, Period> {
    action: Action,
    period: Period,

    success_threshold: i32,
    failure_threshold: i32,
    timeout: Duration,
    initial_delay: Duration,
}

impl Default for ProbeBuilder<(), ()> {
    fn default() -> Self {
        Self {
            action: (),
            period: (),
            // The following values match the Kubernetes default
            success_threshold: 1,
            failure_threshold: 3,
            timeout: Duration::from_secs(1),
            initial_delay: Duration::from_secs(0),
        }
    }
}

impl<Period> ProbeBuilder<(), Period> {
    /// This probe action executes the specified command inside the container.
    pub fn with_exec_action_helper(
        self,
        command: impl IntoIterator<Item = impl Into<String>>,
    ) -> ProbeBuilder<ExecAction, Period> {
        let Self {
            action: (),
            period,
            success_threshold,
            failure_threshold,
            timeout,
            initial_delay,
        } = self;

        ProbeBuilder {
            action: ExecAction {
                command: Some(command.into_iter().map(Into::into).collect()),
            },
            period,
            success_threshold,
            failure_threshold,
            timeout,
            initial_delay,
        }
    }
}

impl ProbeBuilder<ExecAction, ()> {
    /// The period/interval in which the probe should be executed.
    pub fn with_period(self, period: Duration) -> ProbeBuilder<ExecAction, Duration> {
        let Self {
            action,
            period: (),
            success_threshold,
            failure_threshold,
            timeout,
            initial_delay,
        } = self;

        ProbeBuilder {
            action,
            period,
            success_threshold,
            failure_threshold,
            timeout,
            initial_delay,
        }
    }
}

impl ProbeBuilder<ExecAction, Duration> {
    /// How long to wait after the container started before the first probe runs.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// How long a single probe may run before it counts as failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How often the probe must succeed before being considered successful.
    pub fn with_success_threshold(mut self, success_threshold: i32) -> Self {
        self.success_threshold = success_threshold;
        self
    }

    /// How often the probe must fail before being considered failed.
    pub fn with_failure_threshold(mut self, failure_threshold: i32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    pub fn build(self) -> Result<Probe, Error> {
        Ok(Probe {
            exec: Some(self.action),
            failure_threshold: Some(self.failure_threshold),
            initial_delay_seconds: Some(seconds("initialDelaySeconds", self.initial_delay)?),
            period_seconds: Some(seconds("periodSeconds", self.period)?),
            success_threshold: Some(self.success_threshold),
            timeout_seconds: Some(seconds("timeoutSeconds", self.timeout)?),
            ..Probe::default()
        })
    }
}

fn seconds(field: &'static str, duration: Duration) -> Result<i32, Error> {
    let seconds = duration.as_secs();
    seconds
        .try_into()
        .ok()
        .context(ProbeDurationOutOfRangeSnafu { field, seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_builder() {
        let probe = ProbeBuilder::default()
            .with_exec_action_helper(["pg_isready", "-U", "airbyte_user"])
            .with_period(Duration::from_secs(10))
            .with_initial_delay(Duration::from_secs(30))
            .with_timeout(Duration::from_secs(5))
            .build()
            .expect("probe must build");

        assert_eq!(
            probe,
            Probe {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "pg_isready".to_owned(),
                        "-U".to_owned(),
                        "airbyte_user".to_owned()
                    ])
                }),
                failure_threshold: Some(3),
                initial_delay_seconds: Some(30),
                period_seconds: Some(10),
                success_threshold: Some(1),
                timeout_seconds: Some(5),
                ..Probe::default()
            }
        );
    }

    #[test]
    fn out_of_range_duration_is_an_error() {
        let result = ProbeBuilder::default()
            .with_exec_action_helper(["true"])
            .with_period(Duration::from_secs(u64::MAX))
            .build();

        assert!(matches!(
            result,
            Err(Error::ProbeDurationOutOfRange {
                field: "periodSeconds",
                ..
            })
        ));
    }
}
