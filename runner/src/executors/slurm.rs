use super::{
    join_drain, kill_and_reap, spawn_drain, timeout_parameter, BatchCommand, Executor,
    ExecutorError, JobHandle,
};
use crate::config::ConfigErrors;
use std::{
    collections::BTreeMap,
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

const SUBMITTED_PREFIX: &str = "Submitted batch job ";

/// Hands jobs to SLURM through `sbatch`
#[derive(Debug, Clone)]
pub struct SlurmExecutor {
    sbatch: String,
    timeout: Duration,
}

impl SlurmExecutor {
    pub fn load(parameter: &BTreeMap<String, serde_yaml::Value>) -> Result<Self, ConfigErrors> {
        let sbatch = match parameter.get("sbatch") {
            Some(value) => match value.as_str() {
                Some(value) => value.to_string(),
                None => {
                    warn!("Executor parameter sbatch must be a string");
                    return Err(ConfigErrors::InvalidParameter {
                        name: "sbatch".to_string(),
                        reason: "must be a path to the sbatch binary".to_string(),
                    });
                }
            },
            None => "sbatch".to_string(),
        };

        Ok(Self {
            sbatch,
            timeout: timeout_parameter(parameter)?.unwrap_or(Duration::from_secs(60)),
        })
    }
}

impl Executor for SlurmExecutor {
    #[instrument(skip(self, command), fields(job = %command.job_name, nodes = command.nodes), level = "info")]
    fn submit(&mut self, command: &BatchCommand) -> Result<JobHandle, ExecutorError> {
        info!("{}", command.render(&self.sbatch));

        let mut child = Command::new(&self.sbatch)
            .args(command.sbatch_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                program: self.sbatch.clone(),
                source,
            })?;

        let stdout = spawn_drain(child.stdout.take());
        let stderr = spawn_drain(child.stderr.take());

        let waited = child.wait_timeout(self.timeout);
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                // child hasn't exited yet, the readers finish on their own
                kill_and_reap(&mut child, &self.sbatch);

                return Err(ExecutorError::Timeout {
                    program: self.sbatch.clone(),
                    timeout: self.timeout,
                });
            }
            Err(source) => {
                kill_and_reap(&mut child, &self.sbatch);

                return Err(ExecutorError::Wait {
                    program: self.sbatch.clone(),
                    source,
                });
            }
        };

        let stdout = join_drain(stdout);
        let stderr = join_drain(stderr);

        if !status.success() {
            return Err(ExecutorError::Rejected {
                program: self.sbatch.clone(),
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        let id = parse_job_id(&stdout)?;
        debug!(id = %id, "Job submitted");

        Ok(JobHandle::Submitted { id })
    }
}

/// Job id from `Submitted batch job <id>` or `--parsable` output (`<id>[;cluster]`)
pub fn parse_job_id(output: &str) -> Result<String, ExecutorError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    let id = match line.strip_prefix(SUBMITTED_PREFIX) {
        Some(rest) => rest.trim(),
        None => line.split(';').next().unwrap_or_default(),
    };

    if !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit()) {
        Ok(id.to_string())
    } else {
        Err(ExecutorError::UnparsableJobId(output.to_string()))
    }
}
