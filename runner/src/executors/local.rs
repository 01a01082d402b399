use super::{kill_and_reap, timeout_parameter, BatchCommand, Executor, ExecutorError, JobHandle};
use crate::config::ConfigErrors;
use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::Path,
    process::{Command, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument};
use wait_timeout::ChildExt;

/// Runs the batch script right away on this machine, pretending to be node 0
/// of the requested allocation
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Option<Duration>,
}

fn open_log(path: &Path) -> Result<File, ExecutorError> {
    let output_error = |source: std::io::Error| ExecutorError::Output {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(output_error)?;
    }

    File::create(path).map_err(output_error)
}

impl LocalExecutor {
    pub fn load(parameter: &BTreeMap<String, serde_yaml::Value>) -> Result<Self, ConfigErrors> {
        Ok(Self {
            timeout: timeout_parameter(parameter)?,
        })
    }
}

impl Executor for LocalExecutor {
    /// run the script and wait for it, stdout and stderr go to the job logs
    #[instrument(skip(self, command), fields(job = %command.job_name, nodes = command.nodes), level = "info")]
    fn submit(&mut self, command: &BatchCommand) -> Result<JobHandle, ExecutorError> {
        let program = command.script.to_string_lossy().into_owned();
        let start = Instant::now();

        let mut child = Command::new(&command.script)
            .env("SLURM_JOB_NAME", &command.job_name)
            .env("SLURM_NODEID", "0")
            .env("SLURM_NNODES", command.nodes.to_string())
            .env("SLURM_NPROCS", command.processes().to_string())
            .stdin(Stdio::null())
            .stdout(open_log(&command.output)?)
            .stderr(open_log(&command.error)?)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                program: program.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        }
        .map_err(|source| ExecutorError::Wait {
            program: program.clone(),
            source,
        })?;

        match waited {
            Some(status) => {
                debug!(
                    "Finished in {} ns | status: {}",
                    start.elapsed().as_nanos(),
                    status.success()
                );
                info!(status = ?status.code(), "Local job done");

                Ok(JobHandle::Completed {
                    status: status.code(),
                })
            }
            None => {
                kill_and_reap(&mut child, &program);

                Err(ExecutorError::Timeout {
                    program,
                    timeout: self.timeout.unwrap_or_default(),
                })
            }
        }
    }
}
