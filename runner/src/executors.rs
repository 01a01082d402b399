mod dry_run;
mod local;
mod slurm;

#[cfg(test)]
mod executors_test;

pub use dry_run::DryRunExecutor;
pub use local::LocalExecutor;
pub use slurm::SlurmExecutor;

use crate::config::{ConfigErrors, ExecutorConfig};
use itertools::Itertools;
use std::{
    collections::BTreeMap,
    ffi::OsString,
    io,
    path::PathBuf,
    process::{Child, ExitStatus},
    thread::{self, JoinHandle},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for {program}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to prepare job output {}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{program} ran into timeout after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("{program} rejected the job ({status}): {stderr}")]
    Rejected {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Unable to read a job id from {0:?}")]
    UnparsableJobId(String),
}

/// A single batch job, the equivalent of one `sbatch` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommand {
    pub job_name: String,
    pub nodes: u32,
    pub tasks_per_node: u32,
    pub mem_per_cpu: String,
    pub time: String,
    pub account: Option<String>,
    pub partition: Option<String>,
    pub output: PathBuf,
    pub error: PathBuf,
    pub mail_type: Option<String>,
    pub mail_user: Option<String>,
    pub script: PathBuf,
}

impl BatchCommand {
    /// `sbatch` arguments, the script comes last
    pub fn sbatch_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-J".into(),
            self.job_name.clone().into(),
            "-N".into(),
            self.nodes.to_string().into(),
            "--ntasks-per-node".into(),
            self.tasks_per_node.to_string().into(),
            "--mem-per-cpu".into(),
            self.mem_per_cpu.clone().into(),
            format!("--time={}", self.time).into(),
        ];

        if let Some(account) = &self.account {
            args.extend([OsString::from("-A"), OsString::from(account)]);
        }
        if let Some(partition) = &self.partition {
            args.extend([OsString::from("-p"), OsString::from(partition)]);
        }

        args.extend([
            OsString::from("--output"),
            self.output.clone().into_os_string(),
            OsString::from("--error"),
            self.error.clone().into_os_string(),
        ]);

        if let Some(mail_type) = &self.mail_type {
            args.push(format!("--mail-type={mail_type}").into());
        }
        if let Some(mail_user) = &self.mail_user {
            args.push(format!("--mail-user={mail_user}").into());
        }

        args.push(self.script.clone().into_os_string());
        args
    }

    /// human readable command line, only meant for logs
    pub fn render(&self, program: &str) -> String {
        std::iter::once(program.to_string())
            .chain(
                self.sbatch_args()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned()),
            )
            .join(" ")
    }

    /// total number of processes of the job
    pub fn processes(&self) -> u32 {
        self.nodes * self.tasks_per_node
    }
}

/// What became of a submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobHandle {
    /// queued by the batch system
    Submitted { id: String },
    /// already ran to completion, `None` if it was killed by a signal
    Completed { status: Option<i32> },
    /// only logged
    DryRun,
}

/// Anything able to hand batch jobs to a batch system
pub trait Executor {
    fn submit(&mut self, command: &BatchCommand) -> Result<JobHandle, ExecutorError>;
}

#[derive(Debug)]
pub enum Executors {
    Slurm(SlurmExecutor),
    Local(LocalExecutor),
    DryRun(DryRunExecutor),
}

impl Executors {
    pub fn load(config: &ExecutorConfig) -> Result<Self, ConfigErrors> {
        match config.name.to_lowercase().as_str() {
            "slurm" => Ok(Self::Slurm(SlurmExecutor::load(&config.parameter)?)),
            "local" => Ok(Self::Local(LocalExecutor::load(&config.parameter)?)),
            "dry-run" | "dry_run" => Ok(Self::DryRun(DryRunExecutor::default())),
            _ => Err(ConfigErrors::UnsupportedExecutor(config.name.clone())),
        }
    }
}

impl Executor for Executors {
    fn submit(&mut self, command: &BatchCommand) -> Result<JobHandle, ExecutorError> {
        match self {
            Self::Slurm(executor) => executor.submit(command),
            Self::Local(executor) => executor.submit(command),
            Self::DryRun(executor) => executor.submit(command),
        }
    }
}

/// `timeout` parameter in seconds
fn timeout_parameter(
    parameter: &BTreeMap<String, serde_yaml::Value>,
) -> Result<Option<Duration>, ConfigErrors> {
    match parameter.get("timeout") {
        Some(value) => match value.as_u64() {
            Some(seconds) => Ok(Some(Duration::from_secs(seconds))),
            None => Err(ConfigErrors::InvalidParameter {
                name: "timeout".to_string(),
                reason: "must be a natural number of seconds".to_string(),
            }),
        },
        None => Ok(None),
    }
}

/// Read a child pipe on its own thread until the child closes it
///
/// The child never blocks on a full pipe while we wait for it. Read failures
/// only cost the diagnostics.
fn spawn_drain<R: io::Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();

        if let Some(mut pipe) = pipe {
            if let Err(error) = pipe.read_to_string(&mut buffer) {
                debug!(error = ?error, "Failed to read child output");
            }
        }

        buffer
    })
}

fn join_drain(reader: JoinHandle<String>) -> String {
    reader.join().unwrap_or_else(|_| {
        warn!("Child output reader panicked");
        String::new()
    })
}

/// Kill a child that ran into its timeout and reap it
fn kill_and_reap(child: &mut Child, program: &str) {
    if let Err(error) = child.kill() {
        warn!(error = ?error, "Failed to kill {program}");
    }

    if let Err(error) = child.wait() {
        warn!(error = ?error, "Failed to reap {program}");
    }
}
