use crate::{
    config::{BatchConfig, TestCampaign},
    executors::BatchCommand,
};
use itertools::{iproduct, Itertools};
use std::{env, fmt, path::PathBuf, process::Command};
use tracing::{debug, error, info, warn};

/// Position of this process inside a batch allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEnv {
    pub node_id: u32,
    pub process_count: u32,
}

impl Default for NodeEnv {
    fn default() -> Self {
        Self {
            node_id: 0,
            process_count: 1,
        }
    }
}

impl NodeEnv {
    /// read the allocation from the SLURM environment, outside of a job this is
    /// node 0 of a single process run
    pub fn detect() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |name: &str| {
            lookup(name).and_then(|value| match value.trim().parse::<u32>() {
                Ok(number) => Some(number),
                Err(_) => {
                    warn!("Ignoring {name}={value:?}, not a number");
                    None
                }
            })
        };

        let defaults = Self::default();

        Self {
            node_id: number("SLURM_NODEID").unwrap_or(defaults.node_id),
            process_count: number("SLURM_NPROCS")
                .or_else(|| number("SLURM_NTASKS"))
                .unwrap_or(defaults.process_count),
        }
    }
}

/// One batch job per node count of the campaign
pub fn batch_commands(name: &str, campaign: &TestCampaign, batch: &BatchConfig) -> Vec<BatchCommand> {
    let logs_dir = batch.logs_dir.join(name);

    campaign
        .node_counts
        .iter()
        .map(|&nodes| BatchCommand {
            job_name: batch.job_name.clone(),
            nodes,
            tasks_per_node: campaign.tasks_per_node.unwrap_or(batch.tasks_per_node),
            mem_per_cpu: campaign
                .mem_per_cpu
                .clone()
                .unwrap_or_else(|| batch.mem_per_cpu.clone()),
            time: campaign.time.clone().unwrap_or_else(|| batch.time.clone()),
            account: batch.account.clone(),
            partition: campaign
                .partition
                .clone()
                .or_else(|| batch.partition.clone()),
            output: logs_dir.join(format!("{nodes}_nodes.so")),
            error: logs_dir.join(format!("{nodes}_nodes.se")),
            mail_type: batch.mail_type.clone(),
            mail_user: batch.mail_user.clone(),
            script: campaign.script.clone(),
        })
        .collect_vec()
}

/// A single invocation of a benchmark binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for BenchmarkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;

        for arg in &self.args {
            write!(f, " {arg}")?;
        }

        Ok(())
    }
}

/// Algorithms this node runs, the sequential ones only without peers
pub fn algorithms<'a>(campaign: &'a TestCampaign, env: &NodeEnv) -> Vec<&'a str> {
    let sequential = campaign
        .sequential_algorithms
        .iter()
        .filter(|_| env.process_count == 1);

    sequential
        .chain(campaign.algorithms.iter())
        .map(String::as_str)
        .collect_vec()
}

/// Every benchmark run of the campaign in execution order: workloads, then
/// algorithms, then repetitions
pub fn benchmark_commands(campaign: &TestCampaign, env: &NodeEnv) -> Vec<BenchmarkCommand> {
    let algorithms = algorithms(campaign, env);

    iproduct!(campaign.workloads.iter(), algorithms.iter())
        .flat_map(|(workload, algorithm)| {
            let mut args = vec![
                "-ts".to_string(),
                workload.time_steps.to_string(),
                "-n".to_string(),
                workload.grid_size.to_string(),
            ];
            if campaign.output {
                args.push("-o".to_string());
            }

            let command = BenchmarkCommand {
                program: campaign.build_dir.join(algorithm),
                args,
            };

            std::iter::repeat(command).take(campaign.repetitions as usize)
        })
        .collect_vec()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Run `commands` one after another
///
/// A failing run does not stop the following ones, it is only counted.
pub fn run_benchmarks(commands: &[BenchmarkCommand]) -> RunSummary {
    let mut summary = RunSummary::default();

    for (index, command) in commands.iter().enumerate() {
        info!("Running {}/{}: {command}", index + 1, commands.len());

        match Command::new(&command.program).args(&command.args).status() {
            Ok(status) if status.success() => {
                debug!("Finished {command}");
                summary.succeeded += 1;
            }
            Ok(status) => {
                error!(status = ?status.code(), "Benchmark {command} failed");
                summary.failed += 1;
            }
            Err(e) => {
                error!("Failed to start {command}: {e}");
                summary.failed += 1;
            }
        }
    }

    summary
}
