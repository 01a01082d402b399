mod campaign;
mod config;
mod executors;

#[cfg(test)]
mod campaign_test;

use crate::{
    campaign::{batch_commands, benchmark_commands, run_benchmarks, NodeEnv},
    config::{ConfigErrors, LabConfig},
    executors::{Executor, ExecutorError, Executors, JobHandle},
};
use arlab_analysis::{merge_all, MergeError};
use arlab_ingest::{Demultiplexer, IngestError, KeyOrder};
use clap::{ArgAction, Parser, Subcommand};
use std::{
    error::Error as _,
    fs::File,
    io::{self, BufReader, BufWriter},
    path::PathBuf,
    process::ExitCode,
};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Lab tooling for distributed benchmark runs")]
struct Cli {
    /// YAML config, defaults to ./arlab.yaml if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// raise log verbosity, repeat for trace output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a node tagged log into one section per node
    Split {
        /// log file, stdin if omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// destination, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// `numeric` or `lexicographic`
        #[arg(long)]
        key_order: Option<KeyOrder>,
    },
    /// Merge per node result parts into one file per test case
    Merge {
        #[arg(long)]
        parts_dir: Option<PathBuf>,
        #[arg(long)]
        results_dir: Option<PathBuf>,
        /// number of nodes that wrote parts
        #[arg(short, long)]
        nodes: Option<u32>,
        /// number of test cases
        #[arg(short, long)]
        test_cases: Option<u32>,
        /// merge test cases on this many threads
        #[arg(short, long)]
        jobs: Option<usize>,
        /// merge the remaining test cases after a failure
        #[arg(short, long)]
        keep_going: bool,
    },
    /// Submit one batch job per node count of a test
    Submit {
        test: String,
        /// only log the sbatch calls
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the benchmark runs of a test for this node
    Commands { test: String },
    /// Execute the benchmark runs of a test for this node
    Run { test: String },
}

#[derive(Error, Debug)]
enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("Failed to open {}", .0.display())]
    Open(PathBuf, #[source] io::Error),
    #[error("{failed} of {total} test cases could not be merged")]
    IncompleteMerge { failed: usize, total: usize },
    #[error("{failed} of {total} benchmark runs failed")]
    BenchmarksFailed { failed: usize, total: usize },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn split(
    config: &LabConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    key_order: Option<KeyOrder>,
) -> Result<(), RunnerError> {
    let order = key_order.unwrap_or(config.split.key_order);
    let mut demultiplexer = Demultiplexer::new();

    match input {
        Some(path) => {
            let file = File::open(&path).map_err(|error| RunnerError::Open(path, error))?;
            demultiplexer.extend_from_reader(BufReader::new(file))?;
        }
        None => demultiplexer.extend_from_reader(io::stdin().lock())?,
    }

    let summary = demultiplexer.summary();
    info!(
        lines = summary.lines,
        tagged = summary.tagged_lines,
        buckets = summary.buckets,
        "Split log input"
    );
    if summary.orphan_prefixes > 0 {
        warn!(
            "{} tagged lines started with untagged text, see the (???) marks in _",
            summary.orphan_prefixes
        );
    }

    match output {
        Some(path) => {
            let file = File::create(&path).map_err(|error| RunnerError::Open(path, error))?;
            demultiplexer.write_report(&mut BufWriter::new(file), order)?;
        }
        None => demultiplexer.write_report(&mut BufWriter::new(io::stdout().lock()), order)?,
    }

    Ok(())
}

fn submit(config: &LabConfig, test: &str, dry_run: bool) -> Result<(), RunnerError> {
    let campaign = config.campaign(test)?;
    let mut executor = if dry_run {
        Executors::DryRun(Default::default())
    } else {
        Executors::load(&config.executor)?
    };

    for command in batch_commands(test, campaign, &config.batch) {
        match executor.submit(&command)? {
            JobHandle::Submitted { id } => info!(nodes = command.nodes, "Submitted job {id}"),
            JobHandle::Completed { status } => {
                info!(nodes = command.nodes, status = ?status, "Job completed")
            }
            JobHandle::DryRun => {}
        }
    }

    if let Executors::DryRun(executor) = &executor {
        info!(
            "Dry run done, {} jobs would have been submitted",
            executor.submitted().len()
        );
    }

    Ok(())
}

fn run(cli: Cli) -> Result<(), RunnerError> {
    let mut config = LabConfig::load(cli.config.as_deref())?;

    if let Commands::Merge {
        parts_dir,
        results_dir,
        nodes,
        test_cases,
        jobs,
        keep_going,
    } = &cli.command
    {
        let merge = &mut config.merge;
        if let Some(parts_dir) = parts_dir {
            merge.parts_dir = parts_dir.clone();
        }
        if let Some(results_dir) = results_dir {
            merge.results_dir = results_dir.clone();
        }
        merge.node_count = nodes.unwrap_or(merge.node_count);
        merge.test_cases = test_cases.unwrap_or(merge.test_cases);
        merge.jobs = jobs.unwrap_or(merge.jobs);
        merge.keep_going |= *keep_going;
    }

    if config.preflight_checks() {
        return Err(ConfigErrors::Preflight.into());
    }

    match cli.command {
        Commands::Split {
            input,
            output,
            key_order,
        } => split(&config, input, output, key_order),
        Commands::Merge { .. } => {
            let report = merge_all(&config.merge.layout(), &config.merge.options())?;

            if report.is_complete() {
                Ok(())
            } else {
                Err(RunnerError::IncompleteMerge {
                    failed: report.failed.len(),
                    total: config.merge.test_cases as usize,
                })
            }
        }
        Commands::Submit { test, dry_run } => submit(&config, &test, dry_run),
        Commands::Commands { test } => {
            let campaign = config.campaign(&test)?;

            for command in benchmark_commands(campaign, &NodeEnv::detect()) {
                println!("{command}");
            }

            Ok(())
        }
        Commands::Run { test } => {
            let campaign = config.campaign(&test)?;
            let env = NodeEnv::detect();
            info!(
                node = env.node_id,
                processes = env.process_count,
                "Running test {test}"
            );

            let commands = benchmark_commands(campaign, &env);
            let summary = run_benchmarks(&commands);
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Done with test {test}"
            );

            if summary.failed == 0 {
                Ok(())
            } else {
                Err(RunnerError::BenchmarksFailed {
                    failed: summary.failed,
                    total: commands.len(),
                })
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(run_error) => {
            error!("{run_error}");

            let mut source = run_error.source();
            while let Some(cause) = source {
                error!("  caused by: {cause}");
                source = cause.source();
            }

            ExitCode::FAILURE
        }
    }
}
