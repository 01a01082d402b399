use arlab_analysis::{
    layout::{NODE_PLACEHOLDER, TEST_PLACEHOLDER},
    MergeOptions, RunFileLayout,
};
use arlab_ingest::KeyOrder;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG: &str = "arlab.yaml";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {}", .0.display())]
    ReadConfig(PathBuf, #[source] Error),
    #[error("Failed to parse config file")]
    ParseConfig(#[from] serde_yaml::Error),
    #[error("Executor not supported: {0}")]
    UnsupportedExecutor(String),
    #[error("Executor parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Test {0} is not defined")]
    UnknownTest(String),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
    #[error("Configuration contains errors, see the log for details")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct LabConfig {
    // merging of result parts into per test case results
    #[serde(default)]
    pub merge: MergeConfig,
    // splitting of node tagged logs
    #[serde(default)]
    pub split: SplitConfig,
    // how batch jobs are submitted
    #[serde(default)]
    pub executor: ExecutorConfig,
    // defaults for every batch job
    #[serde(default)]
    pub batch: BatchConfig,
    // benchmark campaigns by name
    #[serde(default)]
    pub tests: BTreeMap<String, TestCampaign>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    #[serde(default = "default_parts_dir")]
    pub parts_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_part_template")]
    pub part_template: String,
    #[serde(default = "default_result_template")]
    pub result_template: String,
    #[serde(default = "default_node_count")]
    pub node_count: u32,
    #[serde(default = "default_test_cases")]
    pub test_cases: u32,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub keep_going: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    #[serde(default)]
    pub key_order: KeyOrder,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // Name of the selected executor, see Executors::load for the selection process
    #[serde(default = "default_executor")]
    pub name: String,
    // parameters specific to the executor, e.g. `timeout` or `sbatch`
    #[serde(default)]
    pub parameter: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_job_name")]
    pub job_name: String,
    pub account: Option<String>,
    pub partition: Option<String>,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_mem_per_cpu")]
    pub mem_per_cpu: String,
    #[serde(default = "default_tasks_per_node")]
    pub tasks_per_node: u32,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    pub mail_type: Option<String>,
    pub mail_user: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    pub grid_size: u64,
    pub time_steps: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TestCampaign {
    // batch script submitted once per node count
    pub script: PathBuf,
    pub node_counts: Vec<u32>,
    // overrides of the batch defaults
    pub tasks_per_node: Option<u32>,
    pub time: Option<String>,
    pub mem_per_cpu: Option<String>,
    pub partition: Option<String>,
    #[serde(default)]
    pub workloads: Vec<Workload>,
    // algorithms run on any number of processes
    #[serde(default)]
    pub algorithms: Vec<String>,
    // algorithms only run when a single process takes part
    #[serde(default)]
    pub sequential_algorithms: Vec<String>,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    // pass `-o` so the benchmark dumps result parts
    #[serde(default)]
    pub output: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            parts_dir: default_parts_dir(),
            results_dir: default_results_dir(),
            part_template: default_part_template(),
            result_template: default_result_template(),
            node_count: default_node_count(),
            test_cases: default_test_cases(),
            jobs: default_jobs(),
            keep_going: false,
        }
    }
}

impl MergeConfig {
    pub fn layout(&self) -> RunFileLayout {
        RunFileLayout {
            parts_dir: self.parts_dir.clone(),
            results_dir: self.results_dir.clone(),
            part_template: self.part_template.clone(),
            result_template: self.result_template.clone(),
        }
    }

    pub fn options(&self) -> MergeOptions {
        MergeOptions {
            node_count: self.node_count,
            test_cases: self.test_cases,
            jobs: self.jobs,
            keep_going: self.keep_going,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: default_executor(),
            parameter: BTreeMap::new(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job_name: default_job_name(),
            account: None,
            partition: None,
            time: default_time(),
            mem_per_cpu: default_mem_per_cpu(),
            tasks_per_node: default_tasks_per_node(),
            logs_dir: default_logs_dir(),
            mail_type: None,
            mail_user: None,
        }
    }
}

impl LabConfig {
    /// Load `path`, or `arlab.yaml` from the working directory if present
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG);

                if !fallback.is_file() {
                    debug!("No config file given, using defaults");
                    return Ok(Self::default());
                }

                fallback
            }
        };

        debug!(path = ?path, "Loading config");
        let content = std::fs::read_to_string(&path)
            .map_err(|error| ConfigErrors::ReadConfig(path.clone(), error))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn campaign(&self, name: &str) -> Result<&TestCampaign, ConfigErrors> {
        self.tests
            .get(name)
            .ok_or_else(|| ConfigErrors::UnknownTest(name.to_string()))
    }

    /// Validate the config, returns true if any error was found
    ///
    /// Every problem is logged instead of stopping at the first one, recoverable
    /// ones are fixed up with a warning.
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        if self.merge.node_count == 0 {
            error!("merge.node_count must be at least 1");
            contains_error = true;
        }

        if self.merge.test_cases == 0 {
            warn!("merge.test_cases is 0, nothing will be merged");
        }

        if self.merge.jobs == 0 {
            warn!("merge.jobs is 0. Falling back to 1");
            self.merge.jobs = 1;
        }

        for placeholder in [NODE_PLACEHOLDER, TEST_PLACEHOLDER] {
            if !self.merge.part_template.contains(placeholder) {
                error!(
                    "merge.part_template '{}' must contain {placeholder}",
                    self.merge.part_template
                );
                contains_error = true;
            }
        }

        if !self.merge.result_template.contains(TEST_PLACEHOLDER) {
            error!(
                "merge.result_template '{}' must contain {TEST_PLACEHOLDER}, otherwise all test cases share one file",
                self.merge.result_template
            );
            contains_error = true;
        }

        self.executor.name = self.executor.name.to_lowercase();
        match self.executor.name.as_str() {
            "slurm" | "local" | "dry-run" => {}
            executor_name => {
                error!("executor.name ({executor_name}) is not supported, please use `slurm`, `local` or `dry-run`");
                contains_error = true;
            }
        }

        for (test, campaign) in self.tests.iter() {
            if campaign.node_counts.is_empty() {
                error!("Test {test} has no node_counts, it would never be submitted");
                contains_error = true;
            } else if campaign.node_counts.contains(&0) {
                error!("Test {test}.node_counts cannot contain 0");
                contains_error = true;
            }

            if campaign.algorithms.is_empty() && campaign.sequential_algorithms.is_empty() {
                error!("Test {test} contains neither 'algorithms' nor 'sequential_algorithms' a test can't be a NOP");
                contains_error = true;
            }

            if campaign.workloads.is_empty() {
                warn!("Test {test} has no workloads, its executor will not run anything");
            }

            if campaign.repetitions == 0 {
                error!("Test {test}.repetitions cannot be 0");
                contains_error = true;
            }

            // the script usually lives on the cluster file system, so a missing
            // script is only suspicious here
            match check_executable(&campaign.script) {
                Ok(true) => {}
                Ok(false) => warn!(
                    "Test {test} script {} is not executable, this might cause problems",
                    campaign.script.to_string_lossy()
                ),
                Err(e) => warn!(
                    "Failed to determine if test {test} script ({}) is an executable: {e}",
                    campaign.script.to_string_lossy()
                ),
            }
        }

        contains_error
    }
}

fn default_parts_dir() -> PathBuf {
    RunFileLayout::default().parts_dir
}

fn default_results_dir() -> PathBuf {
    RunFileLayout::default().results_dir
}

fn default_part_template() -> String {
    RunFileLayout::default().part_template
}

fn default_result_template() -> String {
    RunFileLayout::default().result_template
}

fn default_node_count() -> u32 {
    MergeOptions::default().node_count
}

fn default_test_cases() -> u32 {
    MergeOptions::default().test_cases
}

fn default_jobs() -> usize {
    MergeOptions::default().jobs
}

fn default_executor() -> String {
    "slurm".to_string()
}

fn default_job_name() -> String {
    "ar-1".to_string()
}

fn default_time() -> String {
    "00:10:00".to_string()
}

fn default_mem_per_cpu() -> String {
    "1gb".to_string()
}

fn default_tasks_per_node() -> u32 {
    1
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_repetitions() -> u32 {
    1
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("cmake-build/release")
}
