use super::{
    slurm::parse_job_id, BatchCommand, DryRunExecutor, Executor, ExecutorError, Executors,
    JobHandle,
};
use crate::config::{ConfigErrors, ExecutorConfig};
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

fn command() -> BatchCommand {
    BatchCommand {
        job_name: "ar-1".to_string(),
        nodes: 4,
        tasks_per_node: 1,
        mem_per_cpu: "1gb".to_string(),
        time: "00:20:00".to_string(),
        account: Some("ccbmc6".to_string()),
        partition: None,
        output: PathBuf::from("logs/t0/4_nodes.so"),
        error: PathBuf::from("logs/t0/4_nodes.se"),
        mail_type: Some("END,FAIL".to_string()),
        mail_user: None,
        script: PathBuf::from("tests/t0_executor"),
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    path
}

fn executor_config(yaml: &str) -> ExecutorConfig {
    serde_yaml::from_str(yaml).unwrap()
}

#[test]
pub fn sbatch_arguments() {
    assert_eq!(
        command().sbatch_args(),
        [
            "-J",
            "ar-1",
            "-N",
            "4",
            "--ntasks-per-node",
            "1",
            "--mem-per-cpu",
            "1gb",
            "--time=00:20:00",
            "-A",
            "ccbmc6",
            "--output",
            "logs/t0/4_nodes.so",
            "--error",
            "logs/t0/4_nodes.se",
            "--mail-type=END,FAIL",
            "tests/t0_executor",
        ]
        .map(OsString::from)
    );
}

#[test]
pub fn render_for_logs() {
    let mut command = command();
    command.account = None;
    command.mail_type = None;

    assert_eq!(
        command.render("sbatch"),
        "sbatch -J ar-1 -N 4 --ntasks-per-node 1 --mem-per-cpu 1gb --time=00:20:00 --output logs/t0/4_nodes.so --error logs/t0/4_nodes.se tests/t0_executor"
    );
}

#[test]
pub fn job_ids() {
    assert_eq!(parse_job_id("Submitted batch job 4242\n").unwrap(), "4242");
    assert_eq!(parse_job_id("\n977;prometheus\n").unwrap(), "977");
    assert!(matches!(
        parse_job_id("sbatch: error: invalid account"),
        Err(ExecutorError::UnparsableJobId(_))
    ));
    assert!(parse_job_id("").is_err());
}

#[test]
pub fn dry_run_records_commands() {
    let mut executor = DryRunExecutor::default();

    assert_eq!(executor.submit(&command()).unwrap(), JobHandle::DryRun);
    assert_eq!(executor.submitted(), [command()]);
}

#[test]
pub fn load_executors_by_name() {
    assert!(matches!(
        Executors::load(&executor_config("name: slurm\nparameter:\n  timeout: 30\n")),
        Ok(Executors::Slurm(_))
    ));
    assert!(matches!(
        Executors::load(&executor_config("name: Local")),
        Ok(Executors::Local(_))
    ));
    assert!(matches!(
        Executors::load(&executor_config("name: dry-run")),
        Ok(Executors::DryRun(_))
    ));
    assert!(matches!(
        Executors::load(&executor_config("name: pbs")),
        Err(ConfigErrors::UnsupportedExecutor(name)) if name == "pbs"
    ));
    assert!(matches!(
        Executors::load(&executor_config("name: slurm\nparameter:\n  timeout: soon\n")),
        Err(ConfigErrors::InvalidParameter { .. })
    ));
}

#[test]
pub fn slurm_rejection_is_reported() {
    let parameter = BTreeMap::from([(
        "sbatch".to_string(),
        serde_yaml::Value::from("false"),
    )]);
    let mut executor = Executors::Slurm(super::SlurmExecutor::load(&parameter).unwrap());

    assert!(matches!(
        executor.submit(&command()),
        Err(ExecutorError::Rejected { .. })
    ));
}

#[test]
pub fn local_executor_runs_the_script() {
    let dir = tempfile::tempdir().unwrap();
    let mut command = command();
    command.script = PathBuf::from("/bin/sh");
    command.output = dir.path().join("logs/out.so");
    command.error = dir.path().join("logs/out.se");

    let mut executor = Executors::load(&executor_config("name: local")).unwrap();

    // sh reads its script from the empty stdin and exits right away
    assert_eq!(
        executor.submit(&command).unwrap(),
        JobHandle::Completed { status: Some(0) }
    );
    assert!(command.output.exists());
    assert!(command.error.exists());
}

#[test]
pub fn slurm_output_larger_than_a_pipe_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let sbatch = write_script(
        dir.path(),
        "sbatch",
        "echo 'Submitted batch job 31'\n\
         head -c 300000 /dev/zero | tr '\\0' x\n\
         head -c 300000 /dev/zero | tr '\\0' y >&2",
    );
    let parameter = BTreeMap::from([
        (
            "sbatch".to_string(),
            serde_yaml::Value::from(sbatch.to_string_lossy().into_owned()),
        ),
        ("timeout".to_string(), serde_yaml::Value::from(20)),
    ]);
    let mut executor = Executors::Slurm(super::SlurmExecutor::load(&parameter).unwrap());

    assert_eq!(
        executor.submit(&command()).unwrap(),
        JobHandle::Submitted {
            id: "31".to_string()
        }
    );
}

#[test]
pub fn local_timeout_kills_and_reaps_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let mut command = command();
    command.script = write_script(
        dir.path(),
        "job",
        &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
    );
    command.output = dir.path().join("logs/out.so");
    command.error = dir.path().join("logs/out.se");

    let mut executor =
        Executors::load(&executor_config("name: local\nparameter:\n  timeout: 1\n")).unwrap();
    let start = Instant::now();

    assert!(matches!(
        executor.submit(&command),
        Err(ExecutorError::Timeout { .. })
    ));
    assert!(start.elapsed() < Duration::from_secs(20));

    // a zombie keeps its /proc entry until it is waited for
    let pid = fs::read_to_string(&pid_file).unwrap();
    assert!(!Path::new("/proc").join(pid.trim()).exists());
}
