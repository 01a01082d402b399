use crate::{
    campaign::{algorithms, batch_commands, benchmark_commands, run_benchmarks, NodeEnv},
    config::{BatchConfig, LabConfig, TestCampaign},
};
use std::{collections::HashMap, path::PathBuf};

fn campaign() -> TestCampaign {
    let config = LabConfig::from_yaml(
        r#"
tests:
  t0:
    script: tests/t0_executor
    node_counts: [1, 4]
    tasks_per_node: 2
    workloads:
      - { grid_size: 7200, time_steps: 25 }
      - { grid_size: 900, time_steps: 1600 }
    algorithms: [parallel_lb]
    sequential_algorithms: [seq]
    repetitions: 2
    build_dir: build
    output: true
"#,
    )
    .unwrap();

    config.tests["t0"].clone()
}

fn env_of(vars: &[(&str, &str)]) -> NodeEnv {
    let vars = vars
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect::<HashMap<_, _>>();

    NodeEnv::from_lookup(|name| vars.get(name).cloned())
}

#[test]
pub fn node_env_defaults_outside_of_jobs() {
    assert_eq!(env_of(&[]), NodeEnv::default());
    assert_eq!(
        env_of(&[("SLURM_NODEID", "3"), ("SLURM_NTASKS", "16")]),
        NodeEnv {
            node_id: 3,
            process_count: 16
        }
    );
    assert_eq!(env_of(&[("SLURM_NODEID", "three")]).node_id, 0);
}

#[test]
pub fn batch_commands_per_node_count() {
    let batch = BatchConfig {
        account: Some("ccbmc6".to_string()),
        ..BatchConfig::default()
    };

    let commands = batch_commands("t0", &campaign(), &batch);

    assert_eq!(commands.len(), 2);
    assert_eq!(commands[1].nodes, 4);
    assert_eq!(commands[1].tasks_per_node, 2);
    assert_eq!(commands[1].processes(), 8);
    assert_eq!(commands[1].output, PathBuf::from("logs/t0/4_nodes.so"));
    assert_eq!(commands[1].error, PathBuf::from("logs/t0/4_nodes.se"));
    assert_eq!(commands[0].account.as_deref(), Some("ccbmc6"));
    assert_eq!(commands[0].time, "00:10:00");
}

#[test]
pub fn sequential_algorithms_need_a_single_process() {
    let campaign = campaign();

    assert_eq!(
        algorithms(&campaign, &NodeEnv::default()),
        vec!["seq", "parallel_lb"]
    );
    assert_eq!(
        algorithms(
            &campaign,
            &NodeEnv {
                node_id: 0,
                process_count: 4
            }
        ),
        vec!["parallel_lb"]
    );
}

#[test]
pub fn benchmark_commands_cover_workloads_and_repetitions() {
    let commands = benchmark_commands(&campaign(), &NodeEnv::default());

    // 2 workloads x 2 algorithms x 2 repetitions
    assert_eq!(commands.len(), 8);
    assert_eq!(commands[0].to_string(), "build/seq -ts 25 -n 7200 -o");
    assert_eq!(commands[1], commands[0]);
    assert_eq!(commands[2].to_string(), "build/parallel_lb -ts 25 -n 7200 -o");
    assert_eq!(commands[7].to_string(), "build/parallel_lb -ts 1600 -n 900 -o");
}

#[test]
pub fn failed_runs_do_not_stop_the_rest() {
    let mut campaign = campaign();
    campaign.build_dir = PathBuf::from("/nonexistent/arlab");

    let summary = run_benchmarks(&benchmark_commands(&campaign, &NodeEnv::default())[..2]);

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded, 0);
}
