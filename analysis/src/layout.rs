use std::path::PathBuf;

/// Placeholder for the node id in file name templates
pub const NODE_PLACEHOLDER: &str = "{node}";
/// Placeholder for the test case id in file name templates
pub const TEST_PLACEHOLDER: &str = "{test}";

/// Where result parts are read from and merged results are written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFileLayout {
    pub parts_dir: PathBuf,
    pub results_dir: PathBuf,
    /// e.g. `{node}_t_{test}`
    pub part_template: String,
    /// e.g. `t_{test}`
    pub result_template: String,
}

impl Default for RunFileLayout {
    fn default() -> Self {
        Self {
            parts_dir: PathBuf::from("results-parts"),
            results_dir: PathBuf::from("results"),
            part_template: format!("{NODE_PLACEHOLDER}_t_{TEST_PLACEHOLDER}"),
            result_template: format!("t_{TEST_PLACEHOLDER}"),
        }
    }
}

impl RunFileLayout {
    pub fn new(parts_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            parts_dir: parts_dir.into(),
            results_dir: results_dir.into(),
            ..Self::default()
        }
    }

    pub fn part_path(&self, node: u32, test_case: u32) -> PathBuf {
        self.parts_dir.join(
            self.part_template
                .replace(NODE_PLACEHOLDER, &node.to_string())
                .replace(TEST_PLACEHOLDER, &test_case.to_string()),
        )
    }

    pub fn result_path(&self, test_case: u32) -> PathBuf {
        self.results_dir.join(
            self.result_template
                .replace(TEST_PLACEHOLDER, &test_case.to_string()),
        )
    }
}
