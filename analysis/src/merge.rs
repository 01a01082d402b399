use crate::{layout::RunFileLayout, row::ResultRow, MergeError};
use itertools::Itertools;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    ffi::OsString,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// nodes that took part in every run, ids `0..node_count`
    pub node_count: u32,
    /// test cases to merge, ids `0..test_cases`
    pub test_cases: u32,
    /// worker threads, 1 merges the test cases in order on the calling thread
    pub jobs: usize,
    /// continue with the remaining test cases after a failure
    pub keep_going: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            node_count: 1,
            test_cases: 100,
            jobs: 1,
            keep_going: false,
        }
    }
}

/// All rows of one test case across every node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCaseBundle {
    test_case: u32,
    rows: Vec<ResultRow>,
}

impl TestCaseBundle {
    pub fn new(test_case: u32) -> Self {
        Self {
            test_case,
            rows: Vec::new(),
        }
    }

    /// Concatenate the parts of nodes `0..node_count`, in node order
    pub fn load(
        layout: &RunFileLayout,
        test_case: u32,
        node_count: u32,
    ) -> Result<Self, MergeError> {
        let mut bundle = Self::new(test_case);

        for node in 0..node_count {
            let path = layout.part_path(node, test_case);
            let rows = bundle.extend_from_file(&path)?;

            debug!(path = ?path, rows, "Read result part");
        }

        Ok(bundle)
    }

    /// Append the rows of one part file, returns the number of rows read
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize, MergeError> {
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => MergeError::MissingPart {
                path: path.to_path_buf(),
                source,
            },
            _ => MergeError::ReadPart {
                path: path.to_path_buf(),
                source,
            },
        })?;

        self.extend_from_str(path, &content)
    }

    /// Append the rows of `content`, blank lines are skipped
    ///
    /// `origin` only shows up in errors.
    pub fn extend_from_str(&mut self, origin: &Path, content: &str) -> Result<usize, MergeError> {
        let before = self.rows.len();

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let row = ResultRow::parse(line).map_err(|source| MergeError::MalformedRow {
                path: origin.to_path_buf(),
                line: index + 1,
                source,
            })?;
            self.rows.push(row);
        }

        Ok(self.rows.len() - before)
    }

    pub fn test_case(&self) -> u32 {
        self.test_case
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Stable sort over the four key columns
    pub fn sort(&mut self) {
        self.rows.sort_by(|left, right| left.key().compare(right.key()));
    }

    /// Runs of consecutive rows sharing column 0
    ///
    /// Only forms complete groups once the bundle is sorted.
    pub fn groups(&self) -> Vec<Vec<&ResultRow>> {
        let grouped = self.rows.iter().group_by(|row| row.key().group());
        let groups = grouped
            .into_iter()
            .map(|(_, group)| group.collect_vec())
            .collect_vec();

        groups
    }

    /// One line per row, a blank line between groups
    pub fn render(&self) -> String {
        self.groups()
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|row| row.render() + "\n")
                    .collect::<String>()
            })
            .join("\n")
    }
}

/// Write `contents` next to `path` first and rename it into place afterwards
fn write_atomically(path: &Path, contents: &str) -> Result<(), MergeError> {
    let write_error = |source: std::io::Error| MergeError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let mut temporary_name = OsString::from(".");
    temporary_name.push(path.file_name().unwrap_or_default());
    temporary_name.push(".partial");
    let temporary = path.with_file_name(temporary_name);

    fs::write(&temporary, contents).map_err(write_error)?;
    fs::rename(&temporary, path).map_err(|source| {
        if let Err(cleanup) = fs::remove_file(&temporary) {
            warn!(path = ?temporary, error = ?cleanup, "Failed to remove partial result");
        }

        write_error(source)
    })
}

/// Merge all parts of one test case into its result file
///
/// Nothing is written unless every part could be read and parsed.
#[instrument(skip(layout), level = "debug")]
pub fn merge_test_case(
    layout: &RunFileLayout,
    test_case: u32,
    node_count: u32,
) -> Result<PathBuf, MergeError> {
    let mut bundle = TestCaseBundle::load(layout, test_case, node_count)?;

    if bundle.rows().is_empty() {
        warn!(test_case, "Test case has no rows, writing an empty result");
    }

    bundle.sort();

    let path = layout.result_path(test_case);
    write_atomically(&path, &bundle.render())?;

    debug!(
        test_case,
        rows = bundle.rows().len(),
        path = ?path,
        "Merged test case"
    );

    Ok(path)
}

/// Outcome of merging a range of test cases
#[derive(Debug, Default)]
pub struct MergeReport {
    /// result files, in test case order
    pub written: Vec<PathBuf>,
    /// failed test cases, only populated with `keep_going`
    pub failed: Vec<(u32, MergeError)>,
}

impl MergeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn collect_report(
    results: impl Iterator<Item = (u32, Result<PathBuf, MergeError>)>,
    keep_going: bool,
) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();

    for (test_case, result) in results {
        match result {
            Ok(path) => report.written.push(path),
            Err(merge_error) if keep_going => {
                error!(test_case, "Failed to merge test case: {merge_error}");
                report.failed.push((test_case, merge_error));
            }
            Err(merge_error) => return Err(merge_error),
        }
    }

    Ok(report)
}

/// Merge test cases `0..options.test_cases`
///
/// Without `keep_going` the first failure is returned. Result files written
/// before that stay in place.
pub fn merge_all(layout: &RunFileLayout, options: &MergeOptions) -> Result<MergeReport, MergeError> {
    info!(
        test_cases = options.test_cases,
        nodes = options.node_count,
        jobs = options.jobs,
        "Merging results from {:?} into {:?}",
        layout.parts_dir,
        layout.results_dir
    );

    let report = if options.jobs <= 1 {
        collect_report(
            (0..options.test_cases).map(|test_case| {
                (
                    test_case,
                    merge_test_case(layout, test_case, options.node_count),
                )
            }),
            options.keep_going,
        )?
    } else {
        debug!("Starting merge pool with {} threads", options.jobs);

        let pool = ThreadPoolBuilder::new().num_threads(options.jobs).build()?;
        let results = pool.install(|| {
            (0..options.test_cases)
                .into_par_iter()
                .map(|test_case| {
                    (
                        test_case,
                        merge_test_case(layout, test_case, options.node_count),
                    )
                })
                .collect::<Vec<_>>()
        });

        collect_report(results.into_iter(), options.keep_going)?
    };

    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "Done with merging"
    );

    Ok(report)
}
