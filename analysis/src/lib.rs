//! Reassembly of per node result dumps into one file per test case.

pub mod layout;
pub mod merge;
pub mod row;

#[cfg(test)]
mod row_test;

pub use layout::RunFileLayout;
pub use merge::{merge_all, merge_test_case, MergeOptions, MergeReport, TestCaseBundle};
pub use row::{ResultRow, RowError, SortKey, KEY_COLUMNS};

use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Result part {} not found", .path.display())]
    MissingPart {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read result part {}", .path.display())]
    ReadPart {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed row at {}:{line}", .path.display())]
    MalformedRow {
        path: PathBuf,
        line: usize,
        #[source]
        source: RowError,
    },
    #[error("Failed to write merged results to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start merge worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
