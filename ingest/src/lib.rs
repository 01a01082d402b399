//! Splitting of interleaved, node tagged benchmark logs.
//!
//! MPI launchers prefix every line a rank prints with `[rank]`, and stdout of
//! all ranks ends up in one file. [`Demultiplexer`] sorts that stream back into
//! one bucket per rank.

pub mod demux;
pub mod key;


pub use demux::{demux, Bucket, DemuxSummary, Demultiplexer, ORPHAN_ANNOTATION};
pub use key::{BucketKey, KeyOrder, UnknownKeyOrder, ORPHAN_KEY};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read log input")]
    Read(#[source] std::io::Error),
    #[error("Failed to write split log")]
    Write(#[source] std::io::Error),
}
