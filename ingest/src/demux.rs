use crate::{
    key::{BucketKey, KeyOrder},
    IngestError,
};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};
use tracing::{debug, trace};

/// Appended to the orphan bucket after text that preceded a tag on the same line
pub const ORPHAN_ANNOTATION: &[u8] = b" (???) \n";

/// `[digits]`, the capture holds the node id
static NODE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([0-9]+)\]").expect("node tag pattern is a valid regex"));

/// Fragments attributed to a single origin, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    fragments: Vec<Vec<u8>>,
}

impl Bucket {
    fn push(&mut self, fragment: &[u8]) {
        self.fragments.push(fragment.to_vec());
    }

    pub fn fragments(&self) -> &[Vec<u8>] {
        &self.fragments
    }

    /// concatenation of all fragments
    pub fn contents(&self) -> Vec<u8> {
        self.fragments.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxSummary {
    pub lines: usize,
    pub tagged_lines: usize,
    /// tagged lines that started with untagged text
    pub orphan_prefixes: usize,
    /// buckets including the orphan one
    pub buckets: usize,
}

/// Accumulates log lines into per node buckets
///
/// Nothing is written before the whole input was seen, since the output order
/// depends on every key that occurs.
#[derive(Debug, Clone)]
pub struct Demultiplexer {
    buckets: BTreeMap<BucketKey, Bucket>,
    summary: DemuxSummary,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demultiplexer {
    /// create a demultiplexer holding only the (empty) orphan bucket
    pub fn new() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(BucketKey::Orphan, Bucket::default());

        Self {
            buckets,
            summary: DemuxSummary::default(),
        }
    }

    fn orphan(&mut self) -> &mut Bucket {
        self.buckets.entry(BucketKey::Orphan).or_default()
    }

    /// Assign one line, including its line terminator, to the buckets
    pub fn push_line(&mut self, line: &[u8]) {
        self.summary.lines += 1;

        let tags = NODE_TAG
            .captures_iter(line)
            .filter_map(|captures| Some((captures.get(0)?, captures.get(1)?)))
            .collect::<Vec<_>>();

        let Some((first, _)) = tags.first() else {
            self.orphan().push(line);
            return;
        };

        self.summary.tagged_lines += 1;
        trace!(tags = tags.len(), "Splitting tagged line");

        let prefix = &line[..first.start()];
        if !prefix.is_empty() {
            self.summary.orphan_prefixes += 1;

            let orphan = self.orphan();
            orphan.push(prefix);
            orphan.push(ORPHAN_ANNOTATION);
        }

        for (index, (marker, digits)) in tags.iter().enumerate() {
            let end = tags
                .get(index + 1)
                .map_or(line.len(), |(next, _)| next.start());
            // the capture only matches ascii digits
            let node = String::from_utf8_lossy(digits.as_bytes()).into_owned();

            self.buckets
                .entry(BucketKey::Node(node))
                .or_default()
                .push(&line[marker.end()..end]);
        }
    }

    /// Consume `reader` until end of input
    pub fn extend_from_reader<R: BufRead>(&mut self, mut reader: R) -> Result<(), IngestError> {
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader
                .read_until(b'\n', &mut line)
                .map_err(IngestError::Read)?
                == 0
            {
                break;
            }

            self.push_line(&line);
        }

        debug!(
            lines = self.summary.lines,
            buckets = self.buckets.len(),
            "Finished reading log input"
        );

        Ok(())
    }

    pub fn buckets(&self) -> &BTreeMap<BucketKey, Bucket> {
        &self.buckets
    }

    pub fn bucket(&self, key: &BucketKey) -> Option<&Bucket> {
        self.buckets.get(key)
    }

    pub fn summary(&self) -> DemuxSummary {
        DemuxSummary {
            buckets: self.buckets.len(),
            ..self.summary
        }
    }

    pub fn into_buckets(self) -> BTreeMap<BucketKey, Bucket> {
        self.buckets
    }

    /// keys of all buckets in output order
    pub fn sorted_keys(&self, order: KeyOrder) -> Vec<&BucketKey> {
        let mut keys = self.buckets.keys().collect::<Vec<_>>();
        keys.sort_by(|left, right| order.compare(left, right));
        keys
    }

    /// Write every bucket as `~~~~ key ~~~~`, its contents and two newlines
    pub fn write_report<W: Write>(&self, sink: &mut W, order: KeyOrder) -> Result<(), IngestError> {
        for key in self.sorted_keys(order) {
            let bucket = &self.buckets[key];

            writeln!(sink, "~~~~ {key} ~~~~").map_err(IngestError::Write)?;
            for fragment in bucket.fragments() {
                sink.write_all(fragment).map_err(IngestError::Write)?;
            }
            sink.write_all(b"\n\n").map_err(IngestError::Write)?;
        }

        sink.flush().map_err(IngestError::Write)
    }
}

/// Split all `lines` in one go
pub fn demux<I, L>(lines: I) -> Demultiplexer
where
    I: IntoIterator<Item = L>,
    L: AsRef<[u8]>,
{
    let mut demultiplexer = Demultiplexer::new();

    for line in lines {
        demultiplexer.push_line(line.as_ref());
    }

    demultiplexer
}
