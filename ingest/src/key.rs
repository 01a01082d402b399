use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};
use thiserror::Error;

/// Name of the bucket collecting text without a node tag
pub const ORPHAN_KEY: &str = "_";

/// Identifies a bucket of the demultiplexer
///
/// Node keys keep the digits exactly as they appeared in the tag, so `[07]` and
/// `[7]` end up in different buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    Node(String),
    Orphan,
}

impl BucketKey {
    pub fn node(digits: impl Into<String>) -> Self {
        Self::Node(digits.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Node(digits) => digits,
            Self::Orphan => ORPHAN_KEY,
        }
    }
}

impl Ord for BucketKey {
    /// numeric order on node ids, orphans last
    ///
    /// Digit strings of any length are compared without parsing them: after
    /// stripping leading zeros a shorter string is the smaller number.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Node(left), Self::Node(right)) => {
                let (trimmed_left, trimmed_right) =
                    (left.trim_start_matches('0'), right.trim_start_matches('0'));

                trimmed_left
                    .len()
                    .cmp(&trimmed_right.len())
                    .then_with(|| trimmed_left.cmp(trimmed_right))
                    .then_with(|| left.cmp(right))
            }
            (Self::Node(_), Self::Orphan) => Ordering::Less,
            (Self::Orphan, Self::Node(_)) => Ordering::Greater,
            (Self::Orphan, Self::Orphan) => Ordering::Equal,
        }
    }
}

impl PartialOrd for BucketKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which buckets are written out
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrder {
    /// `2` before `10`, the orphan bucket last
    #[default]
    Numeric,
    /// plain string order (`10` before `2`), as produced by the old python splitter
    Lexicographic,
}

impl KeyOrder {
    pub fn compare(self, left: &BucketKey, right: &BucketKey) -> Ordering {
        match self {
            Self::Numeric => left.cmp(right),
            Self::Lexicographic => left.as_str().cmp(right.as_str()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown key order '{0}', expected 'numeric' or 'lexicographic'")]
pub struct UnknownKeyOrder(pub String);

impl FromStr for KeyOrder {
    type Err = UnknownKeyOrder;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "numeric" => Ok(Self::Numeric),
            "lexicographic" | "string" => Ok(Self::Lexicographic),
            _ => Err(UnknownKeyOrder(value.to_string())),
        }
    }
}
