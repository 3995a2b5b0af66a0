use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Range;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where a formula node came from: a character range in the text of one
/// formula source. Written as `source_id:start-end`.
#[derive(Clone, PartialEq, Eq, Copy, JsonSchema)]
pub struct Span {
    pub start: usize,
    pub end: usize,

    /// Which formula text the offsets point into. Assigned by the parser,
    /// opaque to the compiler.
    pub source_id: u16,
}

impl Span {
    pub fn new(source_id: u16, range: Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
            source_id,
        }
    }

    /// Smallest span covering both. Spans of different sources don't merge.
    pub fn merge(self, other: Span) -> Option<Span> {
        if self.source_id != other.source_id {
            return None;
        }
        Some(Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            source_id: self.source_id,
        })
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.source_id, self.start, self.end)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl FromStr for Span {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("malformed span `{s}`, expected `source_id:start-end`");

        let (source_id, range) = s.split_once(':').ok_or_else(malformed)?;
        let (start, end) = range.split_once('-').ok_or_else(malformed)?;
        Ok(Span {
            start: start.parse().map_err(|_| malformed())?,
            end: end.parse().map_err(|_| malformed())?,
            source_id: source_id.parse().map_err(|_| malformed())?,
        })
    }
}

impl Serialize for Span {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Span {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Only spans of one source are ordered, by where they start.
impl PartialOrd for Span {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.source_id != other.source_id {
            return None;
        }
        Some(self.start.cmp(&other.start).then(self.end.cmp(&other.end)))
    }
}
