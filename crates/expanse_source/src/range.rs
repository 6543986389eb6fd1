//! Half-open offset ranges within a single text.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RangeMapError;

/// A half-open `[start, end)` offset range within one text.
///
/// Offsets are byte offsets. Ranges on the two sides of a mapping are
/// independent: an expansion may grow or shrink the text it copies.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTextRange")]
pub struct TextRange {
    /// Offset of the start of the range (inclusive).
    pub start: u32,
    /// Offset of the end of the range (exclusive).
    pub end: u32,
}

impl TextRange {
    /// Creates a new range.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "invalid text range {start}..{end}");
        Self { start, end }
    }

    /// Creates a new range, rejecting `start > end`.
    pub fn try_new(start: u32, end: u32) -> Result<Self, RangeMapError> {
        if start > end {
            return Err(RangeMapError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a range from a start offset and a length.
    ///
    /// Returns `None` if the end would overflow `u32`.
    pub fn at(start: u32, len: u32) -> Option<Self> {
        let end = start.checked_add(len)?;
        Some(Self { start, end })
    }

    /// An empty range at `offset`, i.e. a caret position.
    pub fn empty(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Returns the length of this range.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Returns `true` if this range has zero length.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `offset` lies in `[start, end)`.
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Returns `true` if `other` lies entirely within this range.
    pub fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns the non-empty overlap of two ranges, if any.
    pub fn intersect(self, other: TextRange) -> Option<TextRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TextRange { start, end })
    }
}

/// Unchecked wire form; deserialization goes through [`TextRange::try_new`].
#[derive(Deserialize)]
struct RawTextRange {
    start: u32,
    end: u32,
}

impl TryFrom<RawTextRange> for TextRange {
    type Error = RangeMapError;

    fn try_from(raw: RawTextRange) -> Result<Self, Self::Error> {
        Self::try_new(raw.start, raw.end)
    }
}

impl fmt::Debug for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
