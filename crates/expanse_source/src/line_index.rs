//! `line:col` positions for offsets produced by a range map.

use std::fmt;

use crate::range::TextRange;

/// A 1-based line and column. Columns count characters, not bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct LineCol {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number in characters, starting at 1.
    pub col: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Line index over an invocation or expansion text.
pub struct LineIndex {
    text: String,
    /// Byte offset of each line start; the first is always 0.
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Indexes `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(
                text.bytes()
                    .enumerate()
                    .filter(|&(_, b)| b == b'\n')
                    .map(|(i, _)| (i + 1) as u32),
            )
            .collect();
        Self { text, line_starts }
    }

    /// Number of lines; an empty text has one.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of a byte offset. The end of the text is a valid position.
    ///
    /// Returns `None` past the end or inside a multi-byte character, which
    /// means the offsets were computed against a different text.
    pub fn line_col(&self, offset: u32) -> Option<LineCol> {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line] as usize;
        let prefix = self.text.get(start..offset as usize)?;
        Some(LineCol {
            line: line as u32 + 1,
            col: prefix.chars().count() as u32 + 1,
        })
    }

    /// Positions of both ends of `range`.
    pub fn span(&self, range: TextRange) -> Option<(LineCol, LineCol)> {
        Some((self.line_col(range.start)?, self.line_col(range.end)?))
    }
}
