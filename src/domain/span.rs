//! Source positions and ranges.
//!
//! Lines are 1-based and columns are 0-based character offsets, matching
//! what `proc-macro2` reports with `span-locations` enabled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single point in a source file (a call site or a declaration).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePos {
    pub file: String,
    /// 0 when the position is unknown
    pub line: usize,
    pub column: usize,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}:{}", self.file, self.line, self.column + 1)
        } else if self.file.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", self.file)
        }
    }
}

/// A span of source text inside one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceRange {
    pub fn new(start: (usize, usize), end: (usize, usize)) -> Self {
        Self {
            start_line: start.0,
            start_col: start.1,
            end_line: end.0,
            end_col: end.1,
        }
    }

    /// Check if `other` is fully contained within `self` (bounds inclusive).
    pub fn contains(&self, other: &SourceRange) -> bool {
        (self.start_line, self.start_col) <= (other.start_line, other.start_col)
            && (other.end_line, other.end_col) <= (self.end_line, self.end_col)
    }

    /// Rough extent used to rank nested ranges; smaller is more specific.
    pub fn size(&self) -> (usize, usize) {
        let lines = self.end_line.saturating_sub(self.start_line);
        let cols = if lines == 0 {
            self.end_col.saturating_sub(self.start_col)
        } else {
            self.end_col
        };
        (lines, cols)
    }

    pub fn start_pos(&self, file: &str) -> SourcePos {
        SourcePos::new(file, self.start_line, self.start_col)
    }
}
