//! Source spans.

use serde::Serialize;

/// An inclusive source region: 1-based lines and columns.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceSpan {
    /// The originating file, when known.
    pub file: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub column_end: u32,
}

impl SourceSpan {
    /// A span covering a single point.
    pub fn point(line: u32, column: u32) -> Self {
        Self {
            file: None,
            line_start: line,
            line_end: line,
            column_start: column,
            column_end: column,
        }
    }

    /// A span covering a region within one file-less buffer.
    pub fn region(line_start: u32, column_start: u32, line_end: u32, column_end: u32) -> Self {
        Self {
            file: None,
            line_start,
            line_end,
            column_start,
            column_end,
        }
    }

    /// Stamps the originating file onto this span.
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.line_start, self.column_start),
            None => write!(f, "{}:{}", self.line_start, self.column_start),
        }
    }
}
