//! Source level: the typed statement tree handed to us by semantic analysis,
//! diagnostics tied to source spans, and the divergence classifier.

use std::path::PathBuf;

pub mod ast;
pub mod diagnostics;
pub mod divergence;
pub mod intern;

/// Byte range into a [`SourceFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn in_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// 1-based line and column of a byte offset
    pub fn line_and_column(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let before = &self.contents[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);

        (line, before[line_start..].chars().count() + 1)
    }

    pub fn format_span_position(&self, span: Span) -> String {
        let (line, column) = self.line_and_column(span.start);
        format!("{}:{line}:{column}", self.origin)
    }

    /// The source line containing the start of `span` followed by a caret
    /// underline of the spanned text (clipped to that line)
    pub fn highlight_span(&self, span: Span) -> String {
        let start = span.start.min(self.contents.len());
        let line_start = self.contents[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = self.contents[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.contents.len());

        let line = &self.contents[line_start..line_end];
        let padding = self.contents[line_start..start].chars().count();
        let underline = self.contents[start..span.end.clamp(start, line_end)]
            .chars()
            .count()
            .max(1);

        format!("{line}\n{}{}", " ".repeat(padding), "^".repeat(underline))
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}
