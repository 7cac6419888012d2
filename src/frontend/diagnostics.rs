//! User-facing diagnostics. These describe problems in the source program and
//! never abort a pass: the pass records them and keeps walking.

use colored::Colorize;

use super::{SourceFile, Span, ast::LoopExitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A per-lane `break`/`continue` whose innermost loop is scalar
    DivergentExitInUniformLoop { exit: LoopExitKind },
    /// Attached to the scalar loop's condition in the case above
    WidenLoopCondition,
    /// A node's divergence was set once and then set again to the opposite value
    DivergenceTagRedefined { previous: bool },
}

/// Where in this crate a diagnostic was raised from. Only recorded with the
/// `error-backtrace` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitLocation {
    pub module: &'static str,
    pub file: &'static str,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub kind: DiagnosticKind,
    pub span: Span,
    pub emitted_at: Option<EmitLocation>,
}

/// Builds a [`Diagnostic`], recording the emitting location when the
/// `error-backtrace` feature is on.
macro_rules! diagnostic {
    ($level:expr, $kind:expr, $span:expr $(,)?) => {{
        #[cfg(feature = "error-backtrace")]
        let emitted_at = Some($crate::frontend::diagnostics::EmitLocation {
            module: module_path!(),
            file: file!(),
            line: line!(),
        });
        #[cfg(not(feature = "error-backtrace"))]
        let emitted_at = None;

        $crate::frontend::diagnostics::Diagnostic {
            level: $level,
            kind: $kind,
            span: $span,
            emitted_at,
        }
    }};
}

pub(crate) use diagnostic;

impl Diagnostic {
    pub fn message(&self) -> String {
        match &self.kind {
            DiagnosticKind::DivergentExitInUniformLoop { exit } => format!(
                "vector `{exit}` cannot leave a loop with a scalar condition; lanes would diverge \
                 across the loop's back edge"
            ),
            DiagnosticKind::WidenLoopCondition => {
                "consider making this loop condition a vector so the loop runs per lane".to_string()
            }
            DiagnosticKind::DivergenceTagRedefined { previous } => format!(
                "divergence of this statement was already determined to be {}",
                if *previous { "vector" } else { "scalar" }
            ),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    /// Colored multi-line rendering: headline, position and the highlighted
    /// source line
    pub fn render(&self, source_file: &SourceFile) -> String {
        let level = match self.level {
            Level::Error => "error".red().bold(),
            Level::Warning => "warning".yellow().bold(),
            Level::Note => "note".cyan().bold(),
        };

        let mut rendered = format!(
            "{}: {} {}\n{}",
            level,
            self.message(),
            format!("(at {})", source_file.format_span_position(self.span)).white(),
            source_file.highlight_span(self.span)
        );

        if let Some(location) = self.emitted_at {
            rendered = format!(
                "{}: {} {}\n{}",
                "backtrace".blue(),
                location.module,
                format!("(at {}:{})", location.file, location.line).white(),
                rendered
            );
        }

        rendered
    }

    pub fn report(&self, source_file: &SourceFile) {
        eprintln!("{}", self.render(source_file));
    }
}

/// Receives diagnostics as a pass produces them
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_position_and_excerpt() {
        let source = SourceFile::in_memory("for (;;) {\n  if (m) break;\n}");
        let start = source.contents.find("break").unwrap();
        let diagnostic = diagnostic!(
            Level::Error,
            DiagnosticKind::DivergentExitInUniformLoop {
                exit: LoopExitKind::Break
            },
            Span::new(start, start + 5),
        );

        let rendered = strip_ansi_escapes::strip_str(diagnostic.render(&source));

        assert!(rendered.contains("error: vector `break` cannot leave a loop"));
        assert!(rendered.contains("(at <memory>:2:10)"));
        assert!(rendered.ends_with("  if (m) break;\n         ^^^^^"));
        assert_eq!(
            diagnostic.emitted_at.is_some(),
            cfg!(feature = "error-backtrace")
        );
    }
}
