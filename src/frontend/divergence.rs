//! Divergence classification
//!
//! Decides, for every loop, conditional and loop exit in a function body,
//! whether it operates per lane ("divergent") or on a single scalar value
//! ("uniform"), and rejects programs where a per-lane `break`/`continue`
//! escapes into a scalar loop:
//!
//!   - a loop whose condition is a vector is divergent
//!   - a conditional whose condition is a vector is divergent
//!   - a loop exit inside a divergent loop or divergent conditional is
//!     divergent
//!   - a divergent loop exit whose innermost enclosing loop is uniform is an
//!     error, since some lanes would leave the loop while others stay
//!
//! Uniform conditionals are transparent: they are never put on the context
//! stack, so a loop exit sees straight through them to whatever encloses them.

use super::{
    Span,
    ast::{
        DivergenceTag, FunctionDefinition, If, Loop, LoopExit, NodeId, visit::VisitorMut,
    },
    diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Level, diagnostic},
};
use crate::middle::ty::LaneType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextKind {
    Loop,
    Conditional,
}

/// An entry of the open-context stack. Only the facts a loop exit needs are
/// copied out of the node, so the stack never borrows the tree being mutated.
#[derive(Debug, Clone, Copy)]
struct OpenContext {
    kind: ContextKind,
    node: NodeId,
    is_divergent: bool,
    /// Where a widening note points: the controlling expression, or the
    /// loop statement's own span (starting at its keyword) for loops without
    /// a condition such as `for (;;)`
    condition_span: Span,
}

/// Walks one function body. Construct a fresh classifier per function.
pub struct DivergenceClassifier<'sink, S: DiagnosticSink> {
    open_contexts: Vec<OpenContext>,
    sink: &'sink mut S,
    errors: usize,
}

impl<'sink, S: DiagnosticSink> DivergenceClassifier<'sink, S> {
    pub fn new(sink: &'sink mut S) -> Self {
        Self {
            open_contexts: Vec::new(),
            sink,
            errors: 0,
        }
    }

    /// Tags every control-flow node in `function` and returns the number of
    /// errors reported
    pub fn classify(mut self, function: &mut FunctionDefinition) -> usize {
        tracing::debug!(function = %function.name, "classifying divergence");

        self.visit_function_definition(function);
        debug_assert!(self.open_contexts.is_empty());

        self.errors
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            self.errors += 1;
        }

        self.sink.emit(diagnostic);
    }

    fn set_tag(&mut self, tag: &mut DivergenceTag, divergent: bool, span: Span) {
        if let Some(previous) = tag.set(divergent) {
            self.emit(diagnostic!(
                Level::Warning,
                DiagnosticKind::DivergenceTagRedefined { previous },
                span,
            ));
        }
    }

    /// Finds the innermost loop, skipping divergent conditionals, and checks
    /// that it can be exited per lane. Scanning stops at the first loop:
    /// exits only ever target their innermost loop.
    fn check_exit_target(&mut self, exit: &LoopExit) {
        let Some(target) = self
            .open_contexts
            .iter()
            .rev()
            .find(|context| context.kind == ContextKind::Loop)
            .copied()
        else {
            return;
        };

        if target.is_divergent {
            return;
        }

        tracing::debug!(
            exit = ?exit.id,
            target = ?target.node,
            "divergent {} escapes a uniform loop",
            exit.kind
        );

        self.emit(diagnostic!(
            Level::Error,
            DiagnosticKind::DivergentExitInUniformLoop { exit: exit.kind },
            exit.span,
        ));
        self.emit(diagnostic!(
            Level::Note,
            DiagnosticKind::WidenLoopCondition,
            target.condition_span,
        ));
    }
}

impl<S: DiagnosticSink> VisitorMut for DivergenceClassifier<'_, S> {
    fn visit_loop(&mut self, lp: &mut Loop) {
        // loops without a condition (`for (;;)`) are uniform
        let is_divergent = lp
            .condition
            .as_ref()
            .is_some_and(|condition| condition.ty.is_vector());
        let condition_span = lp.condition.as_ref().map_or(lp.span, |c| c.span);

        self.set_tag(&mut lp.divergence, is_divergent, lp.span);

        self.open_contexts.push(OpenContext {
            kind: ContextKind::Loop,
            node: lp.id,
            is_divergent,
            condition_span,
        });
        self.visit_block(&mut lp.body);
        self.open_contexts.pop();
    }

    fn visit_if(&mut self, if_statement: &mut If) {
        let is_divergent = if_statement.condition.ty.is_vector();

        self.set_tag(&mut if_statement.divergence, is_divergent, if_statement.span);

        if is_divergent {
            self.open_contexts.push(OpenContext {
                kind: ContextKind::Conditional,
                node: if_statement.id,
                is_divergent,
                condition_span: if_statement.condition.span,
            });
        }

        self.visit_block(&mut if_statement.positive);
        if let Some(negative) = &mut if_statement.negative {
            self.visit_statement(negative);
        }

        if is_divergent {
            self.open_contexts.pop();
        }
    }

    fn visit_loop_exit(&mut self, exit: &mut LoopExit) {
        let Some(innermost) = self.open_contexts.last() else {
            return;
        };

        if !innermost.is_divergent {
            // plain scalar exit
            return;
        }

        self.set_tag(&mut exit.divergence, true, exit.span);
        self.check_exit_target(exit);
    }
}

/// Classifies `function`, returning every diagnostic produced
pub fn classify_function(function: &mut FunctionDefinition) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    DivergenceClassifier::new(&mut diagnostics).classify(function);
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{
            SourceFile,
            ast::{AstBuilder, Statement, StatementKind},
        },
        middle::ty::{ScalarType, Type},
    };

    const LANES: u32 = 64;

    fn vector() -> Type {
        Type::mask(LANES)
    }

    fn exits(statements: &[Statement], found: &mut Vec<Option<bool>>) {
        for statement in statements {
            match &statement.kind {
                StatementKind::LoopExit(exit) => found.push(exit.divergence.get()),
                StatementKind::Loop(lp) => exits(&lp.body.statements, found),
                StatementKind::If(if_statement) => {
                    exits(&if_statement.positive.statements, found);
                    if let Some(negative) = &if_statement.negative {
                        exits(std::slice::from_ref(negative.as_ref()), found);
                    }
                }
                StatementKind::Block(block) => exits(&block.statements, found),
                _ => {}
            }
        }
    }

    fn exit_tags(function: &FunctionDefinition) -> Vec<Option<bool>> {
        let mut found = Vec::new();
        exits(&function.body.statements, &mut found);
        found
    }

    fn outer_loop(function: &FunctionDefinition) -> &Loop {
        match &function.body.statements[0].kind {
            StatementKind::Loop(lp) => lp,
            kind => panic!("expected a loop, found {kind:?}"),
        }
    }

    #[test]
    fn exits_of_scalar_loops_are_accepted_untagged() {
        let source = SourceFile::in_memory("k() { while (n) { break; continue; } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(
                0,
                b.name("n", 0, Type::I32),
                vec![b.break_statement(0), b.continue_statement(0)],
            )],
        );

        let diagnostics = classify_function(&mut function);

        assert!(diagnostics.is_empty());
        assert_eq!(outer_loop(&function).divergence.get(), Some(false));
        assert_eq!(exit_tags(&function), vec![None, None]);
    }

    #[test]
    fn exits_of_vector_loops_are_tagged_divergent() {
        let source = SourceFile::in_memory("k() { do { continue; break; } while (m); }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.do_while_loop(
                0,
                b.name("m", 0, vector()),
                vec![b.continue_statement(0), b.break_statement(0)],
            )],
        );

        let diagnostics = classify_function(&mut function);

        assert!(diagnostics.is_empty());
        assert!(outer_loop(&function).divergence.is_divergent());
        assert_eq!(exit_tags(&function), vec![Some(true), Some(true)]);
    }

    #[test]
    fn divergent_break_through_uniform_if_in_uniform_loop_is_rejected() {
        // the uniform `if (c)` is transparent, the vector `if (m)` is what
        // makes the break divergent, and the `while (n)` is what it escapes
        let source =
            SourceFile::in_memory("k() { while (n) { if (c) { if (m) { break; } } } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(
                0,
                b.name("n", 0, Type::I32),
                vec![b.if_statement(
                    0,
                    b.name("c", 0, Type::BOOL),
                    vec![b.if_statement(
                        1,
                        b.name("m", 0, vector()),
                        vec![b.break_statement(0)],
                        None,
                    )],
                    None,
                )],
            )],
        );

        let diagnostics = classify_function(&mut function);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].level, Level::Error);
        assert_eq!(
            diagnostics[0].kind,
            DiagnosticKind::DivergentExitInUniformLoop {
                exit: crate::frontend::ast::LoopExitKind::Break
            }
        );
        assert_eq!(source.value_of_span(diagnostics[0].span), "break");
        assert_eq!(diagnostics[1].level, Level::Note);
        assert_eq!(source.value_of_span(diagnostics[1].span), "n");

        // the tag is still set so later passes see a consistent tree
        assert_eq!(exit_tags(&function), vec![Some(true)]);
    }

    #[test]
    fn uniform_if_alone_does_not_make_a_break_divergent() {
        let source = SourceFile::in_memory("k() { while (n) { if (c) { break; } } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(
                0,
                b.name("n", 0, Type::I32),
                vec![b.if_statement(
                    0,
                    b.name("c", 0, Type::BOOL),
                    vec![b.break_statement(0)],
                    None,
                )],
            )],
        );

        assert!(classify_function(&mut function).is_empty());
        assert_eq!(exit_tags(&function), vec![None]);
    }

    #[test]
    fn divergent_break_in_divergent_if_in_divergent_loop_is_accepted() {
        let source =
            SourceFile::in_memory("k() { while (v) { if (m) { break; } else { continue; } } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(
                0,
                b.name("v", 0, Type::vector(ScalarType::I1, LANES)),
                vec![b.if_statement(
                    0,
                    b.name("m", 0, vector()),
                    vec![b.break_statement(0)],
                    Some(vec![b.continue_statement(0)]),
                )],
            )],
        );

        assert!(classify_function(&mut function).is_empty());
        assert_eq!(exit_tags(&function), vec![Some(true), Some(true)]);
    }

    #[test]
    fn break_targets_only_its_innermost_loop() {
        // vector outer loop, scalar inner loop: a break directly in the inner
        // loop is an ordinary scalar exit of the inner loop
        let source = SourceFile::in_memory("k() { while (v) { for (; n;) { break; } } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(
                0,
                b.name("v", 0, vector()),
                vec![b.for_loop(
                    0,
                    Some(b.name("n", 0, Type::I32)),
                    vec![b.break_statement(0)],
                )],
            )],
        );

        assert!(classify_function(&mut function).is_empty());
        assert_eq!(exit_tags(&function), vec![None]);
    }

    #[test]
    fn divergent_break_in_scalar_inner_loop_of_vector_loop_is_rejected() {
        let source =
            SourceFile::in_memory("k() { while (v) { for (;;) { if (m) { break; } } } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(
                0,
                b.name("v", 0, vector()),
                vec![b.for_loop(
                    0,
                    None,
                    vec![b.if_statement(
                        0,
                        b.name("m", 0, vector()),
                        vec![b.break_statement(0)],
                        None,
                    )],
                )],
            )],
        );

        let diagnostics = classify_function(&mut function);

        assert_eq!(diagnostics.len(), 2);
        // condition-less loops point the note at the loop itself
        assert_eq!(source.value_of_span(diagnostics[1].span), "for");
    }

    #[test]
    fn exits_outside_any_loop_are_left_alone() {
        let source = SourceFile::in_memory("k() { if (m) { break; } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.if_statement(
                0,
                b.name("m", 0, vector()),
                vec![b.break_statement(0)],
                None,
            )],
        );

        // the exit is divergent but has no loop to check against
        assert!(classify_function(&mut function).is_empty());
        assert_eq!(exit_tags(&function), vec![Some(true)]);
    }

    #[test]
    fn reclassifying_is_stable() {
        let source = SourceFile::in_memory("k() { while (v) { break; } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(0, b.name("v", 0, vector()), vec![b.break_statement(0)])],
        );

        assert!(classify_function(&mut function).is_empty());
        assert!(classify_function(&mut function).is_empty());
    }

    #[test]
    fn conflicting_prior_tag_is_reported() {
        let source = SourceFile::in_memory("k() { while (v) { } }");
        let b = AstBuilder::new(&source);
        let mut function = b.function(
            "k",
            vec![b.while_loop(0, b.name("v", 0, vector()), vec![])],
        );

        if let StatementKind::Loop(lp) = &mut function.body.statements[0].kind {
            lp.divergence.set(false);
        }

        let diagnostics = classify_function(&mut function);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].level, Level::Warning);
        assert_eq!(
            diagnostics[0].kind,
            DiagnosticKind::DivergenceTagRedefined { previous: false }
        );
        assert!(outer_loop(&function).divergence.is_divergent());
    }
}
