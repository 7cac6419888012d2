//! Typed statement tree. By the time a function reaches this form every
//! expression carries its resolved [`Type`]; the only thing still missing is
//! the divergence tag on control-flow nodes, which the classifier fills in.

use std::cell::Cell;

use super::{SourceFile, Span, intern::InternedSymbol};
use crate::middle::ty::Type;

pub mod visit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug)]
pub struct FunctionDefinition {
    pub id: NodeId,
    pub span: Span,
    pub name: InternedSymbol,
    pub parameters: Vec<FunctionParameter>,
    pub body: Block,
}

#[derive(Debug)]
pub struct FunctionParameter {
    pub id: NodeId,
    pub span: Span,
    pub name: InternedSymbol,
    pub ty: Type,
}

#[derive(Debug)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug)]
pub enum StatementKind {
    /// Local variable declaration with an optional initializer
    Local(Box<Local>),
    /// Expression evaluated for its side effects
    Expression(Box<Expression>),
    /// Nested compound statement
    Block(Box<Block>),
    Loop(Box<Loop>),
    If(Box<If>),
    /// `break` or `continue`
    LoopExit(LoopExit),
    Return(Option<Box<Expression>>),
    Empty,
}

#[derive(Debug)]
pub struct Local {
    pub id: NodeId,
    pub span: Span,
    pub name: InternedSymbol,
    pub ty: Type,
    pub initializer: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    DoWhile,
    For,
}

#[derive(Debug)]
pub struct Loop {
    pub id: NodeId,
    pub span: Span,
    pub kind: LoopKind,
    /// Only `for` loops may omit their condition
    pub condition: Option<Box<Expression>>,
    /// `for` loop initializer
    pub initializer: Option<Box<Statement>>,
    /// `for` loop step expression
    pub step: Option<Box<Expression>>,
    pub body: Block,
    pub divergence: DivergenceTag,
}

#[derive(Debug)]
pub struct If {
    pub id: NodeId,
    pub span: Span,
    pub condition: Box<Expression>,
    pub positive: Block,
    /// Either a block or another if statement
    pub negative: Option<Box<Statement>>,
    pub divergence: DivergenceTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LoopExitKind {
    Break,
    Continue,
}

#[derive(Debug)]
pub struct LoopExit {
    pub id: NodeId,
    pub span: Span,
    pub kind: LoopExitKind,
    pub divergence: DivergenceTag,
}

#[derive(Debug)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub ty: Type,
    pub kind: ExpressionKind,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Literal(i64),
    Identifier(InternedSymbol),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    Call {
        target: InternedSymbol,
        arguments: Vec<Expression>,
    },
    Assignment {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = "&")]
    BitwiseAnd,
    #[strum(serialize = "|")]
    BitwiseOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnaryOperatorKind {
    #[strum(serialize = "!")]
    LogicalNot,
    #[strum(serialize = "-")]
    Negate,
}

/// Whether a loop, conditional or loop exit operates per lane. Starts unset;
/// the classifier fills it in and later lowering reads it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DivergenceTag(Option<bool>);

impl DivergenceTag {
    pub fn get(self) -> Option<bool> {
        self.0
    }

    pub fn is_set(self) -> bool {
        self.0.is_some()
    }

    pub fn is_divergent(self) -> bool {
        self.0 == Some(true)
    }

    /// Records the tag. If the node already held the opposite value, the old
    /// value is returned so the caller can report the redefinition.
    pub fn set(&mut self, divergent: bool) -> Option<bool> {
        let previous = self.0.replace(divergent);
        previous.filter(|previous| *previous != divergent)
    }
}

/// Builds typed trees against a piece of source text, locating each node's
/// span by searching for its snippet. Semantic analysis is outside of this
/// crate, so this is how tests and tools hand us trees with real spans.
pub struct AstBuilder<'source> {
    source: &'source SourceFile,
    next_id: Cell<u32>,
}

impl<'source> AstBuilder<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            next_id: Cell::new(0),
        }
    }

    fn id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    /// Span of the `occurrence`-th (0-based) appearance of `snippet`. Missing
    /// snippets produce an empty span at the end of the file.
    pub fn span_of(&self, snippet: &str, occurrence: usize) -> Span {
        match self
            .source
            .contents
            .match_indices(snippet)
            .nth(occurrence)
        {
            Some((start, _)) => Span::new(start, start + snippet.len()),
            None => {
                tracing::warn!(snippet, occurrence, "snippet not found in source");
                let end = self.source.contents.len();
                Span::new(end, end)
            }
        }
    }

    pub fn name(&self, snippet: &str, occurrence: usize, ty: Type) -> Expression {
        Expression {
            id: self.id(),
            span: self.span_of(snippet, occurrence),
            ty,
            kind: ExpressionKind::Identifier(InternedSymbol::new(snippet)),
        }
    }

    pub fn block(&self, statements: Vec<Statement>) -> Block {
        let span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => Span::new(first.span.start, last.span.end),
            _ => Span::default(),
        };

        Block {
            id: self.id(),
            span,
            statements,
        }
    }

    fn statement(&self, span: Span, kind: StatementKind) -> Statement {
        Statement {
            id: self.id(),
            span,
            kind,
        }
    }

    fn loop_statement(
        &self,
        kind: LoopKind,
        keyword: &str,
        occurrence: usize,
        condition: Option<Expression>,
        body: Vec<Statement>,
    ) -> Statement {
        let span = self.span_of(keyword, occurrence);
        let body = self.block(body);

        self.statement(
            span,
            StatementKind::Loop(Box::new(Loop {
                id: self.id(),
                span,
                kind,
                condition: condition.map(Box::new),
                initializer: None,
                step: None,
                body,
                divergence: DivergenceTag::default(),
            })),
        )
    }

    pub fn while_loop(
        &self,
        occurrence: usize,
        condition: Expression,
        body: Vec<Statement>,
    ) -> Statement {
        self.loop_statement(LoopKind::While, "while", occurrence, Some(condition), body)
    }

    pub fn do_while_loop(
        &self,
        occurrence: usize,
        condition: Expression,
        body: Vec<Statement>,
    ) -> Statement {
        self.loop_statement(LoopKind::DoWhile, "do", occurrence, Some(condition), body)
    }

    pub fn for_loop(
        &self,
        occurrence: usize,
        condition: Option<Expression>,
        body: Vec<Statement>,
    ) -> Statement {
        self.loop_statement(LoopKind::For, "for", occurrence, condition, body)
    }

    pub fn if_statement(
        &self,
        occurrence: usize,
        condition: Expression,
        positive: Vec<Statement>,
        negative: Option<Vec<Statement>>,
    ) -> Statement {
        let span = self.span_of("if", occurrence);
        let positive = self.block(positive);
        let negative = negative.map(|statements| {
            let block = self.block(statements);
            Box::new(self.statement(block.span, StatementKind::Block(Box::new(block))))
        });

        self.statement(
            span,
            StatementKind::If(Box::new(If {
                id: self.id(),
                span,
                condition: Box::new(condition),
                positive,
                negative,
                divergence: DivergenceTag::default(),
            })),
        )
    }

    fn loop_exit(&self, kind: LoopExitKind, occurrence: usize) -> Statement {
        let span = self.span_of(&kind.to_string(), occurrence);

        self.statement(
            span,
            StatementKind::LoopExit(LoopExit {
                id: self.id(),
                span,
                kind,
                divergence: DivergenceTag::default(),
            }),
        )
    }

    pub fn break_statement(&self, occurrence: usize) -> Statement {
        self.loop_exit(LoopExitKind::Break, occurrence)
    }

    pub fn continue_statement(&self, occurrence: usize) -> Statement {
        self.loop_exit(LoopExitKind::Continue, occurrence)
    }

    pub fn expression_statement(&self, expression: Expression) -> Statement {
        self.statement(expression.span, StatementKind::Expression(Box::new(expression)))
    }

    pub fn nested_block(&self, statements: Vec<Statement>) -> Statement {
        let block = self.block(statements);
        self.statement(block.span, StatementKind::Block(Box::new(block)))
    }

    pub fn function(&self, name: &str, body: Vec<Statement>) -> FunctionDefinition {
        FunctionDefinition {
            id: self.id(),
            span: self.span_of(name, 0),
            name: InternedSymbol::new(name),
            parameters: Vec::new(),
            body: self.block(body),
        }
    }
}
