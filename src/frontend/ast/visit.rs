//! Trait definition for a mutable AST visitor which walks the tree in DFS order

use super::{
    Block, Expression, ExpressionKind, FunctionDefinition, If, Local, Loop, LoopExit, Statement,
    StatementKind,
};

pub trait VisitorMut: Sized {
    fn visit_function_definition(&mut self, function: &mut FunctionDefinition) {
        walk_function_definition(self, function)
    }

    fn visit_block(&mut self, block: &mut Block) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &mut Statement) {
        walk_statement(self, statement)
    }

    fn visit_local(&mut self, local: &mut Local) {
        walk_local(self, local)
    }

    fn visit_loop(&mut self, lp: &mut Loop) {
        walk_loop(self, lp)
    }

    fn visit_if(&mut self, if_statement: &mut If) {
        walk_if(self, if_statement)
    }

    fn visit_loop_exit(&mut self, _exit: &mut LoopExit) {}

    fn visit_expression(&mut self, expression: &mut Expression) {
        walk_expression(self, expression)
    }
}

pub fn walk_function_definition(visitor: &mut impl VisitorMut, function: &mut FunctionDefinition) {
    visitor.visit_block(&mut function.body);
}

pub fn walk_block(visitor: &mut impl VisitorMut, block: &mut Block) {
    for statement in &mut block.statements {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement(visitor: &mut impl VisitorMut, statement: &mut Statement) {
    match &mut statement.kind {
        StatementKind::Local(local) => visitor.visit_local(local),
        StatementKind::Expression(expression) => visitor.visit_expression(expression),
        StatementKind::Block(block) => visitor.visit_block(block),
        StatementKind::Loop(lp) => visitor.visit_loop(lp),
        StatementKind::If(if_statement) => visitor.visit_if(if_statement),
        StatementKind::LoopExit(exit) => visitor.visit_loop_exit(exit),
        StatementKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expression(value);
            }
        }
        StatementKind::Empty => {}
    }
}

pub fn walk_local(visitor: &mut impl VisitorMut, local: &mut Local) {
    if let Some(initializer) = &mut local.initializer {
        visitor.visit_expression(initializer);
    }
}

pub fn walk_loop(visitor: &mut impl VisitorMut, lp: &mut Loop) {
    if let Some(initializer) = &mut lp.initializer {
        visitor.visit_statement(initializer);
    }

    if let Some(condition) = &mut lp.condition {
        visitor.visit_expression(condition);
    }

    if let Some(step) = &mut lp.step {
        visitor.visit_expression(step);
    }

    visitor.visit_block(&mut lp.body);
}

pub fn walk_if(visitor: &mut impl VisitorMut, if_statement: &mut If) {
    visitor.visit_expression(&mut if_statement.condition);
    visitor.visit_block(&mut if_statement.positive);

    if let Some(negative) = &mut if_statement.negative {
        visitor.visit_statement(negative);
    }
}

pub fn walk_expression(visitor: &mut impl VisitorMut, expression: &mut Expression) {
    match &mut expression.kind {
        ExpressionKind::Literal(_) | ExpressionKind::Identifier(_) => {}
        ExpressionKind::Binary { lhs, rhs, .. } | ExpressionKind::Assignment { lhs, rhs } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExpressionKind::Unary { operand, .. } => visitor.visit_expression(operand),
        ExpressionKind::Call { arguments, .. } => {
            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
    }
}
