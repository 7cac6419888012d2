use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use crate::middle::mir::{self, Operand};

/// Renders `function` as colored text
pub fn pretty_print_mir(function: &mir::Function) -> String {
    let mut out = String::new();

    let parameters = function
        .parameters
        .iter()
        .map(|parameter| format!("{}: {}", value(*parameter), function.value_type(*parameter)))
        .join(", ");

    let _ = writeln!(
        out,
        "{} {}{}{}{}",
        "fn".magenta(),
        function.name.value().blue(),
        "(".white(),
        parameters,
        ") {".white()
    );

    for &block in &function.layout {
        let block = &function.blocks[block];
        let _ = writeln!(out, "{}", format!("{}:", block.id).bright_red());

        for instruction in &block.instructions {
            let _ = writeln!(out, "    {}", instruction_text(function, instruction));
        }

        let _ = writeln!(out, "    {}", terminator_text(&block.terminator));
    }

    let _ = write!(out, "{}", "}".white());
    out
}

fn value(value: mir::ValueId) -> String {
    value.to_string().yellow().to_string()
}

fn block(block: mir::BlockId) -> String {
    block.to_string().blue().to_string()
}

fn operand(operand: &Operand) -> String {
    match operand {
        Operand::Value(id) => value(*id),
        Operand::Constant { value, .. } => value.to_string().purple().to_string(),
    }
}

fn instruction_text(function: &mir::Function, instruction: &mir::Instruction) -> String {
    use mir::InstructionKind as K;

    let body = match &instruction.kind {
        K::Binary { operator, lhs, rhs } => {
            format!("{} {} {}", operand(lhs), operator.to_string().white(), operand(rhs))
        }
        K::Compare {
            condition,
            lhs,
            rhs,
        } => format!(
            "{} {}, {}",
            format!("cmp.{condition}").cyan(),
            operand(lhs),
            operand(rhs)
        ),
        K::Bitcast { value } | K::ZeroExtend { value } => {
            let opcode = if matches!(instruction.kind, K::Bitcast { .. }) {
                "bitcast"
            } else {
                "zext"
            };
            let to = instruction
                .result
                .map(|result| function.value_type(result).to_string())
                .unwrap_or_default();

            format!("{} {} to {to}", opcode.cyan(), operand(value))
        }
        K::Select {
            condition,
            on_true,
            on_false,
        } => format!(
            "{} {}, {}, {}",
            "select".cyan(),
            operand(condition),
            operand(on_true),
            operand(on_false)
        ),
        K::SetTripCount { trip_count } => {
            format!("{} {}", "set_trip_count".bright_green(), operand(trip_count))
        }
        K::LoopDecrement => "loop_decrement".bright_green().to_string(),
        K::HardwareLoopSetIter {
            id,
            depth,
            trip_count,
        } => format!(
            "{} #{id}, depth {depth}, {}",
            "hwloop.set_iter".bright_green(),
            operand(trip_count)
        ),
        K::HardwareLoopIterDec { id } => {
            format!("{} #{id}", "hwloop.iter_dec".bright_green())
        }
    };

    match instruction.result {
        Some(result) => format!("{} {} {body}", value(result), "=".white()),
        None => body,
    }
}

fn terminator_text(terminator: &mir::Terminator) -> String {
    match terminator {
        mir::Terminator::Jump { target } => format!("{} {}", "jmp".cyan(), block(*target)),
        mir::Terminator::Branch {
            condition,
            positive,
            negative,
        } => format!(
            "{} {}, {}, {}",
            "br".cyan(),
            operand(condition),
            block(*positive),
            block(*negative)
        ),
        mir::Terminator::Return { value: Some(value) } => {
            format!("{} {}", "ret".cyan(), operand(value))
        }
        mir::Terminator::Return { value: None } => "ret".cyan().to_string(),
    }
}
