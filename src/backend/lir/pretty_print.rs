use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use crate::backend::lir;

/// Renders `function` as colored text
pub fn pretty_print_lir(function: &lir::Function) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {}{}{}{}",
        "fn".magenta(),
        function.name.value().blue(),
        "(".white(),
        function
            .parameters
            .iter()
            .map(|parameter| parameter.to_string().yellow())
            .join(", "),
        ") {".white()
    );

    for block in &function.blocks {
        let _ = writeln!(out, "{}", format!("{}:", block.id).bright_red());

        for instruction in &block.instructions {
            let _ = writeln!(out, "    {instruction}");
        }
    }

    let _ = write!(out, "{}", "}".white());
    out
}

/// [`pretty_print_lir`] without color codes
pub fn plain_lir(function: &lir::Function) -> String {
    strip_ansi_escapes::strip_str(pretty_print_lir(function))
}

fn register(register: lir::VirtualRegister) -> colored::ColoredString {
    register.to_string().yellow()
}

fn block(block: lir::BlockId) -> colored::ColoredString {
    block.to_string().blue()
}

impl core::fmt::Display for lir::Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Predicate::Truth => write!(f, "{}", "true".purple()),
            lir::Predicate::Register(predicate) => write!(f, "{}", register(*predicate)),
        }
    }
}

impl core::fmt::Display for lir::Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use lir::Instruction as I;

        let eq = "=".white();

        match self {
            I::MoveImmediate { destination, value } => write!(
                f,
                "{} {eq} {} {}",
                register(*destination),
                "mov".cyan(),
                value.to_string().purple()
            ),
            I::BroadcastImmediate { destination, value } => write!(
                f,
                "{} {eq} {} {}",
                register(*destination),
                "bcast".cyan(),
                value.to_string().purple()
            ),
            I::BuildVector { destination, lanes } => write!(
                f,
                "{} {eq} {} [{}]",
                register(*destination),
                "build_vector".cyan(),
                lanes.iter().map(|lane| register(*lane)).join(", ")
            ),
            I::Copy {
                destination,
                source,
            } => write!(
                f,
                "{} {eq} {} {}",
                register(*destination),
                "copy".cyan(),
                register(*source)
            ),
            I::Binary {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{} {eq} {} {} {}",
                register(*destination),
                register(*lhs),
                operator.to_string().white(),
                register(*rhs)
            ),
            I::Compare {
                condition,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{} {eq} {} {}, {}",
                register(*destination),
                format!("cmp.{condition}").cyan(),
                register(*lhs),
                register(*rhs)
            ),
            I::Bitcast {
                destination,
                source,
            } => write!(
                f,
                "{} {eq} {} {}",
                register(*destination),
                "bitcast".cyan(),
                register(*source)
            ),
            I::ZeroExtend {
                destination,
                source,
            } => write!(
                f,
                "{} {eq} {} {}",
                register(*destination),
                "zext".cyan(),
                register(*source)
            ),
            I::Select {
                destination,
                condition,
                on_true,
                on_false,
            } => write!(
                f,
                "{} {eq} {} {}, {}, {}",
                register(*destination),
                "sel".cyan(),
                register(*condition),
                register(*on_true),
                register(*on_false)
            ),
            I::Branch { predicate, target } => {
                write!(f, "{} {predicate}, {}", "jmp".cyan(), block(*target))
            }
            I::MaskBranch {
                condition,
                mask,
                target,
            } => write!(
                f,
                "{} {}, {}",
                format!("jmp.{condition}").cyan(),
                register(*mask),
                block(*target)
            ),
            I::LoopPseudoSetIter { id, depth, count } => write!(
                f,
                "{} #{id}, {}, {}",
                "loop.set_iter".bright_green(),
                depth.to_string().purple(),
                register(*count)
            ),
            I::LoopPseudoIterDec { destination, id } => write!(
                f,
                "{} {eq} {} #{id}",
                register(*destination),
                "loop.iter_dec".bright_green()
            ),
            I::Loop { depth, count, exit } => write!(
                f,
                "{} {}, {}, {}",
                "loop".bright_green(),
                depth.to_string().purple(),
                register(*count),
                block(*exit)
            ),
            I::Return { value: Some(value) } => write!(f, "{} {}", "ret".cyan(), register(*value)),
            I::Return { value: None } => write!(f, "{}", "ret".cyan()),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{frontend::intern::InternedSymbol, middle::ty::Type};

    #[test]
    fn prints_predicated_branches() {
        let mut function = lir::Function::new(InternedSymbol::new("branches"));
        let mask = function.new_register(Type::mask(64));
        let count = function.new_register(Type::I32);
        function.parameters = vec![mask, count];

        let mut entry = lir::Block::new(lir::BlockId::ZERO);
        entry.instructions = vec![
            lir::Instruction::Loop {
                depth: 0,
                count,
                exit: lir::BlockId::from_u32(2),
            },
            lir::Instruction::MaskBranch {
                condition: lir::MaskCondition::None,
                mask,
                target: lir::BlockId::from_u32(1),
            },
            lir::Instruction::Branch {
                predicate: lir::Predicate::Truth,
                target: lir::BlockId::from_u32(2),
            },
        ];
        function.blocks.push(entry);

        assert_eq!(
            plain_lir(&function),
            indoc! {"
                fn branches(%0, %1) {
                bb0:
                    loop 0, %1, bb2
                    jmp.none %0, bb1
                    jmp true, bb2
                }"}
        );
    }
}
