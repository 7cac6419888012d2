//! Linearizes a selection graph into an LIR block
//!
//! Roots are emitted in program order. Value nodes are emitted on first use,
//! right before the root needing them, so a block's terminators only stay a
//! contiguous run when nothing after the first terminator needs a value
//! computed. Loop set-iteration pseudos are moved back into place afterwards.

use hashbrown::HashMap;

use crate::{
    backend::{
        isel::{NodeId, Opcode, SelectionGraph},
        lir::{self, Instruction, Predicate, VirtualRegister},
    },
    error::{LoweringError, LoweringResult},
};

struct Linearizer<'g, 'f> {
    graph: &'g SelectionGraph,
    function: &'f mut lir::Function,
    /// Register already holding each emitted node
    registers: HashMap<NodeId, VirtualRegister>,
    /// Register a node should be computed into, from the exports reading it
    preferred: HashMap<NodeId, VirtualRegister>,
    instructions: Vec<Instruction>,
}

impl Linearizer<'_, '_> {
    fn destination(&mut self, id: NodeId) -> VirtualRegister {
        match self.preferred.get(&id) {
            Some(register) => *register,
            None => self.function.new_register(self.graph.node(id).ty),
        }
    }

    fn value(&mut self, id: NodeId) -> LoweringResult<VirtualRegister> {
        if let Some(register) = self.registers.get(&id) {
            return Ok(*register);
        }

        let graph = self.graph;
        let node = graph.node(id);
        let register = match node.opcode {
            Opcode::Register(register) => register,
            Opcode::Constant(value) => {
                let destination = self.destination(id);
                self.instructions.push(Instruction::MoveImmediate { destination, value });
                destination
            }
            Opcode::BuildVector => {
                let splat = match node.operands.split_first() {
                    Some((first, rest)) if rest.iter().all(|lane| lane == first) => {
                        match graph.node(*first).opcode {
                            Opcode::Constant(value) => Some(value),
                            _ => None,
                        }
                    }
                    _ => None,
                };

                match splat {
                    Some(value) => {
                        let destination = self.destination(id);
                        self.instructions
                            .push(Instruction::BroadcastImmediate { destination, value });
                        destination
                    }
                    None => {
                        let lanes = node
                            .operands
                            .iter()
                            .map(|lane| self.value(*lane))
                            .collect::<LoweringResult<_>>()?;
                        let destination = self.destination(id);
                        self.instructions
                            .push(Instruction::BuildVector { destination, lanes });
                        destination
                    }
                }
            }
            Opcode::Binary(operator) => {
                let (lhs, rhs) = self.binary_operands(id)?;
                let destination = self.destination(id);
                self.instructions.push(Instruction::Binary {
                    operator,
                    destination,
                    lhs,
                    rhs,
                });
                destination
            }
            Opcode::SetCC(condition) => {
                let (lhs, rhs) = self.binary_operands(id)?;
                let destination = self.destination(id);
                self.instructions.push(Instruction::Compare {
                    condition,
                    destination,
                    lhs,
                    rhs,
                });
                destination
            }
            Opcode::Bitcast => {
                let source = self.unary_operand(id)?;
                let destination = self.destination(id);
                self.instructions.push(Instruction::Bitcast {
                    destination,
                    source,
                });
                destination
            }
            Opcode::ZeroExtend => {
                let source = self.unary_operand(id)?;
                let destination = self.destination(id);
                self.instructions.push(Instruction::ZeroExtend {
                    destination,
                    source,
                });
                destination
            }
            Opcode::Select => {
                let [condition, on_true, on_false] = node.operands[..] else {
                    return Err(self.malformed(id));
                };
                let condition = self.value(condition)?;
                let on_true = self.value(on_true)?;
                let on_false = self.value(on_false)?;
                let destination = self.destination(id);
                self.instructions.push(Instruction::Select {
                    destination,
                    condition,
                    on_true,
                    on_false,
                });
                destination
            }
            Opcode::LoopIterDec { id: loop_id } => {
                let destination = self.destination(id);
                self.instructions.push(Instruction::LoopPseudoIterDec {
                    destination,
                    id: loop_id,
                });
                destination
            }
            Opcode::CopyToReg(_)
            | Opcode::LoopSetIter { .. }
            | Opcode::BranchCond(_)
            | Opcode::Branch(_)
            | Opcode::MaskBranch { .. }
            | Opcode::Return => return Err(self.malformed(id)),
        };

        self.registers.insert(id, register);
        Ok(register)
    }

    /// A node read as a value that cannot produce one, or carrying the wrong
    /// operands for its opcode
    fn malformed(&self, id: NodeId) -> LoweringError {
        let node = self.graph.node(id);
        tracing::error!(
            block = %self.graph.block,
            node = %id,
            opcode = %node.opcode,
            operands = node.operands.len(),
            "malformed selection node"
        );

        LoweringError::MalformedSelectionNode {
            node: id,
            block: self.graph.block,
        }
    }

    fn unary_operand(&mut self, id: NodeId) -> LoweringResult<VirtualRegister> {
        let graph = self.graph;
        match graph.node(id).operands[..] {
            [operand] => self.value(operand),
            _ => Err(self.malformed(id)),
        }
    }

    fn binary_operands(&mut self, id: NodeId) -> LoweringResult<(VirtualRegister, VirtualRegister)> {
        let graph = self.graph;
        match graph.node(id).operands[..] {
            [lhs, rhs] => Ok((self.value(lhs)?, self.value(rhs)?)),
            _ => Err(self.malformed(id)),
        }
    }

    fn root(&mut self, id: NodeId) -> LoweringResult<()> {
        let graph = self.graph;
        let node = graph.node(id);

        match node.opcode {
            Opcode::CopyToReg(destination) => {
                let source = self.unary_operand(id)?;
                if source != destination {
                    self.instructions.push(Instruction::Copy {
                        destination,
                        source,
                    });
                }
            }
            Opcode::LoopSetIter { id: loop_id, depth } => {
                let count = self.unary_operand(id)?;
                self.instructions.push(Instruction::LoopPseudoSetIter {
                    id: loop_id,
                    depth,
                    count,
                });
            }
            Opcode::LoopIterDec { .. } => {
                self.value(id)?;
            }
            Opcode::BranchCond(target) => {
                let predicate = Predicate::Register(self.unary_operand(id)?);
                self.instructions.push(Instruction::Branch { predicate, target });
            }
            Opcode::Branch(target) => self.instructions.push(Instruction::Branch {
                predicate: Predicate::Truth,
                target,
            }),
            Opcode::MaskBranch { condition, target } => {
                let mask = self.unary_operand(id)?;
                self.instructions.push(Instruction::MaskBranch {
                    condition,
                    mask,
                    target,
                });
            }
            Opcode::Return => {
                let value = match node.operands[..] {
                    [] => None,
                    [operand] => Some(self.value(operand)?),
                    _ => return Err(self.malformed(id)),
                };
                self.instructions.push(Instruction::Return { value });
            }
            _ => return Err(self.malformed(id)),
        }

        Ok(())
    }
}

/// Emits the roots of `graph` and everything they read into a new block,
/// allocating fresh registers of `function` for block-local values.
///
/// Fails when a node is read as a value without producing one, or when a
/// node's operand count does not fit its opcode.
pub fn linearize(graph: &SelectionGraph, function: &mut lir::Function) -> LoweringResult<lir::Block> {
    let preferred = graph
        .roots
        .iter()
        .filter_map(|root| {
            let node = graph.node(*root);
            match (node.opcode, node.operands.first()) {
                (Opcode::CopyToReg(register), Some(source)) => Some((*source, register)),
                _ => None,
            }
        })
        .collect();

    let mut linearizer = Linearizer {
        graph,
        function,
        registers: HashMap::new(),
        preferred,
        instructions: Vec::new(),
    };

    for root in &graph.roots {
        linearizer.root(*root)?;
    }

    Ok(lir::Block {
        id: graph.block,
        instructions: linearizer.instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::intern::InternedSymbol,
        middle::{
            mir::CondCode,
            ty::{ScalarType, Type},
        },
    };

    fn function_with_registers(count: u32) -> lir::Function {
        let mut function = lir::Function::new(InternedSymbol::new("emit"));
        for _ in 0..count {
            function.new_register(Type::I32);
        }
        function
    }

    fn register(n: u32) -> VirtualRegister {
        VirtualRegister::from_u32(n)
    }

    #[test]
    fn exported_values_are_computed_in_place() {
        let mut function = function_with_registers(2);
        let mut graph = SelectionGraph::new(lir::BlockId::ZERO);

        let input = graph.add(Opcode::Register(register(0)), Type::I32, vec![]);
        let zero = graph.add(Opcode::Constant(0), Type::I32, vec![]);
        let compare = graph.add(Opcode::SetCC(CondCode::Eq), Type::BOOL, vec![input, zero]);
        graph.add(Opcode::CopyToReg(register(1)), Type::Unit, vec![compare]);
        graph.add(Opcode::Return, Type::Unit, vec![compare]);

        let block = linearize(&graph, &mut function).unwrap();

        assert_eq!(
            block.instructions,
            vec![
                Instruction::MoveImmediate {
                    destination: register(2),
                    value: 0
                },
                Instruction::Compare {
                    condition: CondCode::Eq,
                    destination: register(1),
                    lhs: register(0),
                    rhs: register(2)
                },
                Instruction::Return {
                    value: Some(register(1))
                },
            ]
        );
        assert_eq!(function.registers.len(), 3);
    }

    #[test]
    fn uniform_constant_vectors_become_broadcasts() {
        let mut function = function_with_registers(0);
        let mut graph = SelectionGraph::new(lir::BlockId::ZERO);
        let ty = Type::vector(ScalarType::I32, 4);

        let one = graph.add(Opcode::Constant(1), Type::I32, vec![]);
        let two = graph.add(Opcode::Constant(2), Type::I32, vec![]);
        let splat = graph.add(Opcode::BuildVector, ty, vec![one; 4]);
        let mixed = graph.add(Opcode::BuildVector, ty, vec![one, two, one, two]);
        let select_mask = graph.add(Opcode::Register(register(0)), Type::mask(4), vec![]);
        let select = graph.add(Opcode::Select, ty, vec![select_mask, splat, mixed]);
        graph.add(Opcode::Return, Type::Unit, vec![select]);

        let block = linearize(&graph, &mut function).unwrap();

        assert!(matches!(
            block.instructions[0],
            Instruction::BroadcastImmediate { value: 1, .. }
        ));
        assert_eq!(
            block
                .instructions
                .iter()
                .filter(|instruction| matches!(instruction, Instruction::MoveImmediate { .. }))
                .count(),
            2
        );
        let Instruction::BuildVector { lanes, .. } = &block.instructions[3] else {
            panic!("expected build_vector, got {}", block.instructions[3]);
        };
        assert_eq!(lanes[0], lanes[2]);
        assert_ne!(lanes[0], lanes[1]);
    }

    #[test]
    fn branches_keep_root_order() {
        let mut function = function_with_registers(1);
        let mut graph = SelectionGraph::new(lir::BlockId::from_u32(3));

        let decrement = graph.add(Opcode::LoopIterDec { id: 4 }, Type::BOOL, vec![]);
        graph.add(Opcode::CopyToReg(register(0)), Type::Unit, vec![decrement]);
        graph.add(Opcode::BranchCond(lir::BlockId::from_u32(2)), Type::Unit, vec![decrement]);
        graph.add(Opcode::Branch(lir::BlockId::from_u32(5)), Type::Unit, vec![]);

        let block = linearize(&graph, &mut function).unwrap();

        assert_eq!(block.id, lir::BlockId::from_u32(3));
        assert_eq!(
            block.instructions,
            vec![
                Instruction::LoopPseudoIterDec {
                    destination: register(0),
                    id: 4
                },
                Instruction::Branch {
                    predicate: Predicate::Register(register(0)),
                    target: lir::BlockId::from_u32(2)
                },
                Instruction::Branch {
                    predicate: Predicate::Truth,
                    target: lir::BlockId::from_u32(5)
                },
            ]
        );
        assert_eq!(block.first_terminator(), 0);
    }

    #[test]
    fn reading_a_branch_as_a_value_fails() {
        let mut function = function_with_registers(0);
        let mut graph = SelectionGraph::new(lir::BlockId::ZERO);

        let branch = graph.add(Opcode::Branch(lir::BlockId::ZERO), Type::Unit, vec![]);
        graph.add(Opcode::Return, Type::Unit, vec![branch]);

        assert_eq!(
            linearize(&graph, &mut function),
            Err(LoweringError::MalformedSelectionNode {
                node: branch,
                block: lir::BlockId::ZERO,
            })
        );
        assert!(function.registers.is_empty());
    }

    #[test]
    fn operand_count_must_fit_the_opcode() {
        let mut function = function_with_registers(1);
        let mut graph = SelectionGraph::new(lir::BlockId::from_u32(2));

        let input = graph.add(Opcode::Register(register(0)), Type::I32, vec![]);
        let compare = graph.add(Opcode::SetCC(CondCode::Eq), Type::BOOL, vec![input]);
        graph.add(Opcode::Return, Type::Unit, vec![compare]);

        assert_eq!(
            linearize(&graph, &mut function),
            Err(LoweringError::MalformedSelectionNode {
                node: compare,
                block: lir::BlockId::from_u32(2),
            })
        );
    }

    #[test]
    fn value_node_as_root_fails() {
        let mut function = function_with_registers(0);
        let mut graph = SelectionGraph::new(lir::BlockId::ZERO);

        let constant = graph.add(Opcode::Constant(3), Type::I32, vec![]);
        graph.roots.push(constant);

        assert!(matches!(
            linearize(&graph, &mut function),
            Err(LoweringError::MalformedSelectionNode { node, .. }) if node == constant
        ));
    }
}
