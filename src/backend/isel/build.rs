//! Builds the selection graph of one MIR block

use hashbrown::{HashMap, HashSet};

use crate::{
    backend::isel::{NodeId, Opcode, SelectionGraph, lir_block, lir_register},
    error::{LoweringError, LoweringResult},
    middle::{
        mir::{self, InstructionKind, Operand, Terminator},
        ty::{LaneType, Type},
    },
    options::CodegenOptions,
};

/// Which block defines each value, and which values are read outside the
/// block defining them
#[derive(Debug, Clone, Default)]
pub struct CrossBlockValues {
    pub defined_in: HashMap<mir::ValueId, mir::BlockId>,
    pub exported: HashSet<mir::ValueId>,
}

impl CrossBlockValues {
    pub fn compute(function: &mir::Function) -> Self {
        let defined_in: HashMap<_, _> = function
            .instructions()
            .filter_map(|(location, instruction)| {
                instruction.result.map(|result| (result, location.block))
            })
            .collect();

        let mut exported = HashSet::new();
        for &block in &function.layout {
            let block_data = &function.blocks[block];
            let operands = block_data
                .instructions
                .iter()
                .flat_map(|instruction| instruction.kind.operands())
                .chain(block_data.terminator.operands());

            for value in operands.filter_map(|operand| operand.as_value()) {
                if defined_in.get(&value).is_some_and(|definer| *definer != block) {
                    exported.insert(value);
                }
            }
        }

        Self {
            defined_in,
            exported,
        }
    }

    /// Whether `value` is a parameter or defined by some instruction
    fn is_defined(&self, function: &mir::Function, value: mir::ValueId) -> bool {
        self.defined_in.contains_key(&value) || function.parameters.contains(&value)
    }
}

struct GraphBuilder<'f> {
    function: &'f mir::Function,
    values: &'f CrossBlockValues,
    block: mir::BlockId,
    graph: SelectionGraph,
    /// Nodes already computing a MIR operand
    memo: HashMap<Operand, NodeId>,
}

impl GraphBuilder<'_> {
    fn operand(&mut self, operand: Operand) -> LoweringResult<NodeId> {
        if let Some(node) = self.memo.get(&operand) {
            return Ok(*node);
        }

        let node = match operand {
            Operand::Value(value) => {
                // values of this block are memoized when defined, so anything
                // reaching here must come from a register
                if !self.values.is_defined(self.function, value)
                    || self.values.defined_in.get(&value) == Some(&self.block)
                {
                    return Err(LoweringError::UndefinedValue { value });
                }

                self.graph.add(
                    Opcode::Register(lir_register(value)),
                    self.function.value_type(value),
                    vec![],
                )
            }
            Operand::Constant { value, ty } => match (ty.element(), ty.lane_count()) {
                (Some(element), Some(lanes)) => {
                    let lane = self.scalar_constant(value, Type::Scalar(element));
                    self.graph
                        .add(Opcode::BuildVector, ty, vec![lane; lanes as usize])
                }
                _ => self.scalar_constant(value, ty),
            },
        };

        self.memo.insert(operand, node);
        Ok(node)
    }

    fn scalar_constant(&mut self, value: i64, ty: Type) -> NodeId {
        *self
            .memo
            .entry(Operand::constant(value, ty))
            .or_insert_with(|| self.graph.add(Opcode::Constant(value), ty, vec![]))
    }

    fn instruction(&mut self, instruction: &mir::Instruction) -> LoweringResult<()> {
        let ty = instruction
            .result
            .map_or(Type::Unit, |result| self.function.value_type(result));

        let (opcode, operands) = match &instruction.kind {
            InstructionKind::Binary { operator, lhs, rhs } => (
                Opcode::Binary(*operator),
                vec![self.operand(*lhs)?, self.operand(*rhs)?],
            ),
            InstructionKind::Compare {
                condition,
                lhs,
                rhs,
            } => (
                Opcode::SetCC(*condition),
                vec![self.operand(*lhs)?, self.operand(*rhs)?],
            ),
            InstructionKind::Bitcast { value } => (Opcode::Bitcast, vec![self.operand(*value)?]),
            InstructionKind::ZeroExtend { value } => {
                (Opcode::ZeroExtend, vec![self.operand(*value)?])
            }
            InstructionKind::Select {
                condition,
                on_true,
                on_false,
            } => (
                Opcode::Select,
                vec![
                    self.operand(*condition)?,
                    self.operand(*on_true)?,
                    self.operand(*on_false)?,
                ],
            ),
            InstructionKind::HardwareLoopSetIter {
                id,
                depth,
                trip_count,
            } => (
                Opcode::LoopSetIter {
                    id: *id,
                    depth: *depth,
                },
                vec![self.operand(*trip_count)?],
            ),
            InstructionKind::HardwareLoopIterDec { id } => (Opcode::LoopIterDec { id: *id }, vec![]),
            InstructionKind::SetTripCount { .. } | InstructionKind::LoopDecrement => {
                return Err(LoweringError::UnloweredLoopMarker { block: self.block });
            }
        };

        let node = self.graph.add(opcode, ty, operands);

        if let Some(result) = instruction.result {
            self.memo.insert(Operand::Value(result), node);

            if self.values.exported.contains(&result) {
                self.graph.add(
                    Opcode::CopyToReg(lir_register(result)),
                    Type::Unit,
                    vec![node],
                );
            }
        }

        Ok(())
    }

    fn terminator(
        &mut self,
        terminator: &Terminator,
        layout_successor: Option<mir::BlockId>,
        options: &CodegenOptions,
    ) -> LoweringResult<()> {
        match terminator {
            Terminator::Jump { target } => {
                if options.elide_fallthrough_branches && layout_successor == Some(*target) {
                    tracing::trace!(block = %self.block, "eliding branch to layout successor");
                } else {
                    self.graph
                        .add(Opcode::Branch(lir_block(*target)), Type::Unit, vec![]);
                }
            }
            Terminator::Branch {
                condition,
                positive,
                negative,
            } => {
                let condition = self.operand(*condition)?;
                self.graph.add(
                    Opcode::BranchCond(lir_block(*positive)),
                    Type::Unit,
                    vec![condition],
                );
                self.graph
                    .add(Opcode::Branch(lir_block(*negative)), Type::Unit, vec![]);
            }
            Terminator::Return { value } => {
                let operands = match value {
                    Some(value) => vec![self.operand(*value)?],
                    None => vec![],
                };
                self.graph.add(Opcode::Return, Type::Unit, operands);
            }
        }

        Ok(())
    }
}

/// Builds the graph for `block`. `layout_successor` is the block placed
/// after it, which it may fall through to.
pub fn build_graph(
    function: &mir::Function,
    block: mir::BlockId,
    layout_successor: Option<mir::BlockId>,
    values: &CrossBlockValues,
    options: &CodegenOptions,
) -> LoweringResult<SelectionGraph> {
    let mut builder = GraphBuilder {
        function,
        values,
        block,
        graph: SelectionGraph::new(lir_block(block)),
        memo: HashMap::new(),
    };

    let block_data = &function.blocks[block];
    for instruction in &block_data.instructions {
        builder.instruction(instruction)?;
    }
    builder.terminator(&block_data.terminator, layout_successor, options)?;

    Ok(builder.graph)
}
