//! Instruction selection
//!
//! Each MIR block is turned into a [`SelectionGraph`]: a DAG of value nodes
//! plus an ordered list of roots for everything with an effect (branches,
//! loop pseudos, values other blocks read). The graph is rewritten by the
//! predicate combiner and finally linearized into an LIR block.

use crate::{
    backend::lir,
    error::LoweringResult,
    frontend::ast::BinaryOperatorKind,
    index::{IndexVec, simple_index},
    middle::{
        mir::{self, CondCode},
        ty::Type,
    },
    options::CodegenOptions,
};

pub mod build;
pub mod combine;
pub mod emit;

simple_index! {
    /// Identifies a node of a [`SelectionGraph`]
    pub struct NodeId = "t";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Integer constant of the node type, which must be scalar
    Constant(i64),
    /// Vector whose lanes are the operands
    BuildVector,
    /// Value living in a virtual register, defined outside this block
    Register(lir::VirtualRegister),
    Binary(BinaryOperatorKind),
    SetCC(CondCode),
    Bitcast,
    ZeroExtend,
    Select,
    /// Makes the operand available to other blocks in the given register
    CopyToReg(lir::VirtualRegister),
    LoopSetIter { id: u32, depth: u32 },
    LoopIterDec { id: u32 },
    /// Conditional branch on a scalar `i1`
    BranchCond(lir::BlockId),
    /// Unconditional branch
    Branch(lir::BlockId),
    MaskBranch {
        condition: lir::MaskCondition,
        target: lir::BlockId,
    },
    Return,
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "constant {value}"),
            Self::BuildVector => write!(f, "build_vector"),
            Self::Register(register) => write!(f, "register {register}"),
            Self::Binary(operator) => write!(f, "{operator}"),
            Self::SetCC(condition) => write!(f, "setcc {condition}"),
            Self::Bitcast => write!(f, "bitcast"),
            Self::ZeroExtend => write!(f, "zero_extend"),
            Self::Select => write!(f, "select"),
            Self::CopyToReg(register) => write!(f, "copy_to_reg {register}"),
            Self::LoopSetIter { id, depth } => write!(f, "loop_set_iter #{id} depth {depth}"),
            Self::LoopIterDec { id } => write!(f, "loop_iter_dec #{id}"),
            Self::BranchCond(target) => write!(f, "brcond {target}"),
            Self::Branch(target) => write!(f, "br {target}"),
            Self::MaskBranch { condition, target } => write!(f, "jmp.{condition} {target}"),
            Self::Return => write!(f, "return"),
        }
    }
}

impl Opcode {
    /// Whether nodes with this opcode are kept alive by the root list rather
    /// than by their users
    pub fn has_effect(self) -> bool {
        matches!(
            self,
            Self::CopyToReg(_)
                | Self::LoopSetIter { .. }
                | Self::LoopIterDec { .. }
                | Self::BranchCond(_)
                | Self::Branch(_)
                | Self::MaskBranch { .. }
                | Self::Return
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub opcode: Opcode,
    /// Type of the produced value, `Unit` for nodes producing none
    pub ty: Type,
    pub operands: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct SelectionGraph {
    pub block: lir::BlockId,
    pub nodes: IndexVec<NodeId, Node>,
    /// Nodes with an effect, in program order
    pub roots: Vec<NodeId>,
}

impl SelectionGraph {
    pub fn new(block: lir::BlockId) -> Self {
        Self {
            block,
            nodes: IndexVec::new(),
            roots: Vec::new(),
        }
    }

    pub fn add(&mut self, opcode: Opcode, ty: Type, operands: Vec<NodeId>) -> NodeId {
        let id = self.nodes.push(Node {
            opcode,
            ty,
            operands,
        });
        if opcode.has_effect() {
            self.roots.push(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Operand `index` of `id`, if it has that many
    pub fn operand(&self, id: NodeId, index: usize) -> Option<&Node> {
        self.nodes[id]
            .operands
            .get(index)
            .map(|operand| &self.nodes[*operand])
    }

    /// Points every user of `from`, and the root list, at `to`
    pub fn replace_all_uses(&mut self, from: NodeId, to: NodeId) {
        for node in self.nodes.iter_mut() {
            for operand in &mut node.operands {
                if *operand == from {
                    *operand = to;
                }
            }
        }

        for root in &mut self.roots {
            if *root == from {
                *root = to;
            }
        }
    }

    /// Nodes reachable from the roots
    pub fn live_nodes(&self) -> Vec<NodeId> {
        let mut live = vec![false; self.nodes.len()];
        let mut stack = self.roots.clone();

        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut live[id.as_u32() as usize], true) {
                continue;
            }
            stack.extend(self.nodes[id].operands.iter().copied());
        }

        self.nodes.indices().filter(|id| live[id.as_u32() as usize]).collect()
    }
}

/// Selects every block of `function` in layout order
pub fn select_instructions(
    function: &mir::Function,
    options: &CodegenOptions,
) -> LoweringResult<lir::Function> {
    let mut output = lir::Function::new(function.name);

    // MIR values keep their number as virtual registers
    for value in function.values.iter() {
        output.new_register(value.ty);
    }
    output.parameters = function
        .parameters
        .iter()
        .map(|parameter| lir_register(*parameter))
        .collect();

    let values = build::CrossBlockValues::compute(function);

    for (position, &block) in function.layout.iter().enumerate() {
        let layout_successor = function.layout.get(position + 1).copied();

        let mut graph = build::build_graph(function, block, layout_successor, &values, options)?;
        let rewrites = combine::combine(&mut graph, options)?;
        let lowered = emit::linearize(&graph, &mut output)?;

        tracing::trace!(
            block = %block,
            nodes = graph.nodes.len(),
            rewrites,
            instructions = lowered.instructions.len(),
            "selected block"
        );

        output.blocks.push(lowered);
    }

    Ok(output)
}

/// Maps a MIR block onto the LIR block selected from it
pub fn lir_block(block: mir::BlockId) -> lir::BlockId {
    lir::BlockId::from_u32(block.as_u32())
}

/// Maps a MIR value onto the virtual register holding it
pub fn lir_register(value: mir::ValueId) -> lir::VirtualRegister {
    lir::VirtualRegister::from_u32(value.as_u32())
}
