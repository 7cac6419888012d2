//! Predicate combiner
//!
//! Two rewrites over lane masks, each written as a pure match from a node of
//! the graph to a [`Rewrite`] describing the replacement:
//!
//! 1. `brcond (setcc (bitcast mask), C, cc)` becomes a mask branch on `mask`
//!    directly: `(eq, all ones)` is `jmp.all`, `(ne, 0)` is `jmp.any` and
//!    `(eq, 0)` is `jmp.none`.
//! 2. `zero_extend b` of a boolean or mask becomes `select b, 1, 0` with the
//!    constants broadcast to the destination vector type.
//!
//! A rewrite either fires and replaces every use of the matched node, or does
//! not fire at all.

use crate::{
    backend::{
        isel::{Node, NodeId, Opcode, SelectionGraph},
        lir::MaskCondition,
    },
    error::{LoweringError, LoweringResult},
    middle::{
        mir::CondCode,
        ty::{LaneType, ScalarType, Type},
    },
    options::CodegenOptions,
};

/// Operand of a node created by a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOperand {
    /// A node already in the graph
    Existing(NodeId),
    /// An earlier node of the same rewrite, by position
    New(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub opcode: Opcode,
    pub ty: Type,
    pub operands: Vec<RewriteOperand>,
}

/// Replacement for the node `root`: the nodes to create, in dependency order.
/// The last one takes over every use of `root`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub root: NodeId,
    pub nodes: Vec<NewNode>,
}

/// Runs both patterns until neither fires. Returns the number of rewrites.
pub fn combine(graph: &mut SelectionGraph, options: &CodegenOptions) -> LoweringResult<usize> {
    let mut rewrites = 0;

    'outer: loop {
        for id in graph.live_nodes() {
            let rewrite = match graph.node(id).opcode {
                Opcode::BranchCond(_) => match_branch_on_mask(graph, id, options)?,
                Opcode::ZeroExtend => match_mask_materialization(graph, id, options),
                _ => None,
            };

            if let Some(rewrite) = rewrite {
                tracing::debug!(
                    block = %graph.block,
                    node = %id,
                    from = %graph.node(id).opcode,
                    to = %rewrite.nodes.last().map_or(graph.node(id).opcode, |node| node.opcode),
                    "combined"
                );

                apply(graph, rewrite);
                rewrites += 1;
                continue 'outer;
            }
        }

        return Ok(rewrites);
    }
}

/// Adds the nodes of `rewrite` to the graph and rewires the uses of its root.
/// Returns the node that replaced the root.
pub fn apply(graph: &mut SelectionGraph, rewrite: Rewrite) -> NodeId {
    let mut created: Vec<NodeId> = Vec::with_capacity(rewrite.nodes.len());

    for node in rewrite.nodes {
        let operands = node
            .operands
            .iter()
            .map(|operand| match operand {
                RewriteOperand::Existing(id) => *id,
                RewriteOperand::New(index) => created[*index],
            })
            .collect();

        created.push(graph.nodes.push(Node {
            opcode: node.opcode,
            ty: node.ty,
            operands,
        }));
    }

    let Some(&replacement) = created.last() else {
        return rewrite.root;
    };

    graph.replace_all_uses(rewrite.root, replacement);
    replacement
}

/// Whether `value` has all of the low `bits` bits set
fn is_all_ones(value: i64, bits: u32) -> bool {
    match bits {
        0 => false,
        64.. => value == -1,
        _ => value == -1 || value == (1i64 << bits) - 1,
    }
}

/// Pattern 1: a conditional branch on a compare of a bitcast mask
pub fn match_branch_on_mask(
    graph: &SelectionGraph,
    branch: NodeId,
    options: &CodegenOptions,
) -> LoweringResult<Option<Rewrite>> {
    let Opcode::BranchCond(target) = graph.node(branch).opcode else {
        return Ok(None);
    };

    let Some(&compare) = graph.node(branch).operands.first() else {
        return Ok(None);
    };
    let compare = graph.node(compare);
    let Opcode::SetCC(condition) = compare.opcode else {
        return Ok(None);
    };

    let [bitcast, constant] = compare.operands[..] else {
        return Ok(None);
    };
    let (bitcast, constant) = (graph.node(bitcast), graph.node(constant));
    let (Opcode::Bitcast, Opcode::Constant(value)) = (bitcast.opcode, constant.opcode) else {
        return Ok(None);
    };

    let Some(&mask) = bitcast.operands.first() else {
        return Ok(None);
    };

    let mask_ty = graph.node(mask).ty;
    if mask_ty == Type::Unit {
        return Err(LoweringError::InvalidMaskOperand {
            node: mask,
            block: graph.block,
        });
    }
    if mask_ty != Type::mask(options.simd_width) {
        return Ok(None);
    }

    let condition = match condition {
        CondCode::Eq if is_all_ones(value, constant.ty.bits()) => MaskCondition::All,
        CondCode::Ne if value == 0 => MaskCondition::Any,
        CondCode::Eq if value == 0 => MaskCondition::None,
        _ => {
            tracing::trace!(%condition, value, "mask compare not combinable");
            return Ok(None);
        }
    };

    Ok(Some(Rewrite {
        root: branch,
        nodes: vec![NewNode {
            opcode: Opcode::MaskBranch { condition, target },
            ty: Type::Unit,
            operands: vec![RewriteOperand::Existing(mask)],
        }],
    }))
}

/// Pattern 2: a zero extension of a boolean or mask to the natural integer
/// widths of the target
pub fn match_mask_materialization(
    graph: &SelectionGraph,
    extend: NodeId,
    options: &CodegenOptions,
) -> Option<Rewrite> {
    let node = graph.node(extend);
    if node.opcode != Opcode::ZeroExtend {
        return None;
    }

    let destination = node.ty;
    let lanes = options.simd_width;
    let vector = Type::vector(ScalarType::I32, lanes);
    if destination != Type::I32 && destination != Type::I64 && destination != vector {
        return None;
    }

    let source = *node.operands.first()?;
    let source_ty = graph.node(source).ty;
    if source_ty != Type::BOOL && source_ty != Type::mask(lanes) {
        return None;
    }
    if source_ty.lane_count() != destination.lane_count() {
        return None;
    }

    let element = Type::Scalar(if destination == Type::I64 {
        ScalarType::I64
    } else {
        ScalarType::I32
    });

    let mut nodes = vec![
        NewNode {
            opcode: Opcode::Constant(0),
            ty: element,
            operands: vec![],
        },
        NewNode {
            opcode: Opcode::Constant(1),
            ty: element,
            operands: vec![],
        },
    ];

    let (zero, one) = if destination == vector {
        for lane in [0, 1] {
            nodes.push(NewNode {
                opcode: Opcode::BuildVector,
                ty: vector,
                operands: vec![RewriteOperand::New(lane); lanes as usize],
            });
        }
        (RewriteOperand::New(2), RewriteOperand::New(3))
    } else {
        (RewriteOperand::New(0), RewriteOperand::New(1))
    };

    nodes.push(NewNode {
        opcode: Opcode::Select,
        ty: destination,
        operands: vec![RewriteOperand::Existing(source), one, zero],
    });

    Some(Rewrite {
        root: extend,
        nodes,
    })
}
