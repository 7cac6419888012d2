//! Block layout in reverse post order

use hashbrown::HashSet;

use crate::middle::{loops::reverse_post_order, mir::Function};

/// Lays the blocks of `function` out in reverse post order from the entry.
/// Unreachable blocks keep their relative order after the reachable ones.
/// Returns whether the layout changed.
pub fn order_blocks(function: &mut Function) -> bool {
    let mut layout = reverse_post_order(function);
    let reachable: HashSet<_> = layout.iter().copied().collect();

    layout.extend(
        function
            .layout
            .iter()
            .copied()
            .filter(|block| !reachable.contains(block)),
    );

    if layout == function.layout {
        return false;
    }

    tracing::debug!(
        function = %function.name,
        before = ?function.layout,
        after = ?layout,
        "reordered blocks"
    );

    function.layout = layout;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{
        mir::{BlockId, Terminator},
        ty::Type,
    };

    #[test]
    fn blocks_follow_control_flow() {
        let mut function = Function::new("order");
        let flag = function.add_parameter(Type::BOOL);
        let entry = function.entry();
        let exit = function.add_block();
        let dead = function.add_block();
        let body = function.add_block();

        function.set_terminator(
            entry,
            Terminator::Branch {
                condition: flag.into(),
                positive: body,
                negative: body,
            },
        );
        function.set_terminator(body, Terminator::Jump { target: exit });
        function.set_terminator(dead, Terminator::Jump { target: exit });

        assert!(order_blocks(&mut function));
        assert_eq!(function.layout, vec![entry, body, exit, dead]);

        assert!(!order_blocks(&mut function));
    }

    #[test]
    fn ordered_layout_is_kept() {
        let mut function = Function::new("straight");
        let entry = function.entry();
        let next = function.add_block();
        function.set_terminator(entry, Terminator::Jump { target: next });

        assert!(!order_blocks(&mut function));
        assert_eq!(function.layout, vec![BlockId::ZERO, next]);
    }
}
