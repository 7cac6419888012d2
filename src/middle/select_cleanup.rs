//! Removal of doubled selects
//!
//! Lowering a divergent `if` merges every assigned value twice: once per lane
//! with the condition mask, once more guarded by "any lane active". The outer
//! select is redundant because the inner one already keeps `old` in the
//! inactive lanes:
//!
//! ```text
//! %c = cmp.ne (bitcast %mask), 0
//! %s = select %mask, %new, %old
//! %r = select %c, %s, %old        ; same as %s
//!
//! %r = select %c, %mask, 0        ; same as %mask
//! ```
//!
//! The `eq` forms with swapped arms are handled the same way.

use crate::middle::mir::{CondCode, Function, InstructionKind, Location, Operand, ValueId};

/// The mask `condition` tests for any active lane, and whether the test is
/// negated (`eq 0` rather than `ne 0`)
fn any_lane_test(function: &Function, condition: Operand) -> Option<(Operand, bool)> {
    let InstructionKind::Compare {
        condition: code,
        lhs: Operand::Value(cast),
        rhs,
    } = &function.defining_instruction(condition.as_value()?)?.kind
    else {
        return None;
    };

    if rhs.as_constant() != Some(0) {
        return None;
    }

    let negated = match code {
        CondCode::Ne => false,
        CondCode::Eq => true,
        _ => return None,
    };

    let InstructionKind::Bitcast { value: mask } = &function.defining_instruction(*cast)?.kind else {
        return None;
    };

    Some((*mask, negated))
}

/// What the select `kind` can be replaced with, if it is redundant
fn redundant_select(function: &Function, kind: &InstructionKind) -> Option<Operand> {
    let InstructionKind::Select {
        condition,
        on_true,
        on_false,
    } = kind
    else {
        return None;
    };

    let (mask, negated) = any_lane_test(function, *condition)?;
    let (taken, otherwise) = if negated {
        (*on_false, *on_true)
    } else {
        (*on_true, *on_false)
    };

    if taken == mask && otherwise.as_constant() == Some(0) {
        return Some(mask);
    }

    let InstructionKind::Select {
        condition: inner_mask,
        on_false: inner_old,
        ..
    } = &function.defining_instruction(taken.as_value()?)?.kind
    else {
        return None;
    };

    (*inner_mask == mask && *inner_old == otherwise).then_some(taken)
}

fn find_redundant_select(function: &Function) -> Option<(Location, ValueId, Operand)> {
    function.instructions().find_map(|(location, instruction)| {
        let result = instruction.result?;
        let replacement = redundant_select(function, &instruction.kind)?;
        Some((location, result, replacement))
    })
}

/// Rewires the users of every redundant outer select and removes it.
/// Returns whether anything changed.
pub fn remove_redundant_selects(function: &mut Function) -> bool {
    let mut changed = false;

    while let Some((location, result, replacement)) = find_redundant_select(function) {
        let uses = function.replace_all_uses(result, replacement);
        function.remove(location);

        tracing::debug!(
            function = %function.name,
            select = %result,
            %replacement,
            uses,
            "removed redundant select"
        );
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{
        mir::Terminator,
        ty::{ScalarType, Type},
    };

    const LANES: u32 = 64;

    struct Fixture {
        function: Function,
        mask: ValueId,
        new: ValueId,
        old: ValueId,
        any: ValueId,
    }

    fn fixture(code: CondCode) -> Fixture {
        let mut function = Function::new("merge");
        let entry = function.entry();
        let lanes = Type::vector(ScalarType::I32, LANES);

        let mask = function.add_parameter(Type::mask(LANES));
        let new = function.add_parameter(lanes);
        let old = function.add_parameter(lanes);

        let cast = function.push(entry, InstructionKind::Bitcast { value: mask.into() }, Type::I64);
        let any = function.push(
            entry,
            InstructionKind::Compare {
                condition: code,
                lhs: cast.into(),
                rhs: Operand::constant(0, Type::I64),
            },
            Type::BOOL,
        );

        Fixture {
            function,
            mask,
            new,
            old,
            any,
        }
    }

    fn returning(function: &mut Function, value: ValueId) {
        let entry = function.entry();
        function.set_terminator(
            entry,
            Terminator::Return {
                value: Some(value.into()),
            },
        );
    }

    fn merged(mut fixture: Fixture, swapped: bool) -> (Function, ValueId) {
        let entry = fixture.function.entry();
        let lanes = fixture.function.value_type(fixture.new);

        let inner = fixture.function.push(
            entry,
            InstructionKind::Select {
                condition: fixture.mask.into(),
                on_true: fixture.new.into(),
                on_false: fixture.old.into(),
            },
            lanes,
        );
        let (on_true, on_false) = if swapped {
            (fixture.old.into(), inner.into())
        } else {
            (inner.into(), fixture.old.into())
        };
        let outer = fixture.function.push(
            entry,
            InstructionKind::Select {
                condition: fixture.any.into(),
                on_true,
                on_false,
            },
            lanes,
        );
        returning(&mut fixture.function, outer);

        (fixture.function, inner)
    }

    fn returned(function: &Function) -> Option<Operand> {
        match function.blocks[function.entry()].terminator {
            Terminator::Return { value } => value,
            _ => None,
        }
    }

    #[test]
    fn doubled_select_collapses_to_the_inner_one() {
        for (code, swapped) in [(CondCode::Ne, false), (CondCode::Eq, true)] {
            let (mut function, inner) = merged(fixture(code), swapped);

            assert!(remove_redundant_selects(&mut function));
            assert_eq!(returned(&function), Some(inner.into()));
            assert_eq!(function.blocks[function.entry()].instructions.len(), 3);
        }
    }

    #[test]
    fn mask_selected_against_zero_is_the_mask() {
        let mut fixture = fixture(CondCode::Ne);
        let entry = fixture.function.entry();
        let outer = fixture.function.push(
            entry,
            InstructionKind::Select {
                condition: fixture.any.into(),
                on_true: fixture.mask.into(),
                on_false: Operand::constant(0, Type::mask(LANES)),
            },
            Type::mask(LANES),
        );
        returning(&mut fixture.function, outer);

        assert!(remove_redundant_selects(&mut fixture.function));
        assert_eq!(returned(&fixture.function), Some(fixture.mask.into()));
    }

    #[test]
    fn arms_must_match_the_test() {
        // `ne` with the arms of the `eq` form keeps old values in active lanes
        let (mut function, _) = merged(fixture(CondCode::Ne), true);
        let before = function.blocks[function.entry()].instructions.clone();

        assert!(!remove_redundant_selects(&mut function));
        assert_eq!(function.blocks[function.entry()].instructions, before);
    }

    #[test]
    fn inner_select_must_keep_the_same_old_value() {
        let mut fixture = fixture(CondCode::Ne);
        let entry = fixture.function.entry();
        let lanes = fixture.function.value_type(fixture.new);

        let inner = fixture.function.push(
            entry,
            InstructionKind::Select {
                condition: fixture.mask.into(),
                on_true: fixture.new.into(),
                on_false: fixture.new.into(),
            },
            lanes,
        );
        let outer = fixture.function.push(
            entry,
            InstructionKind::Select {
                condition: fixture.any.into(),
                on_true: inner.into(),
                on_false: fixture.old.into(),
            },
            lanes,
        );
        returning(&mut fixture.function, outer);

        assert!(!remove_redundant_selects(&mut fixture.function));
    }
}
