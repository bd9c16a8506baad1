use super::type_of;
use crate::ast::{Arena, AssignOp, BinaryOp, Literal, Node, NodeId, Order, UnaryOp, walk};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Tidies assignments and boolean expressions: compound assignments, increments, and redundant
/// comparisons against boolean constants.
pub struct SimplifyAssignments;

impl Transform for SimplifyAssignments {
    fn name(&self) -> &'static str {
        "SimplifyAssignments"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        walk(arena, root, Order::Post, |arena, id| {
            match arena[id] {
                Node::Assignment { .. } => handle_assignment(arena, id),
                Node::Unary {
                    op: UnaryOp::Not, ..
                } => handle_double_negation(arena, id),
                Node::Unary {
                    op: UnaryOp::PreIncrement | UnaryOp::PreDecrement,
                    ..
                } => handle_prefix_update(arena, id),
                Node::Conditional { .. } => handle_boolean_conditional(arena, id),
                Node::Binary {
                    op: BinaryOp::Eq | BinaryOp::Ne,
                    ..
                } => handle_boolean_comparison(arena, id),
                _ => {}
            }
            Ok(())
        })
    }
}

/// Whether evaluating the assignment target twice reads and writes the same location as evaluating
/// it once.
fn is_stable_target(arena: &Arena, target: NodeId) -> bool {
    match &arena[target] {
        Node::Indexer { target, index } => {
            arena.is_side_effect_free(*target) && arena.is_side_effect_free(*index)
        }
        Node::Identifier { .. } | Node::MemberReference { .. } => arena.is_side_effect_free(target),
        _ => false,
    }
}

fn is_statement_expression(arena: &Arena, id: NodeId) -> bool {
    arena
        .parent(id)
        .is_some_and(|parent| matches!(arena[parent], Node::ExpressionStatement { .. }))
}

fn as_bool(arena: &Arena, id: NodeId) -> Option<bool> {
    match arena[id].as_literal() {
        Some(Literal::Bool(value)) => Some(*value),
        _ => None,
    }
}

fn handle_assignment(arena: &mut Arena, assignment: NodeId) {
    let Node::Assignment { op, target, value } = arena[assignment] else {
        return;
    };

    // x = x op y  ->  x op= y
    let mut op = op;
    let mut value = value;
    if op == AssignOp::Assign
        && let Node::Binary {
            op: binary,
            left,
            right,
        } = arena[value]
        && let Some(compound) = binary.compound()
        && is_stable_target(arena, target)
        && arena.same_structure(left, target)
    {
        arena.replace(value, right);
        if let Node::Assignment { op: slot, .. } = arena.node_mut(assignment) {
            *slot = compound;
        }
        trace!(assignment = %arena.debug(&assignment), "introduced compound assignment");
        op = compound;
        value = right;
    }

    // x += 1  ->  x++
    let update = match op {
        AssignOp::Add => UnaryOp::PostIncrement,
        AssignOp::Sub => UnaryOp::PostDecrement,
        _ => return,
    };
    let is_one = matches!(arena[value].as_literal(), Some(Literal::Int(1)));
    let numeric = type_of(arena, target)
        .and_then(|ty| ty.primitive())
        .is_some_and(|primitive| primitive.is_numeric());
    if is_one && numeric && is_statement_expression(arena, assignment) {
        let increment = arena.unary(update, target);
        arena.replace(assignment, increment);
        trace!(update = %arena.debug(&increment), "introduced increment");
    }
}

// ++x as a statement reads better as x++.
fn handle_prefix_update(arena: &mut Arena, unary: NodeId) {
    if !is_statement_expression(arena, unary) {
        return;
    }
    if let Node::Unary { op, .. } = arena.node_mut(unary) {
        *op = match *op {
            UnaryOp::PreIncrement => UnaryOp::PostIncrement,
            _ => UnaryOp::PostDecrement,
        };
    }
}

// !!x -> x
fn handle_double_negation(arena: &mut Arena, outer: NodeId) {
    let Node::Unary { operand: inner, .. } = arena[outer] else {
        return;
    };
    if let Node::Unary {
        op: UnaryOp::Not,
        operand,
    } = arena[inner]
    {
        arena.replace(outer, operand);
        trace!("removed double negation");
    }
}

// c ? true : false -> c, c ? false : true -> !c
fn handle_boolean_conditional(arena: &mut Arena, conditional: NodeId) {
    let Node::Conditional {
        condition,
        then,
        otherwise,
    } = arena[conditional]
    else {
        return;
    };
    let negated = match (as_bool(arena, then), as_bool(arena, otherwise)) {
        (Some(true), Some(false)) => false,
        (Some(false), Some(true)) => true,
        _ => return,
    };
    arena.replace(conditional, condition);
    if negated {
        arena.negate(condition);
    }
    trace!("collapsed boolean conditional");
}

// b == true -> b, b != true -> !b, and the same with the constant on the left
fn handle_boolean_comparison(arena: &mut Arena, comparison: NodeId) {
    let Node::Binary { op, left, right } = arena[comparison] else {
        return;
    };
    let (operand, constant) = match (as_bool(arena, left), as_bool(arena, right)) {
        (None, Some(constant)) => (left, constant),
        (Some(constant), None) => (right, constant),
        _ => return,
    };
    arena.replace(comparison, operand);
    if constant != (op == BinaryOp::Eq) {
        arena.negate(operand);
    }
    trace!("removed comparison with boolean constant");
}
