use super::type_of;
use crate::ast::{Arena, AssignOp, BinaryOp, Node, NodeId, Order, UnaryOp, walk};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Folds negative right operands into the operator: `x + -1` becomes `x - 1`.
pub struct SimplifyArithmetic;

impl Transform for SimplifyArithmetic {
    fn name(&self) -> &'static str {
        "SimplifyArithmetic"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        walk(arena, root, Order::Post, |arena, id| {
            match arena[id] {
                Node::Binary {
                    op: BinaryOp::Add | BinaryOp::Sub,
                    ..
                } => handle_binary(arena, id),
                Node::Assignment {
                    op: AssignOp::Add | AssignOp::Sub,
                    ..
                } => handle_compound(arena, id),
                _ => {}
            }
            Ok(())
        })
    }
}

fn is_numeric(arena: &Arena, id: NodeId) -> bool {
    // Sign and complement operators keep the (promoted) numeric type of their operand.
    if let Node::Unary {
        op: UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot,
        operand,
    } = arena[id]
        && type_of(arena, id).is_none()
    {
        return is_numeric(arena, operand);
    }
    let ty = type_of(arena, id)
        .cloned()
        .or_else(|| arena[id].as_literal().map(|literal| literal.ty()));
    ty.and_then(|ty| ty.primitive())
        .is_some_and(|primitive| primitive.is_numeric())
}

/// Replaces a negated operand by its absolute form, returning whether it was negative.
fn take_negation(arena: &mut Arena, operand: NodeId) -> bool {
    if let Node::Unary {
        op: UnaryOp::Neg,
        operand: inner,
    } = arena[operand]
    {
        arena.replace(operand, inner);
        return true;
    }
    let Some(literal) = arena[operand].as_literal() else {
        return false;
    };
    if !literal.is_negative() {
        return false;
    }
    let Some(positive) = literal.negated() else {
        return false;
    };
    if let Node::Literal { value } = arena.node_mut(operand) {
        *value = positive;
    }
    true
}

fn is_negative(arena: &Arena, operand: NodeId) -> bool {
    match &arena[operand] {
        Node::Unary {
            op: UnaryOp::Neg, ..
        } => true,
        Node::Literal { value } => value.is_negative() && value.negated().is_some(),
        _ => false,
    }
}

// x + -c -> x - c, x - -c -> x + c
fn handle_binary(arena: &mut Arena, binary: NodeId) {
    let Node::Binary { op, left, right } = arena[binary] else {
        return;
    };
    // `"a" + -1` concatenates.
    if !is_numeric(arena, left) || !is_numeric(arena, right) || !is_negative(arena, right) {
        return;
    }
    take_negation(arena, right);
    if let Node::Binary { op: slot, .. } = arena.node_mut(binary) {
        *slot = match op {
            BinaryOp::Add => BinaryOp::Sub,
            _ => BinaryOp::Add,
        };
    }
    trace!(expression = %arena.debug(&binary), "folded negative operand");
}

// x += -c -> x -= c
fn handle_compound(arena: &mut Arena, assignment: NodeId) {
    let Node::Assignment { op, target, value } = arena[assignment] else {
        return;
    };
    if !is_numeric(arena, target) || !is_numeric(arena, value) || !is_negative(arena, value) {
        return;
    }
    take_negation(arena, value);
    if let Node::Assignment { op: slot, .. } = arena.node_mut(assignment) {
        *slot = match op {
            AssignOp::Add => AssignOp::Sub,
            _ => AssignOp::Add,
        };
    }
    trace!(expression = %arena.debug(&assignment), "folded negative operand");
}
