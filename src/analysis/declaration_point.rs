//! Where a declaration can go.
//!
//! The search walks a block looking for the statements that use a local (or a local class). A
//! declaration can sink into a nested statement when that statement is the only user, only uses the
//! local inside its nested blocks, and no later statement of the block reads a value assigned there.

use super::{AssignmentStatus, DefiniteAssignment};
use crate::ast::{Arena, AssignOp, Name, Node, NodeId, TypeRef};
use rustc_hash::FxHashSet;

/// What is being declared.
#[derive(Clone, Copy, Debug)]
pub enum Subject<'a> {
    /// A local variable.
    Variable(&'a str),
    /// A local class, by binary name.
    Type(&'a str),
}

impl Subject<'_> {
    pub fn is_used_by(&self, arena: &Arena, id: NodeId) -> bool {
        match self {
            Self::Variable(name) => arena.uses_variable(id, name),
            Self::Type(name) => arena.mentions_type(id, name),
        }
    }
}

/// The result of scanning one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeclarationPoint {
    /// The first statement of the block that uses the subject, if any does.
    pub statement: Option<NodeId>,
    /// Whether every use can be confined to nested blocks of one statement, so that the
    /// declaration could move further in.
    pub can_move_into_sub_blocks: bool,
}

/// Scans the statements of `block` (after `skip_up_through`, if given) for uses of `subject`.
pub fn find_declaration_point(
    arena: &Arena,
    subject: Subject<'_>,
    allow_pass_into_loops: bool,
    block: NodeId,
    skip_up_through: Option<NodeId>,
) -> DeclarationPoint {
    let mut point = DeclarationPoint {
        statement: None,
        can_move_into_sub_blocks: false,
    };

    if let Subject::Variable(name) = subject
        && let Some(parent) = arena.parent(block)
        && matches!(&arena[parent], Node::Catch { name: caught, .. } if caught == name)
    {
        return point;
    }

    let Node::Block { statements } = &arena[block] else {
        return point;
    };

    let mut wait_for = skip_up_through;
    for statement in statements {
        if let Some(skipped) = wait_for {
            if *statement == skipped {
                wait_for = None;
            }
            continue;
        }
        if !subject.is_used_by(arena, *statement) {
            continue;
        }

        if point.statement.is_some() {
            point.can_move_into_sub_blocks = can_redeclare(arena, subject, block, *statement);
            return point;
        }
        point.statement = Some(*statement);

        if !can_move_into_sub_block(arena, subject, block, *statement, allow_pass_into_loops) {
            return point;
        }

        // A later statement must not read a value assigned inside the nested block.
        if let Subject::Variable(name) = subject
            && let Some(next) = arena.next_sibling(*statement)
        {
            let mut analysis = DefiniteAssignment::new(arena, block);
            analysis.set_analyzed_range(next, block);
            analysis.analyze(name, AssignmentStatus::PotentiallyAssigned);
            if !analysis.unassigned_uses().is_empty() {
                return point;
            }
        }
    }

    point.can_move_into_sub_blocks = true;
    point
}

/// Whether all uses of `subject` in `statement` lie inside its nested blocks, or in a header that
/// can declare it.
pub fn can_move_into_sub_block(
    arena: &Arena,
    subject: Subject<'_>,
    block: NodeId,
    statement: NodeId,
    allow_pass_into_loops: bool,
) -> bool {
    if !allow_pass_into_loops && arena[statement].is_loop() {
        return false;
    }

    if let Subject::Variable(name) = subject {
        match &arena[statement] {
            Node::For { initializers, .. } if !initializers.is_empty() => {
                match can_declare_in_for_header(arena, name, block, statement, initializers) {
                    Some(true) => return true,
                    Some(false) => {}
                    None => return false,
                }
            }
            Node::Try { resources, .. } => {
                if resources
                    .iter()
                    .any(|resource| declares(arena, *resource, name))
                {
                    return true;
                }
            }
            _ => {}
        }
    }

    // Uses in expressions such as a loop condition pin the declaration to this block.
    for child in arena.children(statement) {
        if is_block(arena, child) || !subject.is_used_by(arena, child) {
            continue;
        }
        if !has_nested_blocks(arena, child) {
            return false;
        }
        if arena
            .children(child)
            .into_iter()
            .any(|grandchild| !is_block(arena, grandchild) && subject.is_used_by(arena, grandchild))
        {
            return false;
        }
    }
    true
}

// For headers of the form `a = x, b = y` can become `T a = x, b = y` when all the variables share
// a type and all of them can be declared right there. `None` means the loop must not receive the
// declaration at all.
fn can_declare_in_for_header(
    arena: &Arena,
    name: &str,
    block: NodeId,
    statement: NodeId,
    initializers: &[NodeId],
) -> Option<bool> {
    let mut result = false;
    let mut header_type: Option<&TypeRef> = None;
    let mut names: FxHashSet<&Name> = FxHashSet::default();

    for initializer in initializers {
        let Node::ExpressionStatement { expression } = &arena[*initializer] else {
            continue;
        };
        let Node::Assignment {
            op: AssignOp::Assign,
            target,
            value,
        } = &arena[*expression]
        else {
            continue;
        };
        let Some(assigned) = arena[*target].as_identifier() else {
            continue;
        };

        if arena.uses_variable(*value, name) {
            return None;
        }
        let variable = arena.meta(*target).variable.as_ref()?;
        if variable.is_parameter {
            return None;
        }
        match header_type {
            None => header_type = Some(&variable.ty),
            Some(ty) if *ty != variable.ty => return None,
            Some(_) => {}
        }
        if !names.insert(assigned) {
            return None;
        }

        if result {
            let point = find_declaration_point(
                arena,
                Subject::Variable(assigned),
                true,
                block,
                None,
            );
            if !point.can_move_into_sub_blocks || point.statement != Some(statement) {
                return None;
            }
        } else if assigned == name {
            result = true;
        }
    }
    Some(result)
}

/// Whether a second statement using the subject can declare its own copy.
fn can_redeclare(arena: &Arena, subject: Subject<'_>, block: NodeId, statement: NodeId) -> bool {
    // A class declaration is moved, never duplicated.
    let Subject::Variable(name) = subject else {
        return false;
    };
    match &arena[statement] {
        Node::For { initializers, .. } => {
            for initializer in initializers {
                if declares(arena, *initializer, name) {
                    return true;
                }
                if let Node::ExpressionStatement { expression } = &arena[*initializer]
                    && let Node::Assignment { target, value, .. } = &arena[*expression]
                    && arena[*target].as_identifier().is_some_and(|n| n == name)
                    && !arena.uses_variable(*value, name)
                {
                    return true;
                }
            }
        }
        Node::ForEach { variable, .. } => {
            if declares(arena, *variable, name) {
                return true;
            }
        }
        Node::Try { resources, .. } => {
            if resources
                .iter()
                .any(|resource| declares(arena, *resource, name))
            {
                return true;
            }
        }
        _ => {}
    }

    let Some(siblings) = arena.siblings(statement) else {
        return false;
    };
    siblings
        .iter()
        .take_while(|sibling| **sibling != statement)
        .filter(|sibling| subject.is_used_by(arena, **sibling))
        .all(|sibling| can_move_into_sub_block(arena, subject, block, *sibling, true))
}

/// Statements whose children can hold blocks a declaration may move into: loops and labels with
/// block bodies, try statements, catch clauses and switch sections.
pub fn has_nested_blocks(arena: &Arena, id: NodeId) -> bool {
    match &arena[id] {
        Node::While { body, .. }
        | Node::DoWhile { body, .. }
        | Node::For { body, .. }
        | Node::ForEach { body, .. }
        | Node::Labeled {
            statement: body, ..
        } => is_block(arena, *body),
        Node::Try { .. } | Node::Catch { .. } | Node::SwitchSection { .. } => true,
        _ => false,
    }
}

fn is_block(arena: &Arena, id: NodeId) -> bool {
    matches!(arena[id], Node::Block { .. })
}

fn declares(arena: &Arena, declaration: NodeId, name: &str) -> bool {
    arena.declares_variable(declaration, name)
}

/// The statement at or above which the single-variable `declaration` could be placed so that it
/// ends up as close to `target` as possible. `target` must lie below the declaration's block.
///
/// Blocks between the two are tried outermost first; the last block that still lets the declaration
/// move in determines the answer.
pub fn can_move_declaration_into(
    arena: &Arena,
    declaration: NodeId,
    target: NodeId,
) -> Option<NodeId> {
    let parent = arena.parent(declaration)?;
    let Node::VariableDeclaration { variables, .. } = &arena[declaration] else {
        return None;
    };
    let name = arena[*variables.first()?].declared_name()?;

    let mut blocks: Vec<NodeId> = arena
        .ancestors(target)
        .take_while(|ancestor| *ancestor != parent)
        .filter(|ancestor| is_block(arena, *ancestor))
        .collect();
    blocks.push(parent);
    blocks.reverse();

    let mut result = None;
    for block in blocks {
        let point = find_declaration_point(arena, Subject::Variable(name), true, block, None);
        if !point.can_move_into_sub_blocks {
            break;
        }
        result = point.statement;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeRef;

    fn use_x(arena: &mut Arena) -> NodeId {
        let x = arena.ident("x");
        let out = arena.ident("System.out");
        let call = arena.invoke(out, "println", vec![x]);
        arena.expr_stmt(call)
    }

    fn assign_x(arena: &mut Arena) -> NodeId {
        let x = arena.local("x", TypeRef::int());
        let one = arena.int(1);
        let assignment = arena.assign(x, one);
        arena.expr_stmt(assignment)
    }

    #[test]
    fn confined_to_branch() {
        let mut arena = Arena::new();
        let assignment = assign_x(&mut arena);
        let read = use_x(&mut arena);
        let then = arena.block(vec![assignment, read]);
        let condition = arena.ident("c");
        let branch = arena.if_(condition, then, None);
        let other = arena.ident("y");
        let other = arena.expr_stmt(other);
        let block = arena.block(vec![branch, other]);

        let point = find_declaration_point(&arena, Subject::Variable("x"), true, block, None);
        assert_eq!(point.statement, Some(branch));
        assert!(point.can_move_into_sub_blocks);
    }

    #[test]
    fn value_escapes_branch() {
        let mut arena = Arena::new();
        let assignment = assign_x(&mut arena);
        let then = arena.block(vec![assignment]);
        let condition = arena.ident("c");
        let branch = arena.if_(condition, then, None);
        let read = use_x(&mut arena);
        let block = arena.block(vec![branch, read]);

        let point = find_declaration_point(&arena, Subject::Variable("x"), true, block, None);
        assert_eq!(point.statement, Some(branch));
        assert!(!point.can_move_into_sub_blocks);
    }

    #[test]
    fn used_in_loop_condition() {
        let mut arena = Arena::new();
        let x = arena.ident("x");
        let zero = arena.int(0);
        let condition = arena.binary(crate::ast::BinaryOp::Gt, x, zero);
        let assignment = assign_x(&mut arena);
        let body = arena.block(vec![assignment]);
        let looped = arena.while_(condition, body);
        let block = arena.block(vec![looped]);
        assert!(!can_move_into_sub_block(
            &arena,
            Subject::Variable("x"),
            block,
            looped,
            true
        ));
    }

    #[test]
    fn independent_reuse_can_redeclare() {
        let mut arena = Arena::new();
        let first = assign_x(&mut arena);
        let first_read = use_x(&mut arena);
        let first_block = arena.block(vec![first, first_read]);
        let c = arena.ident("c");
        let first_if = arena.if_(c, first_block, None);
        let second = assign_x(&mut arena);
        let second_read = use_x(&mut arena);
        let second_block = arena.block(vec![second, second_read]);
        let d = arena.ident("d");
        let second_if = arena.if_(d, second_block, None);
        let block = arena.block(vec![first_if, second_if]);

        let point = find_declaration_point(&arena, Subject::Variable("x"), true, block, None);
        assert_eq!(point.statement, Some(first_if));
        assert!(point.can_move_into_sub_blocks);
    }

    #[test]
    fn moving_into_loop() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let assignment = assign_x(&mut arena);
        let read = use_x(&mut arena);
        let body = arena.block(vec![assignment, read]);
        let condition = arena.ident("c");
        let looped = arena.while_(condition, body);
        let method_body = arena.block(vec![declaration, looped]);

        assert_eq!(arena.parent(looped), Some(method_body));
        assert_eq!(
            can_move_declaration_into(&arena, declaration, looped),
            Some(looped)
        );
        // The body cannot take it: its first statement uses the variable outside a nested block.
        assert_eq!(
            can_move_declaration_into(&arena, declaration, assignment),
            Some(looped)
        );
    }

    #[test]
    fn catch_variable_is_not_redeclared() {
        let mut arena = Arena::new();
        let read = use_x(&mut arena);
        let body = arena.block(vec![read]);
        let catch = arena.alloc(Node::Catch {
            types: vec![TypeRef::class("java.lang.Exception")],
            name: Name::from("x"),
            body,
        });
        let point = find_declaration_point(&arena, Subject::Variable("x"), true, body, None);
        assert_eq!(point.statement, None);
        assert!(!point.can_move_into_sub_blocks);
        assert_eq!(arena.parent(body), Some(catch));
    }
}
