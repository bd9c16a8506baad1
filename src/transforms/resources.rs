//! try-with-resources recovery.
//!
//! javac 7 and 8 expand `try (R r = init) body` into a try statement that records the primary
//! exception in a saved variable and closes the resource in `finally`, attaching close failures as
//! suppressed exceptions. javac 9 and 10 move the closing logic to a synthetic `$closeResource`
//! helper; javac 11 closes the resource inline in a catch-all handler and after the statement.

use super::{is_member_referenced, members, type_declarations};
use crate::analysis::can_move_declaration_into;
use crate::ast::{Arena, AssignOp, BinaryOp, Meta, Modifiers, Name, Node, NodeId, Role, TypeRef};
use crate::pattern::build::*;
use crate::pattern::{Match, Pattern};
use crate::{Context, InvariantViolation, Transform};
use std::sync::LazyLock;
use tracing::{debug, trace};

const CLOSE_RESOURCE: &str = "$closeResource";

fn throwable() -> Option<Vec<TypeRef>> {
    Some(vec![TypeRef::class("java.lang.Throwable")])
}

// try { r.close(); } catch (Throwable x) { t.addSuppressed(x); }
fn suppressed_close(resource: Pattern) -> Pattern {
    try_(
        vec![],
        embedded(expr_stmt(call(resource, "close", vec![]))),
        vec![named(
            "close_handler",
            catch(
                None,
                None,
                embedded(expr_stmt(call(
                    named("saved", any_ident()),
                    "addSuppressed",
                    vec![named("suppressed", any_ident())],
                ))),
            ),
        )],
        absent(),
    )
}

// `if (t != null) { <suppressed close> } else { r.close(); }` or `$closeResource(t, r);`
fn closing(resource: Pattern) -> Pattern {
    choice(vec![
        if_(
            binary(BinaryOp::Ne, named("saved", any_ident()), null()),
            embedded(suppressed_close(resource.clone())),
            embedded(expr_stmt(call(backref("resource"), "close", vec![]))),
        ),
        expr_stmt(invocation(
            choice(vec![
                ident(CLOSE_RESOURCE),
                member(type_ref(None), CLOSE_RESOURCE),
            ]),
            vec![named("saved", any_ident()), resource],
        )),
    ])
}

// Either form above, optionally behind `if (r != null)`.
fn guarded(statement: fn(Pattern) -> Pattern) -> Pattern {
    choice(vec![
        if_(
            binary(BinaryOp::Ne, named("resource", any_ident()), null()),
            embedded(statement(backref("resource"))),
            absent(),
        ),
        statement(named("resource", any_ident())),
    ])
}

// try { body } catch (Throwable x) { t = x; throw x; } finally { <closing> }
static SAVING_TRY: LazyLock<Pattern> = LazyLock::new(|| {
    try_(
        vec![],
        capture("body"),
        vec![named(
            "handler",
            catch(
                throwable(),
                None,
                block_of(vec![
                    expr_stmt(assign(named("saved", any_ident()), named("caught", any_ident()))),
                    throw(backref("caught")),
                ]),
            ),
        )],
        named("finally", block_of(vec![guarded(closing)])),
    )
});

// try { body } catch (Throwable t) { <suppressed close>; throw t; }
static INLINE_TRY: LazyLock<Pattern> = LazyLock::new(|| {
    try_(
        vec![],
        capture("body"),
        vec![named(
            "handler",
            catch(
                throwable(),
                None,
                block_of(vec![
                    guarded(suppressed_close),
                    throw(named("thrown", any_ident())),
                ]),
            ),
        )],
        absent(),
    )
});

// The close after a javac 11 statement: `[if (r != null)] r.close();`
static TRAILING_CLOSE: LazyLock<Pattern> =
    LazyLock::new(|| guarded(|resource| expr_stmt(call(resource, "close", vec![]))));

// t = null;
static SAVED_NULL: LazyLock<Pattern> =
    LazyLock::new(|| expr_stmt(assign(named("saved", any_ident()), null())));

/// Rebuilds `try (R r = init) { ... }` from the expansions javac 7 through 11 emit.
pub struct TryWithResources;

impl Transform for TryWithResources {
    fn name(&self) -> &'static str {
        "TryWithResources"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if arena.contains(root, id)
                && matches!(arena[id], Node::Try { .. })
                && arena.is_in_statement_list(id)
                && !handle_saving_try(arena, id)
            {
                handle_inline_try(arena, id);
            }
        }
        for ty in type_declarations(arena, root) {
            remove_close_resource(arena, root, ty);
        }
        Ok(())
    }
}

fn name_of(arena: &Arena, id: NodeId) -> Option<&Name> {
    arena[id].as_identifier()
}

fn same_name(arena: &Arena, a: NodeId, b: NodeId) -> bool {
    name_of(arena, a).is_some_and(|name| Some(name) == name_of(arena, b))
}

/// Whether the close failure handed to `addSuppressed` is the one the surrounding catch caught.
fn suppresses_close_failure(arena: &Arena, m: &Match) -> bool {
    match (m.get("close_handler"), m.get("suppressed")) {
        (Some(handler), Some(suppressed)) => {
            matches!(&arena[handler], Node::Catch { name, .. } if name_of(arena, suppressed) == Some(name))
        }
        (None, None) => true,
        _ => false,
    }
}

/// Whether a statement after the last one of `group` in the same list reads or writes `name`.
fn used_after(arena: &Arena, group: &[NodeId], name: &str) -> bool {
    let Some(&last) = group.last() else {
        return false;
    };
    arena
        .siblings(last)
        .into_iter()
        .flatten()
        .skip_while(|sibling| **sibling != last)
        .skip(1)
        .any(|sibling| arena.uses_variable(*sibling, name) || arena.assigns_variable(*sibling, name))
}

/// The statement initializing the resource: `r = init;` or `R r = init;`. Returns the
/// initializer and the declared type, if the statement declares it.
fn resource_initialization(arena: &Arena, statement: NodeId, name: &str) -> Option<(NodeId, Option<TypeRef>)> {
    match &arena[statement] {
        Node::ExpressionStatement { expression } => match &arena[*expression] {
            Node::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            } if name_of(arena, *target).is_some_and(|n| n == name) => Some((*value, None)),
            _ => None,
        },
        Node::VariableDeclaration { ty, variables, .. } => match variables.as_slice() {
            [variable] => match &arena[*variable] {
                Node::VariableInitializer {
                    name: declared,
                    initializer: Some(value),
                } if declared == name => Some((*value, Some(ty.clone()))),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// The declaration a `r = init;` statement relies on, if it can move into the rebuilt header.
fn movable_declaration(
    arena: &mut Arena,
    group: &[NodeId],
    try_: NodeId,
    name: &str,
) -> Option<(NodeId, TypeRef)> {
    let declaration = arena.find_variable_declaration(group[0], name)?;
    let Node::VariableDeclaration { ty, variables, .. } = &arena[declaration] else {
        return None;
    };
    let ty = ty.clone();
    let [variable] = variables.as_slice() else {
        return None;
    };
    if !matches!(arena[*variable], Node::VariableInitializer { initializer: None, .. }) {
        return None;
    }
    let confined = arena.probe_grouped(group, |arena, outer, _| {
        can_move_declaration_into(arena, declaration, try_) == Some(outer)
    });
    if !confined {
        debug!(name, "resource is used outside of the try statement");
        return None;
    }
    Some((declaration, ty))
}

fn handle_saving_try(arena: &mut Arena, try_: NodeId) -> bool {
    let Some(m) = SAVING_TRY.match_node(arena, try_) else {
        return false;
    };
    let Node::Catch { name: caught, .. } = &arena[m["handler"]] else {
        return false;
    };
    // Both `saved` bindings name the same variable, which the catch clause assigns.
    if name_of(arena, m["caught"]) != Some(caught)
        || !m.all("saved").iter().all(|saved| same_name(arena, *saved, m["saved"]))
        || !suppresses_close_failure(arena, &m)
    {
        return false;
    }
    let Some(saved) = name_of(arena, m["saved"]).cloned() else {
        return false;
    };
    let Some(resource) = name_of(arena, m["resource"]).cloned() else {
        return false;
    };

    let Some(saved_null) = arena.prev_sibling(try_) else {
        return false;
    };
    if !SAVED_NULL
        .match_node(arena, saved_null)
        .is_some_and(|null| name_of(arena, null["saved"]) == Some(&saved))
    {
        return false;
    }
    let Some(initialization) = arena.prev_sibling(saved_null) else {
        return false;
    };

    let body = m["body"];
    if arena.uses_variable(body, &saved) || arena.assigns_variable(body, &resource) {
        return false;
    }
    let later_uses = arena
        .siblings(try_)
        .into_iter()
        .flatten()
        .skip_while(|sibling| **sibling != try_)
        .skip(1)
        .any(|sibling| arena.uses_variable(*sibling, &saved));
    if later_uses {
        return false;
    }

    let group = [initialization, saved_null, try_];
    let Some(statement) = rebuild(arena, &group, try_, body, &resource) else {
        return false;
    };
    arena.detach(saved_null);
    drop_declaration(arena, statement, &saved);
    true
}

fn handle_inline_try(arena: &mut Arena, try_: NodeId) -> bool {
    let Some(m) = INLINE_TRY.match_node(arena, try_) else {
        return false;
    };
    let Node::Catch { name: caught, .. } = &arena[m["handler"]] else {
        return false;
    };
    if name_of(arena, m["thrown"]) != Some(caught)
        || name_of(arena, m["saved"]) != Some(caught)
        || !suppresses_close_failure(arena, &m)
    {
        return false;
    }
    let Some(resource) = name_of(arena, m["resource"]).cloned() else {
        return false;
    };

    let Some(close) = arena.next_sibling(try_) else {
        return false;
    };
    if !TRAILING_CLOSE
        .match_node(arena, close)
        .is_some_and(|trailing| name_of(arena, trailing["resource"]) == Some(&resource))
    {
        return false;
    }
    let Some(initialization) = arena.prev_sibling(try_) else {
        return false;
    };

    // Every exit from the body would carry its own copy of the close call.
    let body = m["body"];
    if has_exits(arena, body) || arena.assigns_variable(body, &resource) {
        return false;
    }

    let group = [initialization, try_, close];
    if rebuild(arena, &group, try_, body, &resource).is_none() {
        return false;
    }
    arena.detach(close);
    true
}

/// Replaces `try_` with `try (R r = init) body` and removes the initialization statement
/// `group[0]` along with the now empty declaration of `r`. `group` holds the statements the
/// resource has to stay confined to.
fn rebuild(
    arena: &mut Arena,
    group: &[NodeId],
    try_: NodeId,
    body: NodeId,
    resource: &Name,
) -> Option<NodeId> {
    let initialization = group[0];
    let (value, declared) = resource_initialization(arena, initialization, resource)?;
    // The resource goes out of scope at the end of the rebuilt statement.
    if used_after(arena, group, resource) {
        debug!(%resource, "resource is used after the try statement");
        return None;
    }
    let (old_declaration, ty) = match declared {
        Some(ty) => (None, ty),
        None => {
            let (declaration, ty) = movable_declaration(arena, group, try_, resource)?;
            (Some(declaration), ty)
        }
    };

    let meta = Meta {
        ty: Some(ty.clone()),
        variable: arena.meta(initialization).variable.clone().or_else(|| {
            old_declaration.and_then(|declaration| arena.meta(declaration).variable.clone())
        }),
        ..Meta::default()
    };
    let variable = arena.alloc_with_meta(
        Node::VariableInitializer {
            name: resource.clone(),
            initializer: Some(value),
        },
        meta.clone(),
    );
    let declaration = arena.alloc_with_meta(
        Node::VariableDeclaration {
            ty,
            modifiers: Modifiers::NONE,
            variables: vec![variable],
        },
        meta,
    );
    let statement = arena.alloc(Node::Try {
        resources: vec![declaration],
        body,
        catches: Vec::new(),
        finally: None,
    });
    arena.replace(try_, statement);
    arena.detach(initialization);
    if let Some(old_declaration) = old_declaration {
        arena.detach(old_declaration);
    }
    trace!(statement = %arena.debug(&statement), "introduced try-with-resources");
    Some(statement)
}

/// Removes the uninitialized declaration of `name` that `statement` sees, if nothing uses the
/// variable anymore.
fn drop_declaration(arena: &mut Arena, statement: NodeId, name: &str) {
    let Some(declaration) = arena.find_variable_declaration(statement, name) else {
        return;
    };
    let Node::VariableDeclaration { variables, .. } = &arena[declaration] else {
        return;
    };
    if variables.len() != 1 {
        return;
    }
    let Some(block) = arena.parent(declaration) else {
        return;
    };
    let used = arena
        .children(block)
        .into_iter()
        .any(|sibling| sibling != declaration && arena.uses_variable(sibling, name));
    if !used {
        arena.detach(declaration);
    }
}

/// Whether control can leave `body` other than by falling off its end.
fn has_exits(arena: &Arena, body: NodeId) -> bool {
    let mut stack = vec![body];
    while let Some(id) = stack.pop() {
        match &arena[id] {
            Node::Return { .. }
            | Node::Throw { .. }
            | Node::Break { .. }
            | Node::Continue { .. }
            | Node::Goto { .. } => return true,
            Node::Lambda { .. } | Node::TypeDeclaration { .. } => {}
            _ => stack.extend(arena.children(id)),
        }
    }
    false
}

/// Removes the synthetic `$closeResource` helper once nothing calls it.
fn remove_close_resource(arena: &mut Arena, root: NodeId, ty: NodeId) {
    for member in members(arena, ty) {
        if matches!(&arena[member], Node::Method { name, modifiers, .. }
            if name == CLOSE_RESOURCE && modifiers.is_synthetic())
            && !is_member_referenced(arena, root, member)
        {
            arena.detach(member);
            trace!("removed {CLOSE_RESOURCE}");
        }
    }
}

// try (a) { try (b) { body } } → try (a; b) { body }
static NESTED: LazyLock<Pattern> = LazyLock::new(|| {
    try_(
        vec![repeat(capture("outer"))],
        embedded(named(
            "inner",
            try_(vec![repeat(capture("resource"))], capture("body"), vec![], absent()),
        )),
        vec![repeat(any())],
        optional(any()),
    )
});

/// Folds a try-with-resources statement whose whole body is another one into a single statement.
pub struct MergeResourceTryStatements;

impl Transform for MergeResourceTryStatements {
    fn name(&self) -> &'static str {
        "MergeResourceTryStatements"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        // Innermost statements first, so chains of three or more collapse in one run.
        for id in arena.post_order(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::Try { .. }) {
                handle_nested(arena, id);
            }
        }
        Ok(())
    }
}

fn handle_nested(arena: &mut Arena, try_: NodeId) {
    let Some(m) = NESTED.match_node(arena, try_) else {
        return;
    };
    if !m.has("outer") || !m.has("resource") {
        return;
    }
    merge(arena, try_, &m);
}

fn merge(arena: &mut Arena, try_: NodeId, m: &Match) {
    let inner = m["inner"];
    for resource in m.all("resource") {
        arena.push(try_, Role::Resource, *resource);
    }
    let body = m["body"];
    let Node::Try { body: old_body, .. } = arena[try_] else {
        return;
    };
    arena.replace(old_body, body);
    trace!(statement = %arena.debug(&try_), inner = %inner, "merged resource statements");
}
