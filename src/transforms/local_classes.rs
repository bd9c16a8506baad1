use super::{accessed_name, members};
use crate::analysis::{Subject, find_declaration_point};
use crate::ast::{Arena, AssignOp, MethodKind, Name, Node, NodeId, TypeRef};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// A synthetic field of a class that every constructor fills from the same parameter position.
pub(super) struct CapturedField {
    pub field: NodeId,
    pub index: usize,
    /// The constructors and their `this.field = parameter;` statements.
    pub assignments: Vec<(NodeId, NodeId)>,
}

fn constructors(arena: &Arena, ty: NodeId) -> Vec<NodeId> {
    members(arena, ty)
        .into_iter()
        .filter(|member| {
            matches!(
                arena[*member],
                Node::Method {
                    kind: MethodKind::Constructor,
                    body: Some(_),
                    ..
                }
            )
        })
        .collect()
}

/// `this.field` or a bare `field`.
fn is_field_access(arena: &Arena, id: NodeId, field: &str) -> bool {
    match &arena[id] {
        Node::Identifier { name } => name == field,
        Node::MemberReference { target, member } => {
            member == field && matches!(arena[*target], Node::This { qualifier: None })
        }
        _ => false,
    }
}

pub(super) fn captured_field(arena: &Arena, ty: NodeId, field_name: &str) -> Option<CapturedField> {
    let field = members(arena, ty)
        .into_iter()
        .find(|member| matches!(&arena[*member], Node::Field { name, .. } if name == field_name))?;
    let constructors = constructors(arena, ty);
    if constructors.is_empty() {
        return None;
    }
    let mut index = None;
    let mut assignments = Vec::new();
    for constructor in constructors {
        let Node::Method {
            parameters,
            body: Some(body),
            ..
        } = &arena[constructor]
        else {
            return None;
        };
        let Node::Block { statements } = &arena[*body] else {
            return None;
        };
        let mut found = None;
        for statement in statements {
            let Node::ExpressionStatement { expression } = arena[*statement] else {
                continue;
            };
            let Node::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            } = arena[expression]
            else {
                continue;
            };
            if !is_field_access(arena, target, field_name) {
                continue;
            }
            let position = arena[value].as_identifier().and_then(|value| {
                parameters
                    .iter()
                    .position(|parameter| arena[*parameter].declared_name() == Some(value))
            })?;
            if found.replace((*statement, position)).is_some() {
                return None;
            }
        }
        let (statement, position) = found?;
        if index.replace(position).is_some_and(|previous| previous != position) {
            return None;
        }
        // The parameter must not feed anything but the field.
        let parameter = arena[parameters[position]].declared_name()?;
        let other_uses = statements
            .iter()
            .filter(|other| **other != statement)
            .any(|other| arena.uses_variable(*other, parameter));
        if other_uses {
            return None;
        }
        assignments.push((constructor, statement));
    }
    Some(CapturedField {
        field,
        index: index?,
        assignments,
    })
}

/// The expressions below `root` creating instances of `ty`.
pub(super) fn creations(arena: &Arena, root: NodeId, ty: NodeId) -> Vec<NodeId> {
    let Node::TypeDeclaration { name, .. } = &arena[ty] else {
        return Vec::new();
    };
    arena
        .descendants(root)
        .into_iter()
        .filter(|id| match &arena[*id] {
            Node::ObjectCreation {
                body: Some(body), ..
            } => *body == ty,
            Node::ObjectCreation {
                ty: TypeRef::Class(created),
                body: None,
                ..
            } => created == name,
            _ => false,
        })
        .collect()
}

/// Reads of the field inside `ty`, or `None` if the field is mentioned anywhere else, or written.
pub(super) fn field_reads(
    arena: &Arena,
    root: NodeId,
    ty: NodeId,
    capture: &CapturedField,
) -> Option<Vec<NodeId>> {
    let field_name = arena[capture.field].declared_name()?;
    let plumbing: Vec<NodeId> = capture
        .assignments
        .iter()
        .map(|(_, statement)| *statement)
        .chain([capture.field])
        .collect();
    let mut reads = Vec::new();
    for id in arena.descendants(root) {
        if accessed_name(arena, id) != Some(field_name)
            || plumbing.iter().any(|owner| arena.contains(*owner, id))
        {
            continue;
        }
        let own = is_field_access(arena, id, field_name) && arena.enclosing_type(id) == Some(ty);
        let written = arena.parent(id).is_some_and(|parent| match &arena[parent] {
            Node::Assignment { target, .. } => *target == id,
            Node::Unary { op, .. } => op.is_update(),
            _ => false,
        });
        if !own || written {
            return None;
        }
        reads.push(id);
    }
    Some(reads)
}

/// Removes a captured field: its argument from every creation, its parameter and assignment from
/// every constructor, and the field itself. Each read becomes what `replacement` builds.
pub(super) fn strip_capture(
    arena: &mut Arena,
    capture: &CapturedField,
    creations: &[NodeId],
    reads: &[NodeId],
    mut replacement: impl FnMut(&mut Arena, NodeId) -> NodeId,
) {
    for creation in creations {
        if let Node::ObjectCreation { arguments, .. } = &arena[*creation] {
            let argument = arguments[capture.index];
            arena.detach(argument);
        }
    }
    for (constructor, statement) in &capture.assignments {
        arena.detach(*statement);
        if let Node::Method { parameters, .. } = &arena[*constructor] {
            let parameter = parameters[capture.index];
            arena.detach(parameter);
        }
    }
    for read in reads {
        let new = replacement(arena, *read);
        arena.replace(*read, new);
    }
    arena.detach(capture.field);
}

/// Whether every creation passes an argument at `index` that `accepts`.
pub(super) fn creations_pass(
    arena: &Arena,
    creations: &[NodeId],
    index: usize,
    accepts: impl Fn(&Arena, NodeId) -> bool,
) -> bool {
    creations.iter().all(|creation| match &arena[*creation] {
        Node::ObjectCreation { arguments, .. } => {
            arguments.get(index).is_some_and(|argument| accepts(arena, *argument))
        }
        _ => false,
    })
}

fn is_local_or_anonymous(arena: &Arena, ty: NodeId) -> bool {
    arena.parent(ty).is_some_and(|parent| {
        matches!(
            arena[parent],
            Node::LocalTypeDeclaration { .. } | Node::ObjectCreation { .. }
        )
    })
}

/// Replaces the `val$x` copies javac gives local and anonymous classes of the variables they
/// capture with the variables themselves, and removes the copying.
pub struct RewriteLocalClasses;

impl Transform for RewriteLocalClasses {
    fn name(&self) -> &'static str {
        "RewriteLocalClasses"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for ty in arena.descendants(root) {
            if arena[ty].is_type_declaration() && is_local_or_anonymous(arena, ty) {
                handle_local_class(arena, root, ty);
            }
        }
        Ok(())
    }
}

fn handle_local_class(arena: &mut Arena, root: NodeId, ty: NodeId) {
    let captures: Vec<Name> = members(arena, ty)
        .into_iter()
        .filter_map(|member| match &arena[member] {
            Node::Field { name, .. } if name.starts_with("val$") => Some(name.clone()),
            _ => None,
        })
        .collect();
    let creations = creations(arena, root, ty);
    if creations.is_empty() {
        return;
    }
    for field_name in captures {
        let variable = &field_name["val$".len()..];
        // A member of the same name would take over the bare name.
        let shadowed = members(arena, ty)
            .into_iter()
            .any(|member| arena[member].declared_name().is_some_and(|name| name == variable));
        if shadowed {
            debug!(%field_name, "captured variable shadowed by a member");
            continue;
        }
        let Some(capture) = captured_field(arena, ty, &field_name) else {
            continue;
        };
        let passes_variable = creations_pass(arena, &creations, capture.index, |arena, argument| {
            arena[argument].as_identifier().is_some_and(|name| name == variable)
        });
        if !passes_variable {
            debug!(%field_name, "creation does not pass the captured variable");
            continue;
        }
        let Some(reads) = field_reads(arena, root, ty, &capture) else {
            continue;
        };
        let Node::ObjectCreation { arguments, .. } = &arena[creations[0]] else {
            continue;
        };
        let meta = arena.meta(arguments[capture.index]).clone();
        let variable = Name::from(variable);
        strip_capture(arena, &capture, &creations, &reads, |arena, _| {
            arena.alloc_with_meta(
                Node::Identifier {
                    name: variable.clone(),
                },
                meta.clone(),
            )
        });
        trace!(%variable, "replaced captured copy");
    }
}

/// Moves local class declarations to the innermost block that still encloses every use.
pub struct DeclareLocalClasses;

impl Transform for DeclareLocalClasses {
    fn name(&self) -> &'static str {
        "DeclareLocalClasses"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if matches!(arena[id], Node::LocalTypeDeclaration { .. }) && arena.is_in_statement_list(id) {
                handle_declaration(arena, id);
            }
        }
        Ok(())
    }
}

/// Blocks directly nested in `statement`, catch bodies included.
fn nested_blocks(arena: &Arena, statement: NodeId) -> Vec<NodeId> {
    let mut blocks = Vec::new();
    for child in arena.children(statement) {
        match &arena[child] {
            Node::Block { .. } => blocks.push(child),
            Node::Catch { body, .. } => blocks.push(*body),
            _ => {}
        }
    }
    blocks
}

/// Whether `statement` declares a local that the class body refers to by simple name.
fn declares_any(arena: &Arena, statement: NodeId, names: &FxHashSet<Name>) -> bool {
    match &arena[statement] {
        Node::VariableDeclaration { variables, .. } => variables
            .iter()
            .filter_map(|variable| arena[*variable].declared_name())
            .any(|name| names.contains(name)),
        _ => false,
    }
}

fn handle_declaration(arena: &mut Arena, statement: NodeId) {
    let Node::LocalTypeDeclaration { declaration } = arena[statement] else {
        return;
    };
    let Node::TypeDeclaration { name, .. } = &arena[declaration] else {
        return;
    };
    let name = name.clone();
    let Some(block) = arena.parent(statement) else {
        return;
    };
    if !matches!(arena[block], Node::Block { .. }) {
        return;
    }
    let referenced: FxHashSet<Name> = arena
        .descendants(declaration)
        .into_iter()
        .filter_map(|id| arena[id].as_identifier().cloned())
        .collect();

    // Search from the declaration's own position onwards, then inwards.
    let mut block = block;
    let mut skip = Some(statement);
    let mut anchor = None;
    let mut start_after = Some(statement);
    loop {
        let point = find_declaration_point(arena, Subject::Type(&name), true, block, skip);
        let Some(user) = point.statement else {
            break;
        };
        let Node::Block { statements } = &arena[block] else {
            break;
        };
        let from = match start_after {
            Some(after) => statements.iter().position(|s| *s == after).map_or(0, |i| i + 1),
            None => 0,
        };
        let until = statements.iter().position(|s| *s == user).unwrap_or(statements.len());
        // Moving past a declaration of a name the class reads would rebind that name.
        if let Some(conflict) = statements[from.min(until)..until]
            .iter()
            .find(|sibling| declares_any(arena, **sibling, &referenced))
        {
            anchor = Some(*conflict);
            break;
        }
        anchor = Some(user);
        if !point.can_move_into_sub_blocks {
            break;
        }
        let users: Vec<NodeId> = nested_blocks(arena, user)
            .into_iter()
            .filter(|nested| arena.mentions_type(*nested, &name))
            .collect();
        let header_use = arena
            .children(user)
            .into_iter()
            .filter(|child| !matches!(arena[*child], Node::Block { .. } | Node::Catch { .. }))
            .any(|child| arena.mentions_type(child, &name));
        let [inner] = users.as_slice() else {
            break;
        };
        if header_use {
            break;
        }
        block = *inner;
        skip = None;
        start_after = None;
    }

    let Some(mut anchor) = anchor else {
        return;
    };
    // Stay in front of label markers that belong to the anchor.
    while let Some(previous) = arena.prev_sibling(anchor)
        && matches!(arena[previous], Node::Label { .. })
    {
        anchor = previous;
    }
    if anchor == statement || arena.next_sibling(statement) == Some(anchor) {
        return;
    }
    arena.detach(statement);
    arena.insert_before(anchor, statement);
    trace!(class = %name, "moved local class declaration");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Modifiers, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn local() -> TypeRef {
        TypeRef::class("pkg.Outer$1Local")
    }

    fn call_statement(arena: &mut Arena, method: &str) -> NodeId {
        let callee = arena.ident(method);
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![],
        });
        arena.expr_stmt(call)
    }

    /// `class Local { int get() { return body; } }` as a statement.
    fn local_class(arena: &mut Arena, members_before: Vec<NodeId>, read: NodeId) -> NodeId {
        let ret = arena.ret(Some(read));
        let body = arena.block(vec![ret]);
        let get = arena.method("get", TypeRef::int(), Modifiers::NONE, vec![], Some(body));
        let mut members = members_before;
        members.push(get);
        let declaration = arena.type_declaration("pkg.Outer$1Local", TypeKind::Class, Modifiers::NONE, members);
        arena.alloc(Node::LocalTypeDeclaration { declaration })
    }

    fn create(arena: &mut Arena, arguments: Vec<NodeId>) -> NodeId {
        let creation = arena.new_object(local(), arguments);
        arena.expr_stmt(creation)
    }

    fn method(arena: &mut Arena, statements: Vec<NodeId>) -> NodeId {
        let x = arena.parameter(TypeRef::int(), "x");
        let body = arena.block(statements);
        let method = arena.method("m", TypeRef::void(), Modifiers::NONE, vec![x], Some(body));
        arena.type_declaration("pkg.Outer", TypeKind::Class, Modifiers::NONE, vec![method])
    }

    #[test]
    fn captured_copy_becomes_the_variable() {
        let mut arena = Arena::new();
        let synthetic = Modifiers::FINAL | Modifiers::SYNTHETIC;
        let field = arena.field("val$x", TypeRef::int(), synthetic, None);
        // Local(int val$x) { this.val$x = val$x; super(); }
        let parameter = arena.parameter(TypeRef::int(), "val$x");
        let this = arena.this();
        let target = arena.member(this, "val$x");
        let value = arena.local("val$x", TypeRef::int());
        let store = arena.assign(target, value);
        let store = arena.expr_stmt(store);
        let callee = arena.alloc(Node::Super);
        let super_call = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![],
        });
        let super_call = arena.expr_stmt(super_call);
        let body = arena.block(vec![store, super_call]);
        let constructor = arena.constructor(Modifiers::NONE, vec![parameter], body);

        let this = arena.this();
        let read = arena.member(this, "val$x");
        let declaration = local_class(&mut arena, vec![field, constructor], read);
        let x = arena.local("x", TypeRef::int());
        let creation = create(&mut arena, vec![x]);
        let ty = method(&mut arena, vec![declaration, creation]);

        run_pass(&mut RewriteLocalClasses, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Outer {
    void m(int x) {
        class Local {
            Local() {
                super();
            }
            int get() {
                return x;
            }
        }
        new Local();
    }
}",
        );
    }

    #[test]
    fn declaration_moves_into_the_only_using_block() {
        let mut arena = Arena::new();
        let zero = arena.int(0);
        let declaration = local_class(&mut arena, vec![], zero);
        let before = call_statement(&mut arena, "prepare");
        let creation = create(&mut arena, vec![]);
        let other = call_statement(&mut arena, "other");
        let then = arena.block(vec![other, creation]);
        let condition = arena.ident("flag");
        let if_ = arena.if_(condition, then, None);
        let ty = method(&mut arena, vec![declaration, before, if_]);

        run_pass(&mut DeclareLocalClasses, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Outer {
    void m(int x) {
        prepare();
        if (flag) {
            other();
            class Local {
                int get() {
                    return 0;
                }
            }
            new Local();
        }
    }
}",
        );
    }

    #[test]
    fn uses_in_two_branches_keep_the_declaration_outside() {
        let mut arena = Arena::new();
        let zero = arena.int(0);
        let declaration = local_class(&mut arena, vec![], zero);
        let before = call_statement(&mut arena, "prepare");
        let first = create(&mut arena, vec![]);
        let then = arena.block(vec![first]);
        let second = create(&mut arena, vec![]);
        let otherwise = arena.block(vec![second]);
        let condition = arena.ident("flag");
        let if_ = arena.if_(condition, then, Some(otherwise));
        let ty = method(&mut arena, vec![declaration, before, if_]);

        run_pass(&mut DeclareLocalClasses, &mut arena, ty);
        let output = arena.debug(&ty).to_string();
        assert!(output.contains("prepare();\n        class Local {"));
    }

    #[test]
    fn declaration_does_not_move_past_a_local_it_would_capture() {
        let mut arena = Arena::new();
        // The class reads the field `y`; a later local `y` would capture instead.
        let y = arena.ident("y");
        let declaration = local_class(&mut arena, vec![], y);
        let one = arena.int(1);
        let shadow = arena.declare(TypeRef::int(), "y", Some(one));
        let creation = create(&mut arena, vec![]);
        let ty = method(&mut arena, vec![declaration, shadow, creation]);
        let before = arena.debug(&ty).to_string();

        run_pass(&mut DeclareLocalClasses, &mut arena, ty);
        assert_eq!(arena.debug(&ty).to_string(), before);
    }
}
