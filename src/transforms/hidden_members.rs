use super::{has_modifiers, is_member_referenced, members, statements, type_declarations};
use crate::ast::{Arena, MethodKind, Modifiers, Node, NodeId, TypeKind};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Removes what the compiler adds on its own: unused synthetic members, bridge methods, default
/// constructors and `super()` calls without arguments.
pub struct RemoveHiddenMembers;

impl Transform for RemoveHiddenMembers {
    fn name(&self) -> &'static str {
        "RemoveHiddenMembers"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        if context.settings.show_synthetic_members {
            return Ok(());
        }
        for ty in type_declarations(arena, root) {
            if !arena.contains(root, ty) {
                continue;
            }
            for member in members(arena, ty) {
                handle_member(arena, root, member);
            }
            handle_default_constructor(arena, ty);
            for member in members(arena, ty) {
                handle_super_call(arena, member);
            }
        }
        Ok(())
    }
}

fn handle_member(arena: &mut Arena, root: NodeId, member: NodeId) {
    let remove = match &arena[member] {
        Node::Method { modifiers, .. } if modifiers.contains(Modifiers::BRIDGE) => true,
        Node::Method { modifiers, .. } | Node::Field { modifiers, .. } if modifiers.is_synthetic() => {
            !is_member_referenced(arena, root, member)
        }
        Node::TypeDeclaration { name, modifiers, .. } if modifiers.is_synthetic() => {
            !arena.mentions_type(root, name)
        }
        _ => false,
    };
    if remove {
        trace!(member = ?arena[member].declared_name(), "removed hidden member");
        arena.detach(member);
    }
}

/// `super()` as a statement, with no arguments.
fn is_bare_super_call(arena: &Arena, statement: NodeId) -> bool {
    let Node::ExpressionStatement { expression } = arena[statement] else {
        return false;
    };
    matches!(
        &arena[expression],
        Node::Invocation { target, arguments } if arguments.is_empty() && matches!(arena[*target], Node::Super)
    )
}

const ACCESS: [Modifiers; 3] = [Modifiers::PUBLIC, Modifiers::PROTECTED, Modifiers::PRIVATE];

fn same_access(a: Modifiers, b: Modifiers) -> bool {
    ACCESS.iter().all(|flag| a.contains(*flag) == b.contains(*flag))
}

fn is_anonymous(arena: &Arena, ty: NodeId) -> bool {
    arena
        .parent(ty)
        .is_some_and(|parent| matches!(arena[parent], Node::ObjectCreation { .. }))
}

/// Whether a constructor only forwards its parameters, in order, to `super(...)`.
fn only_forwards(arena: &Arena, constructor: NodeId) -> bool {
    let Node::Method {
        parameters,
        body: Some(body),
        ..
    } = &arena[constructor]
    else {
        return false;
    };
    let body = statements(arena, *body);
    let [call] = body.as_slice() else {
        return body.is_empty() && parameters.is_empty();
    };
    let Node::ExpressionStatement { expression } = arena[*call] else {
        return false;
    };
    let Node::Invocation { target, arguments } = &arena[expression] else {
        return false;
    };
    matches!(arena[*target], Node::Super)
        && arguments.len() == parameters.len()
        && arguments.iter().zip(parameters).all(|(argument, parameter)| {
            arena[*argument]
                .as_identifier()
                .is_some_and(|name| arena[*parameter].declared_name() == Some(name))
        })
}

fn handle_default_constructor(arena: &mut Arena, ty: NodeId) {
    let Node::TypeDeclaration {
        kind, modifiers, ..
    } = &arena[ty]
    else {
        return;
    };
    let (kind, type_modifiers) = (*kind, *modifiers);
    let constructors: Vec<NodeId> = members(arena, ty)
        .into_iter()
        .filter(|member| {
            matches!(
                arena[*member],
                Node::Method {
                    kind: MethodKind::Constructor,
                    ..
                }
            )
        })
        .collect();
    // Anonymous classes cannot declare constructors at all.
    if is_anonymous(arena, ty) {
        for constructor in constructors {
            if only_forwards(arena, constructor) {
                trace!("removed anonymous class constructor");
                arena.detach(constructor);
            }
        }
        return;
    }
    let [constructor] = constructors.as_slice() else {
        return;
    };
    let Node::Method {
        parameters,
        modifiers,
        body: Some(body),
        ..
    } = &arena[*constructor]
    else {
        return;
    };
    let implicit_access = match kind {
        TypeKind::Enum => true,
        _ => same_access(*modifiers, type_modifiers),
    };
    let body = statements(arena, *body);
    let trivial = match body.as_slice() {
        [] => true,
        [call] => is_bare_super_call(arena, *call),
        _ => false,
    };
    if parameters.is_empty()
        && implicit_access
        && trivial
        && !has_modifiers(arena, *constructor, Modifiers::SYNCHRONIZED)
    {
        trace!("removed default constructor");
        arena.detach(*constructor);
    }
}

fn handle_super_call(arena: &mut Arena, member: NodeId) {
    let Node::Method {
        kind: MethodKind::Constructor,
        body: Some(body),
        ..
    } = arena[member]
    else {
        return;
    };
    if let Some(first) = statements(arena, body).first()
        && is_bare_super_call(arena, *first)
    {
        arena.detach(*first);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::ast::TypeRef;
    use crate::transforms::{run_pass, run_with};
    use pretty_assertions::assert_eq;

    fn super_call(arena: &mut Arena, arguments: Vec<NodeId>) -> NodeId {
        let callee = arena.alloc(Node::Super);
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments,
        });
        arena.expr_stmt(call)
    }

    fn holder(arena: &mut Arena) -> NodeId {
        // public Widget() { super(); }
        let call = super_call(arena, vec![]);
        let body = arena.block(vec![call]);
        let constructor = arena.constructor(Modifiers::PUBLIC, vec![], body);
        // synthetic static int unused$field;
        let unused = arena.field("unused$field", TypeRef::int(), Modifiers::STATIC | Modifiers::SYNTHETIC, None);
        // bridge Object get() { return get(); }
        let get = arena.ident("get");
        let recurse = arena.alloc(Node::Invocation {
            target: get,
            arguments: vec![],
        });
        let ret = arena.ret(Some(recurse));
        let body = arena.block(vec![ret]);
        let bridge = arena.method(
            "get",
            TypeRef::class("java.lang.Object"),
            Modifiers::PUBLIC | Modifiers::BRIDGE | Modifiers::SYNTHETIC,
            vec![],
            Some(body),
        );
        let zero = arena.int(0);
        let ret = arena.ret(Some(zero));
        let body = arena.block(vec![ret]);
        let real = arena.method("size", TypeRef::int(), Modifiers::PUBLIC, vec![], Some(body));
        arena.type_declaration(
            "pkg.Widget",
            TypeKind::Class,
            Modifiers::PUBLIC,
            vec![unused, constructor, bridge, real],
        )
    }

    #[test]
    fn compiler_generated_members_disappear() {
        let mut arena = Arena::new();
        let ty = holder(&mut arena);

        run_pass(&mut RemoveHiddenMembers, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "public class Widget {
    public int size() {
        return 0;
    }
}",
        );
    }

    #[test]
    fn explicit_constructor_keeps_its_body_without_super() {
        let mut arena = Arena::new();
        let call = super_call(&mut arena, vec![]);
        let start = arena.ident("start");
        let start = arena.alloc(Node::Invocation {
            target: start,
            arguments: vec![],
        });
        let start = arena.expr_stmt(start);
        let body = arena.block(vec![call, start]);
        let constructor = arena.constructor(Modifiers::NONE, vec![], body);
        // Narrower access than the class: not the default constructor.
        let call = super_call(&mut arena, vec![]);
        let body = arena.block(vec![call]);
        let private = arena.constructor(Modifiers::PRIVATE, vec![], body);
        let first = arena.type_declaration("pkg.A", TypeKind::Class, Modifiers::NONE, vec![constructor]);
        let second = arena.type_declaration("pkg.B", TypeKind::Class, Modifiers::PUBLIC, vec![private]);
        let unit = arena.compilation_unit("pkg", vec![], vec![first, second]);

        run_pass(&mut RemoveHiddenMembers, &mut arena, unit);
        assert_eq!(
            arena.debug(&unit).to_string(),
            "package pkg;

class A {
    A() {
        start();
    }
}
public class B {
    private B() {}
}",
        );
    }

    #[test]
    fn shown_when_requested() {
        let mut arena = Arena::new();
        let ty = holder(&mut arena);
        let before = arena.debug(&ty).to_string();

        let settings = Settings {
            show_synthetic_members: true,
            ..Settings::default()
        };
        run_with(&mut RemoveHiddenMembers, &settings, &mut arena, ty);
        assert_eq!(arena.debug(&ty).to_string(), before);
    }
}
