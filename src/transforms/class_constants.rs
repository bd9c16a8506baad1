use super::{members, mentions_name, type_declarations};
use crate::ast::{Arena, BinaryOp, Literal, Node, NodeId, PrimitiveType, TypeRef};
use crate::pattern::Pattern;
use crate::pattern::build::*;
use crate::{Context, InvariantViolation, Transform};
use std::sync::LazyLock;
use tracing::{debug, trace};

const HELPER: &str = "class$";

/// Caches are named `class$java$lang$String`, or `array$I` for array types.
fn is_cache_name(name: &str) -> bool {
    name.starts_with(HELPER) || name.starts_with("array$")
}

fn cache() -> Pattern {
    named(
        "cache",
        guard(choice(vec![any_ident(), any_member(type_ref(None))]), |arena, id| {
            super::accessed_name(arena, id).is_some_and(|name| is_cache_name(name))
        }),
    )
}

// class$("java.lang.String")
fn lookup() -> Pattern {
    invocation(
        choice(vec![ident(HELPER), member(type_ref(None), HELPER)]),
        vec![named("name", string_literal())],
    )
}

// class$x == null ? (class$x = class$("x")) : class$x
// class$x != null ? class$x : (class$x = class$("x"))
static CACHED_LOOKUP: LazyLock<Pattern> = LazyLock::new(|| {
    choice(vec![
        conditional(
            binary(BinaryOp::Eq, cache(), null()),
            assign(backref("cache"), lookup()),
            backref("cache"),
        ),
        conditional(
            binary(BinaryOp::Ne, cache(), null()),
            backref("cache"),
            assign(backref("cache"), lookup()),
        ),
    ])
});

/// The type `Class.forName` loads for `name`: a binary class name or an array descriptor.
fn loaded_type(name: &str) -> Option<TypeRef> {
    let Some(element) = name.strip_prefix('[') else {
        return (!name.is_empty()).then(|| TypeRef::class(name));
    };
    let element = match element.as_bytes().first()? {
        b'[' => loaded_type(element)?,
        b'L' => TypeRef::class(element.strip_prefix('L')?.strip_suffix(';')?),
        code => {
            let primitive = match code {
                b'Z' => PrimitiveType::Boolean,
                b'B' => PrimitiveType::Byte,
                b'C' => PrimitiveType::Char,
                b'S' => PrimitiveType::Short,
                b'I' => PrimitiveType::Int,
                b'J' => PrimitiveType::Long,
                b'F' => PrimitiveType::Float,
                b'D' => PrimitiveType::Double,
                _ => return None,
            };
            if element.len() != 1 {
                return None;
            }
            TypeRef::Primitive(primitive)
        }
    };
    Some(TypeRef::array_of(element))
}

/// Turns the class-literal emulation of javac before 1.5, a cached `class$(String)` lookup, back
/// into `X.class`, and removes the caches and the helper once unused.
pub struct RewriteLegacyClassConstants;

impl Transform for RewriteLegacyClassConstants {
    fn name(&self) -> &'static str {
        "RewriteLegacyClassConstants"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let mut rewritten = false;
        for id in arena.post_order(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::Conditional { .. }) {
                rewritten |= handle_conditional(arena, id);
            }
        }
        if rewritten {
            for ty in type_declarations(arena, root) {
                remove_plumbing(arena, root, ty);
            }
        }
        Ok(())
    }
}

fn handle_conditional(arena: &mut Arena, conditional: NodeId) -> bool {
    let Some(m) = CACHED_LOOKUP.match_node(arena, conditional) else {
        return false;
    };
    let Some(name) = arena[m["name"]].as_literal().and_then(Literal::as_str) else {
        return false;
    };
    let Some(ty) = loaded_type(name) else {
        debug!(%name, "unrecognized class name in class$ lookup");
        return false;
    };
    let literal = arena.alloc(Node::ClassLiteral { ty: ty.clone() });
    arena.meta_mut(literal).ty = Some(TypeRef::class("java.lang.Class"));
    arena.replace(conditional, literal);
    trace!(%ty, "introduced class literal");
    true
}

/// Drops the synthetic `static Class class$...` caches and the `class$` helper of `ty` that nothing
/// mentions any more.
fn remove_plumbing(arena: &mut Arena, root: NodeId, ty: NodeId) {
    for member in members(arena, ty) {
        let synthetic = match &arena[member] {
            Node::Field { name, modifiers, .. } => is_cache_name(name) && modifiers.is_static(),
            Node::Method {
                name,
                modifiers,
                parameters,
                ..
            } => *name == HELPER && modifiers.is_static() && parameters.len() == 1,
            _ => false,
        };
        if !synthetic {
            continue;
        }
        let Some(name) = arena[member].declared_name().cloned() else {
            continue;
        };
        if !mentions_name(arena, root, &name, &[member]) {
            trace!(%name, "removed class literal plumbing");
            arena.detach(member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Modifiers, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn class_type() -> TypeRef {
        TypeRef::class("java.lang.Class")
    }

    fn cached_lookup(arena: &mut Arena, cache: &str, name: &str) -> NodeId {
        let check = arena.ident(cache);
        let null = arena.null();
        let condition = arena.binary(BinaryOp::Eq, check, null);
        let helper = arena.ident(HELPER);
        let name = arena.string(name);
        let lookup = arena.alloc(Node::Invocation {
            target: helper,
            arguments: vec![name],
        });
        let store = arena.ident(cache);
        let store = arena.assign(store, lookup);
        let read = arena.ident(cache);
        arena.alloc(Node::Conditional {
            condition,
            then: store,
            otherwise: read,
        })
    }

    fn helper(arena: &mut Arena) -> NodeId {
        let name = arena.parameter(TypeRef::string(), "name");
        let forname = arena.type_ref(class_type());
        let argument = arena.ident("name");
        let load = arena.invoke(forname, "forName", vec![argument]);
        let ret = arena.ret(Some(load));
        let body = arena.block(vec![ret]);
        arena.method(
            HELPER,
            class_type(),
            Modifiers::STATIC | Modifiers::SYNTHETIC,
            vec![name],
            Some(body),
        )
    }

    fn holder(arena: &mut Arena, method_body: Vec<NodeId>) -> NodeId {
        let modifiers = Modifiers::STATIC | Modifiers::SYNTHETIC;
        let strings = arena.field("class$java$lang$String", class_type(), modifiers, None);
        let arrays = arena.field("array$I", class_type(), modifiers, None);
        let helper = helper(arena);
        let body = arena.block(method_body);
        let method = arena.method("types", TypeRef::void(), Modifiers::NONE, vec![], Some(body));
        arena.type_declaration("pkg.Legacy", TypeKind::Class, Modifiers::NONE, vec![strings, arrays, helper, method])
    }

    #[test]
    fn descriptor_names() {
        assert_eq!(loaded_type("java.lang.String"), Some(TypeRef::string()));
        assert_eq!(loaded_type("[I"), Some(TypeRef::array_of(TypeRef::int())));
        assert_eq!(
            loaded_type("[[Ljava.lang.String;"),
            Some(TypeRef::array_of(TypeRef::array_of(TypeRef::string()))),
        );
        assert_eq!(loaded_type("[Q"), None);
        assert_eq!(loaded_type("[Ljava.lang.String"), None);
    }

    #[test]
    fn cached_lookups_become_class_literals() {
        let mut arena = Arena::new();
        let strings = cached_lookup(&mut arena, "class$java$lang$String", "java.lang.String");
        let first = arena.expr_stmt(strings);
        let arrays = cached_lookup(&mut arena, "array$I", "[I");
        let second = arena.expr_stmt(arrays);
        let ty = holder(&mut arena, vec![first, second]);

        run_pass(&mut RewriteLegacyClassConstants, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Legacy {
    void types() {
        String.class;
        int[].class;
    }
}",
        );
    }

    #[test]
    fn helper_kept_while_called_directly() {
        let mut arena = Arena::new();
        let strings = cached_lookup(&mut arena, "class$java$lang$String", "java.lang.String");
        let first = arena.expr_stmt(strings);
        let helper = arena.ident(HELPER);
        let name = arena.string("pkg.Other");
        let direct = arena.alloc(Node::Invocation {
            target: helper,
            arguments: vec![name],
        });
        let second = arena.expr_stmt(direct);
        let ty = holder(&mut arena, vec![first, second]);

        run_pass(&mut RewriteLegacyClassConstants, &mut arena, ty);
        let output = arena.debug(&ty).to_string();
        assert!(output.contains("String.class;"));
        assert!(output.contains("static Class class$(String name)"));
        assert!(!output.contains("class$java$lang$String"));
    }
}
