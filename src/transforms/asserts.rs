use super::{members, mentions_name, remove_empty_initializers, static_initializers, statements, type_declarations};
use crate::ast::{Arena, BinaryOp, Node, NodeId, TypeRef};
use crate::pattern::Pattern;
use crate::pattern::build::*;
use crate::{Context, InvariantViolation, Transform};
use std::sync::LazyLock;
use tracing::trace;

const DISABLED: &str = "$assertionsDisabled";

fn disabled() -> Pattern {
    choice(vec![ident(DISABLED), member(type_ref(None), DISABLED)])
}

// if (...) throw new AssertionError([message]);
static FAILURE: LazyLock<Pattern> = LazyLock::new(|| {
    if_(
        capture("condition"),
        embedded(throw(new_object(
            Some(TypeRef::class("java.lang.AssertionError")),
            vec![optional(capture("message"))],
        ))),
        absent(),
    )
});

// !$assertionsDisabled && !c
static CHECKED: LazyLock<Pattern> =
    LazyLock::new(|| binary(BinaryOp::LogicalAnd, not(disabled()), capture("failed")));

// !$assertionsDisabled, from `assert false`
static UNCONDITIONAL: LazyLock<Pattern> = LazyLock::new(|| not(disabled()));

/// Turns javac's `$assertionsDisabled` checks back into `assert` statements and removes the flag
/// once nothing reads it.
pub struct AssertStatements;

impl Transform for AssertStatements {
    fn name(&self) -> &'static str {
        "AssertStatements"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::If { .. }) {
                handle_if(arena, id);
            }
        }
        for ty in type_declarations(arena, root) {
            remove_flag(arena, root, ty);
        }
        Ok(())
    }
}

fn handle_if(arena: &mut Arena, statement: NodeId) {
    let Some(m) = FAILURE.match_node(arena, statement) else {
        return;
    };
    let message = m.get("message");
    let condition = if let Some(checked) = CHECKED.match_node(arena, m["condition"]) {
        // The statement throws when the asserted condition is false.
        arena.negate(checked["failed"])
    } else if UNCONDITIONAL.match_node(arena, m["condition"]).is_some() {
        arena.bool(false)
    } else {
        return;
    };
    let assertion = arena.alloc(Node::Assert { condition, message });
    arena.replace(statement, assertion);
    trace!(statement = %arena.debug(&assertion), "introduced assert");
}

/// Removes `static final boolean $assertionsDisabled` and its static initialization once no other
/// code reads it.
fn remove_flag(arena: &mut Arena, root: NodeId, ty: NodeId) {
    let Some(field) = members(arena, ty)
        .into_iter()
        .find(|member| matches!(&arena[*member], Node::Field { name, .. } if name == DISABLED))
    else {
        return;
    };
    let mut plumbing = vec![field];
    for body in static_initializers(arena, ty) {
        for statement in statements(arena, body) {
            if let Node::ExpressionStatement { expression } = arena[statement]
                && let Node::Assignment { target, .. } = arena[expression]
                && super::accessed_name(arena, target).is_some_and(|name| name == DISABLED)
            {
                plumbing.push(statement);
            }
        }
    }
    if mentions_name(arena, root, DISABLED, &plumbing) {
        return;
    }
    for node in plumbing {
        arena.detach(node);
    }
    remove_empty_initializers(arena, ty);
    trace!("removed $assertionsDisabled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Modifiers, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn flag_initializer(arena: &mut Arena) -> NodeId {
        let class = arena.alloc(Node::ClassLiteral {
            ty: TypeRef::class("pkg.Checker"),
        });
        let status = arena.invoke(class, "desiredAssertionStatus", vec![]);
        arena.unary(crate::ast::UnaryOp::Not, status)
    }

    fn checker(arena: &mut Arena, check: NodeId, flag_in_initializer: bool) -> NodeId {
        let x = arena.parameter(TypeRef::int(), "x");
        let body = arena.block(vec![check]);
        let method = arena.method("check", TypeRef::void(), Modifiers::NONE, vec![x], Some(body));
        let modifiers = Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNTHETIC;
        let mut members = Vec::new();
        if flag_in_initializer {
            let field = arena.field(DISABLED, TypeRef::boolean(), modifiers, None);
            let target = arena.ident(DISABLED);
            let value = flag_initializer(arena);
            let store = arena.assign(target, value);
            let store = arena.expr_stmt(store);
            let body = arena.block(vec![store]);
            let initializer = arena.static_initializer(body);
            members.extend([field, initializer]);
        } else {
            let value = flag_initializer(arena);
            members.push(arena.field(DISABLED, TypeRef::boolean(), modifiers, Some(value)));
        }
        members.push(method);
        arena.type_declaration("pkg.Checker", TypeKind::Class, Modifiers::NONE, members)
    }

    fn failure(arena: &mut Arena, condition: NodeId, message: Option<&str>) -> NodeId {
        let arguments = message.map(|message| arena.string(message)).into_iter().collect();
        let error = arena.new_object(TypeRef::class("java.lang.AssertionError"), arguments);
        let throw = arena.alloc(Node::Throw { exception: error });
        let then = arena.block(vec![throw]);
        arena.if_(condition, then, None)
    }

    fn not_disabled(arena: &mut Arena) -> NodeId {
        let flag = arena.ident(DISABLED);
        arena.unary(crate::ast::UnaryOp::Not, flag)
    }

    #[test]
    fn assert_with_message() {
        let mut arena = Arena::new();
        let guard = not_disabled(&mut arena);
        let x = arena.local("x", TypeRef::int());
        let zero = arena.int(0);
        let positive = arena.binary(BinaryOp::Gt, x, zero);
        let failed = arena.unary(crate::ast::UnaryOp::Not, positive);
        let condition = arena.binary(BinaryOp::LogicalAnd, guard, failed);
        let check = failure(&mut arena, condition, Some("bad"));
        let ty = checker(&mut arena, check, true);

        run_pass(&mut AssertStatements, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            r#"class Checker {
    void check(int x) {
        assert x > 0 : "bad";
    }
}"#,
        );
    }

    #[test]
    fn assert_false_and_inverted_comparison() {
        let mut arena = Arena::new();
        let guard = not_disabled(&mut arena);
        let x = arena.local("x", TypeRef::int());
        let zero = arena.int(0);
        let failed = arena.binary(BinaryOp::Eq, x, zero);
        let condition = arena.binary(BinaryOp::LogicalAnd, guard, failed);
        let first = failure(&mut arena, condition, None);
        let guard = not_disabled(&mut arena);
        let second = failure(&mut arena, guard, None);
        let body = arena.block(vec![first, second]);
        let ty = checker(&mut arena, body, false);

        run_pass(&mut AssertStatements, &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Checker {
    void check(int x) {
        {
            assert x != 0;
            assert false;
        }
    }
}",
        );
    }

    #[test]
    fn flag_kept_while_read_elsewhere() {
        let mut arena = Arena::new();
        let flag = arena.ident(DISABLED);
        let ret = arena.ret(Some(flag));
        let ty = checker(&mut arena, ret, false);
        run_pass(&mut AssertStatements, &mut arena, ty);
        assert!(arena.debug(&ty).to_string().contains("boolean $assertionsDisabled"));
    }
}
