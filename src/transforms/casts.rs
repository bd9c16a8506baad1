use super::{assignment_context, type_of};
use crate::ast::{Arena, Node, NodeId, TypeRef};
use crate::metadata::{Conversion, classify_conversion};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Removes casts that do not change the static type of their operand, and casts that the
/// surrounding assignment context would perform anyway.
pub struct RemoveRedundantCasts;

impl Transform for RemoveRedundantCasts {
    fn name(&self) -> &'static str {
        "RemoveRedundantCasts"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.post_order(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::Cast { .. }) {
                handle_cast(arena, id);
            }
        }
        Ok(())
    }
}

fn handle_cast(arena: &mut Arena, cast: NodeId) {
    let Node::Cast { ty, operand } = &arena[cast] else {
        return;
    };
    let operand = *operand;
    // Lambdas and method references take their type from the cast.
    if matches!(arena[operand], Node::Lambda { .. } | Node::MethodReference { .. }) {
        return;
    }
    let Some(from) = type_of(arena, operand) else {
        return;
    };
    if !is_redundant(arena, cast, from, ty) {
        return;
    }
    trace!(cast = %arena.debug(&cast), "removed redundant cast");
    arena.replace(cast, operand);
}

fn is_redundant(arena: &Arena, cast: NodeId, from: &TypeRef, to: &TypeRef) -> bool {
    if from == to {
        return true;
    }
    // Other casts only go where the value is converted to exactly the cast type anyway.
    if assignment_context(arena, cast).as_ref() != Some(to) {
        return false;
    }
    matches!(
        classify_conversion(from, to),
        Conversion::WideningReference | Conversion::WideningPrimitive
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Modifiers, PrimitiveType};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn run_on(arena: &mut Arena, statements: Vec<NodeId>) -> String {
        let body = arena.block(statements);
        run_pass(&mut RemoveRedundantCasts, arena, body);
        arena.debug(&body).to_string()
    }

    #[test]
    fn identity_and_context_casts() {
        let mut arena = Arena::new();
        let s = arena.local("s", TypeRef::string());
        let same = arena.cast(TypeRef::string(), s);
        let length = arena.invoke(same, "length", vec![]);
        let first = arena.expr_stmt(length);

        let s = arena.local("s", TypeRef::string());
        let upcast = arena.cast(TypeRef::object(), s);
        let second = arena.declare(TypeRef::object(), "o", Some(upcast));

        let i = arena.local("i", TypeRef::int());
        let long = TypeRef::Primitive(PrimitiveType::Long);
        let widened = arena.cast(long.clone(), i);
        let third = arena.declare(long, "l", Some(widened));

        assert_eq!(
            run_on(&mut arena, vec![first, second, third]),
            "{
    s.length();
    Object o = s;
    long l = i;
}",
        );
    }

    #[test]
    fn casts_that_change_meaning_stay() {
        let mut arena = Arena::new();
        // Narrowing.
        let o = arena.local("o", TypeRef::object());
        let downcast = arena.cast(TypeRef::string(), o);
        let first = arena.declare(TypeRef::string(), "s", Some(downcast));

        // Widening before the arithmetic changes the result.
        let i = arena.local("i", TypeRef::int());
        let long = TypeRef::Primitive(PrimitiveType::Long);
        let widened = arena.cast(long.clone(), i);
        let j = arena.local("j", TypeRef::int());
        let product = arena.binary(BinaryOp::Mul, widened, j);
        let second = arena.declare(long, "l", Some(product));

        // The declared type differs from the cast type.
        let s = arena.local("s", TypeRef::string());
        let upcast = arena.cast(TypeRef::class("java.lang.CharSequence"), s);
        let third = arena.declare(TypeRef::object(), "c", Some(upcast));

        assert_eq!(
            run_on(&mut arena, vec![first, second, third]),
            "{
    String s = (String) o;
    long l = (long) i * j;
    Object c = (CharSequence) s;
}",
        );
    }

    #[test]
    fn returned_value() {
        let mut arena = Arena::new();
        let s = arena.local("s", TypeRef::string());
        let upcast = arena.cast(TypeRef::object(), s);
        let ret = arena.ret(Some(upcast));
        let body = arena.block(vec![ret]);
        let method = arena.method("get", TypeRef::object(), Modifiers::NONE, vec![], Some(body));
        run_pass(&mut RemoveRedundantCasts, &mut arena, method);
        assert_eq!(arena.debug(&method).to_string(), "Object get() {\n    return s;\n}");
    }
}
