use super::{assignment_context, type_of};
use crate::ast::{Arena, BinaryOp, Modifiers, Node, NodeId, PrimitiveType, Role, TypeRef, UnaryOp};
use crate::metadata::{Conversion, classify_conversion};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Drops the explicit `valueOf` and `xxxValue()` calls javac emits for autoboxing where the
/// surrounding context performs the same conversion implicitly.
pub struct RemoveImplicitBoxing;

impl Transform for RemoveImplicitBoxing {
    fn name(&self) -> &'static str {
        "RemoveImplicitBoxing"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.post_order(root) {
            if !arena.contains(root, id) {
                continue;
            }
            if let Some(call) = boxing_call(arena, id) {
                handle_boxing(arena, root, call);
            } else if let Some(call) = unboxing_call(arena, id) {
                handle_unboxing(arena, root, call);
            }
        }
        Ok(())
    }
}

/// `Box.valueOf(operand)` or `operand.xxxValue()`.
#[derive(Clone, Copy, Debug)]
struct Call {
    call: NodeId,
    operand: NodeId,
    /// The primitive the operand holds: its own type when boxing, the box's content when unboxing.
    from: PrimitiveType,
    /// The primitive the call produces or boxes.
    to: PrimitiveType,
}

fn boxing_call(arena: &Arena, id: NodeId) -> Option<Call> {
    let Node::Invocation { target, arguments } = &arena[id] else {
        return None;
    };
    let [operand] = arguments.as_slice() else {
        return None;
    };
    let Node::MemberReference { target: owner, member } = &arena[*target] else {
        return None;
    };
    if member != "valueOf" {
        return None;
    }
    let Node::TypeReference {
        ty: TypeRef::Class(class),
    } = &arena[*owner]
    else {
        return None;
    };
    let to = PrimitiveType::from_box_class(class)?;
    // `Integer.valueOf(String)` parses; only the primitive overload boxes.
    let from = type_of(arena, *operand)?.primitive()?;
    Some(Call {
        call: id,
        operand: *operand,
        from,
        to,
    })
}

fn unboxing_call(arena: &Arena, id: NodeId) -> Option<Call> {
    let Node::Invocation { target, arguments } = &arena[id] else {
        return None;
    };
    if !arguments.is_empty() {
        return None;
    }
    let Node::MemberReference { target: operand, member } = &arena[*target] else {
        return None;
    };
    let to = PrimitiveType::from_unbox_method(member)?;
    let from = type_of(arena, *operand)?.unboxed()?;
    Some(Call {
        call: id,
        operand: *operand,
        from,
        to,
    })
}

/// What the position of an expression requires of its value.
#[derive(Debug)]
enum Expected {
    /// Assignment conversion to a type.
    Type(TypeRef),
    /// Binary numeric promotion against a primitive operand.
    Numeric,
    /// A boolean condition.
    Condition,
}

fn expected(arena: &Arena, root: NodeId, id: NodeId) -> Option<Expected> {
    if let Some(ty) = assignment_context(arena, id) {
        return Some(Expected::Type(ty));
    }
    let parent = arena.parent(id)?;
    match &arena[parent] {
        Node::Invocation { arguments, .. } if arena.role(id) == Role::Argument => {
            let index = arguments.iter().position(|argument| *argument == id)?;
            parameter_type(arena, root, parent, index).map(Expected::Type)
        }
        Node::Binary {
            op: BinaryOp::LogicalAnd | BinaryOp::LogicalOr,
            ..
        }
        | Node::Unary {
            op: UnaryOp::Not, ..
        } => Some(Expected::Condition),
        Node::Binary { left, right, .. } => {
            let other = if *left == id { *right } else { *left };
            type_of(arena, other)
                .is_some_and(TypeRef::is_primitive)
                .then_some(Expected::Numeric)
        }
        Node::If { .. } | Node::While { .. } | Node::DoWhile { .. } | Node::For { .. }
        | Node::Conditional { .. }
            if arena.role(id) == Role::Condition =>
        {
            Some(Expected::Condition)
        }
        _ => None,
    }
}

// Changing an argument's type can change which overload is picked, so arguments only count when the
// callee is declared in this tree and nothing else shares its name.
fn parameter_type(arena: &Arena, root: NodeId, invocation: NodeId, index: usize) -> Option<TypeRef> {
    let member = arena.meta(invocation).member.as_ref()?;
    if member.modifiers.contains(Modifiers::VARARGS) {
        return None;
    }
    let declaration = arena.find_member_declaration(root, member)?;
    let owner = arena.parent(declaration)?;
    let overloads = arena
        .children(owner)
        .into_iter()
        .filter(|sibling| {
            matches!(&arena[*sibling], Node::Method { name, .. } if *name == member.name)
        })
        .count();
    if overloads != 1 {
        return None;
    }
    member.parameters.get(index).cloned()
}

fn handle_boxing(arena: &mut Arena, root: NodeId, call: Call) {
    let Some(Expected::Type(context)) = expected(arena, root, call.call) else {
        return;
    };
    let boxed = TypeRef::Primitive(call.to);
    if classify_conversion(&boxed, &context) != Conversion::Boxing {
        return;
    }
    if call.from == call.to {
        arena.replace(call.call, call.operand);
    } else if call.from.widens_to(call.to) {
        let cast = arena.cast(boxed, call.operand);
        arena.replace(call.call, cast);
    } else {
        return;
    }
    trace!(from = %call.from, to = %call.to, "removed explicit boxing");
}

fn handle_unboxing(arena: &mut Arena, root: NodeId, call: Call) {
    let Some(expected) = expected(arena, root, call.call) else {
        return;
    };
    let widening = call.from != call.to;
    if widening && !call.from.widens_to(call.to) {
        return;
    }
    let box_type = TypeRef::Primitive(call.from).boxed();
    let Some(box_type) = box_type else {
        return;
    };
    match expected {
        Expected::Type(context) => {
            if !context.is_primitive() || !classify_conversion(&box_type, &context).is_implicit() {
                return;
            }
            arena.replace(call.call, call.operand);
        }
        Expected::Numeric if widening => {
            let cast = arena.cast(TypeRef::Primitive(call.to), call.operand);
            arena.replace(call.call, cast);
        }
        Expected::Numeric => arena.replace(call.call, call.operand),
        Expected::Condition if call.to == PrimitiveType::Boolean => {
            arena.replace(call.call, call.operand);
        }
        Expected::Condition => return,
    }
    trace!(from = %box_type, to = %call.to, "removed explicit unboxing");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{MemberRef, TypeKind};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn integer() -> TypeRef {
        TypeRef::class("java.lang.Integer")
    }

    fn value_of(arena: &mut Arena, class: TypeRef, operand: NodeId) -> NodeId {
        let owner = arena.type_ref(class);
        arena.invoke(owner, "valueOf", vec![operand])
    }

    fn run_on(arena: &mut Arena, statements: Vec<NodeId>) -> String {
        let body = arena.block(statements);
        run_pass(&mut RemoveImplicitBoxing, arena, body);
        arena.debug(&body).to_string()
    }

    #[test]
    fn boxing_in_assignment_contexts() {
        let mut arena = Arena::new();
        let i = arena.local("i", TypeRef::int());
        let boxed = value_of(&mut arena, integer(), i);
        let first = arena.declare(integer(), "boxed", Some(boxed));

        let i = arena.local("i", TypeRef::int());
        let widened = value_of(&mut arena, TypeRef::class("java.lang.Long"), i);
        let second = arena.declare(TypeRef::class("java.lang.Long"), "total", Some(widened));

        let i = arena.local("i", TypeRef::int());
        let boxed = value_of(&mut arena, integer(), i);
        let target = arena.local("o", TypeRef::object());
        let assignment = arena.assign(target, boxed);
        let third = arena.expr_stmt(assignment);

        assert_eq!(
            run_on(&mut arena, vec![first, second, third]),
            "{
    Integer boxed = i;
    Long total = (long) i;
    o = i;
}",
        );
    }

    #[test]
    fn unboxing_contexts() {
        let mut arena = Arena::new();
        let boxed = arena.local("boxed", integer());
        let value = arena.invoke(boxed, "intValue", vec![]);
        let first = arena.declare(TypeRef::int(), "n", Some(value));

        let boxed = arena.local("boxed", integer());
        let value = arena.invoke(boxed, "longValue", vec![]);
        let x = arena.local("x", TypeRef::Primitive(PrimitiveType::Long));
        let sum = arena.binary(BinaryOp::Add, value, x);
        let second = arena.expr_stmt(sum);

        let flag = arena.local("flag", TypeRef::class("java.lang.Boolean"));
        let condition = arena.invoke(flag, "booleanValue", vec![]);
        let then = arena.block(vec![]);
        let third = arena.if_(condition, then, None);

        assert_eq!(
            run_on(&mut arena, vec![first, second, third]),
            "{
    int n = boxed;
    (long) boxed + x;
    if (flag) {}
}",
        );
    }

    #[test]
    fn ambiguous_positions_keep_calls() {
        let mut arena = Arena::new();
        // `list.remove(Integer.valueOf(i))` picks remove(Object) over remove(int).
        let i = arena.local("i", TypeRef::int());
        let boxed = value_of(&mut arena, integer(), i);
        let list = arena.local("list", TypeRef::class("java.util.List"));
        let remove = arena.invoke(list, "remove", vec![boxed]);
        arena.meta_mut(remove).member = Some(MemberRef::method(
            "java.util.List",
            "remove",
            TypeRef::boolean(),
            vec![TypeRef::object()],
            Modifiers::PUBLIC,
        ));
        let first = arena.expr_stmt(remove);

        // `Integer.valueOf(String)` parses.
        let s = arena.local("s", TypeRef::string());
        let parsed = value_of(&mut arena, integer(), s);
        let second = arena.declare(TypeRef::object(), "o", Some(parsed));

        // Comparing two boxes is a reference comparison.
        let a = arena.local("a", integer());
        let a = arena.invoke(a, "intValue", vec![]);
        let b = arena.local("b", integer());
        let same = arena.binary(BinaryOp::Eq, a, b);
        let third = arena.expr_stmt(same);

        let expected = "{
    list.remove(Integer.valueOf(i));
    Object o = Integer.valueOf(s);
    a.intValue() == b;
}";
        assert_eq!(run_on(&mut arena, vec![first, second, third]), expected);
    }

    #[test]
    fn argument_of_unique_method_in_tree() {
        let mut arena = Arena::new();
        let parameter = arena.parameter(integer(), "value");
        let body = arena.block(vec![]);
        let sink = arena.method("sink", TypeRef::void(), Modifiers::NONE, vec![parameter], Some(body));

        let i = arena.local("i", TypeRef::int());
        let boxed = value_of(&mut arena, integer(), i);
        let callee = arena.ident("sink");
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![boxed],
        });
        arena.meta_mut(call).member = Some(MemberRef::method(
            "pkg.Box",
            "sink",
            TypeRef::void(),
            vec![integer()],
            Modifiers::NONE,
        ));
        let call = arena.expr_stmt(call);
        let body = arena.block(vec![call]);
        let caller = arena.method("run", TypeRef::void(), Modifiers::NONE, vec![], Some(body));
        let ty = arena.type_declaration("pkg.Box", TypeKind::Class, Modifiers::NONE, vec![sink, caller]);

        run_pass(&mut RemoveImplicitBoxing, &mut arena, ty);
        assert!(arena.debug(&ty).to_string().contains("sink(i);"));
    }
}
