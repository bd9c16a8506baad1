use super::type_of;
use crate::ast::{Arena, BinaryOp, Literal, Node, NodeId, Order, PrimitiveType, TypeRef, walk};
use crate::{Context, InvariantViolation, Transform};
use tracing::{debug, trace};

const BUILDERS: [&str; 2] = ["java.lang.StringBuilder", "java.lang.StringBuffer"];

/// Turns `new StringBuilder().append(a).append(b).toString()` back into `a + b`.
pub struct IntroduceStringConcatenation;

impl Transform for IntroduceStringConcatenation {
    fn name(&self) -> &'static str {
        "IntroduceStringConcatenation"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        // Inner chains first, so an appended concatenation is already an operand.
        walk(arena, root, Order::Post, |arena, id| {
            if is_call(arena, id, "toString", 0).is_some() {
                handle_to_string(arena, id);
            }
            Ok(())
        })
    }
}

/// The receiver and arguments of `receiver.method(...)` with `arity` arguments.
fn is_call<'a>(arena: &'a Arena, id: NodeId, method: &str, arity: usize) -> Option<(NodeId, &'a [NodeId])> {
    let Node::Invocation { target, arguments } = &arena[id] else {
        return None;
    };
    let Node::MemberReference { target, member } = &arena[*target] else {
        return None;
    };
    (member == method && arguments.len() == arity).then_some((*target, arguments.as_slice()))
}

fn is_string(arena: &Arena, id: NodeId) -> bool {
    matches!(arena[id].as_literal(), Some(Literal::String(_)))
        || type_of(arena, id).is_some_and(TypeRef::is_string)
}

/// `append(char[])` appends the characters, while `+` would append the array's identity.
fn is_appendable(arena: &Arena, id: NodeId) -> bool {
    type_of(arena, id) != Some(&TypeRef::array_of(TypeRef::Primitive(PrimitiveType::Char)))
}

/// The seed passed to the builder constructor, unwrapping `String.valueOf(x)`.
fn seed(arena: &Arena, argument: NodeId) -> Option<NodeId> {
    if let Some((receiver, [value])) = is_call(arena, argument, "valueOf", 1)
        && matches!(&arena[receiver], Node::TypeReference { ty } if ty.is_string())
    {
        return Some(*value);
    }
    // `new StringBuilder(int)` sets a capacity.
    is_string(arena, argument).then_some(argument)
}

/// The operands of a builder chain ending in `to_string`, in append order.
fn operands(arena: &Arena, to_string: NodeId) -> Option<Vec<NodeId>> {
    let (mut receiver, _) = is_call(arena, to_string, "toString", 0)?;
    let mut operands = Vec::new();
    loop {
        if let Some((inner, [value])) = is_call(arena, receiver, "append", 1) {
            if !is_appendable(arena, *value) {
                return None;
            }
            operands.push(*value);
            receiver = inner;
            continue;
        }
        let Node::ObjectCreation {
            ty: TypeRef::Class(class),
            arguments,
            body: None,
        } = &arena[receiver]
        else {
            return None;
        };
        if !BUILDERS.contains(&class.as_str()) {
            return None;
        }
        match arguments.as_slice() {
            [] => {}
            [argument] => operands.push(seed(arena, *argument)?),
            _ => return None,
        }
        break;
    }
    operands.reverse();
    Some(operands)
}

fn handle_to_string(arena: &mut Arena, to_string: NodeId) {
    let Some(operands) = operands(arena, to_string) else {
        return;
    };
    // `+` only concatenates once one of the first two operands is a string.
    let needs_prefix = match operands.as_slice() {
        [] => true,
        [only] => !matches!(arena[*only].as_literal(), Some(Literal::String(_))),
        [first, second, ..] => !is_string(arena, *first) && !is_string(arena, *second),
    };
    if operands.is_empty() {
        debug!("empty builder chain");
    }

    let mut operands = operands.into_iter();
    let mut result = if needs_prefix {
        arena.string("")
    } else {
        match operands.next() {
            Some(first) => {
                arena.detach(first);
                first
            }
            None => return,
        }
    };
    for operand in operands {
        arena.detach(operand);
        result = arena.binary(BinaryOp::Add, result, operand);
        arena.meta_mut(result).ty = Some(TypeRef::string());
    }
    arena.meta_mut(result).ty = Some(TypeRef::string());
    arena.replace(to_string, result);
    trace!(concatenation = %arena.debug(&result), "introduced string concatenation");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn builder(arena: &mut Arena, class: &str, arguments: Vec<NodeId>) -> NodeId {
        arena.new_object(TypeRef::class(class), arguments)
    }

    fn chain(arena: &mut Arena, mut receiver: NodeId, values: Vec<NodeId>) -> NodeId {
        for value in values {
            receiver = arena.invoke(receiver, "append", vec![value]);
        }
        arena.invoke(receiver, "toString", vec![])
    }

    fn run_on(arena: &mut Arena, expressions: Vec<NodeId>) -> String {
        let statements = expressions
            .into_iter()
            .map(|expression| arena.ret(Some(expression)))
            .collect();
        let body = arena.block(statements);
        run_pass(&mut IntroduceStringConcatenation, arena, body);
        arena.debug(&body).to_string()
    }

    #[test]
    fn builder_chains_become_concatenations() {
        let mut arena = Arena::new();
        let start = builder(&mut arena, "java.lang.StringBuilder", vec![]);
        let label = arena.string("n = ");
        let n = arena.local("n", TypeRef::int());
        let first = chain(&mut arena, start, vec![label, n]);

        let start = builder(&mut arena, "java.lang.StringBuffer", vec![]);
        let a = arena.local("a", TypeRef::int());
        let b = arena.local("b", TypeRef::int());
        let second = chain(&mut arena, start, vec![a, b]);

        // javac before 1.5: new StringBuffer(String.valueOf(x)).append(y).toString()
        let string = arena.type_ref(TypeRef::string());
        let x = arena.local("x", TypeRef::class("java.lang.Object"));
        let value_of = arena.invoke(string, "valueOf", vec![x]);
        let start = builder(&mut arena, "java.lang.StringBuffer", vec![value_of]);
        let y = arena.local("y", TypeRef::string());
        let third = chain(&mut arena, start, vec![y]);

        let s = arena.local("s", TypeRef::string());
        let start = builder(&mut arena, "java.lang.StringBuilder", vec![s]);
        let a = arena.local("a", TypeRef::int());
        let b = arena.local("b", TypeRef::int());
        let sum = arena.binary(BinaryOp::Add, a, b);
        let fourth = chain(&mut arena, start, vec![sum]);

        assert_eq!(
            run_on(&mut arena, vec![first, second, third, fourth]),
            r#"{
    return "n = " + n;
    return "" + a + b;
    return x + y;
    return s + (a + b);
}"#,
        );
    }

    #[test]
    fn nested_chains_and_single_operands() {
        let mut arena = Arena::new();
        let start = builder(&mut arena, "java.lang.StringBuilder", vec![]);
        let name = arena.local("name", TypeRef::string());
        let inner = chain(&mut arena, start, vec![name]);
        let start = builder(&mut arena, "java.lang.StringBuilder", vec![]);
        let prefix = arena.string("<");
        let outer = chain(&mut arena, start, vec![prefix, inner]);

        let start = builder(&mut arena, "java.lang.StringBuilder", vec![]);
        let empty = chain(&mut arena, start, vec![]);

        assert_eq!(
            run_on(&mut arena, vec![outer, empty]),
            r#"{
    return "<" + ("" + name);
    return "";
}"#,
        );
    }

    #[test]
    fn capacity_and_char_arrays_keep_the_builder() {
        let mut arena = Arena::new();
        let capacity = arena.int(16);
        let start = builder(&mut arena, "java.lang.StringBuilder", vec![capacity]);
        let a = arena.local("a", TypeRef::string());
        let sized = chain(&mut arena, start, vec![a]);

        let start = builder(&mut arena, "java.lang.StringBuilder", vec![]);
        let chars = arena.local("chars", TypeRef::array_of(TypeRef::Primitive(PrimitiveType::Char)));
        let characters = chain(&mut arena, start, vec![chars]);

        assert_eq!(
            run_on(&mut arena, vec![sized, characters]),
            "{
    return new StringBuilder(16).append(a).toString();
    return new StringBuilder().append(chars).toString();
}",
        );
    }
}
