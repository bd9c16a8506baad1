use super::{is_member_referenced, members};
use crate::ast::{Arena, Modifiers, Name, Node, NodeId, TypeRef};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// Replaces calls to javac's `access$NNN` methods, which let nested classes reach private members,
/// with the access they perform. Accessors nobody calls any more are removed.
pub struct EliminateSyntheticAccessors;

impl Transform for EliminateSyntheticAccessors {
    fn name(&self) -> &'static str {
        "EliminateSyntheticAccessors"
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
        let mut inlined = FxHashSet::default();
        for id in arena.post_order(root) {
            if !arena.contains(root, id) || !matches!(arena[id], Node::Invocation { .. }) {
                continue;
            }
            if let Some(accessor) = find_accessor(arena, root, id)
                && inline_call(arena, id, accessor)
            {
                inlined.insert(accessor);
            }
        }
        for accessor in inlined {
            if !is_member_referenced(arena, root, accessor) {
                trace!(accessor = ?arena[accessor].declared_name(), "removed synthetic accessor");
                arena.detach(accessor);
            }
        }
        Ok(())
    }
}

/// The accessor declaration an invocation calls, if it is a synthetic static method of a type in
/// this tree whose body is a single expression.
fn find_accessor(arena: &Arena, root: NodeId, invocation: NodeId) -> Option<NodeId> {
    let Node::Invocation { target, arguments } = &arena[invocation] else {
        return None;
    };
    let (owner, name) = match &arena[*target] {
        Node::MemberReference { target, member } => match &arena[*target] {
            Node::TypeReference {
                ty: TypeRef::Class(owner),
            } => (owner.clone(), member),
            _ => return None,
        },
        Node::Identifier { name } => (arena.enclosing_type_name(invocation)?.clone(), name),
        _ => return None,
    };
    if !name.starts_with("access$") {
        return None;
    }
    let owner = match &arena.meta(invocation).member {
        Some(member) => member.declaring_type.clone(),
        None => owner,
    };
    let ty = arena.find_type(root, &owner)?;
    members(arena, ty).into_iter().find(|member| {
        matches!(
            &arena[*member],
            Node::Method { name: candidate, modifiers, parameters, body: Some(_), .. }
                if candidate == name
                    && modifiers.contains(Modifiers::STATIC | Modifiers::SYNTHETIC)
                    && parameters.len() == arguments.len()
        ) && accessed_expression(arena, *member).is_some()
    })
}

/// The expression an accessor evaluates: `return e;` or `e;` as its only statement.
fn accessed_expression(arena: &Arena, accessor: NodeId) -> Option<NodeId> {
    let Node::Method { body: Some(body), .. } = &arena[accessor] else {
        return None;
    };
    let Node::Block { statements } = &arena[*body] else {
        return None;
    };
    match statements.as_slice() {
        [statement] => match &arena[*statement] {
            Node::Return { value: Some(value) } => Some(*value),
            Node::ExpressionStatement { expression } => Some(*expression),
            _ => None,
        },
        _ => None,
    }
}

fn parameter_names(arena: &Arena, accessor: NodeId) -> Vec<Name> {
    let Node::Method { parameters, .. } = &arena[accessor] else {
        return Vec::new();
    };
    parameters
        .iter()
        .filter_map(|parameter| arena[*parameter].declared_name().cloned())
        .collect()
}

/// Replaces the call with a copy of the accessed expression. Arguments move into the places of the
/// parameters, so each argument with side effects must be read exactly once, and in call order.
fn inline_call(arena: &mut Arena, invocation: NodeId, accessor: NodeId) -> bool {
    let Some(expression) = accessed_expression(arena, accessor) else {
        return false;
    };
    let Node::Invocation { arguments, .. } = arena[invocation].clone() else {
        return false;
    };
    let parameters = parameter_names(arena, accessor);
    if parameters.len() != arguments.len() {
        return false;
    }
    // A void accessor body only fits where the call was a statement.
    let is_statement = arena
        .parent(invocation)
        .is_some_and(|parent| matches!(arena[parent], Node::ExpressionStatement { .. }));
    if let Node::Method { return_type, .. } = &arena[accessor]
        && *return_type == TypeRef::void()
        && !is_statement
    {
        return false;
    }

    let reads: Vec<usize> = arena
        .descendants(expression)
        .into_iter()
        .filter_map(|id| {
            let name = arena[id].as_identifier()?;
            parameters.iter().position(|parameter| parameter == name)
        })
        .collect();
    for (index, argument) in arguments.iter().enumerate() {
        let count = reads.iter().filter(|read| **read == index).count();
        if count != 1 && !arena.is_side_effect_free(*argument) {
            debug!(accessor = ?arena[accessor].declared_name(), "accessor argument not read exactly once");
            return false;
        }
    }
    let side_effects: Vec<usize> = reads
        .iter()
        .copied()
        .filter(|read| !arena.is_side_effect_free(arguments[*read]))
        .collect();
    if !side_effects.is_sorted() {
        return false;
    }

    let copy = arena.deep_clone(expression);
    for id in arena.descendants(copy) {
        let Some(name) = arena[id].as_identifier() else {
            continue;
        };
        let Some(index) = parameters.iter().position(|parameter| parameter == name) else {
            continue;
        };
        let argument = arguments[index];
        let replacement = if reads.iter().filter(|read| **read == index).count() == 1 {
            argument
        } else {
            arena.deep_clone(argument)
        };
        arena.replace(id, replacement);
    }
    let meta = arena.meta(invocation).ty.clone();
    arena.replace(invocation, copy);
    if arena.meta(copy).ty.is_none() {
        arena.meta_mut(copy).ty = meta;
    }
    trace!(access = %arena.debug(&copy), "inlined synthetic accessor");
    true
}
