use super::local_classes::{captured_field, creations, creations_pass, field_reads, strip_capture};
use super::{has_modifiers, members, type_declarations};
use crate::ast::{Arena, Modifiers, Name, Node, NodeId, TypeRef};
use crate::{Context, InvariantViolation, Transform};
use tracing::{debug, trace};

/// Rewrites accesses through the synthetic `this$N` field of inner classes into qualified `this`
/// expressions, and drops the field and its constructor plumbing when the creations allow it.
pub struct IntroduceOuterClassReferences;

impl Transform for IntroduceOuterClassReferences {
    fn name(&self) -> &'static str {
        "IntroduceOuterClassReferences"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        // Innermost references first, so `this.this$1.this$0` resolves step by step.
        for id in arena.post_order(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::MemberReference { .. }) {
                handle_reference(arena, id);
            }
        }
        for ty in type_declarations(arena, root) {
            handle_plumbing(arena, root, ty);
        }
        Ok(())
    }
}

fn is_outer_field(name: &str) -> bool {
    name.strip_prefix("this$")
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// The synthetic outer-instance field `name` of `ty`, with the outer type it points to.
fn outer_field(arena: &Arena, ty: NodeId, name: &str) -> Option<(NodeId, Name)> {
    members(arena, ty).into_iter().find_map(|member| match &arena[member] {
        Node::Field {
            name: declared,
            ty: TypeRef::Class(outer),
            ..
        } if declared == name && has_modifiers(arena, member, Modifiers::SYNTHETIC) => {
            Some((member, outer.clone()))
        }
        _ => None,
    })
}

/// The type declaration a `this` or `Q.this` at `location` denotes.
fn this_type(arena: &Arena, location: NodeId, qualifier: Option<&Name>) -> Option<NodeId> {
    let enclosing = arena.enclosing_type(location)?;
    let Some(qualifier) = qualifier else {
        return Some(enclosing);
    };
    std::iter::once(enclosing)
        .chain(arena.ancestors(enclosing))
        .find(|ancestor| matches!(&arena[*ancestor], Node::TypeDeclaration { name, .. } if name == qualifier))
}

// this.this$0 -> Outer.this
fn handle_reference(arena: &mut Arena, reference: NodeId) {
    let Node::MemberReference { target, member } = &arena[reference] else {
        return;
    };
    if !is_outer_field(member) {
        return;
    }
    let Node::This { qualifier } = &arena[*target] else {
        return;
    };
    let Some(ty) = this_type(arena, reference, qualifier.as_ref()) else {
        return;
    };
    // Stores belong to the constructor plumbing.
    if let Some(parent) = arena.parent(reference)
        && matches!(arena[parent], Node::Assignment { target, .. } if target == reference)
    {
        return;
    }
    let Some((_, outer)) = outer_field(arena, ty, member) else {
        return;
    };
    // The outer type must enclose the inner one for `Outer.this` to be legal.
    let encloses = arena
        .ancestors(ty)
        .any(|ancestor| matches!(&arena[ancestor], Node::TypeDeclaration { name, .. } if *name == outer));
    if !encloses {
        debug!(%outer, "outer instance field points to a type that is not enclosing");
        return;
    }
    let this = arena.alloc(Node::This {
        qualifier: Some(outer.clone()),
    });
    arena.meta_mut(this).ty = Some(TypeRef::Class(outer.clone()));
    arena.replace(reference, this);
    trace!(%outer, "introduced qualified this");
}

fn handle_plumbing(arena: &mut Arena, root: NodeId, ty: NodeId) {
    let fields: Vec<(NodeId, Name)> = members(arena, ty)
        .into_iter()
        .filter_map(|member| match &arena[member] {
            Node::Field { name, .. } if is_outer_field(name) => Some((member, name.clone())),
            _ => None,
        })
        .collect();
    for (field, name) in fields {
        if !has_modifiers(arena, field, Modifiers::SYNTHETIC) {
            continue;
        }
        let Some(capture) = captured_field(arena, ty, &name) else {
            continue;
        };
        let Some((_, outer)) = outer_field(arena, ty, &name) else {
            continue;
        };
        let creations = creations(arena, root, ty);
        // Each creation must hand over the instance the creating code runs in.
        let passes_this = creations_pass(arena, &creations, capture.index, |arena, argument| {
            match &arena[argument] {
                Node::This { qualifier: None } => {
                    arena.enclosing_type_name(argument).is_some_and(|creator| *creator == outer)
                }
                Node::This {
                    qualifier: Some(qualifier),
                } => *qualifier == outer,
                _ => false,
            }
        });
        if !passes_this {
            continue;
        }
        let Some(reads) = field_reads(arena, root, ty, &capture) else {
            continue;
        };
        let outer_this = outer.clone();
        strip_capture(arena, &capture, &creations, &reads, |arena, _| {
            let this = arena.alloc(Node::This {
                qualifier: Some(outer_this.clone()),
            });
            arena.meta_mut(this).ty = Some(TypeRef::Class(outer_this.clone()));
            this
        });
        trace!(field = %name, "removed outer instance plumbing");
    }
}
