use super::members;
use crate::ast::{Arena, MemberKind, MemberRef, Node, NodeId, TypeRef};
use crate::metadata::{NameMode, Resolved, Resolver};
use crate::{Context, InvariantViolation, Transform};
use tracing::trace;

/// Drops `this.` and `Type.` qualifiers where the bare name means the same member.
pub struct SimplifyMemberReferences;

impl Transform for SimplifyMemberReferences {
    fn name(&self) -> &'static str {
        "SimplifyMemberReferences"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let settings = context.settings;
        if !settings.simplify_member_references || settings.force_fully_qualified_references {
            return Ok(());
        }
        for id in arena.descendants(root) {
            if matches!(arena[id], Node::MemberReference { .. }) {
                handle_reference(arena, root, id, context.resolver);
            }
        }
        Ok(())
    }
}

/// The declaration of the type a qualifier denotes.
fn qualifier_type(arena: &Arena, root: NodeId, reference: NodeId, qualifier: NodeId) -> Option<NodeId> {
    match &arena[qualifier] {
        Node::This { qualifier: None } => arena.enclosing_type(reference),
        Node::This {
            qualifier: Some(outer),
        } => arena
            .ancestors(reference)
            .find(|ancestor| matches!(&arena[*ancestor], Node::TypeDeclaration { name, .. } if name == outer)),
        Node::TypeReference {
            ty: TypeRef::Class(class),
        } => arena.find_type(root, class),
        _ => None,
    }
}

/// The member a qualified reference denotes, from metadata or from the declarations in the tree.
fn referenced_member(arena: &Arena, root: NodeId, reference: NodeId, kind: MemberKind) -> Option<MemberRef> {
    if let Some(member) = &arena.meta(reference).member {
        return Some(member.clone());
    }
    let Node::MemberReference { target, member } = &arena[reference] else {
        return None;
    };
    let ty = qualifier_type(arena, root, reference, *target)?;
    members(arena, ty)
        .into_iter()
        .filter(|declaration| arena[*declaration].declared_name() == Some(member))
        .filter_map(|declaration| arena.declared_member(declaration))
        .find(|declared| declared.kind == kind)
}

fn handle_reference(arena: &mut Arena, root: NodeId, reference: NodeId, resolver: &dyn Resolver) {
    let Node::MemberReference { target, member } = &arena[reference] else {
        return;
    };
    let qualified = matches!(
        arena[*target],
        Node::This { .. }
            | Node::TypeReference {
                ty: TypeRef::Class(_)
            }
    );
    if !qualified {
        return;
    }
    let name = member.clone();
    let is_call = arena
        .parent(reference)
        .is_some_and(|parent| matches!(arena[parent], Node::Invocation { target, .. } if target == reference));
    let (mode, kind) = if is_call {
        (NameMode::Method, MemberKind::Method)
    } else {
        (NameMode::Value, MemberKind::Field)
    };
    let Some(expected) = referenced_member(arena, root, reference, kind) else {
        return;
    };
    let binds_same = match resolver.resolve_name(arena, reference, &name, mode) {
        // Overload resolution picks among the methods of the class the simple name finds first.
        Some(Resolved::Member(found)) if is_call => {
            found.declaring_type == expected.declaring_type && found.name == expected.name
        }
        Some(Resolved::Member(found)) => found.same_member(&expected),
        _ => false,
    };
    if !binds_same {
        return;
    }
    let meta = arena.meta(reference).clone();
    let simple = arena.alloc_with_meta(Node::Identifier { name: name.clone() }, meta);
    arena.replace(reference, simple);
    trace!(%name, "dropped member qualifier");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::ast::{Modifiers, TypeKind};
    use crate::transforms::run_with;
    use pretty_assertions::assert_eq;

    fn simplify() -> Settings {
        Settings {
            simplify_member_references: true,
            ..Settings::default()
        }
    }

    /// `class Counter { int count; static int LIMIT; void set(int count) { ... } }`
    fn counter(arena: &mut Arena, body: Vec<NodeId>) -> NodeId {
        let count = arena.field("count", TypeRef::int(), Modifiers::NONE, None);
        let limit = arena.field("LIMIT", TypeRef::int(), Modifiers::STATIC, None);
        let parameter = arena.parameter(TypeRef::int(), "count");
        let body = arena.block(body);
        let set = arena.method("set", TypeRef::void(), Modifiers::NONE, vec![parameter], Some(body));
        let reset = arena.method("reset", TypeRef::void(), Modifiers::NONE, vec![], None);
        arena.type_declaration("pkg.Counter", TypeKind::Class, Modifiers::NONE, vec![count, limit, set, reset])
    }

    fn qualified(arena: &mut Arena) -> Vec<NodeId> {
        // this.count = count;
        let this = arena.this();
        let field = arena.member(this, "count");
        let parameter = arena.local("count", TypeRef::int());
        let store = arena.assign(field, parameter);
        let store = arena.expr_stmt(store);
        // Counter.LIMIT = this.count;
        let owner = arena.type_ref(TypeRef::class("pkg.Counter"));
        let limit = arena.member(owner, "LIMIT");
        let this = arena.this();
        let field = arena.member(this, "count");
        let copy = arena.assign(limit, field);
        let copy = arena.expr_stmt(copy);
        // this.reset();
        let this = arena.this();
        let reset = arena.invoke(this, "reset", vec![]);
        let reset = arena.expr_stmt(reset);
        vec![store, copy, reset]
    }

    #[test]
    fn qualifiers_dropped_unless_shadowed() {
        let mut arena = Arena::new();
        let body = qualified(&mut arena);
        let ty = counter(&mut arena, body);

        run_with(&mut SimplifyMemberReferences, &simplify(), &mut arena, ty);
        assert_eq!(
            arena.debug(&ty).to_string(),
            "class Counter {
    int count;
    static int LIMIT;
    void set(int count) {
        this.count = count;
        LIMIT = this.count;
        reset();
    }
    void reset();
}",
        );
    }

    #[test]
    fn settings_gate_the_pass() {
        for settings in [
            Settings::default(),
            Settings {
                force_fully_qualified_references: true,
                ..simplify()
            },
        ] {
            let mut arena = Arena::new();
            let body = qualified(&mut arena);
            let ty = counter(&mut arena, body);
            let before = arena.debug(&ty).to_string();

            run_with(&mut SimplifyMemberReferences, &settings, &mut arena, ty);
            assert_eq!(arena.debug(&ty).to_string(), before);
        }
    }
}
