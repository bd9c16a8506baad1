//! The rewrite passes, one module per family of compiler idioms.

mod accessors;
mod arithmetic;
mod asserts;
mod assignments;
mod boxing;
mod casts;
mod class_constants;
mod declare_variables;
mod enum_switch;
mod enums;
mod flatten;
mod hidden_members;
mod imports;
mod initializers;
mod labels;
mod lambdas;
mod local_classes;
mod loops;
mod member_references;
mod outer_references;
mod resources;
mod string_concat;
mod string_switch;

pub use self::accessors::EliminateSyntheticAccessors;
pub use self::arithmetic::SimplifyArithmetic;
pub use self::asserts::AssertStatements;
pub use self::assignments::SimplifyAssignments;
pub use self::boxing::RemoveImplicitBoxing;
pub use self::casts::RemoveRedundantCasts;
pub use self::class_constants::RewriteLegacyClassConstants;
pub use self::declare_variables::DeclareVariables;
pub use self::enum_switch::{EclipseEnumSwitchRewriter, EnumSwitchRewriter};
pub use self::enums::EnumRewriter;
pub use self::flatten::{FlattenElseIf, FlattenSwitchBlocks};
pub use self::hidden_members::RemoveHiddenMembers;
pub use self::imports::CollapseImports;
pub use self::initializers::IntroduceInitializers;
pub use self::labels::{BreakTargetRelocation, LabelCleanup};
pub use self::lambdas::{LambdaTransform, RewriteNewArrayLambdas};
pub use self::local_classes::{DeclareLocalClasses, RewriteLocalClasses};
pub use self::loops::ConvertLoops;
pub use self::member_references::SimplifyMemberReferences;
pub use self::outer_references::IntroduceOuterClassReferences;
pub use self::resources::{MergeResourceTryStatements, TryWithResources};
pub use self::string_concat::IntroduceStringConcatenation;
pub use self::string_switch::StringSwitchRewriter;

use crate::ast::{Arena, AssignOp, Modifiers, Node, NodeId, TypeRef};

/// Type declarations below `root`, outermost first.
fn type_declarations(arena: &Arena, root: NodeId) -> Vec<NodeId> {
    arena
        .descendants(root)
        .into_iter()
        .filter(|id| arena[*id].is_type_declaration())
        .collect()
}

/// The members of a type declaration.
fn members(arena: &Arena, ty: NodeId) -> Vec<NodeId> {
    match &arena[ty] {
        Node::TypeDeclaration { members, .. } => members.clone(),
        _ => Vec::new(),
    }
}

/// The bodies of the `static { ... }` blocks of a type declaration.
fn static_initializers(arena: &Arena, ty: NodeId) -> Vec<NodeId> {
    members(arena, ty)
        .into_iter()
        .filter_map(|member| match &arena[member] {
            Node::Initializer { modifiers, body } if modifiers.is_static() => Some(*body),
            _ => None,
        })
        .collect()
}

fn statements(arena: &Arena, block: NodeId) -> Vec<NodeId> {
    match &arena[block] {
        Node::Block { statements } | Node::SwitchSection { statements, .. } => statements.clone(),
        _ => Vec::new(),
    }
}

/// Removes initializer blocks whose body became empty.
fn remove_empty_initializers(arena: &mut Arena, ty: NodeId) {
    for member in members(arena, ty) {
        if let Node::Initializer { body, .. } = arena[member]
            && statements(arena, body).is_empty()
        {
            arena.detach(member);
        }
    }
}

/// Whether anything below `root`, outside of `declaration` itself, may refer to the field or method
/// `declaration`. Name matches without resolved metadata count as references.
fn is_member_referenced(arena: &Arena, root: NodeId, declaration: NodeId) -> bool {
    let Some(declared) = arena.declared_member(declaration) else {
        return true;
    };
    arena.descendants(root).into_iter().any(|id| {
        if arena.contains(declaration, id) {
            return false;
        }
        let named = match &arena[id] {
            Node::Identifier { name } => *name == declared.name,
            Node::MemberReference { member, .. } | Node::MethodReference { member, .. } => {
                *member == declared.name
            }
            _ => false,
        };
        match &arena.meta(id).member {
            Some(member) => member.same_member(&declared),
            None => named,
        }
    })
}

/// Whether something below `root`, outside of the `excluded` subtrees, mentions `name` as a simple
/// name or a member access.
fn mentions_name(arena: &Arena, root: NodeId, name: &str, excluded: &[NodeId]) -> bool {
    arena.descendants(root).into_iter().any(|id| {
        let mentions = matches!(
            &arena[id],
            Node::Identifier { name: candidate }
                | Node::MemberReference { member: candidate, .. }
                | Node::MethodReference { member: candidate, .. }
                if candidate == name
        );
        mentions && !excluded.iter().any(|owner| arena.contains(*owner, id))
    })
}

/// Whether the member declaration carries all of `modifiers`.
fn has_modifiers(arena: &Arena, declaration: NodeId, modifiers: Modifiers) -> bool {
    arena[declaration]
        .modifiers()
        .is_some_and(|declared| declared.contains(modifiers))
}

/// The static type the upstream resolver attached to an expression.
fn type_of(arena: &Arena, expression: NodeId) -> Option<&TypeRef> {
    arena.meta(expression).ty.as_ref()
}

/// The type an expression is converted to by the assignment context it sits in: the right side of
/// `=`, a variable or field initializer, or a returned value.
fn assignment_context(arena: &Arena, expression: NodeId) -> Option<TypeRef> {
    let parent = arena.parent(expression)?;
    match &arena[parent] {
        Node::Assignment {
            op: AssignOp::Assign,
            target,
            value,
        } if *value == expression => type_of(arena, *target).cloned(),
        Node::VariableInitializer { .. } => match &arena[arena.parent(parent)?] {
            Node::VariableDeclaration { ty, .. } => Some(ty.clone()),
            _ => None,
        },
        Node::Field { ty, .. } => Some(ty.clone()),
        Node::Return { .. } => {
            let owner = arena.enclosing(expression, |node| {
                matches!(node, Node::Method { .. } | Node::Lambda { .. })
            })?;
            match &arena[owner] {
                Node::Method { return_type, .. } => Some(return_type.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// The name of the field a simple or qualified field access denotes.
fn accessed_name(arena: &Arena, expression: NodeId) -> Option<&crate::ast::Name> {
    match &arena[expression] {
        Node::Identifier { name } => Some(name),
        Node::MemberReference { member, .. } => Some(member),
        _ => None,
    }
}

/// Runs one pass with default settings and checks the tree afterwards.
#[cfg(test)]
fn run_pass(pass: &mut impl crate::Transform, arena: &mut Arena, root: NodeId) {
    run_with(pass, &crate::Settings::default(), arena, root);
}

#[cfg(test)]
fn run_with(
    pass: &mut impl crate::Transform,
    settings: &crate::Settings,
    arena: &mut Arena,
    root: NodeId,
) {
    let context = crate::Context {
        settings,
        resolver: &crate::metadata::TreeResolver,
    };
    pass.run(arena, root, &context).unwrap();
    arena.check(root).unwrap();
}
