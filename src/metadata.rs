//! Name resolution and type conversions, the services passes consult about the program around the
//! tree.

use crate::ast::{Arena, MemberRef, Node, NodeId, PrimitiveType, TypeRef};

/// The namespace a simple name is looked up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameMode {
    Value,
    Method,
    Type,
}

/// What a simple name binds to at some location.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    /// A local variable, catch parameter, loop variable or resource, by declaring node.
    Local { declaration: NodeId, ty: TypeRef },
    /// A method or lambda parameter.
    Parameter { declaration: NodeId, ty: TypeRef },
    Member(MemberRef),
    Type(TypeRef),
}

/// Symbol lookup provided by the host. Implementations are read-only and may be shared between
/// pipelines running on different trees.
pub trait Resolver {
    /// Resolves the simple `name` as written at `location`. `None` means the name is unknown or not
    /// visible, which callers treat as "cannot prove anything".
    fn resolve_name(
        &self,
        arena: &Arena,
        location: NodeId,
        name: &str,
        mode: NameMode,
    ) -> Option<Resolved>;

    fn resolve_as_type(&self, arena: &Arena, location: NodeId, name: &str) -> Option<TypeRef> {
        match self.resolve_name(arena, location, name, NameMode::Type)? {
            Resolved::Type(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Resolves names against the declarations present in the tree itself. Inherited members and
/// imported types are unknown to it.
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeResolver;

impl TreeResolver {
    // Declarations in statement lists and headers that precede `child` inside `parent`.
    fn local(&self, arena: &Arena, parent: NodeId, child: NodeId, name: &str) -> Option<Resolved> {
        let declared = |declaration: NodeId| -> Option<Resolved> {
            let Node::VariableDeclaration { ty, variables, .. } = &arena[declaration] else {
                return None;
            };
            variables
                .iter()
                .find(|variable| arena[**variable].declared_name().is_some_and(|n| n == name))
                .map(|variable| Resolved::Local {
                    declaration: *variable,
                    ty: ty.clone(),
                })
        };
        let preceding = |list: &[NodeId]| -> Option<Resolved> {
            list.iter()
                .take_while(|sibling| **sibling != child)
                .filter_map(|sibling| declared(*sibling))
                .last()
        };

        match &arena[parent] {
            Node::Block { statements } | Node::SwitchSection { statements, .. } => {
                preceding(statements)
            }
            Node::For { initializers, .. } => {
                if arena.role(child) == crate::ast::Role::ForInitializer {
                    preceding(initializers)
                } else {
                    initializers.iter().find_map(|initializer| declared(*initializer))
                }
            }
            Node::Try { resources, .. } => {
                if arena.role(child) == crate::ast::Role::Resource {
                    preceding(resources)
                } else {
                    resources.iter().find_map(|resource| declared(*resource))
                }
            }
            Node::ForEach { variable, body, .. } if *body == child => declared(*variable),
            Node::Catch {
                name: declared,
                types,
                ..
            } if declared == name => Some(Resolved::Local {
                declaration: parent,
                ty: types.first().cloned().unwrap_or_else(TypeRef::object),
            }),
            Node::Lambda { parameters, .. } | Node::Method { parameters, .. } => {
                parameters.iter().find_map(|parameter| match &arena[*parameter] {
                    Node::Parameter { name: declared, ty, .. } if declared == name => {
                        Some(Resolved::Parameter {
                            declaration: *parameter,
                            ty: ty.clone(),
                        })
                    }
                    _ => None,
                })
            }
            _ => None,
        }
    }

    fn member(&self, arena: &Arena, ty: NodeId, name: &str, mode: NameMode) -> Option<Resolved> {
        let Node::TypeDeclaration {
            name: own, members, ..
        } = &arena[ty]
        else {
            return None;
        };
        if mode == NameMode::Type && own.simple() == name {
            return Some(Resolved::Type(TypeRef::Class(own.clone())));
        }
        members.iter().find_map(|member| match (&arena[*member], mode) {
            (Node::Field { name: declared, .. }, NameMode::Value)
            | (Node::EnumValue { name: declared, .. }, NameMode::Value)
            | (Node::Method { name: declared, .. }, NameMode::Method)
                if declared == name =>
            {
                arena.declared_member(*member).map(Resolved::Member)
            }
            (Node::TypeDeclaration { name: declared, .. }, NameMode::Type)
                if declared.simple() == name =>
            {
                Some(Resolved::Type(TypeRef::Class(declared.clone())))
            }
            _ => None,
        })
    }
}

impl Resolver for TreeResolver {
    fn resolve_name(
        &self,
        arena: &Arena,
        location: NodeId,
        name: &str,
        mode: NameMode,
    ) -> Option<Resolved> {
        let mut child = location;
        while let Some(parent) = arena.parent(child) {
            let found = match (&arena[parent], mode) {
                (Node::TypeDeclaration { .. }, _) => self.member(arena, parent, name, mode),
                (Node::Block { statements }, NameMode::Type) => statements
                    .iter()
                    .take_while(|statement| **statement != child)
                    .find_map(|statement| match &arena[*statement] {
                        Node::LocalTypeDeclaration { declaration } => {
                            match &arena[*declaration] {
                                Node::TypeDeclaration { name: declared, .. }
                                    if declared.simple() == name =>
                                {
                                    Some(Resolved::Type(TypeRef::Class(declared.clone())))
                                }
                                _ => None,
                            }
                        }
                        _ => None,
                    }),
                (Node::CompilationUnit { types, .. }, NameMode::Type) => {
                    types.iter().find_map(|ty| match &arena[*ty] {
                        Node::TypeDeclaration { name: declared, .. }
                            if declared.simple() == name =>
                        {
                            Some(Resolved::Type(TypeRef::Class(declared.clone())))
                        }
                        _ => None,
                    })
                }
                (_, NameMode::Value) => self.local(arena, parent, child, name),
                _ => None,
            };
            if found.is_some() {
                return found;
            }
            child = parent;
        }
        None
    }
}

/// The kind of conversion (JLS 5) that takes a value of type `from` to type `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    WideningPrimitive,
    Boxing,
    Unboxing,
    /// Unboxing followed by a widening primitive conversion, e.g. `Integer` to `long`.
    UnboxingWidening,
    WideningReference,
    /// Needs an explicit cast.
    Narrowing,
    /// Not decidable without the class hierarchy.
    Unknown,
}

impl Conversion {
    /// Whether assignment contexts apply the conversion without a cast.
    pub fn is_implicit(self) -> bool {
        !matches!(self, Self::Narrowing | Self::Unknown)
    }
}

// Supertypes of every box class.
const BOX_SUPERTYPES: [&str; 4] = [
    "java.lang.Object",
    "java.lang.Number",
    "java.io.Serializable",
    "java.lang.Comparable",
];

pub fn classify_conversion(from: &TypeRef, to: &TypeRef) -> Conversion {
    if from == to {
        return Conversion::Identity;
    }
    match (from, to) {
        (TypeRef::Primitive(from), TypeRef::Primitive(to)) => {
            if from.widens_to(*to) {
                Conversion::WideningPrimitive
            } else if from.is_numeric() && to.is_numeric() {
                Conversion::Narrowing
            } else {
                Conversion::Unknown
            }
        }
        (TypeRef::Primitive(primitive), TypeRef::Class(class)) => {
            if to.unboxed() == Some(*primitive) {
                Conversion::Boxing
            } else if *primitive != PrimitiveType::Void
                && BOX_SUPERTYPES.contains(&class.as_str())
                && (*primitive != PrimitiveType::Boolean || class != "java.lang.Number")
            {
                Conversion::Boxing
            } else {
                Conversion::Unknown
            }
        }
        (TypeRef::Class(_), TypeRef::Primitive(to)) => match from.unboxed() {
            Some(unboxed) if unboxed == *to => Conversion::Unboxing,
            Some(unboxed) if unboxed.widens_to(*to) => Conversion::UnboxingWidening,
            _ => Conversion::Unknown,
        },
        (TypeRef::Null, to) if to.is_reference() => Conversion::WideningReference,
        (_, TypeRef::Class(class)) if class == "java.lang.Object" && from.is_reference() => {
            Conversion::WideningReference
        }
        (TypeRef::Array(_), TypeRef::Class(class))
            if class == "java.lang.Cloneable" || class == "java.io.Serializable" =>
        {
            Conversion::WideningReference
        }
        (TypeRef::Array(from), TypeRef::Array(to)) if from.is_reference() && to.is_reference() => {
            match classify_conversion(from, to) {
                Conversion::WideningReference => Conversion::WideningReference,
                _ => Conversion::Unknown,
            }
        }
        _ => Conversion::Unknown,
    }
}
