use super::{members, remove_empty_initializers, static_initializers, statements, type_declarations};
use crate::ast::{Arena, MethodKind, Modifiers, Name, Node, NodeId, PrimitiveType, TypeKind, TypeRef};
use crate::pattern::Pattern;
use crate::pattern::build::*;
use crate::{Context, InvariantViolation, Transform};
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Rebuilds enum constant declarations from the fields and static initializer javac compiles them
/// into, and drops the members javac synthesizes for every enum.
pub struct EnumRewriter;

impl Transform for EnumRewriter {
    fn name(&self) -> &'static str {
        "EnumRewriter"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for ty in type_declarations(arena, root) {
            if let Node::TypeDeclaration {
                name,
                kind: TypeKind::Enum,
                ..
            } = &arena[ty]
            {
                let name = name.clone();
                EnumDeclaration { arena, ty, name }.rewrite();
            }
        }
        Ok(())
    }
}

// return (E[]) $VALUES.clone();
static VALUES_BODY: LazyLock<Pattern> = LazyLock::new(|| {
    let clone = call(
        choice(vec![ident("$VALUES"), member(any(), "$VALUES")]),
        "clone",
        vec![],
    );
    block_of(vec![ret(choice(vec![cast(None, clone.clone()), clone]))])
});

// return (E) Enum.valueOf(E.class, name);
static VALUE_OF_BODY: LazyLock<Pattern> = LazyLock::new(|| {
    let lookup = call(any(), "valueOf", vec![class_literal(None), any_ident()]);
    block_of(vec![ret(choice(vec![cast(None, lookup.clone()), lookup]))])
});

struct EnumDeclaration<'a> {
    arena: &'a mut Arena,
    ty: NodeId,
    name: Name,
}

impl EnumDeclaration<'_> {
    fn rewrite(&mut self) {
        let constants: Vec<NodeId> = members(self.arena, self.ty)
            .into_iter()
            .filter(|member| {
                matches!(&self.arena[*member], Node::Field { modifiers, .. } if modifiers.contains(Modifiers::ENUM))
            })
            .collect();

        // Every constant needs its creation, or the enum is left alone.
        let mut creations = Vec::with_capacity(constants.len());
        for (ordinal, constant) in constants.iter().enumerate() {
            let Some(name) = self.arena[*constant].declared_name().cloned() else {
                return;
            };
            match self.find_creation(&name, ordinal) {
                Some(creation) => creations.push(creation),
                None => {
                    debug!(ty = %self.name, constant = %name, "enum constant without matching creation");
                    return;
                }
            }
        }

        for (constant, (statement, creation)) in constants.into_iter().zip(creations) {
            self.handle_constant(constant, statement, creation);
        }
        self.remove_values_array();
        self.remove_generated_methods();
        self.strip_constructors();
        remove_empty_initializers(self.arena, self.ty);

        // `final` and `abstract` are implied for enums and illegal to write.
        if let Some(modifiers) = self.arena.node_mut(self.ty).modifiers_mut() {
            modifiers.remove(Modifiers::FINAL | Modifiers::ABSTRACT);
        }
    }

    /// Finds `NAME = new E("NAME", ordinal, ...);` in a static initializer.
    fn find_creation(&self, constant: &Name, ordinal: usize) -> Option<(NodeId, NodeId)> {
        let arena = &*self.arena;
        static_initializers(arena, self.ty)
            .into_iter()
            .flat_map(|body| statements(arena, body))
            .find_map(|statement| {
                let Node::ExpressionStatement { expression } = arena[statement] else {
                    return None;
                };
                let Node::Assignment { target, value, .. } = arena[expression] else {
                    return None;
                };
                if !self.is_own_field(target, constant) {
                    return None;
                }
                let Node::ObjectCreation {
                    ty,
                    arguments,
                    body,
                } = &arena[value]
                else {
                    return None;
                };
                if body.is_none() && *ty != TypeRef::Class(self.name.clone()) {
                    return None;
                }
                let name = arguments.first()?;
                let index = arguments.get(1)?;
                let name_matches = arena[*name]
                    .as_literal()
                    .and_then(|literal| literal.as_str())
                    .is_some_and(|name| name == constant);
                let ordinal_matches = arena[*index]
                    .as_literal()
                    .and_then(|literal| literal.as_int())
                    .is_some_and(|index| usize::try_from(index) == Ok(ordinal));
                (name_matches && ordinal_matches).then_some((statement, value))
            })
    }

    // `NAME` or `E.NAME`.
    fn is_own_field(&self, target: NodeId, field: &str) -> bool {
        match &self.arena[target] {
            Node::Identifier { name } => name == field,
            Node::MemberReference { target, member } => {
                member == field
                    && matches!(&self.arena[*target], Node::TypeReference { ty } if *ty == TypeRef::Class(self.name.clone()))
            }
            _ => false,
        }
    }

    fn handle_constant(&mut self, constant: NodeId, statement: NodeId, creation: NodeId) {
        let Node::ObjectCreation {
            arguments, body, ..
        } = self.arena[creation].clone()
        else {
            return;
        };
        let Some(name) = self.arena[constant].declared_name().cloned() else {
            return;
        };
        let value = self.arena.alloc(Node::EnumValue {
            name: name.clone(),
            arguments: arguments[2..].to_vec(),
            body,
        });
        self.arena.replace(constant, value);
        self.arena.detach(statement);
        trace!(ty = %self.name, constant = %name, "rebuilt enum constant");
    }

    fn is_values_field(&self, member: NodeId) -> bool {
        match &self.arena[member] {
            Node::Field { name, ty, modifiers, .. } => {
                modifiers.is_static()
                    && (name == "$VALUES"
                        || (modifiers.is_synthetic()
                            && *ty == TypeRef::array_of(TypeRef::Class(self.name.clone()))))
            }
            _ => false,
        }
    }

    fn remove_values_array(&mut self) {
        let fields: Vec<NodeId> = members(self.arena, self.ty)
            .into_iter()
            .filter(|member| self.is_values_field(*member))
            .collect();
        for field in fields {
            let Some(name) = self.arena[field].declared_name().cloned() else {
                continue;
            };
            let assignments: Vec<NodeId> = static_initializers(self.arena, self.ty)
                .into_iter()
                .flat_map(|body| statements(self.arena, body))
                .filter(|statement| {
                    let Node::ExpressionStatement { expression } = self.arena[*statement] else {
                        return false;
                    };
                    matches!(self.arena[expression], Node::Assignment { target, .. } if self.is_own_field(target, &name))
                })
                .collect();
            for assignment in assignments {
                self.arena.detach(assignment);
            }
            self.arena.detach(field);
            trace!(ty = %self.name, field = %name, "removed enum values array");
        }
    }

    fn remove_generated_methods(&mut self) {
        for member in members(self.arena, self.ty) {
            let Node::Method {
                name,
                kind: MethodKind::Method,
                modifiers,
                parameters,
                body,
                ..
            } = &self.arena[member]
            else {
                continue;
            };
            if !modifiers.is_static() {
                continue;
            }
            let generated = match (name.as_str(), parameters.as_slice(), body) {
                ("$values", [], _) => modifiers.is_synthetic(),
                ("values", [], Some(body)) => VALUES_BODY.match_node(self.arena, *body).is_some(),
                ("valueOf", [parameter], Some(body)) => {
                    matches!(&self.arena[*parameter], Node::Parameter { ty, .. } if ty.is_string())
                        && VALUE_OF_BODY.match_node(self.arena, *body).is_some()
                }
                _ => false,
            };
            if generated {
                trace!(ty = %self.name, method = %name, "removed generated enum method");
                self.arena.detach(member);
            }
        }
    }

    /// Drops the leading `(String name, int ordinal)` parameters every enum constructor receives
    /// and the `super(name, ordinal)` call that forwards them.
    fn strip_constructors(&mut self) {
        for member in members(self.arena, self.ty) {
            let Node::Method {
                kind: MethodKind::Constructor,
                parameters,
                body: Some(body),
                ..
            } = self.arena[member].clone()
            else {
                continue;
            };
            let [name, ordinal, ..] = parameters[..] else {
                continue;
            };
            let (Node::Parameter { name: name_id, ty: name_ty, .. }, Node::Parameter { name: ordinal_id, ty: ordinal_ty, .. }) =
                (&self.arena[name], &self.arena[ordinal])
            else {
                continue;
            };
            if !name_ty.is_string() || *ordinal_ty != TypeRef::Primitive(PrimitiveType::Int) {
                continue;
            }
            let (name_id, ordinal_id) = (name_id.clone(), ordinal_id.clone());

            // The chained constructor call receives them first.
            let Some(&first) = statements(self.arena, body).first() else {
                continue;
            };
            let Node::ExpressionStatement { expression } = self.arena[first] else {
                continue;
            };
            let Node::Invocation { target, arguments } = self.arena[expression].clone() else {
                continue;
            };
            let forwards = arguments.len() >= 2
                && self.arena[arguments[0]].as_identifier() == Some(&name_id)
                && self.arena[arguments[1]].as_identifier() == Some(&ordinal_id);
            if !forwards {
                continue;
            }
            match self.arena[target] {
                Node::Super if arguments.len() == 2 => self.arena.detach(first),
                Node::This { .. } => {
                    self.arena.detach(arguments[0]);
                    self.arena.detach(arguments[1]);
                }
                _ => continue,
            }
            self.arena.detach(name);
            self.arena.detach(ordinal);
            trace!(ty = %self.name, "removed enum constructor plumbing");
        }
    }
}
