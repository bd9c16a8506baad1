//! Questions about trees that several passes ask.

use super::{
    Arena, BinaryOp, MemberKind, MemberRef, MethodKind, Modifiers, Name, Node, NodeId, Role, TypeRef,
    UnaryOp,
};

impl Arena {
    /// Whether control never falls through the end of `id`.
    pub fn is_divergent(&self, id: NodeId) -> bool {
        match &self[id] {
            Node::Return { .. }
            | Node::Throw { .. }
            | Node::Break { .. }
            | Node::Continue { .. }
            | Node::Goto { .. } => true,
            Node::Block { statements } => statements
                .last()
                .is_some_and(|statement| self.is_divergent(*statement)),
            Node::If {
                then,
                otherwise: Some(otherwise),
                ..
            } => self.is_divergent(*then) && self.is_divergent(*otherwise),
            Node::Synchronized { body, .. } => self.is_divergent(*body),
            _ => false,
        }
    }

    pub fn enclosing_type(&self, id: NodeId) -> Option<NodeId> {
        self.enclosing(id, Node::is_type_declaration)
    }

    /// The binary name of the innermost type declaration around `id`.
    pub fn enclosing_type_name(&self, id: NodeId) -> Option<&Name> {
        match &self[self.enclosing_type(id)?] {
            Node::TypeDeclaration { name, .. } => Some(name),
            _ => None,
        }
    }

    /// A type declaration with binary name `name` anywhere below `root`.
    pub fn find_type(&self, root: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(root).into_iter().find(
            |id| matches!(&self[*id], Node::TypeDeclaration { name: candidate, .. } if candidate == name),
        )
    }

    /// The member reference a field or method declaration introduces.
    pub fn declared_member(&self, declaration: NodeId) -> Option<MemberRef> {
        if let Some(member) = &self.meta(declaration).member {
            return Some(member.clone());
        }
        let declaring_type = self.enclosing_type_name(declaration)?.clone();
        match &self[declaration] {
            Node::Field {
                name,
                ty,
                modifiers,
                ..
            } => Some(MemberRef {
                declaring_type,
                name: name.clone(),
                kind: MemberKind::Field,
                ty: ty.clone(),
                parameters: Vec::new(),
                modifiers: *modifiers,
            }),
            Node::Method {
                name,
                kind,
                return_type,
                modifiers,
                parameters,
                ..
            } => Some(MemberRef {
                declaring_type,
                name: name.clone(),
                kind: match kind {
                    MethodKind::Method => MemberKind::Method,
                    MethodKind::Constructor => MemberKind::Constructor,
                },
                ty: return_type.clone(),
                parameters: parameters
                    .iter()
                    .filter_map(|parameter| match &self[*parameter] {
                        Node::Parameter { ty, .. } => Some(ty.clone()),
                        _ => None,
                    })
                    .collect(),
                modifiers: *modifiers,
            }),
            Node::EnumValue { name, .. } => Some(MemberRef {
                declaring_type: declaring_type.clone(),
                name: name.clone(),
                kind: MemberKind::Field,
                ty: TypeRef::Class(declaring_type),
                parameters: Vec::new(),
                modifiers: Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL | Modifiers::ENUM,
            }),
            _ => None,
        }
    }

    /// The declaration of `member` below `root`, if it is part of this tree.
    pub fn find_member_declaration(&self, root: NodeId, member: &MemberRef) -> Option<NodeId> {
        let ty = self.find_type(root, &member.declaring_type)?;
        self.children(ty).into_iter().find(|child| {
            self.declared_member(*child)
                .is_some_and(|declared| declared.same_member(member))
        })
    }

    /// Nodes below `root` whose resolved member is `member`.
    pub fn member_references(&self, root: NodeId, member: &MemberRef) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| {
                !matches!(self[*id], Node::Field { .. } | Node::Method { .. })
                    && self
                        .meta(*id)
                        .member
                        .as_ref()
                        .is_some_and(|candidate| candidate.same_member(member))
            })
            .collect()
    }

    /// Searches the statements preceding `from` and its ancestors for the declaration of the local
    /// variable `name`, without leaving the enclosing method or lambda.
    pub fn find_variable_declaration(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = from;
        loop {
            if let Some(siblings) = self.siblings(current) {
                for sibling in siblings.iter().take_while(|sibling| **sibling != current) {
                    if self.declares_variable(*sibling, name) {
                        return Some(*sibling);
                    }
                }
            }
            current = self.parent(current)?;
            if matches!(
                self[current],
                Node::Method { .. } | Node::Lambda { .. } | Node::TypeDeclaration { .. }
            ) {
                return None;
            }
        }
    }

    /// Whether `declaration` is a local variable declaration introducing `name`.
    pub fn declares_variable(&self, declaration: NodeId, name: &str) -> bool {
        match &self[declaration] {
            Node::VariableDeclaration { variables, .. } => variables
                .iter()
                .any(|variable| self[*variable].declared_name().is_some_and(|n| n == name)),
            _ => false,
        }
    }

    /// Whether `id` mentions the local `name` in a way that requires it to be in scope. Nodes that
    /// declare their own variable of that name do not count.
    pub fn uses_variable(&self, id: NodeId, name: &str) -> bool {
        match &self[id] {
            Node::Identifier { name: candidate } => return candidate == name,
            Node::For { initializers, .. } => {
                if initializers
                    .iter()
                    .any(|initializer| self.declares_variable(*initializer, name))
                {
                    return false;
                }
            }
            Node::Try { resources, .. } => {
                if resources
                    .iter()
                    .any(|resource| self.declares_variable(*resource, name))
                {
                    return false;
                }
            }
            Node::ForEach { variable, .. } => {
                if self.declares_variable(*variable, name) {
                    return false;
                }
            }
            Node::Catch { name: candidate, .. } if candidate == name => return false,
            Node::Lambda { parameters, .. } => {
                if parameters
                    .iter()
                    .any(|parameter| self[*parameter].declared_name().is_some_and(|n| n == name))
                {
                    return false;
                }
            }
            _ => {}
        }
        self.children(id)
            .into_iter()
            .any(|child| self.uses_variable(child, name))
    }

    /// Whether any type written below `id` names the class `name`, arrays included.
    pub fn mentions_type(&self, id: NodeId, name: &str) -> bool {
        fn names(ty: &TypeRef, name: &str) -> bool {
            match ty {
                TypeRef::Class(class) => class == name,
                TypeRef::Array(element) => names(element, name),
                _ => false,
            }
        }

        self.descendants(id).into_iter().any(|node| match &self[node] {
            Node::VariableDeclaration { ty, .. }
            | Node::Field { ty, .. }
            | Node::Parameter { ty, .. }
            | Node::Cast { ty, .. }
            | Node::InstanceOf { ty, .. }
            | Node::ObjectCreation { ty, .. }
            | Node::ArrayCreation { ty, .. }
            | Node::TypeReference { ty }
            | Node::ClassLiteral { ty } => names(ty, name),
            Node::Method { return_type, .. } => names(return_type, name),
            Node::Catch { types, .. } => types.iter().any(|ty| names(ty, name)),
            _ => false,
        })
    }

    /// Whether `id` contains a write to the local `name`.
    pub fn assigns_variable(&self, id: NodeId, name: &str) -> bool {
        self.descendants(id).into_iter().any(|node| match &self[node] {
            Node::Assignment { target, .. } => {
                self[*target].as_identifier().is_some_and(|n| n == name)
            }
            Node::Unary { op, operand } if op.is_update() => {
                self[*operand].as_identifier().is_some_and(|n| n == name)
            }
            _ => false,
        })
    }

    /// Whether evaluating `id` twice, or not at all, is indistinguishable from evaluating it once.
    pub fn is_side_effect_free(&self, id: NodeId) -> bool {
        match &self[id] {
            Node::Identifier { .. }
            | Node::Literal { .. }
            | Node::This { .. }
            | Node::Super
            | Node::TypeReference { .. }
            | Node::ClassLiteral { .. } => true,
            Node::MemberReference { target, .. } => self.is_side_effect_free(*target),
            _ => false,
        }
    }

    /// Whether the statement occupies an entry of a statement list.
    pub fn is_in_statement_list(&self, id: NodeId) -> bool {
        self.role(id) == Role::Statement && self.siblings(id).is_some()
    }

    /// Turns the expression at `id` into its logical negation, in place. Returns the node now
    /// occupying the position.
    pub fn negate(&mut self, id: NodeId) -> NodeId {
        match self[id].clone() {
            Node::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                self.replace(id, operand);
                operand
            }
            Node::Binary { op, left, right } if op.is_comparison() => {
                // Ordered comparisons are false for NaN either way round, so they only invert for
                // operands known to be non-floating.
                let invertible = matches!(op, BinaryOp::Eq | BinaryOp::Ne)
                    || [left, right].iter().all(|operand| {
                        self.meta(*operand)
                            .ty
                            .as_ref()
                            .and_then(|ty| ty.primitive())
                            .is_some_and(|primitive| !primitive.is_floating())
                    });
                match op.inverted() {
                    Some(inverted) if invertible => {
                        if let Node::Binary { op, .. } = self.node_mut(id) {
                            *op = inverted;
                        }
                        id
                    }
                    _ => self.wrap(id, |operand| Node::Unary {
                        op: UnaryOp::Not,
                        operand,
                    }),
                }
            }
            Node::Literal {
                value: super::Literal::Bool(value),
            } => {
                let negated = self.bool(!value);
                self.replace(id, negated);
                negated
            }
            _ => self.wrap(id, |operand| Node::Unary {
                op: UnaryOp::Not,
                operand,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Arena, BinaryOp, TypeRef, UnaryOp};

    #[test]
    fn negation() {
        let mut arena = Arena::new();
        let i = arena.local("i", TypeRef::int());
        let n = arena.local("n", TypeRef::int());
        let less = arena.binary(BinaryOp::Lt, i, n);
        let statement = arena.expr_stmt(less);
        arena.negate(less);
        assert_eq!(arena.debug(&statement).to_string(), "i >= n;");

        let d = arena.local("d", TypeRef::Primitive(crate::ast::PrimitiveType::Double));
        let zero = arena.literal(crate::ast::Literal::Double(0.0));
        let less = arena.binary(BinaryOp::Lt, d, zero);
        let statement = arena.expr_stmt(less);
        arena.negate(less);
        assert_eq!(arena.debug(&statement).to_string(), "!(d < 0.0);");

        let flag = arena.ident("flag");
        let not = arena.unary(UnaryOp::Not, flag);
        let statement = arena.expr_stmt(not);
        let result = arena.negate(not);
        assert_eq!(result, flag);
        assert_eq!(arena.debug(&statement).to_string(), "flag;");
    }

    #[test]
    fn variable_usage() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "i", None);
        let i = arena.ident("i");
        let one = arena.int(1);
        let assignment = arena.assign(i, one);
        let statement = arena.expr_stmt(assignment);
        let body = arena.block(vec![declaration, statement]);
        assert!(arena.uses_variable(statement, "i"));
        assert!(arena.assigns_variable(statement, "i"));
        assert!(!arena.uses_variable(statement, "j"));
        assert_eq!(arena.find_variable_declaration(one, "i"), Some(declaration));
        assert_eq!(arena.find_variable_declaration(one, "j"), None);
        assert!(arena.contains(body, one));
    }
}
