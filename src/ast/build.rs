//! Node constructors. Passes use them to synthesize replacement nodes; tests use them to build input
//! trees.

use super::{
    Arena, AssignOp, BinaryOp, Literal, Meta, MethodKind, Modifiers, Name, Node, NodeId, TypeKind,
    TypeRef, UnaryOp, Variable,
};

impl Arena {
    pub fn ident(&mut self, name: &str) -> NodeId {
        self.alloc(Node::Identifier {
            name: Name::from(name),
        })
    }

    /// An identifier denoting a local variable of type `ty`.
    pub fn local(&mut self, name: &str, ty: TypeRef) -> NodeId {
        let variable = Variable {
            name: Name::from(name),
            ty: ty.clone(),
            is_parameter: false,
            is_generated: false,
        };
        self.alloc_with_meta(
            Node::Identifier {
                name: Name::from(name),
            },
            Meta {
                ty: Some(ty),
                variable: Some(variable),
                ..Meta::default()
            },
        )
    }

    pub fn literal(&mut self, value: Literal) -> NodeId {
        let ty = value.ty();
        self.alloc_with_meta(
            Node::Literal { value },
            Meta {
                ty: Some(ty),
                ..Meta::default()
            },
        )
    }

    pub fn int(&mut self, value: i32) -> NodeId {
        self.literal(Literal::Int(value))
    }

    pub fn bool(&mut self, value: bool) -> NodeId {
        self.literal(Literal::Bool(value))
    }

    pub fn null(&mut self) -> NodeId {
        self.literal(Literal::Null)
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.literal(Literal::String(Name::from(value)))
    }

    pub fn this(&mut self) -> NodeId {
        self.alloc(Node::This { qualifier: None })
    }

    pub fn type_ref(&mut self, ty: TypeRef) -> NodeId {
        self.alloc(Node::TypeReference { ty })
    }

    pub fn member(&mut self, target: NodeId, member: &str) -> NodeId {
        self.alloc(Node::MemberReference {
            target,
            member: Name::from(member),
        })
    }

    /// `target.method(arguments)`.
    pub fn invoke(&mut self, target: NodeId, method: &str, arguments: Vec<NodeId>) -> NodeId {
        let target = self.member(target, method);
        self.alloc(Node::Invocation { target, arguments })
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.alloc(Node::Binary { op, left, right })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> NodeId {
        self.alloc(Node::Unary { op, operand })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.assign_op(AssignOp::Assign, target, value)
    }

    pub fn assign_op(&mut self, op: AssignOp, target: NodeId, value: NodeId) -> NodeId {
        self.alloc(Node::Assignment { op, target, value })
    }

    pub fn cast(&mut self, ty: TypeRef, operand: NodeId) -> NodeId {
        self.alloc_with_meta(
            Node::Cast {
                ty: ty.clone(),
                operand,
            },
            Meta {
                ty: Some(ty),
                ..Meta::default()
            },
        )
    }

    pub fn new_object(&mut self, ty: TypeRef, arguments: Vec<NodeId>) -> NodeId {
        self.alloc_with_meta(
            Node::ObjectCreation {
                ty: ty.clone(),
                arguments,
                body: None,
            },
            Meta {
                ty: Some(ty),
                ..Meta::default()
            },
        )
    }

    pub fn index(&mut self, target: NodeId, index: NodeId) -> NodeId {
        self.alloc(Node::Indexer { target, index })
    }

    pub fn expr_stmt(&mut self, expression: NodeId) -> NodeId {
        self.alloc(Node::ExpressionStatement { expression })
    }

    pub fn block(&mut self, statements: Vec<NodeId>) -> NodeId {
        self.alloc(Node::Block { statements })
    }

    pub fn if_(&mut self, condition: NodeId, then: NodeId, otherwise: Option<NodeId>) -> NodeId {
        self.alloc(Node::If {
            condition,
            then,
            otherwise,
        })
    }

    pub fn while_(&mut self, condition: NodeId, body: NodeId) -> NodeId {
        self.alloc(Node::While { condition, body })
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.alloc(Node::Return { value })
    }

    pub fn break_(&mut self, label: Option<&str>) -> NodeId {
        self.alloc(Node::Break {
            label: label.map(Name::from),
        })
    }

    pub fn continue_(&mut self, label: Option<&str>) -> NodeId {
        self.alloc(Node::Continue {
            label: label.map(Name::from),
        })
    }

    /// `ty name = initializer;` with a single variable.
    pub fn declare(&mut self, ty: TypeRef, name: &str, initializer: Option<NodeId>) -> NodeId {
        let variable = Variable {
            name: Name::from(name),
            ty: ty.clone(),
            is_parameter: false,
            is_generated: false,
        };
        let meta = Meta {
            ty: Some(ty.clone()),
            variable: Some(variable),
            ..Meta::default()
        };
        let initializer = self.alloc_with_meta(
            Node::VariableInitializer {
                name: Name::from(name),
                initializer,
            },
            meta.clone(),
        );
        self.alloc_with_meta(
            Node::VariableDeclaration {
                ty,
                modifiers: Modifiers::NONE,
                variables: vec![initializer],
            },
            meta,
        )
    }

    pub fn parameter(&mut self, ty: TypeRef, name: &str) -> NodeId {
        let variable = Variable {
            name: Name::from(name),
            ty: ty.clone(),
            is_parameter: true,
            is_generated: false,
        };
        self.alloc_with_meta(
            Node::Parameter {
                name: Name::from(name),
                ty: ty.clone(),
                modifiers: Modifiers::NONE,
            },
            Meta {
                ty: Some(ty),
                variable: Some(variable),
                ..Meta::default()
            },
        )
    }

    /// The default value of `ty` as a literal node.
    pub fn default_value(&mut self, ty: &TypeRef) -> NodeId {
        self.literal(ty.default_value())
    }

    /// Sets the static type of an expression and returns it, for chaining.
    pub fn typed(&mut self, id: NodeId, ty: TypeRef) -> NodeId {
        self.meta_mut(id).ty = Some(ty);
        id
    }

    pub fn compilation_unit(&mut self, package: &str, imports: Vec<NodeId>, types: Vec<NodeId>) -> NodeId {
        self.alloc(Node::CompilationUnit {
            package: Name::from(package),
            imports,
            types,
        })
    }

    pub fn import(&mut self, name: &str, is_static: bool) -> NodeId {
        self.alloc(Node::Import {
            name: Name::from(name),
            is_static,
        })
    }

    pub fn type_declaration(
        &mut self,
        name: &str,
        kind: TypeKind,
        modifiers: Modifiers,
        members: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(Node::TypeDeclaration {
            name: Name::from(name),
            kind,
            modifiers,
            members,
        })
    }

    pub fn field(
        &mut self,
        name: &str,
        ty: TypeRef,
        modifiers: Modifiers,
        initializer: Option<NodeId>,
    ) -> NodeId {
        self.alloc(Node::Field {
            name: Name::from(name),
            ty,
            modifiers,
            initializer,
        })
    }

    pub fn method(
        &mut self,
        name: &str,
        return_type: TypeRef,
        modifiers: Modifiers,
        parameters: Vec<NodeId>,
        body: Option<NodeId>,
    ) -> NodeId {
        self.alloc(Node::Method {
            name: Name::from(name),
            kind: MethodKind::Method,
            return_type,
            modifiers,
            parameters,
            body,
        })
    }

    pub fn constructor(&mut self, modifiers: Modifiers, parameters: Vec<NodeId>, body: NodeId) -> NodeId {
        self.alloc(Node::Method {
            name: Name::from("<init>"),
            kind: MethodKind::Constructor,
            return_type: TypeRef::void(),
            modifiers,
            parameters,
            body: Some(body),
        })
    }

    /// `static { body }`.
    pub fn static_initializer(&mut self, body: NodeId) -> NodeId {
        self.alloc(Node::Initializer {
            modifiers: Modifiers::STATIC,
            body,
        })
    }
}
