use super::{Literal, Modifiers, Name, NodeId, TypeRef};
use core::fmt::Debug;
use derive_where::derive_where;
use displaydoc::Display;

/// The family of field types a node is built from.
///
/// Real trees store child handles and concrete values. Patterns reuse the very same enum with
/// sub-patterns in child positions and `Option`al values, so that a node pattern always mirrors the
/// shape of the node it matches.
pub trait Shape {
    type Child: Debug + Clone + PartialEq;
    type OptChild: Debug + Clone + PartialEq;
    type Children: Debug + Clone + PartialEq;
    type Value<T: Debug + Clone + PartialEq>: Debug + Clone + PartialEq;
}

#[derive(Debug)]
pub struct Tree;

impl Shape for Tree {
    type Child = NodeId;
    type OptChild = Option<NodeId>;
    type Children = Vec<NodeId>;
    type Value<T: Debug + Clone + PartialEq> = T;
}

pub type Node = NodeKind<Tree>;

#[derive_where(Clone, Debug, PartialEq)]
pub enum NodeKind<S: Shape> {
    // Declarations
    CompilationUnit {
        package: S::Value<Name>,
        imports: S::Children,
        types: S::Children,
    },
    Import {
        name: S::Value<Name>,
        is_static: S::Value<bool>,
    },
    /// `name` is the binary name, e.g. `pkg.Outer$Inner`.
    TypeDeclaration {
        name: S::Value<Name>,
        kind: S::Value<TypeKind>,
        modifiers: S::Value<Modifiers>,
        members: S::Children,
    },
    Field {
        name: S::Value<Name>,
        ty: S::Value<TypeRef>,
        modifiers: S::Value<Modifiers>,
        initializer: S::OptChild,
    },
    Method {
        name: S::Value<Name>,
        kind: S::Value<MethodKind>,
        return_type: S::Value<TypeRef>,
        modifiers: S::Value<Modifiers>,
        parameters: S::Children,
        body: S::OptChild,
    },
    /// `static { ... }` or an instance initializer block.
    Initializer {
        modifiers: S::Value<Modifiers>,
        body: S::Child,
    },
    EnumValue {
        name: S::Value<Name>,
        arguments: S::Children,
        body: S::OptChild,
    },
    Parameter {
        name: S::Value<Name>,
        ty: S::Value<TypeRef>,
        modifiers: S::Value<Modifiers>,
    },

    // Statements
    Block {
        statements: S::Children,
    },
    ExpressionStatement {
        expression: S::Child,
    },
    VariableDeclaration {
        ty: S::Value<TypeRef>,
        modifiers: S::Value<Modifiers>,
        variables: S::Children,
    },
    VariableInitializer {
        name: S::Value<Name>,
        initializer: S::OptChild,
    },
    LocalTypeDeclaration {
        declaration: S::Child,
    },
    If {
        condition: S::Child,
        then: S::Child,
        otherwise: S::OptChild,
    },
    While {
        condition: S::Child,
        body: S::Child,
    },
    DoWhile {
        body: S::Child,
        condition: S::Child,
    },
    /// Initializers are a single variable declaration or expression statements; iterators are
    /// expression statements.
    For {
        initializers: S::Children,
        condition: S::OptChild,
        iterators: S::Children,
        body: S::Child,
    },
    ForEach {
        variable: S::Child,
        iterable: S::Child,
        body: S::Child,
    },
    Switch {
        selector: S::Child,
        sections: S::Children,
    },
    SwitchSection {
        labels: S::Children,
        statements: S::Children,
    },
    /// `case value:`, or `default:` when `value` is absent.
    CaseLabel {
        value: S::OptChild,
    },
    Try {
        resources: S::Children,
        body: S::Child,
        catches: S::Children,
        finally: S::OptChild,
    },
    Catch {
        types: S::Value<Vec<TypeRef>>,
        name: S::Value<Name>,
        body: S::Child,
    },
    Labeled {
        label: S::Value<Name>,
        statement: S::Child,
    },
    /// A jump target emitted by the upstream decompiler, referenced by `Goto`.
    Label {
        label: S::Value<Name>,
    },
    Goto {
        label: S::Value<Name>,
    },
    Break {
        label: S::Value<Option<Name>>,
    },
    Continue {
        label: S::Value<Option<Name>>,
    },
    Return {
        value: S::OptChild,
    },
    Throw {
        exception: S::Child,
    },
    Assert {
        condition: S::Child,
        message: S::OptChild,
    },
    Synchronized {
        lock: S::Child,
        body: S::Child,
    },
    Empty,

    // Expressions
    Identifier {
        name: S::Value<Name>,
    },
    MemberReference {
        target: S::Child,
        member: S::Value<Name>,
    },
    /// `target` is a `MemberReference` naming the method, an `Identifier` for unqualified calls, or
    /// `This`/`Super` for constructor chaining.
    Invocation {
        target: S::Child,
        arguments: S::Children,
    },
    /// `Type::member`; `captured` holds values bound at creation time.
    MethodReference {
        target: S::Child,
        member: S::Value<Name>,
        captured: S::Children,
    },
    Assignment {
        op: S::Value<AssignOp>,
        target: S::Child,
        value: S::Child,
    },
    Binary {
        op: S::Value<BinaryOp>,
        left: S::Child,
        right: S::Child,
    },
    Unary {
        op: S::Value<UnaryOp>,
        operand: S::Child,
    },
    Conditional {
        condition: S::Child,
        then: S::Child,
        otherwise: S::Child,
    },
    Cast {
        ty: S::Value<TypeRef>,
        operand: S::Child,
    },
    InstanceOf {
        operand: S::Child,
        ty: S::Value<TypeRef>,
    },
    /// `body` is the anonymous class declaration, if any.
    ObjectCreation {
        ty: S::Value<TypeRef>,
        arguments: S::Children,
        body: S::OptChild,
    },
    /// `ty` is the full array type; dimensions are the explicit lengths.
    ArrayCreation {
        ty: S::Value<TypeRef>,
        dimensions: S::Children,
        initializer: S::OptChild,
    },
    ArrayInitializer {
        elements: S::Children,
    },
    Indexer {
        target: S::Child,
        index: S::Child,
    },
    /// `body` is a block or an expression.
    Lambda {
        parameters: S::Children,
        body: S::Child,
    },
    Literal {
        value: S::Value<Literal>,
    },
    This {
        qualifier: S::Value<Option<Name>>,
    },
    Super,
    TypeReference {
        ty: S::Value<TypeRef>,
    },
    ClassLiteral {
        ty: S::Value<TypeRef>,
    },

    /// Fills a required slot whose child was detached.
    Hole,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// class
    Class,
    /// interface
    Interface,
    /// enum
    Enum,
    /// @interface
    Annotation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Method,
    Constructor,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum AssignOp {
    #[displaydoc("=")]
    Assign,
    #[displaydoc("+=")]
    Add,
    #[displaydoc("-=")]
    Sub,
    #[displaydoc("*=")]
    Mul,
    /// /=
    Div,
    /// %=
    Rem,
    /// &=
    And,
    /// |=
    Or,
    /// ^=
    Xor,
    /// <<=
    Shl,
    /// >>=
    Shr,
    /// >>>=
    UnsignedShr,
}

impl AssignOp {
    pub fn binary(self) -> Option<BinaryOp> {
        Some(match self {
            Self::Assign => return None,
            Self::Add => BinaryOp::Add,
            Self::Sub => BinaryOp::Sub,
            Self::Mul => BinaryOp::Mul,
            Self::Div => BinaryOp::Div,
            Self::Rem => BinaryOp::Rem,
            Self::And => BinaryOp::And,
            Self::Or => BinaryOp::Or,
            Self::Xor => BinaryOp::Xor,
            Self::Shl => BinaryOp::Shl,
            Self::Shr => BinaryOp::Shr,
            Self::UnsignedShr => BinaryOp::UnsignedShr,
        })
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    #[displaydoc("+")]
    Add,
    #[displaydoc("-")]
    Sub,
    #[displaydoc("*")]
    Mul,
    /// /
    Div,
    /// %
    Rem,
    /// &
    And,
    /// |
    Or,
    /// ^
    Xor,
    /// <<
    Shl,
    /// >>
    Shr,
    /// >>>
    UnsignedShr,
    /// &&
    LogicalAnd,
    /// ||
    LogicalOr,
    /// ==
    Eq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
}

impl BinaryOp {
    /// The compound assignment operator performing this operation, if any.
    pub fn compound(self) -> Option<AssignOp> {
        Some(match self {
            Self::Add => AssignOp::Add,
            Self::Sub => AssignOp::Sub,
            Self::Mul => AssignOp::Mul,
            Self::Div => AssignOp::Div,
            Self::Rem => AssignOp::Rem,
            Self::And => AssignOp::And,
            Self::Or => AssignOp::Or,
            Self::Xor => AssignOp::Xor,
            Self::Shl => AssignOp::Shl,
            Self::Shr => AssignOp::Shr,
            Self::UnsignedShr => AssignOp::UnsignedShr,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// `!(a op b)` as `a op' b`. Ordering comparisons are only invertible for non-floating operands,
    /// which the caller has to check.
    pub fn inverted(self) -> Option<Self> {
        Some(match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
            _ => return None,
        })
    }

    /// Binding strength used when printing; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::LogicalOr => 3,
            Self::LogicalAnd => 4,
            Self::Or => 5,
            Self::Xor => 6,
            Self::And => 7,
            Self::Eq | Self::Ne => 8,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 9,
            Self::Shl | Self::Shr | Self::UnsignedShr => 10,
            Self::Add | Self::Sub => 11,
            Self::Mul | Self::Div | Self::Rem => 12,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl UnaryOp {
    pub fn is_postfix(self) -> bool {
        matches!(self, Self::PostIncrement | Self::PostDecrement)
    }

    /// Whether the operator writes its operand.
    pub fn is_update(self) -> bool {
        matches!(
            self,
            Self::PreIncrement | Self::PreDecrement | Self::PostIncrement | Self::PostDecrement
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Plus => "+",
            Self::Not => "!",
            Self::BitNot => "~",
            Self::PreIncrement | Self::PostIncrement => "++",
            Self::PreDecrement | Self::PostDecrement => "--",
        }
    }
}

/// The position a node occupies in its parent.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Role {
    /// detached
    Root,
    /// import
    Import,
    /// type declaration
    TypeDeclaration,
    /// member
    Member,
    /// parameter
    Parameter,
    /// body
    Body,
    /// initializer
    Initializer,
    /// argument
    Argument,
    /// statement
    Statement,
    /// expression
    Expression,
    /// variable
    Variable,
    /// condition
    Condition,
    /// then
    Then,
    /// else
    Else,
    /// for initializer
    ForInitializer,
    /// iterator
    Iterator,
    /// iterable
    Iterable,
    /// selector
    Selector,
    /// switch section
    Section,
    /// case label
    CaseLabel,
    /// value
    Value,
    /// resource
    Resource,
    /// catch
    Catch,
    /// finally
    Finally,
    /// lock
    Lock,
    /// message
    Message,
    /// target
    Target,
    /// left
    Left,
    /// right
    Right,
    /// operand
    Operand,
    /// dimension
    Dimension,
    /// element
    Element,
    /// index
    Index,
    /// anonymous body
    AnonymousBody,
}

/// A borrowed view of one child slot of a node.
#[derive(Clone, Copy, Debug)]
pub enum Slot<'a> {
    One(Role, &'a NodeId),
    Opt(Role, &'a Option<NodeId>),
    Many(Role, &'a Vec<NodeId>),
}

#[derive(Debug)]
pub enum SlotMut<'a> {
    One(Role, &'a mut NodeId),
    Opt(Role, &'a mut Option<NodeId>),
    Many(Role, &'a mut Vec<NodeId>),
}

impl Slot<'_> {
    pub fn role(&self) -> Role {
        match self {
            Self::One(role, _) | Self::Opt(role, _) | Self::Many(role, _) => *role,
        }
    }

    pub fn ids(&self) -> &[NodeId] {
        match self {
            Self::One(_, id) => core::slice::from_ref(*id),
            Self::Opt(_, id) => id.as_slice(),
            Self::Many(_, ids) => ids,
        }
    }
}

// The same match serves both the shared and the mutable view: match ergonomics bind the fields by
// reference or by mutable reference depending on how the node is borrowed.
macro_rules! slots {
    ($node:expr, $slot:ident, $f:ident) => {
        match $node {
            NodeKind::CompilationUnit { imports, types, .. } => {
                $f($slot::Many(Role::Import, imports));
                $f($slot::Many(Role::TypeDeclaration, types));
            }
            NodeKind::TypeDeclaration { members, .. } => $f($slot::Many(Role::Member, members)),
            NodeKind::Field { initializer, .. } => $f($slot::Opt(Role::Initializer, initializer)),
            NodeKind::Method {
                parameters, body, ..
            } => {
                $f($slot::Many(Role::Parameter, parameters));
                $f($slot::Opt(Role::Body, body));
            }
            NodeKind::Initializer { body, .. } => $f($slot::One(Role::Body, body)),
            NodeKind::EnumValue {
                arguments, body, ..
            } => {
                $f($slot::Many(Role::Argument, arguments));
                $f($slot::Opt(Role::AnonymousBody, body));
            }
            NodeKind::Block { statements } => $f($slot::Many(Role::Statement, statements)),
            NodeKind::ExpressionStatement { expression } => {
                $f($slot::One(Role::Expression, expression))
            }
            NodeKind::VariableDeclaration { variables, .. } => {
                $f($slot::Many(Role::Variable, variables))
            }
            NodeKind::VariableInitializer { initializer, .. } => {
                $f($slot::Opt(Role::Initializer, initializer))
            }
            NodeKind::LocalTypeDeclaration { declaration } => {
                $f($slot::One(Role::TypeDeclaration, declaration))
            }
            NodeKind::If {
                condition,
                then,
                otherwise,
            } => {
                $f($slot::One(Role::Condition, condition));
                $f($slot::One(Role::Then, then));
                $f($slot::Opt(Role::Else, otherwise));
            }
            NodeKind::While { condition, body } => {
                $f($slot::One(Role::Condition, condition));
                $f($slot::One(Role::Body, body));
            }
            NodeKind::DoWhile { body, condition } => {
                $f($slot::One(Role::Body, body));
                $f($slot::One(Role::Condition, condition));
            }
            NodeKind::For {
                initializers,
                condition,
                iterators,
                body,
            } => {
                $f($slot::Many(Role::ForInitializer, initializers));
                $f($slot::Opt(Role::Condition, condition));
                $f($slot::Many(Role::Iterator, iterators));
                $f($slot::One(Role::Body, body));
            }
            NodeKind::ForEach {
                variable,
                iterable,
                body,
            } => {
                $f($slot::One(Role::Variable, variable));
                $f($slot::One(Role::Iterable, iterable));
                $f($slot::One(Role::Body, body));
            }
            NodeKind::Switch { selector, sections } => {
                $f($slot::One(Role::Selector, selector));
                $f($slot::Many(Role::Section, sections));
            }
            NodeKind::SwitchSection { labels, statements } => {
                $f($slot::Many(Role::CaseLabel, labels));
                $f($slot::Many(Role::Statement, statements));
            }
            NodeKind::CaseLabel { value } => $f($slot::Opt(Role::Value, value)),
            NodeKind::Try {
                resources,
                body,
                catches,
                finally,
            } => {
                $f($slot::Many(Role::Resource, resources));
                $f($slot::One(Role::Body, body));
                $f($slot::Many(Role::Catch, catches));
                $f($slot::Opt(Role::Finally, finally));
            }
            NodeKind::Catch { body, .. } => $f($slot::One(Role::Body, body)),
            NodeKind::Labeled { statement, .. } => $f($slot::One(Role::Statement, statement)),
            NodeKind::Return { value } => $f($slot::Opt(Role::Value, value)),
            NodeKind::Throw { exception } => $f($slot::One(Role::Expression, exception)),
            NodeKind::Assert { condition, message } => {
                $f($slot::One(Role::Condition, condition));
                $f($slot::Opt(Role::Message, message));
            }
            NodeKind::Synchronized { lock, body } => {
                $f($slot::One(Role::Lock, lock));
                $f($slot::One(Role::Body, body));
            }
            NodeKind::MemberReference { target, .. } => $f($slot::One(Role::Target, target)),
            NodeKind::Invocation { target, arguments } => {
                $f($slot::One(Role::Target, target));
                $f($slot::Many(Role::Argument, arguments));
            }
            NodeKind::MethodReference {
                target, captured, ..
            } => {
                $f($slot::One(Role::Target, target));
                $f($slot::Many(Role::Argument, captured));
            }
            NodeKind::Assignment { target, value, .. } => {
                $f($slot::One(Role::Left, target));
                $f($slot::One(Role::Right, value));
            }
            NodeKind::Binary { left, right, .. } => {
                $f($slot::One(Role::Left, left));
                $f($slot::One(Role::Right, right));
            }
            NodeKind::Unary { operand, .. }
            | NodeKind::Cast { operand, .. }
            | NodeKind::InstanceOf { operand, .. } => $f($slot::One(Role::Operand, operand)),
            NodeKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                $f($slot::One(Role::Condition, condition));
                $f($slot::One(Role::Then, then));
                $f($slot::One(Role::Else, otherwise));
            }
            NodeKind::ObjectCreation {
                arguments, body, ..
            } => {
                $f($slot::Many(Role::Argument, arguments));
                $f($slot::Opt(Role::AnonymousBody, body));
            }
            NodeKind::ArrayCreation {
                dimensions,
                initializer,
                ..
            } => {
                $f($slot::Many(Role::Dimension, dimensions));
                $f($slot::Opt(Role::Initializer, initializer));
            }
            NodeKind::ArrayInitializer { elements } => $f($slot::Many(Role::Element, elements)),
            NodeKind::Indexer { target, index } => {
                $f($slot::One(Role::Target, target));
                $f($slot::One(Role::Index, index));
            }
            NodeKind::Lambda { parameters, body } => {
                $f($slot::Many(Role::Parameter, parameters));
                $f($slot::One(Role::Body, body));
            }
            NodeKind::Import { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Label { .. }
            | NodeKind::Goto { .. }
            | NodeKind::Break { .. }
            | NodeKind::Continue { .. }
            | NodeKind::Empty
            | NodeKind::Identifier { .. }
            | NodeKind::Literal { .. }
            | NodeKind::This { .. }
            | NodeKind::Super
            | NodeKind::TypeReference { .. }
            | NodeKind::ClassLiteral { .. }
            | NodeKind::Hole => {}
        }
    };
}

impl Node {
    /// Calls `f` for every child slot, in source order.
    pub fn for_each_slot<'a>(&'a self, mut f: impl FnMut(Slot<'a>)) {
        slots!(self, Slot, f);
    }

    pub fn for_each_slot_mut<'a>(&'a mut self, mut f: impl FnMut(SlotMut<'a>)) {
        slots!(self, SlotMut, f);
    }

    pub fn slots(&self) -> Vec<Slot<'_>> {
        let mut slots = Vec::new();
        self.for_each_slot(|slot| slots.push(slot));
        slots
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeId> {
        let mut children = Vec::new();
        self.for_each_slot(|slot| children.extend_from_slice(slot.ids()));
        children
    }

    /// The node with every child handle replaced by a fixed dummy, for comparing scalar fields only.
    pub(super) fn blanked(&self) -> Self {
        let mut node = self.clone();
        node.for_each_slot_mut(|slot| match slot {
            SlotMut::One(_, id) => *id = NodeId::DUMMY,
            SlotMut::Opt(_, id) => {
                if let Some(id) = id {
                    *id = NodeId::DUMMY;
                }
            }
            SlotMut::Many(_, ids) => ids.fill(NodeId::DUMMY),
        });
        node
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::Identifier { .. }
                | Self::MemberReference { .. }
                | Self::Invocation { .. }
                | Self::MethodReference { .. }
                | Self::Assignment { .. }
                | Self::Binary { .. }
                | Self::Unary { .. }
                | Self::Conditional { .. }
                | Self::Cast { .. }
                | Self::InstanceOf { .. }
                | Self::ObjectCreation { .. }
                | Self::ArrayCreation { .. }
                | Self::ArrayInitializer { .. }
                | Self::Indexer { .. }
                | Self::Lambda { .. }
                | Self::Literal { .. }
                | Self::This { .. }
                | Self::Super
                | Self::TypeReference { .. }
                | Self::ClassLiteral { .. }
        )
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            Self::While { .. } | Self::DoWhile { .. } | Self::For { .. } | Self::ForEach { .. }
        )
    }

    /// Whether an unlabeled `break` inside this statement binds to it.
    pub fn is_breakable(&self) -> bool {
        self.is_loop() || matches!(self, Self::Switch { .. })
    }

    pub fn is_type_declaration(&self) -> bool {
        matches!(self, Self::TypeDeclaration { .. })
    }

    pub fn is_hole(&self) -> bool {
        matches!(self, Self::Hole)
    }

    pub fn as_identifier(&self) -> Option<&Name> {
        match self {
            Self::Identifier { name } => Some(name),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal { value } => Some(value),
            _ => None,
        }
    }

    /// The declared name of a declaration-like node.
    pub fn declared_name(&self) -> Option<&Name> {
        match self {
            Self::TypeDeclaration { name, .. }
            | Self::Field { name, .. }
            | Self::Method { name, .. }
            | Self::EnumValue { name, .. }
            | Self::Parameter { name, .. }
            | Self::VariableInitializer { name, .. }
            | Self::Catch { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn modifiers(&self) -> Option<Modifiers> {
        match self {
            Self::TypeDeclaration { modifiers, .. }
            | Self::Field { modifiers, .. }
            | Self::Method { modifiers, .. }
            | Self::Initializer { modifiers, .. }
            | Self::Parameter { modifiers, .. }
            | Self::VariableDeclaration { modifiers, .. } => Some(*modifiers),
            _ => None,
        }
    }

    pub fn modifiers_mut(&mut self) -> Option<&mut Modifiers> {
        match self {
            Self::TypeDeclaration { modifiers, .. }
            | Self::Field { modifiers, .. }
            | Self::Method { modifiers, .. }
            | Self::Initializer { modifiers, .. }
            | Self::Parameter { modifiers, .. }
            | Self::VariableDeclaration { modifiers, .. } => Some(modifiers),
            _ => None,
        }
    }
}
