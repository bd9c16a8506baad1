//! Constructors for patterns, so rules read close to the Java they recognize.

use super::{Guard, NodePattern, Pattern};
use crate::ast::{Arena, AssignOp, BinaryOp, Literal, Modifiers, Name, NodeId, TypeRef, UnaryOp};

fn node(node: NodePattern) -> Pattern {
    Pattern::Node(Box::new(node))
}

pub fn any() -> Pattern {
    Pattern::Any
}

pub fn absent() -> Pattern {
    Pattern::Absent
}

pub fn named(name: &'static str, pattern: Pattern) -> Pattern {
    Pattern::Named(name, Box::new(pattern))
}

pub fn capture(name: &'static str) -> Pattern {
    named(name, any())
}

pub fn backref(name: &'static str) -> Pattern {
    Pattern::BackRef(name)
}

pub fn choice(alternatives: Vec<Pattern>) -> Pattern {
    Pattern::Choice(alternatives)
}

pub fn optional(pattern: Pattern) -> Pattern {
    Pattern::Optional(Box::new(pattern))
}

pub fn repeat(pattern: Pattern) -> Pattern {
    Pattern::Repeat(Box::new(pattern))
}

pub fn guard(pattern: Pattern, predicate: fn(&Arena, NodeId) -> bool) -> Pattern {
    Pattern::Where(Box::new(pattern), Guard(predicate))
}

/// A statement, either bare or as the only statement of a block.
pub fn embedded(statement: Pattern) -> Pattern {
    choice(vec![block_of(vec![statement.clone()]), statement])
}

// Expressions

pub fn ident(name: &str) -> Pattern {
    node(NodePattern::Identifier {
        name: Some(Name::from(name)),
    })
}

pub fn any_ident() -> Pattern {
    node(NodePattern::Identifier { name: None })
}

pub fn member(target: Pattern, name: &str) -> Pattern {
    node(NodePattern::MemberReference {
        target,
        member: Some(Name::from(name)),
    })
}

pub fn any_member(target: Pattern) -> Pattern {
    node(NodePattern::MemberReference {
        target,
        member: None,
    })
}

pub fn invocation(target: Pattern, arguments: Vec<Pattern>) -> Pattern {
    node(NodePattern::Invocation { target, arguments })
}

pub fn call(target: Pattern, method: &str, arguments: Vec<Pattern>) -> Pattern {
    invocation(member(target, method), arguments)
}

pub fn assign(target: Pattern, value: Pattern) -> Pattern {
    assign_op(AssignOp::Assign, target, value)
}

pub fn assign_op(op: AssignOp, target: Pattern, value: Pattern) -> Pattern {
    node(NodePattern::Assignment {
        op: Some(op),
        target,
        value,
    })
}

pub fn binary(op: BinaryOp, left: Pattern, right: Pattern) -> Pattern {
    node(NodePattern::Binary {
        op: Some(op),
        left,
        right,
    })
}

pub fn unary(op: UnaryOp, operand: Pattern) -> Pattern {
    node(NodePattern::Unary {
        op: Some(op),
        operand,
    })
}

pub fn not(operand: Pattern) -> Pattern {
    unary(UnaryOp::Not, operand)
}

pub fn conditional(condition: Pattern, then: Pattern, otherwise: Pattern) -> Pattern {
    node(NodePattern::Conditional {
        condition,
        then,
        otherwise,
    })
}

pub fn cast(ty: Option<TypeRef>, operand: Pattern) -> Pattern {
    node(NodePattern::Cast { ty, operand })
}

pub fn new_object(ty: Option<TypeRef>, arguments: Vec<Pattern>) -> Pattern {
    node(NodePattern::ObjectCreation {
        ty,
        arguments,
        body: absent(),
    })
}

pub fn indexer(target: Pattern, index: Pattern) -> Pattern {
    node(NodePattern::Indexer { target, index })
}

pub fn literal(value: Literal) -> Pattern {
    node(NodePattern::Literal { value: Some(value) })
}

pub fn any_literal() -> Pattern {
    node(NodePattern::Literal { value: None })
}

pub fn int(value: i32) -> Pattern {
    literal(Literal::Int(value))
}

pub fn boolean(value: bool) -> Pattern {
    literal(Literal::Bool(value))
}

pub fn null() -> Pattern {
    literal(Literal::Null)
}

pub fn int_literal() -> Pattern {
    guard(any_literal(), |arena, id| {
        arena[id].as_literal().and_then(Literal::as_int).is_some()
    })
}

pub fn string_literal() -> Pattern {
    guard(any_literal(), |arena, id| {
        arena[id].as_literal().and_then(Literal::as_str).is_some()
    })
}

pub fn this() -> Pattern {
    node(NodePattern::This { qualifier: None })
}

pub fn type_ref(ty: Option<TypeRef>) -> Pattern {
    node(NodePattern::TypeReference { ty })
}

pub fn class_literal(ty: Option<TypeRef>) -> Pattern {
    node(NodePattern::ClassLiteral { ty })
}

pub fn lambda(parameters: Vec<Pattern>, body: Pattern) -> Pattern {
    node(NodePattern::Lambda { parameters, body })
}

// Statements

pub fn expr_stmt(expression: Pattern) -> Pattern {
    node(NodePattern::ExpressionStatement { expression })
}

pub fn block_of(statements: Vec<Pattern>) -> Pattern {
    node(NodePattern::Block { statements })
}

pub fn declaration(ty: Option<TypeRef>, variables: Vec<Pattern>) -> Pattern {
    node(NodePattern::VariableDeclaration {
        ty,
        modifiers: None,
        variables,
    })
}

pub fn variable(name: Option<&str>, initializer: Pattern) -> Pattern {
    node(NodePattern::VariableInitializer {
        name: name.map(Name::from),
        initializer,
    })
}

/// `T name = initializer;` with a single variable.
pub fn declare(initializer: Pattern) -> Pattern {
    declaration(None, vec![variable(None, initializer)])
}

pub fn if_(condition: Pattern, then: Pattern, otherwise: Pattern) -> Pattern {
    node(NodePattern::If {
        condition,
        then,
        otherwise,
    })
}

pub fn while_(condition: Pattern, body: Pattern) -> Pattern {
    node(NodePattern::While { condition, body })
}

pub fn do_while(body: Pattern, condition: Pattern) -> Pattern {
    node(NodePattern::DoWhile { body, condition })
}

pub fn for_(
    initializers: Vec<Pattern>,
    condition: Pattern,
    iterators: Vec<Pattern>,
    body: Pattern,
) -> Pattern {
    node(NodePattern::For {
        initializers,
        condition,
        iterators,
        body,
    })
}

pub fn switch(selector: Pattern, sections: Vec<Pattern>) -> Pattern {
    node(NodePattern::Switch { selector, sections })
}

pub fn section(labels: Vec<Pattern>, statements: Vec<Pattern>) -> Pattern {
    node(NodePattern::SwitchSection { labels, statements })
}

pub fn case(value: Pattern) -> Pattern {
    node(NodePattern::CaseLabel { value })
}

pub fn try_(resources: Vec<Pattern>, body: Pattern, catches: Vec<Pattern>, finally: Pattern) -> Pattern {
    node(NodePattern::Try {
        resources,
        body,
        catches,
        finally,
    })
}

pub fn catch(types: Option<Vec<TypeRef>>, name: Option<&str>, body: Pattern) -> Pattern {
    node(NodePattern::Catch {
        types,
        name: name.map(Name::from),
        body,
    })
}

pub fn ret(value: Pattern) -> Pattern {
    node(NodePattern::Return { value })
}

pub fn throw(exception: Pattern) -> Pattern {
    node(NodePattern::Throw { exception })
}

pub fn break_(label: Option<&str>) -> Pattern {
    node(NodePattern::Break {
        label: Some(label.map(Name::from)),
    })
}

pub fn continue_(label: Option<&str>) -> Pattern {
    node(NodePattern::Continue {
        label: Some(label.map(Name::from)),
    })
}

pub fn empty() -> Pattern {
    node(NodePattern::Empty)
}

pub fn synchronized(lock: Pattern, body: Pattern) -> Pattern {
    node(NodePattern::Synchronized { lock, body })
}

// Declarations

pub fn field(modifiers: Option<Modifiers>, initializer: Pattern) -> Pattern {
    node(NodePattern::Field {
        name: None,
        ty: None,
        modifiers,
        initializer,
    })
}
