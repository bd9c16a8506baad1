//! Declarative tree patterns.
//!
//! A pattern is either a combinator or a node pattern. Node patterns are the ordinary node enum
//! instantiated with the [`Pat`] shape: child positions hold sub-patterns and scalar fields hold
//! `Option`s, where `None` accepts any value. Matching never mutates the tree.

pub mod build;

use crate::ast::{Arena, Node, NodeId, NodeKind, Shape};
use core::fmt::{self, Debug};
use core::ops::Index;
use rustc_hash::FxHashMap;

#[derive(Debug)]
pub struct Pat;

impl Shape for Pat {
    type Child = Pattern;
    type OptChild = Pattern;
    type Children = Vec<Pattern>;
    type Value<T: Debug + Clone + PartialEq> = Option<T>;
}

pub type NodePattern = NodeKind<Pat>;

/// A predicate over a live node, for conditions node shapes cannot express.
#[derive(Clone, Copy)]
pub struct Guard(pub fn(&Arena, NodeId) -> bool);

impl PartialEq for Guard {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::fn_addr_eq(self.0, other.0)
    }
}

impl Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guard(..)")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    /// Any present node.
    Any,
    /// Only an absent optional child.
    Absent,
    /// Matches the inner pattern and records the node under the name.
    Named(&'static str, Box<Pattern>),
    /// A node structurally equal to the last node recorded under the name.
    BackRef(&'static str),
    /// The first alternative that matches; bindings of failed alternatives are discarded.
    Choice(Vec<Pattern>),
    /// The inner pattern, or nothing.
    Optional(Box<Pattern>),
    /// Inside a list: as many consecutive elements matching the inner pattern as possible.
    Repeat(Box<Pattern>),
    Node(Box<NodePattern>),
    Where(Box<Pattern>, Guard),
}

/// The nodes bound by a successful match, by capture name in binding order.
#[derive(Debug, Default)]
pub struct Match {
    bindings: FxHashMap<&'static str, Vec<NodeId>>,
}

impl Match {
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.bindings.get(name)?.first().copied()
    }

    pub fn all(&self, name: &str) -> &[NodeId] {
        self.bindings.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

impl Index<&str> for Match {
    type Output = NodeId;

    fn index(&self, name: &str) -> &NodeId {
        self.bindings
            .get(name)
            .and_then(|nodes| nodes.first())
            .unwrap_or_else(|| panic!("pattern has no capture named {name}"))
    }
}

impl Pattern {
    pub fn match_node(&self, arena: &Arena, id: NodeId) -> Option<Match> {
        let mut matcher = Matcher {
            arena,
            log: Vec::new(),
        };
        matcher.pattern(self, id).then(|| matcher.finish())
    }

    /// Matches a sequence of sibling nodes against a list of patterns, as if they were the children
    /// of one list slot.
    pub fn match_sequence(patterns: &[Pattern], arena: &Arena, ids: &[NodeId]) -> Option<Match> {
        let mut matcher = Matcher {
            arena,
            log: Vec::new(),
        };
        matcher.list(patterns, ids).then(|| matcher.finish())
    }

    /// The fewest list elements this pattern consumes.
    fn min_len(&self) -> usize {
        match self {
            Self::Optional(_) | Self::Repeat(_) | Self::Absent => 0,
            Self::Named(_, inner) | Self::Where(inner, _) => inner.min_len(),
            Self::Choice(alternatives) => alternatives
                .iter()
                .map(Self::min_len)
                .min()
                .unwrap_or(1),
            _ => 1,
        }
    }
}

struct Matcher<'a> {
    arena: &'a Arena,
    // An undo log of bindings: rolling back a failed alternative is a truncation.
    log: Vec<(&'static str, NodeId)>,
}

fn value<T: PartialEq>(pattern: &Option<T>, value: &T) -> bool {
    pattern.as_ref().is_none_or(|pattern| pattern == value)
}

impl Matcher<'_> {
    fn finish(self) -> Match {
        let mut bindings: FxHashMap<&'static str, Vec<NodeId>> = FxHashMap::default();
        for (name, id) in self.log {
            bindings.entry(name).or_default().push(id);
        }
        Match { bindings }
    }

    fn attempt(&mut self, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let checkpoint = self.log.len();
        let matched = f(self);
        if !matched {
            self.log.truncate(checkpoint);
        }
        matched
    }

    fn pattern(&mut self, pattern: &Pattern, id: NodeId) -> bool {
        if self.arena[id].is_hole() {
            return false;
        }
        match pattern {
            Pattern::Any => true,
            Pattern::Absent => false,
            Pattern::Named(name, inner) => {
                let matched = self.pattern(inner, id);
                if matched {
                    self.log.push((*name, id));
                }
                matched
            }
            Pattern::BackRef(name) => self
                .log
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .is_some_and(|(_, bound)| self.arena.same_structure(*bound, id)),
            Pattern::Choice(alternatives) => alternatives
                .iter()
                .any(|alternative| self.attempt(|this| this.pattern(alternative, id))),
            Pattern::Optional(inner) | Pattern::Repeat(inner) => self.pattern(inner, id),
            Pattern::Node(node) => self.attempt(|this| this.node(node, id)),
            Pattern::Where(inner, guard) => (guard.0)(self.arena, id) && self.pattern(inner, id),
        }
    }

    fn optional(&mut self, pattern: &Pattern, id: Option<NodeId>) -> bool {
        match id {
            Some(id) => self.pattern(pattern, id),
            None => accepts_absent(pattern),
        }
    }

    fn list(&mut self, patterns: &[Pattern], ids: &[NodeId]) -> bool {
        self.attempt(|this| {
            let mut position = 0;
            for (i, pattern) in patterns.iter().enumerate() {
                let reserved: usize = patterns[i + 1..].iter().map(Pattern::min_len).sum();
                match pattern {
                    Pattern::Repeat(inner) => {
                        while position + reserved < ids.len()
                            && this.attempt(|this| this.pattern(inner, ids[position]))
                        {
                            position += 1;
                        }
                    }
                    Pattern::Optional(inner) => {
                        if position + reserved < ids.len()
                            && this.attempt(|this| this.pattern(inner, ids[position]))
                        {
                            position += 1;
                        }
                    }
                    _ => {
                        if position >= ids.len() || !this.pattern(pattern, ids[position]) {
                            return false;
                        }
                        position += 1;
                    }
                }
            }
            position == ids.len()
        })
    }

    fn node(&mut self, pattern: &NodePattern, id: NodeId) -> bool {
        use NodeKind as P;
        let arena = self.arena;
        match (pattern, &arena[id]) {
            (
                P::CompilationUnit {
                    package: p_package,
                    imports: p_imports,
                    types: p_types,
                },
                Node::CompilationUnit {
                    package,
                    imports,
                    types,
                },
            ) => {
                value(p_package, package)
                    && self.list(p_imports, imports)
                    && self.list(p_types, types)
            }
            (
                P::Import {
                    name: p_name,
                    is_static: p_static,
                },
                Node::Import { name, is_static },
            ) => value(p_name, name) && value(p_static, is_static),
            (
                P::TypeDeclaration {
                    name: p_name,
                    kind: p_kind,
                    modifiers: p_modifiers,
                    members: p_members,
                },
                Node::TypeDeclaration {
                    name,
                    kind,
                    modifiers,
                    members,
                },
            ) => {
                value(p_name, name)
                    && value(p_kind, kind)
                    && value(p_modifiers, modifiers)
                    && self.list(p_members, members)
            }
            (
                P::Field {
                    name: p_name,
                    ty: p_ty,
                    modifiers: p_modifiers,
                    initializer: p_initializer,
                },
                Node::Field {
                    name,
                    ty,
                    modifiers,
                    initializer,
                },
            ) => {
                value(p_name, name)
                    && value(p_ty, ty)
                    && value(p_modifiers, modifiers)
                    && self.optional(p_initializer, *initializer)
            }
            (
                P::Method {
                    name: p_name,
                    kind: p_kind,
                    return_type: p_return_type,
                    modifiers: p_modifiers,
                    parameters: p_parameters,
                    body: p_body,
                },
                Node::Method {
                    name,
                    kind,
                    return_type,
                    modifiers,
                    parameters,
                    body,
                },
            ) => {
                value(p_name, name)
                    && value(p_kind, kind)
                    && value(p_return_type, return_type)
                    && value(p_modifiers, modifiers)
                    && self.list(p_parameters, parameters)
                    && self.optional(p_body, *body)
            }
            (
                P::Initializer {
                    modifiers: p_modifiers,
                    body: p_body,
                },
                Node::Initializer { modifiers, body },
            ) => value(p_modifiers, modifiers) && self.pattern(p_body, *body),
            (
                P::EnumValue {
                    name: p_name,
                    arguments: p_arguments,
                    body: p_body,
                },
                Node::EnumValue {
                    name,
                    arguments,
                    body,
                },
            ) => {
                value(p_name, name)
                    && self.list(p_arguments, arguments)
                    && self.optional(p_body, *body)
            }
            (
                P::Parameter {
                    name: p_name,
                    ty: p_ty,
                    modifiers: p_modifiers,
                },
                Node::Parameter {
                    name,
                    ty,
                    modifiers,
                },
            ) => value(p_name, name) && value(p_ty, ty) && value(p_modifiers, modifiers),
            (
                P::Block {
                    statements: p_statements,
                },
                Node::Block { statements },
            ) => self.list(p_statements, statements),
            (
                P::ExpressionStatement {
                    expression: p_expression,
                },
                Node::ExpressionStatement { expression },
            ) => self.pattern(p_expression, *expression),
            (
                P::VariableDeclaration {
                    ty: p_ty,
                    modifiers: p_modifiers,
                    variables: p_variables,
                },
                Node::VariableDeclaration {
                    ty,
                    modifiers,
                    variables,
                },
            ) => {
                value(p_ty, ty)
                    && value(p_modifiers, modifiers)
                    && self.list(p_variables, variables)
            }
            (
                P::VariableInitializer {
                    name: p_name,
                    initializer: p_initializer,
                },
                Node::VariableInitializer { name, initializer },
            ) => value(p_name, name) && self.optional(p_initializer, *initializer),
            (
                P::LocalTypeDeclaration {
                    declaration: p_declaration,
                },
                Node::LocalTypeDeclaration { declaration },
            ) => self.pattern(p_declaration, *declaration),
            (
                P::If {
                    condition: p_condition,
                    then: p_then,
                    otherwise: p_otherwise,
                },
                Node::If {
                    condition,
                    then,
                    otherwise,
                },
            ) => {
                self.pattern(p_condition, *condition)
                    && self.pattern(p_then, *then)
                    && self.optional(p_otherwise, *otherwise)
            }
            (
                P::While {
                    condition: p_condition,
                    body: p_body,
                },
                Node::While { condition, body },
            ) => self.pattern(p_condition, *condition) && self.pattern(p_body, *body),
            (
                P::DoWhile {
                    body: p_body,
                    condition: p_condition,
                },
                Node::DoWhile { body, condition },
            ) => self.pattern(p_body, *body) && self.pattern(p_condition, *condition),
            (
                P::For {
                    initializers: p_initializers,
                    condition: p_condition,
                    iterators: p_iterators,
                    body: p_body,
                },
                Node::For {
                    initializers,
                    condition,
                    iterators,
                    body,
                },
            ) => {
                self.list(p_initializers, initializers)
                    && self.optional(p_condition, *condition)
                    && self.list(p_iterators, iterators)
                    && self.pattern(p_body, *body)
            }
            (
                P::ForEach {
                    variable: p_variable,
                    iterable: p_iterable,
                    body: p_body,
                },
                Node::ForEach {
                    variable,
                    iterable,
                    body,
                },
            ) => {
                self.pattern(p_variable, *variable)
                    && self.pattern(p_iterable, *iterable)
                    && self.pattern(p_body, *body)
            }
            (
                P::Switch {
                    selector: p_selector,
                    sections: p_sections,
                },
                Node::Switch { selector, sections },
            ) => self.pattern(p_selector, *selector) && self.list(p_sections, sections),
            (
                P::SwitchSection {
                    labels: p_labels,
                    statements: p_statements,
                },
                Node::SwitchSection { labels, statements },
            ) => self.list(p_labels, labels) && self.list(p_statements, statements),
            (P::CaseLabel { value: p_value }, Node::CaseLabel { value }) => {
                self.optional(p_value, *value)
            }
            (
                P::Try {
                    resources: p_resources,
                    body: p_body,
                    catches: p_catches,
                    finally: p_finally,
                },
                Node::Try {
                    resources,
                    body,
                    catches,
                    finally,
                },
            ) => {
                self.list(p_resources, resources)
                    && self.pattern(p_body, *body)
                    && self.list(p_catches, catches)
                    && self.optional(p_finally, *finally)
            }
            (
                P::Catch {
                    types: p_types,
                    name: p_name,
                    body: p_body,
                },
                Node::Catch { types, name, body },
            ) => value(p_types, types) && value(p_name, name) && self.pattern(p_body, *body),
            (
                P::Labeled {
                    label: p_label,
                    statement: p_statement,
                },
                Node::Labeled { label, statement },
            ) => value(p_label, label) && self.pattern(p_statement, *statement),
            (P::Label { label: p_label }, Node::Label { label })
            | (P::Goto { label: p_label }, Node::Goto { label }) => value(p_label, label),
            (P::Break { label: p_label }, Node::Break { label })
            | (P::Continue { label: p_label }, Node::Continue { label }) => value(p_label, label),
            (P::Return { value: p_value }, Node::Return { value }) => {
                self.optional(p_value, *value)
            }
            (
                P::Throw {
                    exception: p_exception,
                },
                Node::Throw { exception },
            ) => self.pattern(p_exception, *exception),
            (
                P::Assert {
                    condition: p_condition,
                    message: p_message,
                },
                Node::Assert { condition, message },
            ) => self.pattern(p_condition, *condition) && self.optional(p_message, *message),
            (
                P::Synchronized {
                    lock: p_lock,
                    body: p_body,
                },
                Node::Synchronized { lock, body },
            ) => self.pattern(p_lock, *lock) && self.pattern(p_body, *body),
            (P::Empty, Node::Empty) | (P::Super, Node::Super) | (P::Hole, Node::Hole) => true,
            (P::Identifier { name: p_name }, Node::Identifier { name }) => value(p_name, name),
            (
                P::MemberReference {
                    target: p_target,
                    member: p_member,
                },
                Node::MemberReference { target, member },
            ) => value(p_member, member) && self.pattern(p_target, *target),
            (
                P::Invocation {
                    target: p_target,
                    arguments: p_arguments,
                },
                Node::Invocation { target, arguments },
            ) => self.pattern(p_target, *target) && self.list(p_arguments, arguments),
            (
                P::MethodReference {
                    target: p_target,
                    member: p_member,
                    captured: p_captured,
                },
                Node::MethodReference {
                    target,
                    member,
                    captured,
                },
            ) => {
                value(p_member, member)
                    && self.pattern(p_target, *target)
                    && self.list(p_captured, captured)
            }
            (
                P::Assignment {
                    op: p_op,
                    target: p_target,
                    value: p_value,
                },
                Node::Assignment {
                    op,
                    target,
                    value: assigned,
                },
            ) => {
                value(p_op, op)
                    && self.pattern(p_target, *target)
                    && self.pattern(p_value, *assigned)
            }
            (
                P::Binary {
                    op: p_op,
                    left: p_left,
                    right: p_right,
                },
                Node::Binary { op, left, right },
            ) => value(p_op, op) && self.pattern(p_left, *left) && self.pattern(p_right, *right),
            (
                P::Unary {
                    op: p_op,
                    operand: p_operand,
                },
                Node::Unary { op, operand },
            ) => value(p_op, op) && self.pattern(p_operand, *operand),
            (
                P::Conditional {
                    condition: p_condition,
                    then: p_then,
                    otherwise: p_otherwise,
                },
                Node::Conditional {
                    condition,
                    then,
                    otherwise,
                },
            ) => {
                self.pattern(p_condition, *condition)
                    && self.pattern(p_then, *then)
                    && self.pattern(p_otherwise, *otherwise)
            }
            (
                P::Cast {
                    ty: p_ty,
                    operand: p_operand,
                },
                Node::Cast { ty, operand },
            )
            | (
                P::InstanceOf {
                    operand: p_operand,
                    ty: p_ty,
                },
                Node::InstanceOf { operand, ty },
            ) => value(p_ty, ty) && self.pattern(p_operand, *operand),
            (
                P::ObjectCreation {
                    ty: p_ty,
                    arguments: p_arguments,
                    body: p_body,
                },
                Node::ObjectCreation {
                    ty,
                    arguments,
                    body,
                },
            ) => {
                value(p_ty, ty)
                    && self.list(p_arguments, arguments)
                    && self.optional(p_body, *body)
            }
            (
                P::ArrayCreation {
                    ty: p_ty,
                    dimensions: p_dimensions,
                    initializer: p_initializer,
                },
                Node::ArrayCreation {
                    ty,
                    dimensions,
                    initializer,
                },
            ) => {
                value(p_ty, ty)
                    && self.list(p_dimensions, dimensions)
                    && self.optional(p_initializer, *initializer)
            }
            (
                P::ArrayInitializer {
                    elements: p_elements,
                },
                Node::ArrayInitializer { elements },
            ) => self.list(p_elements, elements),
            (
                P::Indexer {
                    target: p_target,
                    index: p_index,
                },
                Node::Indexer { target, index },
            ) => self.pattern(p_target, *target) && self.pattern(p_index, *index),
            (
                P::Lambda {
                    parameters: p_parameters,
                    body: p_body,
                },
                Node::Lambda { parameters, body },
            ) => self.list(p_parameters, parameters) && self.pattern(p_body, *body),
            (P::Literal { value: p_value }, Node::Literal { value: literal }) => {
                value(p_value, literal)
            }
            (P::This { qualifier: p_qualifier }, Node::This { qualifier }) => {
                value(p_qualifier, qualifier)
            }
            (P::TypeReference { ty: p_ty }, Node::TypeReference { ty })
            | (P::ClassLiteral { ty: p_ty }, Node::ClassLiteral { ty }) => value(p_ty, ty),
            _ => false,
        }
    }
}

/// Whether the pattern accepts a missing optional child.
fn accepts_absent(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Absent | Pattern::Optional(_) | Pattern::Repeat(_) => true,
        Pattern::Named(_, inner) => accepts_absent(inner),
        Pattern::Choice(alternatives) => alternatives.iter().any(accepts_absent),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::build::any;
    use super::*;
    use crate::ast::{BinaryOp, TypeRef};
    use proptest::prelude::*;

    fn sum(arena: &mut Arena, a: &str, b: &str) -> NodeId {
        let a = arena.ident(a);
        let b = arena.ident(b);
        arena.binary(BinaryOp::Add, a, b)
    }

    #[test]
    fn named_and_backref() {
        let mut arena = Arena::new();
        let same = sum(&mut arena, "x", "x");
        let different = sum(&mut arena, "x", "y");
        let pattern = binary(BinaryOp::Add, capture("left"), backref("left"));
        let found = pattern.match_node(&arena, same).unwrap();
        assert_eq!(arena.debug(&found["left"]).to_string(), "x");
        assert!(pattern.match_node(&arena, different).is_none());
    }

    #[test]
    fn choice_rolls_back_bindings() {
        let mut arena = Arena::new();
        let node = sum(&mut arena, "a", "b");
        let pattern = choice(vec![
            binary(BinaryOp::Add, capture("first"), ident("nope")),
            binary(BinaryOp::Add, any(), capture("second")),
        ]);
        let found = pattern.match_node(&arena, node).unwrap();
        assert!(!found.has("first"));
        assert_eq!(arena.debug(&found["second"]).to_string(), "b");
    }

    #[test]
    fn optional_and_absent_children() {
        let mut arena = Arena::new();
        let value = arena.int(1);
        let with_value = arena.ret(Some(value));
        let without = arena.ret(None);
        assert!(ret(any()).match_node(&arena, without).is_none());
        assert!(ret(any()).match_node(&arena, with_value).is_some());
        assert!(ret(optional(any())).match_node(&arena, without).is_some());
        assert!(ret(absent()).match_node(&arena, without).is_some());
        assert!(ret(absent()).match_node(&arena, with_value).is_none());
    }

    #[test]
    fn repeat_leaves_room_for_suffix() {
        let mut arena = Arena::new();
        let statements: Vec<NodeId> = (0..4)
            .map(|i| {
                let value = arena.int(i);
                arena.expr_stmt(value)
            })
            .collect();
        let condition = arena.ident("done");
        let exit = arena.break_(None);
        let exit = arena.block(vec![exit]);
        let check = arena.if_(condition, exit, None);
        let mut all = statements.clone();
        all.push(check);
        let block = arena.block(all);

        let pattern = block_of(vec![
            repeat(named("statement", any())),
            if_(capture("condition"), embedded(break_(None)), absent()),
        ]);
        let found = pattern.match_node(&arena, block).unwrap();
        assert_eq!(found.all("statement"), statements.as_slice());
        assert_eq!(found["condition"], condition);
    }

    #[test]
    fn guards_see_metadata() {
        let mut arena = Arena::new();
        let typed = arena.local("s", TypeRef::string());
        let untyped = arena.ident("s");
        let pattern = guard(any(), |arena, id| {
            arena.meta(id).ty.as_ref().is_some_and(TypeRef::is_string)
        });
        assert!(pattern.match_node(&arena, typed).is_some());
        assert!(pattern.match_node(&arena, untyped).is_none());
    }

    proptest! {
        // `Any` matches every present node, `Named(Any)` binds exactly it.
        #[test]
        fn any_binds_the_candidate(names in proptest::collection::vec("[a-z]{1,3}", 1..6)) {
            let mut arena = Arena::new();
            let ids: Vec<NodeId> = names.iter().map(|name| arena.ident(name)).collect();
            for id in &ids {
                let found = capture("x").match_node(&arena, *id).unwrap();
                prop_assert_eq!(found.all("x"), &[*id][..]);
            }
        }

        // A list of repeats followed by n fixed elements binds len - n elements to the repeat.
        #[test]
        fn repeat_split(len in 0usize..8, fixed in 0usize..3) {
            prop_assume!(fixed <= len);
            let mut arena = Arena::new();
            let ids: Vec<NodeId> = (0..len).map(|i| arena.ident(&format!("v{i}"))).collect();
            let mut patterns = vec![repeat(named("head", any()))];
            patterns.extend((0..fixed).map(|_| named("tail", any())));
            let found = Pattern::match_sequence(&patterns, &arena, &ids).unwrap();
            prop_assert_eq!(found.all("head").len(), len - fixed);
            prop_assert_eq!(found.all("tail").len(), fixed);
        }

        // Backreferences agree with structural equality.
        #[test]
        fn backref_is_structural(a in "[a-c]", b in "[a-c]") {
            let mut arena = Arena::new();
            let node = sum(&mut arena, &a, &b);
            let pattern = binary(BinaryOp::Add, capture("x"), backref("x"));
            prop_assert_eq!(pattern.match_node(&arena, node).is_some(), a == b);
        }
    }
}
