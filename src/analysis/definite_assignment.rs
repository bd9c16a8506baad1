use crate::ast::{Arena, AssignOp, BinaryOp, Literal, Name, Node, NodeId};
use rustc_hash::FxHashMap;

/// What is known about a local at some program point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentStatus {
    /// The point cannot be reached; neutral for joins.
    Unreachable,
    DefinitelyNotAssigned,
    PotentiallyAssigned,
    DefinitelyAssigned,
}

impl AssignmentStatus {
    /// The status at a point reached by two paths.
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unreachable, status) | (status, Self::Unreachable) => status,
            (a, b) if a == b => a,
            _ => Self::PotentiallyAssigned,
        }
    }

    fn is_reachable(self) -> bool {
        self != Self::Unreachable
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Loop,
    Switch,
    Labeled,
}

// A statement `break` and `continue` can target. Statuses of the jumps are joined at the frame.
struct Frame {
    kind: FrameKind,
    label: Option<Name>,
    breaks: AssignmentStatus,
    continues: AssignmentStatus,
}

/// Forward definite-assignment analysis of one local over a range of sibling statements.
///
/// The analysis is structural: conditionals join their branches, loop bodies are analyzed twice (the
/// second time with the back edge joined in), `break` and `continue` are joined at their targets,
/// catch clauses assume the try body may have stopped at any point, and switch sections join the
/// selector with fall-through from the previous section.
pub struct DefiniteAssignment<'a> {
    arena: &'a Arena,
    start: NodeId,
    end: NodeId,
    variable: Name,
    before: FxHashMap<NodeId, AssignmentStatus>,
    after: FxHashMap<NodeId, AssignmentStatus>,
    unassigned_uses: Vec<NodeId>,
    potentially_assigned: bool,
    end_status: AssignmentStatus,
    frames: Vec<Frame>,
}

impl<'a> DefiniteAssignment<'a> {
    /// Prepares an analysis of the statement `root`, usually a method body.
    pub fn new(arena: &'a Arena, root: NodeId) -> Self {
        Self {
            arena,
            start: root,
            end: root,
            variable: Name::from(""),
            before: FxHashMap::default(),
            after: FxHashMap::default(),
            unassigned_uses: Vec::new(),
            potentially_assigned: false,
            end_status: AssignmentStatus::Unreachable,
            frames: Vec::new(),
        }
    }

    /// Restricts the analysis to the siblings from `start` through `end`. If `end` is not a later
    /// sibling of `start` (typically it is the enclosing block), the range extends to the last
    /// statement of the list containing `start`.
    pub fn set_analyzed_range(&mut self, start: NodeId, end: NodeId) {
        self.start = start;
        self.end = end;
    }

    fn range(&self) -> Vec<NodeId> {
        let Some(siblings) = self.arena.siblings(self.start) else {
            return vec![self.start];
        };
        let Some(first) = siblings.iter().position(|sibling| *sibling == self.start) else {
            return vec![self.start];
        };
        let rest = &siblings[first..];
        match rest.iter().position(|sibling| *sibling == self.end) {
            Some(last) => rest[..=last].to_vec(),
            None => rest.to_vec(),
        }
    }

    /// Runs the analysis for the local `variable`, whose status when entering the range is
    /// `initial`. Results of previous runs are discarded.
    pub fn analyze(&mut self, variable: &str, initial: AssignmentStatus) {
        self.variable = Name::from(variable);
        self.before.clear();
        self.after.clear();
        self.unassigned_uses.clear();
        self.potentially_assigned = false;
        self.frames.clear();

        let mut status = initial;
        for statement in self.range() {
            status = self.statement(statement, status);
        }
        self.end_status = status;
    }

    /// The status on entry to a statement of the range. Statements the analysis never reached report
    /// `Unreachable`.
    pub fn status_before(&self, statement: NodeId) -> AssignmentStatus {
        self.before
            .get(&statement)
            .copied()
            .unwrap_or(AssignmentStatus::Unreachable)
    }

    pub fn status_after(&self, statement: NodeId) -> AssignmentStatus {
        self.after
            .get(&statement)
            .copied()
            .unwrap_or(AssignmentStatus::Unreachable)
    }

    /// The status after the last statement of the range.
    pub fn status_at_end(&self) -> AssignmentStatus {
        self.end_status
    }

    /// Reads of the variable reached while it was not definitely assigned, in discovery order.
    pub fn unassigned_uses(&self) -> &[NodeId] {
        &self.unassigned_uses
    }

    /// Whether some assignment to the variable is reachable inside the range.
    pub fn is_potentially_assigned(&self) -> bool {
        self.potentially_assigned
    }

    fn is_variable(&self, id: NodeId) -> bool {
        self.arena[id]
            .as_identifier()
            .is_some_and(|name| *name == self.variable)
    }

    fn read(&mut self, id: NodeId, status: AssignmentStatus) {
        if status.is_reachable()
            && status != AssignmentStatus::DefinitelyAssigned
            && !self.unassigned_uses.contains(&id)
        {
            self.unassigned_uses.push(id);
        }
    }

    fn assigned(&mut self, status: AssignmentStatus) -> AssignmentStatus {
        if status.is_reachable() {
            self.potentially_assigned = true;
            AssignmentStatus::DefinitelyAssigned
        } else {
            status
        }
    }

    // Code that runs at some unknown later time: reads count at the point of definition, writes are
    // invisible here.
    fn deferred(&mut self, id: NodeId, status: AssignmentStatus) {
        let uses: Vec<NodeId> = self
            .arena
            .descendants(id)
            .into_iter()
            .filter(|node| self.is_variable(*node))
            .collect();
        for node in uses {
            self.read(node, status);
        }
    }

    fn node(&mut self, id: NodeId, status: AssignmentStatus) -> AssignmentStatus {
        if self.arena[id].is_expression() {
            self.expression(id, status)
        } else {
            self.statement(id, status)
        }
    }

    fn statements(&mut self, statements: &[NodeId], status: AssignmentStatus) -> AssignmentStatus {
        statements
            .iter()
            .fold(status, |status, statement| self.statement(*statement, status))
    }

    fn statement(&mut self, id: NodeId, status: AssignmentStatus) -> AssignmentStatus {
        self.before.insert(id, status);
        let after = self.statement_inner(id, status);
        self.after.insert(id, after);
        after
    }

    fn statement_inner(&mut self, id: NodeId, status: AssignmentStatus) -> AssignmentStatus {
        use AssignmentStatus::Unreachable;

        match self.arena[id].clone() {
            Node::Block { statements } => self.statements(&statements, status),
            Node::ExpressionStatement { expression } => self.expression(expression, status),
            Node::VariableDeclaration { variables, .. } => {
                self.statements(&variables, status)
            }
            Node::VariableInitializer { name, initializer } => {
                let Some(initializer) = initializer else {
                    return status;
                };
                let status = self.expression(initializer, status);
                if name == self.variable {
                    self.assigned(status)
                } else {
                    status
                }
            }
            Node::LocalTypeDeclaration { declaration } => {
                self.deferred(declaration, status);
                status
            }
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                let status = self.expression(condition, status);
                let then = self.statement(then, status);
                let otherwise = match otherwise {
                    Some(otherwise) => self.statement(otherwise, status),
                    None => status,
                };
                then.join(otherwise)
            }
            Node::While { condition, body } => {
                let exits = !self.is_constant_true(Some(condition));
                self.run_loop(id, status, |this, entry| {
                    let after_condition = this.expression(condition, entry);
                    let after_body = this.statement(body, after_condition);
                    (after_body, if exits { after_condition } else { Unreachable }, None)
                })
            }
            Node::DoWhile { body, condition } => {
                let exits = !self.is_constant_true(Some(condition));
                self.run_loop(id, status, |this, entry| {
                    let after_body = this.statement(body, entry);
                    (after_body, Unreachable, Some((condition, exits)))
                })
            }
            Node::For {
                initializers,
                condition,
                body,
                ..
            } => {
                let status = initializers
                    .iter()
                    .fold(status, |status, initializer| self.node(*initializer, status));
                let exits = !self.is_constant_true(condition);
                self.run_loop(id, status, |this, entry| {
                    let after_condition = match condition {
                        Some(condition) => this.expression(condition, entry),
                        None => entry,
                    };
                    let after_body = this.statement(body, after_condition);
                    let exit = if exits { after_condition } else { Unreachable };
                    (after_body, exit, None)
                })
            }
            Node::ForEach {
                variable,
                iterable,
                body,
            } => {
                let status = self.expression(iterable, status);
                let shadows = self.arena.declares_variable(variable, &self.variable);
                if shadows {
                    return status;
                }
                self.run_loop(id, status, |this, entry| {
                    let after_body = this.statement(body, entry);
                    (after_body, entry, None)
                })
            }
            Node::Switch { selector, sections } => {
                let status = self.expression(selector, status);
                self.frames.push(Frame {
                    kind: FrameKind::Switch,
                    label: None,
                    breaks: Unreachable,
                    continues: Unreachable,
                });
                let mut has_default = false;
                let mut fall_through = Unreachable;
                for section in &sections {
                    let Node::SwitchSection { labels, statements } = self.arena[*section].clone()
                    else {
                        continue;
                    };
                    has_default |= labels.iter().any(|label| {
                        matches!(self.arena[*label], Node::CaseLabel { value: None })
                    });
                    let entry = status.join(fall_through);
                    self.before.insert(*section, entry);
                    fall_through = self.statements(&statements, entry);
                    self.after.insert(*section, fall_through);
                }
                let frame = self.frames.pop().expect("switch frame");
                let mut after = fall_through.join(frame.breaks);
                if !has_default {
                    after = after.join(status);
                }
                after
            }
            Node::Try {
                resources,
                body,
                catches,
                finally,
            } => {
                let entry = status;
                let status = self.statements(&resources, status);
                let after_body = self.statement(body, status);
                let catch_entry = if entry == AssignmentStatus::DefinitelyAssigned {
                    entry
                } else if self.arena.assigns_variable(body, &self.variable)
                    || resources
                        .iter()
                        .any(|resource| self.arena.assigns_variable(*resource, &self.variable))
                {
                    entry.join(AssignmentStatus::PotentiallyAssigned)
                } else {
                    entry
                };
                let mut normal = after_body;
                for catch in &catches {
                    let shadows = matches!(&self.arena[*catch], Node::Catch { name, .. } if *name == self.variable);
                    let after_catch = if shadows {
                        catch_entry
                    } else {
                        self.statement(*catch, catch_entry)
                    };
                    normal = normal.join(after_catch);
                }
                match finally {
                    Some(finally) => {
                        let after = self.statement(finally, normal);
                        // Reads in the finally block also run after abrupt completion of the body.
                        self.statement(finally, normal.join(catch_entry));
                        after
                    }
                    None => normal,
                }
            }
            Node::Catch { body, .. } => self.statement(body, status),
            Node::Labeled { label, statement } => {
                self.frames.push(Frame {
                    kind: FrameKind::Labeled,
                    label: Some(label),
                    breaks: Unreachable,
                    continues: Unreachable,
                });
                let after = self.statement(statement, status);
                let frame = self.frames.pop().expect("labeled frame");
                after.join(frame.breaks)
            }
            Node::Break { label } => {
                if let Some(frame) = self.break_target(label.as_ref()) {
                    frame.breaks = frame.breaks.join(status);
                }
                Unreachable
            }
            Node::Continue { label } => {
                if let Some(frame) = self.continue_target(label.as_ref()) {
                    frame.continues = frame.continues.join(status);
                }
                Unreachable
            }
            Node::Return { value } => {
                if let Some(value) = value {
                    self.expression(value, status);
                }
                Unreachable
            }
            Node::Throw { exception } => {
                self.expression(exception, status);
                Unreachable
            }
            Node::Goto { .. } => Unreachable,
            Node::Assert { condition, message } => {
                let after_condition = self.expression(condition, status);
                if let Some(message) = message {
                    self.expression(message, after_condition);
                }
                // Assertions may be disabled.
                status.join(after_condition)
            }
            Node::Synchronized { lock, body } => {
                let status = self.expression(lock, status);
                self.statement(body, status)
            }
            node if node.is_expression() => self.expression(id, status),
            _ => status,
        }
    }

    // Runs a loop twice: once from the entry status, once with the back edge joined in. `iteration`
    // returns the status at the end of the body, the status on the natural exit edge, and for
    // do-while loops the trailing condition with whether it can be false.
    fn run_loop(
        &mut self,
        id: NodeId,
        entry: AssignmentStatus,
        mut iteration: impl FnMut(
            &mut Self,
            AssignmentStatus,
        ) -> (AssignmentStatus, AssignmentStatus, Option<(NodeId, bool)>),
    ) -> AssignmentStatus {
        let label = self.arena.parent(id).and_then(|parent| match &self.arena[parent] {
            Node::Labeled { label, .. } => Some(label.clone()),
            _ => None,
        });
        let iterators = match &self.arena[id] {
            Node::For { iterators, .. } => iterators.clone(),
            _ => Vec::new(),
        };

        let mut back_edge = AssignmentStatus::Unreachable;
        let mut exit = AssignmentStatus::Unreachable;
        let mut breaks = AssignmentStatus::Unreachable;
        for _ in 0..2 {
            self.frames.push(Frame {
                kind: FrameKind::Loop,
                label: label.clone(),
                breaks: AssignmentStatus::Unreachable,
                continues: AssignmentStatus::Unreachable,
            });
            let (after_body, natural_exit, trailing) = iteration(self, entry.join(back_edge));
            let frame = self.frames.pop().expect("loop frame");
            let mut end = after_body.join(frame.continues);
            exit = natural_exit;
            if let Some((condition, can_exit)) = trailing {
                end = self.expression(condition, end);
                if can_exit {
                    exit = end;
                }
            }
            for iterator in &iterators {
                end = self.node(*iterator, end);
            }
            back_edge = end;
            breaks = frame.breaks;
        }
        exit.join(breaks)
    }

    fn break_target(&mut self, label: Option<&Name>) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().find(|frame| match label {
            Some(label) => frame.kind == FrameKind::Labeled && frame.label.as_ref() == Some(label),
            None => matches!(frame.kind, FrameKind::Loop | FrameKind::Switch),
        })
    }

    fn continue_target(&mut self, label: Option<&Name>) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().find(|frame| {
            frame.kind == FrameKind::Loop
                && label.is_none_or(|label| frame.label.as_ref() == Some(label))
        })
    }

    fn is_constant_true(&self, condition: Option<NodeId>) -> bool {
        condition.is_none_or(|condition| {
            matches!(
                self.arena[condition],
                Node::Literal {
                    value: Literal::Bool(true)
                }
            )
        })
    }

    fn expression(&mut self, id: NodeId, status: AssignmentStatus) -> AssignmentStatus {
        match self.arena[id].clone() {
            Node::Identifier { .. } => {
                if self.is_variable(id) {
                    self.read(id, status);
                }
                status
            }
            Node::Assignment { op, target, value } if self.is_variable(target) => {
                if op != AssignOp::Assign {
                    self.read(target, status);
                }
                let status = self.expression(value, status);
                self.assigned(status)
            }
            Node::Unary { op, operand } if op.is_update() && self.is_variable(operand) => {
                self.read(operand, status);
                self.assigned(status)
            }
            Node::Binary {
                op: BinaryOp::LogicalAnd | BinaryOp::LogicalOr,
                left,
                right,
            } => {
                let status = self.expression(left, status);
                let right = self.expression(right, status);
                status.join(right)
            }
            Node::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let status = self.expression(condition, status);
                let then = self.expression(then, status);
                let otherwise = self.expression(otherwise, status);
                then.join(otherwise)
            }
            Node::Lambda { parameters, body } => {
                let shadows = parameters.iter().any(|parameter| {
                    self.arena[*parameter]
                        .declared_name()
                        .is_some_and(|name| *name == self.variable)
                });
                if !shadows {
                    self.deferred(body, status);
                }
                status
            }
            Node::ObjectCreation {
                arguments, body, ..
            } => {
                let status = arguments
                    .iter()
                    .fold(status, |status, argument| self.expression(*argument, status));
                if let Some(body) = body {
                    self.deferred(body, status);
                }
                status
            }
            node => node
                .children()
                .into_iter()
                .fold(status, |status, child| self.node(child, status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeRef;
    use proptest::prelude::*;

    fn read(arena: &mut Arena) -> NodeId {
        let x = arena.ident("x");
        let target = arena.ident("System.out");
        let call = arena.invoke(target, "println", vec![x]);
        arena.expr_stmt(call)
    }

    fn write(arena: &mut Arena) -> NodeId {
        let x = arena.ident("x");
        let one = arena.int(1);
        let assignment = arena.assign(x, one);
        arena.expr_stmt(assignment)
    }

    fn analyze(arena: &Arena, block: NodeId) -> (Vec<NodeId>, AssignmentStatus) {
        let mut analysis = DefiniteAssignment::new(arena, block);
        analysis.analyze("x", AssignmentStatus::DefinitelyNotAssigned);
        (analysis.unassigned_uses().to_vec(), analysis.status_at_end())
    }

    #[test]
    fn straight_line() {
        let mut arena = Arena::new();
        let write = write(&mut arena);
        let read = read(&mut arena);
        let block = arena.block(vec![write, read]);
        let (uses, end) = analyze(&arena, block);
        assert!(uses.is_empty());
        assert_eq!(end, AssignmentStatus::DefinitelyAssigned);
    }

    #[test]
    fn one_armed_if() {
        let mut arena = Arena::new();
        let condition = arena.ident("c");
        let write = write(&mut arena);
        let branch = arena.if_(condition, write, None);
        let read = read(&mut arena);
        let block = arena.block(vec![branch, read]);
        let mut analysis = DefiniteAssignment::new(&arena, block);
        analysis.analyze("x", AssignmentStatus::DefinitelyNotAssigned);
        assert_eq!(analysis.unassigned_uses().len(), 1);
        assert_eq!(
            analysis.status_before(read),
            AssignmentStatus::PotentiallyAssigned
        );
        assert_eq!(
            analysis.status_after(write),
            AssignmentStatus::DefinitelyAssigned
        );
        assert_eq!(
            analysis.status_after(branch),
            AssignmentStatus::PotentiallyAssigned
        );
        assert!(analysis.is_potentially_assigned());
    }

    #[test]
    fn both_arms_assign() {
        let mut arena = Arena::new();
        let condition = arena.ident("c");
        let then = write(&mut arena);
        let otherwise = write(&mut arena);
        let branch = arena.if_(condition, then, Some(otherwise));
        let read = read(&mut arena);
        let block = arena.block(vec![branch, read]);
        assert!(analyze(&arena, block).0.is_empty());
    }

    #[test]
    fn read_before_write_in_loop() {
        let mut arena = Arena::new();
        let condition = arena.ident("c");
        let read = read(&mut arena);
        let write = write(&mut arena);
        let body = arena.block(vec![read, write]);
        let looped = arena.while_(condition, body);
        let block = arena.block(vec![looped]);
        let (uses, end) = analyze(&arena, block);
        assert_eq!(uses.len(), 1);
        assert_eq!(end, AssignmentStatus::PotentiallyAssigned);
    }

    #[test]
    fn infinite_loop_exits_through_break() {
        let mut arena = Arena::new();
        let condition = arena.bool(true);
        let write = write(&mut arena);
        let exit = arena.break_(None);
        let body = arena.block(vec![write, exit]);
        let looped = arena.while_(condition, body);
        let read = read(&mut arena);
        let block = arena.block(vec![looped, read]);
        assert!(analyze(&arena, block).0.is_empty());
    }

    #[test]
    fn catch_sees_partial_try() {
        let mut arena = Arena::new();
        let write = write(&mut arena);
        let body = arena.block(vec![write]);
        let read = read(&mut arena);
        let handler = arena.block(vec![read]);
        let catch = arena.alloc(Node::Catch {
            types: vec![TypeRef::class("java.lang.Exception")],
            name: Name::from("e"),
            body: handler,
        });
        let statement = arena.alloc(Node::Try {
            resources: Vec::new(),
            body,
            catches: vec![catch],
            finally: None,
        });
        let block = arena.block(vec![statement]);
        let (uses, end) = analyze(&arena, block);
        assert_eq!(uses.len(), 1);
        assert_eq!(end, AssignmentStatus::PotentiallyAssigned);
    }

    #[test]
    fn range_starts_mid_block() {
        let mut arena = Arena::new();
        let write = write(&mut arena);
        let first = read(&mut arena);
        let second = read(&mut arena);
        let block = arena.block(vec![write, first, second]);
        let mut analysis = DefiniteAssignment::new(&arena, block);
        analysis.set_analyzed_range(first, block);
        analysis.analyze("x", AssignmentStatus::PotentiallyAssigned);
        assert_eq!(analysis.unassigned_uses().len(), 2);
        analysis.set_analyzed_range(first, first);
        analysis.analyze("x", AssignmentStatus::PotentiallyAssigned);
        assert_eq!(analysis.unassigned_uses().len(), 1);
        assert_eq!(
            analysis.status_before(second),
            AssignmentStatus::Unreachable
        );
    }

    #[test]
    fn lambda_reads_count_at_definition() {
        let mut arena = Arena::new();
        let x = arena.ident("x");
        let lambda = arena.alloc(Node::Lambda {
            parameters: Vec::new(),
            body: x,
        });
        let statement = arena.declare(TypeRef::class("java.lang.Runnable"), "r", Some(lambda));
        let write = write(&mut arena);
        let block = arena.block(vec![statement, write]);
        assert_eq!(analyze(&arena, block).0, vec![x]);
    }

    // Statements over the single local `x` with opaque conditions.
    #[derive(Clone, Debug)]
    enum Program {
        Assign,
        Read,
        If(Vec<Program>, Vec<Program>),
        While(Vec<Program>),
    }

    fn program() -> impl Strategy<Value = Vec<Program>> {
        let leaf = prop_oneof![Just(Program::Assign), Just(Program::Read)];
        let statement = leaf.prop_recursive(4, 24, 4, |inner| {
            prop_oneof![
                (
                    prop::collection::vec(inner.clone(), 0..3),
                    prop::collection::vec(inner.clone(), 0..3)
                )
                    .prop_map(|(then, otherwise)| Program::If(then, otherwise)),
                prop::collection::vec(inner, 0..3).prop_map(Program::While),
            ]
        });
        prop::collection::vec(statement, 0..5)
    }

    fn build(arena: &mut Arena, statements: &[Program]) -> NodeId {
        let statements = statements
            .iter()
            .map(|statement| match statement {
                Program::Assign => write(arena),
                Program::Read => read(arena),
                Program::If(then, otherwise) => {
                    let condition = arena.ident("c");
                    let then = build(arena, then);
                    let otherwise = build(arena, otherwise);
                    arena.if_(condition, then, Some(otherwise))
                }
                Program::While(body) => {
                    let condition = arena.ident("c");
                    let body = build(arena, body);
                    arena.while_(condition, body)
                }
            })
            .collect();
        arena.block(statements)
    }

    // Enumerates every path; the state is whether `x` has been assigned.
    fn explore(statements: &[Program], states: Vec<bool>, bad: &mut bool) -> Vec<bool> {
        let mut states = states;
        for statement in statements {
            let mut next = match statement {
                Program::Assign => vec![true; states.len().min(1)],
                Program::Read => {
                    *bad |= states.contains(&false);
                    states.clone()
                }
                Program::If(then, otherwise) => {
                    let mut out = explore(then, states.clone(), bad);
                    out.extend(explore(otherwise, states.clone(), bad));
                    out
                }
                Program::While(body) => {
                    let mut out = states.clone();
                    let mut current = states.clone();
                    for _ in 0..2 {
                        current = explore(body, current, bad);
                        out.extend(current.iter().copied());
                    }
                    out
                }
            };
            next.sort_unstable();
            next.dedup();
            states = next;
        }
        states
    }

    proptest! {
        // A read is reported exactly when some execution reaches it before any assignment.
        #[test]
        fn reports_exactly_the_unsafe_reads(statements in program()) {
            let mut arena = Arena::new();
            let block = build(&mut arena, &statements);
            let mut bad = false;
            explore(&statements, vec![false], &mut bad);
            let (uses, _) = analyze(&arena, block);
            prop_assert_eq!(!uses.is_empty(), bad);
        }
    }
}
