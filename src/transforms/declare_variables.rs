//! Moves local variable declarations to where the variables are first needed.
//!
//! Upstream declares every local at the top of its block. Each declaration is taken out and placed
//! again right before the first statement using the variable, or deeper inside that statement when
//! all uses are confined to its nested blocks. A declaration immediately followed by a plain
//! assignment absorbs it as its initializer.

use crate::analysis::{
    AssignmentStatus, DefiniteAssignment, Subject, find_declaration_point, has_nested_blocks,
};
use crate::ast::{Arena, AssignOp, Modifiers, Name, Node, NodeId, Role, TypeRef};
use crate::{Context, InvariantViolation, Transform};
use tracing::{debug, trace};

pub struct DeclareVariables;

impl Transform for DeclareVariables {
    fn name(&self) -> &'static str {
        "DeclareVariables"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if !arena.contains(root, id) {
                continue;
            }
            match arena[id] {
                Node::Block { .. } => handle_block(arena, id),
                Node::Method { body: Some(_), .. } => handle_parameters(arena, id),
                _ => {}
            }
        }
        Ok(())
    }
}

/// A declaration taken out of its block, waiting to be placed again.
struct Pending {
    /// The detached `T name;` statement. Placements use copies of it.
    declaration: NodeId,
    name: Name,
    ty: TypeRef,
}

fn pending_declaration(arena: &Arena, statement: NodeId) -> Option<Pending> {
    let Node::VariableDeclaration { ty, variables, .. } = &arena[statement] else {
        return None;
    };
    let [variable] = variables.as_slice() else {
        return None;
    };
    let Node::VariableInitializer {
        name,
        initializer: None,
    } = &arena[*variable]
    else {
        return None;
    };
    Some(Pending {
        declaration: statement,
        name: name.clone(),
        ty: ty.clone(),
    })
}

fn handle_block(arena: &mut Arena, block: NodeId) {
    let Node::Block { statements } = &arena[block] else {
        return;
    };
    let mut pending: Vec<Pending> = statements
        .iter()
        .filter_map(|statement| pending_declaration(arena, *statement))
        .collect();
    if pending.is_empty() {
        return;
    }
    for variable in &pending {
        arena.detach(variable.declaration);
    }

    while !pending.is_empty() {
        let variable = pending.remove(0);
        place(arena, block, &variable, &mut pending);
    }
}

fn place(arena: &mut Arena, block: NodeId, variable: &Pending, pending: &mut Vec<Pending>) {
    let mut skip = None;
    loop {
        let point =
            find_declaration_point(arena, Subject::Variable(&variable.name), true, block, skip);
        let Some(statement) = point.statement else {
            if skip.is_none() {
                trace!(name = %variable.name, "dropped unused declaration");
            }
            return;
        };

        if point.can_move_into_sub_blocks {
            if let Node::For { initializers, .. } = &arena[statement]
                && initializers
                    .iter()
                    .any(|initializer| assigned_name(arena, *initializer) == Some(&variable.name))
            {
                if !declare_in_for_header(arena, block, statement, variable, pending) {
                    declare_at(arena, block, statement, variable);
                }
                return;
            }
            if declare_in_sub_blocks(arena, statement, variable) {
                skip = Some(statement);
                continue;
            }
        }

        declare_at(arena, block, statement, variable);
        return;
    }
}

/// Declares the variable at the start of each nested block of `statement` that uses it. Every such
/// block has to assign the variable before reading it, so that no value flows between the copies.
fn declare_in_sub_blocks(arena: &mut Arena, statement: NodeId, variable: &Pending) -> bool {
    let blocks: Vec<NodeId> = sub_blocks(arena, statement)
        .into_iter()
        .filter(|block| arena.uses_variable(*block, &variable.name))
        .collect();
    if blocks.is_empty() {
        return false;
    }

    for block in &blocks {
        let Node::Block { statements } = &arena[*block] else {
            return false;
        };
        let Some(first) = statements.first() else {
            continue;
        };
        let mut analysis = DefiniteAssignment::new(arena, *block);
        analysis.set_analyzed_range(*first, *block);
        analysis.analyze(&variable.name, AssignmentStatus::PotentiallyAssigned);
        if !analysis.unassigned_uses().is_empty() {
            return false;
        }
    }

    for block in blocks {
        let declaration = arena.deep_clone(variable.declaration);
        arena.insert_at(block, Role::Statement, 0, declaration);
    }
    trace!(name = %variable.name, statement = %arena.debug(&statement), "moved declaration inward");
    true
}

/// Blocks directly below `statement`, or below one of its children with nested blocks.
fn sub_blocks(arena: &Arena, statement: NodeId) -> Vec<NodeId> {
    let mut blocks = Vec::new();
    for child in arena.children(statement) {
        if is_block(arena, child) {
            blocks.push(child);
        } else if has_nested_blocks(arena, child) {
            blocks.extend(
                arena
                    .children(child)
                    .into_iter()
                    .filter(|grandchild| is_block(arena, *grandchild)),
            );
        }
    }
    blocks
}

fn is_block(arena: &Arena, id: NodeId) -> bool {
    matches!(arena[id], Node::Block { .. })
}

/// Declares the variable right before `statement`, or by turning `statement` into the declaration
/// when it is a plain assignment to the variable.
fn declare_at(arena: &mut Arena, block: NodeId, statement: NodeId, variable: &Pending) {
    if convert_assignment(arena, block, statement, variable) {
        return;
    }

    let declaration = arena.deep_clone(variable.declaration);
    let mut anchor = statement;
    while let Some(previous) = arena.prev_sibling(anchor)
        && matches!(arena[previous], Node::Label { .. })
    {
        anchor = previous;
    }
    arena.insert_before(anchor, declaration);

    let mut analysis = DefiniteAssignment::new(arena, block);
    analysis.set_analyzed_range(statement, block);
    analysis.analyze(&variable.name, AssignmentStatus::DefinitelyNotAssigned);
    let needs_initializer = !analysis.unassigned_uses().is_empty();
    if needs_initializer {
        let value = arena.default_value(&variable.ty);
        let initializer = first_variable(arena, declaration);
        arena.set(initializer, Role::Initializer, Some(value));
    } else if is_single_assignment(arena, block, &variable.name, None) {
        make_final(arena, declaration);
    }
    debug!(declaration = %arena.debug(&declaration), "declared variable");
}

/// `x = value;` → `T x = value;`.
fn convert_assignment(arena: &mut Arena, block: NodeId, statement: NodeId, variable: &Pending) -> bool {
    let Node::ExpressionStatement { expression } = arena[statement] else {
        return false;
    };
    let Node::Assignment {
        op: AssignOp::Assign,
        target,
        value,
    } = arena[expression]
    else {
        return false;
    };
    if arena[target].as_identifier() != Some(&variable.name) || arena.uses_variable(value, &variable.name) {
        return false;
    }

    let is_final = is_single_assignment(arena, block, &variable.name, Some(expression));
    let declaration = arena.deep_clone(variable.declaration);
    let initializer = first_variable(arena, declaration);
    arena.set(initializer, Role::Initializer, Some(value));
    arena.replace(statement, declaration);
    if is_final {
        make_final(arena, declaration);
    }
    debug!(declaration = %arena.debug(&declaration), "merged declaration with assignment");
    true
}

/// `for (a = x, b = y; ...)` → `for (T a = x, b = y; ...)`. Every variable assigned in the header
/// must be waiting for a declaration in this block and share the type.
fn declare_in_for_header(
    arena: &mut Arena,
    block: NodeId,
    loop_: NodeId,
    variable: &Pending,
    pending: &mut Vec<Pending>,
) -> bool {
    let Node::For { initializers, .. } = &arena[loop_] else {
        return false;
    };
    let initializers = initializers.clone();

    let mut names = Vec::new();
    for initializer in &initializers {
        let Some(name) = assigned_name(arena, *initializer) else {
            return false;
        };
        if names.contains(name) {
            return false;
        }
        if *name != variable.name {
            let Some(other) = pending.iter().find(|other| other.name == *name) else {
                return false;
            };
            if other.ty != variable.ty {
                return false;
            }
            let point = find_declaration_point(arena, Subject::Variable(name), true, block, None);
            if point.statement != Some(loop_) || !point.can_move_into_sub_blocks {
                return false;
            }
        }
        names.push(name.clone());
    }

    let declaration = arena.deep_clone(variable.declaration);
    if let Node::VariableDeclaration { variables, .. } = &arena[declaration] {
        for old in variables.clone() {
            arena.detach(old);
        }
    }
    for initializer in initializers {
        let (name, value) = match &arena[initializer] {
            Node::ExpressionStatement { expression } => match &arena[*expression] {
                Node::Assignment { target, value, .. } => match arena[*target].as_identifier() {
                    Some(name) => (name.clone(), *value),
                    None => continue,
                },
                _ => continue,
            },
            _ => continue,
        };
        let meta = match pending.iter().find(|other| other.name == name) {
            Some(other) => arena.meta(first_variable(arena, other.declaration)).clone(),
            None => arena.meta(first_variable(arena, variable.declaration)).clone(),
        };
        let declared = arena.alloc_with_meta(
            Node::VariableInitializer {
                name,
                initializer: Some(value),
            },
            meta,
        );
        arena.push(declaration, Role::Variable, declared);
        arena.detach(initializer);
    }
    arena.insert_at(loop_, Role::ForInitializer, 0, declaration);
    pending.retain(|other| !names.contains(&other.name));
    debug!(header = %arena.debug(&declaration), "declared variables in loop header");
    true
}

fn assigned_name(arena: &Arena, statement: NodeId) -> Option<&Name> {
    let Node::ExpressionStatement { expression } = arena[statement] else {
        return None;
    };
    match &arena[expression] {
        Node::Assignment {
            op: AssignOp::Assign,
            target,
            ..
        } => arena[*target].as_identifier(),
        _ => None,
    }
}

fn first_variable(arena: &Arena, declaration: NodeId) -> NodeId {
    match &arena[declaration] {
        Node::VariableDeclaration { variables, .. } => variables[0],
        _ => declaration,
    }
}

fn make_final(arena: &mut Arena, declaration: NodeId) {
    if let Some(modifiers) = arena.node_mut(declaration).modifiers_mut() {
        modifiers.insert(Modifiers::FINAL);
    }
}

/// Whether the variable is written at most once within `scope`, outside of loops, try statements
/// and conditional branches. `replaced` is the assignment becoming the initializer, which is
/// allowed anywhere.
fn is_single_assignment(arena: &Arena, scope: NodeId, name: &str, replaced: Option<NodeId>) -> bool {
    let mut counter = AssignmentCounter {
        arena,
        name,
        replaced,
        depth: 0,
        count: 0,
        abort: false,
    };
    counter.visit(scope);
    counter.count < 2 && !counter.abort
}

struct AssignmentCounter<'a> {
    arena: &'a Arena,
    name: &'a str,
    replaced: Option<NodeId>,
    /// Number of enclosing loops and try statements.
    depth: usize,
    count: usize,
    abort: bool,
}

impl AssignmentCounter<'_> {
    fn visit(&mut self, id: NodeId) {
        if self.abort {
            return;
        }
        let arena = self.arena;
        match &arena[id] {
            Node::TypeDeclaration { .. } => {}
            Node::ForEach { variable, .. } => {
                if arena.declares_variable(*variable, self.name) {
                    self.count += 1;
                }
                self.nested(id);
            }
            Node::While { .. }
            | Node::DoWhile { .. }
            | Node::For { .. }
            | Node::Try { .. }
            | Node::Lambda { .. } => self.nested(id),
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                self.visit(*condition);
                self.branches(*then, *otherwise);
            }
            Node::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.visit(*condition);
                self.branches(*then, Some(*otherwise));
            }
            Node::Assignment { target, .. }
                if arena[*target].as_identifier().is_some_and(|n| n == self.name) =>
            {
                if self.depth > 0 && Some(id) != self.replaced {
                    self.abort = true;
                    return;
                }
                self.count += 1;
                self.children(id);
            }
            Node::Unary { op, operand }
                if op.is_update() && arena[*operand].as_identifier().is_some_and(|n| n == self.name) =>
            {
                if self.depth > 0 {
                    self.abort = true;
                    return;
                }
                // Reads and writes at once, so it can never be the only assignment.
                self.count = self.count.max(1) + 1;
            }
            _ => self.children(id),
        }
    }

    fn children(&mut self, id: NodeId) {
        for child in self.arena.children(id) {
            self.visit(child);
        }
    }

    fn nested(&mut self, id: NodeId) {
        self.depth += 1;
        self.children(id);
        self.depth -= 1;
    }

    // An assignment in one branch only is not definite, so the variable cannot be final.
    fn branches(&mut self, then: NodeId, otherwise: Option<NodeId>) {
        let before = self.count;
        self.count = 0;
        self.visit(then);
        if self.count > 0 {
            self.abort = true;
            return;
        }
        if let Some(otherwise) = otherwise {
            self.visit(otherwise);
            if self.count > 0 {
                self.abort = true;
                return;
            }
        }
        self.count = before;
    }
}

/// Parameters the body never writes become `final`.
fn handle_parameters(arena: &mut Arena, method: NodeId) {
    let Node::Method {
        parameters,
        body: Some(body),
        ..
    } = &arena[method]
    else {
        return;
    };
    let body = *body;
    for parameter in parameters.clone() {
        let Some(name) = arena[parameter].declared_name() else {
            continue;
        };
        if !arena.assigns_variable(body, name)
            && let Some(modifiers) = arena.node_mut(parameter).modifiers_mut()
        {
            modifiers.insert(Modifiers::FINAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, UnaryOp};
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn assign_stmt(arena: &mut Arena, name: &str, value: i32) -> NodeId {
        let target = arena.local(name, TypeRef::int());
        let value = arena.int(value);
        let assignment = arena.assign(target, value);
        arena.expr_stmt(assignment)
    }

    fn use_stmt(arena: &mut Arena, name: &str) -> NodeId {
        let value = arena.local(name, TypeRef::int());
        let out = arena.ident("out");
        let call = arena.invoke(out, "println", vec![value]);
        arena.expr_stmt(call)
    }

    fn call_stmt(arena: &mut Arena, method: &str) -> NodeId {
        let this = arena.this();
        let call = arena.invoke(this, method, Vec::new());
        arena.expr_stmt(call)
    }

    fn run_on(arena: &mut Arena, statements: Vec<NodeId>) -> String {
        let body = arena.block(statements);
        run_pass(&mut DeclareVariables, arena, body);
        arena.debug(&body).to_string()
    }

    #[test]
    fn declaration_absorbs_first_assignment() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let work = call_stmt(&mut arena, "prepare");
        let assignment = assign_stmt(&mut arena, "x", 5);
        let read = use_stmt(&mut arena, "x");

        assert_eq!(
            run_on(&mut arena, vec![declaration, work, assignment, read]),
            "{
    this.prepare();
    final int x = 5;
    out.println(x);
}",
        );
    }

    #[test]
    fn reassigned_variable_is_not_final() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let first = assign_stmt(&mut arena, "x", 1);
        let second = assign_stmt(&mut arena, "x", 2);
        let read = use_stmt(&mut arena, "x");

        assert_eq!(
            run_on(&mut arena, vec![declaration, first, second, read]),
            "{
    int x = 1;
    x = 2;
    out.println(x);
}",
        );
    }

    #[test]
    fn conditionally_assigned_variable_gets_default_value() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let flag = arena.local("flag", TypeRef::boolean());
        let assignment = assign_stmt(&mut arena, "x", 1);
        let then = arena.block(vec![assignment]);
        let test = arena.if_(flag, then, None);
        let read = use_stmt(&mut arena, "x");

        assert_eq!(
            run_on(&mut arena, vec![declaration, test, read]),
            "{
    int x = 0;
    if (flag) {
        x = 1;
    }
    out.println(x);
}",
        );
    }

    #[test]
    fn declaration_moves_into_branch() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let flag = arena.local("flag", TypeRef::boolean());
        let assignment = assign_stmt(&mut arena, "x", 1);
        let read = use_stmt(&mut arena, "x");
        let then = arena.block(vec![assignment, read]);
        let test = arena.if_(flag, then, None);

        assert_eq!(
            run_on(&mut arena, vec![declaration, test]),
            "{
    if (flag) {
        final int x = 1;
        out.println(x);
    }
}",
        );
    }

    #[test]
    fn loop_carried_value_stays_outside() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let flag = arena.local("flag", TypeRef::boolean());
        let read = use_stmt(&mut arena, "x");
        let assignment = assign_stmt(&mut arena, "x", 1);
        let body = arena.block(vec![read, assignment]);
        let loop_ = arena.while_(flag, body);

        assert_eq!(
            run_on(&mut arena, vec![declaration, loop_]),
            "{
    int x = 0;
    while (flag) {
        out.println(x);
        x = 1;
    }
}",
        );
    }

    #[test]
    fn for_header_declares_counter() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "i", None);
        let init = assign_stmt(&mut arena, "i", 0);
        let i = arena.local("i", TypeRef::int());
        let n = arena.local("n", TypeRef::int());
        let condition = arena.binary(BinaryOp::Lt, i, n);
        let counter = arena.local("i", TypeRef::int());
        let step = arena.unary(UnaryOp::PostIncrement, counter);
        let step = arena.expr_stmt(step);
        let read = use_stmt(&mut arena, "i");
        let body = arena.block(vec![read]);
        let loop_ = arena.alloc(Node::For {
            initializers: vec![init],
            condition: Some(condition),
            iterators: vec![step],
            body,
        });

        assert_eq!(
            run_on(&mut arena, vec![declaration, loop_]),
            "{
    for (int i = 0; i < n; i++) {
        out.println(i);
    }
}",
        );
    }

    #[test]
    fn unused_declaration_is_dropped() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "unused", None);
        let work = call_stmt(&mut arena, "work");
        assert_eq!(
            run_on(&mut arena, vec![declaration, work]),
            "{
    this.work();
}",
        );
    }

    #[test]
    fn declaration_goes_before_jump_target() {
        let mut arena = Arena::new();
        let declaration = arena.declare(TypeRef::int(), "x", None);
        let label = arena.alloc(Node::Label {
            label: Name::from("L1"),
        });
        let flag = arena.local("flag", TypeRef::boolean());
        let assignment = assign_stmt(&mut arena, "x", 1);
        let then = arena.block(vec![assignment]);
        let test = arena.if_(flag, then, None);
        let read = use_stmt(&mut arena, "x");

        assert_eq!(
            run_on(&mut arena, vec![declaration, label, test, read]),
            "{
    int x = 0;
    L1:
    if (flag) {
        x = 1;
    }
    out.println(x);
}",
        );
    }

    #[test]
    fn unassigned_parameters_become_final() {
        let mut arena = Arena::new();
        let a = arena.parameter(TypeRef::int(), "a");
        let b = arena.parameter(TypeRef::int(), "b");
        let assignment = assign_stmt(&mut arena, "b", 1);
        let read = use_stmt(&mut arena, "a");
        let body = arena.block(vec![assignment, read]);
        let method = arena.method("run", TypeRef::void(), Modifiers::PUBLIC, vec![a, b], Some(body));

        run_pass(&mut DeclareVariables, &mut arena, method);
        assert_eq!(
            arena.debug(&method).to_string(),
            "public void run(final int a, int b) {
    b = 1;
    out.println(a);
}",
        );
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Assign,
        Read,
        AssignIf,
        ReadIf,
        AssignThenReadInLoop,
        ReadInLoop,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Assign),
            Just(Step::Read),
            Just(Step::AssignIf),
            Just(Step::ReadIf),
            Just(Step::AssignThenReadInLoop),
            Just(Step::ReadInLoop),
        ]
    }

    fn build(arena: &mut Arena, step: Step) -> NodeId {
        let flag = arena.local("flag", TypeRef::boolean());
        match step {
            Step::Assign => assign_stmt(arena, "x", 1),
            Step::Read => use_stmt(arena, "x"),
            Step::AssignIf | Step::ReadIf => {
                let inner = match step {
                    Step::AssignIf => assign_stmt(arena, "x", 2),
                    _ => use_stmt(arena, "x"),
                };
                let then = arena.block(vec![inner]);
                arena.if_(flag, then, None)
            }
            Step::AssignThenReadInLoop => {
                let assignment = assign_stmt(arena, "x", 3);
                let read = use_stmt(arena, "x");
                let body = arena.block(vec![assignment, read]);
                arena.while_(flag, body)
            }
            Step::ReadInLoop => {
                let read = use_stmt(arena, "x");
                let body = arena.block(vec![read]);
                arena.while_(flag, body)
            }
        }
    }

    proptest! {
        #[test]
        fn moved_declarations_are_assigned_before_reads(steps in proptest::collection::vec(step(), 1..7)) {
            let mut arena = Arena::new();
            let mut statements = vec![arena.declare(TypeRef::int(), "x", None)];
            for step in steps {
                statements.push(build(&mut arena, step));
            }
            let body = arena.block(statements);
            run_pass(&mut DeclareVariables, &mut arena, body);

            for id in arena.descendants(body) {
                // Every use is in the scope of a declaration.
                if arena[id].as_identifier().is_some_and(|name| name == "x") {
                    prop_assert!(arena.find_variable_declaration(id, "x").is_some());
                }
                // Declarations without initializer are followed by a write before any read.
                if arena.declares_variable(id, "x")
                    && let Node::VariableDeclaration { variables, .. } = &arena[id]
                    && let Node::VariableInitializer { initializer: None, .. } = arena[variables[0]]
                    && let Some(next) = arena.next_sibling(id)
                {
                    let block = arena.parent(id).unwrap();
                    let mut analysis = DefiniteAssignment::new(&arena, block);
                    analysis.set_analyzed_range(next, block);
                    analysis.analyze("x", AssignmentStatus::DefinitelyNotAssigned);
                    prop_assert!(analysis.unassigned_uses().is_empty());
                }
            }
        }
    }
}
