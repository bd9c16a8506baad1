//! Loop recovery: `while` loops become `for`, for-each and `do`/`while` loops where the shape of the
//! code allows it.

use crate::analysis::{AssignmentStatus, DefiniteAssignment, are_correlated, can_move_declaration_into};
use crate::ast::{Arena, AssignOp, BinaryOp, Meta, Modifiers, Name, Node, NodeId, TypeRef, UnaryOp};
use crate::pattern::build::*;
use crate::pattern::{Match, Pattern};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

/// Recovers `for`, for-each and `do`/`while` loops from the `while` loops upstream emits.
pub struct ConvertLoops;

impl Transform for ConvertLoops {
    fn name(&self) -> &'static str {
        "ConvertLoops"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let for_each = !context.settings.disable_for_each_transforms;
        for id in arena.descendants(root) {
            if !arena.contains(root, id) {
                continue;
            }
            match arena[id] {
                Node::While { .. } => handle_while(arena, id, for_each),
                Node::For { .. } if for_each => {
                    handle_for_each_in_array(arena, id);
                }
                Node::ExpressionStatement { .. } if for_each => {
                    handle_for_each_in_iterable(arena, id);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn handle_while(arena: &mut Arena, loop_: NodeId, for_each: bool) {
    if let Some(for_) = handle_for(arena, loop_) {
        if for_each {
            handle_for_each_in_array(arena, for_);
        }
    } else if !handle_do_while(arena, loop_) {
        handle_continue_outer(arena, loop_);
    }
}

// For loops

/// `i = 0; while (i < n) { ...; i++; }` → `for (i = 0; i < n; i++) { ... }`, with the header
/// declaring the variables when their declarations can move there.
fn handle_for(arena: &mut Arena, loop_: NodeId) -> Option<NodeId> {
    let Node::While { condition, body } = arena[loop_] else {
        return None;
    };
    if matches!(arena[condition], Node::Literal { .. }) {
        return None;
    }
    let Node::Block { statements } = &arena[body] else {
        return None;
    };
    if statements.is_empty() || has_escaping_gotos(arena, body) {
        return None;
    }

    // Every statement after which control reaches the condition.
    let mut sites = Vec::new();
    if let Some(last) = statements.last()
        && !arena.is_divergent(*last)
    {
        sites.push(Some(*last));
    }
    for continue_ in continues_of(arena, loop_) {
        sites.push(Some(arena.prev_sibling(continue_).unwrap_or(continue_)));
    }
    if sites.is_empty() {
        return None;
    }

    // Iterators paired with the copies of them at the other sites.
    let mut iterators = Vec::new();
    let mut copies = Vec::new();
    while let Some(Some(site)) = sites.first().copied() {
        if !is_simple_iterator(arena, site)
            || !sites[1..]
                .iter()
                .all(|other| other.is_some_and(|other| arena.same_structure(site, other)))
        {
            break;
        }
        iterators.push(site);
        copies.push(sites[1..].iter().flatten().copied().collect::<Vec<_>>());
        for site in &mut sites {
            *site = site.and_then(|site| arena.prev_sibling(site));
        }
    }
    iterators.reverse();
    copies.reverse();
    // Updates unrelated to the condition stay in the body.
    let relevant = iterators
        .iter()
        .position(|iterator| are_correlated(arena, condition, *iterator))?;
    iterators.drain(..relevant);
    copies.drain(..relevant);

    let mut initializers = Vec::new();
    let mut previous = arena.prev_sibling(loop_);
    while let Some(statement) = previous {
        let Some((_, target, _)) = simple_assignment(arena, statement, false) else {
            break;
        };
        let extract = are_correlated(arena, condition, statement)
            || iterators.iter().any(|iterator| {
                iterator_expression(arena, *iterator)
                    .is_some_and(|expression| are_correlated(arena, expression, statement))
                    || are_correlated(arena, target, *iterator)
            });
        if !extract {
            break;
        }
        initializers.push(statement);
        previous = arena.prev_sibling(statement);
    }
    if initializers.is_empty() {
        return None;
    }
    initializers.reverse();

    let inlinable = first_inlinable(arena, &initializers, loop_);

    for copy in copies.into_iter().flatten() {
        arena.detach(copy);
    }
    // Initializers in front of the inlinable ones stay where they are.
    let header_initializers = match &inlinable {
        Some(inlinable) => vec![header_declaration(arena, &initializers[inlinable.first..], &inlinable.ty)],
        None => initializers,
    };
    let for_ = arena.alloc(Node::For {
        initializers: header_initializers,
        condition: Some(condition),
        iterators,
        body,
    });
    arena.replace(loop_, for_);
    if let Some(inlinable) = inlinable {
        for declaration in inlinable.declarations {
            drop_unused_declaration(arena, declaration);
        }
    }
    debug!(statement = %arena.debug(&for_), "introduced for loop");
    Some(for_)
}

/// `i++`, `--i`, `i = i + 2` and other updates that can sit in a `for` header.
fn is_simple_iterator(arena: &Arena, statement: NodeId) -> bool {
    iterator_expression(arena, statement).is_some()
}

fn iterator_expression(arena: &Arena, statement: NodeId) -> Option<NodeId> {
    let Node::ExpressionStatement { expression } = arena[statement] else {
        return None;
    };
    match &arena[expression] {
        Node::Assignment { .. } => Some(expression),
        Node::Unary { op, .. } if op.is_update() => Some(expression),
        _ => None,
    }
}

/// `name = value;` as `(name, target, value)`. With `plain` set, compound assignments are rejected.
fn simple_assignment(arena: &Arena, statement: NodeId, plain: bool) -> Option<(&Name, NodeId, NodeId)> {
    let Node::ExpressionStatement { expression } = arena[statement] else {
        return None;
    };
    let Node::Assignment { op, target, value } = &arena[expression] else {
        return None;
    };
    if plain && *op != AssignOp::Assign {
        return None;
    }
    let name = arena[*target].as_identifier()?;
    Some((name, *target, *value))
}

/// The label naming a loop, whether as a labeled statement or a jump target right before it.
fn loop_label(arena: &Arena, loop_: NodeId) -> Option<&Name> {
    if let Some(parent) = arena.parent(loop_)
        && let Node::Labeled { label, .. } = &arena[parent]
    {
        return Some(label);
    }
    match &arena[arena.prev_sibling(loop_)?] {
        Node::Label { label } => Some(label),
        _ => None,
    }
}

/// `continue` statements that jump to the condition of `loop_`.
fn continues_of(arena: &Arena, loop_: NodeId) -> Vec<NodeId> {
    let label = loop_label(arena, loop_);
    arena
        .descendants(loop_)
        .into_iter()
        .filter(|id| match &arena[*id] {
            Node::Continue { label: None } => arena.enclosing(*id, Node::is_loop) == Some(loop_),
            Node::Continue { label: Some(target) } => label == Some(target),
            _ => false,
        })
        .collect()
}

/// Whether a `goto` below `body` leaves it. Such jumps may target the condition and would skip the
/// iterators of a `for`.
fn has_escaping_gotos(arena: &Arena, body: NodeId) -> bool {
    let descendants = arena.descendants(body);
    let labels: FxHashSet<&Name> = descendants
        .iter()
        .filter_map(|id| match &arena[*id] {
            Node::Label { label } => Some(label),
            _ => None,
        })
        .collect();
    descendants
        .iter()
        .any(|id| matches!(&arena[*id], Node::Goto { label } if !labels.contains(label)))
}

struct Inlinable {
    /// Index of the first initializer that moves into the header.
    first: usize,
    ty: TypeRef,
    declarations: Vec<NodeId>,
}

/// Finds the longest suffix of `initializers` whose variables can be declared in the header of the
/// loop. Each variable needs its own uninitialized declaration in an enclosing block, all of them
/// of one type, and nothing outside the initializers and the loop may use them.
fn first_inlinable(arena: &mut Arena, initializers: &[NodeId], loop_: NodeId) -> Option<Inlinable> {
    let mut group = initializers.to_vec();
    group.push(loop_);
    arena.probe_grouped(&group, |arena, outer, _| {
        let mut ty: Option<TypeRef> = None;
        let mut first = None;
        let mut declarations = Vec::new();
        let mut names = FxHashSet::default();
        for (index, initializer) in initializers.iter().enumerate() {
            let candidate = simple_assignment(arena, *initializer, true).and_then(|(name, _, _)| {
                let declaration = arena.find_variable_declaration(loop_, name)?;
                let declared_type = uninitialized_declaration(arena, declaration)?;
                let parameter = arena
                    .meta(declaration)
                    .variable
                    .as_ref()
                    .is_some_and(|variable| variable.is_parameter);
                (!parameter && names.insert(name.clone())).then(|| (declaration, declared_type.clone()))
            });
            let Some((declaration, declared_type)) = candidate else {
                ty = None;
                first = None;
                declarations.clear();
                continue;
            };
            if ty.as_ref().is_some_and(|ty| *ty != declared_type) {
                first = None;
                declarations.clear();
            }
            ty = Some(declared_type);
            if can_move_declaration_into(arena, declaration, loop_) != Some(outer) {
                ty = None;
                first = None;
                declarations.clear();
            } else {
                first.get_or_insert(index);
                declarations.push(declaration);
            }
        }
        Some(Inlinable {
            first: first?,
            ty: ty?,
            declarations,
        })
    })
}

/// The type of a `T name;` declaration with one variable and no initializer.
fn uninitialized_declaration(arena: &Arena, declaration: NodeId) -> Option<&TypeRef> {
    let Node::VariableDeclaration { ty, variables, .. } = &arena[declaration] else {
        return None;
    };
    let [variable] = variables.as_slice() else {
        return None;
    };
    if !matches!(arena[*variable], Node::VariableInitializer { initializer: None, .. }) {
        return None;
    }
    matches!(arena[arena.parent(declaration)?], Node::Block { .. }).then_some(ty)
}

/// `a = x; b = y;` → `T a = x, b = y`.
fn header_declaration(arena: &mut Arena, initializers: &[NodeId], ty: &TypeRef) -> NodeId {
    let mut variables = Vec::new();
    for initializer in initializers {
        let Some((name, target, value)) = simple_assignment(arena, *initializer, true) else {
            continue;
        };
        let name = name.clone();
        let meta = Meta {
            ty: Some(ty.clone()),
            variable: arena.meta(target).variable.clone(),
            ..Meta::default()
        };
        arena.detach(*initializer);
        variables.push(arena.alloc_with_meta(
            Node::VariableInitializer {
                name,
                initializer: Some(value),
            },
            meta,
        ));
    }
    arena.alloc_with_meta(
        Node::VariableDeclaration {
            ty: ty.clone(),
            modifiers: Modifiers::NONE,
            variables,
        },
        Meta {
            ty: Some(ty.clone()),
            ..Meta::default()
        },
    )
}

/// Removes `T name;` once nothing in its block uses `name` any more.
fn drop_unused_declaration(arena: &mut Arena, declaration: NodeId) {
    let Node::VariableDeclaration { variables, .. } = &arena[declaration] else {
        return;
    };
    let [variable] = variables.as_slice() else {
        return;
    };
    let Node::VariableInitializer {
        name,
        initializer: None,
    } = &arena[*variable]
    else {
        return;
    };
    let Some(siblings) = arena.siblings(declaration) else {
        return;
    };
    let used = siblings
        .iter()
        .any(|sibling| *sibling != declaration && arena.uses_variable(*sibling, name));
    if !used {
        trace!(declaration = %arena.debug(&declaration), "dropped unused declaration");
        arena.detach(declaration);
    }
}

// For-each over arrays

fn increment() -> Pattern {
    expr_stmt(choice(vec![
        unary(UnaryOp::PreIncrement, backref("index")),
        unary(UnaryOp::PostIncrement, backref("index")),
    ]))
}

fn element_body() -> Pattern {
    let element = indexer(backref("array"), backref("index"));
    block_of(vec![
        choice(vec![
            named("item_assignment", expr_stmt(assign(named("item", any_ident()), element.clone()))),
            named(
                "item_declaration",
                declaration(None, vec![variable(None, element)]),
            ),
        ]),
        repeat(capture("statement")),
    ])
}

// for (int length = array.length, index = 0; index < length; index++)
static ARRAY_CACHED_LENGTH: LazyLock<Pattern> = LazyLock::new(|| {
    for_(
        vec![declaration(
            Some(TypeRef::int()),
            vec![
                named("length_declaration", variable(None, member(named("array", any_ident()), "length"))),
                named("index_declaration", variable(None, int(0))),
            ],
        )],
        binary(
            BinaryOp::Lt,
            named("index", any_ident()),
            named("length", any_ident()),
        ),
        vec![increment()],
        element_body(),
    )
});

// for (int index = 0; index < array.length; index++)
static ARRAY_DIRECT_LENGTH: LazyLock<Pattern> = LazyLock::new(|| {
    for_(
        vec![declaration(
            Some(TypeRef::int()),
            vec![named("index_declaration", variable(None, int(0)))],
        )],
        binary(
            BinaryOp::Lt,
            named("index", any_ident()),
            member(named("array", any_ident()), "length"),
        ),
        vec![increment()],
        element_body(),
    )
});

// for (length = array.length, index = 0; index < length; index++)
static ARRAY_ASSIGNED: LazyLock<Pattern> = LazyLock::new(|| {
    for_(
        vec![
            expr_stmt(assign(
                named("length", any_ident()),
                member(named("array", any_ident()), "length"),
            )),
            expr_stmt(assign(named("index", any_ident()), int(0))),
        ],
        binary(BinaryOp::Lt, backref("index"), backref("length")),
        vec![increment()],
        element_body(),
    )
});

fn declared(arena: &Arena, m: &Match, declaration: &str, name: &str) -> bool {
    match (m.get(declaration), m.get(name)) {
        (Some(declaration), Some(name)) => arena[declaration].declared_name() == arena[name].as_identifier(),
        (None, _) => true,
        _ => false,
    }
}

fn identifier(arena: &Arena, m: &Match, name: &str) -> Option<Name> {
    arena[m.get(name)?].as_identifier().cloned()
}

/// Indexed loops over a local array → `for (T item : array)`.
fn handle_for_each_in_array(arena: &mut Arena, loop_: NodeId) -> Option<NodeId> {
    let (m, header_declares) = if let Some(m) = ARRAY_CACHED_LENGTH.match_node(arena, loop_) {
        (m, true)
    } else if let Some(m) = ARRAY_DIRECT_LENGTH.match_node(arena, loop_) {
        (m, true)
    } else {
        (ARRAY_ASSIGNED.match_node(arena, loop_)?, false)
    };
    if !declared(arena, &m, "index_declaration", "index")
        || !declared(arena, &m, "length_declaration", "length")
    {
        return None;
    }
    let array = identifier(arena, &m, "array")?;
    let index = identifier(arena, &m, "index")?;
    let length = identifier(arena, &m, "length");
    let item = match m.get("item_declaration") {
        Some(declaration) => arena[*arena.children(declaration).first()?].declared_name()?.clone(),
        None => identifier(arena, &m, "item")?,
    };

    // The upstream declaration of the item must be able to move right into the loop.
    let (item_type, item_declaration) = match m.get("item_declaration") {
        Some(declaration) => match &arena[declaration] {
            Node::VariableDeclaration { ty, .. } => (ty.clone(), None),
            _ => return None,
        },
        None => {
            let declaration = arena.find_variable_declaration(loop_, &item)?;
            let ty = uninitialized_declaration(arena, declaration)?.clone();
            if can_move_declaration_into(arena, declaration, loop_) != Some(loop_) {
                return None;
            }
            (ty, Some(declaration))
        }
    };

    let rest = m.all("statement").to_vec();
    if let Some(first) = rest.first() {
        let body = arena.parent(*first)?;
        let mut analysis = DefiniteAssignment::new(arena, body);
        analysis.set_analyzed_range(*first, body);
        analysis.analyze(&array, AssignmentStatus::DefinitelyNotAssigned);
        if analysis.is_potentially_assigned() {
            return None;
        }
        analysis.analyze(&index, AssignmentStatus::DefinitelyNotAssigned);
        if analysis.is_potentially_assigned() || !analysis.unassigned_uses().is_empty() {
            return None;
        }
        if let Some(length) = &length {
            analysis.analyze(length, AssignmentStatus::DefinitelyNotAssigned);
            if analysis.is_potentially_assigned() || !analysis.unassigned_uses().is_empty() {
                return None;
            }
        }
    }
    if !header_declares
        && (reads_after(arena, loop_, &index)
            || length.as_ref().is_some_and(|length| reads_after(arena, loop_, length)))
    {
        return None;
    }

    let assigned = rest.iter().any(|statement| arena.assigns_variable(*statement, &item));
    let modifiers = if assigned { Modifiers::NONE } else { Modifiers::FINAL };
    let variable = arena.declare(item_type, &item, None);
    set_modifiers(arena, variable, modifiers);
    let iterable = m["array"];
    let body = arena.block(rest);
    let for_each = arena.alloc(Node::ForEach {
        variable,
        iterable,
        body,
    });
    arena.replace(loop_, for_each);
    if let Some(declaration) = item_declaration {
        drop_unused_declaration(arena, declaration);
    }
    if !header_declares {
        drop_declaration_of(arena, for_each, &index);
        if let Some(length) = &length {
            drop_declaration_of(arena, for_each, length);
        }
    }
    inline_array_initializer(arena, for_each, &array);
    debug!(statement = %arena.debug(&for_each), "introduced for-each over array");
    Some(for_each)
}

fn set_modifiers(arena: &mut Arena, declaration: NodeId, new: Modifiers) {
    if let Node::VariableDeclaration { modifiers, .. } = arena.node_mut(declaration) {
        *modifiers = new;
    }
}

fn drop_declaration_of(arena: &mut Arena, from: NodeId, name: &str) {
    if let Some(declaration) = arena.find_variable_declaration(from, name) {
        drop_unused_declaration(arena, declaration);
    }
}

/// Whether a statement after `loop_` in its list reads the value `name` has when the loop ends.
fn reads_after(arena: &Arena, loop_: NodeId, name: &str) -> bool {
    let (Some(next), Some(parent)) = (arena.next_sibling(loop_), arena.parent(loop_)) else {
        return false;
    };
    let mut analysis = DefiniteAssignment::new(arena, parent);
    analysis.set_analyzed_range(next, parent);
    analysis.analyze(name, AssignmentStatus::PotentiallyAssigned);
    !analysis.unassigned_uses().is_empty()
}

/// `array = init; for (T item : array)` → `for (T item : init)` when `array` is used nowhere else.
fn inline_array_initializer(arena: &mut Arena, for_each: NodeId, array: &str) {
    let Some(previous) = arena.prev_sibling(for_each) else {
        return;
    };
    let Some((name, _, value)) = simple_assignment(arena, previous, true) else {
        return;
    };
    if name != array {
        return;
    }
    let Some(declaration) = arena.find_variable_declaration(previous, array) else {
        return;
    };
    if uninitialized_declaration(arena, declaration).is_none() {
        return;
    }
    let movable = arena.probe_grouped(&[previous, for_each], |arena, outer, _| {
        can_move_declaration_into(arena, declaration, for_each) == Some(outer)
    });
    if !movable {
        return;
    }
    let Node::ForEach { iterable, .. } = arena[for_each] else {
        return;
    };
    arena.replace(iterable, value);
    arena.detach(previous);
    drop_unused_declaration(arena, declaration);
}

// For-each over iterables

// iterator = collection.iterator();
static GET_ITERATOR: LazyLock<Pattern> = LazyLock::new(|| {
    expr_stmt(assign(
        named("left", any_ident()),
        call(capture("collection"), "iterator", vec![]),
    ))
});

// while (iterator.hasNext()) { item = (T) iterator.next(); ... }
static ITERATOR_LOOP: LazyLock<Pattern> = LazyLock::new(|| {
    let next = choice(vec![
        call(backref("iterator"), "next", vec![]),
        cast(None, call(backref("iterator"), "next", vec![])),
    ]);
    while_(
        call(named("iterator", any_ident()), "hasNext", vec![]),
        block_of(vec![
            choice(vec![
                expr_stmt(assign(named("item", any_ident()), next.clone())),
                named("item_declaration", declaration(None, vec![variable(None, next)])),
            ]),
            repeat(capture("statement")),
        ]),
    )
});

fn handle_for_each_in_iterable(arena: &mut Arena, statement: NodeId) -> Option<NodeId> {
    let get = GET_ITERATOR.match_node(arena, statement)?;
    let loop_ = arena.next_sibling(statement)?;
    let m = ITERATOR_LOOP.match_node(arena, loop_)?;
    let iterator = identifier(arena, &m, "iterator")?;
    if arena[get["left"]].as_identifier() != Some(&iterator) {
        return None;
    }

    let (item, item_type, item_declaration) = match m.get("item_declaration") {
        Some(declaration) => {
            let Node::VariableDeclaration { ty, variables, .. } = &arena[declaration] else {
                return None;
            };
            let name = arena[*variables.first()?].declared_name()?.clone();
            (name, ty.clone(), None)
        }
        None => {
            let item = identifier(arena, &m, "item")?;
            let declaration = arena.find_variable_declaration(loop_, &item)?;
            let ty = uninitialized_declaration(arena, declaration)?.clone();
            if can_move_declaration_into(arena, declaration, loop_) != Some(loop_) {
                return None;
            }
            (item, ty, Some(declaration))
        }
    };

    let rest = m.all("statement").to_vec();
    if rest.iter().any(|statement| arena.uses_variable(*statement, &iterator)) {
        return None;
    }
    let iterator_declaration = arena.find_variable_declaration(statement, &iterator)?;
    uninitialized_declaration(arena, iterator_declaration)?;
    let confined = arena.probe_grouped(&[statement, loop_], |arena, outer, _| {
        can_move_declaration_into(arena, iterator_declaration, loop_) == Some(outer)
    });
    if !confined {
        return None;
    }

    let mut collection = get["collection"];
    if matches!(arena[collection], Node::Super) {
        let this = arena.this();
        arena.replace(collection, this);
        collection = this;
    }

    let assigned = rest.iter().any(|statement| arena.assigns_variable(*statement, &item));
    let variable = arena.declare(item_type, &item, None);
    if !assigned {
        set_modifiers(arena, variable, Modifiers::FINAL);
    }
    let body = arena.block(rest);
    let for_each = arena.alloc(Node::ForEach {
        variable,
        iterable: collection,
        body,
    });
    arena.replace(loop_, for_each);
    arena.detach(statement);
    drop_unused_declaration(arena, iterator_declaration);
    if let Some(declaration) = item_declaration {
        drop_unused_declaration(arena, declaration);
    }
    debug!(statement = %arena.debug(&for_each), "introduced for-each over iterable");
    Some(for_each)
}

// Do-while loops

// while (true) { ...; if (c) break; }
// while (true) { ...; if (c) continue; break; }
static INFINITE_LOOP: LazyLock<Pattern> = LazyLock::new(|| {
    while_(
        boolean(true),
        choice(vec![
            block_of(vec![
                repeat(capture("statement")),
                named("test", if_(capture("break_condition"), embedded(break_(None)), absent())),
            ]),
            block_of(vec![
                repeat(capture("statement")),
                named(
                    "test",
                    if_(
                        capture("continue_condition"),
                        embedded(named("continue", continue_(None))),
                        absent(),
                    ),
                ),
                named("break", break_(None)),
            ]),
        ]),
    )
});

fn handle_do_while(arena: &mut Arena, loop_: NodeId) -> bool {
    let Some(m) = INFINITE_LOOP.match_node(arena, loop_) else {
        return false;
    };
    // A `continue` would jump to the condition instead of the top of the body.
    let matched = m.get("continue");
    if continues_of(arena, loop_)
        .into_iter()
        .any(|continue_| Some(continue_) != matched)
    {
        return false;
    }
    let Node::While { body, .. } = arena[loop_] else {
        return false;
    };
    let tested = m
        .get("continue_condition")
        .unwrap_or_else(|| m["break_condition"]);
    let hoisted = condition_variables(arena, body, tested);
    let anchor = match hoist_anchor(arena, loop_) {
        Some(anchor) => anchor,
        None if hoisted.is_empty() => loop_,
        // Nowhere to declare the variables the condition reads.
        None => return false,
    };

    let condition = match m.get("continue_condition") {
        Some(condition) => condition,
        None => arena.negate(m["break_condition"]),
    };
    arena.detach(condition);
    arena.detach(m["test"]);
    if let Some(break_) = m.get("break") {
        arena.detach(break_);
    }
    hoist_condition_variables(arena, anchor, hoisted);

    let do_while = arena.alloc(Node::DoWhile { body, condition });
    arena.replace(loop_, do_while);
    debug!(statement = %arena.debug(&do_while), "introduced do-while loop");
    true
}

/// Declarations in the body of variables the condition reads. The condition of a `do`/`while` is
/// outside the body's scope.
fn condition_variables(arena: &Arena, body: NodeId, condition: NodeId) -> Vec<NodeId> {
    super::statements(arena, body)
        .into_iter()
        .filter(|statement| {
            let Node::VariableDeclaration { variables, .. } = &arena[*statement] else {
                return false;
            };
            let [variable] = variables.as_slice() else {
                return false;
            };
            arena[*variable]
                .declared_name()
                .is_some_and(|name| arena.uses_variable(condition, name))
        })
        .collect()
}

/// The statement in front of which declarations for a loop can go: the loop itself or the labeled
/// statement around it.
fn hoist_anchor(arena: &Arena, loop_: NodeId) -> Option<NodeId> {
    let mut anchor = loop_;
    while arena.siblings(anchor).is_none() {
        let parent = arena.parent(anchor)?;
        if !matches!(arena[parent], Node::Labeled { .. }) {
            return None;
        }
        anchor = parent;
    }
    Some(anchor)
}

/// Moves the declarations in front of `anchor`, leaving initializers behind as assignments.
fn hoist_condition_variables(arena: &mut Arena, anchor: NodeId, declarations: Vec<NodeId>) {
    for statement in declarations {
        let Node::VariableDeclaration { ty, variables, .. } = &arena[statement] else {
            continue;
        };
        let &[variable] = variables.as_slice() else {
            continue;
        };
        let ty = ty.clone();
        let Node::VariableInitializer { name, initializer } = arena[variable].clone() else {
            continue;
        };
        let variable_meta = arena.meta(variable).variable.clone();
        match initializer {
            Some(value) => {
                let target = arena.local(&name, ty.clone());
                arena.meta_mut(target).variable = variable_meta;
                let assignment = arena.assign(target, value);
                let assignment = arena.expr_stmt(assignment);
                arena.replace(statement, assignment);
            }
            None => arena.detach(statement),
        }
        let declaration = arena.declare(ty, &name, None);
        arena.insert_before(anchor, declaration);
    }
}

// Continue-outer

/// `while (c) { L: ... }` → `L: while (c) { ... }`, so that jumps to `L` read as `continue`.
fn handle_continue_outer(arena: &mut Arena, loop_: NodeId) {
    let Node::While { body, .. } = arena[loop_] else {
        return;
    };
    let Some(first) = super::statements(arena, body).first().copied() else {
        return;
    };
    if !matches!(arena[first], Node::Label { .. }) || arena.siblings(loop_).is_none() {
        return;
    }
    arena.detach(first);
    arena.insert_before(loop_, first);
    trace!("moved label in front of loop");
}
