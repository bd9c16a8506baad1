//! Structured jumps from the `goto`/label pairs upstream emits, and the label bookkeeping after them.

use crate::ast::{Arena, Name, Node, NodeId, Role};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

/// Rewrites `goto` statements into `break` and `continue`, reorders switch sections to express
/// fall-through, and introduces labeled blocks for the remaining forward jumps.
pub struct BreakTargetRelocation;

impl Transform for BreakTargetRelocation {
    fn name(&self) -> &'static str {
        "BreakTargetRelocation"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let mut markers: FxHashMap<Name, Vec<NodeId>> = FxHashMap::default();
        let mut gotos: FxHashMap<Name, Vec<NodeId>> = FxHashMap::default();
        for id in arena.descendants(root) {
            match &arena[id] {
                Node::Label { label } => markers.entry(label.clone()).or_default().push(id),
                Node::Goto { label } => gotos.entry(label.clone()).or_default().push(id),
                _ => {}
            }
        }
        let mut labels: Vec<&Name> = gotos.keys().collect();
        labels.sort();
        for label in labels {
            // Duplicate or missing markers make the target ambiguous.
            let Some([marker]) = markers.get(label).map(Vec::as_slice) else {
                continue;
            };
            handle_label(arena, label, *marker, &gotos[label]);
        }
        Ok(())
    }
}

/// The structured statement a `goto` becomes.
#[derive(Clone, Copy, Debug)]
enum Jump {
    Break(NodeId),
    Continue(NodeId),
}

fn handle_label(arena: &mut Arena, label: &Name, marker: NodeId, gotos: &[NodeId]) {
    let jumps: Option<Vec<Jump>> = gotos.iter().map(|goto| classify(arena, marker, *goto)).collect();
    if let Some(jumps) = jumps {
        for (goto, jump) in gotos.iter().zip(jumps) {
            rewrite_loop_jump(arena, *goto, jump, label);
        }
        return;
    }
    if let [goto] = gotos
        && handle_fall_through(arena, marker, *goto)
    {
        return;
    }
    handle_forward_jumps(arena, label, marker, gotos);
}

/// The loop `statement` is, directly or under a label.
fn as_loop(arena: &Arena, statement: NodeId) -> Option<NodeId> {
    match &arena[statement] {
        node if node.is_loop() => Some(statement),
        Node::Labeled { statement, .. } if arena[*statement].is_loop() => Some(*statement),
        _ => None,
    }
}

fn classify(arena: &Arena, marker: NodeId, goto: NodeId) -> Option<Jump> {
    // `loop { ... } L:` exits the loop.
    if let Some(previous) = arena.prev_sibling(marker)
        && let Some(loop_) = as_loop(arena, previous)
        && arena.is_ancestor_of(loop_, goto)
    {
        return Some(Jump::Break(loop_));
    }
    // `loop { ...; L: }` reaches the end of the body.
    if arena.next_sibling(marker).is_none()
        && let Some(body) = arena.parent(marker)
        && matches!(arena[body], Node::Block { .. })
        && let Some(loop_) = arena.parent(body)
        && arena[loop_].is_loop()
        && arena.role(body) == Role::Body
        && arena.is_ancestor_of(loop_, goto)
    {
        return Some(Jump::Continue(loop_));
    }
    // `L: while (c) { ... }` re-evaluates the condition.
    if let Some(next) = arena.next_sibling(marker)
        && let Some(loop_) = as_loop(arena, next)
        && matches!(arena[loop_], Node::While { .. })
        && arena.is_ancestor_of(loop_, goto)
    {
        return Some(Jump::Continue(loop_));
    }
    None
}

fn rewrite_loop_jump(arena: &mut Arena, goto: NodeId, jump: Jump, label: &Name) {
    let (loop_, nearest) = match jump {
        Jump::Break(loop_) => (loop_, arena.enclosing(goto, Node::is_breakable)),
        Jump::Continue(loop_) => (loop_, arena.enclosing(goto, Node::is_loop)),
    };
    let target = if nearest == Some(loop_) {
        None
    } else {
        Some(loop_label(arena, loop_, label))
    };
    let statement = match jump {
        Jump::Break(_) => Node::Break { label: target },
        Jump::Continue(_) => Node::Continue { label: target },
    };
    let statement = arena.alloc(statement);
    arena.replace(goto, statement);
    trace!(statement = %arena.debug(&statement), "resolved goto");
}

/// The label of `loop_`, labeling it with `fallback` when it has none.
fn loop_label(arena: &mut Arena, loop_: NodeId, fallback: &Name) -> Name {
    if let Some(parent) = arena.parent(loop_)
        && let Node::Labeled { label, .. } = &arena[parent]
    {
        return label.clone();
    }
    let label = fallback.clone();
    let labeled = arena.wrap(loop_, |statement| Node::Labeled {
        label: label.clone(),
        statement,
    });
    // The label now names the loop, so a marker of the same name in front of it is spent.
    if let Some(previous) = arena.prev_sibling(labeled)
        && matches!(&arena[previous], Node::Label { label: marker } if *marker == label)
    {
        arena.detach(previous);
    }
    label
}

/// `case A: ...; goto L; ... case B: L: ...` → section A moved right before section B, falling
/// into it.
fn handle_fall_through(arena: &mut Arena, marker: NodeId, goto: NodeId) -> bool {
    let (Some(from), Some(to)) = (arena.parent(goto), arena.parent(marker)) else {
        return false;
    };
    if !matches!(arena[from], Node::SwitchSection { .. })
        || !matches!(arena[to], Node::SwitchSection { .. })
        || from == to
        || arena.parent(from) != arena.parent(to)
        || arena.next_sibling(goto).is_some()
        || arena.prev_sibling(marker).is_some()
    {
        return false;
    }
    if arena.next_sibling(from) == Some(to) {
        arena.detach(goto);
        trace!("goto replaced by fall-through");
        return true;
    }
    // Neither the section in front of A nor the one in front of B may fall into it.
    let falls_into = |arena: &Arena, section: NodeId| {
        arena
            .prev_sibling(section)
            .is_some_and(|previous| match super::statements(arena, previous).last() {
                Some(last) => !arena.is_divergent(*last),
                None => true,
            })
    };
    if falls_into(arena, from) || falls_into(arena, to) {
        debug!("switch sections cannot be reordered without changing fall-through");
        return false;
    }
    arena.detach(goto);
    arena.detach(from);
    arena.insert_before(to, from);
    trace!("moved switch section to fall through");
    true
}

/// The statement a jump to `marker` may break in front of: the marker itself, or the nearest
/// enclosing statement that reaches the marker first thing on entry, whichever sits in a list after
/// every jump.
fn forward_target(arena: &Arena, marker: NodeId, gotos: &[NodeId]) -> Option<NodeId> {
    let mut anchor = marker;
    loop {
        if let Some(siblings) = arena.siblings(anchor) {
            let end = siblings.iter().position(|sibling| *sibling == anchor)?;
            let precedes = |goto: &NodeId| {
                siblings[..end]
                    .iter()
                    .any(|sibling| arena.contains(*sibling, *goto))
            };
            if gotos.iter().all(precedes) {
                return Some(anchor);
            }
            let opens = siblings[..end]
                .iter()
                .all(|sibling| matches!(arena[*sibling], Node::Label { .. } | Node::Empty));
            if !opens {
                return None;
            }
        }
        // Breaking in front of an `if` or a loop would evaluate its condition on the way in.
        let parent = arena.parent(anchor)?;
        anchor = match &arena[parent] {
            Node::Block { .. } | Node::Labeled { .. } => parent,
            Node::Try {
                resources, body, ..
            } if resources.is_empty() && *body == anchor => parent,
            _ => return None,
        };
    }
}

/// `...; goto L; ...; L: s` with every jump ahead of the marker → `L: { ...; break L; ... } s`. The
/// marker may open nested blocks or `try` bodies, in which case the labeled block ends in front of
/// the outermost of them.
fn handle_forward_jumps(arena: &mut Arena, label: &Name, marker: NodeId, gotos: &[NodeId]) {
    let Some(anchor) = forward_target(arena, marker, gotos) else {
        debug!(%label, "goto is not a forward jump to its label");
        return;
    };
    let Some(siblings) = arena.siblings(anchor) else {
        return;
    };
    let siblings = siblings.to_vec();
    let Some(end) = siblings.iter().position(|sibling| *sibling == anchor) else {
        return;
    };
    let mut start = end;
    for goto in gotos {
        if let Some(index) = siblings[..end]
            .iter()
            .position(|sibling| arena.contains(*sibling, *goto))
        {
            start = start.min(index);
        }
    }
    let range = &siblings[start..end];

    // Wrapping in a block would end the scope of declarations that later statements still use.
    let declared: FxHashSet<Name> = range
        .iter()
        .filter_map(|statement| match &arena[*statement] {
            Node::VariableDeclaration { variables, .. } => Some(variables.clone()),
            _ => None,
        })
        .flatten()
        .filter_map(|variable| arena[variable].declared_name().cloned())
        .collect();
    let escapes = siblings[end..].iter().any(|later| {
        declared.iter().any(|name| arena.uses_variable(*later, name))
            || matches!(arena[*later], Node::LocalTypeDeclaration { .. })
    });
    if escapes
        || range
            .iter()
            .any(|statement| matches!(arena[*statement], Node::LocalTypeDeclaration { .. }))
    {
        debug!(%label, "labeled block would change variable scopes");
        return;
    }

    let block = arena.block(Vec::new());
    let labeled = arena.alloc(Node::Labeled {
        label: label.clone(),
        statement: block,
    });
    arena.insert_before(range[0], labeled);
    for statement in range {
        arena.push(block, Role::Statement, *statement);
    }
    for goto in gotos {
        let jump = arena.alloc(Node::Break {
            label: Some(label.clone()),
        });
        arena.replace(*goto, jump);
    }
    trace!(%label, "introduced labeled block");
}

/// Tidies labels after jump resolution: unreferenced label markers go away, markers in front of
/// statements that `break`/`continue` to them become labeled statements, labels that only repeat what
/// an unlabeled jump means are dropped, and labeled statements nothing jumps to are unwrapped.
pub struct LabelCleanup;

impl Transform for LabelCleanup {
    fn name(&self) -> &'static str {
        "LabelCleanup"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        let gotos: FxHashSet<Name> = arena
            .descendants(root)
            .into_iter()
            .filter_map(|id| match &arena[id] {
                Node::Goto { label } => Some(label.clone()),
                _ => None,
            })
            .collect();
        for id in arena.descendants(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::Label { .. }) {
                handle_marker(arena, id, &gotos);
            }
        }
        for id in arena.descendants(root) {
            if arena.contains(root, id)
                && matches!(arena[id], Node::Break { label: Some(_) } | Node::Continue { label: Some(_) })
            {
                handle_labeled_jump(arena, id);
            }
        }
        for id in arena.post_order(root) {
            if arena.contains(root, id) && matches!(arena[id], Node::Labeled { .. }) {
                handle_labeled(arena, id);
            }
        }
        Ok(())
    }
}

/// `break L`/`continue L` statements below `id`.
fn jumps_to(arena: &Arena, id: NodeId, label: &Name) -> bool {
    arena.descendants(id).into_iter().any(|node| {
        matches!(
            &arena[node],
            Node::Break { label: Some(target) } | Node::Continue { label: Some(target) }
                if target == label
        )
    })
}

fn handle_marker(arena: &mut Arena, marker: NodeId, gotos: &FxHashSet<Name>) {
    let Node::Label { label } = &arena[marker] else {
        return;
    };
    let label = label.clone();
    if gotos.contains(&label) {
        return;
    }
    let next = arena.next_sibling(marker);
    if let Some(next) = next
        && matches!(&arena[next], Node::Labeled { label: owner, .. } if *owner == label)
    {
        trace!(%label, "removed marker repeating a label");
    } else if let Some(next) = next
        && jumps_to(arena, next, &label)
    {
        arena.wrap(next, |statement| Node::Labeled {
            label: label.clone(),
            statement,
        });
        trace!(%label, "label marker attached to statement");
    } else {
        trace!(%label, "removed unreferenced label");
    }
    arena.detach(marker);
}

/// `L: while (...) { ... break L; }` → `break;` when the jump binds to the same statement unlabeled.
fn handle_labeled_jump(arena: &mut Arena, jump: NodeId) {
    let (label, nearest) = match &arena[jump] {
        Node::Break { label: Some(label) } => (label.clone(), arena.enclosing(jump, Node::is_breakable)),
        Node::Continue { label: Some(label) } => (label.clone(), arena.enclosing(jump, Node::is_loop)),
        _ => return,
    };
    let Some(nearest) = nearest else {
        return;
    };
    let Some(parent) = arena.parent(nearest) else {
        return;
    };
    if !matches!(&arena[parent], Node::Labeled { label: owner, .. } if *owner == label) {
        return;
    }
    // The jump must not cross a lambda or class body on the way.
    let crosses = arena
        .ancestors(jump)
        .take_while(|ancestor| *ancestor != nearest)
        .any(|ancestor| matches!(arena[ancestor], Node::Lambda { .. } | Node::TypeDeclaration { .. }));
    if crosses {
        return;
    }
    match arena.node_mut(jump) {
        Node::Break { label } | Node::Continue { label } => *label = None,
        _ => {}
    }
}

fn handle_labeled(arena: &mut Arena, labeled: NodeId) {
    let Node::Labeled { label, statement } = &arena[labeled] else {
        return;
    };
    let statement = *statement;
    if jumps_to(arena, statement, label) {
        return;
    }
    trace!(%label, "removed unused label");
    let has_declarations = super::statements(arena, statement).iter().any(|child| {
        matches!(
            arena[*child],
            Node::VariableDeclaration { .. } | Node::LocalTypeDeclaration { .. }
        )
    });
    if matches!(arena[statement], Node::Block { .. })
        && arena.siblings(labeled).is_some()
        && !has_declarations
    {
        for child in super::statements(arena, statement) {
            arena.insert_before(labeled, child);
        }
        arena.detach(labeled);
    } else {
        arena.replace(labeled, statement);
    }
}
