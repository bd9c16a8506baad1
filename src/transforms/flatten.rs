use super::statements;
use crate::ast::{Arena, Name, Node, NodeId, Role};
use crate::{Context, InvariantViolation, Transform};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Turns `else { if (...) ... }` into `else if (...) ...`.
pub struct FlattenElseIf;

impl Transform for FlattenElseIf {
    fn name(&self) -> &'static str {
        "FlattenElseIf"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            let Node::If {
                otherwise: Some(otherwise),
                ..
            } = arena[id]
            else {
                continue;
            };
            if let [nested] = statements(arena, otherwise).as_slice()
                && matches!(arena[otherwise], Node::Block { .. })
                && matches!(arena[*nested], Node::If { .. })
            {
                arena.replace(otherwise, *nested);
                trace!("flattened else-if");
            }
        }
        Ok(())
    }
}

/// Unwraps `case k: { ... }` into `case k: ...` when the section's declarations cannot collide with
/// the rest of the switch, which shares one scope.
pub struct FlattenSwitchBlocks;

impl Transform for FlattenSwitchBlocks {
    fn name(&self) -> &'static str {
        "FlattenSwitchBlocks"
    }

    fn run(
        &mut self,
        arena: &mut Arena,
        root: NodeId,
        _context: &Context<'_>,
    ) -> Result<(), InvariantViolation> {
        for id in arena.descendants(root) {
            if let Node::Switch { sections, .. } = &arena[id] {
                for section in sections.clone() {
                    handle_section(arena, id, section);
                }
            }
        }
        Ok(())
    }
}

/// Names a statement list declares at its own level.
fn declared_names(arena: &Arena, statements: &[NodeId]) -> Vec<Name> {
    let mut names = Vec::new();
    for statement in statements {
        match &arena[*statement] {
            Node::VariableDeclaration { variables, .. } => names.extend(
                variables
                    .iter()
                    .filter_map(|variable| arena[*variable].declared_name().cloned()),
            ),
            Node::LocalTypeDeclaration { declaration } => {
                if let Node::TypeDeclaration { name, .. } = &arena[*declaration] {
                    names.push(name.clone());
                }
            }
            _ => {}
        }
    }
    names
}

/// Every simple name a subtree declares or mentions.
fn mentioned_names(arena: &Arena, root: NodeId, names: &mut FxHashSet<Name>) {
    for id in arena.descendants(root) {
        match &arena[id] {
            Node::Identifier { name } | Node::VariableInitializer { name, .. } | Node::Catch { name, .. } => {
                names.insert(name.clone());
            }
            Node::Parameter { name, .. } => {
                names.insert(name.clone());
            }
            Node::TypeDeclaration { name, .. } => {
                names.insert(name.clone());
            }
            _ => {}
        }
    }
}

fn handle_section(arena: &mut Arena, switch: NodeId, section: NodeId) {
    let &[block] = statements(arena, section).as_slice() else {
        return;
    };
    if !matches!(arena[block], Node::Block { .. }) {
        return;
    }
    let inner = statements(arena, block);
    let declared = declared_names(arena, &inner);
    if !declared.is_empty() {
        let Node::Switch { sections, .. } = &arena[switch] else {
            return;
        };
        let mut others = FxHashSet::default();
        for other in sections.iter().filter(|other| **other != section) {
            mentioned_names(arena, *other, &mut others);
        }
        if declared.iter().any(|name| others.contains(name)) {
            return;
        }
    }
    arena.detach(block);
    for statement in inner {
        arena.push(section, Role::Statement, statement);
    }
    trace!("flattened switch section block");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeRef;
    use crate::transforms::run_pass;
    use pretty_assertions::assert_eq;

    fn call(arena: &mut Arena, method: &str) -> NodeId {
        let callee = arena.ident(method);
        let call = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![],
        });
        arena.expr_stmt(call)
    }

    #[test]
    fn else_block_holding_an_if() {
        let mut arena = Arena::new();
        let a = arena.ident("a");
        let first = call(&mut arena, "first");
        let first = arena.block(vec![first]);
        let b = arena.ident("b");
        let second = call(&mut arena, "second");
        let second = arena.block(vec![second]);
        let third = call(&mut arena, "third");
        let third = arena.block(vec![third]);
        let nested = arena.if_(b, second, Some(third));
        let otherwise = arena.block(vec![nested]);
        let outer = arena.if_(a, first, Some(otherwise));
        let body = arena.block(vec![outer]);

        run_pass(&mut FlattenElseIf, &mut arena, body);
        assert_eq!(
            arena.debug(&body).to_string(),
            "{
    if (a) {
        first();
    } else if (b) {
        second();
    } else {
        third();
    }
}",
        );
    }

    fn section(arena: &mut Arena, value: i32, statements: Vec<NodeId>) -> NodeId {
        let value = arena.int(value);
        let label = arena.alloc(Node::CaseLabel { value: Some(value) });
        let block = arena.block(statements);
        arena.alloc(Node::SwitchSection {
            labels: vec![label],
            statements: vec![block],
        })
    }

    fn declare_and_use(arena: &mut Arena, name: &str) -> Vec<NodeId> {
        let zero = arena.int(0);
        let declaration = arena.declare(TypeRef::int(), name, Some(zero));
        let read = arena.local(name, TypeRef::int());
        let callee = arena.ident("use");
        let use_ = arena.alloc(Node::Invocation {
            target: callee,
            arguments: vec![read],
        });
        let use_ = arena.expr_stmt(use_);
        let brk = arena.break_(None);
        vec![declaration, use_, brk]
    }

    fn switch(arena: &mut Arena, sections: Vec<NodeId>) -> NodeId {
        let selector = arena.ident("k");
        let switch = arena.alloc(Node::Switch { selector, sections });
        arena.block(vec![switch])
    }

    #[test]
    fn distinct_names_are_flattened() {
        let mut arena = Arena::new();
        let first = declare_and_use(&mut arena, "a");
        let first = section(&mut arena, 1, first);
        let second = declare_and_use(&mut arena, "b");
        let second = section(&mut arena, 2, second);
        let body = switch(&mut arena, vec![first, second]);

        run_pass(&mut FlattenSwitchBlocks, &mut arena, body);
        assert_eq!(
            arena.debug(&body).to_string(),
            "{
    switch (k) {
        case 1:
            int a = 0;
            use(a);
            break;
        case 2:
            int b = 0;
            use(b);
            break;
    }
}",
        );
    }

    #[test]
    fn clashing_names_keep_their_blocks() {
        let mut arena = Arena::new();
        let first = declare_and_use(&mut arena, "a");
        let first = section(&mut arena, 1, first);
        let second = declare_and_use(&mut arena, "a");
        let second = section(&mut arena, 2, second);
        let body = switch(&mut arena, vec![first, second]);
        let before = arena.debug(&body).to_string();

        run_pass(&mut FlattenSwitchBlocks, &mut arena, body);
        assert_eq!(arena.debug(&body).to_string(), before);
    }
}
