use super::{Arena, Node, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    /// Parents before children.
    Pre,
    /// Children before parents.
    Post,
}

impl Arena {
    /// `id` followed by every node below it, in pre-order. This is a snapshot: editing the tree does
    /// not affect the returned list.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.children(id);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        // The flag says whether the children of the node have been pushed already.
        let mut stack = vec![(id, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            let children = self.children(id);
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
        }
        out
    }

    /// Strict ancestors of `id`, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        core::iter::successors(self.parent(id), |id| self.parent(*id))
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|parent| parent == ancestor)
    }

    /// Whether `id` is `root` or lies below it.
    pub fn contains(&self, root: NodeId, id: NodeId) -> bool {
        root == id || self.is_ancestor_of(root, id)
    }

    /// The innermost strict ancestor satisfying `predicate`.
    pub fn enclosing(&self, id: NodeId, predicate: impl Fn(&Node) -> bool) -> Option<NodeId> {
        self.ancestors(id).find(|ancestor| predicate(&self[*ancestor]))
    }
}

/// Runs `visit` on a snapshot of the nodes below `root`, skipping nodes that earlier visits moved
/// out of the tree. Visits may freely rewrite the tree, including the node being visited.
pub fn walk<E>(
    arena: &mut Arena,
    root: NodeId,
    order: Order,
    mut visit: impl FnMut(&mut Arena, NodeId) -> Result<(), E>,
) -> Result<(), E> {
    let nodes = match order {
        Order::Pre => arena.descendants(root),
        Order::Post => arena.post_order(root),
    };
    for id in nodes {
        if arena.contains(root, id) {
            visit(arena, id)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    #[test]
    fn orders() {
        let mut arena = Arena::new();
        let a = arena.ident("a");
        let b = arena.ident("b");
        let sum = arena.binary(BinaryOp::Add, a, b);
        let statement = arena.expr_stmt(sum);
        assert_eq!(arena.descendants(statement), vec![statement, sum, a, b]);
        assert_eq!(arena.post_order(statement), vec![a, b, sum, statement]);
        assert_eq!(arena.ancestors(b).collect::<Vec<_>>(), vec![sum, statement]);
        assert!(arena.contains(statement, a));
        assert!(!arena.contains(a, statement));
    }

    #[test]
    fn walk_skips_detached_nodes() {
        let mut arena = Arena::new();
        let a = arena.ident("a");
        let b = arena.ident("b");
        let sum = arena.binary(BinaryOp::Add, a, b);
        let statement = arena.expr_stmt(sum);
        let mut seen = Vec::new();
        walk::<()>(&mut arena, statement, Order::Pre, |arena, id| {
            seen.push(id);
            if id == sum {
                let c = arena.ident("c");
                arena.replace(sum, c);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![statement, sum]);
    }
}
