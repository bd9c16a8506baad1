use super::{DebugIr, Meta, Node, Role, SlotMut};
use crate::error::InvariantViolation;
use core::fmt::{self, Display};
use core::ops::Index;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub(super) const DUMMY: Self = Self(u32::MAX);
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    node: Node,
    parent: Option<NodeId>,
    role: Role,
    meta: Meta,
}

/// Owns every node of one compilation unit.
///
/// Nodes know their parent and the role they play in it, so a node can be detached, replaced or
/// moved in constant time (plus the length of the sibling list for list roles). Nodes are never
/// freed: a detached subtree simply stays unreachable from the root.
///
/// Children are only linked through the arena. `alloc` adopts the children named by the new node,
/// moving them out of wherever they were attached before. Detaching a node from a required slot
/// leaves a `Hole` behind, which is only legal inside subtrees that are about to be discarded;
/// `check` reports any hole still reachable from the root.
#[derive(Default)]
pub struct Arena {
    entries: Vec<Entry>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.alloc_with_meta(node, Meta::default())
    }

    pub fn alloc_with_meta(&mut self, node: Node, meta: Meta) -> NodeId {
        let mut adopted = Vec::new();
        node.for_each_slot(|slot| {
            let role = slot.role();
            adopted.extend(slot.ids().iter().map(|child| (role, *child)));
        });
        // Detaching may allocate holes, so the new id is only known afterwards.
        for (_, child) in &adopted {
            self.detach(*child);
        }

        let id = NodeId(u32::try_from(self.entries.len()).expect("too many nodes"));
        self.entries.push(Entry {
            node,
            parent: None,
            role: Role::Root,
            meta,
        });
        for (role, child) in adopted {
            let entry = &mut self.entries[child.0 as usize];
            debug_assert!(entry.parent.is_none(), "{child} adopted twice");
            entry.parent = Some(id);
            entry.role = role;
        }
        id
    }

    fn entry(&self, id: NodeId) -> &Entry {
        &self.entries[id.0 as usize]
    }

    fn entry_mut(&mut self, id: NodeId) -> &mut Entry {
        &mut self.entries[id.0 as usize]
    }

    /// Mutable access for editing scalar fields. Child handles must not be changed through this
    /// reference; use the linking methods instead.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.entry_mut(id).node
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).parent
    }

    pub fn role(&self, id: NodeId) -> Role {
        self.entry(id).role
    }

    pub fn meta(&self, id: NodeId) -> &Meta {
        &self.entry(id).meta
    }

    pub fn meta_mut(&mut self, id: NodeId) -> &mut Meta {
        &mut self.entry_mut(id).meta
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self[id].children()
    }

    /// Unlinks `id` from its parent. List slots shrink, optional slots become empty, required slots
    /// receive a `Hole`.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.entry(id).parent else {
            return;
        };
        let role = self.entry(id).role;

        let mut needs_hole = false;
        self.entry_mut(parent).node.for_each_slot_mut(|slot| match slot {
            SlotMut::One(_, child) if *child == id => needs_hole = true,
            SlotMut::Opt(_, child) if *child == Some(id) => *child = None,
            SlotMut::Many(_, children) => children.retain(|child| *child != id),
            _ => {}
        });

        if needs_hole {
            let hole = NodeId(u32::try_from(self.entries.len()).expect("too many nodes"));
            self.entries.push(Entry {
                node: Node::Hole,
                parent: Some(parent),
                role,
                meta: Meta::default(),
            });
            self.substitute(parent, id, hole);
        }

        let entry = self.entry_mut(id);
        entry.parent = None;
        entry.role = Role::Root;
    }

    // Swaps the handle `old` for `new` in the slots of `parent`, without touching back links.
    fn substitute(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let mut found = false;
        self.entry_mut(parent).node.for_each_slot_mut(|slot| match slot {
            SlotMut::One(_, child) if *child == old => {
                *child = new;
                found = true;
            }
            SlotMut::Opt(_, child) if *child == Some(old) => {
                *child = Some(new);
                found = true;
            }
            SlotMut::Many(_, children) => {
                if let Some(child) = children.iter_mut().find(|child| **child == old) {
                    *child = new;
                    found = true;
                }
            }
            _ => {}
        });
        assert!(found, "{old} is not a child of {parent}");
    }

    /// Puts `new` exactly where `old` is, detaching `old`. Does nothing to the tree if `old` is
    /// detached, besides detaching `new`.
    ///
    /// `old` must not be inside `new`; use [`Arena::wrap`] to wrap a node in place.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        self.detach(new);
        let Some(parent) = self.entry(old).parent else {
            return;
        };
        let role = self.entry(old).role;
        self.substitute(parent, old, new);

        let entry = self.entry_mut(new);
        entry.parent = Some(parent);
        entry.role = role;
        let entry = self.entry_mut(old);
        entry.parent = None;
        entry.role = Role::Root;
    }

    /// Replaces `id` with the node built by `build`, which receives `id` (detached) to embed.
    pub fn wrap(&mut self, id: NodeId, build: impl FnOnce(NodeId) -> Node) -> NodeId {
        let placeholder = self.alloc(Node::Hole);
        self.replace(id, placeholder);
        let wrapper = self.alloc(build(id));
        self.replace(placeholder, wrapper);
        wrapper
    }

    /// The list `id` is an element of, if it sits in a list slot.
    pub fn siblings(&self, id: NodeId) -> Option<&[NodeId]> {
        let parent = self.entry(id).parent?;
        let mut result = None;
        self[parent].for_each_slot(|slot| {
            if let super::Slot::Many(_, children) = slot
                && children.contains(&id)
            {
                result = Some(children.as_slice());
            }
        });
        result
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        self.siblings(id)?.iter().position(|child| *child == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let index = self.index_in_parent(id)?;
        self.siblings(id)?.get(index + 1).copied()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let index = self.index_in_parent(id)?.checked_sub(1)?;
        self.siblings(id)?.get(index).copied()
    }

    fn insert_relative(&mut self, anchor: NodeId, new: NodeId, after: bool) {
        self.detach(new);
        let parent = self
            .entry(anchor)
            .parent
            .expect("cannot insert next to a detached node");
        let mut role = None;
        self.entry_mut(parent).node.for_each_slot_mut(|slot| {
            if let SlotMut::Many(slot_role, children) = slot
                && let Some(index) = children.iter().position(|child| *child == anchor)
            {
                children.insert(index + usize::from(after), new);
                role = Some(slot_role);
            }
        });
        let role = role.expect("anchor is not in a list");
        let entry = self.entry_mut(new);
        entry.parent = Some(parent);
        entry.role = role;
    }

    pub fn insert_before(&mut self, anchor: NodeId, new: NodeId) {
        self.insert_relative(anchor, new, false);
    }

    pub fn insert_after(&mut self, anchor: NodeId, new: NodeId) {
        self.insert_relative(anchor, new, true);
    }

    /// Inserts `child` into the list slot `role` of `parent` at `index` (clamped to the length).
    pub fn insert_at(&mut self, parent: NodeId, role: Role, index: usize, child: NodeId) {
        self.detach(child);
        let mut found = false;
        self.entry_mut(parent).node.for_each_slot_mut(|slot| {
            if let SlotMut::Many(slot_role, children) = slot
                && slot_role == role
            {
                children.insert(index.min(children.len()), child);
                found = true;
            }
        });
        assert!(found, "{parent} has no list slot {role}");
        let entry = self.entry_mut(child);
        entry.parent = Some(parent);
        entry.role = role;
    }

    pub fn push(&mut self, parent: NodeId, role: Role, child: NodeId) {
        self.insert_at(parent, role, usize::MAX, child);
    }

    /// Fills the single or optional slot `role` of `parent`, detaching its previous occupant.
    pub fn set(&mut self, parent: NodeId, role: Role, child: Option<NodeId>) {
        if let Some(child) = child {
            self.detach(child);
        }
        let mut previous = None;
        let mut found = false;
        self.entry_mut(parent).node.for_each_slot_mut(|slot| match slot {
            SlotMut::One(slot_role, slot_child) if slot_role == role => {
                let child = child.expect("cannot empty a required slot");
                previous = Some(core::mem::replace(slot_child, child));
                found = true;
            }
            SlotMut::Opt(slot_role, slot_child) if slot_role == role => {
                previous = core::mem::replace(slot_child, child);
                found = true;
            }
            _ => {}
        });
        assert!(found, "{parent} has no single slot {role}");
        if let Some(previous) = previous {
            let entry = self.entry_mut(previous);
            entry.parent = None;
            entry.role = Role::Root;
        }
        if let Some(child) = child {
            let entry = self.entry_mut(child);
            entry.parent = Some(parent);
            entry.role = role;
        }
    }

    /// Copies the subtree rooted at `id`, metadata included. The copy is detached.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let clones: Vec<NodeId> = self
            .children(id)
            .into_iter()
            .map(|child| self.deep_clone(child))
            .collect();
        let mut node = self[id].clone();
        let mut clones = clones.into_iter();
        let mut next = || clones.next().expect("child count changed while cloning");
        node.for_each_slot_mut(|slot| match slot {
            SlotMut::One(_, child) => *child = next(),
            SlotMut::Opt(_, child) => {
                if let Some(child) = child {
                    *child = next();
                }
            }
            SlotMut::Many(_, children) => children.iter_mut().for_each(|child| *child = next()),
        });
        let meta = self.entry(id).meta.clone();
        self.alloc_with_meta(node, meta)
    }

    /// Temporarily moves the consecutive sibling statements `statements` into a pair of nested
    /// scratch blocks `outer { inner { statements } }` placed where they were, runs `probe` on the
    /// regrouped tree and restores the original arrangement.
    ///
    /// This lets queries that work in terms of "the statement containing all uses" treat several
    /// statements as one without committing to any rewrite.
    pub fn probe_grouped<R>(
        &mut self,
        statements: &[NodeId],
        probe: impl FnOnce(&Arena, NodeId, NodeId) -> R,
    ) -> R {
        let first = *statements.first().expect("nothing to group");
        let inner = self.alloc(Node::Block {
            statements: Vec::new(),
        });
        let outer = self.alloc(Node::Block {
            statements: vec![inner],
        });
        self.insert_before(first, outer);
        for statement in statements {
            self.push(inner, Role::Statement, *statement);
        }

        let result = probe(self, outer, inner);

        for statement in statements {
            self.insert_before(outer, *statement);
        }
        self.detach(outer);
        result
    }

    pub fn debug<'a, T: DebugIr + ?Sized>(&'a self, value: &'a T) -> impl Display + 'a {
        struct IrDisplay<'a, T: ?Sized> {
            value: &'a T,
            arena: &'a Arena,
        }

        impl<T: DebugIr + ?Sized> Display for IrDisplay<'_, T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                T::fmt(self.value, f, self.arena)
            }
        }

        IrDisplay { value, arena: self }
    }

    /// Verifies parent and role links below `root` and that no hole is reachable.
    pub fn check(&self, root: NodeId) -> Result<(), InvariantViolation> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if self[id].is_hole() {
                return Err(InvariantViolation::new(id, "hole reachable from the root"));
            }
            let mut result = Ok(());
            self[id].for_each_slot(|slot| {
                for child in slot.ids() {
                    let entry = self.entry(*child);
                    if entry.parent != Some(id) || entry.role != slot.role() {
                        result = Err(InvariantViolation::new(
                            *child,
                            format!(
                                "linked as {} of {id}, but records {:?} as {}",
                                slot.role(),
                                entry.parent,
                                entry.role,
                            ),
                        ));
                    }
                    stack.push(*child);
                }
            });
            result?;
        }
        Ok(())
    }
}

impl Index<NodeId> for Arena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.entry(id).node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    fn sample(arena: &mut Arena) -> (NodeId, NodeId, NodeId) {
        let a = arena.ident("a");
        let b = arena.ident("b");
        let sum = arena.binary(BinaryOp::Add, a, b);
        let first = arena.expr_stmt(sum);
        let c = arena.ident("c");
        let second = arena.expr_stmt(c);
        let block = arena.block(vec![first, second]);
        (block, first, second)
    }

    #[test]
    fn alloc_adopts_children() {
        let mut arena = Arena::new();
        let (block, first, second) = sample(&mut arena);
        assert_eq!(arena.parent(first), Some(block));
        assert_eq!(arena.role(second), Role::Statement);
        arena.check(block).unwrap();

        // Adopting moves the node out of its previous list.
        let other = arena.block(vec![second]);
        assert_eq!(arena.children(block), vec![first]);
        assert_eq!(arena.parent(second), Some(other));
        arena.check(block).unwrap();
        arena.check(other).unwrap();
    }

    #[test]
    fn detach_from_required_slot_leaves_hole() {
        let mut arena = Arena::new();
        let (block, first, _) = sample(&mut arena);
        let Node::ExpressionStatement { expression } = arena[first] else {
            unreachable!()
        };
        arena.detach(expression);
        assert!(arena.check(block).is_err());
        let replacement = arena.ident("d");
        let hole = arena.children(first)[0];
        arena.replace(hole, replacement);
        arena.check(block).unwrap();
        assert_eq!(arena.debug(&block).to_string(), "{\n    d;\n    c;\n}");
    }

    #[test]
    fn wrap_in_place() {
        let mut arena = Arena::new();
        let (block, _, second) = sample(&mut arena);
        let Node::ExpressionStatement { expression } = arena[second] else {
            unreachable!()
        };
        arena.wrap(expression, |operand| Node::Unary {
            op: crate::ast::UnaryOp::Not,
            operand,
        });
        arena.check(block).unwrap();
        assert_eq!(arena.debug(&block).to_string(), "{\n    a + b;\n    !c;\n}");
    }

    #[test]
    fn siblings_and_insertion() {
        let mut arena = Arena::new();
        let (block, first, second) = sample(&mut arena);
        assert_eq!(arena.next_sibling(first), Some(second));
        assert_eq!(arena.prev_sibling(first), None);
        let empty = arena.alloc(Node::Empty);
        arena.insert_after(first, empty);
        assert_eq!(arena.children(block), vec![first, empty, second]);
        arena.insert_before(first, second);
        assert_eq!(arena.children(block), vec![second, first, empty]);
        arena.check(block).unwrap();
    }

    #[test]
    fn probe_restores_statements() {
        let mut arena = Arena::new();
        let (block, first, second) = sample(&mut arena);
        let seen = arena.probe_grouped(&[first, second], |arena, outer, inner| {
            assert_eq!(arena.parent(first), Some(inner));
            assert_eq!(arena.parent(inner), Some(outer));
            arena.children(block)
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(arena.children(block), vec![first, second]);
        arena.check(block).unwrap();
    }

    #[test]
    fn deep_clone_is_detached_and_equal() {
        let mut arena = Arena::new();
        let (block, _, _) = sample(&mut arena);
        let copy = arena.deep_clone(block);
        assert_eq!(arena.parent(copy), None);
        assert!(arena.same_structure(block, copy));
        assert_eq!(
            arena.debug(&copy).to_string(),
            arena.debug(&block).to_string()
        );
    }
}
