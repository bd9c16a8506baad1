use crate::ast::{Arena, Node, NodeId};

/// Whether evaluating `statement` may change the value of `expression`: some location the statement
/// writes (a local, a field access, an array element) appears in the expression.
pub fn are_correlated(arena: &Arena, expression: NodeId, statement: NodeId) -> bool {
    let written: Vec<NodeId> = arena
        .descendants(statement)
        .into_iter()
        .filter_map(|node| match &arena[node] {
            Node::Assignment { target, .. } => Some(*target),
            Node::Unary { op, operand } if op.is_update() => Some(*operand),
            _ => None,
        })
        .collect();

    arena.descendants(expression).into_iter().any(|read| {
        written.iter().any(|target| {
            arena.same_structure(*target, read) || writes_through(arena, *target, read)
        })
    })
}

// `a[i] = v` changes what `a[j]` reads, and `o.f = v` what `p.f` reads, when the bases may alias.
fn writes_through(arena: &Arena, target: NodeId, read: NodeId) -> bool {
    match (&arena[target], &arena[read]) {
        (Node::Indexer { target: base, .. }, Node::Indexer { target: read_base, .. }) => {
            arena.same_structure(*base, *read_base)
        }
        (
            Node::MemberReference { member, .. },
            Node::MemberReference {
                member: read_member,
                ..
            },
        ) => member == read_member,
        _ => false,
    }
}
