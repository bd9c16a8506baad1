use super::{Arena, NodeId};

impl Arena {
    /// Whether the subtrees rooted at `a` and `b` have the same shape, node kinds and scalar fields.
    /// Metadata does not take part in the comparison.
    pub fn same_structure(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (x, y) = (&self[a], &self[b]);
        if x.blanked() != y.blanked() {
            return false;
        }
        let (xs, ys) = (x.children(), y.children());
        xs.len() == ys.len()
            && xs
                .iter()
                .zip(&ys)
                .all(|(x, y)| self.same_structure(*x, *y))
    }
}
