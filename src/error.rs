use crate::ast::NodeId;
use thiserror::Error;

/// A tree that breaks the structural invariants every pass relies on. This is always a bug, either in
/// the upstream tree builder or in a pass.
#[derive(Debug, Error)]
#[error("At node {node}: {message}")]
pub struct InvariantViolation {
    pub node: NodeId,
    pub message: String,
}

impl InvariantViolation {
    pub fn new(node: NodeId, message: impl Into<String>) -> Self {
        Self {
            node,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("In pass {pass}: {source}")]
    Invariant {
        pass: &'static str,
        source: InvariantViolation,
    },
}
