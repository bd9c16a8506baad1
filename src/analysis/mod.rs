//! Data-flow questions passes ask before they move code around.

mod correlator;
mod declaration_point;
mod definite_assignment;

pub use self::correlator::are_correlated;
pub use self::declaration_point::{
    DeclarationPoint, Subject, can_move_declaration_into, can_move_into_sub_block, find_declaration_point,
    has_nested_blocks,
};
pub use self::definite_assignment::{AssignmentStatus, DefiniteAssignment};
