mod arena;
mod build;
mod debug;
mod isomorphism;
mod iterate;
mod node;
mod query;
mod str;
mod types;

pub use self::arena::{Arena, NodeId};
pub use self::debug::DebugIr;
pub use self::iterate::{Order, walk};
pub use self::node::*;
pub use self::str::Name;
pub use self::types::*;
